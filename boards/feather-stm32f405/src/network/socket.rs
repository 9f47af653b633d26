//! Async TCP socket for the TLS transport
//!
//! Wraps `embassy_net::tcp::TcpSocket` in the `embedded-io-async` traits that
//! `embedded-tls` reads and writes through.

use embassy_net::tcp::TcpSocket;
use embassy_net::{IpEndpoint, Stack};
use embedded_io_async::{ErrorType, Read, Write};

use super::error::NetworkError;

pub struct AsyncTcpSocket<'a> {
    socket: TcpSocket<'a>,
}

impl<'a> AsyncTcpSocket<'a> {
    pub fn new(stack: Stack<'a>, rx_buffer: &'a mut [u8], tx_buffer: &'a mut [u8]) -> Self {
        Self {
            socket: TcpSocket::new(stack, rx_buffer, tx_buffer),
        }
    }

    pub async fn connect(&mut self, endpoint: IpEndpoint) -> Result<(), NetworkError> {
        self.socket
            .connect(endpoint)
            .await
            .map_err(|_| NetworkError::SocketError)
    }
}

impl ErrorType for AsyncTcpSocket<'_> {
    type Error = NetworkError;
}

impl Read for AsyncTcpSocket<'_> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.socket
            .read(buf)
            .await
            .map_err(|_| NetworkError::SocketError)
    }
}

impl Write for AsyncTcpSocket<'_> {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.socket
            .write(buf)
            .await
            .map_err(|_| NetworkError::SocketError)
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        self.socket
            .flush()
            .await
            .map_err(|_| NetworkError::SocketError)
    }
}
