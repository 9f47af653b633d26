//! SNTP time source
//!
//! One request per query, no retries: resolve the server, send a 48-byte client packet,
//! validate the reply and apply an RTT/2 correction.

use defmt::{info, warn, Debug2Format};
use embassy_futures::select::{select, Either};
use embassy_net::dns::DnsQueryType;
use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_net::{IpEndpoint, Stack};
use embassy_time::{Duration, Instant, Timer};
use hal_abstractions::{TimeSource, Timestamp};

use crate::config::SntpConfig;
use crate::network::{EthernetLink, NetworkError};

/// NTP packet length
const NTP_PACKET_LEN: usize = 48;

/// Largest RTT/2 correction applied, in microseconds
const MAX_RTT_CORRECTION_US: u64 = 1_000_000;

pub struct SntpTimeSource {
    config: SntpConfig,
    last: Option<Timestamp>,
}

impl SntpTimeSource {
    pub fn new(config: SntpConfig) -> Self {
        Self { config, last: None }
    }

    /// Full-precision result of the last successful query
    pub fn last(&self) -> Option<Timestamp> {
        self.last
    }

    async fn request(
        &self,
        stack: Stack<'static>,
        server: &str,
        port: u16,
    ) -> Result<Timestamp, NetworkError> {
        let server_ip = stack
            .dns_query(server, DnsQueryType::A)
            .await
            .map_err(|_| NetworkError::DnsError)?
            .first()
            .copied()
            .ok_or(NetworkError::DnsError)?;
        let endpoint = IpEndpoint::new(server_ip, port);
        info!("Resolved {} to {}", server, Debug2Format(&endpoint));

        let mut rx_meta = [PacketMetadata::EMPTY; 2];
        let mut rx_buffer = [0u8; 64];
        let mut tx_meta = [PacketMetadata::EMPTY; 2];
        let mut tx_buffer = [0u8; 64];
        let mut socket = UdpSocket::new(
            stack,
            &mut rx_meta,
            &mut rx_buffer,
            &mut tx_meta,
            &mut tx_buffer,
        );
        socket.bind(0).map_err(|_| NetworkError::SocketError)?;

        let mut request = [0u8; NTP_PACKET_LEN];
        request[0] = 0x1B; // LI=0, VN=3, Mode=3 (client)

        let sent_at = Instant::now();
        socket
            .send_to(&request, endpoint)
            .await
            .map_err(|_| NetworkError::SocketError)?;

        let mut response = [0u8; NTP_PACKET_LEN];
        let timeout = Timer::after(Duration::from_millis(self.config.timeout_ms));
        let (len, from) = match select(timeout, socket.recv_from(&mut response)).await {
            Either::First(()) => return Err(NetworkError::Timeout),
            Either::Second(result) => result.map_err(|_| NetworkError::SocketError)?,
        };
        let rtt = Instant::now().duration_since(sent_at);

        if len < NTP_PACKET_LEN || from.endpoint.addr != server_ip {
            return Err(NetworkError::InvalidResponse);
        }

        let (mut timestamp, stratum) = parse_reply(&response, self.config.max_stratum)?;

        let correction = (rtt.as_micros() / 2).min(MAX_RTT_CORRECTION_US) as u32;
        timestamp.micros += correction;
        if timestamp.micros >= 1_000_000 {
            timestamp.unix_secs += 1;
            timestamp.micros -= 1_000_000;
        }
        info!(
            "NTP timestamp: {}.{:06} UTC (stratum {}, RTT correction {} us)",
            timestamp.unix_secs, timestamp.micros, stratum, correction
        );
        Ok(timestamp)
    }
}

/// Validate a server reply and read its transmit timestamp
fn parse_reply(
    response: &[u8; NTP_PACKET_LEN],
    max_stratum: u8,
) -> Result<(Timestamp, u8), NetworkError> {
    // Mode 4 (server) or 5 (broadcast)
    let mode = response[0] & 0x07;
    if mode != 4 && mode != 5 {
        return Err(NetworkError::InvalidResponse);
    }

    let stratum = response[1];
    if stratum == 0 || stratum > max_stratum {
        warn!("Invalid stratum {} (max {})", stratum, max_stratum);
        return Err(NetworkError::InvalidStratum);
    }

    // Transmit timestamp, bytes 40..48
    let secs = u32::from_be_bytes([response[40], response[41], response[42], response[43]]);
    let frac = u32::from_be_bytes([response[44], response[45], response[46], response[47]]);
    if secs == 0 {
        return Err(NetworkError::InvalidResponse);
    }
    Ok((Timestamp::from_ntp(u64::from(secs), frac), stratum))
}

impl TimeSource<EthernetLink> for SntpTimeSource {
    /// One request; seconds since the Unix epoch, or a negative
    /// `NetworkError` code
    async fn get_timestamp(&mut self, network: &EthernetLink, server: &str, port: u16) -> i64 {
        info!("SNTP query to {}:{}", server, port);
        match self.request(network.stack(), server, port).await {
            Ok(timestamp) => {
                self.last = Some(timestamp);
                timestamp.unix_secs as i64
            }
            Err(e) => {
                warn!("SNTP query failed: {}", e);
                i64::from(e.code())
            }
        }
    }
}
