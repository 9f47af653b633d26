//! Board network error types

use defmt::Format;

/// Errors from the link, SNTP and hub transport code
#[derive(Debug, Clone, Copy, Format)]
pub enum NetworkError {
    /// DHCP lease not acquired in time
    DhcpTimeout,
    /// DNS resolution failed
    DnsError,
    /// Socket bind/connect error
    SocketError,
    /// Request timeout
    Timeout,
    /// Invalid response from server
    InvalidResponse,
    /// NTP server stratum outside the accepted range
    InvalidStratum,
    /// TLS handshake failed
    TlsHandshakeFailed,
    /// MQTT connection refused or broken
    MqttConnectionFailed,
    /// MQTT publish failed
    MqttPublishFailed,
    /// String or topic does not fit the MQTT encoding or buffer
    MqttProtocolError,
    /// W5500 did not respond during initialization
    EthInit,
    /// No key or clock to sign the hub password with
    AuthTokenFailed,
}

impl NetworkError {
    /// Negative status code reported through the bootstrap seams
    pub const fn code(self) -> i32 {
        match self {
            Self::DhcpTimeout => -1,
            Self::DnsError => -2,
            Self::SocketError => -3,
            Self::Timeout => -4,
            Self::InvalidResponse => -5,
            Self::InvalidStratum => -6,
            Self::TlsHandshakeFailed => -7,
            Self::MqttConnectionFailed => -8,
            Self::MqttPublishFailed => -9,
            Self::MqttProtocolError => -10,
            Self::EthInit => -11,
            Self::AuthTokenFailed => -12,
        }
    }
}

impl core::fmt::Display for NetworkError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::DhcpTimeout => write!(f, "DHCP timeout"),
            Self::DnsError => write!(f, "DNS resolution failed"),
            Self::SocketError => write!(f, "Socket error"),
            Self::Timeout => write!(f, "Request timeout"),
            Self::InvalidResponse => write!(f, "Invalid response"),
            Self::InvalidStratum => write!(f, "Invalid stratum"),
            Self::TlsHandshakeFailed => write!(f, "TLS handshake failed"),
            Self::MqttConnectionFailed => write!(f, "MQTT connection failed"),
            Self::MqttPublishFailed => write!(f, "MQTT publish failed"),
            Self::MqttProtocolError => write!(f, "MQTT protocol error"),
            Self::EthInit => write!(f, "Ethernet controller init failed"),
            Self::AuthTokenFailed => write!(f, "Cannot build hub access token"),
        }
    }
}

impl core::error::Error for NetworkError {}

impl embedded_io_async::Error for NetworkError {
    fn kind(&self) -> embedded_io_async::ErrorKind {
        match self {
            Self::SocketError => embedded_io_async::ErrorKind::BrokenPipe,
            Self::Timeout => embedded_io_async::ErrorKind::TimedOut,
            Self::InvalidResponse => embedded_io_async::ErrorKind::InvalidData,
            _ => embedded_io_async::ErrorKind::Other,
        }
    }
}
