//! Build-time configuration
//!
//! Identity material comes from the build environment so it never lands in
//! the source tree:
//!
//! ```text
//! ID_SCOPE=0ne00000000 REGISTRATION_ID=feather-01 SYMMETRIC_KEY=... \
//! ASSIGNED_HUB=my-hub.azure-devices.net cargo run --release
//! ```

use bootstrap_core::{BootstrapConfig, SecurityKind};

const ID_SCOPE: &str = match option_env!("ID_SCOPE") {
    Some(scope) => scope,
    None => "[ID Scope]",
};

const SYMMETRIC_KEY: &str = match option_env!("SYMMETRIC_KEY") {
    Some(key) => key,
    None => "[Symmetric Key]",
};

/// Hub the device is pre-assigned to; registration fails without one
pub const ASSIGNED_HUB: Option<&str> = option_env!("ASSIGNED_HUB");

/// Registration id from the build environment, else the chip's unique id
pub fn registration_id() -> &'static str {
    option_env!("REGISTRATION_ID").unwrap_or_else(embassy_stm32::uid::uid_hex)
}

/// Bootstrap configuration for this board
pub fn bootstrap_config() -> BootstrapConfig {
    BootstrapConfig::new(
        SecurityKind::SymmetricKey {
            registration_id: registration_id(),
            key: SYMMETRIC_KEY,
        },
        ID_SCOPE,
    )
}

/// Ethernet and IP stack parameters
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// MAC address for the W5500
    pub mac_addr: [u8; 6],
    /// Random seed for the network stack
    pub seed: u64,
    /// How long to wait for a DHCP lease before giving up
    pub dhcp_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mac_addr: [0x02, 0x00, 0x00, 0x12, 0x34, 0x56],
            seed: 0x1234_5678_u64,
            dhcp_timeout_ms: 30_000,
        }
    }
}

/// SNTP request parameters
#[derive(Debug, Clone)]
pub struct SntpConfig {
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
    /// Maximum accepted stratum level (1-15)
    pub max_stratum: u8,
}

impl Default for SntpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            max_stratum: 3,
        }
    }
}

/// MQTT session parameters for the hub connection
#[derive(Debug, Clone, Copy)]
pub struct MqttConfig {
    /// Hub MQTT port (8883 for MQTTS)
    pub port: u16,
    /// Keep-alive interval in seconds
    pub keep_alive_secs: u16,
    /// Clean start flag (true = new session)
    pub clean_start: bool,
    /// Validity of the shared access signature sent as the password
    pub token_lifetime_secs: u32,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            port: 8883,
            keep_alive_secs: 60,
            clean_start: true,
            token_lifetime_secs: 3600,
        }
    }
}
