//! Network link abstraction

use core::fmt;
use core::future::Future;

/// Non-zero status returned by a failed link bring-up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkError {
    pub code: i32,
}

impl LinkError {
    pub const fn new(code: i32) -> Self {
        Self { code }
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link error {}", self.code)
    }
}

impl core::error::Error for LinkError {}

/// Ethernet/Wi-Fi hardware address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MacAddress(pub [u8; 6]);

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

/// Default network interface of the board
///
/// The handle is owned by whoever constructs the bootstrap sequence; the
/// sequence only borrows it for connect and for the time query.
pub trait NetworkInterface {
    /// Bring the link up. Returns once the interface is usable or failed.
    fn connect(&mut self) -> impl Future<Output = Result<(), LinkError>>;

    /// Hardware address, for diagnostics only
    fn mac_address(&self) -> MacAddress;
}
