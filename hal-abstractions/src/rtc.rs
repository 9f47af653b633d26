//! Persistent real-time clock abstraction

use core::fmt;

use crate::time::Timestamp;

/// RTC operation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RtcError {
    /// RTC not initialized (or never written)
    NotInitialized,
    /// RTC hardware error
    HardwareError,
}

impl fmt::Display for RtcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInitialized => write!(f, "RTC not initialized"),
            Self::HardwareError => write!(f, "RTC hardware error"),
        }
    }
}

impl core::error::Error for RtcError {}

/// Battery- or LSE-backed wall clock
///
/// Resolution is whatever the hardware offers; most parts keep whole seconds
/// only, so `read` may return `micros == 0`.
pub trait RealTimeClock {
    fn write(&mut self, timestamp: Timestamp) -> Result<(), RtcError>;
    fn read(&mut self) -> Result<Timestamp, RtcError>;
}
