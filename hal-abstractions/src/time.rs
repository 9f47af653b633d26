//! Wall-clock and monotonic time sources

use core::future::Future;

/// Timestamp with microsecond precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timestamp {
    /// Unix timestamp in seconds since epoch (1970-01-01 00:00:00 UTC)
    pub unix_secs: u64,
    /// Microseconds component (0-999,999)
    pub micros: u32,
}

impl Timestamp {
    /// NTP epoch offset (1900-01-01 to 1970-01-01 in seconds)
    pub const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

    pub const fn new(unix_secs: u64, micros: u32) -> Self {
        Self { unix_secs, micros }
    }

    /// Convert from NTP timestamp (seconds since 1900-01-01)
    pub fn from_ntp(ntp_secs: u64, ntp_frac: u32) -> Self {
        let unix_secs = ntp_secs.saturating_sub(Self::NTP_UNIX_OFFSET);
        // NTP fraction is in units of 2^-32 seconds
        let micros = ((ntp_frac as u64 * 1_000_000) >> 32) as u32;
        Self::new(unix_secs, micros)
    }

    /// Build from the signed result of a time query. Negative values are
    /// failure codes and yield `None`.
    pub fn from_query(secs: i64) -> Option<Self> {
        u64::try_from(secs).ok().map(|s| Self::new(s, 0))
    }
}

/// External wall-clock source (SNTP, GNSS, cellular modem, ...)
///
/// `N` is the network handle the query travels over.
pub trait TimeSource<N> {
    /// Query once. Returns seconds since the Unix epoch, or a negative
    /// error code.
    fn get_timestamp(
        &mut self,
        network: &N,
        server: &str,
        port: u16,
    ) -> impl Future<Output = i64>;
}

/// Monotonic millisecond counter
pub trait TickCounter {
    fn now_ms(&self) -> u64;
}
