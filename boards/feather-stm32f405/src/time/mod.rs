//! Timekeeping: SNTP source, internal RTC and monotonic ticks

pub mod calendar;
pub mod rtc;
pub mod sntp;
pub mod ticks;

pub use rtc::InternalRtc;
pub use sntp::SntpTimeSource;
pub use ticks::MonoTicks;
