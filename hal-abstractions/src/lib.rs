//! Hardware abstraction traits for IoT firmware
//!
//! This crate defines traits that abstract over hardware differences
//! between boards. BSPs implement these traits and hand them to the
//! bootstrap sequencer in `bootstrap-core`.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]
#![deny(warnings)]

pub mod network;
pub mod rtc;
pub mod time;

pub use network::{LinkError, MacAddress, NetworkInterface};
pub use rtc::{RealTimeClock, RtcError};
pub use time::{TickCounter, TimeSource, Timestamp};
