//! Internal STM32 RTC behind the `RealTimeClock` seam
//!
//! The peripheral lives in a critical-section mutex so it can be installed in
//! `init` and used from the network task.

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};

use critical_section::Mutex;
use defmt::info;
use embassy_stm32::rtc::Rtc;
use hal_abstractions::{RealTimeClock, RtcError, Timestamp};

use super::calendar::{datetime_to_unix, unix_to_datetime};

/// Set after the first successful write
static TIME_SYNCED: AtomicBool = AtomicBool::new(false);

static RTC: Mutex<RefCell<Option<Rtc>>> = Mutex::new(RefCell::new(None));

/// Handle to the installed RTC
pub struct InternalRtc {
    _private: (),
}

impl InternalRtc {
    /// Install the peripheral. Call once from `init`.
    pub fn install(rtc: Rtc) {
        critical_section::with(|cs| {
            RTC.borrow(cs).replace(Some(rtc));
        });
        info!("Internal RTC installed");
    }

    pub fn new() -> Self {
        Self { _private: () }
    }

    /// Whether the RTC has been set from a network time source
    pub fn is_synced(&self) -> bool {
        TIME_SYNCED.load(Ordering::Acquire)
    }
}

impl RealTimeClock for InternalRtc {
    fn write(&mut self, timestamp: Timestamp) -> Result<(), RtcError> {
        let datetime = unix_to_datetime(timestamp.unix_secs)?;
        critical_section::with(|cs| {
            let mut slot = RTC.borrow(cs).borrow_mut();
            let rtc = slot.as_mut().ok_or(RtcError::NotInitialized)?;
            rtc.set_datetime(datetime)
                .map_err(|_| RtcError::HardwareError)?;
            TIME_SYNCED.store(true, Ordering::Release);
            Ok(())
        })
    }

    fn read(&mut self) -> Result<Timestamp, RtcError> {
        if !self.is_synced() {
            return Err(RtcError::NotInitialized);
        }
        critical_section::with(|cs| {
            let mut slot = RTC.borrow(cs).borrow_mut();
            let rtc = slot.as_mut().ok_or(RtcError::NotInitialized)?;
            let datetime = rtc.now().map_err(|_| RtcError::HardwareError)?;
            // One-second resolution
            Ok(Timestamp::new(datetime_to_unix(&datetime), 0))
        })
    }
}
