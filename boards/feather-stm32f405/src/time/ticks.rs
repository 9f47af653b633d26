//! Monotonic tick source for the telemetry loop

use hal_abstractions::TickCounter;
use rtic_monotonics::stm32::prelude::*;

use crate::Mono;

/// Millisecond ticks from the TIM2 monotonic
pub struct MonoTicks;

impl TickCounter for MonoTicks {
    fn now_ms(&self) -> u64 {
        Mono::now().duration_since_epoch().to_millis()
    }
}
