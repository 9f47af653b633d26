//! Collaborator bundle handed to the sequencer
//!
//! A board implements [`Platform`] once to name its concrete types and builds
//! a [`Services`] value from its peripherals. The network handle is passed
//! separately because it may be absent.

use embedded_hal_async::delay::DelayNs;
use hal_abstractions::{NetworkInterface, RealTimeClock, TickCounter, TimeSource};

use crate::hub::DeviceClientFactory;
use crate::provisioning::ProvisioningFactory;
use crate::security::SecurityModule;

pub trait Platform {
    type Network: NetworkInterface;
    type TimeSource: TimeSource<Self::Network>;
    type Rtc: RealTimeClock;
    type Security: SecurityModule;
    type Provisioning: ProvisioningFactory;
    type Hub: DeviceClientFactory;
    type Ticks: TickCounter;
    type Delay: DelayNs;
}

pub type ProvisioningClientOf<P> = <<P as Platform>::Provisioning as ProvisioningFactory>::Client;
pub type DeviceClientOf<P> = <<P as Platform>::Hub as DeviceClientFactory>::Client;

/// Everything the sequence calls into, except the network handle
pub struct Services<P: Platform> {
    pub time_source: P::TimeSource,
    pub rtc: P::Rtc,
    pub security: P::Security,
    pub provisioning: P::Provisioning,
    pub hub: P::Hub,
    pub ticks: P::Ticks,
    pub delay: P::Delay,
}
