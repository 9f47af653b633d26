//! Concrete collaborator types for the bootstrap on this board

use bootstrap_core::Platform;

use crate::cloud::{KeyStore, LinkedHub, PreassignedAuthority};
use crate::network::EthernetLink;
use crate::time::{InternalRtc, MonoTicks, SntpTimeSource};

pub struct Feather;

impl Platform for Feather {
    type Network = EthernetLink;
    type TimeSource = SntpTimeSource;
    type Rtc = InternalRtc;
    type Security = KeyStore;
    type Provisioning = PreassignedAuthority;
    type Hub = LinkedHub;
    type Ticks = MonoTicks;
    type Delay = embassy_time::Delay;
}
