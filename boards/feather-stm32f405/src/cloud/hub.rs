//! Device client proxied to the cloud-link task
//!
//! The sequencer's device client never touches the network itself. Opening
//! a client, subscribing, queuing an event and closing it are messages on the
//! uplink channel; connection status, send confirmations and inbound messages
//! come back on the downlink and are handed to the caller from `do_work`.

use bootstrap_core::context::{DEVICE_ID_MAX_LEN, HUB_URI_MAX_LEN};
use bootstrap_core::{
    ClientOption, DeviceClient, DeviceClientFactory, DeviceIdentity, Failure, HubEvent,
    TransportProtocol,
};
use defmt::{info, warn};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use heapless::{String, Vec};

/// Largest event payload the uplink carries
pub const EVENT_MAX_LEN: usize = 128;

const QUEUE_FULL: i32 = -40;
const TOO_LARGE: i32 = -41;
const UNSUPPORTED: i32 = -42;

/// Requests from the device client to the cloud-link task
pub enum Uplink {
    Open {
        hub_uri: String<HUB_URI_MAX_LEN>,
        device_id: String<DEVICE_ID_MAX_LEN>,
    },
    Event(Vec<u8, EVENT_MAX_LEN>),
    /// Deliver cloud-to-device messages as `HubEvent::Inbound`
    Subscribe,
    Close,
}

pub static UPLINK: Channel<CriticalSectionRawMutex, Uplink, 4> = Channel::new();
pub static DOWNLINK: Channel<CriticalSectionRawMutex, HubEvent, 8> = Channel::new();

/// Queue an event for the device client without blocking the link task
pub fn report(event: HubEvent) {
    if DOWNLINK.try_send(event).is_err() {
        warn!("Downlink full, dropped {}", event);
    }
}

pub struct LinkedHub;

impl DeviceClientFactory for LinkedHub {
    type Client = LinkedDeviceClient;

    fn create_from_identity(
        &mut self,
        identity: &DeviceIdentity,
        transport: TransportProtocol,
    ) -> Option<LinkedDeviceClient> {
        if transport != TransportProtocol::Mqtt {
            warn!("Transport {} not available on this board", transport);
            return None;
        }

        let mut hub_uri = String::new();
        hub_uri.push_str(identity.hub_uri()).ok()?;
        let mut device_id = String::new();
        device_id.push_str(identity.device_id()).ok()?;

        // Events from an earlier session are stale
        while DOWNLINK.try_receive().is_ok() {}

        UPLINK
            .try_send(Uplink::Open { hub_uri, device_id })
            .map_err(|_| warn!("Uplink full, cannot open hub session"))
            .ok()?;
        info!("Hub session requested for {}", identity.device_id());
        Some(LinkedDeviceClient { _private: () })
    }

    fn version(&self) -> &str {
        concat!("mqtt-link/", env!("CARGO_PKG_VERSION"))
    }
}

pub struct LinkedDeviceClient {
    _private: (),
}

impl DeviceClient for LinkedDeviceClient {
    fn set_option(&mut self, option: ClientOption<'_>) -> Result<(), Failure> {
        match option {
            ClientOption::LogTrace(_) => Ok(()),
            // TLS runs without server verification on this board
            ClientOption::TrustedCerts(_) | ClientOption::RegistrationId(_) => {
                Err(Failure::Transient(UNSUPPORTED))
            }
        }
    }

    fn enable_inbound_messages(&mut self) -> Result<(), Failure> {
        UPLINK
            .try_send(Uplink::Subscribe)
            .map_err(|_| Failure::Transient(QUEUE_FULL))
    }

    fn send_event_async(&mut self, payload: &[u8]) -> Result<(), Failure> {
        let event = Vec::from_slice(payload).map_err(|_| Failure::Transient(TOO_LARGE))?;
        UPLINK
            .try_send(Uplink::Event(event))
            .map_err(|_| Failure::Transient(QUEUE_FULL))
    }

    async fn do_work(&mut self, events: &mut dyn FnMut(HubEvent)) {
        // Give the link task a turn before collecting its reports
        embassy_futures::yield_now().await;
        while let Ok(event) = DOWNLINK.try_receive() {
            events(event);
        }
    }

    fn destroy(self) {
        if UPLINK.try_send(Uplink::Close).is_err() {
            warn!("Uplink full, hub session left open");
        }
    }
}
