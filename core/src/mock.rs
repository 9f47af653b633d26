//! Scripted collaborators for host tests

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::string::{String, ToString};
use std::vec::Vec;

use embedded_hal_async::delay::DelayNs;
use hal_abstractions::{
    LinkError, MacAddress, NetworkInterface, RealTimeClock, RtcError, TickCounter, TimeSource,
    Timestamp,
};

use crate::config::{BootstrapConfig, SecurityDeviceType, SecurityKind, TransportProtocol};
use crate::context::DeviceIdentity;
use crate::error::Failure;
use crate::hub::{
    ClientOption, ConnectionReason, ConnectionStatus, DeviceClient, DeviceClientFactory, HubEvent,
    SendResult,
};
use crate::platform::{Platform, Services};
use crate::provisioning::{
    Assignment, ProvisioningClient, ProvisioningFactory, ProvisioningResult, RegistrationEvent,
    RegistrationStatus,
};
use crate::security::SecurityModule;
use crate::sequencer::Bootstrap;

/// 2024-01-01T00:00:00Z
pub const EPOCH_2024: i64 = 1_704_067_200;

/// Ordered record of collaborator calls
#[derive(Clone, Default)]
pub struct Journal(Rc<RefCell<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: &str) {
        self.0.borrow_mut().push(entry.to_string());
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.borrow().iter().filter(|e| e.as_str() == entry).count()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.0.borrow().iter().position(|e| e.as_str() == entry)
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.position(entry).is_some()
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.borrow().clone()
    }
}

/// Virtual time, advanced only by [`MockDelay`]
#[derive(Clone, Default)]
pub struct Clock(Rc<Cell<u64>>);

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Milliseconds elapsed
    pub fn now(&self) -> u64 {
        self.0.get() / 1_000_000
    }

    pub fn delay(&self) -> MockDelay {
        MockDelay(self.clone())
    }

    pub fn ticks(&self) -> MockTicks {
        MockTicks(self.clone())
    }
}

pub struct MockDelay(Clock);

impl DelayNs for MockDelay {
    async fn delay_ns(&mut self, ns: u32) {
        let clock = &self.0 .0;
        clock.set(clock.get() + u64::from(ns));
    }
}

pub struct MockTicks(Clock);

impl TickCounter for MockTicks {
    fn now_ms(&self) -> u64 {
        self.0.now()
    }
}

pub struct MockNetwork {
    journal: Journal,
    connect: Result<(), LinkError>,
}

impl NetworkInterface for MockNetwork {
    async fn connect(&mut self) -> Result<(), LinkError> {
        self.journal.record("network.connect");
        self.connect
    }

    fn mac_address(&self) -> MacAddress {
        MacAddress([0x02, 0x00, 0x00, 0x12, 0x34, 0x56])
    }
}

pub struct MockTimeSource {
    journal: Journal,
    value: i64,
}

impl TimeSource<MockNetwork> for MockTimeSource {
    async fn get_timestamp(&mut self, _network: &MockNetwork, server: &str, port: u16) -> i64 {
        self.journal.record(&std::format!("time.query:{}:{}", server, port));
        self.value
    }
}

pub struct MockRtc {
    journal: Journal,
    stored: Option<Timestamp>,
    fail_write: bool,
}

impl RealTimeClock for MockRtc {
    fn write(&mut self, timestamp: Timestamp) -> Result<(), RtcError> {
        self.journal.record("rtc.write");
        if self.fail_write {
            return Err(RtcError::HardwareError);
        }
        self.stored = Some(timestamp);
        Ok(())
    }

    fn read(&mut self) -> Result<Timestamp, RtcError> {
        self.journal.record("rtc.read");
        self.stored.ok_or(RtcError::NotInitialized)
    }
}

pub struct MockSecurity {
    journal: Journal,
    init: Result<(), Failure>,
}

impl SecurityModule for MockSecurity {
    fn init(&mut self, device_type: SecurityDeviceType) -> Result<(), Failure> {
        self.journal
            .record(&std::format!("security.init:{:?}", device_type));
        self.init
    }

    fn set_symmetric_key(&mut self, registration_id: &str, _key: &str) -> Result<(), Failure> {
        self.journal
            .record(&std::format!("security.key:{}", registration_id));
        Ok(())
    }

    fn deinit(&mut self) {
        self.journal.record("security.deinit");
    }
}

/// Scripted provisioning service behavior, counted in polls starting at 1
#[derive(Clone, Debug)]
pub struct ProvisioningScript {
    /// Polls that only report status before the completion arrives
    pub status_polls: u32,
    /// `None` never completes
    pub completion: Option<Result<(String, String), ProvisioningResult>>,
    /// Deliver the completion twice
    pub duplicate_completion: bool,
    pub transient_on_poll: Option<u32>,
    pub fatal_on_poll: Option<u32>,
    pub register: Result<(), Failure>,
    pub reject_options: bool,
}

impl ProvisioningScript {
    pub fn assign_after(status_polls: u32) -> Self {
        Self {
            status_polls,
            completion: Some(Ok((
                "hub-01.example.net".to_string(),
                "dev-01".to_string(),
            ))),
            duplicate_completion: false,
            transient_on_poll: None,
            fatal_on_poll: None,
            register: Ok(()),
            reject_options: false,
        }
    }

    pub fn fail_after(status_polls: u32, result: ProvisioningResult) -> Self {
        Self {
            completion: Some(Err(result)),
            ..Self::assign_after(status_polls)
        }
    }

    pub fn silent() -> Self {
        Self {
            completion: None,
            ..Self::assign_after(0)
        }
    }
}

#[derive(Clone, Default)]
pub struct ProvisioningProbe {
    polls: Rc<Cell<u32>>,
}

impl ProvisioningProbe {
    pub fn polls(&self) -> u32 {
        self.polls.get()
    }
}

pub struct ScriptedProvisioning {
    journal: Journal,
    script: ProvisioningScript,
    polls: Rc<Cell<u32>>,
}

impl ScriptedProvisioning {
    pub fn new(script: ProvisioningScript) -> (Self, ProvisioningProbe) {
        let probe = ProvisioningProbe::default();
        let client = Self {
            journal: Journal::default(),
            script,
            polls: probe.polls.clone(),
        };
        (client, probe)
    }
}

impl ProvisioningClient for ScriptedProvisioning {
    fn set_option(&mut self, option: ClientOption<'_>) -> Result<(), Failure> {
        self.journal
            .record(&std::format!("provisioning.option:{}", option.name()));
        if self.script.reject_options {
            Err(Failure::Transient(-1))
        } else {
            Ok(())
        }
    }

    fn register(&mut self) -> Result<(), Failure> {
        self.journal.record("provisioning.register");
        self.script.register
    }

    async fn do_work(
        &mut self,
        events: &mut dyn FnMut(RegistrationEvent<'_>),
    ) -> Result<(), Failure> {
        let poll = self.polls.get() + 1;
        self.polls.set(poll);

        if self.script.fatal_on_poll == Some(poll) {
            return Err(Failure::Fatal(-7));
        }
        if self.script.transient_on_poll == Some(poll) {
            return Err(Failure::Transient(11));
        }

        if poll <= self.script.status_polls {
            let status = match poll % 3 {
                1 => RegistrationStatus::Connected,
                2 => RegistrationStatus::Registering,
                _ => RegistrationStatus::Assigning,
            };
            events(RegistrationEvent::Status(status));
        } else if poll == self.script.status_polls + 1 {
            let repeats = if self.script.duplicate_completion { 2 } else { 1 };
            for _ in 0..repeats {
                let event = match &self.script.completion {
                    Some(Ok((hub_uri, device_id))) => RegistrationEvent::Complete(Ok(Assignment {
                        hub_uri: hub_uri.as_str(),
                        device_id: device_id.as_str(),
                    })),
                    Some(Err(result)) => RegistrationEvent::Complete(Err(*result)),
                    None => return Ok(()),
                };
                events(event);
            }
        }
        Ok(())
    }

    fn destroy(self) {
        self.journal.record("provisioning.destroy");
    }
}

pub struct MockProvisioningFactory {
    journal: Journal,
    script: Option<ProvisioningScript>,
    polls: Rc<Cell<u32>>,
}

impl ProvisioningFactory for MockProvisioningFactory {
    type Client = ScriptedProvisioning;

    fn create(
        &mut self,
        endpoint: &str,
        id_scope: &str,
        _transport: TransportProtocol,
    ) -> Option<ScriptedProvisioning> {
        self.journal
            .record(&std::format!("provisioning.create:{}:{}", endpoint, id_scope));
        let script = self.script.clone()?;
        Some(ScriptedProvisioning {
            journal: self.journal.clone(),
            script,
            polls: self.polls.clone(),
        })
    }

    fn version(&self) -> &str {
        "mock-provisioning/1.0"
    }
}

/// Scripted hub behavior, counted in polls starting at 1
#[derive(Clone, Debug, Default)]
pub struct HubScript {
    pub connect_on_poll: Option<u32>,
    pub disconnect_on_poll: Option<u32>,
    pub inbound_on_poll: Option<u32>,
    pub reject_sends: bool,
    pub reject_inbound: bool,
}

impl HubScript {
    pub fn connect_on(poll: u32) -> Self {
        Self {
            connect_on_poll: Some(poll),
            ..Self::default()
        }
    }
}

/// One payload accepted by the mock device client
#[derive(Clone, Debug)]
pub struct SentEvent {
    /// Polls completed before the send
    pub after_polls: u32,
    pub at_ms: u64,
    pub payload: String,
}

#[derive(Clone, Default)]
pub struct HubProbe {
    polls: Rc<Cell<u32>>,
    sent: Rc<RefCell<Vec<SentEvent>>>,
    identity: Rc<RefCell<Option<(String, String)>>>,
}

impl HubProbe {
    pub fn polls(&self) -> u32 {
        self.polls.get()
    }

    pub fn sent(&self) -> Vec<SentEvent> {
        self.sent.borrow().clone()
    }

    /// Hub URI and device id the client was created for
    pub fn identity(&self) -> Option<(String, String)> {
        self.identity.borrow().clone()
    }
}

pub struct ScriptedHub {
    journal: Journal,
    script: HubScript,
    clock: Clock,
    probe: HubProbe,
    inbound_enabled: bool,
    unconfirmed: u32,
}

impl ScriptedHub {
    pub fn new(script: HubScript, clock: &Clock) -> (Self, HubProbe) {
        let probe = HubProbe::default();
        let client = Self {
            journal: Journal::default(),
            script,
            clock: clock.clone(),
            probe: probe.clone(),
            inbound_enabled: true,
            unconfirmed: 0,
        };
        (client, probe)
    }
}

impl DeviceClient for ScriptedHub {
    fn set_option(&mut self, option: ClientOption<'_>) -> Result<(), Failure> {
        self.journal
            .record(&std::format!("hub.option:{}", option.name()));
        Ok(())
    }

    fn enable_inbound_messages(&mut self) -> Result<(), Failure> {
        self.journal.record("hub.inbound");
        if self.script.reject_inbound {
            return Err(Failure::Transient(-2));
        }
        self.inbound_enabled = true;
        Ok(())
    }

    fn send_event_async(&mut self, payload: &[u8]) -> Result<(), Failure> {
        if self.script.reject_sends {
            self.journal.record("hub.send-rejected");
            return Err(Failure::Transient(-3));
        }
        self.journal.record("hub.send");
        self.unconfirmed += 1;
        self.probe.sent.borrow_mut().push(SentEvent {
            after_polls: self.probe.polls.get(),
            at_ms: self.clock.now(),
            payload: String::from_utf8_lossy(payload).into_owned(),
        });
        Ok(())
    }

    async fn do_work(&mut self, events: &mut dyn FnMut(HubEvent)) {
        let poll = self.probe.polls.get() + 1;
        self.probe.polls.set(poll);

        for _ in 0..core::mem::take(&mut self.unconfirmed) {
            events(HubEvent::SendConfirmation(SendResult::Ok));
        }
        if self.script.connect_on_poll == Some(poll) {
            events(HubEvent::ConnectionStatus(
                ConnectionStatus::Authenticated,
                ConnectionReason::Ok,
            ));
        }
        if self.script.disconnect_on_poll == Some(poll) {
            events(HubEvent::ConnectionStatus(
                ConnectionStatus::Unauthenticated,
                ConnectionReason::NoNetwork,
            ));
        }
        if self.inbound_enabled && self.script.inbound_on_poll == Some(poll) {
            events(HubEvent::Inbound);
        }
    }

    fn destroy(self) {
        self.journal.record("hub.destroy");
    }
}

pub struct MockHubFactory {
    journal: Journal,
    script: Option<HubScript>,
    clock: Clock,
    probe: HubProbe,
}

impl DeviceClientFactory for MockHubFactory {
    type Client = ScriptedHub;

    fn create_from_identity(
        &mut self,
        identity: &DeviceIdentity,
        _transport: TransportProtocol,
    ) -> Option<ScriptedHub> {
        self.journal.record("hub.create");
        let script = self.script.clone()?;
        *self.probe.identity.borrow_mut() = Some((
            identity.hub_uri().to_string(),
            identity.device_id().to_string(),
        ));
        Some(ScriptedHub {
            journal: self.journal.clone(),
            script,
            clock: self.clock.clone(),
            probe: self.probe.clone(),
            inbound_enabled: false,
            unconfirmed: 0,
        })
    }

    fn version(&self) -> &str {
        "mock-hub/1.0"
    }
}

pub struct MockPlatform;

impl Platform for MockPlatform {
    type Network = MockNetwork;
    type TimeSource = MockTimeSource;
    type Rtc = MockRtc;
    type Security = MockSecurity;
    type Provisioning = MockProvisioningFactory;
    type Hub = MockHubFactory;
    type Ticks = MockTicks;
    type Delay = MockDelay;
}

/// Everything a test inspects after a run
pub struct Probe {
    pub journal: Journal,
    pub clock: Clock,
    pub provisioning: ProvisioningProbe,
    pub hub: HubProbe,
}

/// Knobs for a complete mock bootstrap, defaulting to the happy path
pub struct Fixture {
    /// `None` means no interface at all
    pub network: Option<Result<(), LinkError>>,
    pub time: i64,
    pub rtc_fail_write: bool,
    pub security_init: Result<(), Failure>,
    /// `None` makes client creation fail
    pub provisioning: Option<ProvisioningScript>,
    /// `None` makes client creation fail
    pub hub: Option<HubScript>,
    pub config: BootstrapConfig,
}

impl Fixture {
    pub fn new() -> Self {
        let mut config = BootstrapConfig::new(
            SecurityKind::SymmetricKey {
                registration_id: "dev-01",
                key: "c2VjcmV0",
            },
            "0ne00000001",
        );
        config.provisioning.max_polls = Some(50);
        Self {
            network: Some(Ok(())),
            time: EPOCH_2024,
            rtc_fail_write: false,
            security_init: Ok(()),
            provisioning: Some(ProvisioningScript::assign_after(2)),
            hub: Some(HubScript::connect_on(3)),
            config,
        }
    }

    pub fn build(&self) -> (Bootstrap<MockPlatform>, Probe) {
        let journal = Journal::default();
        let clock = Clock::new();
        let provisioning = ProvisioningProbe::default();
        let hub = HubProbe::default();

        let network = self.network.map(|connect| MockNetwork {
            journal: journal.clone(),
            connect,
        });
        let services = Services::<MockPlatform> {
            time_source: MockTimeSource {
                journal: journal.clone(),
                value: self.time,
            },
            rtc: MockRtc {
                journal: journal.clone(),
                stored: None,
                fail_write: self.rtc_fail_write,
            },
            security: MockSecurity {
                journal: journal.clone(),
                init: self.security_init,
            },
            provisioning: MockProvisioningFactory {
                journal: journal.clone(),
                script: self.provisioning.clone(),
                polls: provisioning.polls.clone(),
            },
            hub: MockHubFactory {
                journal: journal.clone(),
                script: self.hub.clone(),
                clock: clock.clone(),
                probe: hub.clone(),
            },
            ticks: clock.ticks(),
            delay: clock.delay(),
        };

        let bootstrap = Bootstrap::new(self.config, network, services);
        let probe = Probe {
            journal,
            clock,
            provisioning,
            hub,
        };
        (bootstrap, probe)
    }
}
