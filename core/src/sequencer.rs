//! Bootstrap sequencer
//!
//! Runs the stages in strict order, stops at the first fatal error, and
//! releases everything it acquired on every exit path:
//!
//! 1. acquire-network
//! 2. synchronize-clock
//! 3. initialize-security-context
//! 4. provision-identity
//! 5. establish-telemetry-session
//! 6. run-steady-state-loop (including the drain)
//! 7. release-all
//!
//! Release runs at the end of [`Bootstrap::run`] and again from `Drop`; the
//! second call is a no-op, so each handle is released exactly once.

use hal_abstractions::{NetworkInterface, RealTimeClock, TimeSource, Timestamp};
use heapless::Vec;

use crate::config::{BootstrapConfig, SecurityInitPolicy, SecurityKind};
use crate::context::{BootstrapContext, DeviceIdentity};
use crate::error::{BootstrapError, Failure};
use crate::hub::{ClientOption, DeviceClient, DeviceClientFactory};
use crate::platform::{DeviceClientOf, Platform, ProvisioningClientOf, Services};
use crate::provisioning::{drive_registration, ProvisioningClient, ProvisioningFactory};
use crate::security::SecurityModule;
use crate::stage::{BootstrapState, Stage};
use crate::telemetry::{LoopExit, TelemetrySession};

/// Result of a completed run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RunSummary {
    pub exit: LoopExit,
    /// Send attempts, i.e. the final sequence counter
    pub attempted: u32,
    /// Sends the device client accepted
    pub accepted: u32,
}

/// Log a non-critical option failure and carry on
fn option_result(client: &str, option: ClientOption<'_>, result: Result<(), Failure>) {
    if let Err(e) = result {
        warn!("{}: failed to set option {}: {:?}", client, option.name(), e);
    }
}

/// One-shot bootstrap sequence for a single process lifetime
pub struct Bootstrap<P: Platform> {
    config: BootstrapConfig,
    ctx: BootstrapContext<P::Network>,
    services: Services<P>,
    provisioning: Option<ProvisioningClientOf<P>>,
    session: Option<TelemetrySession<DeviceClientOf<P>>>,
    security_active: bool,
}

impl<P: Platform> Bootstrap<P> {
    /// `network` is the board's default interface, or `None` if it has none
    pub fn new(config: BootstrapConfig, network: Option<P::Network>, services: Services<P>) -> Self {
        Self {
            config,
            ctx: BootstrapContext::new(network),
            services,
            provisioning: None,
            session: None,
            security_active: false,
        }
    }

    pub fn state(&self) -> BootstrapState {
        self.ctx.state
    }

    pub fn context(&self) -> &BootstrapContext<P::Network> {
        &self.ctx
    }

    pub fn services(&self) -> &Services<P> {
        &self.services
    }

    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    /// Execute the whole sequence once
    ///
    /// Resources are released before this returns, whatever the outcome.
    pub async fn run(&mut self) -> Result<RunSummary, BootstrapError> {
        let result = self.execute().await;

        match &result {
            Ok(summary) => info!(
                "Bootstrap finished: {:?}, {} attempted, {} accepted",
                summary.exit, summary.attempted, summary.accepted
            ),
            Err(e) => {
                error!("Bootstrap aborted: {:?}", e);
                self.abort_open_stages();
                if self.ctx.state.transition(BootstrapState::Failed).is_err() {
                    debug!("State {:?} cannot move to Failed", self.ctx.state);
                }
            }
        }

        self.release_all();
        result
    }

    async fn execute(&mut self) -> Result<RunSummary, BootstrapError> {
        self.acquire_network().await?;
        self.synchronize_clock().await?;
        self.initialize_security()?;
        self.provision_identity().await?;
        self.establish_session()?;
        self.run_steady_state().await
    }

    fn enter(&mut self, stage: Stage) -> Result<(), BootstrapError> {
        self.ctx.stages.begin(stage)?;
        debug!("Stage {} started", stage.as_str());
        Ok(())
    }

    /// Record the stage outcome and, on success, move the state machine
    fn complete<T>(
        &mut self,
        stage: Stage,
        next: BootstrapState,
        result: Result<T, BootstrapError>,
    ) -> Result<T, BootstrapError> {
        self.ctx.stages.finish(stage, result.is_ok())?;
        let value = result?;
        self.ctx.state.transition(next)?;
        debug!("Stage {} succeeded", stage.as_str());
        Ok(value)
    }

    fn abort_open_stages(&mut self) {
        let open: Vec<Stage, { Stage::COUNT }> = self.ctx.stages.in_progress().collect();
        for stage in open {
            warn!("Stage {} aborted", stage.as_str());
            let _ = self.ctx.stages.finish(stage, false);
        }
    }

    async fn acquire_network(&mut self) -> Result<(), BootstrapError> {
        self.enter(Stage::AcquireNetwork)?;
        info!("Connecting to the network");

        let result = match self.ctx.network.as_mut() {
            None => {
                error!("No network interface found");
                Err(BootstrapError::NoNetworkInterface)
            }
            Some(network) => match network.connect().await {
                Ok(()) => {
                    info!("Connection success, MAC: {}", network.mac_address());
                    Ok(())
                }
                Err(e) => {
                    error!("Connection error: {}", e.code);
                    Err(BootstrapError::from(e))
                }
            },
        };

        self.complete(Stage::AcquireNetwork, BootstrapState::NetworkReady, result)
    }

    async fn synchronize_clock(&mut self) -> Result<(), BootstrapError> {
        self.enter(Stage::SynchronizeClock)?;
        let result = self.query_time().await;
        self.complete(Stage::SynchronizeClock, BootstrapState::ClockSynced, result)
    }

    async fn query_time(&mut self) -> Result<(), BootstrapError> {
        let server = self.config.time.server;
        let port = self.config.time.port;
        let network = self
            .ctx
            .network
            .as_ref()
            .ok_or(BootstrapError::NoNetworkInterface)?;

        info!("Getting time from the NTP server {}:{}", server, port);
        let secs = self
            .services
            .time_source
            .get_timestamp(network, server, port)
            .await;
        let timestamp = Timestamp::from_query(secs).ok_or_else(|| {
            error!("Failed to get the current time, error: {}", secs);
            BootstrapError::ClockSync(secs)
        })?;
        info!("Time: {} UTC", timestamp.unix_secs);

        self.services.rtc.write(timestamp).map_err(|e| {
            error!("RTC write failed: {:?}", e);
            BootstrapError::RtcWrite(e)
        })?;
        // Read-back is a sanity check only
        match self.services.rtc.read() {
            Ok(rtc) => info!("RTC reports {} UTC", rtc.unix_secs),
            Err(e) => warn!("RTC read-back failed: {:?}", e),
        }

        self.ctx.timestamp = Some(timestamp);
        Ok(())
    }

    fn initialize_security(&mut self) -> Result<(), BootstrapError> {
        self.enter(Stage::InitializeSecurity)?;
        let result = self.init_security_module();
        self.ctx
            .stages
            .finish(Stage::InitializeSecurity, result.is_ok())?;

        if let Err(e) = result {
            match self.config.security_init {
                SecurityInitPolicy::Abort => return Err(e),
                SecurityInitPolicy::Continue => {
                    warn!("Security init failed, continuing: {:?}", e);
                }
            }
        }
        self.ctx.state.transition(BootstrapState::SecurityReady)
    }

    fn init_security_module(&mut self) -> Result<(), BootstrapError> {
        let kind = self.config.security;
        info!("Initializing security module: {:?}", kind.device_type());

        self.services
            .security
            .init(kind.device_type())
            .map_err(BootstrapError::SecurityInit)?;
        self.security_active = true;

        if let SecurityKind::SymmetricKey {
            registration_id,
            key,
        } = kind
        {
            self.services
                .security
                .set_symmetric_key(registration_id, key)
                .map_err(BootstrapError::SecurityInit)?;
        }
        Ok(())
    }

    async fn provision_identity(&mut self) -> Result<(), BootstrapError> {
        self.enter(Stage::ProvisionIdentity)?;
        let result = match self.register_device().await {
            Ok(identity) => {
                self.ctx.identity = Some(identity);
                Ok(())
            }
            Err(e) => Err(e),
        };
        self.complete(Stage::ProvisionIdentity, BootstrapState::Provisioned, result)
    }

    async fn register_device(&mut self) -> Result<DeviceIdentity, BootstrapError> {
        let cfg = self.config.provisioning;
        info!(
            "Provisioning API Version: {}",
            self.services.provisioning.version()
        );
        info!("Hub API Version: {}", self.services.hub.version());

        let client = self
            .services
            .provisioning
            .create(cfg.endpoint, cfg.id_scope, cfg.transport)
            .ok_or_else(|| {
                error!("Failed creating provisioning client for {}", cfg.endpoint);
                BootstrapError::ProvisioningCreate
            })?;
        let client = self.provisioning.insert(client);

        let trace = ClientOption::LogTrace(cfg.trace);
        option_result("provisioning", trace, client.set_option(trace));
        if let Some(certs) = cfg.trusted_certs {
            let option = ClientOption::TrustedCerts(certs);
            option_result("provisioning", option, client.set_option(option));
        }
        if let Some(registration_id) = cfg.registration_id_override {
            let option = ClientOption::RegistrationId(registration_id);
            option_result("provisioning", option, client.set_option(option));
        }

        client.register().map_err(|e| {
            error!("Registration request failed: {:?}", e);
            BootstrapError::ProvisioningRegister(e)
        })?;

        drive_registration(
            client,
            &mut self.services.delay,
            cfg.poll_interval_ms,
            cfg.max_polls,
        )
        .await
    }

    fn establish_session(&mut self) -> Result<(), BootstrapError> {
        self.enter(Stage::EstablishSession)?;
        let result = self.open_session();
        self.complete(Stage::EstablishSession, BootstrapState::SessionActive, result)
    }

    fn open_session(&mut self) -> Result<(), BootstrapError> {
        let cfg = self.config.hub;
        let identity = self
            .ctx
            .identity
            .as_ref()
            .ok_or(BootstrapError::InvalidTransition)?;

        info!("Creating device client for {}", identity.device_id());
        let mut client = self
            .services
            .hub
            .create_from_identity(identity, cfg.transport)
            .ok_or_else(|| {
                error!("Failed to create device client for {}", identity.hub_uri());
                BootstrapError::HubCreate
            })?;

        let trace = ClientOption::LogTrace(cfg.trace);
        option_result("device", trace, client.set_option(trace));
        if let Some(certs) = cfg.trusted_certs {
            let option = ClientOption::TrustedCerts(certs);
            option_result("device", option, client.set_option(option));
        }
        if let Err(e) = client.enable_inbound_messages() {
            warn!("Inbound messages unavailable: {:?}", e);
        }

        self.session = Some(TelemetrySession::new(client));
        Ok(())
    }

    async fn run_steady_state(&mut self) -> Result<RunSummary, BootstrapError> {
        self.enter(Stage::SteadyState)?;
        let telemetry = self.config.telemetry;

        let session = match self.session.as_mut() {
            Some(session) => session,
            None => {
                self.ctx.stages.finish(Stage::SteadyState, false)?;
                return Err(BootstrapError::InvalidTransition);
            }
        };

        let exit = session
            .run_until_done(&self.services.ticks, &mut self.services.delay, &telemetry)
            .await;
        info!("Telemetry loop ended: {:?}", exit);

        self.ctx.state.transition(BootstrapState::Draining)?;
        session.drain(&mut self.services.delay, &telemetry).await;

        let summary = RunSummary {
            exit,
            attempted: session.sequence(),
            accepted: session.accepted(),
        };
        self.ctx.stages.finish(Stage::SteadyState, true)?;
        Ok(summary)
    }

    /// Release everything acquired so far, in reverse acquisition order
    ///
    /// Idempotent: only the first call does anything.
    pub fn release_all(&mut self) {
        // A dropped `run` future can leave its stage open
        self.abort_open_stages();
        if self.ctx.stages.begin(Stage::Release).is_err() {
            return;
        }
        info!("Releasing bootstrap resources");

        if let Some(session) = self.session.take() {
            debug!("Destroying device client");
            session.release();
        }
        if let Some(client) = self.provisioning.take() {
            debug!("Destroying provisioning client");
            client.destroy();
        }
        if core::mem::take(&mut self.security_active) {
            debug!("Deinitializing security module");
            self.services.security.deinit();
        }
        if self.ctx.identity.take().is_some() {
            debug!("Cleared provisioned identity");
        }

        let _ = self.ctx.stages.finish(Stage::Release, true);
        if !self.ctx.state.can_transition(BootstrapState::Released) {
            let _ = self.ctx.state.transition(BootstrapState::Failed);
        }
        let _ = self.ctx.state.transition(BootstrapState::Released);
    }
}

impl<P: Platform> Drop for Bootstrap<P> {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Fixture, HubScript, ProvisioningScript, EPOCH_2024};
    use crate::provisioning::ProvisioningResult;
    use crate::stage::StageOutcome;
    use embassy_futures::block_on;
    use hal_abstractions::{LinkError, RtcError};

    fn assert_order(journal: &crate::mock::Journal, entries: &[&str]) {
        let positions: std::vec::Vec<usize> = entries
            .iter()
            .map(|e| {
                journal
                    .position(e)
                    .unwrap_or_else(|| panic!("missing {e} in {:?}", journal.entries()))
            })
            .collect();
        assert!(
            positions.windows(2).all(|w| w[0] < w[1]),
            "out of order: {:?}",
            journal.entries()
        );
    }

    #[test]
    fn test_happy_path() {
        let (mut bootstrap, probe) = Fixture::new().build();

        let summary = block_on(bootstrap.run()).unwrap();
        assert_eq!(
            summary,
            RunSummary {
                exit: LoopExit::MessageLimit,
                attempted: 2,
                accepted: 2,
            }
        );
        assert_eq!(bootstrap.state(), BootstrapState::Released);
        for stage in Stage::ALL {
            assert_eq!(
                bootstrap.context().stages().outcome(stage),
                StageOutcome::Succeeded,
                "{}",
                stage.as_str()
            );
        }

        assert_order(
            &probe.journal,
            &[
                "network.connect",
                "time.query:time.google.com:123",
                "rtc.write",
                "rtc.read",
                "security.init:SymmetricKey",
                "security.key:dev-01",
                "provisioning.create:global.azure-devices-provisioning.net:0ne00000001",
                "provisioning.register",
                "hub.create",
                "hub.inbound",
                "hub.send",
                "hub.destroy",
                "provisioning.destroy",
                "security.deinit",
            ],
        );
        assert_eq!(probe.journal.count("hub.send"), 2);

        assert_eq!(
            bootstrap.context().timestamp().map(|t| t.unix_secs),
            Some(EPOCH_2024 as u64)
        );
        assert!(bootstrap.context().identity().is_none());
        assert_eq!(
            probe.hub.identity(),
            Some((String::from("hub-01.example.net"), String::from("dev-01")))
        );
        assert_eq!(probe.provisioning.polls(), 3);

        let sent = probe.hub.sent();
        assert!(sent[1].at_ms >= sent[0].at_ms + 2_000);
        assert_eq!(probe.hub.polls(), sent[1].after_polls + 1 + 10);
    }

    #[test]
    fn test_no_network_interface() {
        let mut fixture = Fixture::new();
        fixture.network = None;
        let (mut bootstrap, probe) = fixture.build();

        assert_eq!(
            block_on(bootstrap.run()),
            Err(BootstrapError::NoNetworkInterface)
        );
        assert_eq!(bootstrap.state(), BootstrapState::Released);
        let stages = bootstrap.context().stages();
        assert_eq!(stages.outcome(Stage::AcquireNetwork), StageOutcome::Failed);
        assert_eq!(stages.outcome(Stage::SynchronizeClock), StageOutcome::NotStarted);
        assert_eq!(stages.outcome(Stage::Release), StageOutcome::Succeeded);
        assert!(probe.journal.entries().is_empty());
    }

    #[test]
    fn test_network_connect_failure() {
        let mut fixture = Fixture::new();
        fixture.network = Some(Err(LinkError::new(-5)));
        let (mut bootstrap, probe) = fixture.build();

        assert_eq!(
            block_on(bootstrap.run()),
            Err(BootstrapError::NetworkConnect(LinkError::new(-5)))
        );
        assert_eq!(probe.journal.entries(), ["network.connect"]);
    }

    #[test]
    fn test_clock_sync_failure_skips_later_stages() {
        let mut fixture = Fixture::new();
        fixture.time = -3001;
        let (mut bootstrap, probe) = fixture.build();

        let err = block_on(bootstrap.run()).unwrap_err();
        assert_eq!(err, BootstrapError::ClockSync(-3001));
        assert_eq!(
            std::format!("{}", err),
            "Failed to get the current time, error: -3001"
        );
        assert!(bootstrap.context().timestamp().is_none());
        assert_eq!(probe.journal.count("time.query:time.google.com:123"), 1);
        assert!(!probe.journal.contains("rtc.write"));
        assert!(!probe.journal.contains("security.init:SymmetricKey"));
        assert!(!probe.journal.contains("security.deinit"));
    }

    #[test]
    fn test_rtc_write_failure() {
        let mut fixture = Fixture::new();
        fixture.rtc_fail_write = true;
        let (mut bootstrap, probe) = fixture.build();

        assert_eq!(
            block_on(bootstrap.run()),
            Err(BootstrapError::RtcWrite(RtcError::HardwareError))
        );
        assert!(!probe.journal.contains("rtc.read"));
    }

    #[test]
    fn test_security_failure_aborts_by_default() {
        let mut fixture = Fixture::new();
        fixture.security_init = Err(Failure::Fatal(-1));
        let (mut bootstrap, probe) = fixture.build();

        assert_eq!(
            block_on(bootstrap.run()),
            Err(BootstrapError::SecurityInit(Failure::Fatal(-1)))
        );
        assert_eq!(
            bootstrap.context().stages().outcome(Stage::InitializeSecurity),
            StageOutcome::Failed
        );
        assert!(!probe.journal.contains("provisioning.register"));
        // Nothing to tear down when init never succeeded
        assert_eq!(probe.journal.count("security.deinit"), 0);
    }

    #[test]
    fn test_security_failure_can_continue() {
        let mut fixture = Fixture::new();
        fixture.security_init = Err(Failure::Fatal(-1));
        fixture.config.security_init = SecurityInitPolicy::Continue;
        let (mut bootstrap, probe) = fixture.build();

        assert!(block_on(bootstrap.run()).is_ok());
        assert_eq!(
            bootstrap.context().stages().outcome(Stage::InitializeSecurity),
            StageOutcome::Failed
        );
        assert_eq!(probe.journal.count("hub.send"), 2);
        assert_eq!(probe.journal.count("security.deinit"), 0);
    }

    #[test]
    fn test_provisioning_create_failure() {
        let mut fixture = Fixture::new();
        fixture.provisioning = None;
        let (mut bootstrap, probe) = fixture.build();

        assert_eq!(
            block_on(bootstrap.run()),
            Err(BootstrapError::ProvisioningCreate)
        );
        assert_eq!(probe.journal.count("security.deinit"), 1);
        assert!(!probe.journal.contains("provisioning.destroy"));
        assert!(!probe.journal.contains("hub.create"));
    }

    #[test]
    fn test_register_failure_releases_client() {
        let mut fixture = Fixture::new();
        let mut script = ProvisioningScript::assign_after(2);
        script.register = Err(Failure::Fatal(-9));
        fixture.provisioning = Some(script);
        let (mut bootstrap, probe) = fixture.build();

        assert_eq!(
            block_on(bootstrap.run()),
            Err(BootstrapError::ProvisioningRegister(Failure::Fatal(-9)))
        );
        assert_eq!(probe.provisioning.polls(), 0);
        assert_eq!(probe.journal.count("provisioning.destroy"), 1);
        assert_eq!(probe.journal.count("security.deinit"), 1);
    }

    #[test]
    fn test_registration_failure() {
        let mut fixture = Fixture::new();
        fixture.provisioning = Some(ProvisioningScript::fail_after(
            1,
            ProvisioningResult::DeviceNotFound,
        ));
        let (mut bootstrap, probe) = fixture.build();

        let err = block_on(bootstrap.run()).unwrap_err();
        assert_eq!(
            err,
            BootstrapError::RegistrationFailed(ProvisioningResult::DeviceNotFound)
        );
        assert_eq!(
            std::format!("{}", err),
            "Registration failed: device not found"
        );
        assert_eq!(bootstrap.state(), BootstrapState::Released);
        assert!(bootstrap.context().identity().is_none());
        assert!(!probe.journal.contains("hub.create"));
        assert_order(
            &probe.journal,
            &["provisioning.destroy", "security.deinit"],
        );
    }

    #[test]
    fn test_registration_poll_budget() {
        let mut fixture = Fixture::new();
        fixture.provisioning = Some(ProvisioningScript::silent());
        fixture.config.provisioning.max_polls = Some(20);
        let (mut bootstrap, probe) = fixture.build();

        assert_eq!(
            block_on(bootstrap.run()),
            Err(BootstrapError::RegistrationTimeout(20))
        );
        assert_eq!(probe.provisioning.polls(), 20);
        assert_eq!(probe.clock.now(), 20 * 10);
    }

    #[test]
    fn test_duplicate_completion_keeps_first() {
        let mut fixture = Fixture::new();
        let mut script = ProvisioningScript::assign_after(1);
        script.duplicate_completion = true;
        fixture.provisioning = Some(script);
        let (mut bootstrap, probe) = fixture.build();

        assert!(block_on(bootstrap.run()).is_ok());
        assert_eq!(probe.provisioning.polls(), 2);
        assert_eq!(probe.journal.count("hub.create"), 1);
    }

    #[test]
    fn test_client_options_are_applied() {
        let mut fixture = Fixture::new();
        let mut script = ProvisioningScript::assign_after(0);
        script.reject_options = true;
        fixture.provisioning = Some(script);
        fixture.config.provisioning.trusted_certs = Some("-----BEGIN CERTIFICATE-----");
        fixture.config.provisioning.registration_id_override = Some("dev-override");
        fixture.config.hub.trusted_certs = Some("-----BEGIN CERTIFICATE-----");
        let (mut bootstrap, probe) = fixture.build();

        // Rejected options are informational only
        assert!(block_on(bootstrap.run()).is_ok());
        assert_order(
            &probe.journal,
            &[
                "provisioning.option:logtrace",
                "provisioning.option:TrustedCerts",
                "provisioning.option:registration_id",
                "provisioning.register",
                "hub.option:logtrace",
                "hub.option:TrustedCerts",
            ],
        );
    }

    #[test]
    fn test_hub_create_failure() {
        let mut fixture = Fixture::new();
        fixture.hub = None;
        let (mut bootstrap, probe) = fixture.build();

        assert_eq!(block_on(bootstrap.run()), Err(BootstrapError::HubCreate));
        assert!(!probe.journal.contains("hub.destroy"));
        assert_eq!(probe.journal.count("provisioning.destroy"), 1);
        assert_eq!(probe.journal.count("security.deinit"), 1);
    }

    #[test]
    fn test_inbound_disabled_still_runs() {
        let mut fixture = Fixture::new();
        fixture.hub = Some(HubScript {
            reject_inbound: true,
            inbound_on_poll: Some(4),
            ..HubScript::connect_on(1)
        });
        let (mut bootstrap, _probe) = fixture.build();

        // Inbound never delivered, so the loop runs to the message limit
        let summary = block_on(bootstrap.run()).unwrap();
        assert_eq!(summary.exit, LoopExit::MessageLimit);
    }

    #[test]
    fn test_inbound_message_ends_loop_early() {
        let mut fixture = Fixture::new();
        fixture.hub = Some(HubScript {
            inbound_on_poll: Some(10),
            ..HubScript::connect_on(1)
        });
        fixture.config.telemetry.max_messages = 100;
        let (mut bootstrap, probe) = fixture.build();

        let summary = block_on(bootstrap.run()).unwrap();
        assert_eq!(summary.exit, LoopExit::StopRequested);
        assert_eq!(summary.attempted, 1);
        assert_eq!(probe.hub.polls(), 10 + 10);
        assert_eq!(probe.journal.count("hub.destroy"), 1);
    }

    #[test]
    fn test_connection_loss_drains_and_releases() {
        let mut fixture = Fixture::new();
        fixture.hub = Some(HubScript {
            disconnect_on_poll: Some(5),
            ..HubScript::connect_on(1)
        });
        let (mut bootstrap, probe) = fixture.build();

        let summary = block_on(bootstrap.run()).unwrap();
        assert_eq!(summary.exit, LoopExit::StopRequested);
        assert_eq!(probe.hub.polls(), 5 + 10);
        assert_eq!(bootstrap.state(), BootstrapState::Released);
    }

    #[test]
    fn test_deadline_exit() {
        let mut fixture = Fixture::new();
        fixture.hub = Some(HubScript::default());
        fixture.config.telemetry.deadline_ms = Some(50);
        let (mut bootstrap, probe) = fixture.build();

        let summary = block_on(bootstrap.run()).unwrap();
        assert_eq!(summary.exit, LoopExit::Deadline);
        assert_eq!(summary.attempted, 0);
        assert!(probe.hub.sent().is_empty());
    }

    #[test]
    fn test_release_happens_once() {
        let (mut bootstrap, probe) = Fixture::new().build();

        assert!(block_on(bootstrap.run()).is_ok());
        bootstrap.release_all();
        drop(bootstrap);

        assert_eq!(probe.journal.count("hub.destroy"), 1);
        assert_eq!(probe.journal.count("provisioning.destroy"), 1);
        assert_eq!(probe.journal.count("security.deinit"), 1);
    }

    #[test]
    fn test_run_is_one_shot() {
        let (mut bootstrap, probe) = Fixture::new().build();

        assert!(block_on(bootstrap.run()).is_ok());
        assert_eq!(
            block_on(bootstrap.run()),
            Err(BootstrapError::StageReentered(Stage::AcquireNetwork))
        );
        assert_eq!(probe.journal.count("network.connect"), 1);
        assert_eq!(bootstrap.state(), BootstrapState::Released);
    }

    #[test]
    fn test_release_without_run() {
        let (mut bootstrap, probe) = Fixture::new().build();

        bootstrap.release_all();
        assert_eq!(bootstrap.state(), BootstrapState::Released);
        assert!(probe.journal.entries().is_empty());
    }

    #[test]
    fn test_release_closes_interrupted_stage() {
        let (mut bootstrap, probe) = Fixture::new().build();

        // As if the run future was dropped while connecting
        bootstrap.enter(Stage::AcquireNetwork).unwrap();
        bootstrap.release_all();

        let stages = bootstrap.context().stages();
        assert_eq!(stages.outcome(Stage::AcquireNetwork), StageOutcome::Failed);
        assert_eq!(stages.outcome(Stage::Release), StageOutcome::Succeeded);
        assert_eq!(stages.in_progress().count(), 0);
        assert_eq!(bootstrap.state(), BootstrapState::Released);
        assert!(probe.journal.entries().is_empty());
    }
}
