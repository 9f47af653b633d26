//! Provisioning client seam and the registration poll driver
//!
//! The provisioning engine itself is external. This module defines what the
//! sequencer needs from it and turns its callback-on-poll design into an
//! explicit poll-until-ready loop:
//!
//! - [`ProvisioningClient::do_work`] drives the client one step and reports
//!   what happened through an event sink (the status and completion callbacks)
//! - [`Registration`] is the readiness object the sink writes into
//! - [`drive_registration`] polls until [`Registration::is_complete`]

use embedded_hal_async::delay::DelayNs;

use crate::config::TransportProtocol;
use crate::context::DeviceIdentity;
use crate::error::{BootstrapError, Failure};
use crate::hub::ClientOption;

/// Progress reported while a registration is in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegistrationStatus {
    Connected,
    Registering,
    Assigning,
}

impl RegistrationStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Registering => "registering",
            Self::Assigning => "assigning",
        }
    }
}

/// Failure reported by the registration completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProvisioningResult {
    InvalidArg,
    Memory,
    Parsing,
    Transport,
    InvalidResponse,
    DeviceNotFound,
    Disabled,
    Timeout,
    HubNotSpecified,
    KeyError,
    Error,
}

impl ProvisioningResult {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArg => "invalid argument",
            Self::Memory => "out of memory",
            Self::Parsing => "parse error",
            Self::Transport => "transport error",
            Self::InvalidResponse => "invalid response",
            Self::DeviceNotFound => "device not found",
            Self::Disabled => "enrollment disabled",
            Self::Timeout => "timeout",
            Self::HubNotSpecified => "hub not specified",
            Self::KeyError => "key error",
            Self::Error => "error",
        }
    }
}

/// Hub and device id assigned by the service, borrowed from the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment<'a> {
    pub hub_uri: &'a str,
    pub device_id: &'a str,
}

/// What a provisioning poll can report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationEvent<'a> {
    /// Informational progress update
    Status(RegistrationStatus),
    /// Registration finished, successfully or not
    Complete(Result<Assignment<'a>, ProvisioningResult>),
}

/// Creates provisioning clients bound to a transport
pub trait ProvisioningFactory {
    type Client: ProvisioningClient;

    /// `None` when the client cannot be created
    fn create(
        &mut self,
        endpoint: &str,
        id_scope: &str,
        transport: TransportProtocol,
    ) -> Option<Self::Client>;

    fn version(&self) -> &str;
}

/// Cooperative provisioning client
///
/// Nothing happens in the background: callbacks only fire from inside
/// [`do_work`](ProvisioningClient::do_work).
pub trait ProvisioningClient {
    fn set_option(&mut self, option: ClientOption<'_>) -> Result<(), Failure>;

    /// Issue the asynchronous registration request
    fn register(&mut self) -> Result<(), Failure>;

    /// Drive the client one step, reporting events to `events`
    fn do_work(
        &mut self,
        events: &mut dyn FnMut(RegistrationEvent<'_>),
    ) -> impl core::future::Future<Output = Result<(), Failure>>;

    /// Release the client handle
    fn destroy(self);
}

/// Outcome slot of one registration request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Pending,
    Assigned(DeviceIdentity),
    Failed(BootstrapError),
}

/// Readiness object written by the registration callbacks
#[derive(Debug)]
pub struct Registration {
    outcome: RegistrationOutcome,
    last_status: Option<RegistrationStatus>,
    completions: u32,
}

impl Registration {
    pub const fn new() -> Self {
        Self {
            outcome: RegistrationOutcome::Pending,
            last_status: None,
            completions: 0,
        }
    }

    pub fn is_complete(&self) -> bool {
        !matches!(self.outcome, RegistrationOutcome::Pending)
    }

    pub fn outcome(&self) -> &RegistrationOutcome {
        &self.outcome
    }

    pub fn last_status(&self) -> Option<RegistrationStatus> {
        self.last_status
    }

    /// Number of completion callbacks seen, including ignored duplicates
    pub fn completions(&self) -> u32 {
        self.completions
    }

    /// Apply one event. Only the first completion is honoured.
    pub fn handle(&mut self, event: RegistrationEvent<'_>) {
        match event {
            RegistrationEvent::Status(status) => {
                info!("Provisioning Status: {}", status.as_str());
                self.last_status = Some(status);
            }
            RegistrationEvent::Complete(result) => {
                self.completions += 1;
                if self.is_complete() {
                    warn!("Duplicate registration completion ignored");
                    return;
                }
                self.outcome = match result {
                    Ok(assignment) => {
                        info!(
                            "Registration Information received from service: {}",
                            assignment.hub_uri
                        );
                        match DeviceIdentity::new(assignment.hub_uri, assignment.device_id) {
                            Ok(identity) => RegistrationOutcome::Assigned(identity),
                            Err(e) => {
                                error!("Assigned identity rejected: {:?}", e);
                                RegistrationOutcome::Failed(e)
                            }
                        }
                    }
                    Err(result) => {
                        error!("Failure encountered on registration {}", result.as_str());
                        RegistrationOutcome::Failed(BootstrapError::RegistrationFailed(result))
                    }
                };
            }
        }
    }

    pub fn into_result(self) -> Option<Result<DeviceIdentity, BootstrapError>> {
        match self.outcome {
            RegistrationOutcome::Pending => None,
            RegistrationOutcome::Assigned(identity) => Some(Ok(identity)),
            RegistrationOutcome::Failed(e) => Some(Err(e)),
        }
    }
}

impl Default for Registration {
    fn default() -> Self {
        Self::new()
    }
}

/// Poll `client` until its registration completes
///
/// Each iteration services the client once and then sleeps
/// `poll_interval_ms`. With `max_polls == None` this waits for the completion
/// callback indefinitely; an unresponsive service stalls the caller.
pub async fn drive_registration<C, D>(
    client: &mut C,
    delay: &mut D,
    poll_interval_ms: u32,
    max_polls: Option<u32>,
) -> Result<DeviceIdentity, BootstrapError>
where
    C: ProvisioningClient,
    D: DelayNs,
{
    let mut registration = Registration::new();
    let mut polls: u32 = 0;

    loop {
        if let Some(limit) = max_polls {
            if polls >= limit {
                error!("Registration still pending after {} polls", polls);
                return Err(BootstrapError::RegistrationTimeout(polls));
            }
        }

        let serviced = client
            .do_work(&mut |event: RegistrationEvent<'_>| registration.handle(event))
            .await;
        polls = polls.saturating_add(1);

        if let Err(failure) = serviced {
            if failure.is_fatal() {
                error!("Provisioning client failed: {:?}", failure);
                return Err(BootstrapError::ProvisioningTransport(failure));
            }
            debug!("Provisioning poll transient failure: {:?}", failure);
        }

        delay.delay_ms(poll_interval_ms).await;

        if registration.is_complete() {
            break;
        }
    }

    debug!("Registration complete after {} polls", polls);
    match registration.into_result() {
        Some(result) => result,
        None => Err(BootstrapError::InvalidTransition),
    }
}
