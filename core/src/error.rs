//! Error types for the bootstrap sequence

use core::fmt;

use hal_abstractions::{LinkError, RtcError};

use crate::provisioning::ProvisioningResult;
use crate::stage::Stage;

/// Failure of a call into an external collaborator
///
/// Success travels in `Result::Ok`; this is the other two arms of the
/// collaborator's tri-state result. The code is the collaborator's own status
/// value and is only meaningful for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Failure {
    /// Not ready yet or temporarily unavailable; polling may continue
    Transient(i32),
    /// The call cannot succeed
    Fatal(i32),
}

impl Failure {
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    pub const fn code(&self) -> i32 {
        match self {
            Self::Transient(code) | Self::Fatal(code) => *code,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient(code) => write!(f, "transient failure ({})", code),
            Self::Fatal(code) => write!(f, "fatal failure ({})", code),
        }
    }
}

impl core::error::Error for Failure {}

/// Fatal errors that abort the bootstrap sequence
///
/// Every variant sends the sequence to `Failed`; release still runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootstrapError {
    /// No default network interface was handed to the sequence
    NoNetworkInterface,
    /// Link bring-up returned a non-zero status
    NetworkConnect(LinkError),
    /// Time query returned a negative value
    ClockSync(i64),
    /// Writing the synchronized time to the RTC failed
    RtcWrite(RtcError),
    /// Security subsystem initialization failed under `SecurityInitPolicy::Abort`
    SecurityInit(Failure),
    /// Provisioning client could not be created
    ProvisioningCreate,
    /// Registration request was rejected before any polling
    ProvisioningRegister(Failure),
    /// Provisioning client reported a fatal error while polled
    ProvisioningTransport(Failure),
    /// Completion callback reported a failed registration
    RegistrationFailed(ProvisioningResult),
    /// Poll budget exhausted before completion
    RegistrationTimeout(u32),
    /// Assigned hub URI or device id does not fit the identity buffers
    IdentityTooLong,
    /// Device client could not be created from the provisioned identity
    HubCreate,
    /// State machine was asked for an illegal transition
    InvalidTransition,
    /// A stage was started after it already produced an outcome
    StageReentered(Stage),
}

impl fmt::Display for BootstrapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoNetworkInterface => write!(f, "No network interface found"),
            Self::NetworkConnect(e) => write!(f, "Connection error: {}", e.code),
            Self::ClockSync(code) => write!(f, "Failed to get the current time, error: {}", code),
            Self::RtcWrite(e) => write!(f, "RTC write failed: {}", e),
            Self::SecurityInit(e) => write!(f, "Security module init failed: {}", e),
            Self::ProvisioningCreate => write!(f, "Provisioning client creation failed"),
            Self::ProvisioningRegister(e) => write!(f, "Registration request failed: {}", e),
            Self::ProvisioningTransport(e) => write!(f, "Provisioning transport failed: {}", e),
            Self::RegistrationFailed(r) => write!(f, "Registration failed: {}", r.as_str()),
            Self::RegistrationTimeout(polls) => {
                write!(f, "Registration incomplete after {} polls", polls)
            }
            Self::IdentityTooLong => write!(f, "Assigned identity exceeds buffer capacity"),
            Self::HubCreate => write!(f, "Device client creation failed"),
            Self::InvalidTransition => write!(f, "Invalid state transition"),
            Self::StageReentered(stage) => write!(f, "Stage re-entered: {}", stage.as_str()),
        }
    }
}

impl core::error::Error for BootstrapError {}

impl From<LinkError> for BootstrapError {
    fn from(e: LinkError) -> Self {
        Self::NetworkConnect(e)
    }
}

impl From<RtcError> for BootstrapError {
    fn from(e: RtcError) -> Self {
        Self::RtcWrite(e)
    }
}
