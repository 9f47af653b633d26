//! Device bootstrap sequence for cloud-connected firmware
//!
//! Brings a device from power-on to a live hub session: network, clock,
//! security, provisioning, then a bounded telemetry loop, and finally release
//! of every handle it acquired. Everything hardware- or service-specific sits
//! behind the traits in [`platform`], so the whole sequence runs on the host
//! under test.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]
#![deny(warnings)]

#[macro_use]
mod fmt;

pub mod config;
pub mod context;
pub mod error;
pub mod hub;
pub mod platform;
pub mod provisioning;
pub mod security;
pub mod sequencer;
pub mod stage;
pub mod telemetry;

#[cfg(test)]
mod mock;

pub use config::{
    BootstrapConfig, HubConfig, ProvisioningConfig, SecurityDeviceType, SecurityInitPolicy,
    SecurityKind, TelemetryConfig, TimeConfig, TransportProtocol,
};
pub use context::{BootstrapContext, DeviceIdentity};
pub use error::{BootstrapError, Failure};
pub use hub::{
    ClientOption, ConnectionReason, ConnectionStatus, DeviceClient, DeviceClientFactory, HubEvent,
    SendResult,
};
pub use platform::{Platform, Services};
pub use provisioning::{
    Assignment, ProvisioningClient, ProvisioningFactory, ProvisioningResult, RegistrationEvent,
    RegistrationStatus,
};
pub use security::SecurityModule;
pub use sequencer::{Bootstrap, RunSummary};
pub use stage::{BootstrapState, Stage, StageOutcome};
pub use telemetry::{format_payload, LoopExit, TelemetrySession};
