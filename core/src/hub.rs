//! Device client seam for the message hub

use crate::config::TransportProtocol;
use crate::context::DeviceIdentity;
use crate::error::Failure;

/// Options accepted by both the provisioning and the device client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientOption<'a> {
    /// Enable protocol tracing
    LogTrace(bool),
    /// PEM bundle of trusted root certificates
    TrustedCerts(&'a str),
    /// Override the registration id held by the security module
    RegistrationId(&'a str),
}

impl ClientOption<'_> {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::LogTrace(_) => "logtrace",
            Self::TrustedCerts(_) => "TrustedCerts",
            Self::RegistrationId(_) => "registration_id",
        }
    }
}

/// Connection state reported by the device client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionStatus {
    Authenticated,
    Unauthenticated,
}

/// Why the connection state changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionReason {
    Ok,
    ExpiredSasToken,
    DeviceDisabled,
    BadCredential,
    RetryExpired,
    NoNetwork,
    CommunicationError,
    NoPingResponse,
}

/// Result delivered to the send-confirmation callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SendResult {
    Ok,
    BecauseDestroy,
    MessageTimeout,
    Error,
}

/// What a device client poll can report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HubEvent {
    ConnectionStatus(ConnectionStatus, ConnectionReason),
    /// Cloud-to-device message; content is not inspected
    Inbound,
    /// A previously accepted event finished transmission
    SendConfirmation(SendResult),
}

/// Creates device clients for a provisioned identity
pub trait DeviceClientFactory {
    type Client: DeviceClient;

    /// `None` when the client cannot be created
    fn create_from_identity(
        &mut self,
        identity: &DeviceIdentity,
        transport: TransportProtocol,
    ) -> Option<Self::Client>;

    fn version(&self) -> &str;
}

/// Cooperative device client
///
/// Sends are queued by [`send_event_async`](DeviceClient::send_event_async)
/// and only move when [`do_work`](DeviceClient::do_work) is called.
pub trait DeviceClient {
    fn set_option(&mut self, option: ClientOption<'_>) -> Result<(), Failure>;

    /// Start delivering cloud-to-device messages as [`HubEvent::Inbound`]
    fn enable_inbound_messages(&mut self) -> Result<(), Failure>;

    /// Queue one event for transmission. Acceptance says nothing about
    /// delivery.
    fn send_event_async(&mut self, payload: &[u8]) -> Result<(), Failure>;

    /// Service the client's work queue once
    fn do_work(
        &mut self,
        events: &mut dyn FnMut(HubEvent),
    ) -> impl core::future::Future<Output = ()>;

    /// Release the connection handle
    fn destroy(self);
}
