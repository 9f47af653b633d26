//! Process-scoped bootstrap context

use heapless::String;
use hal_abstractions::Timestamp;

use crate::error::BootstrapError;
use crate::stage::{BootstrapState, StageLedger};

/// Maximum length of the assigned hub host name
pub const HUB_URI_MAX_LEN: usize = 128;

/// Maximum length of a device identifier
pub const DEVICE_ID_MAX_LEN: usize = 128;

/// Identity handed out by the provisioning authority
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    hub_uri: String<HUB_URI_MAX_LEN>,
    device_id: String<DEVICE_ID_MAX_LEN>,
}

impl DeviceIdentity {
    /// Copy the assignment into owned buffers
    pub fn new(hub_uri: &str, device_id: &str) -> Result<Self, BootstrapError> {
        let hub_uri = String::try_from(hub_uri).map_err(|_| BootstrapError::IdentityTooLong)?;
        let device_id =
            String::try_from(device_id).map_err(|_| BootstrapError::IdentityTooLong)?;
        Ok(Self { hub_uri, device_id })
    }

    pub fn hub_uri(&self) -> &str {
        &self.hub_uri
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }
}

/// Mutable record owned by the sequencer for the length of one run
pub struct BootstrapContext<N> {
    pub(crate) network: Option<N>,
    pub(crate) timestamp: Option<Timestamp>,
    pub(crate) identity: Option<DeviceIdentity>,
    pub(crate) stages: StageLedger,
    pub(crate) state: BootstrapState,
}

impl<N> BootstrapContext<N> {
    pub fn new(network: Option<N>) -> Self {
        Self {
            network,
            timestamp: None,
            identity: None,
            stages: StageLedger::new(),
            state: BootstrapState::Idle,
        }
    }

    pub fn network(&self) -> Option<&N> {
        self.network.as_ref()
    }

    /// Wall-clock time resolved by the clock stage
    pub fn timestamp(&self) -> Option<Timestamp> {
        self.timestamp
    }

    /// Identity assigned by provisioning; `None` until registration succeeds
    /// and again after release
    pub fn identity(&self) -> Option<&DeviceIdentity> {
        self.identity.as_ref()
    }

    pub fn stages(&self) -> &StageLedger {
        &self.stages
    }

    pub fn state(&self) -> BootstrapState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_copy() {
        let id = DeviceIdentity::new("hub-01.azure-devices.net", "my-symm-device-001").unwrap();
        assert_eq!(id.hub_uri(), "hub-01.azure-devices.net");
        assert_eq!(id.device_id(), "my-symm-device-001");
    }

    #[test]
    fn test_identity_too_long() {
        let long = "x".repeat(HUB_URI_MAX_LEN + 1);
        assert_eq!(
            DeviceIdentity::new(&long, "dev"),
            Err(BootstrapError::IdentityTooLong)
        );
        let long = "x".repeat(DEVICE_ID_MAX_LEN + 1);
        assert_eq!(
            DeviceIdentity::new("hub", &long),
            Err(BootstrapError::IdentityTooLong)
        );
    }

    #[test]
    fn test_new_context_is_empty() {
        let ctx: BootstrapContext<()> = BootstrapContext::new(None);
        assert!(ctx.network().is_none());
        assert!(ctx.timestamp().is_none());
        assert!(ctx.identity().is_none());
        assert_eq!(ctx.state(), BootstrapState::Idle);
    }
}
