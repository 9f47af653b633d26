//! Secure-storage seam backing the device identity

use crate::config::SecurityDeviceType;
use crate::error::Failure;

/// Security subsystem (HSM, TPM, key store) holding identity credentials
pub trait SecurityModule {
    /// Bring the subsystem up for the selected device type
    fn init(&mut self, device_type: SecurityDeviceType) -> Result<(), Failure>;

    /// Install the registration id and key for symmetric-key enrollment
    fn set_symmetric_key(&mut self, registration_id: &str, key: &str) -> Result<(), Failure>;

    /// Tear the subsystem down. Called at most once per successful `init`.
    fn deinit(&mut self);
}
