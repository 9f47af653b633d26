//! In-RAM symmetric-key store
//!
//! The decoded key sits in a critical-section global so the cloud-link task
//! can sign its hub password with it; it never leaves this module.

use core::cell::RefCell;

use bootstrap_core::{Failure, SecurityDeviceType, SecurityModule};
use critical_section::Mutex;
use defmt::{debug, info, warn};
use heapless::Vec;

use super::sas::{self, Signature, KEY_MAX_LEN};

/// Status code for a device type this board cannot back
const UNSUPPORTED: i32 = -20;
/// Status code for a key that is not valid base64 or does not fit
const BAD_KEY: i32 = -21;
/// Status code for a key installed before `init`
const NOT_READY: i32 = -22;

static KEY: Mutex<RefCell<Option<Vec<u8, KEY_MAX_LEN>>>> = Mutex::new(RefCell::new(None));

/// HMAC-SHA256 of `message` with the installed key, if there is one
pub fn sign(message: &[u8]) -> Option<Signature> {
    critical_section::with(|cs| {
        let key = KEY.borrow(cs).borrow();
        sas::hmac_sha256(key.as_ref()?, message)
    })
}

/// Holds the key for symmetric-key enrollment
///
/// Only [`SecurityDeviceType::SymmetricKey`] is available; the board has no
/// TPM or certificate storage.
#[derive(Default)]
pub struct KeyStore {
    active: bool,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecurityModule for KeyStore {
    fn init(&mut self, device_type: SecurityDeviceType) -> Result<(), Failure> {
        if device_type != SecurityDeviceType::SymmetricKey {
            warn!("Security device type {} not supported", device_type);
            return Err(Failure::Fatal(UNSUPPORTED));
        }
        self.active = true;
        info!("Key store ready");
        Ok(())
    }

    fn set_symmetric_key(&mut self, registration_id: &str, key: &str) -> Result<(), Failure> {
        if !self.active {
            return Err(Failure::Fatal(NOT_READY));
        }
        let decoded = sas::decode_key(key).map_err(|_| Failure::Fatal(BAD_KEY))?;
        critical_section::with(|cs| KEY.borrow(cs).replace(Some(decoded)));
        debug!("Symmetric key installed for {}", registration_id);
        Ok(())
    }

    fn deinit(&mut self) {
        critical_section::with(|cs| {
            if let Some(mut key) = KEY.borrow(cs).take() {
                // Overwrite so the key does not linger in RAM
                key.fill(0);
            }
        });
        self.active = false;
        info!("Key store cleared");
    }
}
