//! Shared access signature for the hub MQTT password
//!
//! `SharedAccessSignature sr={resource}&sig={signature}&se={expiry}` where the
//! resource is the percent-encoded `{hub}/devices/{device_id}` and the
//! signature is HMAC-SHA256 over `{resource}\n{expiry}` keyed with the
//! base64-decoded device key.

use core::fmt::Write;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use heapless::{String, Vec};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::network::NetworkError;

/// Decoded device key; a 128-character base64 key decodes to 96 bytes
pub const KEY_MAX_LEN: usize = 96;

/// Percent-encoded resource URI
const RESOURCE_MAX_LEN: usize = 384;

/// Resource, newline and a 20-digit expiry
const STRING_TO_SIGN_MAX_LEN: usize = RESOURCE_MAX_LEN + 21;

pub const TOKEN_MAX_LEN: usize = 640;

pub type Signature = [u8; 32];

/// Decode a base64 device key
pub fn decode_key(key: &str) -> Result<Vec<u8, KEY_MAX_LEN>, NetworkError> {
    let mut raw = [0u8; KEY_MAX_LEN];
    let len = STANDARD
        .decode_slice(key.trim(), &mut raw)
        .map_err(|_| NetworkError::AuthTokenFailed)?;
    Vec::from_slice(&raw[..len]).map_err(|_| NetworkError::AuthTokenFailed)
}

pub fn hmac_sha256(key: &[u8], message: &[u8]) -> Option<Signature> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).ok()?;
    mac.update(message);
    let mut signature = [0u8; 32];
    signature.copy_from_slice(&mac.finalize().into_bytes());
    Some(signature)
}

/// RFC 3986 percent-encoding; unreserved characters pass through
fn percent_encode<const N: usize>(out: &mut String<N>, s: &str) -> Result<(), NetworkError> {
    for byte in s.bytes() {
        let pushed = if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            out.push(byte as char).map_err(|_| core::fmt::Error)
        } else {
            write!(out, "%{:02X}", byte)
        };
        pushed.map_err(|_| NetworkError::AuthTokenFailed)?;
    }
    Ok(())
}

/// Build the token for `device_id` on `hub_uri`, valid until `expiry`
///
/// `sign` computes the HMAC with the device key; it returns `None` when no
/// key is installed.
pub fn build_token<F>(
    hub_uri: &str,
    device_id: &str,
    expiry: u64,
    sign: F,
) -> Result<String<TOKEN_MAX_LEN>, NetworkError>
where
    F: FnOnce(&[u8]) -> Option<Signature>,
{
    let mut resource: String<RESOURCE_MAX_LEN> = String::new();
    percent_encode(&mut resource, hub_uri)?;
    percent_encode(&mut resource, "/devices/")?;
    percent_encode(&mut resource, device_id)?;

    let mut to_sign: String<STRING_TO_SIGN_MAX_LEN> = String::new();
    write!(to_sign, "{}\n{}", resource, expiry).map_err(|_| NetworkError::AuthTokenFailed)?;
    let signature = sign(to_sign.as_bytes()).ok_or(NetworkError::AuthTokenFailed)?;

    let mut encoded = [0u8; 44];
    let len = STANDARD
        .encode_slice(signature, &mut encoded)
        .map_err(|_| NetworkError::AuthTokenFailed)?;
    let encoded = core::str::from_utf8(&encoded[..len]).map_err(|_| NetworkError::AuthTokenFailed)?;

    let mut token = String::new();
    write!(token, "SharedAccessSignature sr={}&sig=", resource)
        .map_err(|_| NetworkError::AuthTokenFailed)?;
    percent_encode(&mut token, encoded)?;
    write!(token, "&se={}", expiry).map_err(|_| NetworkError::AuthTokenFailed)?;
    Ok(token)
}
