//! Time-based one-time codes (RFC 6238, HMAC-SHA1, 6 digits, 30 s window)

use common::constants::{TOTP_DIGITS, TOTP_STEP_SECS};
use common::{AvanzaError, Result};
use std::time::{SystemTime, UNIX_EPOCH};
use totp_rs::{Algorithm, Secret, TOTP};

/// Strip whitespace and padding, upper-case the rest
fn normalise(secret: &str) -> String {
    secret
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '=')
        .collect::<String>()
        .to_uppercase()
}

/// Decode a base32 seed into raw key bytes
///
/// # Errors
/// Returns `InvalidSecret` if the seed is empty or not base32
pub fn decode_secret(secret: &str) -> Result<Vec<u8>> {
    let normalised = normalise(secret);
    if normalised.is_empty() {
        return Err(AvanzaError::InvalidSecret("empty secret".to_string()));
    }

    let bytes = Secret::Encoded(normalised)
        .to_bytes()
        .map_err(|e| AvanzaError::InvalidSecret(format!("{e:?}")))?;

    if bytes.is_empty() {
        return Err(AvanzaError::InvalidSecret("secret decodes to nothing".to_string()));
    }
    Ok(bytes)
}

/// Code for the window containing `unix_secs`
///
/// # Errors
/// Returns `InvalidSecret` if the seed is not validly encoded
pub fn totp_code_at(secret: &str, unix_secs: u64) -> Result<String> {
    let key = decode_secret(secret)?;
    // Seeds shorter than 128 bits are accepted; the server issues 160-bit ones.
    let totp = TOTP::new_unchecked(Algorithm::SHA1, TOTP_DIGITS, 1, TOTP_STEP_SECS, key);
    Ok(totp.generate(unix_secs))
}

/// Code for the current window
///
/// # Errors
/// Returns `InvalidSecret` if the seed is not validly encoded
pub fn totp_code(secret: &str) -> Result<String> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    totp_code_at(secret, now)
}

/// Seconds left in the current window
#[must_use]
pub fn seconds_remaining() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    TOTP_STEP_SECS - (now % TOTP_STEP_SECS)
}
