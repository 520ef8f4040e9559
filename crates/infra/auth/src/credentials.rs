//! Caller-owned login material

use crate::totp;
use common::{AvanzaError, Result};
use std::collections::HashMap;
use std::fmt;

/// Source of the second factor code
#[derive(Clone, PartialEq, Eq)]
pub enum TotpSource {
    /// Base32 seed; codes are derived on demand
    Secret(String),
    /// Code already computed by the caller (single use)
    Token(String),
}

/// Username, password and TOTP material
///
/// Immutable once built. The library never writes these anywhere.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
    totp: TotpSource,
}

impl Credentials {
    /// Credentials backed by a TOTP seed
    ///
    /// # Errors
    /// Returns `InvalidSecret` if the seed is not valid base32
    pub fn with_secret(
        username: impl Into<String>,
        password: impl Into<String>,
        totp_secret: impl Into<String>,
    ) -> Result<Self> {
        let totp_secret = totp_secret.into();
        totp::decode_secret(&totp_secret)?;
        Ok(Self {
            username: username.into(),
            password: password.into(),
            totp: TotpSource::Secret(totp_secret),
        })
    }

    /// Credentials backed by a pre-computed code
    #[must_use]
    pub fn with_token(
        username: impl Into<String>,
        password: impl Into<String>,
        totp_token: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            totp: TotpSource::Token(totp_token.into()),
        }
    }

    /// Build from a key/value map.
    ///
    /// Accepts `username`, `password` and one of `totpSecret`/`totp_secret`
    /// or `totpToken`/`totp_token`; a secret wins when both are present.
    ///
    /// # Errors
    /// Returns `InvalidConfig` for missing keys, `InvalidSecret` for a bad seed
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self> {
        let field = |key: &str| {
            map.get(key)
                .cloned()
                .ok_or_else(|| AvanzaError::InvalidConfig(format!("missing '{key}'")))
        };
        let either = |a: &str, b: &str| map.get(a).or_else(|| map.get(b)).cloned();

        let username = field("username")?;
        let password = field("password")?;

        if let Some(secret) = either("totpSecret", "totp_secret") {
            return Self::with_secret(username, password, secret);
        }
        if let Some(token) = either("totpToken", "totp_token") {
            return Ok(Self::with_token(username, password, token));
        }
        Err(AvanzaError::InvalidConfig(
            "Could not find totp_secret or totp_token".to_string(),
        ))
    }

    /// Load from `AVANZA_USERNAME`, `AVANZA_PASSWORD` and
    /// `AVANZA_TOTP_SECRET` (or `AVANZA_TOTP_TOKEN`), reading `.env` first
    ///
    /// # Errors
    /// Returns `InvalidConfig` if a variable is missing
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let var = |key: &str| {
            std::env::var(key)
                .map_err(|_| AvanzaError::InvalidConfig(format!("{key} not found in environment")))
        };

        let username = var("AVANZA_USERNAME")?;
        let password = var("AVANZA_PASSWORD")?;

        if let Ok(secret) = var("AVANZA_TOTP_SECRET") {
            return Self::with_secret(username, password, secret);
        }
        let token = var("AVANZA_TOTP_TOKEN")?;
        Ok(Self::with_token(username, password, token))
    }

    /// Login name
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Login password
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Which kind of second factor these credentials carry
    #[must_use]
    pub const fn totp_source(&self) -> &TotpSource {
        &self.totp
    }

    /// Code to submit for the second factor step
    ///
    /// # Errors
    /// Returns `InvalidSecret` if the stored seed is not validly encoded
    pub fn totp_code(&self) -> Result<String> {
        match &self.totp {
            TotpSource::Secret(secret) => totp::totp_code(secret),
            TotpSource::Token(token) => Ok(token.clone()),
        }
    }
}

impl fmt::Debug for TotpSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Secret(_) => f.write_str("Secret(***)"),
            Self::Token(_) => f.write_str("Token(***)"),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .field("totp", &self.totp)
            .finish()
    }
}
