//! Client configuration

use crate::constants::{BASE_URL, MAX_INACTIVE_MINUTES, MIN_INACTIVE_MINUTES, PUSH_URL};
use crate::errors::{AvanzaError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Connection and session settings for one client instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// REST host, no trailing slash
    pub base_url: String,
    /// CometD websocket endpoint
    pub push_url: String,
    /// Session idle timeout requested at login
    pub max_inactive_minutes: u32,
    /// Per-request timeout for REST calls
    #[serde(with = "duration_millis")]
    pub request_timeout: Duration,
    /// How long `connect()` waits for the push handshake
    #[serde(with = "duration_millis")]
    pub handshake_timeout: Duration,
    /// Capacity of the push dispatch queue
    pub dispatch_buffer: usize,
    /// User agent sent on REST calls
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: BASE_URL.to_string(),
            push_url: PUSH_URL.to_string(),
            max_inactive_minutes: MAX_INACTIVE_MINUTES,
            request_timeout: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(10),
            dispatch_buffer: 1024,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36".to_string(),
        }
    }
}

impl ClientConfig {
    /// Load overrides from the environment (and a `.env` file if present)
    ///
    /// # Errors
    /// Returns `InvalidConfig` if a numeric variable does not parse or the
    /// resulting configuration fails validation
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = Self::default();
        if let Ok(url) = std::env::var("AVANZA_BASE_URL") {
            config.base_url = url;
        }
        if let Ok(url) = std::env::var("AVANZA_PUSH_URL") {
            config.push_url = url;
        }
        if let Ok(raw) = std::env::var("AVANZA_MAX_INACTIVE_MINUTES") {
            config.max_inactive_minutes = raw.trim().parse().map_err(|_| {
                AvanzaError::InvalidConfig(format!("AVANZA_MAX_INACTIVE_MINUTES '{raw}'"))
            })?;
        }

        config.validate()?;
        debug!(
            "Loaded config: base {} push {} session {} min",
            config.base_url, config.push_url, config.max_inactive_minutes
        );
        Ok(config)
    }

    /// Set REST host
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set push endpoint
    #[must_use]
    pub fn with_push_url(mut self, url: impl Into<String>) -> Self {
        self.push_url = url.into();
        self
    }

    /// Set session idle timeout
    #[must_use]
    pub const fn with_max_inactive_minutes(mut self, minutes: u32) -> Self {
        self.max_inactive_minutes = minutes;
        self
    }

    /// Set REST timeout
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set push handshake timeout
    #[must_use]
    pub const fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Check ranges
    ///
    /// # Errors
    /// Returns `InvalidConfig` naming the offending field
    pub fn validate(&self) -> Result<()> {
        if !(MIN_INACTIVE_MINUTES..=MAX_INACTIVE_MINUTES).contains(&self.max_inactive_minutes) {
            return Err(AvanzaError::InvalidConfig(format!(
                "Session timeout not in range {MIN_INACTIVE_MINUTES} - {MAX_INACTIVE_MINUTES} minutes"
            )));
        }
        if self.base_url.is_empty() || self.push_url.is_empty() {
            return Err(AvanzaError::InvalidConfig("empty endpoint url".to_string()));
        }
        if self.request_timeout.is_zero() {
            return Err(AvanzaError::InvalidConfig("request_timeout must be > 0".to_string()));
        }
        if self.handshake_timeout.is_zero() {
            return Err(AvanzaError::InvalidConfig("handshake_timeout must be > 0".to_string()));
        }
        if self.dispatch_buffer == 0 {
            return Err(AvanzaError::InvalidConfig("dispatch_buffer must be > 0".to_string()));
        }
        Ok(())
    }

    /// Absolute URL for a REST path
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
