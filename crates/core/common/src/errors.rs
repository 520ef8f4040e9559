//! Error taxonomy shared by every crate in the workspace

use thiserror::Error;

/// Result alias used across the client libraries
pub type Result<T> = std::result::Result<T, AvanzaError>;

/// Client error types
#[derive(Debug, Error)]
pub enum AvanzaError {
    /// TOTP seed is not valid base32
    #[error("Invalid TOTP secret: {0}")]
    InvalidSecret(String),

    /// Username/password rejected by the login endpoint
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Second factor code rejected (wrong or expired)
    #[error("Invalid TOTP code")]
    InvalidTotp,

    /// Server asked for a second factor other than TOTP
    #[error("Unsupported two factor method: {0}")]
    UnsupportedTwoFactor(String),

    /// Operation attempted before a session exists
    #[error("Authentication required")]
    AuthenticationRequired,

    /// Session still rejected after one refresh
    #[error("Session expired")]
    SessionExpired,

    /// Non-2xx answer other than the session expiry signal
    #[error("Request failed: HTTP {status} - {body}")]
    RequestFailed {
        /// HTTP status code
        status: u16,
        /// Raw response body
        body: String,
    },

    /// Response did not have the expected structure
    #[error("Unexpected response shape: {0}")]
    UnexpectedResponseShape(String),

    /// Transport level failure; never retried automatically
    #[error("Network failure: {0}")]
    NetworkFailure(String),

    /// Push channel could not be opened or the handshake failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Push channel dropped while connected
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Push operation attempted outside the Connected state
    #[error("Push channel not connected")]
    NotConnected,

    /// Subscription request rejected locally
    #[error("Invalid subscription: {0}")]
    InvalidSubscription(String),

    /// Configuration value out of range or missing
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AvanzaError {
    /// Errors the caller may retry without changing inputs
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::NetworkFailure(_) | Self::ConnectionLost(_))
    }

    /// Errors that require a fresh explicit login
    #[must_use]
    pub const fn requires_login(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationRequired | Self::SessionExpired | Self::InvalidCredentials
        )
    }
}

impl From<serde_json::Error> for AvanzaError {
    fn from(err: serde_json::Error) -> Self {
        Self::UnexpectedResponseShape(err.to_string())
    }
}
