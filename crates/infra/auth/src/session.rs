//! Authenticated session state

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tokens proving an authenticated identity
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Sent as `X-AuthenticationSession`
    pub authentication_session: String,
    /// Sent as `X-SecurityToken`
    pub security_token: String,
    /// Identifies the push subscription in the CometD handshake
    pub push_subscription_id: String,
    /// Customer number of the logged in user
    pub customer_id: String,
    /// When the session was negotiated
    pub issued_at: DateTime<Utc>,
    /// Idle timeout requested at login
    pub max_inactive_minutes: u32,
}

impl Session {
    /// All tokens present
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.authentication_session.is_empty()
            && !self.security_token.is_empty()
            && !self.push_subscription_id.is_empty()
    }

    /// Time since negotiation
    #[must_use]
    pub fn age(&self) -> Duration {
        Utc::now().signed_duration_since(self.issued_at)
    }

    /// Earliest point at which the server may have dropped the session if
    /// it was never used
    #[must_use]
    pub fn idle_deadline(&self) -> DateTime<Utc> {
        self.issued_at + Duration::minutes(i64::from(self.max_inactive_minutes))
    }
}

fn partial(token: &str) -> String {
    let head: String = token.chars().take(4).collect();
    format!("{head}...")
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("authentication_session", &partial(&self.authentication_session))
            .field("security_token", &partial(&self.security_token))
            .field("push_subscription_id", &partial(&self.push_subscription_id))
            .field("customer_id", &self.customer_id)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}
