//! Mock brokerage for simulating the Avanza REST surface in tests
//!
//! Wraps a `wiremock` server and mounts the login endpoints plus any
//! protected endpoints a test needs. The first login issues the
//! `TEST_*` tokens; every later login issues the `REFRESHED_*` tokens, which
//! lets tests distinguish calls made before and after a session refresh.

use crate::fixtures::*;
use common::constants::{SECURITY_TOKEN_HEADER, TOTP_METHOD, routes};
use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

/// Matches a TOTP submission carrying a six digit code
struct SixDigitTotp;

impl Match for SixDigitTotp {
    fn matches(&self, request: &Request) -> bool {
        let Ok(body) = serde_json::from_slice::<Value>(&request.body) else {
            return false;
        };
        body.get("method").and_then(Value::as_str) == Some(TOTP_METHOD)
            && body
                .get("totpCode")
                .and_then(Value::as_str)
                .is_some_and(|code| code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit()))
    }
}

/// Mock brokerage backed by `wiremock`
pub struct MockBrokerage {
    server: MockServer,
}

impl std::fmt::Debug for MockBrokerage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBrokerage")
            .field("uri", &self.server.uri())
            .finish()
    }
}

impl MockBrokerage {
    /// Start an empty mock brokerage on a random local port
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL to put in `ClientConfig::base_url`
    #[must_use]
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Underlying server for ad-hoc mounts
    #[must_use]
    pub const fn server(&self) -> &MockServer {
        &self.server
    }

    /// Session body returned by a completed login
    #[must_use]
    pub fn session_body(auth_session: &str) -> Value {
        json!({
            "authenticationSession": auth_session,
            "pushSubscriptionId": TEST_PUSH_SUBSCRIPTION_ID,
            "customerId": TEST_CUSTOMER_ID,
            "registrationComplete": true,
        })
    }

    fn session_response(auth_session: &str, security_token: &str) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .insert_header(SECURITY_TOKEN_HEADER, security_token)
            .insert_header("Set-Cookie", format!("{TEST_SESSION_COOKIE}; Path=/"))
            .set_body_json(Self::session_body(auth_session))
    }

    /// Password step: the right password leads to `challenge`, anything else is a 401
    async fn mount_password_step(&self, challenge: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path(routes::AUTHENTICATION))
            .and(body_partial_json(json!({
                "username": TEST_USERNAME,
                "password": TEST_PASSWORD,
            })))
            .respond_with(challenge)
            .with_priority(1)
            .mount(&self.server)
            .await;

        Mock::given(method("POST"))
            .and(path(routes::AUTHENTICATION))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "message": "Felaktigt användarnamn eller lösenord",
            })))
            .with_priority(10)
            .mount(&self.server)
            .await;
    }

    /// Full two-step login: password then TOTP
    pub async fn mount_totp_login(&self) {
        self.mount_password_step(ResponseTemplate::new(200).set_body_json(json!({
            "twoFactorLogin": {
                "method": TOTP_METHOD,
                "transactionId": "txn-0001",
            },
        })))
        .await;

        Mock::given(method("POST"))
            .and(path(routes::TOTP))
            .and(SixDigitTotp)
            .respond_with(Self::session_response(TEST_AUTH_SESSION, TEST_SECURITY_TOKEN))
            .with_priority(1)
            .up_to_n_times(1)
            .mount(&self.server)
            .await;

        Mock::given(method("POST"))
            .and(path(routes::TOTP))
            .and(SixDigitTotp)
            .respond_with(Self::session_response(
                REFRESHED_AUTH_SESSION,
                REFRESHED_SECURITY_TOKEN,
            ))
            .with_priority(2)
            .mount(&self.server)
            .await;
    }

    /// Password login that completes without a second factor
    pub async fn mount_password_only_login(&self) {
        self.mount_password_step(Self::session_response(TEST_AUTH_SESSION, TEST_SECURITY_TOKEN))
            .await;
    }

    /// Password accepted, TOTP always rejected
    pub async fn mount_totp_rejection(&self) {
        self.mount_password_step(ResponseTemplate::new(200).set_body_json(json!({
            "twoFactorLogin": { "method": TOTP_METHOD },
        })))
        .await;

        Mock::given(method("POST"))
            .and(path(routes::TOTP))
            .respond_with(ResponseTemplate::new(401))
            .mount(&self.server)
            .await;
    }

    /// Password accepted with a custom second-step challenge body
    pub async fn mount_password_challenge(&self, body: Value) {
        self.mount_password_step(
            ResponseTemplate::new(200)
                .insert_header(SECURITY_TOKEN_HEADER, TEST_SECURITY_TOKEN)
                .set_body_json(body),
        )
        .await;
    }

    /// Protected endpoint answering `body` to any authenticated request
    pub async fn mount_json(&self, http_method: &str, route: &str, body: Value) {
        Mock::given(method(http_method))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Protected endpoint answering `status` with a plain body
    pub async fn mount_status(&self, http_method: &str, route: &str, status: u16, body: &str) {
        Mock::given(method(http_method))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&self.server)
            .await;
    }

    /// Endpoint that rejects the first session with 401 and serves `body`
    /// once the caller presents the refreshed security token
    pub async fn mount_expiring(&self, http_method: &str, route: &str, body: Value) {
        Mock::given(method(http_method))
            .and(path(route))
            .and(header(SECURITY_TOKEN_HEADER, REFRESHED_SECURITY_TOKEN))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .with_priority(1)
            .mount(&self.server)
            .await;

        Mock::given(method(http_method))
            .and(path(route))
            .respond_with(ResponseTemplate::new(401))
            .with_priority(10)
            .mount(&self.server)
            .await;
    }

    /// Requests received on `route` so far
    pub async fn requests_to(&self, route: &str) -> Vec<Request> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path() == route)
            .collect()
    }

    /// Number of requests received on `route` so far
    pub async fn count_requests(&self, route: &str) -> usize {
        self.requests_to(route).await.len()
    }

    /// Number of completed second-factor logins
    pub async fn login_count(&self) -> usize {
        self.count_requests(routes::TOTP).await
    }
}
