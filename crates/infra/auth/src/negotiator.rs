//! Two-step login: password exchange, then TOTP challenge-response

use crate::credentials::Credentials;
use crate::session::Session;
use chrono::Utc;
use common::constants::{SECURITY_TOKEN_HEADER, TOTP_METHOD, routes};
use common::{AvanzaError, ClientConfig, Result};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Map a transport error
pub(crate) fn network_failure(err: reqwest::Error) -> AvanzaError {
    AvanzaError::NetworkFailure(err.to_string())
}

/// Outcome of one login step
struct StepResponse {
    status: StatusCode,
    security_token: Option<String>,
    body: String,
}

/// Performs the login handshake and owns the cookie-carrying HTTP client
pub struct SessionNegotiator {
    config: ClientConfig,
    http_client: Client,
    streaming_client: Client,
    jar: Arc<Jar>,
}

impl SessionNegotiator {
    /// Create a negotiator with its own cookie jar
    ///
    /// # Errors
    /// Returns `InvalidConfig` if the configuration is out of range or the
    /// HTTP client cannot be built
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let jar = Arc::new(Jar::default());
        let http_client = Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| AvanzaError::InvalidConfig(format!("HTTP client: {e}")))?;

        // Long-lived bodies: bound the connect only
        let streaming_client = Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .connect_timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| AvanzaError::InvalidConfig(format!("HTTP client: {e}")))?;

        Ok(Self {
            config,
            http_client,
            streaming_client,
            jar,
        })
    }

    /// Client shared with the request gateway so cookies follow every call
    #[must_use]
    pub const fn http_client(&self) -> &Client {
        &self.http_client
    }

    /// Client for streaming endpoints, sharing the cookie jar but without a
    /// whole-response timeout
    #[must_use]
    pub const fn streaming_client(&self) -> &Client {
        &self.streaming_client
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// `Cookie` header value for the REST host, used by the push channel
    #[must_use]
    pub fn cookie_header(&self) -> Option<String> {
        let url = Url::parse(&self.config.base_url).ok()?;
        self.jar
            .cookies(&url)
            .and_then(|value| value.to_str().ok().map(str::to_string))
    }

    /// Log in and return a fresh session
    ///
    /// # Errors
    /// `InvalidCredentials`, `InvalidTotp`, `UnsupportedTwoFactor`,
    /// `UnexpectedResponseShape`, `RequestFailed` or `NetworkFailure`
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<Session> {
        info!("Starting Avanza login for user: {}", credentials.username());

        let login = self
            .post_step(
                routes::AUTHENTICATION,
                &json!({
                    "maxInactiveMinutes": self.config.max_inactive_minutes,
                    "username": credentials.username(),
                    "password": credentials.password(),
                }),
            )
            .await?;

        if login.status == StatusCode::UNAUTHORIZED {
            warn!("Login rejected for user: {}", credentials.username());
            return Err(AvanzaError::InvalidCredentials);
        }
        let login_body = Self::success_body(login.status, &login.body)?;

        let two_factor_method = match login_body.get("twoFactorLogin") {
            None | Some(Value::Null) => None,
            Some(two_factor) => Some(
                two_factor
                    .get("method")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            ),
        };

        let (body, security_token) = match two_factor_method {
            None => {
                debug!("No second factor required");
                (login_body, login.security_token)
            }
            Some(method) if method == TOTP_METHOD => self.submit_totp(credentials).await?,
            Some(method) => return Err(AvanzaError::UnsupportedTwoFactor(method)),
        };

        let session = Session {
            authentication_session: string_field(&body, "authenticationSession")?,
            push_subscription_id: string_field(&body, "pushSubscriptionId")?,
            customer_id: string_field(&body, "customerId").unwrap_or_default(),
            security_token: security_token.filter(|t| !t.is_empty()).ok_or_else(|| {
                AvanzaError::UnexpectedResponseShape(format!(
                    "{SECURITY_TOKEN_HEADER} header missing"
                ))
            })?,
            issued_at: Utc::now(),
            max_inactive_minutes: self.config.max_inactive_minutes,
        };

        info!("Avanza authentication completed for customer {}", session.customer_id);
        Ok(session)
    }

    /// Second factor step
    async fn submit_totp(&self, credentials: &Credentials) -> Result<(Value, Option<String>)> {
        let code = credentials.totp_code()?;
        debug!("Submitting TOTP code");

        let step = self
            .post_step(
                routes::TOTP,
                &json!({
                    "method": TOTP_METHOD,
                    "totpCode": code,
                }),
            )
            .await?;

        if step.status == StatusCode::UNAUTHORIZED {
            warn!("TOTP verification rejected");
            return Err(AvanzaError::InvalidTotp);
        }
        let body = Self::success_body(step.status, &step.body)?;
        debug!("TOTP verification successful");
        Ok((body, step.security_token))
    }

    async fn post_step(&self, path: &str, payload: &Value) -> Result<StepResponse> {
        let response = self
            .http_client
            .post(self.config.url(path))
            .json(payload)
            .send()
            .await
            .map_err(network_failure)?;

        let status = response.status();
        let security_token = response
            .headers()
            .get(SECURITY_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.map_err(network_failure)?;

        Ok(StepResponse {
            status,
            security_token,
            body,
        })
    }

    fn success_body(status: StatusCode, body: &str) -> Result<Value> {
        if !status.is_success() {
            return Err(AvanzaError::RequestFailed {
                status: status.as_u16(),
                body: body.to_string(),
            });
        }
        let value: Value = serde_json::from_str(body)?;
        if !value.is_object() {
            return Err(AvanzaError::UnexpectedResponseShape(
                "login response is not an object".to_string(),
            ));
        }
        Ok(value)
    }
}

/// Read a non-empty string field; numbers are accepted and stringified
fn string_field(body: &Value, key: &str) -> Result<String> {
    let value = match body.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };
    if value.is_empty() {
        return Err(AvanzaError::UnexpectedResponseShape(format!(
            "'{key}' missing from login response"
        )));
    }
    Ok(value)
}
