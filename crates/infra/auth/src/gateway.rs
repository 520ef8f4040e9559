//! Authenticated request gateway with single-flight session refresh

use crate::credentials::Credentials;
use crate::negotiator::{SessionNegotiator, network_failure};
use crate::session::Session;
use common::constants::{AUTHENTICATION_SESSION_HEADER, SECURITY_TOKEN_HEADER};
use common::{AvanzaError, HttpMethod, Result};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Session plus the generation it was installed under
#[derive(Clone)]
struct SessionSlot {
    session: Arc<Session>,
    generation: u64,
}

/// Attaches session credentials to outbound calls and refreshes the session
/// once when the server reports it expired
pub struct RequestGateway {
    negotiator: Arc<SessionNegotiator>,
    credentials: Arc<Credentials>,
    slot: RwLock<Option<SessionSlot>>,
    generation: AtomicU64,
    refresh_lock: Mutex<()>,
    authentications: AtomicU64,
}

impl RequestGateway {
    /// Create a gateway with no session yet
    #[must_use]
    pub fn new(negotiator: Arc<SessionNegotiator>, credentials: Arc<Credentials>) -> Self {
        Self {
            negotiator,
            credentials,
            slot: RwLock::new(None),
            generation: AtomicU64::new(0),
            refresh_lock: Mutex::new(()),
            authentications: AtomicU64::new(0),
        }
    }

    /// Negotiator used for (re-)authentication
    #[must_use]
    pub fn negotiator(&self) -> &Arc<SessionNegotiator> {
        &self.negotiator
    }

    /// Authenticate and install a new session, replacing any current one
    ///
    /// # Errors
    /// Propagates the negotiator's authentication errors
    pub async fn login(&self) -> Result<Arc<Session>> {
        let _guard = self.refresh_lock.lock().await;
        self.authenticate_and_install().await
    }

    /// Drop the live session; later calls fail with `AuthenticationRequired`
    pub async fn logout(&self) {
        let _guard = self.refresh_lock.lock().await;
        if self.slot.write().await.take().is_some() {
            info!("Session invalidated");
        }
    }

    /// Current session, if any
    pub async fn session(&self) -> Option<Arc<Session>> {
        self.slot.read().await.as_ref().map(|s| Arc::clone(&s.session))
    }

    /// Current session or `AuthenticationRequired`
    ///
    /// # Errors
    /// Returns `AuthenticationRequired` when no session exists
    pub async fn require_session(&self) -> Result<Arc<Session>> {
        self.session().await.ok_or(AvanzaError::AuthenticationRequired)
    }

    /// Number of successful authentications performed so far
    #[must_use]
    pub fn authentication_count(&self) -> u64 {
        self.authentications.load(Ordering::SeqCst)
    }

    /// Perform one authenticated call and return its JSON body
    ///
    /// An empty 2xx body yields `Value::Null`.
    ///
    /// # Errors
    /// `AuthenticationRequired` without a session, `SessionExpired` after a
    /// failed refresh-and-retry, `RequestFailed` for other non-2xx answers,
    /// `NetworkFailure` for transport errors
    pub async fn call(&self, method: HttpMethod, path: &str, body: Option<&Value>) -> Result<Value> {
        let slot = self
            .slot
            .read()
            .await
            .clone()
            .ok_or(AvanzaError::AuthenticationRequired)?;

        let (status, text) = self.send(&slot.session, method, path, body).await?;
        if status != StatusCode::UNAUTHORIZED {
            return Self::into_json(status, &text);
        }

        warn!("{} {} answered 401, refreshing session", method, path);
        let fresh = self.refresh(slot.generation).await?;

        let (status, text) = self.send(&fresh, method, path, body).await?;
        if status == StatusCode::UNAUTHORIZED {
            warn!("{} {} still unauthorized after refresh", method, path);
            self.invalidate(fresh.as_ref()).await;
            return Err(AvanzaError::SessionExpired);
        }
        Self::into_json(status, &text)
    }

    /// Single-flight refresh. Callers that saw generation `stale` wait for
    /// the lock; if someone else already replaced that session they reuse it.
    async fn refresh(&self, stale: u64) -> Result<Arc<Session>> {
        let _guard = self.refresh_lock.lock().await;

        match self.slot.read().await.as_ref() {
            Some(current) if current.generation != stale => {
                debug!("Session already refreshed by a concurrent caller");
                return Ok(Arc::clone(&current.session));
            }
            Some(_) => {}
            None => return Err(AvanzaError::AuthenticationRequired),
        }

        self.authenticate_and_install().await
    }

    /// Caller must hold `refresh_lock`
    async fn authenticate_and_install(&self) -> Result<Arc<Session>> {
        let session = Arc::new(self.negotiator.authenticate(&self.credentials).await?);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        *self.slot.write().await = Some(SessionSlot {
            session: Arc::clone(&session),
            generation,
        });
        self.authentications.fetch_add(1, Ordering::SeqCst);
        debug!("Installed session generation {}", generation);
        Ok(session)
    }

    /// Clear the slot if it still holds `session`
    async fn invalidate(&self, session: &Session) {
        let mut slot = self.slot.write().await;
        if slot.as_ref().is_some_and(|s| s.session.as_ref() == session) {
            *slot = None;
        }
    }

    async fn send(
        &self,
        session: &Session,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
    ) -> Result<(StatusCode, String)> {
        let url = self.negotiator.config().url(path);
        debug!("{} {}", method, url);

        let mut request = self
            .negotiator
            .http_client()
            .request(to_reqwest(method), url)
            .header(AUTHENTICATION_SESSION_HEADER, &session.authentication_session)
            .header(SECURITY_TOKEN_HEADER, &session.security_token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(network_failure)?;
        let status = response.status();
        let text = response.text().await.map_err(network_failure)?;
        Ok((status, text))
    }

    fn into_json(status: StatusCode, text: &str) -> Result<Value> {
        if !status.is_success() {
            return Err(AvanzaError::RequestFailed {
                status: status.as_u16(),
                body: text.to_string(),
            });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(text)?)
    }
}

const fn to_reqwest(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Delete => Method::DELETE,
    }
}
