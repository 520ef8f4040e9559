//! Server-sent-events listener
//!
//! Streams `event:` / `data:` / `id:` records from an authenticated endpoint
//! and hands complete records to async listeners. The stream is reopened
//! after a delay whenever it ends or fails, until `stop()`.

use futures_util::future::BoxFuture;
use futures_util::{FutureExt, StreamExt};
use parking_lot::Mutex;
use reqwest::Client;
use reqwest::header::{ACCEPT, COOKIE};
use serde_json::Value;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default pause before reopening the stream
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// One complete SSE record
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    pub id: String,
    pub event: String,
    /// JSON when the payload parses, otherwise the raw string
    pub data: Value,
}

/// Line-oriented SSE record assembler
///
/// A record is emitted as soon as `event`, `data` and `id` have all been
/// seen, in any order; blank lines and other fields are ignored.
#[derive(Debug, Default)]
pub struct SseParser {
    event: Option<String>,
    data: Option<Value>,
    id: Option<String>,
}

impl SseParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line (without the trailing newline)
    pub fn push_line(&mut self, line: &str) -> Option<SseEvent> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        if let Some(rest) = line.strip_prefix("event:") {
            self.event = Some(rest.trim().to_string()).filter(|e| !e.is_empty());
        } else if let Some(rest) = line.strip_prefix("data:") {
            let raw = rest.trim();
            if !raw.is_empty() {
                self.data = Some(
                    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())),
                );
            }
        } else if let Some(rest) = line.strip_prefix("id:") {
            self.id = Some(rest.trim().to_string()).filter(|i| !i.is_empty());
        } else {
            debug!("Ignoring SSE line: {}", line);
        }

        if self.event.is_some() && self.data.is_some() && self.id.is_some() {
            return Some(SseEvent {
                id: self.id.take().unwrap_or_default(),
                event: self.event.take().unwrap_or_default(),
                data: self.data.take().unwrap_or(Value::Null),
            });
        }
        None
    }

    /// Forget any partially assembled record
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

type Listener = Arc<dyn Fn(SseEvent) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Reconnecting SSE client
pub struct SseListener {
    url: String,
    cookie: Option<String>,
    client: Client,
    reconnect_delay: Duration,
    listeners: Mutex<Vec<Listener>>,
    running: AtomicBool,
    cancel: Mutex<CancellationToken>,
}

impl std::fmt::Debug for SseListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseListener")
            .field("url", &self.url)
            .field("listeners", &self.listeners.lock().len())
            .field("running", &self.is_running())
            .finish()
    }
}

impl SseListener {
    /// Listener for `url`, sending `cookie` as the `Cookie` header
    #[must_use]
    pub fn new(url: impl Into<String>, cookie: Option<String>) -> Self {
        Self::with_client(Client::new(), url, cookie)
    }

    /// Listener reusing an existing HTTP client
    #[must_use]
    pub fn with_client(client: Client, url: impl Into<String>, cookie: Option<String>) -> Self {
        Self {
            url: url.into(),
            cookie,
            client,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            listeners: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    #[must_use]
    pub const fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Register an async listener called with every complete record
    pub fn add_listener<F, Fut>(&self, listener: F)
    where
        F: Fn(SseEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.listeners
            .lock()
            .push(Arc::new(move |event: SseEvent| listener(event).boxed()));
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Listen until `stop()`, reopening the stream after failures
    ///
    /// Returns immediately if already running.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let cancel = CancellationToken::new();
        *self.cancel.lock() = cancel.clone();

        while !cancel.is_cancelled() {
            let outcome = tokio::select! {
                () = cancel.cancelled() => break,
                outcome = self.listen_once() => outcome,
            };
            match outcome {
                Ok(()) => info!("SSE stream {} ended", self.url),
                Err(e) => warn!(
                    "SSE connection lost: {:#}, reconnecting in {:?}",
                    e, self.reconnect_delay
                ),
            }
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("SSE listener for {} stopped", self.url);
    }

    /// Stop a running `start()` loop
    pub fn stop(&self) {
        self.cancel.lock().cancel();
    }

    async fn listen_once(&self) -> anyhow::Result<()> {
        let mut request = self
            .client
            .get(&self.url)
            .header(ACCEPT, "text/event-stream");
        if let Some(cookie) = &self.cookie {
            request = request.header(COOKIE, cookie);
        }

        let response = request.send().await?.error_for_status()?;
        info!("Connected to SSE stream: {}", self.url);

        let mut stream = response.bytes_stream();
        let mut parser = SseParser::new();
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = stream.next().await {
            buffer.extend_from_slice(&chunk?);
            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);
                if let Some(event) = parser.push_line(&line) {
                    debug!("SSE record {} ({})", event.id, event.event);
                    self.emit(event).await;
                }
            }
        }

        // Trailing line without newline
        if !buffer.is_empty() {
            let line = String::from_utf8_lossy(&buffer).into_owned();
            if let Some(event) = parser.push_line(&line) {
                self.emit(event).await;
            }
        }
        Ok(())
    }

    async fn emit(&self, event: SseEvent) {
        let listeners: Vec<Listener> = self.listeners.lock().clone();
        for listener in listeners {
            match AssertUnwindSafe(listener(event.clone())).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("SSE listener error: {:#}", e),
                Err(_) => error!("SSE listener panicked"),
            }
        }
    }
}
