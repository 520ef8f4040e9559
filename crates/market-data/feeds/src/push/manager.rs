//! Push channel lifecycle, subscription fan-out and callback dispatch
//!
//! Each connection runs three tasks:
//! - reader: parses frames, answers the CometD meta protocol and queues data
//!   messages for dispatch (never runs user code)
//! - writer: owns the socket sink and the outbound message-id counter
//! - dispatcher: runs subscriber callbacks in wire order
//!
//! All three observe one `CancellationToken`.

use super::protocol::{self, BayeuxMessage, PushMessage};
use super::registry::{Removal, SubscriptionHandle, SubscriptionKey, SubscriptionRegistry};
use auth::RequestGateway;
use common::constants::meta;
use common::{AvanzaError, ChannelType, ClientConfig, Result};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{HeaderValue, header};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const EVENT_CAPACITY: usize = 64;
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushState {
    Disconnected,
    Connecting,
    Connected,
    /// Terminal until `connect()` is called again
    Closed,
}

/// Out-of-band connection notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    Connected,
    /// Transport failed while connected; subscriptions are gone
    ConnectionLost { reason: String },
    /// `close()` completed
    Closed,
}

enum Outbound {
    Message(Value),
    Shutdown,
}

enum Ending {
    /// Never reached Connected
    Failed,
    Lost(String),
    Closed,
}

/// Per-connection state shared by the three tasks
struct Connection {
    outbound: mpsc::UnboundedSender<Outbound>,
    cancel: CancellationToken,
    push_subscription_id: String,
    client_id: Mutex<Option<String>>,
    established: AtomicBool,
    ended: AtomicBool,
    ready: Mutex<Option<oneshot::Sender<std::result::Result<(), String>>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl Connection {
    fn send(&self, message: Value) {
        if self.outbound.send(Outbound::Message(message)).is_err() {
            debug!("Push writer gone, dropping outbound message");
        }
    }

    fn send_handshake(&self) {
        self.send(protocol::handshake(&self.push_subscription_id));
    }

    fn client_id(&self) -> Option<String> {
        self.client_id.lock().clone()
    }

    fn resolve_ready(&self, outcome: std::result::Result<(), String>) {
        if let Some(tx) = self.ready.lock().take() {
            let _ = tx.send(outcome);
        }
    }
}

struct Shared {
    state: watch::Sender<PushState>,
    events: broadcast::Sender<PushEvent>,
    registry: Mutex<SubscriptionRegistry>,
    current: Mutex<Option<Arc<Connection>>>,
}

impl Shared {
    fn new() -> Self {
        let (state, _) = watch::channel(PushState::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state,
            events,
            registry: Mutex::new(SubscriptionRegistry::new()),
            current: Mutex::new(None),
        }
    }

    fn state(&self) -> PushState {
        *self.state.borrow()
    }

    fn set_state(&self, state: PushState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("Push state {:?} -> {:?}", previous, state);
        }
    }

    fn publish(&self, event: PushEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    /// Connection usable for control messages
    fn live_connection(&self) -> Option<Arc<Connection>> {
        if self.state() != PushState::Connected {
            return None;
        }
        self.current
            .lock()
            .as_ref()
            .filter(|c| !c.ended.load(Ordering::SeqCst))
            .map(Arc::clone)
    }

    /// Tear down once. Returns false if the connection had already ended.
    fn end(&self, conn: &Arc<Connection>, ending: Ending) -> bool {
        if conn.ended.swap(true, Ordering::SeqCst) {
            return false;
        }
        {
            let mut current = self.current.lock();
            if current.as_ref().is_some_and(|c| Arc::ptr_eq(c, conn)) {
                *current = None;
            }
        }
        self.registry.lock().clear();
        self.set_state(PushState::Closed);

        match ending {
            Ending::Failed => {}
            Ending::Lost(reason) => {
                error!("Push connection lost: {}", reason);
                self.publish(PushEvent::ConnectionLost { reason });
            }
            Ending::Closed => {
                info!("Push channel closed");
                self.publish(PushEvent::Closed);
            }
        }
        true
    }

    /// Transport went away underneath the reader or writer
    fn connection_ended(&self, conn: &Arc<Connection>, reason: String) {
        conn.resolve_ready(Err(reason.clone()));
        let ending = if conn.established.load(Ordering::SeqCst) {
            Ending::Lost(reason)
        } else {
            Ending::Failed
        };
        self.end(conn, ending);
        conn.cancel.cancel();
    }
}

/// Manages the CometD push connection and routes data to subscribers
pub struct PushChannelManager {
    config: ClientConfig,
    gateway: Arc<RequestGateway>,
    shared: Arc<Shared>,
    lifecycle: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for PushChannelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushChannelManager")
            .field("push_url", &self.config.push_url)
            .field("state", &self.shared.state())
            .finish()
    }
}

impl PushChannelManager {
    /// Create a disconnected manager. The session and cookies used for the
    /// handshake are taken from `gateway` at `connect()` time.
    #[must_use]
    pub fn new(config: ClientConfig, gateway: Arc<RequestGateway>) -> Self {
        Self {
            config,
            gateway,
            shared: Arc::new(Shared::new()),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> PushState {
        self.shared.state()
    }

    /// Watch state transitions
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<PushState> {
        self.shared.state.subscribe()
    }

    /// Subscribe to connection events
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<PushEvent> {
        self.shared.events.subscribe()
    }

    /// Registered callbacks across all keys
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.shared.registry.lock().callback_count()
    }

    /// Open the websocket, handshake and wait for the first connect reply
    ///
    /// No-op when already connected.
    ///
    /// # Errors
    /// `AuthenticationRequired` without a session, `ConnectionFailed` when the
    /// socket cannot be opened or the handshake fails or times out
    pub async fn connect(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.shared.state() == PushState::Connected {
            debug!("Push channel already connected");
            return Ok(());
        }

        let session = self.gateway.require_session().await?;
        let cookie = self.gateway.negotiator().cookie_header();

        self.shared.set_state(PushState::Connecting);
        info!("Connecting push channel to {}", self.config.push_url);

        let result = self
            .establish(session.push_subscription_id.clone(), cookie)
            .await;
        if let Err(e) = &result {
            warn!("Push connect failed: {}", e);
            self.shared.set_state(PushState::Closed);
        }
        result
    }

    async fn establish(&self, push_subscription_id: String, cookie: Option<String>) -> Result<()> {
        let request = build_request(&self.config.push_url, cookie.as_deref())?;
        let (ws, response) = timeout(self.config.handshake_timeout, connect_async(request))
            .await
            .map_err(|_| AvanzaError::ConnectionFailed("websocket connect timed out".to_string()))?
            .map_err(|e| AvanzaError::ConnectionFailed(e.to_string()))?;
        debug!("Websocket upgrade answered {}", response.status());

        let (sink, stream) = ws.split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (dispatch_tx, dispatch_rx) = mpsc::channel(self.config.dispatch_buffer);
        let (ready_tx, ready_rx) = oneshot::channel();

        let conn = Arc::new(Connection {
            outbound: outbound_tx,
            cancel: CancellationToken::new(),
            push_subscription_id,
            client_id: Mutex::new(None),
            established: AtomicBool::new(false),
            ended: AtomicBool::new(false),
            ready: Mutex::new(Some(ready_tx)),
            writer: Mutex::new(None),
        });

        let writer = tokio::spawn(run_writer(
            sink,
            outbound_rx,
            Arc::clone(&self.shared),
            Arc::clone(&conn),
        ));
        *conn.writer.lock() = Some(writer);
        tokio::spawn(run_reader(
            stream,
            Arc::clone(&self.shared),
            Arc::clone(&conn),
            dispatch_tx,
        ));
        tokio::spawn(run_dispatcher(
            dispatch_rx,
            Arc::clone(&self.shared),
            conn.cancel.clone(),
        ));

        if let Some(stale) = self.shared.current.lock().replace(Arc::clone(&conn)) {
            stale.cancel.cancel();
        }
        conn.send_handshake();

        let failure = match timeout(self.config.handshake_timeout, ready_rx).await {
            Ok(Ok(Ok(()))) => return Ok(()),
            Ok(Ok(Err(reason))) => reason,
            Ok(Err(_)) => "connection closed during handshake".to_string(),
            Err(_) => format!(
                "handshake not completed within {:?}",
                self.config.handshake_timeout
            ),
        };
        self.shared.end(&conn, Ending::Failed);
        conn.cancel.cancel();
        Err(AvanzaError::ConnectionFailed(failure))
    }

    /// Register `callback` for `(channel, identifier)`
    ///
    /// The first callback for a key sends one subscribe message; later ones
    /// share it.
    ///
    /// # Errors
    /// `NotConnected` unless connected, `InvalidSubscription` for an empty
    /// identifier
    pub fn subscribe<F>(
        &self,
        channel: ChannelType,
        identifier: &str,
        callback: F,
    ) -> Result<SubscriptionHandle>
    where
        F: Fn(&PushMessage) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(AvanzaError::InvalidSubscription(format!(
                "empty identifier for {channel}"
            )));
        }

        let conn = self.shared.live_connection().ok_or(AvanzaError::NotConnected)?;
        let client_id = conn.client_id().ok_or(AvanzaError::NotConnected)?;

        let key = SubscriptionKey::new(channel, identifier);
        let (handle, first) = self
            .shared
            .registry
            .lock()
            .add(key.clone(), Arc::new(callback));

        if first {
            info!("Subscribing to {}", key.path());
            conn.send(protocol::subscribe(&client_id, &key.path()));
        } else {
            debug!("Added callback {} to {}", handle.id(), key.path());
        }
        Ok(handle)
    }

    /// Subscribe to several ids with one comma-joined subscription
    ///
    /// # Errors
    /// `InvalidSubscription` for an empty id list or several ids on a channel
    /// other than orders, deals or positions; otherwise as `subscribe`
    pub fn subscribe_to_ids<F, S>(
        &self,
        channel: ChannelType,
        ids: &[S],
        callback: F,
    ) -> Result<SubscriptionHandle>
    where
        F: Fn(&PushMessage) -> anyhow::Result<()> + Send + Sync + 'static,
        S: AsRef<str>,
    {
        if ids.is_empty() {
            return Err(AvanzaError::InvalidSubscription(format!(
                "no ids given for {channel}"
            )));
        }
        if ids.len() > 1 && !channel.supports_multiple_ids() {
            return Err(AvanzaError::InvalidSubscription(format!(
                "{channel} does not accept multiple ids"
            )));
        }
        let joined = ids.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(",");
        self.subscribe(channel, &joined, callback)
    }

    /// Remove exactly the callback behind `handle`
    ///
    /// Sends one unsubscribe message when the last callback for the key goes.
    /// Returns false for unknown or stale handles.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let removal = self.shared.registry.lock().remove(handle);
        match removal {
            Removal::Unknown => {
                debug!("Ignoring unknown subscription handle {}", handle.id());
                false
            }
            Removal::Remaining => {
                debug!("Removed callback {} from {}", handle.id(), handle.key().path());
                true
            }
            Removal::LastForKey => {
                let path = handle.key().path();
                info!("Unsubscribing from {}", path);
                let live = self.shared.live_connection();
                if let Some((conn, client_id)) =
                    live.and_then(|c| c.client_id().map(|id| (c, id)))
                {
                    conn.send(protocol::unsubscribe(&client_id, &path));
                }
                true
            }
        }
    }

    /// Tear the connection down and publish `Closed`
    pub async fn close(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        let conn = self.shared.current.lock().clone();

        let Some(conn) = conn else {
            if self.shared.state() != PushState::Closed {
                self.shared.set_state(PushState::Closed);
                self.shared.publish(PushEvent::Closed);
            }
            return;
        };

        let client_id = conn.client_id();
        if !self.shared.end(&conn, Ending::Closed) {
            return;
        }
        conn.resolve_ready(Err("closed".to_string()));

        if let Some(client_id) = client_id {
            conn.send(protocol::disconnect(&client_id));
        }
        let _ = conn.outbound.send(Outbound::Shutdown);
        let writer = conn.writer.lock().take();
        if let Some(writer) = writer {
            if timeout(WRITER_DRAIN_TIMEOUT, writer).await.is_err() {
                warn!("Push writer did not drain in time");
            }
        }
        conn.cancel.cancel();
    }
}

impl Drop for PushChannelManager {
    fn drop(&mut self) {
        if let Some(conn) = self.shared.current.lock().take() {
            conn.ended.store(true, Ordering::SeqCst);
            conn.cancel.cancel();
        }
    }
}

fn build_request(url: &str, cookie: Option<&str>) -> Result<Request> {
    let mut request = url
        .into_client_request()
        .map_err(|e| AvanzaError::InvalidConfig(format!("push url '{url}': {e}")))?;
    if let Some(cookie) = cookie {
        let value = HeaderValue::from_str(cookie)
            .map_err(|e| AvanzaError::ConnectionFailed(format!("cookie header: {e}")))?;
        request.headers_mut().insert(header::COOKIE, value);
    }
    Ok(request)
}

async fn run_writer(
    mut sink: SplitSink<WsStream, Message>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    shared: Arc<Shared>,
    conn: Arc<Connection>,
) {
    let mut next_id: u64 = 1;
    loop {
        tokio::select! {
            () = conn.cancel.cancelled() => break,
            item = outbound.recv() => match item {
                Some(Outbound::Message(message)) => {
                    let text = protocol::frame(message, next_id);
                    next_id += 1;
                    debug!("Push out: {}", text);
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        shared.connection_ended(&conn, format!("write failed: {e}"));
                        break;
                    }
                }
                Some(Outbound::Shutdown) | None => break,
            }
        }
    }
    let _ = sink.send(Message::Close(None)).await;
    let _ = sink.close().await;
}

async fn run_reader(
    mut stream: SplitStream<WsStream>,
    shared: Arc<Shared>,
    conn: Arc<Connection>,
    dispatch: mpsc::Sender<PushMessage>,
) {
    let reason = loop {
        tokio::select! {
            () = conn.cancel.cancelled() => return,
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    debug!("Push in: {}", text);
                    if let Err(reason) = handle_frame(&text, &shared, &conn, &dispatch).await {
                        break reason;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    break match frame {
                        Some(f) => format!("server closed the connection ({}: {})", f.code, f.reason),
                        None => "server closed the connection".to_string(),
                    };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break e.to_string(),
                None => break "connection reset".to_string(),
            }
        }
    };
    shared.connection_ended(&conn, reason);
}

async fn run_dispatcher(
    mut inbox: mpsc::Receiver<PushMessage>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            message = inbox.recv() => match message {
                Some(m) => m,
                None => break,
            },
        };

        let key = SubscriptionKey::new(message.channel, message.identifier.clone());
        let callbacks = shared.registry.lock().callbacks(&key);
        if callbacks.is_empty() {
            debug!("No subscriber for {}", key.path());
            continue;
        }
        for callback in callbacks {
            match catch_unwind(AssertUnwindSafe(|| callback(&message))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Subscriber for {} failed: {:#}", key.path(), e),
                Err(_) => error!("Subscriber for {} panicked", key.path()),
            }
        }
    }
}

/// Handle one inbound frame. `Err` ends the connection.
async fn handle_frame(
    text: &str,
    shared: &Shared,
    conn: &Connection,
    dispatch: &mpsc::Sender<PushMessage>,
) -> std::result::Result<(), String> {
    let messages = match protocol::parse_frame(text) {
        Ok(messages) => messages,
        Err(e) => {
            warn!("Dropping unparseable push frame: {}", e);
            return Ok(());
        }
    };

    for message in messages {
        if let Some(error) = &message.error {
            warn!("Push error on {}: {}", message.channel, error);
        }
        match message.channel.as_str() {
            meta::HANDSHAKE => on_handshake(&message, shared, conn)?,
            meta::CONNECT => on_connect(&message, shared, conn)?,
            meta::DISCONNECT => {
                info!("Server dropped the push session, handshaking again");
                conn.send_handshake();
            }
            meta::SUBSCRIBE | meta::UNSUBSCRIBE => {
                let subscription = message.subscription.as_deref().unwrap_or("?");
                if message.is_successful() {
                    debug!("{} acknowledged for {}", message.channel, subscription);
                } else {
                    warn!("{} failed for {}", message.channel, subscription);
                }
            }
            channel if message.is_meta() => debug!("Ignoring {}", channel),
            _ => match protocol::to_push_message(&message) {
                Some(push) => {
                    if dispatch.send(push).await.is_err() {
                        return Err("dispatcher stopped".to_string());
                    }
                }
                None => debug!("Dropping message on unknown channel {}", message.channel),
            },
        }
    }
    Ok(())
}

fn on_handshake(
    message: &BayeuxMessage,
    shared: &Shared,
    conn: &Connection,
) -> std::result::Result<(), String> {
    if message.is_successful() {
        let client_id = message
            .client_id
            .clone()
            .ok_or_else(|| "handshake reply without clientId".to_string())?;
        debug!("Handshake accepted");
        *conn.client_id.lock() = Some(client_id.clone());
        conn.send(protocol::initial_connect(&client_id));

        // Server-initiated re-handshake: the new client id has no subscriptions yet
        if conn.established.load(Ordering::SeqCst) {
            let keys = shared.registry.lock().keys();
            for key in keys {
                debug!("Resubscribing {}", key.path());
                conn.send(protocol::subscribe(&client_id, &key.path()));
            }
        }
        return Ok(());
    }

    if message.advises_handshake() {
        warn!("Handshake refused, server advises another handshake");
        conn.send_handshake();
        return Ok(());
    }
    Err(format!(
        "handshake rejected: {}",
        message.error.as_deref().unwrap_or("no reason given")
    ))
}

fn on_connect(
    message: &BayeuxMessage,
    shared: &Shared,
    conn: &Connection,
) -> std::result::Result<(), String> {
    let client_id = conn.client_id();

    if message.allows_reconnect() {
        let Some(client_id) = client_id else {
            return Ok(());
        };
        schedule_connect(conn, &client_id, message.interval_ms());

        if !conn.established.swap(true, Ordering::SeqCst) && !conn.ended.load(Ordering::SeqCst) {
            shared.set_state(PushState::Connected);
            shared.publish(PushEvent::Connected);
            conn.resolve_ready(Ok(()));
            info!("Push channel connected");
        }
        return Ok(());
    }

    if message.advises_handshake() {
        conn.send_handshake();
        return Ok(());
    }
    if message.reconnect_advice() == Some("none") {
        return Err("server advised against reconnecting".to_string());
    }
    match client_id {
        Some(client_id) => {
            conn.send(protocol::connect(&client_id));
            Ok(())
        }
        None => Err("connect reply before handshake".to_string()),
    }
}

fn schedule_connect(conn: &Connection, client_id: &str, interval_ms: u64) {
    let message = protocol::connect(client_id);
    if interval_ms == 0 {
        conn.send(message);
        return;
    }
    let outbound = conn.outbound.clone();
    let cancel = conn.cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            () = cancel.cancelled() => {}
            () = sleep(Duration::from_millis(interval_ms)) => {
                let _ = outbound.send(Outbound::Message(message));
            }
        }
    });
}
