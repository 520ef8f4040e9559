//! Scripted CometD push server over a local websocket
//!
//! Answers handshakes, acknowledges subscribe/unsubscribe, answers the first
//! `/meta/connect` of every handshake and holds the rest (like a long-poll
//! that never times out). Tests push data frames and drop connections through
//! the command methods and inspect every control message the client sent.

use anyhow::{Result, anyhow};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tracing::debug;

/// How the server answers `/meta/handshake`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandshakeBehaviour {
    /// Successful handshake with a client id
    #[default]
    Accept,
    /// Unsuccessful handshake without retry advice
    Reject,
    /// Never answer
    Ignore,
}

enum ServerCommand {
    Send(String),
    Drop,
    Close,
}

#[derive(Default)]
struct Recorded {
    cookies: Vec<Option<String>>,
    messages: Vec<Value>,
    connections: usize,
}

struct Shared {
    behaviour: HandshakeBehaviour,
    recorded: Mutex<Recorded>,
    current: Mutex<Option<mpsc::UnboundedSender<ServerCommand>>>,
}

/// Local CometD push server
pub struct MockPushServer {
    addr: SocketAddr,
    shared: Arc<Shared>,
    accept_task: JoinHandle<()>,
}

impl std::fmt::Debug for MockPushServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPushServer")
            .field("addr", &self.addr)
            .field("behaviour", &self.shared.behaviour)
            .finish()
    }
}

impl MockPushServer {
    /// Start a server that accepts handshakes
    pub async fn start() -> Result<Self> {
        Self::start_with(HandshakeBehaviour::Accept).await
    }

    /// Start a server with a specific handshake behaviour
    pub async fn start_with(behaviour: HandshakeBehaviour) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shared = Arc::new(Shared {
            behaviour,
            recorded: Mutex::new(Recorded::default()),
            current: Mutex::new(None),
        });

        let accept_shared = Arc::clone(&shared);
        let accept_task = tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(v) => v,
                    Err(_) => continue,
                };
                let shared = Arc::clone(&accept_shared);
                tokio::spawn(async move {
                    serve_connection(stream, shared).await;
                });
            }
        });

        Ok(Self {
            addr,
            shared,
            accept_task,
        })
    }

    /// URL to put in `ClientConfig::push_url`
    #[must_use]
    pub fn url(&self) -> String {
        format!("ws://{}/_push/cometd", self.addr)
    }

    /// Push one data message on `channel`
    ///
    /// # Errors
    /// Fails when no client is connected
    pub fn publish(&self, channel: &str, data: Value) -> Result<()> {
        self.send_raw(json!([{ "channel": channel, "data": data }]).to_string())
    }

    /// Push several data messages batched into one frame
    ///
    /// # Errors
    /// Fails when no client is connected
    pub fn publish_batch(&self, messages: &[(&str, Value)]) -> Result<()> {
        let batch: Vec<Value> = messages
            .iter()
            .map(|(channel, data)| json!({ "channel": channel, "data": data }))
            .collect();
        self.send_raw(Value::Array(batch).to_string())
    }

    /// Tell the client its server-side session is gone
    ///
    /// # Errors
    /// Fails when no client is connected
    pub fn send_disconnect(&self) -> Result<()> {
        self.send_raw(json!([{ "channel": "/meta/disconnect", "successful": true }]).to_string())
    }

    /// Send an arbitrary text frame
    ///
    /// # Errors
    /// Fails when no client is connected
    pub fn send_raw(&self, text: String) -> Result<()> {
        self.command(ServerCommand::Send(text))
    }

    /// Drop the TCP connection without a close frame
    ///
    /// # Errors
    /// Fails when no client is connected
    pub fn drop_connection(&self) -> Result<()> {
        self.command(ServerCommand::Drop)
    }

    /// Close the connection with a websocket close frame
    ///
    /// # Errors
    /// Fails when no client is connected
    pub fn close_connection(&self) -> Result<()> {
        self.command(ServerCommand::Close)
    }

    fn command(&self, command: ServerCommand) -> Result<()> {
        let current = self.shared.current.lock();
        let sender = current.as_ref().ok_or_else(|| anyhow!("no client connected"))?;
        sender
            .send(command)
            .map_err(|_| anyhow!("client connection already gone"))
    }

    /// Whether a client connection is currently open
    #[must_use]
    pub fn is_client_connected(&self) -> bool {
        self.shared
            .current
            .lock()
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Total websocket connections accepted
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.shared.recorded.lock().connections
    }

    /// `Cookie` header of every accepted connection
    #[must_use]
    pub fn cookies(&self) -> Vec<Option<String>> {
        self.shared.recorded.lock().cookies.clone()
    }

    /// Every message received from clients, in arrival order
    #[must_use]
    pub fn messages(&self) -> Vec<Value> {
        self.shared.recorded.lock().messages.clone()
    }

    /// Messages received on one meta channel
    #[must_use]
    pub fn messages_on(&self, channel: &str) -> Vec<Value> {
        self.messages()
            .into_iter()
            .filter(|m| m.get("channel").and_then(Value::as_str) == Some(channel))
            .collect()
    }

    /// `subscription` fields of all `/meta/subscribe` messages
    #[must_use]
    pub fn subscriptions(&self) -> Vec<String> {
        subscription_fields(&self.messages_on("/meta/subscribe"))
    }

    /// `subscription` fields of all `/meta/unsubscribe` messages
    #[must_use]
    pub fn unsubscriptions(&self) -> Vec<String> {
        subscription_fields(&self.messages_on("/meta/unsubscribe"))
    }
}

impl Drop for MockPushServer {
    fn drop(&mut self) {
        self.accept_task.abort();
        if let Some(tx) = self.shared.current.lock().take() {
            let _ = tx.send(ServerCommand::Drop);
        }
    }
}

fn subscription_fields(messages: &[Value]) -> Vec<String> {
    messages
        .iter()
        .filter_map(|m| m.get("subscription").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

async fn serve_connection(stream: TcpStream, shared: Arc<Shared>) {
    let cookie = Arc::new(Mutex::new(None));
    let cookie_slot = Arc::clone(&cookie);
    let callback = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        *cookie_slot.lock() = request
            .headers()
            .get("cookie")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(response)
    };

    let Ok(ws) = accept_hdr_async(stream, callback).await else {
        return;
    };

    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();
    let connection_id = {
        let mut recorded = shared.recorded.lock();
        recorded.connections += 1;
        recorded.cookies.push(cookie.lock().take());
        recorded.connections
    };
    *shared.current.lock() = Some(cmd_tx);
    debug!("mock push server accepted connection {}", connection_id);

    let (mut writer, mut reader) = ws.split();
    let mut connect_answered = false;

    loop {
        tokio::select! {
            frame = reader.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => continue,
                };
                let Ok(parsed) = serde_json::from_str::<Value>(&text) else {
                    continue;
                };
                let messages = match parsed {
                    Value::Array(items) => items,
                    other => vec![other],
                };

                let mut replies = Vec::new();
                for message in messages {
                    shared.recorded.lock().messages.push(message.clone());
                    if let Some(reply) = reply_to(
                        &message,
                        shared.behaviour,
                        connection_id,
                        &mut connect_answered,
                    ) {
                        replies.push(reply);
                    }
                }
                if !replies.is_empty()
                    && writer.send(Message::Text(Value::Array(replies).to_string())).await.is_err()
                {
                    break;
                }
            }
            command = cmd_rx.recv() => {
                match command {
                    Some(ServerCommand::Send(text)) => {
                        if writer.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Some(ServerCommand::Close) => {
                        let _ = writer.send(Message::Close(None)).await;
                        break;
                    }
                    Some(ServerCommand::Drop) | None => break,
                }
            }
        }
    }
    debug!("mock push server closed connection {}", connection_id);
}

fn reply_to(
    message: &Value,
    behaviour: HandshakeBehaviour,
    connection_id: usize,
    connect_answered: &mut bool,
) -> Option<Value> {
    let channel = message.get("channel").and_then(Value::as_str)?;
    let id = message.get("id").cloned().unwrap_or(Value::Null);
    let client_id = format!("client-{connection_id}");

    match channel {
        "/meta/handshake" => match behaviour {
            HandshakeBehaviour::Accept => {
                *connect_answered = false;
                Some(json!({
                    "id": id,
                    "channel": channel,
                    "successful": true,
                    "version": "1.0",
                    "clientId": client_id,
                    "supportedConnectionTypes": ["websocket"],
                    "advice": { "reconnect": "retry", "interval": 0, "timeout": 30000 },
                }))
            }
            HandshakeBehaviour::Reject => Some(json!({
                "id": id,
                "channel": channel,
                "successful": false,
                "error": "403::Handshake denied",
                "advice": { "reconnect": "none" },
            })),
            HandshakeBehaviour::Ignore => None,
        },
        "/meta/connect" => {
            if *connect_answered {
                return None;
            }
            *connect_answered = true;
            Some(json!({
                "id": id,
                "channel": channel,
                "successful": true,
                "clientId": client_id,
                "advice": { "reconnect": "retry", "interval": 0, "timeout": 30000 },
            }))
        }
        "/meta/subscribe" | "/meta/unsubscribe" => Some(json!({
            "id": id,
            "channel": channel,
            "successful": true,
            "clientId": client_id,
            "subscription": message.get("subscription").cloned().unwrap_or(Value::Null),
        })),
        "/meta/disconnect" => Some(json!({
            "id": id,
            "channel": channel,
            "successful": true,
        })),
        _ => None,
    }
}
