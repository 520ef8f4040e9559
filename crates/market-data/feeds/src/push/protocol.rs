//! CometD (Bayeux) message builders and frame parsing

use common::constants::meta;
use common::{AvanzaError, ChannelType, Result};
use serde::Deserialize;
use serde_json::{Value, json};
use std::str::FromStr;

/// Server advice attached to meta replies
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct Advice {
    /// `retry`, `handshake` or `none`
    pub reconnect: Option<String>,
    /// Milliseconds to wait before the next connect
    pub interval: Option<i64>,
    /// Server-side long-poll timeout
    pub timeout: Option<i64>,
}

/// One inbound Bayeux message
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BayeuxMessage {
    pub channel: String,
    #[serde(default)]
    pub successful: Option<bool>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub advice: Option<Advice>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl BayeuxMessage {
    /// Meta channels carry protocol replies, everything else is data
    #[must_use]
    pub fn is_meta(&self) -> bool {
        self.channel.starts_with("/meta/")
    }

    #[must_use]
    pub fn is_successful(&self) -> bool {
        self.successful.unwrap_or(false)
    }

    /// `advice.reconnect`, if present
    #[must_use]
    pub fn reconnect_advice(&self) -> Option<&str> {
        self.advice.as_ref().and_then(|a| a.reconnect.as_deref())
    }

    /// Server asks for a fresh handshake
    #[must_use]
    pub fn advises_handshake(&self) -> bool {
        self.reconnect_advice() == Some("handshake")
    }

    /// Successful connect whose advice (if any) allows the next long-poll
    #[must_use]
    pub fn allows_reconnect(&self) -> bool {
        if !self.is_successful() {
            return false;
        }
        match &self.advice {
            None => true,
            Some(advice) if advice.reconnect.is_none() && advice.interval.is_none() => true,
            Some(advice) => {
                advice.reconnect.as_deref() == Some("retry")
                    && advice.interval.is_some_and(|i| i >= 0)
            }
        }
    }

    /// Delay requested before the next connect
    #[must_use]
    pub fn interval_ms(&self) -> u64 {
        self.advice
            .as_ref()
            .and_then(|a| a.interval)
            .map_or(0, |i| u64::try_from(i).unwrap_or(0))
    }
}

/// A data message routed to subscribers
#[derive(Debug, Clone, PartialEq)]
pub struct PushMessage {
    /// Channel family
    pub channel: ChannelType,
    /// Order book, account or comma-joined ids
    pub identifier: String,
    /// Message payload
    pub data: Value,
}

/// `/<channel>/<ids>`
#[must_use]
pub fn subscription_path(channel: ChannelType, identifier: &str) -> String {
    format!("/{}/{}", channel.as_str(), identifier)
}

/// Split `/<channel>/<ids>` back into its parts
///
/// # Errors
/// `InvalidSubscription` for malformed paths or unknown channels
pub fn parse_subscription_path(path: &str) -> Result<(ChannelType, String)> {
    let (channel, identifier) = path
        .strip_prefix('/')
        .and_then(|rest| rest.split_once('/'))
        .filter(|(_, id)| !id.is_empty())
        .ok_or_else(|| AvanzaError::InvalidSubscription(path.to_string()))?;
    let channel = ChannelType::from_str(channel)
        .map_err(|_| AvanzaError::InvalidSubscription(path.to_string()))?;
    Ok((channel, identifier.to_string()))
}

/// Handshake carrying the push subscription id
#[must_use]
pub fn handshake(push_subscription_id: &str) -> Value {
    json!({
        "advice": { "timeout": 60000, "interval": 0 },
        "channel": meta::HANDSHAKE,
        "ext": { "subscriptionId": push_subscription_id },
        "minimumVersion": "1.0",
        "supportedConnectionTypes": ["websocket", "long-polling", "callback-polling"],
        "version": "1.0",
    })
}

/// First connect after a handshake
#[must_use]
pub fn initial_connect(client_id: &str) -> Value {
    json!({
        "advice": { "timeout": 0 },
        "channel": meta::CONNECT,
        "clientId": client_id,
        "connectionType": "websocket",
    })
}

/// Long-poll heartbeat
#[must_use]
pub fn connect(client_id: &str) -> Value {
    json!({
        "channel": meta::CONNECT,
        "clientId": client_id,
        "connectionType": "websocket",
    })
}

#[must_use]
pub fn subscribe(client_id: &str, subscription: &str) -> Value {
    json!({
        "channel": meta::SUBSCRIBE,
        "clientId": client_id,
        "subscription": subscription,
    })
}

#[must_use]
pub fn unsubscribe(client_id: &str, subscription: &str) -> Value {
    json!({
        "channel": meta::UNSUBSCRIBE,
        "clientId": client_id,
        "subscription": subscription,
    })
}

#[must_use]
pub fn disconnect(client_id: &str) -> Value {
    json!({
        "channel": meta::DISCONNECT,
        "clientId": client_id,
    })
}

/// Wrap one outbound message into a frame, stamping its id
#[must_use]
pub fn frame(mut message: Value, id: u64) -> String {
    if let Value::Object(map) = &mut message {
        map.insert("id".to_string(), Value::String(id.to_string()));
    }
    Value::Array(vec![message]).to_string()
}

/// Parse one text frame; servers may batch messages in an array
///
/// # Errors
/// `UnexpectedResponseShape` when the frame is not JSON or a message has no
/// channel
pub fn parse_frame(text: &str) -> Result<Vec<BayeuxMessage>> {
    let value: Value = serde_json::from_str(text)?;
    let items = match value {
        Value::Array(items) => items,
        single @ Value::Object(_) => vec![single],
        other => {
            return Err(AvanzaError::UnexpectedResponseShape(format!(
                "push frame is neither object nor array: {other}"
            )));
        }
    };
    items
        .into_iter()
        .map(|item| serde_json::from_value(item).map_err(AvanzaError::from))
        .collect()
}

/// Turn a data message into a routed `PushMessage`
#[must_use]
pub fn to_push_message(message: &BayeuxMessage) -> Option<PushMessage> {
    if message.is_meta() {
        return None;
    }
    let (channel, identifier) = parse_subscription_path(&message.channel).ok()?;
    Some(PushMessage {
        channel,
        identifier,
        data: message.data.clone().unwrap_or(Value::Null),
    })
}
