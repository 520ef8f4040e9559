//! Callback registry for push subscriptions
//!
//! Several callbacks may share one `(channel, identifier)` key while the
//! server only sees a single subscription for it. The registry reports the
//! 0→1 and 1→0 transitions so the manager knows when to send the
//! subscribe/unsubscribe control messages.

use super::protocol::{PushMessage, subscription_path};
use common::ChannelType;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// User callback invoked for every message on a subscribed key
pub type PushCallback = Arc<dyn Fn(&PushMessage) -> anyhow::Result<()> + Send + Sync>;

/// Subscription key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    pub channel: ChannelType,
    pub identifier: String,
}

impl SubscriptionKey {
    #[must_use]
    pub fn new(channel: ChannelType, identifier: impl Into<String>) -> Self {
        Self {
            channel,
            identifier: identifier.into(),
        }
    }

    /// `/<channel>/<identifier>`
    #[must_use]
    pub fn path(&self) -> String {
        subscription_path(self.channel, &self.identifier)
    }
}

/// Proof of one registered callback, used to remove exactly that callback
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: u64,
    key: SubscriptionKey,
}

impl SubscriptionHandle {
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub const fn channel(&self) -> ChannelType {
        self.key.channel
    }

    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.key.identifier
    }

    #[must_use]
    pub const fn key(&self) -> &SubscriptionKey {
        &self.key
    }
}

/// Result of removing a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// Other callbacks remain on the key
    Remaining,
    /// The key has no callbacks left
    LastForKey,
    /// Handle unknown (already removed or registry cleared)
    Unknown,
}

/// Ordered callbacks per key
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: FxHashMap<SubscriptionKey, Vec<(u64, PushCallback)>>,
    next_id: u64,
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("keys", &self.entries.len())
            .field("callbacks", &self.callback_count())
            .finish()
    }
}

impl SubscriptionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback. The flag is true when this is the first
    /// callback for the key.
    pub fn add(&mut self, key: SubscriptionKey, callback: PushCallback) -> (SubscriptionHandle, bool) {
        self.next_id += 1;
        let id = self.next_id;
        let callbacks = self.entries.entry(key.clone()).or_default();
        let first = callbacks.is_empty();
        callbacks.push((id, callback));
        (SubscriptionHandle { id, key }, first)
    }

    /// Remove exactly the callback behind `handle`
    pub fn remove(&mut self, handle: &SubscriptionHandle) -> Removal {
        let Some(callbacks) = self.entries.get_mut(&handle.key) else {
            return Removal::Unknown;
        };
        let Some(pos) = callbacks.iter().position(|(id, _)| *id == handle.id) else {
            return Removal::Unknown;
        };
        callbacks.remove(pos);
        if callbacks.is_empty() {
            self.entries.remove(&handle.key);
            Removal::LastForKey
        } else {
            Removal::Remaining
        }
    }

    /// Snapshot of the callbacks for a key, in registration order
    #[must_use]
    pub fn callbacks(&self, key: &SubscriptionKey) -> Vec<PushCallback> {
        self.entries
            .get(key)
            .map(|cbs| cbs.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default()
    }

    /// Keys with at least one callback
    #[must_use]
    pub fn keys(&self) -> Vec<SubscriptionKey> {
        self.entries.keys().cloned().collect()
    }

    #[must_use]
    pub fn contains(&self, key: &SubscriptionKey) -> bool {
        self.entries.contains_key(key)
    }

    #[must_use]
    pub fn callback_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget every subscription
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
