//! Streaming transports for the Avanza client
//!
//! - push/: CometD push channel with subscription fan-out
//! - sse: reconnecting server-sent-events listener

#![deny(warnings)]
#![deny(clippy::all)]

pub mod push;
pub mod sse;

pub use push::{
    PushCallback, PushChannelManager, PushEvent, PushMessage, PushState, SubscriptionHandle,
    SubscriptionKey,
};
pub use sse::{SseEvent, SseListener, SseParser};
