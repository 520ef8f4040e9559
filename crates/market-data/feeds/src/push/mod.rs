//! Real-time push channel (CometD over WebSocket)

pub mod manager;
pub mod protocol;
pub mod registry;

pub use manager::{PushChannelManager, PushEvent, PushState};
pub use protocol::PushMessage;
pub use registry::{PushCallback, SubscriptionHandle, SubscriptionKey};
