//! Avanza brokerage client
//!
//! Logs in with username, password and TOTP, exposes the authenticated REST
//! catalogue and fans real-time push messages out to subscriber callbacks.
//!
//! ```ignore
//! let avanza = Avanza::from_env().await?;
//! let overview = avanza.overview().await?;
//! avanza
//!     .subscribe_to_id(ChannelType::Quotes, "19002", |msg| {
//!         println!("{}", msg.data);
//!         Ok(())
//!     })
//!     .await?;
//! ```

#![deny(warnings)]
#![deny(clippy::all)]

pub mod client;
pub mod endpoints;

pub use client::Avanza;
pub use endpoints::OrderRequest;

pub use auth::{Credentials, Session, TotpSource};
pub use common::{
    AvanzaError, ChannelType, ClientConfig, HttpMethod, InstrumentType, ListType, OrderType,
    Result, TimePeriod, TransactionType,
};
pub use feeds::{PushEvent, PushMessage, PushState, SseEvent, SseListener, SubscriptionHandle};
