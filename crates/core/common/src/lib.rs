//! Common types for the Avanza client workspace
//!
//! Error taxonomy, wire constants, channel/instrument enumerations and the
//! client configuration shared by `auth`, `feeds` and `avanza-client`.

#![deny(warnings)]
#![deny(clippy::all)]

pub mod config;
pub mod constants;
pub mod errors;
pub mod types;

pub use config::ClientConfig;
pub use errors::{AvanzaError, Result};
pub use types::{
    ChannelType, HttpMethod, InstrumentType, ListType, OrderType, TimePeriod, TransactionType,
};
