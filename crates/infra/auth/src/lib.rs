//! Avanza Authentication Module
//!
//! Credential store, TOTP codes, two-step session negotiation and the
//! authenticated request gateway.

#![deny(warnings)]
#![deny(clippy::all)]
#![allow(clippy::multiple_crate_versions)]

pub mod credentials;
pub mod gateway;
pub mod negotiator;
pub mod session;
pub mod totp;

pub use credentials::{Credentials, TotpSource};
pub use gateway::RequestGateway;
pub use negotiator::SessionNegotiator;
pub use session::Session;
