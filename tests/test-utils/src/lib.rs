//! Test utilities and fixtures for the Avanza client workspace
//!
//! - Fixture constants shared by the integration suites
//! - A wiremock-backed brokerage answering the login flow
//! - A scripted CometD push server over a local websocket
//! - Logging and polling helpers

pub mod fixtures;
pub mod helpers;
pub mod mocks;
pub mod push_server;

pub use fixtures::*;
pub use helpers::*;
pub use mocks::*;
pub use push_server::*;
