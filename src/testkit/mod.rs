//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests).
//!
//! # Modules
//!
//! - [`transport`] - [`ScriptedTransport`](transport::ScriptedTransport), a
//!   channel-driven [`Transport`](crate::stream::Transport) with a remote
//!   control handle.
//! - [`domain`] - Builders for positions, accounts and envelopes.
//! - [`config`] - Canonical test configurations.

pub mod config;
pub mod domain;
pub mod transport;
