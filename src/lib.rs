//! Live dashboard client for a tuning server: polls session data, merges it
//! into an append-only store keyed by runtime-discovered variables, and keeps a
//! fixed-size table and a chart in sync with it.

pub mod config;
pub mod logging;
pub mod registry;
pub mod session;
pub mod store;
pub mod sync;
pub mod view;
pub mod wire;
