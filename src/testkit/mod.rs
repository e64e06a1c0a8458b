//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests).
//!
//! # Modules
//!
//! - [`clock`] - `ManualClock`, a virtual [`Clock`](crate::port::Clock).
//! - [`dispatch`] - `ScriptedDispatcher`, queued replies and attempt counters.
//! - [`telemetry`] - `CollectingRecorder` for outcome samples.
//! - [`config`] - Canonical test configurations.

pub mod clock;
pub mod config;
pub mod dispatch;
pub mod telemetry;
