//! Trait definitions (hexagonal ports). Depend only on domain.
//!
//! # Available Ports
//!
//! - [`Clock`] - Time source and sleep, injectable for deterministic tests
//! - [`Dispatcher`] - Executes a single HTTP attempt over a worker session
//! - [`OutcomeRecorder`] - Best-effort sink for request outcome samples

pub mod outbound;

pub use outbound::clock::Clock;
pub use outbound::dispatch::{DispatchError, Dispatcher};
pub use outbound::telemetry::OutcomeRecorder;
