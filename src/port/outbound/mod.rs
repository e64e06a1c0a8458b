//! Outbound ports (driven side): interfaces implemented by outbound adapters.
//!
//! These contracts describe the infrastructure the limiter and transport
//! depend on: time, the HTTP wire, and telemetry.

pub mod clock;
pub mod dispatch;
pub mod telemetry;
