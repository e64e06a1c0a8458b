//! Application services (use cases).
//!
//! These services orchestrate domain logic and coordinate adapters
//! through the ports.

pub mod limiter;
pub mod perf;
pub mod transport;
