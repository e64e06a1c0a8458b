//! Resilient HTTP transport: worker sessions, retries and backoff.

pub mod backoff;
pub mod executor;
pub mod session;

pub use backoff::Backoff;
pub use executor::ResilientTransport;
pub use session::{Session, SessionPool};
