//! Rate limiting: token bucket limiters, named buckets and the heartbeat.

pub mod heartbeat;
pub mod rate;
pub mod registry;
pub mod snapshot;

pub use heartbeat::Heartbeat;
pub use rate::{Admission, RateLimiter};
pub use registry::LimiterRegistry;
pub use snapshot::{LimiterSnapshot, WindowSnapshot};
