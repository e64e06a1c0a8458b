//! Infrastructure configuration modules.

pub mod limits;
pub mod logging;
pub mod settings;
pub mod telemetry;
pub mod transport;

pub use limits::{BucketConfig, LimitsConfig, PenaltyConfig, WindowConfig, DEFAULT_BUCKET};
pub use logging::LoggingConfig;
pub use settings::Config;
pub use telemetry::PerfConfig;
pub use transport::TransportConfig;
