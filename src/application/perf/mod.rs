//! Request performance tracking and periodic summaries.

pub mod flusher;
pub mod summary;
pub mod tracker;

pub use flusher::SummaryFlusher;
pub use summary::{LatencyStats, PerfSummary};
pub use tracker::PerformanceTracker;
