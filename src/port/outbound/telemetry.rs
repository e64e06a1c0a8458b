//! Telemetry port.

use crate::domain::OutcomeSample;

/// Receives one sample per terminal request outcome.
///
/// Implementations must not block and must never fail the caller; telemetry
/// is best-effort.
pub trait OutcomeRecorder: Send + Sync {
    fn record(&self, sample: OutcomeSample);
}
