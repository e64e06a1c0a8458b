//! In-memory [`OutcomeRecorder`].

use parking_lot::Mutex;

use crate::domain::OutcomeSample;
use crate::port::OutcomeRecorder;

/// Keeps every recorded sample for assertions.
#[derive(Debug, Default)]
pub struct CollectingRecorder {
    samples: Mutex<Vec<OutcomeSample>>,
}

impl CollectingRecorder {
    pub fn samples(&self) -> Vec<OutcomeSample> {
        self.samples.lock().clone()
    }
}

impl OutcomeRecorder for CollectingRecorder {
    fn record(&self, sample: OutcomeSample) {
        self.samples.lock().push(sample);
    }
}
