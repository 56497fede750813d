use serde::Serialize;
use std::sync::Mutex;

pub struct MetricsRecorder {
    inner: Mutex<Metrics>,
}

/// Counters accumulated over one pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Metrics {
    pub stages_completed: usize,
    pub failures: usize,
    pub degenerate_voxels: usize,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Metrics::default()),
        }
    }

    pub fn record_stage(&self, degenerate_voxels: usize) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.stages_completed += 1;
            metrics.degenerate_voxels += degenerate_voxels;
        }
    }

    pub fn record_failure(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.failures += 1;
        }
    }

    pub fn snapshot(&self) -> Metrics {
        if let Ok(metrics) = self.inner.lock() {
            *metrics
        } else {
            Metrics::default()
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let recorder = MetricsRecorder::new();
        recorder.record_stage(0);
        recorder.record_stage(3);
        recorder.record_failure();
        let snapshot = recorder.snapshot();
        assert_eq!(snapshot.stages_completed, 2);
        assert_eq!(snapshot.degenerate_voxels, 3);
        assert_eq!(snapshot.failures, 1);
    }
}
