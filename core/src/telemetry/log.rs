use crate::volume::MapKind;
use log::{info, warn};

/// Stage-scoped front end to the `log` facade.
pub struct LogManager {
    scope: &'static str,
}

impl LogManager {
    pub fn new(scope: &'static str) -> Self {
        Self { scope }
    }

    pub fn record(&self, message: &str) {
        info!("[{}] {}", self.scope, message);
    }

    pub fn warn(&self, message: &str) {
        warn!("[{}] {}", self.scope, message);
    }

    /// Reports NaN/infinite voxels left behind by a zero denominator.
    pub fn degenerate(&self, kind: MapKind, count: usize, total: usize) {
        if count > 0 {
            self.warn(&format!(
                "{} map has {} of {} voxels with a degenerate denominator",
                kind, count, total
            ));
        }
    }
}
