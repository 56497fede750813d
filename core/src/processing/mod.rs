pub mod amplitude;
pub mod averaging;
pub mod pipeline;
pub mod relaxation;
pub mod saturation;
pub mod smoothing;
pub mod state;

pub use amplitude::AmplitudeStage;
pub use averaging::EchoAveragingStage;
pub use pipeline::{Pipeline, PipelineError, PipelineRun, StageEvent, StageRecord};
pub use relaxation::RelaxationRateStage;
pub use saturation::SaturationStage;
pub use smoothing::SmoothingStage;
pub use state::PipelineState;

use crate::prelude::{StageConfig, StageError};
use crate::volume::{DerivedMap, VolumeSet};

/// Runs the standard stage sequence and returns the MTsat map.
pub fn derive_mtsat(volumes: VolumeSet, config: StageConfig) -> Result<DerivedMap, PipelineError> {
    Pipeline::new(config)
        .run(volumes)?
        .into_saturation()
        .ok_or_else(|| PipelineError {
            stage: "saturation",
            source: StageError::Internal("no MTsat map was produced".into()),
        })
}
