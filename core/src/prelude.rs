use crate::math::stats::VolumeStats;
use crate::processing::state::PipelineState;
use crate::volume::{DerivedMap, MapKind, VolumeSet};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Shared configuration for each processing stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageConfig {
    pub single_echo: bool,
    pub smoothing_extent: usize,
}

/// Maps produced by the formula stages so far.
#[derive(Debug, Clone, Default)]
pub struct MapSet {
    pub relaxation_rate: Option<DerivedMap>,
    pub amplitude: Option<DerivedMap>,
    pub saturation: Option<DerivedMap>,
}

impl MapSet {
    pub fn get(&self, kind: MapKind) -> Option<&DerivedMap> {
        match kind {
            MapKind::RelaxationRate => self.relaxation_rate.as_ref(),
            MapKind::Amplitude => self.amplitude.as_ref(),
            MapKind::Saturation => self.saturation.as_ref(),
        }
    }

    pub fn insert(&mut self, map: DerivedMap) {
        let slot = match map.kind() {
            MapKind::RelaxationRate => &mut self.relaxation_rate,
            MapKind::Amplitude => &mut self.amplitude,
            MapKind::Saturation => &mut self.saturation,
        };
        *slot = Some(map);
    }

    pub fn iter(&self) -> impl Iterator<Item = &DerivedMap> {
        [&self.relaxation_rate, &self.amplitude, &self.saturation]
            .into_iter()
            .flatten()
    }
}

/// Input payload for a processing stage.
#[derive(Debug, Clone)]
pub struct StageInput {
    pub volumes: VolumeSet,
    pub maps: MapSet,
}

impl StageInput {
    pub fn new(volumes: VolumeSet) -> Self {
        Self {
            volumes,
            maps: MapSet::default(),
        }
    }
}

/// Output produced by each stage.
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub volumes: VolumeSet,
    pub maps: MapSet,
    pub metadata: StageMetadata,
}

impl From<StageOutput> for StageInput {
    fn from(output: StageOutput) -> Self {
        Self {
            volumes: output.volumes,
            maps: output.maps,
        }
    }
}

/// Metadata used for chaining stages and telemetry.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StageMetadata {
    /// Voxels of the produced map whose value is NaN or infinite.
    pub degenerate_voxels: Option<usize>,
    pub summary: Option<VolumeStats>,
    pub notes: Vec<String>,
}

/// Common error type for stage execution.
#[derive(thiserror::Error, Debug)]
pub enum StageError {
    #[error("conversion failure: {0}")]
    ConversionFailure(String),
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
    #[error("external tool `{tool}` failed: {detail}")]
    ExternalToolFailure { tool: String, detail: String },
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("internal failure: {0}")]
    Internal(String),
}

impl StageError {
    /// Prefixes the message of text-carrying variants, e.g. with the contrast it concerns.
    pub fn context(self, prefix: impl Display) -> Self {
        match self {
            Self::ConversionFailure(m) => Self::ConversionFailure(format!("{}: {}", prefix, m)),
            Self::ShapeMismatch(m) => Self::ShapeMismatch(format!("{}: {}", prefix, m)),
            Self::InvalidParameter(m) => Self::InvalidParameter(format!("{}: {}", prefix, m)),
            Self::Internal(m) => Self::Internal(format!("{}: {}", prefix, m)),
            other => other,
        }
    }
}

pub type StageResult<T> = Result<T, StageError>;

/// Trait describing the pipeline's processing stages.
pub trait ProcessingStage {
    fn name(&self) -> &'static str;
    /// Pipeline state reached once this stage has executed successfully.
    fn reaches(&self) -> PipelineState;
    fn initialize(&mut self, config: &StageConfig) -> StageResult<()>;
    fn execute(&mut self, input: StageInput) -> StageResult<StageOutput>;
    fn cleanup(&mut self);
}
