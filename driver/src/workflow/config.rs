use anyhow::Context;
use qmricore::io::{AcquisitionSource, MapFormat, SourceSet, DEFAULT_CONVERTER};
use qmricore::prelude::StageConfig;
use qmricore::volume::{AcquisitionParameters, Contrast};
use qmricore::workspace::Retention;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Protocol and run options for one MTsat workflow.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub single_echo: bool,
    pub smoothing_extent: usize,
    pub t1: AcquisitionParameters,
    pub pd: AcquisitionParameters,
    pub mt: AcquisitionParameters,
    pub retention: Retention,
    pub format: Option<MapFormat>,
    pub converter: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            single_echo: false,
            smoothing_extent: 0,
            t1: AcquisitionParameters::default_for(Contrast::T1),
            pd: AcquisitionParameters::default_for(Contrast::Pd),
            mt: AcquisitionParameters::default_for(Contrast::Mt),
            retention: Retention::Discard,
            format: None,
            converter: DEFAULT_CONVERTER.to_string(),
        }
    }
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    /// Flip angles (degrees) and TRs (ms) are given in T1, PD, MT order.
    pub fn from_args(
        single_echo: bool,
        smoothing_extent: usize,
        flip_angles: [f64; 3],
        repetition_times: [f64; 3],
    ) -> anyhow::Result<Self> {
        let params = |i: usize, contrast: Contrast| {
            AcquisitionParameters::new(flip_angles[i], repetition_times[i])
                .with_context(|| format!("{} acquisition parameters", contrast))
        };
        Ok(Self {
            single_echo,
            smoothing_extent,
            t1: params(0, Contrast::T1)?,
            pd: params(1, Contrast::Pd)?,
            mt: params(2, Contrast::Mt)?,
            ..Self::default()
        })
    }

    pub fn to_stage_config(&self) -> StageConfig {
        StageConfig {
            single_echo: self.single_echo,
            smoothing_extent: self.smoothing_extent,
        }
    }

    pub fn sources(&self, t1: &Path, pd: &Path, mt: &Path) -> SourceSet {
        SourceSet {
            t1: AcquisitionSource::new(t1, self.t1),
            pd: AcquisitionSource::new(pd, self.pd),
            mt: AcquisitionSource::new(mt, self.mt),
        }
    }
}

/// Input and output paths of one MTsat run.
#[derive(Clone, Debug)]
pub struct MtsatJob {
    pub t1: PathBuf,
    pub pd: PathBuf,
    pub mt: PathBuf,
    pub output: PathBuf,
}
