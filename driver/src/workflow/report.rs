use crate::workflow::config::WorkflowConfig;
use crate::workflow::runner::WorkflowResult;
use anyhow::Context;
use qmricore::processing::{PipelineState, StageRecord};
use qmricore::telemetry::Metrics;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// JSON summary of a finished MTsat run.
#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub output: &'a Path,
    pub state: PipelineState,
    pub config: &'a WorkflowConfig,
    pub metrics: Metrics,
    pub stages: &'a [StageRecord],
    /// Present only when the scratch directory outlives the run.
    pub scratch: Option<PathBuf>,
}

impl<'a> RunReport<'a> {
    pub fn new(config: &'a WorkflowConfig, result: &'a WorkflowResult) -> Self {
        Self {
            output: &result.written,
            state: result.state,
            config,
            metrics: result.metrics,
            stages: &result.stages,
            scratch: result
                .scratch
                .exists()
                .then(|| result.scratch.clone()),
        }
    }

    pub fn write(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self).context("serializing run report")?;
        std::fs::write(path, json)
            .with_context(|| format!("writing run report {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qmricore::prelude::StageMetadata;

    #[test]
    fn report_lists_stages_and_metrics() {
        let config = WorkflowConfig::default();
        let result = WorkflowResult {
            written: PathBuf::from("out/mtsat.nii"),
            state: PipelineState::Written,
            stages: vec![StageRecord {
                name: "saturation",
                reached: PipelineState::Saturated,
                elapsed_ms: 1.5,
                metadata: StageMetadata {
                    degenerate_voxels: Some(2),
                    ..Default::default()
                },
            }],
            metrics: Metrics {
                stages_completed: 5,
                failures: 0,
                degenerate_voxels: 2,
            },
            scratch: PathBuf::from("out/qmri-scratch-gone"),
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        RunReport::new(&config, &result).write(&path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["state"], "Written");
        assert_eq!(json["metrics"]["degenerate_voxels"], 2);
        assert_eq!(json["stages"][0]["name"], "saturation");
        assert_eq!(json["config"]["retention"], "discard");
        assert!(json["scratch"].is_null());
    }
}
