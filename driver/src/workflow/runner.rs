use crate::workflow::config::{MtsatJob, WorkflowConfig};
use anyhow::Context;
use qmricore::diffusion::{DtiOutputs, DtiSummary, DtiWorkflow};
use qmricore::io::{MapWriter, VolumeLoader};
use qmricore::processing::{Pipeline, PipelineState, StageRecord};
use qmricore::telemetry::Metrics;
use qmricore::tools::{SystemToolRunner, ToolRunner};
use qmricore::workspace::{Retention, ScratchSpace};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct WorkflowResult {
    pub written: PathBuf,
    pub state: PipelineState,
    pub stages: Vec<StageRecord>,
    pub metrics: Metrics,
    pub scratch: PathBuf,
}

pub struct Runner<R = SystemToolRunner> {
    config: WorkflowConfig,
    tools: R,
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> Self {
        Self::with_tools(config, SystemToolRunner)
    }
}

impl<R: ToolRunner> Runner<R> {
    pub fn with_tools(config: WorkflowConfig, tools: R) -> Self {
        Self { config, tools }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    fn loader(&self) -> VolumeLoader<&R> {
        VolumeLoader::new(&self.tools).with_converter(self.config.converter.as_str())
    }

    pub fn execute(&self, job: &MtsatJob) -> anyhow::Result<WorkflowResult> {
        let out_dir = output_dir(&job.output);
        std::fs::create_dir_all(&out_dir)
            .with_context(|| format!("creating output directory {}", out_dir.display()))?;
        let mut scratch = ScratchSpace::create_in(&out_dir, self.config.retention)
            .context("creating scratch space")?;

        let sources = self.config.sources(&job.t1, &job.pd, &job.mt);
        let volumes = self
            .loader()
            .load_set(&sources, scratch.path())
            .context("loading acquisitions")?;

        let mut pipeline = Pipeline::new(self.config.to_stage_config());
        let run = pipeline
            .run_with(volumes, |event| scratch.snapshot(event))
            .context("running MTsat pipeline")?;
        let map = run
            .saturation()
            .context("pipeline finished without an MTsat map")?;

        let written = MapWriter::new(self.config.format)
            .write(map, &job.output)
            .with_context(|| format!("writing {}", job.output.display()))?;
        pipeline.mark_written().context("finalizing pipeline")?;
        scratch.mark_succeeded();

        Ok(WorkflowResult {
            written,
            state: pipeline.state(),
            stages: run.stages,
            metrics: pipeline.metrics(),
            scratch: scratch.path().to_path_buf(),
        })
    }

    /// Runs the DTI metric workflow with scratch space in the working directory.
    pub fn execute_dti(&self, scan: &Path, outputs: &DtiOutputs) -> anyhow::Result<DtiSummary> {
        let mut scratch = ScratchSpace::create_in(Path::new("."), self.config.retention)
            .context("creating scratch space")?;
        let summary = DtiWorkflow::new(self.loader())
            .run(scan, outputs, scratch.path())
            .with_context(|| format!("computing DTI metrics for {}", scan.display()))?;
        scratch.mark_succeeded();
        Ok(summary)
    }
}

fn output_dir(output: &Path) -> PathBuf {
    match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// `--nocleanup` wins over an explicit policy.
pub fn retention_from_flags(nocleanup: bool, retain: Option<Retention>) -> Option<Retention> {
    if nocleanup {
        Some(Retention::Always)
    } else {
        retain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::phantom::{write_phantom, PhantomConfig};
    use float_eq::assert_float_eq;
    use qmricore::io::nii;

    fn phantom_job(dir: &Path, output: &str) -> MtsatJob {
        let config = PhantomConfig {
            shape: [6, 5, 4],
            echoes: 3,
            noise: 0.0,
            ..PhantomConfig::default()
        };
        let paths = write_phantom(&config, dir).unwrap();
        MtsatJob {
            t1: paths.t1,
            pd: paths.pd,
            mt: paths.mt,
            output: dir.join(output),
        }
    }

    #[test]
    fn runner_executes_workflow() {
        let dir = tempfile::tempdir().unwrap();
        let job = phantom_job(dir.path(), "maps/mtsat.nii");
        let runner = Runner::new(WorkflowConfig::default());
        let result = runner.execute(&job).unwrap();

        assert_eq!(result.state, PipelineState::Written);
        assert_eq!(result.stages.len(), 5);
        assert_eq!(result.metrics.stages_completed, 5);
        assert!(!result.scratch.exists());

        let map = nii::read_volume(&result.written).unwrap();
        assert_eq!(map.data().shape(), &[6, 5, 4]);
        // noiseless phantom: tissue voxels share one value
        let centre = map.data()[[3, 2, 2]];
        assert!(centre.is_finite());
        assert_float_eq!(map.data()[[2, 2, 2]], centre, rmax <= 1e-5);
    }

    #[test]
    fn retained_scratch_keeps_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let job = phantom_job(dir.path(), "mtsat.raw");
        let config = WorkflowConfig {
            retention: Retention::Always,
            ..WorkflowConfig::default()
        };
        let result = Runner::new(config).execute(&job).unwrap();
        assert!(result.scratch.join("mtsat.nii").exists());
        assert!(result.scratch.join("00_echo_averaging_pd.nii").exists());
        assert_eq!(std::fs::metadata(&result.written).unwrap().len(), 6 * 5 * 4 * 4);
    }

    #[test]
    fn missing_converter_fails_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("2dseq");
        std::fs::write(&raw, b"vendor bytes").unwrap();
        let job = MtsatJob {
            t1: raw.clone(),
            pd: raw.clone(),
            mt: raw,
            output: dir.path().join("mtsat.nii"),
        };
        let config = WorkflowConfig {
            converter: "qmri-missing-converter".into(),
            ..WorkflowConfig::default()
        };
        let err = Runner::new(config).execute(&job).unwrap_err();
        assert!(format!("{:#}", err).contains("qmri-missing-converter"));
        assert!(!job.output.exists());
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with("qmri-scratch-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn nocleanup_means_always() {
        assert_eq!(retention_from_flags(true, Some(Retention::Discard)), Some(Retention::Always));
        assert_eq!(retention_from_flags(false, None), None);
    }
}
