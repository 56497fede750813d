use crate::prelude::{
    MapSet, ProcessingStage, StageConfig, StageError, StageInput, StageMetadata, StageOutput,
    StageResult,
};
use crate::processing::state::PipelineState;
use crate::processing::{
    AmplitudeStage, EchoAveragingStage, RelaxationRateStage, SaturationStage, SmoothingStage,
};
use crate::telemetry::{Metrics, MetricsRecorder};
use crate::volume::{DerivedMap, MapKind, VolumeSet};
use log::{error, info};
use serde::Serialize;
use std::time::Instant;

/// First fatal failure of a run, tagged with the stage it happened in.
#[derive(thiserror::Error, Debug)]
#[error("stage `{stage}` failed: {source}")]
pub struct PipelineError {
    pub stage: &'static str,
    #[source]
    pub source: StageError,
}

/// Handed to the observer after every successful stage.
pub struct StageEvent<'a> {
    pub index: usize,
    pub name: &'static str,
    pub reached: PipelineState,
    pub output: &'a StageOutput,
}

/// Per-stage entry of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct StageRecord {
    pub name: &'static str,
    pub reached: PipelineState,
    pub elapsed_ms: f64,
    pub metadata: StageMetadata,
}

/// Everything left over after the last stage.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub volumes: VolumeSet,
    pub maps: MapSet,
    pub stages: Vec<StageRecord>,
}

impl PipelineRun {
    pub fn saturation(&self) -> Option<&DerivedMap> {
        self.maps.get(MapKind::Saturation)
    }

    pub fn into_saturation(self) -> Option<DerivedMap> {
        self.maps.saturation
    }
}

/// Runs stages strictly in order and tracks the state machine.
pub struct Pipeline {
    config: StageConfig,
    stages: Vec<Box<dyn ProcessingStage>>,
    state: PipelineState,
    metrics: MetricsRecorder,
}

impl Pipeline {
    /// Averaging, smoothing, R1, amplitude and MTsat, in that order.
    pub fn new(config: StageConfig) -> Self {
        Self::with_stages(
            config,
            vec![
                Box::new(EchoAveragingStage::new()),
                Box::new(SmoothingStage::new()),
                Box::new(RelaxationRateStage::new()),
                Box::new(AmplitudeStage::new()),
                Box::new(SaturationStage::new()),
            ],
        )
    }

    pub fn with_stages(config: StageConfig, stages: Vec<Box<dyn ProcessingStage>>) -> Self {
        Self {
            config,
            stages,
            state: PipelineState::Loaded,
            metrics: MetricsRecorder::new(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn metrics(&self) -> Metrics {
        self.metrics.snapshot()
    }

    pub fn run(&mut self, volumes: VolumeSet) -> Result<PipelineRun, PipelineError> {
        self.run_with(volumes, |_| Ok(()))
    }

    /// Runs every stage, calling `observer` after each one succeeds.
    ///
    /// An observer error fails the run at that stage.
    pub fn run_with<F>(
        &mut self,
        volumes: VolumeSet,
        mut observer: F,
    ) -> Result<PipelineRun, PipelineError>
    where
        F: FnMut(&StageEvent<'_>) -> StageResult<()>,
    {
        if self.state != PipelineState::Loaded {
            return Err(PipelineError {
                stage: "pipeline",
                source: StageError::Internal(format!(
                    "pipeline is {:?}, runs start from Loaded",
                    self.state
                )),
            });
        }
        if let Err(source) = volumes.ensure_common_grid() {
            return Err(fail(
                &mut self.state,
                &self.metrics,
                "input grid check",
                source,
            ));
        }

        let mut input = StageInput::new(volumes);
        let mut records = Vec::with_capacity(self.stages.len());
        for (index, stage) in self.stages.iter_mut().enumerate() {
            let name = stage.name();
            let started = Instant::now();
            let outcome = run_stage(stage.as_mut(), &self.config, input).and_then(|output| {
                let reached = self.state.advance(stage.reaches())?;
                observer(&StageEvent {
                    index,
                    name,
                    reached,
                    output: &output,
                })?;
                Ok((reached, output))
            });

            let (reached, output) = match outcome {
                Ok(done) => done,
                Err(source) => return Err(fail(&mut self.state, &self.metrics, name, source)),
            };
            self.state = reached;
            self.metrics
                .record_stage(output.metadata.degenerate_voxels.unwrap_or(0));
            let elapsed_ms = started.elapsed().as_secs_f64() * 1e3;
            info!("stage `{}` reached {:?} in {:.1} ms", name, reached, elapsed_ms);
            records.push(StageRecord {
                name,
                reached,
                elapsed_ms,
                metadata: output.metadata.clone(),
            });
            input = StageInput::from(output);
        }

        Ok(PipelineRun {
            volumes: input.volumes,
            maps: input.maps,
            stages: records,
        })
    }

    /// Records that the final map has been persisted.
    pub fn mark_written(&mut self) -> StageResult<()> {
        if self.state != PipelineState::Saturated {
            return Err(StageError::Internal(format!(
                "cannot mark a {:?} pipeline as written",
                self.state
            )));
        }
        self.state = self.state.advance(PipelineState::Written)?;
        Ok(())
    }
}

fn run_stage(
    stage: &mut dyn ProcessingStage,
    config: &StageConfig,
    input: StageInput,
) -> StageResult<StageOutput> {
    stage.initialize(config)?;
    let output = stage.execute(input);
    stage.cleanup();
    output
}

fn fail(
    state: &mut PipelineState,
    metrics: &MetricsRecorder,
    stage: &'static str,
    source: StageError,
) -> PipelineError {
    error!("stage `{}` failed: {}", stage, source);
    *state = PipelineState::Failed;
    metrics.record_failure();
    PipelineError { stage, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::{AcquisitionParameters, Contrast, Volume, WeightedVolume};

    fn uniform_set(shape: &[usize], mt_shape: &[usize]) -> VolumeSet {
        let weighted = |shape: &[usize], value: f64, contrast: Contrast| {
            WeightedVolume::new(
                Volume::uniform(shape, value),
                AcquisitionParameters::default_for(contrast),
            )
        };
        VolumeSet::new(
            weighted(shape, 100.0, Contrast::T1),
            weighted(shape, 80.0, Contrast::Pd),
            weighted(mt_shape, 50.0, Contrast::Mt),
        )
    }

    fn single_echo() -> StageConfig {
        StageConfig {
            single_echo: true,
            smoothing_extent: 0,
        }
    }

    #[test]
    fn standard_run_reaches_saturated() {
        let mut pipeline = Pipeline::new(single_echo());
        let run = pipeline.run(uniform_set(&[3, 3, 3], &[3, 3, 3])).unwrap();
        assert_eq!(pipeline.state(), PipelineState::Saturated);
        let names: Vec<_> = run.stages.iter().map(|r| r.name).collect();
        assert_eq!(
            names,
            ["echo averaging", "spatial smoothing", "relaxation rate", "amplitude", "saturation"]
        );
        assert!(run.saturation().is_some());
        assert_eq!(pipeline.metrics().stages_completed, 5);

        pipeline.mark_written().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Written);
    }

    #[test]
    fn mismatched_grids_fail_before_any_stage() {
        let mut pipeline = Pipeline::new(single_echo());
        let err = pipeline
            .run(uniform_set(&[3, 3, 3], &[3, 3, 2]))
            .unwrap_err();
        assert_eq!(err.stage, "input grid check");
        assert!(matches!(err.source, StageError::ShapeMismatch(_)));
        assert_eq!(pipeline.state(), PipelineState::Failed);
        assert_eq!(pipeline.metrics().failures, 1);
    }

    #[test]
    fn failure_names_the_stage() {
        // multi-echo mode, but the volumes carry no echo axis
        let mut pipeline = Pipeline::new(StageConfig::default());
        let err = pipeline
            .run(uniform_set(&[2, 2, 2], &[2, 2, 2]))
            .unwrap_err();
        assert_eq!(err.stage, "echo averaging");
        assert!(err.to_string().starts_with("stage `echo averaging` failed"));
        assert_eq!(pipeline.metrics().stages_completed, 0);
    }

    #[test]
    fn observer_sees_every_stage_and_can_abort() {
        let mut seen = Vec::new();
        let mut pipeline = Pipeline::new(single_echo());
        let err = pipeline
            .run_with(uniform_set(&[2, 2, 2], &[2, 2, 2]), |event| {
                seen.push((event.index, event.reached));
                if event.name == "amplitude" {
                    return Err(StageError::Internal("snapshot refused".into()));
                }
                Ok(())
            })
            .unwrap_err();
        assert_eq!(err.stage, "amplitude");
        assert_eq!(
            seen,
            [
                (0, PipelineState::Averaged),
                (1, PipelineState::Smoothed),
                (2, PipelineState::RatesComputed),
                (3, PipelineState::RatesComputed),
            ]
        );
        assert_eq!(pipeline.state(), PipelineState::Failed);
    }

    #[test]
    fn pipeline_runs_only_once() {
        let mut pipeline = Pipeline::new(single_echo());
        pipeline.run(uniform_set(&[2, 2, 2], &[2, 2, 2])).unwrap();
        let err = pipeline
            .run(uniform_set(&[2, 2, 2], &[2, 2, 2]))
            .unwrap_err();
        assert!(matches!(err.source, StageError::Internal(_)));
    }

    #[test]
    fn written_requires_a_saturated_run() {
        let mut pipeline = Pipeline::new(single_echo());
        assert!(pipeline.mark_written().is_err());
    }
}
