use crate::math::stats::VolumeStats;
use crate::prelude::{
    ProcessingStage, StageConfig, StageInput, StageMetadata, StageOutput, StageResult,
};
use crate::processing::state::PipelineState;
use crate::telemetry::log::LogManager;
use crate::volume::{AcquisitionParameters, DerivedMap, MapKind, WeightedVolume};
use ndarray::Zip;

/// Longitudinal relaxation rate of one voxel from its T1- and PD-weighted signals.
///
/// A vanishing denominator yields ±inf or NaN, never an error.
#[inline]
pub fn relaxation_rate_voxel(
    t1v: f64,
    pdv: f64,
    t1: &AcquisitionParameters,
    pd: &AcquisitionParameters,
) -> f64 {
    let (a_t1, tr_t1) = (t1.flip_angle_deg(), t1.repetition_time_ms());
    let (a_pd, tr_pd) = (pd.flip_angle_deg(), pd.repetition_time_ms());
    let num = (a_t1 / tr_t1) * t1v - (a_pd / tr_pd) * pdv;
    let den = (pdv / a_pd) - (t1v / a_t1);
    0.5 * num / den
}

/// R1 map over the common grid of the T1- and PD-weighted volumes.
pub fn relaxation_rate(t1: &WeightedVolume, pd: &WeightedVolume) -> StageResult<DerivedMap> {
    t1.volume.ensure_resolved("T1-weighted volume")?;
    pd.volume.ensure_resolved("PD-weighted volume")?;
    t1.volume
        .ensure_same_grid(&pd.volume, "T1-weighted vs PD-weighted")?;

    let (t1_params, pd_params) = (t1.parameters, pd.parameters);
    let data = Zip::from(t1.volume.data())
        .and(pd.volume.data())
        .par_map_collect(|&t1v, &pdv| relaxation_rate_voxel(t1v, pdv, &t1_params, &pd_params));
    Ok(DerivedMap::new(
        MapKind::RelaxationRate,
        t1.volume.derive(data),
    ))
}

pub struct RelaxationRateStage {
    logger: LogManager,
}

impl RelaxationRateStage {
    pub fn new() -> Self {
        Self {
            logger: LogManager::new("relaxation rate"),
        }
    }
}

impl Default for RelaxationRateStage {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStage for RelaxationRateStage {
    fn name(&self) -> &'static str {
        "relaxation rate"
    }

    fn reaches(&self) -> PipelineState {
        PipelineState::RatesComputed
    }

    fn initialize(&mut self, _config: &StageConfig) -> StageResult<()> {
        Ok(())
    }

    fn execute(&mut self, input: StageInput) -> StageResult<StageOutput> {
        let map = relaxation_rate(&input.volumes.t1, &input.volumes.pd)?;
        let stats = VolumeStats::of(map.volume().data());
        self.logger
            .degenerate(map.kind(), stats.non_finite, map.volume().data().len());
        self.logger.record(&format!("R1 mean {:.4}", stats.mean));

        let mut maps = input.maps;
        maps.insert(map);
        Ok(StageOutput {
            volumes: input.volumes,
            maps,
            metadata: StageMetadata {
                degenerate_voxels: Some(stats.non_finite),
                summary: Some(stats),
                notes: vec![format!("R1 mean {:.4}", stats.mean)],
            },
        })
    }

    fn cleanup(&mut self) {}
}
