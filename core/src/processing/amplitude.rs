use crate::math::stats::VolumeStats;
use crate::prelude::{
    ProcessingStage, StageConfig, StageInput, StageMetadata, StageOutput, StageResult,
};
use crate::processing::state::PipelineState;
use crate::telemetry::log::LogManager;
use crate::volume::{AcquisitionParameters, DerivedMap, MapKind, WeightedVolume};
use ndarray::Zip;

/// Apparent signal amplitude of one voxel from its T1- and PD-weighted signals.
#[inline]
pub fn amplitude_voxel(
    t1v: f64,
    pdv: f64,
    t1: &AcquisitionParameters,
    pd: &AcquisitionParameters,
) -> f64 {
    let (a_t1, tr_t1) = (t1.flip_angle_deg(), t1.repetition_time_ms());
    let (a_pd, tr_pd) = (pd.flip_angle_deg(), pd.repetition_time_ms());
    let a1 = pdv * t1v * ((tr_pd * a_t1 / a_pd) - (tr_t1 * a_pd / a_t1));
    let a2 = tr_pd * a_t1 * t1v - tr_t1 * a_pd * pdv;
    a1 / a2
}

/// Apparent amplitude map over the common grid of the T1- and PD-weighted volumes.
pub fn amplitude(t1: &WeightedVolume, pd: &WeightedVolume) -> StageResult<DerivedMap> {
    t1.volume.ensure_resolved("T1-weighted volume")?;
    pd.volume.ensure_resolved("PD-weighted volume")?;
    t1.volume
        .ensure_same_grid(&pd.volume, "T1-weighted vs PD-weighted")?;

    let (t1_params, pd_params) = (t1.parameters, pd.parameters);
    let data = Zip::from(t1.volume.data())
        .and(pd.volume.data())
        .par_map_collect(|&t1v, &pdv| amplitude_voxel(t1v, pdv, &t1_params, &pd_params));
    Ok(DerivedMap::new(MapKind::Amplitude, t1.volume.derive(data)))
}

pub struct AmplitudeStage {
    logger: LogManager,
}

impl AmplitudeStage {
    pub fn new() -> Self {
        Self {
            logger: LogManager::new("amplitude"),
        }
    }
}

impl Default for AmplitudeStage {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStage for AmplitudeStage {
    fn name(&self) -> &'static str {
        "amplitude"
    }

    fn reaches(&self) -> PipelineState {
        PipelineState::RatesComputed
    }

    fn initialize(&mut self, _config: &StageConfig) -> StageResult<()> {
        Ok(())
    }

    fn execute(&mut self, input: StageInput) -> StageResult<StageOutput> {
        let map = amplitude(&input.volumes.t1, &input.volumes.pd)?;
        let stats = VolumeStats::of(map.volume().data());
        self.logger
            .degenerate(map.kind(), stats.non_finite, map.volume().data().len());
        self.logger.record(&format!("A mean {:.4}", stats.mean));

        let mut maps = input.maps;
        maps.insert(map);
        Ok(StageOutput {
            volumes: input.volumes,
            maps,
            metadata: StageMetadata {
                degenerate_voxels: Some(stats.non_finite),
                summary: Some(stats),
                notes: vec![format!("A mean {:.4}", stats.mean)],
            },
        })
    }

    fn cleanup(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::{Contrast, Volume};
    use float_eq::assert_float_eq;

    fn weighted(value: f64, contrast: Contrast) -> WeightedVolume {
        WeightedVolume::new(
            Volume::uniform(&[2, 3, 4], value),
            AcquisitionParameters::default_for(contrast),
        )
    }

    #[test]
    fn matches_hand_evaluated_value() {
        // A1 = 80*100*(25*20/6 - 18*6/20), A2 = 25*20*100 - 18*6*80
        let expected = 8000.0 * (500.0 / 6.0 - 5.4) / (50_000.0 - 8640.0);
        let map = amplitude(&weighted(100.0, Contrast::T1), &weighted(80.0, Contrast::Pd)).unwrap();
        assert_eq!(map.volume().grid_shape(), vec![2, 3, 4]);
        for &v in map.volume().data().iter() {
            assert_float_eq!(v, expected, rmax <= 1e-12);
        }
    }

    #[test]
    fn zero_denominator_is_infinite_not_an_error() {
        // 25*20*t1 == 18*6*pd for t1 = 108, pd = 500
        let map = amplitude(&weighted(108.0, Contrast::T1), &weighted(500.0, Contrast::Pd)).unwrap();
        assert!(map.volume().data().iter().all(|v| v.is_infinite()));
    }
}
