use crate::math::stats::VolumeStats;
use crate::prelude::{
    ProcessingStage, StageConfig, StageError, StageInput, StageMetadata, StageOutput, StageResult,
};
use crate::processing::state::PipelineState;
use crate::telemetry::log::LogManager;
use crate::volume::{AcquisitionParameters, DerivedMap, MapKind, WeightedVolume};
use ndarray::Zip;

/// The scalar `αMT² / 2` subtracted from every voxel.
pub fn saturation_offset(mt: &AcquisitionParameters) -> f64 {
    let a_mt = mt.flip_angle_deg();
    a_mt * a_mt / 2.0
}

/// MT saturation of one voxel from its amplitude, R1 and MT-weighted signal.
#[inline]
pub fn saturation_voxel(a: f64, r1: f64, mtv: f64, mt: &AcquisitionParameters) -> f64 {
    let m1 = (mt.flip_angle_deg() * a / mtv) - 1.0;
    let m2 = mt.repetition_time_ms() * r1;
    m1 * m2 - saturation_offset(mt)
}

fn expect_kind(map: &DerivedMap, kind: MapKind) -> StageResult<()> {
    if map.kind() == kind {
        Ok(())
    } else {
        Err(StageError::Internal(format!(
            "expected a {} map, got {}",
            kind,
            map.kind()
        )))
    }
}

/// MTsat map from the amplitude and R1 maps and the MT-weighted volume.
pub fn saturation(
    amplitude: &DerivedMap,
    relaxation_rate: &DerivedMap,
    mt: &WeightedVolume,
) -> StageResult<DerivedMap> {
    expect_kind(amplitude, MapKind::Amplitude)?;
    expect_kind(relaxation_rate, MapKind::RelaxationRate)?;
    mt.volume.ensure_resolved("MT-weighted volume")?;
    let a = amplitude.volume();
    a.ensure_same_grid(relaxation_rate.volume(), "amplitude vs R1")?;
    a.ensure_same_grid(&mt.volume, "amplitude vs MT-weighted")?;

    let mt_params = mt.parameters;
    let data = Zip::from(a.data())
        .and(relaxation_rate.volume().data())
        .and(mt.volume.data())
        .par_map_collect(|&av, &r1v, &mtv| saturation_voxel(av, r1v, mtv, &mt_params));
    Ok(DerivedMap::new(MapKind::Saturation, a.derive(data)))
}

pub struct SaturationStage {
    logger: LogManager,
}

impl SaturationStage {
    pub fn new() -> Self {
        Self {
            logger: LogManager::new("saturation"),
        }
    }
}

impl Default for SaturationStage {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStage for SaturationStage {
    fn name(&self) -> &'static str {
        "saturation"
    }

    fn reaches(&self) -> PipelineState {
        PipelineState::Saturated
    }

    fn initialize(&mut self, _config: &StageConfig) -> StageResult<()> {
        Ok(())
    }

    fn execute(&mut self, input: StageInput) -> StageResult<StageOutput> {
        let missing =
            |kind: MapKind| StageError::Internal(format!("{} map has not been computed", kind));
        let amplitude = input
            .maps
            .get(MapKind::Amplitude)
            .ok_or_else(|| missing(MapKind::Amplitude))?;
        let relaxation_rate = input
            .maps
            .get(MapKind::RelaxationRate)
            .ok_or_else(|| missing(MapKind::RelaxationRate))?;

        let map = saturation(amplitude, relaxation_rate, &input.volumes.mt)?;
        let stats = VolumeStats::of(map.volume().data());
        self.logger
            .degenerate(map.kind(), stats.non_finite, map.volume().data().len());
        let note = format!(
            "MTsat range [{:.4}, {:.4}], mean {:.4}",
            stats.min, stats.max, stats.mean
        );
        self.logger.record(&note);

        let mut maps = input.maps;
        maps.insert(map);
        Ok(StageOutput {
            volumes: input.volumes,
            maps,
            metadata: StageMetadata {
                degenerate_voxels: Some(stats.non_finite),
                summary: Some(stats),
                notes: vec![note],
            },
        })
    }

    fn cleanup(&mut self) {}
}
