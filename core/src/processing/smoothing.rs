use crate::math::kernel::gaussian_kernel;
use crate::prelude::{
    ProcessingStage, StageConfig, StageError, StageInput, StageMetadata, StageOutput, StageResult,
};
use crate::processing::state::PipelineState;
use crate::telemetry::log::LogManager;
use crate::volume::Volume;
use ndarray::{ArrayD, Axis, Zip};

/// Isotropic Gaussian smoothing of an echo-free volume.
///
/// Extent 0 (and 1, whose kernel has a single tap) returns the volume unchanged.
pub fn smooth_volume(volume: Volume, extent: usize) -> StageResult<Volume> {
    volume.ensure_resolved("smoothing input")?;
    let kernel = gaussian_kernel(extent);
    if kernel.len() == 1 {
        return Ok(volume);
    }

    let mut data = volume.data().clone();
    for axis in 0..data.ndim() {
        data = convolve_axis(&data, Axis(axis), &kernel);
    }
    Ok(volume.derive(data))
}

/// Convolves every lane along `axis` with `kernel`.
///
/// Taps falling outside the volume are dropped and the remaining weights
/// renormalised, so constant regions stay constant up to the boundary.
fn convolve_axis(input: &ArrayD<f64>, axis: Axis, kernel: &[f64]) -> ArrayD<f64> {
    let radius = kernel.len() / 2;
    let mut output = ArrayD::zeros(input.raw_dim());
    Zip::from(output.lanes_mut(axis))
        .and(input.lanes(axis))
        .par_for_each(|mut out, lane| {
            let n = lane.len();
            for i in 0..n {
                let lo = i.saturating_sub(radius);
                let hi = (i + radius).min(n - 1);
                let (mut acc, mut norm) = (0.0, 0.0);
                for j in lo..=hi {
                    let w = kernel[radius + j - i];
                    acc += w * lane[j];
                    norm += w;
                }
                out[i] = acc / norm;
            }
        });
    output
}

/// Smoothing stage; identical kernel for all three weighted volumes.
pub struct SmoothingStage {
    config: Option<StageConfig>,
    logger: LogManager,
}

impl SmoothingStage {
    pub fn new() -> Self {
        Self {
            config: None,
            logger: LogManager::new("spatial smoothing"),
        }
    }
}

impl Default for SmoothingStage {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStage for SmoothingStage {
    fn name(&self) -> &'static str {
        "spatial smoothing"
    }

    fn reaches(&self) -> PipelineState {
        PipelineState::Smoothed
    }

    fn initialize(&mut self, config: &StageConfig) -> StageResult<()> {
        self.config = Some(config.clone());
        Ok(())
    }

    fn execute(&mut self, input: StageInput) -> StageResult<StageOutput> {
        let extent = self
            .config
            .as_ref()
            .ok_or_else(|| StageError::Internal("stage not initialized".into()))?
            .smoothing_extent;

        let note = if extent == 0 {
            "smoothing disabled".to_string()
        } else {
            format!(
                "Gaussian kernel extent {} ({} taps)",
                extent,
                gaussian_kernel(extent).len()
            )
        };
        self.logger.record(&note);

        let volumes = input
            .volumes
            .try_map(|_, volume| smooth_volume(volume, extent))?;

        Ok(StageOutput {
            volumes,
            maps: input.maps,
            metadata: StageMetadata {
                notes: vec![note],
                ..Default::default()
            },
        })
    }

    fn cleanup(&mut self) {
        self.config = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::Geometry;
    use float_eq::assert_float_eq;
    use ndarray::IxDyn;
    use proptest::prelude::*;

    fn ramp(shape: &[usize]) -> Volume {
        Volume::new(
            ArrayD::from_shape_fn(IxDyn(shape), |idx| (idx[0] * 3 + idx[1] * 5 + idx[2]) as f64),
            Geometry::isotropic(0.1),
        )
    }

    #[test]
    fn zero_extent_is_identity() {
        let volume = ramp(&[4, 5, 6]);
        assert_eq!(smooth_volume(volume.clone(), 0).unwrap(), volume);
    }

    #[test]
    fn impulse_spreads_symmetrically_and_keeps_mass() {
        let mut data = ArrayD::zeros(IxDyn(&[9, 9, 9]));
        data[[4, 4, 4]] = 1.0;
        let smoothed = smooth_volume(Volume::new(data, Geometry::default()), 3).unwrap();
        let out = smoothed.data();
        assert_float_eq!(out.sum(), 1.0, abs <= 1e-12);
        assert_float_eq!(out[[3, 4, 4]], out[[5, 4, 4]], abs <= 1e-15);
        assert_float_eq!(out[[4, 3, 4]], out[[4, 4, 5]], abs <= 1e-15);
        assert!(out[[4, 4, 4]] < 1.0);
        assert_eq!(out[[0, 0, 0]], 0.0);
    }

    #[test]
    fn unresolved_echo_axis_is_rejected() {
        let data = ArrayD::zeros(IxDyn(&[3, 3, 3, 2]));
        let volume = Volume::with_echo_axis(data, Geometry::default(), 3).unwrap();
        assert!(matches!(
            smooth_volume(volume, 3),
            Err(StageError::ShapeMismatch(_))
        ));
    }

    proptest! {
        #[test]
        fn constant_field_is_unchanged(
            value in -1.0e3 .. 1.0e3_f64,
            extent in 0_usize..9,
            nx in 1_usize..7, ny in 1_usize..7, nz in 1_usize..7,
        ) {
            let volume = Volume::uniform(&[nx, ny, nz], value);
            let smoothed = smooth_volume(volume, extent).unwrap();
            prop_assert_eq!(smoothed.data().shape(), &[nx, ny, nz]);
            for &v in smoothed.data().iter() {
                prop_assert!((v - value).abs() <= 1e-9 * value.abs().max(1.0));
            }
        }
    }
}
