use crate::prelude::{
    ProcessingStage, StageConfig, StageError, StageInput, StageMetadata, StageOutput, StageResult,
};
use crate::processing::state::PipelineState;
use crate::telemetry::log::LogManager;
use crate::volume::Volume;
use ndarray::Axis;

/// Collapses the echo axis of `volume` by averaging across echoes.
///
/// In single-echo mode the volume passes through untouched, except that a
/// one-echo axis is squeezed away.
pub fn average_echoes(volume: Volume, single_echo: bool) -> StageResult<Volume> {
    if single_echo {
        return match (volume.echo_axis(), volume.echo_count()) {
            (Some(axis), Some(1)) => {
                let squeezed = volume.data().index_axis(Axis(axis), 0).to_owned();
                Ok(volume.derive(squeezed))
            }
            (_, Some(echoes)) => Err(StageError::ShapeMismatch(format!(
                "single-echo mode but the volume has {} echoes",
                echoes
            ))),
            _ => Ok(volume),
        };
    }

    let axis = volume.echo_axis().ok_or_else(|| {
        StageError::ShapeMismatch("echo averaging requested but the volume has no echo axis".into())
    })?;
    let mean = volume
        .data()
        .mean_axis(Axis(axis))
        .ok_or_else(|| StageError::ShapeMismatch("echo axis is empty".into()))?;
    Ok(volume.derive(mean))
}

/// Echo-averaging stage applied to all three weighted volumes.
pub struct EchoAveragingStage {
    config: Option<StageConfig>,
    logger: LogManager,
}

impl EchoAveragingStage {
    pub fn new() -> Self {
        Self {
            config: None,
            logger: LogManager::new("echo averaging"),
        }
    }
}

impl Default for EchoAveragingStage {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStage for EchoAveragingStage {
    fn name(&self) -> &'static str {
        "echo averaging"
    }

    fn reaches(&self) -> PipelineState {
        PipelineState::Averaged
    }

    fn initialize(&mut self, config: &StageConfig) -> StageResult<()> {
        self.config = Some(config.clone());
        Ok(())
    }

    fn execute(&mut self, input: StageInput) -> StageResult<StageOutput> {
        let single_echo = self
            .config
            .as_ref()
            .ok_or_else(|| StageError::Internal("stage not initialized".into()))?
            .single_echo;

        let mut notes = Vec::new();
        let volumes = input.volumes.try_map(|contrast, volume| {
            let echoes = volume.echo_count();
            let averaged = average_echoes(volume, single_echo)?;
            let note = match echoes {
                Some(n) if !single_echo => format!("{}: averaged {} echoes", contrast.label(), n),
                _ => format!("{}: passed through", contrast.label()),
            };
            self.logger.record(&note);
            notes.push(note);
            Ok(averaged)
        })?;

        Ok(StageOutput {
            volumes,
            maps: input.maps,
            metadata: StageMetadata {
                notes,
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
    use ndarray::{ArrayD, IxDyn};

    fn three_echoes() -> Volume {
        let data = ArrayD::from_shape_fn(IxDyn(&[2, 3, 4, 3]), |idx| (idx[3] + 1) as f64 * 10.0);
        Volume::with_echo_axis(data, Geometry::isotropic(0.2), 3).unwrap()
    }

    #[test]
    fn mean_across_echoes_drops_the_axis() {
        let averaged = average_echoes(three_echoes(), false).unwrap();
        assert_eq!(averaged.data().shape(), &[2, 3, 4]);
        assert_eq!(averaged.echo_axis(), None);
        assert!(averaged.data().iter().all(|&v| v == 20.0));
        assert_eq!(averaged.geometry(), &Geometry::isotropic(0.2));
    }

    #[test]
    fn single_echo_without_echo_axis_is_identity() {
        let volume = Volume::new(
            ArrayD::from_shape_fn(IxDyn(&[3, 3, 2]), |idx| (idx[0] * 7 + idx[1] + idx[2]) as f64),
            Geometry::isotropic(0.15),
        );
        let passed = average_echoes(volume.clone(), true).unwrap();
        assert_eq!(passed, volume);
    }

    #[test]
    fn averaging_without_echo_axis_is_a_shape_mismatch() {
        let err = average_echoes(Volume::uniform(&[2, 2, 2], 1.0), false).unwrap_err();
        assert!(matches!(err, StageError::ShapeMismatch(_)));
    }

    #[test]
    fn single_echo_squeezes_a_lone_echo() {
        let data = ArrayD::from_elem(IxDyn(&[2, 2, 2, 1]), 4.0);
        let volume = Volume::with_echo_axis(data, Geometry::default(), 3).unwrap();
        let squeezed = average_echoes(volume, true).unwrap();
        assert_eq!(squeezed.data().shape(), &[2, 2, 2]);
        assert!(squeezed.data().iter().all(|&v| v == 4.0));
    }

    #[test]
    fn single_echo_rejects_multi_echo_data() {
        assert!(matches!(
            average_echoes(three_echoes(), true),
            Err(StageError::ShapeMismatch(_))
        ));
    }
}
