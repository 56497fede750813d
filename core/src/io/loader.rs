use crate::io::nii;
use crate::prelude::{StageError, StageResult};
use crate::telemetry::LogManager;
use crate::tools::ToolRunner;
use crate::volume::{AcquisitionParameters, Contrast, VolumeSet, WeightedVolume};
use std::path::{Path, PathBuf};

/// Converter invoked for anything that is not already NIfTI.
pub const DEFAULT_CONVERTER: &str = "nanconvert_bruker";

/// Where one acquisition lives and how it was acquired.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionSource {
    pub path: PathBuf,
    pub parameters: AcquisitionParameters,
}

impl AcquisitionSource {
    pub fn new(path: impl Into<PathBuf>, parameters: AcquisitionParameters) -> Self {
        Self {
            path: path.into(),
            parameters,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceSet {
    pub t1: AcquisitionSource,
    pub pd: AcquisitionSource,
    pub mt: AcquisitionSource,
}

impl SourceSet {
    pub fn get(&self, contrast: Contrast) -> &AcquisitionSource {
        match contrast {
            Contrast::T1 => &self.t1,
            Contrast::Pd => &self.pd,
            Contrast::Mt => &self.mt,
        }
    }
}

pub fn is_nifti(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    name.ends_with(".nii") || name.ends_with(".nii.gz")
}

/// Decodes acquisitions into volumes, converting vendor data on the way.
pub struct VolumeLoader<R> {
    runner: R,
    converter: String,
    logger: LogManager,
}

impl<R: ToolRunner> VolumeLoader<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            converter: DEFAULT_CONVERTER.to_string(),
            logger: LogManager::new("loader"),
        }
    }

    pub fn with_converter(mut self, converter: impl Into<String>) -> Self {
        self.converter = converter.into();
        self
    }

    pub fn converter(&self) -> &str {
        &self.converter
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Runs the converter on `source`, leaving `<label>_converted.nii` in `scratch`.
    pub fn convert(&self, source: &Path, label: &str, scratch: &Path) -> StageResult<PathBuf> {
        let target = scratch.join(format!("{}_converted.nii", label));
        self.runner.run(
            &self.converter,
            &[source.as_os_str(), target.as_os_str()],
        )?;
        if !target.is_file() {
            return Err(StageError::ConversionFailure(format!(
                "`{}` produced no image for {}",
                self.converter,
                source.display()
            )));
        }
        Ok(target)
    }

    pub fn load(
        &self,
        contrast: Contrast,
        source: &AcquisitionSource,
        scratch: &Path,
    ) -> StageResult<WeightedVolume> {
        if !source.path.exists() {
            return Err(StageError::ConversionFailure(format!(
                "{} does not exist",
                source.path.display()
            )));
        }
        let image = if is_nifti(&source.path) {
            source.path.clone()
        } else {
            self.convert(&source.path, contrast.label(), scratch)?
        };
        let volume = nii::read_volume(&image)?;
        self.logger.record(&format!(
            "{} loaded from {}: shape {:?}, voxel {:?} mm",
            contrast,
            image.display(),
            volume.data().shape(),
            volume.geometry().voxel_size
        ));
        Ok(WeightedVolume::new(volume, source.parameters))
    }

    /// Loads T1, PD and MT in that order; errors name the contrast.
    pub fn load_set(&self, sources: &SourceSet, scratch: &Path) -> StageResult<VolumeSet> {
        let load = |contrast: Contrast| {
            self.load(contrast, sources.get(contrast), scratch)
                .map_err(|err| err.context(contrast))
        };
        Ok(VolumeSet::new(
            load(Contrast::T1)?,
            load(Contrast::Pd)?,
            load(Contrast::Mt)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::scripted::ScriptedRunner;
    use crate::volume::Volume;
    use std::ffi::OsStr;
    use tempfile::tempdir;

    fn params(contrast: Contrast) -> AcquisitionParameters {
        AcquisitionParameters::default_for(contrast)
    }

    /// Stands in for the converter by writing a small multi-echo image.
    fn fake_converter(_tool: &str, args: &[&OsStr]) -> StageResult<()> {
        let volume = Volume::uniform(&[3, 3, 2, 2], 7.0);
        nii::write_volume(&volume, Path::new(args[1]))
    }

    #[test]
    fn vendor_data_goes_through_the_converter() {
        let dir = tempdir().unwrap();
        let raw = dir.path().join("2dseq");
        std::fs::write(&raw, b"vendor bytes").unwrap();

        let runner = ScriptedRunner::new(fake_converter);
        let loader = VolumeLoader::new(&runner);
        let weighted = loader
            .load(Contrast::Mt, &AcquisitionSource::new(&raw, params(Contrast::Mt)), dir.path())
            .unwrap();

        assert_eq!(weighted.volume.echo_count(), Some(2));
        assert_eq!(weighted.parameters, params(Contrast::Mt));
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][0], DEFAULT_CONVERTER);
        assert!(calls[0][2].ends_with("mt_converted.nii"));
    }

    #[test]
    fn nifti_is_read_without_conversion() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pd.nii.gz");
        nii::write_volume(&Volume::uniform(&[2, 2, 2], 3.0), &path).unwrap();

        let runner = ScriptedRunner::new(|_: &str, _: &[&OsStr]| Ok(()));
        let weighted = VolumeLoader::new(&runner)
            .load(Contrast::Pd, &AcquisitionSource::new(&path, params(Contrast::Pd)), dir.path())
            .unwrap();
        assert!(runner.calls().is_empty());
        assert_eq!(weighted.volume.grid_shape(), vec![2, 2, 2]);
    }

    #[test]
    fn silent_converter_is_a_conversion_failure() {
        let dir = tempdir().unwrap();
        let raw = dir.path().join("2dseq");
        std::fs::write(&raw, b"vendor bytes").unwrap();
        let sources = SourceSet {
            t1: AcquisitionSource::new(&raw, params(Contrast::T1)),
            pd: AcquisitionSource::new(&raw, params(Contrast::Pd)),
            mt: AcquisitionSource::new(&raw, params(Contrast::Mt)),
        };

        let runner = ScriptedRunner::new(|_: &str, _: &[&OsStr]| Ok(()));
        let err = VolumeLoader::new(&runner)
            .with_converter("bruker2nii")
            .load_set(&sources, dir.path())
            .unwrap_err();
        match err {
            StageError::ConversionFailure(message) => {
                assert!(message.starts_with("T1-weighted: `bruker2nii` produced no image"))
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn missing_source_fails_before_any_tool_runs() {
        let dir = tempdir().unwrap();
        let runner = ScriptedRunner::new(fake_converter);
        let source = AcquisitionSource::new(dir.path().join("absent"), params(Contrast::T1));
        assert!(VolumeLoader::new(&runner)
            .load(Contrast::T1, &source, dir.path())
            .is_err());
        assert!(runner.calls().is_empty());
    }
}
