use crate::io::{nii, raw};
use crate::prelude::{StageError, StageResult};
use crate::telemetry::LogManager;
use crate::volume::DerivedMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// On-disk encoding of a written map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MapFormat {
    Nifti,
    NiftiGz,
    Raw,
}

impl MapFormat {
    /// Infers the format from a file name; unknown extensions fall back to NIfTI.
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if name.ends_with(".nii.gz") {
            MapFormat::NiftiGz
        } else if name.ends_with(".raw") || name.ends_with(".bin") {
            MapFormat::Raw
        } else {
            MapFormat::Nifti
        }
    }
}

impl FromStr for MapFormat {
    type Err = StageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nifti" | "nii" => Ok(MapFormat::Nifti),
            "nifti-gz" | "nii.gz" => Ok(MapFormat::NiftiGz),
            "raw" => Ok(MapFormat::Raw),
            other => Err(StageError::InvalidParameter(format!(
                "unknown map format `{}` (expected nifti, nifti-gz or raw)",
                other
            ))),
        }
    }
}

/// Persists derived maps.
pub struct MapWriter {
    format: Option<MapFormat>,
    logger: LogManager,
}

impl MapWriter {
    /// `None` picks the format from each output path.
    pub fn new(format: Option<MapFormat>) -> Self {
        Self {
            format,
            logger: LogManager::new("map writer"),
        }
    }

    /// Writes `map` to `path` and returns the path actually written.
    ///
    /// Compressed NIfTI output gets a `.gz` suffix if `path` lacks one.
    pub fn write(&self, map: &DerivedMap, path: &Path) -> StageResult<PathBuf> {
        let format = self.format.unwrap_or_else(|| MapFormat::from_path(path));
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let target = match format {
            MapFormat::NiftiGz if MapFormat::from_path(path) != MapFormat::NiftiGz => {
                let mut name = path.as_os_str().to_owned();
                name.push(".gz");
                PathBuf::from(name)
            }
            _ => path.to_path_buf(),
        };

        match format {
            MapFormat::Nifti | MapFormat::NiftiGz => nii::write_volume(map.volume(), &target)?,
            MapFormat::Raw => raw::write_array(map.volume().data(), &target)?,
        }
        self.logger.record(&format!(
            "{} map ({:?}) written to {}",
            map.kind(),
            format,
            target.display()
        ));
        Ok(target)
    }
}

impl Default for MapWriter {
    fn default() -> Self {
        Self::new(None)
    }
}
