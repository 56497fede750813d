//! Per-run scratch directory with a retention policy.

use crate::io::nii;
use crate::prelude::{StageError, StageResult};
use crate::processing::StageEvent;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tempfile::TempDir;

/// What happens to the scratch directory when a run ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Retention {
    #[default]
    Discard,
    OnFailure,
    Always,
}

impl Retention {
    pub fn keeps(self, succeeded: bool) -> bool {
        match self {
            Retention::Discard => false,
            Retention::OnFailure => !succeeded,
            Retention::Always => true,
        }
    }

    /// Whether stage outputs are worth snapshotting at all.
    pub fn snapshots(self) -> bool {
        self != Retention::Discard
    }
}

impl FromStr for Retention {
    type Err = StageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "discard" => Ok(Retention::Discard),
            "on-failure" => Ok(Retention::OnFailure),
            "always" => Ok(Retention::Always),
            other => Err(StageError::InvalidParameter(format!(
                "unknown retention `{}` (expected discard, on-failure or always)",
                other
            ))),
        }
    }
}

/// Scratch directory owned by one run; released on drop unless retained.
#[derive(Debug)]
pub struct ScratchSpace {
    dir: Option<TempDir>,
    path: PathBuf,
    retention: Retention,
    succeeded: bool,
}

impl ScratchSpace {
    pub fn create_in(parent: &Path, retention: Retention) -> StageResult<Self> {
        let dir = tempfile::Builder::new()
            .prefix("qmri-scratch-")
            .tempdir_in(parent)?;
        let path = dir.path().to_path_buf();
        info!("scratch space at {} ({:?})", path.display(), retention);
        Ok(Self {
            dir: Some(dir),
            path,
            retention,
            succeeded: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join(&self, name: impl AsRef<Path>) -> PathBuf {
        self.path.join(name)
    }

    pub fn retention(&self) -> Retention {
        self.retention
    }

    pub fn mark_succeeded(&mut self) {
        self.succeeded = true;
    }

    /// Writes the outputs of a finished stage as NIfTI, if retention asks for it.
    ///
    /// Volumes are written per stage; each map only once, under its own label.
    pub fn snapshot(&self, event: &StageEvent<'_>) -> StageResult<()> {
        if !self.retention.snapshots() {
            return Ok(());
        }
        let slug = event.name.replace(' ', "_");
        if event.output.maps.iter().next().is_none() {
            for (contrast, weighted) in event.output.volumes.iter() {
                let name = format!("{:02}_{}_{}.nii", event.index, slug, contrast.label());
                nii::write_volume(&weighted.volume, &self.join(name))?;
            }
        }
        for map in event.output.maps.iter() {
            let path = self.join(format!("{}.nii", map.kind().label()));
            if !path.exists() {
                nii::write_volume(map.volume(), &path)?;
            }
        }
        Ok(())
    }
}

impl Drop for ScratchSpace {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        if self.retention.keeps(self.succeeded) {
            #[allow(deprecated)]
            let kept = dir.into_path();
            info!("scratch space retained at {}", kept.display());
        } else if let Err(err) = dir.close() {
            warn!("could not remove scratch space {}: {}", self.path.display(), err);
        }
    }
}
