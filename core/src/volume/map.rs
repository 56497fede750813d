use super::Volume;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which quantity a derived map holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MapKind {
    RelaxationRate,
    Amplitude,
    Saturation,
}

impl MapKind {
    pub fn label(self) -> &'static str {
        match self {
            MapKind::RelaxationRate => "r1",
            MapKind::Amplitude => "amplitude",
            MapKind::Saturation => "mtsat",
        }
    }
}

impl fmt::Display for MapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MapKind::RelaxationRate => "R1",
            MapKind::Amplitude => "apparent amplitude",
            MapKind::Saturation => "MTsat",
        };
        f.write_str(name)
    }
}

/// A volume computed by one of the formula stages.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedMap {
    kind: MapKind,
    volume: Volume,
}

impl DerivedMap {
    pub fn new(kind: MapKind, volume: Volume) -> Self {
        Self { kind, volume }
    }

    pub fn kind(&self) -> MapKind {
        self.kind
    }

    pub fn volume(&self) -> &Volume {
        &self.volume
    }

    pub fn into_volume(self) -> Volume {
        self.volume
    }

    /// Number of voxels holding NaN or ±infinity.
    pub fn degenerate_voxels(&self) -> usize {
        self.volume.data().iter().filter(|v| !v.is_finite()).count()
    }
}
