use super::Volume;
use crate::prelude::{StageError, StageResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Flip angle and repetition time of one weighted acquisition.
///
/// Both values are strictly positive and finite. Flip angles stay in degrees;
/// the relaxometry formulas consume them as-is.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawParameters", into = "RawParameters")]
pub struct AcquisitionParameters {
    flip_angle_deg: f64,
    repetition_time_ms: f64,
}

#[derive(Clone, Copy, Serialize, Deserialize)]
struct RawParameters {
    flip_angle_deg: f64,
    repetition_time_ms: f64,
}

impl TryFrom<RawParameters> for AcquisitionParameters {
    type Error = StageError;

    fn try_from(raw: RawParameters) -> Result<Self, Self::Error> {
        AcquisitionParameters::new(raw.flip_angle_deg, raw.repetition_time_ms)
    }
}

impl From<AcquisitionParameters> for RawParameters {
    fn from(params: AcquisitionParameters) -> Self {
        Self {
            flip_angle_deg: params.flip_angle_deg,
            repetition_time_ms: params.repetition_time_ms,
        }
    }
}

impl AcquisitionParameters {
    pub fn new(flip_angle_deg: f64, repetition_time_ms: f64) -> StageResult<Self> {
        for (name, value) in [
            ("flip angle", flip_angle_deg),
            ("repetition time", repetition_time_ms),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(StageError::InvalidParameter(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }
        Ok(Self {
            flip_angle_deg,
            repetition_time_ms,
        })
    }

    /// Protocol defaults: T1 20°/18 ms, PD 6°/25 ms, MT 6°/25 ms.
    pub const fn default_for(contrast: Contrast) -> Self {
        let (flip_angle_deg, repetition_time_ms) = match contrast {
            Contrast::T1 => (20.0, 18.0),
            Contrast::Pd => (6.0, 25.0),
            Contrast::Mt => (6.0, 25.0),
        };
        Self {
            flip_angle_deg,
            repetition_time_ms,
        }
    }

    pub fn flip_angle_deg(&self) -> f64 {
        self.flip_angle_deg
    }

    pub fn repetition_time_ms(&self) -> f64 {
        self.repetition_time_ms
    }
}

/// The three weightings combined into an MTsat map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Contrast {
    T1,
    Pd,
    Mt,
}

impl Contrast {
    pub const ALL: [Contrast; 3] = [Contrast::T1, Contrast::Pd, Contrast::Mt];

    /// Short lowercase label used in file names.
    pub fn label(self) -> &'static str {
        match self {
            Contrast::T1 => "t1",
            Contrast::Pd => "pd",
            Contrast::Mt => "mt",
        }
    }
}

impl fmt::Display for Contrast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Contrast::T1 => "T1-weighted",
            Contrast::Pd => "PD-weighted",
            Contrast::Mt => "MT-weighted",
        };
        f.write_str(name)
    }
}

/// A volume paired with the parameters it was acquired with.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedVolume {
    pub volume: Volume,
    pub parameters: AcquisitionParameters,
}

impl WeightedVolume {
    pub fn new(volume: Volume, parameters: AcquisitionParameters) -> Self {
        Self { volume, parameters }
    }
}

/// The T1-, PD- and MT-weighted inputs of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeSet {
    pub t1: WeightedVolume,
    pub pd: WeightedVolume,
    pub mt: WeightedVolume,
}

impl VolumeSet {
    pub fn new(t1: WeightedVolume, pd: WeightedVolume, mt: WeightedVolume) -> Self {
        Self { t1, pd, mt }
    }

    pub fn get(&self, contrast: Contrast) -> &WeightedVolume {
        match contrast {
            Contrast::T1 => &self.t1,
            Contrast::Pd => &self.pd,
            Contrast::Mt => &self.mt,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Contrast, &WeightedVolume)> {
        Contrast::ALL.into_iter().map(move |c| (c, self.get(c)))
    }

    /// Applies `transform` to each volume in turn, keeping acquisition parameters.
    ///
    /// Stops at the first failure; the error is prefixed with the contrast.
    pub fn try_map<F>(self, mut transform: F) -> StageResult<VolumeSet>
    where
        F: FnMut(Contrast, Volume) -> StageResult<Volume>,
    {
        let mut apply = |contrast: Contrast, weighted: WeightedVolume| {
            transform(contrast, weighted.volume)
                .map(|volume| WeightedVolume::new(volume, weighted.parameters))
                .map_err(|err| err.context(contrast))
        };
        Ok(VolumeSet {
            t1: apply(Contrast::T1, self.t1)?,
            pd: apply(Contrast::Pd, self.pd)?,
            mt: apply(Contrast::Mt, self.mt)?,
        })
    }

    /// Checks that the PD and MT grids agree with the T1 grid.
    pub fn ensure_common_grid(&self) -> StageResult<()> {
        self.t1
            .volume
            .ensure_same_grid(&self.pd.volume, "T1-weighted vs PD-weighted")?;
        self.t1
            .volume
            .ensure_same_grid(&self.mt.volume, "T1-weighted vs MT-weighted")
    }
}
