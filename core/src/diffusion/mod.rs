//! Diffusion-weighted helpers: b-value cleanup and the delegated tensor metrics.

pub mod tensor;

pub use tensor::{DtiOutputs, DtiSummary, DtiWorkflow};

use crate::prelude::{StageError, StageResult};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// b-values below this are slice-select leakage, not diffusion weighting.
pub const BVALUE_THRESHOLD: f64 = 500.0;

pub fn threshold_bvalue(m: f64) -> f64 {
    if m < BVALUE_THRESHOLD {
        0.0
    } else {
        m
    }
}

/// Contents of an FSL-style `.bval` file, kept line by line.
#[derive(Debug, Clone, PartialEq)]
pub struct BvalTable {
    rows: Vec<Vec<f64>>,
}

impl BvalTable {
    pub fn read(path: &Path) -> StageResult<Self> {
        let text = std::fs::read_to_string(path)?;
        text.parse()
            .map_err(|err: StageError| err.context(path.display()))
    }

    pub fn write(&self, path: &Path) -> StageResult<()> {
        std::fs::write(path, self.to_string())?;
        Ok(())
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.rows.iter().flatten().copied()
    }

    pub fn len(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every entry passed through [`threshold_bvalue`].
    pub fn thresholded(&self) -> Self {
        Self {
            rows: self
                .rows
                .iter()
                .map(|row| row.iter().copied().map(threshold_bvalue).collect())
                .collect(),
        }
    }
}

impl FromStr for BvalTable {
    type Err = StageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rows = s
            .lines()
            .enumerate()
            .map(|(n, line)| {
                line.split_whitespace()
                    .map(|field| {
                        field.parse::<f64>().map_err(|_| {
                            StageError::ConversionFailure(format!(
                                "line {}: `{}` is not a b-value",
                                n + 1,
                                field
                            ))
                        })
                    })
                    .collect::<StageResult<Vec<_>>>()
            })
            .collect::<StageResult<Vec<_>>>()?;
        Ok(Self { rows })
    }
}

impl fmt::Display for BvalTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.rows {
            let mut fields = row.iter();
            if let Some(first) = fields.next() {
                write!(f, "{}", first)?;
            }
            for field in fields {
                write!(f, " {}", field)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
