use ndarray::ArrayD;
use serde::Serialize;

/// Summary of a volume's finite values, plus how many were not finite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VolumeStats {
    pub finite: usize,
    pub non_finite: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl VolumeStats {
    pub fn of(data: &ArrayD<f64>) -> Self {
        Self::from_values(data.iter().copied())
    }

    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Self {
        let mut stats = Self {
            finite: 0,
            non_finite: 0,
            min: f64::NAN,
            max: f64::NAN,
            mean: f64::NAN,
        };
        let mut sum = 0.0;
        for value in values {
            if !value.is_finite() {
                stats.non_finite += 1;
                continue;
            }
            stats.min = if stats.finite == 0 { value } else { stats.min.min(value) };
            stats.max = if stats.finite == 0 { value } else { stats.max.max(value) };
            stats.finite += 1;
            sum += value;
        }
        if stats.finite > 0 {
            stats.mean = sum / stats.finite as f64;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sequence_yields_nan_summary() {
        let stats = VolumeStats::from_values(std::iter::empty());
        assert_eq!(stats.finite, 0);
        assert!(stats.mean.is_nan());
    }

    #[test]
    fn non_finite_values_are_counted_not_summarised() {
        let stats = VolumeStats::from_values([1.0, f64::NAN, 3.0, f64::INFINITY]);
        assert_eq!(stats.finite, 2);
        assert_eq!(stats.non_finite, 2);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 3.0);
        assert_eq!(stats.mean, 2.0);
    }
}
