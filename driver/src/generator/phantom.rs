use anyhow::Context;
use ndarray::{ArrayD, Dimension, IxDyn};
use qmricore::io::nii;
use qmricore::volume::{Contrast, Geometry, Volume};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for generating synthetic weighted acquisitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhantomConfig {
    pub shape: [usize; 3],
    pub echoes: usize,
    /// Tissue signal of the T1-, PD- and MT-weighted images.
    pub t1: f64,
    pub pd: f64,
    pub mt: f64,
    /// Uniform jitter, as a fraction of the local signal.
    pub noise: f64,
    pub voxel_size: f64,
    pub seed: u64,
}

impl Default for PhantomConfig {
    fn default() -> Self {
        Self {
            shape: [32, 32, 16],
            echoes: 3,
            t1: 100.0,
            pd: 80.0,
            mt: 50.0,
            noise: 0.02,
            voxel_size: 0.1,
            seed: 0,
        }
    }
}

impl PhantomConfig {
    fn tissue_signal(&self, contrast: Contrast) -> f64 {
        match contrast {
            Contrast::T1 => self.t1,
            Contrast::Pd => self.pd,
            Contrast::Mt => self.mt,
        }
    }

    /// Background (fluid) signal relative to tissue.
    fn background_fraction(contrast: Contrast) -> f64 {
        match contrast {
            Contrast::T1 => 0.3,
            Contrast::Pd => 0.5,
            Contrast::Mt => 0.6,
        }
    }
}

/// Files written by [`write_phantom`].
#[derive(Debug, Clone)]
pub struct PhantomPaths {
    pub t1: PathBuf,
    pub pd: PathBuf,
    pub mt: PathBuf,
}

fn inside_tissue(index: &[usize], shape: &[usize; 3]) -> bool {
    let r2: f64 = (0..3)
        .map(|axis| {
            let n = shape[axis] as f64;
            let offset = (index[axis] as f64 + 0.5 - n / 2.0) / (0.4 * n);
            offset * offset
        })
        .sum();
    r2 <= 1.0
}

/// Ellipsoidal tissue in fluid, with a mild signal decay across echoes.
pub fn build_phantom(config: &PhantomConfig, contrast: Contrast) -> anyhow::Result<Volume> {
    anyhow::ensure!(
        config.shape.iter().all(|&n| n > 0),
        "phantom shape {:?} has an empty axis",
        config.shape
    );
    anyhow::ensure!(config.noise >= 0.0, "phantom noise must be nonnegative");

    let echoes = config.echoes.max(1);
    let seed = config.seed.wrapping_add(contrast as u64);
    let mut rng = StdRng::seed_from_u64(seed);
    let tissue = config.tissue_signal(contrast);
    let fluid = tissue * PhantomConfig::background_fraction(contrast);

    let [nx, ny, nz] = config.shape;
    let dims: Vec<usize> = if echoes > 1 {
        vec![nx, ny, nz, echoes]
    } else {
        vec![nx, ny, nz]
    };
    let mut data = ArrayD::<f64>::zeros(IxDyn(&dims));
    for (index, value) in data.indexed_iter_mut() {
        let base = if inside_tissue(index.slice(), &config.shape) {
            tissue
        } else {
            fluid
        };
        let echo = if echoes > 1 { index[3] } else { 0 };
        // symmetric around the middle echo so the echo mean equals `base`
        let decay = 1.0 - 0.05 * (echo as f64 - (echoes - 1) as f64 / 2.0);
        let jitter = if config.noise > 0.0 {
            rng.gen_range(-config.noise..config.noise)
        } else {
            0.0
        };
        *value = base * decay * (1.0 + jitter);
    }

    let geometry = Geometry::isotropic(config.voxel_size);
    if echoes > 1 {
        Ok(Volume::with_echo_axis(data, geometry, 3)?)
    } else {
        Ok(Volume::new(data, geometry))
    }
}

pub fn write_phantom(config: &PhantomConfig, dir: &Path) -> anyhow::Result<PhantomPaths> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating phantom directory {}", dir.display()))?;
    let write = |contrast: Contrast| -> anyhow::Result<PathBuf> {
        let path = dir.join(format!("{}.nii", contrast.label()));
        let volume = build_phantom(config, contrast)?;
        nii::write_volume(&volume, &path)
            .with_context(|| format!("writing {} phantom {}", contrast, path.display()))?;
        Ok(path)
    };
    Ok(PhantomPaths {
        t1: write(Contrast::T1)?,
        pd: write(Contrast::Pd)?,
        mt: write(Contrast::Mt)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;
    use ndarray::Axis;

    #[test]
    fn echo_mean_recovers_the_tissue_signal() {
        let config = PhantomConfig {
            shape: [8, 8, 4],
            echoes: 4,
            noise: 0.0,
            ..PhantomConfig::default()
        };
        let volume = build_phantom(&config, Contrast::Pd).unwrap();
        assert_eq!(volume.echo_count(), Some(4));
        let mean = volume.data().mean_axis(Axis(3)).unwrap();
        assert_float_eq!(mean[[4, 4, 2]], 80.0, rmax <= 1e-12);
        assert_float_eq!(mean[[0, 0, 0]], 40.0, rmax <= 1e-12);
    }

    #[test]
    fn same_seed_same_phantom() {
        let config = PhantomConfig {
            shape: [4, 4, 4],
            ..PhantomConfig::default()
        };
        let a = build_phantom(&config, Contrast::Mt).unwrap();
        let b = build_phantom(&config, Contrast::Mt).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, build_phantom(&config, Contrast::T1).unwrap());
    }

    #[test]
    fn single_echo_phantom_has_no_echo_axis() {
        let config = PhantomConfig {
            shape: [3, 3, 3],
            echoes: 1,
            ..PhantomConfig::default()
        };
        let volume = build_phantom(&config, Contrast::T1).unwrap();
        assert_eq!(volume.echo_axis(), None);
        assert_eq!(volume.data().ndim(), 3);
    }
}
