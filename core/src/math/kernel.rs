/// Standard deviation, in voxels, of the smoothing Gaussian.
pub const SMOOTHING_SIGMA_VOXELS: f64 = 1.0;

/// Normalised 1-D Gaussian taps for a kernel of the given extent.
///
/// The kernel is `2 * (extent / 2) + 1` taps wide, so extents 0 and 1 give
/// the single-tap identity kernel.
pub fn gaussian_kernel(extent: usize) -> Vec<f64> {
    let radius = (extent / 2) as isize;
    let taps: Vec<f64> = (-radius..=radius)
        .map(|k| {
            let z = k as f64 / SMOOTHING_SIGMA_VOXELS;
            (-0.5 * z * z).exp()
        })
        .collect();
    let total: f64 = taps.iter().sum();
    taps.into_iter().map(|w| w / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;
    use rstest::rstest;

    #[rstest(extent, width,
             case(0, 1),
             case(1, 1),
             case(2, 3),
             case(3, 3),
             case(5, 5),
             case(8, 9),
    )]
    fn kernel_width_follows_extent(extent: usize, width: usize) {
        assert_eq!(gaussian_kernel(extent).len(), width);
    }

    #[test]
    fn kernel_is_normalised_and_symmetric() {
        let kernel = gaussian_kernel(7);
        assert_float_eq!(kernel.iter().sum::<f64>(), 1.0, abs <= 1e-12);
        for (a, b) in kernel.iter().zip(kernel.iter().rev()) {
            assert_float_eq!(*a, *b, ulps <= 1);
        }
        assert!(kernel[3] > kernel[2] && kernel[2] > kernel[1]);
    }
}
