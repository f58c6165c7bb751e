use glam::Vec3;
use num_complex::Complex32;
use rayon::prelude::*;

use crate::evolve::TimeSpectrum;

/// Checkerboard sign `(-1)^(x+y)` undoing the half-grid shift of the spectrum
#[inline]
pub fn checkerboard_sign(x: usize, y: usize) -> f32 {
    if (x + y) % 2 == 0 {
        1.0
    } else {
        -1.0
    }
}

/// Per-texel displacement `(Dx·c, H, Dz·c)` in row-major order
#[derive(Debug, Clone, PartialEq)]
pub struct DisplacementField {
    pub resolution: usize,
    pub values: Vec<Vec3>,
}

impl DisplacementField {
    /// Sample with wraparound, the field is periodic over the patch
    pub fn get(&self, x: isize, y: isize) -> Vec3 {
        let n = self.resolution as isize;
        let (x, y) = (x.rem_euclid(n) as usize, y.rem_euclid(n) as usize);
        self.values[y * self.resolution + x]
    }

    pub fn height(&self, x: isize, y: isize) -> f32 {
        self.get(x, y).y
    }
}

/// Kernel body for `Displacement`
pub fn synthesize_rows(
    n: usize,
    choppiness: f32,
    height: &[Complex32],
    dx: &[Complex32],
    dz: &[Complex32],
    out: &mut [Vec3],
) {
    out.par_chunks_mut(n).enumerate().for_each(|(y, row)| {
        for (x, texel) in row.iter_mut().enumerate() {
            let i = y * n + x;
            let sign = checkerboard_sign(x, y);
            let h = sign * height[i].re;
            let d_x = sign * dx[i].re;
            let d_z = sign * dz[i].re;
            *texel = Vec3::new(d_x * choppiness, h, d_z * choppiness);
        }
    });
}

/// Combines the three inverse-transformed channels into one displacement field
#[derive(Debug, Clone, Copy)]
pub struct DisplacementSynthesizer {
    pub max_choppiness: f32,
}

impl DisplacementSynthesizer {
    pub fn new(max_choppiness: f32) -> Self {
        Self { max_choppiness }
    }

    /// `spatial` must already be inverse transformed.
    pub fn synthesize(&self, spatial: &TimeSpectrum, choppiness: f32) -> DisplacementField {
        let n = spatial.resolution;
        // Large values fold the surface over; that is accepted, only the range is enforced
        let choppiness = choppiness.clamp(0.0, self.max_choppiness.max(0.0));
        let mut values = vec![Vec3::ZERO; n * n];
        synthesize_rows(
            n,
            choppiness,
            &spatial.height,
            &spatial.dx,
            &spatial.dz,
            &mut values,
        );
        DisplacementField {
            resolution: n,
            values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OceanConfig;
    use crate::evolve::TimeEvolver;
    use crate::fft::FftTransformer;
    use crate::spectrum::{wavenumber, InitialSpectrum};
    use glam::Vec2;

    fn spatial(n: usize) -> TimeSpectrum {
        let mut s = TimeSpectrum::zeroed(n);
        for i in 0..n * n {
            s.height[i] = Complex32::new(2.0, 0.5);
            s.dx[i] = Complex32::new(1.0, 0.0);
            s.dz[i] = Complex32::new(-3.0, 0.0);
        }
        s
    }

    #[test]
    fn test_checkerboard_sign() {
        assert_eq!(checkerboard_sign(0, 0), 1.0);
        assert_eq!(checkerboard_sign(1, 0), -1.0);
        assert_eq!(checkerboard_sign(1, 1), 1.0);
        assert_eq!(checkerboard_sign(4, 7), -1.0);
    }

    #[test]
    fn test_sign_and_choppiness_applied() {
        let field = DisplacementSynthesizer::new(2.5).synthesize(&spatial(4), 0.5);
        assert_eq!(field.get(0, 0), Vec3::new(0.5, 2.0, -1.5));
        assert_eq!(field.get(1, 0), Vec3::new(-0.5, -2.0, 1.5));
        assert_eq!(field.get(1, 1), Vec3::new(0.5, 2.0, -1.5));
    }

    #[test]
    fn test_choppiness_clamped_to_range() {
        let synth = DisplacementSynthesizer::new(1.0);
        let field = synth.synthesize(&spatial(2), 50.0);
        assert_eq!(field.get(0, 0).x, 1.0);

        let flat = synth.synthesize(&spatial(2), -1.0);
        assert_eq!(flat.get(0, 0).x, 0.0);
        assert_eq!(flat.get(0, 0).y, 2.0);
    }

    #[test]
    fn test_sampling_wraps() {
        let field = DisplacementSynthesizer::new(2.5).synthesize(&spatial(4), 1.0);
        assert_eq!(field.get(4, 0), field.get(0, 0));
        assert_eq!(field.get(-1, 2), field.get(3, 2));
    }

    /// `Re Σ h(k)·e^{ik·p}` evaluated directly at world position `p`
    fn direct_height(spectrum: &TimeSpectrum, delta_k: f32, p: Vec2) -> f32 {
        let n = spectrum.resolution;
        spectrum
            .height
            .iter()
            .enumerate()
            .map(|(i, h)| {
                let k = wavenumber(i % n, i / n, n, delta_k);
                *h * Complex32::from_polar(1.0, k.dot(p))
            })
            .sum::<Complex32>()
            .re
    }

    #[test]
    fn test_surface_tiles_over_the_patch() {
        let config = OceanConfig::default()
            .with_resolution(8)
            .with_patch_length(8.0)
            .with_wind(10.0, Vec2::new(1.0, 0.0));
        let initial = InitialSpectrum::generate(&config).unwrap();
        let evolved = TimeEvolver.evolve(&initial, 1.25);

        let mut spatial = evolved.clone();
        FftTransformer::new(8).inverse_2d(&mut spatial);
        let field = DisplacementSynthesizer::new(config.max_choppiness).synthesize(&spatial, 0.0);

        let peak = field.values.iter().map(|v| v.y.abs()).fold(0.0f32, f32::max);
        assert!(peak > 0.0);
        let tolerance = 1e-4 * peak.max(1.0);

        let spacing = config.patch_length / 8.0;
        let delta_k = config.delta_k();
        for (x, y) in [(0, 0), (3, 1), (7, 5), (4, 4)] {
            let p = Vec2::new(x as f32, y as f32) * spacing;
            let here = direct_height(&evolved, delta_k, p);
            let shifted = direct_height(&evolved, delta_k, p + Vec2::new(config.patch_length, 0.0));
            let diagonal = direct_height(&evolved, delta_k, p + Vec2::splat(config.patch_length));

            assert!((here - shifted).abs() < tolerance, "{} vs {}", here, shifted);
            assert!((here - diagonal).abs() < tolerance, "{} vs {}", here, diagonal);
            assert!(
                (here - field.height(x, y)).abs() < tolerance,
                "direct {} vs transformed {}",
                here,
                field.height(x, y)
            );
        }
    }
}
