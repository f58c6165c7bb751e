//! Initial Phillips spectrum `h0(k)`, its mirror `h0(-k)` and the dispersion table.

use glam::Vec2;
use num_complex::Complex32;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rayon::prelude::*;
use std::f32::consts::FRAC_1_SQRT_2;

use crate::config::OceanConfig;
use crate::error::ConfigError;

/// Wavenumber of grid cell `(x, y)`: `((-N/2 + x)·Δk, (-N/2 + y)·Δk)`.
#[inline]
pub fn wavenumber(x: usize, y: usize, n: usize, delta_k: f32) -> Vec2 {
    let half = (n / 2) as f32;
    Vec2::new((x as f32 - half) * delta_k, (y as f32 - half) * delta_k)
}

/// Index of the cell holding `-k` along one axis. The Nyquist index maps to itself.
#[inline]
pub fn mirror_index(i: usize, n: usize) -> usize {
    (n - i) % n
}

/// Phillips spectrum implementation for wave height distribution
///
/// `config` must be validated: the wind direction is expected to be a unit vector.
pub fn phillips_spectrum(k: Vec2, config: &OceanConfig) -> f32 {
    // No energy at zero frequency
    if k.length_squared() == 0.0 {
        return 0.0;
    }

    // Largest possible waves arising from wind of speed V
    let l = config.wind_speed * config.wind_speed / config.gravity;
    let k_length = k.length();
    let k_hat = k / k_length;

    // Waves running against the wind keep a small fixed share of energy
    let mut k_cos = k_hat.dot(config.wind_direction);
    if k_cos < 0.0 {
        k_cos = config.against_wind_factor;
    }

    let mut result = config.amplitude * (-1.0 / (k_length * l).powi(2)).exp() / k_length.powi(4)
        * k_cos
        * k_cos;

    if config.small_wave_cutoff > 0.0 {
        result *= (-k_length * k_length * config.small_wave_cutoff.powi(2)).exp();
    }

    result
}

/// Dispersion relation, deep water unless a depth is configured
pub fn dispersion(k_length: f32, config: &OceanConfig) -> f32 {
    match config.depth {
        Some(depth) => (config.gravity * k_length * (k_length * depth).tanh()).sqrt(),
        None => (config.gravity * k_length).sqrt(),
    }
}

/// The immutable initial spectrum for one parameter set.
#[derive(Debug, Clone, PartialEq)]
pub struct InitialSpectrum {
    pub resolution: usize,
    pub patch_length: f32,
    pub h0k: Vec<Complex32>,
    pub h0minusk: Vec<Complex32>,
    pub omega: Vec<f32>,
}

impl InitialSpectrum {
    /// Generate `h0k`, `h0minusk` and `omega` for `config`.
    ///
    /// One complex Gaussian sample is drawn per cell. `h0minusk` at `k` reuses the
    /// sample of the mirror cell, so `h0minusk[k] == h0k[-k]` and the evolved
    /// spectrum stays Hermitian.
    pub fn generate(config: &OceanConfig) -> Result<Self, ConfigError> {
        let config = config.validate()?;
        let n = config.resolution;
        let delta_k = config.delta_k();

        // Sequential draw so the field only depends on the seed
        let mut rng = StdRng::seed_from_u64(config.seed);
        let xi: Vec<Complex32> = (0..n * n)
            .map(|_| {
                let re: f32 = rng.sample(StandardNormal);
                let im: f32 = rng.sample(StandardNormal);
                Complex32::new(re, im) * FRAC_1_SQRT_2
            })
            .collect();

        let h0k: Vec<Complex32> = (0..n * n)
            .into_par_iter()
            .map(|i| {
                let k = wavenumber(i % n, i / n, n, delta_k);
                xi[i] * phillips_spectrum(k, &config).sqrt()
            })
            .collect();

        let h0minusk: Vec<Complex32> = (0..n * n)
            .into_par_iter()
            .map(|i| {
                let (x, y) = (i % n, i / n);
                h0k[mirror_index(y, n) * n + mirror_index(x, n)]
            })
            .collect();

        let omega: Vec<f32> = (0..n * n)
            .into_par_iter()
            .map(|i| {
                let k = wavenumber(i % n, i / n, n, delta_k);
                dispersion(k.length(), &config)
            })
            .collect();

        log::debug!(
            "generated initial spectrum: n={}, L={}, seed={}",
            n,
            config.patch_length,
            config.seed
        );

        Ok(Self {
            resolution: n,
            patch_length: config.patch_length,
            h0k,
            h0minusk,
            omega,
        })
    }
}
