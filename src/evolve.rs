//! Time evolution of the initial spectrum into height and choppy displacement channels.

use glam::Vec2;
use num_complex::Complex32;
use rayon::prelude::*;

use crate::spectrum::{wavenumber, InitialSpectrum};

/// Time-dependent spectrum: height and the two horizontal displacement channels.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSpectrum {
    pub resolution: usize,
    pub height: Vec<Complex32>,
    pub dx: Vec<Complex32>,
    pub dz: Vec<Complex32>,
}

impl TimeSpectrum {
    pub fn zeroed(resolution: usize) -> Self {
        let zero = vec![Complex32::new(0.0, 0.0); resolution * resolution];
        Self {
            resolution,
            height: zero.clone(),
            dx: zero.clone(),
            dz: zero,
        }
    }

    pub fn channels_mut(&mut self) -> [&mut Vec<Complex32>; 3] {
        [&mut self.height, &mut self.dx, &mut self.dz]
    }
}

/// Evolve one cell: `h = h0(k)·e^{iωt} + conj(h0(-k))·e^{-iωt}`.
///
/// Returns `[h, i·k̂x·h, i·k̂y·h]`. The displacement channels are zero at `k = 0`.
#[inline]
pub fn evolve_cell(
    h0k: Complex32,
    h0minusk: Complex32,
    omega: f32,
    k: Vec2,
    time: f32,
) -> [Complex32; 3] {
    let phase = Complex32::from_polar(1.0, omega * time);
    let h = h0k * phase + h0minusk.conj() * phase.conj();

    let k_length = k.length();
    if k_length == 0.0 {
        let zero = Complex32::new(0.0, 0.0);
        return [h, zero, zero];
    }

    let dx = Complex32::new(0.0, k.x / k_length) * h;
    let dz = Complex32::new(0.0, k.y / k_length) * h;
    [h, dx, dz]
}

/// Kernel body for `TimeEvolve`, one row per rayon task.
#[allow(clippy::too_many_arguments)]
pub fn evolve_rows(
    n: usize,
    delta_k: f32,
    time: f32,
    h0k: &[Complex32],
    h0minusk: &[Complex32],
    omega: &[f32],
    height: &mut [Complex32],
    dx: &mut [Complex32],
    dz: &mut [Complex32],
) {
    height
        .par_chunks_mut(n)
        .zip(dx.par_chunks_mut(n))
        .zip(dz.par_chunks_mut(n))
        .enumerate()
        .for_each(|(y, ((height_row, dx_row), dz_row))| {
            for x in 0..n {
                let i = y * n + x;
                let k = wavenumber(x, y, n, delta_k);
                let [h, d_x, d_z] = evolve_cell(h0k[i], h0minusk[i], omega[i], k, time);
                height_row[x] = h;
                dx_row[x] = d_x;
                dz_row[x] = d_z;
            }
        });
}

/// Host-side time evolution.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeEvolver;

impl TimeEvolver {
    pub fn evolve(&self, spectrum: &InitialSpectrum, time: f32) -> TimeSpectrum {
        let n = spectrum.resolution;
        let delta_k = 2.0 * std::f32::consts::PI / spectrum.patch_length;
        let mut out = TimeSpectrum::zeroed(n);
        evolve_rows(
            n,
            delta_k,
            time,
            &spectrum.h0k,
            &spectrum.h0minusk,
            &spectrum.omega,
            &mut out.height,
            &mut out.dx,
            &mut out.dz,
        );
        out
    }
}
