//! Separable radix-2 FFT built from butterfly-table passes.
//!
//! A 2D transform is `log2(N)` row passes followed by `log2(N)` column passes.
//! Pass `p` reads ping-pong slot `p % 2` and writes slot `(p + 1) % 2`, so the
//! slot holding the result is a function of the pass count alone.

use num_complex::Complex32;
use rayon::prelude::*;

use crate::butterfly::{ButterflyEntry, ButterflyTable};
use crate::evolve::TimeSpectrum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FftDirection {
    Forward,
    #[default]
    Inverse,
}

/// Axis a pass runs along.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassAxis {
    Rows,
    Columns,
}

/// Slot pass `pass` reads from.
#[inline]
pub fn read_slot(pass: u32) -> usize {
    (pass % 2) as usize
}

/// Slot pass `pass` writes to.
#[inline]
pub fn write_slot(pass: u32) -> usize {
    ((pass + 1) % 2) as usize
}

/// Slot holding the data after `passes` passes, starting from slot 0.
#[inline]
pub fn output_slot(passes: u32) -> usize {
    (passes % 2) as usize
}

#[inline]
fn twiddle(entry: &ButterflyEntry, direction: FftDirection) -> Complex32 {
    match direction {
        FftDirection::Forward => entry.twiddle,
        FftDirection::Inverse => entry.twiddle.conj(),
    }
}

/// Kernel body for one butterfly pass over an `n`-wide row-major grid.
///
/// `input` and `output` must be distinct buffers of equal length.
pub fn butterfly_pass(
    axis: PassAxis,
    direction: FftDirection,
    n: usize,
    stage: &[ButterflyEntry],
    input: &[Complex32],
    output: &mut [Complex32],
) {
    match axis {
        PassAxis::Rows => {
            output
                .par_chunks_mut(n)
                .zip(input.par_chunks(n))
                .for_each(|(out_row, in_row)| {
                    for (x, out) in out_row.iter_mut().enumerate() {
                        let entry = &stage[x];
                        let a = in_row[entry.source_a as usize];
                        let b = in_row[entry.source_b as usize];
                        *out = a + twiddle(entry, direction) * b;
                    }
                });
        }
        PassAxis::Columns => {
            output
                .par_chunks_mut(n)
                .enumerate()
                .for_each(|(y, out_row)| {
                    let entry = &stage[y];
                    let w = twiddle(entry, direction);
                    let row_a = &input[entry.source_a as usize * n..][..n];
                    let row_b = &input[entry.source_b as usize * n..][..n];
                    for x in 0..n {
                        out_row[x] = row_a[x] + w * row_b[x];
                    }
                });
        }
    }
}

fn ping_pong(buffers: &mut [Vec<Complex32>; 2], pass: u32) -> (&[Complex32], &mut [Complex32]) {
    let [zero, one] = buffers;
    if read_slot(pass) == 0 {
        (zero.as_slice(), one.as_mut_slice())
    } else {
        (one.as_slice(), zero.as_mut_slice())
    }
}

/// Host-side FFT driven by a butterfly table.
#[derive(Debug, Clone)]
pub struct FftTransformer {
    table: ButterflyTable,
}

impl FftTransformer {
    pub fn new(n: usize) -> Self {
        Self::from_table(ButterflyTable::new(n))
    }

    pub fn from_table(table: ButterflyTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &ButterflyTable {
        &self.table
    }

    /// Run the given axes over `data` in place through a ping-pong pair.
    fn run(&self, data: &mut Vec<Complex32>, axes: &[PassAxis], direction: FftDirection) {
        let n = self.table.resolution();
        let stages = self.table.stages();
        let scratch = vec![Complex32::new(0.0, 0.0); data.len()];
        let mut buffers = [std::mem::take(data), scratch];

        let mut pass = 0;
        for &axis in axes {
            for stage in 0..stages {
                let (input, output) = ping_pong(&mut buffers, pass);
                butterfly_pass(axis, direction, n, self.table.stage(stage), input, output);
                pass += 1;
            }
        }

        *data = std::mem::take(&mut buffers[output_slot(pass)]);
    }

    /// 1D transform of every row of `data` (length must be a multiple of N).
    pub fn transform_rows(&self, data: &mut Vec<Complex32>, direction: FftDirection) {
        self.run(data, &[PassAxis::Rows], direction);
    }

    /// Unnormalized 2D transform of an `N × N` grid.
    pub fn transform_2d(&self, data: &mut Vec<Complex32>, direction: FftDirection) {
        self.run(data, &[PassAxis::Rows, PassAxis::Columns], direction);
    }

    /// Inverse 2D transform of all three channels.
    pub fn inverse_2d(&self, spectrum: &mut TimeSpectrum) {
        for channel in spectrum.channels_mut() {
            self.transform_2d(channel, FftDirection::Inverse);
        }
    }
}
