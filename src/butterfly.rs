//! Bit-reversal permutation and radix-2 butterfly lookup tables.
//!
//! Both tables are pure functions of the grid resolution. Stage 0 of the
//! butterfly table already reads its inputs in bit-reversed order, so an FFT
//! pass never needs a separate permutation step.

use num_complex::Complex32;
use std::f32::consts::PI;

/// Reverse the lowest `bits` bits of `i`.
#[inline]
pub fn reverse_bits(i: usize, bits: u32) -> usize {
    if bits == 0 {
        return 0;
    }
    i.reverse_bits() >> (usize::BITS - bits)
}

/// Length-N bit-reversal permutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitReversalTable {
    indices: Vec<u32>,
}

impl BitReversalTable {
    pub fn new(n: usize) -> Self {
        let bits = n.trailing_zeros();
        let indices = (0..n).map(|i| reverse_bits(i, bits) as u32).collect();
        Self { indices }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    #[inline]
    pub fn get(&self, i: usize) -> usize {
        self.indices[i] as usize
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.indices
    }
}

/// One butterfly: `out[i] = in[source_a] + twiddle * in[source_b]`.
///
/// The twiddle is stored for the forward transform; the inverse uses its conjugate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ButterflyEntry {
    pub twiddle: Complex32,
    pub source_a: u32,
    pub source_b: u32,
}

/// Butterfly factors indexed by `(stage, index)`, `log2(N) × N` entries.
#[derive(Debug, Clone, PartialEq)]
pub struct ButterflyTable {
    resolution: usize,
    stages: u32,
    entries: Vec<ButterflyEntry>,
}

impl ButterflyTable {
    /// Build the decimation-in-time schedule for a power-of-two `n`.
    pub fn new(n: usize) -> Self {
        let stages = n.trailing_zeros();
        let reversal = BitReversalTable::new(n);
        let mut entries = vec![
            ButterflyEntry {
                twiddle: Complex32::new(1.0, 0.0),
                source_a: 0,
                source_b: 0,
            };
            n * stages as usize
        ];

        for stage in 0..stages as usize {
            let half = 1usize << stage;
            let span = half * 2;
            let row = &mut entries[stage * n..(stage + 1) * n];

            for block in (0..n).step_by(span) {
                for k in 0..half {
                    let i1 = block + k;
                    let i2 = i1 + half;
                    let (a, b) = if stage == 0 {
                        (reversal.get(i1), reversal.get(i2))
                    } else {
                        (i1, i2)
                    };

                    let angle = -2.0 * PI * k as f32 / span as f32;
                    let twiddle = Complex32::from_polar(1.0, angle);

                    row[i1] = ButterflyEntry {
                        twiddle,
                        source_a: a as u32,
                        source_b: b as u32,
                    };
                    row[i2] = ButterflyEntry {
                        twiddle: -twiddle,
                        source_a: a as u32,
                        source_b: b as u32,
                    };
                }
            }
        }

        Self {
            resolution: n,
            stages,
            entries,
        }
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    pub fn stages(&self) -> u32 {
        self.stages
    }

    /// All entries of one stage.
    #[inline]
    pub fn stage(&self, stage: u32) -> &[ButterflyEntry] {
        let n = self.resolution;
        let start = stage as usize * n;
        &self.entries[start..start + n]
    }

    #[inline]
    pub fn entry(&self, stage: u32, index: usize) -> ButterflyEntry {
        self.stage(stage)[index]
    }

    pub fn entries(&self) -> &[ButterflyEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<ButterflyEntry> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_reversal_is_involution() {
        for bits in 1..=10 {
            let n = 1usize << bits;
            let table = BitReversalTable::new(n);
            assert_eq!(table.len(), n);
            for i in 0..n {
                assert_eq!(table.get(table.get(i)), i);
            }
        }
    }

    #[test]
    fn test_bit_reversal_known_values() {
        let table = BitReversalTable::new(8);
        assert_eq!(table.as_slice(), &[0, 4, 2, 6, 1, 5, 3, 7]);
    }

    #[test]
    fn test_table_shape() {
        let table = ButterflyTable::new(16);
        assert_eq!(table.stages(), 4);
        assert_eq!(table.entries().len(), 64);
    }

    #[test]
    fn test_stage_zero_reads_bit_reversed_pairs() {
        let table = ButterflyTable::new(8);
        let first = table.entry(0, 0);
        let second = table.entry(0, 1);
        assert_eq!((first.source_a, first.source_b), (0, 4));
        assert_eq!((second.source_a, second.source_b), (0, 4));
        assert!((first.twiddle - Complex32::new(1.0, 0.0)).norm() < 1e-6);
        assert!((second.twiddle + Complex32::new(1.0, 0.0)).norm() < 1e-6);
    }

    #[test]
    fn test_pairs_share_sources_and_negate_twiddle() {
        let n = 32;
        let table = ButterflyTable::new(n);
        for stage in 0..table.stages() {
            let half = 1usize << stage;
            for i in 0..n {
                if (i / half) % 2 == 1 {
                    continue;
                }
                let top = table.entry(stage, i);
                let bottom = table.entry(stage, i + half);
                assert_eq!(top.source_a, bottom.source_a);
                assert_eq!(top.source_b, bottom.source_b);
                assert!((top.twiddle + bottom.twiddle).norm() < 1e-6);
                assert!((top.twiddle.norm() - 1.0).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_last_stage_twiddles() {
        let n = 8;
        let table = ButterflyTable::new(n);
        let last = table.stages() - 1;
        // e^{-2πi k / 8} for k = 0..4
        for k in 0..n / 2 {
            let expected = Complex32::from_polar(1.0, -2.0 * PI * k as f32 / n as f32);
            assert!((table.entry(last, k).twiddle - expected).norm() < 1e-6);
        }
    }
}
