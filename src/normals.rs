//! Surface normals from the displacement height gradient.

use glam::Vec3;
use rayon::prelude::*;

use crate::displacement::DisplacementField;

/// Unit normals in row-major order
#[derive(Debug, Clone, PartialEq)]
pub struct NormalField {
    pub resolution: usize,
    pub values: Vec<Vec3>,
}

impl NormalField {
    pub fn get(&self, x: isize, y: isize) -> Vec3 {
        let n = self.resolution as isize;
        let (x, y) = (x.rem_euclid(n) as usize, y.rem_euclid(n) as usize);
        self.values[y * self.resolution + x]
    }
}

/// Kernel body for `Normals`.
///
/// Central differences of the height component over world spacing `L / N`,
/// wrapping at the patch edges.
pub fn estimate_rows(n: usize, patch_length: f32, displacement: &[Vec3], out: &mut [Vec3]) {
    let inv_two_spacing = n as f32 / (2.0 * patch_length);

    out.par_chunks_mut(n).enumerate().for_each(|(y, row)| {
        let up = (y + n - 1) % n;
        let down = (y + 1) % n;
        for (x, normal) in row.iter_mut().enumerate() {
            let left = (x + n - 1) % n;
            let right = (x + 1) % n;

            let dh_dx = (displacement[y * n + right].y - displacement[y * n + left].y)
                * inv_two_spacing;
            let dh_dz = (displacement[down * n + x].y - displacement[up * n + x].y)
                * inv_two_spacing;

            // Never degenerate: the y component is always 1 before normalizing
            *normal = Vec3::new(-dh_dx, 1.0, -dh_dz).normalize();
        }
    });
}

/// Host-side normal estimation
#[derive(Debug, Clone, Copy)]
pub struct NormalEstimator {
    pub patch_length: f32,
}

impl NormalEstimator {
    pub fn new(patch_length: f32) -> Self {
        Self { patch_length }
    }

    pub fn estimate(&self, field: &DisplacementField) -> NormalField {
        let n = field.resolution;
        let mut values = vec![Vec3::Y; n * n];
        estimate_rows(n, self.patch_length, &field.values, &mut values);
        NormalField {
            resolution: n,
            values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_from(n: usize, height: impl Fn(usize, usize) -> f32) -> DisplacementField {
        let values = (0..n * n)
            .map(|i| Vec3::new(0.0, height(i % n, i / n), 0.0))
            .collect();
        DisplacementField {
            resolution: n,
            values,
        }
    }

    #[test]
    fn test_flat_surface_points_up() {
        let field = field_from(8, |_, _| 3.0);
        let normals = NormalEstimator::new(8.0).estimate(&field);
        assert!(normals.values.iter().all(|n| *n == Vec3::Y));
    }

    #[test]
    fn test_slope_tilts_against_gradient() {
        // Height rises along x with slope 1 per world unit (L/N = 1)
        let n = 8;
        let field = field_from(n, |x, _| x as f32);
        let normals = NormalEstimator::new(8.0).estimate(&field);

        let interior = normals.get(3, 2);
        let expected = Vec3::new(-1.0, 1.0, 0.0).normalize();
        assert!((interior - expected).length() < 1e-6);
    }

    #[test]
    fn test_edges_wrap() {
        let n = 8;
        // Single bump at x = 0; its neighbour at x = N-1 must see it through the wrap
        let field = field_from(n, |x, _| if x == 0 { 1.0 } else { 0.0 });
        let normals = NormalEstimator::new(8.0).estimate(&field);

        let before = normals.get(-1, 0);
        let after = normals.get(1, 0);
        assert!(before.x < 0.0);
        assert!(after.x > 0.0);
        assert!((before.x + after.x).abs() < 1e-6);
    }

    #[test]
    fn test_normals_are_unit_length() {
        let n = 16;
        let field = field_from(n, |x, y| (x as f32 * 0.7).sin() * (y as f32 * 0.3).cos());
        let normals = NormalEstimator::new(4.0).estimate(&field);
        for normal in &normals.values {
            assert!((normal.length() - 1.0).abs() < 1e-5);
            assert!(normal.y > 0.0);
        }
    }
}
