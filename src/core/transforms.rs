//! Point set decimation and normalization.
//!
//! These operate on plain coordinate slices so they can be applied to a
//! whole cloud or to a single class extracted from it.

use rayon::prelude::*;

/// Keep every `stride`-th point, starting with the first.
///
/// A stride of 0 or 1 returns all points.
pub fn apply_stride(points: &[[f64; 3]], stride: usize) -> Vec<[f64; 3]> {
    if stride <= 1 {
        return points.to_vec();
    }
    points.iter().step_by(stride).copied().collect()
}

/// Per-axis bounds recorded by [`normalize_points`], needed to revert.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    pub min: [f64; 3],
    pub max: [f64; 3],
    pub scale: f64,
}

/// Linearly map each axis of `points` onto `[0, scale]`.
///
/// An axis with zero extent maps to 0.
pub fn normalize_points(points: &[[f64; 3]], scale: f64) -> (Vec<[f64; 3]>, Normalization) {
    let mut min = [f64::INFINITY; 3];
    let mut max = [f64::NEG_INFINITY; 3];
    for p in points {
        for axis in 0..3 {
            min[axis] = min[axis].min(p[axis]);
            max[axis] = max[axis].max(p[axis]);
        }
    }
    if points.is_empty() {
        min = [0.0; 3];
        max = [0.0; 3];
    }

    let normalized = points
        .par_iter()
        .map(|p| {
            let mut out = [0.0; 3];
            for axis in 0..3 {
                let extent = max[axis] - min[axis];
                if extent > 0.0 {
                    out[axis] = (p[axis] - min[axis]) / extent * scale;
                }
            }
            out
        })
        .collect();

    (normalized, Normalization { min, max, scale })
}

/// Map normalized points back to their original coordinate ranges.
pub fn revert_normalization(points: &[[f64; 3]], norm: &Normalization) -> Vec<[f64; 3]> {
    points
        .par_iter()
        .map(|p| {
            let mut out = [0.0; 3];
            for axis in 0..3 {
                let extent = norm.max[axis] - norm.min[axis];
                out[axis] = if norm.scale != 0.0 {
                    p[axis] / norm.scale * extent + norm.min[axis]
                } else {
                    norm.min[axis]
                };
            }
            out
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_apply_stride() {
        let points: Vec<[f64; 3]> = (0..11).map(|i| [i as f64, 0.0, 0.0]).collect();

        let strided = apply_stride(&points, 5);
        assert_eq!(strided, vec![[0.0, 0.0, 0.0], [5.0, 0.0, 0.0], [10.0, 0.0, 0.0]]);

        assert_eq!(apply_stride(&points, 1).len(), 11);
        assert_eq!(apply_stride(&points, 0).len(), 11);
    }

    #[test]
    fn test_normalize_and_revert() {
        let points = vec![[10.0, 100.0, 5.0], [20.0, 300.0, 5.0], [15.0, 200.0, 5.0]];

        let (normalized, norm) = normalize_points(&points, 1.0);
        assert_relative_eq!(normalized[0][0], 0.0);
        assert_relative_eq!(normalized[1][0], 1.0);
        assert_relative_eq!(normalized[2][1], 0.5);
        // Flat axis collapses to zero
        assert_relative_eq!(normalized[1][2], 0.0);

        let reverted = revert_normalization(&normalized, &norm);
        for (orig, back) in points.iter().zip(reverted.iter()) {
            for axis in 0..3 {
                assert_relative_eq!(orig[axis], back[axis], epsilon = 1e-9);
            }
        }
    }
}
