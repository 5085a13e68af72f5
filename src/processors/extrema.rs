//! Elevation extrema of a cluster.
//!
//! Bottoms look at a thin window above the lowest point and split it into
//! separate bases (e.g. the feet of a pylon) with diamond-merge clustering;
//! each base yields one representative point. Tops simply report the highest
//! points of the cluster.

use geo::{Centroid, LineString, Polygon};

use super::clustering::ClusteringError;
use super::cubic::cubic_clusters;
use crate::config::CubicConfig;

/// Bases with fewer points than this report their raw lowest points.
pub const MIN_BASE_POINTS: usize = 4;

/// A representative extreme point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExtremumRecord {
    /// An input point, reported as-is.
    Raw([f64; 3]),
    /// A planar centroid paired with an extreme elevation.
    Synthesized([f64; 3]),
}

impl ExtremumRecord {
    pub fn point(&self) -> [f64; 3] {
        match *self {
            ExtremumRecord::Raw(p) | ExtremumRecord::Synthesized(p) => p,
        }
    }
}

fn min_z(points: &[[f64; 3]]) -> f64 {
    points.iter().map(|p| p[2]).fold(f64::INFINITY, f64::min)
}

fn max_z(points: &[[f64; 3]]) -> f64 {
    points.iter().map(|p| p[2]).fold(f64::NEG_INFINITY, f64::max)
}

/// Planar centroid of the polygon whose ring visits the base points in order.
///
/// Falls back to the mean (x, y) when no centroid can be computed.
fn base_centroid(base: &[[f64; 3]]) -> [f64; 2] {
    let ring: Vec<(f64, f64)> = base.iter().map(|p| (p[0], p[1])).collect();
    match Polygon::new(LineString::from(ring), vec![]).centroid() {
        Some(c) => [c.x(), c.y()],
        None => {
            let n = base.len() as f64;
            let (sx, sy) = base
                .iter()
                .fold((0.0, 0.0), |(sx, sy), p| (sx + p[0], sy + p[1]));
            [sx / n, sy / n]
        }
    }
}

/// Representative bottom points of a cluster.
///
/// The window holds every point with `z < min_z + tolerance`. It is split
/// into bases with [`cubic_clusters`]. A base with fewer than
/// [`MIN_BASE_POINTS`] points reports each of its points at the base's
/// minimum z (ties give several records); a larger base reports one
/// synthesized record at its centroid and minimum z.
///
/// # Errors
///
/// [`ClusteringError`] if a coordinate is not finite or the base
/// clustering is misconfigured.
pub fn extract_bottoms(
    cluster: &[[f64; 3]],
    tolerance: f64,
    bases: &CubicConfig,
) -> Result<Vec<ExtremumRecord>, ClusteringError> {
    if let Some(index) = cluster.iter().position(|p| !p[2].is_finite()) {
        return Err(ClusteringError::NonFinitePoint { index });
    }
    if cluster.is_empty() {
        return Ok(Vec::new());
    }

    let floor = min_z(cluster) + tolerance;
    let window: Vec<[f64; 3]> = cluster.iter().copied().filter(|p| p[2] < floor).collect();

    let groups = cubic_clusters(&window, bases.half_length, bases.boundary)?;
    log::debug!(
        "bottoms: {} of {} points in window, {} bases",
        window.len(),
        cluster.len(),
        groups.len()
    );

    let mut records = Vec::new();
    for base in &groups {
        let lowest = min_z(base);
        if base.len() < MIN_BASE_POINTS {
            records.extend(
                base.iter()
                    .filter(|p| p[2] == lowest)
                    .map(|p| ExtremumRecord::Raw(*p)),
            );
        } else {
            let [x, y] = base_centroid(base);
            records.push(ExtremumRecord::Synthesized([x, y, lowest]));
        }
    }
    Ok(records)
}

/// Highest points of a cluster.
///
/// The window holds every point with `z > max_z - tolerance`; every window
/// point at the window's maximum z is reported, so ties give several
/// records.
pub fn extract_tops(cluster: &[[f64; 3]], tolerance: f64) -> Vec<ExtremumRecord> {
    let ceiling = max_z(cluster) - tolerance;
    let window: Vec<&[f64; 3]> = cluster.iter().filter(|p| p[2] > ceiling).collect();

    let highest = window
        .iter()
        .map(|p| p[2])
        .fold(f64::NEG_INFINITY, f64::max);

    window
        .into_iter()
        .filter(|p| p[2] == highest)
        .map(|p| ExtremumRecord::Raw(*p))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BoundaryPolicy;
    use approx::assert_relative_eq;

    fn bases() -> CubicConfig {
        CubicConfig::default()
    }

    #[test]
    fn test_small_base_reports_raw_lowest_points() {
        let cluster = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 5.0]];

        // Wide window so all three points form one base
        let records = extract_bottoms(&cluster, 10.0, &bases()).unwrap();
        assert_eq!(
            records,
            vec![
                ExtremumRecord::Raw([0.0, 0.0, 0.0]),
                ExtremumRecord::Raw([1.0, 0.0, 0.0]),
            ]
        );
    }

    #[test]
    fn test_large_base_reports_centroid() {
        // Square footprint, listed around the ring
        let cluster = vec![
            [0.0, 0.0, 1.0],
            [2.0, 0.0, 0.5],
            [2.0, 2.0, 0.8],
            [0.0, 2.0, 0.9],
            [1.0, 1.0, 40.0],
        ];

        let records = extract_bottoms(&cluster, 5.0, &bases()).unwrap();
        assert_eq!(records.len(), 1);
        let ExtremumRecord::Synthesized(p) = records[0] else {
            panic!("expected a synthesized record, got {:?}", records[0]);
        };
        assert_relative_eq!(p[0], 1.0, epsilon = 1e-9);
        assert_relative_eq!(p[1], 1.0, epsilon = 1e-9);
        assert_eq!(p[2], 0.5);
    }

    #[test]
    fn test_separate_bases_each_report() {
        let cluster = vec![
            [0.0, 0.0, 0.0],
            [0.5, 0.0, 0.2],
            [20.0, 0.0, 1.0],
            [20.5, 0.0, 1.0],
            [10.0, 0.0, 30.0],
        ];

        let records = extract_bottoms(&cluster, 5.0, &bases()).unwrap();
        let points: Vec<[f64; 3]> = records.iter().map(|r| r.point()).collect();
        assert_eq!(
            points,
            vec![[0.0, 0.0, 0.0], [20.0, 0.0, 1.0], [20.5, 0.0, 1.0]]
        );
    }

    #[test]
    fn test_bottom_window_is_strict() {
        let cluster = vec![[0.0, 0.0, 0.0], [0.5, 0.0, 5.0]];

        let records = extract_bottoms(&cluster, 5.0, &bases()).unwrap();
        assert_eq!(records, vec![ExtremumRecord::Raw([0.0, 0.0, 0.0])]);
    }

    #[test]
    fn test_base_half_length_controls_split() {
        let cluster = vec![[0.0, 0.0, 0.0], [3.0, 0.0, 0.1]];

        let merged = extract_bottoms(&cluster, 1.0, &bases()).unwrap();
        assert_eq!(merged, vec![ExtremumRecord::Raw([0.0, 0.0, 0.0])]);

        let narrow = CubicConfig {
            half_length: 1.0,
            boundary: BoundaryPolicy::Exclusive,
        };
        let split = extract_bottoms(&cluster, 1.0, &narrow).unwrap();
        assert_eq!(
            split,
            vec![
                ExtremumRecord::Raw([0.0, 0.0, 0.0]),
                ExtremumRecord::Raw([3.0, 0.0, 0.1]),
            ]
        );
    }

    #[test]
    fn test_bottoms_reject_non_finite_z() {
        let cluster = vec![[0.0, 0.0, 0.0], [0.0, 0.0, f64::NAN]];
        assert_eq!(
            extract_bottoms(&cluster, 1.0, &bases()),
            Err(ClusteringError::NonFinitePoint { index: 1 })
        );
        assert!(extract_bottoms(&[], 1.0, &bases()).unwrap().is_empty());
    }

    #[test]
    fn test_tops_report_ties() {
        let cluster = vec![
            [0.0, 0.0, 10.0],
            [1.0, 0.0, 9.5],
            [2.0, 0.0, 10.0],
            [3.0, 0.0, 2.0],
        ];

        let tops = extract_tops(&cluster, 2.0);
        assert_eq!(
            tops,
            vec![
                ExtremumRecord::Raw([0.0, 0.0, 10.0]),
                ExtremumRecord::Raw([2.0, 0.0, 10.0]),
            ]
        );
    }

    #[test]
    fn test_tops_are_idempotent() {
        let cluster: Vec<[f64; 3]> = (0..50)
            .map(|i| {
                let f = i as f64;
                [f, (f * 0.7).sin(), (f * 1.3).cos() * 3.0]
            })
            .collect();

        assert_eq!(extract_tops(&cluster, 2.0), extract_tops(&cluster, 2.0));
        assert!(!extract_tops(&cluster, 2.0).is_empty());
        assert!(extract_tops(&[], 2.0).is_empty());
    }
}
