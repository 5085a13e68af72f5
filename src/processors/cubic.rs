//! Diamond-merge ("cubic") clustering.
//!
//! Every point is grown into a diamond (a square rotated by 45 degrees, i.e.
//! an L1 ball) of the given half length. Overlapping diamonds are merged
//! and each merged region becomes one cluster. This is slower than DBSCAN
//! but follows the outline of small, tight groups closely, which makes it
//! suited to separating the individual bases of a structure.

use geo::{Contains, Intersects, LineString, Point, Polygon};
use rayon::prelude::*;

use super::clustering::ClusteringError;
use crate::config::BoundaryPolicy;
use crate::core::geometry::union_polygons;

/// The diamond around `center`.
///
/// Vertices are, in this order: (x+h, y), (x, y+h), (x-h, y), (x, y-h).
pub fn diamond(center: &[f64; 3], half_length: f64) -> Polygon<f64> {
    let [x, y, _] = *center;
    let h = half_length;
    Polygon::new(
        LineString::from(vec![(x + h, y), (x, y + h), (x - h, y), (x, y - h)]),
        vec![],
    )
}

/// Assign points to the region that holds them.
///
/// With [`BoundaryPolicy::Exclusive`] a point must lie strictly inside a
/// region; a point on a region boundary is left out of every cluster. With
/// [`BoundaryPolicy::Inclusive`] boundary points count, and a point touching
/// several regions goes to the first.
///
/// Clusters are returned in discovery order (the order in which the input
/// first hits each region); regions holding no point produce no cluster.
pub fn partition_by_regions(
    points: &[[f64; 3]],
    regions: &[Polygon<f64>],
    boundary: BoundaryPolicy,
) -> Vec<Vec<[f64; 3]>> {
    let owners: Vec<Option<usize>> = points
        .par_iter()
        .map(|p| {
            let point = Point::new(p[0], p[1]);
            regions.iter().position(|region| match boundary {
                BoundaryPolicy::Exclusive => region.contains(&point),
                BoundaryPolicy::Inclusive => region.intersects(&point),
            })
        })
        .collect();

    let mut slot_of_region: Vec<Option<usize>> = vec![None; regions.len()];
    let mut clusters: Vec<Vec<[f64; 3]>> = Vec::new();
    let mut dropped = 0usize;

    for (point, owner) in points.iter().zip(owners) {
        let Some(region) = owner else {
            dropped += 1;
            continue;
        };
        let slot = *slot_of_region[region].get_or_insert_with(|| {
            clusters.push(Vec::new());
            clusters.len() - 1
        });
        clusters[slot].push(*point);
    }

    if dropped > 0 {
        log::debug!("{} points on region boundaries left unassigned", dropped);
    }
    clusters
}

/// Cluster points by merging their diamonds.
///
/// # Arguments
///
/// * `points` - Points to cluster; only (x, y) is used for the regions
/// * `half_length` - Diamond half length
/// * `boundary` - Membership test for points on a merged region boundary
///
/// # Returns
///
/// One point set per merged region, in discovery order.
///
/// # Errors
///
/// [`ClusteringError`] if `half_length` is not a positive finite number or
/// a point has a non-finite coordinate.
pub fn cubic_clusters(
    points: &[[f64; 3]],
    half_length: f64,
    boundary: BoundaryPolicy,
) -> Result<Vec<Vec<[f64; 3]>>, ClusteringError> {
    if !(half_length.is_finite() && half_length > 0.0) {
        return Err(ClusteringError::InvalidHalfLength(half_length));
    }
    if let Some(index) = points
        .iter()
        .position(|p| !(p[0].is_finite() && p[1].is_finite()))
    {
        return Err(ClusteringError::NonFinitePoint { index });
    }
    if points.is_empty() {
        return Ok(Vec::new());
    }

    log::debug!("merging {} diamonds (half length {})", points.len(), half_length);
    let diamonds: Vec<Polygon<f64>> = points.iter().map(|p| diamond(p, half_length)).collect();
    let merged = union_polygons(&diamonds);

    if merged.0.is_empty() {
        return Err(ClusteringError::EmptyUnion);
    }

    Ok(partition_by_regions(points, &merged.0, boundary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Coord};

    #[test]
    fn test_diamond_vertex_order() {
        let d = diamond(&[1.0, 1.0, 7.0], 2.0);
        let coords: Vec<Coord<f64>> = d.exterior().coords().copied().collect();
        assert_eq!(
            coords,
            vec![
                Coord { x: 3.0, y: 1.0 },
                Coord { x: 1.0, y: 3.0 },
                Coord { x: -1.0, y: 1.0 },
                Coord { x: 1.0, y: -1.0 },
                Coord { x: 3.0, y: 1.0 },
            ]
        );
    }

    #[test]
    fn test_cubic_clusters_separates_groups() {
        let points = vec![
            [0.0, 0.0, 1.0],
            [10.0, 10.0, 2.0],
            [1.0, 0.0, 3.0],
            [11.0, 10.0, 4.0],
            [10.5, 11.0, 5.0],
        ];

        let clusters = cubic_clusters(&points, 1.0, BoundaryPolicy::Exclusive).unwrap();
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0], vec![[0.0, 0.0, 1.0], [1.0, 0.0, 3.0]]);
        assert_eq!(
            clusters[1],
            vec![[10.0, 10.0, 2.0], [11.0, 10.0, 4.0], [10.5, 11.0, 5.0]]
        );
    }

    #[test]
    fn test_cubic_clusters_chain_merges() {
        let points: Vec<[f64; 3]> = (0..6).map(|i| [i as f64 * 1.5, 0.0, 0.0]).collect();

        let clusters = cubic_clusters(&points, 1.0, BoundaryPolicy::Exclusive).unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].len(), 6);
    }

    #[test]
    fn test_cubic_clusters_use_diamonds_not_squares() {
        // Axis-aligned squares of half length 1 would overlap here; diamonds
        // only overlap when the L1 distance is below 2.
        let points = vec![[0.0, 0.0, 0.0], [1.2, 1.2, 0.0]];

        let clusters = cubic_clusters(&points, 1.0, BoundaryPolicy::Exclusive).unwrap();
        assert_eq!(clusters.len(), 2);

        let along_axis = vec![[0.0, 0.0, 0.0], [1.8, 0.0, 0.0]];
        let clusters = cubic_clusters(&along_axis, 1.0, BoundaryPolicy::Exclusive).unwrap();
        assert_eq!(clusters.len(), 1);
    }

    #[test]
    fn test_cubic_clusters_keep_duplicates() {
        let points = vec![[0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0, 2.0]];

        let clusters = cubic_clusters(&points, 2.0, BoundaryPolicy::Exclusive).unwrap();
        assert_eq!(clusters, vec![points]);
    }

    #[test]
    fn test_cubic_clusters_rejects_bad_half_length() {
        let points = vec![[0.0, 0.0, 0.0]];
        assert_eq!(
            cubic_clusters(&points, 0.0, BoundaryPolicy::Exclusive),
            Err(ClusteringError::InvalidHalfLength(0.0))
        );
        assert!(cubic_clusters(&[], 1.0, BoundaryPolicy::Exclusive)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_boundary_point_dropped_when_exclusive() {
        let region = polygon![(x: 0.0, y: 0.0), (x: 2.0, y: 0.0), (x: 2.0, y: 2.0), (x: 0.0, y: 2.0)];
        let points = vec![[1.0, 1.0, 0.0], [0.0, 1.0, 0.0], [5.0, 5.0, 0.0]];

        let exclusive = partition_by_regions(&points, &[region.clone()], BoundaryPolicy::Exclusive);
        assert_eq!(exclusive, vec![vec![[1.0, 1.0, 0.0]]]);

        let inclusive = partition_by_regions(&points, &[region], BoundaryPolicy::Inclusive);
        assert_eq!(inclusive, vec![vec![[1.0, 1.0, 0.0], [0.0, 1.0, 0.0]]]);
    }

    #[test]
    fn test_partition_discovery_order() {
        let left = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0)];
        let right = polygon![(x: 5.0, y: 0.0), (x: 6.0, y: 0.0), (x: 6.0, y: 1.0), (x: 5.0, y: 1.0)];
        let unused = polygon![(x: 9.0, y: 9.0), (x: 10.0, y: 9.0), (x: 10.0, y: 10.0)];
        let points = vec![[5.5, 0.5, 0.0], [0.5, 0.5, 0.0], [5.2, 0.2, 0.0]];

        let clusters =
            partition_by_regions(&points, &[left, right, unused], BoundaryPolicy::Exclusive);
        assert_eq!(
            clusters,
            vec![vec![[5.5, 0.5, 0.0], [5.2, 0.2, 0.0]], vec![[0.5, 0.5, 0.0]]]
        );
    }
}
