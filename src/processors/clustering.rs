//! Density-based (DBSCAN) clustering of point sets.
//!
//! This module implements a parallelized DBSCAN using:
//! - `kiddo` KD-tree for O(log n) radius queries, in full 3D or on the
//!   (x, y) projection
//! - `rayon` for parallel neighbour finding and core point identification
//! - A lock-free disjoint-set forest for merging core points
//!
//! # Example
//!
//! ```no_run
//! use footprint_pipeline::processors::clustering::dbscan;
//!
//! let points = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [100.0, 100.0, 100.0]];
//! let labels = dbscan(&points, 5.0, 2, false).unwrap();
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use kiddo::{ImmutableKdTree, SquaredEuclidean};
use rayon::prelude::*;
use thiserror::Error;

use super::cancel::CancelToken;
use crate::config::{DensityConfig, LabelRange};
use crate::core::classification::{points_in_class, UnknownClassError};
use crate::core::loaders::ClassifiedCloud;

/// Label assigned to points that belong to no cluster.
pub const NOISE: i32 = -1;

/// Errors raised by the clustering primitives.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClusteringError {
    #[error("clustering failed: eps must be positive and finite, got {0}")]
    InvalidEps(f64),

    #[error("clustering failed: point {index} has a non-finite coordinate")]
    NonFinitePoint { index: usize },

    #[error("clustering failed: half length must be positive and finite, got {0}")]
    InvalidHalfLength(f64),

    #[error("clustering failed: merging regions produced no geometry")]
    EmptyUnion,

    #[error("clustering cancelled")]
    Cancelled,
}

/// Lock-free disjoint sets over point indices.
///
/// Every set is rooted at its smallest member, so linking two sets is a
/// single compare-and-swap of the larger root onto the smaller one. Links
/// only ever move towards smaller indices, which keeps concurrent path
/// halving safe.
struct CoreForest {
    links: Vec<AtomicUsize>,
}

impl CoreForest {
    fn new(size: usize) -> Self {
        Self {
            links: (0..size).map(AtomicUsize::new).collect(),
        }
    }

    /// Smallest index in the set holding `i`.
    fn root(&self, mut i: usize) -> usize {
        loop {
            let parent = self.links[i].load(Ordering::Acquire);
            if parent == i {
                return i;
            }
            let grandparent = self.links[parent].load(Ordering::Acquire);
            if grandparent != parent {
                // A failed halving only means another thread moved the link
                let _ = self.links[i].compare_exchange(
                    parent,
                    grandparent,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
            }
            i = grandparent;
        }
    }

    /// Merge the sets holding `a` and `b`.
    fn join(&self, a: usize, b: usize) {
        let (mut a, mut b) = (a, b);
        loop {
            a = self.root(a);
            b = self.root(b);
            if a == b {
                return;
            }
            let (low, high) = if a < b { (a, b) } else { (b, a) };
            if self.links[high]
                .compare_exchange(high, low, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return;
            }
        }
    }
}

fn validate(points: &[[f64; 3]], eps: f64) -> Result<(), ClusteringError> {
    if !(eps.is_finite() && eps > 0.0) {
        return Err(ClusteringError::InvalidEps(eps));
    }
    if let Some(index) = points
        .iter()
        .position(|p| !p.iter().all(|c| c.is_finite()))
    {
        return Err(ClusteringError::NonFinitePoint { index });
    }
    Ok(())
}

/// Radius neighbourhoods using full 3D distance.
fn neighbourhoods_3d(
    points: &[[f64; 3]],
    eps_sq: f64,
    cancel: &CancelToken,
) -> Result<Vec<Vec<usize>>, ClusteringError> {
    let tree: ImmutableKdTree<f64, 3> = ImmutableKdTree::new_from_slice(points);

    points
        .par_iter()
        .map(|p| {
            if cancel.is_cancelled() {
                return Err(ClusteringError::Cancelled);
            }
            let neighbours: Vec<usize> = tree
                .within::<SquaredEuclidean>(p, eps_sq)
                .iter()
                .map(|nn| nn.item as usize)
                .collect();
            Ok(neighbours)
        })
        .collect()
}

/// Radius neighbourhoods measured on the (x, y) projection only.
fn neighbourhoods_2d(
    points: &[[f64; 3]],
    eps_sq: f64,
    cancel: &CancelToken,
) -> Result<Vec<Vec<usize>>, ClusteringError> {
    let planar: Vec<[f64; 2]> = points.iter().map(|p| [p[0], p[1]]).collect();
    let tree: ImmutableKdTree<f64, 2> = ImmutableKdTree::new_from_slice(&planar);

    planar
        .par_iter()
        .map(|p| {
            if cancel.is_cancelled() {
                return Err(ClusteringError::Cancelled);
            }
            let neighbours: Vec<usize> = tree
                .within::<SquaredEuclidean>(p, eps_sq)
                .iter()
                .map(|nn| nn.item as usize)
                .collect();
            Ok(neighbours)
        })
        .collect()
}

/// Turn radius neighbourhoods into DBSCAN labels.
///
/// A point is a core point if its neighbourhood (itself included) holds at
/// least `min_count` points. Core points that are neighbours share a
/// cluster; a non-core point joins the cluster of its nearest core
/// neighbour, or is labelled [`NOISE`] if it has none. Cluster ids are
/// assigned 0, 1, ... in order of the first core point of each cluster.
fn labels_from_neighbourhoods(
    neighbours: &[Vec<usize>],
    min_count: usize,
    cancel: &CancelToken,
) -> Result<Vec<i32>, ClusteringError> {
    let n = neighbours.len();

    let is_core: Vec<bool> = neighbours
        .par_iter()
        .map(|neigh| neigh.len() >= min_count)
        .collect();

    let forest = CoreForest::new(n);

    (0..n).into_par_iter().try_for_each(|i| {
        if cancel.is_cancelled() {
            return Err(ClusteringError::Cancelled);
        }
        if is_core[i] {
            for &j in neighbours[i].iter().filter(|&&j| is_core[j]) {
                forest.join(i, j);
            }
        }
        Ok(())
    })?;

    let mut root_to_cluster: HashMap<usize, i32> = HashMap::new();
    let mut next_cluster_id: i32 = 0;
    for i in (0..n).filter(|&i| is_core[i]) {
        root_to_cluster.entry(forest.root(i)).or_insert_with(|| {
            let id = next_cluster_id;
            next_cluster_id += 1;
            id
        });
    }

    let mut labels = vec![NOISE; n];
    for i in 0..n {
        let owner = if is_core[i] {
            Some(i)
        } else {
            // Neighbour lists come back sorted by distance
            neighbours[i].iter().copied().find(|&j| is_core[j])
        };
        if let Some(core) = owner {
            labels[i] = root_to_cluster[&forest.root(core)];
        }
    }

    Ok(labels)
}

/// DBSCAN clustering of a point set.
///
/// When `project_2d` is set, neighbourhoods are measured on (x, y) only.
///
/// # Arguments
///
/// * `points` - Points to cluster
/// * `eps` - Neighbourhood radius
/// * `min_count` - Minimum neighbourhood size, the point itself included,
///   for a core point
/// * `project_2d` - Ignore z when measuring distances
///
/// # Returns
///
/// One label per input point; [`NOISE`] (-1) for noise.
///
/// # Errors
///
/// [`ClusteringError`] if `eps` is not a positive finite number or a point
/// has a non-finite coordinate.
pub fn dbscan(
    points: &[[f64; 3]],
    eps: f64,
    min_count: usize,
    project_2d: bool,
) -> Result<Vec<i32>, ClusteringError> {
    dbscan_cancellable(points, eps, min_count, project_2d, &CancelToken::new())
}

/// [`dbscan`] that stops with [`ClusteringError::Cancelled`] once `cancel`
/// is set. The token is polled for every point during the neighbour search
/// and the core merge.
pub fn dbscan_cancellable(
    points: &[[f64; 3]],
    eps: f64,
    min_count: usize,
    project_2d: bool,
    cancel: &CancelToken,
) -> Result<Vec<i32>, ClusteringError> {
    validate(points, eps)?;

    if points.is_empty() {
        return Ok(Vec::new());
    }

    let eps_sq = eps * eps;
    let neighbours = if project_2d {
        neighbourhoods_2d(points, eps_sq, cancel)?
    } else {
        neighbourhoods_3d(points, eps_sq, cancel)?
    };

    labels_from_neighbourhoods(&neighbours, min_count, cancel)
}

/// Group points by label into clusters.
///
/// Clusters are emitted in ascending label order. With
/// [`LabelRange::ExcludeHighest`] the cluster carrying the highest label is
/// not emitted; its points end up in no cluster, like noise.
pub fn extract_clusters(
    points: &[[f64; 3]],
    labels: &[i32],
    range: LabelRange,
) -> Vec<Vec<[f64; 3]>> {
    debug_assert_eq!(points.len(), labels.len());

    let max_label = match labels.iter().copied().max() {
        Some(max) if max >= 0 => max,
        _ => return Vec::new(),
    };
    let emitted = match range {
        LabelRange::Inclusive => max_label as usize + 1,
        LabelRange::ExcludeHighest => max_label as usize,
    };

    let mut clusters: Vec<Vec<[f64; 3]>> = vec![Vec::new(); emitted];
    for (point, &label) in points.iter().zip(labels) {
        if label >= 0 && (label as usize) < emitted {
            clusters[label as usize].push(*point);
        }
    }
    clusters
}

/// The points labelled as noise.
pub fn noise_points(points: &[[f64; 3]], labels: &[i32]) -> Vec<[f64; 3]> {
    points
        .iter()
        .zip(labels)
        .filter(|(_, &label)| label == NOISE)
        .map(|(p, _)| *p)
        .collect()
}

/// Cluster a point set and return the clusters in ascending label order.
pub fn density_clusters(
    points: &[[f64; 3]],
    config: &DensityConfig,
    cancel: &CancelToken,
) -> Result<Vec<Vec<[f64; 3]>>, ClusteringError> {
    log::info!(
        "dbscan on {} points (eps={}, min_count={}, 2d={})",
        points.len(),
        config.eps,
        config.min_count,
        config.project_2d
    );

    let labels = dbscan_cancellable(
        points,
        config.eps,
        config.min_count,
        config.project_2d,
        cancel,
    )?;
    let clusters = extract_clusters(points, &labels, config.label_range);

    log::debug!(
        "{} clusters, {} noise points",
        clusters.len(),
        labels.iter().filter(|&&l| l == NOISE).count()
    );
    Ok(clusters)
}

/// Like [`density_clusters`], but treats the whole input as a single cluster
/// when no cluster is found.
pub fn density_clusters_or_whole(
    points: &[[f64; 3]],
    config: &DensityConfig,
    cancel: &CancelToken,
) -> Result<Vec<Vec<[f64; 3]>>, ClusteringError> {
    let clusters = density_clusters(points, config, cancel)?;
    if clusters.is_empty() && !points.is_empty() {
        log::info!("no clusters found, using all {} points as one cluster", points.len());
        return Ok(vec![points.to_vec()]);
    }
    Ok(clusters)
}

/// Errors from [`process_cloud_clustering`].
#[derive(Error, Debug)]
pub enum ClusterFileError {
    #[error(transparent)]
    Load(#[from] crate::core::loaders::LoaderError),

    #[error(transparent)]
    UnknownClass(#[from] UnknownClassError),

    #[error(transparent)]
    Clustering(#[from] ClusteringError),

    #[error(transparent)]
    Write(#[from] crate::core::writers::WriteError),
}

/// Load a cloud, cluster one class and save the labelled points.
///
/// The labels CSV is written as `<stem>_dbscan_labels.csv` to `output_dir`
/// (defaults to the cloud's directory).
///
/// # Returns
///
/// Tuple of (output CSV path, class points, labels).
pub fn process_cloud_clustering(
    cloud_path: &Path,
    class: u8,
    output_dir: Option<&Path>,
    config: &DensityConfig,
) -> Result<(PathBuf, Vec<[f64; 3]>, Vec<i32>), ClusterFileError> {
    use crate::core::loaders::load_cloud;
    use crate::core::writers::write_labels_csv;

    let cloud: ClassifiedCloud = load_cloud(cloud_path)?;
    let points = points_in_class(&cloud, class)?;

    let file_name = cloud_path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown");
    log::info!("{}: {} points in class {}", file_name, points.len(), class);

    let labels = dbscan(&points, config.eps, config.min_count, config.project_2d)?;

    let mut label_counts: HashMap<i32, usize> = HashMap::new();
    for &label in &labels {
        *label_counts.entry(label).or_insert(0) += 1;
    }
    log::info!("{}: cluster summary {:?}", file_name, label_counts);

    let out_dir = output_dir
        .map(PathBuf::from)
        .unwrap_or_else(|| cloud_path.parent().unwrap_or(Path::new(".")).to_path_buf());

    let stem = cloud_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let csv_path = out_dir.join(format!("{}_dbscan_labels.csv", stem));

    write_labels_csv(&csv_path, &points, &labels)?;
    log::info!("Labels CSV -> {}", csv_path.display());

    Ok((csv_path, points, labels))
}
