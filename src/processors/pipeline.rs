//! Class-filtered footprint and extrema pipelines.
//!
//! Each pipeline validates the requested class before doing any work, then
//! clusters the class points and processes every cluster independently on
//! the rayon pool. A failing cluster is recorded in the [`BatchReport`] and
//! does not stop its siblings.

use rayon::prelude::*;
use thiserror::Error;

use super::alpha_shape::{configured_alpha_shape, project_planar, ConcaveHull, GeometryError};
use super::cancel::CancelToken;
use super::clustering::{density_clusters_or_whole, ClusteringError};
use super::extrema::{extract_bottoms, extract_tops, ExtremumRecord};
use crate::config::{BottomsConfig, DensityConfig, FootprintConfig, TopsConfig};
use crate::core::classification::{points_in_class, UnknownClassError};
use crate::core::loaders::ClassifiedCloud;
use crate::core::transforms::apply_stride;

/// Errors raised by the pipelines, either for the whole call or per cluster.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error(transparent)]
    UnknownClass(#[from] UnknownClassError),

    #[error(transparent)]
    Clustering(ClusteringError),

    #[error("geometry failed: {0}")]
    Geometry(GeometryError),

    #[error("processing cancelled")]
    Cancelled,
}

impl From<GeometryError> for PipelineError {
    fn from(e: GeometryError) -> Self {
        match e {
            GeometryError::Cancelled => PipelineError::Cancelled,
            other => PipelineError::Geometry(other),
        }
    }
}

impl From<ClusteringError> for PipelineError {
    fn from(e: ClusteringError) -> Self {
        match e {
            ClusteringError::Cancelled => PipelineError::Cancelled,
            other => PipelineError::Clustering(other),
        }
    }
}

/// Outcome of processing one cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterResult<T> {
    /// Position of the cluster in clustering output order.
    pub index: usize,
    /// Number of points in the cluster.
    pub size: usize,
    pub outcome: Result<T, PipelineError>,
}

/// Per-cluster results of a pipeline run, ordered by cluster index.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport<T> {
    pub results: Vec<ClusterResult<T>>,
}

impl<T> BatchReport<T> {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Successful outputs with their cluster index.
    pub fn successes(&self) -> impl Iterator<Item = (usize, &T)> {
        self.results
            .iter()
            .filter_map(|r| r.outcome.as_ref().ok().map(|v| (r.index, v)))
    }

    /// Failed clusters with their error.
    pub fn failures(&self) -> impl Iterator<Item = (usize, &PipelineError)> {
        self.results
            .iter()
            .filter_map(|r| r.outcome.as_ref().err().map(|e| (r.index, e)))
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }
}

impl BatchReport<Vec<ExtremumRecord>> {
    /// All records of the successful clusters, concatenated in cluster order.
    pub fn records(&self) -> Vec<ExtremumRecord> {
        self.successes()
            .flat_map(|(_, records)| records.iter().copied())
            .collect()
    }
}

/// Run `task` on every cluster in parallel, keeping cluster order.
///
/// Clusters not yet started when `cancel` fires report
/// [`PipelineError::Cancelled`].
pub fn run_per_cluster<T, F>(
    clusters: &[Vec<[f64; 3]>],
    cancel: &CancelToken,
    task: F,
) -> BatchReport<T>
where
    T: Send,
    F: Fn(&[[f64; 3]]) -> Result<T, PipelineError> + Sync,
{
    let results: Vec<ClusterResult<T>> = clusters
        .par_iter()
        .enumerate()
        .map(|(index, cluster)| {
            let outcome = if cancel.is_cancelled() {
                Err(PipelineError::Cancelled)
            } else {
                task(cluster)
            };
            if let Err(e) = &outcome {
                log::warn!("cluster {} ({} points) failed: {}", index, cluster.len(), e);
            }
            ClusterResult {
                index,
                size: cluster.len(),
                outcome,
            }
        })
        .collect();

    BatchReport { results }
}

/// Filter a class and cluster it, falling back to a single cluster.
fn class_clusters(
    points: &[[f64; 3]],
    clustering: &DensityConfig,
    cancel: &CancelToken,
) -> Result<Vec<Vec<[f64; 3]>>, PipelineError> {
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    Ok(density_clusters_or_whole(points, clustering, cancel)?)
}

/// Concave-hull footprints of every cluster of one class.
///
/// # Errors
///
/// [`PipelineError::UnknownClass`] before any work if `class` is absent,
/// [`PipelineError::Clustering`] if the class points cannot be clustered,
/// [`PipelineError::Cancelled`] if cancelled before the cluster tasks start.
/// Hull failures are reported per cluster.
pub fn find_footprints(
    cloud: &ClassifiedCloud,
    class: u8,
    config: &FootprintConfig,
    cancel: &CancelToken,
) -> Result<BatchReport<ConcaveHull>, PipelineError> {
    let points = points_in_class(cloud, class)?;
    let points = apply_stride(&points, config.stride);
    log::info!(
        "footprints: class {}, {} points after stride {}",
        class,
        points.len(),
        config.stride
    );

    let clusters = class_clusters(&points, &config.clustering, cancel)?;
    let report = run_per_cluster(&clusters, cancel, |cluster| {
        let planar = project_planar(cluster);
        Ok(configured_alpha_shape(&planar, &config.alpha_shape, cancel)?)
    });

    log::info!(
        "footprints: {} hulls, {} failed",
        report.len() - report.failure_count(),
        report.failure_count()
    );
    Ok(report)
}

/// Bottom extrema of every cluster of one class.
///
/// Errors as for [`find_footprints`].
pub fn find_bottoms(
    cloud: &ClassifiedCloud,
    class: u8,
    config: &BottomsConfig,
    cancel: &CancelToken,
) -> Result<BatchReport<Vec<ExtremumRecord>>, PipelineError> {
    let points = points_in_class(cloud, class)?;
    log::info!("bottoms: class {}, {} points", class, points.len());

    let clusters = class_clusters(&points, &config.clustering, cancel)?;
    Ok(run_per_cluster(&clusters, cancel, |cluster| {
        Ok(extract_bottoms(cluster, config.tolerance, &config.bases)?)
    }))
}

/// Top extrema of every cluster of one class.
///
/// Errors as for [`find_footprints`].
pub fn find_tops(
    cloud: &ClassifiedCloud,
    class: u8,
    config: &TopsConfig,
    cancel: &CancelToken,
) -> Result<BatchReport<Vec<ExtremumRecord>>, PipelineError> {
    let points = points_in_class(cloud, class)?;
    log::info!("tops: class {}, {} points", class, points.len());

    let clusters = class_clusters(&points, &config.clustering, cancel)?;
    Ok(run_per_cluster(&clusters, cancel, |cluster| {
        Ok(extract_tops(cluster, config.tolerance))
    }))
}
