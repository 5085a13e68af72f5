//! Clustering, hull and extrema processing.

pub mod alpha_shape;
pub mod cancel;
pub mod clustering;
pub mod cubic;
pub mod extrema;
pub mod pipeline;

// Re-export key types for convenience
pub use alpha_shape::{alpha_shape, ConcaveHull, GeometryError, HullGeometry};
pub use cancel::CancelToken;
pub use clustering::{dbscan, dbscan_cancellable, density_clusters, ClusteringError, NOISE};
pub use cubic::cubic_clusters;
pub use extrema::{extract_bottoms, extract_tops, ExtremumRecord};
pub use pipeline::{
    find_bottoms, find_footprints, find_tops, BatchReport, ClusterResult, PipelineError,
};
