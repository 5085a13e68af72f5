//! Footprints and elevation extrema from classified point clouds.
//!
//! This crate provides tools for:
//! - Loading classified point clouds from CSV and ASCII PLY files
//! - DBSCAN clustering (parallelized, 3D or on the ground plane)
//! - Diamond-merge clustering of tight local groups
//! - Alpha-shape (concave hull) footprints of each cluster
//! - Representative bottom and top points of each cluster
//!
//! # Example
//!
//! ```no_run
//! use footprint_pipeline::config::FootprintConfig;
//! use footprint_pipeline::core::loaders::load_cloud;
//! use footprint_pipeline::processors::{find_footprints, CancelToken};
//!
//! let cloud = load_cloud("tile.csv").unwrap();
//! let report = find_footprints(&cloud, 6, &FootprintConfig::default(), &CancelToken::new()).unwrap();
//! for (index, hull) in report.successes() {
//!     println!("cluster {}: area {:.1}", index, hull.geometry.area());
//! }
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;
pub mod visualization;

pub use config::{
    AlphaShapeConfig, BottomsConfig, CubicConfig, DensityConfig, FootprintConfig, PipelineConfig,
    TopsConfig,
};
pub use core::loaders::ClassifiedCloud;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
