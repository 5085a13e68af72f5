//! Configuration types for the footprint pipeline.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which density-cluster labels are turned into emitted clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelRange {
    /// Emit every label from 0 up to and including the highest label.
    Inclusive,
    /// Emit labels 0 up to but excluding the highest label. The cluster
    /// carrying the highest label is dropped (legacy extraction behaviour).
    ExcludeHighest,
}

impl Default for LabelRange {
    fn default() -> Self {
        LabelRange::Inclusive
    }
}

/// What the alpha filter does with a zero-area (collinear) triangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegenerateTriangle {
    /// Drop the triangle from the filter.
    Skip,
    /// Judge the triangle by the circumradius of the previous triangle in
    /// iteration order. The very first triangle is skipped if degenerate.
    ReusePrevious,
}

impl Default for DegenerateTriangle {
    fn default() -> Self {
        DegenerateTriangle::Skip
    }
}

/// How points lying exactly on a merged region boundary are assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryPolicy {
    /// Only points strictly inside a region belong to it; boundary points
    /// are dropped from the output.
    Exclusive,
    /// Points on a region boundary belong to the first region touching them.
    Inclusive,
}

impl Default for BoundaryPolicy {
    fn default() -> Self {
        BoundaryPolicy::Exclusive
    }
}

/// Configuration for density-based (DBSCAN) clustering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DensityConfig {
    /// Neighbourhood radius
    #[serde(default = "default_eps")]
    pub eps: f64,

    /// Minimum neighbours (the point itself included) for a core point
    #[serde(default = "default_min_count")]
    pub min_count: usize,

    /// Measure neighbourhoods on (x, y) only
    #[serde(default)]
    pub project_2d: bool,

    /// Which labels become clusters
    #[serde(default)]
    pub label_range: LabelRange,
}

fn default_eps() -> f64 {
    15.0
}

fn default_min_count() -> usize {
    15
}

impl Default for DensityConfig {
    fn default() -> Self {
        Self {
            eps: default_eps(),
            min_count: default_min_count(),
            project_2d: false,
            label_range: LabelRange::default(),
        }
    }
}

/// Configuration for alpha-shape (concave hull) construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlphaShapeConfig {
    /// Shape parameter; triangles with circumradius < 1/alpha are kept
    #[serde(default = "default_alpha")]
    pub alpha: f64,

    /// Handling of zero-area triangles
    #[serde(default)]
    pub degenerate: DegenerateTriangle,

    /// Douglas-Peucker tolerance applied to the finished hull
    #[serde(default = "default_simplify_tolerance")]
    pub simplify_tolerance: Option<f64>,
}

fn default_alpha() -> f64 {
    0.3
}

fn default_simplify_tolerance() -> Option<f64> {
    Some(0.5)
}

impl Default for AlphaShapeConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            degenerate: DegenerateTriangle::default(),
            simplify_tolerance: default_simplify_tolerance(),
        }
    }
}

/// Configuration for diamond-merge ("cubic") clustering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CubicConfig {
    /// Distance from each point to the vertices of its diamond
    #[serde(default = "default_half_length")]
    pub half_length: f64,

    /// Membership test against merged regions
    #[serde(default)]
    pub boundary: BoundaryPolicy,
}

fn default_half_length() -> f64 {
    2.0
}

impl Default for CubicConfig {
    fn default() -> Self {
        Self {
            half_length: default_half_length(),
            boundary: BoundaryPolicy::default(),
        }
    }
}

/// Configuration for the footprint (concave hull) pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FootprintConfig {
    /// Keep every n-th point of the class before clustering
    #[serde(default = "default_footprint_stride")]
    pub stride: usize,

    #[serde(default = "default_footprint_clustering")]
    pub clustering: DensityConfig,

    #[serde(default)]
    pub alpha_shape: AlphaShapeConfig,
}

fn default_footprint_stride() -> usize {
    5
}

fn default_footprint_clustering() -> DensityConfig {
    DensityConfig {
        eps: 10.0,
        ..DensityConfig::default()
    }
}

impl Default for FootprintConfig {
    fn default() -> Self {
        Self {
            stride: default_footprint_stride(),
            clustering: default_footprint_clustering(),
            alpha_shape: AlphaShapeConfig::default(),
        }
    }
}

/// Configuration for the bottoms (lowest points per group) pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BottomsConfig {
    #[serde(default)]
    pub clustering: DensityConfig,

    /// Height of the window above the cluster minimum
    #[serde(default = "default_bottom_tolerance")]
    pub tolerance: f64,

    /// Sub-clustering of the window into bases
    #[serde(default)]
    pub bases: CubicConfig,
}

fn default_bottom_tolerance() -> f64 {
    5.0
}

impl Default for BottomsConfig {
    fn default() -> Self {
        Self {
            clustering: DensityConfig::default(),
            tolerance: default_bottom_tolerance(),
            bases: CubicConfig::default(),
        }
    }
}

/// Configuration for the tops (highest points per group) pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopsConfig {
    #[serde(default = "default_tops_clustering")]
    pub clustering: DensityConfig,

    /// Height of the window below the cluster maximum
    #[serde(default = "default_top_tolerance")]
    pub tolerance: f64,
}

fn default_tops_clustering() -> DensityConfig {
    DensityConfig {
        project_2d: true,
        ..DensityConfig::default()
    }
}

fn default_top_tolerance() -> f64 {
    2.0
}

impl Default for TopsConfig {
    fn default() -> Self {
        Self {
            clustering: default_tops_clustering(),
            tolerance: default_top_tolerance(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub footprints: FootprintConfig,

    #[serde(default)]
    pub bottoms: BottomsConfig,

    #[serde(default)]
    pub tops: TopsConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
