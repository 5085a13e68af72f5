//! Visualization of clusters and footprints.
//!
//! This module renders top-down (x vs y) PNG views using the plotters
//! library: labelled cluster points, and hull outlines drawn over the
//! points they were built from.

use std::path::Path;

use plotters::prelude::*;
use plotters_bitmap::BitMapBackend;
use thiserror::Error;

use crate::processors::alpha_shape::ConcaveHull;

/// Errors that can occur during visualization.
#[derive(Error, Debug)]
pub enum VisualizationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Plotting error: {0}")]
    PlottingError(String),

    #[error("Empty point cloud")]
    EmptyPointCloud,

    #[error("length mismatch: {coords_len} points, {labels_len} labels")]
    LengthMismatch { coords_len: usize, labels_len: usize },
}

/// Result type for visualization operations.
pub type Result<T> = std::result::Result<T, VisualizationError>;

/// Default plot width in pixels.
const DEFAULT_WIDTH: u32 = 1920;

/// Default plot height in pixels.
const DEFAULT_HEIGHT: u32 = 1080;

/// Color palette for clusters and hulls.
const CLUSTER_COLORS: &[(u8, u8, u8)] = &[
    (228, 26, 28),   // Red
    (55, 126, 184),  // Blue
    (77, 175, 74),   // Green
    (152, 78, 163),  // Purple
    (255, 127, 0),   // Orange
    (166, 86, 40),   // Brown
    (247, 129, 191), // Pink
    (0, 206, 209),   // Turquoise
    (138, 43, 226),  // Blue Violet
    (50, 205, 50),   // Lime Green
    (255, 20, 147),  // Deep Pink
    (0, 191, 255),   // Deep Sky Blue
];

/// Noise color (gray) for unclustered points (label = -1).
const NOISE_COLOR: (u8, u8, u8) = (128, 128, 128);

/// Background points under hull outlines.
const POINT_COLOR: RGBAColor = RGBAColor(150, 150, 150, 0.5);

fn cluster_color(index: usize) -> RGBColor {
    let c = CLUSTER_COLORS[index % CLUSTER_COLORS.len()];
    RGBColor(c.0, c.1, c.2)
}

/// Every `step`-th index so that at most `max_points` are drawn.
fn subsample_step(n: usize, max_points: usize) -> usize {
    if max_points > 0 && n > max_points {
        n / max_points
    } else {
        1
    }
}

/// Plot hull outlines over the (x, y) projection of their points.
///
/// # Arguments
///
/// * `output_path` - Path to save the PNG image
/// * `points` - Points drawn in gray under the outlines
/// * `hulls` - Hulls, each outlined in its own color
/// * `max_points` - Maximum number of points to plot (subsamples if exceeded)
pub fn plot_footprints(
    output_path: &Path,
    points: &[[f64; 3]],
    hulls: &[&ConcaveHull],
    max_points: usize,
) -> Result<()> {
    if points.is_empty() {
        return Err(VisualizationError::EmptyPointCloud);
    }

    let step = subsample_step(points.len(), max_points);
    let drawn: Vec<(f64, f64)> = points.iter().step_by(step).map(|p| (p[0], p[1])).collect();

    let mut rings: Vec<(usize, Vec<(f64, f64)>)> = Vec::new();
    for (i, hull) in hulls.iter().enumerate() {
        for polygon in hull.geometry.polygons() {
            for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
                rings.push((i, ring.coords().map(|c| (c.x, c.y)).collect()));
            }
        }
    }

    let (x_min, x_max, y_min, y_max) =
        compute_bounds(drawn.iter().chain(rings.iter().flat_map(|(_, r)| r.iter())));
    let x_padding = (x_max - x_min) * 0.05;
    let y_padding = (y_max - y_min) * 0.05;

    let root = BitMapBackend::new(output_path, (DEFAULT_WIDTH, DEFAULT_HEIGHT))
        .into_drawing_area();

    root.fill(&WHITE).map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .build_cartesian_2d(
            (x_min - x_padding)..(x_max + x_padding),
            (y_min - y_padding)..(y_max + y_padding),
        )
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .disable_y_mesh()
        .draw()
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    chart
        .draw_series(
            drawn
                .iter()
                .map(|(x, y)| Circle::new((*x, *y), 1, POINT_COLOR.filled())),
        )
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    for (hull_index, ring) in rings {
        chart
            .draw_series(LineSeries::new(
                ring,
                cluster_color(hull_index).stroke_width(2),
            ))
            .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;
    }

    root.present().map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    log::info!("footprint plot -> {}", output_path.display());
    Ok(())
}

/// Plot a 2D scatter plot of labelled points with colors by cluster.
pub fn plot_labeled_points(
    output_path: &Path,
    coords: &[[f64; 3]],
    labels: &[i32],
    max_points: usize,
) -> Result<()> {
    if coords.is_empty() {
        return Err(VisualizationError::EmptyPointCloud);
    }
    if coords.len() != labels.len() {
        return Err(VisualizationError::LengthMismatch {
            coords_len: coords.len(),
            labels_len: labels.len(),
        });
    }

    let step = subsample_step(coords.len(), max_points);

    // Collect points with colors based on labels
    let points: Vec<(f64, f64, RGBColor)> = coords
        .iter()
        .zip(labels)
        .step_by(step)
        .map(|(p, &label)| {
            let color = if label < 0 {
                RGBColor(NOISE_COLOR.0, NOISE_COLOR.1, NOISE_COLOR.2)
            } else {
                cluster_color(label as usize)
            };
            (p[0], p[1], color)
        })
        .collect();

    let xy: Vec<(f64, f64)> = points.iter().map(|(x, y, _)| (*x, *y)).collect();
    let (x_min, x_max, y_min, y_max) = compute_bounds(xy.iter());
    let x_padding = (x_max - x_min) * 0.05;
    let y_padding = (y_max - y_min) * 0.05;

    let root = BitMapBackend::new(output_path, (DEFAULT_WIDTH, DEFAULT_HEIGHT))
        .into_drawing_area();

    root.fill(&WHITE).map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .build_cartesian_2d(
            (x_min - x_padding)..(x_max + x_padding),
            (y_min - y_padding)..(y_max + y_padding),
        )
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .disable_y_mesh()
        .draw()
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    chart
        .draw_series(
            points
                .iter()
                .map(|(x, y, color)| Circle::new((*x, *y), 2, color.filled())),
        )
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    root.present().map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    Ok(())
}

/// Compute the bounds (min/max) for x and y coordinates.
fn compute_bounds<'a, I>(points: I) -> (f64, f64, f64, f64)
where
    I: Iterator<Item = &'a (f64, f64)>,
{
    let mut x_min = f64::MAX;
    let mut x_max = f64::MIN;
    let mut y_min = f64::MAX;
    let mut y_max = f64::MIN;

    for &(x, y) in points {
        x_min = x_min.min(x);
        x_max = x_max.max(x);
        y_min = y_min.min(y);
        y_max = y_max.max(y);
    }

    if (x_max - x_min).abs() < f64::EPSILON {
        x_min -= 1.0;
        x_max += 1.0;
    }
    if (y_max - y_min).abs() < f64::EPSILON {
        y_min -= 1.0;
        y_max += 1.0;
    }

    (x_min, x_max, y_min, y_max)
}
