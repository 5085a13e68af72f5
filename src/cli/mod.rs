//! Command-line interface for the footprint pipeline.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::DensityConfig;
use crate::core::classification::reclassify;
use crate::core::loaders::{load_cloud, ClassifiedCloud};
use crate::core::writers::{write_classified_csv, write_extrema, write_hulls_csv, FormatVersion};
use crate::processors::clustering::{process_cloud_clustering, NOISE};
use crate::processors::pipeline::{find_bottoms, find_footprints, find_tops, BatchReport};
use crate::processors::{CancelToken, ExtremumRecord};
use crate::PipelineConfig;

/// Points drawn at most in PNG plots.
const PLOT_MAX_POINTS: usize = 1_000_000;

#[derive(Parser)]
#[command(name = "footprint-pipeline")]
#[command(about = "Footprints and elevation extrema from classified point clouds", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the classification codes in a cloud with their point counts
    Classes {
        /// Input cloud (CSV or ASCII PLY)
        cloud: PathBuf,
    },

    /// Run DBSCAN on one class and write labelled points
    Cluster {
        /// Input cloud (CSV or ASCII PLY)
        cloud: PathBuf,
        /// Classification code to cluster
        #[arg(long)]
        class: u8,
        /// Neighbourhood radius
        #[arg(long)]
        eps: Option<f64>,
        /// Minimum neighbourhood size for a core point
        #[arg(long)]
        min_count: Option<usize>,
        /// Measure distances on the ground plane only
        #[arg(long)]
        project_2d: bool,
        /// Output directory for the labels CSV
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Also plot the labelled points to this PNG
        #[arg(long)]
        plot: Option<PathBuf>,
    },

    /// Build concave-hull footprints for every cluster of one class
    Footprints {
        /// Input cloud (CSV or ASCII PLY)
        cloud: PathBuf,
        /// Classification code
        #[arg(long)]
        class: u8,
        /// Alpha-shape parameter
        #[arg(long)]
        alpha: Option<f64>,
        /// Clustering radius
        #[arg(long)]
        eps: Option<f64>,
        /// Keep every n-th class point before clustering
        #[arg(long)]
        stride: Option<usize>,
        /// Output hull CSV (defaults to <cloud stem>_footprints.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Also plot the hulls over the class points to this PNG
        #[arg(long)]
        plot: Option<PathBuf>,
    },

    /// Find representative bottom points of every cluster of one class
    Bottoms {
        /// Input cloud (CSV or ASCII PLY)
        cloud: PathBuf,
        /// Classification code
        #[arg(long)]
        class: u8,
        /// Height of the window above the lowest point
        #[arg(long)]
        tolerance: Option<f64>,
        /// Clustering radius
        #[arg(long)]
        eps: Option<f64>,
        /// Output extrema file
        #[arg(short, long, default_value = "bottoms.txt")]
        output: PathBuf,
    },

    /// Find the highest points of every cluster of one class
    Tops {
        /// Input cloud (CSV or ASCII PLY)
        cloud: PathBuf,
        /// Classification code
        #[arg(long)]
        class: u8,
        /// Depth of the window below the highest point
        #[arg(long)]
        tolerance: Option<f64>,
        /// Clustering radius
        #[arg(long)]
        eps: Option<f64>,
        /// Output extrema file
        #[arg(short, long, default_value = "tops.txt")]
        output: PathBuf,
    },

    /// Rewrite one classification code to another
    Reclassify {
        /// Input cloud (CSV or ASCII PLY)
        cloud: PathBuf,
        /// Code to rewrite
        #[arg(long)]
        from: u8,
        /// Replacement code
        #[arg(long)]
        to: u8,
        /// Output CSV
        #[arg(short, long)]
        output: PathBuf,
        /// Point format version (1.2, 1.4 or 1.6); 1.2 writes classes above 31 as 0
        #[arg(long, default_value = "1.4")]
        format_version: FormatVersion,
    },
}

/// Clustering settings for the `cluster` command: the `bottoms.clustering`
/// section with command-line overrides. Planar mode is on if either the
/// flag or the config asks for it.
fn cluster_density(
    config: &PipelineConfig,
    eps: Option<f64>,
    min_count: Option<usize>,
    project_2d: bool,
) -> DensityConfig {
    let base = &config.bottoms.clustering;
    DensityConfig {
        eps: eps.unwrap_or(base.eps),
        min_count: min_count.unwrap_or(base.min_count),
        project_2d: project_2d || base.project_2d,
        label_range: base.label_range,
    }
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            format!("{}...", value.chars().take(36).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    // Load config
    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("Failed to load config from {}: {}, using defaults", path.display(), e);
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    };

    let result = match cli.command {
        Commands::Classes { cloud } => cmd_classes(&cloud),
        Commands::Cluster {
            cloud,
            class,
            eps,
            min_count,
            project_2d,
            output_dir,
            plot,
        } => {
            let density = cluster_density(&config, eps, min_count, project_2d);
            cmd_cluster(&cloud, class, &density, output_dir, plot)
        }
        Commands::Footprints {
            cloud,
            class,
            alpha,
            eps,
            stride,
            output,
            plot,
        } => {
            let mut footprints = config.footprints.clone();
            if let Some(alpha) = alpha {
                footprints.alpha_shape.alpha = alpha;
            }
            if let Some(eps) = eps {
                footprints.clustering.eps = eps;
            }
            if let Some(stride) = stride {
                footprints.stride = stride;
            }
            cmd_footprints(&cloud, class, &footprints, output, plot)
        }
        Commands::Bottoms {
            cloud,
            class,
            tolerance,
            eps,
            output,
        } => {
            let mut bottoms = config.bottoms.clone();
            if let Some(tolerance) = tolerance {
                bottoms.tolerance = tolerance;
            }
            if let Some(eps) = eps {
                bottoms.clustering.eps = eps;
            }
            cmd_extrema(&cloud, class, &output, "Bottoms", |c, cancel| {
                find_bottoms(c, class, &bottoms, cancel)
            })
        }
        Commands::Tops {
            cloud,
            class,
            tolerance,
            eps,
            output,
        } => {
            let mut tops = config.tops.clone();
            if let Some(tolerance) = tolerance {
                tops.tolerance = tolerance;
            }
            if let Some(eps) = eps {
                tops.clustering.eps = eps;
            }
            cmd_extrema(&cloud, class, &output, "Tops", |c, cancel| {
                find_tops(c, class, &tops, cancel)
            })
        }
        Commands::Reclassify {
            cloud,
            from,
            to,
            output,
            format_version,
        } => cmd_reclassify(&cloud, from, to, &output, format_version),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn load_with_spinner(path: &Path) -> Result<ClassifiedCloud> {
    let spinner = create_spinner("Loading point cloud...");
    let cloud = load_cloud(path);
    spinner.finish_and_clear();
    let cloud = cloud.with_context(|| format!("failed to load {}", path.display()))?;
    info!("{}: {} points", path.display(), cloud.len());
    Ok(cloud)
}

fn cmd_classes(path: &Path) -> Result<()> {
    let cloud = load_with_spinner(path)?;

    let items: Vec<(String, String)> = cloud
        .class_counts()
        .into_iter()
        .map(|(class, count)| (format!("Class {}", class), count.to_string()))
        .collect();
    let mut rows: Vec<(&str, String)> = vec![
        ("Input file", path.display().to_string()),
        ("Points", cloud.len().to_string()),
    ];
    rows.extend(items.iter().map(|(k, v)| (k.as_str(), v.clone())));

    print_summary("Classification Codes", &rows);
    Ok(())
}

fn cmd_cluster(
    path: &Path,
    class: u8,
    density: &DensityConfig,
    output_dir: Option<PathBuf>,
    plot: Option<PathBuf>,
) -> Result<()> {
    let start = Instant::now();

    println!("Running DBSCAN clustering...");
    println!("Input: {}", path.display());
    println!("Parameters:");
    println!("  class: {}", class);
    println!("  eps: {}", density.eps);
    println!("  min_count: {}", density.min_count);
    println!("  project_2d: {}", density.project_2d);

    let spinner = create_spinner("Clustering point cloud...");
    let result = process_cloud_clustering(path, class, output_dir.as_deref(), density);
    spinner.finish_and_clear();
    let (csv_path, points, labels) =
        result.with_context(|| format!("clustering {} failed", path.display()))?;

    if let Some(png) = &plot {
        crate::visualization::plot_labeled_points(png, &points, &labels, PLOT_MAX_POINTS)
            .with_context(|| format!("failed to plot {}", png.display()))?;
    }

    let noise_count = labels.iter().filter(|&&l| l == NOISE).count();
    let cluster_count = labels.iter().copied().max().unwrap_or(NOISE) + 1;

    print_summary(
        "Clustering Complete",
        &[
            ("Input file", path.display().to_string()),
            ("Output CSV", csv_path.display().to_string()),
            ("Points processed", labels.len().to_string()),
            ("Clusters found", cluster_count.to_string()),
            ("Noise points", noise_count.to_string()),
            ("eps", density.eps.to_string()),
            ("min_count", density.min_count.to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
    Ok(())
}

fn cmd_footprints(
    path: &Path,
    class: u8,
    config: &crate::config::FootprintConfig,
    output: Option<PathBuf>,
    plot: Option<PathBuf>,
) -> Result<()> {
    let start = Instant::now();
    let cloud = load_with_spinner(path)?;

    let output_path = output.unwrap_or_else(|| {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "cloud".to_string());
        path.with_file_name(format!("{}_footprints.csv", stem))
    });

    let spinner = create_spinner("Building footprints...");
    let report = find_footprints(&cloud, class, config, &CancelToken::new());
    spinner.finish_and_clear();
    let report = report.context("footprint pipeline failed")?;

    let hulls: Vec<_> = report.successes().collect();
    write_hulls_csv(&output_path, &hulls)
        .with_context(|| format!("failed to write {}", output_path.display()))?;

    if let Some(png) = &plot {
        let points = crate::core::classification::points_in_class(&cloud, class)?;
        let shapes: Vec<_> = hulls.iter().map(|(_, hull)| *hull).collect();
        crate::visualization::plot_footprints(png, &points, &shapes, PLOT_MAX_POINTS)
            .with_context(|| format!("failed to plot {}", png.display()))?;
    }

    let total_area: f64 = hulls.iter().map(|(_, h)| h.geometry.area()).sum();
    print_summary(
        "Footprints Complete",
        &[
            ("Input file", path.display().to_string()),
            ("Output CSV", output_path.display().to_string()),
            ("Class", class.to_string()),
            ("Clusters", report.len().to_string()),
            ("Hulls written", hulls.len().to_string()),
            ("Failed clusters", failed_indices(&report)),
            ("Total area", format!("{:.2}", total_area)),
            ("Alpha", config.alpha_shape.alpha.to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
    Ok(())
}

fn cmd_extrema<F>(path: &Path, class: u8, output: &Path, kind: &str, find: F) -> Result<()>
where
    F: FnOnce(
        &ClassifiedCloud,
        &CancelToken,
    ) -> std::result::Result<BatchReport<Vec<ExtremumRecord>>, crate::processors::PipelineError>,
{
    let start = Instant::now();
    let cloud = load_with_spinner(path)?;

    let spinner = create_spinner(&format!("Finding {}...", kind.to_lowercase()));
    let report = find(&cloud, &CancelToken::new());
    spinner.finish_and_clear();
    let report = report.with_context(|| format!("{} pipeline failed", kind.to_lowercase()))?;

    let records = report.records();
    write_extrema(output, &records)
        .with_context(|| format!("failed to write {}", output.display()))?;

    let synthesized = records
        .iter()
        .filter(|r| matches!(r, ExtremumRecord::Synthesized(_)))
        .count();
    print_summary(
        &format!("{} Complete", kind),
        &[
            ("Input file", path.display().to_string()),
            ("Output file", output.display().to_string()),
            ("Class", class.to_string()),
            ("Clusters", report.len().to_string()),
            ("Records", records.len().to_string()),
            ("Synthesized", synthesized.to_string()),
            ("Failed clusters", failed_indices(&report)),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
    Ok(())
}

fn cmd_reclassify(
    path: &Path,
    from: u8,
    to: u8,
    output: &Path,
    version: FormatVersion,
) -> Result<()> {
    let start = Instant::now();
    let mut cloud = load_with_spinner(path)?;

    let rewritten = reclassify(&mut cloud, from, to)?;
    write_classified_csv(output, &cloud, version)
        .with_context(|| format!("failed to write {}", output.display()))?;

    print_summary(
        "Reclassify Complete",
        &[
            ("Input file", path.display().to_string()),
            ("Output CSV", output.display().to_string()),
            ("Rewritten", format!("{} ({} -> {})", rewritten, from, to)),
            ("Format version", version.to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
    Ok(())
}

fn failed_indices<T>(report: &BatchReport<T>) -> String {
    let failed: Vec<String> = report.failures().map(|(i, _)| i.to_string()).collect();
    if failed.is_empty() {
        "none".to_string()
    } else {
        failed.join(", ")
    }
}
