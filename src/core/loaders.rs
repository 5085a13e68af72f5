//! Data loaders for classified point clouds.
//!
//! This module provides parsers for:
//! - Classified CSV exports (x, y, z, classification columns)
//! - ASCII PLY point clouds with an optional per-vertex classification

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use thiserror::Error;

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Empty file: {0}")]
    EmptyFile(PathBuf),

    #[error("Invalid PLY file: {0}")]
    InvalidPly(String),

    #[error("Missing required columns: {0}")]
    MissingColumns(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Unsupported point cloud format: {0}")]
    UnsupportedFormat(PathBuf),
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Column names accepted for the classification attribute.
const CLASS_COLUMNS: &[&str] = &["classification", "class", "scalar_classification"];

/// Container for a classified 3D point cloud.
///
/// Coordinates are stored column-wise; `classification[i]` is the class code
/// of point `i`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifiedCloud {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
    pub classification: Vec<u8>,
}

impl ClassifiedCloud {
    /// Creates a new empty cloud.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new cloud with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            x: Vec::with_capacity(capacity),
            y: Vec::with_capacity(capacity),
            z: Vec::with_capacity(capacity),
            classification: Vec::with_capacity(capacity),
        }
    }

    /// Returns the number of points in the cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Returns true if the cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Adds a classified point to the cloud.
    #[inline]
    pub fn push(&mut self, x: f64, y: f64, z: f64, class: u8) {
        self.x.push(x);
        self.y.push(y);
        self.z.push(z);
        self.classification.push(class);
    }

    /// Converts the cloud to a vector of [x, y, z] coordinate arrays.
    pub fn to_coords(&self) -> Vec<[f64; 3]> {
        (0..self.len())
            .map(|i| [self.x[i], self.y[i], self.z[i]])
            .collect()
    }

    /// The distinct classification codes present in the cloud.
    pub fn unique_classes(&self) -> BTreeSet<u8> {
        self.classification.iter().copied().collect()
    }

    /// Number of points per classification code.
    pub fn class_counts(&self) -> BTreeMap<u8, usize> {
        let mut counts = BTreeMap::new();
        for &class in &self.classification {
            *counts.entry(class).or_insert(0) += 1;
        }
        counts
    }
}

/// Parse a numeric field, reporting the column name on failure.
fn parse_field<T: std::str::FromStr>(value: Option<&str>, column: &str) -> Result<T> {
    let raw = value.ok_or_else(|| LoaderError::ParseError(format!("missing {} value", column)))?;
    raw.trim()
        .parse()
        .map_err(|_| LoaderError::ParseError(format!("Invalid {} value: {}", column, raw)))
}

/// Parse a classification field. Exports frequently write class codes as
/// floats ("2.0"), so a float representation is accepted as well.
fn parse_class(value: Option<&str>) -> Result<u8> {
    let raw = value.ok_or_else(|| LoaderError::ParseError("missing classification value".to_string()))?;
    let raw = raw.trim();
    if let Ok(class) = raw.parse::<u8>() {
        return Ok(class);
    }
    match raw.parse::<f64>() {
        Ok(v) if v.fract() == 0.0 && (0.0..=255.0).contains(&v) => Ok(v as u8),
        _ => Err(LoaderError::ParseError(format!(
            "Invalid classification value: {}",
            raw
        ))),
    }
}

/// Load a classified point cloud from a CSV file.
///
/// The CSV must have a header row naming `x`, `y`, `z` and a classification
/// column (`classification`, `class` or `scalar_classification`). Column
/// names are matched case-insensitively; any other columns are ignored.
///
/// # Errors
///
/// Returns an error if the file cannot be read, lacks one of the required
/// columns, contains an unparsable value, or holds no points.
pub fn load_classified_csv<P: AsRef<Path>>(path: P) -> Result<ClassifiedCloud> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(BufReader::new(file));

    let headers = reader.headers()?.clone();
    let col_map: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, name)| (name.to_lowercase(), i))
        .collect();

    let column = |name: &str| {
        col_map
            .get(name)
            .copied()
            .ok_or_else(|| LoaderError::MissingColumns(name.to_string()))
    };
    let x_idx = column("x")?;
    let y_idx = column("y")?;
    let z_idx = column("z")?;
    let class_idx = CLASS_COLUMNS
        .iter()
        .find_map(|name| col_map.get(*name).copied())
        .ok_or_else(|| LoaderError::MissingColumns("classification".to_string()))?;

    let mut cloud = ClassifiedCloud::with_capacity(10_000);

    for result in reader.records() {
        let record = result?;
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }

        cloud.push(
            parse_field(record.get(x_idx), "x")?,
            parse_field(record.get(y_idx), "y")?,
            parse_field(record.get(z_idx), "z")?,
            parse_class(record.get(class_idx))?,
        );
    }

    if cloud.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    Ok(cloud)
}

/// Load a classified point cloud from an ASCII PLY file.
///
/// Supports PLY files with vertex elements containing:
/// - Required: x, y, z properties
/// - Optional: a classification property (`classification`, `class` or
///   `scalar_classification`); points default to class 0 without it
///
/// # Errors
///
/// Returns an error if the file is not a valid ASCII PLY or lacks coordinates.
pub fn load_ply<P: AsRef<Path>>(path: P) -> Result<ClassifiedCloud> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();

    let first_line = lines
        .next()
        .ok_or_else(|| LoaderError::InvalidPly("Empty file".to_string()))??;

    if !first_line.trim().starts_with("ply") {
        return Err(LoaderError::InvalidPly(format!(
            "{} is not a PLY file",
            path.display()
        )));
    }

    // Parse header. Only properties of the vertex element are collected.
    let mut num_vertices: Option<usize> = None;
    let mut prop_names: Vec<String> = Vec::new();
    let mut in_vertex_element = false;
    let mut header_done = false;

    for line in &mut lines {
        let line = line?;
        let stripped = line.trim();

        if stripped.starts_with("format") && !stripped.contains("ascii") {
            return Err(LoaderError::InvalidPly(format!(
                "only ASCII PLY is supported, found '{}'",
                stripped
            )));
        } else if stripped.starts_with("element") {
            in_vertex_element = stripped.starts_with("element vertex");
            if in_vertex_element {
                num_vertices = stripped
                    .split_whitespace()
                    .last()
                    .and_then(|count| count.parse().ok());
            }
        } else if stripped.starts_with("property") && in_vertex_element {
            if let Some(name) = stripped.split_whitespace().last() {
                prop_names.push(name.to_lowercase());
            }
        } else if stripped == "end_header" {
            header_done = true;
            break;
        }
    }

    let num_vertices = num_vertices
        .ok_or_else(|| LoaderError::InvalidPly("No vertex count in header".to_string()))?;

    if !header_done {
        return Err(LoaderError::InvalidPly("Missing end_header".to_string()));
    }

    let prop_idx: HashMap<&str, usize> = prop_names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();

    let required = |name: &str| {
        prop_idx
            .get(name)
            .copied()
            .ok_or_else(|| LoaderError::MissingColumns(name.to_string()))
    };
    let x_idx = required("x")?;
    let y_idx = required("y")?;
    let z_idx = required("z")?;
    let class_idx = CLASS_COLUMNS.iter().find_map(|name| prop_idx.get(*name).copied());

    let mut cloud = ClassifiedCloud::with_capacity(num_vertices);

    for line in lines {
        if cloud.len() >= num_vertices {
            break;
        }

        let line = line?;
        let values: Vec<&str> = line.split_whitespace().collect();

        if values.len() < prop_names.len() {
            continue;
        }

        let class = match class_idx {
            Some(idx) => parse_class(values.get(idx).copied())?,
            None => 0,
        };

        cloud.push(
            parse_field(values.get(x_idx).copied(), "x")?,
            parse_field(values.get(y_idx).copied(), "y")?,
            parse_field(values.get(z_idx).copied(), "z")?,
            class,
        );
    }

    if cloud.len() < num_vertices {
        return Err(LoaderError::InvalidPly(format!(
            "Expected {} vertices, found {}",
            num_vertices,
            cloud.len()
        )));
    }

    Ok(cloud)
}

/// Load a classified point cloud, choosing the parser from the file extension.
///
/// `.csv` and `.txt` are read as classified CSV, `.ply` as ASCII PLY.
pub fn load_cloud<P: AsRef<Path>>(path: P) -> Result<ClassifiedCloud> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());

    match extension.as_deref() {
        Some("csv") | Some("txt") => load_classified_csv(path),
        Some("ply") => load_ply(path),
        _ => Err(LoaderError::UnsupportedFormat(path.to_path_buf())),
    }
}
