//! Writers for pipeline outputs.
//!
//! - Extrema files: one `x,y,z` line per record, no header
//! - Hull CSV with one row per polygon vertex
//! - CSV with labelled coordinates for clustering results
//! - Classified point CSV (readable again by the CSV loader), tagged with a
//!   point format version

use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

use super::loaders::ClassifiedCloud;
use crate::processors::alpha_shape::ConcaveHull;
use crate::processors::extrema::ExtremumRecord;

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },

    /// Mismatched array lengths.
    #[error("array length mismatch: coords has {coords_len} elements, labels has {labels_len} elements")]
    LengthMismatch { coords_len: usize, labels_len: usize },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Rejected point format version string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("not a valid format version: '{0}' (expected 1.2, 1.4 or 1.6)")]
pub struct VersionError(pub String);

/// Point format version of a classified export.
///
/// Version 1.2 only has room for classes 0..=31.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatVersion {
    V1_2,
    #[default]
    V1_4,
    V1_6,
}

impl FormatVersion {
    /// Largest class code the version can store.
    pub fn max_class(self) -> u8 {
        match self {
            FormatVersion::V1_2 => 31,
            FormatVersion::V1_4 | FormatVersion::V1_6 => u8::MAX,
        }
    }

    /// The class as written under this version; unrepresentable classes
    /// become 0 (never classified).
    pub fn stored_class(self, class: u8) -> u8 {
        if class > self.max_class() {
            0
        } else {
            class
        }
    }
}

impl FromStr for FormatVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "1.2" => Ok(FormatVersion::V1_2),
            "1.4" => Ok(FormatVersion::V1_4),
            "1.6" => Ok(FormatVersion::V1_6),
            other => Err(VersionError(other.to_string())),
        }
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FormatVersion::V1_2 => "1.2",
            FormatVersion::V1_4 => "1.4",
            FormatVersion::V1_6 => "1.6",
        };
        f.write_str(s)
    }
}

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Creates a buffered writer for the given path.
fn create_buffered_writer(path: &Path) -> Result<BufWriter<File>> {
    ensure_parent_dirs(path)?;
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(BufWriter::new(file))
}

/// CSV writer over a buffered file, with the header row already written.
fn create_csv_writer(path: &Path, header: &[&str]) -> Result<csv::Writer<BufWriter<File>>> {
    let mut writer = csv::Writer::from_writer(create_buffered_writer(path)?);
    writer.write_record(header).map_err(|e| WriteError::CsvError {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(writer)
}

fn finish_csv(path: &Path, mut writer: csv::Writer<BufWriter<File>>) -> Result<()> {
    writer.flush().map_err(|e| WriteError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })
}

/// Write extrema as plain `x,y,z` lines.
///
/// No header; every line, including the last, ends with a newline.
/// Coordinates are written at full precision.
///
/// # Example
///
/// ```no_run
/// use footprint_pipeline::core::writers::write_extrema;
/// use footprint_pipeline::processors::extrema::ExtremumRecord;
/// use std::path::Path;
///
/// let records = vec![ExtremumRecord::Raw([1.0, 2.0, 3.0])];
/// write_extrema(Path::new("bottoms.txt"), &records).unwrap();
/// ```
pub fn write_extrema(path: &Path, records: &[ExtremumRecord]) -> Result<()> {
    let mut writer = create_buffered_writer(path)?;
    let path_str = path.display().to_string();

    for record in records {
        let [x, y, z] = record.point();
        writeln!(writer, "{},{},{}", x, y, z).map_err(|e| WriteError::WriteFile {
            path: path_str.clone(),
            source: e,
        })?;
    }

    writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    log::debug!("wrote {} extrema to {}", records.len(), path.display());
    Ok(())
}

/// Write hull outlines to CSV.
///
/// Columns are `hull,polygon,ring,vertex,x,y`. `hull` is the position in
/// `hulls`, `polygon` the member polygon of that hull, `ring` 0 for the
/// exterior and 1.. for the interiors. Rings are written closed.
pub fn write_hulls_csv(path: &Path, hulls: &[(usize, &ConcaveHull)]) -> Result<()> {
    let mut writer = create_csv_writer(path, &["hull", "polygon", "ring", "vertex", "x", "y"])?;
    let path_str = path.display().to_string();

    for (hull_index, hull) in hulls {
        for (polygon_index, polygon) in hull.geometry.polygons().iter().enumerate() {
            let rings = std::iter::once(polygon.exterior()).chain(polygon.interiors());
            for (ring_index, ring) in rings.enumerate() {
                for (vertex, coord) in ring.coords().enumerate() {
                    writer
                        .write_record(&[
                            hull_index.to_string(),
                            polygon_index.to_string(),
                            ring_index.to_string(),
                            vertex.to_string(),
                            format!("{:.6}", coord.x),
                            format!("{:.6}", coord.y),
                        ])
                        .map_err(|e| WriteError::CsvError {
                            path: path_str.clone(),
                            source: e,
                        })?;
                }
            }
        }
    }

    finish_csv(path, writer)
}

/// Write labeled coordinates to CSV.
///
/// Creates a CSV file with headers "x,y,z,label" containing coordinate data
/// with associated cluster labels.
///
/// # Errors
///
/// Returns an error if:
/// - `coords` and `labels` have different lengths
/// - Parent directories cannot be created
/// - File cannot be created or written to
pub fn write_labels_csv(path: &Path, coords: &[[f64; 3]], labels: &[i32]) -> Result<()> {
    if coords.len() != labels.len() {
        return Err(WriteError::LengthMismatch {
            coords_len: coords.len(),
            labels_len: labels.len(),
        });
    }

    let mut writer = create_csv_writer(path, &["x", "y", "z", "label"])?;
    let path_str = path.display().to_string();

    for (coord, label) in coords.iter().zip(labels.iter()) {
        writer
            .write_record(&[
                format!("{:.6}", coord[0]),
                format!("{:.6}", coord[1]),
                format!("{:.6}", coord[2]),
                label.to_string(),
            ])
            .map_err(|e| WriteError::CsvError {
                path: path_str.clone(),
                source: e,
            })?;
    }

    finish_csv(path, writer)
}

/// Write a classified cloud to CSV with headers "x,y,z,classification".
///
/// Coordinates are written at full precision so the file reloads exactly.
/// Classes the `version` cannot store are written as 0.
pub fn write_classified_csv(
    path: &Path,
    cloud: &ClassifiedCloud,
    version: FormatVersion,
) -> Result<()> {
    let mut writer = create_csv_writer(path, &["x", "y", "z", "classification"])?;
    let path_str = path.display().to_string();
    let mut clamped = 0usize;

    for i in 0..cloud.len() {
        let class = version.stored_class(cloud.classification[i]);
        if class != cloud.classification[i] {
            clamped += 1;
        }
        writer
            .write_record(&[
                cloud.x[i].to_string(),
                cloud.y[i].to_string(),
                cloud.z[i].to_string(),
                class.to_string(),
            ])
            .map_err(|e| WriteError::CsvError {
                path: path_str.clone(),
                source: e,
            })?;
    }

    if clamped > 0 {
        log::warn!(
            "{}: {} points had classes above {} and were written as 0 (format {})",
            path.display(),
            clamped,
            version.max_class(),
            version
        );
    }

    finish_csv(path, writer)
}
