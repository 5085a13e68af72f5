//! Core data types, I/O and geometry helpers.

pub mod classification;
pub mod geometry;
pub mod loaders;
pub mod transforms;
pub mod writers;

pub use classification::{points_in_class, reclassify, UnknownClassError};
pub use loaders::{load_cloud, ClassifiedCloud, LoaderError};
pub use writers::{
    write_classified_csv, write_extrema, write_hulls_csv, write_labels_csv, FormatVersion,
    VersionError, WriteError,
};
