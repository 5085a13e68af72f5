//! Classification lookups and rewrites on a [`ClassifiedCloud`].

use std::collections::BTreeSet;

use thiserror::Error;

use super::loaders::ClassifiedCloud;

/// A requested classification code is not present in the cloud.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("classification {class} not found in data (available: {available:?})")]
pub struct UnknownClassError {
    pub class: u8,
    pub available: BTreeSet<u8>,
}

/// Fail with [`UnknownClassError`] unless `class` occurs in `cloud`.
pub fn ensure_class(cloud: &ClassifiedCloud, class: u8) -> Result<(), UnknownClassError> {
    if cloud.classification.contains(&class) {
        Ok(())
    } else {
        Err(UnknownClassError {
            class,
            available: cloud.unique_classes(),
        })
    }
}

/// All points of the given class, in cloud order.
pub fn points_in_class(
    cloud: &ClassifiedCloud,
    class: u8,
) -> Result<Vec<[f64; 3]>, UnknownClassError> {
    ensure_class(cloud, class)?;

    Ok(cloud
        .classification
        .iter()
        .enumerate()
        .filter(|(_, &c)| c == class)
        .map(|(i, _)| [cloud.x[i], cloud.y[i], cloud.z[i]])
        .collect())
}

/// Rewrite every point of class `from` to class `to`.
///
/// Returns the number of points rewritten.
pub fn reclassify(cloud: &mut ClassifiedCloud, from: u8, to: u8) -> Result<usize, UnknownClassError> {
    ensure_class(cloud, from)?;

    let mut rewritten = 0;
    for class in cloud.classification.iter_mut().filter(|c| **c == from) {
        *class = to;
        rewritten += 1;
    }
    log::info!("reclassified {} points from class {} to {}", rewritten, from, to);
    Ok(rewritten)
}
