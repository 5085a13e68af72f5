//! Polygon helpers shared by the hull and diamond-merge clusterers.

use geo::{BooleanOps, BoundingRect, MultiPolygon, Polygon};

/// Union any number of polygons into one multi-polygon.
///
/// The union is built as a balanced binary tree split at the midpoint, with
/// both halves merged in parallel via `rayon::join`. The split points depend
/// only on the input length, so the same input always yields the same output.
pub fn union_polygons(polygons: &[Polygon<f64>]) -> MultiPolygon<f64> {
    match polygons.len() {
        0 => MultiPolygon::new(Vec::new()),
        1 => MultiPolygon::new(Vec::new()).union(&MultiPolygon::new(vec![polygons[0].clone()])),
        n => {
            let (left, right) = polygons.split_at(n / 2);
            let (a, b) = rayon::join(|| union_polygons(left), || union_polygons(right));
            a.union(&b)
        }
    }
}

/// Sort polygons by the lower-left corner of their bounding box.
pub fn sort_polygons(polygons: &mut [Polygon<f64>]) {
    let key = |p: &Polygon<f64>| {
        p.bounding_rect()
            .map(|r| (r.min().x, r.min().y))
            .unwrap_or((f64::INFINITY, f64::INFINITY))
    };
    polygons.sort_by(|a, b| {
        let (ka, kb) = (key(a), key(b));
        ka.0.total_cmp(&kb.0).then(ka.1.total_cmp(&kb.1))
    });
}
