//! Alpha-shape (concave hull) construction.
//!
//! The hull of a planar point set is built from its Delaunay triangulation:
//!
//! 1. **Triangulate** the points with `spade`
//! 2. **Filter** triangles by circumradius: a triangle whose circumradius is
//!    below `1 / alpha` contributes its three edges to the kept-edge set
//! 3. **Polygonize** the kept edges: every triangle that cannot be reached
//!    from outside the triangulation without crossing a kept edge lies in a
//!    bounded face of the kept-edge arrangement
//! 4. **Trace** the boundary of the enclosed triangles on the mesh into
//!    exterior and interior rings of the final (multi-)polygon
//!
//! Point sets with fewer than four points short-circuit to their convex hull.

use std::collections::{HashMap, HashSet, VecDeque};

use geo::{Area, ConvexHull, LineString, MultiPoint, MultiPolygon, Point, Polygon, Simplify};
use spade::{DelaunayTriangulation, Point2, Triangulation};
use thiserror::Error;

use super::cancel::CancelToken;
use crate::config::{AlphaShapeConfig, DegenerateTriangle};
use crate::core::geometry::sort_polygons;

/// Triangles filtered between two cancellation checks.
const CANCEL_CHECK_INTERVAL: usize = 4096;

/// Errors raised while building a hull.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("alpha must be positive and finite, got {0}")]
    InvalidAlpha(f64),

    #[error("triangulation failed: {0}")]
    Triangulation(String),

    #[error("triangulation of {points} points has no triangles (collinear or coincident input)")]
    Degenerate { points: usize },

    #[error("hull construction cancelled")]
    Cancelled,
}

/// Hull geometry: a single polygon or a multi-polygon.
#[derive(Debug, Clone, PartialEq)]
pub enum HullGeometry {
    Polygon(Polygon<f64>),
    MultiPolygon(MultiPolygon<f64>),
}

impl HullGeometry {
    /// Wrap a list of polygons; exactly one becomes [`HullGeometry::Polygon`].
    pub fn from_polygons(mut polygons: Vec<Polygon<f64>>) -> Self {
        if polygons.len() == 1 {
            if let Some(polygon) = polygons.pop() {
                return HullGeometry::Polygon(polygon);
            }
        }
        HullGeometry::MultiPolygon(MultiPolygon::new(polygons))
    }

    /// Uniform view over the member polygons.
    pub fn polygons(&self) -> &[Polygon<f64>] {
        match self {
            HullGeometry::Polygon(polygon) => std::slice::from_ref(polygon),
            HullGeometry::MultiPolygon(multi) => &multi.0,
        }
    }

    /// True if the geometry covers no vertices at all.
    pub fn is_empty(&self) -> bool {
        self.polygons()
            .iter()
            .all(|p| p.exterior().0.is_empty())
    }

    pub fn area(&self) -> f64 {
        self.polygons().iter().map(|p| p.unsigned_area()).sum()
    }

    /// Douglas-Peucker simplification of every ring.
    pub fn simplify(&self, tolerance: f64) -> Self {
        match self {
            HullGeometry::Polygon(polygon) => HullGeometry::Polygon(polygon.simplify(&tolerance)),
            HullGeometry::MultiPolygon(multi) => {
                HullGeometry::MultiPolygon(multi.simplify(&tolerance))
            }
        }
    }
}

/// A concave hull together with the kept edges that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcaveHull {
    pub geometry: HullGeometry,
    /// Kept triangle edges as coordinate pairs, deduplicated, in the order
    /// they were first kept. Empty for the convex-hull short cut.
    pub edges: Vec<[[f64; 2]; 2]>,
}

impl ConcaveHull {
    pub fn is_empty(&self) -> bool {
        self.geometry.is_empty()
    }

    /// The same hull with its geometry simplified.
    pub fn simplified(self, tolerance: f64) -> Self {
        Self {
            geometry: self.geometry.simplify(tolerance),
            edges: self.edges,
        }
    }
}

/// Three vertex indices into [`Mesh::positions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Triangle {
    pub vertices: [usize; 3],
}

/// A triangulation with per-edge adjacency.
///
/// Edge `k` of a triangle runs from `vertices[k]` to `vertices[(k + 1) % 3]`;
/// `neighbours[t][k]` is the triangle on the other side of that edge, or
/// `None` on the outer boundary.
#[derive(Debug, Clone)]
pub struct Mesh {
    pub positions: Vec<[f64; 2]>,
    pub triangles: Vec<Triangle>,
    neighbours: Vec<[Option<usize>; 3]>,
}

/// Unordered edge key.
#[inline]
fn edge_key(a: usize, b: usize) -> (usize, usize) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

impl Mesh {
    /// Build a mesh, deriving adjacency from shared edges.
    ///
    /// Triangles are reordered counter-clockwise, so the interior of every
    /// triangle lies to the left of its edges.
    pub fn from_triangles(positions: Vec<[f64; 2]>, triangles: Vec<Triangle>) -> Self {
        let triangles: Vec<Triangle> = triangles
            .into_iter()
            .map(|tri| counter_clockwise(&positions, tri))
            .collect();

        let mut by_edge: HashMap<(usize, usize), Vec<(usize, usize)>> = HashMap::new();
        for (t, tri) in triangles.iter().enumerate() {
            for k in 0..3 {
                let key = edge_key(tri.vertices[k], tri.vertices[(k + 1) % 3]);
                by_edge.entry(key).or_default().push((t, k));
            }
        }

        let mut neighbours = vec![[None; 3]; triangles.len()];
        for sides in by_edge.values() {
            if let [(t1, k1), (t2, k2)] = sides.as_slice() {
                neighbours[*t1][*k1] = Some(*t2);
                neighbours[*t2][*k2] = Some(*t1);
            }
        }

        Self {
            positions,
            triangles,
            neighbours,
        }
    }

    /// Corner coordinates of triangle `t`.
    pub fn triangle_coords(&self, t: usize) -> [[f64; 2]; 3] {
        self.triangles[t].vertices.map(|v| self.positions[v])
    }

    fn edge(&self, t: usize, k: usize) -> (usize, usize) {
        let v = self.triangles[t].vertices;
        edge_key(v[k], v[(k + 1) % 3])
    }

    /// True if edge `k` of `t` separates it from a triangle outside `region`.
    fn on_region_boundary(&self, t: usize, k: usize, region: &[bool]) -> bool {
        self.neighbours[t][k].map_or(true, |other| !region[other])
    }

    /// The boundary edge of `region` that follows edge `k` of `t`.
    ///
    /// Rotates around the end vertex of the edge through triangles of the
    /// region until an edge on the region boundary is found. Following this
    /// from any boundary edge walks one ring with the region on its left.
    fn next_boundary_edge(&self, t: usize, k: usize, region: &[bool]) -> Option<(usize, usize)> {
        let pivot = self.triangles[t].vertices[(k + 1) % 3];
        let (mut t, mut k) = (t, (k + 1) % 3);

        for _ in 0..self.triangles.len() {
            match self.neighbours[t][k] {
                Some(other) if region[other] => {
                    k = self.triangles[other]
                        .vertices
                        .iter()
                        .position(|&v| v == pivot)?;
                    t = other;
                }
                _ => return Some((t, k)),
            }
        }
        None
    }

    /// Edge-connected components of `region`; `None` outside it.
    fn region_components(&self, region: &[bool]) -> Vec<Option<usize>> {
        let mut component = vec![None; self.triangles.len()];
        let mut next_id = 0;

        for seed in 0..self.triangles.len() {
            if !region[seed] || component[seed].is_some() {
                continue;
            }
            component[seed] = Some(next_id);
            let mut queue = VecDeque::from([seed]);
            while let Some(t) = queue.pop_front() {
                for other in self.neighbours[t].iter().flatten().copied() {
                    if region[other] && component[other].is_none() {
                        component[other] = Some(next_id);
                        queue.push_back(other);
                    }
                }
            }
            next_id += 1;
        }
        component
    }
}

fn counter_clockwise(positions: &[[f64; 2]], tri: Triangle) -> Triangle {
    let [a, b, c] = tri.vertices.map(|v| positions[v]);
    let cross = (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0]);
    if cross < 0.0 {
        let [a, b, c] = tri.vertices;
        Triangle { vertices: [a, c, b] }
    } else {
        tri
    }
}

/// Shoelace area, positive for counter-clockwise rings.
///
/// Taken relative to the first vertex to keep projected coordinates from
/// swamping small rings.
fn signed_area(ring: &[[f64; 2]]) -> f64 {
    let Some(&origin) = ring.first() else {
        return 0.0;
    };
    let n = ring.len();
    (0..n)
        .map(|i| {
            let (p, q) = (ring[i], ring[(i + 1) % n]);
            let (px, py) = (p[0] - origin[0], p[1] - origin[1]);
            let (qx, qy) = (q[0] - origin[0], q[1] - origin[1]);
            px * qy - qx * py
        })
        .sum::<f64>()
        / 2.0
}

/// Delaunay triangulation of a planar point set.
///
/// Coincident input points are merged by the triangulation, so
/// `positions` may be shorter than `points`.
///
/// # Errors
///
/// [`GeometryError::Triangulation`] if a point cannot be inserted (e.g. NaN
/// coordinates), [`GeometryError::Degenerate`] if no triangle exists
/// (fewer than three distinct points, or all points collinear).
pub fn triangulate(points: &[[f64; 2]]) -> Result<Mesh, GeometryError> {
    let vertices: Vec<Point2<f64>> = points.iter().map(|p| Point2::new(p[0], p[1])).collect();

    let triangulation: DelaunayTriangulation<Point2<f64>> =
        DelaunayTriangulation::bulk_load_stable(vertices)
            .map_err(|e| GeometryError::Triangulation(format!("{:?}", e)))?;

    let positions: Vec<[f64; 2]> = triangulation
        .vertices()
        .map(|v| {
            let p = v.position();
            [p.x, p.y]
        })
        .collect();

    let triangles: Vec<Triangle> = triangulation
        .inner_faces()
        .map(|face| Triangle {
            vertices: face.adjacent_edges().map(|edge| edge.from().fix().index()),
        })
        .collect();

    if triangles.is_empty() {
        return Err(GeometryError::Degenerate {
            points: points.len(),
        });
    }

    Ok(Mesh::from_triangles(positions, triangles))
}

/// Circumradius of a planar triangle from its side lengths.
///
/// Returns `None` when the Heron area is not positive (collinear or
/// coincident corners).
pub fn circumradius(corners: &[[f64; 2]; 3]) -> Option<f64> {
    let [pa, pb, pc] = corners;
    let a = ((pa[0] - pb[0]).powi(2) + (pa[1] - pb[1]).powi(2)).sqrt();
    let b = ((pb[0] - pc[0]).powi(2) + (pb[1] - pc[1]).powi(2)).sqrt();
    let c = ((pc[0] - pa[0]).powi(2) + (pc[1] - pa[1]).powi(2)).sqrt();

    let s = (a + b + c) / 2.0;
    let area = (s * (s - a) * (s - b) * (s - c)).sqrt();

    // NaN (negative radicand from rounding) fails this test as well
    if area > 0.0 {
        Some(a * b * c / (4.0 * area))
    } else {
        None
    }
}

/// Decide, per triangle, whether it passes the alpha filter.
///
/// A triangle passes when its circumradius is below `1 / alpha`. Degenerate
/// triangles are handled according to `degenerate`; with
/// [`DegenerateTriangle::ReusePrevious`] they are judged by the circumradius
/// of the last non-degenerate triangle before them in iteration order.
pub fn retained_triangles(
    triangles: &[[[f64; 2]; 3]],
    alpha: f64,
    degenerate: DegenerateTriangle,
    cancel: &CancelToken,
) -> Result<Vec<bool>, GeometryError> {
    let threshold = 1.0 / alpha;
    let mut previous: Option<f64> = None;
    let mut retained = Vec::with_capacity(triangles.len());

    for (i, corners) in triangles.iter().enumerate() {
        if i % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
            return Err(GeometryError::Cancelled);
        }

        let radius = match circumradius(corners) {
            Some(r) => {
                previous = Some(r);
                Some(r)
            }
            None => match degenerate {
                DegenerateTriangle::Skip => None,
                DegenerateTriangle::ReusePrevious => previous,
            },
        };
        retained.push(radius.map_or(false, |r| r < threshold));
    }

    Ok(retained)
}

/// Triangles lying in a bounded face of the kept-edge arrangement.
///
/// Flood-fills from the outer boundary across edges that were not kept;
/// everything the fill cannot reach is enclosed by kept edges. This includes
/// triangles that failed the filter but are fully surrounded by kept edges,
/// so interior gaps are filled.
fn enclosed_triangles(mesh: &Mesh, kept: &HashSet<(usize, usize)>) -> Vec<bool> {
    let n = mesh.triangles.len();
    let mut outside = vec![false; n];
    let mut queue = VecDeque::new();

    for t in 0..n {
        for k in 0..3 {
            if mesh.neighbours[t][k].is_none() && !kept.contains(&mesh.edge(t, k)) && !outside[t] {
                outside[t] = true;
                queue.push_back(t);
            }
        }
    }

    while let Some(t) = queue.pop_front() {
        for k in 0..3 {
            if let Some(next) = mesh.neighbours[t][k] {
                if !outside[next] && !kept.contains(&mesh.edge(t, k)) {
                    outside[next] = true;
                    queue.push_back(next);
                }
            }
        }
    }

    outside.into_iter().map(|o| !o).collect()
}

/// Polygons covering exactly the triangles of `region`.
///
/// Boundary rings are traced on the mesh. Per edge-connected component the
/// counter-clockwise ring of largest area is the exterior and clockwise
/// rings are its holes; any further counter-clockwise ring (a component
/// pinched into several outlines) becomes a polygon of its own.
fn region_polygons(mesh: &Mesh, region: &[bool]) -> Vec<Polygon<f64>> {
    let component = mesh.region_components(region);
    let components = component.iter().flatten().max().map_or(0, |&c| c + 1);
    let mut outlines: Vec<Vec<(f64, Vec<[f64; 2]>)>> = vec![Vec::new(); components];
    let mut holes: Vec<Vec<Vec<[f64; 2]>>> = vec![Vec::new(); components];
    let mut visited: HashSet<(usize, usize)> = HashSet::new();

    for t in 0..mesh.triangles.len() {
        let Some(c) = component[t] else { continue };
        for k in 0..3 {
            if !mesh.on_region_boundary(t, k, region) || visited.contains(&(t, k)) {
                continue;
            }

            let mut ring = Vec::new();
            let mut current = Some((t, k));
            while let Some((rt, rk)) = current {
                if !visited.insert((rt, rk)) {
                    break;
                }
                ring.push(mesh.positions[mesh.triangles[rt].vertices[rk]]);
                current = mesh.next_boundary_edge(rt, rk, region);
            }
            if ring.len() < 3 {
                continue;
            }

            let area = signed_area(&ring);
            if area > 0.0 {
                outlines[c].push((area, ring));
            } else if area < 0.0 {
                holes[c].push(ring);
            }
        }
    }

    let to_line = |ring: Vec<[f64; 2]>| -> LineString<f64> {
        LineString::from(ring.into_iter().map(|p| (p[0], p[1])).collect::<Vec<_>>())
    };

    let mut polygons = Vec::new();
    for (mut rings, interiors) in outlines.into_iter().zip(holes) {
        rings.sort_by(|a, b| b.0.total_cmp(&a.0));
        let mut rings = rings.into_iter();
        let Some((_, exterior)) = rings.next() else { continue };
        polygons.push(Polygon::new(
            to_line(exterior),
            interiors.into_iter().map(to_line).collect(),
        ));
        polygons.extend(rings.map(|(_, ring)| Polygon::new(to_line(ring), vec![])));
    }
    polygons
}

/// Convex hull of fewer than four points.
fn convex_hull(points: &[[f64; 2]]) -> ConcaveHull {
    let geometry = if points.is_empty() {
        HullGeometry::MultiPolygon(MultiPolygon::new(Vec::new()))
    } else {
        let multi: MultiPoint<f64> = points.iter().map(|p| Point::new(p[0], p[1])).collect();
        HullGeometry::Polygon(multi.convex_hull())
    };
    ConcaveHull {
        geometry,
        edges: Vec::new(),
    }
}

/// Compute the concave hull of a planar point set.
///
/// See [`build_alpha_shape`]; degenerate triangles are skipped.
pub fn alpha_shape(points: &[[f64; 2]], alpha: f64) -> Result<ConcaveHull, GeometryError> {
    build_alpha_shape(points, alpha, DegenerateTriangle::Skip, &CancelToken::new())
}

/// Compute the concave hull of a planar point set.
///
/// # Arguments
///
/// * `points` - Planar points (z already dropped)
/// * `alpha` - Shape parameter; smaller values follow the points less
///   tightly, large values may lose the hull entirely
/// * `degenerate` - Handling of zero-area triangles in the filter
/// * `cancel` - Checked while filtering triangles
///
/// # Returns
///
/// The hull (possibly a multi-polygon, possibly empty if no triangle passes
/// the filter) and the kept edges. Fewer than four points yield their convex
/// hull.
///
/// # Errors
///
/// [`GeometryError::InvalidAlpha`] for a non-positive or non-finite alpha;
/// triangulation failures on degenerate input.
pub fn build_alpha_shape(
    points: &[[f64; 2]],
    alpha: f64,
    degenerate: DegenerateTriangle,
    cancel: &CancelToken,
) -> Result<ConcaveHull, GeometryError> {
    if !(alpha.is_finite() && alpha > 0.0) {
        return Err(GeometryError::InvalidAlpha(alpha));
    }

    if points.len() < 4 {
        return Ok(convex_hull(points));
    }

    let mesh = triangulate(points)?;
    let corners: Vec<[[f64; 2]; 3]> = (0..mesh.triangles.len())
        .map(|t| mesh.triangle_coords(t))
        .collect();
    let retained = retained_triangles(&corners, alpha, degenerate, cancel)?;

    let mut kept: HashSet<(usize, usize)> = HashSet::new();
    let mut edges = Vec::new();
    for (t, &keep) in retained.iter().enumerate() {
        if !keep {
            continue;
        }
        let v = mesh.triangles[t].vertices;
        for (i, j) in [(v[0], v[1]), (v[1], v[2]), (v[2], v[0])] {
            if kept.insert(edge_key(i, j)) {
                edges.push([mesh.positions[i], mesh.positions[j]]);
            }
        }
    }

    log::debug!(
        "alpha={}: kept {} of {} triangles, {} edges",
        alpha,
        retained.iter().filter(|&&k| k).count(),
        mesh.triangles.len(),
        edges.len()
    );

    if cancel.is_cancelled() {
        return Err(GeometryError::Cancelled);
    }

    let enclosed = enclosed_triangles(&mesh, &kept);
    let mut polygons = region_polygons(&mesh, &enclosed);
    sort_polygons(&mut polygons);

    Ok(ConcaveHull {
        geometry: HullGeometry::from_polygons(polygons),
        edges,
    })
}

/// Build a hull as configured: alpha filter, then optional simplification.
pub fn configured_alpha_shape(
    points: &[[f64; 2]],
    config: &AlphaShapeConfig,
    cancel: &CancelToken,
) -> Result<ConcaveHull, GeometryError> {
    let hull = build_alpha_shape(points, config.alpha, config.degenerate, cancel)?;
    Ok(match config.simplify_tolerance {
        Some(tolerance) if tolerance > 0.0 => hull.simplified(tolerance),
        _ => hull,
    })
}

/// Drop z from a point set.
pub fn project_planar(points: &[[f64; 3]]) -> Vec<[f64; 2]> {
    points.iter().map(|p| [p[0], p[1]]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo::{Contains, Coord};

    fn unit_square_with_center() -> Vec<[f64; 2]> {
        vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [0.5, 0.5]]
    }

    fn l_shape() -> Vec<[f64; 2]> {
        let mut points = Vec::new();
        for x in 0..=4 {
            for y in 0..=1 {
                points.push([x as f64, y as f64]);
            }
        }
        for x in 0..=1 {
            for y in 2..=4 {
                points.push([x as f64, y as f64]);
            }
        }
        points
    }

    #[test]
    fn test_square_with_center() {
        let hull = alpha_shape(&unit_square_with_center(), 1.0).unwrap();

        let HullGeometry::Polygon(polygon) = &hull.geometry else {
            panic!("expected a single polygon, got {:?}", hull.geometry);
        };
        assert_relative_eq!(polygon.unsigned_area(), 1.0, epsilon = 1e-9);
        assert!(polygon.interiors().is_empty());
        assert!(!polygon
            .exterior()
            .coords()
            .any(|c| *c == Coord { x: 0.5, y: 0.5 }));
        assert!(polygon.contains(&Point::new(0.5, 0.5)));
        // 4 sides + 4 spokes to the center
        assert_eq!(hull.edges.len(), 8);
    }

    #[test]
    fn test_fewer_than_four_points_is_convex_hull() {
        let points = vec![[0.0, 0.0], [2.0, 0.0], [0.0, 2.0]];
        let hull = alpha_shape(&points, 100.0).unwrap();

        let expected: MultiPoint<f64> = points.iter().map(|p| Point::new(p[0], p[1])).collect();
        assert_eq!(hull.geometry, HullGeometry::Polygon(expected.convex_hull()));
        assert!(hull.edges.is_empty());
        assert_relative_eq!(hull.geometry.area(), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_empty_input_gives_empty_hull() {
        let hull = alpha_shape(&[], 1.0).unwrap();
        assert!(hull.is_empty());
        assert!(hull.geometry.polygons().is_empty());
    }

    #[test]
    fn test_concavity_follows_l_shape() {
        let points = l_shape();
        let hull = alpha_shape(&points, 1.0).unwrap();

        assert_eq!(hull.geometry.polygons().len(), 1);
        // 4x1 band + 1x3 column + the half cell bridging the inner corner
        assert_relative_eq!(hull.geometry.area(), 7.5, epsilon = 1e-9);
        let notch = Point::new(3.0, 3.0);
        assert!(!hull.geometry.polygons().iter().any(|p| p.contains(&notch)));
    }

    #[test]
    fn test_small_alpha_approaches_convex_hull() {
        let points = l_shape();
        let hull = alpha_shape(&points, 0.01).unwrap();

        let multi: MultiPoint<f64> = points.iter().map(|p| Point::new(p[0], p[1])).collect();
        assert_relative_eq!(
            hull.geometry.area(),
            multi.convex_hull().unsigned_area(),
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_huge_alpha_keeps_nothing() {
        let hull = alpha_shape(&unit_square_with_center(), 1000.0).unwrap();
        assert!(hull.is_empty());
        assert!(hull.edges.is_empty());
    }

    #[test]
    fn test_two_separate_groups_make_multipolygon() {
        let mut points = unit_square_with_center();
        points.extend(
            unit_square_with_center()
                .iter()
                .map(|p| [p[0] + 10.0, p[1]]),
        );

        let hull = alpha_shape(&points, 1.0).unwrap();
        let HullGeometry::MultiPolygon(multi) = &hull.geometry else {
            panic!("expected a multi-polygon");
        };
        assert_eq!(multi.0.len(), 2);
        assert_relative_eq!(hull.geometry.area(), 2.0, epsilon = 1e-9);
        // Sorted left to right
        assert!(multi.0[0].contains(&Point::new(0.5, 0.5)));
        assert!(multi.0[1].contains(&Point::new(10.5, 0.5)));
    }

    #[test]
    fn test_retained_edges_come_from_small_triangles() {
        let points = l_shape();
        let alpha = 1.0;
        let hull = alpha_shape(&points, alpha).unwrap();
        let mesh = triangulate(&points).unwrap();

        let mut seen = HashSet::new();
        for [a, b] in &hull.edges {
            let key = (a[0].to_bits(), a[1].to_bits(), b[0].to_bits(), b[1].to_bits());
            let rev = (b[0].to_bits(), b[1].to_bits(), a[0].to_bits(), a[1].to_bits());
            assert!(seen.insert(key) && !seen.contains(&rev), "duplicate edge");

            let supported = (0..mesh.triangles.len()).any(|t| {
                let corners = mesh.triangle_coords(t);
                corners.contains(a)
                    && corners.contains(b)
                    && circumradius(&corners).map_or(false, |r| r < 1.0 / alpha)
            });
            assert!(supported, "edge {:?} not backed by a small triangle", (a, b));
        }
    }

    #[test]
    fn test_circumradius() {
        let right = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        assert_relative_eq!(circumradius(&right).unwrap(), 2f64.sqrt() / 2.0, epsilon = 1e-12);

        let collinear = [[0.0, 0.0], [1.0, 0.0], [2.0, 0.0]];
        assert_eq!(circumradius(&collinear), None);
    }

    #[test]
    fn test_degenerate_triangle_policies() {
        let small = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        let flat = [[0.0, 0.0], [1.0, 0.0], [2.0, 0.0]];
        let cancel = CancelToken::new();

        let skip = retained_triangles(&[small, flat], 1.0, DegenerateTriangle::Skip, &cancel).unwrap();
        assert_eq!(skip, vec![true, false]);

        let reuse =
            retained_triangles(&[small, flat], 1.0, DegenerateTriangle::ReusePrevious, &cancel)
                .unwrap();
        assert_eq!(reuse, vec![true, true]);

        // Nothing to reuse for a leading degenerate triangle
        let leading =
            retained_triangles(&[flat, small], 1.0, DegenerateTriangle::ReusePrevious, &cancel)
                .unwrap();
        assert_eq!(leading, vec![false, true]);
    }

    #[test]
    fn test_enclosed_triangles_fill_surrounded_gap() {
        // Big triangle split into three corner triangles and a center one
        let positions = vec![
            [0.0, 0.0], // A
            [4.0, 0.0], // B
            [2.0, 4.0], // C
            [2.0, 0.0], // D
            [3.0, 2.0], // E
            [1.0, 2.0], // F
        ];
        let triangles = vec![
            Triangle { vertices: [0, 3, 5] },
            Triangle { vertices: [3, 1, 4] },
            Triangle { vertices: [5, 4, 2] },
            Triangle { vertices: [3, 4, 5] },
        ];
        let mesh = Mesh::from_triangles(positions, triangles);

        let edges_of = |ts: &[usize]| -> HashSet<(usize, usize)> {
            ts.iter()
                .flat_map(|&t| (0..3).map(move |k| (t, k)))
                .map(|(t, k)| mesh.edge(t, k))
                .collect()
        };

        // All corners kept: the center is enclosed although it was not kept
        let all_corners = edges_of(&[0, 1, 2]);
        assert_eq!(enclosed_triangles(&mesh, &all_corners), vec![true; 4]);

        // Without corner B the center opens to the outside
        let two_corners = edges_of(&[0, 2]);
        assert_eq!(
            enclosed_triangles(&mesh, &two_corners),
            vec![true, false, true, false]
        );
    }

    #[test]
    fn test_collinear_points_fail_triangulation() {
        let points: Vec<[f64; 2]> = (0..6).map(|i| [i as f64, i as f64]).collect();
        assert_eq!(
            alpha_shape(&points, 1.0),
            Err(GeometryError::Degenerate { points: 6 })
        );
    }

    #[test]
    fn test_rejects_non_positive_alpha() {
        let points = unit_square_with_center();
        assert_eq!(alpha_shape(&points, 0.0), Err(GeometryError::InvalidAlpha(0.0)));
        assert_eq!(alpha_shape(&points, -1.0), Err(GeometryError::InvalidAlpha(-1.0)));
        assert!(alpha_shape(&points[..2], 0.0).is_err());
    }

    #[test]
    fn test_cancelled_build() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = build_alpha_shape(
            &unit_square_with_center(),
            1.0,
            DegenerateTriangle::Skip,
            &cancel,
        );
        assert_eq!(result, Err(GeometryError::Cancelled));
    }

    #[test]
    fn test_configured_alpha_shape_simplifies() {
        let mut points: Vec<[f64; 2]> = Vec::new();
        // Dense, slightly wavy square outline around a filled grid
        for x in 0..=10 {
            for y in 0..=10 {
                let wobble = if (x + y) % 2 == 0 { 0.01 } else { 0.0 };
                points.push([x as f64 + wobble, y as f64]);
            }
        }
        let config = AlphaShapeConfig {
            alpha: 1.0,
            degenerate: DegenerateTriangle::Skip,
            simplify_tolerance: Some(0.5),
        };

        let raw = build_alpha_shape(&points, 1.0, DegenerateTriangle::Skip, &CancelToken::new())
            .unwrap();
        let simplified = configured_alpha_shape(&points, &config, &CancelToken::new()).unwrap();

        let vertex_count = |h: &ConcaveHull| -> usize {
            h.geometry.polygons().iter().map(|p| p.exterior().0.len()).sum()
        };
        assert!(vertex_count(&simplified) < vertex_count(&raw));
        assert_eq!(simplified.edges, raw.edges);
        assert_relative_eq!(simplified.geometry.area(), raw.geometry.area(), epsilon = 0.5);
    }

    /// Deterministic uniform points in `[0, size)^2`, shifted by `offset`.
    fn scattered(count: usize, size: f64, offset: [f64; 2], seed: u64) -> Vec<[f64; 2]> {
        let mut state = seed;
        let mut next = move || {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (state >> 11) as f64 / (1u64 << 53) as f64
        };
        (0..count)
            .map(|_| [offset[0] + next() * size, offset[1] + next() * size])
            .collect()
    }

    fn jittered_grid(side: usize, offset: [f64; 2]) -> Vec<[f64; 2]> {
        let jitter = scattered(side * side, 0.6, [-0.3, -0.3], 7);
        let mut points = Vec::with_capacity(side * side);
        for i in 0..side {
            for j in 0..side {
                let d = jitter[i * side + j];
                points.push([offset[0] + i as f64 + d[0], offset[1] + j as f64 + d[1]]);
            }
        }
        points
    }

    fn triangle_area(corners: &[[f64; 2]; 3]) -> f64 {
        let [a, b, c] = corners;
        ((b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0])).abs() / 2.0
    }

    /// Areas of the triangles passing the filter and of the enclosed region.
    fn kept_and_enclosed_area(points: &[[f64; 2]], alpha: f64) -> (f64, f64) {
        let mesh = triangulate(points).unwrap();
        let corners: Vec<[[f64; 2]; 3]> =
            (0..mesh.triangles.len()).map(|t| mesh.triangle_coords(t)).collect();
        let retained =
            retained_triangles(&corners, alpha, DegenerateTriangle::Skip, &CancelToken::new())
                .unwrap();

        let mut kept = HashSet::new();
        for t in (0..mesh.triangles.len()).filter(|&t| retained[t]) {
            for k in 0..3 {
                kept.insert(mesh.edge(t, k));
            }
        }
        let enclosed = enclosed_triangles(&mesh, &kept);

        let kept_area = (0..corners.len())
            .filter(|&t| retained[t])
            .map(|t| triangle_area(&corners[t]))
            .sum();
        let enclosed_area = (0..corners.len())
            .filter(|&t| enclosed[t])
            .map(|t| triangle_area(&corners[t]))
            .sum();
        (kept_area, enclosed_area)
    }

    #[test]
    fn test_hull_covers_every_enclosed_triangle() {
        for seed in [1u64, 42, 2024] {
            let points = scattered(3000, 50.0, [0.0, 0.0], seed);
            let hull = alpha_shape(&points, 0.3).unwrap();
            let (kept_area, enclosed_area) = kept_and_enclosed_area(&points, 0.3);

            let area = hull.geometry.area();
            assert!(area >= kept_area - 1e-6, "seed {}: {} < {}", seed, area, kept_area);
            assert_relative_eq!(area, enclosed_area, max_relative = 1e-9);
        }
    }

    #[test]
    fn test_dense_blob_is_one_polygon() {
        for offset in [[0.0, 0.0], [512_345.0, 6_712_345.0]] {
            let points = jittered_grid(40, offset);
            let hull = alpha_shape(&points, 0.3).unwrap();
            let (_, enclosed_area) = kept_and_enclosed_area(&points, 0.3);

            let HullGeometry::Polygon(polygon) = &hull.geometry else {
                panic!("expected one polygon at {:?}, got {:?}", offset, hull.geometry.polygons().len());
            };
            assert!(polygon.interiors().is_empty());
            assert_relative_eq!(polygon.unsigned_area(), enclosed_area, max_relative = 1e-6);
            assert!(polygon.unsigned_area() > 35.0 * 35.0);
        }
    }

    #[test]
    fn test_band_around_gap_traces_one_filled_outline() {
        // 7x7 grid with the central 3x3 block of points removed
        let mut points = Vec::new();
        for x in 0..=6 {
            for y in 0..=6 {
                if !((2..=4).contains(&x) && (2..=4).contains(&y)) {
                    points.push([x as f64, y as f64]);
                }
            }
        }
        let hull = alpha_shape(&points, 1.0).unwrap();
        let (kept_area, enclosed_area) = kept_and_enclosed_area(&points, 1.0);

        let HullGeometry::Polygon(polygon) = &hull.geometry else {
            panic!("expected a single polygon");
        };
        assert!(polygon.interiors().is_empty());
        assert!(kept_area < 36.0);
        assert_relative_eq!(enclosed_area, 36.0, epsilon = 1e-9);
        assert_relative_eq!(polygon.unsigned_area(), 36.0, epsilon = 1e-9);
        assert!(polygon.contains(&Point::new(3.0, 3.0)));
    }

    #[test]
    fn test_mesh_orients_triangles_counter_clockwise() {
        let positions = vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        let mesh = Mesh::from_triangles(positions, vec![Triangle { vertices: [0, 2, 1] }]);
        assert_eq!(mesh.triangles[0].vertices, [0, 1, 2]);
        assert_relative_eq!(signed_area(&mesh.triangle_coords(0)), 0.5, epsilon = 1e-12);
    }
}
