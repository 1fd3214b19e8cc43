//! Geometry splitting: discover implicit junctions between stitched edges.
//!
//! A quilting design drawn as a handful of polylines usually crosses
//! itself. Those crossings are places where the machine could change
//! course, but they only exist as vertices once every straight edge has
//! been cut at every point where another edge meets it.
//!
//! Candidate pairs are pruned with an R\*-tree over (slightly inflated)
//! edge bounding boxes, then each surviving pair is tested exactly:
//!
//! - collinear / touching contacts report the endpoint that lies on the
//!   other edge (orientation + containment test);
//! - proper crossings solve the two-line system and accept the solution
//!   when both edge parameters lie in `[0, 1]` within [`GEOMETRY_EPSILON`].
//!
//! Each edge is then cut at the contact points strictly inside it, in
//! order of projection along the edge.

use geo::{Coord, Line};
use rstar::{AABB, RTree, RTreeObject};

use crate::types::{Fallback, MotionSegment, Point};

/// Absolute epsilon for orientation, containment, and degeneracy tests.
pub const GEOMETRY_EPSILON: f64 = 1e-9;

/// Below this the two edges are treated as parallel.
const PARALLEL_EPSILON: f64 = 1e-12;

/// A raw edge tagged with its position in the input list.
struct IndexedEdge {
    index: usize,
    line: Line<f64>,
}

impl RTreeObject for IndexedEdge {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.line.start.x, self.line.start.y],
            [self.line.end.x, self.line.end.y],
        )
    }
}

/// Output of [`split_stitched_geometry`].
#[derive(Debug, Clone, PartialEq)]
pub struct SplitGeometry {
    /// Number of non-degenerate raw edges read from the stitched runs.
    pub raw_edge_count: usize,
    /// Number of contact points found across all edge pairs.
    pub intersection_count: usize,
    /// Straight sub-edges, grouped by raw edge and ordered along it.
    pub edges: Vec<Line<f64>>,
}

/// Collect the non-degenerate straight edges of every stitched run.
///
/// Travel segments and segments with fewer than two points contribute
/// nothing; zero-length edges are skipped.
#[must_use]
pub fn raw_stitch_edges(segments: &[MotionSegment]) -> Vec<Line<f64>> {
    segments
        .iter()
        .filter(|s| s.is_stitched_run())
        .flat_map(MotionSegment::edges)
        .filter(|(a, b)| !a.approx_eq(*b, GEOMETRY_EPSILON))
        .map(|(a, b)| Line::new(Coord::from(a), Coord::from(b)))
        .collect()
}

/// Split the stitched runs of `segments` at every mutual contact point.
///
/// # Errors
///
/// Returns [`Fallback::NoGeometry`] if no stitched run has a
/// non-degenerate edge.
pub fn split_stitched_geometry(
    segments: &[MotionSegment],
    tolerance: f64,
) -> Result<SplitGeometry, Fallback> {
    let raw = raw_stitch_edges(segments);
    if raw.is_empty() {
        return Err(Fallback::NoGeometry);
    }
    Ok(split_edges(&raw, tolerance))
}

/// Cut each edge in `raw` at the contact points it shares with the others.
///
/// Contact points within `tolerance` of an edge's own endpoints do not cut
/// that edge.
#[must_use]
pub fn split_edges(raw: &[Line<f64>], tolerance: f64) -> SplitGeometry {
    let tree = RTree::bulk_load(
        raw.iter()
            .enumerate()
            .map(|(index, &line)| IndexedEdge { index, line })
            .collect(),
    );

    let mut cuts: Vec<Vec<Coord<f64>>> = vec![Vec::new(); raw.len()];
    let mut intersection_count = 0;

    for (i, &line) in raw.iter().enumerate() {
        let search = inflated_envelope(line, GEOMETRY_EPSILON);
        for candidate in tree.locate_in_envelope_intersecting(&search) {
            // Each unordered pair is tested once.
            if candidate.index <= i {
                continue;
            }
            for hit in segment_intersections(line, candidate.line) {
                intersection_count += 1;
                cuts[i].push(hit);
                cuts[candidate.index].push(hit);
            }
        }
    }

    let mut edges = Vec::with_capacity(raw.len());
    for (&line, edge_cuts) in raw.iter().zip(cuts) {
        subdivide(line, edge_cuts, tolerance, &mut edges);
    }

    SplitGeometry {
        raw_edge_count: raw.len(),
        intersection_count,
        edges,
    }
}

/// Bounding box of `line` grown by `margin` on every side.
fn inflated_envelope(line: Line<f64>, margin: f64) -> AABB<[f64; 2]> {
    AABB::from_corners(
        [
            line.start.x.min(line.end.x) - margin,
            line.start.y.min(line.end.y) - margin,
        ],
        [
            line.start.x.max(line.end.x) + margin,
            line.start.y.max(line.end.y) + margin,
        ],
    )
}

/// Signed doubled area of the triangle `p, q, r`.
fn orient(p: Coord<f64>, q: Coord<f64>, r: Coord<f64>) -> f64 {
    (q.x - p.x).mul_add(r.y - p.y, -((q.y - p.y) * (r.x - p.x)))
}

/// Whether `q` lies inside the bounding box of `p`–`r` (within epsilon).
fn within_box(p: Coord<f64>, q: Coord<f64>, r: Coord<f64>) -> bool {
    p.x.min(r.x) - GEOMETRY_EPSILON <= q.x
        && q.x <= p.x.max(r.x) + GEOMETRY_EPSILON
        && p.y.min(r.y) - GEOMETRY_EPSILON <= q.y
        && q.y <= p.y.max(r.y) + GEOMETRY_EPSILON
}

fn coords_close(a: Coord<f64>, b: Coord<f64>, tolerance: f64) -> bool {
    Point::from(a).approx_eq(Point::from(b), tolerance)
}

/// Contact points between the closed segments `ab` and `cd`.
///
/// Returns zero, one, or (for collinear overlaps) up to four distinct
/// points.
#[must_use]
pub fn segment_intersections(ab: Line<f64>, cd: Line<f64>) -> Vec<Coord<f64>> {
    let (a, b) = (ab.start, ab.end);
    let (c, d) = (cd.start, cd.end);

    let o1 = orient(a, b, c);
    let o2 = orient(a, b, d);
    let o3 = orient(c, d, a);
    let o4 = orient(c, d, b);

    let mut points = Vec::new();

    // Touching and collinear contacts: an endpoint on the other segment.
    if o1.abs() <= GEOMETRY_EPSILON && within_box(a, c, b) {
        points.push(c);
    }
    if o2.abs() <= GEOMETRY_EPSILON && within_box(a, d, b) {
        points.push(d);
    }
    if o3.abs() <= GEOMETRY_EPSILON && within_box(c, a, d) {
        points.push(a);
    }
    if o4.abs() <= GEOMETRY_EPSILON && within_box(c, b, d) {
        points.push(b);
    }

    // General position: solve for the edge parameters.
    let denom = (a.x - b.x).mul_add(c.y - d.y, -((a.y - b.y) * (c.x - d.x)));
    if denom.abs() > PARALLEL_EPSILON {
        let t = (a.x - c.x).mul_add(c.y - d.y, -((a.y - c.y) * (c.x - d.x))) / denom;
        let u = (a.x - c.x).mul_add(a.y - b.y, -((a.y - c.y) * (a.x - b.x))) / denom;
        let range = -GEOMETRY_EPSILON..=1.0 + GEOMETRY_EPSILON;
        if range.contains(&t) && range.contains(&u) {
            points.push(Coord {
                x: t.mul_add(b.x - a.x, a.x),
                y: t.mul_add(b.y - a.y, a.y),
            });
        }
    }

    let mut unique: Vec<Coord<f64>> = Vec::with_capacity(points.len());
    for p in points {
        if !unique.iter().any(|q| coords_close(p, *q, GEOMETRY_EPSILON)) {
            unique.push(p);
        }
    }
    unique
}

/// Append the sub-edges of `line` cut at `cuts` to `out`.
fn subdivide(line: Line<f64>, cuts: Vec<Coord<f64>>, tolerance: f64, out: &mut Vec<Line<f64>>) {
    let (a, b) = (line.start, line.end);
    let delta = line.delta();
    let length_sq = delta.x.mul_add(delta.x, delta.y * delta.y);

    let mut interior: Vec<(f64, Coord<f64>)> = cuts
        .into_iter()
        .filter(|&c| !coords_close(c, a, tolerance) && !coords_close(c, b, tolerance))
        .map(|c| {
            let t = (c.x - a.x).mul_add(delta.x, (c.y - a.y) * delta.y) / length_sq;
            (t, c)
        })
        .collect();
    interior.sort_by(|x, y| x.0.total_cmp(&y.0));

    let mut prev = a;
    for (_, c) in interior {
        if coords_close(prev, c, tolerance) {
            continue;
        }
        out.push(Line::new(prev, c));
        prev = c;
    }
    out.push(Line::new(prev, b));
}
