//! Candidate assembly and the safety gate.
//!
//! The trail is turned back into one stitched segment and spliced into
//! the original list. Before it is accepted, both lists are tallied per
//! geometric edge (after splitting, so keys line up): the candidate must
//! still cover every original edge and must retrace strictly less.

use std::collections::BTreeMap;

use petgraph::graph::NodeIndex;

use crate::graph::StitchGraph;
use crate::split::{SplitGeometry, split_stitched_geometry};
use crate::snap::VertexSnap;
use crate::types::{EdgeKey, Fallback, MotionSegment, Point, PointKey};

// ---------------------------------------------------------------------------
// Candidate assembly
// ---------------------------------------------------------------------------

/// Vertex positions along `trail` with near-duplicate neighbours collapsed.
///
/// # Errors
///
/// Returns [`Fallback::DegenerateTrail`] if fewer than two points remain.
pub fn emit_points(
    graph: &StitchGraph,
    trail: &[NodeIndex],
    tolerance: f64,
) -> Result<Vec<Point>, Fallback> {
    let mut points: Vec<Point> = Vec::with_capacity(trail.len());
    for &node in trail {
        let p = graph.point(node);
        if points.last().is_some_and(|last| last.approx_eq(p, tolerance)) {
            continue;
        }
        points.push(p);
    }
    if points.len() < 2 {
        return Err(Fallback::DegenerateTrail);
    }
    Ok(points)
}

/// Replace the stitched runs of `original` with `replacement`.
///
/// `replacement` takes the slot of the first stitched run; later stitched
/// runs are dropped. Travel segments and point-only stitches keep their
/// relative order.
#[must_use]
pub fn splice(original: &[MotionSegment], replacement: MotionSegment) -> Vec<MotionSegment> {
    let mut replacement = Some(replacement);
    let mut spliced = Vec::with_capacity(original.len());
    for segment in original {
        if segment.is_stitched_run() {
            if let Some(r) = replacement.take() {
                spliced.push(r);
            }
        } else {
            spliced.push(segment.clone());
        }
    }
    spliced
}

// ---------------------------------------------------------------------------
// Edge tallies
// ---------------------------------------------------------------------------

/// Traversal count and length of one geometric edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeUse {
    /// Number of times the edge is stitched.
    pub count: usize,
    /// Length of the first sub-edge seen for this key.
    pub length: f64,
}

/// Per-edge multiplicity of a stitched path, keyed orientation-free.
///
/// Edge keys are built from canonical vertices, so endpoints within the
/// tolerance of each other count as the same edge. Edges are kept in key
/// order, so sums over them are reproducible.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeTally {
    vertices: VertexSnap<PointKey>,
    edges: BTreeMap<EdgeKey, EdgeUse>,
}

impl EdgeTally {
    /// An empty tally with its own vertex identity.
    #[must_use]
    pub fn new(tolerance: f64) -> Self {
        Self {
            vertices: VertexSnap::new(tolerance),
            edges: BTreeMap::new(),
        }
    }

    /// Tally already-split sub-edges.
    #[must_use]
    pub fn from_split(split: &SplitGeometry, tolerance: f64) -> Self {
        let mut tally = Self::new(tolerance);
        tally.record(split);
        tally
    }

    /// Split and tally the stitched runs of `segments`.
    ///
    /// Segments without stitched geometry give an empty tally.
    #[must_use]
    pub fn from_segments(segments: &[MotionSegment], tolerance: f64) -> Self {
        Self::new(tolerance).tally(segments)
    }

    /// Tally `segments` against this tally's vertices.
    ///
    /// Points within tolerance of a vertex seen here reuse its key, so the
    /// result compares edge for edge with `self`.
    #[must_use]
    pub fn tally(&self, segments: &[MotionSegment]) -> Self {
        let mut tally = Self {
            vertices: self.vertices.clone(),
            edges: BTreeMap::new(),
        };
        if let Ok(split) = split_stitched_geometry(segments, self.vertices.tolerance()) {
            tally.record(&split);
        }
        tally
    }

    fn record(&mut self, split: &SplitGeometry) {
        for line in &split.edges {
            let a = Point::from(line.start);
            let b = Point::from(line.end);
            let ka = self.vertices.canonical_key(a);
            let kb = self.vertices.canonical_key(b);
            let Some(key) = EdgeKey::from_keys(ka, kb) else {
                continue;
            };
            self.edges
                .entry(key)
                .and_modify(|e| e.count += 1)
                .or_insert(EdgeUse {
                    count: 1,
                    length: a.distance(b),
                });
        }
    }

    /// Number of distinct geometric edges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Returns `true` if no edge was tallied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Traversal count of `key` (zero if absent).
    #[must_use]
    pub fn count(&self, key: &EdgeKey) -> usize {
        self.edges.get(key).map_or(0, |e| e.count)
    }

    /// Edges of `required` that this tally never traverses.
    #[must_use]
    pub fn missing_from(&self, required: &Self) -> usize {
        required
            .edges
            .keys()
            .filter(|key| self.count(key) == 0)
            .count()
    }

    /// Retraced length relative to `baseline`.
    ///
    /// Each edge in `baseline` is allowed one traversal; every further
    /// traversal (and every traversal of an edge `baseline` lacks) counts
    /// its full length.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn overlap_length(&self, baseline: &Self) -> f64 {
        self.edges
            .iter()
            .map(|(key, edge)| {
                let allowed = usize::from(baseline.edges.contains_key(key));
                edge.count.saturating_sub(allowed) as f64 * edge.length
            })
            .sum()
    }
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

/// Overlap figures of an accepted candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    /// Distinct geometric edges the candidate had to cover.
    pub required_edges: usize,
    /// Retraced length of the input.
    pub original_overlap: f64,
    /// Retraced length of the candidate.
    pub candidate_overlap: f64,
}

/// Accept `candidate` only if it covers and strictly improves on `original`.
///
/// # Errors
///
/// Returns [`Fallback::CoverageLost`] if an original edge is missing and
/// [`Fallback::NoImprovement`] unless the candidate's overlap is below the
/// original's by more than `tolerance`.
pub fn verify(
    original: &EdgeTally,
    candidate: &[MotionSegment],
    tolerance: f64,
) -> Result<Verdict, Fallback> {
    let tally = original.tally(candidate);

    let missing = tally.missing_from(original);
    if missing > 0 {
        return Err(Fallback::CoverageLost { missing });
    }

    let original_overlap = original.overlap_length(original);
    let candidate_overlap = tally.overlap_length(original);
    if candidate_overlap + tolerance >= original_overlap {
        return Err(Fallback::NoImprovement {
            original: original_overlap,
            candidate: candidate_overlap,
        });
    }

    Ok(Verdict {
        required_edges: original.len(),
        original_overlap,
        candidate_overlap,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use geo::{Coord, Line};

    const TOL: f64 = 1e-6;

    fn p(x: f64, y: f64) -> Point {
        Point::new(x, y)
    }

    fn stitch(points: &[(f64, f64)]) -> MotionSegment {
        MotionSegment::stitch(points.iter().map(|&(x, y)| p(x, y)).collect())
    }

    fn travel(points: &[(f64, f64)]) -> MotionSegment {
        MotionSegment::travel(points.iter().map(|&(x, y)| p(x, y)).collect())
    }

    #[test]
    fn emit_collapses_coincident_neighbours() {
        let mut g = StitchGraph::new(TOL);
        let a = g.vertex_for(p(0.0, 0.0));
        let b = g.vertex_for(p(5.0, 0.0));
        let points = emit_points(&g, &[a, a, b, b, a], TOL).unwrap();
        assert_eq!(points, vec![p(0.0, 0.0), p(5.0, 0.0), p(0.0, 0.0)]);
    }

    #[test]
    fn emit_rejects_single_point_trails() {
        let mut g = StitchGraph::new(TOL);
        let a = g.vertex_for(p(1.0, 1.0));
        assert_eq!(emit_points(&g, &[a, a], TOL), Err(Fallback::DegenerateTrail));
        assert_eq!(emit_points(&g, &[], TOL), Err(Fallback::DegenerateTrail));
    }

    #[test]
    fn splice_keeps_travel_in_place() {
        let original = vec![
            travel(&[(-5.0, 0.0), (0.0, 0.0)]),
            stitch(&[(0.0, 0.0), (1.0, 0.0)]),
            travel(&[(1.0, 0.0), (3.0, 0.0)]),
            stitch(&[(3.0, 0.0), (4.0, 0.0)]),
            stitch(&[(9.0, 9.0)]),
        ];
        let replacement = stitch(&[(0.0, 0.0), (4.0, 0.0)]);
        let spliced = splice(&original, replacement.clone());
        assert_eq!(
            spliced,
            vec![
                original[0].clone(),
                replacement,
                original[2].clone(),
                original[4].clone(),
            ]
        );
    }

    #[test]
    fn tally_counts_retraced_edges() {
        let segments = vec![stitch(&[(0.0, 0.0), (10.0, 0.0), (0.0, 0.0), (10.0, 0.0)])];
        let tally = EdgeTally::from_segments(&segments, TOL);
        assert_eq!(tally.len(), 1);
        let key = EdgeKey::new(p(0.0, 0.0), p(10.0, 0.0), TOL).unwrap();
        assert_eq!(tally.count(&key), 3);
        assert!((tally.overlap_length(&tally) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn tally_ignores_travel() {
        let segments = vec![
            stitch(&[(0.0, 0.0), (10.0, 0.0)]),
            travel(&[(10.0, 0.0), (0.0, 0.0)]),
        ];
        let tally = EdgeTally::from_segments(&segments, TOL);
        assert!(tally.overlap_length(&tally).abs() < 1e-12);
        assert!(EdgeTally::from_segments(&segments[1..], TOL).is_empty());
    }

    #[test]
    fn tally_keys_split_geometry() {
        // An X: each stroke is tallied as two half edges.
        let split = crate::split::split_edges(
            &[
                Line::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 2.0, y: 2.0 }),
                Line::new(Coord { x: 0.0, y: 2.0 }, Coord { x: 2.0, y: 0.0 }),
            ],
            TOL,
        );
        assert_eq!(EdgeTally::from_split(&split, TOL).len(), 4);
    }

    #[test]
    fn tally_against_original_merges_straddling_endpoints() {
        // 10.0000004 and 10.0000006 quantize to neighbouring cells.
        let original = EdgeTally::from_segments(
            &[stitch(&[(0.0, 0.0), (10.000_000_4, 0.0), (0.0, 0.0)])],
            TOL,
        );
        let candidate = original.tally(&[stitch(&[(10.000_000_6, 0.0), (0.0, 0.0)])]);
        assert_eq!(candidate.missing_from(&original), 0);
        assert!(candidate.overlap_length(&original).abs() < 1e-12);
    }

    #[test]
    fn overlap_sum_is_reproducible() {
        let original = EdgeTally::from_segments(
            &[
                stitch(&[(4.0, 3.0), (1.0, 4.0), (3.0, 3.0)]),
                travel(&[(3.0, 3.0), (2.0, 4.0)]),
                stitch(&[(3.0, 0.0), (1.0, 0.0), (3.0, 4.0), (2.0, 4.0)]),
            ],
            TOL,
        );
        let retraced = [stitch(&[
            (2.0, 4.0),
            (3.0, 4.0),
            (1.0, 0.0),
            (3.0, 0.0),
            (1.0, 0.0),
            (3.0, 4.0),
            (1.0, 4.0),
            (4.0, 3.0),
            (1.0, 4.0),
            (3.0, 3.0),
        ])];
        let first = original.tally(&retraced).overlap_length(&original);
        assert!(first > 0.0);
        for _ in 0..50 {
            let again = original.tally(&retraced).overlap_length(&original);
            assert_eq!(again.to_bits(), first.to_bits());
        }
    }

    #[test]
    fn unknown_edges_count_in_full() {
        let original = EdgeTally::from_segments(&[stitch(&[(0.0, 0.0), (1.0, 0.0)])], TOL);
        let other = EdgeTally::from_segments(&[stitch(&[(0.0, 0.0), (0.0, 3.0)])], TOL);
        assert!((other.overlap_length(&original) - 3.0).abs() < 1e-12);
        assert_eq!(other.missing_from(&original), 1);
    }

    #[test]
    fn verify_accepts_a_shorter_retrace() {
        let original = EdgeTally::from_segments(
            &[stitch(&[(0.0, 0.0), (10.0, 0.0), (0.0, 0.0), (10.0, 0.0), (0.0, 0.0)])],
            TOL,
        );
        let candidate = vec![stitch(&[(0.0, 0.0), (10.0, 0.0), (0.0, 0.0)])];
        let verdict = verify(&original, &candidate, TOL).unwrap();
        assert_eq!(verdict.required_edges, 1);
        assert!((verdict.original_overlap - 30.0).abs() < 1e-9);
        assert!((verdict.candidate_overlap - 10.0).abs() < 1e-9);
    }

    #[test]
    fn verify_rejects_lost_coverage() {
        let original = EdgeTally::from_segments(&[stitch(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)])], TOL);
        let candidate = vec![stitch(&[(0.0, 0.0), (1.0, 0.0)])];
        assert_eq!(
            verify(&original, &candidate, TOL),
            Err(Fallback::CoverageLost { missing: 1 })
        );
    }

    #[test]
    fn verify_rejects_equal_overlap() {
        let segments = vec![stitch(&[(0.0, 0.0), (10.0, 0.0), (0.0, 0.0)])];
        let original = EdgeTally::from_segments(&segments, TOL);
        assert!(matches!(
            verify(&original, &segments, TOL),
            Err(Fallback::NoImprovement { .. })
        ));
    }
}
