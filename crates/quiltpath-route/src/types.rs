//! Shared types for the quiltpath stitch route optimizer.

use serde::{Deserialize, Serialize};

/// A 2D point in document coordinates (pixels in the source drawing).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position.
    pub x: f64,
    /// Vertical position.
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    ///
    /// Avoids the square root for comparison purposes.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Whether both coordinates lie within `tolerance` of `other`'s.
    #[must_use]
    pub fn approx_eq(self, other: Self, tolerance: f64) -> bool {
        (self.x - other.x).abs() <= tolerance && (self.y - other.y).abs() <= tolerance
    }

    /// Whether both coordinates are finite.
    #[must_use]
    pub const fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<Point> for geo::Coord<f64> {
    fn from(p: Point) -> Self {
        Self { x: p.x, y: p.y }
    }
}

impl From<geo::Coord<f64>> for Point {
    fn from(c: geo::Coord<f64>) -> Self {
        Self::new(c.x, c.y)
    }
}

/// Whether the machine needle is sewing while moving along a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NeedleState {
    /// Needle down: the motion lays thread and must be covered.
    #[default]
    Down,
    /// Needle up: a repositioning travel move. Never optimized.
    Up,
}

/// A contiguous run of points sharing one needle state.
///
/// A full motion path is an ordered list of segments; the order encodes
/// stitch sequence, not geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionSegment {
    /// Ordered points of the run.
    pub points: Vec<Point>,
    /// Needle state shared by every edge of the run.
    pub needle: NeedleState,
}

impl MotionSegment {
    /// Create a segment with an explicit needle state.
    #[must_use]
    pub const fn new(points: Vec<Point>, needle: NeedleState) -> Self {
        Self { points, needle }
    }

    /// Create a needle-down (stitched) segment.
    #[must_use]
    pub const fn stitch(points: Vec<Point>) -> Self {
        Self::new(points, NeedleState::Down)
    }

    /// Create a needle-up (travel) segment.
    #[must_use]
    pub const fn travel(points: Vec<Point>) -> Self {
        Self::new(points, NeedleState::Up)
    }

    /// Returns `true` for needle-down segments.
    #[must_use]
    pub fn is_stitch(&self) -> bool {
        self.needle == NeedleState::Down
    }

    /// Returns `true` if the segment has at least one edge (>= 2 points).
    #[must_use]
    pub const fn has_geometry(&self) -> bool {
        self.points.len() >= 2
    }

    /// Returns `true` for needle-down segments that carry geometry.
    ///
    /// These are the segments the optimizer reads and replaces.
    #[must_use]
    pub fn is_stitched_run(&self) -> bool {
        self.is_stitch() && self.has_geometry()
    }

    /// Iterate consecutive point pairs.
    pub fn edges(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        self.points.windows(2).map(|w| (w[0], w[1]))
    }
}

/// Grid cell of a point.
///
/// Coordinates are divided by the coincidence tolerance and rounded to the
/// nearest grid cell. Points within tolerance of each other may still land
/// in adjacent cells; [`VertexSnap`](crate::snap::VertexSnap) resolves
/// those to one vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PointKey {
    x: i64,
    y: i64,
}

impl PointKey {
    /// Quantize `point` onto a grid with cell size `tolerance`.
    ///
    /// `tolerance` must be positive; the optimizer validates this before
    /// building any key. Out-of-range values saturate.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(point: Point, tolerance: f64) -> Self {
        Self {
            x: (point.x / tolerance).round() as i64,
            y: (point.y / tolerance).round() as i64,
        }
    }

    /// The key `dx` cells right and `dy` cells up.
    #[must_use]
    pub const fn offset(self, dx: i64, dy: i64) -> Self {
        Self {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
        }
    }
}

/// Orientation-independent identity of a straight edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeKey(PointKey, PointKey);

impl EdgeKey {
    /// Build the canonical key for the edge between `a` and `b`.
    ///
    /// Returns `None` when both endpoints quantize to the same vertex.
    #[must_use]
    pub fn new(a: Point, b: Point, tolerance: f64) -> Option<Self> {
        Self::from_keys(PointKey::new(a, tolerance), PointKey::new(b, tolerance))
    }

    /// Canonical key for the edge between two vertex keys.
    ///
    /// Returns `None` when the keys are equal.
    #[must_use]
    pub fn from_keys(ka: PointKey, kb: PointKey) -> Option<Self> {
        match ka.cmp(&kb) {
            std::cmp::Ordering::Less => Some(Self(ka, kb)),
            std::cmp::Ordering::Greater => Some(Self(kb, ka)),
            std::cmp::Ordering::Equal => None,
        }
    }
}

/// Configuration for the stitch route optimizer.
///
/// Fields are public; [`validate`](Self::validate) checks the invariants
/// and the optimizer refuses (falls back on) configurations that fail it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Absolute coincidence tolerance in document units.
    ///
    /// Doubles as the quantization grid for vertex identity.
    pub tolerance: f64,

    /// Largest required-parity set solved by exact bitmask matching.
    ///
    /// The DP table has `2^m` entries, so this is capped at
    /// [`MAX_EXACT_MATCHING_LIMIT`](Self::MAX_EXACT_MATCHING_LIMIT).
    pub exact_matching_limit: usize,

    /// Largest required-parity set handled at all.
    ///
    /// Sets above `exact_matching_limit` and up to this limit are paired
    /// greedily; larger sets abort to the original path.
    pub greedy_matching_limit: usize,
}

impl OptimizerConfig {
    /// Default coincidence tolerance.
    pub const DEFAULT_TOLERANCE: f64 = 1e-6;

    /// Default ceiling for exact minimum-weight matching.
    pub const DEFAULT_EXACT_MATCHING_LIMIT: usize = 16;

    /// Default ceiling for greedy matching.
    pub const DEFAULT_GREEDY_MATCHING_LIMIT: usize = 24;

    /// Hard cap on `exact_matching_limit` (2^20 DP states).
    pub const MAX_EXACT_MATCHING_LIMIT: usize = 20;

    /// Check the configuration invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidTolerance`] if `tolerance` is not a
    /// finite positive number, [`ConfigError::ExactLimitTooLarge`] if
    /// `exact_matching_limit` exceeds [`Self::MAX_EXACT_MATCHING_LIMIT`],
    /// and [`ConfigError::LimitsOutOfOrder`] if the exact limit is above
    /// the greedy limit.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(ConfigError::InvalidTolerance(self.tolerance));
        }
        if self.exact_matching_limit > Self::MAX_EXACT_MATCHING_LIMIT {
            return Err(ConfigError::ExactLimitTooLarge {
                limit: self.exact_matching_limit,
                max: Self::MAX_EXACT_MATCHING_LIMIT,
            });
        }
        if self.exact_matching_limit > self.greedy_matching_limit {
            return Err(ConfigError::LimitsOutOfOrder {
                exact: self.exact_matching_limit,
                greedy: self.greedy_matching_limit,
            });
        }
        Ok(())
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            tolerance: Self::DEFAULT_TOLERANCE,
            exact_matching_limit: Self::DEFAULT_EXACT_MATCHING_LIMIT,
            greedy_matching_limit: Self::DEFAULT_GREEDY_MATCHING_LIMIT,
        }
    }
}

/// Invalid [`OptimizerConfig`] values.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
pub enum ConfigError {
    /// Tolerance is zero, negative, or not finite.
    #[error("tolerance must be finite and positive, got {0}")]
    InvalidTolerance(f64),

    /// Exact matching limit would allocate an oversized DP table.
    #[error("exact matching limit {limit} exceeds maximum {max}")]
    ExactLimitTooLarge {
        /// Requested limit.
        limit: usize,
        /// Supported maximum.
        max: usize,
    },

    /// Exact matching limit is above the greedy matching limit.
    #[error("exact matching limit {exact} exceeds greedy matching limit {greedy}")]
    LimitsOutOfOrder {
        /// Requested exact limit.
        exact: usize,
        /// Requested greedy limit.
        greedy: usize,
    },
}

/// Why the optimizer returned its input unchanged.
///
/// None of these are surfaced as errors to the caller; they travel inside
/// [`Optimization::Unchanged`] so callers and diagnostics can see the cause.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
pub enum Fallback {
    /// The configuration failed validation.
    #[error("invalid optimizer configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// No needle-down segment with at least two points.
    #[error("no stitched segments to optimize")]
    NoStitches,

    /// Every stitched edge is degenerate.
    #[error("stitched segments carry no non-degenerate geometry")]
    NoGeometry,

    /// A stitched point or endpoint hint is NaN or infinite.
    #[error("stitched geometry contains non-finite coordinates")]
    NonFiniteInput,

    /// The stitched graph has more than one connected component.
    #[error("stitched graph is disconnected ({reached} of {used} vertices reachable)")]
    Disconnected {
        /// Vertices reached from the traversal root.
        reached: usize,
        /// Vertices touched by at least one edge.
        used: usize,
    },

    /// Neither the hint nor the default endpoint maps to a graph vertex.
    #[error("start or end point does not lie on the stitched graph")]
    EndpointNotInGraph,

    /// The required-parity set has odd cardinality.
    #[error("required-parity vertex set has odd size {0}")]
    OddParitySet(usize),

    /// Too many vertices need parity fixing.
    #[error("{required} vertices need parity fixing, above the limit of {limit}")]
    MatchingCeilingExceeded {
        /// Size of the required-parity set.
        required: usize,
        /// Configured greedy matching limit.
        limit: usize,
    },

    /// No complete pairing with reachable shortest paths exists.
    #[error("no perfect matching of required-parity vertices is reachable")]
    UnreachablePair,

    /// Hierholzer's walk did not consume every multigraph edge.
    #[error("eulerian trail used {used} of {total} edges")]
    IncompleteTrail {
        /// Edges consumed by the walk.
        used: usize,
        /// Edges in the multigraph.
        total: usize,
    },

    /// The trail does not start and end at the required vertices.
    #[error("eulerian trail does not start and end at the required vertices")]
    TrailEndpointMismatch,

    /// Fewer than two distinct points remain after collapsing the trail.
    #[error("optimized trail collapsed to fewer than two points")]
    DegenerateTrail,

    /// The candidate drops stitched geometry present in the original.
    #[error("optimized path loses {missing} stitched edges")]
    CoverageLost {
        /// Number of original edges missing from the candidate.
        missing: usize,
    },

    /// The candidate does not reduce retraced length.
    #[error("no overlap reduction (original {original:.6}, candidate {candidate:.6})")]
    NoImprovement {
        /// Overlap length of the input.
        original: f64,
        /// Overlap length of the rejected candidate.
        candidate: f64,
    },
}

/// Outcome of one optimization request.
///
/// Replaces reference-identity signalling: callers match on the variant
/// instead of comparing the returned list with the input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Optimization {
    /// The input is returned as-is; the payload says why.
    Unchanged(Fallback),
    /// A verified improvement replacing the stitched runs.
    Optimized(Vec<MotionSegment>),
}

impl Optimization {
    /// Returns `true` if a new segment list was produced.
    #[must_use]
    pub const fn is_optimized(&self) -> bool {
        matches!(self, Self::Optimized(_))
    }

    /// The fallback reason, if the input was left unchanged.
    #[must_use]
    pub const fn fallback(&self) -> Option<&Fallback> {
        match self {
            Self::Unchanged(reason) => Some(reason),
            Self::Optimized(_) => None,
        }
    }

    /// The segments to use: the optimized list, or `original`.
    #[must_use]
    pub fn segments_or<'a>(&'a self, original: &'a [MotionSegment]) -> &'a [MotionSegment] {
        match self {
            Self::Unchanged(_) => original,
            Self::Optimized(segments) => segments,
        }
    }

    /// Owned variant of [`segments_or`](Self::segments_or).
    #[must_use]
    pub fn into_segments(self, original: &[MotionSegment]) -> Vec<MotionSegment> {
        match self {
            Self::Unchanged(_) => original.to_vec(),
            Self::Optimized(segments) => segments,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // --- Point tests ---

    #[test]
    fn point_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert!((a.distance(b) - 5.0).abs() < f64::EPSILON);
        assert!((a.distance_squared(b) - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn point_approx_eq_is_per_axis() {
        let a = Point::new(1.0, 1.0);
        assert!(a.approx_eq(Point::new(1.0 + 5e-7, 1.0 - 5e-7), 1e-6));
        assert!(!a.approx_eq(Point::new(1.0 + 2e-6, 1.0), 1e-6));
    }

    #[test]
    fn point_finiteness() {
        assert!(Point::new(1.0, -2.0).is_finite());
        assert!(!Point::new(f64::NAN, 0.0).is_finite());
        assert!(!Point::new(0.0, f64::INFINITY).is_finite());
    }

    #[test]
    fn point_coord_conversion() {
        let p = Point::new(3.5, 2.5);
        let c: geo::Coord<f64> = p.into();
        assert_eq!(Point::from(c), p);
    }

    // --- MotionSegment tests ---

    #[test]
    fn segment_constructors_set_needle_state() {
        assert!(MotionSegment::stitch(vec![]).is_stitch());
        assert!(!MotionSegment::travel(vec![]).is_stitch());
        assert_eq!(NeedleState::default(), NeedleState::Down);
    }

    #[test]
    fn segment_geometry_requires_two_points() {
        let single = MotionSegment::stitch(vec![Point::new(0.0, 0.0)]);
        assert!(!single.has_geometry());
        assert!(!single.is_stitched_run());

        let pair = MotionSegment::stitch(vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0)]);
        assert!(pair.is_stitched_run());

        let travel = MotionSegment::travel(vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0)]);
        assert!(!travel.is_stitched_run());
    }

    #[test]
    fn segment_edges_are_consecutive_pairs() {
        let seg = MotionSegment::stitch(vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(1.0, 1.0),
        ]);
        let edges: Vec<_> = seg.edges().collect();
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[1], (Point::new(1.0, 0.0), Point::new(1.0, 1.0)));
    }

    // --- Key tests ---

    #[test]
    fn point_key_merges_points_within_half_a_cell() {
        let a = PointKey::new(Point::new(10.0, 5.0), 1e-6);
        let b = PointKey::new(Point::new(10.0 + 3e-7, 5.0 - 3e-7), 1e-6);
        let c = PointKey::new(Point::new(10.0 + 3e-6, 5.0), 1e-6);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn edge_key_is_orientation_independent() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(10.0, 0.0);
        assert_eq!(EdgeKey::new(a, b, 1e-6), EdgeKey::new(b, a, 1e-6));
    }

    #[test]
    fn edge_key_rejects_self_loops() {
        let a = Point::new(2.0, 2.0);
        assert!(EdgeKey::new(a, Point::new(2.0 + 1e-8, 2.0), 1e-6).is_none());
    }

    // --- OptimizerConfig tests ---

    #[test]
    fn config_defaults() {
        let config = OptimizerConfig::default();
        assert!((config.tolerance - 1e-6).abs() < f64::EPSILON);
        assert_eq!(config.exact_matching_limit, 16);
        assert_eq!(config.greedy_matching_limit, 24);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_rejects_bad_tolerance() {
        for tolerance in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let config = OptimizerConfig {
                tolerance,
                ..OptimizerConfig::default()
            };
            assert!(matches!(
                config.validate(),
                Err(ConfigError::InvalidTolerance(_))
            ));
        }
    }

    #[test]
    fn config_rejects_oversized_exact_limit() {
        let config = OptimizerConfig {
            exact_matching_limit: 30,
            greedy_matching_limit: 40,
            ..OptimizerConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ExactLimitTooLarge { limit: 30, max: 20 })
        );
    }

    #[test]
    fn config_rejects_limits_out_of_order() {
        let config = OptimizerConfig {
            exact_matching_limit: 12,
            greedy_matching_limit: 8,
            ..OptimizerConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::LimitsOutOfOrder {
                exact: 12,
                greedy: 8
            })
        );
    }

    // --- Error display tests ---

    #[test]
    fn fallback_display() {
        assert_eq!(
            Fallback::MatchingCeilingExceeded {
                required: 30,
                limit: 24
            }
            .to_string(),
            "30 vertices need parity fixing, above the limit of 24",
        );
        assert_eq!(
            Fallback::from(ConfigError::InvalidTolerance(0.0)).to_string(),
            "invalid optimizer configuration: tolerance must be finite and positive, got 0",
        );
    }

    // --- Optimization tests ---

    #[test]
    fn optimization_segments_or_picks_original_when_unchanged() {
        let original = vec![MotionSegment::stitch(vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
        ])];
        let unchanged = Optimization::Unchanged(Fallback::NoStitches);
        assert!(!unchanged.is_optimized());
        assert_eq!(unchanged.fallback(), Some(&Fallback::NoStitches));
        assert_eq!(unchanged.segments_or(&original), original.as_slice());
        assert_eq!(unchanged.into_segments(&original), original);
    }

    #[test]
    fn optimization_segments_or_picks_replacement_when_optimized() {
        let original = vec![MotionSegment::travel(vec![Point::new(0.0, 0.0)])];
        let replacement = vec![MotionSegment::stitch(vec![
            Point::new(0.0, 0.0),
            Point::new(2.0, 0.0),
        ])];
        let optimized = Optimization::Optimized(replacement.clone());
        assert!(optimized.is_optimized());
        assert!(optimized.fallback().is_none());
        assert_eq!(optimized.segments_or(&original), replacement.as_slice());
    }

    // --- Serde round-trip tests ---

    #[test]
    fn config_serde_round_trip() {
        let config = OptimizerConfig {
            tolerance: 1e-4,
            exact_matching_limit: 10,
            greedy_matching_limit: 20,
        };
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: OptimizerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn optimization_serde_round_trip() {
        let result = Optimization::Unchanged(Fallback::Disconnected {
            reached: 2,
            used: 4,
        });
        let json = serde_json::to_string(&result).unwrap();
        let deserialized: Optimization = serde_json::from_str(&json).unwrap();
        assert_eq!(result, deserialized);
    }

    #[test]
    fn segment_serde_round_trip() {
        let seg = MotionSegment::travel(vec![Point::new(1.5, 2.5), Point::new(3.0, 0.0)]);
        let json = serde_json::to_string(&seg).unwrap();
        let deserialized: MotionSegment = serde_json::from_str(&json).unwrap();
        assert_eq!(seg, deserialized);
    }
}
