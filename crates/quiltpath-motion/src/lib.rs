//! quiltpath-motion: cumulative-length motion model over stitch paths.
//!
//! Turns an ordered list of [`MotionSegment`]s (typically the output of
//! `quiltpath_route::optimize_motion_segments`) into a flat sequence of
//! short straight edges with running lengths in millimetres. Preview
//! animation and export writers sample it by distance along the path.

use geo::{BoundingRect, Coord, LineString};
use quiltpath_route::{MotionSegment, NeedleState, Point};
use serde::{Deserialize, Serialize};

/// Errors from building a [`MotionPathModel`].
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
pub enum MotionError {
    /// Pixel-to-millimetre factor is zero, negative, or not finite.
    #[error("pixel to millimetre scale must be finite and positive, got {0}")]
    InvalidScale(f64),

    /// Document height is negative or not finite.
    #[error("document height must be finite and non-negative, got {0}")]
    InvalidDocumentHeight(f64),
}

/// One straight piece of the motion path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionEdge {
    /// Start position in document pixels.
    pub start: Point,
    /// End position in document pixels.
    pub end: Point,
    /// Needle state while moving along the edge.
    pub needle: NeedleState,
    /// Path length before this edge, in millimetres.
    pub start_length_mm: f64,
    /// Length of this edge, in millimetres.
    pub length_mm: f64,
}

impl MotionEdge {
    /// Path length at the end of this edge, in millimetres.
    #[must_use]
    pub fn end_length_mm(&self) -> f64 {
        self.start_length_mm + self.length_mm
    }

    /// Position at fraction `t` (0 at start, 1 at end).
    #[must_use]
    pub fn lerp(&self, t: f64) -> Point {
        Point::new(
            t.mul_add(self.end.x - self.start.x, self.start.x),
            t.mul_add(self.end.y - self.start.y, self.start.y),
        )
    }
}

/// Axis-aligned bounds in document pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    /// Smallest x.
    pub min_x: f64,
    /// Smallest y.
    pub min_y: f64,
    /// Largest x.
    pub max_x: f64,
    /// Largest y.
    pub max_y: f64,
}

impl Bounds {
    /// Horizontal extent.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Vertical extent.
    #[must_use]
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Larger of width and height.
    #[must_use]
    pub fn span(&self) -> f64 {
        self.width().max(self.height())
    }
}

impl Default for Bounds {
    /// Unit square, used when there is no geometry.
    fn default() -> Self {
        Self {
            min_x: 0.0,
            min_y: 0.0,
            max_x: 1.0,
            max_y: 1.0,
        }
    }
}

/// A motion path flattened into short edges with running lengths.
///
/// Segments with fewer than two points are dropped; travel segments are
/// kept and counted in the path length.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotionPathModel {
    segments: Vec<MotionSegment>,
    px_to_mm: f64,
    doc_height_mm: Option<f64>,
    edges: Vec<MotionEdge>,
    total_length_mm: f64,
    start_point: Option<Point>,
    end_point: Option<Point>,
    bounds: Bounds,
}

impl MotionPathModel {
    /// Edges are refined to at most `span / REFINE_DIVISIONS` pixels.
    pub const REFINE_DIVISIONS: f64 = 400.0;

    /// Lower bound on the refined edge length, in pixels.
    pub const MIN_REFINE_PX: f64 = 0.5;

    /// Slack when matching a requested length to an edge end.
    const LENGTH_EPSILON: f64 = 1e-6;

    /// Build a model from `segments`.
    ///
    /// `doc_height_px` enables the Y flip in [`to_cartesian`](Self::to_cartesian);
    /// `None` or `0` negates Y instead.
    ///
    /// # Errors
    ///
    /// Returns [`MotionError::InvalidScale`] for a non-positive or
    /// non-finite `px_to_mm` and [`MotionError::InvalidDocumentHeight`] for
    /// a negative or non-finite document height.
    pub fn new(
        segments: &[MotionSegment],
        px_to_mm: f64,
        doc_height_px: Option<f64>,
    ) -> Result<Self, MotionError> {
        if !px_to_mm.is_finite() || px_to_mm <= 0.0 {
            return Err(MotionError::InvalidScale(px_to_mm));
        }
        if let Some(h) = doc_height_px.filter(|h| !h.is_finite() || *h < 0.0) {
            return Err(MotionError::InvalidDocumentHeight(h));
        }

        let segments: Vec<MotionSegment> = segments
            .iter()
            .filter(|s| s.has_geometry())
            .cloned()
            .collect();

        let mut edges = Vec::new();
        let mut total_length_mm = 0.0;
        for segment in &segments {
            for (start, end) in segment.edges() {
                let length_mm = start.distance(end) * px_to_mm;
                edges.push(MotionEdge {
                    start,
                    end,
                    needle: segment.needle,
                    start_length_mm: total_length_mm,
                    length_mm,
                });
                total_length_mm += length_mm;
            }
        }

        let start_point = segments.first().and_then(|s| s.points.first()).copied();
        let end_point = segments.last().and_then(|s| s.points.last()).copied();
        let bounds = bounds_of(&segments);

        let mut model = Self {
            segments,
            px_to_mm,
            doc_height_mm: doc_height_px.filter(|h| *h > 0.0).map(|h| h * px_to_mm),
            edges,
            total_length_mm,
            start_point,
            end_point,
            bounds,
        };
        model.refine_edges();
        Ok(model)
    }

    /// Split long edges so animation sampling stays smooth.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn refine_edges(&mut self) {
        let span_px = self.bounds.span();
        if self.edges.is_empty() || span_px <= 0.0 {
            return;
        }
        let target_mm = (span_px / Self::REFINE_DIVISIONS).max(Self::MIN_REFINE_PX) * self.px_to_mm;

        let mut refined = Vec::with_capacity(self.edges.len());
        let mut total = 0.0;
        for edge in &self.edges {
            let pieces = (edge.length_mm / target_mm).ceil().max(1.0) as usize;
            for i in 0..pieces {
                let t0 = i as f64 / pieces as f64;
                let t1 = (i + 1) as f64 / pieces as f64;
                let length_mm = edge.length_mm * (t1 - t0);
                refined.push(MotionEdge {
                    start: edge.lerp(t0),
                    end: edge.lerp(t1),
                    needle: edge.needle,
                    start_length_mm: total,
                    length_mm,
                });
                total += length_mm;
            }
        }

        self.edges = refined;
        self.total_length_mm = total;
    }

    /// Refined edges in path order.
    #[must_use]
    pub fn edges(&self) -> &[MotionEdge] {
        &self.edges
    }

    /// Segments kept by the model (two or more points).
    #[must_use]
    pub fn segments(&self) -> &[MotionSegment] {
        &self.segments
    }

    /// Total path length in millimetres, travel included.
    #[must_use]
    pub const fn total_length_mm(&self) -> f64 {
        self.total_length_mm
    }

    /// First point of the first kept segment.
    #[must_use]
    pub const fn start_point(&self) -> Option<Point> {
        self.start_point
    }

    /// Last point of the last kept segment.
    #[must_use]
    pub const fn end_point(&self) -> Option<Point> {
        self.end_point
    }

    /// Bounds of all kept points, or the unit square if there are none.
    #[must_use]
    pub const fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Pixel-to-millimetre scale factor.
    #[must_use]
    pub const fn px_to_mm(&self) -> f64 {
        self.px_to_mm
    }

    /// Position (pixels) and needle state at `length_mm` along the path.
    ///
    /// The length is clamped to the path. An empty model reports the
    /// origin with the needle down.
    #[must_use]
    pub fn point_at(&self, length_mm: f64) -> (Point, NeedleState) {
        let Some(last) = self.edges.last() else {
            return (Point::default(), NeedleState::Down);
        };
        let clamped = length_mm.clamp(0.0, self.total_length_mm);
        let index = self
            .edges
            .partition_point(|e| e.end_length_mm() < clamped - Self::LENGTH_EPSILON);
        let Some(edge) = self.edges.get(index) else {
            return (last.end, last.needle);
        };
        if edge.length_mm <= 0.0 {
            return (edge.end, edge.needle);
        }
        let t = ((clamped - edge.start_length_mm) / edge.length_mm).clamp(0.0, 1.0);
        (edge.lerp(t), edge.needle)
    }

    /// Kept segments with coordinates converted to millimetres.
    #[must_use]
    pub fn segments_mm(&self) -> Vec<MotionSegment> {
        self.segments
            .iter()
            .map(|s| {
                MotionSegment::new(
                    s.points
                        .iter()
                        .map(|p| Point::new(p.x * self.px_to_mm, p.y * self.px_to_mm))
                        .collect(),
                    s.needle,
                )
            })
            .collect()
    }

    /// Convert document millimetres (Y down) to machine Cartesian (Y up).
    #[must_use]
    pub fn to_cartesian(&self, x_mm: f64, y_mm: f64) -> (f64, f64) {
        self.doc_height_mm
            .map_or((x_mm, -y_mm), |height| (x_mm, height - y_mm))
    }
}

fn bounds_of(segments: &[MotionSegment]) -> Bounds {
    let coords: Vec<Coord<f64>> = segments
        .iter()
        .flat_map(|s| s.points.iter().copied().map(Coord::from))
        .collect();
    LineString::new(coords)
        .bounding_rect()
        .map_or_else(Bounds::default, |rect| Bounds {
            min_x: rect.min().x,
            min_y: rect.min().y,
            max_x: rect.max().x,
            max_y: rect.max().y,
        })
}
