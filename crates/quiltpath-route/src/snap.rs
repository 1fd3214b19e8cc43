//! Tolerance-based vertex identity.
//!
//! Points are bucketed on a [`PointKey`] grid, but identity is decided by
//! [`Point::approx_eq`] against entries in the point's own cell and its
//! eight neighbours. Two points within tolerance always resolve to the same
//! entry, even when rounding puts them in adjacent cells.

use std::collections::HashMap;

use crate::types::{Point, PointKey};

/// Grid of canonical points, each carrying a caller-chosen id.
///
/// The first point inserted near a location becomes the canonical one;
/// later points within tolerance resolve to it.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexSnap<T> {
    tolerance: f64,
    cells: HashMap<PointKey, Vec<(T, Point)>>,
}

impl<T: Copy> VertexSnap<T> {
    /// Create an empty grid with cell size `tolerance`.
    #[must_use]
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            cells: HashMap::new(),
        }
    }

    /// Coincidence tolerance.
    #[must_use]
    pub const fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Canonical entry within tolerance of `point`, if any.
    ///
    /// The closest match wins; ties go to the first in scan order.
    #[must_use]
    pub fn find(&self, point: Point) -> Option<(T, Point)> {
        let key = PointKey::new(point, self.tolerance);
        let mut best: Option<(T, Point, f64)> = None;
        for dx in -1..=1 {
            for dy in -1..=1 {
                let Some(entries) = self.cells.get(&key.offset(dx, dy)) else {
                    continue;
                };
                for &(id, canonical) in entries {
                    if !canonical.approx_eq(point, self.tolerance) {
                        continue;
                    }
                    let d = canonical.distance_squared(point);
                    if best.is_none_or(|(_, _, b)| d < b) {
                        best = Some((id, canonical, d));
                    }
                }
            }
        }
        best.map(|(id, canonical, _)| (id, canonical))
    }

    /// Id of the entry matching `point`, inserting `make()` if none does.
    pub fn get_or_insert_with(&mut self, point: Point, make: impl FnOnce() -> T) -> T {
        if let Some((id, _)) = self.find(point) {
            return id;
        }
        let id = make();
        self.cells
            .entry(PointKey::new(point, self.tolerance))
            .or_default()
            .push((id, point));
        id
    }
}

impl VertexSnap<PointKey> {
    /// Grid key of the canonical point for `point`, registering it if new.
    pub fn canonical_key(&mut self, point: Point) -> PointKey {
        let tolerance = self.tolerance;
        self.get_or_insert_with(point, || PointKey::new(point, tolerance))
    }
}
