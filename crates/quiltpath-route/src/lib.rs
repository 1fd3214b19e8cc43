//! quiltpath-route: retrace-minimizing stitch path optimizer (sans-IO).
//!
//! Machine-quilting designs are sewn as one continuous line, so any part
//! of the drawing that is traced twice shows up as a visible double
//! stitch. Given the flattened motion path of a design, this crate finds
//! an ordering of the stitched geometry that covers every line at least
//! once, starts and ends where the caller needs it to, and retraces as
//! little as possible:
//!
//! split at crossings -> dedup graph -> parity analysis ->
//! shortest-path matching -> Eulerian trail -> coverage/overlap gate.
//!
//! The optimizer never fails loudly. Anything it cannot do safely yields
//! [`Optimization::Unchanged`] with a [`Fallback`] reason, and the caller
//! keeps sewing the original path.

pub mod diagnostics;
pub mod euler;
pub mod graph;
pub mod matching;
pub mod optimize;
pub mod parity;
pub mod snap;
pub mod split;
pub mod types;
pub mod validate;

pub use diagnostics::OptimizeDiagnostics;
pub use matching::MatchingStrategy;
pub use optimize::{optimize_motion_segments, optimize_with_diagnostics};
pub use types::{
    ConfigError, EdgeKey, Fallback, MotionSegment, NeedleState, Optimization, OptimizerConfig,
    Point, PointKey,
};
