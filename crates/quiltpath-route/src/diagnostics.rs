//! Optimizer diagnostics: timing and counts for each pipeline stage.
//!
//! Collected by [`optimize_with_diagnostics`](crate::optimize_with_diagnostics)
//! for tuning tolerances and matching limits against real designs.
//!
//! Timestamps are taken with the `web-time` crate (`performance.now()` on
//! WASM, `std::time::Instant` on native). Durations are serialized as
//! fractional seconds (`f64`) since `std::time::Duration` has no serde
//! support.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::matching::MatchingStrategy;
use crate::types::Fallback;

/// Stage durations on the wire: fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|e| D::Error::custom(format!("invalid stage duration {secs}: {e}")))
    }
}

/// Diagnostics collected from a single optimizer run.
///
/// A stage is `None` if it did not complete: either an earlier stage fell
/// back or the stage itself did.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptimizeDiagnostics {
    /// Stage 1: intersection splitting.
    pub split: Option<StageDiagnostics>,
    /// Stage 2: graph construction.
    pub graph: Option<StageDiagnostics>,
    /// Stage 3: connectivity and parity analysis.
    pub parity: Option<StageDiagnostics>,
    /// Stage 4: parity-fixing matching.
    pub matching: Option<StageDiagnostics>,
    /// Stage 5: Eulerian trail construction.
    pub trail: Option<StageDiagnostics>,
    /// Stage 6: coverage and overlap gate.
    pub validation: Option<StageDiagnostics>,
    /// Total wall-clock duration of the run (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Input/output counts and the outcome.
    pub summary: OptimizeSummary,
}

/// Diagnostics for a single stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Intersection splitting.
    Split {
        /// Non-degenerate stitched edges read from the input.
        raw_edges: usize,
        /// Contact points found between edge pairs.
        intersections: usize,
        /// Sub-edges after cutting.
        sub_edges: usize,
    },
    /// Graph construction.
    Graph {
        /// Distinct vertices.
        vertices: usize,
        /// Required edges after deduplication.
        edges: usize,
        /// Sub-edges folded into an existing edge.
        merged_duplicates: usize,
        /// Sub-edges dropped as self-loops.
        dropped_self_loops: usize,
        /// Sum of required edge lengths.
        total_length: f64,
    },
    /// Connectivity and parity analysis.
    Parity {
        /// Vertices with odd degree.
        odd_vertices: usize,
        /// Vertices whose parity must flip.
        required_vertices: usize,
        /// Whether the trail starts and ends at the same vertex.
        closed: bool,
    },
    /// Parity-fixing matching.
    Matching {
        /// Regime that produced the pairs.
        strategy: MatchingStrategy,
        /// Matched pairs.
        pairs: usize,
        /// Edge instances added to the multigraph.
        duplicated_edges: usize,
        /// Length added by duplication.
        added_length: f64,
    },
    /// Eulerian trail construction.
    Trail {
        /// Edge instances in the multigraph.
        multigraph_edges: usize,
        /// Vertices along the trail.
        trail_vertices: usize,
        /// Points after collapsing near-duplicates.
        emitted_points: usize,
    },
    /// Coverage and overlap gate.
    Validation {
        /// Distinct geometric edges the candidate had to cover.
        required_edges: usize,
        /// Retraced length of the input.
        original_overlap: f64,
        /// Retraced length of the candidate.
        candidate_overlap: f64,
    },
}

/// High-level counts for the whole run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptimizeSummary {
    /// Segments passed in.
    pub input_segments: usize,
    /// Needle-down segments with at least two points.
    pub stitched_runs: usize,
    /// Points across all stitched runs.
    pub input_stitch_points: usize,
    /// Points in the optimized stitched segment (0 when unchanged).
    pub output_stitch_points: usize,
    /// Why the input was returned unchanged, if it was.
    pub fallback: Option<Fallback>,
}

impl OptimizeDiagnostics {
    /// Stages that ran, in pipeline order.
    #[must_use]
    pub fn stages(&self) -> Vec<(&'static str, &StageDiagnostics)> {
        [
            ("Split", &self.split),
            ("Graph", &self.graph),
            ("Parity", &self.parity),
            ("Matching", &self.matching),
            ("Trail", &self.trail),
            ("Validation", &self.validation),
        ]
        .into_iter()
        .filter_map(|(name, stage)| stage.as_ref().map(|s| (name, s)))
        .collect()
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Stitch Route Diagnostics\n{}", "=".repeat(60)));
        lines.push(format!(
            "Segments: {} ({} stitched runs, {} stitch points)",
            self.summary.input_segments, self.summary.stitched_runs, self.summary.input_stitch_points,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<12} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        for (name, diag) in self.stages() {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<12} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        match &self.summary.fallback {
            Some(reason) => lines.push(format!("Outcome: unchanged ({reason})")),
            None => lines.push(format!(
                "Outcome: optimized ({} -> {} stitch points)",
                self.summary.input_stitch_points, self.summary.output_stitch_points,
            )),
        }

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Split {
            raw_edges,
            intersections,
            sub_edges,
        } => format!("{raw_edges} edges, {intersections} contacts -> {sub_edges} sub-edges"),
        StageMetrics::Graph {
            vertices,
            edges,
            merged_duplicates,
            dropped_self_loops,
            total_length,
        } => format!(
            "V={vertices} E={edges} len={total_length:.2} (merged={merged_duplicates} loops={dropped_self_loops})",
        ),
        StageMetrics::Parity {
            odd_vertices,
            required_vertices,
            closed,
        } => {
            let shape = if *closed { "closed" } else { "open" };
            format!("odd={odd_vertices} required={required_vertices} {shape}")
        }
        StageMetrics::Matching {
            strategy,
            pairs,
            duplicated_edges,
            added_length,
        } => format!("{strategy} {pairs} pairs, +{duplicated_edges} edges (+{added_length:.2})"),
        StageMetrics::Trail {
            multigraph_edges,
            trail_vertices,
            emitted_points,
        } => format!("{multigraph_edges} edges, {trail_vertices} vertices -> {emitted_points} pts"),
        StageMetrics::Validation {
            required_edges,
            original_overlap,
            candidate_overlap,
        } => format!(
            "{required_edges} edges, overlap {original_overlap:.3} -> {candidate_overlap:.3}",
        ),
    }
}
