//! Pipeline orchestration: split, build, analyze, match, walk, verify.
//!
//! Every stage returns `Result<_, Fallback>`; the public entry points turn
//! any failure into [`Optimization::Unchanged`] so callers never see an
//! error, only the reason the input was kept.

use std::time::Duration;

use web_time::Instant;

use crate::diagnostics::{OptimizeDiagnostics, OptimizeSummary, StageDiagnostics, StageMetrics};
use crate::euler::eulerian_trail;
use crate::graph::StitchGraph;
use crate::matching::match_required;
use crate::parity;
use crate::split::split_stitched_geometry;
use crate::types::{Fallback, MotionSegment, Optimization, OptimizerConfig, Point};
use crate::validate::{EdgeTally, emit_points, splice, verify};

/// Reorder the stitched runs of `segments` to minimize retraced length.
///
/// `start` and `end` pin the trail endpoints; when absent (or off the
/// stitched geometry) the first and last stitched points are used.
/// Travel segments are kept in place. The result is either a verified
/// improvement or the input unchanged together with the reason.
#[must_use]
pub fn optimize_motion_segments(
    segments: &[MotionSegment],
    start: Option<Point>,
    end: Option<Point>,
    config: &OptimizerConfig,
) -> Optimization {
    optimize_with_diagnostics(segments, start, end, config).0
}

/// [`optimize_motion_segments`] plus per-stage timing and counts.
#[must_use]
pub fn optimize_with_diagnostics(
    segments: &[MotionSegment],
    start: Option<Point>,
    end: Option<Point>,
    config: &OptimizerConfig,
) -> (Optimization, OptimizeDiagnostics) {
    let started = Instant::now();
    let stitched: Vec<&MotionSegment> = segments.iter().filter(|s| s.is_stitched_run()).collect();
    let mut diagnostics = OptimizeDiagnostics {
        summary: OptimizeSummary {
            input_segments: segments.len(),
            stitched_runs: stitched.len(),
            input_stitch_points: stitched.iter().map(|s| s.points.len()).sum(),
            ..OptimizeSummary::default()
        },
        ..OptimizeDiagnostics::default()
    };

    let result = run(segments, &stitched, (start, end), config, &mut diagnostics);
    diagnostics.total_duration = started.elapsed();

    let outcome = match result {
        Ok(optimized) => {
            diagnostics.summary.output_stitch_points = optimized
                .iter()
                .filter(|s| s.is_stitched_run())
                .map(|s| s.points.len())
                .sum();
            log::debug!(
                "stitch route optimized: {} -> {} stitch points in {:?}",
                diagnostics.summary.input_stitch_points,
                diagnostics.summary.output_stitch_points,
                diagnostics.total_duration,
            );
            Optimization::Optimized(optimized)
        }
        Err(reason) => {
            log::debug!("stitch route left unchanged: {reason}");
            diagnostics.summary.fallback = Some(reason.clone());
            Optimization::Unchanged(reason)
        }
    };
    (outcome, diagnostics)
}

/// Run `f` and measure its wall-clock duration.
fn timed<T>(f: impl FnOnce() -> T) -> (T, Duration) {
    let started = Instant::now();
    let value = f();
    (value, started.elapsed())
}

fn run(
    segments: &[MotionSegment],
    stitched: &[&MotionSegment],
    hints: (Option<Point>, Option<Point>),
    config: &OptimizerConfig,
    diagnostics: &mut OptimizeDiagnostics,
) -> Result<Vec<MotionSegment>, Fallback> {
    config.validate()?;
    let tolerance = config.tolerance;

    let first = stitched
        .first()
        .and_then(|s| s.points.first())
        .copied()
        .ok_or(Fallback::NoStitches)?;
    let last = stitched
        .last()
        .and_then(|s| s.points.last())
        .copied()
        .ok_or(Fallback::NoStitches)?;

    let finite_points = stitched.iter().flat_map(|s| &s.points).all(|p| p.is_finite());
    let finite_hints = [hints.0, hints.1].into_iter().flatten().all(Point::is_finite);
    if !finite_points || !finite_hints {
        return Err(Fallback::NonFiniteInput);
    }

    // 1. Split at intersections.
    let (split, duration) = timed(|| split_stitched_geometry(segments, tolerance));
    let split = split?;
    log::trace!(
        "split {} raw edges at {} contacts into {} sub-edges",
        split.raw_edge_count,
        split.intersection_count,
        split.edges.len(),
    );
    diagnostics.split = Some(StageDiagnostics {
        duration,
        metrics: StageMetrics::Split {
            raw_edges: split.raw_edge_count,
            intersections: split.intersection_count,
            sub_edges: split.edges.len(),
        },
    });

    // 2. Build the deduplicated graph.
    let (graph, duration) = timed(|| StitchGraph::build(&split.edges, tolerance));
    log::trace!(
        "graph has {} vertices and {} edges ({} duplicates merged)",
        graph.vertex_count(),
        graph.edge_count(),
        graph.merged_duplicates(),
    );
    diagnostics.graph = Some(StageDiagnostics {
        duration,
        metrics: StageMetrics::Graph {
            vertices: graph.vertex_count(),
            edges: graph.edge_count(),
            merged_duplicates: graph.merged_duplicates(),
            dropped_self_loops: graph.dropped_self_loops(),
            total_length: graph.total_length(),
        },
    });

    // 3. Connectivity, endpoints, parity.
    let (analysis, duration) = timed(|| parity::analyze(&graph, hints, (first, last)));
    let analysis = analysis?;
    log::trace!(
        "{} odd vertices, {} need parity fixing",
        analysis.odd_count,
        analysis.required.len(),
    );
    diagnostics.parity = Some(StageDiagnostics {
        duration,
        metrics: StageMetrics::Parity {
            odd_vertices: analysis.odd_count,
            required_vertices: analysis.required.len(),
            closed: analysis.endpoints.is_closed(),
        },
    });

    // 4. Pair required vertices along shortest paths.
    let (matching, duration) = timed(|| match_required(&graph, &analysis.required, config));
    let matching = matching?;
    log::trace!(
        "{} matching paired {} vertices, duplicating {} edges",
        matching.strategy,
        analysis.required.len(),
        matching.duplicated_edges(),
    );
    diagnostics.matching = Some(StageDiagnostics {
        duration,
        metrics: StageMetrics::Matching {
            strategy: matching.strategy,
            pairs: matching.pairs.len(),
            duplicated_edges: matching.duplicated_edges(),
            added_length: matching.total_cost,
        },
    });

    // 5. Walk the multigraph.
    let (walked, duration) = timed(|| {
        let trail = eulerian_trail(&graph, &matching, analysis.endpoints)?;
        let points = emit_points(&graph, &trail, tolerance)?;
        Ok::<_, Fallback>((trail.len(), points))
    });
    let (trail_vertices, points) = walked?;
    log::trace!("trail visits {trail_vertices} vertices, {} points emitted", points.len());
    diagnostics.trail = Some(StageDiagnostics {
        duration,
        metrics: StageMetrics::Trail {
            multigraph_edges: graph.edge_count() + matching.duplicated_edges(),
            trail_vertices,
            emitted_points: points.len(),
        },
    });

    // 6. Splice and gate.
    let candidate = splice(segments, MotionSegment::stitch(points));
    let (verdict, duration) = timed(|| {
        let original = EdgeTally::from_split(&split, tolerance);
        verify(&original, &candidate, tolerance)
    });
    let verdict = verdict?;
    log::trace!(
        "overlap {:.6} -> {:.6}",
        verdict.original_overlap,
        verdict.candidate_overlap,
    );
    diagnostics.validation = Some(StageDiagnostics {
        duration,
        metrics: StageMetrics::Validation {
            required_edges: verdict.required_edges,
            original_overlap: verdict.original_overlap,
            candidate_overlap: verdict.candidate_overlap,
        },
    });

    Ok(candidate)
}
