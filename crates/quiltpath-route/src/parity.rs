//! Connectivity and parity analysis.
//!
//! An open trail from `start` to `end` exists only when the graph is
//! connected and exactly those two vertices have odd degree (none when
//! they coincide). This module finds the vertices whose parity has to
//! change for that to hold.

use petgraph::graph::NodeIndex;
use petgraph::visit::Dfs;

use crate::graph::StitchGraph;
use crate::types::{Fallback, Point};

/// Resolved trail endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoints {
    /// Vertex the trail must start at.
    pub start: NodeIndex,
    /// Vertex the trail must end at.
    pub end: NodeIndex,
}

impl Endpoints {
    /// Returns `true` if the trail must be closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.start == self.end
    }
}

/// Output of [`analyze`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParityAnalysis {
    /// Resolved start/end vertices.
    pub endpoints: Endpoints,
    /// Vertices with odd degree in the base graph.
    pub odd_count: usize,
    /// Vertices whose parity must flip, in index order.
    pub required: Vec<NodeIndex>,
}

/// Check that every used vertex is reachable from the first one.
///
/// # Errors
///
/// Returns [`Fallback::NoGeometry`] if the graph has no edges and
/// [`Fallback::Disconnected`] if some used vertex is unreachable.
pub fn check_connected(graph: &StitchGraph) -> Result<(), Fallback> {
    let used = graph.used_vertices();
    let Some(&root) = used.first() else {
        return Err(Fallback::NoGeometry);
    };

    // Dfs keeps an explicit stack, so deep chains are fine.
    let g = graph.graph();
    let mut dfs = Dfs::new(g, root);
    let mut reached = 0;
    while dfs.next(g).is_some() {
        reached += 1;
    }

    if reached == used.len() {
        Ok(())
    } else {
        Err(Fallback::Disconnected {
            reached,
            used: used.len(),
        })
    }
}

/// Map the start/end hints onto graph vertices.
///
/// A hint resolves to the closest used vertex within tolerance. One that
/// is absent or lands on no vertex falls back to the matching default
/// point.
///
/// # Errors
///
/// Returns [`Fallback::EndpointNotInGraph`] if neither the hint nor the
/// default maps to a vertex.
pub fn resolve_endpoints(
    graph: &StitchGraph,
    hints: (Option<Point>, Option<Point>),
    defaults: (Point, Point),
) -> Result<Endpoints, Fallback> {
    let used = |p: Point| graph.lookup(p).filter(|&n| graph.degree(n) > 0);
    let resolve = |hint: Option<Point>, default: Point| {
        hint.and_then(used)
            .or_else(|| used(default))
            .ok_or(Fallback::EndpointNotInGraph)
    };
    Ok(Endpoints {
        start: resolve(hints.0, defaults.0)?,
        end: resolve(hints.1, defaults.1)?,
    })
}

/// Vertices whose degree parity disagrees with the target trail shape.
///
/// That is the odd-degree vertices XOR `{start, end}` when the endpoints
/// differ.
#[must_use]
pub fn required_parity(graph: &StitchGraph, endpoints: Endpoints) -> Vec<NodeIndex> {
    graph
        .graph()
        .node_indices()
        .filter(|&n| {
            let odd = graph.degree(n) % 2 == 1;
            let target_odd = !endpoints.is_closed() && (n == endpoints.start || n == endpoints.end);
            odd != target_odd
        })
        .collect()
}

/// Run the full connectivity and parity analysis.
///
/// # Errors
///
/// Propagates [`check_connected`] and [`resolve_endpoints`] failures and
/// returns [`Fallback::OddParitySet`] if the required set has odd size.
pub fn analyze(
    graph: &StitchGraph,
    hints: (Option<Point>, Option<Point>),
    defaults: (Point, Point),
) -> Result<ParityAnalysis, Fallback> {
    check_connected(graph)?;
    let endpoints = resolve_endpoints(graph, hints, defaults)?;

    let odd_count = graph
        .graph()
        .node_indices()
        .filter(|&n| graph.degree(n) % 2 == 1)
        .count();
    let required = required_parity(graph, endpoints);
    if required.len() % 2 == 1 {
        return Err(Fallback::OddParitySet(required.len()));
    }

    Ok(ParityAnalysis {
        endpoints,
        odd_count,
        required,
    })
}
