//! Eulerian trail construction over the parity-fixed multigraph.

use petgraph::graph::{EdgeIndex, NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;

use crate::graph::StitchGraph;
use crate::matching::Matching;
use crate::parity::Endpoints;
use crate::types::{Fallback, Point};

/// Base graph plus one parallel edge per duplicated path edge.
///
/// Every physical edge instance has its own [`EdgeIndex`], so Hierholzer's
/// walk consumes duplicates independently.
#[must_use]
pub fn build_multigraph(graph: &StitchGraph, matching: &Matching) -> UnGraph<Point, f64> {
    let mut multi = graph.graph().clone();
    for &edge in matching.paths.iter().flatten() {
        if let Some((a, b)) = graph.graph().edge_endpoints(edge) {
            multi.add_edge(a, b, graph.graph()[edge]);
        }
    }
    multi
}

/// Open (or closed) Eulerian trail from `start` using Hierholzer's
/// algorithm with an explicit stack.
///
/// Returns the vertex sequence. The result only covers the component of
/// `start`; callers verify it against the edge count.
#[must_use]
pub fn hierholzer(multi: &UnGraph<Point, f64>, start: NodeIndex) -> Vec<NodeIndex> {
    // Per-vertex incident edge lists, consumed from the back.
    let mut adjacency: Vec<Vec<(EdgeIndex, NodeIndex)>> = vec![Vec::new(); multi.node_count()];
    for edge in multi.edge_references() {
        adjacency[edge.source().index()].push((edge.id(), edge.target()));
        adjacency[edge.target().index()].push((edge.id(), edge.source()));
    }
    // Walk edges in insertion order.
    for incident in &mut adjacency {
        incident.reverse();
    }

    let mut used = vec![false; multi.edge_count()];
    let mut stack = vec![start];
    let mut trail = Vec::with_capacity(multi.edge_count() + 1);

    while let Some(&current) = stack.last() {
        let incident = &mut adjacency[current.index()];
        while incident.last().is_some_and(|&(e, _)| used[e.index()]) {
            incident.pop();
        }
        if let Some((edge, next)) = incident.pop() {
            used[edge.index()] = true;
            stack.push(next);
        } else {
            trail.push(current);
            stack.pop();
        }
    }

    trail.reverse();
    trail
}

/// Build and verify the trail through the parity-fixed multigraph.
///
/// # Errors
///
/// Returns [`Fallback::IncompleteTrail`] if the walk does not use every
/// edge instance and [`Fallback::TrailEndpointMismatch`] if it does not
/// run from `endpoints.start` to `endpoints.end`.
pub fn eulerian_trail(
    graph: &StitchGraph,
    matching: &Matching,
    endpoints: Endpoints,
) -> Result<Vec<NodeIndex>, Fallback> {
    let multi = build_multigraph(graph, matching);
    let trail = hierholzer(&multi, endpoints.start);

    let used = trail.len().saturating_sub(1);
    if used != multi.edge_count() || used == 0 {
        return Err(Fallback::IncompleteTrail {
            used,
            total: multi.edge_count(),
        });
    }
    if trail.first() != Some(&endpoints.start) || trail.last() != Some(&endpoints.end) {
        return Err(Fallback::TrailEndpointMismatch);
    }
    Ok(trail)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::matching::MatchingStrategy;
    use geo::{Coord, Line};

    const TOL: f64 = 1e-6;

    fn graph(points: &[(f64, f64)]) -> StitchGraph {
        let lines: Vec<Line<f64>> = points
            .windows(2)
            .map(|w| Line::new(Coord { x: w[0].0, y: w[0].1 }, Coord { x: w[1].0, y: w[1].1 }))
            .collect();
        StitchGraph::build(&lines, TOL)
    }

    fn no_matching() -> Matching {
        Matching {
            strategy: MatchingStrategy::None,
            pairs: Vec::new(),
            paths: Vec::new(),
            total_cost: 0.0,
        }
    }

    fn at(g: &StitchGraph, x: f64, y: f64) -> NodeIndex {
        g.lookup(Point::new(x, y)).unwrap()
    }

    #[test]
    fn hierholzer_simple_circuit() {
        let g = UnGraph::<Point, f64>::from_edges([(0u32, 1, 1.0), (1, 2, 1.0), (2, 0, 1.0)]);
        let trail = hierholzer(&g, NodeIndex::new(0));
        assert_eq!(trail.len(), 4);
        assert_eq!(trail.first(), trail.last());
    }

    #[test]
    fn hierholzer_splices_sub_tours() {
        // Figure eight: two triangles sharing vertex 0.
        let g = UnGraph::<Point, f64>::from_edges([
            (0u32, 1, 1.0),
            (1, 2, 1.0),
            (2, 0, 1.0),
            (0, 3, 1.0),
            (3, 4, 1.0),
            (4, 0, 1.0),
        ]);
        let trail = hierholzer(&g, NodeIndex::new(0));
        assert_eq!(trail.len(), 7);
        assert_eq!(trail[0], NodeIndex::new(0));
        assert_eq!(trail[6], NodeIndex::new(0));
    }

    #[test]
    fn parallel_edges_are_consumed_separately() {
        let g = UnGraph::<Point, f64>::from_edges([(0u32, 1, 1.0), (0, 1, 1.0), (1, 2, 1.0)]);
        let trail = hierholzer(&g, NodeIndex::new(2));
        assert_eq!(
            trail,
            vec![
                NodeIndex::new(2),
                NodeIndex::new(1),
                NodeIndex::new(0),
                NodeIndex::new(1)
            ]
        );
    }

    #[test]
    fn multigraph_adds_one_instance_per_path_edge() {
        let g = graph(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)]);
        let edges: Vec<EdgeIndex> = g.graph().edge_indices().collect();
        let matching = Matching {
            strategy: MatchingStrategy::Exact,
            pairs: Vec::new(),
            paths: vec![edges.clone(), vec![edges[0]]],
            total_cost: 3.0,
        };
        let multi = build_multigraph(&g, &matching);
        assert_eq!(multi.edge_count(), 5);
        assert_eq!(multi.node_count(), 3);
    }

    #[test]
    fn trail_runs_between_requested_endpoints() {
        let g = graph(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)]);
        let endpoints = Endpoints {
            start: at(&g, 2.0, 0.0),
            end: at(&g, 0.0, 0.0),
        };
        let trail = eulerian_trail(&g, &no_matching(), endpoints).unwrap();
        let points: Vec<Point> = trail.iter().map(|&n| g.point(n)).collect();
        assert_eq!(
            points,
            vec![Point::new(2.0, 0.0), Point::new(1.0, 0.0), Point::new(0.0, 0.0)]
        );
    }

    #[test]
    fn wrong_parity_is_caught() {
        // Path 0-1-2 asked to end where it starts: the walk strands an edge.
        let g = graph(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)]);
        let start = at(&g, 0.0, 0.0);
        let result = eulerian_trail(&g, &no_matching(), Endpoints { start, end: start });
        assert_eq!(result, Err(Fallback::TrailEndpointMismatch));
    }

    #[test]
    fn disconnected_duplicates_are_caught() {
        let lines = [
            Line::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 0.0 }),
            Line::new(Coord { x: 5.0, y: 0.0 }, Coord { x: 6.0, y: 0.0 }),
        ];
        let g = StitchGraph::build(&lines, TOL);
        let endpoints = Endpoints {
            start: at(&g, 0.0, 0.0),
            end: at(&g, 1.0, 0.0),
        };
        assert_eq!(
            eulerian_trail(&g, &no_matching(), endpoints),
            Err(Fallback::IncompleteTrail { used: 1, total: 2 })
        );
    }
}
