//! Stitch graph construction from split sub-edges.
//!
//! Vertices are identified through a [`VertexSnap`]: points within the
//! tolerance share a vertex, and the first point seen becomes its
//! position. Repeated geometry (the drawing retracing a line) collapses to
//! a single required edge; when several sub-edges join the same vertex
//! pair, the shortest one is kept.

use std::collections::HashMap;

use geo::Line;
use petgraph::graph::{EdgeIndex, NodeIndex, UnGraph};

use crate::snap::VertexSnap;
use crate::types::Point;

/// Undirected simple graph of required stitched edges.
///
/// Node weights are vertex positions; edge weights are Euclidean lengths
/// of the representative sub-edge.
#[derive(Debug, Clone)]
pub struct StitchGraph {
    graph: UnGraph<Point, f64>,
    nodes: VertexSnap<NodeIndex>,
    tolerance: f64,
    merged_duplicates: usize,
    dropped_self_loops: usize,
}

impl StitchGraph {
    /// Create an empty graph whose vertices are merged on a `tolerance` grid.
    #[must_use]
    pub fn new(tolerance: f64) -> Self {
        Self {
            graph: UnGraph::new_undirected(),
            nodes: VertexSnap::new(tolerance),
            tolerance,
            merged_duplicates: 0,
            dropped_self_loops: 0,
        }
    }

    /// Build the graph from split sub-edges.
    #[must_use]
    pub fn build(edges: &[Line<f64>], tolerance: f64) -> Self {
        let mut stitch_graph = Self::new(tolerance);
        let mut by_pair: HashMap<(NodeIndex, NodeIndex), EdgeIndex> = HashMap::new();

        for line in edges {
            let a = Point::from(line.start);
            let b = Point::from(line.end);
            if a.approx_eq(b, tolerance) {
                stitch_graph.dropped_self_loops += 1;
                continue;
            }

            let na = stitch_graph.vertex_for(a);
            let nb = stitch_graph.vertex_for(b);
            if na == nb {
                stitch_graph.dropped_self_loops += 1;
                continue;
            }
            let pair = if na < nb { (na, nb) } else { (nb, na) };
            let weight = a.distance(b);

            if let Some(&existing) = by_pair.get(&pair) {
                stitch_graph.merged_duplicates += 1;
                let kept = &mut stitch_graph.graph[existing];
                if weight < *kept {
                    *kept = weight;
                }
            } else {
                let edge = stitch_graph.graph.add_edge(na, nb, weight);
                by_pair.insert(pair, edge);
            }
        }

        stitch_graph
    }

    /// Vertex within tolerance of `point`, inserting one if there is none.
    pub fn vertex_for(&mut self, point: Point) -> NodeIndex {
        let graph = &mut self.graph;
        self.nodes.get_or_insert_with(point, || graph.add_node(point))
    }

    /// Closest existing vertex within tolerance of `point`, if any.
    #[must_use]
    pub fn lookup(&self, point: Point) -> Option<NodeIndex> {
        self.nodes.find(point).map(|(node, _)| node)
    }

    /// The underlying petgraph graph.
    #[must_use]
    pub const fn graph(&self) -> &UnGraph<Point, f64> {
        &self.graph
    }

    /// Position of vertex `node`.
    #[must_use]
    pub fn point(&self, node: NodeIndex) -> Point {
        self.graph[node]
    }

    /// Number of edges incident to `node`.
    #[must_use]
    pub fn degree(&self, node: NodeIndex) -> usize {
        self.graph.edges(node).count()
    }

    /// Vertices touched by at least one edge, in index order.
    #[must_use]
    pub fn used_vertices(&self) -> Vec<NodeIndex> {
        self.graph
            .node_indices()
            .filter(|&n| self.degree(n) > 0)
            .collect()
    }

    /// Coincidence tolerance used for vertex identity.
    #[must_use]
    pub const fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Sub-edges folded into an existing vertex pair.
    #[must_use]
    pub const fn merged_duplicates(&self) -> usize {
        self.merged_duplicates
    }

    /// Sub-edges discarded because both endpoints share a vertex.
    #[must_use]
    pub const fn dropped_self_loops(&self) -> usize {
        self.dropped_self_loops
    }

    /// Number of vertices.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of required edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Sum of required edge lengths.
    #[must_use]
    pub fn total_length(&self) -> f64 {
        self.graph.edge_weights().sum()
    }
}
