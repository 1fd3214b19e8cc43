//! Parity fixing: pair up required-parity vertices along shortest paths.
//!
//! Duplicating every edge of a shortest path between two vertices flips
//! the parity of exactly those two vertices. The cheapest set of such
//! paths that pairs every required vertex is a minimum-weight perfect
//! matching on the shortest-path metric.
//!
//! - up to `exact_matching_limit` vertices: exact bitmask DP over subsets
//!   (always extend the lowest unmatched vertex);
//! - up to `greedy_matching_limit` vertices: repeatedly take the cheapest
//!   remaining pair (an approximation, bounded runtime);
//! - above that: give up.

use std::collections::{HashMap, HashSet};

use petgraph::algo::dijkstra;
use petgraph::graph::{EdgeIndex, NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

use crate::graph::StitchGraph;
use crate::types::{Fallback, OptimizerConfig, Point};

/// Slack when matching reconstructed path costs against Dijkstra costs.
const COST_EPSILON: f64 = 1e-10;

/// How the required-parity vertices were paired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchingStrategy {
    /// Nothing to pair.
    None,
    /// Optimal bitmask DP.
    Exact,
    /// Cheapest-pair-first heuristic.
    Greedy,
}

impl std::fmt::Display for MatchingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Exact => write!(f, "exact"),
            Self::Greedy => write!(f, "greedy"),
        }
    }
}

/// Paths to duplicate so the trail endpoints have the right parity.
#[derive(Debug, Clone, PartialEq)]
pub struct Matching {
    /// Regime used to pick the pairs.
    pub strategy: MatchingStrategy,
    /// Matched vertex pairs.
    pub pairs: Vec<(NodeIndex, NodeIndex)>,
    /// One base-graph edge path per pair.
    pub paths: Vec<Vec<EdgeIndex>>,
    /// Sum of the path lengths.
    pub total_cost: f64,
}

impl Matching {
    /// Number of edge instances the matching adds to the multigraph.
    #[must_use]
    pub fn duplicated_edges(&self) -> usize {
        self.paths.iter().map(Vec::len).sum()
    }
}

// ---------------------------------------------------------------------------
// Shortest paths
// ---------------------------------------------------------------------------

/// Single-source shortest path costs with path reconstruction.
#[derive(Debug, Clone)]
pub struct ShortestPaths {
    source: NodeIndex,
    costs: HashMap<NodeIndex, f64>,
}

impl ShortestPaths {
    /// Run Dijkstra from `source` over the whole graph.
    #[must_use]
    pub fn from_source(graph: &UnGraph<Point, f64>, source: NodeIndex) -> Self {
        let costs = dijkstra(graph, source, None, |e| *e.weight())
            .into_iter()
            .collect();
        Self { source, costs }
    }

    /// Shortest distance to `target`, infinite if unreachable.
    #[must_use]
    pub fn cost(&self, target: NodeIndex) -> f64 {
        self.costs.get(&target).copied().unwrap_or(f64::INFINITY)
    }

    /// Edge indices of a shortest path from the source to `target`.
    ///
    /// Walks back from `target`, each step taking an edge whose weight
    /// accounts for the cost difference. Returns `None` if `target` is
    /// unreachable or the walk stalls.
    #[must_use]
    pub fn path_to(&self, graph: &UnGraph<Point, f64>, target: NodeIndex) -> Option<Vec<EdgeIndex>> {
        if !self.costs.contains_key(&target) {
            return None;
        }

        let mut edges = Vec::new();
        let mut visited = HashSet::from([target]);
        let mut current = target;
        while current != self.source {
            let current_cost = self.cost(current);
            let step = graph.edges(current).find(|e| {
                let neighbor = e.target();
                !visited.contains(&neighbor)
                    && (self.cost(neighbor) + *e.weight() - current_cost).abs() < COST_EPSILON
            })?;
            edges.push(step.id());
            current = step.target();
            visited.insert(current);
        }
        edges.reverse();
        Some(edges)
    }
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// Pair the `required` vertices along shortest paths of `graph`.
///
/// # Errors
///
/// Returns [`Fallback::MatchingCeilingExceeded`] if there are more than
/// `config.greedy_matching_limit` required vertices and
/// [`Fallback::UnreachablePair`] if no complete pairing is reachable.
pub fn match_required(
    graph: &StitchGraph,
    required: &[NodeIndex],
    config: &OptimizerConfig,
) -> Result<Matching, Fallback> {
    let m = required.len();
    if m == 0 {
        return Ok(Matching {
            strategy: MatchingStrategy::None,
            pairs: Vec::new(),
            paths: Vec::new(),
            total_cost: 0.0,
        });
    }
    if m > config.greedy_matching_limit {
        return Err(Fallback::MatchingCeilingExceeded {
            required: m,
            limit: config.greedy_matching_limit,
        });
    }

    let g = graph.graph();
    let trees: Vec<ShortestPaths> = required
        .iter()
        .map(|&source| ShortestPaths::from_source(g, source))
        .collect();
    let costs: Vec<Vec<f64>> = trees
        .iter()
        .map(|tree| required.iter().map(|&target| tree.cost(target)).collect())
        .collect();

    let (strategy, index_pairs) = if m <= config.exact_matching_limit {
        (MatchingStrategy::Exact, exact_pairs(&costs)?)
    } else {
        (MatchingStrategy::Greedy, greedy_pairs(&costs)?)
    };

    let mut pairs = Vec::with_capacity(index_pairs.len());
    let mut paths = Vec::with_capacity(index_pairs.len());
    let mut total_cost = 0.0;
    for (i, j) in index_pairs {
        let path = trees[i]
            .path_to(g, required[j])
            .filter(|p| !p.is_empty())
            .ok_or(Fallback::UnreachablePair)?;
        total_cost += costs[i][j];
        pairs.push((required[i], required[j]));
        paths.push(path);
    }

    Ok(Matching {
        strategy,
        pairs,
        paths,
        total_cost,
    })
}

/// Minimum-weight perfect matching by DP over matched-vertex bitmasks.
///
/// `costs` is a symmetric `m x m` table; infinite entries are unusable.
fn exact_pairs(costs: &[Vec<f64>]) -> Result<Vec<(usize, usize)>, Fallback> {
    let m = costs.len();
    let full = (1_usize << m) - 1;
    let mut best = vec![f64::INFINITY; full + 1];
    let mut step: Vec<Option<(usize, usize, usize)>> = vec![None; full + 1];
    best[0] = 0.0;

    for mask in 0..full {
        let base = best[mask];
        if !base.is_finite() {
            continue;
        }
        let i = (!mask).trailing_zeros() as usize;
        for j in (i + 1)..m {
            if mask & (1 << j) != 0 || !costs[i][j].is_finite() {
                continue;
            }
            let next = mask | (1 << i) | (1 << j);
            let candidate = base + costs[i][j];
            if candidate < best[next] {
                best[next] = candidate;
                step[next] = Some((mask, i, j));
            }
        }
    }

    if !best[full].is_finite() {
        return Err(Fallback::UnreachablePair);
    }

    let mut pairs = Vec::with_capacity(m / 2);
    let mut mask = full;
    while mask != 0 {
        let (prev, i, j) = step[mask].ok_or(Fallback::UnreachablePair)?;
        pairs.push((i, j));
        mask = prev;
    }
    pairs.reverse();
    Ok(pairs)
}

/// Cheapest-remaining-pair matching.
fn greedy_pairs(costs: &[Vec<f64>]) -> Result<Vec<(usize, usize)>, Fallback> {
    let m = costs.len();
    let mut open = vec![true; m];
    let mut remaining = m;
    let mut pairs = Vec::with_capacity(m / 2);

    while remaining > 0 {
        let mut cheapest: Option<(usize, usize, f64)> = None;
        for i in (0..m).filter(|&i| open[i]) {
            for j in ((i + 1)..m).filter(|&j| open[j]) {
                let cost = costs[i][j];
                if cost.is_finite() && cheapest.is_none_or(|(_, _, c)| cost < c) {
                    cheapest = Some((i, j, cost));
                }
            }
        }
        let (i, j, _) = cheapest.ok_or(Fallback::UnreachablePair)?;
        open[i] = false;
        open[j] = false;
        remaining -= 2;
        pairs.push((i, j));
    }

    Ok(pairs)
}
