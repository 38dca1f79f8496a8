//! Labeled graphs and the matrices FGW is computed from.
//!
//! Node `i` of every matrix and histogram is `NodeIndex::new(i)`; edges are ordered
//! by `EdgeIndex`. Graphs built with `add_node` / `add_edge` and never shrunk satisfy
//! this without further bookkeeping.

use crate::{Error, Result};
use ndarray::{Array1, Array2};
use petgraph::algo::dijkstra;
use petgraph::graph::{NodeIndex, UnGraph};

/// Undirected graph with node labels `N` and edge labels `E`.
pub type LabeledGraph<N, E> = UnGraph<N, E>;

/// Hop distance assigned to pairs with no connecting path.
///
/// Finite on purpose: the FGW objective squares and multiplies these entries.
pub const UNREACHABLE_DISTANCE: f64 = 10_000.0;

/// Allowed deviation of a histogram's total mass from 1.
pub const HISTOGRAM_TOLERANCE: f64 = 1e-6;

/// All-pairs unweighted shortest-path distances.
///
/// `C[i][j]` is the number of edges on a shortest path between nodes `i` and `j`,
/// or [`UNREACHABLE_DISTANCE`] when they lie in different components.
/// The result is symmetric with a zero diagonal.
///
/// # Complexity
///
/// O(n (n + e) log n)
pub fn structural_distances<N, E>(g: &LabeledGraph<N, E>) -> Array2<f64> {
    let n = g.node_count();
    let mut c = Array2::from_elem((n, n), UNREACHABLE_DISTANCE);
    for i in 0..n {
        let hops = dijkstra(g, NodeIndex::new(i), None, |_| 1usize);
        for (node, d) in hops {
            c[[i, node.index()]] = d as f64;
        }
    }
    c
}

/// Cross-graph label distances: `M[i][j] = d(label(i), label(j))`.
///
/// `d` is expected to be non-negative; nothing else (symmetry, triangle inequality)
/// is assumed.
pub fn feature_distances<N, E1, E2, D>(
    g1: &LabeledGraph<N, E1>,
    g2: &LabeledGraph<N, E2>,
    d: D,
) -> Array2<f64>
where
    D: Fn(&N, &N) -> f64,
{
    Array2::from_shape_fn((g1.node_count(), g2.node_count()), |(i, j)| {
        d(&g1[NodeIndex::new(i)], &g2[NodeIndex::new(j)])
    })
}

/// Uniform histogram over `n` bins.
pub fn uniform(n: usize) -> Array1<f64> {
    if n == 0 {
        return Array1::zeros(0);
    }
    Array1::from_elem(n, 1.0 / n as f64)
}

/// Check that `h` is a histogram over `expected_len` bins.
///
/// Entries must be finite and non-negative, and the total must be within
/// [`HISTOGRAM_TOLERANCE`] of 1. An empty histogram over zero bins is accepted.
pub fn validate_histogram(h: &Array1<f64>, expected_len: usize) -> Result<()> {
    if h.len() != expected_len {
        return Err(Error::LengthMismatch(expected_len, h.len()));
    }
    if h.is_empty() {
        return Ok(());
    }
    if let Some((i, &x)) = h.iter().enumerate().find(|(_, x)| !x.is_finite() || **x < 0.0) {
        return Err(Error::NegativeMass(i, x));
    }
    let sum = h.sum();
    if (sum - 1.0).abs() > HISTOGRAM_TOLERANCE {
        return Err(Error::NotNormalized(sum));
    }
    Ok(())
}
