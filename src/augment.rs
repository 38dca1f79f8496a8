//! Node/edge label unification.
//!
//! FGW only compares node labels. To let edge labels take part, every edge of a graph is
//! turned into a node of its own (subdividing the edge), and the two label spaces are
//! glued into a single metric space:
//!
//! ```text
//!   u ──(e)── v      ⇒      u ── [e] ── v
//! ```
//!
//! - vertex-origin nodes keep their node label, edge-origin nodes carry the edge label;
//! - labels of the same origin are compared with their own distance, labels of
//!   different origin are [`CROSS_TYPE_DISTANCE`] apart;
//! - mass is split between the two kinds with `beta`:
//!   `h(u) = beta · hv(u)`, `h(e) = (1 - beta) · he(e)`.
//!
//! `beta = 1` puts all mass on the original nodes and `beta = 0` all of it on the edges.

use crate::graph::{structural_distances, validate_histogram, LabeledGraph};
use crate::{Error, Result};
use ndarray::{Array1, Array2};
use petgraph::visit::EdgeRef;

/// Distance between labels of different origin.
pub const CROSS_TYPE_DISTANCE: f64 = 10_000.0;

/// Label of an augmented node: where it came from, and the original label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AugmentedLabel<N, E> {
    /// An original node.
    Vertex(N),
    /// An original edge.
    Edge(E),
}

/// The unified label distance built from a node-label and an edge-label distance.
#[derive(Debug, Clone, Copy)]
pub struct AugmentedDistance<DV, DE> {
    /// Distance between two node labels.
    pub vertex: DV,
    /// Distance between two edge labels.
    pub edge: DE,
}

impl<DV, DE> AugmentedDistance<DV, DE> {
    /// Combine a node-label and an edge-label distance.
    pub fn new(vertex: DV, edge: DE) -> Self {
        Self { vertex, edge }
    }

    /// Same-origin labels use their own distance; mixed pairs get [`CROSS_TYPE_DISTANCE`].
    pub fn distance<N, E>(&self, a: &AugmentedLabel<N, E>, b: &AugmentedLabel<N, E>) -> f64
    where
        DV: Fn(&N, &N) -> f64,
        DE: Fn(&E, &E) -> f64,
    {
        match (a, b) {
            (AugmentedLabel::Vertex(x), AugmentedLabel::Vertex(y)) => (self.vertex)(x, y),
            (AugmentedLabel::Edge(x), AugmentedLabel::Edge(y)) => (self.edge)(x, y),
            _ => CROSS_TYPE_DISTANCE,
        }
    }
}

/// An augmented graph and its blended histogram.
///
/// Nodes `0..vertex_count` are the original nodes in their original order; the
/// remaining nodes are the original edges in edge-index order. `histogram` follows the
/// same order.
#[derive(Debug, Clone)]
pub struct Augmented<N, E> {
    /// Subdivided graph; edges carry no label.
    pub graph: LabeledGraph<AugmentedLabel<N, E>, ()>,
    /// Blended node/edge masses, summing to 1.
    pub histogram: Array1<f64>,
    vertex_count: usize,
}

impl<N, E> Augmented<N, E> {
    /// Number of vertex-origin nodes.
    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    /// Number of edge-origin nodes.
    pub fn edge_count(&self) -> usize {
        self.graph.node_count() - self.vertex_count
    }

    /// Structure matrix of the augmented graph, in original hop units.
    ///
    /// Subdividing every edge doubles path lengths, so distances are halved: two
    /// vertex-origin nodes are as far apart as in the original graph. Unreachable pairs
    /// are halved too.
    pub fn structure(&self) -> Array2<f64> {
        structural_distances(&self.graph) / 2.0
    }
}

/// Fold the edges of `g` into nodes.
///
/// `hv` is a histogram over the nodes of `g` and `he` over its edges; both are checked
/// before anything is built. Returns the augmented graph with its histogram, and the
/// unified distance over [`AugmentedLabel`]s.
///
/// # Errors
///
/// - [`Error::InvalidMixing`] if `beta` is outside `[0, 1]`.
/// - [`Error::LengthMismatch`], [`Error::NegativeMass`] or [`Error::NotNormalized`] for a
///   malformed `hv` or `he`.
/// - [`Error::Domain`] if the blended histogram cannot carry unit mass: an edgeless graph
///   with `beta < 1`, or a graph without nodes with `beta > 0`.
pub fn augment<N, E, DV, DE>(
    g: &LabeledGraph<N, E>,
    dv: DV,
    de: DE,
    hv: &Array1<f64>,
    he: &Array1<f64>,
    beta: f64,
) -> Result<(Augmented<N, E>, AugmentedDistance<DV, DE>)>
where
    N: Clone,
    E: Clone,
    DV: Fn(&N, &N) -> f64,
    DE: Fn(&E, &E) -> f64,
{
    if !(0.0..=1.0).contains(&beta) {
        return Err(Error::InvalidMixing(beta));
    }
    validate_histogram(hv, g.node_count())?;
    validate_histogram(he, g.edge_count())?;
    if g.edge_count() == 0 && beta < 1.0 {
        return Err(Error::Domain("edgeless graph: edge mass 1 - beta has nowhere to go"));
    }
    if g.node_count() == 0 && beta > 0.0 {
        return Err(Error::Domain("empty graph: node mass beta has nowhere to go"));
    }

    let n = g.node_count();
    let mut graph = LabeledGraph::with_capacity(n + g.edge_count(), 2 * g.edge_count());
    let mut histogram = Vec::with_capacity(n + g.edge_count());

    for (i, label) in g.node_weights().enumerate() {
        graph.add_node(AugmentedLabel::Vertex(label.clone()));
        histogram.push(beta * hv[i]);
    }
    for e in g.edge_references() {
        let mid = graph.add_node(AugmentedLabel::Edge(e.weight().clone()));
        graph.add_edge(mid, e.source(), ());
        graph.add_edge(mid, e.target(), ());
        histogram.push((1.0 - beta) * he[e.id().index()]);
    }

    let augmented = Augmented {
        graph,
        histogram: Array1::from_vec(histogram),
        vertex_count: n,
    };
    Ok((augmented, AugmentedDistance::new(dv, de)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{feature_distances, uniform};
    use petgraph::graph::NodeIndex;
    use proptest::prelude::*;

    fn labeled_path() -> LabeledGraph<u32, u32> {
        let mut g = LabeledGraph::new_undirected();
        let a = g.add_node(0);
        let b = g.add_node(1);
        let c = g.add_node(0);
        g.add_edge(a, b, 7);
        g.add_edge(b, c, 8);
        g
    }

    fn discrete(x: &u32, y: &u32) -> f64 {
        if x == y {
            0.0
        } else {
            1.0
        }
    }

    #[test]
    fn vertices_first_then_edges() {
        let g = labeled_path();
        let (aug, _) =
            augment(&g, discrete, discrete, &uniform(3), &uniform(2), 0.5).unwrap();

        assert_eq!(aug.vertex_count(), 3);
        assert_eq!(aug.edge_count(), 2);
        assert_eq!(aug.graph.edge_count(), 4);
        let labels: Vec<_> = aug.graph.node_weights().cloned().collect();
        assert_eq!(
            labels,
            vec![
                AugmentedLabel::Vertex(0),
                AugmentedLabel::Vertex(1),
                AugmentedLabel::Vertex(0),
                AugmentedLabel::Edge(7),
                AugmentedLabel::Edge(8),
            ]
        );

        let mut around_first_edge: Vec<_> = aug
            .graph
            .neighbors(NodeIndex::new(3))
            .map(|n| n.index())
            .collect();
        around_first_edge.sort();
        assert_eq!(around_first_edge, vec![0, 1]);
    }

    #[test]
    fn histogram_is_blended() {
        let g = labeled_path();
        let hv = Array1::from_vec(vec![0.5, 0.25, 0.25]);
        let he = Array1::from_vec(vec![0.75, 0.25]);
        let (aug, _) = augment(&g, discrete, discrete, &hv, &he, 0.2).unwrap();
        let expected = [0.1, 0.05, 0.05, 0.6, 0.2];
        for (got, want) in aug.histogram.iter().zip(expected) {
            assert!((got - want).abs() < 1e-12, "got={got} want={want}");
        }
    }

    #[test]
    fn distance_only_compares_same_origin() {
        let d = AugmentedDistance::new(discrete, |_: &u32, _: &u32| 0.5);
        let v0 = AugmentedLabel::<u32, u32>::Vertex(0);
        let v1 = AugmentedLabel::Vertex(1);
        let e0 = AugmentedLabel::Edge(0);
        let e9 = AugmentedLabel::Edge(9);

        assert_eq!(d.distance(&v0, &v0), 0.0);
        assert_eq!(d.distance(&v0, &v1), 1.0);
        assert_eq!(d.distance(&e0, &e9), 0.5);
        // Same raw label, different origin.
        assert_eq!(d.distance(&v0, &e0), CROSS_TYPE_DISTANCE);
        assert_eq!(d.distance(&e0, &v0), CROSS_TYPE_DISTANCE);
    }

    #[test]
    fn halved_structure_keeps_vertex_distances() {
        let g = labeled_path();
        let (aug, _) =
            augment(&g, discrete, discrete, &uniform(3), &uniform(2), 0.5).unwrap();
        let c = aug.structure();
        let original = structural_distances(&g);
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(c[[i, j]], original[[i, j]]);
            }
        }
        // Edge-origin node sits half a hop from its endpoints.
        assert_eq!(c[[3, 0]], 0.5);
        assert_eq!(c[[3, 4]], 1.0);
    }

    #[test]
    fn augmented_feature_matrix_uses_unified_distance() {
        let g = labeled_path();
        let (aug, d) =
            augment(&g, discrete, |_: &u32, _: &u32| 0.0, &uniform(3), &uniform(2), 0.5)
                .unwrap();
        let m = feature_distances(&aug.graph, &aug.graph, |a, b| d.distance(a, b));
        assert_eq!(m.shape(), &[5, 5]);
        assert_eq!(m[[0, 1]], 1.0);
        assert_eq!(m[[3, 4]], 0.0);
        assert_eq!(m[[0, 3]], CROSS_TYPE_DISTANCE);
    }

    #[test]
    fn rejects_bad_inputs() {
        let g = labeled_path();
        assert!(matches!(
            augment(&g, discrete, discrete, &uniform(3), &uniform(2), 1.1),
            Err(Error::InvalidMixing(_))
        ));
        assert!(matches!(
            augment(&g, discrete, discrete, &uniform(3), &uniform(3), 0.5),
            Err(Error::LengthMismatch(2, 3))
        ));
        let bad = Array1::from_vec(vec![0.9, 0.9, 0.9]);
        assert!(augment(&g, discrete, discrete, &bad, &uniform(2), 0.5).is_err());
    }

    #[test]
    fn edgeless_graph_needs_all_mass_on_nodes() {
        let mut g = LabeledGraph::<u32, u32>::new_undirected();
        g.add_node(0);
        g.add_node(1);
        let none = Array1::zeros(0);
        assert!(matches!(
            augment(&g, discrete, discrete, &uniform(2), &none, 0.5),
            Err(Error::Domain(_))
        ));

        let (aug, _) = augment(&g, discrete, discrete, &uniform(2), &none, 1.0).unwrap();
        assert_eq!(aug.edge_count(), 0);
        assert!((aug.histogram.sum() - 1.0).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn augmented_histogram_has_unit_mass(
            beta in 0.0f64..=1.0,
            hv in prop::collection::vec(0.01f64..1.0, 3),
            he in prop::collection::vec(0.01f64..1.0, 2),
        ) {
            let hv = Array1::from_vec(hv);
            let he = Array1::from_vec(he);
            let hv = &hv / hv.sum();
            let he = &he / he.sum();
            let (aug, _) = augment(&labeled_path(), discrete, discrete, &hv, &he, beta).unwrap();
            prop_assert!((aug.histogram.sum() - 1.0).abs() < 1e-9);
            prop_assert!(aug.histogram.iter().all(|&x| x >= 0.0));
        }
    }
}
