//! # fgw
//!
//! Fused Gromov-Wasserstein (FGW) distances between labeled graphs.
//!
//! ## The Problem
//!
//! Two graphs carry information in two places: their *shape* (who is connected to
//! whom) and their *labels* (what sits on each node or edge). FGW compares both at
//! once by searching for a soft matching (a transport plan) between the nodes of the
//! two graphs that is cheap in label space *and* preserves pairwise hop distances.
//!
//! ## Key Functions
//!
//! | Function | Use Case |
//! |----------|----------|
//! | [`graph::structural_distances`] | All-pairs hop distances of one graph |
//! | [`graph::feature_distances`] | Cross-graph label distance matrix |
//! | [`augment::augment`] | Fold edge labels into nodes (one unified label space) |
//! | [`plan::random_plan`] | Random marginal-respecting warm starts |
//! | [`emd::emd`] | Exact optimal transport (the solver's linear step) |
//! | [`multistart::multi_start`] | Baseline + randomized restarts of a solver |
//! | [`graph_fgw`] | All of the above for two node-labeled graphs |
//!
//! ## Quick Start
//!
//! ```rust
//! use fgw::{graph_fgw, LabeledGraph, MultiStartConfig};
//! use rand::SeedableRng;
//! use rand_chacha::ChaCha8Rng;
//!
//! let mut g = LabeledGraph::<u32, u32>::new_undirected();
//! let a = g.add_node(0);
//! let b = g.add_node(1);
//! let c = g.add_node(0);
//! g.add_edge(a, b, 0);
//! g.add_edge(b, c, 0);
//!
//! let label = |x: &u32, y: &u32| if x == y { 0.0 } else { 1.0 };
//! let config = MultiStartConfig { restarts: 5, ..Default::default() };
//! let mut rng = ChaCha8Rng::seed_from_u64(7);
//! let best = graph_fgw(&g, &g, label, 0.5, &config, &mut rng).unwrap();
//! assert!(best.objective.is_finite());
//! assert_eq!(best.plan.shape(), &[3, 3]);
//! ```
//!
//! ## Why Multiple Starts?
//!
//! The FGW objective is a non-convex quadratic program. A solver started from the
//! product plan `p qᵀ` lands in the same local optimum every time; graphs with
//! symmetries (paths, cycles, stars) make this especially likely. Restarting from
//! random *feasible* plans ([`plan`]) and keeping the best objective is cheap and
//! surprisingly effective.
//!
//! ## What Can Go Wrong
//!
//! 1. **Disconnected graphs**: unreachable pairs get [`UNREACHABLE_DISTANCE`], not ∞.
//!    The structure term is then dominated by that constant; scale or split graphs.
//! 2. **Marginal mismatch**: histograms must sum to 1 (within [`HISTOGRAM_TOLERANCE`]).
//! 3. **Infeasible warm starts**: a random plan whose sums drift by more than the
//!    solver's tolerance is rejected with [`Error::InfeasibleInitialPlan`]. The
//!    multi-start loop skips such restarts.
//!
//! ## References
//!
//! - Vayer, Chapel, Flamary, Tavenard, Courty (2019). "Optimal Transport for structured
//!   data with application on graphs"
//! - Mémoli (2011). "Gromov-Wasserstein Distances and the Metric Approach to Object Matching"
//! - Peyré, Cuturi, Solomon (2016). "Gromov-Wasserstein Averaging of Kernel and Distance Matrices"

use ndarray::{Array1, Array2};
use thiserror::Error;

pub mod augment;
pub mod emd;
pub mod graph;
pub mod gromov;
pub mod multistart;
pub mod plan;

pub use augment::{augment, Augmented, AugmentedDistance, AugmentedLabel, CROSS_TYPE_DISTANCE};
pub use emd::{emd, emd_with_max_pivots};
pub use graph::{
    feature_distances, structural_distances, uniform, validate_histogram, LabeledGraph,
    HISTOGRAM_TOLERANCE, UNREACHABLE_DISTANCE,
};
pub use gromov::{fgw_objective, FusedGromovWasserstein};
pub use multistart::{multi_start, MultiStartConfig};
#[cfg(feature = "parallel")]
pub use multistart::multi_start_par;
pub use plan::{random_plan, random_plan_with_threshold};

/// FGW error variants.
#[derive(Debug, Error)]
pub enum Error {
    /// Two things that must have the same length do not.
    #[error("length mismatch: expected {0}, got {1}")]
    LengthMismatch(usize, usize),

    /// Matrix shape mismatch.
    #[error("matrix shape mismatch: expected ({0}, {1}), got ({2}, {3})")]
    CostShapeMismatch(usize, usize, usize, usize),

    /// Histogram does not sum to 1.0.
    #[error("histogram does not sum to 1.0 (sum = {0})")]
    NotNormalized(f64),

    /// Histogram has a negative or non-finite entry.
    #[error("histogram entry {0} is negative or not finite: {1}")]
    NegativeMass(usize, f64),

    /// A mixing coefficient (`alpha` or `beta`) outside `[0, 1]`.
    #[error("mixing coefficient must lie in [0, 1], got {0}")]
    InvalidMixing(f64),

    /// A warm-start plan whose marginals do not match the histograms.
    ///
    /// This is the only error the multi-start loop recovers from.
    #[error("initial plan marginals deviate from histograms (max error = {0:e})")]
    InfeasibleInitialPlan(f64),

    /// Domain error (invalid inputs for the mathematical definition).
    #[error("{0}")]
    Domain(&'static str),
}

/// Result type for FGW operations.
pub type Result<T> = std::result::Result<T, Error>;

const EPSILON: f64 = 1e-12;

/// A transport plan together with the objective the solver reached with it.
#[derive(Debug, Clone, PartialEq)]
pub struct Coupling {
    /// FGW objective at `plan`.
    pub objective: f64,
    /// `n₁ × n₂` coupling; rows follow `p`, columns follow `q`.
    pub plan: Array2<f64>,
}

/// Borrowed inputs of one FGW solve.
///
/// Construct with [`FgwProblem::new`], which checks every shape and histogram up front so
/// solver backends never see malformed input.
#[derive(Debug, Clone, Copy)]
pub struct FgwProblem<'a> {
    /// Feature distance matrix `M` (n₁ × n₂).
    pub cost: &'a Array2<f64>,
    /// Structure matrix of the source graph (n₁ × n₁).
    pub c1: &'a Array2<f64>,
    /// Structure matrix of the target graph (n₂ × n₂).
    pub c2: &'a Array2<f64>,
    /// Source histogram (n₁).
    pub p: &'a Array1<f64>,
    /// Target histogram (n₂).
    pub q: &'a Array1<f64>,
    /// Structure/feature trade-off: `0` is pure Wasserstein on `cost`, `1` pure GW.
    pub alpha: f64,
}

impl<'a> FgwProblem<'a> {
    /// Validate and bundle the inputs.
    pub fn new(
        cost: &'a Array2<f64>,
        c1: &'a Array2<f64>,
        c2: &'a Array2<f64>,
        p: &'a Array1<f64>,
        q: &'a Array1<f64>,
        alpha: f64,
    ) -> Result<Self> {
        let n1 = c1.nrows();
        let n2 = c2.nrows();
        if c1.ncols() != n1 {
            return Err(Error::CostShapeMismatch(n1, n1, c1.nrows(), c1.ncols()));
        }
        if c2.ncols() != n2 {
            return Err(Error::CostShapeMismatch(n2, n2, c2.nrows(), c2.ncols()));
        }
        if cost.nrows() != n1 || cost.ncols() != n2 {
            return Err(Error::CostShapeMismatch(n1, n2, cost.nrows(), cost.ncols()));
        }
        if n1 == 0 || n2 == 0 {
            return Err(Error::Domain("FGW requires non-empty graphs"));
        }
        validate_histogram(p, n1)?;
        validate_histogram(q, n2)?;
        if !(0.0..=1.0).contains(&alpha) {
            return Err(Error::InvalidMixing(alpha));
        }
        Ok(Self { cost, c1, c2, p, q, alpha })
    }

    /// `(n₁, n₂)`.
    pub fn dims(&self) -> (usize, usize) {
        (self.p.len(), self.q.len())
    }
}

/// An FGW solver backend.
///
/// The multi-start loop only depends on this trait. Backends must:
/// - start from `p qᵀ` (or their own default) when `init` is `None`, and always succeed
///   on a valid [`FgwProblem`] in that case;
/// - return [`Error::InfeasibleInitialPlan`] when `init` does not satisfy their marginal
///   requirements, and use no other error for that situation.
pub trait TransportSolver {
    /// Solve `problem`, optionally warm-started from `init`.
    fn solve(&self, problem: &FgwProblem<'_>, init: Option<&Array2<f64>>) -> Result<Coupling>;
}

/// FGW between two node-labeled graphs with uniform node weights.
///
/// Builds both structure matrices and the label cost matrix, then runs
/// [`multi_start`] with the default [`FusedGromovWasserstein`] backend.
pub fn graph_fgw<N, E, D, R>(
    g1: &LabeledGraph<N, E>,
    g2: &LabeledGraph<N, E>,
    d: D,
    alpha: f64,
    config: &MultiStartConfig,
    rng: &mut R,
) -> Result<Coupling>
where
    D: Fn(&N, &N) -> f64,
    R: rand::Rng + ?Sized,
{
    let c1 = structural_distances(g1);
    let c2 = structural_distances(g2);
    let cost = feature_distances(g1, g2, d);
    let p = uniform(g1.node_count());
    let q = uniform(g2.node_count());
    let problem = FgwProblem::new(&cost, &c1, &c2, &p, &q, alpha)?;
    multi_start(&FusedGromovWasserstein::default(), &problem, config, rng)
}
