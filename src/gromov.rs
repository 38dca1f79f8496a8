//! Fused Gromov-Wasserstein by conditional gradient.
//!
//! Matches two labeled metric spaces (C1, p) and (C2, q) with label costs M by
//! minimizing, over couplings P of p and q,
//!
//! $FGW(P) = (1-\alpha) \langle M, P \rangle + \alpha \sum_{ijkl} (C_1(i,k) - C_2(j,l))^2 P_{ij} P_{kl}$
//!
//! For square loss and P with exact marginals, the quadratic term factors as
//! $\langle \text{constC} - 2 C_1 P C_2^\top, P \rangle$ with
//! $\text{constC}_{ij} = (C_1^{\circ 2} p)_i + (C_2^{\circ 2} q)_j$, which avoids the
//! O(n⁴) tensor.
//!
//! Each iteration linearizes the objective at P, solves the linear problem exactly
//! ([`crate::emd`]), and moves toward that vertex with an exact line search. The objective
//! never increases along the iterations, so the solver only descends into the basin of
//! its starting plan.

use crate::emd::{emd_with_max_pivots, DEFAULT_MAX_PIVOTS};
use crate::{Coupling, Error, FgwProblem, Result, TransportSolver, EPSILON};
use ndarray::{Array1, Array2, Axis};

/// Conditional-gradient FGW solver.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FusedGromovWasserstein {
    /// Maximum number of Frank-Wolfe iterations.
    pub max_iter: usize,
    /// Stop once the objective changes by less than `tol`, absolutely or relatively.
    pub tol: f64,
    /// Pivot limit of each exact linear subproblem.
    pub max_pivots: usize,
    /// Absolute tolerance on warm-start row/column sums.
    pub marginal_atol: f64,
    /// Relative tolerance on warm-start row/column sums.
    pub marginal_rtol: f64,
}

impl Default for FusedGromovWasserstein {
    fn default() -> Self {
        Self {
            max_iter: 50,
            tol: 1e-9,
            max_pivots: DEFAULT_MAX_PIVOTS,
            marginal_atol: 1e-8,
            marginal_rtol: 1e-7,
        }
    }
}

impl TransportSolver for FusedGromovWasserstein {
    fn solve(&self, problem: &FgwProblem<'_>, init: Option<&Array2<f64>>) -> Result<Coupling> {
        let (n1, n2) = problem.dims();
        let (p, q) = (problem.p, problem.q);
        let alpha = problem.alpha;

        let mut plan = match init {
            Some(init) => {
                if init.nrows() != n1 || init.ncols() != n2 {
                    return Err(Error::CostShapeMismatch(n1, n2, init.nrows(), init.ncols()));
                }
                let err = marginal_error(init, p, q, self.marginal_atol, self.marginal_rtol);
                if err > 0.0 {
                    return Err(Error::InfeasibleInitialPlan(err));
                }
                init.clone()
            }
            None => outer(p, q),
        };

        let const_c = const_c(problem);
        let c2t = problem.c2.t();
        let mut c1pc2 = problem.c1.dot(&plan).dot(&c2t);
        let mut f = objective(problem, &const_c, &c1pc2, &plan);

        for iter in 0..self.max_iter {
            // grad = (1-α) M + 2α (constC - 2 C1 P C2ᵀ)
            let grad = (1.0 - alpha) * problem.cost + (&const_c - &(2.0 * &c1pc2)) * (2.0 * alpha);
            let direction = emd_with_max_pivots(p, q, &grad, self.max_pivots)?;

            let delta = &direction - &plan;
            let c1dc2 = problem.c1.dot(&delta).dot(&c2t);

            // FGW(P + τΔ) = f + b τ + a τ²
            let a = -2.0 * alpha * dot(&c1dc2, &delta);
            let b = (1.0 - alpha) * dot(problem.cost, &delta) + alpha * dot(&const_c, &delta)
                - 2.0 * alpha * (dot(&c1dc2, &plan) + dot(&c1pc2, &delta));
            let tau = line_search(a, b);
            if tau == 0.0 {
                log::trace!("fgw: zero step at iteration {}", iter);
                break;
            }

            plan.scaled_add(tau, &delta);
            c1pc2.scaled_add(tau, &c1dc2);
            let f_new = objective(problem, &const_c, &c1pc2, &plan);

            let abs_change = (f_new - f).abs();
            let rel_change = abs_change / f_new.abs().max(EPSILON);
            f = f_new;
            if abs_change <= self.tol || rel_change <= self.tol {
                break;
            }
        }

        Ok(Coupling { objective: f, plan })
    }
}

/// FGW objective of `plan`, assuming its marginals match the problem's histograms.
pub fn fgw_objective(problem: &FgwProblem<'_>, plan: &Array2<f64>) -> f64 {
    let const_c = const_c(problem);
    let c1pc2 = problem.c1.dot(plan).dot(&problem.c2.t());
    objective(problem, &const_c, &c1pc2, plan)
}

fn objective(
    problem: &FgwProblem<'_>,
    const_c: &Array2<f64>,
    c1pc2: &Array2<f64>,
    plan: &Array2<f64>,
) -> f64 {
    let alpha = problem.alpha;
    let linear = dot(problem.cost, plan);
    // A sum of squares under exact marginals; anything below zero is cancellation.
    let structure = (dot(const_c, plan) - 2.0 * dot(c1pc2, plan)).max(0.0);
    (1.0 - alpha) * linear + alpha * structure
}

/// `constC[i][j] = Σ_k C1(i,k)² p_k + Σ_l C2(j,l)² q_l`.
fn const_c(problem: &FgwProblem<'_>) -> Array2<f64> {
    let rows = problem.c1.mapv(|x| x * x).dot(problem.p);
    let cols = problem.c2.mapv(|x| x * x).dot(problem.q);
    Array2::from_shape_fn((rows.len(), cols.len()), |(i, j)| rows[i] + cols[j])
}

fn outer(p: &Array1<f64>, q: &Array1<f64>) -> Array2<f64> {
    Array2::from_shape_fn((p.len(), q.len()), |(i, j)| p[i] * q[j])
}

fn dot(a: &Array2<f64>, b: &Array2<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Minimize `a τ² + b τ` over `τ ∈ [0, 1]`.
fn line_search(a: f64, b: f64) -> f64 {
    if a > 0.0 {
        (-b / (2.0 * a)).clamp(0.0, 1.0)
    } else if a + b < 0.0 {
        1.0
    } else {
        0.0
    }
}

/// Largest row/column sum violation beyond `atol + rtol · |target|`, or 0.0 if none.
fn marginal_error(
    plan: &Array2<f64>,
    p: &Array1<f64>,
    q: &Array1<f64>,
    atol: f64,
    rtol: f64,
) -> f64 {
    let rows = plan.sum_axis(Axis(1));
    let cols = plan.sum_axis(Axis(0));
    rows.iter()
        .zip(p.iter())
        .chain(cols.iter().zip(q.iter()))
        .map(|(&s, &t)| (s - t).abs())
        .zip(p.iter().chain(q.iter()))
        .filter(|&(err, &t)| err > atol + rtol * t.abs())
        .map(|(err, _)| err)
        .fold(0.0, f64::max)
}
