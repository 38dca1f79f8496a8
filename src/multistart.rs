//! Multi-start search over a non-convex FGW objective.
//!
//! One baseline solve from the solver's default start, then `restarts` solves warm-started
//! from random feasible plans ([`crate::plan::random_plan`]). The best non-negative
//! objective wins.
//!
//! A restart whose random plan the solver rejects ([`Error::InfeasibleInitialPlan`]) is
//! skipped; any other solver error aborts the search.

use crate::plan::random_plan;
use crate::{Coupling, Error, FgwProblem, Result, TransportSolver};
use log::Level;
use rand::Rng;

/// Configuration for [`multi_start`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MultiStartConfig {
    /// Number of randomized restarts after the baseline solve.
    pub restarts: usize,
    /// Report per-restart progress at `info` (and skipped restarts at `warn`) instead of
    /// `debug`. Has no effect on the result.
    pub verbose: bool,
}

impl Default for MultiStartConfig {
    fn default() -> Self {
        Self {
            restarts: 100,
            verbose: false,
        }
    }
}

/// Baseline solve followed by `config.restarts` randomized restarts.
///
/// The returned objective is never larger than the baseline's (unless the baseline was
/// negative, which is treated as invalid and replaced by the first non-negative result),
/// and with `restarts = 0` the baseline is returned as is.
///
/// Given the same `rng` state and inputs, the result is bit-identical across runs.
pub fn multi_start<S, R>(
    solver: &S,
    problem: &FgwProblem<'_>,
    config: &MultiStartConfig,
    rng: &mut R,
) -> Result<Coupling>
where
    S: TransportSolver + ?Sized,
    R: Rng + ?Sized,
{
    let mut best = solver.solve(problem, None)?;
    log::debug!("baseline objective {:.6e}", best.objective);

    for i in 0..config.restarts {
        let init = random_plan(problem.p, problem.q, rng);
        let outcome = solver.solve(problem, Some(&init));
        absorb(&mut best, outcome, i, config)?;
    }

    log::debug!(
        "best objective {:.6e} after {} restarts",
        best.objective,
        config.restarts
    );
    Ok(best)
}

/// Parallel [`multi_start`].
///
/// Restart `i` draws its plan from `ChaCha8Rng` seeded with `seed` on stream `i`, and
/// outcomes are folded in restart order, so the result depends on `seed` only, never on
/// the thread count. It differs from [`multi_start`] with a `ChaCha8Rng` seeded the same
/// way, which draws all plans from one stream.
#[cfg(feature = "parallel")]
pub fn multi_start_par<S>(
    solver: &S,
    problem: &FgwProblem<'_>,
    config: &MultiStartConfig,
    seed: u64,
) -> Result<Coupling>
where
    S: TransportSolver + Sync + ?Sized,
{
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rayon::prelude::*;

    let mut best = solver.solve(problem, None)?;
    log::debug!("baseline objective {:.6e}", best.objective);

    let outcomes: Vec<Result<Coupling>> = (0..config.restarts)
        .into_par_iter()
        .map(|i| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            rng.set_stream(i as u64);
            let init = random_plan(problem.p, problem.q, &mut rng);
            solver.solve(problem, Some(&init))
        })
        .collect();

    for (i, outcome) in outcomes.into_iter().enumerate() {
        absorb(&mut best, outcome, i, config)?;
    }

    log::debug!(
        "best objective {:.6e} after {} restarts",
        best.objective,
        config.restarts
    );
    Ok(best)
}

/// Fold one restart into the running best.
fn absorb(
    best: &mut Coupling,
    outcome: Result<Coupling>,
    iteration: usize,
    config: &MultiStartConfig,
) -> Result<()> {
    let level = if config.verbose { Level::Info } else { Level::Debug };
    match outcome {
        Ok(candidate) => {
            log::log!(
                level,
                "restart {}/{}: objective {:.6e}",
                iteration + 1,
                config.restarts,
                candidate.objective
            );
            if improves(candidate.objective, best.objective) {
                *best = candidate;
            }
            Ok(())
        }
        Err(Error::InfeasibleInitialPlan(err)) => {
            let level = if config.verbose { Level::Warn } else { Level::Debug };
            log::log!(
                level,
                "restart {}/{}: random plan rejected (marginal error {:.3e})",
                iteration + 1,
                config.restarts,
                err
            );
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// A negative running best is a degenerate solver result; any valid objective beats it.
fn improves(candidate: f64, best: f64) -> bool {
    candidate >= 0.0 && (candidate < best || best < 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gromov::FusedGromovWasserstein;
    use ndarray::{array, Array1, Array2};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    /// Replays canned outcomes, one per call.
    struct Scripted {
        outcomes: RefCell<VecDeque<Result<f64>>>,
        warm_starts: Cell<usize>,
    }

    impl Scripted {
        fn new(outcomes: Vec<Result<f64>>) -> Self {
            Self {
                outcomes: RefCell::new(outcomes.into()),
                warm_starts: Cell::new(0),
            }
        }
    }

    impl TransportSolver for Scripted {
        fn solve(&self, problem: &FgwProblem<'_>, init: Option<&Array2<f64>>) -> Result<Coupling> {
            if init.is_some() {
                self.warm_starts.set(self.warm_starts.get() + 1);
            }
            let next = self
                .outcomes
                .borrow_mut()
                .pop_front()
                .unwrap_or(Err(Error::Domain("script exhausted")));
            let objective = next?;
            // Encode the objective in the plan so tests can tell couplings apart.
            let plan = Array2::from_elem(problem.dims(), objective);
            Ok(Coupling { objective, plan })
        }
    }

    struct Fixture {
        cost: Array2<f64>,
        c1: Array2<f64>,
        c2: Array2<f64>,
        p: Array1<f64>,
        q: Array1<f64>,
    }

    impl Fixture {
        fn path_vs_star() -> Self {
            Self {
                cost: array![[0.0, 1.0, 1.0, 0.0], [1.0, 0.0, 0.0, 1.0], [0.0, 1.0, 1.0, 0.0]],
                c1: array![[0.0, 1.0, 2.0], [1.0, 0.0, 1.0], [2.0, 1.0, 0.0]],
                c2: array![
                    [0.0, 1.0, 1.0, 1.0],
                    [1.0, 0.0, 2.0, 2.0],
                    [1.0, 2.0, 0.0, 2.0],
                    [1.0, 2.0, 2.0, 0.0]
                ],
                p: Array1::from_elem(3, 1.0 / 3.0),
                q: Array1::from_elem(4, 0.25),
            }
        }

        fn problem(&self, alpha: f64) -> FgwProblem<'_> {
            FgwProblem::new(&self.cost, &self.c1, &self.c2, &self.p, &self.q, alpha).unwrap()
        }
    }

    fn config(restarts: usize) -> MultiStartConfig {
        MultiStartConfig {
            restarts,
            ..Default::default()
        }
    }

    #[test]
    fn keeps_the_smallest_valid_objective() {
        let fx = Fixture::path_vs_star();
        let solver = Scripted::new(vec![
            Ok(5.0),
            Ok(3.0),
            Err(Error::InfeasibleInitialPlan(1e-6)),
            Ok(4.0),
            Ok(-1.0),
            Ok(2.0),
            Ok(2.5),
        ]);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let best = multi_start(&solver, &fx.problem(0.5), &config(6), &mut rng).unwrap();
        assert_eq!(best.objective, 2.0);
        assert!(best.plan.iter().all(|&x| x == 2.0));
        assert_eq!(solver.warm_starts.get(), 6);
    }

    #[test]
    fn negative_baseline_is_replaced() {
        let fx = Fixture::path_vs_star();
        let solver = Scripted::new(vec![Ok(-0.5), Ok(7.0), Ok(9.0)]);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let best = multi_start(&solver, &fx.problem(0.5), &config(2), &mut rng).unwrap();
        assert_eq!(best.objective, 7.0);
    }

    #[test]
    fn all_restarts_infeasible_keeps_baseline() {
        let fx = Fixture::path_vs_star();
        let solver = Scripted::new(vec![
            Ok(1.0),
            Err(Error::InfeasibleInitialPlan(1e-5)),
            Err(Error::InfeasibleInitialPlan(1e-5)),
        ]);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let best = multi_start(&solver, &fx.problem(0.5), &config(2), &mut rng).unwrap();
        assert_eq!(best.objective, 1.0);
    }

    #[test]
    fn other_solver_errors_propagate() {
        let fx = Fixture::path_vs_star();
        let solver = Scripted::new(vec![
            Ok(1.0),
            Ok(0.5),
            Err(Error::CostShapeMismatch(3, 4, 2, 2)),
            Ok(0.1),
        ]);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let err = multi_start(&solver, &fx.problem(0.5), &config(3), &mut rng).unwrap_err();
        assert!(matches!(err, Error::CostShapeMismatch(3, 4, 2, 2)));

        let failing_baseline = Scripted::new(vec![Err(Error::Domain("boom"))]);
        assert!(multi_start(&failing_baseline, &fx.problem(0.5), &config(3), &mut rng).is_err());
    }

    #[test]
    fn zero_restarts_is_the_baseline() {
        let fx = Fixture::path_vs_star();
        let problem = fx.problem(0.5);
        let solver = FusedGromovWasserstein::default();
        let baseline = solver.solve(&problem, None).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let best = multi_start(&solver, &problem, &config(0), &mut rng).unwrap();
        assert_eq!(best, baseline);
    }

    #[test]
    fn never_worse_than_baseline() {
        let fx = Fixture::path_vs_star();
        for alpha in [0.0, 0.5, 1.0] {
            let problem = fx.problem(alpha);
            let solver = FusedGromovWasserstein::default();
            let baseline = solver.solve(&problem, None).unwrap();
            let mut rng = ChaCha8Rng::seed_from_u64(3);
            let best = multi_start(&solver, &problem, &config(8), &mut rng).unwrap();
            assert!(
                best.objective <= baseline.objective,
                "alpha={alpha}: {} > {}",
                best.objective,
                baseline.objective
            );
        }
    }

    #[test]
    fn same_seed_same_result() {
        let fx = Fixture::path_vs_star();
        let problem = fx.problem(0.5);
        let solver = FusedGromovWasserstein::default();
        let a = multi_start(&solver, &problem, &config(5), &mut ChaCha8Rng::seed_from_u64(42))
            .unwrap();
        let b = multi_start(&solver, &problem, &config(5), &mut ChaCha8Rng::seed_from_u64(42))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn improves_rule() {
        assert!(improves(1.0, 2.0));
        assert!(!improves(2.0, 2.0));
        assert!(!improves(-0.1, 2.0));
        assert!(improves(5.0, -1.0));
        assert!(!improves(f64::NAN, 1.0));
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn parallel_is_deterministic_and_monotone() {
        let fx = Fixture::path_vs_star();
        let problem = fx.problem(0.5);
        let solver = FusedGromovWasserstein::default();
        let baseline = solver.solve(&problem, None).unwrap();
        let a = multi_start_par(&solver, &problem, &config(6), 9).unwrap();
        let b = multi_start_par(&solver, &problem, &config(6), 9).unwrap();
        assert_eq!(a, b);
        assert!(a.objective <= baseline.objective);
    }
}
