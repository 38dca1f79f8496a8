//! Random feasible transport plans.
//!
//! A greedy randomized allocation: repeatedly pick a random source bin and a random
//! target bin that both still have mass, and move a random share of what they can
//! exchange. The result is always feasible, and two draws are rarely alike, which makes
//! it a good warm start for non-convex solvers: unlike `p qᵀ`, restarts from random
//! plans land in different local optima.
//!
//! Randomness is injected (`&mut impl Rng`), so a seeded generator reproduces a plan
//! bit for bit.

use ndarray::{Array1, Array2};
use rand::Rng;

/// Sample a random plan with marginals `p` (rows) and `q` (columns).
///
/// Uses an exhaustion threshold of `1e-10 / p.len()`; see
/// [`random_plan_with_threshold`].
pub fn random_plan<R: Rng + ?Sized>(
    p: &Array1<f64>,
    q: &Array1<f64>,
    rng: &mut R,
) -> Array2<f64> {
    let threshold = 1e-10 / p.len().max(1) as f64;
    random_plan_with_threshold(p, q, threshold, rng)
}

/// Sample a random plan with marginals `p` (rows) and `q` (columns).
///
/// While some row and some column still hold mass, one of each is drawn uniformly. If
/// either holds less than `threshold`, the smaller of the two remaining masses moves in
/// full; otherwise a uniform `[0, 1)` fraction of it does. A row or column leaves the
/// draw once its remaining mass is exactly zero.
///
/// When `p` and `q` carry the same total mass, the row sums equal `p` and the column
/// sums equal `q` up to rounding. Entries are never negative.
pub fn random_plan_with_threshold<R: Rng + ?Sized>(
    p: &Array1<f64>,
    q: &Array1<f64>,
    threshold: f64,
    rng: &mut R,
) -> Array2<f64> {
    let n = p.len();
    let m = q.len();
    let mut plan = Array2::zeros((n, m));

    let mut rest_p = p.to_vec();
    let mut rest_q = q.to_vec();
    let mut rows: Vec<usize> = (0..n).collect();
    let mut cols: Vec<usize> = (0..m).collect();

    while !rows.is_empty() && !cols.is_empty() {
        let ri = rng.random_range(0..rows.len());
        let ci = rng.random_range(0..cols.len());
        let (i, j) = (rows[ri], cols[ci]);

        let room = rest_p[i].min(rest_q[j]);
        let t = if rest_p[i] < threshold || rest_q[j] < threshold {
            room
        } else {
            rng.random::<f64>() * room
        };

        rest_p[i] -= t;
        rest_q[j] -= t;
        plan[[i, j]] += t;

        // `x - min(x, y)` is exactly 0.0 on the exhausted side.
        if rest_p[i] <= 0.0 {
            rows.remove(ri);
        }
        if rest_q[j] <= 0.0 {
            cols.remove(ci);
        }
    }

    plan
}
