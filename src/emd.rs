//! Exact optimal transport (earth mover's distance) by the transportation simplex.
//!
//! Solves the linear program
//!
//! $\min_P \langle C, P \rangle \quad \text{s.t.} \quad P \mathbf{1} = a,\; P^\top \mathbf{1} = b,\; P \ge 0$
//!
//! exactly. The optimum is a vertex of the transport polytope: a plan supported on a
//! spanning tree of at most `n + m - 1` cells.
//!
//! This is the linear subproblem of every conditional-gradient step in
//! [`crate::gromov`]. Unlike an entropic solver it has no regularization scale, so a
//! cost matrix mixing huge sentinel entries with unit-size differences is still solved
//! on every entry.
//!
//! # Algorithm
//!
//! 1. Zero-mass rows and columns are dropped; their plan entries stay exactly 0.
//! 2. North-west corner rule for an initial basic feasible plan.
//! 3. Pivot: dual potentials `u_i + v_j = C_ij` on the basis, enter the cell with the
//!    most negative reduced cost `C_ij - u_i - v_j`, and push mass around the cycle it
//!    closes in the basis tree.
//! 4. Stop when no reduced cost is negative (optimal), or after `max_pivots` pivots
//!    (the current plan is feasible but possibly suboptimal).
//!
//! # Complexity
//!
//! O(n m) per pivot. Meant for graph-sized problems (up to a few hundred bins).

use crate::{Error, Result};
use ndarray::{Array1, Array2};
use std::collections::VecDeque;

/// Pivot limit used by [`emd`].
pub const DEFAULT_MAX_PIVOTS: usize = 100_000;

/// Exact optimal plan between histograms `a` (rows) and `b` (columns).
///
/// See [`emd_with_max_pivots`].
pub fn emd(a: &Array1<f64>, b: &Array1<f64>, cost: &Array2<f64>) -> Result<Array2<f64>> {
    emd_with_max_pivots(a, b, cost, DEFAULT_MAX_PIVOTS)
}

/// Exact optimal plan between histograms `a` (rows) and `b` (columns).
///
/// `b` is rescaled to the total mass of `a`, so the row sums are `a` and the column sums
/// are `b` up to rounding when both sum to the same value. Entries are never negative.
///
/// # Errors
///
/// [`Error::CostShapeMismatch`] if `cost` is not `a.len() × b.len()`.
pub fn emd_with_max_pivots(
    a: &Array1<f64>,
    b: &Array1<f64>,
    cost: &Array2<f64>,
    max_pivots: usize,
) -> Result<Array2<f64>> {
    let (n, m) = (a.len(), b.len());
    if cost.nrows() != n || cost.ncols() != m {
        return Err(Error::CostShapeMismatch(n, m, cost.nrows(), cost.ncols()));
    }

    let mut plan = Array2::zeros((n, m));
    let rows: Vec<usize> = (0..n).filter(|&i| a[i] > 0.0).collect();
    let cols: Vec<usize> = (0..m).filter(|&j| b[j] > 0.0).collect();
    if rows.is_empty() || cols.is_empty() {
        return Ok(plan);
    }

    let supply: Vec<f64> = rows.iter().map(|&i| a[i]).collect();
    let total_demand: f64 = cols.iter().map(|&j| b[j]).sum();
    let scale = supply.iter().sum::<f64>() / total_demand;
    let demand: Vec<f64> = cols.iter().map(|&j| b[j] * scale).collect();
    let c = Array2::from_shape_fn((rows.len(), cols.len()), |(i, j)| cost[[rows[i], cols[j]]]);

    // Reduced costs are differences of entries of `c`; ignore noise at its scale.
    let tol = 1e-12 * c.iter().fold(1.0f64, |acc, x| acc.max(x.abs()));

    let mut basis = Basis::north_west(&supply, &demand);
    let mut pivots = 0;
    while let Some(entering) = basis.entering(&c, tol) {
        if pivots == max_pivots {
            log::debug!("emd: stopped after {} pivots", pivots);
            break;
        }
        basis.pivot(entering);
        pivots += 1;
    }
    log::trace!("emd: {}x{} solved in {} pivots", rows.len(), cols.len(), pivots);

    for ((i, j), &x) in basis.flow.indexed_iter() {
        plan[[rows[i], cols[j]]] = x;
    }
    Ok(plan)
}

#[derive(Debug, Clone, Copy)]
enum Node {
    Row(usize),
    Col(usize),
}

/// A basic feasible plan: `n + m - 1` basic cells forming a spanning tree over the
/// row and column nodes. Degenerate basic cells carry zero flow.
struct Basis {
    flow: Array2<f64>,
    basic: Array2<bool>,
}

impl Basis {
    fn north_west(supply: &[f64], demand: &[f64]) -> Self {
        let (nr, nc) = (supply.len(), demand.len());
        let mut flow = Array2::zeros((nr, nc));
        let mut basic = Array2::from_elem((nr, nc), false);
        let mut rest_s = supply.to_vec();
        let mut rest_d = demand.to_vec();

        let (mut i, mut j) = (0, 0);
        loop {
            let t = rest_s[i].min(rest_d[j]);
            flow[[i, j]] = t;
            basic[[i, j]] = true;
            rest_s[i] -= t;
            rest_d[j] -= t;
            if i + 1 == nr && j + 1 == nc {
                break;
            }
            // Exactly one index advances per cell, so the basis has nr + nc - 1 cells.
            if i + 1 < nr && (rest_s[i] <= rest_d[j] || j + 1 == nc) {
                i += 1;
            } else {
                j += 1;
            }
        }
        Self { flow, basic }
    }

    /// Dual potentials with `u[i] + v[j] = c[i][j]` on every basic cell and `u[0] = 0`.
    fn potentials(&self, c: &Array2<f64>) -> (Vec<f64>, Vec<f64>) {
        let (nr, nc) = self.flow.dim();
        let mut u = vec![0.0; nr];
        let mut v = vec![0.0; nc];
        let mut row_seen = vec![false; nr];
        let mut col_seen = vec![false; nc];
        row_seen[0] = true;

        let mut stack = vec![Node::Row(0)];
        while let Some(node) = stack.pop() {
            match node {
                Node::Row(i) => {
                    for j in 0..nc {
                        if self.basic[[i, j]] && !col_seen[j] {
                            col_seen[j] = true;
                            v[j] = c[[i, j]] - u[i];
                            stack.push(Node::Col(j));
                        }
                    }
                }
                Node::Col(j) => {
                    for i in 0..nr {
                        if self.basic[[i, j]] && !row_seen[i] {
                            row_seen[i] = true;
                            u[i] = c[[i, j]] - v[j];
                            stack.push(Node::Row(i));
                        }
                    }
                }
            }
        }
        (u, v)
    }

    /// Non-basic cell with the most negative reduced cost below `-tol` (Dantzig's rule).
    fn entering(&self, c: &Array2<f64>, tol: f64) -> Option<(usize, usize)> {
        let (u, v) = self.potentials(c);
        let mut best = -tol;
        let mut entering = None;
        for ((i, j), &cij) in c.indexed_iter() {
            if self.basic[[i, j]] {
                continue;
            }
            let reduced = cij - u[i] - v[j];
            if reduced < best {
                best = reduced;
                entering = Some((i, j));
            }
        }
        entering
    }

    /// Basic cells on the tree path from row `from` to column `to`, starting at `from`.
    fn tree_path(&self, from: usize, to: usize) -> Vec<(usize, usize)> {
        let (nr, nc) = self.flow.dim();
        let mut row_parent: Vec<Option<usize>> = vec![None; nr];
        let mut col_parent: Vec<Option<usize>> = vec![None; nc];
        let mut row_seen = vec![false; nr];
        let mut col_seen = vec![false; nc];
        row_seen[from] = true;

        let mut queue = VecDeque::from([Node::Row(from)]);
        while let Some(node) = queue.pop_front() {
            match node {
                Node::Row(i) => {
                    for j in 0..nc {
                        if self.basic[[i, j]] && !col_seen[j] {
                            col_seen[j] = true;
                            col_parent[j] = Some(i);
                            queue.push_back(Node::Col(j));
                        }
                    }
                }
                Node::Col(j) if j == to => break,
                Node::Col(j) => {
                    for i in 0..nr {
                        if self.basic[[i, j]] && !row_seen[i] {
                            row_seen[i] = true;
                            row_parent[i] = Some(j);
                            queue.push_back(Node::Row(i));
                        }
                    }
                }
            }
        }

        let mut cells = Vec::new();
        let mut j = to;
        while let Some(i) = col_parent[j] {
            cells.push((i, j));
            match row_parent[i] {
                Some(parent) => {
                    cells.push((i, parent));
                    j = parent;
                }
                None => break,
            }
        }
        cells.reverse();
        cells
    }

    /// Bring `entering` into the basis and drop the first cell that runs out of flow.
    fn pivot(&mut self, entering: (usize, usize)) {
        let (ei, ej) = entering;
        let cycle = self.tree_path(ei, ej);

        // Around the cycle closed by `entering`, path cells alternate between losing and
        // gaining flow, starting with a loser next to row `ei`.
        let theta = cycle
            .iter()
            .step_by(2)
            .map(|&cell| self.flow[cell])
            .fold(f64::INFINITY, f64::min);
        let Some(leaving) = cycle
            .iter()
            .step_by(2)
            .copied()
            .find(|&cell| self.flow[cell] == theta)
        else {
            return;
        };

        self.flow[entering] += theta;
        for (k, &cell) in cycle.iter().enumerate() {
            if k % 2 == 0 {
                self.flow[cell] -= theta;
            } else {
                self.flow[cell] += theta;
            }
        }
        self.flow[leaving] = 0.0;
        self.basic[leaving] = false;
        self.basic[entering] = true;
    }
}
