//! Assignment strategies: affinity matrix -> discrete correspondence.
//!
//! The refinement loop is generic over [`AssignmentStrategy`]; the three
//! implementations trade optimality against cost. Arg-max is O(Nx·Ny),
//! Hungarian is bipartite-optimal at O(n³), Sinkhorn normalizes the
//! affinity towards a doubly stochastic matrix before the arg-max readout.

use nalgebra::DMatrix;
use shapecorr_core::{Correspondence, Error, Result};

/// Extracts a discrete correspondence from a dense affinity matrix.
///
/// Row p of the matrix scores vertex p of mesh X against every vertex of
/// mesh Y; larger is better. Implementations choose how many pairs to emit
/// (arg-max emits one per row, Hungarian one per row or column, whichever
/// side is smaller).
pub trait AssignmentStrategy {
    fn assign(&self, affinity: &DMatrix<f64>) -> Result<Correspondence>;
}

fn require_columns(affinity: &DMatrix<f64>) -> Result<()> {
    if affinity.nrows() > 0 && affinity.ncols() == 0 {
        return Err(Error::Precondition(
            "affinity matrix has rows but no columns to assign to".into(),
        ));
    }
    Ok(())
}

fn row_arg_max(affinity: &DMatrix<f64>, row: usize) -> usize {
    let mut best = 0;
    let mut best_val = affinity[(row, 0)];
    for q in 1..affinity.ncols() {
        if affinity[(row, q)] > best_val {
            best_val = affinity[(row, q)];
            best = q;
        }
    }
    best
}

/// Row-wise arg-max: every source vertex takes its best-scoring target,
/// first column on ties. Targets may repeat.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArgMaxAssignment;

impl AssignmentStrategy for ArgMaxAssignment {
    fn assign(&self, affinity: &DMatrix<f64>) -> Result<Correspondence> {
        require_columns(affinity)?;
        let pairs: Vec<(usize, usize)> = (0..affinity.nrows())
            .map(|p| (p, row_arg_max(affinity, p)))
            .collect();
        Ok(Correspondence::from_pairs(&pairs))
    }
}

/// Bipartite-optimal one-to-one assignment maximizing total affinity
/// (Munkres on the complemented matrix). Emits min(Nx, Ny) pairs in row
/// order.
#[derive(Debug, Clone, Copy, Default)]
pub struct HungarianAssignment;

impl AssignmentStrategy for HungarianAssignment {
    fn assign(&self, affinity: &DMatrix<f64>) -> Result<Correspondence> {
        let rows = affinity.nrows();
        let cols = affinity.ncols();
        if rows == 0 || cols == 0 {
            return Ok(Correspondence::from_pairs(&[]));
        }
        let max_affinity = affinity.iter().cloned().fold(f64::MIN, f64::max);
        let cost = DMatrix::from_fn(rows, cols, |r, c| max_affinity - affinity[(r, c)]);
        let pairs = munkres_min_cost(&cost);
        Ok(Correspondence::from_pairs(&pairs))
    }
}

/// Minimum-cost assignment over a rectangular non-negative cost matrix.
/// Returns (row, col) pairs in row order, min(rows, cols) of them.
fn munkres_min_cost(cost: &DMatrix<f64>) -> Vec<(usize, usize)> {
    let rows = cost.nrows();
    let cols = cost.ncols();
    let n = rows.max(cols);

    // Pad to square with a value no real cell can beat.
    let max_val = cost.iter().cloned().fold(0.0f64, f64::max);
    let mut matrix = vec![0.0; n * n];
    for r in 0..n {
        for c in 0..n {
            matrix[r * n + c] = if r < rows && c < cols {
                cost[(r, c)]
            } else {
                max_val + 1.0
            };
        }
    }

    // Row reduction.
    for r in 0..n {
        let mut min_val = f64::INFINITY;
        for c in 0..n {
            min_val = min_val.min(matrix[r * n + c]);
        }
        for c in 0..n {
            matrix[r * n + c] -= min_val;
        }
    }

    // mask: 0=normal, 1=starred, 2=primed
    let mut mask = vec![0u8; n * n];
    let mut row_covered = vec![false; n];
    let mut col_covered = vec![false; n];

    for r in 0..n {
        for c in 0..n {
            if !row_covered[r] && !col_covered[c] && matrix[r * n + c].abs() < 1e-9 {
                mask[r * n + c] = 1;
                row_covered[r] = true;
                col_covered[c] = true;
            }
        }
    }
    row_covered.fill(false);
    col_covered.fill(false);

    let mut step = 3;
    let mut prime_rc = (0, 0);

    loop {
        match step {
            3 => {
                // Cover columns containing a starred zero.
                for r in 0..n {
                    for c in 0..n {
                        if mask[r * n + c] == 1 {
                            col_covered[c] = true;
                        }
                    }
                }
                let count = col_covered.iter().filter(|&&covered| covered).count();
                if count >= n {
                    break;
                }
                step = 4;
            }
            4 => {
                // Find an uncovered zero and prime it.
                if let Some((r, c)) = find_uncovered_zero(&matrix, &row_covered, &col_covered, n) {
                    mask[r * n + c] = 2;
                    if let Some(star_c) = find_star_in_row(&mask, r, n) {
                        row_covered[r] = true;
                        col_covered[star_c] = false;
                    } else {
                        prime_rc = (r, c);
                        step = 5;
                    }
                } else {
                    step = 6;
                }
            }
            5 => {
                // Alternate primed and starred zeros from the last prime,
                // then flip the path.
                let mut path = Vec::with_capacity(n);
                path.push(prime_rc);
                let mut curr_c = prime_rc.1;
                while let Some(r) = find_star_in_col(&mask, curr_c, n) {
                    path.push((r, curr_c));
                    match find_prime_in_row(&mask, r, n) {
                        Some(c) => {
                            path.push((r, c));
                            curr_c = c;
                        }
                        None => break,
                    }
                }
                for &(r, c) in &path {
                    mask[r * n + c] = if mask[r * n + c] == 1 { 0 } else { 1 };
                }
                row_covered.fill(false);
                col_covered.fill(false);
                for m in mask.iter_mut() {
                    if *m == 2 {
                        *m = 0;
                    }
                }
                step = 3;
            }
            6 => {
                // Shift the smallest uncovered value into the covered rows.
                let mut min_val = f64::INFINITY;
                for r in 0..n {
                    for c in 0..n {
                        if !row_covered[r] && !col_covered[c] {
                            min_val = min_val.min(matrix[r * n + c]);
                        }
                    }
                }
                for r in 0..n {
                    for c in 0..n {
                        if row_covered[r] {
                            matrix[r * n + c] += min_val;
                        }
                        if !col_covered[c] {
                            matrix[r * n + c] -= min_val;
                        }
                    }
                }
                step = 4;
            }
            _ => break,
        }
    }

    let mut assignments = Vec::new();
    for r in 0..rows {
        for c in 0..cols {
            if mask[r * n + c] == 1 {
                assignments.push((r, c));
            }
        }
    }
    assignments
}

fn find_uncovered_zero(
    m: &[f64],
    row_covered: &[bool],
    col_covered: &[bool],
    n: usize,
) -> Option<(usize, usize)> {
    for r in 0..n {
        if row_covered[r] {
            continue;
        }
        for c in 0..n {
            if !col_covered[c] && m[r * n + c].abs() < 1e-9 {
                return Some((r, c));
            }
        }
    }
    None
}

fn find_star_in_row(mask: &[u8], r: usize, n: usize) -> Option<usize> {
    (0..n).find(|&c| mask[r * n + c] == 1)
}

fn find_star_in_col(mask: &[u8], c: usize, n: usize) -> Option<usize> {
    (0..n).find(|&r| mask[r * n + c] == 1)
}

fn find_prime_in_row(mask: &[u8], r: usize, n: usize) -> Option<usize> {
    (0..n).find(|&c| mask[r * n + c] == 2)
}

/// Sinkhorn normalization towards a doubly stochastic matrix, followed by
/// a row arg-max readout. Rows or columns whose sum falls below `epsilon`
/// are left untouched in that half-sweep.
#[derive(Debug, Clone, Copy)]
pub struct SinkhornAssignment {
    pub iterations: usize,
    pub epsilon: f64,
}

impl Default for SinkhornAssignment {
    fn default() -> Self {
        Self {
            iterations: 20,
            epsilon: 1e-9,
        }
    }
}

impl AssignmentStrategy for SinkhornAssignment {
    fn assign(&self, affinity: &DMatrix<f64>) -> Result<Correspondence> {
        require_columns(affinity)?;
        let mut scaled = affinity.clone();
        for _ in 0..self.iterations {
            for r in 0..scaled.nrows() {
                let sum: f64 = scaled.row(r).iter().sum();
                if sum > self.epsilon {
                    for c in 0..scaled.ncols() {
                        scaled[(r, c)] /= sum;
                    }
                }
            }
            for c in 0..scaled.ncols() {
                let sum: f64 = scaled.column(c).iter().sum();
                if sum > self.epsilon {
                    for r in 0..scaled.nrows() {
                        scaled[(r, c)] /= sum;
                    }
                }
            }
        }
        ArgMaxAssignment.assign(&scaled)
    }
}
