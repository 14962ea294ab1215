use nalgebra::{DMatrix, DVector};

/// One `(row, col, value)` entry of a sparse matrix in triplet form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triplet {
    pub row: usize,
    pub col: usize,
    pub val: f64,
}

/// Sparse matrix in triplet (coordinate) form.
///
/// Assembly pushes individual contributions; duplicate `(row, col)` entries
/// accumulate when the matrix is applied or densified. The eigensolve
/// densifies once at solve time, so no compressed storage is kept.
#[derive(Debug, Clone)]
pub struct SparseMatrix {
    rows: usize,
    cols: usize,
    triplets: Vec<Triplet>,
}

impl SparseMatrix {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            triplets: Vec::new(),
        }
    }

    /// Adds one contribution; entries at the same position accumulate.
    pub fn add(&mut self, row: usize, col: usize, val: f64) {
        debug_assert!(row < self.rows && col < self.cols);
        self.triplets.push(Triplet { row, col, val });
    }

    pub fn nrows(&self) -> usize {
        self.rows
    }

    pub fn ncols(&self) -> usize {
        self.cols
    }

    /// Number of stored (not necessarily distinct) entries.
    pub fn nnz(&self) -> usize {
        self.triplets.len()
    }

    pub fn triplets(&self) -> &[Triplet] {
        &self.triplets
    }

    /// Densifies, accumulating duplicate entries.
    pub fn to_dense(&self) -> DMatrix<f64> {
        let mut dense = DMatrix::zeros(self.rows, self.cols);
        for t in &self.triplets {
            dense[(t.row, t.col)] += t.val;
        }
        dense
    }

    /// Sparse matrix-vector product `A x`.
    pub fn mul_vec(&self, x: &DVector<f64>) -> DVector<f64> {
        assert_eq!(
            x.len(),
            self.cols,
            "vector length {} does not match {} columns",
            x.len(),
            self.cols
        );
        let mut y = DVector::zeros(self.rows);
        for t in &self.triplets {
            y[t.row] += t.val * x[t.col];
        }
        y
    }
}
