//! Spectral transforms over the eigenbasis of `L φ = λ M φ`.
//!
//! A pointwise field `s` maps to coefficients `c = Φᵀ M s`; the inverse map
//! is `s = Φ c`. With an M-orthonormal basis the round trip through the
//! first k eigenpairs is the M-orthogonal projection onto their span.

use crate::geometry::Eigenbasis;
use crate::mesh::Mesh;
use nalgebra::{DMatrix, DVector};
use shapecorr_core::{Error, Result};

fn truncation_rank(basis: &Eigenbasis, truncation: Option<usize>) -> Result<usize> {
    let k = truncation.unwrap_or(basis.rank());
    if k > basis.rank() {
        return Err(Error::DimensionMismatch(format!(
            "truncation {} exceeds the eigenbasis rank {}",
            k,
            basis.rank()
        )));
    }
    Ok(k)
}

impl Mesh {
    /// Projects a per-vertex field into spectral coefficients
    /// `c = Φ[:, :k]ᵀ (m ⊙ s)`.
    ///
    /// `truncation` defaults to the full cached rank.
    pub fn to_spectral(
        &mut self,
        field: &DVector<f64>,
        truncation: Option<usize>,
    ) -> Result<DVector<f64>> {
        let n = self.vertex_count();
        if field.len() != n {
            return Err(Error::DimensionMismatch(format!(
                "field has length {} but the mesh has {} vertices",
                field.len(),
                n
            )));
        }
        let (basis, mass) = self.spectral_parts()?;
        let k = truncation_rank(basis, truncation)?;
        let weighted = DVector::from_fn(n, |i, _| mass[i] * field[i]);
        Ok(basis.vectors.columns(0, k).tr_mul(&weighted))
    }

    /// Reconstructs a per-vertex field `Φ[:, :k] c` from spectral
    /// coefficients; k is the coefficient count.
    pub fn to_pointwise(&mut self, coeffs: &DVector<f64>) -> Result<DVector<f64>> {
        let (basis, _) = self.spectral_parts()?;
        let k = coeffs.len();
        if k > basis.rank() {
            return Err(Error::DimensionMismatch(format!(
                "coefficient vector has length {} but the eigenbasis has rank {}",
                k,
                basis.rank()
            )));
        }
        Ok(basis.vectors.columns(0, k) * coeffs)
    }

    /// Low-pass filters a field by the round trip through the first k
    /// eigenpairs.
    pub fn low_pass(
        &mut self,
        field: &DVector<f64>,
        truncation: Option<usize>,
    ) -> Result<DVector<f64>> {
        let coeffs = self.to_spectral(field, truncation)?;
        self.to_pointwise(&coeffs)
    }

    /// Separable low-pass of a square vertex-by-vertex matrix: every column
    /// is filtered, then every row. Equivalent to `S A Sᵀ` for the
    /// pointwise smoother `S = Φ_k Φ_kᵀ M`.
    pub fn low_pass_matrix(
        &mut self,
        matrix: &DMatrix<f64>,
        truncation: Option<usize>,
    ) -> Result<DMatrix<f64>> {
        let n = self.vertex_count();
        if matrix.nrows() != n || matrix.ncols() != n {
            return Err(Error::DimensionMismatch(format!(
                "separable filtering needs a square {}x{} matrix, got {}x{}",
                n,
                n,
                matrix.nrows(),
                matrix.ncols()
            )));
        }
        let (basis, mass) = self.spectral_parts()?;
        let k = truncation_rank(basis, truncation)?;
        let phi = basis.vectors.columns(0, k).into_owned();

        let weighted_cols = DMatrix::from_fn(n, n, |i, j| mass[i] * matrix[(i, j)]);
        let columns_pass = &phi * phi.tr_mul(&weighted_cols);

        let weighted_rows = DMatrix::from_fn(n, n, |i, j| mass[i] * columns_pass[(j, i)]);
        Ok((&phi * phi.tr_mul(&weighted_rows)).transpose())
    }

    /// Spectral coefficients of one-hot indicator fields, one column per
    /// index: entry `(r, t) = Φ[idx_t, r] · m[idx_t]`. Returns k×L.
    pub fn dirac_basis(
        &mut self,
        indices: &[usize],
        truncation: Option<usize>,
    ) -> Result<DMatrix<f64>> {
        let n = self.vertex_count();
        for &idx in indices {
            if idx >= n {
                return Err(Error::Geometry(format!(
                    "dirac index {} out of range for {} vertices",
                    idx, n
                )));
            }
        }
        let (basis, mass) = self.spectral_parts()?;
        let k = truncation_rank(basis, truncation)?;
        let mut out = DMatrix::zeros(k, indices.len());
        for (t, &idx) in indices.iter().enumerate() {
            for r in 0..k {
                out[(r, t)] = basis.vectors[(idx, r)] * mass[idx];
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::flat_grid;

    fn grid_mesh(side: usize) -> Mesh {
        let (vertices, faces) = flat_grid(side);
        let rank = vertices.len();
        Mesh::new(vertices, faces).unwrap().with_rank(rank)
    }

    fn wavy_field(n: usize) -> DVector<f64> {
        DVector::from_fn(n, |i, _| (i as f64 * 1.7).sin() + 0.3 * (i as f64 * 0.4).cos())
    }

    fn m_norm_sq(mass: &DVector<f64>, v: &DVector<f64>) -> f64 {
        v.iter()
            .zip(mass.iter())
            .map(|(x, m)| m * x * x)
            .sum()
    }

    #[test]
    fn test_full_rank_round_trip_is_identity() {
        let mut mesh = grid_mesh(3);
        let field = wavy_field(9);
        let coeffs = mesh.to_spectral(&field, None).unwrap();
        let back = mesh.to_pointwise(&coeffs).unwrap();
        for (a, b) in field.iter().zip(back.iter()) {
            assert!((a - b).abs() < 1e-6, "round trip drifted: {} vs {}", a, b);
        }
    }

    #[test]
    fn test_truncation_and_length_checks() {
        let mut mesh = grid_mesh(3);
        let field = wavy_field(9);

        let err = mesh.to_spectral(&field, Some(10)).unwrap_err();
        assert!(err.to_string().contains("exceeds the eigenbasis rank"));

        let err = mesh.to_spectral(&wavy_field(5), None).unwrap_err();
        assert!(err.to_string().contains("field has length 5"));

        let err = mesh.to_pointwise(&DVector::zeros(10)).unwrap_err();
        assert!(err.to_string().contains("coefficient vector"));
    }

    #[test]
    fn test_low_pass_is_a_projection() {
        let mut mesh = grid_mesh(4);
        let field = wavy_field(16);
        let once = mesh.low_pass(&field, Some(5)).unwrap();
        let twice = mesh.low_pass(&once, Some(5)).unwrap();
        for (a, b) in once.iter().zip(twice.iter()) {
            assert!((a - b).abs() < 1e-8, "projection not idempotent");
        }
    }

    #[test]
    fn test_reconstruction_error_shrinks_with_rank() {
        let mut mesh = grid_mesh(4);
        let field = wavy_field(16);
        let mass = mesh.mass_matrix().unwrap().clone();

        let mut previous = f64::INFINITY;
        for k in [2usize, 6, 12, 16] {
            let filtered = mesh.low_pass(&field, Some(k)).unwrap();
            let err = m_norm_sq(&mass, &(&field - &filtered));
            assert!(
                err <= previous + 1e-12,
                "error grew from {} to {} at k={}",
                previous,
                err,
                k
            );
            previous = err;
        }
        assert!(previous < 1e-10, "full-rank reconstruction not exact");
    }

    #[test]
    fn test_separable_filter_factorizes_on_rank_one_input() {
        let mut mesh = grid_mesh(3);
        let a = wavy_field(9);
        let b = DVector::from_fn(9, |i, _| (i as f64 * 0.9).cos());
        let outer = &a * b.transpose();

        let filtered = mesh.low_pass_matrix(&outer, Some(4)).unwrap();
        let fa = mesh.low_pass(&a, Some(4)).unwrap();
        let fb = mesh.low_pass(&b, Some(4)).unwrap();
        let expected = &fa * fb.transpose();

        for (x, y) in filtered.iter().zip(expected.iter()) {
            assert!((x - y).abs() < 1e-8, "separable filter mismatch");
        }
    }

    #[test]
    fn test_separable_filter_requires_square_input() {
        let mut mesh = grid_mesh(3);
        let err = mesh
            .low_pass_matrix(&DMatrix::zeros(9, 4), None)
            .unwrap_err();
        assert!(err.to_string().contains("square 9x9"));
    }

    #[test]
    fn test_dirac_basis_matches_indicator_projection() {
        let mut mesh = grid_mesh(3);
        let basis = mesh.dirac_basis(&[2, 7], Some(6)).unwrap();
        assert_eq!(basis.nrows(), 6);
        assert_eq!(basis.ncols(), 2);

        let mut indicator = DVector::zeros(9);
        indicator[7] = 1.0;
        let coeffs = mesh.to_spectral(&indicator, Some(6)).unwrap();
        for r in 0..6 {
            assert!((basis[(r, 1)] - coeffs[r]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_dirac_basis_rejects_out_of_range() {
        let mut mesh = grid_mesh(3);
        let err = mesh.dirac_basis(&[0, 9], None).unwrap_err();
        assert!(err.to_string().contains("dirac index 9"));
    }
}
