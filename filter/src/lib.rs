//! Product-Manifold Correspondence Refinement
//!
//! Iterative refinement of a point-to-point correspondence between two
//! meshes, driven purely by their geodesic distance matrices:
//! - [`product_manifold_kernel`]: pairwise affinity of geodesic landmark
//!   profiles under a Gaussian of width sigma
//! - [`refine_correspondence`] / [`refine_soft`]: the annealed filter loop
//! - [`assignment`]: pluggable kernel-to-correspondence strategies
//!
//! ## Example: refining on two identical shapes
//!
//! ```rust
//! use nalgebra::DMatrix;
//! use shapecorr_core::Correspondence;
//! use shapecorr_filter::{refine_correspondence, ArgMaxAssignment, FilterParams};
//!
//! // A three-vertex path graph matched against itself.
//! let g = DMatrix::from_row_slice(3, 3, &[
//!     0.0, 1.0, 2.0,
//!     1.0, 0.0, 1.0,
//!     2.0, 1.0, 0.0,
//! ]);
//! let refined = refine_correspondence(
//!     &ArgMaxAssignment,
//!     &g,
//!     &g,
//!     &Correspondence::identity(3),
//!     &FilterParams::default(),
//! )
//! .unwrap();
//! assert_eq!(refined.target(), &[0, 1, 2]);
//! ```

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use shapecorr_core::Correspondence;

pub mod assignment;

pub type Error = shapecorr_core::Error;
pub type Result<T> = shapecorr_core::Result<T>;

pub use assignment::*;

/// Parameters of the annealed refinement loop.
///
/// `sigma` is the Gaussian kernel width in the same units as the geodesic
/// matrices, `gamma` the per-round annealing factor, `iterations` the round
/// count. The defaults assume area-normalized meshes.
#[derive(Debug, Clone, Copy)]
pub struct FilterParams {
    pub sigma: f64,
    pub gamma: f64,
    pub iterations: usize,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            sigma: 0.13,
            gamma: 1.0,
            iterations: 1,
        }
    }
}

fn validate_square(g: &DMatrix<f64>, which: &str) -> Result<()> {
    if g.nrows() != g.ncols() {
        return Err(Error::DimensionMismatch(format!(
            "geodesic matrix for {} is {}x{}, expected square",
            which,
            g.nrows(),
            g.ncols()
        )));
    }
    Ok(())
}

/// Gaussian response of every vertex to every landmark: column t holds
/// `exp(-g[., landmarks[t]]² / 2σ²)`.
fn gaussian_profiles(g: &DMatrix<f64>, landmarks: &[usize], sigma: f64) -> DMatrix<f64> {
    if landmarks.is_empty() {
        return DMatrix::zeros(g.nrows(), 0);
    }
    let denom = 2.0 * sigma * sigma;
    let columns: Vec<DVector<f64>> = landmarks
        .par_iter()
        .map(|&l| DVector::from_fn(g.nrows(), |p, _| (-(g[(p, l)] * g[(p, l)]) / denom).exp()))
        .collect();
    DMatrix::from_columns(&columns)
}

/// Builds the product-manifold affinity kernel for one refinement round.
///
/// `K[p, q]` is the dot product of the Gaussian landmark profiles of vertex
/// p on mesh X and vertex q on mesh Y, under the matched landmark pairs of
/// `corr`. The kernel is rescaled by its maximum so scores lie in (0, 1]
/// with the maximum exactly 1; a zero maximum (full underflow at tiny
/// sigma) skips the rescale instead of dividing by zero.
pub fn product_manifold_kernel(
    gx: &DMatrix<f64>,
    gy: &DMatrix<f64>,
    corr: &Correspondence,
    sigma: f64,
) -> Result<DMatrix<f64>> {
    validate_square(gx, "mesh X")?;
    validate_square(gy, "mesh Y")?;
    if sigma <= 0.0 {
        return Err(Error::Precondition(format!(
            "kernel width sigma must be positive, got {}",
            sigma
        )));
    }
    corr.check_bounds(gx.nrows(), gy.nrows())?;

    let px = gaussian_profiles(gx, corr.source(), sigma);
    let py = gaussian_profiles(gy, corr.target(), sigma);
    let mut kernel = &px * py.transpose();

    let max = kernel.iter().cloned().fold(0.0f64, f64::max);
    if max > 0.0 {
        kernel /= max;
    }
    Ok(kernel)
}

/// Runs the annealed product-manifold filter from a discrete seed.
///
/// Each round builds the kernel at the current sigma, hands it to the
/// strategy, bounds-checks the strategy's output and multiplies sigma by
/// gamma. `iterations = 0` returns the seed unchanged. Sigma must stay
/// positive across rounds: a gamma of zero (or negative) makes the next
/// round's kernel fail with a `Precondition` error, while arbitrarily
/// small positive sigma is valid and degenerates to nearest-landmark
/// matching.
pub fn refine_correspondence<S>(
    strategy: &S,
    gx: &DMatrix<f64>,
    gy: &DMatrix<f64>,
    seed: &Correspondence,
    params: &FilterParams,
) -> Result<Correspondence>
where
    S: AssignmentStrategy + ?Sized,
{
    validate_square(gx, "mesh X")?;
    validate_square(gy, "mesh Y")?;
    seed.check_bounds(gx.nrows(), gy.nrows())?;

    let mut current = seed.clone();
    let mut sigma = params.sigma;
    for round in 0..params.iterations {
        let kernel = product_manifold_kernel(gx, gy, &current, sigma)?;
        let next = strategy.assign(&kernel)?;
        next.check_bounds(gx.nrows(), gy.nrows())?;
        log::debug!(
            "refinement round {}: sigma={:.6}, {} -> {} pairs",
            round,
            sigma,
            current.len(),
            next.len()
        );
        current = next;
        sigma *= params.gamma;
    }
    Ok(current)
}

/// Runs the filter from a soft correspondence matrix (Nx×Ny scores, no
/// normalization assumed): the strategy extracts the discrete seed, then
/// refinement proceeds as from that seed. `iterations = 0` reduces to the
/// single strategy application.
pub fn refine_soft<S>(
    strategy: &S,
    gx: &DMatrix<f64>,
    gy: &DMatrix<f64>,
    soft: &DMatrix<f64>,
    params: &FilterParams,
) -> Result<Correspondence>
where
    S: AssignmentStrategy + ?Sized,
{
    validate_square(gx, "mesh X")?;
    validate_square(gy, "mesh Y")?;
    if soft.nrows() != gx.nrows() || soft.ncols() != gy.nrows() {
        return Err(Error::DimensionMismatch(format!(
            "soft correspondence is {}x{} but the meshes have {} and {} vertices",
            soft.nrows(),
            soft.ncols(),
            gx.nrows(),
            gy.nrows()
        )));
    }
    let seed = strategy.assign(soft)?;
    refine_correspondence(strategy, gx, gy, &seed, params)
}
