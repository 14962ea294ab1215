//! Mesh representation and intrinsic geometry for spectral shape analysis
//!
//! This crate provides the surface-mesh side of the correspondence pipeline:
//! - [`mesh`]: the [`Mesh`] entity with lazily cached derived quantities
//! - [`geometry`]: cotangent Laplacian, Voronoi mass, generalized eigensolve,
//!   normals, curvature
//! - [`geodesic`]: all-pairs and landmark geodesic distances, with a
//!   decimated-proxy path for large meshes
//! - [`resample`]: vertex-clustering decimation and midpoint subdivision
//! - [`sparse`]: triplet-backed symmetric sparse matrices
//!
//! ## Example: areas and spectral projection
//!
//! ```rust
//! use shapecorr_mesh::Mesh;
//!
//! let mesh = Mesh::from_arrays(
//!     &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
//!     &[[0, 1, 2]],
//! )
//! .unwrap();
//! assert!((mesh.area() - 0.5).abs() < 1e-12);
//! ```

pub mod geodesic;
pub mod geometry;
pub mod mesh;
pub mod resample;
pub mod sparse;

mod spatial;
mod spectral;

#[cfg(test)]
pub(crate) mod fixtures;

pub type Error = shapecorr_core::Error;
pub type Result<T> = shapecorr_core::Result<T>;

pub use geodesic::*;
pub use geometry::*;
pub use mesh::*;
pub use resample::*;
pub use sparse::*;
