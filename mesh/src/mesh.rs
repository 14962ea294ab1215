//! The mesh entity: raw geometry plus lazily derived, cached descriptors.
//!
//! Every derived quantity (Laplacian, mass, eigenbasis, geodesic matrix,
//! normals, curvature) is computed at most once per valid state and
//! memoized in an `Option` field; mutators clear exactly the caches they
//! invalidate and transport the ones they can keep. A failed computation
//! leaves every cache in its prior state.

use crate::geodesic;
use crate::geometry::{self, Eigenbasis};
use crate::resample;
use crate::sparse::SparseMatrix;
use nalgebra::{DMatrix, DVector, Point3, Rotation3, Vector3};
use shapecorr_core::{Error, Result};
use std::collections::HashMap;

/// Default eigenbasis truncation.
pub const DEFAULT_RANK: usize = 100;

/// A discretized surface with named per-vertex scalar fields and cached
/// spectral/geodesic descriptors.
///
/// Rigid transforms mutate in place; resolution-changing operations
/// (`select`, `decimate`, `upsample`) return new instances. `Clone` carries
/// every cache.
#[derive(Debug, Clone)]
pub struct Mesh {
    vertices: Vec<Point3<f64>>,
    faces: Vec<[usize; 3]>,
    rank: usize,
    kind: String,
    scalars: HashMap<String, DVector<f64>>,
    laplacian: Option<SparseMatrix>,
    mass: Option<DVector<f64>>,
    eigen: Option<Eigenbasis>,
    geodesics: Option<DMatrix<f64>>,
    normals: Option<Vec<Vector3<f64>>>,
    curvature: Option<DVector<f64>>,
}

impl Mesh {
    /// Builds a mesh from vertices and faces. Faces may be empty (point
    /// cloud); face indices must be in range.
    pub fn new(vertices: Vec<Point3<f64>>, faces: Vec<[usize; 3]>) -> Result<Self> {
        geometry::validate_faces(vertices.len(), &faces)?;
        Ok(Self {
            vertices,
            faces,
            rank: DEFAULT_RANK,
            kind: String::new(),
            scalars: HashMap::new(),
            laplacian: None,
            mass: None,
            eigen: None,
            geodesics: None,
            normals: None,
            curvature: None,
        })
    }

    /// Builds a mesh from plain coordinate triples, the minimal interop
    /// format expected from dataset loaders.
    pub fn from_arrays(vertices: &[[f64; 3]], faces: &[[usize; 3]]) -> Result<Self> {
        let points = vertices
            .iter()
            .map(|v| Point3::new(v[0], v[1], v[2]))
            .collect();
        Self::new(points, faces.to_vec())
    }

    pub fn with_rank(mut self, rank: usize) -> Self {
        self.rank = rank;
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Supplies a precomputed geodesic matrix, bypassing computation.
    pub fn with_geodesics(mut self, geodesics: DMatrix<f64>) -> Result<Self> {
        self.set_geodesics(geodesics)?;
        Ok(self)
    }

    // ---- read accessors -------------------------------------------------

    pub fn vertices(&self) -> &[Point3<f64>] {
        &self.vertices
    }

    pub fn faces(&self) -> &[[usize; 3]] {
        &self.faces
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Opaque label copied through every transformation.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn scalar(&self, name: &str) -> Option<&DVector<f64>> {
        self.scalars.get(name)
    }

    /// Names of all scalar fields, sorted for determinism.
    pub fn scalar_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.scalars.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// The cached geodesic matrix, if one exists; never computes.
    pub fn cached_geodesics(&self) -> Option<&DMatrix<f64>> {
        self.geodesics.as_ref()
    }

    /// Total surface area; a pure function of the current faces.
    pub fn area(&self) -> f64 {
        geometry::surface_area(&self.vertices, &self.faces)
    }

    // ---- mutators -------------------------------------------------------

    /// Replaces the vertex set. Faces and scalar fields must remain
    /// consistent with the new vertex count. Every cache is cleared.
    pub fn set_vertices(&mut self, vertices: Vec<Point3<f64>>) -> Result<()> {
        geometry::validate_faces(vertices.len(), &self.faces)?;
        for (name, values) in &self.scalars {
            if values.len() != vertices.len() {
                return Err(Error::DimensionMismatch(format!(
                    "scalar field '{}' has length {} but the new vertex set has {}",
                    name,
                    values.len(),
                    vertices.len()
                )));
            }
        }
        self.vertices = vertices;
        self.invalidate_all();
        Ok(())
    }

    /// Replaces the triangulation. Every cache is cleared.
    pub fn set_faces(&mut self, faces: Vec<[usize; 3]>) -> Result<()> {
        geometry::validate_faces(self.vertices.len(), &faces)?;
        self.faces = faces;
        self.invalidate_all();
        Ok(())
    }

    /// Changes the eigenbasis truncation. Shrinking truncates a cached
    /// basis to the lowest eigenpairs; growing invalidates it (the basis is
    /// never silently extended).
    pub fn set_rank(&mut self, rank: usize) {
        if rank < self.rank {
            if let Some(eigen) = &mut self.eigen {
                eigen.truncate(rank);
            }
        } else if rank > self.rank {
            self.eigen = None;
        }
        self.rank = rank;
    }

    pub fn set_kind(&mut self, kind: impl Into<String>) {
        self.kind = kind.into();
    }

    /// Stores an externally supplied geodesic matrix without triggering any
    /// computation. The caller vouches for symmetry and the zero diagonal.
    pub fn set_geodesics(&mut self, geodesics: DMatrix<f64>) -> Result<()> {
        if geodesics.nrows() != self.vertices.len() || geodesics.ncols() != self.vertices.len() {
            return Err(Error::DimensionMismatch(format!(
                "geodesic matrix is {}x{} but the mesh has {} vertices",
                geodesics.nrows(),
                geodesics.ncols(),
                self.vertices.len()
            )));
        }
        self.geodesics = Some(geodesics);
        Ok(())
    }

    /// Adds or replaces a named per-vertex scalar field.
    pub fn insert_scalar(&mut self, name: impl Into<String>, values: DVector<f64>) -> Result<()> {
        let name = name.into();
        if values.len() != self.vertices.len() {
            return Err(Error::DimensionMismatch(format!(
                "scalar field '{}' has length {} but the mesh has {} vertices",
                name,
                values.len(),
                self.vertices.len()
            )));
        }
        self.scalars.insert(name, values);
        Ok(())
    }

    pub fn remove_scalar(&mut self, name: &str) -> Option<DVector<f64>> {
        self.scalars.remove(name)
    }

    fn invalidate_all(&mut self) {
        self.laplacian = None;
        self.mass = None;
        self.eigen = None;
        self.geodesics = None;
        self.normals = None;
        self.curvature = None;
    }

    fn invalidate_spectral(&mut self) {
        self.laplacian = None;
        self.mass = None;
        self.eigen = None;
        self.curvature = None;
    }

    // ---- lazily derived quantities --------------------------------------

    /// Cotangent Laplacian, computed on first access.
    pub fn laplacian(&mut self) -> Result<&SparseMatrix> {
        if self.laplacian.is_none() {
            let l = geometry::cotangent_laplacian(&self.vertices, &self.faces)?;
            self.laplacian = Some(l);
        }
        Ok(self.laplacian.as_ref().unwrap())
    }

    /// Diagonal of the lumped Voronoi mass matrix, computed on first access.
    pub fn mass_matrix(&mut self) -> Result<&DVector<f64>> {
        if self.mass.is_none() {
            let m = geometry::voronoi_mass_matrix(&self.vertices, &self.faces)?;
            self.mass = Some(m);
        }
        Ok(self.mass.as_ref().unwrap())
    }

    /// Truncated eigenbasis of `L φ = λ M φ`, computed on first access.
    pub fn eigenbasis(&mut self) -> Result<&Eigenbasis> {
        if self.eigen.is_none() {
            self.laplacian()?;
            self.mass_matrix()?;
            let laplacian = self.laplacian.as_ref().unwrap();
            let mass = self.mass.as_ref().unwrap();
            let basis = geometry::generalized_eigen(laplacian, mass, self.rank)?;
            self.eigen = Some(basis);
        }
        Ok(self.eigen.as_ref().unwrap())
    }

    /// Ensures the eigenbasis and the mass diagonal both exist and hands
    /// them out together. The spectral transforms need the pair at once.
    pub(crate) fn spectral_parts(&mut self) -> Result<(&Eigenbasis, &DVector<f64>)> {
        self.eigenbasis()?;
        Ok((self.eigen.as_ref().unwrap(), self.mass.as_ref().unwrap()))
    }

    /// All-pairs geodesic matrix, computed on first access; exact for small
    /// meshes, decimated-proxy extrapolation above the size limit.
    pub fn geodesics(&mut self) -> Result<&DMatrix<f64>> {
        if self.geodesics.is_none() {
            let g = geodesic::geodesic_matrix(&self.vertices, &self.faces)?;
            self.geodesics = Some(g);
        }
        Ok(self.geodesics.as_ref().unwrap())
    }

    /// Per-vertex unit normals, computed on first access.
    pub fn vertex_normals(&mut self) -> Result<&[Vector3<f64>]> {
        if self.normals.is_none() {
            let n = geometry::vertex_normals(&self.vertices, &self.faces)?;
            self.normals = Some(n);
        }
        Ok(self.normals.as_ref().unwrap())
    }

    /// Angle-defect Gaussian curvature, computed on first access.
    pub fn gaussian_curvature(&mut self) -> Result<&DVector<f64>> {
        if self.curvature.is_none() {
            let k = geometry::gaussian_curvature(&self.vertices, &self.faces)?;
            self.curvature = Some(k);
        }
        Ok(self.curvature.as_ref().unwrap())
    }

    // ---- in-place rigid transforms --------------------------------------

    /// Uniform scale about the origin. Cached geodesics scale with the
    /// factor; spectral caches are cleared (they are not scale-invariant).
    pub fn scale(&mut self, factor: f64) -> &mut Self {
        for v in &mut self.vertices {
            v.coords *= factor;
        }
        if let Some(g) = &mut self.geodesics {
            *g *= factor.abs();
        }
        if factor < 0.0 {
            // A mirroring factor flips face orientation.
            self.normals = None;
        }
        self.invalidate_spectral();
        self
    }

    /// Rigid rotation. Normals rotate along; every intrinsic cache is kept.
    pub fn rotate(&mut self, rotation: &Rotation3<f64>) -> &mut Self {
        for v in &mut self.vertices {
            *v = rotation * *v;
        }
        if let Some(normals) = &mut self.normals {
            for n in normals.iter_mut() {
                *n = rotation * *n;
            }
        }
        self
    }

    /// Translation; every cache is kept.
    pub fn translate(&mut self, offset: &Vector3<f64>) -> &mut Self {
        for v in &mut self.vertices {
            *v += *offset;
        }
        self
    }

    /// Moves the vertex centroid to the origin; every cache is kept.
    pub fn center(&mut self) -> &mut Self {
        if self.vertices.is_empty() {
            return self;
        }
        let mut centroid = Vector3::zeros();
        for v in &self.vertices {
            centroid += v.coords;
        }
        centroid /= self.vertices.len() as f64;
        self.translate(&-centroid)
    }

    /// Scales the mesh so its total surface area becomes 1. Geodesics are
    /// transported like any other length.
    pub fn normalize_area(&mut self) -> Result<&mut Self> {
        let area = self.area();
        if area <= 1e-12 {
            return Err(Error::Geometry(
                "cannot area-normalize a degenerate (zero-area) mesh".into(),
            ));
        }
        self.scale(1.0 / area.sqrt());
        Ok(self)
    }

    // ---- resolution-changing operations ---------------------------------

    /// Sub-selects or permutes vertices into a new mesh.
    ///
    /// A permutation of all vertices keeps the triangulation (faces are
    /// relabeled); any other index list yields a point cloud over the
    /// selected vertices. Scalar fields and cached normals are always
    /// carried (positions do not change); cached geodesics are sub-selected
    /// as `G[idx][:, idx]`.
    pub fn select(&self, indices: &[usize]) -> Result<Mesh> {
        for &idx in indices {
            if idx >= self.vertices.len() {
                return Err(Error::Geometry(format!(
                    "selection index {} out of range for {} vertices",
                    idx,
                    self.vertices.len()
                )));
            }
        }

        let is_permutation = indices.len() == self.vertices.len() && {
            let mut seen = vec![false; self.vertices.len()];
            indices.iter().all(|&i| !std::mem::replace(&mut seen[i], true))
        };

        let vertices: Vec<Point3<f64>> = indices.iter().map(|&i| self.vertices[i]).collect();

        let faces = if is_permutation {
            // new_position[old_index] relabels faces under the reorder.
            let mut new_position = vec![0usize; self.vertices.len()];
            for (new_idx, &old_idx) in indices.iter().enumerate() {
                new_position[old_idx] = new_idx;
            }
            self.faces
                .iter()
                .map(|f| [new_position[f[0]], new_position[f[1]], new_position[f[2]]])
                .collect()
        } else {
            Vec::new()
        };

        let scalars = self
            .scalars
            .iter()
            .map(|(name, values)| {
                let picked = DVector::from_iterator(
                    indices.len(),
                    indices.iter().map(|&i| values[i]),
                );
                (name.clone(), picked)
            })
            .collect();

        let geodesics = self
            .geodesics
            .as_ref()
            .map(|g| submatrix(g, indices, indices));

        let normals = self
            .normals
            .as_ref()
            .map(|n| indices.iter().map(|&i| n[i]).collect());

        Ok(Mesh {
            vertices,
            faces,
            rank: self.rank,
            kind: self.kind.clone(),
            scalars,
            laplacian: None,
            mass: None,
            eigen: None,
            geodesics,
            normals,
            curvature: None,
        })
    }

    /// Decimates to at most `target` vertices, returning the new mesh and
    /// the original index of every surviving vertex.
    ///
    /// A cached geodesic matrix is transported by sub-selection, never
    /// recomputed.
    pub fn decimate(&self, target: usize) -> Result<(Mesh, Vec<usize>)> {
        let decimated = resample::cluster_decimate(&self.vertices, &self.faces, target)?;

        let scalars = self
            .scalars
            .iter()
            .map(|(name, values)| {
                let picked = DVector::from_iterator(
                    decimated.indices.len(),
                    decimated.indices.iter().map(|&i| values[i]),
                );
                (name.clone(), picked)
            })
            .collect();

        let geodesics = self
            .geodesics
            .as_ref()
            .map(|g| submatrix(g, &decimated.indices, &decimated.indices));

        let mesh = Mesh {
            vertices: decimated.vertices,
            faces: decimated.faces,
            rank: self.rank,
            kind: self.kind.clone(),
            scalars,
            laplacian: None,
            mass: None,
            eigen: None,
            geodesics,
            normals: None,
            curvature: None,
        };
        Ok((mesh, decimated.indices))
    }

    /// Midpoint-subdivides until the mesh has at least `target` vertices.
    ///
    /// Scalar fields are interpolated (midpoints average their edge
    /// endpoints). The geodesic matrix of the result is extrapolated from
    /// this mesh's matrix with the original vertices as anchors, which
    /// computes it here first if missing.
    pub fn upsample(&mut self, target: usize) -> Result<Mesh> {
        let source_g = self.geodesics()?.clone();

        let mut vertices = self.vertices.clone();
        let mut faces = self.faces.clone();
        let mut scalars = self.scalars.clone();

        while vertices.len() < target {
            let subdivided = resample::midpoint_subdivide(&vertices, &faces)?;
            for values in scalars.values_mut() {
                let mut extended = DVector::zeros(subdivided.vertices.len());
                extended.rows_mut(0, values.len()).copy_from(values);
                for (offset, &(a, b)) in subdivided.edge_parents.iter().enumerate() {
                    extended[values.len() + offset] = 0.5 * (values[a] + values[b]);
                }
                *values = extended;
            }
            vertices = subdivided.vertices;
            faces = subdivided.faces;
        }

        let geodesics = if vertices.len() == self.vertices.len() {
            source_g
        } else {
            log::info!(
                "upsampled {} -> {} vertices; extrapolating geodesics from the coarse mesh",
                self.vertices.len(),
                vertices.len()
            );
            geodesic::extrapolate_from_anchors(&self.vertices, &source_g, &vertices)?
        };

        Ok(Mesh {
            vertices,
            faces,
            rank: self.rank,
            kind: self.kind.clone(),
            scalars,
            laplacian: None,
            mass: None,
            eigen: None,
            geodesics: Some(geodesics),
            normals: None,
            curvature: None,
        })
    }
}

fn submatrix(g: &DMatrix<f64>, rows: &[usize], cols: &[usize]) -> DMatrix<f64> {
    DMatrix::from_fn(rows.len(), cols.len(), |i, j| g[(rows[i], cols[j])])
}
