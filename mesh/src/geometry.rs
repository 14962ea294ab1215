//! Stateless geometric primitives over raw vertex/face arrays.
//!
//! Everything here is a pure function of its inputs: cotangent Laplacian
//! assembly, lumped Voronoi mass, the generalized eigensolve, per-vertex
//! normals, surface area and angle-defect Gaussian curvature. The `Mesh`
//! entity layers caching on top of these.

use crate::sparse::SparseMatrix;
use crate::spatial;
use nalgebra::{DMatrix, DVector, Matrix3, Point3, SymmetricEigen, Vector3};
use rayon::prelude::*;
use shapecorr_core::{Error, Result};

/// Truncated eigenbasis of the Laplace-Beltrami operator.
///
/// `values` are ascending and non-negative; `vectors` columns are
/// mass-orthonormal (`φᵢᵀ M φⱼ = δᵢⱼ`).
#[derive(Debug, Clone)]
pub struct Eigenbasis {
    pub values: DVector<f64>,
    pub vectors: DMatrix<f64>,
}

impl Eigenbasis {
    /// Number of retained eigenpairs.
    pub fn rank(&self) -> usize {
        self.values.len()
    }

    /// Keeps the `k` lowest eigenpairs; no-op if `k` is not smaller.
    pub fn truncate(&mut self, k: usize) {
        if k < self.rank() {
            self.values = self.values.rows(0, k).into_owned();
            self.vectors = self.vectors.columns(0, k).into_owned();
        }
    }
}

fn require_vertices(vertices: &[Point3<f64>]) -> Result<()> {
    if vertices.is_empty() {
        return Err(Error::Geometry("mesh has no vertices".into()));
    }
    Ok(())
}

fn require_faces(faces: &[[usize; 3]]) -> Result<()> {
    if faces.is_empty() {
        return Err(Error::Geometry(
            "operation requires a triangulation but the mesh has no faces".into(),
        ));
    }
    Ok(())
}

/// Checks that every face index refers to a vertex.
pub fn validate_faces(vertex_count: usize, faces: &[[usize; 3]]) -> Result<()> {
    for (f, face) in faces.iter().enumerate() {
        for &v in face {
            if v >= vertex_count {
                return Err(Error::Geometry(format!(
                    "face {} references vertex {} but the mesh has {} vertices",
                    f, v, vertex_count
                )));
            }
        }
    }
    Ok(())
}

/// Cotangent of the interior angle at `p` in triangle `(p, q, r)`.
///
/// Returns 0 for degenerate corners (near-zero cross product) so a bad
/// triangle contributes nothing instead of an unbounded weight.
fn cotangent(p: &Point3<f64>, q: &Point3<f64>, r: &Point3<f64>) -> f64 {
    let u = q - p;
    let w = r - p;
    let cross = u.cross(&w).norm();
    if cross < 1e-10 {
        return 0.0;
    }
    u.dot(&w) / cross
}

/// Interior angle at `p` in triangle `(p, q, r)`, in radians.
fn corner_angle(p: &Point3<f64>, q: &Point3<f64>, r: &Point3<f64>) -> f64 {
    let u = q - p;
    let w = r - p;
    let denom = u.norm() * w.norm();
    if denom < 1e-12 {
        return 0.0;
    }
    (u.dot(&w) / denom).clamp(-1.0, 1.0).acos()
}

fn triangle_area(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    (b - a).cross(&(c - a)).norm() * 0.5
}

/// Assembles the cotangent-weight Laplacian `L = D - W` with
/// `w_ij = (cot α_ij + cot β_ij) / 2`.
///
/// This sign convention is positive semidefinite, so the generalized
/// eigenproblem `L φ = λ M φ` has eigenvalues `λ ≥ 0` with the constant
/// function at `λ = 0` on a closed connected mesh.
pub fn cotangent_laplacian(
    vertices: &[Point3<f64>],
    faces: &[[usize; 3]],
) -> Result<SparseMatrix> {
    require_vertices(vertices)?;
    require_faces(faces)?;
    validate_faces(vertices.len(), faces)?;

    let n = vertices.len();
    let mut l = SparseMatrix::new(n, n);

    let add_edge = |l: &mut SparseMatrix, i: usize, j: usize, w: f64| {
        l.add(i, j, -w);
        l.add(j, i, -w);
        l.add(i, i, w);
        l.add(j, j, w);
    };

    for face in faces {
        let [a, b, c] = *face;
        let half_cot_a = 0.5 * cotangent(&vertices[a], &vertices[b], &vertices[c]);
        let half_cot_b = 0.5 * cotangent(&vertices[b], &vertices[c], &vertices[a]);
        let half_cot_c = 0.5 * cotangent(&vertices[c], &vertices[a], &vertices[b]);

        // Each corner's cotangent weights the opposite edge.
        add_edge(&mut l, b, c, half_cot_a);
        add_edge(&mut l, c, a, half_cot_b);
        add_edge(&mut l, a, b, half_cot_c);
    }

    log::debug!(
        "assembled cotangent Laplacian: {} vertices, {} triplets",
        n,
        l.nnz()
    );
    Ok(l)
}

/// Per-vertex mixed Voronoi areas (Meyer et al. rule).
///
/// Non-obtuse triangles distribute circumcentric areas; an obtuse triangle
/// gives half its area to the obtuse corner and a quarter to each other.
fn mixed_voronoi_areas(vertices: &[Point3<f64>], faces: &[[usize; 3]]) -> Vec<f64> {
    let mut areas = vec![0.0; vertices.len()];

    for face in faces {
        let [a, b, c] = *face;
        let area = triangle_area(&vertices[a], &vertices[b], &vertices[c]);
        if area < 1e-14 {
            continue;
        }

        let cot_a = cotangent(&vertices[a], &vertices[b], &vertices[c]);
        let cot_b = cotangent(&vertices[b], &vertices[c], &vertices[a]);
        let cot_c = cotangent(&vertices[c], &vertices[a], &vertices[b]);

        if cot_a >= 0.0 && cot_b >= 0.0 && cot_c >= 0.0 {
            // Circumcentric areas: each edge weighted by the opposite cotangent.
            let ab = (vertices[b] - vertices[a]).norm_squared();
            let bc = (vertices[c] - vertices[b]).norm_squared();
            let ca = (vertices[a] - vertices[c]).norm_squared();
            areas[a] += (ab * cot_c + ca * cot_b) / 8.0;
            areas[b] += (ab * cot_c + bc * cot_a) / 8.0;
            areas[c] += (bc * cot_a + ca * cot_b) / 8.0;
        } else {
            areas[a] += if cot_a < 0.0 { area / 2.0 } else { area / 4.0 };
            areas[b] += if cot_b < 0.0 { area / 2.0 } else { area / 4.0 };
            areas[c] += if cot_c < 0.0 { area / 2.0 } else { area / 4.0 };
        }
    }

    areas
}

/// Assembles the diagonal lumped-mass (Voronoi-area) matrix.
pub fn voronoi_mass_matrix(
    vertices: &[Point3<f64>],
    faces: &[[usize; 3]],
) -> Result<DVector<f64>> {
    require_vertices(vertices)?;
    require_faces(faces)?;
    validate_faces(vertices.len(), faces)?;
    Ok(DVector::from_vec(mixed_voronoi_areas(vertices, faces)))
}

/// Solves the generalized symmetric eigenproblem `L φ = λ M φ` for the
/// `rank` smallest eigenpairs.
///
/// With diagonal `M` the problem reduces to the standard symmetric problem
/// `(M^{-1/2} L M^{-1/2}) ψ = λ ψ` with `φ = M^{-1/2} ψ`, which makes the
/// returned eigenvectors mass-orthonormal. The solver runs with a bounded
/// iteration count; exhaustion or non-finite output is an error, never a
/// silently reduced rank.
pub fn generalized_eigen(
    laplacian: &SparseMatrix,
    mass: &DVector<f64>,
    rank: usize,
) -> Result<Eigenbasis> {
    let n = laplacian.nrows();
    if laplacian.ncols() != n {
        return Err(Error::DimensionMismatch(format!(
            "Laplacian must be square, got {}x{}",
            n,
            laplacian.ncols()
        )));
    }
    if mass.len() != n {
        return Err(Error::DimensionMismatch(format!(
            "mass diagonal has length {} but the Laplacian is {}x{}",
            mass.len(),
            n,
            n
        )));
    }
    for i in 0..n {
        if mass[i] <= 0.0 {
            return Err(Error::Geometry(format!(
                "zero Voronoi area at vertex {}; the generalized eigenproblem is singular",
                i
            )));
        }
    }

    let k = rank.min(n);
    log::info!("solving generalized eigenproblem: n={}, rank={}", n, k);

    let inv_sqrt_m: Vec<f64> = (0..n).map(|i| 1.0 / mass[i].sqrt()).collect();

    // B = M^{-1/2} L M^{-1/2}, symmetrized against assembly round-off.
    let mut b = DMatrix::zeros(n, n);
    for t in laplacian.triplets() {
        b[(t.row, t.col)] += t.val * inv_sqrt_m[t.row] * inv_sqrt_m[t.col];
    }
    let bt = b.transpose();
    b = (b + bt) * 0.5;

    let max_iter = 30 * n + 300;
    let eig = SymmetricEigen::try_new(b, f64::EPSILON, max_iter).ok_or_else(|| {
        Error::Eigensolve(format!(
            "symmetric eigensolver did not converge within {} iterations for n={}",
            max_iter, n
        ))
    })?;

    if eig.eigenvalues.iter().any(|v| !v.is_finite())
        || eig.eigenvectors.iter().any(|v| !v.is_finite())
    {
        return Err(Error::Eigensolve(
            "eigensolver produced non-finite values".into(),
        ));
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        eig.eigenvalues[a]
            .partial_cmp(&eig.eigenvalues[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let scale = eig.eigenvalues.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    let mut values = DVector::zeros(k);
    let mut vectors = DMatrix::zeros(n, k);
    for j in 0..k {
        let src = order[j];
        let lambda = eig.eigenvalues[src];
        if lambda < -1e-8 * scale.max(1.0) {
            return Err(Error::Eigensolve(format!(
                "eigenvalue {} is negative beyond round-off ({:.3e})",
                j, lambda
            )));
        }
        values[j] = lambda.max(0.0);
        for i in 0..n {
            vectors[(i, j)] = inv_sqrt_m[i] * eig.eigenvectors[(i, src)];
        }
    }

    Ok(Eigenbasis { values, vectors })
}

/// Per-vertex normals as the area-weighted average of incident face
/// normals; falls back to kNN plane fitting when the mesh has no faces.
pub fn vertex_normals(
    vertices: &[Point3<f64>],
    faces: &[[usize; 3]],
) -> Result<Vec<Vector3<f64>>> {
    require_vertices(vertices)?;
    if faces.is_empty() {
        return Ok(pca_normals(vertices, 12));
    }
    validate_faces(vertices.len(), faces)?;

    let mut normals = vec![Vector3::zeros(); vertices.len()];
    for face in faces {
        let [a, b, c] = *face;
        // Unnormalized cross product carries the face area as its weight.
        let weighted = (vertices[b] - vertices[a]).cross(&(vertices[c] - vertices[a]));
        normals[a] += weighted;
        normals[b] += weighted;
        normals[c] += weighted;
    }

    for normal in normals.iter_mut() {
        let norm = normal.norm();
        if norm > 1e-12 {
            *normal /= norm;
        }
    }
    Ok(normals)
}

/// Point-cloud normals from PCA over the k nearest neighbours: the normal
/// is the eigenvector of the local covariance with the smallest eigenvalue.
fn pca_normals(vertices: &[Point3<f64>], k: usize) -> Vec<Vector3<f64>> {
    let tree = spatial::index_tree(vertices);

    vertices
        .par_iter()
        .map(|p| {
            let query = [p.x, p.y, p.z];
            let neighbors: Vec<&spatial::IndexedPoint> =
                tree.nearest_neighbor_iter(&query).take(k).collect();
            if neighbors.len() < 3 {
                return Vector3::new(0.0, 0.0, 1.0);
            }

            let mut centroid = Vector3::zeros();
            for nb in &neighbors {
                centroid += nb.1.coords;
            }
            centroid /= neighbors.len() as f64;

            let mut cov = Matrix3::zeros();
            for nb in &neighbors {
                let d = nb.1.coords - centroid;
                cov += d * d.transpose();
            }
            cov /= neighbors.len() as f64;

            let eigen = SymmetricEigen::new(cov);
            let mut min_idx = 0;
            for i in 1..3 {
                if eigen.eigenvalues[i] < eigen.eigenvalues[min_idx] {
                    min_idx = i;
                }
            }
            eigen.eigenvectors.column(min_idx).into_owned()
        })
        .collect()
}

/// Total surface area, the sum of triangle areas.
pub fn surface_area(vertices: &[Point3<f64>], faces: &[[usize; 3]]) -> f64 {
    faces
        .iter()
        .map(|face| triangle_area(&vertices[face[0]], &vertices[face[1]], &vertices[face[2]]))
        .sum()
}

/// Angle-defect Gaussian curvature: `K = (2π - Σ incident angles) / A`
/// with `A` the mixed Voronoi area. Vertices with no area get `K = 0`.
pub fn gaussian_curvature(
    vertices: &[Point3<f64>],
    faces: &[[usize; 3]],
) -> Result<DVector<f64>> {
    require_vertices(vertices)?;
    require_faces(faces)?;
    validate_faces(vertices.len(), faces)?;

    let mut angle_sums = vec![0.0; vertices.len()];
    for face in faces {
        let [a, b, c] = *face;
        angle_sums[a] += corner_angle(&vertices[a], &vertices[b], &vertices[c]);
        angle_sums[b] += corner_angle(&vertices[b], &vertices[c], &vertices[a]);
        angle_sums[c] += corner_angle(&vertices[c], &vertices[a], &vertices[b]);
    }

    let areas = mixed_voronoi_areas(vertices, faces);
    let curvature: Vec<f64> = angle_sums
        .iter()
        .zip(areas.iter())
        .map(|(&angle_sum, &area)| {
            if area > 1e-12 {
                (2.0 * std::f64::consts::PI - angle_sum) / area
            } else {
                0.0
            }
        })
        .collect();

    Ok(DVector::from_vec(curvature))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{flat_grid, icosphere};
    use nalgebra::DVector;

    #[test]
    fn test_laplacian_rows_sum_to_zero() {
        let (vertices, faces) = flat_grid(5);
        let l = cotangent_laplacian(&vertices, &faces).unwrap();
        let ones = DVector::from_element(vertices.len(), 1.0);
        let row_sums = l.mul_vec(&ones);
        for i in 0..vertices.len() {
            assert!(
                row_sums[i].abs() < 1e-10,
                "row {} sums to {}",
                i,
                row_sums[i]
            );
        }
    }

    #[test]
    fn test_laplacian_requires_faces() {
        let vertices = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)];
        let err = cotangent_laplacian(&vertices, &[]).unwrap_err();
        assert!(err.to_string().contains("no faces"));
    }

    #[test]
    fn test_face_index_out_of_range() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let err = cotangent_laplacian(&vertices, &[[0, 1, 3]]).unwrap_err();
        assert!(err.to_string().contains("references vertex 3"));
    }

    #[test]
    fn test_mass_sums_to_surface_area() {
        let (vertices, faces) = flat_grid(6);
        let mass = voronoi_mass_matrix(&vertices, &faces).unwrap();
        let area = surface_area(&vertices, &faces);
        assert!(
            (mass.sum() - area).abs() < 1e-9,
            "mass total {} vs area {}",
            mass.sum(),
            area
        );

        let (vertices, faces) = icosphere(2);
        let mass = voronoi_mass_matrix(&vertices, &faces).unwrap();
        let area = surface_area(&vertices, &faces);
        assert!((mass.sum() - area).abs() < 1e-9);
    }

    #[test]
    fn test_eigenbasis_is_mass_orthonormal() {
        let (vertices, faces) = flat_grid(5);
        let l = cotangent_laplacian(&vertices, &faces).unwrap();
        let m = voronoi_mass_matrix(&vertices, &faces).unwrap();
        let basis = generalized_eigen(&l, &m, 8).unwrap();

        assert_eq!(basis.rank(), 8);
        for i in 0..8 {
            assert!(basis.values[i] >= 0.0);
            if i > 0 {
                assert!(basis.values[i] >= basis.values[i - 1]);
            }
            for j in 0..8 {
                let mut inner = 0.0;
                for v in 0..vertices.len() {
                    inner += basis.vectors[(v, i)] * m[v] * basis.vectors[(v, j)];
                }
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!(
                    (inner - expected).abs() < 1e-8,
                    "inner product ({}, {}) = {}",
                    i,
                    j,
                    inner
                );
            }
        }
    }

    #[test]
    fn test_first_eigenpair_is_constant_on_closed_mesh() {
        let (vertices, faces) = icosphere(1);
        let l = cotangent_laplacian(&vertices, &faces).unwrap();
        let m = voronoi_mass_matrix(&vertices, &faces).unwrap();
        let basis = generalized_eigen(&l, &m, 4).unwrap();

        assert!(basis.values[0].abs() < 1e-8, "λ0 = {}", basis.values[0]);
        let first = basis.vectors.column(0);
        let reference = first[0];
        for i in 1..vertices.len() {
            assert!(
                (first[i] - reference).abs() < 1e-6,
                "first eigenvector varies: {} vs {}",
                first[i],
                reference
            );
        }
    }

    #[test]
    fn test_rank_clamped_to_vertex_count() {
        let (vertices, faces) = flat_grid(3);
        let l = cotangent_laplacian(&vertices, &faces).unwrap();
        let m = voronoi_mass_matrix(&vertices, &faces).unwrap();
        let basis = generalized_eigen(&l, &m, 50).unwrap();
        assert_eq!(basis.rank(), vertices.len());
    }

    #[test]
    fn test_eigen_rejects_zero_mass() {
        let (vertices, faces) = flat_grid(3);
        let l = cotangent_laplacian(&vertices, &faces).unwrap();
        let m = DVector::zeros(vertices.len());
        let err = generalized_eigen(&l, &m, 4).unwrap_err();
        assert!(err.to_string().contains("zero Voronoi area"));
    }

    #[test]
    fn test_eigen_rejects_non_finite_input() {
        // A NaN coordinate poisons the assembled operator; the solve must
        // fail instead of returning a basis with non-finite entries.
        let (mut vertices, faces) = flat_grid(3);
        vertices[0].x = f64::NAN;
        let l = cotangent_laplacian(&vertices, &faces).unwrap();
        let m = voronoi_mass_matrix(&vertices, &faces).unwrap();
        assert!(generalized_eigen(&l, &m, 4).is_err());
    }

    #[test]
    fn test_vertex_normals_flat_grid() {
        let (vertices, faces) = flat_grid(4);
        let normals = vertex_normals(&vertices, &faces).unwrap();
        for n in &normals {
            assert!((n.norm() - 1.0).abs() < 1e-9);
            assert!(n.z.abs() > 0.99, "normal {:?} is not vertical", n);
        }
    }

    #[test]
    fn test_point_cloud_normals_via_pca() {
        let (vertices, _) = flat_grid(5);
        let normals = vertex_normals(&vertices, &[]).unwrap();
        for n in &normals {
            assert!(n.z.abs() > 0.9, "PCA normal {:?} is not vertical", n);
        }
    }

    #[test]
    fn test_sphere_normals_point_radially() {
        let (vertices, faces) = icosphere(2);
        let normals = vertex_normals(&vertices, &faces).unwrap();
        for (v, n) in vertices.iter().zip(normals.iter()) {
            let radial = v.coords.normalize();
            assert!(
                n.dot(&radial).abs() > 0.99,
                "normal {:?} not radial at {:?}",
                n,
                v
            );
        }
    }

    #[test]
    fn test_gauss_bonnet_on_sphere() {
        let (vertices, faces) = icosphere(2);
        let curvature = gaussian_curvature(&vertices, &faces).unwrap();
        let areas = mixed_voronoi_areas(&vertices, &faces);
        let total: f64 = curvature
            .iter()
            .zip(areas.iter())
            .map(|(k, a)| k * a)
            .sum();
        let expected = 4.0 * std::f64::consts::PI;
        assert!(
            (total - expected).abs() < 0.1,
            "total curvature {} vs {}",
            total,
            expected
        );
    }

    #[test]
    fn test_flat_grid_interior_curvature_is_zero() {
        let (vertices, faces) = flat_grid(5);
        let curvature = gaussian_curvature(&vertices, &faces).unwrap();
        // Interior vertices of a planar grid have a full 2π angle sum.
        for i in 1..4 {
            for j in 1..4 {
                let v = i * 5 + j;
                assert!(
                    curvature[v].abs() < 1e-9,
                    "interior vertex {} has curvature {}",
                    v,
                    curvature[v]
                );
            }
        }
    }
}
