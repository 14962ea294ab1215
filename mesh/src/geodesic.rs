//! Geodesic distance matrices over the mesh edge graph.
//!
//! Small meshes get exact all-pairs shortest paths (Dijkstra per source,
//! parallel across sources). Above [`EXACT_GEODESIC_LIMIT`] vertices the
//! matrix is computed on a decimated proxy whose vertices are a subset of
//! the original ones, then extrapolated back to full resolution with an
//! inverse-distance-weighted blend over the nearest proxy anchors.

use crate::resample;
use crate::spatial;
use nalgebra::{DMatrix, Point3};
use rayon::prelude::*;
use rstar::PointDistance;
use shapecorr_core::{Error, Result};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Largest vertex count for which the all-pairs matrix is computed exactly.
pub const EXACT_GEODESIC_LIMIT: usize = 500;

/// Vertex count the decimated proxy aims for.
pub const PROXY_VERTEX_TARGET: usize = 500;

/// Number of proxy anchors blended per original vertex.
const EXTRAPOLATION_NEIGHBORS: usize = 3;

/// Squared distance below which a vertex is snapped onto an anchor.
const ANCHOR_SNAP_EPSILON: f64 = 1e-18;

#[derive(Copy, Clone, PartialEq)]
struct QueueEntry {
    dist: f64,
    vertex: usize,
}

impl Eq for QueueEntry {}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the binary heap pops the smallest distance first.
        other
            .dist
            .partial_cmp(&self.dist)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.vertex.cmp(&self.vertex))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Undirected edge adjacency with Euclidean edge lengths.
fn edge_adjacency(vertices: &[Point3<f64>], faces: &[[usize; 3]]) -> Vec<Vec<(usize, f64)>> {
    let mut adjacency: Vec<Vec<(usize, f64)>> = vec![Vec::new(); vertices.len()];
    let push_edge = |a: usize, b: usize, adjacency: &mut Vec<Vec<(usize, f64)>>| {
        if adjacency[a].iter().any(|&(n, _)| n == b) {
            return;
        }
        let length = (vertices[a] - vertices[b]).norm();
        adjacency[a].push((b, length));
        adjacency[b].push((a, length));
    };

    for face in faces {
        for e in 0..3 {
            let a = face[e];
            let b = face[(e + 1) % 3];
            push_edge(a.min(b), a.max(b), &mut adjacency);
        }
    }
    adjacency
}

fn dijkstra(adjacency: &[Vec<(usize, f64)>], source: usize) -> Vec<f64> {
    let mut dist = vec![f64::INFINITY; adjacency.len()];
    dist[source] = 0.0;

    let mut heap = BinaryHeap::new();
    heap.push(QueueEntry {
        dist: 0.0,
        vertex: source,
    });

    while let Some(QueueEntry { dist: d, vertex }) = heap.pop() {
        if d > dist[vertex] {
            continue;
        }
        for &(neighbor, length) in &adjacency[vertex] {
            let candidate = d + length;
            if candidate < dist[neighbor] {
                dist[neighbor] = candidate;
                heap.push(QueueEntry {
                    dist: candidate,
                    vertex: neighbor,
                });
            }
        }
    }
    dist
}

fn check_reachable(source: usize, distances: &[f64]) -> Result<()> {
    if distances.iter().any(|d| !d.is_finite()) {
        return Err(Error::Geometry(format!(
            "mesh is not geodesically connected: vertex {} cannot reach every vertex",
            source
        )));
    }
    Ok(())
}

/// Exact all-pairs geodesic matrix over the edge graph.
///
/// Rows are computed independently in parallel, then the matrix is
/// symmetrized as `(G + Gᵀ)/2` and the diagonal pinned to zero.
pub fn exact_geodesic_matrix(
    vertices: &[Point3<f64>],
    faces: &[[usize; 3]],
) -> Result<DMatrix<f64>> {
    if vertices.is_empty() {
        return Err(Error::Geometry("mesh has no vertices".into()));
    }
    if faces.is_empty() {
        return Err(Error::Geometry(
            "geodesic distances require a triangulation but the mesh has no faces".into(),
        ));
    }
    crate::geometry::validate_faces(vertices.len(), faces)?;

    let n = vertices.len();
    let adjacency = edge_adjacency(vertices, faces);

    let rows: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|source| dijkstra(&adjacency, source))
        .collect();

    let mut g = DMatrix::zeros(n, n);
    for (i, row) in rows.iter().enumerate() {
        check_reachable(i, row)?;
        for (j, &d) in row.iter().enumerate() {
            g[(i, j)] = d;
        }
    }

    let gt = g.transpose();
    g = (g + gt) * 0.5;
    for i in 0..n {
        g[(i, i)] = 0.0;
    }
    Ok(g)
}

/// Geodesic distances from the given source vertices to every vertex, one
/// row per source.
pub fn geodesic_rows(
    vertices: &[Point3<f64>],
    faces: &[[usize; 3]],
    sources: &[usize],
) -> Result<DMatrix<f64>> {
    if vertices.is_empty() {
        return Err(Error::Geometry("mesh has no vertices".into()));
    }
    if faces.is_empty() {
        return Err(Error::Geometry(
            "geodesic distances require a triangulation but the mesh has no faces".into(),
        ));
    }
    crate::geometry::validate_faces(vertices.len(), faces)?;
    for &s in sources {
        if s >= vertices.len() {
            return Err(Error::Geometry(format!(
                "landmark index {} out of range for {} vertices",
                s,
                vertices.len()
            )));
        }
    }

    let adjacency = edge_adjacency(vertices, faces);
    let rows: Vec<Vec<f64>> = sources
        .par_iter()
        .map(|&source| dijkstra(&adjacency, source))
        .collect();

    let mut g = DMatrix::zeros(sources.len(), vertices.len());
    for (i, row) in rows.iter().enumerate() {
        check_reachable(sources[i], row)?;
        for (j, &d) in row.iter().enumerate() {
            g[(i, j)] = d;
        }
    }
    Ok(g)
}

/// All-pairs geodesic matrix with the size-dependent strategy: exact up to
/// [`EXACT_GEODESIC_LIMIT`] vertices, decimated proxy plus extrapolation
/// beyond it.
pub fn geodesic_matrix(vertices: &[Point3<f64>], faces: &[[usize; 3]]) -> Result<DMatrix<f64>> {
    let n = vertices.len();
    if n <= EXACT_GEODESIC_LIMIT {
        return exact_geodesic_matrix(vertices, faces);
    }

    log::info!(
        "geodesic matrix via decimated proxy: {} vertices -> target {}",
        n,
        PROXY_VERTEX_TARGET
    );
    let decimated = resample::cluster_decimate(vertices, faces, PROXY_VERTEX_TARGET)?;
    let proxy_g = exact_geodesic_matrix(&decimated.vertices, &decimated.faces)?;
    extrapolate_from_anchors(&decimated.vertices, &proxy_g, vertices)
}

/// Per-target anchor weights: up to [`EXTRAPOLATION_NEIGHBORS`] nearest
/// anchors with inverse-distance weights, or a single unit weight when the
/// target coincides with an anchor.
fn anchor_weights(
    anchors: &[Point3<f64>],
    targets: &[Point3<f64>],
) -> Vec<Vec<(usize, f64)>> {
    let tree = spatial::index_tree(anchors);

    targets
        .par_iter()
        .map(|p| {
            let query = [p.x, p.y, p.z];
            let nearest: Vec<&spatial::IndexedPoint> = tree
                .nearest_neighbor_iter(&query)
                .take(EXTRAPOLATION_NEIGHBORS)
                .collect();

            if let Some(first) = nearest.first() {
                if first.distance_2(&query) <= ANCHOR_SNAP_EPSILON {
                    return vec![(first.0, 1.0)];
                }
            }

            let mut weights: Vec<(usize, f64)> = nearest
                .iter()
                .map(|a| (a.0, 1.0 / a.distance_2(&query).sqrt()))
                .collect();
            let total: f64 = weights.iter().map(|&(_, w)| w).sum();
            for entry in weights.iter_mut() {
                entry.1 /= total;
            }
            weights
        })
        .collect()
}

/// Extrapolates a geodesic matrix from `anchors` (with pairwise distances
/// `anchor_g`) to an arbitrary target vertex set.
///
/// `d(p, q) = Σ_a Σ_b w_pa w_qb anchor_g[a, b]` with inverse-distance
/// weights; the result is symmetrized and its diagonal pinned to zero.
/// Targets that coincide with anchors reproduce anchor distances exactly.
pub fn extrapolate_from_anchors(
    anchors: &[Point3<f64>],
    anchor_g: &DMatrix<f64>,
    targets: &[Point3<f64>],
) -> Result<DMatrix<f64>> {
    if anchors.is_empty() {
        return Err(Error::Geometry(
            "geodesic extrapolation requires at least one anchor".into(),
        ));
    }
    if anchor_g.nrows() != anchors.len() || anchor_g.ncols() != anchors.len() {
        return Err(Error::DimensionMismatch(format!(
            "anchor distance matrix is {}x{} but there are {} anchors",
            anchor_g.nrows(),
            anchor_g.ncols(),
            anchors.len()
        )));
    }

    let weights = anchor_weights(anchors, targets);
    let n = targets.len();

    let rows: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|p| {
            let mut row = vec![0.0; n];
            for (q, slot) in row.iter_mut().enumerate() {
                let mut d = 0.0;
                for &(a, wa) in &weights[p] {
                    for &(b, wb) in &weights[q] {
                        d += wa * wb * anchor_g[(a, b)];
                    }
                }
                *slot = d;
            }
            row
        })
        .collect();

    let mut g = DMatrix::zeros(n, n);
    for (p, row) in rows.iter().enumerate() {
        for (q, &d) in row.iter().enumerate() {
            g[(p, q)] = d;
        }
    }

    let gt = g.transpose();
    g = (g + gt) * 0.5;
    for i in 0..n {
        g[(i, i)] = 0.0;
    }
    Ok(g)
}
