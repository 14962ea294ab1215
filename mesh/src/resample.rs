//! Resolution-changing operations on raw vertex/face arrays.
//!
//! Decimation clusters vertices on a uniform grid and keeps one original
//! vertex per cluster, so the result is an index subset of the input and
//! cached per-vertex data can be sub-selected instead of recomputed.
//! Upsampling is plain midpoint subdivision, leaving original vertices in
//! place at their original indices.

use nalgebra::Point3;
use shapecorr_core::{Error, Result};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Result of a decimation: proxy geometry plus the original index of every
/// proxy vertex.
#[derive(Debug, Clone)]
pub struct Decimated {
    pub vertices: Vec<Point3<f64>>,
    pub faces: Vec<[usize; 3]>,
    pub indices: Vec<usize>,
}

fn bounds(vertices: &[Point3<f64>]) -> (Point3<f64>, Point3<f64>) {
    let mut min = vertices[0];
    let mut max = vertices[0];
    for v in vertices {
        min.x = min.x.min(v.x);
        min.y = min.y.min(v.y);
        min.z = min.z.min(v.z);
        max.x = max.x.max(v.x);
        max.y = max.y.max(v.y);
        max.z = max.z.max(v.z);
    }
    (min, max)
}

fn grid_key(v: &Point3<f64>, min: &Point3<f64>, cell: f64) -> (i64, i64, i64) {
    (
        ((v.x - min.x) / cell).floor() as i64,
        ((v.y - min.y) / cell).floor() as i64,
        ((v.z - min.z) / cell).floor() as i64,
    )
}

fn cluster_count(vertices: &[Point3<f64>], min: &Point3<f64>, cell: f64) -> usize {
    let mut keys: HashSet<(i64, i64, i64)> = HashSet::with_capacity(vertices.len());
    for v in vertices {
        keys.insert(grid_key(v, min, cell));
    }
    keys.len()
}

/// Decimates to at most `target` vertices by uniform-grid clustering.
///
/// Each cluster is represented by the member vertex nearest the cluster
/// centroid, so proxy vertices are a subset of the originals. The grid cell
/// size is found by bisection: the smallest cell whose cluster count does
/// not exceed `target`. Degenerate and duplicate faces are dropped.
pub fn cluster_decimate(
    vertices: &[Point3<f64>],
    faces: &[[usize; 3]],
    target: usize,
) -> Result<Decimated> {
    if vertices.is_empty() {
        return Err(Error::Geometry("mesh has no vertices".into()));
    }
    if faces.is_empty() {
        return Err(Error::Geometry(
            "decimation requires a triangulation but the mesh has no faces".into(),
        ));
    }
    if target == 0 {
        return Err(Error::Geometry("decimation target must be positive".into()));
    }
    crate::geometry::validate_faces(vertices.len(), faces)?;

    if vertices.len() <= target {
        return Ok(Decimated {
            vertices: vertices.to_vec(),
            faces: faces.to_vec(),
            indices: (0..vertices.len()).collect(),
        });
    }

    let (min, max) = bounds(vertices);
    let diagonal = (max - min).norm();
    if diagonal < 1e-12 {
        return Err(Error::Geometry(
            "cannot decimate a mesh with coincident vertices".into(),
        ));
    }

    // Cluster count shrinks as the cell grows; bisect for the finest cell
    // that still lands at or under the target.
    let mut lo = diagonal * 1e-6;
    let mut hi = 2.0 * diagonal;
    for _ in 0..48 {
        let mid = 0.5 * (lo + hi);
        if cluster_count(vertices, &min, mid) > target {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    let cell = hi;

    let mut clusters: BTreeMap<(i64, i64, i64), Vec<usize>> = BTreeMap::new();
    for (i, v) in vertices.iter().enumerate() {
        clusters.entry(grid_key(v, &min, cell)).or_default().push(i);
    }

    let mut indices = Vec::with_capacity(clusters.len());
    let mut new_vertices = Vec::with_capacity(clusters.len());
    let mut vertex_remap: Vec<usize> = vec![0; vertices.len()];

    for (new_idx, members) in clusters.values().enumerate() {
        let mut centroid = Point3::origin();
        for &idx in members {
            centroid += vertices[idx].coords;
        }
        centroid /= members.len() as f64;

        // Snap the representative onto the member nearest the centroid.
        let representative = members
            .iter()
            .copied()
            .min_by(|&a, &b| {
                let da = (vertices[a] - centroid).norm_squared();
                let db = (vertices[b] - centroid).norm_squared();
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(members[0]);

        indices.push(representative);
        new_vertices.push(vertices[representative]);
        for &idx in members {
            vertex_remap[idx] = new_idx;
        }
    }

    let mut new_faces: Vec<[usize; 3]> = Vec::new();
    let mut seen_faces: HashSet<[usize; 3]> = HashSet::new();
    for face in faces {
        let new_face = [
            vertex_remap[face[0]],
            vertex_remap[face[1]],
            vertex_remap[face[2]],
        ];
        if new_face[0] != new_face[1] && new_face[1] != new_face[2] && new_face[2] != new_face[0] {
            let sorted = {
                let mut s = new_face;
                s.sort_unstable();
                s
            };
            if seen_faces.insert(sorted) {
                new_faces.push(new_face);
            }
        }
    }

    log::debug!(
        "cluster decimation: {} -> {} vertices (target {}), {} faces",
        vertices.len(),
        new_vertices.len(),
        target,
        new_faces.len()
    );

    Ok(Decimated {
        vertices: new_vertices,
        faces: new_faces,
        indices,
    })
}

/// Result of one subdivision round. New vertices sit after the originals;
/// `edge_parents[i]` names the two endpoints that produced appended vertex
/// `original_count + i`, so per-vertex data can be interpolated.
#[derive(Debug, Clone)]
pub struct Subdivided {
    pub vertices: Vec<Point3<f64>>,
    pub faces: Vec<[usize; 3]>,
    pub edge_parents: Vec<(usize, usize)>,
}

/// One round of midpoint subdivision: every edge gains a midpoint vertex
/// and every face splits into four. Original vertices keep their positions
/// and indices.
pub fn midpoint_subdivide(
    vertices: &[Point3<f64>],
    faces: &[[usize; 3]],
) -> Result<Subdivided> {
    if vertices.is_empty() {
        return Err(Error::Geometry("mesh has no vertices".into()));
    }
    if faces.is_empty() {
        return Err(Error::Geometry(
            "subdivision requires a triangulation but the mesh has no faces".into(),
        ));
    }
    crate::geometry::validate_faces(vertices.len(), faces)?;

    let mut new_vertices = vertices.to_vec();
    let mut edge_parents: Vec<(usize, usize)> = Vec::new();
    let mut edge_vertices: HashMap<(usize, usize), usize> = HashMap::new();
    let mut new_faces: Vec<[usize; 3]> = Vec::with_capacity(faces.len() * 4);

    for face in faces {
        let mut mids = [0usize; 3];
        for e in 0..3 {
            let v0 = face[e];
            let v1 = face[(e + 1) % 3];
            let edge = (v0.min(v1), v0.max(v1));
            mids[e] = *edge_vertices.entry(edge).or_insert_with(|| {
                let midpoint =
                    Point3::from((vertices[v0].coords + vertices[v1].coords) * 0.5);
                new_vertices.push(midpoint);
                edge_parents.push(edge);
                new_vertices.len() - 1
            });
        }

        let [v0, v1, v2] = *face;
        let [e01, e12, e20] = mids;
        new_faces.push([v0, e01, e20]);
        new_faces.push([v1, e12, e01]);
        new_faces.push([v2, e20, e12]);
        new_faces.push([e01, e12, e20]);
    }

    Ok(Subdivided {
        vertices: new_vertices,
        faces: new_faces,
        edge_parents,
    })
}
