//! Small deterministic meshes shared across unit tests.

use nalgebra::{Point3, Vector3};
use std::collections::HashMap;

/// Flat triangulated grid of `side` x `side` vertices in the z = 0 plane.
pub(crate) fn flat_grid(side: usize) -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
    let mut vertices = Vec::new();
    for i in 0..side {
        for j in 0..side {
            vertices.push(Point3::new(i as f64, j as f64, 0.0));
        }
    }
    let mut faces = Vec::new();
    for i in 0..side - 1 {
        for j in 0..side - 1 {
            let v00 = i * side + j;
            let v01 = v00 + 1;
            let v10 = v00 + side;
            let v11 = v10 + 1;
            faces.push([v00, v10, v01]);
            faces.push([v01, v10, v11]);
        }
    }
    (vertices, faces)
}

/// Unit square split into two triangles along the diagonal.
pub(crate) fn two_triangle_square() -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
    let vertices = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
        Point3::new(1.0, 1.0, 0.0),
    ];
    let faces = vec![[0, 1, 2], [1, 3, 2]];
    (vertices, faces)
}

/// Axis-aligned unit cube with two triangles per side.
pub(crate) fn cube() -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
    let vertices = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(1.0, 1.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
        Point3::new(0.0, 0.0, 1.0),
        Point3::new(1.0, 0.0, 1.0),
        Point3::new(1.0, 1.0, 1.0),
        Point3::new(0.0, 1.0, 1.0),
    ];
    let faces = vec![
        [0, 2, 1],
        [0, 3, 2],
        [4, 5, 6],
        [4, 6, 7],
        [0, 1, 5],
        [0, 5, 4],
        [1, 2, 6],
        [1, 6, 5],
        [2, 3, 7],
        [2, 7, 6],
        [3, 0, 4],
        [3, 4, 7],
    ];
    (vertices, faces)
}

/// Unit-sphere icosphere: icosahedron plus `levels` rounds of midpoint
/// subdivision, every vertex reprojected onto the sphere.
pub(crate) fn icosphere(levels: usize) -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
    let phi = (1.0 + 5.0_f64.sqrt()) / 2.0;
    let mut vertices: Vec<Point3<f64>> = [
        [-1.0, phi, 0.0],
        [1.0, phi, 0.0],
        [-1.0, -phi, 0.0],
        [1.0, -phi, 0.0],
        [0.0, -1.0, phi],
        [0.0, 1.0, phi],
        [0.0, -1.0, -phi],
        [0.0, 1.0, -phi],
        [phi, 0.0, -1.0],
        [phi, 0.0, 1.0],
        [-phi, 0.0, -1.0],
        [-phi, 0.0, 1.0],
    ]
    .iter()
    .map(|c| Point3::from(Vector3::new(c[0], c[1], c[2]).normalize()))
    .collect();

    let mut faces: Vec<[usize; 3]> = vec![
        [0, 11, 5],
        [0, 5, 1],
        [0, 1, 7],
        [0, 7, 10],
        [0, 10, 11],
        [1, 5, 9],
        [5, 11, 4],
        [11, 10, 2],
        [10, 7, 6],
        [7, 1, 8],
        [3, 9, 4],
        [3, 4, 2],
        [3, 2, 6],
        [3, 6, 8],
        [3, 8, 9],
        [4, 9, 5],
        [2, 4, 11],
        [6, 2, 10],
        [8, 6, 7],
        [9, 8, 1],
    ];

    for _ in 0..levels {
        let mut midpoints: HashMap<(usize, usize), usize> = HashMap::new();
        let mut new_faces = Vec::with_capacity(faces.len() * 4);
        for face in &faces {
            let mut mids = [0usize; 3];
            for e in 0..3 {
                let v0 = face[e];
                let v1 = face[(e + 1) % 3];
                let key = (v0.min(v1), v0.max(v1));
                mids[e] = *midpoints.entry(key).or_insert_with(|| {
                    let mid = Point3::from(
                        ((vertices[v0].coords + vertices[v1].coords) * 0.5).normalize(),
                    );
                    vertices.push(mid);
                    vertices.len() - 1
                });
            }
            new_faces.push([face[0], mids[0], mids[2]]);
            new_faces.push([face[1], mids[1], mids[0]]);
            new_faces.push([face[2], mids[2], mids[1]]);
            new_faces.push([mids[0], mids[1], mids[2]]);
        }
        faces = new_faces;
    }

    (vertices, faces)
}
