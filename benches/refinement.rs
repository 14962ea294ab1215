use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nalgebra::Point3;
use shapecorr::mesh::{cotangent_laplacian, generalized_eigen, geodesic_matrix, voronoi_mass_matrix};
use shapecorr::{refine_correspondence, Correspondence, FilterParams, Mesh};
use shapecorr::filter::{product_manifold_kernel, ArgMaxAssignment};

fn grid_mesh(side: usize) -> Mesh {
    let mut vertices = Vec::with_capacity(side * side);
    for r in 0..side {
        for c in 0..side {
            vertices.push(Point3::new(c as f64, r as f64, 0.0));
        }
    }
    let mut faces = Vec::new();
    for r in 0..side - 1 {
        for c in 0..side - 1 {
            let v = r * side + c;
            faces.push([v, v + 1, v + side]);
            faces.push([v + 1, v + side + 1, v + side]);
        }
    }
    Mesh::new(vertices, faces).unwrap()
}

fn bench_spectral(c: &mut Criterion) {
    let mesh = grid_mesh(10);
    let laplacian = cotangent_laplacian(mesh.vertices(), mesh.faces()).unwrap();
    let mass = voronoi_mass_matrix(mesh.vertices(), mesh.faces()).unwrap();

    let mut group = c.benchmark_group("spectral");
    group.sample_size(10);
    group.bench_function("generalized_eigen_100v_rank20", |b| {
        b.iter(|| generalized_eigen(black_box(&laplacian), black_box(&mass), 20).unwrap())
    });
    group.finish();
}

fn bench_geodesics(c: &mut Criterion) {
    let mesh = grid_mesh(12);

    let mut group = c.benchmark_group("geodesics");
    group.sample_size(10);
    group.bench_function("all_pairs_144v", |b| {
        b.iter(|| geodesic_matrix(black_box(mesh.vertices()), black_box(mesh.faces())).unwrap())
    });
    group.finish();
}

fn bench_refinement(c: &mut Criterion) {
    let mut mesh = grid_mesh(12);
    mesh.normalize_area().unwrap();
    let g = mesh.geodesics().unwrap().clone();
    let seed = Correspondence::identity(g.nrows());
    let params = FilterParams {
        sigma: 0.13,
        gamma: 1.0,
        iterations: 1,
    };

    let mut group = c.benchmark_group("refinement");
    group.bench_function("kernel_144x144", |b| {
        b.iter(|| product_manifold_kernel(black_box(&g), black_box(&g), &seed, 0.13).unwrap())
    });
    group.bench_function("one_round_argmax_144v", |b| {
        b.iter(|| {
            refine_correspondence(&ArgMaxAssignment, black_box(&g), black_box(&g), &seed, &params)
                .unwrap()
        })
    });
    group.finish();
}

criterion_group!(benches, bench_spectral, bench_geodesics, bench_refinement);
criterion_main!(benches);
