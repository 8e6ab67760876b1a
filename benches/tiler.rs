use criterion::{criterion_group, criterion_main, Criterion};
use nalgebra::Point3;
use seurat_tiler::{geometry, run, Parameters, PointSet};

fn sphere_points(n: usize) -> Vec<Point3<f64>> {
    (0..n)
        .map(|i| {
            let v = geometry::generate_fibonacci_sphere_point(n, 0.0, i);
            Point3::from(v.coords * 10.0)
        })
        .collect()
}

fn bench_small_sphere(c: &mut Criterion) {
    let positions = sphere_points(2_000);
    let points = PointSet::new(1, &positions, &[], &[], &[]);
    let mut parameters = Parameters::default();
    parameters.tile_count = 64;
    parameters.max_subdivision_level = 5;
    parameters.min_subdivision_level = 1;

    c.bench_function("tile 2k points to 64 tiles", |b| {
        b.iter(|| run(&points, &parameters).unwrap())
    });
}

criterion_group!(benches, bench_small_sphere);
criterion_main!(benches);
