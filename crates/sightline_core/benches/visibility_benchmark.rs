//! # Visibility Benchmark
//!
//! Measures the query hot path against a world of ~3000 occluders:
//! 1. Single ray/box tests (culled vs. slab)
//! 2. Full uncached queries (identity 0)
//! 3. Memoized queries
//! 4. One geometry rebuild

#![allow(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sightline_core::sim::{SceneBuilder, StandardScene};
use sightline_core::{
    ray_box_test, OcclusionModel, OcclusionSettings, Ray, SchemaNames, VisibilityEngine,
    VisibilitySettings, WorldPart,
};
use sightline_shared::{Mat3, Vec3};

const GRID: usize = 55;

fn build_world() -> (SceneBuilder, StandardScene) {
    let mut scene = SceneBuilder::new();
    let layout = StandardScene::build(&mut scene);
    for i in 0..GRID * GRID {
        let x = (i % GRID) as f32 * 8.0 - 220.0;
        let z = (i / GRID) as f32 * 8.0 - 220.0;
        let height = 2.0 + (i % 7) as f32;
        scene.block(
            layout.world,
            "Block",
            Vec3::new(x, height * 0.5, z),
            Vec3::new(3.0, height, 3.0),
        );
    }
    (scene, layout)
}

fn built_engine() -> VisibilityEngine {
    let (scene, layout) = build_world();
    let model = Arc::new(OcclusionModel::new(
        scene.reader(),
        Arc::new(SchemaNames::default()),
        OcclusionSettings::default(),
    ));
    model.start_rebuild(layout.root_ref());
    model.wait_idle(Duration::from_secs(60));
    VisibilityEngine::new(model, VisibilitySettings::default())
}

fn samples_at(anchor: Vec3) -> [Vec3; 5] {
    [
        anchor + Vec3::new(0.0, 1.5, 0.0),
        anchor,
        anchor + Vec3::new(0.0, -1.0, 0.0),
        anchor + Vec3::new(-0.5, -2.0, 0.0),
        anchor + Vec3::new(0.5, -2.0, 0.0),
    ]
}

// =============================================================================
// RAY / BOX
// =============================================================================

fn bench_ray_box(c: &mut Criterion) {
    let part = WorldPart::new(Vec3::new(0.0, 0.0, 20.0), Vec3::new(4.0, 4.0, 1.0), Mat3::IDENTITY, 10.0);
    let through = Ray::between(Vec3::ZERO, Vec3::new(0.0, 0.0, 40.0)).unwrap_or(Ray {
        origin: Vec3::ZERO,
        direction: Vec3::Z,
        length: 40.0,
    });
    let away = Ray {
        direction: -Vec3::Z,
        length: 5.0,
        ..through
    };

    c.bench_function("ray_box_slab_hit", |b| {
        b.iter(|| black_box(ray_box_test(black_box(&through), black_box(&part))));
    });
    c.bench_function("ray_box_culled", |b| {
        b.iter(|| black_box(ray_box_test(black_box(&away), black_box(&part))));
    });
}

// =============================================================================
// QUERIES
// =============================================================================

fn bench_queries(c: &mut Criterion) {
    let engine = built_engine();
    let observer = Vec3::new(0.0, 4.0, -230.0);
    let near = samples_at(Vec3::new(0.0, 3.0, -200.0));
    let far = samples_at(Vec3::new(0.0, 3.0, 200.0));

    c.bench_function("visibility_uncached_near_3k", |b| {
        b.iter(|| black_box(engine.is_visible(observer, &near, 0)));
    });
    c.bench_function("visibility_uncached_far_3k", |b| {
        b.iter(|| black_box(engine.is_visible(observer, &far, 0)));
    });
    c.bench_function("visibility_memoized", |b| {
        b.iter(|| black_box(engine.is_visible(observer, &far, 77)));
    });
}

fn bench_rebuild(c: &mut Criterion) {
    let (scene, layout) = build_world();
    let model = OcclusionModel::new(
        scene.reader(),
        Arc::new(SchemaNames::default()),
        OcclusionSettings::default(),
    );

    let mut group = c.benchmark_group("occlusion");
    group.sample_size(10);
    group.bench_function("rebuild_3k_parts", |b| {
        b.iter(|| {
            model.start_rebuild(layout.root_ref());
            model.wait_idle(Duration::from_secs(60));
            black_box(model.generation())
        });
    });
    group.finish();
}

criterion_group!(benches, bench_ray_box, bench_queries, bench_rebuild);
criterion_main!(benches);
