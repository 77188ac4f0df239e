//! End-to-end visibility over a synthetic scene: snapshot, rebuild, query.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sightline_core::sim::{EntitySpec, SceneBuilder, StandardScene};
use sightline_core::{
    CacheSettings, EntitySnapshotCache, OcclusionModel, OcclusionSettings, RefreshOutcome,
    SchemaNames, VisibilityEngine, VisibilitySettings,
};
use sightline_shared::Vec3;

const WAIT: Duration = Duration::from_secs(5);

struct World {
    scene: SceneBuilder,
    layout: StandardScene,
    cache: EntitySnapshotCache,
    engine: VisibilityEngine,
}

impl World {
    fn new() -> Self {
        Self::with_visibility(VisibilitySettings::default())
    }

    fn with_visibility(settings: VisibilitySettings) -> Self {
        let mut scene = SceneBuilder::new();
        let layout = StandardScene::build(&mut scene);
        let schema = Arc::new(SchemaNames::default());
        let cache = EntitySnapshotCache::new(
            scene.reader(),
            Arc::new(layout.root_ref()),
            Arc::clone(&schema),
            CacheSettings {
                refresh_interval_ms: 0,
                ..CacheSettings::default()
            },
        );
        let model = Arc::new(OcclusionModel::new(
            scene.reader(),
            schema,
            OcclusionSettings::default(),
        ));
        let engine = VisibilityEngine::new(model, settings);
        Self {
            scene,
            layout,
            cache,
            engine,
        }
    }

    fn rebuild(&self) {
        assert!(self.engine.model().start_rebuild(self.layout.root_ref()));
        assert!(self.engine.model().wait_idle(WAIT));
    }

    fn visible(&self, observer: Vec3, name: &str) -> bool {
        let entity = self
            .cache
            .get_snapshot()
            .into_iter()
            .find(|entity| entity.name == name)
            .unwrap();
        let samples = entity.sample_points(self.cache.graph());
        self.engine.is_visible(observer, &samples, entity.identity())
    }
}

#[test]
fn test_wall_hides_one_entity_but_not_another() {
    let mut world = World::new();
    let layout = world.layout;
    world
        .scene
        .block(layout.world, "Wall", Vec3::new(0.0, 5.0, 20.0), Vec3::new(12.0, 10.0, 1.0));
    world
        .scene
        .spawn_entity(&layout, &EntitySpec::modern(Vec3::new(0.0, 3.0, 40.0)).named("hidden"));
    world
        .scene
        .spawn_entity(&layout, &EntitySpec::classic(Vec3::new(30.0, 3.0, 0.0)).named("open"));

    assert_eq!(world.cache.refresh(), RefreshOutcome::Refreshed { count: 2 });
    world.rebuild();
    assert_eq!(world.engine.model().parts().len(), 1);

    let observer = Vec3::new(0.0, 4.0, 0.0);
    assert!(!world.visible(observer, "hidden"));
    assert!(world.visible(observer, "open"));
}

#[test]
fn test_entities_never_occlude_themselves() {
    let mut world = World::new();
    let layout = world.layout;
    world
        .scene
        .spawn_entity(&layout, &EntitySpec::modern(Vec3::new(0.0, 3.0, 15.0)).named("target"));
    // Anything in the world so the model becomes ready.
    world
        .scene
        .block(layout.world, "Pillar", Vec3::new(-40.0, 5.0, 0.0), Vec3::new(2.0, 10.0, 2.0));

    world.cache.refresh();
    world.rebuild();
    let report = world.engine.model().last_report().unwrap();
    assert_eq!(report.kept, 1);
    assert!(report.excluded > 0);

    assert!(world.visible(Vec3::new(0.0, 4.0, 0.0), "target"));
}

#[test]
fn test_queries_during_rebuilds_stay_consistent() {
    let mut world = World::new();
    let layout = world.layout;
    for i in 0..200 {
        let x = (i % 20) as f32 * 6.0 - 60.0;
        let z = (i / 20) as f32 * 6.0 + 10.0;
        world
            .scene
            .block(layout.world, "Crate", Vec3::new(x, 1.0, z), Vec3::new(2.0, 2.0, 2.0));
    }
    world.rebuild();

    let world = Arc::new(world);
    let stop = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..3u64)
        .map(|id| {
            let world = Arc::clone(&world);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let samples = [Vec3::new(0.0, 1.0, 80.0); 5];
                while !stop.load(Ordering::Relaxed) {
                    world.engine.is_visible(Vec3::new(0.0, 1.0, 0.0), &samples, id + 1);
                }
            })
        })
        .collect();

    for _ in 0..5 {
        world.rebuild();
    }
    stop.store(true, Ordering::Relaxed);
    for reader in readers {
        reader.join().unwrap();
    }

    assert_eq!(world.engine.model().generation(), 6);
    assert_eq!(world.engine.model().parts().len(), 200);
    assert!(world.engine.stats().queries > 0);
}

#[test]
fn test_answers_traced_against_replaced_geometry_are_not_memoized() {
    let settings = VisibilitySettings {
        memo_ttl_ms: 60_000,
        memo_stale_after_ms: 60_000,
        ..VisibilitySettings::default()
    };
    let mut world = World::with_visibility(settings);
    let layout = world.layout;
    // Plenty of geometry off to the side keeps each old-geometry query slow.
    let clutter = world.scene.node("Folder", "Clutter", Some(layout.world));
    for i in 0..1_000 {
        let x = (i % 50) as f32 * 4.0 + 100.0;
        let z = (i / 50) as f32 * 4.0;
        world
            .scene
            .block(clutter, "Crate", Vec3::new(x, 1.0, z), Vec3::new(2.0, 2.0, 2.0));
    }
    world.rebuild();

    let World {
        mut scene, engine, ..
    } = world;
    let engine = Arc::new(engine);
    let observer = Vec3::new(0.0, 1.0, 0.0);
    let samples = [Vec3::new(0.0, 1.0, 80.0); 5];
    assert!(engine.is_visible(observer, &samples, 0));

    let stop = Arc::new(AtomicBool::new(false));
    let reader = {
        let engine = Arc::clone(&engine);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut identity = 0u64;
            while !stop.load(Ordering::Relaxed) {
                identity += 1;
                engine.is_visible(observer, &samples, identity);
            }
            identity
        })
    };

    // Swap the clutter for a wall across the line of sight.
    scene.detach(layout.world, clutter);
    scene.block(layout.world, "Wall", Vec3::new(0.0, 5.0, 40.0), Vec3::new(12.0, 10.0, 1.0));
    assert!(engine.model().start_rebuild(layout.root_ref()));
    assert!(engine.model().wait_idle(WAIT));
    thread::sleep(Duration::from_millis(20));

    stop.store(true, Ordering::Relaxed);
    let last = reader.join().unwrap();

    assert_eq!(engine.model().parts().len(), 1);
    assert!(!engine.is_visible(observer, &samples, 0));
    for identity in 1..=last {
        assert_ne!(
            engine.memo().lookup(identity),
            Some(true),
            "identity {identity} kept an answer from the old geometry"
        );
    }
}
