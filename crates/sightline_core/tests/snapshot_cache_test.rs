//! Integration tests for the entity snapshot cache.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sightline_core::sim::{EntitySpec, SceneBuilder, StandardScene};
use sightline_core::{
    CacheSettings, EntitySnapshotCache, PointerChain, RefreshOutcome, RemoteRef, RigTag,
    SceneRootSource, SchemaNames, Settings,
};
use sightline_shared::Vec3;

fn cache(scene: &SceneBuilder, root: Arc<dyn SceneRootSource>, interval_ms: u64) -> EntitySnapshotCache {
    EntitySnapshotCache::new(
        scene.reader(),
        root,
        Arc::new(SchemaNames::default()),
        CacheSettings {
            refresh_interval_ms: interval_ms,
            ..CacheSettings::default()
        },
    )
}

#[test]
fn test_recurring_identity_keeps_parts_and_refreshes_name() {
    let mut scene = SceneBuilder::new();
    let layout = StandardScene::build(&mut scene);
    let handles = scene.spawn_entity(&layout, &EntitySpec::modern(Vec3::ZERO).named("before"));
    let cache = cache(&scene, Arc::new(layout.root_ref()), 0);

    assert_eq!(cache.refresh(), RefreshOutcome::Refreshed { count: 1 });
    let first = cache.get_snapshot().remove(0);

    // Sub-parts change remotely, but the remembered entity is reused.
    scene.detach(handles.model, handles.anchor);
    scene.set_name(handles.entity, "after");

    assert_eq!(cache.refresh(), RefreshOutcome::Refreshed { count: 1 });
    let second = cache.get_snapshot().remove(0);

    assert_eq!(second.name, "after");
    assert_eq!(second.identity(), first.identity());
    assert_eq!(second.anchor, first.anchor);
    assert_eq!(second.rig, first.rig);
}

#[test]
fn test_only_valid_entities_are_published() {
    let mut scene = SceneBuilder::new();
    let layout = StandardScene::build(&mut scene);
    scene.spawn_entity(&layout, &EntitySpec::modern(Vec3::ZERO).named("whole"));
    scene.spawn_entity(&layout, &EntitySpec::classic(Vec3::ZERO).named("legacy"));

    let mut headless = EntitySpec::modern(Vec3::ZERO).named("headless");
    headless.with_head = false;
    scene.spawn_entity(&layout, &headless);

    let anchorless = scene.spawn_entity(&layout, &EntitySpec::classic(Vec3::ZERO).named("anchorless"));
    scene.detach(anchorless.model, anchorless.anchor);

    let cache = cache(&scene, Arc::new(layout.root_ref()), 0);
    assert_eq!(cache.refresh(), RefreshOutcome::Refreshed { count: 2 });

    let snapshot = cache.get_snapshot();
    assert!(snapshot.iter().all(|entity| entity.is_valid()));
    let mut names: Vec<&str> = snapshot.iter().map(|entity| entity.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["legacy", "whole"]);
    let legacy = snapshot.iter().find(|entity| entity.name == "legacy").unwrap();
    assert_eq!(legacy.rig_tag(), RigTag::Classic);
}

#[test]
fn test_team_name_is_resolved() {
    let mut scene = SceneBuilder::new();
    let layout = StandardScene::build(&mut scene);
    let handles = scene.spawn_entity(&layout, &EntitySpec::modern(Vec3::ZERO));
    let teams = scene.node("Teams", "Teams", Some(layout.root));
    let red = scene.node("Team", "Red", Some(teams));
    scene.set_team(handles.entity, red);

    let cache = cache(&scene, Arc::new(layout.root_ref()), 0);
    cache.refresh();
    assert_eq!(cache.get_snapshot()[0].team, "Red");
}

#[test]
fn test_root_resolved_through_pointer_chain() {
    let mut scene = SceneBuilder::new();
    let layout = StandardScene::build(&mut scene);
    scene.spawn_entity(&layout, &EntitySpec::modern(Vec3::ZERO));

    let memory = scene.memory();
    let image_base = memory.alloc(0x100);
    let holder = memory.alloc(0x40);
    memory.write(image_base + 0x80, holder);
    memory.write(holder + 0x10, layout.root);

    let text = format!("[root]\nbase = {image_base}\nhops = [0x80, 0x10]\n");
    let settings = Settings::from_toml_str(&text).unwrap();
    let chain: PointerChain = settings.root.unwrap();

    let cache = cache(&scene, Arc::new(chain), 0);
    assert_eq!(cache.refresh(), RefreshOutcome::Refreshed { count: 1 });

    // The target moves its root; the chain follows on the next refresh.
    memory.write(holder + 0x10, 0u64);
    assert_eq!(cache.refresh(), RefreshOutcome::RootUnavailable);
    assert_eq!(cache.get_snapshot().len(), 1);
}

#[test]
fn test_faulting_target_keeps_snapshot() {
    let mut scene = SceneBuilder::new();
    let layout = StandardScene::build(&mut scene);
    scene.spawn_entity(&layout, &EntitySpec::modern(Vec3::ZERO));
    let cache = cache(&scene, Arc::new(layout.root_ref()), 0);
    assert_eq!(cache.refresh(), RefreshOutcome::Refreshed { count: 1 });

    scene.memory().set_faulting(true);
    assert_eq!(cache.refresh(), RefreshOutcome::RootUnavailable);
    assert!(cache.get_observer_entity().is_none());
    assert_eq!(cache.get_snapshot().len(), 1);
    assert!(!cache.is_refreshing());

    scene.memory().set_faulting(false);
    assert_eq!(cache.refresh(), RefreshOutcome::Refreshed { count: 1 });
}

#[test]
fn test_root_unavailable_does_not_stamp_marker() {
    let scene = SceneBuilder::new();
    let cache = cache(&scene, Arc::new(RemoteRef::INVALID), 60_000);
    assert_eq!(cache.refresh(), RefreshOutcome::RootUnavailable);
    assert!(cache.last_refresh().is_none());
    // Not throttled: the failed attempt did not count as a refresh.
    assert_eq!(cache.refresh(), RefreshOutcome::RootUnavailable);
}

#[test]
fn test_concurrent_refresh_and_readers() {
    let mut scene = SceneBuilder::new();
    let layout = StandardScene::build(&mut scene);
    for i in 0..20 {
        let x = i as f32 * 4.0;
        scene.spawn_entity(&layout, &EntitySpec::modern(Vec3::new(x, 3.0, 0.0)).named(&format!("e{i}")));
    }
    let cache = Arc::new(cache(&scene, Arc::new(layout.root_ref()), 1));
    let stop = Arc::new(AtomicBool::new(false));
    let refreshed = Arc::new(AtomicUsize::new(0));

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let stop = Arc::clone(&stop);
            let refreshed = Arc::clone(&refreshed);
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    if let RefreshOutcome::Refreshed { .. } = cache.refresh() {
                        refreshed.fetch_add(1, Ordering::Relaxed);
                    }
                    for entity in cache.get_snapshot() {
                        assert!(entity.is_valid());
                    }
                }
            })
        })
        .collect();

    // Churn the population while the workers run.
    for i in 20..40 {
        let handles =
            scene.spawn_entity(&layout, &EntitySpec::classic(Vec3::ZERO).named(&format!("e{i}")));
        if i % 3 == 0 {
            scene.detach(layout.container, handles.entity);
        }
        thread::sleep(Duration::from_millis(2));
    }
    thread::sleep(Duration::from_millis(20));
    stop.store(true, Ordering::Relaxed);
    for worker in workers {
        worker.join().unwrap();
    }

    assert!(refreshed.load(Ordering::Relaxed) > 0);
    assert!(!cache.is_refreshing());
    thread::sleep(Duration::from_millis(2));
    assert!(matches!(cache.refresh(), RefreshOutcome::Refreshed { .. }));
    // 20 modern + 20 classic spawned, every third of the latter removed.
    assert_eq!(cache.get_snapshot().len(), 33);
}
