//! # Entity Snapshot Cache
//!
//! Owns the published "current tick" entity list.
//!
//! ## Refresh Protocol
//!
//! ```text
//! refresh()
//!   ├─ interval not elapsed? ──────────────> Throttled
//!   ├─ gate.try_lock() failed? ────────────> Busy
//!   ├─ in-flight flag already set? ────────> Busy
//!   ├─ root / container invalid? ──────────> RootUnavailable (snapshot kept)
//!   ├─ walk container children (unlocked w.r.t. readers)
//!   │     known identity  -> reuse, refresh name
//!   │     new identity    -> classify, remember if valid
//!   └─ published.write(): swap list + stamp marker ─> Refreshed
//! ```
//!
//! ## Locks
//!
//! - `gate`: owns the identity-keyed entity map. Only a refresher holds it,
//!   and only via `try_lock`, so no caller ever waits on a refresh.
//! - `published`: the snapshot and its timestamp. Held only to copy or swap;
//!   never across a remote read.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::config::CacheSettings;
use crate::entity::{Entity, EntityClassifier};
use crate::graph::{GraphReader, ObjectNode};
use crate::layout::SchemaNames;
use crate::root::SceneRootSource;

/// What a call to [`EntitySnapshotCache::refresh`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new snapshot was published.
    Refreshed {
        /// Entities in the new snapshot.
        count: usize,
    },
    /// The minimum interval has not elapsed.
    Throttled,
    /// Another refresh holds the gate.
    Busy,
    /// The scene root or entity container did not resolve.
    RootUnavailable,
}

#[derive(Debug, Default)]
struct Published {
    entities: Vec<Entity>,
    refreshed_at: Option<Instant>,
}

/// Clears the in-flight flag on every exit path.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Throttled, non-blocking cache of classified entities.
pub struct EntitySnapshotCache {
    graph: GraphReader,
    root: Arc<dyn SceneRootSource>,
    schema: Arc<SchemaNames>,
    classifier: EntityClassifier,
    settings: CacheSettings,
    gate: Mutex<HashMap<u64, Entity>>,
    published: RwLock<Published>,
    refreshing: AtomicBool,
}

impl std::fmt::Debug for EntitySnapshotCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntitySnapshotCache")
            .field("settings", &self.settings)
            .field("published", &self.published.read().entities.len())
            .field("refreshing", &self.is_refreshing())
            .finish_non_exhaustive()
    }
}

impl EntitySnapshotCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(
        graph: GraphReader,
        root: Arc<dyn SceneRootSource>,
        schema: Arc<SchemaNames>,
        settings: CacheSettings,
    ) -> Self {
        Self {
            graph,
            root,
            classifier: EntityClassifier::new(Arc::clone(&schema)),
            schema,
            settings,
            gate: Mutex::new(HashMap::new()),
            published: RwLock::new(Published::default()),
            refreshing: AtomicBool::new(false),
        }
    }

    /// Rebuilds the snapshot if the interval has elapsed and no other refresh
    /// is running. Never blocks; on any contention the previous snapshot
    /// stays visible.
    pub fn refresh(&self) -> RefreshOutcome {
        if self.throttled() {
            return RefreshOutcome::Throttled;
        }
        let Some(mut known) = self.gate.try_lock() else {
            return RefreshOutcome::Busy;
        };
        if self
            .refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return RefreshOutcome::Busy;
        }
        let _in_flight = InFlight(&self.refreshing);

        // A refresher that finished while we waited for the gate.
        if self.throttled() {
            return RefreshOutcome::Throttled;
        }

        let root = self.graph.node(self.root.resolve(&self.graph));
        if !root.is_valid() {
            trace!("scene root unavailable, keeping previous snapshot");
            return RefreshOutcome::RootUnavailable;
        }
        let container = root.find_first_child_of_class(&self.schema.entity_container);
        if !container.is_valid() {
            trace!("entity container unavailable, keeping previous snapshot");
            return RefreshOutcome::RootUnavailable;
        }

        let children = container.children();
        if children.len() > self.settings.memo_clear_threshold {
            debug!(
                population = children.len(),
                remembered = known.len(),
                "population above threshold, discarding entity memo"
            );
            known.clear();
        }

        let mut snapshot = Vec::with_capacity(children.len());
        for child in children {
            if let Some(entity) = self.resolve_child(child, &mut known) {
                snapshot.push(entity);
            }
        }
        if snapshot.is_empty() {
            known.clear();
        }

        let count = snapshot.len();
        {
            let mut published = self.published.write();
            published.entities = snapshot;
            published.refreshed_at = Some(Instant::now());
        }
        trace!(count, remembered = known.len(), "entity snapshot published");
        RefreshOutcome::Refreshed { count }
    }

    fn resolve_child(
        &self,
        child: ObjectNode<'_>,
        known: &mut HashMap<u64, Entity>,
    ) -> Option<Entity> {
        if !child.is_valid() || child.type_tag() != self.schema.entity_kind {
            return None;
        }
        let model = child.model();
        if !model.is_valid() {
            return None;
        }

        let name = child.name();
        if let Some(cached) = known.get_mut(&model.address()) {
            cached.name = name;
            return Some(cached.clone());
        }

        let entity = self.classifier.observe(child, &self.graph)?;
        known.insert(entity.identity(), entity.clone());
        Some(entity)
    }

    fn throttled(&self) -> bool {
        self.published
            .read()
            .refreshed_at
            .is_some_and(|at| at.elapsed() < self.settings.refresh_interval())
    }

    /// Copy of the published snapshot.
    #[must_use]
    pub fn get_snapshot(&self) -> Vec<Entity> {
        self.published.read().entities.clone()
    }

    /// Classifies the local entity fresh; never cached.
    #[must_use]
    pub fn get_observer_entity(&self) -> Option<Entity> {
        let root = self.graph.node(self.root.resolve(&self.graph));
        let container = root.find_first_child_of_class(&self.schema.entity_container);
        let local = container.local_entity();
        if !local.is_valid() {
            return None;
        }
        self.classifier.observe(local, &self.graph)
    }

    /// True while a refresh is running.
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::Acquire)
    }

    /// Completion time of the last successful refresh.
    #[must_use]
    pub fn last_refresh(&self) -> Option<Instant> {
        self.published.read().refreshed_at
    }

    /// The reader this cache resolves against.
    #[must_use]
    pub fn graph(&self) -> &GraphReader {
        &self.graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteRef;
    use crate::sim::{EntitySpec, SceneBuilder, StandardScene};
    use sightline_shared::Vec3;

    fn cache_for(scene: &SceneBuilder, root: u64, interval_ms: u64) -> EntitySnapshotCache {
        EntitySnapshotCache::new(
            scene.reader(),
            Arc::new(RemoteRef::new(root)),
            Arc::new(SchemaNames::default()),
            CacheSettings {
                refresh_interval_ms: interval_ms,
                ..CacheSettings::default()
            },
        )
    }

    #[test]
    fn test_first_refresh_is_immediate() {
        let mut scene = SceneBuilder::new();
        let layout = StandardScene::build(&mut scene);
        scene.spawn_entity(&layout, &EntitySpec::modern(Vec3::ZERO).named("alpha"));
        let cache = cache_for(&scene, layout.root, 100);

        assert!(cache.last_refresh().is_none());
        assert_eq!(cache.refresh(), RefreshOutcome::Refreshed { count: 1 });
        assert_eq!(cache.get_snapshot()[0].name, "alpha");
        assert!(!cache.is_refreshing());
    }

    #[test]
    fn test_second_refresh_within_interval_is_throttled() {
        let mut scene = SceneBuilder::new();
        let layout = StandardScene::build(&mut scene);
        let first = scene.spawn_entity(&layout, &EntitySpec::modern(Vec3::ZERO).named("alpha"));
        let cache = cache_for(&scene, layout.root, 60_000);

        assert_eq!(cache.refresh(), RefreshOutcome::Refreshed { count: 1 });
        let before = cache.get_snapshot();
        let stamp = cache.last_refresh();

        scene.set_name(first.entity, "renamed");
        scene.spawn_entity(&layout, &EntitySpec::classic(Vec3::ZERO).named("beta"));

        assert_eq!(cache.refresh(), RefreshOutcome::Throttled);
        assert_eq!(cache.get_snapshot(), before);
        assert_eq!(cache.last_refresh(), stamp);
    }

    #[test]
    fn test_busy_gate_skips_tick() {
        let mut scene = SceneBuilder::new();
        let layout = StandardScene::build(&mut scene);
        scene.spawn_entity(&layout, &EntitySpec::modern(Vec3::ZERO));
        let cache = cache_for(&scene, layout.root, 0);

        let held = cache.gate.lock();
        assert_eq!(cache.refresh(), RefreshOutcome::Busy);
        drop(held);
        assert_eq!(cache.refresh(), RefreshOutcome::Refreshed { count: 1 });
    }

    #[test]
    fn test_in_flight_flag_skips_tick() {
        let mut scene = SceneBuilder::new();
        let layout = StandardScene::build(&mut scene);
        let cache = cache_for(&scene, layout.root, 0);

        cache.refreshing.store(true, Ordering::Release);
        assert!(cache.is_refreshing());
        assert_eq!(cache.refresh(), RefreshOutcome::Busy);
        cache.refreshing.store(false, Ordering::Release);
        assert_eq!(cache.refresh(), RefreshOutcome::Refreshed { count: 0 });
    }

    #[test]
    fn test_missing_root_keeps_previous_snapshot() {
        let mut scene = SceneBuilder::new();
        let layout = StandardScene::build(&mut scene);
        scene.spawn_entity(&layout, &EntitySpec::modern(Vec3::ZERO));
        let cache = cache_for(&scene, layout.root, 0);
        assert_eq!(cache.refresh(), RefreshOutcome::Refreshed { count: 1 });

        scene.detach(layout.root, layout.container);
        assert_eq!(cache.refresh(), RefreshOutcome::RootUnavailable);
        assert_eq!(cache.get_snapshot().len(), 1);
        assert!(!cache.is_refreshing());

        let orphan = cache_for(&scene, 0, 0);
        assert_eq!(orphan.refresh(), RefreshOutcome::RootUnavailable);
        assert!(orphan.get_snapshot().is_empty());
    }

    #[test]
    fn test_entity_without_model_is_skipped() {
        let mut scene = SceneBuilder::new();
        let layout = StandardScene::build(&mut scene);
        scene.spawn_entity(&layout, &EntitySpec::modern(Vec3::ZERO).named("alive"));
        let dead = scene.spawn_entity(&layout, &EntitySpec::modern(Vec3::ZERO).named("dead"));
        scene.clear_model(dead.entity);
        scene.node("Folder", "NotAnEntity", Some(layout.container));
        let cache = cache_for(&scene, layout.root, 0);

        assert_eq!(cache.refresh(), RefreshOutcome::Refreshed { count: 1 });
        assert_eq!(cache.get_snapshot()[0].name, "alive");
    }

    #[test]
    fn test_population_spike_discards_memo() {
        let mut scene = SceneBuilder::new();
        let layout = StandardScene::build(&mut scene);
        scene.spawn_entity(&layout, &EntitySpec::modern(Vec3::ZERO));
        let cache = EntitySnapshotCache::new(
            scene.reader(),
            Arc::new(RemoteRef::new(layout.root)),
            Arc::new(SchemaNames::default()),
            CacheSettings {
                refresh_interval_ms: 0,
                memo_clear_threshold: 2,
            },
        );
        assert_eq!(cache.refresh(), RefreshOutcome::Refreshed { count: 1 });
        assert_eq!(cache.gate.lock().len(), 1);

        for _ in 0..2 {
            scene.node("Folder", "Filler", Some(layout.container));
        }
        assert_eq!(cache.refresh(), RefreshOutcome::Refreshed { count: 1 });
        // Cleared, then the surviving entity re-classified.
        assert_eq!(cache.gate.lock().len(), 1);
    }

    #[test]
    fn test_empty_population_evicts_memo() {
        let mut scene = SceneBuilder::new();
        let layout = StandardScene::build(&mut scene);
        let only = scene.spawn_entity(&layout, &EntitySpec::modern(Vec3::ZERO));
        let cache = cache_for(&scene, layout.root, 0);
        assert_eq!(cache.refresh(), RefreshOutcome::Refreshed { count: 1 });

        scene.detach(layout.container, only.entity);
        assert_eq!(cache.refresh(), RefreshOutcome::Refreshed { count: 0 });
        assert!(cache.gate.lock().is_empty());
    }

    #[test]
    fn test_observer_entity_is_fresh() {
        let mut scene = SceneBuilder::new();
        let layout = StandardScene::build(&mut scene);
        let me = scene.spawn_entity(&layout, &EntitySpec::modern(Vec3::ZERO).named("me"));
        let cache = cache_for(&scene, layout.root, 60_000);
        assert!(cache.get_observer_entity().is_none());

        scene.set_local_entity(layout.container, me.entity);
        let observer = cache.get_observer_entity().unwrap();
        assert_eq!(observer.name, "me");
        assert_eq!(observer.model.address, me.model);

        scene.set_name(me.entity, "me-again");
        assert_eq!(cache.get_observer_entity().unwrap().name, "me-again");
        assert!(cache.last_refresh().is_none());
    }
}
