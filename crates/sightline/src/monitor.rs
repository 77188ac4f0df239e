//! # Scene Monitor
//!
//! One object that owns the three core services and drives them on the
//! caller's cadence.
//!
//! ```text
//! every tick:                      every frame:
//! ┌──────────────────────────┐     ┌──────────────────────────────────────┐
//! │ 1. cache.refresh()       │     │ 1. observer  <- fresh classification │
//! │    (throttled, no wait)  │     │ 2. camera    <- world/camera node    │
//! │ 2. rebuild due?          │     │ 3. per snapshot entity != observer:  │
//! │    └─ model.start_rebuild│     │    distance, is_visible, health      │
//! └──────────────────────────┘     └──────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use sightline_core::{
    ConfigError, ConfigResult, Entity, EntitySnapshotCache, GraphReader, MonitorSettings,
    OcclusionModel, RefreshOutcome, RemoteMemory, SceneRootSource, SchemaNames, Settings,
    VisibilityEngine,
};
use sightline_shared::Vec3;
use tracing::{debug, trace};

/// What one [`SceneMonitor::tick`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickReport {
    /// Tick number, starting at 1.
    pub tick: u64,
    /// Outcome of the snapshot refresh.
    pub refresh: RefreshOutcome,
    /// A geometry rebuild was started this tick.
    pub rebuild_started: bool,
    /// Completed geometry rebuilds so far.
    pub geometry_generation: u64,
}

/// One tracked entity as seen from the camera.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetView {
    /// The entity.
    pub entity: Entity,
    /// Camera to anchor distance.
    pub distance: f32,
    /// Line of sight from the camera.
    pub visible: bool,
    /// Health over maximum health, in `[0, 1]`.
    pub health_fraction: f32,
}

/// Everything a consumer needs to draw one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameReport {
    /// The local entity, classified fresh.
    pub observer: Option<Entity>,
    /// Camera position, origin when unavailable.
    pub camera: Vec3,
    /// Every other tracked entity, in snapshot order.
    pub targets: Vec<TargetView>,
}

impl FrameReport {
    /// Targets currently in line of sight.
    pub fn visible_targets(&self) -> impl Iterator<Item = &TargetView> {
        self.targets.iter().filter(|target| target.visible)
    }
}

/// Owns the snapshot cache, the occlusion model and the visibility engine.
pub struct SceneMonitor {
    graph: GraphReader,
    root: Arc<dyn SceneRootSource>,
    schema: Arc<SchemaNames>,
    cache: EntitySnapshotCache,
    engine: VisibilityEngine,
    settings: MonitorSettings,
    last_rebuild: Mutex<Option<Instant>>,
    ticks: AtomicU64,
}

impl std::fmt::Debug for SceneMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneMonitor")
            .field("cache", &self.cache)
            .field("model", self.engine.model())
            .field("ticks", &self.ticks.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl SceneMonitor {
    /// Builds the services over `memory`, locating the scene through `root`.
    #[must_use]
    pub fn new(
        memory: Arc<dyn RemoteMemory>,
        root: Arc<dyn SceneRootSource>,
        settings: &Settings,
    ) -> Self {
        let graph = GraphReader::new(memory, Arc::new(settings.layout.clone()));
        let schema = Arc::new(settings.schema.clone());

        let cache = EntitySnapshotCache::new(
            graph.clone(),
            Arc::clone(&root),
            Arc::clone(&schema),
            settings.cache.clone(),
        );
        let model = Arc::new(OcclusionModel::new(
            graph.clone(),
            Arc::clone(&schema),
            settings.occlusion.clone(),
        ));
        let engine = VisibilityEngine::new(model, settings.visibility.clone());

        Self {
            graph,
            root,
            schema,
            cache,
            engine,
            settings: settings.monitor.clone(),
            last_rebuild: Mutex::new(None),
            ticks: AtomicU64::new(0),
        }
    }

    /// Builds the services using the pointer chain configured in `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingRoot`] when `settings.root` is unset.
    pub fn from_settings(memory: Arc<dyn RemoteMemory>, settings: &Settings) -> ConfigResult<Self> {
        let chain = settings.root.clone().ok_or(ConfigError::MissingRoot)?;
        Ok(Self::new(memory, Arc::new(chain), settings))
    }

    /// Refreshes the snapshot and starts a geometry rebuild when one is due.
    pub fn tick(&self) -> TickReport {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        let refresh = self.cache.refresh();
        let rebuild_started = self.rebuild_if_due();
        let report = TickReport {
            tick,
            refresh,
            rebuild_started,
            geometry_generation: self.engine.model().generation(),
        };
        trace!(?report, "tick");
        report
    }

    fn rebuild_if_due(&self) -> bool {
        let due = self
            .last_rebuild
            .lock()
            .map_or(true, |at| at.elapsed() >= self.settings.rebuild_interval());
        due && self.start_rebuild()
    }

    /// Resolves the root and requests a rebuild, stamping the cadence on
    /// success. The cadence lock is not held while the root is resolved.
    fn start_rebuild(&self) -> bool {
        let root = self.root.resolve(&self.graph);
        if !root.is_valid() {
            trace!("scene root unavailable, geometry rebuild deferred");
            return false;
        }
        let started = self.engine.model().start_rebuild(root);
        if started {
            *self.last_rebuild.lock() = Some(Instant::now());
            debug!(%root, "geometry rebuild started");
        }
        started
    }

    /// Starts a geometry rebuild now and restarts the rebuild cadence.
    /// `false` when the root is unavailable or a rebuild is already running.
    pub fn force_rebuild(&self) -> bool {
        self.start_rebuild()
    }

    /// Builds the per-frame view from the current snapshot.
    #[must_use]
    pub fn frame(&self) -> FrameReport {
        let observer = self.cache.get_observer_entity();
        let camera = self.camera_position();
        let observer_identity = observer.as_ref().map(Entity::identity);

        let targets = self
            .cache
            .get_snapshot()
            .into_iter()
            .filter(|entity| Some(entity.identity()) != observer_identity)
            .map(|entity| {
                let anchor = self.graph.node(entity.anchor).position();
                let samples = entity.sample_points(&self.graph);
                TargetView {
                    distance: camera.distance(anchor),
                    visible: self.engine.is_visible(camera, &samples, entity.identity()),
                    health_fraction: entity.health_fraction(),
                    entity,
                }
            })
            .collect();

        FrameReport {
            observer,
            camera,
            targets,
        }
    }

    fn camera_position(&self) -> Vec3 {
        self.graph
            .node(self.root.resolve(&self.graph))
            .find_first_child_of_class(&self.schema.world_root)
            .find_first_child_of_class(&self.schema.camera)
            .camera_position()
    }

    /// The snapshot cache.
    #[must_use]
    pub fn cache(&self) -> &EntitySnapshotCache {
        &self.cache
    }

    /// The visibility engine.
    #[must_use]
    pub fn engine(&self) -> &VisibilityEngine {
        &self.engine
    }

    /// The occlusion model.
    #[must_use]
    pub fn model(&self) -> &OcclusionModel {
        self.engine.model()
    }
}
