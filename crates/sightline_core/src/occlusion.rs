//! # Spatial Occlusion Model
//!
//! A flat, immutable collection of oriented boxes approximating the static
//! world, rebuilt in the background and swapped in atomically.
//!
//! ## Rebuild Pipeline
//!
//! ```text
//! caller                         worker thread ("sightline-occlusion")
//! ──────                         ───────────────────────────────────────
//! start_rebuild(root)
//!   building: false -> true
//!   send(root) ───────channel───> recv(root)
//!   return true                   exclusion set  <- container children's models
//!                                 candidates     <- world descendants of the
//!                                                   geometry classes
//!                                 filter: excluded / transparent / volume
//!                                 parts.write() = Arc::new(kept)      (swap)
//!                                 listeners()                (memo clear)
//!                                 ready = true, generation += 1
//!                                 building = false, notify idle waiters
//! ```
//!
//! The last step runs from a drop guard, so a panicking listener still
//! leaves the model idle and the worker keeps serving requests.
//!
//! Readers take an `Arc` clone of the current collection and never hold the
//! lock while testing rays against it.

use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex, RwLock};
use sightline_shared::constants::{BOUNDING_RADIUS_FACTOR, EXPECTED_WORLD_PARTS};
use sightline_shared::{Mat3, Vec3};
use tracing::{debug, error, info, warn};

use crate::config::OcclusionSettings;
use crate::graph::{GraphReader, ObjectNode};
use crate::layout::SchemaNames;
use crate::remote::RemoteRef;

/// One occluding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WorldPart {
    /// Center in world space.
    pub position: Vec3,
    /// Full edge lengths.
    pub size: Vec3,
    /// Part-to-world rotation.
    pub rotation: Mat3,
    /// `size.x * size.y * size.z`.
    pub volume: f32,
    /// Volume above the "large" threshold.
    pub large: bool,
}

impl WorldPart {
    /// Builds a part, deriving volume and the large flag.
    #[must_use]
    pub fn new(position: Vec3, size: Vec3, rotation: Mat3, large_volume: f32) -> Self {
        let volume = size.product();
        Self {
            position,
            size,
            rotation,
            volume,
            large: volume > large_volume,
        }
    }

    /// Half edge lengths.
    #[inline]
    #[must_use]
    pub fn half_extents(&self) -> Vec3 {
        self.size * 0.5
    }

    /// Conservative bounding-sphere radius.
    #[inline]
    #[must_use]
    pub fn bounding_radius(&self) -> f32 {
        self.size.length() * BOUNDING_RADIUS_FACTOR
    }

    /// Cheap necessary-not-sufficient filter applied before a ray test.
    /// Small non-large parts and degenerate boxes are skipped.
    #[inline]
    #[must_use]
    pub fn passes_prefilter(&self, small_part_volume: f32) -> bool {
        if self.volume <= 0.0 || self.size.x <= 0.0 || self.size.y <= 0.0 || self.size.z <= 0.0 {
            return false;
        }
        self.large || self.volume >= small_part_volume
    }
}

/// Outcome of one rebuild, for logging and diagnostics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RebuildReport {
    /// Generation the rebuild published.
    pub generation: u64,
    /// Geometry nodes found under the world root.
    pub candidates: usize,
    /// Nodes belonging to a tracked entity.
    pub excluded: usize,
    /// Nodes dropped by the primitive, transparency or volume filters.
    pub filtered: usize,
    /// Parts published.
    pub kept: usize,
    /// Wall-clock time of the rebuild.
    pub elapsed: Duration,
}

type RebuildListener = Box<dyn Fn() + Send + Sync>;

/// State shared between the model handle and its worker.
struct Shared {
    graph: GraphReader,
    schema: Arc<SchemaNames>,
    settings: OcclusionSettings,
    parts: RwLock<Arc<Vec<WorldPart>>>,
    building: AtomicBool,
    ready: AtomicBool,
    generation: AtomicU64,
    listeners: RwLock<Vec<RebuildListener>>,
    last_report: Mutex<Option<RebuildReport>>,
    idle: Mutex<()>,
    idle_signal: Condvar,
}

/// Reports the model idle on every exit from a rebuild, including a
/// panicking listener.
struct Building<'a>(&'a Shared);

impl Drop for Building<'_> {
    fn drop(&mut self) {
        {
            let _idle = self.0.idle.lock();
            self.0.building.store(false, Ordering::Release);
        }
        self.0.idle_signal.notify_all();
    }
}

/// Background-rebuilt occlusion geometry.
pub struct OcclusionModel {
    shared: Arc<Shared>,
    requests: Option<Sender<RemoteRef>>,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for OcclusionModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcclusionModel")
            .field("parts", &self.shared.parts.read().len())
            .field("generation", &self.generation())
            .field("building", &self.is_building())
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}

impl OcclusionModel {
    /// Creates an empty model and starts its rebuild worker.
    ///
    /// If the worker thread cannot be spawned, rebuilds run on the calling
    /// thread instead.
    #[must_use]
    pub fn new(graph: GraphReader, schema: Arc<SchemaNames>, settings: OcclusionSettings) -> Self {
        let shared = Arc::new(Shared {
            graph,
            schema,
            settings,
            parts: RwLock::new(Arc::new(Vec::new())),
            building: AtomicBool::new(false),
            ready: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            listeners: RwLock::new(Vec::new()),
            last_report: Mutex::new(None),
            idle: Mutex::new(()),
            idle_signal: Condvar::new(),
        });

        let (sender, receiver) = bounded::<RemoteRef>(1);
        let worker_shared = Arc::clone(&shared);
        let spawned = thread::Builder::new()
            .name("sightline-occlusion".into())
            .spawn(move || Self::worker_loop(&worker_shared, &receiver));

        match spawned {
            Ok(worker) => Self {
                shared,
                requests: Some(sender),
                worker: Some(worker),
            },
            Err(error) => {
                warn!(%error, "failed to spawn occlusion worker, rebuilding inline");
                Self {
                    shared,
                    requests: None,
                    worker: None,
                }
            }
        }
    }

    fn worker_loop(shared: &Shared, receiver: &Receiver<RemoteRef>) {
        debug!("occlusion worker started");
        for root in receiver {
            // A panicking listener must not take the worker down with it.
            let rebuilt = panic::catch_unwind(AssertUnwindSafe(|| shared.rebuild(root)));
            if rebuilt.is_err() {
                error!(%root, "occlusion rebuild panicked");
            }
        }
        debug!("occlusion worker stopped");
    }

    /// Requests a rebuild from scene root `root`.
    ///
    /// Returns `false` without doing anything when a rebuild is already in
    /// flight.
    pub fn start_rebuild(&self, root: RemoteRef) -> bool {
        if self
            .shared
            .building
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let queued = self
            .requests
            .as_ref()
            .is_some_and(|requests| requests.try_send(root).is_ok());
        if !queued {
            self.shared.rebuild(root);
        }
        true
    }

    /// A rebuild has completed and produced at least one part.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.shared.ready.load(Ordering::Acquire) && !self.shared.parts.read().is_empty()
    }

    /// A rebuild is in flight.
    #[must_use]
    pub fn is_building(&self) -> bool {
        self.shared.building.load(Ordering::Acquire)
    }

    /// Completed rebuild count.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::Acquire)
    }

    /// The current collection. Immutable; later rebuilds publish a new one.
    #[must_use]
    pub fn parts(&self) -> Arc<Vec<WorldPart>> {
        Arc::clone(&self.shared.parts.read())
    }

    /// Summary of the most recent rebuild.
    #[must_use]
    pub fn last_report(&self) -> Option<RebuildReport> {
        self.shared.last_report.lock().clone()
    }

    /// Registers `listener` to run after every swap, before the model
    /// reports idle.
    pub fn on_rebuilt(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.shared.listeners.write().push(Box::new(listener));
    }

    /// Blocks until no rebuild is in flight or `timeout` passes. Returns
    /// `true` when idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.shared.idle.lock();
        while self.shared.building.load(Ordering::Acquire) {
            if self
                .shared
                .idle_signal
                .wait_until(&mut guard, deadline)
                .timed_out()
            {
                return !self.shared.building.load(Ordering::Acquire);
            }
        }
        true
    }
}

impl Drop for OcclusionModel {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop.
        self.requests.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("occlusion worker panicked");
            }
        }
    }
}

impl Shared {
    fn rebuild(&self, root: RemoteRef) {
        let _building = Building(self);
        let started = Instant::now();
        let scene = self.graph.node(root);
        let world = scene.find_first_child_of_class(&self.schema.world_root);

        let mut report = RebuildReport::default();
        let parts = if world.is_valid() {
            let excluded = self.exclusion_set(scene);
            self.collect(world, &excluded, &mut report)
        } else {
            debug!(%root, "world root unavailable, publishing empty geometry");
            Vec::new()
        };
        report.kept = parts.len();

        *self.parts.write() = Arc::new(parts);
        for listener in self.listeners.read().iter() {
            listener();
        }

        self.ready.store(true, Ordering::Release);
        report.generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        report.elapsed = started.elapsed();
        info!(
            generation = report.generation,
            candidates = report.candidates,
            excluded = report.excluded,
            filtered = report.filtered,
            kept = report.kept,
            elapsed = ?report.elapsed,
            "occlusion model rebuilt"
        );
        *self.last_report.lock() = Some(report);
    }

    /// Model roots of every entity currently in the container.
    fn exclusion_set(&self, scene: ObjectNode<'_>) -> HashSet<u64> {
        scene
            .find_first_child_of_class(&self.schema.entity_container)
            .children()
            .into_iter()
            .map(|entity| entity.model())
            .filter(ObjectNode::is_valid)
            .map(|model| model.address())
            .collect()
    }

    fn collect(
        &self,
        world: ObjectNode<'_>,
        excluded: &HashSet<u64>,
        report: &mut RebuildReport,
    ) -> Vec<WorldPart> {
        let settings = &self.settings;
        let mut parts = Vec::with_capacity(EXPECTED_WORLD_PARTS);

        for class in &self.schema.geometry_classes {
            for node in world.find_descendants_of_class(class) {
                report.candidates += 1;
                if node
                    .lineage()
                    .any(|ancestor| excluded.contains(&ancestor.address()))
                {
                    report.excluded += 1;
                    continue;
                }
                let Some(probe) = node.part_probe() else {
                    report.filtered += 1;
                    continue;
                };
                let volume = probe.size.product();
                if probe.transparency > settings.max_transparency
                    || volume < settings.min_volume
                    || volume > settings.max_volume
                    || !probe.size.is_finite()
                    || !probe.cframe.position.is_finite()
                {
                    report.filtered += 1;
                    continue;
                }
                parts.push(WorldPart::new(
                    probe.cframe.position,
                    probe.size,
                    probe.cframe.rotation,
                    settings.large_volume,
                ));
            }
        }
        parts
    }
}
