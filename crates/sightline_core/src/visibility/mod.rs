//! # Visibility Engine
//!
//! Line-of-sight from an observer to an entity's five sample points, tested
//! against the current occlusion geometry and memoized per entity.
//!
//! ## Query
//!
//! ```text
//! is_visible(observer, samples, identity)
//!   ├─ model not ready / no parts ──────────────> true  (fail-open)
//!   ├─ memo hit (identity != 0, age < ttl) ─────> stored answer
//!   ├─ rays = observer -> each sample, shortest first
//!   │    per ray: pre-filter, box test, ignore grazing hits,
//!   │             stop at first blocking hit
//!   │    clear rays reach the requirement ──────> true
//!   ├─ otherwise ───────────────────────────────> false
//!   └─ memo.store_in_epoch(identity, answer)     (every computed path)
//! ```
//!
//! A rebuild of the occlusion model clears the memo after the new geometry
//! is published. A query may briefly run against old geometry, but its
//! answer is only stored if no clear happened since the query started, so
//! the memo never serves an answer computed before the swap.

mod memo;
mod ray;

pub use memo::{MemoEntry, VisibilityMemo};
pub use ray::{ray_box_test, Ray, RayBoxTest};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use sightline_shared::constants::SAMPLE_POINTS;
use sightline_shared::Vec3;
use tracing::debug;

use crate::config::VisibilitySettings;
use crate::occlusion::{OcclusionModel, WorldPart};

/// Cumulative counters of one engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VisibilityStats {
    /// Calls to [`VisibilityEngine::is_visible`].
    pub queries: u64,
    /// Queries answered from the memo.
    pub memo_hits: u64,
    /// Rays examined.
    pub rays_cast: u64,
    /// Ray/box tests run (parts passing the pre-filter).
    pub box_tests: u64,
    /// Box tests that reached the slab stage.
    pub slab_tests: u64,
}

#[derive(Debug, Default)]
struct Counters {
    queries: AtomicU64,
    memo_hits: AtomicU64,
    rays_cast: AtomicU64,
    box_tests: AtomicU64,
    slab_tests: AtomicU64,
}

/// Per-ray work, accumulated locally and published once per query.
#[derive(Default)]
struct RayWork {
    box_tests: u64,
    slab_tests: u64,
}

/// Answers line-of-sight queries.
#[derive(Debug)]
pub struct VisibilityEngine {
    model: Arc<OcclusionModel>,
    memo: Arc<VisibilityMemo>,
    settings: VisibilitySettings,
    counters: Counters,
}

impl VisibilityEngine {
    /// Creates an engine over `model` and registers the memo clear with it.
    #[must_use]
    pub fn new(model: Arc<OcclusionModel>, settings: VisibilitySettings) -> Self {
        let memo = Arc::new(VisibilityMemo::new(
            settings.memo_ttl(),
            settings.memo_stale_after(),
            settings.memo_sweep_threshold,
        ));
        let on_rebuild = Arc::downgrade(&memo);
        model.on_rebuilt(move || {
            if let Some(memo) = on_rebuild.upgrade() {
                memo.clear();
            }
        });

        Self {
            model,
            memo,
            settings,
            counters: Counters::default(),
        }
    }

    /// True when at least the required number of sample points can be seen
    /// from `observer`.
    ///
    /// `identity` keys the memo; `0` bypasses it. Returns `true` while no
    /// occlusion geometry is available.
    pub fn is_visible(&self, observer: Vec3, samples: &[Vec3; SAMPLE_POINTS], identity: u64) -> bool {
        self.counters.queries.fetch_add(1, Ordering::Relaxed);

        if !self.model.is_ready() {
            return true;
        }
        // Read before the geometry: a clear after this point rejects the store.
        let epoch = self.memo.epoch();
        let parts = self.model.parts();
        if parts.is_empty() {
            return true;
        }

        if identity != 0 {
            if let Some(visible) = self.memo.lookup(identity) {
                self.counters.memo_hits.fetch_add(1, Ordering::Relaxed);
                return visible;
            }
        }

        let visible = self.trace(observer, samples, &parts);
        if identity != 0 && !self.memo.store_in_epoch(identity, visible, epoch) {
            debug!(identity, "visibility answer dropped, geometry was replaced mid-query");
        }
        visible
    }

    fn trace(&self, observer: Vec3, samples: &[Vec3; SAMPLE_POINTS], parts: &[WorldPart]) -> bool {
        let mut rays: Vec<Option<Ray>> = samples
            .iter()
            .map(|&sample| Ray::between(observer, sample))
            .collect();
        rays.sort_by(|a, b| {
            let length = |ray: &Option<Ray>| ray.map_or(0.0, |ray| ray.length);
            length(a).total_cmp(&length(b))
        });

        let mut work = RayWork::default();
        let mut cast = 0u64;
        let mut clear = 0usize;
        let mut visible = false;

        for ray in &rays {
            cast += 1;
            // Zero-length rays are examined but never clear.
            let Some(ray) = ray else { continue };
            if self.ray_is_clear(ray, parts, &mut work) {
                clear += 1;
                if clear >= self.settings.required_clear_rays {
                    visible = true;
                    break;
                }
            }
        }

        self.counters.rays_cast.fetch_add(cast, Ordering::Relaxed);
        self.counters
            .box_tests
            .fetch_add(work.box_tests, Ordering::Relaxed);
        self.counters
            .slab_tests
            .fetch_add(work.slab_tests, Ordering::Relaxed);
        visible
    }

    fn ray_is_clear(&self, ray: &Ray, parts: &[WorldPart], work: &mut RayWork) -> bool {
        for part in parts {
            if !part.passes_prefilter(self.settings.small_part_volume) {
                continue;
            }
            work.box_tests += 1;
            match ray_box_test(ray, part) {
                RayBoxTest::Culled => {}
                RayBoxTest::Miss => work.slab_tests += 1,
                RayBoxTest::Hit { .. } => {
                    work.slab_tests += 1;
                    let to_center = ray.origin.distance(part.position);
                    if (to_center - ray.length).abs() < self.settings.grazing_tolerance {
                        continue;
                    }
                    return false;
                }
            }
        }
        true
    }

    /// The trusted memo answer for `identity`, if any.
    #[must_use]
    pub fn memo_lookup(&self, identity: u64) -> Option<bool> {
        self.memo.lookup(identity)
    }

    /// The memo itself.
    #[must_use]
    pub fn memo(&self) -> &VisibilityMemo {
        &self.memo
    }

    /// The occlusion model queries run against.
    #[must_use]
    pub fn model(&self) -> &Arc<OcclusionModel> {
        &self.model
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> VisibilityStats {
        VisibilityStats {
            queries: self.counters.queries.load(Ordering::Relaxed),
            memo_hits: self.counters.memo_hits.load(Ordering::Relaxed),
            rays_cast: self.counters.rays_cast.load(Ordering::Relaxed),
            box_tests: self.counters.box_tests.load(Ordering::Relaxed),
            slab_tests: self.counters.slab_tests.load(Ordering::Relaxed),
        }
    }
}
