//! # SIGHTLINE Core
//!
//! Two consistent, time-sensitive views over a live foreign object graph:
//! - a throttled snapshot of tracked entities and their sub-parts, refreshed
//!   without ever blocking readers
//! - line-of-sight between an observer and any entity, against a
//!   background-rebuilt occlusion model, memoized per entity
//!
//! ## Architecture Rules
//!
//! 1. **Reads never fail** - a fault yields a neutral value, never an error
//! 2. **No lock across a remote read** - copy out, work unlocked, swap in
//! 3. **Every walk is bounded** - corrupted graphs cannot loop forever
//!
//! ## Components
//!
//! ```text
//!   RemoteMemory ──> GraphReader ──> EntityClassifier ──> EntitySnapshotCache
//!                        │
//!                        └────────> OcclusionModel ──(rebuilt)──> VisibilityEngine
//!                                   (worker thread)    memo clear
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use sightline_core::{EntitySnapshotCache, OcclusionModel, VisibilityEngine};
//!
//! cache.refresh();
//! for entity in cache.get_snapshot() {
//!     let samples = entity.sample_points(cache.graph());
//!     let seen = engine.is_visible(camera, &samples, entity.identity());
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod cache;
pub mod config;
pub mod entity;
pub mod error;
pub mod graph;
pub mod layout;
pub mod occlusion;
pub mod remote;
pub mod root;
pub mod sim;
pub mod visibility;

pub use cache::{EntitySnapshotCache, RefreshOutcome};
pub use config::{CacheSettings, MonitorSettings, OcclusionSettings, Settings, VisibilitySettings};
pub use entity::{ClassicRig, Entity, EntityClassifier, ModernRig, Rig, RigTag};
pub use error::{ConfigError, ConfigResult};
pub use graph::{GraphReader, ObjectNode, PartProbe};
pub use layout::{ClassicPartNames, GraphLayout, ModernPartNames, SchemaNames};
pub use occlusion::{OcclusionModel, RebuildReport, WorldPart};
pub use remote::{RemoteMemory, RemoteRef};
pub use root::{PointerChain, SceneRootSource};
pub use visibility::{
    ray_box_test, Ray, RayBoxTest, VisibilityEngine, VisibilityMemo, VisibilityStats,
};
