//! # Canonical Thresholds
//!
//! Default values for every bound the core enforces. Runtime overrides live
//! in the configuration layer; these are the values used when nothing is
//! configured.

use std::time::Duration;

// =============================================================================
// REMOTE GRAPH
// =============================================================================

/// Addresses at or below this value are treated as null/garbage.
pub const RESERVED_LOW_THRESHOLD: u64 = 0x10000;

/// Longest string read out of the remote graph (bytes, excluding NUL).
pub const MAX_REMOTE_STRING: usize = 255;

/// Name returned for an invalid node.
pub const NULL_NAME: &str = "null";

/// Name returned when a node's string pointer does not resolve.
pub const UNKNOWN_NAME: &str = "unknown";

/// Ceiling on parent hops in an ancestry walk.
pub const MAX_ANCESTRY_HOPS: usize = 4096;

/// Ceiling on nodes visited by one descendant traversal.
pub const MAX_TRAVERSAL_NODES: usize = 1_000_000;

/// Ceiling on entries read from a single child list.
pub const MAX_CHILDREN: usize = 65_536;

// =============================================================================
// ENTITY SNAPSHOT CACHE
// =============================================================================

/// Minimum time between two snapshot refreshes.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_millis(100);

/// Container population above which the identity memo is discarded.
pub const ENTITY_MEMO_CLEAR_THRESHOLD: usize = 50;

/// Health reported when an entity has no controller.
pub const FULL_HEALTH: f32 = 100.0;

// =============================================================================
// OCCLUSION MODEL
// =============================================================================

/// Parts more transparent than this are not occluders.
pub const MAX_OCCLUDER_TRANSPARENCY: f32 = 0.9;

/// Parts smaller than this volume are dust.
pub const MIN_OCCLUDER_VOLUME: f32 = 0.5;

/// Parts larger than this volume are background shells.
pub const MAX_OCCLUDER_VOLUME: f32 = 8_000_000.0;

/// Parts above this volume are flagged large.
pub const LARGE_PART_VOLUME: f32 = 10.0;

/// Non-large parts below this volume are skipped by the ray pre-filter.
pub const SMALL_PART_VOLUME: f32 = 1.0;

/// Capacity hint for one rebuild's part list.
pub const EXPECTED_WORLD_PARTS: usize = 3000;

// =============================================================================
// VISIBILITY ENGINE
// =============================================================================

/// Number of sample points tested per target.
pub const SAMPLE_POINTS: usize = 5;

/// Clear rays needed to call a target visible.
pub const REQUIRED_CLEAR_RAYS: usize = 2;

/// Hits whose part lies this close to the target distance are ignored.
pub const GRAZING_TOLERANCE: f32 = 1.5;

/// Ratio of a cube's half-diagonal to its edge-vector norm, rounded.
pub const BOUNDING_RADIUS_FACTOR: f32 = 0.866;

/// Direction components below this are parallel to a slab.
pub const PARALLEL_EPSILON: f32 = 1e-6;

/// Age below which a memoized result is trusted.
pub const MEMO_TTL: Duration = Duration::from_millis(100);

/// Age above which a memo entry is swept.
pub const MEMO_STALE_AFTER: Duration = Duration::from_millis(1000);

/// Memo size above which a sweep runs.
pub const MEMO_SWEEP_THRESHOLD: usize = 100;

// =============================================================================
// SCENE MONITOR
// =============================================================================

/// Default time between geometry rebuilds.
pub const GEOMETRY_REBUILD_INTERVAL: Duration = Duration::from_secs(5);
