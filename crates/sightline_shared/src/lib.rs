//! # SIGHTLINE Shared
//!
//! Common types used by every crate in the workspace.
//!
//! - `math`: `Vec3`, `Mat3`, `CFrame` with the exact layout found in remote
//!   memory
//! - `constants`: thresholds, TTLs and bounds

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod constants;
pub mod math;

pub use constants::{
    MEMO_STALE_AFTER, MEMO_SWEEP_THRESHOLD, MEMO_TTL, MIN_REFRESH_INTERVAL,
    RESERVED_LOW_THRESHOLD,
};
pub use math::{CFrame, Mat3, Vec3};
