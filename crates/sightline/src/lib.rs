//! # SIGHTLINE
//!
//! The main crate: one [`SceneMonitor`] driving the core services on the
//! caller's cadence.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                          SceneMonitor                             │
//! ├───────────────────────────────────────────────────────────────────┤
//! │                                                                   │
//! │  ┌─────────────────────┐          ┌─────────────────────────┐     │
//! │  │ EntitySnapshotCache │          │ OcclusionModel          │     │
//! │  │  • throttled refresh│          │  • background rebuild   │     │
//! │  │  • try-lock gate    │          │  • atomic part swap     │     │
//! │  └──────────┬──────────┘          └────────────┬────────────┘     │
//! │             │ entities                         │ parts, memo clear│
//! │             v                                  v                  │
//! │        ┌──────────────────────────────────────────────┐           │
//! │        │ VisibilityEngine (ray / oriented box, memo)  │           │
//! │        └──────────────────────────────────────────────┘           │
//! │                                                                   │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `monitor`: tick and frame orchestration

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod monitor;

// Re-export the core crates
pub use sightline_core as core;
pub use sightline_shared as shared;

pub use monitor::{FrameReport, SceneMonitor, TargetView, TickReport};
