//! Scene root resolution.
//!
//! The root of the remote graph moves between sessions, so it is resolved
//! fresh whenever a service needs it.

use serde::{Deserialize, Serialize};

use crate::graph::GraphReader;
use crate::remote::RemoteRef;

/// Produces the current scene root.
pub trait SceneRootSource: Send + Sync {
    /// Resolves the root, or an invalid reference when it is unavailable.
    fn resolve(&self, graph: &GraphReader) -> RemoteRef;
}

/// A root that never moves.
impl SceneRootSource for RemoteRef {
    fn resolve(&self, _graph: &GraphReader) -> RemoteRef {
        *self
    }
}

/// Follows a chain of pointer fields from a fixed base address.
///
/// Each hop reads the pointer at `current + hop`; the chain stops at the
/// first invalid pointer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointerChain {
    /// Starting address.
    pub base: u64,
    /// Field offsets dereferenced in order.
    pub hops: Vec<u64>,
}

impl PointerChain {
    /// Creates a chain.
    #[must_use]
    pub fn new(base: u64, hops: impl Into<Vec<u64>>) -> Self {
        Self {
            base,
            hops: hops.into(),
        }
    }
}

impl SceneRootSource for PointerChain {
    fn resolve(&self, graph: &GraphReader) -> RemoteRef {
        let mut current = RemoteRef::new(self.base);
        for &hop in &self.hops {
            if !current.is_valid() {
                return RemoteRef::INVALID;
            }
            current = graph.read_ref(current.field(hop));
        }
        if current.is_valid() {
            current
        } else {
            RemoteRef::INVALID
        }
    }
}
