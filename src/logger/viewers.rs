//! Live viewer membership for one job.

use std::collections::HashSet;
use std::fmt;
use std::sync::{PoisonError, RwLock};

/// Opaque identifier of a live subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewerId(String);

impl ViewerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ViewerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Delivery side of the transport layer.
///
/// Fire-and-forget: delivery failures belong to the transport.
pub trait BroadcastSink: Send + Sync {
    fn deliver(&self, viewer: &ViewerId, payload: &str);
}

/// Concurrent set of viewers watching a job.
///
/// Mutated by the transport layer, read by every drain task. A poisoned
/// lock is recovered rather than propagated.
#[derive(Debug, Default)]
pub struct ViewerRegistry {
    viewers: RwLock<HashSet<ViewerId>>,
}

impl ViewerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a viewer. Returns false if it was already registered.
    pub fn register(&self, viewer: ViewerId) -> bool {
        self.viewers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(viewer)
    }

    /// Remove a viewer. Returns false if it was not registered.
    pub fn unregister(&self, viewer: &ViewerId) -> bool {
        self.viewers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(viewer)
    }

    /// Copy of the current membership.
    pub fn snapshot(&self) -> Vec<ViewerId> {
        self.viewers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.viewers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
