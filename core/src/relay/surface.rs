use std::sync::{Arc, RwLock};

use thiserror::Error;

use super::events::RelayEvent;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("surface closed")]
    Closed,
    #[error("surface buffer full")]
    Full,
    #[error("delivery failed: {0}")]
    Other(String),
}

/// A user-facing surface that can receive relayed events.
///
/// Delivery must not block; a slow surface should buffer or drop.
pub trait UiSurface: Send + Sync {
    fn id(&self) -> &str;
    fn is_destroyed(&self) -> bool;
    fn deliver(&self, event: &RelayEvent) -> Result<(), SurfaceError>;
}

/// The set of currently open surfaces.
///
/// Owned by whoever opens and closes surfaces; the relay only ever takes a
/// snapshot of it.
#[derive(Default)]
pub struct SurfaceSet {
    surfaces: RwLock<Vec<Arc<dyn UiSurface>>>,
}

impl SurfaceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a surface, replacing any open surface with the same id.
    pub fn open(&self, surface: Arc<dyn UiSurface>) {
        let mut guard = self.write();
        guard.retain(|s| s.id() != surface.id());
        tracing::debug!(surface = surface.id(), "surface opened");
        guard.push(surface);
    }

    pub fn close(&self, id: &str) -> bool {
        let mut guard = self.write();
        let before = guard.len();
        guard.retain(|s| s.id() != id);
        let removed = guard.len() != before;
        if removed {
            tracing::debug!(surface = id, "surface closed");
        }
        removed
    }

    /// Point-in-time copy of the open surfaces.
    pub fn snapshot(&self) -> Vec<Arc<dyn UiSurface>> {
        match self.surfaces.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Arc<dyn UiSurface>>> {
        match self.surfaces.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
