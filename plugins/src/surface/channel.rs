use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use syncbridge_core::api::{RelayEvent, SurfaceError, UiSurface};
use tokio::sync::mpsc::{self, error::TrySendError};

/// In-process surface backed by a bounded channel.
///
/// Counts as destroyed once [`close`](Self::close) is called or the receiving
/// half is dropped.
pub struct ChannelSurface {
    id: String,
    tx: mpsc::Sender<RelayEvent>,
    closed: AtomicBool,
}

impl ChannelSurface {
    pub fn new(id: impl Into<String>, capacity: usize) -> (Arc<Self>, mpsc::Receiver<RelayEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let surface = Arc::new(Self {
            id: id.into(),
            tx,
            closed: AtomicBool::new(false),
        });
        (surface, rx)
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl UiSurface for ChannelSurface {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_destroyed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.tx.is_closed()
    }

    fn deliver(&self, event: &RelayEvent) -> Result<(), SurfaceError> {
        self.tx.try_send(event.clone()).map_err(|e| match e {
            TrySendError::Full(_) => SurfaceError::Full,
            TrySendError::Closed(_) => SurfaceError::Closed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use syncbridge_core::api::{EventRelay, SurfaceSet};

    #[tokio::test]
    async fn test_channel_surface_receives_relayed_events() {
        let surfaces = Arc::new(SurfaceSet::new());
        let (surface, mut rx) = ChannelSurface::new("main", 8);
        surfaces.open(surface);
        let relay = EventRelay::new(surfaces);

        let report = relay.broadcast("sync:progress", json!({"processed": 1}));
        assert_eq!(report.delivered, 1);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.name, "sync:progress");
        assert_eq!(event.payload, json!({"processed": 1}));
    }

    #[tokio::test]
    async fn test_dropped_receiver_marks_surface_destroyed() {
        let (surface, rx) = ChannelSurface::new("main", 8);
        assert!(!surface.is_destroyed());
        drop(rx);
        assert!(surface.is_destroyed());

        let (surface, _rx) = ChannelSurface::new("other", 8);
        surface.close();
        assert!(surface.is_destroyed());
    }

    #[tokio::test]
    async fn test_full_buffer_is_reported() {
        let (surface, _rx) = ChannelSurface::new("main", 1);
        let event = RelayEvent::new("sync:start", serde_json::Value::Null);
        assert_eq!(surface.deliver(&event), Ok(()));
        assert_eq!(surface.deliver(&event), Err(SurfaceError::Full));
    }
}
