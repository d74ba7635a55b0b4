use std::sync::Arc;

use serde_json::Value;

use super::events::RelayEvent;
use super::surface::SurfaceSet;

/// Per-broadcast delivery tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Best-effort fan-out of events to every open surface.
#[derive(Clone)]
pub struct EventRelay {
    surfaces: Arc<SurfaceSet>,
}

impl EventRelay {
    pub fn new(surfaces: Arc<SurfaceSet>) -> Self {
        Self { surfaces }
    }

    pub fn surfaces(&self) -> &Arc<SurfaceSet> {
        &self.surfaces
    }

    /// Deliver `name`/`payload` to every surface that was open when the call
    /// started. A failing surface never prevents delivery to the others.
    pub fn broadcast(&self, name: &str, payload: Value) -> DeliveryReport {
        let event = RelayEvent::new(name, payload);
        let mut report = DeliveryReport::default();

        for surface in self.surfaces.snapshot() {
            if surface.is_destroyed() {
                report.skipped += 1;
                continue;
            }
            match surface.deliver(&event) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(surface = surface.id(), event = name, "delivery failed: {}", e);
                }
            }
        }

        tracing::debug!(
            event = name,
            delivered = report.delivered,
            skipped = report.skipped,
            failed = report.failed,
            "broadcast"
        );
        report
    }
}
