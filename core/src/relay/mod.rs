//! Fan-out of sync lifecycle events to open UI surfaces.

pub mod events;
#[allow(clippy::module_inception)]
pub mod relay;
pub mod surface;

pub use events::{
    RelayEvent, SYNC_COMPLETE, SYNC_CONFLICT, SYNC_ERROR, SYNC_PROGRESS, SYNC_START,
};
pub use relay::{DeliveryReport, EventRelay};
pub use surface::{SurfaceError, SurfaceSet, UiSurface};
