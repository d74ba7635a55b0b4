//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `syncbridge_core::api` instead of reaching into internal modules.

pub use crate::bridge::{SyncBridge, COMMANDS};
pub use crate::config::{
    load_default, AppConfig, ConflictConfig, EngineConfig, EventsOutConfig, LoggingConfig,
};
pub use crate::conflict::{
    ConflictCoordinator, ConflictId, ConflictRequest, ConflictState, Decision, Resolution,
};
pub use crate::endpoint::{CommandResponse, EndpointRegistry, Handler};
pub use crate::engine::{
    Category, CleanupReport, ConflictResolver, Credentials, EngineEvent, EngineStatus,
    ExportReport, ImageStats, ServiceConfig, SyncEngine, SyncSettings, SyncSummary,
};
pub use crate::error::{BridgeError, ConflictError, EngineError};
pub use crate::orchestrator::{EngineState, SyncOrchestrator};
pub use crate::relay::{
    DeliveryReport, EventRelay, RelayEvent, SurfaceError, SurfaceSet, UiSurface, SYNC_COMPLETE,
    SYNC_CONFLICT, SYNC_ERROR, SYNC_PROGRESS, SYNC_START,
};
