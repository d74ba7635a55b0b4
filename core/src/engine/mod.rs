//! Contract between the coordinator and the external sync engine.

pub mod traits;
pub mod types;

pub use traits::{ConflictResolver, SyncEngine};
pub use types::{
    Category, CleanupReport, Credentials, EngineEvent, EngineStatus, ExportReport, ImageStats,
    ServiceConfig, SyncSettings, SyncSummary,
};
