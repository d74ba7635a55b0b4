pub mod lifecycle;
pub mod transitions;

pub use lifecycle::{
    merge_credentials, SyncOrchestrator, MAX_AUTO_SYNC_INTERVAL_MINUTES,
    MIN_AUTO_SYNC_INTERVAL_MINUTES,
};
pub use transitions::{CategoryCascade, EngineState};
