use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::conflict::Decision;
use crate::error::{ConflictError, EngineError};

use super::types::{
    Category, CleanupReport, Credentials, EngineEvent, EngineStatus, ExportReport, ImageStats,
    SyncSettings, SyncSummary,
};

/// Asked by an engine when a local and a remote version cannot be merged.
///
/// An `Err` means no decision was made; the engine must leave both sides
/// untouched and move on.
#[async_trait]
pub trait ConflictResolver: Send + Sync {
    async fn request_resolution(
        &self,
        payload: serde_json::Value,
    ) -> Result<Decision, ConflictError>;
}

/// The background synchronization engine.
///
/// Transport, diffing and merging are entirely the implementation's concern.
#[async_trait]
pub trait SyncEngine: Send + Sync {
    fn name(&self) -> &str;

    async fn settings(&self) -> SyncSettings;
    async fn status(&self) -> EngineStatus;

    async fn test_connection(
        &self,
        service_name: &str,
        credentials: &Credentials,
    ) -> Result<(), EngineError>;
    /// Persist new credentials and enable the engine on them.
    async fn switch_service(
        &self,
        service_name: &str,
        credentials: Credentials,
    ) -> Result<(), EngineError>;

    async fn enable(&self) -> Result<(), EngineError>;
    async fn disable(&self) -> Result<(), EngineError>;
    async fn set_category_enabled(
        &self,
        category: Category,
        enabled: bool,
    ) -> Result<(), EngineError>;

    async fn sync(&self) -> Result<SyncSummary, EngineError>;
    async fn force_full_sync(&self) -> Result<SyncSummary, EngineError>;
    async fn set_auto_sync(&self, enabled: bool) -> Result<(), EngineError>;
    async fn set_auto_sync_interval(&self, minutes: u32) -> Result<(), EngineError>;

    async fn export_data(&self, path: &Path) -> Result<ExportReport, EngineError>;
    async fn clear_all(&self) -> Result<(), EngineError>;

    async fn download_image(&self, relative_path: &str) -> Result<PathBuf, EngineError>;
    async fn upload_image(&self, local_path: &Path, relative_path: &str)
        -> Result<(), EngineError>;
    async fn unused_images_stats(&self, retention_days: u32) -> Result<ImageStats, EngineError>;
    async fn cleanup_unused_images(
        &self,
        retention_days: u32,
    ) -> Result<CleanupReport, EngineError>;

    /// Lifecycle event stream.
    fn subscribe(&self) -> broadcast::Receiver<EngineEvent>;
    fn set_conflict_resolver(&self, resolver: Option<Arc<dyn ConflictResolver>>);
}
