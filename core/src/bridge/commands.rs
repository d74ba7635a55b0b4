//! Command handlers bound by [`SyncBridge::initialize`](super::SyncBridge::initialize).

use std::future::Future;
use std::path::{Component, Path};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::conflict::{ConflictCoordinator, Resolution};
use crate::endpoint::EndpointRegistry;
use crate::engine::{Category, ServiceConfig, SyncEngine};
use crate::error::BridgeError;
use crate::orchestrator::SyncOrchestrator;
use crate::relay::SurfaceSet;

pub const GET_STATUS: &str = "get-status";
pub const TEST_CONNECTION: &str = "test-connection";
pub const SWITCH_SERVICE: &str = "switch-service";
pub const DISABLE: &str = "disable";
pub const ENABLE_CATEGORY: &str = "enable-category";
pub const DISABLE_CATEGORY: &str = "disable-category";
pub const MANUAL_SYNC: &str = "manual-sync";
pub const FORCE_FULL_SYNC: &str = "force-full-sync";
pub const TOGGLE_AUTO_SYNC: &str = "toggle-auto-sync";
pub const SET_AUTO_SYNC_INTERVAL: &str = "set-auto-sync-interval";
pub const EXPORT_DATA: &str = "export-data";
pub const CLEAR_ALL: &str = "clear-all";
pub const RESOLVE_CONFLICT: &str = "resolve-conflict";
pub const DOWNLOAD_IMAGE: &str = "download-image";
pub const UPLOAD_IMAGE: &str = "upload-image";
pub const GET_UNUSED_IMAGES_STATS: &str = "get-unused-images-stats";
pub const CLEANUP_UNUSED_IMAGES: &str = "cleanup-unused-images";

pub const COMMANDS: [&str; 17] = [
    GET_STATUS,
    TEST_CONNECTION,
    SWITCH_SERVICE,
    DISABLE,
    ENABLE_CATEGORY,
    DISABLE_CATEGORY,
    MANUAL_SYNC,
    FORCE_FULL_SYNC,
    TOGGLE_AUTO_SYNC,
    SET_AUTO_SYNC_INTERVAL,
    EXPORT_DATA,
    CLEAR_ALL,
    RESOLVE_CONFLICT,
    DOWNLOAD_IMAGE,
    UPLOAD_IMAGE,
    GET_UNUSED_IMAGES_STATS,
    CLEANUP_UNUSED_IMAGES,
];

const DEFAULT_RETENTION_DAYS: u32 = 30;

pub(crate) struct CommandContext {
    pub engine: Arc<dyn SyncEngine>,
    pub orchestrator: Arc<SyncOrchestrator>,
    pub conflicts: Arc<ConflictCoordinator>,
    pub surfaces: Arc<SurfaceSet>,
}

type Ctx = Arc<CommandContext>;

pub(crate) fn register_commands(registry: &EndpointRegistry, ctx: Ctx) {
    bind(registry, &ctx, GET_STATUS, get_status);
    bind(registry, &ctx, TEST_CONNECTION, test_connection);
    bind(registry, &ctx, SWITCH_SERVICE, switch_service);
    bind(registry, &ctx, DISABLE, disable);
    bind(registry, &ctx, ENABLE_CATEGORY, enable_category);
    bind(registry, &ctx, DISABLE_CATEGORY, disable_category);
    bind(registry, &ctx, MANUAL_SYNC, manual_sync);
    bind(registry, &ctx, FORCE_FULL_SYNC, force_full_sync);
    bind(registry, &ctx, TOGGLE_AUTO_SYNC, toggle_auto_sync);
    bind(registry, &ctx, SET_AUTO_SYNC_INTERVAL, set_auto_sync_interval);
    bind(registry, &ctx, EXPORT_DATA, export_data);
    bind(registry, &ctx, CLEAR_ALL, clear_all);
    bind(registry, &ctx, RESOLVE_CONFLICT, resolve_conflict);
    bind(registry, &ctx, DOWNLOAD_IMAGE, download_image);
    bind(registry, &ctx, UPLOAD_IMAGE, upload_image);
    bind(registry, &ctx, GET_UNUSED_IMAGES_STATS, unused_images_stats);
    bind(registry, &ctx, CLEANUP_UNUSED_IMAGES, cleanup_unused_images);
}

fn bind<F, Fut>(registry: &EndpointRegistry, ctx: &Ctx, name: &str, f: F)
where
    F: Fn(Ctx, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, BridgeError>> + Send + 'static,
{
    let ctx = ctx.clone();
    registry.register_fn(name, move |args| f(ctx.clone(), args));
}

fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, BridgeError> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args)
        .map_err(|e| BridgeError::validation(format!("invalid arguments: {e}")))
}

fn to_data<T: serde::Serialize>(value: T) -> Result<Value, BridgeError> {
    serde_json::to_value(value).map_err(|e| BridgeError::Engine(e.to_string()))
}

fn required(field: &str, value: &str) -> Result<(), BridgeError> {
    if value.trim().is_empty() {
        return Err(BridgeError::validation(format!("{field} is required")));
    }
    Ok(())
}

/// Relative paths must stay below the data root.
fn relative_path(field: &str, value: &str) -> Result<(), BridgeError> {
    required(field, value)?;
    let path = Path::new(value);
    let escapes = path.is_absolute()
        || path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(BridgeError::validation(format!(
            "{field} must be a relative path inside the data directory"
        )));
    }
    Ok(())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceArgs {
    service_name: String,
    #[serde(default)]
    config: ServiceConfig,
}

#[derive(Deserialize)]
struct CategoryArgs {
    category: String,
}

impl CategoryArgs {
    fn category(&self) -> Result<Category, BridgeError> {
        self.category.parse::<Category>().map_err(BridgeError::Validation)
    }
}

#[derive(Deserialize)]
struct ToggleArgs {
    enabled: bool,
}

#[derive(Deserialize)]
struct IntervalArgs {
    minutes: u32,
}

#[derive(Deserialize)]
struct ExportArgs {
    path: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolveArgs {
    conflict_id: String,
    resolution: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadImageArgs {
    relative_path: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadImageArgs {
    local_path: String,
    relative_path: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RetentionArgs {
    #[serde(default = "default_retention_days")]
    retention_days: u32,
}

fn default_retention_days() -> u32 {
    DEFAULT_RETENTION_DAYS
}

async fn get_status(ctx: Ctx, _args: Value) -> Result<Value, BridgeError> {
    let status = ctx.engine.status().await;
    let state = ctx.orchestrator.state().await;
    Ok(json!({
        "state": state,
        "engine": to_data(status)?,
        "conflicts": {
            "pending": ctx.conflicts.pending_count(),
            "pendingIds": ctx.conflicts.pending_ids(),
            "recent": to_data(ctx.conflicts.history())?,
            "timeoutSecs": ctx.conflicts.timeout().as_secs(),
        },
        "surfaces": ctx.surfaces.len(),
    }))
}

async fn test_connection(ctx: Ctx, args: Value) -> Result<Value, BridgeError> {
    let args: ServiceArgs = parse_args(args)?;
    required("serviceName", &args.service_name)?;
    ctx.orchestrator
        .test_connection(&args.service_name, &args.config)
        .await?;
    Ok(json!({ "connected": true }))
}

async fn switch_service(ctx: Ctx, args: Value) -> Result<Value, BridgeError> {
    let args: ServiceArgs = parse_args(args)?;
    required("serviceName", &args.service_name)?;
    ctx.orchestrator
        .switch_service(&args.service_name, &args.config)
        .await?;
    Ok(json!({ "serviceName": args.service_name }))
}

async fn disable(ctx: Ctx, _args: Value) -> Result<Value, BridgeError> {
    ctx.orchestrator.disable().await?;
    Ok(Value::Null)
}

async fn enable_category(ctx: Ctx, args: Value) -> Result<Value, BridgeError> {
    let args: CategoryArgs = parse_args(args)?;
    let state = ctx.orchestrator.enable_category(args.category()?).await?;
    Ok(json!({ "state": state }))
}

async fn disable_category(ctx: Ctx, args: Value) -> Result<Value, BridgeError> {
    let args: CategoryArgs = parse_args(args)?;
    let state = ctx.orchestrator.disable_category(args.category()?).await?;
    Ok(json!({ "state": state }))
}

async fn manual_sync(ctx: Ctx, _args: Value) -> Result<Value, BridgeError> {
    to_data(ctx.orchestrator.manual_sync().await?)
}

async fn force_full_sync(ctx: Ctx, _args: Value) -> Result<Value, BridgeError> {
    to_data(ctx.orchestrator.force_full_sync().await?)
}

async fn toggle_auto_sync(ctx: Ctx, args: Value) -> Result<Value, BridgeError> {
    let args: ToggleArgs = parse_args(args)?;
    ctx.orchestrator.toggle_auto_sync(args.enabled).await?;
    Ok(json!({ "enabled": args.enabled }))
}

async fn set_auto_sync_interval(ctx: Ctx, args: Value) -> Result<Value, BridgeError> {
    let args: IntervalArgs = parse_args(args)?;
    ctx.orchestrator.set_auto_sync_interval(args.minutes).await?;
    Ok(json!({ "minutes": args.minutes }))
}

async fn export_data(ctx: Ctx, args: Value) -> Result<Value, BridgeError> {
    let args: ExportArgs = parse_args(args)?;
    required("path", &args.path)?;
    to_data(ctx.engine.export_data(Path::new(&args.path)).await?)
}

async fn clear_all(ctx: Ctx, _args: Value) -> Result<Value, BridgeError> {
    ctx.engine.clear_all().await?;
    tracing::info!("remote sync data cleared");
    Ok(Value::Null)
}

async fn resolve_conflict(ctx: Ctx, args: Value) -> Result<Value, BridgeError> {
    let args: ResolveArgs = parse_args(args)?;
    required("conflictId", &args.conflict_id)?;
    let resolution = args
        .resolution
        .parse::<Resolution>()
        .map_err(BridgeError::Validation)?;
    let state = ctx.conflicts.resolve(&args.conflict_id, resolution)?;
    Ok(json!({ "conflictId": args.conflict_id, "state": state }))
}

async fn download_image(ctx: Ctx, args: Value) -> Result<Value, BridgeError> {
    let args: DownloadImageArgs = parse_args(args)?;
    relative_path("relativePath", &args.relative_path)?;
    let local = ctx.engine.download_image(&args.relative_path).await?;
    Ok(json!({ "localPath": local.to_string_lossy() }))
}

async fn upload_image(ctx: Ctx, args: Value) -> Result<Value, BridgeError> {
    let args: UploadImageArgs = parse_args(args)?;
    required("localPath", &args.local_path)?;
    relative_path("relativePath", &args.relative_path)?;
    ctx.engine
        .upload_image(Path::new(&args.local_path), &args.relative_path)
        .await?;
    Ok(json!({ "relativePath": args.relative_path }))
}

async fn unused_images_stats(ctx: Ctx, args: Value) -> Result<Value, BridgeError> {
    let args: RetentionArgs = parse_args(args)?;
    to_data(ctx.engine.unused_images_stats(args.retention_days).await?)
}

async fn cleanup_unused_images(ctx: Ctx, args: Value) -> Result<Value, BridgeError> {
    let args: RetentionArgs = parse_args(args)?;
    to_data(ctx.engine.cleanup_unused_images(args.retention_days).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_path_rejects_escapes() {
        assert!(relative_path("p", "images/a.png").is_ok());
        assert!(relative_path("p", "./images/a.png").is_ok());
        assert!(relative_path("p", "../secret").is_err());
        assert!(relative_path("p", "images/../../x").is_err());
        assert!(relative_path("p", "/etc/passwd").is_err());
        assert!(relative_path("p", "").is_err());
    }

    #[test]
    fn test_retention_defaults_to_thirty_days() {
        let args: RetentionArgs = parse_args(Value::Null).unwrap();
        assert_eq!(args.retention_days, 30);
        let args: RetentionArgs = parse_args(json!({"retentionDays": 7})).unwrap();
        assert_eq!(args.retention_days, 7);
    }

    #[test]
    fn test_missing_arguments_are_validation_errors() {
        let err = parse_args::<ResolveArgs>(json!({"conflictId": "conflict_1"}))
            .err()
            .unwrap();
        assert!(matches!(err, BridgeError::Validation(_)));
    }
}
