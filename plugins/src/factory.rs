use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;

use syncbridge_core::api::{AppConfig, EventsOutConfig};

use crate::engine::LocalMirrorEngine;
use crate::surface::JsonlSurface;

pub async fn build_engine(cfg: &AppConfig) -> Result<Arc<LocalMirrorEngine>> {
    let data_dir = PathBuf::from(&cfg.engine.data_dir);
    let state_dir = PathBuf::from(&cfg.engine.state_dir);
    let engine = LocalMirrorEngine::open(&data_dir, &state_dir)
        .await
        .with_context(|| format!("open sync engine at {}", data_dir.display()))?;
    Ok(Arc::new(engine))
}

pub async fn build_events_out(
    cfg: &EventsOutConfig,
) -> Result<Option<(Arc<JsonlSurface>, JoinHandle<()>)>> {
    JsonlSurface::from_config(cfg).await
}
