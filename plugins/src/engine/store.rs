use std::path::{Path, PathBuf};

use syncbridge_core::api::{EngineError, SyncSettings};

use super::manifest::write_atomic;

pub const SETTINGS_FILE: &str = "settings.json";

/// JSON persistence for the engine's [`SyncSettings`].
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(SETTINGS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<SyncSettings, EngineError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SyncSettings::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save(&self, settings: &SyncSettings) -> Result<(), EngineError> {
        let bytes = serde_json::to_vec_pretty(settings)?;
        write_atomic(&self.path, &bytes).await
    }
}
