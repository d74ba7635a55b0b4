use std::sync::Arc;

use crate::engine::{Category, Credentials, ServiceConfig, SyncEngine, SyncSummary};
use crate::error::BridgeError;

use super::transitions::{CategoryCascade, EngineState};

pub const MIN_AUTO_SYNC_INTERVAL_MINUTES: u32 = 1;
pub const MAX_AUTO_SYNC_INTERVAL_MINUTES: u32 = 24 * 60;

/// Cascading enable/disable rules layered over the engine.
pub struct SyncOrchestrator {
    engine: Arc<dyn SyncEngine>,
}

impl SyncOrchestrator {
    pub fn new(engine: Arc<dyn SyncEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<dyn SyncEngine> {
        &self.engine
    }

    pub async fn state(&self) -> EngineState {
        EngineState::from_enabled(self.engine.settings().await.enabled)
    }

    pub async fn enable_category(&self, category: Category) -> Result<EngineState, BridgeError> {
        self.engine.set_category_enabled(category, true).await?;

        let settings = self.engine.settings().await;
        let current = EngineState::from_enabled(settings.enabled);
        match CategoryCascade::after_enable(current, settings.has_credentials()) {
            Some(next) => {
                self.engine.enable().await?;
                tracing::info!(category = %category, "category enabled, sync engine enabled");
                Ok(next)
            }
            None => Ok(current),
        }
    }

    pub async fn disable_category(&self, category: Category) -> Result<EngineState, BridgeError> {
        self.engine.set_category_enabled(category, false).await?;

        let settings = self.engine.settings().await;
        let current = EngineState::from_enabled(settings.enabled);
        match CategoryCascade::after_disable(current, settings.categories.len()) {
            Some(next) => {
                self.engine.disable().await?;
                tracing::info!(category = %category, "last category disabled, sync engine disabled");
                Ok(next)
            }
            None => Ok(current),
        }
    }

    /// Runs a sync whatever the state; the engine decides if that is a no-op.
    pub async fn manual_sync(&self) -> Result<SyncSummary, BridgeError> {
        Ok(self.engine.sync().await?)
    }

    pub async fn force_full_sync(&self) -> Result<SyncSummary, BridgeError> {
        self.ensure_enabled().await?;
        Ok(self.engine.force_full_sync().await?)
    }

    pub async fn toggle_auto_sync(&self, enabled: bool) -> Result<(), BridgeError> {
        self.ensure_enabled().await?;
        self.engine.set_auto_sync(enabled).await?;
        tracing::info!(enabled, "auto sync toggled");
        Ok(())
    }

    pub async fn set_auto_sync_interval(&self, minutes: u32) -> Result<(), BridgeError> {
        if !(MIN_AUTO_SYNC_INTERVAL_MINUTES..=MAX_AUTO_SYNC_INTERVAL_MINUTES).contains(&minutes) {
            return Err(BridgeError::validation(format!(
                "interval must be between {MIN_AUTO_SYNC_INTERVAL_MINUTES} and {MAX_AUTO_SYNC_INTERVAL_MINUTES} minutes"
            )));
        }
        self.ensure_enabled().await?;
        self.engine.set_auto_sync_interval(minutes).await?;
        tracing::info!(minutes, "auto sync interval updated");
        Ok(())
    }

    pub async fn test_connection(
        &self,
        service_name: &str,
        config: &ServiceConfig,
    ) -> Result<(), BridgeError> {
        let stored = self.engine.settings().await.credentials;
        let credentials = merge_credentials(config, stored.as_ref())?;
        self.engine
            .test_connection(service_name, &credentials)
            .await?;
        Ok(())
    }

    pub async fn switch_service(
        &self,
        service_name: &str,
        config: &ServiceConfig,
    ) -> Result<(), BridgeError> {
        let stored = self.engine.settings().await.credentials;
        let credentials = merge_credentials(config, stored.as_ref())?;
        self.engine.switch_service(service_name, credentials).await?;
        tracing::info!(service = service_name, "sync service switched");
        Ok(())
    }

    pub async fn disable(&self) -> Result<(), BridgeError> {
        self.engine.disable().await?;
        tracing::info!("sync engine disabled");
        Ok(())
    }

    async fn ensure_enabled(&self) -> Result<(), BridgeError> {
        if CategoryCascade::require_enabled(self.state().await) {
            Ok(())
        } else {
            Err(BridgeError::NotEnabled)
        }
    }
}

/// Fill an omitted password from the stored credentials of the same user.
pub fn merge_credentials(
    incoming: &ServiceConfig,
    stored: Option<&Credentials>,
) -> Result<Credentials, BridgeError> {
    let base_url = non_empty(incoming.base_url.as_deref())
        .ok_or_else(|| BridgeError::validation("baseUrl is required"))?;
    let username = non_empty(incoming.username.as_deref())
        .ok_or_else(|| BridgeError::validation("username is required"))?;

    let password = match incoming.password.as_deref().filter(|p| !p.is_empty()) {
        Some(p) => p.to_string(),
        None => stored
            .filter(|c| c.username == username && !c.password.is_empty())
            .map(|c| c.password.clone())
            .ok_or_else(|| BridgeError::validation("password is required"))?,
    };

    Ok(Credentials {
        base_url,
        username,
        password,
    })
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
