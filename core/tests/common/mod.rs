#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use syncbridge_core::api::{
    Category, CleanupReport, ConflictConfig, ConflictError, ConflictResolver, Credentials,
    Decision, EngineError, EngineEvent, EngineStatus, ExportReport, ImageStats, RelayEvent,
    SurfaceError, SurfaceSet, SyncBridge, SyncEngine, SyncSettings, SyncSummary, UiSurface,
};
use tokio::sync::broadcast;

/// Scriptable engine: every call is recorded, conflicts queued with
/// [`MockEngine::queue_conflict`] are raised during the next sync.
pub struct MockEngine {
    settings: Mutex<SyncSettings>,
    events: broadcast::Sender<EngineEvent>,
    resolver: Mutex<Option<Arc<dyn ConflictResolver>>>,
    calls: Mutex<Vec<String>>,
    queued_conflicts: Mutex<Vec<Value>>,
    outcomes: Mutex<Vec<Result<Decision, ConflictError>>>,
}

impl MockEngine {
    pub fn new(settings: SyncSettings) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            settings: Mutex::new(settings),
            events,
            resolver: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            queued_conflicts: Mutex::new(Vec::new()),
            outcomes: Mutex::new(Vec::new()),
        })
    }

    pub fn disabled_with_credentials() -> Arc<Self> {
        Self::new(SyncSettings {
            credentials: Some(credentials()),
            service_name: Some("local".into()),
            ..SyncSettings::default()
        })
    }

    pub fn enabled() -> Arc<Self> {
        let engine = Self::disabled_with_credentials();
        {
            let mut s = engine.settings.lock().unwrap();
            s.enabled = true;
            s.categories.insert(Category::Notes);
        }
        engine
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == name).count()
    }

    pub fn current(&self) -> SyncSettings {
        self.settings.lock().unwrap().clone()
    }

    pub fn has_resolver(&self) -> bool {
        self.resolver.lock().unwrap().is_some()
    }

    pub fn queue_conflict(&self, payload: Value) {
        self.queued_conflicts.lock().unwrap().push(payload);
    }

    pub fn outcomes(&self) -> Vec<Result<Decision, ConflictError>> {
        self.outcomes.lock().unwrap().clone()
    }

    pub fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }

    async fn run_sync(&self) -> Result<SyncSummary, EngineError> {
        self.emit(EngineEvent::Start);
        let queued: Vec<Value> = std::mem::take(&mut *self.queued_conflicts.lock().unwrap());
        let resolver = self.resolver.lock().unwrap().clone();

        let mut summary = SyncSummary::default();
        for payload in queued {
            summary.conflicts += 1;
            let outcome = match &resolver {
                Some(r) => r.request_resolution(payload).await,
                None => Err(ConflictError::Cancelled("no resolver".into())),
            };
            match &outcome {
                Ok(Decision::Local) => summary.pushed += 1,
                Ok(Decision::Remote) => summary.pulled += 1,
                Err(_) => summary.unresolved += 1,
            }
            self.outcomes.lock().unwrap().push(outcome);
        }

        self.emit(EngineEvent::Complete(
            serde_json::to_value(&summary).unwrap_or(Value::Null),
        ));
        Ok(summary)
    }
}

pub fn credentials() -> Credentials {
    Credentials {
        base_url: "/srv/remote".into(),
        username: "alice".into(),
        password: "secret".into(),
    }
}

#[async_trait]
impl SyncEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn settings(&self) -> SyncSettings {
        self.current()
    }

    async fn status(&self) -> EngineStatus {
        let s = self.current();
        EngineStatus {
            enabled: s.enabled,
            syncing: false,
            service_name: s.service_name.clone(),
            has_credentials: s.has_credentials(),
            categories: s.categories.iter().copied().collect(),
            auto_sync: s.auto_sync,
            auto_sync_interval_minutes: s.auto_sync_interval_minutes,
            last_sync_at: None,
            last_error: None,
        }
    }

    async fn test_connection(
        &self,
        _service_name: &str,
        credentials: &Credentials,
    ) -> Result<(), EngineError> {
        self.record("test_connection");
        if credentials.password == "wrong" {
            return Err(EngineError::Connection("authentication failed".into()));
        }
        Ok(())
    }

    async fn switch_service(
        &self,
        service_name: &str,
        credentials: Credentials,
    ) -> Result<(), EngineError> {
        self.record("switch_service");
        let mut s = self.settings.lock().unwrap();
        s.service_name = Some(service_name.to_string());
        s.credentials = Some(credentials);
        s.enabled = true;
        Ok(())
    }

    async fn enable(&self) -> Result<(), EngineError> {
        self.record("enable");
        let mut s = self.settings.lock().unwrap();
        if !s.has_credentials() {
            return Err(EngineError::MissingCredentials);
        }
        s.enabled = true;
        Ok(())
    }

    async fn disable(&self) -> Result<(), EngineError> {
        self.record("disable");
        self.settings.lock().unwrap().enabled = false;
        Ok(())
    }

    async fn set_category_enabled(
        &self,
        category: Category,
        enabled: bool,
    ) -> Result<(), EngineError> {
        self.record("set_category_enabled");
        let mut s = self.settings.lock().unwrap();
        if enabled {
            s.categories.insert(category);
        } else {
            s.categories.remove(&category);
        }
        Ok(())
    }

    async fn sync(&self) -> Result<SyncSummary, EngineError> {
        self.record("sync");
        if !self.current().enabled {
            return Ok(SyncSummary::default());
        }
        self.run_sync().await
    }

    async fn force_full_sync(&self) -> Result<SyncSummary, EngineError> {
        self.record("force_full_sync");
        self.run_sync().await
    }

    async fn set_auto_sync(&self, enabled: bool) -> Result<(), EngineError> {
        self.record("set_auto_sync");
        self.settings.lock().unwrap().auto_sync = enabled;
        Ok(())
    }

    async fn set_auto_sync_interval(&self, minutes: u32) -> Result<(), EngineError> {
        self.record("set_auto_sync_interval");
        self.settings.lock().unwrap().auto_sync_interval_minutes = minutes;
        Ok(())
    }

    async fn export_data(&self, path: &Path) -> Result<ExportReport, EngineError> {
        self.record("export_data");
        Ok(ExportReport {
            path: path.to_string_lossy().to_string(),
            files: 0,
            bytes: 0,
        })
    }

    async fn clear_all(&self) -> Result<(), EngineError> {
        self.record("clear_all");
        Ok(())
    }

    async fn download_image(&self, relative_path: &str) -> Result<PathBuf, EngineError> {
        self.record("download_image");
        Ok(PathBuf::from("/data").join(relative_path))
    }

    async fn upload_image(
        &self,
        _local_path: &Path,
        _relative_path: &str,
    ) -> Result<(), EngineError> {
        self.record("upload_image");
        Ok(())
    }

    async fn unused_images_stats(&self, retention_days: u32) -> Result<ImageStats, EngineError> {
        self.record(&format!("unused_images_stats:{retention_days}"));
        Ok(ImageStats::default())
    }

    async fn cleanup_unused_images(
        &self,
        retention_days: u32,
    ) -> Result<CleanupReport, EngineError> {
        self.record(&format!("cleanup_unused_images:{retention_days}"));
        Ok(CleanupReport::default())
    }

    fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    fn set_conflict_resolver(&self, resolver: Option<Arc<dyn ConflictResolver>>) {
        *self.resolver.lock().unwrap() = resolver;
    }
}

/// Surface that keeps everything it receives.
pub struct RecordingSurface {
    id: String,
    events: Mutex<Vec<RelayEvent>>,
}

impl RecordingSurface {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn names(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.name.clone())
            .collect()
    }

    pub fn events(&self) -> Vec<RelayEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl UiSurface for RecordingSurface {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_destroyed(&self) -> bool {
        false
    }

    fn deliver(&self, event: &RelayEvent) -> Result<(), SurfaceError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

pub struct Harness {
    pub engine: Arc<MockEngine>,
    pub surface: Arc<RecordingSurface>,
    pub bridge: Arc<SyncBridge>,
}

pub fn harness(engine: Arc<MockEngine>, timeout_secs: u64) -> Harness {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let surfaces = Arc::new(SurfaceSet::new());
    let surface = RecordingSurface::new("main-window");
    surfaces.open(surface.clone());
    let cfg = ConflictConfig {
        timeout_secs,
        history_capacity: 16,
    };
    let bridge = Arc::new(SyncBridge::new(engine.clone(), surfaces, &cfg));
    bridge.initialize();
    Harness {
        engine,
        surface,
        bridge,
    }
}

pub async fn wait_until<F: Fn() -> bool>(what: &str, cond: F) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("timed out waiting for {what}");
}
