use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use syncbridge_core::api::{
    Category, CleanupReport, ConflictResolver, Credentials, Decision, EngineError, EngineEvent,
    EngineStatus, ExportReport, ImageStats, SyncEngine, SyncSettings, SyncSummary,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::images::{find_unused, image_key};
use super::manifest::{
    hash_bytes, list_files, plan, relative_key, scan_category, Action, Manifest, MANIFEST_FILE,
};
use super::store::SettingsStore;

pub const ENGINE_NAME: &str = "local-mirror";
const EVENT_CAPACITY: usize = 256;
const MIN_INTERVAL_MINUTES: u32 = 1;
const MAX_INTERVAL_MINUTES: u32 = 1440;

/// Mirrors a local data directory with a "remote" directory named by the
/// credentials' `baseUrl`.
///
/// Change detection works off a manifest of blake3 hashes recorded at the
/// last sync. When both sides changed a file differently, the attached
/// [`ConflictResolver`] is asked which side wins; without a decision both
/// copies are left untouched.
pub struct LocalMirrorEngine {
    inner: Arc<Inner>,
}

struct Inner {
    data_dir: PathBuf,
    state_dir: PathBuf,
    store: SettingsStore,
    settings: RwLock<SyncSettings>,
    events: broadcast::Sender<EngineEvent>,
    resolver: RwLock<Option<Arc<dyn ConflictResolver>>>,
    sync_lock: tokio::sync::Mutex<()>,
    last_sync_at: Mutex<Option<DateTime<Utc>>>,
    last_error: Mutex<Option<String>>,
    auto_task: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn read<T>(l: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match l.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write<T>(l: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match l.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

async fn copy_file(from: &Path, to: &Path) -> Result<u64, EngineError> {
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(tokio::fs::copy(from, to).await?)
}

async fn remove_if_exists(path: &Path) -> Result<(), EngineError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn modified_at(path: &Path) -> Option<String> {
    let meta = tokio::fs::metadata(path).await.ok()?;
    let modified: DateTime<Utc> = meta.modified().ok()?.into();
    Some(modified.to_rfc3339())
}

fn remote_root(settings: &SyncSettings) -> Result<PathBuf, EngineError> {
    match settings.credentials.as_ref() {
        Some(c) if c.is_complete() => Ok(PathBuf::from(&c.base_url)),
        _ => Err(EngineError::MissingCredentials),
    }
}

fn validate_interval(minutes: u32) -> Result<(), EngineError> {
    if (MIN_INTERVAL_MINUTES..=MAX_INTERVAL_MINUTES).contains(&minutes) {
        Ok(())
    } else {
        Err(EngineError::InvalidArgument(format!(
            "auto sync interval must be between {MIN_INTERVAL_MINUTES} and {MAX_INTERVAL_MINUTES} minutes"
        )))
    }
}

impl LocalMirrorEngine {
    /// Opens (creating if needed) the data and state directories and loads
    /// persisted settings. Must be called inside a tokio runtime, since a
    /// persisted auto-sync schedule is resumed right away.
    pub async fn open(
        data_dir: impl Into<PathBuf>,
        state_dir: impl Into<PathBuf>,
    ) -> Result<Self, EngineError> {
        let data_dir = data_dir.into();
        let state_dir = state_dir.into();
        tokio::fs::create_dir_all(&state_dir).await?;
        for category in Category::ALL {
            tokio::fs::create_dir_all(data_dir.join(category.as_str())).await?;
        }

        let store = SettingsStore::new(&state_dir);
        let settings = store.load().await?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let inner = Arc::new(Inner {
            data_dir,
            state_dir,
            store,
            settings: RwLock::new(settings),
            events,
            resolver: RwLock::new(None),
            sync_lock: tokio::sync::Mutex::new(()),
            last_sync_at: Mutex::new(None),
            last_error: Mutex::new(None),
            auto_task: Mutex::new(None),
        });
        Inner::reschedule(&inner);

        tracing::info!(
            data_dir = %inner.data_dir.display(),
            state_dir = %inner.state_dir.display(),
            "local mirror engine opened"
        );
        Ok(Self { inner })
    }

    pub fn data_dir(&self) -> &Path {
        &self.inner.data_dir
    }

    pub fn is_auto_sync_scheduled(&self) -> bool {
        lock(&self.inner.auto_task).is_some()
    }

    /// Applies `f` to the settings, persists them and refreshes the auto
    /// sync schedule.
    async fn update<F>(&self, f: F) -> Result<SyncSettings, EngineError>
    where
        F: FnOnce(&mut SyncSettings) -> Result<(), EngineError>,
    {
        let snapshot = {
            let mut settings = write(&self.inner.settings);
            f(&mut settings)?;
            settings.clone()
        };
        self.inner.store.save(&snapshot).await?;
        Inner::reschedule(&self.inner);
        Ok(snapshot)
    }

    fn manifest_path(&self) -> PathBuf {
        self.inner.state_dir.join(MANIFEST_FILE)
    }
}

impl Drop for LocalMirrorEngine {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.inner.auto_task).take() {
            task.abort();
        }
    }
}

impl Inner {
    fn settings(&self) -> SyncSettings {
        read(&self.settings).clone()
    }

    fn emit(&self, event: EngineEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    /// (Re)starts the periodic sync task to match the current settings.
    fn reschedule(this: &Arc<Self>) {
        let settings = this.settings();
        let mut slot = lock(&this.auto_task);
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        if !(settings.enabled && settings.auto_sync) {
            return;
        }

        let period = Duration::from_secs(u64::from(settings.auto_sync_interval_minutes) * 60);
        let weak: Weak<Self> = Arc::downgrade(this);
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                match inner.run_sync(false).await {
                    Ok(summary) => tracing::debug!(?summary, "auto sync finished"),
                    Err(EngineError::Busy) => tracing::debug!("auto sync skipped, sync in progress"),
                    Err(e) => tracing::warn!("auto sync failed: {}", e),
                }
            }
        }));
        tracing::debug!(minutes = settings.auto_sync_interval_minutes, "auto sync scheduled");
    }

    async fn run_sync(&self, full: bool) -> Result<SyncSummary, EngineError> {
        let settings = self.settings();
        if !settings.enabled {
            tracing::debug!("sync skipped, engine disabled");
            return Ok(SyncSummary::default());
        }
        let remote = remote_root(&settings)?;
        let _running = self.sync_lock.try_lock().map_err(|_| EngineError::Busy)?;

        self.emit(EngineEvent::Start);
        let result = self.sync_categories(&settings, &remote, full).await;
        match &result {
            Ok(summary) => {
                *lock(&self.last_sync_at) = Some(Utc::now());
                *lock(&self.last_error) = None;
                tracing::info!(
                    pushed = summary.pushed,
                    pulled = summary.pulled,
                    conflicts = summary.conflicts,
                    unresolved = summary.unresolved,
                    "sync complete"
                );
                self.emit(EngineEvent::Complete(serde_json::to_value(summary)?));
            }
            Err(e) => {
                *lock(&self.last_error) = Some(e.to_string());
                tracing::warn!("sync failed: {}", e);
                self.emit(EngineEvent::Error {
                    message: e.to_string(),
                });
            }
        }
        result
    }

    async fn sync_categories(
        &self,
        settings: &SyncSettings,
        remote: &Path,
        full: bool,
    ) -> Result<SyncSummary, EngineError> {
        if !remote.is_dir() {
            return Err(EngineError::Connection(format!(
                "remote directory not found: {}",
                remote.display()
            )));
        }

        let manifest_path = self.state_dir.join(MANIFEST_FILE);
        let mut manifest = if full {
            Manifest::default()
        } else {
            Manifest::load(&manifest_path).await?
        };
        let resolver = read(&self.resolver).clone();
        let mut summary = SyncSummary::default();

        for category in settings.categories.iter().copied() {
            let local = scan_category(&self.data_dir, category).await?;
            let theirs = scan_category(remote, category).await?;
            let mut paths: Vec<String> = local
                .keys()
                .chain(theirs.keys())
                .chain(manifest.paths_in(category))
                .cloned()
                .collect();
            paths.sort();
            paths.dedup();

            let total = paths.len();
            for (processed, path) in paths.iter().enumerate() {
                let l = local.get(path).map(String::as_str);
                let r = theirs.get(path).map(String::as_str);
                let local_path = self.data_dir.join(path);
                let remote_path = remote.join(path);

                match plan(l, r, manifest.get(path)) {
                    Action::Unchanged => {
                        if let Some(h) = l {
                            manifest.set(path, h);
                        }
                        summary.unchanged += 1;
                    }
                    Action::Push => {
                        copy_file(&local_path, &remote_path).await?;
                        if let Some(h) = l {
                            manifest.set(path, h);
                        }
                        summary.pushed += 1;
                    }
                    Action::Pull => {
                        copy_file(&remote_path, &local_path).await?;
                        if let Some(h) = r {
                            manifest.set(path, h);
                        }
                        summary.pulled += 1;
                    }
                    Action::DeleteLocal => {
                        remove_if_exists(&local_path).await?;
                        manifest.forget(path);
                        summary.pulled += 1;
                    }
                    Action::DeleteRemote => {
                        remove_if_exists(&remote_path).await?;
                        manifest.forget(path);
                        summary.pushed += 1;
                    }
                    Action::Forget => manifest.forget(path),
                    Action::Conflict => {
                        summary.conflicts += 1;
                        let payload = json!({
                            "category": category,
                            "path": path,
                            "service": settings.service_name,
                            "localHash": l,
                            "remoteHash": r,
                            "localModified": modified_at(&local_path).await,
                            "remoteModified": modified_at(&remote_path).await,
                        });
                        let decision = match &resolver {
                            Some(resolver) => Some(resolver.request_resolution(payload).await),
                            None => {
                                tracing::warn!(path = %path, "conflict with no resolver attached");
                                None
                            }
                        };
                        match decision {
                            Some(Ok(Decision::Local)) => {
                                copy_file(&local_path, &remote_path).await?;
                                if let Some(h) = l {
                                    manifest.set(path, h);
                                }
                                summary.pushed += 1;
                            }
                            Some(Ok(Decision::Remote)) => {
                                copy_file(&remote_path, &local_path).await?;
                                if let Some(h) = r {
                                    manifest.set(path, h);
                                }
                                summary.pulled += 1;
                            }
                            Some(Err(e)) => {
                                tracing::info!(path = %path, "conflict left unresolved: {}", e);
                                summary.unresolved += 1;
                            }
                            None => summary.unresolved += 1,
                        }
                    }
                }

                self.emit(EngineEvent::Progress(json!({
                    "category": category,
                    "processed": processed + 1,
                    "total": total,
                })));
            }
        }

        manifest.synced_at = Some(Utc::now());
        manifest.save(&manifest_path).await?;
        Ok(summary)
    }
}

#[async_trait]
impl SyncEngine for LocalMirrorEngine {
    fn name(&self) -> &str {
        ENGINE_NAME
    }

    async fn settings(&self) -> SyncSettings {
        self.inner.settings()
    }

    async fn status(&self) -> EngineStatus {
        let s = self.inner.settings();
        EngineStatus {
            enabled: s.enabled,
            syncing: self.inner.sync_lock.try_lock().is_err(),
            service_name: s.service_name.clone(),
            has_credentials: s.has_credentials(),
            categories: s.categories.iter().copied().collect(),
            auto_sync: s.auto_sync,
            auto_sync_interval_minutes: s.auto_sync_interval_minutes,
            last_sync_at: *lock(&self.inner.last_sync_at),
            last_error: lock(&self.inner.last_error).clone(),
        }
    }

    async fn test_connection(
        &self,
        service_name: &str,
        credentials: &Credentials,
    ) -> Result<(), EngineError> {
        if !credentials.is_complete() {
            return Err(EngineError::MissingCredentials);
        }
        let root = PathBuf::from(&credentials.base_url);
        if !root.is_dir() {
            return Err(EngineError::Connection(format!(
                "remote directory not found: {}",
                root.display()
            )));
        }

        let probe = root.join(format!(".syncbridge-probe-{}", uuid::Uuid::new_v4()));
        tokio::fs::write(&probe, b"probe")
            .await
            .map_err(|e| EngineError::Connection(format!("remote directory is not writable: {e}")))?;
        remove_if_exists(&probe).await?;

        tracing::debug!(service = service_name, remote = %root.display(), "connection ok");
        Ok(())
    }

    async fn switch_service(
        &self,
        service_name: &str,
        credentials: Credentials,
    ) -> Result<(), EngineError> {
        self.test_connection(service_name, &credentials).await?;
        let service = service_name.to_string();
        self.update(move |s| {
            s.service_name = Some(service);
            s.credentials = Some(credentials);
            s.enabled = true;
            Ok(())
        })
        .await?;
        // hashes recorded against the previous remote are meaningless now
        Manifest::remove_file(&self.manifest_path()).await?;
        tracing::info!(service = service_name, "switched sync service");
        Ok(())
    }

    async fn enable(&self) -> Result<(), EngineError> {
        self.update(|s| {
            if !s.has_credentials() {
                return Err(EngineError::MissingCredentials);
            }
            s.enabled = true;
            Ok(())
        })
        .await?;
        Ok(())
    }

    async fn disable(&self) -> Result<(), EngineError> {
        self.update(|s| {
            s.enabled = false;
            Ok(())
        })
        .await?;
        Ok(())
    }

    async fn set_category_enabled(
        &self,
        category: Category,
        enabled: bool,
    ) -> Result<(), EngineError> {
        self.update(|s| {
            if enabled {
                s.categories.insert(category);
            } else {
                s.categories.remove(&category);
            }
            Ok(())
        })
        .await?;
        Ok(())
    }

    async fn sync(&self) -> Result<SyncSummary, EngineError> {
        self.inner.run_sync(false).await
    }

    async fn force_full_sync(&self) -> Result<SyncSummary, EngineError> {
        if !self.inner.settings().enabled {
            return Err(EngineError::NotEnabled);
        }
        self.inner.run_sync(true).await
    }

    async fn set_auto_sync(&self, enabled: bool) -> Result<(), EngineError> {
        self.update(|s| {
            s.auto_sync = enabled;
            Ok(())
        })
        .await?;
        Ok(())
    }

    async fn set_auto_sync_interval(&self, minutes: u32) -> Result<(), EngineError> {
        validate_interval(minutes)?;
        self.update(|s| {
            s.auto_sync_interval_minutes = minutes;
            Ok(())
        })
        .await?;
        Ok(())
    }

    async fn export_data(&self, path: &Path) -> Result<ExportReport, EngineError> {
        let mut report = ExportReport {
            path: path.to_string_lossy().to_string(),
            ..ExportReport::default()
        };
        for file in list_files(&self.inner.data_dir)? {
            let Some(key) = relative_key(&self.inner.data_dir, &file) else {
                continue;
            };
            report.bytes += copy_file(&file, &path.join(&key)).await?;
            report.files += 1;
        }
        tracing::info!(files = report.files, bytes = report.bytes, "data exported");
        Ok(report)
    }

    async fn clear_all(&self) -> Result<(), EngineError> {
        let remote = remote_root(&self.inner.settings())?;
        for category in Category::ALL {
            let dir = remote.join(category.as_str());
            if dir.is_dir() {
                tokio::fs::remove_dir_all(&dir).await?;
            }
        }
        Manifest::remove_file(&self.manifest_path()).await?;
        tracing::info!(remote = %remote.display(), "remote data cleared");
        Ok(())
    }

    async fn download_image(&self, relative_path: &str) -> Result<PathBuf, EngineError> {
        let remote = remote_root(&self.inner.settings())?;
        let key = image_key(relative_path);
        let from = remote.join(&key);
        if !from.is_file() {
            return Err(EngineError::InvalidArgument(format!(
                "image not found on remote: {key}"
            )));
        }
        let to = self.inner.data_dir.join(&key);
        copy_file(&from, &to).await?;
        Ok(to)
    }

    async fn upload_image(
        &self,
        local_path: &Path,
        relative_path: &str,
    ) -> Result<(), EngineError> {
        let remote = remote_root(&self.inner.settings())?;
        let key = image_key(relative_path);
        let bytes = tokio::fs::read(local_path).await?;

        let local_copy = self.inner.data_dir.join(&key);
        if local_copy.as_path() != local_path {
            copy_file(local_path, &local_copy).await?;
        }
        copy_file(local_path, &remote.join(&key)).await?;

        let manifest_path = self.manifest_path();
        let mut manifest = Manifest::load(&manifest_path).await?;
        manifest.set(&key, &hash_bytes(&bytes));
        manifest.save(&manifest_path).await?;
        Ok(())
    }

    async fn unused_images_stats(&self, retention_days: u32) -> Result<ImageStats, EngineError> {
        let unused = find_unused(&self.inner.data_dir, retention_days, Utc::now()).await?;
        Ok(ImageStats {
            count: unused.len(),
            total_bytes: unused.iter().map(|u| u.size).sum(),
            files: unused.into_iter().map(|u| u.key).collect(),
        })
    }

    async fn cleanup_unused_images(
        &self,
        retention_days: u32,
    ) -> Result<CleanupReport, EngineError> {
        let unused = find_unused(&self.inner.data_dir, retention_days, Utc::now()).await?;
        let mut report = CleanupReport::default();
        for image in unused {
            remove_if_exists(&image.path).await?;
            report.removed += 1;
            report.freed_bytes += image.size;
        }
        tracing::info!(removed = report.removed, "unused images cleaned up");
        Ok(report)
    }

    fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.events.subscribe()
    }

    fn set_conflict_resolver(&self, resolver: Option<Arc<dyn ConflictResolver>>) {
        *write(&self.inner.resolver) = resolver;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use syncbridge_core::api::ConflictError;
    use tempfile::{tempdir, TempDir};

    struct Fixed(Result<Decision, ConflictError>, Mutex<Vec<Value>>);

    #[async_trait]
    impl ConflictResolver for Fixed {
        async fn request_resolution(&self, payload: Value) -> Result<Decision, ConflictError> {
            lock(&self.1).push(payload);
            self.0.clone()
        }
    }

    struct Env {
        _dir: TempDir,
        local: PathBuf,
        remote: PathBuf,
        engine: LocalMirrorEngine,
    }

    async fn env() -> Env {
        let dir = tempdir().unwrap();
        let local = dir.path().join("data");
        let remote = dir.path().join("remote");
        std::fs::create_dir_all(&remote).unwrap();
        let engine = LocalMirrorEngine::open(&local, dir.path().join("state"))
            .await
            .unwrap();
        let creds = Credentials {
            base_url: remote.to_string_lossy().to_string(),
            username: "alice".into(),
            password: "secret".into(),
        };
        engine.switch_service("local", creds).await.unwrap();
        engine
            .set_category_enabled(Category::Notes, true)
            .await
            .unwrap();
        Env {
            _dir: dir,
            local,
            remote,
            engine,
        }
    }

    fn put(root: &Path, rel: &str, body: &str) {
        let p = root.join(rel);
        std::fs::create_dir_all(p.parent().unwrap()).unwrap();
        std::fs::write(p, body).unwrap();
    }

    fn body(root: &Path, rel: &str) -> Option<String> {
        std::fs::read_to_string(root.join(rel)).ok()
    }

    #[tokio::test]
    async fn test_first_sync_copies_both_ways() {
        let e = env().await;
        put(&e.local, "notes/mine.md", "local");
        put(&e.remote, "notes/theirs.md", "remote");
        put(&e.local, "todos/skipped.json", "{}");

        let summary = e.engine.sync().await.unwrap();
        assert_eq!(summary.pushed, 1);
        assert_eq!(summary.pulled, 1);
        assert_eq!(body(&e.remote, "notes/mine.md").as_deref(), Some("local"));
        assert_eq!(body(&e.local, "notes/theirs.md").as_deref(), Some("remote"));
        // todos is not an enabled category
        assert_eq!(body(&e.remote, "todos/skipped.json"), None);

        let again = e.engine.sync().await.unwrap();
        assert_eq!(again.unchanged, 2);
        assert_eq!(again.pushed + again.pulled, 0);
    }

    #[tokio::test]
    async fn test_deletions_propagate() {
        let e = env().await;
        put(&e.local, "notes/a.md", "a");
        put(&e.local, "notes/b.md", "b");
        e.engine.sync().await.unwrap();

        std::fs::remove_file(e.local.join("notes/a.md")).unwrap();
        std::fs::remove_file(e.remote.join("notes/b.md")).unwrap();
        e.engine.sync().await.unwrap();

        assert_eq!(body(&e.remote, "notes/a.md"), None);
        assert_eq!(body(&e.local, "notes/b.md"), None);
    }

    #[tokio::test]
    async fn test_conflict_decisions() {
        let e = env().await;
        put(&e.local, "notes/a.md", "base");
        e.engine.sync().await.unwrap();
        put(&e.local, "notes/a.md", "mine");
        put(&e.remote, "notes/a.md", "theirs");

        let keep_remote = Arc::new(Fixed(Ok(Decision::Remote), Mutex::new(Vec::new())));
        e.engine.set_conflict_resolver(Some(keep_remote.clone()));
        let summary = e.engine.sync().await.unwrap();
        assert_eq!(summary.conflicts, 1);
        assert_eq!(summary.pulled, 1);
        assert_eq!(body(&e.local, "notes/a.md").as_deref(), Some("theirs"));

        let asked = lock(&keep_remote.1).clone();
        assert_eq!(asked.len(), 1);
        assert_eq!(asked[0]["path"], json!("notes/a.md"));
        assert_eq!(asked[0]["category"], json!("notes"));
        assert_eq!(asked[0]["localHash"], json!(hash_bytes(b"mine")));
    }

    #[tokio::test]
    async fn test_undecided_conflict_leaves_both_sides() {
        let e = env().await;
        put(&e.local, "notes/a.md", "mine");
        put(&e.remote, "notes/a.md", "theirs");

        let timeout = Arc::new(Fixed(
            Err(ConflictError::TimedOut("conflict_1".into())),
            Mutex::new(Vec::new()),
        ));
        e.engine.set_conflict_resolver(Some(timeout));
        let summary = e.engine.sync().await.unwrap();
        assert_eq!(summary.unresolved, 1);
        assert_eq!(body(&e.local, "notes/a.md").as_deref(), Some("mine"));
        assert_eq!(body(&e.remote, "notes/a.md").as_deref(), Some("theirs"));

        e.engine.set_conflict_resolver(None);
        let summary = e.engine.sync().await.unwrap();
        assert_eq!(summary.unresolved, 1);
    }

    #[tokio::test]
    async fn test_sync_emits_lifecycle_events() {
        let e = env().await;
        put(&e.local, "notes/a.md", "a");
        let mut rx = e.engine.subscribe();
        e.engine.sync().await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), EngineEvent::Start);
        assert_eq!(
            rx.recv().await.unwrap(),
            EngineEvent::Progress(json!({"category": "notes", "processed": 1, "total": 1}))
        );
        match rx.recv().await.unwrap() {
            EngineEvent::Complete(result) => assert_eq!(result["pushed"], json!(1)),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_remote_reports_error_event() {
        let e = env().await;
        let mut rx = e.engine.subscribe();
        std::fs::remove_dir_all(&e.remote).unwrap();

        let err = e.engine.sync().await.unwrap_err();
        assert!(matches!(err, EngineError::Connection(_)));
        assert_eq!(rx.recv().await.unwrap(), EngineEvent::Start);
        assert!(matches!(rx.recv().await.unwrap(), EngineEvent::Error { .. }));
        assert!(e.engine.status().await.last_error.is_some());
    }

    #[tokio::test]
    async fn test_disabled_engine_skips_sync() {
        let e = env().await;
        put(&e.local, "notes/a.md", "a");
        e.engine.disable().await.unwrap();

        assert_eq!(e.engine.sync().await.unwrap(), SyncSummary::default());
        assert!(matches!(
            e.engine.force_full_sync().await,
            Err(EngineError::NotEnabled)
        ));
        assert_eq!(body(&e.remote, "notes/a.md"), None);
    }

    #[tokio::test]
    async fn test_enable_requires_credentials() {
        let dir = tempdir().unwrap();
        let engine = LocalMirrorEngine::open(dir.path().join("d"), dir.path().join("s"))
            .await
            .unwrap();
        assert!(matches!(
            engine.enable().await,
            Err(EngineError::MissingCredentials)
        ));
        assert!(!engine.settings().await.enabled);
    }

    #[tokio::test]
    async fn test_connection_checks_remote_directory() {
        let e = env().await;
        let mut creds = e.engine.settings().await.credentials.unwrap();
        assert!(e.engine.test_connection("local", &creds).await.is_ok());

        creds.base_url = e.remote.join("missing").to_string_lossy().to_string();
        assert!(matches!(
            e.engine.test_connection("local", &creds).await,
            Err(EngineError::Connection(_))
        ));

        creds.password.clear();
        assert!(matches!(
            e.engine.test_connection("local", &creds).await,
            Err(EngineError::MissingCredentials)
        ));
    }

    #[tokio::test]
    async fn test_settings_persist_across_reopen() {
        let e = env().await;
        e.engine.set_auto_sync_interval(120).await.unwrap();
        assert!(matches!(
            e.engine.set_auto_sync_interval(0).await,
            Err(EngineError::InvalidArgument(_))
        ));

        let reopened = LocalMirrorEngine::open(&e.local, e._dir.path().join("state"))
            .await
            .unwrap();
        let s = reopened.settings().await;
        assert!(s.enabled);
        assert_eq!(s.auto_sync_interval_minutes, 120);
        assert_eq!(s.service_name.as_deref(), Some("local"));
    }

    #[tokio::test]
    async fn test_auto_sync_schedule_follows_settings() {
        let e = env().await;
        assert!(!e.engine.is_auto_sync_scheduled());
        e.engine.set_auto_sync(true).await.unwrap();
        assert!(e.engine.is_auto_sync_scheduled());
        e.engine.disable().await.unwrap();
        assert!(!e.engine.is_auto_sync_scheduled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_sync_runs_on_interval() {
        let e = env().await;
        put(&e.local, "notes/a.md", "a");
        e.engine.set_auto_sync_interval(5).await.unwrap();
        let mut rx = e.engine.subscribe();
        e.engine.set_auto_sync(true).await.unwrap();

        tokio::time::sleep(Duration::from_secs(5 * 60 + 1)).await;
        assert_eq!(rx.recv().await.unwrap(), EngineEvent::Start);
    }

    #[tokio::test]
    async fn test_force_full_sync_forgets_manifest() {
        let e = env().await;
        put(&e.local, "notes/a.md", "a");
        e.engine.sync().await.unwrap();
        std::fs::remove_file(e.local.join("notes/a.md")).unwrap();

        // with the manifest gone the remote copy looks new, so it comes back
        let summary = e.engine.force_full_sync().await.unwrap();
        assert_eq!(summary.pulled, 1);
        assert_eq!(body(&e.local, "notes/a.md").as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_export_and_clear() {
        let e = env().await;
        put(&e.local, "notes/a.md", "aaa");
        put(&e.local, "images/p.png", "pp");
        e.engine.sync().await.unwrap();

        let out = e._dir.path().join("export");
        let report = e.engine.export_data(&out).await.unwrap();
        assert_eq!(report.files, 2);
        assert_eq!(report.bytes, 5);
        assert_eq!(body(&out, "images/p.png").as_deref(), Some("pp"));

        e.engine.clear_all().await.unwrap();
        assert!(!e.remote.join("notes").exists());
        assert_eq!(body(&e.local, "notes/a.md").as_deref(), Some("aaa"));
    }

    #[tokio::test]
    async fn test_image_transfer() {
        let e = env().await;
        let src = e._dir.path().join("pic.png");
        std::fs::write(&src, "img").unwrap();

        e.engine.upload_image(&src, "trip/pic.png").await.unwrap();
        assert_eq!(body(&e.remote, "images/trip/pic.png").as_deref(), Some("img"));
        assert_eq!(body(&e.local, "images/trip/pic.png").as_deref(), Some("img"));

        std::fs::remove_file(e.local.join("images/trip/pic.png")).unwrap();
        let path = e.engine.download_image("images/trip/pic.png").await.unwrap();
        assert_eq!(path, e.local.join("images/trip/pic.png"));
        assert!(path.is_file());

        assert!(matches!(
            e.engine.download_image("nope.png").await,
            Err(EngineError::InvalidArgument(_))
        ));
    }
}
