use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use syncbridge_core::api::{Category, EngineError};

pub const MANIFEST_FILE: &str = "manifest.json";

/// Content hash of every file as of the last successful sync, keyed by
/// `category/relative/path`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default)]
    pub files: BTreeMap<String, String>,
    #[serde(default)]
    pub synced_at: Option<DateTime<Utc>>,
}

impl Manifest {
    /// A missing file is an empty manifest.
    pub async fn load(path: &Path) -> Result<Self, EngineError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save(&self, path: &Path) -> Result<(), EngineError> {
        let bytes = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &bytes).await
    }

    pub async fn remove_file(path: &Path) -> Result<(), EngineError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn set(&mut self, path: &str, hash: &str) {
        self.files.insert(path.to_string(), hash.to_string());
    }

    pub fn forget(&mut self, path: &str) {
        self.files.remove(path);
    }

    pub fn paths_in(&self, category: Category) -> impl Iterator<Item = &String> {
        let prefix = format!("{}/", category.as_str());
        self.files.keys().filter(move |k| k.starts_with(&prefix))
    }
}

/// Writes through a sibling temp file so a crash never leaves a torn file.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), EngineError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Hashes every file under `root/<category>`. Keys are slash-separated and
/// include the category prefix.
pub async fn scan_category(
    root: &Path,
    category: Category,
) -> Result<BTreeMap<String, String>, EngineError> {
    let mut out = BTreeMap::new();
    for path in list_files(&root.join(category.as_str()))? {
        let Some(key) = relative_key(root, &path) else {
            continue;
        };
        let bytes = tokio::fs::read(&path).await?;
        out.insert(key, hash_bytes(&bytes));
    }
    Ok(out)
}

/// All regular files below `dir`, recursively. A missing dir is empty.
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>, EngineError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let escaped = glob::Pattern::escape(&dir.to_string_lossy());
    let pattern = format!("{escaped}/**/*");

    let mut files = Vec::new();
    let entries = glob::glob(&pattern)
        .map_err(|e| EngineError::Other(anyhow::anyhow!("invalid scan pattern: {e}")))?;
    for entry in entries {
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(_) => {}
            Err(e) => tracing::warn!("skipping unreadable entry: {}", e),
        }
    }
    Ok(files)
}

pub fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// What to do with one path given its local, remote and last-synced hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Unchanged,
    Push,
    Pull,
    DeleteLocal,
    DeleteRemote,
    Forget,
    Conflict,
}

pub fn plan(local: Option<&str>, remote: Option<&str>, base: Option<&str>) -> Action {
    match (local, remote, base) {
        (None, None, _) => Action::Forget,
        (Some(l), Some(r), _) if l == r => Action::Unchanged,
        // deleted remotely, untouched here
        (Some(l), None, Some(b)) if l == b => Action::DeleteLocal,
        (Some(_), None, _) => Action::Push,
        (None, Some(r), Some(b)) if r == b => Action::DeleteRemote,
        (None, Some(_), _) => Action::Pull,
        (Some(l), Some(_), Some(b)) if l == b => Action::Pull,
        (Some(_), Some(r), Some(b)) if r == b => Action::Push,
        (Some(_), Some(_), _) => Action::Conflict,
    }
}
