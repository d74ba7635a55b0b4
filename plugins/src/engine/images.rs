use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use syncbridge_core::api::{Category, EngineError};

use super::manifest::{list_files, relative_key};

const IMAGE_REF_PATTERN: &str = r"(?i)[\w\-./]+\.(?:png|jpe?g|gif|webp|svg|bmp)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnusedImage {
    pub path: PathBuf,
    /// `images/...`
    pub key: String,
    pub size: u64,
}

/// Normalizes a user supplied image path to a key under `images/`.
pub fn image_key(relative_path: &str) -> String {
    let trimmed = relative_path.trim_start_matches('/');
    let prefix = format!("{}/", Category::Images.as_str());
    if trimmed.starts_with(&prefix) {
        trimmed.to_string()
    } else {
        format!("{prefix}{trimmed}")
    }
}

/// Every image path or file name mentioned in notes and todos.
async fn collect_references(data_dir: &Path) -> Result<HashSet<String>, EngineError> {
    let re = Regex::new(IMAGE_REF_PATTERN)
        .map_err(|e| EngineError::Other(anyhow::anyhow!("image reference pattern: {e}")))?;

    let mut refs = HashSet::new();
    for category in [Category::Notes, Category::Todos] {
        for file in list_files(&data_dir.join(category.as_str()))? {
            let bytes = tokio::fs::read(&file).await?;
            let text = String::from_utf8_lossy(&bytes);
            for m in re.find_iter(&text) {
                let found = m.as_str().trim_start_matches("./");
                refs.insert(found.to_string());
                if let Some(name) = found.rsplit('/').next() {
                    refs.insert(name.to_string());
                }
            }
        }
    }
    Ok(refs)
}

/// Local images that nothing references and that are older than
/// `retention_days`.
pub async fn find_unused(
    data_dir: &Path,
    retention_days: u32,
    now: DateTime<Utc>,
) -> Result<Vec<UnusedImage>, EngineError> {
    let refs = collect_references(data_dir).await?;
    // retention windows reaching past the earliest date keep everything
    let cutoff = now
        .checked_sub_signed(Duration::days(i64::from(retention_days)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);

    let mut unused = Vec::new();
    for path in list_files(&data_dir.join(Category::Images.as_str()))? {
        let Some(key) = relative_key(data_dir, &path) else {
            continue;
        };
        let name = key.rsplit('/').next().unwrap_or(key.as_str());
        let in_images = key
            .strip_prefix("images/")
            .unwrap_or(key.as_str());
        if refs.contains(&key) || refs.contains(in_images) || refs.contains(name) {
            continue;
        }

        let meta = tokio::fs::metadata(&path).await?;
        let modified: DateTime<Utc> = meta.modified()?.into();
        if modified > cutoff {
            continue;
        }
        unused.push(UnusedImage {
            path,
            key,
            size: meta.len(),
        });
    }
    Ok(unused)
}
