use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Independently toggleable partition of synchronized data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Notes,
    Todos,
    Settings,
    Images,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Notes,
        Category::Todos,
        Category::Settings,
        Category::Images,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Notes => "notes",
            Category::Todos => "todos",
            Category::Settings => "settings",
            Category::Images => "images",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "notes" => Ok(Category::Notes),
            "todos" => Ok(Category::Todos),
            "settings" => Ok(Category::Settings),
            "images" => Ok(Category::Images),
            other => Err(format!("unknown category: {other}")),
        }
    }
}

/// Stored service credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub base_url: String,
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn is_complete(&self) -> bool {
        !self.base_url.trim().is_empty()
            && !self.username.trim().is_empty()
            && !self.password.is_empty()
    }
}

/// Service configuration as submitted by a UI; any field may be omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Engine-owned persisted settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub credentials: Option<Credentials>,
    #[serde(default)]
    pub categories: BTreeSet<Category>,
    #[serde(default)]
    pub auto_sync: bool,
    #[serde(default = "default_auto_sync_interval")]
    pub auto_sync_interval_minutes: u32,
}

fn default_auto_sync_interval() -> u32 {
    30
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            service_name: None,
            credentials: None,
            categories: BTreeSet::new(),
            auto_sync: false,
            auto_sync_interval_minutes: default_auto_sync_interval(),
        }
    }
}

impl SyncSettings {
    pub fn has_credentials(&self) -> bool {
        self.credentials
            .as_ref()
            .map(Credentials::is_complete)
            .unwrap_or(false)
    }
}

/// Lifecycle notifications emitted by an engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EngineEvent {
    Start,
    Progress(serde_json::Value),
    Complete(serde_json::Value),
    Error { message: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub pushed: usize,
    pub pulled: usize,
    pub conflicts: usize,
    /// Conflicts left untouched because no decision was made.
    pub unresolved: usize,
    pub unchanged: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub enabled: bool,
    pub syncing: bool,
    pub service_name: Option<String>,
    pub has_credentials: bool,
    pub categories: Vec<Category>,
    pub auto_sync: bool,
    pub auto_sync_interval_minutes: u32,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageStats {
    pub count: usize,
    pub total_bytes: u64,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub removed: usize,
    pub freed_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportReport {
    pub path: String,
    pub files: usize,
    pub bytes: u64,
}
