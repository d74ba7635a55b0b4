use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::engine::EngineEvent;

pub const SYNC_START: &str = "sync:start";
pub const SYNC_PROGRESS: &str = "sync:progress";
pub const SYNC_COMPLETE: &str = "sync:complete";
pub const SYNC_ERROR: &str = "sync:error";
pub const SYNC_CONFLICT: &str = "sync:conflict";

/// One relayed notification as seen by a surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelayEvent {
    pub name: String,
    pub payload: Value,
    pub emitted_at: DateTime<Utc>,
}

impl RelayEvent {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
            emitted_at: Utc::now(),
        }
    }
}

impl EngineEvent {
    /// Event name and payload used on the relay.
    pub fn to_relay_parts(&self) -> (&'static str, Value) {
        match self {
            EngineEvent::Start => (SYNC_START, Value::Null),
            EngineEvent::Progress(p) => (SYNC_PROGRESS, p.clone()),
            EngineEvent::Complete(result) => (SYNC_COMPLETE, json!({ "result": result })),
            EngineEvent::Error { message } => (SYNC_ERROR, json!({ "message": message })),
        }
    }
}
