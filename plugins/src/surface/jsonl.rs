use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Context;
use serde_json::{json, Value};
use syncbridge_core::api::{EventsOutConfig, RelayEvent, SurfaceError, UiSurface};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

pub const STDOUT_TARGET: &str = "stdout:";

fn audit_preview(s: &str) -> String {
    const MAX: usize = 120;
    if s.len() <= MAX {
        return s.to_string();
    }
    let end = s
        .char_indices()
        .take_while(|(i, _)| *i < MAX)
        .last()
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    let mut out = s[..end].to_string();
    out.push_str("...");
    out
}

/// `{"type":"event","name":..,"payload":..,"emittedAt":..}`
pub fn event_line(event: &RelayEvent) -> Value {
    json!({
        "type": "event",
        "name": event.name,
        "payload": event.payload,
        "emittedAt": event.emitted_at,
    })
}

/// Handle to a single writer task appending JSON lines to a file or stdout.
///
/// Cloning shares the task; it exits once every handle is dropped.
#[derive(Clone)]
pub struct JsonlWriter {
    tx: mpsc::Sender<String>,
    dropped: Arc<AtomicU64>,
    drop_when_full: bool,
}

impl JsonlWriter {
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Waits for buffer space unless the writer drops when full.
    pub async fn send_line(&self, line: String) {
        if self.drop_when_full {
            if self.tx.try_send(line).is_err() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        } else if self.tx.send(line).await.is_err() {
            // writer closed
        }
    }

    pub async fn send_value(&self, value: &Value) {
        self.send_line(value.to_string()).await;
    }

    /// Non-blocking variant for callers that cannot await.
    pub fn try_send_line(&self, line: String) -> Result<(), SurfaceError> {
        match self.tx.try_send(line) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) if self.drop_when_full => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(SurfaceError::Full),
            Err(TrySendError::Closed(_)) => Err(SurfaceError::Closed),
        }
    }
}

/// Opens `path` (or stdout for `stdout:`) and spawns the writer task. The
/// returned handle completes after the last line is flushed.
pub async fn start_jsonl_writer(
    path: &str,
    capacity: usize,
    drop_when_full: bool,
) -> anyhow::Result<(JsonlWriter, JoinHandle<()>)> {
    let to_stdout = path == STDOUT_TARGET;
    let mut writer: Box<dyn tokio::io::AsyncWrite + Unpin + Send> = if to_stdout {
        Box::new(tokio::io::stdout())
    } else {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("create directory for {path}"))?;
            }
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("open events file {path}"))?;
        Box::new(file)
    };

    let (tx, mut rx) = mpsc::channel::<String>(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));

    let handle = tokio::spawn(async move {
        while let Some(mut line) = rx.recv().await {
            if !line.ends_with('\n') {
                line.push('\n');
            }
            if to_stdout {
                tracing::debug!(
                    target: "syncbridge.stdout_audit",
                    kind = "jsonl",
                    bytes = line.len(),
                    preview = %audit_preview(line.trim_end())
                );
            }
            if let Err(e) = writer.write_all(line.as_bytes()).await {
                tracing::warn!("jsonl writer stopped: {}", e);
                return;
            }
            // line-oriented consumers read as we go
            let _ = writer.flush().await;
        }
    });

    Ok((
        JsonlWriter {
            tx,
            dropped,
            drop_when_full,
        },
        handle,
    ))
}

/// Surface that mirrors every relayed event as a JSON line.
pub struct JsonlSurface {
    id: String,
    writer: JsonlWriter,
}

impl JsonlSurface {
    pub fn new(id: impl Into<String>, writer: JsonlWriter) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            writer,
        })
    }

    /// Builds the `events_out` surface, or `None` when it is switched off.
    pub async fn from_config(
        cfg: &EventsOutConfig,
    ) -> anyhow::Result<Option<(Arc<Self>, JoinHandle<()>)>> {
        if !cfg.enabled || cfg.path.trim().is_empty() {
            return Ok(None);
        }
        let (writer, handle) =
            start_jsonl_writer(&cfg.path, cfg.channel_capacity, cfg.drop_when_full).await?;
        let id = format!("events-out-{}", uuid::Uuid::new_v4());
        Ok(Some((Self::new(id, writer), handle)))
    }

    pub fn dropped_count(&self) -> u64 {
        self.writer.dropped_count()
    }
}

impl UiSurface for JsonlSurface {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_destroyed(&self) -> bool {
        self.writer.is_closed()
    }

    fn deliver(&self, event: &RelayEvent) -> Result<(), SurfaceError> {
        self.writer.try_send_line(event_line(event).to_string())
    }
}
