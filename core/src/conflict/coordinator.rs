//! Rendezvous between the sync engine and whoever answers conflicts.
//!
//! The engine parks inside [`ConflictCoordinator::request_resolution`] until a
//! UI answers through [`ConflictCoordinator::resolve`], the timeout window
//! elapses, or the coordinator shuts down. Every terminal transition is the
//! removal of the pending entry under the registry lock, and the waiter's
//! sender is consumed inside that same critical section, so exactly one
//! party ever fulfils a given id.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::oneshot;

use crate::config::ConflictConfig;
use crate::engine::ConflictResolver;
use crate::error::ConflictError;
use crate::relay::{EventRelay, SYNC_CONFLICT};

use super::types::{ConflictId, ConflictRequest, ConflictState, Decision, Resolution};

type Outcome = Result<Decision, ConflictError>;

struct PendingEntry {
    request: ConflictRequest,
    tx: oneshot::Sender<Outcome>,
}

struct Registry {
    next_seq: u64,
    accepting: bool,
    pending: HashMap<ConflictId, PendingEntry>,
    history: VecDeque<ConflictRequest>,
    history_capacity: usize,
}

impl Registry {
    fn issue_id(&mut self) -> ConflictId {
        self.next_seq += 1;
        ConflictId::new(self.next_seq)
    }

    /// Removes `id` and records its terminal state. `None` if it was already gone.
    fn take(&mut self, id: ConflictId, state: ConflictState) -> Option<oneshot::Sender<Outcome>> {
        let PendingEntry { mut request, tx } = self.pending.remove(&id)?;
        request.settle(state);
        self.remember(request);
        Some(tx)
    }

    fn remember(&mut self, request: ConflictRequest) {
        if self.history_capacity == 0 {
            return;
        }
        while self.history.len() >= self.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(request);
    }
}

pub struct ConflictCoordinator {
    relay: EventRelay,
    timeout: Duration,
    registry: Mutex<Registry>,
}

impl ConflictCoordinator {
    pub fn new(relay: EventRelay, cfg: &ConflictConfig) -> Self {
        Self {
            relay,
            timeout: cfg.timeout(),
            registry: Mutex::new(Registry {
                next_seq: 0,
                accepting: true,
                pending: HashMap::new(),
                history: VecDeque::new(),
                history_capacity: cfg.history_capacity,
            }),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Park until a decision for a fresh conflict arrives.
    pub async fn request_resolution(&self, payload: Value) -> Outcome {
        let (id, mut rx, notify) = {
            let mut reg = self.lock();
            let id = reg.issue_id();
            let request = ConflictRequest::pending(id, payload);
            if !reg.accepting {
                let mut request = request;
                request.settle(ConflictState::Cancelled);
                reg.remember(request);
                tracing::debug!(conflict = %id, "coordinator closed, conflict cancelled");
                return Err(ConflictError::Cancelled(id.to_string()));
            }
            let notify = notify_payload(id, &request.payload);
            let (tx, rx) = oneshot::channel();
            reg.pending.insert(id, PendingEntry { request, tx });
            (id, rx, notify)
        };

        tracing::info!(conflict = %id, timeout_secs = self.timeout.as_secs(), "conflict awaiting decision");
        self.relay.broadcast(SYNC_CONFLICT, notify);

        let mut guard = WaiterGuard {
            coordinator: self,
            id: Some(id),
        };
        let outcome = match tokio::time::timeout(self.timeout, &mut rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(ConflictError::Cancelled(id.to_string())),
            Err(_) => self.expire(id, &mut rx),
        };
        guard.disarm();
        outcome
    }

    /// Deliver a decision for `id`.
    ///
    /// Unknown, settled and malformed ids all fail with `NotFound` and change
    /// nothing.
    pub fn resolve(&self, id: &str, resolution: Resolution) -> Result<ConflictState, ConflictError> {
        let Ok(cid) = id.parse::<ConflictId>() else {
            return Err(ConflictError::NotFound(id.to_string()));
        };
        let state = resolution.terminal_state();

        let mut reg = self.lock();
        let Some(tx) = reg.take(cid, state) else {
            tracing::debug!(conflict = id, "resolve for unknown or settled conflict");
            return Err(ConflictError::NotFound(id.to_string()));
        };
        let outcome = match resolution {
            Resolution::Local => Ok(Decision::Local),
            Resolution::Remote => Ok(Decision::Remote),
            Resolution::Cancel => Err(ConflictError::Cancelled(cid.to_string())),
        };
        if tx.send(outcome).is_err() {
            tracing::debug!(conflict = id, "waiter went away before the decision");
        }
        drop(reg);

        tracing::info!(conflict = id, state = ?state, "conflict resolved");
        Ok(state)
    }

    /// Cancel every pending conflict and refuse new ones until [`open`](Self::open).
    ///
    /// Returns how many waiters were cancelled. Safe to call repeatedly.
    pub fn shutdown(&self) -> usize {
        let mut reg = self.lock();
        reg.accepting = false;
        let mut ids: Vec<ConflictId> = reg.pending.keys().copied().collect();
        ids.sort();
        for id in &ids {
            if let Some(tx) = reg.take(*id, ConflictState::Cancelled) {
                let _ = tx.send(Err(ConflictError::Cancelled(id.to_string())));
            }
        }
        drop(reg);

        if !ids.is_empty() {
            tracing::info!(cancelled = ids.len(), "pending conflicts cancelled on shutdown");
        }
        ids.len()
    }

    pub fn open(&self) {
        self.lock().accepting = true;
    }

    pub fn is_accepting(&self) -> bool {
        self.lock().accepting
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn pending(&self) -> Vec<ConflictRequest> {
        let reg = self.lock();
        let mut out: Vec<ConflictRequest> =
            reg.pending.values().map(|e| e.request.clone()).collect();
        out.sort_by_key(|r| r.id);
        out
    }

    pub fn pending_ids(&self) -> Vec<String> {
        self.pending().iter().map(|r| r.id.to_string()).collect()
    }

    /// Recently settled conflicts, oldest first.
    pub fn history(&self) -> Vec<ConflictRequest> {
        self.lock().history.iter().cloned().collect()
    }

    /// The timer fired. Whoever removes the entry first wins; if a resolve got
    /// there before us its outcome is already sitting in the channel.
    fn expire(&self, id: ConflictId, rx: &mut oneshot::Receiver<Outcome>) -> Outcome {
        let claimed = self.lock().take(id, ConflictState::TimedOut);
        if claimed.is_some() {
            tracing::warn!(conflict = %id, "conflict timed out without a decision");
            return Err(ConflictError::TimedOut(id.to_string()));
        }
        rx.try_recv()
            .unwrap_or_else(|_| Err(ConflictError::Cancelled(id.to_string())))
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        match self.registry.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl ConflictResolver for ConflictCoordinator {
    async fn request_resolution(&self, payload: Value) -> Result<Decision, ConflictError> {
        ConflictCoordinator::request_resolution(self, payload).await
    }
}

/// Settles the entry as cancelled if the waiting future is dropped early.
struct WaiterGuard<'a> {
    coordinator: &'a ConflictCoordinator,
    id: Option<ConflictId>,
}

impl WaiterGuard<'_> {
    fn disarm(&mut self) {
        self.id = None;
    }
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            if self
                .coordinator
                .lock()
                .take(id, ConflictState::Cancelled)
                .is_some()
            {
                tracing::debug!(conflict = %id, "waiter dropped, conflict cancelled");
            }
        }
    }
}

fn notify_payload(id: ConflictId, payload: &Value) -> Value {
    let mut map = match payload {
        Value::Object(m) => m.clone(),
        Value::Null => Map::new(),
        other => {
            let mut m = Map::new();
            m.insert("payload".to_string(), other.clone());
            m
        }
    };
    map.insert("conflictId".to_string(), Value::String(id.to_string()));
    Value::Object(map)
}
