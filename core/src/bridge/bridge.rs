use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::config::ConflictConfig;
use crate::conflict::ConflictCoordinator;
use crate::endpoint::{CommandResponse, EndpointRegistry};
use crate::engine::{ConflictResolver, EngineEvent, SyncEngine};
use crate::orchestrator::SyncOrchestrator;
use crate::relay::{EventRelay, SurfaceSet};

use super::commands::{register_commands, CommandContext};

/// Owns the registry, relay, conflict coordinator and orchestrator for one
/// engine.
///
/// Built once by the application and shared by reference. Call
/// [`initialize`](Self::initialize) from within a tokio runtime before
/// dispatching, and [`destroy`](Self::destroy) on shutdown.
pub struct SyncBridge {
    engine: Arc<dyn SyncEngine>,
    surfaces: Arc<SurfaceSet>,
    relay: EventRelay,
    registry: EndpointRegistry,
    conflicts: Arc<ConflictCoordinator>,
    orchestrator: Arc<SyncOrchestrator>,
    pump: Mutex<Option<JoinHandle<()>>>,
    initialized: AtomicBool,
}

impl SyncBridge {
    pub fn new(engine: Arc<dyn SyncEngine>, surfaces: Arc<SurfaceSet>, cfg: &ConflictConfig) -> Self {
        let relay = EventRelay::new(surfaces.clone());
        let conflicts = Arc::new(ConflictCoordinator::new(relay.clone(), cfg));
        let orchestrator = Arc::new(SyncOrchestrator::new(engine.clone()));
        Self {
            engine,
            surfaces,
            relay,
            registry: EndpointRegistry::new(),
            conflicts,
            orchestrator,
            pump: Mutex::new(None),
            initialized: AtomicBool::new(false),
        }
    }

    /// Bind all commands, attach to the engine and start relaying its events.
    /// Calling it again rebinds everything without duplicating anything.
    pub fn initialize(&self) {
        let ctx = Arc::new(CommandContext {
            engine: self.engine.clone(),
            orchestrator: self.orchestrator.clone(),
            conflicts: self.conflicts.clone(),
            surfaces: self.surfaces.clone(),
        });
        register_commands(&self.registry, ctx);

        self.conflicts.open();
        let resolver: Arc<dyn ConflictResolver> = self.conflicts.clone();
        self.engine.set_conflict_resolver(Some(resolver));

        let handle = spawn_event_pump(self.engine.subscribe(), self.relay.clone());
        if let Some(previous) = self.pump_slot().replace(handle) {
            previous.abort();
        }

        self.initialized.store(true, Ordering::SeqCst);
        tracing::info!(
            engine = self.engine.name(),
            commands = self.registry.names().len(),
            "sync bridge initialized"
        );
    }

    /// Unbind commands, cancel pending conflicts and detach from the engine.
    /// Safe to call any number of times, initialized or not.
    pub fn destroy(&self) {
        let unbound = self.registry.unregister_all();
        let cancelled = self.conflicts.shutdown();
        self.engine.set_conflict_resolver(None);
        if let Some(pump) = self.pump_slot().take() {
            pump.abort();
        }

        if self.initialized.swap(false, Ordering::SeqCst) {
            tracing::info!(unbound, cancelled, "sync bridge destroyed");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub async fn dispatch(&self, command: &str, args: Value) -> CommandResponse {
        self.registry.dispatch(command, args).await
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    pub fn relay(&self) -> &EventRelay {
        &self.relay
    }

    pub fn surfaces(&self) -> &Arc<SurfaceSet> {
        &self.surfaces
    }

    pub fn conflicts(&self) -> &Arc<ConflictCoordinator> {
        &self.conflicts
    }

    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }

    fn pump_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        match self.pump.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn spawn_event_pump(
    mut rx: broadcast::Receiver<EngineEvent>,
    relay: EventRelay,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let (name, payload) = event.to_relay_parts();
                    relay.broadcast(name, payload);
                }
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!("event relay lagged, {} engine events dropped", n);
                }
                Err(RecvError::Closed) => {
                    tracing::debug!("engine event stream closed");
                    break;
                }
            }
        }
    })
}
