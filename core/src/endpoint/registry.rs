use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;

use crate::error::BridgeError;

use super::response::CommandResponse;

pub type HandlerFuture = BoxFuture<'static, Result<Value, BridgeError>>;
pub type Handler = Arc<dyn Fn(Value) -> HandlerFuture + Send + Sync>;

/// Command name -> handler table.
///
/// At most one handler is bound per name; binding again replaces.
#[derive(Default)]
pub struct EndpointRegistry {
    handlers: Mutex<HashMap<String, Handler>>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to `name`, unbinding whatever was there. Returns `true`
    /// when a previous binding was replaced.
    pub fn register(&self, name: &str, handler: Handler) -> bool {
        let mut handlers = self.lock();
        let replaced = handlers.remove(name).is_some();
        handlers.insert(name.to_string(), handler);
        if replaced {
            tracing::debug!(command = name, "handler replaced");
        }
        replaced
    }

    pub fn register_fn<F, Fut>(&self, name: &str, f: F) -> bool
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, BridgeError>> + Send + 'static,
    {
        self.register(name, Arc::new(move |args| f(args).boxed()))
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.lock().remove(name).is_some()
    }

    /// Unbind everything. Returns how many names were bound.
    pub fn unregister_all(&self) -> usize {
        let mut handlers = self.lock();
        let n = handlers.len();
        handlers.clear();
        n
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Run the handler bound to `name`. Errors and panics are folded into a
    /// failed response.
    pub async fn dispatch(&self, name: &str, args: Value) -> CommandResponse {
        let handler = self.lock().get(name).cloned();
        let Some(handler) = handler else {
            tracing::debug!(command = name, "no handler bound");
            return CommandResponse::failure(&BridgeError::validation(format!(
                "unknown command: {name}"
            )));
        };

        tracing::debug!(command = name, "dispatch");
        let result = match AssertUnwindSafe(handler(args)).catch_unwind().await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(command = name, "handler panicked");
                Err(BridgeError::Engine(format!("command {name} failed unexpectedly")))
            }
        };
        if let Err(e) = &result {
            tracing::debug!(command = name, error = %e, "command failed");
        }
        result.into()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Handler>> {
        match self.handlers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
