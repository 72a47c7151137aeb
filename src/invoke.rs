//! Invocation target: runs named units of work with JSON payloads
//!
//! The dispatcher fans chunks out through an `Invoker` without knowing where
//! the work runs. `LocalInvoker` executes registered handlers in-process:
//! synchronous invocations are awaited, asynchronous ones are spawned onto
//! the tokio runtime and tracked so callers can drain them.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Errors from invoking a unit of work.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("function not found: {0}")]
    FunctionNotFound(String),
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("function failed: {0}")]
    Failed(String),
    #[error("invocation target unavailable: {0}")]
    Unavailable(String),
}

/// A unit of work that can be invoked by name.
#[async_trait]
pub trait FunctionHandler: Send + Sync {
    async fn handle(&self, payload: Value) -> Result<Value, InvokeError>;
}

/// Client trait for invoking named functions.
#[async_trait]
pub trait Invoker: Send + Sync {
    /// Invoke and wait for the function's result.
    async fn invoke(&self, function: &str, payload: Value) -> Result<Value, InvokeError>;

    /// Fire-and-forget invocation. Returns once the work is accepted.
    async fn invoke_async(&self, function: &str, payload: Value) -> Result<(), InvokeError>;
}

/// In-process invoker routing by function name.
#[derive(Default)]
pub struct LocalInvoker {
    handlers: DashMap<String, Arc<dyn FunctionHandler>>,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
}

impl LocalInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any previous handler.
    pub fn register(&self, name: impl Into<String>, handler: Arc<dyn FunctionHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn with_handler(self, name: impl Into<String>, handler: Arc<dyn FunctionHandler>) -> Self {
        self.register(name, handler);
        self
    }

    fn handler(&self, function: &str) -> Result<Arc<dyn FunctionHandler>, InvokeError> {
        self.handlers
            .get(function)
            .map(|h| Arc::clone(h.value()))
            .ok_or_else(|| InvokeError::FunctionNotFound(function.to_string()))
    }

    /// Wait for every asynchronous invocation started so far.
    pub async fn drain(&self) {
        let handles: Vec<JoinHandle<()>> = match self.in_flight.lock() {
            Ok(mut guard) => guard.drain(..).collect(),
            Err(_) => return,
        };
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Asynchronous invocation panicked");
            }
        }
    }
}

#[async_trait]
impl Invoker for LocalInvoker {
    async fn invoke(&self, function: &str, payload: Value) -> Result<Value, InvokeError> {
        debug!(function, "Invoking synchronously");
        self.handler(function)?.handle(payload).await
    }

    async fn invoke_async(&self, function: &str, payload: Value) -> Result<(), InvokeError> {
        let handler = self.handler(function)?;
        let name = function.to_string();
        debug!(function, "Invoking asynchronously");

        let handle = tokio::spawn(async move {
            if let Err(e) = handler.handle(payload).await {
                error!(function = %name, error = %e, "Asynchronous invocation failed");
            }
        });

        self.in_flight
            .lock()
            .map_err(|_| InvokeError::Unavailable("in-flight registry poisoned".to_string()))?
            .push(handle);
        Ok(())
    }
}
