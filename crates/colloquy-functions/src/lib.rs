//! # colloquy-functions
//!
//! Specification registry and execution seam for the colloquy engine.
//!
//! Two concerns live here:
//!
//! - [`SpecRegistry`]: validated storage of function specification
//!   documents, consulted by the dispatch engine before any execution.
//! - [`Executor`]: the opaque capability that actually runs a function. The
//!   real thing is a sandboxed execution service; [`LocalExecutor`] is an
//!   in-process implementation used for handler-backed functions and as the
//!   test double for that collaborator.
//!
//! An executor failure is either *named* — part of the function's declared
//! error contract, passed through to the model verbatim — or *transport* —
//! process/network trouble the dispatch engine reports as an
//! `ExecutionFailure`.
//!
//! ## Example: a handler-backed function
//!
//! ```
//! use async_trait::async_trait;
//! use colloquy_functions::{Executor, FunctionHandler, InvokeError, LocalExecutor};
//! use serde_json::{json, Map, Value};
//! use std::time::Duration;
//!
//! struct FetchWeather;
//!
//! #[async_trait]
//! impl FunctionHandler for FetchWeather {
//!     async fn call(&self, parameters: &Map<String, Value>) -> Result<Value, InvokeError> {
//!         let place = parameters
//!             .get("place")
//!             .and_then(Value::as_str)
//!             .ok_or_else(|| InvokeError::named("PlaceNotFound", "no place given"))?;
//!         let _ = place;
//!         Ok(json!({ "temperature": 26 }))
//!     }
//! }
//!
//! # async fn example() -> anyhow::Result<()> {
//! let executor = LocalExecutor::new();
//! executor.add_handler("fetch_weather", FetchWeather);
//!
//! let mut parameters = Map::new();
//! parameters.insert("place".to_string(), json!("Pune"));
//! let value = executor
//!     .invoke("fetch_weather", &parameters, Duration::from_secs(30))
//!     .await?;
//! assert_eq!(value["temperature"], 26);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use log::debug;
use serde_json::{Map, Value};
use thiserror::Error;

pub mod registry;

pub use registry::{RegisteredFunction, RegistryError, SpecRegistry};

/// An executor-side failure.
#[derive(Debug, Error)]
pub enum InvokeError {
    /// An error the function itself signals, named by its specification's
    /// error contract. Conveyed to the model verbatim.
    #[error("{name}: {message}")]
    Function {
        /// The declared error name.
        name: String,
        /// What went wrong.
        message: String,
    },

    /// Process, network or environment trouble around the execution itself.
    /// Reported to the model as an `ExecutionFailure`.
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

impl InvokeError {
    /// A named, contract-declared function error.
    pub fn named(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Function {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// The external execution capability.
///
/// Implementations are opaque to the engine: potentially slow, potentially
/// failing, responsible for their own sandboxing. The engine bounds each
/// invocation with its own timeout and passes the bound along as a hint;
/// implementations that can enforce it sooner should.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Executes `function` with `parameters`.
    ///
    /// # Errors
    ///
    /// [`InvokeError::Function`] for contract-declared failures,
    /// [`InvokeError::Transport`] for everything else.
    async fn invoke(
        &self,
        function: &str,
        parameters: &Map<String, Value>,
        timeout: Duration,
    ) -> Result<Value, InvokeError>;
}

/// In-process implementation of a single function.
#[async_trait]
pub trait FunctionHandler: Send + Sync {
    /// Runs the function against the given arguments.
    ///
    /// # Errors
    ///
    /// Same contract as [`Executor::invoke`].
    async fn call(&self, parameters: &Map<String, Value>) -> Result<Value, InvokeError>;
}

/// An [`Executor`] that runs handlers in-process.
///
/// Thread-safe; cloning shares the handler table.
#[derive(Clone, Default)]
pub struct LocalExecutor {
    handlers: Arc<DashMap<String, Arc<dyn FunctionHandler>>>,
}

impl LocalExecutor {
    /// Creates an executor with no handlers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(DashMap::new()),
        }
    }

    /// Registers a handler for `function`, replacing any previous one.
    pub fn add_handler<H: FunctionHandler + 'static>(&self, function: impl Into<String>, handler: H) {
        self.handlers.insert(function.into(), Arc::new(handler));
    }

    /// Registers an already-shared handler.
    pub fn add_handler_arc(&self, function: impl Into<String>, handler: Arc<dyn FunctionHandler>) {
        self.handlers.insert(function.into(), handler);
    }

    /// Whether a handler is registered for `function`.
    #[must_use]
    pub fn has_handler(&self, function: &str) -> bool {
        self.handlers.contains_key(function)
    }

    /// Names of all registered handlers.
    #[must_use]
    pub fn handler_names(&self) -> Vec<String> {
        self.handlers.iter().map(|h| h.key().clone()).collect()
    }
}

#[async_trait]
impl Executor for LocalExecutor {
    async fn invoke(
        &self,
        function: &str,
        parameters: &Map<String, Value>,
        _timeout: Duration,
    ) -> Result<Value, InvokeError> {
        let handler = self
            .handlers
            .get(function)
            .map(|h| h.value().clone())
            .ok_or_else(|| {
                InvokeError::Transport(anyhow::anyhow!(
                    "no handler registered for function '{function}'"
                ))
            })?;

        debug!("executing '{function}' in-process");
        handler.call(parameters).await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use serde_json::json;

    struct Doubler;

    #[async_trait]
    impl FunctionHandler for Doubler {
        async fn call(&self, parameters: &Map<String, Value>) -> Result<Value, InvokeError> {
            let n = parameters
                .get("n")
                .and_then(Value::as_i64)
                .ok_or_else(|| InvokeError::named("BadArgument", "'n' must be an integer"))?;
            Ok(json!(n * 2))
        }
    }

    fn params(n: i64) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("n".to_string(), json!(n));
        map
    }

    #[tokio::test]
    async fn test_local_executor_invokes_handler() {
        let executor = LocalExecutor::new();
        executor.add_handler("double", Doubler);

        let value = executor
            .invoke("double", &params(21), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(value, json!(42));
    }

    #[tokio::test]
    async fn test_named_error_passthrough() {
        let executor = LocalExecutor::new();
        executor.add_handler("double", Doubler);

        let err = executor
            .invoke("double", &Map::new(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, InvokeError::Function { ref name, .. } if name == "BadArgument"));
    }

    #[tokio::test]
    async fn test_missing_handler_is_transport_failure() {
        let executor = LocalExecutor::new();

        let err = executor
            .invoke("nothing_here", &Map::new(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, InvokeError::Transport(_)));
        assert!(err.to_string().contains("nothing_here"));
    }

    #[test]
    fn test_handler_table() {
        let executor = LocalExecutor::new();
        assert!(!executor.has_handler("double"));

        executor.add_handler("double", Doubler);
        assert!(executor.has_handler("double"));
        assert_eq!(executor.handler_names(), vec!["double"]);

        // Shared tables: a clone sees the same handlers.
        let clone = executor.clone();
        assert!(clone.has_handler("double"));
    }
}
