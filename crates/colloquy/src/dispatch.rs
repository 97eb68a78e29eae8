//! Batch dispatch of function calls.
//!
//! A batch is a set of calls the caller has asserted may run without
//! ordering constraints among themselves. That independence is a contract
//! the caller (or an upstream planning layer) satisfies — the dispatcher
//! never infers data dependencies. It guarantees only that it imposes no
//! ordering within a batch and promises no particular completion order;
//! the id carried by every result is the sole correlation mechanism.
//! Sequencing across batches belongs to the caller: await one `dispatch`
//! before issuing the next.
//!
//! Per-call failures (unknown function, rejected parameters, executor
//! trouble, timeout) are always returned as result payloads, never as `Err`
//! — the model is supposed to see them and react. The only `Err` out of
//! [`Dispatcher::dispatch`] is pending-set bookkeeping misuse, which
//! indicates a caller bug.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use log::{debug, warn};

use colloquy_common::{
    CallError, CallErrorKind, Conversation, FunctionCall, FunctionResult, StateError,
};
use colloquy_functions::{Executor, InvokeError, SpecRegistry};

/// Default bound on a single call's execution.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Timing knobs for the dispatcher.
#[derive(Debug, Clone, Copy)]
pub struct DispatchConfig {
    /// Bound on each individual call. On expiry the call resolves with a
    /// `Timeout` error; there is no automatic retry.
    pub call_timeout: Duration,

    /// Optional bound on a whole batch. On expiry every still-outstanding
    /// call resolves with `Timeout`. The underlying executor invocations are
    /// not interrupted — the engine just stops waiting on them.
    pub batch_deadline: Option<Duration>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            batch_deadline: None,
        }
    }
}

impl DispatchConfig {
    /// Sets the per-call timeout.
    #[must_use]
    pub const fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Sets the batch-wide deadline.
    #[must_use]
    pub const fn with_batch_deadline(mut self, deadline: Duration) -> Self {
        self.batch_deadline = Some(deadline);
        self
    }
}

/// Matches calls against the registry, executes them, and pairs results
/// back to call ids.
pub struct Dispatcher {
    registry: SpecRegistry,
    executor: Arc<dyn Executor>,
    config: DispatchConfig,
}

impl Dispatcher {
    /// Creates a dispatcher with default timing.
    pub fn new(registry: SpecRegistry, executor: Arc<dyn Executor>) -> Self {
        Self {
            registry,
            executor,
            config: DispatchConfig::default(),
        }
    }

    /// Replaces the timing configuration.
    #[must_use]
    pub const fn with_config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// The registry consulted before execution.
    #[must_use]
    pub const fn registry(&self) -> &SpecRegistry {
        &self.registry
    }

    /// The current timing configuration.
    #[must_use]
    pub const fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Runs a batch concurrently and returns results in completion order.
    ///
    /// Every id is recorded as pending on `conversation` before anything
    /// executes, and resolved the moment its result arrives (timeouts
    /// included), so the pending set shrinks monotonically and is empty
    /// when this returns.
    ///
    /// # Errors
    ///
    /// [`StateError::DuplicatePendingId`] if the batch collides with an
    /// unresolved call (or repeats an id internally); nothing executes in
    /// that case. Per-call failures are data in the returned results, not
    /// errors.
    pub async fn dispatch(
        &self,
        conversation: &mut Conversation,
        batch: Vec<FunctionCall>,
    ) -> Result<Vec<FunctionResult>, StateError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        conversation.record_dispatch(batch.iter().map(|c| c.id.clone()))?;
        debug!("dispatching batch of {} call(s)", batch.len());

        let mut outstanding: HashSet<String> = batch.iter().map(|c| c.id.clone()).collect();
        let mut in_flight: FuturesUnordered<_> = batch
            .into_iter()
            .map(|call| self.resolve_call(call))
            .collect();
        let mut results = Vec::with_capacity(in_flight.len());

        match self.config.batch_deadline {
            None => {
                while let Some(result) = in_flight.next().await {
                    outstanding.remove(&result.id);
                    conversation.record_resolution(&result.id)?;
                    results.push(result);
                }
            }
            Some(deadline) => {
                let expiry = tokio::time::sleep(deadline);
                tokio::pin!(expiry);
                loop {
                    tokio::select! {
                        maybe = in_flight.next() => {
                            let Some(result) = maybe else { break };
                            outstanding.remove(&result.id);
                            conversation.record_resolution(&result.id)?;
                            results.push(result);
                        }
                        () = &mut expiry => {
                            warn!(
                                "batch deadline elapsed with {} call(s) outstanding",
                                outstanding.len()
                            );
                            for id in std::mem::take(&mut outstanding) {
                                conversation.record_resolution(&id)?;
                                results.push(FunctionResult::error(
                                    id,
                                    CallError::kind(
                                        CallErrorKind::Timeout,
                                        format!(
                                            "batch deadline of {}ms elapsed",
                                            deadline.as_millis()
                                        ),
                                    ),
                                ));
                            }
                            break;
                        }
                    }
                }
            }
        }

        Ok(results)
    }

    async fn resolve_call(&self, call: FunctionCall) -> FunctionResult {
        let FunctionCall {
            id,
            function,
            parameters,
        } = call;

        let Some(registered) = self.registry.resolve(&function) else {
            debug!("call '{id}': unknown function '{function}'");
            return FunctionResult::error(
                id,
                CallError::kind(
                    CallErrorKind::UnknownFunction,
                    format!("no function named '{function}' is registered"),
                ),
            );
        };

        if let Err(reason) = registered.validate_parameters(&parameters) {
            debug!("call '{id}': parameters rejected: {reason}");
            return FunctionResult::error(
                id,
                CallError::kind(CallErrorKind::InvalidParameters, reason),
            );
        }

        let bound = self.config.call_timeout;
        match tokio::time::timeout(bound, self.executor.invoke(&function, &parameters, bound)).await
        {
            Ok(Ok(value)) => FunctionResult::ok(id, value),
            Ok(Err(InvokeError::Function { name, message })) => {
                FunctionResult::error(id, CallError::named(name, message))
            }
            Ok(Err(InvokeError::Transport(e))) => FunctionResult::error(
                id,
                CallError::kind(CallErrorKind::ExecutionFailure, e.to_string()),
            ),
            Err(_) => FunctionResult::error(
                id,
                CallError::kind(
                    CallErrorKind::Timeout,
                    format!("execution exceeded {}ms", bound.as_millis()),
                ),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::{Map, Value, json};

    use colloquy_common::FunctionSpec;

    /// Executor that records invocation counts and serves canned behavior
    /// per function name.
    struct ScriptedExecutor {
        invocations: AtomicUsize,
    }

    impl ScriptedExecutor {
        fn new() -> Self {
            Self {
                invocations: AtomicUsize::new(0),
            }
        }

        fn invocation_count(&self) -> usize {
            self.invocations.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Executor for ScriptedExecutor {
        async fn invoke(
            &self,
            function: &str,
            parameters: &Map<String, Value>,
            _timeout: Duration,
        ) -> Result<Value, InvokeError> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            match function {
                "fetch_weather" => Ok(json!({ "temperature": 26 })),
                "sleepy" => {
                    let millis = parameters
                        .get("millis")
                        .and_then(Value::as_u64)
                        .unwrap_or(50);
                    tokio::time::sleep(Duration::from_millis(millis)).await;
                    Ok(json!({ "slept": millis }))
                }
                "grumpy" => Err(InvokeError::named("PlaceNotFound", "no station there")),
                "broken" => Err(InvokeError::Transport(anyhow::anyhow!("sandbox crashed"))),
                other => Err(InvokeError::Transport(anyhow::anyhow!(
                    "unscripted function '{other}'"
                ))),
            }
        }
    }

    fn open_schema() -> Value {
        json!({ "type": "object" })
    }

    fn registry_with(names: &[&str]) -> SpecRegistry {
        let registry = SpecRegistry::new();
        for name in names {
            registry
                .register(FunctionSpec::new(*name, "test function", open_schema()))
                .unwrap();
        }
        registry
    }

    fn dispatcher(names: &[&str]) -> (Dispatcher, Arc<ScriptedExecutor>) {
        let executor = Arc::new(ScriptedExecutor::new());
        let dispatcher = Dispatcher::new(registry_with(names), executor.clone());
        (dispatcher, executor)
    }

    #[tokio::test]
    async fn test_successful_dispatch() {
        let (dispatcher, executor) = dispatcher(&["fetch_weather"]);
        let mut conv = Conversation::new();

        let call = FunctionCall::new("1", "fetch_weather").with_parameter("place", json!("Pune"));
        let results = dispatcher.dispatch(&mut conv, vec![call]).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "1");
        assert_eq!(results[0].value(), Some(&json!({ "temperature": 26 })));
        assert_eq!(executor.invocation_count(), 1);
        assert!(conv.pending_ids().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_function_skips_executor() {
        let (dispatcher, executor) = dispatcher(&[]);
        let mut conv = Conversation::new();

        let call = FunctionCall::new("x", "does_not_exist");
        let results = dispatcher.dispatch(&mut conv, vec![call]).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "x");
        let error = results[0].error_detail().unwrap();
        assert!(error.is_kind(CallErrorKind::UnknownFunction));
        assert_eq!(executor.invocation_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_parameters_skip_executor() {
        let executor = Arc::new(ScriptedExecutor::new());
        let registry = SpecRegistry::new();
        registry
            .register(FunctionSpec::new(
                "fetch_weather",
                "weather",
                json!({
                    "type": "object",
                    "properties": { "place": { "type": "string" } },
                    "required": ["place"],
                }),
            ))
            .unwrap();
        let dispatcher = Dispatcher::new(registry, executor.clone());
        let mut conv = Conversation::new();

        let call = FunctionCall::new("1", "fetch_weather").with_parameter("place", json!(42));
        let results = dispatcher.dispatch(&mut conv, vec![call]).await.unwrap();

        let error = results[0].error_detail().unwrap();
        assert!(error.is_kind(CallErrorKind::InvalidParameters));
        assert_eq!(executor.invocation_count(), 0);
    }

    #[tokio::test]
    async fn test_named_error_passes_through() {
        let (dispatcher, _) = dispatcher(&["grumpy"]);
        let mut conv = Conversation::new();

        let results = dispatcher
            .dispatch(&mut conv, vec![FunctionCall::new("1", "grumpy")])
            .await
            .unwrap();

        let error = results[0].error_detail().unwrap();
        assert_eq!(error.name, "PlaceNotFound");
        assert_eq!(error.message, "no station there");
    }

    #[tokio::test]
    async fn test_transport_failure_becomes_execution_failure() {
        let (dispatcher, _) = dispatcher(&["broken"]);
        let mut conv = Conversation::new();

        let results = dispatcher
            .dispatch(&mut conv, vec![FunctionCall::new("1", "broken")])
            .await
            .unwrap();

        let error = results[0].error_detail().unwrap();
        assert!(error.is_kind(CallErrorKind::ExecutionFailure));
        assert!(error.message.contains("sandbox crashed"));
    }

    #[tokio::test]
    async fn test_call_timeout_resolves_and_clears_pending() {
        let (dispatcher, _) = dispatcher(&["sleepy"]);
        let dispatcher =
            dispatcher.with_config(DispatchConfig::default().with_call_timeout(Duration::from_millis(20)));
        let mut conv = Conversation::new();

        let call = FunctionCall::new("slow", "sleepy").with_parameter("millis", json!(5_000));
        let results = dispatcher.dispatch(&mut conv, vec![call]).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "slow");
        assert!(results[0].error_detail().unwrap().is_kind(CallErrorKind::Timeout));
        assert!(!conv.pending_ids().contains("slow"));
    }

    #[tokio::test]
    async fn test_batch_deadline_times_out_stragglers() {
        let (dispatcher, _) = dispatcher(&["sleepy"]);
        let dispatcher = dispatcher.with_config(
            DispatchConfig::default()
                .with_call_timeout(Duration::from_secs(60))
                .with_batch_deadline(Duration::from_millis(100)),
        );
        let mut conv = Conversation::new();

        let quick = FunctionCall::new("quick", "sleepy").with_parameter("millis", json!(10));
        let slow = FunctionCall::new("slow", "sleepy").with_parameter("millis", json!(5_000));
        let results = dispatcher
            .dispatch(&mut conv, vec![quick, slow])
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        // The quick call completed first; the straggler resolved as Timeout.
        assert_eq!(results[0].id, "quick");
        assert!(!results[0].is_error());
        assert_eq!(results[1].id, "slow");
        assert!(results[1].error_detail().unwrap().is_kind(CallErrorKind::Timeout));
        assert!(conv.pending_ids().is_empty());
    }

    #[tokio::test]
    async fn test_completion_order_differs_from_submission_order() {
        let (dispatcher, _) = dispatcher(&["sleepy"]);
        let mut conv = Conversation::new();

        let slow = FunctionCall::new("slow", "sleepy").with_parameter("millis", json!(150));
        let quick = FunctionCall::new("quick", "sleepy").with_parameter("millis", json!(10));
        let results = dispatcher
            .dispatch(&mut conv, vec![slow, quick])
            .await
            .unwrap();

        // Submitted slow-first; completed quick-first. Ids keep the pairing
        // honest regardless.
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["quick", "slow"]);
        assert_eq!(results[1].value(), Some(&json!({ "slept": 150 })));
    }

    #[tokio::test]
    async fn test_duplicate_id_in_batch_is_a_state_error() {
        let (dispatcher, executor) = dispatcher(&["fetch_weather"]);
        let mut conv = Conversation::new();

        let err = dispatcher
            .dispatch(
                &mut conv,
                vec![
                    FunctionCall::new("1", "fetch_weather"),
                    FunctionCall::new("1", "fetch_weather"),
                ],
            )
            .await
            .unwrap_err();

        assert_eq!(err, StateError::DuplicatePendingId("1".to_string()));
        // Nothing executed and nothing stuck in the pending set.
        assert_eq!(executor.invocation_count(), 0);
        assert!(conv.pending_ids().is_empty());
    }

    #[tokio::test]
    async fn test_one_failure_never_aborts_siblings() {
        let (dispatcher, _) = dispatcher(&["fetch_weather", "grumpy"]);
        let mut conv = Conversation::new();

        let results = dispatcher
            .dispatch(
                &mut conv,
                vec![
                    FunctionCall::new("a", "fetch_weather"),
                    FunctionCall::new("b", "grumpy"),
                    FunctionCall::new("c", "does_not_exist"),
                ],
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        let ok_count = results.iter().filter(|r| !r.is_error()).count();
        assert_eq!(ok_count, 1);
        assert!(conv.pending_ids().is_empty());
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let (dispatcher, executor) = dispatcher(&[]);
        let mut conv = Conversation::new();

        let results = dispatcher.dispatch(&mut conv, Vec::new()).await.unwrap();
        assert!(results.is_empty());
        assert_eq!(executor.invocation_count(), 0);
    }
}
