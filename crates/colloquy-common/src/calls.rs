//! Function-call and function-result wire types.
//!
//! These are the two JSON object shapes exchanged with the model inside
//! labelled fenced blocks:
//!
//! ```text
//! { "id": "1", "function": "fetch_weather", "parameters": { "place": "Pune" } }
//! { "id": "1", "result": { "temperature": 26 } }
//! { "id": "2", "error": { "name": "Timeout", "message": "…" } }
//! ```
//!
//! A result carries exactly one of `result` or `error`; the invariant is
//! structural ([`CallOutcome`] is a flattened externally tagged enum, so a
//! payload with both keys, or neither, fails to deserialize).
//!
//! The `id` is chosen by the caller that issues the call — for model-issued
//! calls, by the model itself — and is the sole correlation mechanism between
//! calls and results. No positional correlation may be assumed.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A request to invoke a named function with specific parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    /// Correlation id, unique among unresolved calls in the conversation.
    pub id: String,

    /// Name of the function to invoke; resolved against the specification
    /// registry at dispatch time.
    pub function: String,

    /// Argument name to value mapping.
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl FunctionCall {
    /// Creates a call with no parameters.
    pub fn new(id: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            function: function.into(),
            parameters: Map::new(),
        }
    }

    /// Adds a single named parameter.
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    /// Replaces the full parameter map.
    #[must_use]
    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }
}

/// Error names the dispatch engine itself produces.
///
/// Executor-declared error names (from a specification's `errors` list) pass
/// through verbatim and are not represented here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallErrorKind {
    /// The call's function name did not resolve to a registered
    /// specification. The executor is never invoked.
    UnknownFunction,
    /// The call's parameters violated the specification's parameter schema.
    /// The executor is never invoked.
    InvalidParameters,
    /// The executor failed for reasons outside the function's own error
    /// contract (process or network trouble, missing handler).
    ExecutionFailure,
    /// The executor did not complete within the configured bound. The engine
    /// stops waiting; it does not retry.
    Timeout,
}

impl CallErrorKind {
    /// The wire name for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnknownFunction => "UnknownFunction",
            Self::InvalidParameters => "InvalidParameters",
            Self::ExecutionFailure => "ExecutionFailure",
            Self::Timeout => "Timeout",
        }
    }
}

impl fmt::Display for CallErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named error carried by a failed result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallError {
    /// The error name: one of the engine kinds, or a name declared by the
    /// function's specification.
    pub name: String,
    /// Human/model-facing description of what went wrong.
    pub message: String,
}

impl CallError {
    /// An engine-produced error of the given kind.
    pub fn kind(kind: CallErrorKind, message: impl Into<String>) -> Self {
        Self {
            name: kind.as_str().to_string(),
            message: message.into(),
        }
    }

    /// An error named by the function's own error contract.
    pub fn named(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Whether this error carries the given engine kind's name.
    #[must_use]
    pub fn is_kind(&self, kind: CallErrorKind) -> bool {
        self.name == kind.as_str()
    }
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

/// The payload of a [`FunctionResult`]: success value or named error.
///
/// Serializes as a single `result` or `error` key merged into the enclosing
/// result object.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum CallOutcome {
    /// Successful execution; any structured value.
    Result(Value),
    /// Failed execution.
    Error(CallError),
}

/// The engine's response to a function call, correlated by id.
///
/// Emitted at most once per call id; every dispatched call eventually
/// produces exactly one result (possibly an error) unless cancelled.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FunctionResult {
    /// Matches the originating call's id.
    pub id: String,

    /// Exactly one of `result` / `error`.
    #[serde(flatten)]
    pub outcome: CallOutcome,
}

// Deserialization is written out by hand: a derive cannot enforce the
// exactly-one-of rule (a flattened enum would quietly take whichever key it
// finds first), and `result: null` must stay distinguishable from a missing
// `result` key.
impl<'de> Deserialize<'de> for FunctionResult {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
        where
            D: serde::Deserializer<'de>,
        {
            Value::deserialize(deserializer).map(Some)
        }

        #[derive(Deserialize)]
        struct Raw {
            id: String,
            #[serde(default, deserialize_with = "present")]
            result: Option<Value>,
            #[serde(default)]
            error: Option<CallError>,
        }

        let raw = Raw::deserialize(deserializer)?;
        match (raw.result, raw.error) {
            (Some(value), None) => Ok(Self {
                id: raw.id,
                outcome: CallOutcome::Result(value),
            }),
            (None, Some(error)) => Ok(Self {
                id: raw.id,
                outcome: CallOutcome::Error(error),
            }),
            (Some(_), Some(_)) => Err(serde::de::Error::custom(
                "'result' and 'error' are mutually exclusive",
            )),
            (None, None) => Err(serde::de::Error::custom(
                "expected exactly one of 'result' or 'error'",
            )),
        }
    }
}

impl FunctionResult {
    /// A successful result.
    pub fn ok(id: impl Into<String>, value: Value) -> Self {
        Self {
            id: id.into(),
            outcome: CallOutcome::Result(value),
        }
    }

    /// A failed result.
    pub fn error(id: impl Into<String>, error: CallError) -> Self {
        Self {
            id: id.into(),
            outcome: CallOutcome::Error(error),
        }
    }

    /// Whether this result carries an error.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self.outcome, CallOutcome::Error(_))
    }

    /// The success value, if any.
    #[must_use]
    pub const fn value(&self) -> Option<&Value> {
        match &self.outcome {
            CallOutcome::Result(value) => Some(value),
            CallOutcome::Error(_) => None,
        }
    }

    /// The error, if any.
    #[must_use]
    pub const fn error_detail(&self) -> Option<&CallError> {
        match &self.outcome {
            CallOutcome::Error(error) => Some(error),
            CallOutcome::Result(_) => None,
        }
    }
}
