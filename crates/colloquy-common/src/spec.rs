//! Function specification documents.
//!
//! A specification describes a callable capability to the model: its name,
//! purpose, parameter schema, possible outputs and named errors. The serde
//! shape matches the JSON document exchanged over the model-facing channel:
//!
//! ```json
//! {
//!   "name": "fetch_weather",
//!   "description": "Fetch the current weather for a place.",
//!   "parameters": { "type": "object", "properties": { "place": { "type": "string" } } },
//!   "responses": [ { "type": "object", "properties": { "temperature": { "type": "number" } } } ],
//!   "errors": [ { "name": "PlaceNotFound", "description": "The place is unknown." } ]
//! }
//! ```
//!
//! `name`, `description`, `parameters` and `responses` are required;
//! `errors` and `examples` are optional. Structural validation (the schemas
//! actually compiling, error entries being non-empty) happens at
//! registration time, not here — a `FunctionSpec` value is just the
//! document.
//!
//! Specifications are immutable once registered; re-registering under the
//! same name supersedes the previous entry. They may arrive at any point in
//! a conversation, including from model-generated content.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A named error a function may signal, declared in its specification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorSpec {
    /// The error name, as it will appear in result error payloads.
    pub name: String,
    /// What the error means and when it occurs.
    pub description: String,
}

/// An illustrative (prompt, parameters) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpecExample {
    /// A user prompt that should trigger this function.
    pub prompt: String,
    /// The parameters the call should carry for that prompt.
    pub parameters: Map<String, Value>,
}

/// A function specification document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionSpec {
    /// Unique name within a registry.
    pub name: String,

    /// Human/model-facing explanation of what the function does.
    pub description: String,

    /// JSON Schema describing the accepted arguments.
    pub parameters: Value,

    /// Ordered sequence of JSON Schemas for the possible successful outputs.
    pub responses: Vec<Value>,

    /// Named errors the function may signal.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorSpec>,

    /// Illustrative (prompt, parameters) pairs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<SpecExample>,
}

impl FunctionSpec {
    /// Creates a specification with the given parameter schema and no
    /// declared responses, errors or examples.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            responses: Vec::new(),
            errors: Vec::new(),
            examples: Vec::new(),
        }
    }

    /// Appends a response schema.
    #[must_use]
    pub fn with_response(mut self, schema: Value) -> Self {
        self.responses.push(schema);
        self
    }

    /// Declares a named error.
    #[must_use]
    pub fn with_error(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.errors.push(ErrorSpec {
            name: name.into(),
            description: description.into(),
        });
        self
    }

    /// Appends an illustrative example.
    #[must_use]
    pub fn with_example(mut self, prompt: impl Into<String>, parameters: Map<String, Value>) -> Self {
        self.examples.push(SpecExample {
            prompt: prompt.into(),
            parameters,
        });
        self
    }
}
