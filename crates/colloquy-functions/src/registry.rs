//! Specification registry.
//!
//! Stores validated [`FunctionSpec`] documents keyed by name and serves
//! lookups from the dispatch path. Registration compiles the parameter
//! schema once (Draft 7) and keeps the compiled validator next to the
//! immutable spec, so dispatch-time argument checking never recompiles.
//!
//! Specifications may be registered at any point in a conversation —
//! model-generated specification documents go through [`SpecRegistry::register_json`]
//! and get exactly the same validation as statically configured ones.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use jsonschema::{Draft, JSONSchema};
use log::debug;
use serde_json::{Map, Value};
use thiserror::Error;

use colloquy_common::FunctionSpec;

/// Registration failures. The registry is left unchanged when these occur.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegistryError {
    /// The specification document is structurally unacceptable.
    #[error("invalid specification '{name}': {reason}")]
    InvalidSpecification {
        /// The offending specification's name ("" when the name itself is
        /// missing).
        name: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A specification document that is not even valid JSON.
    #[error("specification document is not valid JSON: {0}")]
    InvalidDocument(#[from] serde_json::Error),
}

/// A validated specification plus its compiled parameter validator.
pub struct RegisteredFunction {
    spec: FunctionSpec,
    parameters_schema: JSONSchema,
}

impl RegisteredFunction {
    fn compile(spec: FunctionSpec) -> Result<Self, RegistryError> {
        let invalid = |reason: String| RegistryError::InvalidSpecification {
            name: spec.name.clone(),
            reason,
        };

        if spec.name.is_empty() {
            return Err(RegistryError::InvalidSpecification {
                name: String::new(),
                reason: "name must not be empty".to_string(),
            });
        }
        if spec.description.is_empty() {
            return Err(invalid("description must not be empty".to_string()));
        }
        if !spec.parameters.is_object() {
            return Err(invalid("parameters must be a JSON Schema object".to_string()));
        }
        for (index, response) in spec.responses.iter().enumerate() {
            if !response.is_object() {
                return Err(invalid(format!(
                    "responses[{index}] must be a JSON Schema object"
                )));
            }
            compile_schema(response)
                .map_err(|e| invalid(format!("responses[{index}] does not compile: {e}")))?;
        }
        for (index, error) in spec.errors.iter().enumerate() {
            if error.name.is_empty() || error.description.is_empty() {
                return Err(invalid(format!(
                    "errors[{index}] must have a non-empty name and description"
                )));
            }
        }

        let parameters_schema = compile_schema(&spec.parameters)
            .map_err(|e| invalid(format!("parameters schema does not compile: {e}")))?;

        Ok(Self {
            spec,
            parameters_schema,
        })
    }

    /// The specification document.
    #[must_use]
    pub const fn spec(&self) -> &FunctionSpec {
        &self.spec
    }

    /// The specification's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Validates call arguments against the parameter schema.
    ///
    /// # Errors
    ///
    /// Returns a single message aggregating every schema violation.
    pub fn validate_parameters(&self, parameters: &Map<String, Value>) -> Result<(), String> {
        let instance = Value::Object(parameters.clone());
        self.parameters_schema.validate(&instance).map_err(|errors| {
            errors
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ")
        })
    }
}

impl fmt::Debug for RegisteredFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredFunction")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

fn compile_schema(schema: &Value) -> Result<JSONSchema, String> {
    // Draft 7 matches what the model-facing schema documents are written
    // against.
    JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(schema)
        .map_err(|e| e.to_string())
}

/// Concurrent registry of function specifications, keyed by name.
///
/// Cloning is cheap and shares the underlying map.
#[derive(Debug, Clone)]
pub struct SpecRegistry {
    functions: Arc<DashMap<String, Arc<RegisteredFunction>>>,
}

impl Default for SpecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SpecRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            functions: Arc::new(DashMap::new()),
        }
    }

    /// Validates and stores a specification, replacing any previous entry
    /// under the same name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidSpecification`] and leaves the
    /// registry unchanged when the document is structurally unacceptable.
    pub fn register(&self, spec: FunctionSpec) -> Result<(), RegistryError> {
        let registered = RegisteredFunction::compile(spec)?;
        debug!("registering function specification '{}'", registered.name());
        self.functions
            .insert(registered.name().to_string(), Arc::new(registered));
        Ok(())
    }

    /// Parses and registers a specification document, e.g. one the model
    /// generated mid-conversation.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidDocument`] for unparseable JSON, or
    /// [`RegistryError::InvalidSpecification`] for a structurally
    /// unacceptable document.
    pub fn register_json(&self, document: &str) -> Result<(), RegistryError> {
        let spec: FunctionSpec = serde_json::from_str(document)?;
        self.register(spec)
    }

    /// Looks up a specification by name.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<Arc<RegisteredFunction>> {
        self.functions.get(name).map(|r| r.value().clone())
    }

    /// All registered specification documents, for rendering discovery
    /// material to the model-facing channel.
    #[must_use]
    pub fn list(&self) -> Vec<FunctionSpec> {
        self.functions.iter().map(|f| f.spec().clone()).collect()
    }

    /// Whether a specification is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Names of all registered specifications.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.functions.iter().map(|f| f.key().clone()).collect()
    }

    /// Removes a specification, returning it if present.
    pub fn remove(&self, name: &str) -> Option<Arc<RegisteredFunction>> {
        self.functions.remove(name).map(|(_, f)| f)
    }

    /// Removes every specification.
    pub fn clear(&self) {
        self.functions.clear();
    }

    /// Number of registered specifications.
    #[must_use]
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use serde_json::json;

    fn weather_spec() -> FunctionSpec {
        FunctionSpec::new(
            "fetch_weather",
            "Fetch the current weather for a place.",
            json!({
                "type": "object",
                "properties": { "place": { "type": "string" } },
                "required": ["place"],
            }),
        )
        .with_response(json!({
            "type": "object",
            "properties": { "temperature": { "type": "number" } },
        }))
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = SpecRegistry::new();
        registry.register(weather_spec()).unwrap();

        assert!(registry.contains("fetch_weather"));
        assert_eq!(registry.len(), 1);

        let resolved = registry.resolve("fetch_weather").unwrap();
        assert_eq!(resolved.name(), "fetch_weather");
        assert!(registry.resolve("does_not_exist").is_none());
    }

    #[test]
    fn test_register_rejects_empty_name() {
        let registry = SpecRegistry::new();
        let spec = FunctionSpec::new("", "something", json!({ "type": "object" }));

        let err = registry.register(spec).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidSpecification { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_rejects_non_object_parameters() {
        let registry = SpecRegistry::new();
        let spec = FunctionSpec::new("f", "desc", json!("not a schema"));

        let err = registry.register(spec).unwrap_err();
        assert!(err.to_string().contains("parameters must be a JSON Schema object"));
    }

    #[test]
    fn test_register_rejects_uncompilable_schema() {
        let registry = SpecRegistry::new();
        let spec = FunctionSpec::new(
            "f",
            "desc",
            json!({ "type": "not-a-real-type" }),
        );

        assert!(registry.register(spec).is_err());
    }

    #[test]
    fn test_register_rejects_empty_error_entries() {
        let registry = SpecRegistry::new();
        let spec = weather_spec().with_error("", "missing a name");

        let err = registry.register(spec).unwrap_err();
        assert!(err.to_string().contains("errors[0]"));
    }

    #[test]
    fn test_reregistration_supersedes() {
        let registry = SpecRegistry::new();
        registry.register(weather_spec()).unwrap();

        let replacement = FunctionSpec::new(
            "fetch_weather",
            "Second revision of the weather function.",
            json!({ "type": "object" }),
        );
        registry.register(replacement).unwrap();

        assert_eq!(registry.len(), 1);
        let resolved = registry.resolve("fetch_weather").unwrap();
        assert_eq!(
            resolved.spec().description,
            "Second revision of the weather function."
        );
    }

    #[test]
    fn test_register_json_document() {
        let registry = SpecRegistry::new();
        registry
            .register_json(
                r#"{
                    "name": "fetch_weather",
                    "description": "Fetch the current weather for a place.",
                    "parameters": { "type": "object" },
                    "responses": [ { "type": "object" } ]
                }"#,
            )
            .unwrap();
        assert!(registry.contains("fetch_weather"));

        let err = registry.register_json("{ not json").unwrap_err();
        assert!(matches!(err, RegistryError::InvalidDocument(_)));
    }

    #[test]
    fn test_parameter_validation() {
        let registry = SpecRegistry::new();
        registry.register(weather_spec()).unwrap();
        let function = registry.resolve("fetch_weather").unwrap();

        let mut good = Map::new();
        good.insert("place".to_string(), json!("Pune"));
        assert!(function.validate_parameters(&good).is_ok());

        let mut bad = Map::new();
        bad.insert("place".to_string(), json!(42));
        let reason = function.validate_parameters(&bad).unwrap_err();
        assert!(!reason.is_empty());

        // Missing required argument.
        assert!(function.validate_parameters(&Map::new()).is_err());
    }

    #[test]
    fn test_list_returns_documents() {
        let registry = SpecRegistry::new();
        registry.register(weather_spec()).unwrap();
        registry
            .register(FunctionSpec::new("ping", "Liveness probe.", json!({ "type": "object" })))
            .unwrap();

        let mut names: Vec<String> = registry.list().into_iter().map(|s| s.name).collect();
        names.sort();
        assert_eq!(names, vec!["fetch_weather", "ping"]);
    }

    #[test]
    fn test_remove_and_clear() {
        let registry = SpecRegistry::new();
        registry.register(weather_spec()).unwrap();

        assert!(registry.remove("fetch_weather").is_some());
        assert!(registry.remove("fetch_weather").is_none());

        registry.register(weather_spec()).unwrap();
        registry.clear();
        assert!(registry.is_empty());
    }
}
