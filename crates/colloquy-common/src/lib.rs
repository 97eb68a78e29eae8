//! # colloquy-common
//!
//! Common types for function-call conversations.
//!
//! This crate provides the foundational data model for orchestrating
//! function calling around an offline LLM:
//! - Conversation and message management, including pending-call bookkeeping
//! - Function specification documents
//! - The call/result wire shapes exchanged inside labelled fenced blocks
//!
//! ## Example
//!
//! ```
//! use colloquy_common::{Conversation, FunctionCall, FunctionResult, FunctionSpec};
//! use serde_json::json;
//!
//! // A conversation owned by one driver.
//! let mut conv = Conversation::new().with_title("Weather session");
//! conv.add_message(conv.user_message("What is the weather in Pune right now?")).unwrap();
//!
//! // A specification document for a callable capability.
//! let spec = FunctionSpec::new(
//!     "fetch_weather",
//!     "Fetch the current weather for a place.",
//!     json!({
//!         "type": "object",
//!         "properties": { "place": { "type": "string" } },
//!         "required": ["place"],
//!     }),
//! )
//! .with_response(json!({ "type": "object" }));
//!
//! // A model-issued call and the engine's correlated answer.
//! let call = FunctionCall::new("1", "fetch_weather").with_parameter("place", json!("Pune"));
//! let result = FunctionResult::ok("1", json!({ "temperature": 26 }));
//! assert_eq!(call.id, result.id);
//! # let _ = spec;
//! ```

/// Call and result wire types.
pub mod calls;
/// Conversation and message types, including pending-call state.
pub mod chat;
/// Function specification documents.
pub mod spec;

pub use calls::{CallError, CallErrorKind, CallOutcome, FunctionCall, FunctionResult};
pub use chat::{
    Attachment, Conversation, ConversationStatus, Message, MessageRole, StateError,
};
pub use spec::{ErrorSpec, FunctionSpec, SpecExample};
