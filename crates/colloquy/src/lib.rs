//! # colloquy
//!
//! A function-call orchestration engine for offline LLMs.
//!
//! Models that lack native function calling can still call functions over a
//! plain-text convention: the model emits labelled fenced blocks containing
//! JSON call objects, the engine executes them, and the results go back into
//! the conversation as labelled result blocks. This crate implements that
//! lifecycle end to end:
//!
//! - [`wire`]: parse call blocks out of model output, format result blocks
//! - [`Dispatcher`]: validate calls against registered specifications and
//!   execute them in caller-defined concurrent batches
//! - [`Core`]: the conversation driver looping send → parse → dispatch →
//!   format until the model answers in prose
//!
//! Specifications live in a [`SpecRegistry`], execution happens behind the
//! [`Executor`] seam, and the model channel is the [`ChatClient`] seam —
//! both opaque collaborators the engine never second-guesses.
//!
//! ## Quick start
//!
//! ```
//! use colloquy::{Conversation, FunctionResult, wire};
//! use serde_json::json;
//!
//! // Parse calls out of a model reply.
//! let reply = "Checking.\n\n```function_call\n{ \"id\": \"1\", \"function\": \"fetch_weather\", \"parameters\": { \"place\": \"Pune\" } }\n```\n";
//! let parsed = wire::parse_calls(reply);
//! assert_eq!(parsed.calls[0].function, "fetch_weather");
//!
//! // Format results for the next model turn.
//! let results = vec![FunctionResult::ok("1", json!({ "temperature": 26 }))];
//! let block = wire::format_results(&results).unwrap();
//! assert!(block.contains("function_output"));
//!
//! let conversation = Conversation::new();
//! assert!(conversation.pending_ids().is_empty());
//! ```

pub mod core;
pub mod dispatch;
pub mod error;
pub mod wire;

pub use colloquy_client::*;
pub use colloquy_common::*;
pub use colloquy_functions::*;

pub use self::core::Core;
pub use dispatch::{DEFAULT_CALL_TIMEOUT, DispatchConfig, Dispatcher};
pub use error::EngineError;
