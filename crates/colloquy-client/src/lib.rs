//! # colloquy-client
//!
//! The model-chat seam for the colloquy engine.
//!
//! The engine talks to a model through the [`ChatClient`] trait: hand over
//! the conversation state, get back the model's raw text for the next turn.
//! Everything transport-shaped — HTTP, local inference servers, streaming
//! accumulation, retries and backoff — lives behind the trait, owned by the
//! implementor. The engine treats the channel as opaque and never retries it;
//! [`ChatError::is_retryable`] is provided so implementors can.
//!
//! ## Implementing a client
//!
//! ```
//! use async_trait::async_trait;
//! use colloquy_client::{ChatClient, ChatError};
//! use colloquy_common::Conversation;
//!
//! struct EchoClient;
//!
//! #[async_trait]
//! impl ChatClient for EchoClient {
//!     async fn send(&self, conversation: &Conversation) -> Result<String, ChatError> {
//!         let last = conversation
//!             .get_messages()
//!             .last()
//!             .ok_or_else(|| ChatError::InvalidResponse("empty conversation".to_string()))?;
//!         Ok(last.content.clone())
//!     }
//!
//!     fn name(&self) -> &str {
//!         "echo"
//!     }
//! }
//! ```

use async_trait::async_trait;

use colloquy_common::Conversation;

pub mod error;

pub use error::ChatError;

/// A channel to a chat-completion model.
///
/// Implementations must be thread-safe (`Send + Sync`); the engine may hold
/// one behind a shared reference across turns.
#[must_use = "a ChatClient does nothing until send is called"]
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Sends the conversation to the model and returns its raw output text.
    ///
    /// The full ordered message history is the request; how roles and
    /// attachments are rendered into the provider's format is the
    /// implementor's concern.
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError`] when the channel fails. The engine propagates
    /// these to its caller without retrying.
    async fn send(&self, conversation: &Conversation) -> Result<String, ChatError>;

    /// A short name for this client, for logs and diagnostics.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;

    struct CannedClient(String);

    #[async_trait]
    impl ChatClient for CannedClient {
        async fn send(&self, _conversation: &Conversation) -> Result<String, ChatError> {
            Ok(self.0.clone())
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    #[tokio::test]
    async fn test_trait_object_dispatch() {
        let client: Box<dyn ChatClient> = Box::new(CannedClient("hello".to_string()));
        let conv = Conversation::new();

        assert_eq!(client.send(&conv).await.unwrap(), "hello");
        assert_eq!(client.name(), "canned");
    }
}
