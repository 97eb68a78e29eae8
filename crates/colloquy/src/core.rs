use std::time::Instant;

use anyhow::Result;
use log::{debug, info, warn};

use colloquy_client::ChatClient;
use colloquy_common::Conversation;
use colloquy_functions::SpecRegistry;

use crate::dispatch::Dispatcher;
use crate::error::EngineError;
use crate::wire;

/// Conversation driver: runs the send → parse → dispatch → format loop
/// until the model stops calling functions.
///
/// One `Core` may drive many conversations; each conversation is owned by
/// its caller and passed in by reference, so concurrent conversations stay
/// isolated.
pub struct Core<C: ChatClient> {
    pub client: C,
    pub dispatcher: Dispatcher,
    /// Ceiling on dispatch rounds within one user turn. `None` means
    /// unlimited.
    pub max_turns: Option<u32>,
}

impl<C: ChatClient> Core<C> {
    pub fn new(client: C, dispatcher: Dispatcher) -> Self {
        Self {
            client,
            dispatcher,
            max_turns: None,
        }
    }

    #[must_use]
    pub const fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = Some(max_turns);
        self
    }

    /// The specification registry behind the dispatcher. Register
    /// specifications here at any point, including mid-conversation.
    #[must_use]
    pub const fn registry(&self) -> &SpecRegistry {
        self.dispatcher.registry()
    }

    /// Appends `user_text` as a user message and drives the conversation to
    /// the model's next prose answer.
    ///
    /// # Errors
    ///
    /// Propagates chat-channel failures, conversation-state violations and
    /// [`EngineError::MaxTurnsExceeded`].
    pub async fn run_turn(
        &self,
        conversation: &mut Conversation,
        user_text: impl Into<String> + Send,
    ) -> Result<String> {
        let message = conversation.user_message(user_text);
        conversation.add_message(message)?;
        self.drive(conversation).await
    }

    /// Drives the conversation from its current state: sends it to the
    /// model, executes any function calls in the reply, folds the results
    /// back in, and repeats until a reply carries no calls. Returns that
    /// final reply's text.
    ///
    /// Calls parsed from one reply form one concurrent batch. Unusable
    /// blocks (malformed JSON, repeated ids) are logged and dropped — they
    /// have no id to answer to, so they cannot be conveyed as result
    /// blocks.
    ///
    /// # Errors
    ///
    /// Same contract as [`run_turn`](Self::run_turn).
    pub async fn drive(&self, conversation: &mut Conversation) -> Result<String> {
        let mut rounds = 0u32;
        let started = Instant::now();

        loop {
            debug!("requesting completion from '{}'", self.client.name());
            let content = self.client.send(conversation).await?;

            let parsed = wire::parse_calls(&content);
            for error in &parsed.errors {
                warn!("dropping unusable call block: {error}");
            }

            let message = conversation.assistant_message(&content);
            let message = if parsed.calls.is_empty() {
                message
            } else {
                message.with_calls(parsed.calls.clone())?
            };
            conversation.add_message(message)?;

            // NOTE: this is the exit condition
            if parsed.calls.is_empty() {
                debug!(
                    "no function calls in reply, done after {} round(s) ({:.2?})",
                    rounds,
                    started.elapsed()
                );
                return Ok(content);
            }

            info!("dispatching {} function call(s)", parsed.calls.len());
            let results = self.dispatcher.dispatch(conversation, parsed.calls).await?;

            let ids: Vec<String> = results.iter().map(|r| r.id.clone()).collect();
            let formatted = wire::format_results(&results)?;
            let message = conversation.tool_message(formatted, ids)?;
            conversation.add_message(message)?;

            rounds += 1;
            if let Some(max) = self.max_turns
                && rounds >= max
            {
                return Err(EngineError::MaxTurnsExceeded { rounds, max }.into());
            }
        }
    }
}
