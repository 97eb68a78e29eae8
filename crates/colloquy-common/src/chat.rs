//! Conversation and message management for function-calling sessions.
//!
//! The two central types are [`Message`] and [`Conversation`]. A conversation
//! is an append-only, ordered message history plus the set of function-call
//! ids that have been dispatched but not yet resolved. One driver owns each
//! conversation; there is no ambient global state, so concurrent
//! conversations stay isolated.
//!
//! # Message roles
//!
//! - **System**: instructions and context for the model
//! - **User**: input from the end user
//! - **Assistant**: model output, possibly carrying parsed function calls
//! - **Tool**: formatted function results fed back to the model
//!
//! # Pending-call bookkeeping
//!
//! The dispatcher records ids before execution and resolves them as results
//! arrive:
//!
//! ```
//! use colloquy_common::chat::{Conversation, StateError};
//!
//! let mut conv = Conversation::new();
//! conv.record_dispatch(["call-1".to_string()]).unwrap();
//! assert!(conv.pending_ids().contains("call-1"));
//!
//! conv.record_resolution("call-1").unwrap();
//! assert!(conv.pending_ids().is_empty());
//!
//! // A second resolution is a protocol violation, not a silent no-op.
//! assert_eq!(
//!     conv.record_resolution("call-1"),
//!     Err(StateError::UnknownPendingId("call-1".to_string()))
//! );
//! ```
//!
//! Misuse of the pending set signals an integration bug in the caller, so
//! those failures are typed ([`StateError`]) rather than stringly wrapped.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::calls::FunctionCall;

/// Consistency violations in conversation state.
///
/// These indicate a caller bug (bookkeeping misuse), not a runtime condition
/// the model should reason about, and are therefore surfaced as `Err` rather
/// than as result payloads.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum StateError {
    /// An id passed to [`Conversation::record_dispatch`] is already pending.
    #[error("call id '{0}' is already pending")]
    DuplicatePendingId(String),

    /// An id passed to [`Conversation::record_resolution`] is not pending.
    ///
    /// Also raised when a misbehaving executor delivers a second result for
    /// an id that was already resolved.
    #[error("no pending call with id '{0}'")]
    UnknownPendingId(String),

    /// A message was added to a conversation it does not belong to.
    #[error("message conversation id {message} does not match conversation {conversation}")]
    ConversationMismatch {
        /// The `conversation_id` carried by the rejected message.
        message: Uuid,
        /// The id of the conversation the message was added to.
        conversation: Uuid,
    },

    /// Parsed function calls were attached to a non-assistant message.
    #[error("function calls can only be attached to assistant messages, found {0:?}")]
    CallsRequireAssistant(MessageRole),

    /// A tool message was built without any result ids to answer for.
    #[error("tool messages must reference at least one result id")]
    EmptyResultIds,
}

/// The role of a message sender.
///
/// Serialized as lowercase strings (`"system"`, `"user"`, `"assistant"`,
/// `"tool"`).
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum MessageRole {
    /// System-level instructions or context.
    #[serde(rename = "system")]
    System,

    /// Input from the end user.
    #[serde(rename = "user")]
    User,

    /// Model output; the only role that may carry parsed function calls.
    #[serde(rename = "assistant")]
    Assistant,

    /// Formatted function results re-injected into the conversation.
    #[serde(rename = "tool")]
    Tool,
}

/// An out-of-band payload attached to a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    /// Display name of the attachment.
    pub name: String,
    /// MIME type of `content`.
    pub media_type: String,
    /// The attachment body, encoded as text.
    pub content: String,
}

/// A single message in a conversation.
///
/// Construct with the role constructors ([`Message::system`],
/// [`Message::user`], [`Message::assistant`], [`Message::tool`]) or the
/// builder:
///
/// ```
/// use colloquy_common::chat::{Message, MessageRole};
/// use uuid::Uuid;
///
/// let msg = Message::builder()
///     .conversation_id(Uuid::new_v4())
///     .role(MessageRole::User)
///     .content("What is the weather in Pune right now?".to_string())
///     .build();
/// ```
#[derive(Debug, Serialize, Deserialize, Clone, TypedBuilder)]
pub struct Message {
    /// Unique identifier for this message.
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,

    /// Id of the conversation this message belongs to. Enforced by
    /// [`Conversation::add_message`].
    pub conversation_id: Uuid,

    /// The role of the message sender.
    pub role: MessageRole,

    /// The text content. For tool messages this is the formatted sequence of
    /// result blocks.
    pub content: String,

    /// Application-specific metadata.
    #[builder(default)]
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,

    /// Optional out-of-band payloads.
    #[builder(default)]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,

    /// When this message was created. Append order is authoritative for
    /// display; the timestamp is diagnostic.
    #[builder(default = Utc::now())]
    pub timestamp: DateTime<Utc>,

    /// Function calls parsed out of this message (assistant messages only).
    ///
    /// `SmallVec` keeps the common one-or-two-call case off the heap.
    #[builder(default)]
    #[serde(default, skip_serializing_if = "SmallVec::is_empty")]
    pub calls: SmallVec<[FunctionCall; 2]>,

    /// Ids of the results this message answers (tool messages only).
    #[builder(default)]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub result_ids: Vec<String>,
}

impl Message {
    /// Creates a new message with the given role and content.
    pub fn new(conversation_id: Uuid, role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            role,
            content: content.into(),
            metadata: HashMap::new(),
            attachments: Vec::new(),
            timestamp: Utc::now(),
            calls: SmallVec::new(),
            result_ids: Vec::new(),
        }
    }

    /// Creates a system message.
    pub fn system(conversation_id: Uuid, content: impl Into<String>) -> Self {
        Self::new(conversation_id, MessageRole::System, content)
    }

    /// Creates a user message.
    pub fn user(conversation_id: Uuid, content: impl Into<String>) -> Self {
        Self::new(conversation_id, MessageRole::User, content)
    }

    /// Creates an assistant message.
    pub fn assistant(conversation_id: Uuid, content: impl Into<String>) -> Self {
        Self::new(conversation_id, MessageRole::Assistant, content)
    }

    /// Creates a tool message carrying formatted results for `result_ids`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::EmptyResultIds`] if `result_ids` is empty.
    pub fn tool(
        conversation_id: Uuid,
        content: impl Into<String>,
        result_ids: impl IntoIterator<Item = String>,
    ) -> Result<Self, StateError> {
        let result_ids: Vec<String> = result_ids.into_iter().collect();
        if result_ids.is_empty() {
            return Err(StateError::EmptyResultIds);
        }
        let mut msg = Self::new(conversation_id, MessageRole::Tool, content);
        msg.result_ids = result_ids;
        Ok(msg)
    }

    /// Attaches parsed function calls to this message.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::CallsRequireAssistant`] unless this is an
    /// assistant message.
    pub fn with_calls(
        mut self,
        calls: impl Into<SmallVec<[FunctionCall; 2]>>,
    ) -> Result<Self, StateError> {
        if self.role != MessageRole::Assistant {
            return Err(StateError::CallsRequireAssistant(self.role));
        }
        self.calls = calls.into();
        Ok(self)
    }

    /// Adds a metadata key-value pair.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Adds an attachment.
    #[must_use]
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

/// The lifecycle status of a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConversationStatus {
    /// The conversation is ongoing and accepts new messages.
    #[serde(rename = "active")]
    Active,
    /// Temporarily on hold.
    #[serde(rename = "paused")]
    Paused,
    /// Completed and preserved.
    #[serde(rename = "archived")]
    Archived,
    /// Marked for deletion.
    #[serde(rename = "deleted")]
    Deleted,
}

/// A conversation: ordered message history plus unresolved call ids.
///
/// Messages are append-only; once added they are never reordered or mutated.
/// Insertion order is the causal/display order even when result arrival order
/// differs from dispatch order.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Conversation {
    /// Unique identifier for this conversation.
    pub id: Uuid,

    /// Optional human-readable title.
    pub title: Option<String>,

    /// Optional longer description.
    pub description: Option<String>,

    /// When this conversation was created.
    pub created_at: DateTime<Utc>,

    /// When this conversation was last modified.
    pub updated_at: DateTime<Utc>,

    /// Application-specific metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,

    /// Current lifecycle status.
    pub status: ConversationStatus,

    /// Messages in append order.
    pub messages: Vec<Message>,

    /// Call ids dispatched but not yet resolved.
    ///
    /// Mutated only through [`record_dispatch`](Self::record_dispatch) and
    /// [`record_resolution`](Self::record_resolution); the `&mut self`
    /// receivers serialize those mutations.
    #[serde(default, skip_serializing_if = "HashSet::is_empty")]
    pending: HashSet<String>,
}

impl Conversation {
    /// Creates a new active conversation with a generated id.
    #[must_use]
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: None,
            description: None,
            created_at: now,
            updated_at: now,
            metadata: HashMap::new(),
            status: ConversationStatus::Active,
            messages: Vec::new(),
            pending: HashSet::new(),
        }
    }

    /// Sets the title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Changes the lifecycle status and updates the timestamp.
    pub fn set_status(&mut self, status: ConversationStatus) {
        self.status = status;
        self.touch();
    }

    /// Updates `updated_at` to the current time.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Appends a message. Never reorders or mutates prior entries.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::ConversationMismatch`] if the message carries a
    /// different `conversation_id`.
    pub fn add_message(&mut self, message: Message) -> Result<(), StateError> {
        if message.conversation_id != self.id {
            return Err(StateError::ConversationMismatch {
                message: message.conversation_id,
                conversation: self.id,
            });
        }
        self.messages.push(message);
        self.touch();
        Ok(())
    }

    /// Returns the messages in append order.
    #[must_use]
    pub fn get_messages(&self) -> &[Message] {
        &self.messages
    }

    /// Creates a user message bound to this conversation.
    pub fn user_message(&self, content: impl Into<String>) -> Message {
        Message::user(self.id, content)
    }

    /// Creates an assistant message bound to this conversation.
    pub fn assistant_message(&self, content: impl Into<String>) -> Message {
        Message::assistant(self.id, content)
    }

    /// Creates a system message bound to this conversation.
    pub fn system_message(&self, content: impl Into<String>) -> Message {
        Message::system(self.id, content)
    }

    /// Creates a tool message bound to this conversation.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::EmptyResultIds`] if `result_ids` is empty.
    pub fn tool_message(
        &self,
        content: impl Into<String>,
        result_ids: impl IntoIterator<Item = String>,
    ) -> Result<Message, StateError> {
        Message::tool(self.id, content, result_ids)
    }

    /// Marks `ids` as dispatched-and-unresolved.
    ///
    /// All-or-nothing: if any id is already pending (or repeated within
    /// `ids`), nothing is inserted.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::DuplicatePendingId`] naming the first clash.
    pub fn record_dispatch(
        &mut self,
        ids: impl IntoIterator<Item = String>,
    ) -> Result<(), StateError> {
        let ids: Vec<String> = ids.into_iter().collect();
        let mut batch = HashSet::with_capacity(ids.len());
        for id in &ids {
            if self.pending.contains(id) || !batch.insert(id.clone()) {
                return Err(StateError::DuplicatePendingId(id.clone()));
            }
        }
        self.pending.extend(ids);
        self.touch();
        Ok(())
    }

    /// Resolves a previously dispatched call id.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::UnknownPendingId`] if the id is not pending —
    /// a result arrived for a call that was never dispatched, or was already
    /// resolved.
    pub fn record_resolution(&mut self, id: &str) -> Result<(), StateError> {
        if !self.pending.remove(id) {
            return Err(StateError::UnknownPendingId(id.to_string()));
        }
        self.touch();
        Ok(())
    }

    /// Snapshot of the unresolved call ids, for diagnostics and timeout
    /// sweeps.
    #[must_use]
    pub fn pending_ids(&self) -> HashSet<String> {
        self.pending.clone()
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
