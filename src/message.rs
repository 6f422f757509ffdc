//! Messages and the append-only transcript

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Source name used for the seeded task message
pub const USER_SOURCE: &str = "user";

/// Source name used for run-level notices
pub const SYSTEM_SOURCE: &str = "system";

/// What a message represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Normal,
    InputRequest,
    Termination,
    Error,
}

/// A single immutable message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Name of the participant that produced it
    pub source: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub kind: MessageKind,
}

impl Message {
    pub fn new(source: impl Into<String>, content: impl Into<String>, kind: MessageKind) -> Self {
        Self {
            source: source.into(),
            content: content.into(),
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn normal(source: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(source, content, MessageKind::Normal)
    }

    /// The task message seeded at the start of a conversation
    pub fn task(content: impl Into<String>) -> Self {
        Self::new(USER_SOURCE, content, MessageKind::Normal)
    }

    /// Same message with a different kind, keeping the original timestamp
    pub fn with_kind(self, kind: MessageKind) -> Self {
        Self { kind, ..self }
    }

    /// Case-sensitive substring match
    pub fn mentions(&self, marker: &str) -> bool {
        self.content.contains(marker)
    }
}

/// Ordered history of one conversation.
///
/// Only the owning conversation appends; participants see it through `&Transcript`.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Whether any message was produced by `source`
    pub fn has_source(&self, source: &str) -> bool {
        self.messages.iter().any(|m| m.source == source)
    }
}
