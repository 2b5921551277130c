//! Append-only conversation log.

use super::{Message, Usage};

/// An ordered, append-only message log owned by one session.
///
/// Created seeded with a system message. Only the orchestrator appends to
/// it; callers get read access.
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
    usage: Usage,
}

impl Conversation {
    /// Start a conversation with the given system prompt.
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
            usage: Usage::default(),
        }
    }

    /// All messages, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Always false: the system message is present from construction.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Text of the most recent message.
    pub fn last_text(&self) -> &str {
        self.messages.last().map(Message::text).unwrap_or_default()
    }

    /// Token usage summed over every model call made for this conversation.
    pub fn usage(&self) -> Usage {
        self.usage
    }

    pub(crate) fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub(crate) fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
    }

    pub(crate) fn record_usage(&mut self, usage: Usage) {
        self.usage += usage;
    }
}
