//! Session management.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::model::{Backend, Conversation};
use crate::orchestrator::Orchestrator;

/// A conversation session bound to a shared orchestrator.
pub struct Session<B> {
    orchestrator: Arc<Orchestrator<B>>,
    conversation: Conversation,
}

impl<B: Backend> Session<B> {
    /// Start a new session seeded with the system prompt.
    pub fn new(orchestrator: Arc<Orchestrator<B>>, system_prompt: impl Into<String>) -> Self {
        let conversation = orchestrator.start_session(system_prompt);
        Self {
            orchestrator,
            conversation,
        }
    }

    /// Send a user message and get the assistant's answer.
    pub async fn chat(&mut self, user_input: &str) -> Result<String> {
        self.orchestrator.ask(&mut self.conversation, user_input).await
    }

    /// Like [`chat`](Self::chat), aborted once `cancel` fires.
    pub async fn chat_with_cancel(
        &mut self,
        user_input: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        self.orchestrator
            .ask_with_cancel(&mut self.conversation, user_input, cancel)
            .await
    }

    /// Like [`chat`](Self::chat), but renders a failure as text.
    pub async fn chat_or_message(&mut self, user_input: &str) -> String {
        match self.chat(user_input).await {
            Ok(answer) => answer,
            Err(e) => format!("Response failed because '{e}'"),
        }
    }

    /// Text of the latest message in the log.
    pub fn last_message(&self) -> &str {
        self.conversation.last_text()
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// End the session, handing back its log.
    pub fn end(self) -> Conversation {
        self.conversation
    }
}
