//! Conversation types and the model connector trait.

mod conversation;
pub mod errors;
pub mod types;

pub use conversation::Conversation;
pub use errors::ModelError;
pub use types::{
    Backend, FinishReason, Message, ModelRequest, ModelResponse, ToolCall, Usage,
};
