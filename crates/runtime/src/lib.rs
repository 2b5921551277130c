//! Tool-calling conversation runtime.
//!
//! This crate lets a language model call host-defined tools in the middle of
//! a conversation: it validates and registers tools, exposes them to the
//! model as parameter schemas, executes the calls the model requests, and
//! feeds the results back until the model produces an answer.
//!
//! # Overview
//!
//! - **ToolRegistry**: validated, uniquely named tools, shared read-only.
//! - **Backend**: the model connector trait (OpenAI-compatible adapter
//!   included).
//! - **Orchestrator**: the round loop and its finish-reason state machine.
//! - **Session**: one conversation bound to a shared orchestrator.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use runtime::{OpenAiBackend, Orchestrator, Session, ToolDefinition, ToolRegistry, handler_fn};
//!
//! # async fn example() -> runtime::Result<()> {
//! let mut registry = ToolRegistry::new();
//! registry.register_all([ToolDefinition::new("GetWeather", "Current temperature of a city")
//!     .parameter("Location", "The name of a city")
//!     .handler(handler_fn(|args| async move { Ok(format!("18°C in {}", args.get("Location"))) }))]);
//!
//! let backend = OpenAiBackend::builder("sk-...", "gpt-4o").build();
//! let orchestrator = Arc::new(Orchestrator::new(backend, Arc::new(registry)));
//!
//! let mut session = Session::new(orchestrator, "Answer briefly.");
//! let answer = session.chat("What's the weather in Linz?").await?;
//! println!("{answer}");
//! # Ok(())
//! # }
//! ```

mod error;
pub mod model;
pub mod orchestrator;
pub mod providers;
mod session;
pub mod tools;

// Error types
pub use error::{Error, Result};

// Conversation types and connector trait
pub use model::{
    Backend, Conversation, FinishReason, Message, ModelError, ModelRequest, ModelResponse,
    ToolCall, Usage,
};

// Tool definitions and registry
pub use tools::{
    Arguments, BoundArguments, DescriptorInvalid, RegistrationError, ToolDefinition,
    ToolDescriptor, ToolError, ToolHandler, ToolRegistry, handler_fn,
};

// Orchestration
pub use orchestrator::{Orchestrator, OrchestratorConfig, UNKNOWN_TOOL_RESULT};
pub use session::Session;

// Providers
pub use providers::OpenAiBackend;
