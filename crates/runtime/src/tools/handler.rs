//! Tool handler trait.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use super::{BoundArguments, ToolError};

/// The executable behavior behind a tool.
///
/// A handler receives a freshly bound set of arguments for every call and
/// returns the text handed back to the model. This is the boundary between
/// the dispatch loop and side effects.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn invoke(&self, arguments: &BoundArguments) -> Result<String, ToolError>;
}

/// Type alias for a shared handler reference.
pub type SharedHandler = Arc<dyn ToolHandler>;

/// Handler backed by an async closure.
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(BoundArguments) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, ToolError>> + Send,
{
    async fn invoke(&self, arguments: &BoundArguments) -> Result<String, ToolError> {
        (self.0)(arguments.clone()).await
    }
}

/// Wrap an async closure as a [`ToolHandler`].
///
/// ```ignore
/// let echo = handler_fn(|args| async move { Ok(args.get("Text").to_string()) });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(BoundArguments) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, ToolError>> + Send,
{
    FnHandler(f)
}
