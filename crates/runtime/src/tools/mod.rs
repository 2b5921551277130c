//! Tool definitions, registry, schemas and dispatch.

pub mod binder;
mod descriptor;
pub mod errors;
mod handler;
mod registry;
pub mod schema;

pub use binder::{Arguments, BoundArguments, BoundInvocation, ToolOutcome, bind, invoke};
pub use descriptor::{Parameter, ParameterKind, ToolDefinition, ToolDescriptor};
pub use errors::{DescriptorInvalid, RegistrationError, ToolError};
pub use handler::{FnHandler, SharedHandler, ToolHandler, handler_fn};
pub use registry::ToolRegistry;
pub use schema::{ParameterSchema, PropertySchema, ToolSchema};
