//! Tool definitions and their validation.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{DescriptorInvalid, SharedHandler, ToolHandler};

/// Value kind of a declared parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    #[default]
    Text,
    Number,
    Integer,
    Boolean,
}

/// A named parameter exposed to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub kind: ParameterKind,
}

/// A raw, unvalidated tool candidate.
///
/// Hosts assemble these (by hand or from a manifest) and pass them to the
/// registry, which validates them into [`ToolDescriptor`]s.
#[derive(Clone)]
pub struct ToolDefinition {
    name: String,
    description: String,
    parameters: Vec<Parameter>,
    handlers: Vec<SharedHandler>,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
            handlers: Vec::new(),
        }
    }

    /// Declare a text parameter.
    pub fn parameter(self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.typed_parameter(name, description, ParameterKind::Text)
    }

    /// Declare a parameter of an explicit kind.
    pub fn typed_parameter(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        kind: ParameterKind,
    ) -> Self {
        self.parameters.push(Parameter {
            name: name.into(),
            description: description.into(),
            kind,
        });
        self
    }

    /// Attach an invocation handler.
    pub fn handler(self, handler: impl ToolHandler + 'static) -> Self {
        self.shared_handler(Arc::new(handler))
    }

    /// Attach an already shared invocation handler.
    pub fn shared_handler(mut self, handler: SharedHandler) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// A validated, immutable tool.
#[derive(Clone)]
pub struct ToolDescriptor {
    name: String,
    description: String,
    parameters: Vec<Parameter>,
    handler: SharedHandler,
}

impl ToolDescriptor {
    /// Validate a candidate definition.
    ///
    /// Requires a non-empty name and description, exactly one handler, and
    /// uniquely named text parameters.
    pub fn validate(definition: ToolDefinition) -> Result<Self, DescriptorInvalid> {
        let ToolDefinition {
            name,
            description,
            parameters,
            mut handlers,
        } = definition;

        if name.trim().is_empty() {
            return Err(DescriptorInvalid::EmptyName);
        }
        if description.trim().is_empty() {
            return Err(DescriptorInvalid::EmptyDescription);
        }

        let handler = match handlers.len() {
            0 => return Err(DescriptorInvalid::MissingInvocationHandle),
            1 => handlers.remove(0),
            n => return Err(DescriptorInvalid::AmbiguousInvocationHandle(n)),
        };

        let mut seen = HashSet::new();
        for param in &parameters {
            if param.name.trim().is_empty() {
                return Err(DescriptorInvalid::EmptyParameterName);
            }
            if !seen.insert(param.name.as_str()) {
                return Err(DescriptorInvalid::DuplicateParameter(param.name.clone()));
            }
            if param.kind != ParameterKind::Text {
                return Err(DescriptorInvalid::NonTextParameter(param.name.clone()));
            }
        }

        Ok(Self {
            name,
            description,
            parameters,
            handler,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Declared parameters, in declaration order.
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub(crate) fn handler(&self) -> &dyn ToolHandler {
        self.handler.as_ref()
    }
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}
