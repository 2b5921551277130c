//! Tool registry.

use std::collections::HashMap;
use std::sync::Arc;

use super::{RegistrationError, ToolDefinition, ToolDescriptor};

/// Validated tools, unique by name, in registration order.
///
/// Built once before any conversation starts and shared read-only
/// afterwards (typically behind an `Arc`).
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<ToolDescriptor>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and register a tool.
    ///
    /// The first registration of a name wins; later ones are rejected.
    pub fn register(&mut self, definition: ToolDefinition) -> Result<(), RegistrationError> {
        let tool = definition.name().to_string();
        let descriptor = ToolDescriptor::validate(definition)
            .map_err(|reason| RegistrationError::DescriptorInvalid { tool, reason })?;

        if self.index.contains_key(descriptor.name()) {
            return Err(RegistrationError::DuplicateToolName(
                descriptor.name().to_string(),
            ));
        }

        self.index
            .insert(descriptor.name().to_string(), self.tools.len());
        self.tools.push(Arc::new(descriptor));
        Ok(())
    }

    /// Register every candidate, skipping the ones that fail.
    ///
    /// Returns the rejected candidates' errors; each is also logged.
    pub fn register_all(
        &mut self,
        definitions: impl IntoIterator<Item = ToolDefinition>,
    ) -> Vec<RegistrationError> {
        let definitions: Vec<_> = definitions.into_iter().collect();
        tracing::debug!(count = definitions.len(), "tools found, registering");

        let mut rejected = Vec::new();
        for definition in definitions {
            let name = definition.name().to_string();
            match self.register(definition) {
                Ok(()) => tracing::debug!(tool = %name, "registered tool"),
                Err(e) => {
                    tracing::warn!(tool = %name, error = %e, "skipping tool");
                    rejected.push(e);
                }
            }
        }

        tracing::info!(
            registered = self.tools.len(),
            rejected = rejected.len(),
            "tool registry ready"
        );
        rejected
    }

    /// Look up a tool by name.
    pub fn find(&self, name: &str) -> Option<&Arc<ToolDescriptor>> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    /// All tools in registration order.
    pub fn list(&self) -> &[Arc<ToolDescriptor>] {
        &self.tools
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.iter().map(|t| t.name())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
