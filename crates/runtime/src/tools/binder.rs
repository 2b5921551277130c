//! Argument binding and tool invocation.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ToolDescriptor, ToolError};

/// Flat name → text arguments supplied by the model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Arguments(BTreeMap<String, String>);

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Flatten a JSON object into text arguments.
    ///
    /// Strings are taken verbatim, `null` becomes empty and every other value
    /// keeps its JSON text. Anything but an object yields no arguments.
    pub fn from_json(value: &Value) -> Self {
        let Value::Object(map) = value else {
            return Self::default();
        };
        let args = map
            .iter()
            .map(|(name, value)| {
                let text = match value {
                    Value::String(s) => s.clone(),
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                (name.clone(), text)
            })
            .collect();
        Self(args)
    }

    /// Parse the model's raw argument string.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::default();
        }
        match serde_json::from_str::<Value>(raw) {
            Ok(value @ Value::Object(_)) => Self::from_json(&value),
            Ok(_) | Err(_) => {
                tracing::warn!(arguments = raw, "tool arguments are not a JSON object, ignoring");
                Self::default()
            }
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Arguments {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Parameter values bound for one invocation, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundArguments {
    values: Vec<(String, String)>,
}

impl BoundArguments {
    /// Value of a declared parameter; empty when the model did not supply it.
    pub fn get(&self, name: &str) -> &str {
        self.values
            .iter()
            .find(|(param, _)| param == name)
            .map(|(_, value)| value.as_str())
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// A tool with its parameters populated, ready to execute.
#[derive(Debug, Clone)]
pub struct BoundInvocation {
    descriptor: Arc<ToolDescriptor>,
    arguments: BoundArguments,
}

impl BoundInvocation {
    pub fn tool_name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn arguments(&self) -> &BoundArguments {
        &self.arguments
    }
}

/// Result text of an invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    Success(String),
    Failure(String),
}

impl ToolOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Success(text) | Self::Failure(text) => text,
        }
    }
}

/// Bind raw arguments to a descriptor's declared parameters.
///
/// Missing parameters bind to an empty value and undeclared keys are
/// ignored; binding never fails.
pub fn bind(descriptor: &Arc<ToolDescriptor>, raw: &Arguments) -> BoundInvocation {
    let values = descriptor
        .parameters()
        .iter()
        .map(|param| {
            let value = raw.get(&param.name).unwrap_or_default().to_string();
            (param.name.clone(), value)
        })
        .collect();

    BoundInvocation {
        descriptor: Arc::clone(descriptor),
        arguments: BoundArguments { values },
    }
}

/// Execute a bound invocation.
///
/// Errors, panics and timeouts inside the tool become a failure text so the
/// conversation can continue.
pub async fn invoke(bound: &BoundInvocation, timeout: Option<Duration>) -> ToolOutcome {
    let name = bound.tool_name();
    let call = AssertUnwindSafe(bound.descriptor.handler().invoke(&bound.arguments)).catch_unwind();

    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Ok(Err(ToolError::Timeout(limit.as_millis() as u64))),
        },
        None => call.await,
    };

    let result = result.unwrap_or_else(|panic| Err(ToolError::Panicked(panic_message(&*panic))));

    match result {
        Ok(text) => ToolOutcome::Success(text),
        Err(e) => {
            tracing::warn!(tool = name, error = %e, "tool invocation failed");
            ToolOutcome::Failure(format!("Tool '{name}' failed: {e}"))
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
