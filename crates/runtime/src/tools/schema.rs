//! Model-facing parameter schemas.
//!
//! The schema shape is fixed: an object with one string property per
//! declared parameter, every parameter required, properties in declaration
//! order. The same descriptor always produces the same bytes, which matters
//! because the schema set is resent on every round.

use serde::ser::{Serialize, SerializeMap, SerializeStruct, Serializer};

use super::{ToolDescriptor, ToolRegistry};

/// A single property of a parameter schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySchema {
    pub name: String,
    pub description: String,
}

/// JSON Schema object describing a tool's parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParameterSchema {
    properties: Vec<PropertySchema>,
}

impl ParameterSchema {
    /// Properties in declaration order.
    pub fn properties(&self) -> &[PropertySchema] {
        &self.properties
    }

    /// Names of the required parameters (all of them).
    pub fn required(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|p| p.name.as_str())
    }
}

struct Properties<'a>(&'a [PropertySchema]);

struct Property<'a>(&'a PropertySchema);

struct Required<'a>(&'a [PropertySchema]);

impl Serialize for ParameterSchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut schema = serializer.serialize_struct("ParameterSchema", 3)?;
        schema.serialize_field("type", "object")?;
        schema.serialize_field("properties", &Properties(&self.properties))?;
        schema.serialize_field("required", &Required(&self.properties))?;
        schema.end()
    }
}

impl Serialize for Properties<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for property in self.0 {
            map.serialize_entry(&property.name, &Property(property))?;
        }
        map.end()
    }
}

impl Serialize for Property<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut property = serializer.serialize_struct("Property", 2)?;
        property.serialize_field("type", "string")?;
        property.serialize_field("description", &self.0.description)?;
        property.end()
    }
}

impl Serialize for Required<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter().map(|p| p.name.as_str()))
    }
}

/// A tool as offered to the model for one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: ParameterSchema,
}

/// Build the parameter schema for one descriptor.
pub fn build(descriptor: &ToolDescriptor) -> ParameterSchema {
    let properties = descriptor
        .parameters()
        .iter()
        .map(|param| PropertySchema {
            name: param.name.clone(),
            description: param.description.clone(),
        })
        .collect();
    ParameterSchema { properties }
}

/// Build the schema set for every registered tool, in registration order.
pub fn build_all(registry: &ToolRegistry) -> Vec<ToolSchema> {
    registry
        .list()
        .iter()
        .map(|descriptor| ToolSchema {
            name: descriptor.name().to_string(),
            description: descriptor.description().to_string(),
            parameters: build(descriptor),
        })
        .collect()
}
