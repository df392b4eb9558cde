//! Serde model of the composite schema artifact produced by the composition step.

use indexmap::IndexMap;
use serde::Deserialize;
use serde::Serialize;

fn default_weight() -> f64 {
    1.0
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SchemaDefinition {
    pub sources: Vec<SourceDefinition>,
    pub types: Vec<TypeDefinitionInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutation_type: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SourceDefinition {
    pub name: String,
    /// Relative cost of one request to this source. Higher weights are avoided by the planner.
    #[serde(default = "default_weight")]
    pub weight: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum TypeDefinitionInput {
    #[serde(rename_all = "camelCase")]
    Object {
        name: String,
        #[serde(default)]
        implements: Vec<String>,
        fields: Vec<FieldInput>,
        #[serde(default)]
        lookups: Vec<LookupInput>,
    },
    #[serde(rename_all = "camelCase")]
    Interface {
        name: String,
        #[serde(default)]
        implements: Vec<String>,
        fields: Vec<FieldInput>,
    },
    Union {
        name: String,
        members: Vec<String>,
    },
    Scalar {
        name: String,
    },
    Enum {
        name: String,
        values: Vec<String>,
    },
}

impl TypeDefinitionInput {
    pub fn name(&self) -> &str {
        match self {
            Self::Object { name, .. }
            | Self::Interface { name, .. }
            | Self::Union { name, .. }
            | Self::Scalar { name }
            | Self::Enum { name, .. } => name,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FieldInput {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub arguments: Vec<ArgumentInput>,
    #[serde(default)]
    pub sources: Vec<FieldSourceInput>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ArgumentInput {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FieldSourceInput {
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires: Option<RequirementInput>,
    /// The source declares the field but cannot resolve it.
    #[serde(default)]
    pub external: bool,
}

/// Either a bare field set or a field set with argument mappings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequirementInput {
    FieldSet(String),
    Detailed {
        fields: String,
        /// Field argument name to the path, inside `fields`, whose value it receives.
        #[serde(default)]
        arguments: IndexMap<String, String>,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LookupInput {
    pub source: String,
    pub field: String,
    pub arguments: Vec<LookupArgumentInput>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LookupArgumentInput {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    /// Path of the key field on the entity that supplies this argument.
    pub path: String,
}
