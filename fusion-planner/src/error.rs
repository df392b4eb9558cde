use itertools::Itertools;

use crate::schema::SchemaCoordinate;
use crate::schema::SourceSchemaName;

/// Errors raised while loading a composite schema artifact.
///
/// These are reported once, when the schema is built, and never at request time.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("Composite schema artifact could not be parsed: {0}")]
    Parse(String),
    #[error("Type `{0}` is defined more than once")]
    DuplicateType(String),
    #[error("Source schema `{0}` is declared more than once")]
    DuplicateSource(SourceSchemaName),
    #[error("Schema has no type `{0}`")]
    UnknownType(String),
    #[error("Field `{coordinate}` references unknown source schema `{source_name}`")]
    UnknownSource {
        coordinate: SchemaCoordinate,
        source_name: SourceSchemaName,
    },
    #[error("Field `{0}` is not bound to any source schema")]
    MissingBinding(SchemaCoordinate),
    #[error("Invalid type reference `{0}`")]
    InvalidTypeReference(String),
    #[error("Invalid field set `{field_set}`: {message}")]
    InvalidFieldSet { field_set: String, message: String },
    #[error("Type `{type_name}` has no field `{field_name}`, referenced by {referenced_by}")]
    UnknownField {
        type_name: String,
        field_name: String,
        referenced_by: String,
    },
    #[error("Lookup `{field}` on `{type_name}` from `{source_name}` is invalid: {message}")]
    InvalidLookup {
        type_name: String,
        source_name: SourceSchemaName,
        field: String,
        message: String,
    },
    #[error("Requirements form a cycle: {}", .0.iter().join(" -> "))]
    CircularRequirement(Vec<SchemaCoordinate>),
    #[error("Schema has no `{0}` root type")]
    MissingRootType(&'static str),
}

/// Errors that prevent a query plan from being built.
///
/// No sub-operation is ever sent for an operation that fails to plan.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlanningError {
    #[error("Cannot resolve field `{coordinate}`: {reason}")]
    UnsatisfiableField {
        coordinate: SchemaCoordinate,
        reason: String,
    },
    #[error("Circular requirement: {}", .0.iter().join(" -> "))]
    CircularRequirement(Vec<SchemaCoordinate>),
    #[error("Schema has no type `{0}`")]
    UnknownType(String),
    #[error("Type `{type_name}` has no field `{field_name}`")]
    UnknownField {
        type_name: String,
        field_name: String,
    },
    #[error("Variable `${0}` is used but not defined by the operation")]
    UnknownVariable(String),
    #[error("Field `node` cannot be planned: {0}")]
    InvalidNodeField(String),
    #[error("Operation kind `{0}` is not supported by this schema")]
    UnsupportedOperation(String),
    #[error("Query plan is invalid: {0}")]
    InvalidPlan(String),
    #[error("Internal planner error: {0}")]
    Internal(String),
}

impl PlanningError {
    pub(crate) fn unsatisfiable(coordinate: SchemaCoordinate, reason: impl Into<String>) -> Self {
        Self::UnsatisfiableField {
            coordinate,
            reason: reason.into(),
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}
