//! Gateway errors.
use displaydoc::Display;
use fusion_planner::PlanningError;
use fusion_planner::SchemaError;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub use crate::configuration::ConfigurationError;
pub use crate::graphql::Error;
use crate::graphql::ErrorExtension;
use crate::graphql::Response;
use crate::json_ext::Object;
use crate::json_ext::Path;

/// Error types for execution.
///
/// Note that these are not actually returned to the client, but are instead converted to JSON for
/// [`struct@Error`].
#[derive(Error, Display, Debug, Clone, Serialize, Eq, PartialEq)]
#[serde(untagged)]
#[ignore_extra_doc_attributes]
#[non_exhaustive]
pub enum FetchError {
    /// request to source '{service}' failed: {reason}
    ///
    /// note that this relates to a transport error and not a GraphQL error
    SourceRequestFailed {
        /// The source that failed.
        service: String,

        /// The reason the request failed.
        reason: String,
    },

    /// source '{service}' response was malformed: {reason}
    SourceResponseMalformed {
        /// The source that responded with the malformed response.
        service: String,

        /// What was wrong with the response.
        reason: String,
    },

    /// no transport is registered for source '{service}'
    UnknownSource {
        /// The source the plan refers to.
        service: String,
    },

    /// no lookup branch matches discriminator value '{discriminator}'
    NoMatchingBranch {
        /// The evaluated discriminator, or the raw id when it could not be decoded.
        discriminator: String,
    },

    /// a value required by this field could not be fetched by step {step}
    DependencyFailed {
        /// The failed step that should have produced the value.
        step: usize,
    },

    /// execution was cancelled before it completed
    ExecutionCancelled,

    /// query plan cannot be executed: {reason}
    InvalidQueryPlan {
        /// What is wrong with the plan.
        reason: String,
    },
}

impl FetchError {
    /// Convert the fetch error to a GraphQL error.
    pub fn to_graphql_error(&self, path: Option<Path>) -> Error {
        let mut extensions = match serde_json::to_value(self) {
            Ok(Value::Object(object)) => object,
            _ => Object::new(),
        };
        extensions
            .entry("code")
            .or_insert_with(|| self.extension_code().into());

        Error::builder()
            .message(self.to_string())
            .and_path(path)
            .extensions(extensions)
            .build()
    }

    /// Convert the error to an appropriate response.
    pub fn to_response(&self) -> Response {
        Response {
            data: Some(Value::Null),
            errors: vec![self.to_graphql_error(None)],
            ..Response::default()
        }
    }
}

impl ErrorExtension for FetchError {
    fn extension_code(&self) -> String {
        match self {
            FetchError::SourceRequestFailed { .. } => "SOURCE_REQUEST_FAILED",
            FetchError::SourceResponseMalformed { .. } => "SOURCE_RESPONSE_MALFORMED",
            FetchError::UnknownSource { .. } => "UNKNOWN_SOURCE",
            FetchError::NoMatchingBranch { .. } => "NO_MATCHING_BRANCH",
            FetchError::DependencyFailed { .. } => "DEPENDENCY_FAILED",
            FetchError::ExecutionCancelled => "EXECUTION_CANCELLED",
            FetchError::InvalidQueryPlan { .. } => "INVALID_QUERY_PLAN",
        }
        .to_string()
    }
}

/// Errors found while projecting the assembled data onto the client's selection.
#[derive(Error, Display, Debug, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum CompositionError {
    /// Cannot return null for non-nullable field {type_name}.{field_name}
    NonNullViolation {
        /// The type declaring the field.
        type_name: String,

        /// The field whose value was null.
        field_name: String,
    },

    /// Cannot return null for non-nullable array element of type {item_type} at index {index}
    NonNullListItem {
        /// The declared type of the list items.
        item_type: String,

        /// Index of the null item.
        index: usize,
    },
}

impl CompositionError {
    pub fn to_graphql_error(&self, path: Path) -> Error {
        Error::builder()
            .message(self.to_string())
            .path(path)
            .extension_code(self.extension_code())
            .build()
    }
}

impl ErrorExtension for CompositionError {
    fn extension_code(&self) -> String {
        match self {
            CompositionError::NonNullViolation { .. } | CompositionError::NonNullListItem { .. } => {
                "NON_NULL_VIOLATION"
            }
        }
        .to_string()
    }
}

/// Errors the gateway reports before executing anything.
#[derive(Error, Display, Debug)]
#[non_exhaustive]
pub enum GatewayError {
    /// query could not be planned: {0}
    QueryPlanning(#[from] PlanningError),

    /// composite schema could not be loaded: {0}
    Schema(#[from] SchemaError),

    /// invalid configuration: {0}
    Configuration(#[from] ConfigurationError),

    /// operation name '{requested}' does not match the operation '{actual}'
    OperationNameMismatch {
        /// The name the request asked for.
        requested: String,
        /// The name of the operation supplied.
        actual: String,
    },
}

impl GatewayError {
    pub fn to_graphql_error(&self) -> Error {
        Error::builder()
            .message(self.to_string())
            .extension_code(self.extension_code())
            .build()
    }
}

impl ErrorExtension for GatewayError {
    fn extension_code(&self) -> String {
        match self {
            GatewayError::QueryPlanning(_) => "QUERY_PLANNING_FAILED",
            GatewayError::Schema(_) => "INVALID_SCHEMA",
            GatewayError::Configuration(_) => "INVALID_CONFIGURATION",
            GatewayError::OperationNameMismatch { .. } => "OPERATION_NAME_MISMATCH",
        }
        .to_string()
    }
}
