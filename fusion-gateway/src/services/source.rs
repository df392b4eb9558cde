//! Requests to one source schema, and the responses they produce.

use fusion_planner::schema::SourceSchemaName;
use tokio_util::sync::CancellationToken;
use tower::BoxError;

use crate::graphql;
use crate::json_ext::Object;

pub type BoxService = tower::util::BoxService<Request, Response, BoxError>;
pub type ServiceResult = Result<Response, BoxError>;

/// One GraphQL operation sent to a source schema.
///
/// The transport behind the service decides how it travels: HTTP, in-process, or anything else.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct Request {
    /// The source schema the operation is for.
    pub source_name: SourceSchemaName,

    /// The printed GraphQL document.
    pub document: String,

    /// Name of the operation in `document`, when the client operation was named.
    pub operation_name: Option<String>,

    /// Variables of the operation, in the order the document declares them.
    pub variables: Object,

    /// Cancelled when the client request is abandoned.
    pub cancellation: CancellationToken,
}

#[buildstructor::buildstructor]
impl Request {
    /// This is the constructor (or builder) to use when constructing a real Request.
    ///
    /// Required parameters are required in non-testing code to create a Request.
    #[builder(visibility = "pub")]
    fn new(
        source_name: SourceSchemaName,
        document: String,
        operation_name: Option<String>,
        variables: Option<Object>,
        cancellation: Option<CancellationToken>,
    ) -> Self {
        Self {
            source_name,
            document,
            operation_name,
            variables: variables.unwrap_or_default(),
            cancellation: cancellation.unwrap_or_default(),
        }
    }
}

/// The GraphQL response of a source schema.
#[derive(Clone, Debug, Default)]
#[non_exhaustive]
pub struct Response {
    pub response: graphql::Response,
}

#[buildstructor::buildstructor]
impl Response {
    /// This is the constructor (or builder) to use when constructing a real Response.
    #[builder(visibility = "pub")]
    fn new(
        data: Option<serde_json::Value>,
        errors: Vec<graphql::Error>,
        extensions: Option<Object>,
    ) -> Self {
        Self {
            response: graphql::Response {
                data,
                errors,
                extensions: extensions.unwrap_or_default(),
            },
        }
    }
}

impl From<graphql::Response> for Response {
    fn from(response: graphql::Response) -> Self {
        Self { response }
    }
}
