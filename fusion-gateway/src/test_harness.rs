//! In-memory source schemas, for tests and benchmarks.
//!
//! A [`MockSource`] answers canned responses keyed by the document it receives, so a whole
//! [`Gateway`][crate::Gateway] can be exercised without any network:
//!
//! ```ignore
//! let catalog = MockSource::new()
//!     .with_json("query { products { id } }", json!({ "data": { "products": [] } }));
//! let services = SourceServices::new().with("catalog", catalog);
//! ```

use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use tower::BoxError;
use tower::Service;

use crate::graphql;
use crate::json_ext::Object;
use crate::services::SourceRequest;
use crate::services::SourceResponse;

#[derive(Clone, Debug)]
struct Mock {
    document: String,
    variables: Option<Object>,
    response: MockResponse,
}

#[derive(Clone, Debug)]
enum MockResponse {
    Response(graphql::Response),
    Failure(String),
}

/// A source schema answering canned responses.
#[derive(Clone, Debug, Default)]
pub struct MockSource {
    // using an arc to improve efficiency when service is cloned
    mocks: Arc<Vec<Mock>>,
    delay: Option<Duration>,
    log: CallLog,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers `response`, a GraphQL response in JSON, to every request for `document`.
    ///
    /// Panics if `response` is not a GraphQL response.
    pub fn with_json(self, document: &str, response: Value) -> Self {
        self.with_mock(document, None, MockResponse::Response(parse_response(response)))
    }

    /// Answers `response` to requests for `document` with exactly these `variables`.
    ///
    /// Mocks with variables are preferred over mocks without.
    pub fn with_json_for_variables(self, document: &str, variables: Value, response: Value) -> Self {
        let variables = match variables {
            Value::Object(variables) => variables,
            other => panic!("mock variables must be an object, got {other}"),
        };
        self.with_mock(
            document,
            Some(variables),
            MockResponse::Response(parse_response(response)),
        )
    }

    /// Fails every request for `document` as a transport error would.
    pub fn with_failure(self, document: &str, reason: &str) -> Self {
        self.with_mock(document, None, MockResponse::Failure(reason.to_string()))
    }

    /// Delays every response.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Records calls into `log`, usually shared with other sources.
    pub fn with_call_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    pub fn call_log(&self) -> &CallLog {
        &self.log
    }

    fn with_mock(mut self, document: &str, variables: Option<Object>, response: MockResponse) -> Self {
        Arc::make_mut(&mut self.mocks).push(Mock {
            document: document.to_string(),
            variables,
            response,
        });
        self
    }

    fn find(&self, request: &SourceRequest) -> Option<&MockResponse> {
        let mut candidates = self
            .mocks
            .iter()
            .filter(|mock| mock.document == request.document);
        let matching = candidates
            .clone()
            .find(|mock| mock.variables.as_ref() == Some(&request.variables));
        matching
            .or_else(|| candidates.find(|mock| mock.variables.is_none()))
            .map(|mock| &mock.response)
    }
}

fn parse_response(response: Value) -> graphql::Response {
    serde_json::from_value(response).expect("mock response is a graphql response")
}

impl Service<SourceRequest> for MockSource {
    type Response = SourceResponse;

    type Error = BoxError;

    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: SourceRequest) -> Self::Future {
        let response = self.find(&request).cloned();
        let delay = self.delay;
        let log = self.log.clone();
        async move {
            let call = Call {
                source: request.source_name.to_string(),
                document: request.document.clone(),
                variables: request.variables.clone(),
            };
            log.push(CallEvent::Started(call.clone()));
            if let Some(delay) = delay {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = request.cancellation.cancelled() => {
                        log.push(CallEvent::Cancelled(call));
                        return Err("request cancelled".into());
                    }
                }
            }
            log.push(CallEvent::Finished(call));
            match response {
                Some(MockResponse::Response(response)) => Ok(SourceResponse::from(response)),
                Some(MockResponse::Failure(reason)) => Err(reason.into()),
                None => {
                    let error = graphql::Error::builder()
                        .message(format!("couldn't find mock for query {}", request.document))
                        .build();
                    Ok(SourceResponse::builder().error(error).build())
                }
            }
        }
        .boxed()
    }
}

/// One request received by a mock source.
#[derive(Clone, Debug, PartialEq)]
pub struct Call {
    pub source: String,
    pub document: String,
    pub variables: Object,
}

#[derive(Clone, Debug, PartialEq)]
pub enum CallEvent {
    Started(Call),
    Finished(Call),
    Cancelled(Call),
}

impl CallEvent {
    pub fn call(&self) -> &Call {
        match self {
            Self::Started(call) | Self::Finished(call) | Self::Cancelled(call) => call,
        }
    }
}

/// Calls received by mock sources, in the order they happened.
#[derive(Clone, Debug, Default)]
pub struct CallLog {
    events: Arc<Mutex<Vec<CallEvent>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: CallEvent) {
        self.events.lock().push(event);
    }

    pub fn events(&self) -> Vec<CallEvent> {
        self.events.lock().clone()
    }

    /// Requests started, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                CallEvent::Started(call) => Some(call.clone()),
                _ => None,
            })
            .collect()
    }

    /// Requests started against `source`.
    pub fn calls_to(&self, source: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| call.source == source)
            .collect()
    }
}
