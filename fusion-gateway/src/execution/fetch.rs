//! Requests to source schemas and merging of what they return.

use fusion_planner::query_plan::SourceOperation;
use fusion_planner::query_plan::StepId;
use fusion_planner::schema::SourceSchemaName;
use futures::FutureExt;
use futures::future::BoxFuture;
use futures::future::join_all;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tower::ServiceExt;
use tracing::Instrument;

use crate::error::FetchError;
use crate::graphql;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::PathElement;
use crate::response::CompositeResultDocument;
use crate::services::SourceRequest;
use crate::services::SourceServices;
use crate::services::source::BoxService;

pub const FETCH_SPAN_NAME: &str = "fetch";

/// One request, serving every object that needs the same operation with the same variables.
#[derive(Debug)]
pub(crate) struct FetchJob<'a> {
    pub(crate) operation: &'a SourceOperation,
    pub(crate) variables: Object,
    /// Index among the node's instances, and path, of each object served.
    pub(crate) instances: Vec<(usize, Path)>,
}

/// An object a node could not resolve without sending anything.
#[derive(Debug)]
pub(crate) struct InstanceFailure<'a> {
    pub(crate) index: usize,
    pub(crate) path: Path,
    pub(crate) owned: &'a [String],
    pub(crate) source: Option<&'a SourceSchemaName>,
    pub(crate) cause: FailureCause,
}

/// Why an object could not be resolved.
#[derive(Debug)]
pub(crate) enum FailureCause {
    Fetch(FetchError),
    /// A failed step that fetched data only for this one withheld these errors on the object
    /// at `object`. They are reported at this step's fields instead.
    Inherited {
        producer: StepId,
        object: Path,
        errors: Vec<graphql::Error>,
    },
}

impl From<FetchError> for FailureCause {
    fn from(error: FetchError) -> Self {
        Self::Fetch(error)
    }
}

/// What a node does once started.
#[derive(Debug)]
pub(crate) struct NodeWork<'a> {
    pub(crate) step: StepId,
    pub(crate) jobs: Vec<FetchJob<'a>>,
    pub(crate) failures: Vec<InstanceFailure<'a>>,
}

/// What a node brings back, applied to the document by the scheduler.
#[derive(Debug)]
pub(crate) struct NodeOutcome<'a> {
    pub(crate) step: StepId,
    fetched: Vec<(FetchJob<'a>, Result<graphql::Response, FetchError>)>,
    failures: Vec<InstanceFailure<'a>>,
}

impl<'a> NodeWork<'a> {
    /// A node with nothing to send completes without being polled.
    pub(crate) fn into_outcome(self) -> NodeOutcome<'a> {
        NodeOutcome {
            step: self.step,
            fetched: Vec::new(),
            failures: self.failures,
        }
    }

    pub(crate) fn has_requests(&self) -> bool {
        !self.jobs.is_empty()
    }

    /// Sends every request of the node. Only I/O happens in the returned future: the document is
    /// left to the scheduler.
    pub(crate) fn run<'s>(
        self,
        services: &SourceServices,
        source_requests: &'s Semaphore,
        cancellation: &'s CancellationToken,
    ) -> BoxFuture<'s, NodeOutcome<'a>>
    where
        'a: 's,
    {
        let step = self.step;
        let requests: Vec<_> = self
            .jobs
            .into_iter()
            .map(|job| (services.create(job.operation.source.as_str()), job))
            .collect();
        let failures = self.failures;
        async move {
            let fetched = join_all(requests.into_iter().map(|(service, job)| async move {
                let result = fetch(service, source_requests, step, &job, cancellation).await;
                (job, result)
            }))
            .await;
            NodeOutcome {
                step,
                fetched,
                failures,
            }
        }
        .boxed()
    }
}

async fn fetch(
    service: Option<BoxService>,
    source_requests: &Semaphore,
    step: StepId,
    job: &FetchJob<'_>,
    cancellation: &CancellationToken,
) -> Result<graphql::Response, FetchError> {
    let operation = job.operation;
    let span = tracing::info_span!(
        FETCH_SPAN_NAME,
        "otel.kind" = "INTERNAL",
        "fusion.source.name" = operation.source.as_str(),
        "fusion.step.id" = step.0,
        "fusion.fetch.instances" = job.instances.len(),
    );
    async move {
        let service_name = operation.source.to_string();
        let service = service.ok_or_else(|| FetchError::UnknownSource {
            service: service_name.clone(),
        })?;
        let _permit = source_requests
            .acquire()
            .await
            .map_err(|_| FetchError::SourceRequestFailed {
                service: service_name.clone(),
                reason: "source request budget is closed".to_string(),
            })?;
        let request = SourceRequest::builder()
            .source_name(operation.source.clone())
            .document(operation.document.clone())
            .and_operation_name(operation.operation_name.clone())
            .variables(job.variables.clone())
            .cancellation(cancellation.clone())
            .build();
        match service.oneshot(request).await {
            Ok(response) => Ok(response.response),
            Err(error) => {
                let error = source_error(service_name, error);
                tracing::debug!(%error, "source request failed");
                Err(error)
            }
        }
    }
    .instrument(span)
    .await
}

fn source_error(service: String, error: BoxError) -> FetchError {
    if error.is::<tower::timeout::error::Elapsed>() {
        return FetchError::SourceRequestFailed {
            service,
            reason: "request timed out".to_string(),
        };
    }
    match error.downcast::<FetchError>() {
        Ok(inner) => *inner,
        Err(error) => FetchError::SourceRequestFailed {
            service,
            reason: error.to_string(),
        },
    }
}

impl NodeOutcome<'_> {
    /// Writes the node's results into the document. Returns whether any object failed.
    pub(crate) fn apply(self, document: &mut CompositeResultDocument) -> bool {
        let step = self.step;
        let mut failed = !self.failures.is_empty();
        for failure in &self.failures {
            fail_instance(
                document,
                step,
                failure.index,
                &failure.path,
                failure.owned,
                failure.source,
                &failure.cause,
            );
        }
        for (job, result) in self.fetched {
            let operation = job.operation;
            let merged = result.and_then(|response| merge_response(document, step, &job, response));
            match merged {
                Ok(had_errors) => failed |= had_errors,
                Err(error) => {
                    failed = true;
                    let cause = FailureCause::Fetch(error);
                    for (index, path) in &job.instances {
                        fail_instance(
                            document,
                            step,
                            *index,
                            path,
                            &operation.owned_fields,
                            Some(&operation.source),
                            &cause,
                        );
                    }
                }
            }
        }
        failed
    }
}

/// Nulls the fields the failed operation owns on the object and records the errors there.
///
/// An operation owning no field only fetched data for other steps: its errors are withheld, to
/// be reported at the fields of the steps missing that data.
fn fail_instance(
    document: &mut CompositeResultDocument,
    step: StepId,
    index: usize,
    path: &Path,
    owned: &[String],
    source: Option<&SourceSchemaName>,
    cause: &FailureCause,
) {
    let errors = match cause {
        FailureCause::Fetch(error) => {
            let mut error = error.to_graphql_error(Some(path.clone()));
            annotate(&mut error, step, source);
            vec![error]
        }
        FailureCause::Inherited {
            producer,
            object,
            errors,
        } => {
            document.forward_withheld(*producer, object);
            errors.clone()
        }
    };
    if owned.is_empty() {
        for error in errors {
            document.withhold_error(step, index, path.clone(), error);
        }
        return;
    }
    for field_path in owned_paths(path, owned) {
        document.invalidate(&field_path);
        for error in &errors {
            let mut error = error.clone();
            error.path = Some(field_path.clone());
            document.push_error(step, index, error);
        }
    }
}

/// Merges one source response into every object it serves.
///
/// Returns whether the source reported errors.
fn merge_response(
    document: &mut CompositeResultDocument,
    step: StepId,
    job: &FetchJob<'_>,
    response: graphql::Response,
) -> Result<bool, FetchError> {
    let operation = job.operation;
    let malformed = |reason: String| FetchError::SourceResponseMalformed {
        service: operation.source.to_string(),
        reason,
    };
    let data = match response.data {
        None | Some(Value::Null) => None,
        Some(Value::Object(data)) => Some(data),
        Some(_) => return Err(malformed("`data` is not an object".to_string())),
    };
    if data.is_none() && response.errors.is_empty() {
        return Err(malformed("response has neither data nor errors".to_string()));
    }
    let result = match (&operation.result_root, data) {
        (_, None) => None,
        (None, Some(data)) => Some(Value::Object(data)),
        (Some(root), Some(mut data)) => match data.remove(root) {
            Some(value @ Value::Object(_)) => Some(value),
            Some(Value::Null) => None,
            None if !response.errors.is_empty() => None,
            None => return Err(malformed(format!("`{root}` is missing from `data`"))),
            Some(_) => return Err(malformed(format!("`{root}` is not an object"))),
        },
    };

    for (index, path) in &job.instances {
        if let Some(value) = &result {
            document.patch(path, value.clone());
        }
        for error in &response.errors {
            for relocated in relocate(error, step, operation, path) {
                if operation.owned_fields.is_empty() {
                    document.withhold_error(step, *index, path.clone(), relocated);
                } else {
                    document.push_error(step, *index, relocated);
                }
            }
        }
    }
    Ok(!response.errors.is_empty())
}

/// Rewrites a source error path into the composite response: the lookup field wrapping the
/// result is stripped and the object's path prepended. Errors without a usable path attach at
/// the fields the operation owns.
fn relocate(
    error: &graphql::Error,
    step: StepId,
    operation: &SourceOperation,
    instance: &Path,
) -> Vec<graphql::Error> {
    let relative = error
        .path
        .as_ref()
        .and_then(|path| match &operation.result_root {
            Some(root) => match path.0.split_first() {
                Some((PathElement::Key(key), rest)) if key == root && !rest.is_empty() => {
                    Some(Path(rest.to_vec()))
                }
                _ => None,
            },
            None if path.is_empty() => None,
            None => Some(path.clone()),
        });
    let paths = match relative {
        Some(relative) => vec![instance.join(relative)],
        None => owned_paths(instance, &operation.owned_fields),
    };
    paths
        .into_iter()
        .map(|path| {
            let mut error = error.clone();
            error.path = Some(path);
            annotate(&mut error, step, Some(&operation.source));
            error
        })
        .collect()
}

fn owned_paths(instance: &Path, owned: &[String]) -> Vec<Path> {
    if owned.is_empty() {
        vec![instance.clone()]
    } else {
        owned.iter().map(|field| instance.join_key(field)).collect()
    }
}

/// Records the originating step and source in the error's extensions.
fn annotate(error: &mut graphql::Error, step: StepId, source: Option<&SourceSchemaName>) {
    error
        .extensions
        .entry("stepId")
        .or_insert_with(|| Value::from(step.0));
    if let Some(source) = source {
        error
            .extensions
            .entry("source")
            .or_insert_with(|| Value::from(source.as_str()));
    }
}
