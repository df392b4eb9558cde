//! Execution of query plans against source schemas.

mod fetch;
mod node;
mod variables;

use std::collections::BTreeSet;
use std::sync::Arc;

use fusion_planner::QueryPlan;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

pub use self::fetch::FETCH_SPAN_NAME;
use self::fetch::NodeOutcome;
use self::node::ExecutionNode;
use self::node::NodeState;
pub use self::variables::node_id;
pub use crate::configuration::ExecutorConfig;
use crate::configuration::ConfigurationError;
use crate::error::FetchError;
use crate::graphql::Response;
use crate::json_ext::Object;
use crate::response::CompositeResultDocument;
use crate::services::SourceServices;

pub const EXECUTION_SPAN_NAME: &str = "execution";

/// Runs query plans: every step is sent to its source as soon as the steps it depends on are
/// done, and the results are merged into one response.
#[derive(Debug, Clone)]
pub struct QueryPlanExecutor {
    services: SourceServices,
    config: ExecutorConfig,
    source_requests: Arc<Semaphore>,
}

impl QueryPlanExecutor {
    /// Returns an error when `config` has a zero limit or timeout.
    pub fn new(
        services: SourceServices,
        config: ExecutorConfig,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let services = match config.source_timeout {
            Some(timeout) => services.with_timeout(timeout),
            None => services,
        };
        let source_requests = Arc::new(Semaphore::new(config.max_source_requests));
        Ok(Self {
            services,
            config,
            source_requests,
        })
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Executes `plan` with the coerced request `variables`.
    ///
    /// Failures of single steps are reported in the response next to the data that could be
    /// fetched. Once `cancellation` fires, nothing new is started and the response carries a
    /// single cancellation error.
    pub async fn execute(
        &self,
        plan: &QueryPlan,
        variables: &Object,
        cancellation: CancellationToken,
    ) -> Response {
        let span = tracing::info_span!(
            EXECUTION_SPAN_NAME,
            "otel.kind" = "INTERNAL",
            "fusion.plan.steps" = plan.steps.len(),
        );
        async {
            if let Err(error) = plan.validate() {
                tracing::error!(%error, "refusing to execute query plan");
                let error = FetchError::InvalidQueryPlan {
                    reason: error.to_string(),
                };
                return Response::from_error(error.to_graphql_error(None));
            }
            match self.execute_steps(plan, variables, &cancellation).await {
                Some(document) => document.complete(&plan.response_shape, variables),
                None => {
                    tracing::debug!("execution cancelled");
                    FetchError::ExecutionCancelled.to_response()
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Returns `None` when cancelled.
    async fn execute_steps(
        &self,
        plan: &QueryPlan,
        variables: &Object,
        cancellation: &CancellationToken,
    ) -> Option<CompositeResultDocument> {
        let mut document = CompositeResultDocument::new();
        let mut nodes: Vec<ExecutionNode<'_>> = plan.steps.iter().map(ExecutionNode::new).collect();
        let dependents = plan.dependents();
        let mut ready: BTreeSet<usize> = nodes
            .iter_mut()
            .filter_map(|node| node.try_ready().then(|| node.id().0))
            .collect();
        let mut running = FuturesUnordered::new();

        loop {
            while running.len() < self.config.max_concurrency {
                let Some(index) = ready.pop_first() else {
                    break;
                };
                if cancellation.is_cancelled() {
                    return None;
                }
                let work = nodes[index].prepare(&document, &nodes, variables);
                nodes[index].start();
                if work.has_requests() {
                    running.push(work.run(&self.services, &self.source_requests, cancellation));
                } else {
                    finish(work.into_outcome(), &mut document, &mut nodes, &dependents, &mut ready);
                }
            }

            if running.is_empty() {
                if ready.is_empty() {
                    break;
                }
                continue;
            }
            let outcome = tokio::select! {
                biased;
                _ = cancellation.cancelled() => return None,
                Some(outcome) = running.next() => outcome,
            };
            finish(outcome, &mut document, &mut nodes, &dependents, &mut ready);
        }

        let unfinished = nodes.iter().filter(|node| !node.is_terminal()).count();
        if unfinished > 0 {
            tracing::warn!(unfinished, "query plan steps were never ready to run");
        }
        Some(document)
    }
}

/// Applies a node's outcome and queues the dependents it unblocks. Dependents of failed nodes
/// still run: they only fail where a value they need is missing.
fn finish(
    outcome: NodeOutcome<'_>,
    document: &mut CompositeResultDocument,
    nodes: &mut [ExecutionNode<'_>],
    dependents: &[Vec<fusion_planner::query_plan::StepId>],
    ready: &mut BTreeSet<usize>,
) {
    let index = outcome.step.0;
    let failed = outcome.apply(document);
    let Some(node) = nodes.get_mut(index) else {
        return;
    };
    if node.state() != NodeState::Running {
        tracing::warn!(step = index, state = %node.state(), "finished a node that was not running");
    }
    node.finish(failed);
    for dependent in dependents.get(index).into_iter().flatten() {
        if let Some(dependent_node) = nodes.get_mut(dependent.0) {
            if dependent_node.dependency_finished() {
                ready.insert(dependent.0);
            }
        }
    }
}
