//! Runtime state of one plan step for one request.

use fusion_planner::query_plan::PlanStep;
use fusion_planner::query_plan::SourceOperation;
use fusion_planner::query_plan::StepId;
use indexmap::IndexMap;

use super::fetch::FetchJob;
use super::fetch::InstanceFailure;
use super::fetch::NodeWork;
use super::variables::resolve_variables;
use super::variables::select_branch;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::response::CompositeResultDocument;

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum_macros::Display)]
pub(crate) enum NodeState {
    /// Some dependency has not reached a terminal state yet.
    Pending,
    /// Queued; starts as soon as the concurrency limit allows.
    Ready,
    Running,
    Succeeded,
    Failed,
}

/// A [`PlanStep`] bound to one request.
///
/// Steps are shared by every request executing the plan; everything that changes while a
/// request runs lives here.
#[derive(Debug)]
pub(crate) struct ExecutionNode<'a> {
    pub(crate) step: &'a PlanStep,
    state: NodeState,
    unfinished_dependencies: usize,
}

impl<'a> ExecutionNode<'a> {
    pub(crate) fn new(step: &'a PlanStep) -> Self {
        Self {
            step,
            state: NodeState::Pending,
            unfinished_dependencies: step.depends_on().len(),
        }
    }

    pub(crate) fn id(&self) -> StepId {
        self.step.id()
    }

    pub(crate) fn state(&self) -> NodeState {
        self.state
    }

    pub(crate) fn is_failed(&self) -> bool {
        self.state == NodeState::Failed
    }

    pub(crate) fn is_terminal(&self) -> bool {
        matches!(self.state, NodeState::Succeeded | NodeState::Failed)
    }

    /// Moves a pending node with no unfinished dependency to `Ready`. Returns whether it moved.
    pub(crate) fn try_ready(&mut self) -> bool {
        if self.state == NodeState::Pending && self.unfinished_dependencies == 0 {
            self.transition(NodeState::Ready);
            true
        } else {
            false
        }
    }

    /// Records that one dependency reached a terminal state.
    pub(crate) fn dependency_finished(&mut self) -> bool {
        self.unfinished_dependencies = self.unfinished_dependencies.saturating_sub(1);
        self.try_ready()
    }

    pub(crate) fn start(&mut self) {
        self.transition(NodeState::Running);
    }

    pub(crate) fn finish(&mut self, failed: bool) {
        self.transition(if failed {
            NodeState::Failed
        } else {
            NodeState::Succeeded
        });
    }

    fn transition(&mut self, state: NodeState) {
        tracing::trace!(step = self.id().0, from = %self.state, to = %state, "node state changed");
        self.state = state;
    }

    /// The requests this node sends, read from the data its dependencies wrote.
    ///
    /// Objects sharing the same operation and variables are served by a single request.
    pub(crate) fn prepare(
        &self,
        document: &CompositeResultDocument,
        nodes: &[ExecutionNode<'a>],
        request_variables: &Object,
    ) -> NodeWork<'a> {
        let mut selected: Vec<(usize, Path, usize, &'a SourceOperation)> = Vec::new();
        let mut failures = Vec::new();
        match self.step {
            PlanStep::Operation(step) => {
                let instances = document.instances(&step.response_path, step.type_condition.as_deref());
                for (index, path) in instances.into_iter().enumerate() {
                    selected.push((index, path, 0, &step.operation));
                }
            }
            PlanStep::EntityLookup(step) => {
                let owned = step
                    .branches
                    .values()
                    .chain(step.fallback.as_ref())
                    .next()
                    .map(|operation| operation.owned_fields.as_slice())
                    .unwrap_or_default();
                let instances = document.instances(&step.response_path, None);
                for (index, path) in instances.into_iter().enumerate() {
                    match select_branch(step, document, &path, request_variables) {
                        Ok(Some((branch, operation))) => {
                            selected.push((index, path, branch, operation))
                        }
                        Ok(None) => {}
                        Err(error) => failures.push(InstanceFailure {
                            index,
                            path,
                            owned,
                            source: None,
                            cause: error.into(),
                        }),
                    }
                }
            }
        }

        let mut jobs: IndexMap<(usize, String), FetchJob<'a>> = IndexMap::new();
        for (index, path, branch, operation) in selected {
            match resolve_variables(operation, document, nodes, &path, request_variables) {
                Ok(Some(variables)) => {
                    let key = (branch, serde_json::Value::Object(variables.clone()).to_string());
                    jobs.entry(key)
                        .or_insert_with(|| FetchJob {
                            operation,
                            variables,
                            instances: Vec::new(),
                        })
                        .instances
                        .push((index, path));
                }
                Ok(None) => {}
                Err(cause) => failures.push(InstanceFailure {
                    index,
                    path,
                    owned: &operation.owned_fields,
                    source: Some(&operation.source),
                    cause,
                }),
            }
        }
        NodeWork {
            step: self.id(),
            jobs: jobs.into_values().collect(),
            failures,
        }
    }
}
