use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use tracing::info_span;

use super::QueryPlan;
use super::builder::PlanBuilder;
use crate::error::PlanningError;
use crate::operation::Operation;
use crate::schema::CompositeSchema;

pub const QUERY_PLANNING_SPAN_NAME: &str = "query_planning";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryPlannerConfig {
    /// How many partial source assignments the best-first search expands for one group of
    /// sibling fields before completing the cheapest one greedily.
    ///
    /// Defaults to 10 000.
    pub max_evaluated_plans: usize,

    /// Fixed cost of one request to a source schema, scaled by the source weight.
    ///
    /// Defaults to 100.
    pub step_cost: f64,

    /// Cost added for every field a step selects.
    ///
    /// Defaults to 1.
    pub field_cost: f64,
}

impl Default for QueryPlannerConfig {
    fn default() -> Self {
        Self {
            max_evaluated_plans: 10_000,
            step_cost: 100.0,
            field_cost: 1.0,
        }
    }
}

/// Builds [`QueryPlan`]s for operations over one composite schema.
#[derive(Debug, Clone)]
pub struct QueryPlanner {
    schema: Arc<CompositeSchema>,
    config: QueryPlannerConfig,
}

impl QueryPlanner {
    pub fn new(schema: Arc<CompositeSchema>, config: QueryPlannerConfig) -> Self {
        Self { schema, config }
    }

    pub fn schema(&self) -> &Arc<CompositeSchema> {
        &self.schema
    }

    pub fn config(&self) -> &QueryPlannerConfig {
        &self.config
    }

    pub fn build_query_plan(&self, operation: &Operation) -> Result<QueryPlan, PlanningError> {
        let span = info_span!(
            QUERY_PLANNING_SPAN_NAME,
            "otel.kind" = "INTERNAL",
            "graphql.operation.name" = operation.name.as_deref().unwrap_or_default(),
            "fusion.plan.steps" = tracing::field::Empty,
        );
        let _guard = span.enter();

        let mut builder = PlanBuilder::new(&self.schema, operation, &self.config);
        builder.plan_operation()?;
        let plan = builder.finish()?;
        span.record("fusion.plan.steps", plan.steps.len());
        tracing::debug!(cost = plan.cost, "query plan built");
        Ok(plan)
    }
}
