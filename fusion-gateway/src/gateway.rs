//! The gateway: plans client operations and executes them against the source schemas.

use std::num::NonZeroUsize;
use std::sync::Arc;

use fusion_planner::CompositeSchema;
use fusion_planner::Operation;
use fusion_planner::QueryPlan;
use fusion_planner::QueryPlanner;
use fusion_planner::QueryPlannerConfig;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::configuration::Configuration;
use crate::configuration::ConfigurationError;
use crate::error::GatewayError;
use crate::execution::QueryPlanExecutor;
use crate::graphql::Request;
use crate::graphql::Response;
use crate::query_planner::CachingQueryPlanner;
use crate::services::SourceServices;

pub const REQUEST_SPAN_NAME: &str = "request";

/// A GraphQL gateway over one composite schema.
///
/// The schema can be replaced while requests are running: requests already planned finish
/// against the schema they started with.
#[derive(Debug)]
pub struct Gateway {
    planner: RwLock<Arc<CachingQueryPlanner>>,
    executor: QueryPlanExecutor,
    configuration: Arc<Configuration>,
}

#[buildstructor::buildstructor]
impl Gateway {
    /// Returns an error if the configuration cannot be run with.
    #[builder(visibility = "pub")]
    fn new(
        schema: CompositeSchema,
        services: SourceServices,
        configuration: Option<Configuration>,
    ) -> Result<Self, GatewayError> {
        let configuration = configuration.unwrap_or_default();
        configuration.validate()?;
        for source in schema.sources() {
            if !services.contains(source.name.as_str()) {
                tracing::warn!(source = %source.name, "no service is registered for source schema");
            }
        }
        let planner = caching_planner(schema, &configuration)?;
        let executor = QueryPlanExecutor::new(services, configuration.executor.clone())?;
        Ok(Self {
            planner: RwLock::new(Arc::new(planner)),
            executor,
            configuration: Arc::new(configuration),
        })
    }
}

impl Gateway {
    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn schema(&self) -> Arc<CompositeSchema> {
        self.planner.read().planner().schema().clone()
    }

    /// Replaces the composite schema. Cached plans of the previous schema are dropped.
    pub fn update_schema(&self, schema: CompositeSchema) -> Result<(), GatewayError> {
        let planner = caching_planner(schema, &self.configuration)?;
        tracing::info!(schema = planner.planner().schema().hash(), "composite schema updated");
        *self.planner.write() = Arc::new(planner);
        Ok(())
    }

    /// The plan of `operation`, from the cache when it was planned before.
    pub fn plan(&self, operation: &Operation) -> Result<Arc<QueryPlan>, GatewayError> {
        let planner = self.planner.read().clone();
        Ok(planner.plan(operation)?)
    }

    /// Plans and executes `operation`.
    ///
    /// Errors found before execution (a mismatched operation name, an operation that cannot
    /// be planned) yield a response without data.
    pub async fn execute(
        &self,
        operation: &Operation,
        request: Request,
        cancellation: CancellationToken,
    ) -> Response {
        let span = tracing::info_span!(
            REQUEST_SPAN_NAME,
            "otel.kind" = "INTERNAL",
            "graphql.operation.name" = operation.name.as_deref().unwrap_or_default(),
        );
        async {
            if let Some(requested) = &request.operation_name {
                if operation.name.as_ref() != Some(requested) {
                    let error = GatewayError::OperationNameMismatch {
                        requested: requested.clone(),
                        actual: operation.name.clone().unwrap_or_default(),
                    };
                    return Response::from_error(error.to_graphql_error());
                }
            }
            let plan = match self.plan(operation) {
                Ok(plan) => plan,
                Err(error) => {
                    tracing::debug!(%error, "operation could not be planned");
                    return Response::from_error(error.to_graphql_error());
                }
            };
            let variables = operation.coerce_variables(&request.variables);
            self.executor.execute(&plan, &variables, cancellation).await
        }
        .instrument(span)
        .await
    }
}

fn caching_planner(
    schema: CompositeSchema,
    configuration: &Configuration,
) -> Result<CachingQueryPlanner, GatewayError> {
    let capacity = NonZeroUsize::new(configuration.query_plan_cache.limit).ok_or_else(|| {
        ConfigurationError::InvalidConfiguration {
            message: "limits must be greater than zero",
            error: "query_plan_cache.limit is 0".to_string(),
        }
    })?;
    let config = QueryPlannerConfig::from(&configuration.planner);
    Ok(CachingQueryPlanner::new(
        QueryPlanner::new(Arc::new(schema), config),
        capacity,
    ))
}
