//! Logic for loading configuration in to an object model
use std::str::FromStr;
use std::time::Duration;

use displaydoc::Display;
use fusion_planner::QueryPlannerConfig;
use schemars::JsonSchema;
use schemars::schema::RootSchema;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Configuration error.
#[derive(Debug, Error, Display)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// {message}: {error}
    InvalidConfiguration {
        message: &'static str,
        error: String,
    },
    /// could not deserialize configuration: {0}
    DeserializeConfigError(serde_yaml::Error),
}

/// The configuration for the gateway.
///
/// Can be created through `serde::Deserialize` from various formats,
/// or inline in Rust code with the builder.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct Configuration {
    /// Query planning options.
    pub planner: Planner,

    /// Query plan execution options.
    pub executor: ExecutorConfig,

    /// Cache of query plans, keyed by operation shape.
    pub query_plan_cache: QueryPlanCache,
}

#[buildstructor::buildstructor]
impl Configuration {
    #[builder]
    pub fn new(
        planner: Option<Planner>,
        executor: Option<ExecutorConfig>,
        query_plan_cache: Option<QueryPlanCache>,
    ) -> Self {
        Self {
            planner: planner.unwrap_or_default(),
            executor: executor.unwrap_or_default(),
            query_plan_cache: query_plan_cache.unwrap_or_default(),
        }
    }

    /// Parses YAML configuration and validates it.
    pub fn from_yaml(raw_yaml: &str) -> Result<Self, ConfigurationError> {
        let configuration: Configuration =
            serde_yaml::from_str(raw_yaml).map_err(ConfigurationError::DeserializeConfigError)?;
        configuration.validate()?;
        Ok(configuration)
    }

    /// Rejects values deserialization accepts but the gateway cannot run with.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.executor.validate()?;
        ensure_positive(self.query_plan_cache.limit, "query_plan_cache.limit")?;
        ensure_positive(
            self.planner.max_evaluated_plans,
            "planner.max_evaluated_plans",
        )?;
        for (value, name) in [
            (self.planner.step_cost, "planner.step_cost"),
            (self.planner.field_cost, "planner.field_cost"),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigurationError::InvalidConfiguration {
                    message: "costs must be finite and not negative",
                    error: format!("{name} is {value}"),
                });
            }
        }
        Ok(())
    }
}

fn ensure_positive(value: usize, name: &str) -> Result<(), ConfigurationError> {
    if value == 0 {
        return Err(ConfigurationError::InvalidConfiguration {
            message: "limits must be greater than zero",
            error: format!("{name} is 0"),
        });
    }
    Ok(())
}

/// Parse configuration from a string in YAML syntax
impl FromStr for Configuration {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_yaml(s)
    }
}

/// Generate a JSON schema for the configuration.
pub fn generate_config_schema() -> RootSchema {
    schemars::schema_for!(Configuration)
}

/// Query planning options.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct Planner {
    /// Partial source assignments the planner expands for one group of sibling fields before
    /// settling for the cheapest one found so far.
    /// default: 10000
    pub max_evaluated_plans: usize,

    /// Fixed cost of a request to a source schema, scaled by the source's weight.
    /// default: 100
    pub step_cost: f64,

    /// Cost of each field a source operation selects.
    /// default: 1
    pub field_cost: f64,
}

impl Default for Planner {
    fn default() -> Self {
        let defaults = QueryPlannerConfig::default();
        Self {
            max_evaluated_plans: defaults.max_evaluated_plans,
            step_cost: defaults.step_cost,
            field_cost: defaults.field_cost,
        }
    }
}

impl From<&Planner> for QueryPlannerConfig {
    fn from(planner: &Planner) -> Self {
        QueryPlannerConfig {
            max_evaluated_plans: planner.max_evaluated_plans,
            step_cost: planner.step_cost,
            field_cost: planner.field_cost,
        }
    }
}

/// Query plan execution options.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct ExecutorConfig {
    /// Plan steps of one request running at the same time.
    /// default: 32
    pub max_concurrency: usize,

    /// Requests to source schemas in flight at the same time, across every request the
    /// gateway executes.
    /// default: 64
    pub max_source_requests: usize,

    /// Timeout of one request to a source schema, in human-readable format. No timeout when
    /// unset.
    #[serde(with = "humantime_serde")]
    #[schemars(with = "Option<String>", default)]
    pub source_timeout: Option<Duration>,
}

fn default_max_concurrency() -> usize {
    32
}

fn default_max_source_requests() -> usize {
    64
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            max_source_requests: default_max_source_requests(),
            source_timeout: None,
        }
    }
}

#[buildstructor::buildstructor]
impl ExecutorConfig {
    #[builder]
    pub fn new(
        max_concurrency: Option<usize>,
        max_source_requests: Option<usize>,
        source_timeout: Option<Duration>,
    ) -> Self {
        Self {
            max_concurrency: max_concurrency.unwrap_or_else(default_max_concurrency),
            max_source_requests: max_source_requests.unwrap_or_else(default_max_source_requests),
            source_timeout,
        }
    }
}

impl ExecutorConfig {
    /// Rejects limits no plan could ever run with.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        ensure_positive(self.max_concurrency, "executor.max_concurrency")?;
        ensure_positive(self.max_source_requests, "executor.max_source_requests")?;
        if self.source_timeout == Some(Duration::ZERO) {
            return Err(ConfigurationError::InvalidConfiguration {
                message: "timeouts must be greater than zero",
                error: "executor.source_timeout is 0s".to_string(),
            });
        }
        Ok(())
    }
}

/// Cache of query plans.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct QueryPlanCache {
    /// Number of query plans kept in memory.
    /// default: 512
    pub limit: usize,
}

impl Default for QueryPlanCache {
    fn default() -> Self {
        Self { limit: 512 }
    }
}
