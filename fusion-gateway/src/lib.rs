//! A GraphQL gateway over composite schemas.
//!
//! Client operations are planned once per shape into a [`QueryPlan`] of sub-operations, each
//! sent to one source schema. The [`QueryPlanExecutor`] runs the plan as a DAG, merges every
//! partial result into one document and projects it onto the client's selection.
//!
//! ## Crate versioning
//!
//! The `fusion-gateway` crate does **not** adhere to [Semantic Versioning](https://semver.org/).
//! It is released in lockstep with `fusion-planner`.

#![warn(unreachable_pub)]
#![warn(
    rustdoc::broken_intra_doc_links,
    unreachable_patterns,
    unused,
    unused_qualifications,
    dead_code,
    while_true,
    unconditional_panic,
    clippy::all
)]

pub mod configuration;
pub mod error;
pub mod execution;
mod gateway;
pub mod graphql;
pub mod json_ext;
pub mod query_planner;
pub mod response;
pub mod services;
pub mod test_harness;

pub use fusion_planner::CompositeSchema;
pub use fusion_planner::Operation;
pub use fusion_planner::QueryPlan;

pub use crate::configuration::Configuration;
pub use crate::execution::QueryPlanExecutor;
pub use crate::gateway::Gateway;
pub use crate::gateway::REQUEST_SPAN_NAME;
pub use crate::response::CompositeResultDocument;
pub use crate::services::SourceServices;
