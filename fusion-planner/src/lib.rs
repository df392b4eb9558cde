//! ## Usage
//!
//! This crate is internal to the Fusion gateway and not intended to be used directly.
//!
//! It consumes a composite schema (one virtual schema backed by several source schemas) and
//! turns client operations into [`QueryPlan`]s: DAGs of sub-operations, each sent to one source
//! schema, that the gateway executes and merges back into a single response.
//!
//! ## Crate versioning
//!
//! The `fusion-planner` crate does **not** adhere to [Semantic Versioning](https://semver.org/).
//! Its version matches exactly that of the `fusion-gateway` crate using it.

#![warn(
    rustdoc::broken_intra_doc_links,
    unreachable_pub,
    unreachable_patterns,
    unused,
    unused_qualifications,
    dead_code,
    while_true,
    unconditional_panic,
    clippy::all
)]

pub mod error;
pub mod operation;
pub mod query_plan;
pub mod requirements;
pub mod schema;

pub use crate::error::PlanningError;
pub use crate::error::SchemaError;
pub use crate::operation::Operation;
pub use crate::operation::OperationHash;
pub use crate::query_plan::QueryPlan;
pub use crate::query_plan::query_planner::QueryPlanner;
pub use crate::query_plan::query_planner::QueryPlannerConfig;
pub use crate::schema::CompositeSchema;
