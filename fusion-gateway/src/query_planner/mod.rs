//! Planning of client operations, cached across requests.

mod caching_query_planner;

pub use fusion_planner::QueryPlanner;
pub use fusion_planner::QueryPlannerConfig;
pub use fusion_planner::query_plan::query_planner::QUERY_PLANNING_SPAN_NAME;
pub use fusion_planner::query_plan::QueryPlan;

pub use self::caching_query_planner::CachingQueryPlanner;
