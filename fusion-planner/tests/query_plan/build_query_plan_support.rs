use std::sync::Arc;

use fusion_planner::CompositeSchema;
use fusion_planner::QueryPlanner;
use fusion_planner::QueryPlannerConfig;

/// Loads the given composite schema artifact (a `serde_json::Value`) and returns a planner for it.
///
/// Panics if the artifact fails to load.
macro_rules! planner {
    (config = $config: expr, $schema: expr $(,)?) => {{
        $crate::query_plan::build_query_plan_support::planner_for(&$schema, $config)
    }};
    ($schema: expr $(,)?) => {
        planner!(config = Default::default(), $schema)
    };
}

/// Takes a reference to the result of `planner!()`, an operation, and an expected formatted
/// query plan string.
/// Run `cargo insta review` to diff and accept changes to the generated query plan.
macro_rules! assert_plan {
    ($planner: expr, $operation: expr, @$expected: literal) => {{
        let planner: &fusion_planner::QueryPlanner = $planner;
        let plan = planner.build_query_plan(&$operation).unwrap();
        insta::assert_snapshot!(plan, @$expected);
        plan
    }};
}

pub(crate) fn planner_for(schema: &serde_json::Value, config: QueryPlannerConfig) -> QueryPlanner {
    let schema = CompositeSchema::parse_json(&schema.to_string())
        .unwrap_or_else(|error| panic!("composite schema failed to load: {error}"));
    QueryPlanner::new(Arc::new(schema), config)
}

/// `product(id: ID!): Product` on `catalog`, with `price` only on `pricing`, which can look
/// products up by id.
pub(crate) fn catalog_and_pricing() -> serde_json::Value {
    serde_json::json!({
        "sources": [{ "name": "catalog" }, { "name": "pricing" }],
        "types": [
            { "kind": "Object", "name": "Query", "fields": [
                { "name": "product", "type": "Product",
                  "arguments": [{ "name": "id", "type": "ID!" }],
                  "sources": [{ "source": "catalog" }] }
            ] },
            { "kind": "Object", "name": "Product",
              "fields": [
                { "name": "id", "type": "ID!",
                  "sources": [{ "source": "catalog" }, { "source": "pricing" }] },
                { "name": "name", "type": "String", "sources": [{ "source": "catalog" }] },
                { "name": "price", "type": "Float",
                  "sources": [{ "source": "pricing", "requires": "id" }] }
              ],
              "lookups": [
                { "source": "pricing", "field": "productById",
                  "arguments": [{ "name": "id", "type": "ID!", "path": "id" }] }
              ] }
        ]
    })
}
