use std::sync::Arc;

use fusion_gateway::Operation;
use fusion_gateway::QueryPlanExecutor;
use fusion_gateway::SourceServices;
use fusion_gateway::configuration::ExecutorConfig;
use fusion_gateway::graphql;
use fusion_gateway::test_harness::CallLog;
use fusion_gateway::test_harness::MockSource;
use fusion_planner::operation::Field;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::common::CATALOG_PRODUCT;
use super::common::CATALOG_PRODUCTS;
use super::common::INVENTORY_PRODUCT;
use super::common::PRICING_PRODUCT;
use super::common::catalog_and_pricing;
use super::common::catalog_pricing_inventory;
use super::common::execute;
use super::common::execute_with;
use super::common::gateway;

fn name_query() -> Operation {
    Operation::query([Field::new("product")
        .argument("id", "1")
        .selections([Field::new("name")])])
}

fn catalog(log: &CallLog) -> SourceServices {
    SourceServices::new().with(
        "catalog",
        MockSource::new()
            .with_json(
                "query { product(id: \"1\") { name } }",
                json!({ "data": { "product": { "name": "Table" } } }),
            )
            .with_json(
                CATALOG_PRODUCT,
                json!({ "data": { "product": { "name": "Table", "id": "1" } } }),
            )
            .with_call_log(log.clone()),
    )
}

#[tokio::test]
async fn plans_are_reused_across_requests() {
    let gateway = gateway(catalog_and_pricing(false), catalog(&CallLog::new()));
    let first = gateway.plan(&name_query()).expect("plans");
    let second = gateway.plan(&name_query()).expect("plans");
    assert!(Arc::ptr_eq(&first, &second));

    assert_eq!(
        execute(&gateway, &name_query(), json!({})).await,
        json!({ "data": { "product": { "name": "Table" } } })
    );
    let third = gateway.plan(&name_query()).expect("plans");
    assert!(Arc::ptr_eq(&first, &third));
}

#[tokio::test]
async fn schema_updates_drop_cached_plans() {
    let gateway = gateway(catalog_and_pricing(false), catalog(&CallLog::new()));
    let before = gateway.plan(&name_query()).expect("plans");
    let schema = gateway.schema();

    gateway
        .update_schema(catalog_and_pricing(true))
        .expect("schema is valid");
    assert_ne!(gateway.schema().hash(), schema.hash());
    let after = gateway.plan(&name_query()).expect("plans");
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(before.steps, after.steps);
}

#[tokio::test]
async fn operations_that_cannot_be_planned_have_no_data() {
    let log = CallLog::new();
    let gateway = gateway(catalog_and_pricing(false), catalog(&log));

    let response = execute(&gateway, &Operation::query([Field::new("missing")]), json!({})).await;
    assert_eq!(response.get("data"), None);
    assert_eq!(
        response["errors"][0]["extensions"]["code"],
        json!("QUERY_PLANNING_FAILED")
    );
    assert!(log.calls().is_empty());
}

#[tokio::test]
async fn operation_names_must_match_the_request() {
    let log = CallLog::new();
    let gateway = gateway(catalog_and_pricing(false), catalog(&log));

    let request = graphql::Request::builder()
        .operation_name("Other")
        .build();
    let response = execute_with(
        &gateway,
        &name_query().named("ProductName"),
        request,
        CancellationToken::new(),
    )
    .await;
    assert_eq!(response.data, None);
    assert_eq!(
        response.errors[0].message,
        "operation name 'Other' does not match the operation 'ProductName'"
    );
    assert_eq!(
        response.errors[0].extension_code(),
        Some("OPERATION_NAME_MISMATCH")
    );
    assert!(log.calls().is_empty());
}

#[tokio::test]
async fn executing_a_plan_twice_gives_the_same_response() {
    let pricing = MockSource::new()
        .with_json(
            PRICING_PRODUCT,
            json!({ "data": { "productById": { "price": 9.5 } } }),
        )
        .with_json_for_variables(
            PRICING_PRODUCT,
            json!({ "__fusion_1_id": "2" }),
            json!({
                "data": { "productById": null },
                "errors": [{ "message": "price unavailable", "path": ["productById", "price"] }]
            }),
        );
    let services = SourceServices::new()
        .with(
            "catalog",
            MockSource::new().with_json(
                CATALOG_PRODUCTS,
                json!({ "data": { "products": [{ "id": "1" }, { "id": "2" }, { "id": "3" }] } }),
            ),
        )
        .with("pricing", pricing)
        .with(
            "inventory",
            MockSource::new().with_json(
                INVENTORY_PRODUCT,
                json!({ "data": { "stockItem": { "stock": 4 } } }),
            ),
        );
    let gateway = gateway(catalog_pricing_inventory(), services.clone());
    let plan = gateway
        .plan(&Operation::query([
            Field::new("products").selections([Field::new("price"), Field::new("stock")])
        ]))
        .expect("plans");
    let executor =
        QueryPlanExecutor::new(services, ExecutorConfig::default()).expect("config is valid");

    let first = executor
        .execute(&plan, &Default::default(), CancellationToken::new())
        .await;
    let second = executor
        .execute(&plan, &Default::default(), CancellationToken::new())
        .await;
    let first = serde_json::to_string(&first).expect("responses serialize");
    assert_eq!(first, serde_json::to_string(&second).expect("responses serialize"));
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&first).expect("valid json"),
        json!({
            "data": { "products": [
                { "price": 9.5, "stock": 4 },
                { "price": null, "stock": 4 },
                { "price": 9.5, "stock": 4 }
            ] },
            "errors": [{
                "message": "price unavailable",
                "path": ["products", 1, "price"],
                "extensions": { "stepId": 1, "source": "pricing" }
            }]
        })
    );
}
