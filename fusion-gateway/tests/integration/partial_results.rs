use std::time::Duration;

use fusion_gateway::Configuration;
use fusion_gateway::Operation;
use fusion_gateway::SourceServices;
use fusion_gateway::configuration::ExecutorConfig;
use fusion_gateway::test_harness::CallLog;
use fusion_gateway::test_harness::MockSource;
use fusion_planner::operation::Field;
use pretty_assertions::assert_eq;
use serde_json::json;

use super::common::CATALOG_PRODUCT;
use super::common::PRICING_PRODUCT;
use super::common::catalog_and_pricing;
use super::common::catalog_inventory_shipping;
use super::common::execute;
use super::common::gateway;
use super::common::gateway_with_configuration;

fn product_query() -> Operation {
    Operation::query([Field::new("product")
        .argument("id", "1")
        .selections([Field::new("name"), Field::new("price")])])
}

fn services(pricing: MockSource) -> SourceServices {
    SourceServices::new()
        .with(
            "catalog",
            MockSource::new().with_json(
                CATALOG_PRODUCT,
                json!({ "data": { "product": { "name": "Table", "id": "1" } } }),
            ),
        )
        .with("pricing", pricing)
}

#[test_log::test(tokio::test)]
async fn failed_source_nulls_only_the_fields_it_owns() {
    let gateway = gateway(
        catalog_and_pricing(false),
        services(MockSource::new().with_failure(PRICING_PRODUCT, "connection refused")),
    );

    let response = execute(&gateway, &product_query(), json!({})).await;
    assert_eq!(
        response,
        json!({
            "data": { "product": { "name": "Table", "price": null } },
            "errors": [{
                "message": "request to source 'pricing' failed: connection refused",
                "path": ["product", "price"],
                "extensions": {
                    "service": "pricing",
                    "reason": "connection refused",
                    "code": "SOURCE_REQUEST_FAILED",
                    "stepId": 1,
                    "source": "pricing"
                }
            }]
        })
    );
}

#[tokio::test]
async fn null_in_a_non_null_field_propagates_to_the_nearest_nullable_parent() {
    let gateway = gateway(
        catalog_and_pricing(true),
        services(MockSource::new().with_failure(PRICING_PRODUCT, "connection refused")),
    );

    let response = execute(&gateway, &product_query(), json!({})).await;
    assert_eq!(response["data"], json!({ "product": null }));
    let errors = response["errors"].as_array().expect("errors are reported");
    assert_eq!(errors.len(), 1, "{errors:#?}");
    assert_eq!(errors[0]["path"], json!(["product", "price"]));
    assert_eq!(errors[0]["extensions"]["code"], json!("SOURCE_REQUEST_FAILED"));
}

#[tokio::test]
async fn source_errors_are_relocated_into_the_client_response() {
    let gateway = gateway(
        catalog_and_pricing(false),
        services(MockSource::new().with_json(
            PRICING_PRODUCT,
            json!({
                "data": { "productById": null },
                "errors": [{
                    "message": "price unavailable",
                    "path": ["productById", "price"],
                    "extensions": { "code": "PRICE_UNAVAILABLE" }
                }]
            }),
        )),
    );

    let response = execute(&gateway, &product_query(), json!({})).await;
    assert_eq!(
        response,
        json!({
            "data": { "product": { "name": "Table", "price": null } },
            "errors": [{
                "message": "price unavailable",
                "path": ["product", "price"],
                "extensions": {
                    "code": "PRICE_UNAVAILABLE",
                    "stepId": 1,
                    "source": "pricing"
                }
            }]
        })
    );
}

#[tokio::test]
async fn malformed_source_responses_fail_their_fields() {
    let gateway = gateway(
        catalog_and_pricing(false),
        services(MockSource::new().with_json(PRICING_PRODUCT, json!({ "data": { "unexpected": 1 } }))),
    );

    let response = execute(&gateway, &product_query(), json!({})).await;
    assert_eq!(
        response["data"],
        json!({ "product": { "name": "Table", "price": null } })
    );
    assert_eq!(
        response["errors"][0]["extensions"]["code"],
        json!("SOURCE_RESPONSE_MALFORMED")
    );
    assert_eq!(response["errors"][0]["path"], json!(["product", "price"]));
}

#[tokio::test]
async fn slow_sources_time_out() {
    let configuration = Configuration::builder()
        .executor(
            ExecutorConfig::builder()
                .source_timeout(Duration::from_millis(20))
                .build(),
        )
        .build();
    let gateway = gateway_with_configuration(
        catalog_and_pricing(false),
        services(
            MockSource::new()
                .with_json(
                    PRICING_PRODUCT,
                    json!({ "data": { "productById": { "price": 12.5 } } }),
                )
                .with_delay(Duration::from_secs(5)),
        ),
        configuration,
    );

    let response = execute(&gateway, &product_query(), json!({})).await;
    assert_eq!(
        response["data"],
        json!({ "product": { "name": "Table", "price": null } })
    );
    assert_eq!(
        response["errors"][0]["message"],
        json!("request to source 'pricing' failed: request timed out")
    );
}

#[tokio::test]
async fn unregistered_sources_are_reported() {
    let gateway = gateway(
        catalog_and_pricing(false),
        SourceServices::new().with(
            "catalog",
            MockSource::new().with_json(
                CATALOG_PRODUCT,
                json!({ "data": { "product": { "name": "Table", "id": "1" } } }),
            ),
        ),
    );

    let response = execute(&gateway, &product_query(), json!({})).await;
    assert_eq!(
        response["data"],
        json!({ "product": { "name": "Table", "price": null } })
    );
    assert_eq!(response["errors"][0]["extensions"]["code"], json!("UNKNOWN_SOURCE"));
}

const SHIPPING_CATALOG_PRODUCT: &str = r#"query { product(id: "1") { name id } }"#;
const SHIPPING_WEIGHT: &str =
    "query($__fusion_2_id: ID!) { productById(id: $__fusion_2_id) { weight } }";
const CATALOG_PRODUCT_ID: &str = r#"query { product(id: "1") { id } }"#;
const INVENTORY_WEIGHT: &str =
    "query($__fusion_1_id: ID!) { productById(id: $__fusion_1_id) { weight } }";

#[test_log::test(tokio::test)]
async fn failed_requirement_steps_report_at_the_fields_needing_them() {
    let log = CallLog::new();
    let services = SourceServices::new()
        .with(
            "catalog",
            MockSource::new().with_json(
                SHIPPING_CATALOG_PRODUCT,
                json!({ "data": { "product": { "name": "Table", "id": "1" } } }),
            ),
        )
        .with(
            "inventory",
            MockSource::new().with_failure(SHIPPING_WEIGHT, "connection refused"),
        )
        .with("shipping", MockSource::new().with_call_log(log.clone()));
    let gateway = gateway(catalog_inventory_shipping(), services);
    let operation = Operation::query([Field::new("product")
        .argument("id", "1")
        .selections([Field::new("name"), Field::new("shippingEstimate")])]);

    let response = execute(&gateway, &operation, json!({})).await;
    assert_eq!(
        response,
        json!({
            "data": { "product": { "name": "Table", "shippingEstimate": null } },
            "errors": [{
                "message": "request to source 'inventory' failed: connection refused",
                "path": ["product", "shippingEstimate"],
                "extensions": {
                    "service": "inventory",
                    "reason": "connection refused",
                    "code": "SOURCE_REQUEST_FAILED",
                    "stepId": 1,
                    "source": "inventory"
                }
            }]
        })
    );
    assert!(log.calls().is_empty());
}

#[tokio::test]
async fn fields_needing_data_of_a_failed_step_report_the_dependency() {
    let services = SourceServices::new()
        .with(
            "catalog",
            MockSource::new().with_json(
                CATALOG_PRODUCT_ID,
                json!({ "data": { "product": { "id": "1" } } }),
            ),
        )
        .with(
            "inventory",
            MockSource::new().with_failure(INVENTORY_WEIGHT, "connection refused"),
        )
        .with("shipping", MockSource::new());
    let gateway = gateway(catalog_inventory_shipping(), services);
    let operation = Operation::query([Field::new("product")
        .argument("id", "1")
        .selections([Field::new("weight"), Field::new("shippingEstimate")])]);

    let response = execute(&gateway, &operation, json!({})).await;
    assert_eq!(
        response["data"],
        json!({ "product": { "weight": null, "shippingEstimate": null } })
    );
    assert_eq!(
        response["errors"],
        json!([
            {
                "message": "request to source 'inventory' failed: connection refused",
                "path": ["product", "weight"],
                "extensions": {
                    "service": "inventory",
                    "reason": "connection refused",
                    "code": "SOURCE_REQUEST_FAILED",
                    "stepId": 1,
                    "source": "inventory"
                }
            },
            {
                "message": "a value required by this field could not be fetched by step 1",
                "path": ["product", "shippingEstimate"],
                "extensions": {
                    "step": 1,
                    "code": "DEPENDENCY_FAILED",
                    "stepId": 2,
                    "source": "shipping"
                }
            }
        ])
    );
}
