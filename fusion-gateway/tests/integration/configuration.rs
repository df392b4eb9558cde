use fusion_gateway::Configuration;
use fusion_gateway::Gateway;
use fusion_gateway::Operation;
use fusion_gateway::SourceServices;
use fusion_gateway::error::GatewayError;
use fusion_gateway::test_harness::MockSource;
use fusion_planner::operation::Field;
use pretty_assertions::assert_eq;
use serde_json::json;

use super::common::CATALOG_PRODUCT;
use super::common::PRICING_PRODUCT;
use super::common::catalog_and_pricing;
use super::common::execute;
use super::common::gateway_with_configuration;

#[tokio::test]
async fn gateways_run_with_yaml_configuration() {
    let configuration = Configuration::from_yaml(
        r#"
executor:
  max_concurrency: 1
  max_source_requests: 1
  source_timeout: 2s
query_plan_cache:
  limit: 8
"#,
    )
    .expect("configuration is valid");
    let services = SourceServices::new()
        .with(
            "catalog",
            MockSource::new().with_json(
                CATALOG_PRODUCT,
                json!({ "data": { "product": { "name": "Table", "id": "1" } } }),
            ),
        )
        .with(
            "pricing",
            MockSource::new().with_json(
                PRICING_PRODUCT,
                json!({ "data": { "productById": { "price": 12.5 } } }),
            ),
        );
    let gateway = gateway_with_configuration(catalog_and_pricing(false), services, configuration);
    assert_eq!(gateway.configuration().executor.max_concurrency, 1);

    let operation = Operation::query([Field::new("product")
        .argument("id", "1")
        .selections([Field::new("name"), Field::new("price")])]);
    assert_eq!(
        execute(&gateway, &operation, json!({})).await,
        json!({ "data": { "product": { "name": "Table", "price": 12.5 } } })
    );
}

#[test]
fn invalid_configuration_is_rejected_at_startup() {
    let mut configuration = Configuration::default();
    configuration.executor.max_concurrency = 0;
    let error = Gateway::builder()
        .schema(catalog_and_pricing(false))
        .services(SourceServices::new())
        .configuration(configuration)
        .build()
        .unwrap_err();
    assert!(matches!(error, GatewayError::Configuration(_)), "{error}");
}
