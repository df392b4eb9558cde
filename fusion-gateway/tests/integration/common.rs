use fusion_gateway::CompositeSchema;
use fusion_gateway::Configuration;
use fusion_gateway::Gateway;
use fusion_gateway::Operation;
use fusion_gateway::SourceServices;
use fusion_gateway::graphql;
use serde_json::Value;
use serde_json::json;
use tokio_util::sync::CancellationToken;

pub(crate) const CATALOG_PRODUCT: &str = r#"query { product(id: "1") { name id } }"#;
pub(crate) const PRICING_PRODUCT: &str =
    "query($__fusion_1_id: ID!) { productById(id: $__fusion_1_id) { price } }";
pub(crate) const CATALOG_PRODUCTS: &str = "query { products { id } }";
pub(crate) const INVENTORY_PRODUCT: &str =
    "query($__fusion_2_productId: ID!) { stockItem(productId: $__fusion_2_productId) { stock } }";

/// `product(id: ID!): Product` on `catalog`; `price` only on `pricing`, which looks products
/// up by id. `price` is non-null when `price_required`.
pub(crate) fn catalog_and_pricing(price_required: bool) -> CompositeSchema {
    let price_type = if price_required { "Float!" } else { "Float" };
    schema(json!({
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
                { "name": "price", "type": price_type,
                  "sources": [{ "source": "pricing", "requires": "id" }] }
              ],
              "lookups": [
                { "source": "pricing", "field": "productById",
                  "arguments": [{ "name": "id", "type": "ID!", "path": "id" }] }
              ] }
        ]
    }))
}

/// `products: [Product!]!` on `catalog`, with `price` on `pricing` and `stock` on `inventory`.
pub(crate) fn catalog_pricing_inventory() -> CompositeSchema {
    schema(json!({
        "sources": [{ "name": "catalog" }, { "name": "pricing" }, { "name": "inventory" }],
        "types": [
            { "kind": "Object", "name": "Query", "fields": [
                { "name": "products", "type": "[Product!]!", "sources": [{ "source": "catalog" }] }
            ] },
            { "kind": "Object", "name": "Product",
              "fields": [
                { "name": "id", "type": "ID!", "sources": [
                    { "source": "catalog" }, { "source": "pricing" }, { "source": "inventory" }
                ] },
                { "name": "price", "type": "Float", "sources": [{ "source": "pricing" }] },
                { "name": "stock", "type": "Int", "sources": [{ "source": "inventory" }] }
              ],
              "lookups": [
                { "source": "pricing", "field": "productById",
                  "arguments": [{ "name": "id", "type": "ID!", "path": "id" }] },
                { "source": "inventory", "field": "stockItem",
                  "arguments": [{ "name": "productId", "type": "ID!", "path": "id" }] }
              ] }
        ]
    }))
}

/// `shippingEstimate` on `shipping` requires `weight`, which only `inventory` resolves.
pub(crate) fn catalog_inventory_shipping() -> CompositeSchema {
    schema(json!({
        "sources": [{ "name": "catalog" }, { "name": "inventory" }, { "name": "shipping" }],
        "types": [
            { "kind": "Object", "name": "Query", "fields": [
                { "name": "product", "type": "Product",
                  "arguments": [{ "name": "id", "type": "ID!" }],
                  "sources": [{ "source": "catalog" }] }
            ] },
            { "kind": "Object", "name": "Product",
              "fields": [
                { "name": "id", "type": "ID!", "sources": [
                    { "source": "catalog" }, { "source": "inventory" }, { "source": "shipping" }
                ] },
                { "name": "name", "type": "String", "sources": [{ "source": "catalog" }] },
                { "name": "weight", "type": "Int", "sources": [{ "source": "inventory" }] },
                { "name": "shippingEstimate", "type": "Int", "sources": [
                    { "source": "shipping",
                      "requires": { "fields": "weight", "arguments": { "weight": "weight" } } }
                ] }
              ],
              "lookups": [
                { "source": "inventory", "field": "productById",
                  "arguments": [{ "name": "id", "type": "ID!", "path": "id" }] },
                { "source": "shipping", "field": "productById",
                  "arguments": [{ "name": "id", "type": "ID!", "path": "id" }] }
              ] }
        ]
    }))
}

pub(crate) fn schema(definition: Value) -> CompositeSchema {
    CompositeSchema::parse_json(&definition.to_string())
        .unwrap_or_else(|error| panic!("composite schema failed to load: {error}"))
}

pub(crate) fn gateway(schema: CompositeSchema, services: SourceServices) -> Gateway {
    gateway_with_configuration(schema, services, Configuration::default())
}

pub(crate) fn gateway_with_configuration(
    schema: CompositeSchema,
    services: SourceServices,
    configuration: Configuration,
) -> Gateway {
    Gateway::builder()
        .schema(schema)
        .services(services)
        .configuration(configuration)
        .build()
        .expect("gateway is valid")
}

pub(crate) async fn execute(gateway: &Gateway, operation: &Operation, variables: Value) -> Value {
    let response = execute_with(gateway, operation, request(variables), CancellationToken::new()).await;
    serde_json::to_value(response).expect("responses serialize")
}

pub(crate) async fn execute_with(
    gateway: &Gateway,
    operation: &Operation,
    request: graphql::Request,
    cancellation: CancellationToken,
) -> graphql::Response {
    gateway.execute(operation, request, cancellation).await
}

pub(crate) fn request(variables: Value) -> graphql::Request {
    let Value::Object(variables) = variables else {
        panic!("variables must be an object");
    };
    graphql::Request::builder().variables(variables).build()
}
