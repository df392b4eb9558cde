use fusion_gateway::Operation;
use fusion_gateway::SourceServices;
use fusion_gateway::execution::node_id;
use fusion_gateway::test_harness::CallLog;
use fusion_gateway::test_harness::MockSource;
use fusion_planner::operation::Field;
use fusion_planner::operation::InlineFragment;
use fusion_planner::operation::InputValue;
use fusion_planner::operation::Selection;
use fusion_planner::operation::VariableDefinition;
use fusion_planner::schema::FieldType;
use pretty_assertions::assert_eq;
use serde_json::json;

use super::common::execute;
use super::common::gateway;
use super::common::schema;

const USER: &str = "query($id: ID!) { node: userById(id: $id) { __typename id name } }";
const PRODUCT: &str = "query($id: ID!) { node: productById(id: $id) { __typename id } }";
const FALLBACK: &str = "query($id: ID!) { node(id: $id) { __typename ... on Review { id body } } }";

fn accounts_and_products() -> fusion_gateway::CompositeSchema {
    schema(json!({
        "sources": [{ "name": "accounts" }, { "name": "products" }],
        "types": [
            { "kind": "Object", "name": "Query", "fields": [
                { "name": "node", "type": "Node",
                  "arguments": [{ "name": "id", "type": "ID!" }],
                  "sources": [{ "source": "accounts" }] }
            ] },
            { "kind": "Interface", "name": "Node", "fields": [
                { "name": "id", "type": "ID!" }
            ] },
            { "kind": "Object", "name": "User", "implements": ["Node"],
              "fields": [
                { "name": "id", "type": "ID!", "sources": [{ "source": "accounts" }] },
                { "name": "name", "type": "String", "sources": [{ "source": "accounts" }] }
              ],
              "lookups": [
                { "source": "accounts", "field": "userById",
                  "arguments": [{ "name": "id", "type": "ID!", "path": "id" }] }
              ] },
            { "kind": "Object", "name": "Product", "implements": ["Node"],
              "fields": [
                { "name": "id", "type": "ID!", "sources": [{ "source": "products" }] },
                { "name": "title", "type": "String", "sources": [{ "source": "products" }] }
              ],
              "lookups": [
                { "source": "products", "field": "productById",
                  "arguments": [{ "name": "id", "type": "ID!", "path": "id" }] }
              ] },
            { "kind": "Object", "name": "Review", "implements": ["Node"],
              "fields": [
                { "name": "id", "type": "ID!", "sources": [{ "source": "accounts" }] },
                { "name": "body", "type": "String", "sources": [{ "source": "accounts" }] }
              ] }
        ]
    }))
}

fn node_query() -> Operation {
    Operation::query([Field::new("node")
        .argument("id", InputValue::variable("id"))
        .selections([
            Selection::from(Field::new("id")),
            InlineFragment::on("User")
                .selections([Field::new("name")])
                .into(),
            InlineFragment::on("Review")
                .selections([Field::new("body")])
                .into(),
        ])])
    .variable(VariableDefinition::new("id", FieldType::named("ID").non_null()))
}

fn services(log: &CallLog) -> SourceServices {
    let user = node_id("User", "1");
    let product = node_id("Product", "7");
    let review = node_id("Review", "3");
    SourceServices::new()
        .with(
            "accounts",
            MockSource::new()
                .with_json(
                    USER,
                    json!({ "data": { "node": { "__typename": "User", "id": user, "name": "Ada" } } }),
                )
                .with_json(
                    FALLBACK,
                    json!({ "data": { "node": { "__typename": "Review", "id": review, "body": "Great" } } }),
                )
                .with_call_log(log.clone()),
        )
        .with(
            "products",
            MockSource::new()
                .with_json(
                    PRODUCT,
                    json!({ "data": { "node": { "__typename": "Product", "id": product } } }),
                )
                .with_call_log(log.clone()),
        )
}

#[tokio::test]
async fn only_the_branch_of_the_encoded_type_runs() {
    let log = CallLog::new();
    let gateway = gateway(accounts_and_products(), services(&log));
    let id = node_id("Product", "7");

    let response = execute(&gateway, &node_query(), json!({ "id": id })).await;
    assert_eq!(response, json!({ "data": { "node": { "id": id } } }));
    let calls = log.calls();
    assert_eq!(calls.len(), 1, "{calls:#?}");
    assert_eq!(calls[0].source, "products");
    assert_eq!(calls[0].document, PRODUCT);
    assert_eq!(calls[0].variables, json!({ "id": id }).as_object().cloned().unwrap());
}

#[tokio::test]
async fn branches_select_fields_of_their_type() {
    let log = CallLog::new();
    let gateway = gateway(accounts_and_products(), services(&log));
    let id = node_id("User", "1");

    let response = execute(&gateway, &node_query(), json!({ "id": id })).await;
    assert_eq!(
        response,
        json!({ "data": { "node": { "id": id, "name": "Ada" } } })
    );
    assert_eq!(log.calls_to("accounts").len(), 1);
    assert!(log.calls_to("products").is_empty());
}

#[tokio::test]
async fn types_without_a_lookup_use_the_fallback() {
    let log = CallLog::new();
    let gateway = gateway(accounts_and_products(), services(&log));
    let id = node_id("Review", "3");

    let response = execute(&gateway, &node_query(), json!({ "id": id })).await;
    assert_eq!(
        response,
        json!({ "data": { "node": { "id": id, "body": "Great" } } })
    );
    let calls = log.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].document, FALLBACK);
}

/// Every `Node` type has a lookup, so no source is asked to resolve `node` itself.
fn users_and_products() -> fusion_gateway::CompositeSchema {
    schema(json!({
        "sources": [{ "name": "accounts" }, { "name": "products" }],
        "types": [
            { "kind": "Object", "name": "Query", "fields": [
                { "name": "node", "type": "Node",
                  "arguments": [{ "name": "id", "type": "ID!" }],
                  "sources": [{ "source": "accounts" }] }
            ] },
            { "kind": "Interface", "name": "Node", "fields": [
                { "name": "id", "type": "ID!" }
            ] },
            { "kind": "Object", "name": "User", "implements": ["Node"],
              "fields": [
                { "name": "id", "type": "ID!", "sources": [{ "source": "accounts" }] },
                { "name": "name", "type": "String", "sources": [{ "source": "accounts" }] }
              ],
              "lookups": [
                { "source": "accounts", "field": "userById",
                  "arguments": [{ "name": "id", "type": "ID!", "path": "id" }] }
              ] },
            { "kind": "Object", "name": "Product", "implements": ["Node"],
              "fields": [
                { "name": "id", "type": "ID!", "sources": [{ "source": "products" }] }
              ],
              "lookups": [
                { "source": "products", "field": "productById",
                  "arguments": [{ "name": "id", "type": "ID!", "path": "id" }] }
              ] }
        ]
    }))
}

#[tokio::test]
async fn ids_of_types_without_a_branch_are_reported() {
    let log = CallLog::new();
    let services = SourceServices::new()
        .with("accounts", MockSource::new().with_call_log(log.clone()))
        .with("products", MockSource::new().with_call_log(log.clone()));
    let gateway = gateway(users_and_products(), services);
    let operation = Operation::query([Field::new("node")
        .argument("id", InputValue::variable("id"))
        .selections([
            Selection::from(Field::new("id")),
            InlineFragment::on("User")
                .selections([Field::new("name")])
                .into(),
        ])])
    .variable(VariableDefinition::new("id", FieldType::named("ID").non_null()));

    let response = execute(&gateway, &operation, json!({ "id": node_id("Order", "9") })).await;
    assert_eq!(
        response,
        json!({
            "data": { "node": null },
            "errors": [{
                "message": "no lookup branch matches discriminator value 'Order'",
                "path": ["node"],
                "extensions": {
                    "discriminator": "Order",
                    "code": "NO_MATCHING_BRANCH",
                    "stepId": 0
                }
            }]
        })
    );
    assert!(log.calls().is_empty());
}
