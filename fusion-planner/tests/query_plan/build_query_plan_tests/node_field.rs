use fusion_planner::PlanningError;
use fusion_planner::operation::Field;
use fusion_planner::operation::InlineFragment;
use fusion_planner::operation::InputValue;
use fusion_planner::operation::Operation;
use fusion_planner::operation::Selection;
use fusion_planner::operation::VariableDefinition;
use fusion_planner::query_plan::Discriminator;
use fusion_planner::query_plan::PlanStep;
use fusion_planner::schema::FieldType;
use pretty_assertions::assert_eq;
use serde_json::json;

fn accounts_and_products() -> serde_json::Value {
    json!({
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
    })
}

fn node_query(id: impl Into<InputValue>) -> Operation {
    Operation::query([Field::new("node").argument("id", id).selections([
        Selection::from(Field::new("id")),
        InlineFragment::on("User")
            .selections([Field::new("name")])
            .into(),
        InlineFragment::on("Review")
            .selections([Field::new("body")])
            .into(),
    ])])
}

#[test]
fn node_lookups_branch_on_the_type_encoded_in_the_id() {
    let planner = planner!(accounts_and_products());
    let plan = assert_plan!(
        &planner,
        node_query(InputValue::variable("id"))
            .variable(VariableDefinition::new("id", FieldType::named("ID").non_null())),
        @r###"
    QueryPlan(cost: 104) {
      EntityLookup(id: 0, discriminator: nodeId($id), strict) {
        Branch(User, source: accounts) {
          query($id: ID!) { node: userById(id: $id) { __typename id name } }
        }
        Branch(Product, source: products) {
          query($id: ID!) { node: productById(id: $id) { __typename id } }
        }
        Fallback(source: accounts) {
          query($id: ID!) { node(id: $id) { __typename ... on Review { id body } } }
        }
      }
    }
    "###
    );

    let PlanStep::EntityLookup(lookup) = &plan.steps[0] else {
        panic!("expected an entity lookup step");
    };
    assert!(lookup.strict);
    assert_eq!(
        lookup.discriminator,
        Discriminator::NodeId {
            id: InputValue::variable("id")
        }
    );
    assert_eq!(lookup.branch("Product").unwrap().source.as_str(), "products");
    assert_eq!(lookup.branch("Review").unwrap().source.as_str(), "accounts");
    for operation in lookup.branches.values() {
        assert_eq!(operation.owned_fields, vec!["node"]);
        assert_eq!(operation.forwarded_variables, vec!["id"]);
    }
}

#[test]
fn node_field_without_id_is_rejected() {
    let planner = planner!(accounts_and_products());
    let error = planner
        .build_query_plan(&Operation::query([
            Field::new("node").selections([Field::new("id")])
        ]))
        .unwrap_err();
    assert_eq!(
        error,
        PlanningError::InvalidNodeField("missing `id` argument".to_string())
    );
}
