use fusion_planner::operation::Field;
use fusion_planner::operation::Operation;
use fusion_planner::query_plan::PlanStep;
use fusion_planner::query_plan::StepId;
use pretty_assertions::assert_eq;
use serde_json::json;

use crate::query_plan::build_query_plan_support::catalog_and_pricing;

#[test]
fn crosses_an_entity_boundary_through_a_lookup() {
    let planner = planner!(catalog_and_pricing());
    let plan = assert_plan!(
        &planner,
        Operation::query([Field::new("product")
            .argument("id", "1")
            .selections([Field::new("name"), Field::new("price")])]),
        @r###"
    QueryPlan(cost: 204) {
      Operation(id: 0, source: catalog) {
        query { product(id: "1") { name id } }
      }
      Operation(id: 1, source: pricing, path: product, dependsOn: [0]) {
        query($__fusion_1_id: ID!) { productById(id: $__fusion_1_id) { price } }
      }
    }
    "###
    );

    let [PlanStep::Operation(catalog), PlanStep::Operation(pricing)] = plan.steps.as_slice() else {
        panic!("expected two operation steps, got {plan:#?}");
    };
    assert!(catalog.depends_on.is_empty());
    assert_eq!(catalog.operation.owned_fields, vec!["product"]);
    assert_eq!(pricing.depends_on, vec![StepId(0)]);
    assert_eq!(pricing.operation.result_root.as_deref(), Some("productById"));
    assert_eq!(pricing.operation.owned_fields, vec!["price"]);
    let [binding] = pricing.operation.variables.as_slice() else {
        panic!("expected a single variable binding");
    };
    assert_eq!(binding.producer, StepId(0));
    assert_eq!(binding.path.to_string(), "id");
}

#[test]
fn fields_of_the_same_source_stay_in_one_step() {
    let planner = planner!(catalog_and_pricing());
    assert_plan!(
        &planner,
        Operation::query([Field::new("product")
            .argument("id", "1")
            .selections([Field::new("id"), Field::new("name")])]),
        @r###"
    QueryPlan(cost: 103) {
      Operation(id: 0, source: catalog) {
        query { product(id: "1") { id name } }
      }
    }
    "###
    );
}

#[test]
fn independent_lookups_share_a_stage() {
    let planner = planner!(json!({
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
    }));
    let plan = assert_plan!(
        &planner,
        Operation::query([Field::new("products")
            .selections([Field::new("price"), Field::new("stock")])]),
        @r###"
    QueryPlan(cost: 304) {
      Operation(id: 0, source: catalog) {
        query { products { id } }
      }
      Operation(id: 1, source: pricing, path: products.@, dependsOn: [0]) {
        query($__fusion_1_id: ID!) { productById(id: $__fusion_1_id) { price } }
      }
      Operation(id: 2, source: inventory, path: products.@, dependsOn: [0]) {
        query($__fusion_2_productId: ID!) { stockItem(productId: $__fusion_2_productId) { stock } }
      }
    }
    "###
    );
    assert_eq!(
        plan.stages(),
        vec![vec![StepId(0)], vec![StepId(1), StepId(2)]]
    );
    assert_eq!(
        plan.dependents(),
        vec![vec![StepId(1), StepId(2)], vec![], vec![]]
    );
}

#[test]
fn named_operations_name_every_source_document() {
    let planner = planner!(catalog_and_pricing());
    let plan = planner
        .build_query_plan(
            &Operation::query([Field::new("product")
                .argument("id", "1")
                .selections([Field::new("price")])])
            .named("ProductPrice"),
        )
        .unwrap();

    let names: Vec<_> = plan
        .steps
        .iter()
        .map(|step| match step {
            PlanStep::Operation(step) => step.operation.operation_name.clone(),
            PlanStep::EntityLookup(_) => None,
        })
        .collect();
    assert_eq!(
        names,
        vec![
            Some("ProductPrice__catalog__0".to_string()),
            Some("ProductPrice__pricing__1".to_string()),
        ]
    );
    let PlanStep::Operation(pricing) = &plan.steps[1] else {
        panic!("expected an operation step");
    };
    assert_eq!(
        pricing.operation.document,
        "query ProductPrice__pricing__1($__fusion_1_id: ID!) { productById(id: $__fusion_1_id) { price } }"
    );
}

#[test]
fn client_variables_are_forwarded_with_their_types() {
    use fusion_planner::operation::InputValue;
    use fusion_planner::operation::VariableDefinition;
    use fusion_planner::schema::FieldType;

    let planner = planner!(catalog_and_pricing());
    assert_plan!(
        &planner,
        Operation::query([Field::new("product")
            .argument("id", InputValue::variable("id"))
            .selections([Field::new("name")])])
        .variable(VariableDefinition::new("id", FieldType::named("ID").non_null())),
        @r###"
    QueryPlan(cost: 102) {
      Operation(id: 0, source: catalog) {
        query($id: ID!) { product(id: $id) { name } }
      }
    }
    "###
    );
}

#[test]
fn lighter_sources_are_preferred() {
    let planner = planner!(json!({
        "sources": [{ "name": "fast", "weight": 1.0 }, { "name": "slow", "weight": 3.0 }],
        "types": [
            { "kind": "Object", "name": "Query", "fields": [
                { "name": "greeting", "type": "String",
                  "sources": [{ "source": "slow" }, { "source": "fast" }] }
            ] }
        ]
    }));
    assert_plan!(
        &planner,
        Operation::query([Field::new("greeting")]),
        @r###"
    QueryPlan(cost: 101) {
      Operation(id: 0, source: fast) {
        query { greeting }
      }
    }
    "###
    );
}
