use fusion_planner::PlanningError;
use fusion_planner::operation::Field;
use fusion_planner::operation::InputValue;
use fusion_planner::operation::Operation;
use fusion_planner::schema::SchemaCoordinate;
use pretty_assertions::assert_eq;

use crate::query_plan::build_query_plan_support::catalog_and_pricing;

#[test]
fn fields_no_source_can_reach_are_unsatisfiable() {
    let mut schema = catalog_and_pricing();
    schema["types"][1]["lookups"] = serde_json::json!([]);
    let planner = planner!(schema);

    let error = planner
        .build_query_plan(&Operation::query([Field::new("product")
            .argument("id", "1")
            .selections([Field::new("name"), Field::new("price")])]))
        .unwrap_err();
    assert_eq!(
        error,
        PlanningError::UnsatisfiableField {
            coordinate: SchemaCoordinate::new("Product", "price"),
            reason: "no source resolving it can look up `Product` objects".to_string(),
        }
    );
    assert_eq!(
        error.to_string(),
        "Cannot resolve field `Product.price`: no source resolving it can look up `Product` objects"
    );
}

#[test]
fn undefined_variables_fail_planning() {
    let planner = planner!(catalog_and_pricing());
    let error = planner
        .build_query_plan(&Operation::query([Field::new("product")
            .argument("id", InputValue::variable("productId"))
            .selections([Field::new("name")])]))
        .unwrap_err();
    assert_eq!(error, PlanningError::UnknownVariable("productId".to_string()));
}

#[test]
fn unknown_fields_fail_planning() {
    let planner = planner!(catalog_and_pricing());
    let error = planner
        .build_query_plan(&Operation::query([Field::new("product")
            .argument("id", "1")
            .selections([Field::new("sku")])]))
        .unwrap_err();
    assert_eq!(
        error,
        PlanningError::UnknownField {
            type_name: "Product".to_string(),
            field_name: "sku".to_string(),
        }
    );
}

#[test]
fn mutations_need_a_mutation_type() {
    let planner = planner!(catalog_and_pricing());
    let error = planner
        .build_query_plan(&Operation::mutation([Field::new("product")]))
        .unwrap_err();
    assert_eq!(error, PlanningError::UnsupportedOperation("mutation".to_string()));
}
