use serde::Deserialize;
use serde::Serialize;

use crate::error::PlanningError;
use crate::operation::Condition;
use crate::operation::Operation;
use crate::operation::OperationKind;
use crate::operation::Selection;
use crate::operation::SelectionSet;
use crate::schema::CompositeSchema;
use crate::schema::FieldType;
use crate::schema::TYPENAME_FIELD;

/// The client's selection set resolved against the composite schema.
///
/// Source documents carry extra fields (keys, requirements, `__typename`) and may split one client
/// field across several steps. The shape is what the response is projected onto once every step
/// has written its data: response keys in request order, with the declared field types deciding
/// where nulls propagate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseShape {
    pub root_type: String,
    pub selections: Vec<ShapeSelection>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ShapeSelection {
    Field(ShapeField),
    Fragment(ShapeFragment),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeField {
    pub response_key: String,
    pub field_name: String,
    #[serde(rename = "type")]
    pub ty: FieldType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selections: Vec<ShapeSelection>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeFragment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_condition: Option<String>,
    /// Concrete types the fragment applies to. Empty when there is no type condition.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub possible_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    pub selections: Vec<ShapeSelection>,
}

impl ShapeField {
    pub fn is_included(&self, variables: &serde_json::Map<String, serde_json::Value>) -> bool {
        self.conditions
            .iter()
            .all(|condition| condition.passes(variables))
    }

    pub fn is_typename(&self) -> bool {
        self.field_name == TYPENAME_FIELD
    }
}

impl ShapeFragment {
    pub fn is_included(&self, variables: &serde_json::Map<String, serde_json::Value>) -> bool {
        self.conditions
            .iter()
            .all(|condition| condition.passes(variables))
    }

    pub fn applies_to(&self, type_name: &str) -> bool {
        self.type_condition.is_none() || self.possible_types.iter().any(|t| t == type_name)
    }
}

impl ResponseShape {
    pub(crate) fn build(
        schema: &CompositeSchema,
        operation: &Operation,
    ) -> Result<Self, PlanningError> {
        let root_type = match operation.kind {
            OperationKind::Query => schema.query_type().to_string(),
            OperationKind::Mutation => schema
                .mutation_type()
                .ok_or_else(|| PlanningError::UnsupportedOperation(operation.kind.to_string()))?
                .to_string(),
        };
        let selections = shape_selections(schema, &root_type, &operation.selection_set)?;
        Ok(Self {
            root_type,
            selections,
        })
    }
}

fn shape_selections(
    schema: &CompositeSchema,
    parent_type: &str,
    selection_set: &SelectionSet,
) -> Result<Vec<ShapeSelection>, PlanningError> {
    let mut selections = Vec::with_capacity(selection_set.0.len());
    for selection in selection_set.iter() {
        match selection {
            Selection::Field(field) if field.name == TYPENAME_FIELD => {
                selections.push(ShapeSelection::Field(ShapeField {
                    response_key: field.response_key().to_string(),
                    field_name: field.name.clone(),
                    ty: FieldType::named("String").non_null(),
                    conditions: field.conditions.clone(),
                    selections: Vec::new(),
                }));
            }
            Selection::Field(field) => {
                let definition = schema
                    .field_definition(parent_type, &field.name)
                    .ok_or_else(|| PlanningError::UnknownField {
                        type_name: parent_type.to_string(),
                        field_name: field.name.clone(),
                    })?;
                let named = definition.ty.named_type();
                let composite = schema
                    .type_definition(named)
                    .ok_or_else(|| PlanningError::UnknownType(named.to_string()))?
                    .is_composite();
                let children = if composite {
                    shape_selections(schema, named, &field.selection_set)?
                } else {
                    Vec::new()
                };
                selections.push(ShapeSelection::Field(ShapeField {
                    response_key: field.response_key().to_string(),
                    field_name: field.name.clone(),
                    ty: definition.ty.clone(),
                    conditions: field.conditions.clone(),
                    selections: children,
                }));
            }
            Selection::InlineFragment(fragment) => {
                let (type_name, possible_types) = match &fragment.type_condition {
                    Some(type_condition) => {
                        let definition = schema
                            .type_definition(type_condition)
                            .ok_or_else(|| PlanningError::UnknownType(type_condition.clone()))?;
                        let possible_types = if definition.is_abstract() {
                            schema.possible_types(type_condition).to_vec()
                        } else {
                            vec![type_condition.clone()]
                        };
                        (type_condition.as_str(), possible_types)
                    }
                    None => (parent_type, Vec::new()),
                };
                selections.push(ShapeSelection::Fragment(ShapeFragment {
                    type_condition: fragment.type_condition.clone(),
                    possible_types,
                    conditions: fragment.conditions.clone(),
                    selections: shape_selections(schema, type_name, &fragment.selection_set)?,
                }));
            }
        }
    }
    Ok(selections)
}
