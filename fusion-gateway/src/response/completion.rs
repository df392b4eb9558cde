//! Projection of the assembled data onto the client's selection, with null propagation.

use fusion_planner::query_plan::ResponseShape;
use fusion_planner::query_plan::ShapeField;
use fusion_planner::query_plan::ShapeSelection;
use fusion_planner::schema::FieldType;
use indexmap::IndexMap;
use serde_json::Value;

use super::CompositeResultDocument;
use crate::error::CompositionError;
use crate::graphql::Error;
use crate::graphql::Response;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::PathElement;

/// A null reached a non-null position and has to move up to the nearest nullable one.
#[derive(Debug)]
struct InvalidValue;

struct CompletionParameters<'a> {
    variables: &'a Object,
    /// Errors steps recorded, ahead of the ones completion adds.
    step_errors: &'a [Error],
    errors: Vec<Error>,
}

impl CompletionParameters<'_> {
    fn has_error_at_or_below(&self, path: &Path) -> bool {
        self.step_errors
            .iter()
            .chain(self.errors.iter())
            .filter_map(|error| error.path.as_ref())
            .any(|error_path| error_path.starts_with(path))
    }

    fn non_null_violation(&mut self, path: &Path, error: CompositionError) {
        if self.has_error_at_or_below(path) {
            return;
        }
        tracing::warn!(%path, "{error}");
        self.errors.push(error.to_graphql_error(path.clone()));
    }
}

impl CompositeResultDocument {
    /// Builds the client response: response keys in request order, fields the client did not
    /// select dropped, and nulls in non-null positions promoted to the nearest nullable ancestor.
    ///
    /// Errors are the ones steps recorded, by step then instance, followed by non-null violations
    /// no step error already explains, in document order.
    pub fn complete(self, shape: &ResponseShape, variables: &Object) -> Response {
        let (data, step_errors) = self.into_parts();
        let mut parameters = CompletionParameters {
            variables,
            step_errors: &step_errors,
            errors: Vec::new(),
        };
        let root = data.as_object().cloned().unwrap_or_default();
        let selections: Vec<&ShapeSelection> = shape.selections.iter().collect();
        let data = match complete_selection_set(
            &mut parameters,
            &root,
            &shape.root_type,
            &selections,
            &Path::empty(),
        ) {
            Ok(object) => Value::Object(object),
            Err(InvalidValue) => Value::Null,
        };
        let composition_errors = parameters.errors;

        let mut errors = step_errors;
        errors.extend(composition_errors);
        Response::builder().data(data).errors(errors).build()
    }
}

/// Response keys selected on an object of `type_name`, with the shape fields merged under each.
fn collect_fields<'s>(
    variables: &Object,
    type_name: &str,
    selections: &[&'s ShapeSelection],
    fields: &mut IndexMap<&'s str, Vec<&'s ShapeField>>,
) {
    for &selection in selections {
        match selection {
            ShapeSelection::Field(field) => {
                if field.is_included(variables) {
                    fields
                        .entry(field.response_key.as_str())
                        .or_default()
                        .push(field);
                }
            }
            ShapeSelection::Fragment(fragment) => {
                if fragment.is_included(variables) && fragment.applies_to(type_name) {
                    let nested: Vec<&ShapeSelection> = fragment.selections.iter().collect();
                    collect_fields(variables, type_name, &nested, fields);
                }
            }
        }
    }
}

fn complete_selection_set(
    parameters: &mut CompletionParameters<'_>,
    input: &Object,
    type_name: &str,
    selections: &[&ShapeSelection],
    path: &Path,
) -> Result<Object, InvalidValue> {
    let mut fields = IndexMap::new();
    collect_fields(parameters.variables, type_name, selections, &mut fields);

    let mut output = Object::new();
    for (response_key, fields) in fields {
        let Some(field) = fields.first() else {
            continue;
        };
        if field.is_typename() {
            output.insert(
                response_key.to_string(),
                Value::String(type_name.to_string()),
            );
            continue;
        }
        let sub_selections: Vec<&ShapeSelection> = fields
            .iter()
            .flat_map(|field| field.selections.iter())
            .collect();
        let value = complete_value(
            parameters,
            input.get(response_key),
            &field.ty,
            &sub_selections,
            &path.join_key(response_key),
            type_name,
        )?;
        output.insert(response_key.to_string(), value);
    }
    Ok(output)
}

fn complete_value(
    parameters: &mut CompletionParameters<'_>,
    input: Option<&Value>,
    field_type: &FieldType,
    selections: &[&ShapeSelection],
    path: &Path,
    parent_type: &str,
) -> Result<Value, InvalidValue> {
    match field_type {
        // a null for a non null type is invalid: the error goes up until the next nullable
        // parent, which completes to null
        FieldType::NonNull(inner_type) => {
            let value = complete_value(parameters, input, inner_type, selections, path, parent_type)?;
            if !value.is_null() {
                return Ok(value);
            }
            let error = match path.0.last() {
                Some(PathElement::Index(index)) => CompositionError::NonNullListItem {
                    item_type: inner_type.to_string(),
                    index: *index,
                },
                Some(PathElement::Key(field_name)) => CompositionError::NonNullViolation {
                    type_name: parent_type.to_string(),
                    field_name: field_name.clone(),
                },
                None => return Err(InvalidValue),
            };
            parameters.non_null_violation(path, error);
            Err(InvalidValue)
        }

        // an invalid item nulls the entire list
        FieldType::List(inner_type) => match input {
            Some(Value::Array(items)) => {
                let mut output = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    match complete_value(
                        parameters,
                        Some(item),
                        inner_type,
                        selections,
                        &path.join_index(index),
                        parent_type,
                    ) {
                        Ok(value) => output.push(value),
                        Err(InvalidValue) => return Ok(Value::Null),
                    }
                }
                Ok(Value::Array(output))
            }
            _ => Ok(Value::Null),
        },

        FieldType::Named(type_name) => match input {
            None | Some(Value::Null) => Ok(Value::Null),
            Some(Value::Object(object)) if !selections.is_empty() => {
                let runtime_type = object
                    .get(fusion_planner::schema::TYPENAME_FIELD)
                    .and_then(Value::as_str)
                    .unwrap_or(type_name);
                match complete_selection_set(parameters, object, runtime_type, selections, path) {
                    Ok(object) => Ok(Value::Object(object)),
                    Err(InvalidValue) => Ok(Value::Null),
                }
            }
            Some(value) if selections.is_empty() => Ok(value.clone()),
            // not an object where one is expected
            Some(_) => Ok(Value::Null),
        },
    }
}
