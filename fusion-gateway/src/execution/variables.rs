//! Per-instance inputs of a step: variable values and lookup branch choice.

use base64::Engine as _;
use base64::prelude::BASE64_STANDARD;
use fusion_planner::query_plan::Discriminator;
use fusion_planner::query_plan::EntityLookupPlanStep;
use fusion_planner::query_plan::SourceOperation;
use serde_json::Value;

use super::fetch::FailureCause;
use super::node::ExecutionNode;
use crate::error::FetchError;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::response::CompositeResultDocument;

/// Variables of `operation` for the object at `instance`.
///
/// Bound values are read from the document, where their producing step wrote them. Returns
/// `Ok(None)` when a required value is absent although its producer succeeded: there is nothing
/// to look up for that object. A value missing because its producer failed carries over the
/// errors that producer withheld, if any.
pub(crate) fn resolve_variables(
    operation: &SourceOperation,
    document: &CompositeResultDocument,
    nodes: &[ExecutionNode<'_>],
    instance: &Path,
    request_variables: &Object,
) -> Result<Option<Object>, FailureCause> {
    let mut variables = Object::new();
    for binding in &operation.variables {
        let path = instance.join(Path::from_slice(binding.path.segments()));
        match document.value_at(&path) {
            Some(value) if !value.is_null() => {
                variables.insert(binding.name.clone(), value.clone());
            }
            _ if nodes
                .get(binding.producer.0)
                .is_some_and(ExecutionNode::is_failed) =>
            {
                return Err(match document.withheld_errors(binding.producer, &path) {
                    Some((object, errors)) => FailureCause::Inherited {
                        producer: binding.producer,
                        object,
                        errors: errors.to_vec(),
                    },
                    None => FetchError::DependencyFailed {
                        step: binding.producer.0,
                    }
                    .into(),
                });
            }
            _ if binding.ty.is_non_null() => return Ok(None),
            _ => {
                variables.insert(binding.name.clone(), Value::Null);
            }
        }
    }
    for name in &operation.forwarded_variables {
        if let Some(value) = request_variables.get(name) {
            variables.insert(name.clone(), value.clone());
        }
    }
    Ok(Some(variables))
}

/// The branch of `step` resolving the object at `instance`.
///
/// `Ok(None)` means no operation applies and the object is left alone; a strict step reports
/// that as an error instead.
pub(crate) fn select_branch<'a>(
    step: &'a EntityLookupPlanStep,
    document: &CompositeResultDocument,
    instance: &Path,
    request_variables: &Object,
) -> Result<Option<(usize, &'a SourceOperation)>, FetchError> {
    let (discriminator, selected) = match &step.discriminator {
        Discriminator::Field { path, .. } => {
            let path = instance.join(Path::from_slice(path.segments()));
            match document.value_at(&path).and_then(Value::as_str) {
                Some(value) => (value.to_string(), branch(step, value)),
                None => ("null".to_string(), None),
            }
        }
        Discriminator::NodeId { id } => {
            let id = id.resolve(request_variables);
            match node_type(&id) {
                Some(type_name) => {
                    let selected = branch(step, &type_name);
                    (type_name, selected)
                }
                None => (id.to_string(), fallback(step)),
            }
        }
    };
    match selected {
        Some(selected) => Ok(Some(selected)),
        None if step.strict => Err(FetchError::NoMatchingBranch { discriminator }),
        None => Ok(None),
    }
}

/// Branch operations are numbered in declaration order; the fallback comes last.
fn branch<'a>(step: &'a EntityLookupPlanStep, discriminator: &str) -> Option<(usize, &'a SourceOperation)> {
    match step.branches.get_full(discriminator) {
        Some((index, _, operation)) => Some((index, operation)),
        None => fallback(step),
    }
}

fn fallback(step: &EntityLookupPlanStep) -> Option<(usize, &SourceOperation)> {
    step.fallback
        .as_ref()
        .map(|operation| (step.branches.len(), operation))
}

/// The type name a global object identifier encodes: base64 of `TypeName:key`.
pub(crate) fn node_type(id: &Value) -> Option<String> {
    let decoded = BASE64_STANDARD.decode(id.as_str()?).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (type_name, _) = decoded.split_once(':')?;
    Some(type_name.to_string())
}

/// Encodes a global object identifier for `type_name`.
pub fn node_id(type_name: &str, key: &str) -> String {
    BASE64_STANDARD.encode(format!("{type_name}:{key}"))
}
