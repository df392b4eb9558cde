//! The composite result document: the response under construction.
//!
//! Every step of a plan writes its sub-result into the document at the paths it was planned
//! for. Paths are decided by the plan, never by completion order, so the document ends up the
//! same whatever order independent steps finish in.

mod completion;

use std::collections::BTreeMap;
use std::collections::HashMap;

use fusion_planner::query_plan::ResponsePath;
use fusion_planner::query_plan::ResponsePathElement;
use fusion_planner::query_plan::StepId;
use fusion_planner::schema::TYPENAME_FIELD;
use serde_json::Value;

use crate::graphql::Error;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::PathElement;
use crate::json_ext::ValueExt;

/// The data tree and errors of one request, before projection onto the client's selection.
#[derive(Debug, Clone)]
pub struct CompositeResultDocument {
    data: Value,
    invalidated: Vec<Path>,
    errors: BTreeMap<(StepId, usize), Vec<Error>>,
    withheld: HashMap<(StepId, Path), Withheld>,
}

/// Errors of a step owning no client field, on one object.
#[derive(Debug, Clone)]
struct Withheld {
    instance: usize,
    errors: Vec<Error>,
    forwarded: bool,
}

impl Default for CompositeResultDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl CompositeResultDocument {
    pub fn new() -> Self {
        Self {
            data: Value::Object(Object::new()),
            invalidated: Vec::new(),
            errors: BTreeMap::new(),
            withheld: HashMap::new(),
        }
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn value_at(&self, path: &Path) -> Option<&Value> {
        self.data.get_path(path)
    }

    /// Whether `path` or one of its ancestors was invalidated.
    pub fn is_invalidated(&self, path: &Path) -> bool {
        self.invalidated
            .iter()
            .any(|invalidated| path.starts_with(invalidated))
    }

    /// Deep merges `value` into the document at `path`.
    ///
    /// Writes at or below an invalidated path are dropped. Returns whether anything was written.
    pub fn patch(&mut self, path: &Path, mut value: Value) -> bool {
        if self.is_invalidated(path) {
            tracing::warn!(%path, "dropped write below an invalidated path");
            return false;
        }
        for invalidated in &self.invalidated {
            if invalidated.starts_with(path) {
                let relative = Path(invalidated.0[path.len()..].to_vec());
                remove_path(&mut value, &relative);
            }
        }

        if let Some(target) = self.data.get_path_mut(path) {
            target.deep_merge(value);
            return true;
        }
        let parent = path
            .parent()
            .and_then(|parent| self.data.get_path_mut(&parent));
        match (parent, path.last_key()) {
            (Some(Value::Object(parent)), Some(key)) => {
                parent.insert(key.to_string(), value);
                true
            }
            _ => {
                tracing::warn!(%path, "dropped write to a path missing from the document");
                false
            }
        }
    }

    /// Nulls the value at `path`; later writes at or below it are dropped.
    pub fn invalidate(&mut self, path: &Path) {
        if self.is_invalidated(path) {
            return;
        }
        match path.parent().and_then(|parent| self.data.get_path_mut(&parent)) {
            Some(Value::Object(parent)) => {
                if let Some(key) = path.last_key() {
                    parent.insert(key.to_string(), Value::Null);
                }
            }
            Some(Value::Array(items)) => {
                if let Some(item) = path.0.last().and_then(|last| match last {
                    PathElement::Index(index) => items.get_mut(*index),
                    PathElement::Key(_) => None,
                }) {
                    *item = Value::Null;
                }
            }
            _ => {}
        }
        self.invalidated.retain(|invalidated| !invalidated.starts_with(path));
        self.invalidated.push(path.clone());
    }

    /// Paths of the objects a step attaches to: `response_path` expanded over every list item,
    /// keeping objects whose `__typename` matches `type_condition` when there is one.
    ///
    /// Null, missing and invalidated positions have no instance.
    pub fn instances(&self, response_path: &ResponsePath, type_condition: Option<&str>) -> Vec<Path> {
        let mut instances = Vec::new();
        let elements: Vec<&ResponsePathElement> = response_path.iter().collect();
        self.expand(&self.data, &elements, Path::empty(), type_condition, &mut instances);
        instances
    }

    fn expand(
        &self,
        value: &Value,
        remaining: &[&ResponsePathElement],
        current: Path,
        type_condition: Option<&str>,
        instances: &mut Vec<Path>,
    ) {
        if self.is_invalidated(&current) {
            return;
        }
        match remaining.split_first() {
            None => {
                let Value::Object(object) = value else {
                    return;
                };
                let matches = match type_condition {
                    Some(type_condition) => {
                        object.get(TYPENAME_FIELD).and_then(Value::as_str) == Some(type_condition)
                    }
                    None => true,
                };
                if matches {
                    instances.push(current);
                }
            }
            Some((ResponsePathElement::Key(key), rest)) => {
                if let Some(child) = value.as_object().and_then(|object| object.get(key)) {
                    self.expand(child, rest, current.join_key(key), type_condition, instances);
                }
            }
            Some((ResponsePathElement::List, rest)) => {
                if let Value::Array(items) = value {
                    for (index, item) in items.iter().enumerate() {
                        self.expand(item, rest, current.join_index(index), type_condition, instances);
                    }
                }
            }
        }
    }

    /// Records an error raised by `step` while resolving its `instance`-th object.
    pub fn push_error(&mut self, step: StepId, instance: usize, error: Error) {
        self.errors.entry((step, instance)).or_default().push(error);
    }

    /// Errors recorded so far, by step then instance.
    pub fn errors(&self) -> impl Iterator<Item = &Error> {
        self.errors.values().flatten()
    }

    /// Holds back an error of a step that only fetched data for other steps. The steps that
    /// needed the data report it at their own fields through [`Self::forward_withheld`].
    pub(crate) fn withhold_error(&mut self, step: StepId, instance: usize, object: Path, error: Error) {
        self.withheld
            .entry((step, object))
            .or_insert_with(|| Withheld {
                instance,
                errors: Vec::new(),
                forwarded: false,
            })
            .errors
            .push(error);
    }

    /// The errors `step` withheld on the object enclosing `path`, with that object's path.
    pub(crate) fn withheld_errors(&self, step: StepId, path: &Path) -> Option<(Path, &[Error])> {
        (0..=path.len()).rev().find_map(|len| {
            let object = Path(path.0[..len].to_vec());
            let withheld = self.withheld.get(&(step, object.clone()))?;
            Some((object, withheld.errors.as_slice()))
        })
    }

    /// Marks errors returned by [`Self::withheld_errors`] as reported elsewhere.
    pub(crate) fn forward_withheld(&mut self, step: StepId, object: &Path) {
        if let Some(withheld) = self.withheld.get_mut(&(step, object.clone())) {
            withheld.forwarded = true;
        }
    }

    /// Withheld errors no step reported are kept where they were raised.
    pub(crate) fn into_parts(mut self) -> (Value, Vec<Error>) {
        for ((step, _), withheld) in std::mem::take(&mut self.withheld) {
            if !withheld.forwarded {
                self.errors
                    .entry((step, withheld.instance))
                    .or_default()
                    .extend(withheld.errors);
            }
        }
        (self.data, self.errors.into_values().flatten().collect())
    }
}

fn remove_path(value: &mut Value, path: &Path) {
    let Some((last, parent)) = path.0.split_last() else {
        *value = Value::Null;
        return;
    };
    if let (Some(Value::Object(object)), PathElement::Key(key)) =
        (value.get_path_mut(&Path(parent.to_vec())), last)
    {
        object.remove(key);
    }
}
