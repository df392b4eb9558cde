//! The client operation model.
//!
//! Parsing and validation happen before planning; the planner receives an [`Operation`] already
//! shaped as a selection set tree. The same model describes the sub-operations the planner
//! sends to source schemas, and its `Display` implementation prints them as GraphQL documents.

mod display;

use indexmap::IndexMap;
use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;

use crate::schema::FieldType;

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OperationKind {
    #[default]
    Query,
    Mutation,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(default)]
    pub kind: OperationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<VariableDefinition>,
    pub selection_set: SelectionSet,
}

impl Operation {
    pub fn query(selections: impl IntoIterator<Item = impl Into<Selection>>) -> Self {
        Self {
            kind: OperationKind::Query,
            name: None,
            variables: Vec::new(),
            selection_set: SelectionSet::new(selections),
        }
    }

    pub fn mutation(selections: impl IntoIterator<Item = impl Into<Selection>>) -> Self {
        Self {
            kind: OperationKind::Mutation,
            ..Self::query(selections)
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn variable(mut self, definition: VariableDefinition) -> Self {
        self.variables.push(definition);
        self
    }

    pub fn variable_definition(&self, name: &str) -> Option<&VariableDefinition> {
        self.variables.iter().find(|definition| definition.name == name)
    }

    /// Hash of the normalized operation, identifying its shape independently of variable values
    /// and of argument ordering.
    pub fn hash(&self) -> OperationHash {
        let mut normalized = self.clone();
        normalized.selection_set.normalize();
        let mut hasher = Sha256::new();
        // Serializing plain data into a vector cannot fail.
        if let Ok(bytes) = serde_json::to_vec(&normalized) {
            hasher.update(bytes);
        }
        OperationHash(hasher.finalize().to_vec())
    }

    /// Request variables with the operation's default values applied.
    pub fn coerce_variables(
        &self,
        variables: &serde_json::Map<String, serde_json::Value>,
    ) -> serde_json::Map<String, serde_json::Value> {
        let mut coerced = variables.clone();
        for definition in &self.variables {
            if let Some(default) = &definition.default_value {
                coerced
                    .entry(definition.name.clone())
                    .or_insert_with(|| default.clone());
            }
        }
        coerced
    }
}

/// Hash of a normalized [`Operation`], displayed as hex.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationHash(#[serde(with = "hex")] Vec<u8>);

impl std::fmt::Display for OperationHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
}

impl VariableDefinition {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            default_value: None,
        }
    }

    pub fn with_default(mut self, value: serde_json::Value) -> Self {
        self.default_value = Some(value);
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectionSet(pub Vec<Selection>);

impl SelectionSet {
    pub fn new(selections: impl IntoIterator<Item = impl Into<Selection>>) -> Self {
        Self(selections.into_iter().map(Into::into).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Selection> {
        self.0.iter()
    }

    fn normalize(&mut self) {
        for selection in &mut self.0 {
            match selection {
                Selection::Field(field) => {
                    field.arguments.sort_keys();
                    field.selection_set.normalize();
                }
                Selection::InlineFragment(fragment) => fragment.selection_set.normalize(),
            }
        }
    }

    /// Names of every variable referenced in arguments or conditions, in document order.
    pub fn variable_references(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_variable_references(&mut names);
        names
    }

    fn collect_variable_references(&self, names: &mut Vec<String>) {
        fn push(name: &str, names: &mut Vec<String>) {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        for selection in &self.0 {
            let (conditions, selection_set) = match selection {
                Selection::Field(field) => {
                    for value in field.arguments.values() {
                        for name in value.variable_references() {
                            push(name, names);
                        }
                    }
                    (&field.conditions, &field.selection_set)
                }
                Selection::InlineFragment(fragment) => {
                    (&fragment.conditions, &fragment.selection_set)
                }
            };
            for condition in conditions {
                if let ConditionValue::Variable(name) = condition.value() {
                    push(name.as_str(), names);
                }
            }
            selection_set.collect_variable_references(names);
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Selection {
    Field(Field),
    InlineFragment(InlineFragment),
}

impl From<Field> for Selection {
    fn from(field: Field) -> Self {
        Self::Field(field)
    }
}

impl From<InlineFragment> for Selection {
    fn from(fragment: InlineFragment) -> Self {
        Self::InlineFragment(fragment)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub arguments: IndexMap<String, InputValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "SelectionSet::is_empty")]
    pub selection_set: SelectionSet,
}

impl Field {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            alias: None,
            name: name.into(),
            arguments: IndexMap::new(),
            conditions: Vec::new(),
            selection_set: SelectionSet::default(),
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn argument(mut self, name: impl Into<String>, value: impl Into<InputValue>) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn selections(mut self, selections: impl IntoIterator<Item = impl Into<Selection>>) -> Self {
        self.selection_set = SelectionSet::new(selections);
        self
    }

    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineFragment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_condition: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    pub selection_set: SelectionSet,
}

impl InlineFragment {
    pub fn on(type_condition: impl Into<String>) -> Self {
        Self {
            type_condition: Some(type_condition.into()),
            conditions: Vec::new(),
            selection_set: SelectionSet::default(),
        }
    }

    pub fn untyped() -> Self {
        Self {
            type_condition: None,
            conditions: Vec::new(),
            selection_set: SelectionSet::default(),
        }
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn selections(mut self, selections: impl IntoIterator<Item = impl Into<Selection>>) -> Self {
        self.selection_set = SelectionSet::new(selections);
        self
    }
}

/// `@skip(if: ...)` or `@include(if: ...)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Condition {
    Skip(ConditionValue),
    Include(ConditionValue),
}

impl Condition {
    pub fn value(&self) -> &ConditionValue {
        match self {
            Self::Skip(value) | Self::Include(value) => value,
        }
    }

    /// Whether the condition lets the selection through for these request variables.
    ///
    /// A missing or non-boolean variable counts as `false`.
    pub fn passes(&self, variables: &serde_json::Map<String, serde_json::Value>) -> bool {
        let value = match self.value() {
            ConditionValue::Literal(value) => *value,
            ConditionValue::Variable(name) => variables
                .get(name)
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false),
        };
        match self {
            Self::Skip(_) => !value,
            Self::Include(_) => value,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Literal(bool),
    Variable(String),
}

/// An argument value. Variables are written `{"$var": "name"}` and enum values
/// `{"$enum": "VALUE"}` in the JSON form; anything else is a literal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    List(Vec<InputValue>),
    Variable(VariableReference),
    Enum(EnumValue),
    Object(IndexMap<String, InputValue>),
    Scalar(serde_json::Value),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariableReference {
    #[serde(rename = "$var")]
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnumValue {
    #[serde(rename = "$enum")]
    pub value: String,
}

impl InputValue {
    pub fn variable(name: impl Into<String>) -> Self {
        Self::Variable(VariableReference { name: name.into() })
    }

    pub fn enum_value(value: impl Into<String>) -> Self {
        Self::Enum(EnumValue {
            value: value.into(),
        })
    }

    pub fn as_variable(&self) -> Option<&str> {
        match self {
            Self::Variable(reference) => Some(&reference.name),
            _ => None,
        }
    }

    pub fn variable_references(&self) -> Vec<&str> {
        match self {
            Self::Variable(reference) => vec![reference.name.as_str()],
            Self::List(values) => values.iter().flat_map(Self::variable_references).collect(),
            Self::Object(fields) => fields
                .values()
                .flat_map(Self::variable_references)
                .collect(),
            Self::Enum(_) | Self::Scalar(_) => Vec::new(),
        }
    }

    /// Evaluates the value against request variables.
    pub fn resolve(
        &self,
        variables: &serde_json::Map<String, serde_json::Value>,
    ) -> serde_json::Value {
        match self {
            Self::Variable(reference) => variables
                .get(&reference.name)
                .cloned()
                .unwrap_or(serde_json::Value::Null),
            Self::Enum(value) => serde_json::Value::String(value.value.clone()),
            Self::List(values) => values.iter().map(|v| v.resolve(variables)).collect(),
            Self::Object(fields) => serde_json::Value::Object(
                fields
                    .iter()
                    .map(|(name, value)| (name.clone(), value.resolve(variables)))
                    .collect(),
            ),
            Self::Scalar(value) => value.clone(),
        }
    }
}

impl From<&str> for InputValue {
    fn from(value: &str) -> Self {
        Self::Scalar(value.into())
    }
}

impl From<String> for InputValue {
    fn from(value: String) -> Self {
        Self::Scalar(value.into())
    }
}

impl From<i64> for InputValue {
    fn from(value: i64) -> Self {
        Self::Scalar(value.into())
    }
}

impl From<bool> for InputValue {
    fn from(value: bool) -> Self {
        Self::Scalar(value.into())
    }
}
