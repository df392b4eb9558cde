//! Query plans: the DAG of steps computed once per operation shape.
//!
//! A [`QueryPlan`] is immutable once built. It is shared across requests (and cached) behind an
//! `Arc`; everything request specific lives in the executor's nodes.

mod builder;
mod display;
pub mod query_planner;
mod shape;
mod source_selection;

use std::fmt;

use indexmap::IndexMap;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

pub use self::shape::ResponseShape;
pub use self::shape::ShapeField;
pub use self::shape::ShapeFragment;
pub use self::shape::ShapeSelection;
use crate::error::PlanningError;
use crate::operation::InputValue;
use crate::operation::OperationKind;
use crate::schema::FieldPath;
use crate::schema::FieldType;
use crate::schema::SourceSchemaName;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(pub usize);

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Deserialized plans are validated with [`QueryPlan::validate`] before they are returned.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "UncheckedQueryPlan")]
pub struct QueryPlan {
    pub operation_kind: OperationKind,
    /// Steps in topological order: a step only depends on steps with a lower id.
    pub steps: Vec<PlanStep>,
    pub response_shape: ResponseShape,
    pub cost: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UncheckedQueryPlan {
    operation_kind: OperationKind,
    steps: Vec<PlanStep>,
    response_shape: ResponseShape,
    cost: f64,
}

impl TryFrom<UncheckedQueryPlan> for QueryPlan {
    type Error = PlanningError;

    fn try_from(unchecked: UncheckedQueryPlan) -> Result<Self, Self::Error> {
        let plan = QueryPlan {
            operation_kind: unchecked.operation_kind,
            steps: unchecked.steps,
            response_shape: unchecked.response_shape,
            cost: unchecked.cost,
        };
        plan.validate()?;
        Ok(plan)
    }
}

impl QueryPlan {
    /// Checks that every step is numbered by its position and only reads from, or waits for,
    /// steps positioned before it.
    pub fn validate(&self) -> Result<(), PlanningError> {
        for (index, step) in self.steps.iter().enumerate() {
            let id = step.id();
            if id.0 != index {
                return Err(PlanningError::InvalidPlan(format!(
                    "step at position {index} has id {id}"
                )));
            }
            if let Some(dependency) = step.depends_on().iter().find(|d| d.0 >= index) {
                return Err(PlanningError::InvalidPlan(format!(
                    "step {id} depends on step {dependency}, which is not planned before it"
                )));
            }
            if let Some(producer) = step.producers().find(|p| p.0 >= index) {
                return Err(PlanningError::InvalidPlan(format!(
                    "step {id} reads data of step {producer}, which is not planned before it"
                )));
            }
        }
        Ok(())
    }

    pub fn step(&self, id: StepId) -> Option<&PlanStep> {
        self.steps.get(id.0)
    }

    /// For every step, the steps depending on it.
    pub fn dependents(&self) -> Vec<Vec<StepId>> {
        let mut dependents = vec![Vec::new(); self.steps.len()];
        for step in &self.steps {
            for dependency in step.depends_on() {
                if let Some(list) = dependents.get_mut(dependency.0) {
                    list.push(step.id());
                }
            }
        }
        dependents
    }

    /// Groups of steps that may run concurrently: every step of a stage only depends on steps of
    /// earlier stages.
    pub fn stages(&self) -> Vec<Vec<StepId>> {
        let mut depth: Vec<usize> = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let d = step
                .depends_on()
                .iter()
                .filter_map(|dependency| depth.get(dependency.0))
                .map(|d| d + 1)
                .max()
                .unwrap_or(0);
            depth.push(d);
        }
        let mut stages: Vec<Vec<StepId>> = Vec::new();
        for (step, d) in self.steps.iter().zip(depth) {
            if stages.len() <= d {
                stages.resize_with(d + 1, Vec::new);
            }
            stages[d].push(step.id());
        }
        stages
    }
}

/// One unit of planned work.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", tag = "kind")]
pub enum PlanStep {
    /// A GraphQL operation against one source schema.
    Operation(OperationPlanStep),
    /// An entity lookup whose operation is picked at runtime by a discriminator.
    EntityLookup(EntityLookupPlanStep),
}

impl PlanStep {
    pub fn id(&self) -> StepId {
        match self {
            Self::Operation(step) => step.id,
            Self::EntityLookup(step) => step.id,
        }
    }

    pub fn depends_on(&self) -> &[StepId] {
        match self {
            Self::Operation(step) => &step.depends_on,
            Self::EntityLookup(step) => &step.depends_on,
        }
    }

    pub fn response_path(&self) -> &ResponsePath {
        match self {
            Self::Operation(step) => &step.response_path,
            Self::EntityLookup(step) => &step.response_path,
        }
    }

    pub fn cost(&self) -> f64 {
        match self {
            Self::Operation(step) => step.cost,
            Self::EntityLookup(step) => step.cost,
        }
    }

    /// Steps whose data this step reads, through variable bindings or its discriminator.
    pub fn producers(&self) -> impl Iterator<Item = StepId> + '_ {
        let (operations, discriminator): (Vec<&SourceOperation>, Option<StepId>) = match self {
            Self::Operation(step) => (vec![&step.operation], None),
            Self::EntityLookup(step) => (
                step.branches.values().chain(&step.fallback).collect(),
                match &step.discriminator {
                    Discriminator::Field { producer, .. } => Some(*producer),
                    Discriminator::NodeId { .. } => None,
                },
            ),
        };
        operations
            .into_iter()
            .flat_map(|operation| operation.variables.iter().map(|binding| binding.producer))
            .chain(discriminator)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationPlanStep {
    pub id: StepId,
    pub operation: SourceOperation,
    /// Where the step's result attaches in the composite response. `@` stands for every item of
    /// a list.
    pub response_path: ResponsePath,
    /// Only objects of this type at `response_path` are resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_condition: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<StepId>,
    pub cost: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityLookupPlanStep {
    pub id: StepId,
    pub response_path: ResponsePath,
    pub discriminator: Discriminator,
    /// Operations keyed by discriminator value. At most one runs per entity instance.
    pub branches: IndexMap<String, SourceOperation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<SourceOperation>,
    /// A discriminator value without branch or fallback is an error rather than a no-op.
    #[serde(default)]
    pub strict: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<StepId>,
    pub cost: f64,
}

impl EntityLookupPlanStep {
    /// The operation to run for a discriminator value.
    pub fn branch(&self, discriminator: &str) -> Option<&SourceOperation> {
        self.branches.get(discriminator).or(self.fallback.as_ref())
    }
}

/// Where a lookup step reads the value choosing its branch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", tag = "kind")]
pub enum Discriminator {
    /// A value a previous step wrote on the object being resolved, usually `__typename`.
    #[serde(rename_all = "camelCase")]
    Field { producer: StepId, path: FieldPath },
    /// The type name encoded in a global object identifier.
    #[serde(rename_all = "camelCase")]
    NodeId { id: InputValue },
}

/// A GraphQL document sent to one source schema.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceOperation {
    pub source: SourceSchemaName,
    pub document: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    /// Response key of the lookup field wrapping the result, unwrapped before merging.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_root: Option<String>,
    /// Response keys this operation resolves on the object it attaches to.
    pub owned_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<VariableBinding>,
    /// Client variables passed through unchanged.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub forwarded_variables: Vec<String>,
}

/// A variable whose value is read from data a previous step produced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableBinding {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: FieldType,
    pub producer: StepId,
    /// Response keys leading to the value, from the object the step attaches to.
    pub path: FieldPath,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ResponsePathElement {
    Key(String),
    /// Every item of a list.
    List,
}

/// Path of response keys from the root of the composite response.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ResponsePath(pub Vec<ResponsePathElement>);

impl ResponsePath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResponsePathElement> {
        self.0.iter()
    }

    pub fn join_key(&self, key: impl Into<String>) -> Self {
        let mut path = self.clone();
        path.0.push(ResponsePathElement::Key(key.into()));
        path
    }

    pub fn join_list(&self) -> Self {
        let mut path = self.clone();
        path.0.push(ResponsePathElement::List);
        path
    }
}

impl fmt::Display for ResponsePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, element) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            match element {
                ResponsePathElement::Key(key) => f.write_str(key)?,
                ResponsePathElement::List => f.write_str("@")?,
            }
        }
        Ok(())
    }
}

impl Serialize for ResponsePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter().map(|element| match element {
            ResponsePathElement::Key(key) => key.as_str(),
            ResponsePathElement::List => "@",
        }))
    }
}

impl<'de> Deserialize<'de> for ResponsePath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let elements = Vec::<String>::deserialize(deserializer)?;
        Ok(Self(
            elements
                .into_iter()
                .map(|element| {
                    if element == "@" {
                        ResponsePathElement::List
                    } else {
                        ResponsePathElement::Key(element)
                    }
                })
                .collect(),
        ))
    }
}
