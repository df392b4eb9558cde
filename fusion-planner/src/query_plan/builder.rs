//! Turns a client operation into plan steps.
//!
//! Steps are drafted in an arena while the selection set is walked; the dependency graph between
//! drafts is kept in a petgraph graph so that every new edge can be checked for cycles. Drafts
//! that are branches of a dispatching lookup never appear in the graph themselves: their edges
//! are recorded on the dispatching draft, which is what the executor schedules.
//!
//! `finish` orders the drafts topologically, renumbers them and renders their documents.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::collections::HashMap;

use indexmap::IndexMap;
use petgraph::Direction;
use petgraph::algo::has_path_connecting;
use petgraph::graph::DiGraph;
use petgraph::graph::NodeIndex;

use super::Discriminator;
use super::EntityLookupPlanStep;
use super::OperationPlanStep;
use super::PlanStep;
use super::QueryPlan;
use super::ResponsePath;
use super::ResponseShape;
use super::SourceOperation;
use super::StepId;
use super::VariableBinding;
use super::query_planner::QueryPlannerConfig;
use super::source_selection::select_sources;
use crate::error::PlanningError;
use crate::operation::Condition;
use crate::operation::Field;
use crate::operation::InlineFragment;
use crate::operation::InputValue;
use crate::operation::Operation;
use crate::operation::OperationKind;
use crate::operation::Selection;
use crate::operation::SelectionSet;
use crate::operation::VariableDefinition;
use crate::requirements::RequirementResolver;
use crate::schema::CompositeSchema;
use crate::schema::FieldPath;
use crate::schema::FieldType;
use crate::schema::Lookup;
use crate::schema::SchemaCoordinate;
use crate::schema::SourceSchemaName;
use crate::schema::TYPENAME_FIELD;
use crate::schema::TypeDefinition;

const NODE_FIELD: &str = "node";

/// A step of a selection path inside a draft's document.
#[derive(Clone, Debug, PartialEq)]
enum Position {
    /// Into the field with this response key.
    Field(String),
    /// Into the inline fragment on this type.
    Fragment(String),
}

/// Where planning currently is: a position inside a draft's document and the matching location
/// in the composite response.
#[derive(Clone, Debug)]
struct Cursor {
    /// `None` at the operation root, before any step exists.
    step: Option<usize>,
    position: Vec<Position>,
    path: ResponsePath,
    /// Static type of the objects at `path`.
    ty: String,
    /// Set when objects at `path` may have other types than `ty` and must be filtered.
    type_condition: Option<String>,
}

impl Cursor {
    fn root(ty: &str) -> Self {
        Self {
            step: None,
            position: Vec::new(),
            path: ResponsePath::root(),
            ty: ty.to_string(),
            type_condition: None,
        }
    }

    fn in_fragment(&self, type_name: &str) -> Self {
        let mut position = self.position.clone();
        position.push(Position::Fragment(type_name.to_string()));
        Self {
            step: self.step,
            position,
            path: self.path.clone(),
            ty: type_name.to_string(),
            type_condition: self.type_condition.clone(),
        }
    }

    /// The type condition a step resolving `type_name` objects at this cursor's path needs.
    fn condition_for(&self, type_name: &str) -> Option<String> {
        if self.ty == type_name {
            self.type_condition.clone()
        } else {
            Some(type_name.to_string())
        }
    }
}

/// A client field with the conditions of the fragments it was collected through.
#[derive(Clone, Debug)]
struct CollectedField {
    field: Field,
    conditions: Vec<Condition>,
}

impl CollectedField {
    fn key(&self) -> &str {
        self.field.response_key()
    }

    fn document_field(&self) -> Field {
        Field {
            alias: self.field.alias.clone(),
            name: self.field.name.clone(),
            arguments: self.field.arguments.clone(),
            conditions: self.conditions.clone(),
            selection_set: SelectionSet::default(),
        }
    }
}

#[derive(Debug, Default)]
struct Collected {
    fields: Vec<CollectedField>,
    /// Fields selected through fragments on other types than the position's, at abstract
    /// positions only.
    fragments: IndexMap<String, Vec<CollectedField>>,
}

/// Where a value ended up: the draft fetching it, the object position in that draft, and the
/// response keys leading to the value from the object.
#[derive(Clone, Debug)]
struct Located {
    step: usize,
    position: Vec<Position>,
    keys: Vec<String>,
}

#[derive(Clone, Debug)]
struct DraftBinding {
    name: String,
    ty: FieldType,
    producer: usize,
    path: FieldPath,
}

#[derive(Clone, Debug)]
enum DraftRoot {
    /// The selection is sent as is, at the operation root.
    Root,
    /// The selection is wrapped in a lookup field, unwrapped again before merging.
    Lookup {
        field: String,
        arguments: IndexMap<String, InputValue>,
    },
}

#[derive(Clone, Debug)]
struct OperationDraft {
    kind: OperationKind,
    source: SourceSchemaName,
    response_path: ResponsePath,
    type_condition: Option<String>,
    /// Type of the object the selection applies to.
    object_type: String,
    root: DraftRoot,
    selection: SelectionSet,
    variables: Vec<DraftBinding>,
    owned_fields: Vec<String>,
    records_owned: bool,
    branch_of: Option<usize>,
}

impl OperationDraft {
    fn new(
        kind: OperationKind,
        source: SourceSchemaName,
        response_path: ResponsePath,
        type_condition: Option<String>,
        object_type: &str,
        root: DraftRoot,
        branch_of: Option<usize>,
    ) -> Self {
        Self {
            kind,
            source,
            response_path,
            type_condition,
            object_type: object_type.to_string(),
            root,
            selection: SelectionSet::default(),
            variables: Vec::new(),
            owned_fields: Vec::new(),
            records_owned: true,
            branch_of,
        }
    }
}

#[derive(Clone, Debug)]
enum DraftDiscriminator {
    Field { producer: usize, path: FieldPath },
    NodeId(InputValue),
}

#[derive(Clone, Debug)]
struct DispatchDraft {
    response_path: ResponsePath,
    discriminator: DraftDiscriminator,
    branches: IndexMap<String, usize>,
    fallback: Option<usize>,
    strict: bool,
}

#[derive(Clone, Debug)]
enum Draft {
    Operation(OperationDraft),
    Dispatch(DispatchDraft),
}

pub(crate) struct PlanBuilder<'a> {
    schema: &'a CompositeSchema,
    operation: &'a Operation,
    config: &'a QueryPlannerConfig,
    resolver: RequirementResolver<'a>,
    drafts: Vec<Draft>,
    /// Node indices are draft ids. Edges go from producer to consumer.
    graph: DiGraph<(), ()>,
    shape: Option<ResponseShape>,
    counter: usize,
}

impl<'a> PlanBuilder<'a> {
    pub(crate) fn new(
        schema: &'a CompositeSchema,
        operation: &'a Operation,
        config: &'a QueryPlannerConfig,
    ) -> Self {
        Self {
            schema,
            operation,
            config,
            resolver: RequirementResolver::new(schema),
            drafts: Vec::new(),
            graph: DiGraph::new(),
            shape: None,
            counter: 0,
        }
    }

    pub(crate) fn plan_operation(&mut self) -> Result<(), PlanningError> {
        let operation = self.operation;
        let shape = ResponseShape::build(self.schema, operation)?;
        let cursor = Cursor::root(&shape.root_type);
        let mut collected = Collected::default();
        self.collect_fields(
            &shape.root_type,
            &operation.selection_set,
            &[],
            &mut collected,
        )?;
        match operation.kind {
            OperationKind::Query => self.plan_query_root(&cursor, collected.fields)?,
            OperationKind::Mutation => self.plan_mutation_root(&cursor, collected.fields)?,
        }
        self.shape = Some(shape);
        Ok(())
    }

    fn plan_query_root(
        &mut self,
        cursor: &Cursor,
        fields: Vec<CollectedField>,
    ) -> Result<(), PlanningError> {
        let has_node_field = self.schema.node_field().is_some();
        let (node_fields, fields): (Vec<_>, Vec<_>) = fields
            .into_iter()
            .filter(|field| field.field.name != TYPENAME_FIELD)
            .partition(|field| has_node_field && field.field.name == NODE_FIELD);
        if !fields.is_empty() {
            self.resolve_unresolved(cursor, &cursor.ty, &fields, None)?;
        }
        for field in &node_fields {
            self.plan_node_field(cursor, field)?;
        }
        Ok(())
    }

    /// Mutation fields run one after the other in document order. Consecutive fields resolved by
    /// the same source share a step.
    fn plan_mutation_root(
        &mut self,
        cursor: &Cursor,
        fields: Vec<CollectedField>,
    ) -> Result<(), PlanningError> {
        let schema = self.schema;
        let mut previous: Option<usize> = None;
        for field in fields {
            if field.field.name == TYPENAME_FIELD {
                continue;
            }
            let coordinate = SchemaCoordinate::new(&cursor.ty, &field.field.name);
            let reusable = match previous {
                Some(step) => schema.can_resolve(&coordinate, self.operation(step)?.source.as_str()),
                None => false,
            };
            let step = match previous {
                Some(step) if reusable => step,
                _ => {
                    let source = self
                        .preferred_source(schema.resolvable_sources(&coordinate))
                        .ok_or_else(|| {
                            PlanningError::unsatisfiable(coordinate.clone(), "no source resolves it")
                        })?;
                    let step = self.push(Draft::Operation(OperationDraft::new(
                        OperationKind::Mutation,
                        source,
                        ResponsePath::root(),
                        None,
                        &cursor.ty,
                        DraftRoot::Root,
                        None,
                    )));
                    if let Some(previous) = previous {
                        self.add_dependency(previous, step)?;
                    }
                    previous = Some(step);
                    step
                }
            };
            self.add_field_to_step(step, cursor, &cursor.ty, &field)?;
        }
        Ok(())
    }

    /// `node(id:)` is resolved by whichever source owns the type encoded in the id. Every
    /// possible type gets a branch through a by-id lookup; when some type has none, a source
    /// resolving `node` itself serves as fallback.
    fn plan_node_field(
        &mut self,
        cursor: &Cursor,
        field: &CollectedField,
    ) -> Result<(), PlanningError> {
        let schema = self.schema;
        let definition = schema
            .node_field()
            .ok_or_else(|| PlanningError::InvalidNodeField("schema has no node field".into()))?;
        let node_type = definition.ty.named_type();
        let key = field.key().to_string();
        let id = field
            .field
            .arguments
            .get("id")
            .cloned()
            .ok_or_else(|| PlanningError::InvalidNodeField("missing `id` argument".into()))?;

        let mut collected = Collected::default();
        self.collect_fields(node_type, &field.field.selection_set, &[], &mut collected)?;

        let dispatch = self.push(Draft::Dispatch(DispatchDraft {
            response_path: cursor.path.clone(),
            discriminator: DraftDiscriminator::NodeId(id.clone()),
            branches: IndexMap::new(),
            fallback: None,
            strict: true,
        }));
        let position = vec![Position::Field(key.clone())];

        for concrete in schema.possible_types(node_type) {
            let fields = self.fields_for_type(&collected, concrete);
            let Some(lookup) = self.node_lookup(concrete, &fields) else {
                continue;
            };
            let Some(argument) = lookup.arguments.first() else {
                continue;
            };
            let mut lookup_field =
                Field::new(lookup.field_name.as_str()).argument(argument.name.as_str(), id.clone());
            if key != lookup.field_name {
                lookup_field = lookup_field.alias(key.as_str());
            }
            lookup_field.conditions = field.conditions.clone();

            let branch = self.push_node_branch(dispatch, &lookup.source, &key, lookup_field);
            self.add_hidden_field(branch, &position, TYPENAME_FIELD)?;
            let child = Cursor {
                step: Some(branch),
                position: position.clone(),
                path: cursor.path.join_key(&key),
                ty: concrete.clone(),
                type_condition: Some(concrete.clone()),
            };
            self.plan_concrete(&child, fields)?;
            self.dispatch_mut(dispatch)?
                .branches
                .insert(concrete.clone(), branch);
        }

        let uncovered: Vec<String> = {
            let branches = &self.dispatch_mut(dispatch)?.branches;
            schema
                .possible_types(node_type)
                .iter()
                .filter(|concrete| !branches.contains_key(*concrete))
                .cloned()
                .collect()
        };
        let node = SchemaCoordinate::new(schema.query_type(), NODE_FIELD);
        let fallback_source = if uncovered.is_empty() {
            None
        } else {
            self.preferred_source(schema.resolvable_sources(&node))
        };
        if let Some(source) = fallback_source {
            let fallback = self.push_node_branch(dispatch, &source, &key, field.document_field());
            self.add_hidden_field(fallback, &position, TYPENAME_FIELD)?;
            let child = Cursor {
                step: Some(fallback),
                position,
                path: cursor.path.join_key(&key),
                ty: node_type.to_string(),
                type_condition: None,
            };
            // The fallback only ever sees objects of types without a branch.
            for concrete in &uncovered {
                let fields = self.fields_for_type(&collected, concrete);
                let mut fragment = child.in_fragment(concrete);
                fragment.type_condition = Some(concrete.clone());
                self.plan_concrete(&fragment, fields)?;
            }
            self.dispatch_mut(dispatch)?.fallback = Some(fallback);
        }

        let dispatch_draft = self.dispatch_mut(dispatch)?;
        if dispatch_draft.branches.is_empty() && dispatch_draft.fallback.is_none() {
            return Err(PlanningError::InvalidNodeField(format!(
                "no source can resolve `{node_type}` objects by id"
            )));
        }
        Ok(())
    }

    fn push_node_branch(
        &mut self,
        dispatch: usize,
        source: &SourceSchemaName,
        key: &str,
        field: Field,
    ) -> usize {
        let mut draft = OperationDraft::new(
            OperationKind::Query,
            source.clone(),
            ResponsePath::root(),
            None,
            self.schema.query_type(),
            DraftRoot::Root,
            Some(dispatch),
        );
        draft.selection = SelectionSet(vec![field.into()]);
        draft.owned_fields = vec![key.to_string()];
        draft.records_owned = false;
        self.push(Draft::Operation(draft))
    }

    /// The by-id lookup resolving the most of `fields`, then the lightest source, then the first
    /// source by name.
    fn node_lookup(&self, concrete: &str, fields: &[CollectedField]) -> Option<&'a Lookup> {
        let schema = self.schema;
        let resolved = |lookup: &Lookup| {
            fields
                .iter()
                .filter(|field| {
                    schema.can_resolve(
                        &SchemaCoordinate::new(concrete, &field.field.name),
                        lookup.source.as_str(),
                    )
                })
                .count()
        };
        schema
            .lookups(concrete)
            .iter()
            .filter(|lookup| lookup.is_by_id())
            .max_by(|a, b| {
                resolved(*a)
                    .cmp(&resolved(*b))
                    .then_with(|| {
                        schema
                            .source_weight(b.source.as_str())
                            .total_cmp(&schema.source_weight(a.source.as_str()))
                    })
                    .then_with(|| b.source.cmp(&a.source))
            })
    }

    fn plan_selection_set(
        &mut self,
        cursor: &Cursor,
        selection_set: &SelectionSet,
    ) -> Result<(), PlanningError> {
        let mut collected = Collected::default();
        self.collect_fields(&cursor.ty, selection_set, &[], &mut collected)?;
        if self.schema.is_abstract(&cursor.ty) {
            self.plan_abstract(cursor, collected)
        } else {
            self.plan_concrete(cursor, collected.fields)
        }
    }

    fn plan_concrete(
        &mut self,
        cursor: &Cursor,
        fields: Vec<CollectedField>,
    ) -> Result<(), PlanningError> {
        let source = self.cursor_source(cursor)?;
        let mut unresolved = Vec::new();
        for field in fields {
            if field.field.name == TYPENAME_FIELD {
                continue;
            }
            let coordinate = SchemaCoordinate::new(&cursor.ty, &field.field.name);
            if self.resolves_inline(&source, &coordinate) {
                self.add_inline_field(cursor, &field, IndexMap::new())?;
            } else {
                unresolved.push(field);
            }
        }
        if !unresolved.is_empty() {
            self.resolve_unresolved(cursor, &cursor.ty, &unresolved, None)?;
        }
        Ok(())
    }

    /// Fields the current step cannot resolve at an abstract position are resolved per concrete
    /// type, through a lookup step dispatching on `__typename`.
    fn plan_abstract(&mut self, cursor: &Cursor, collected: Collected) -> Result<(), PlanningError> {
        let schema = self.schema;
        let step = cursor
            .step
            .ok_or_else(|| PlanningError::internal("abstract position outside of a step"))?;
        let source = self.cursor_source(cursor)?;
        let discriminator_key = self.add_hidden_field(step, &cursor.position, TYPENAME_FIELD)?;
        let possible_types = schema.possible_types(&cursor.ty);

        let mut unresolved: IndexMap<String, Vec<CollectedField>> = IndexMap::new();
        let mut groups = vec![(cursor.ty.clone(), collected.fields)];
        groups.extend(collected.fragments);
        for (type_name, fields) in groups {
            let fragment_cursor = if type_name == cursor.ty {
                cursor.clone()
            } else {
                cursor.in_fragment(&type_name)
            };
            for field in fields {
                if field.field.name == TYPENAME_FIELD {
                    continue;
                }
                let coordinate = SchemaCoordinate::new(&type_name, &field.field.name);
                if self.resolves_inline(&source, &coordinate) {
                    self.add_inline_field(&fragment_cursor, &field, IndexMap::new())?;
                    continue;
                }
                for concrete in self.concrete_types(&type_name) {
                    if !possible_types.contains(&concrete) {
                        continue;
                    }
                    let coordinate = SchemaCoordinate::new(&concrete, &field.field.name);
                    if self.resolves_inline(&source, &coordinate) {
                        self.add_inline_field(&cursor.in_fragment(&concrete), &field, IndexMap::new())?;
                    } else {
                        unresolved.entry(concrete).or_default().push(field.clone());
                    }
                }
            }
        }
        if unresolved.is_empty() {
            return Ok(());
        }

        let dispatch = self.push(Draft::Dispatch(DispatchDraft {
            response_path: cursor.path.clone(),
            discriminator: DraftDiscriminator::Field {
                producer: step,
                path: FieldPath(vec![discriminator_key]),
            },
            branches: IndexMap::new(),
            fallback: None,
            strict: false,
        }));
        self.add_dependency(step, dispatch)?;
        for (concrete, fields) in &unresolved {
            self.resolve_unresolved(cursor, concrete, fields, Some(dispatch))?;
        }
        Ok(())
    }

    /// Plans fields the current step cannot resolve through other sources. With a `dispatch`, the
    /// cheapest source becomes the dispatch branch for `type_name` and any further source gets
    /// its own type-conditioned step.
    fn resolve_unresolved(
        &mut self,
        cursor: &Cursor,
        type_name: &str,
        fields: &[CollectedField],
        dispatch: Option<usize>,
    ) -> Result<(), PlanningError> {
        let at_root = self.is_root(cursor, type_name);
        let mut candidates = Vec::with_capacity(fields.len());
        for field in fields {
            let coordinate = SchemaCoordinate::new(type_name, &field.field.name);
            let sources = self.entry_sources(at_root, type_name, &coordinate);
            if sources.is_empty() {
                let reason = if at_root {
                    "no source resolves it".to_string()
                } else {
                    format!("no source resolving it can look up `{type_name}` objects")
                };
                return Err(PlanningError::unsatisfiable(coordinate, reason));
            }
            candidates.push(sources);
        }

        let type_condition = cursor.condition_for(type_name);
        for (index, assignment) in select_sources(self.schema, self.config, &candidates)
            .into_iter()
            .enumerate()
        {
            let step = match dispatch {
                Some(dispatch) if index == 0 => {
                    let branch = self.new_entry_step(
                        cursor,
                        type_name,
                        &assignment.source,
                        type_condition.clone(),
                        Some(dispatch),
                    )?;
                    self.dispatch_mut(dispatch)?
                        .branches
                        .insert(type_name.to_string(), branch);
                    branch
                }
                _ => match self.find_entry_step(cursor, type_name, &assignment.source, &type_condition)
                {
                    Some(step) => step,
                    None => self.new_entry_step(
                        cursor,
                        type_name,
                        &assignment.source,
                        type_condition.clone(),
                        None,
                    )?,
                },
            };
            for &field_index in &assignment.fields {
                self.add_field_to_step(step, cursor, type_name, &fields[field_index])?;
            }
        }
        Ok(())
    }

    /// Sources able to start a step resolving `coordinate`: at the root any source resolving the
    /// field, elsewhere only those that can also look up the object.
    fn entry_sources(
        &self,
        at_root: bool,
        type_name: &str,
        coordinate: &SchemaCoordinate,
    ) -> Vec<SourceSchemaName> {
        let mut sources = self.schema.resolvable_sources(coordinate);
        if !at_root {
            sources.retain(|source| self.schema.lookup(type_name, source.as_str()).is_some());
        }
        sources
    }

    fn find_entry_step(
        &self,
        cursor: &Cursor,
        type_name: &str,
        source: &SourceSchemaName,
        type_condition: &Option<String>,
    ) -> Option<usize> {
        self.drafts.iter().enumerate().find_map(|(id, draft)| {
            let Draft::Operation(draft) = draft else {
                return None;
            };
            let reusable = draft.branch_of.is_none()
                && draft.kind == OperationKind::Query
                && draft.source == *source
                && draft.response_path == cursor.path
                && draft.type_condition == *type_condition
                && draft.object_type == type_name
                && cursor.step.is_none_or(|origin| !self.would_cycle(origin, id));
            reusable.then_some(id)
        })
    }

    /// Creates a step resolving `type_name` objects at the cursor's path on `source`: a root
    /// step at the query root, a lookup keyed by data available at the cursor elsewhere.
    fn new_entry_step(
        &mut self,
        origin: &Cursor,
        type_name: &str,
        source: &SourceSchemaName,
        type_condition: Option<String>,
        branch_of: Option<usize>,
    ) -> Result<usize, PlanningError> {
        if self.is_root(origin, type_name) {
            return Ok(self.push(Draft::Operation(OperationDraft::new(
                OperationKind::Query,
                source.clone(),
                ResponsePath::root(),
                None,
                type_name,
                DraftRoot::Root,
                branch_of,
            ))));
        }

        let schema = self.schema;
        let lookup = schema.lookup(type_name, source.as_str()).ok_or_else(|| {
            PlanningError::internal(format!("source `{source}` cannot look up `{type_name}`"))
        })?;
        let step = self.push(Draft::Operation(OperationDraft::new(
            OperationKind::Query,
            source.clone(),
            origin.path.clone(),
            type_condition,
            type_name,
            DraftRoot::Lookup {
                field: lookup.field_name.clone(),
                arguments: IndexMap::new(),
            },
            branch_of,
        )));
        tracing::trace!(
            step,
            source = %source,
            path = %origin.path,
            lookup = %lookup.field_name,
            "lookup step created"
        );
        for argument in &lookup.arguments {
            let located = self.ensure_available(origin, type_name, argument.path.segments(), step)?;
            let variable = self.bind_variable(step, &argument.name, argument.ty.clone(), &located)?;
            if let DraftRoot::Lookup { arguments, .. } = &mut self.operation_mut(step)?.root {
                arguments.insert(argument.name.clone(), InputValue::variable(variable));
            }
        }
        Ok(step)
    }

    /// Adds a client field at the root of `step`, satisfying its requirements first.
    fn add_field_to_step(
        &mut self,
        step: usize,
        origin: &Cursor,
        type_name: &str,
        field: &CollectedField,
    ) -> Result<(), PlanningError> {
        let coordinate = SchemaCoordinate::new(type_name, &field.field.name);
        let source = self.operation(step)?.source.clone();
        self.resolver.enter(&coordinate)?;
        let arguments = self.satisfy_requirements(step, origin, &coordinate, &source);
        self.resolver.leave(&coordinate);
        let arguments = arguments?;

        let cursor = Cursor {
            step: Some(step),
            position: Vec::new(),
            path: origin.path.clone(),
            ty: type_name.to_string(),
            type_condition: self.operation(step)?.type_condition.clone(),
        };
        self.add_inline_field(&cursor, field, arguments)
    }

    /// Makes the data `coordinate` requires on `source` available before `step` runs. Returns
    /// the field arguments carrying required values.
    fn satisfy_requirements(
        &mut self,
        step: usize,
        origin: &Cursor,
        coordinate: &SchemaCoordinate,
        source: &SourceSchemaName,
    ) -> Result<IndexMap<String, InputValue>, PlanningError> {
        let schema = self.schema;
        let mut arguments = IndexMap::new();
        let Some(requirement) = self.resolver.requirements_for(coordinate, source)? else {
            return Ok(arguments);
        };
        let mut paths = requirement.fields.leaf_paths();
        for path in requirement.arguments.values() {
            if !paths.contains(path) {
                paths.push(path.clone());
            }
        }

        for path in paths {
            let bound: Vec<&String> = requirement
                .arguments
                .iter()
                .filter(|(_, argument_path)| **argument_path == path)
                .map(|(argument, _)| argument)
                .collect();
            if bound.is_empty()
                && self.can_resolve_path(source, &coordinate.type_name, path.segments())
            {
                continue;
            }
            let located =
                self.ensure_available(origin, &coordinate.type_name, path.segments(), step)?;
            self.add_dependency(located.step, step)?;
            for argument in bound {
                let ty = schema
                    .field(coordinate)
                    .and_then(|definition| definition.arguments.get(argument))
                    .cloned()
                    .or_else(|| self.path_type(&coordinate.type_name, path.segments()))
                    .ok_or_else(|| {
                        PlanningError::internal(format!(
                            "no type for requirement argument `{argument}` of `{coordinate}`"
                        ))
                    })?;
                let variable = self.bind_variable(step, argument, ty, &located)?;
                arguments.insert(argument.clone(), InputValue::variable(variable));
            }
        }
        Ok(arguments)
    }

    /// Makes the value at `path` on `type_name` objects at the origin's location available to
    /// `consumer`, in order of preference: in the step that produced the objects, in another
    /// step already resolving them, in a new lookup step, or one object level at a time.
    fn ensure_available(
        &mut self,
        origin: &Cursor,
        type_name: &str,
        path: &[String],
        consumer: usize,
    ) -> Result<Located, PlanningError> {
        let head = path
            .first()
            .ok_or_else(|| PlanningError::internal("empty requirement path"))?;

        if let Some(step) = origin.step {
            let source = self.operation(step)?.source.clone();
            if !self.would_cycle(step, consumer) && self.can_resolve_path(&source, type_name, path) {
                let position = if origin.ty == type_name {
                    origin.position.clone()
                } else {
                    origin.in_fragment(type_name).position
                };
                let keys = self.add_hidden_path(step, &position, type_name, path)?;
                return Ok(Located {
                    step,
                    position,
                    keys,
                });
            }
        }

        let type_condition = origin.condition_for(type_name);
        let existing = self.drafts.iter().enumerate().find_map(|(id, draft)| {
            let Draft::Operation(draft) = draft else {
                return None;
            };
            let usable = draft.branch_of.is_none()
                && draft.kind == OperationKind::Query
                && draft.response_path == origin.path
                && draft.object_type == type_name
                && (draft.type_condition.is_none() || draft.type_condition == type_condition)
                && !self.would_cycle(id, consumer)
                && self.can_resolve_path(&draft.source, type_name, path);
            usable.then_some(id)
        });
        if let Some(step) = existing {
            let keys = self.add_hidden_path(step, &[], type_name, path)?;
            return Ok(Located {
                step,
                position: Vec::new(),
                keys,
            });
        }

        let coordinate = SchemaCoordinate::new(type_name, head);
        self.resolver.enter(&coordinate)?;
        let located = self.ensure_in_new_step(origin, type_name, path, consumer, type_condition);
        self.resolver.leave(&coordinate);
        located
    }

    fn ensure_in_new_step(
        &mut self,
        origin: &Cursor,
        type_name: &str,
        path: &[String],
        consumer: usize,
        type_condition: Option<String>,
    ) -> Result<Located, PlanningError> {
        let schema = self.schema;
        let at_root = self.is_root(origin, type_name);
        let sources: Vec<SourceSchemaName> = if at_root {
            schema.sources().map(|source| source.name.clone()).collect()
        } else {
            schema
                .lookups(type_name)
                .iter()
                .map(|lookup| lookup.source.clone())
                .collect()
        };
        let sources = sources
            .into_iter()
            .filter(|source| self.can_resolve_path(source, type_name, path))
            .collect();
        if let Some(source) = self.preferred_source(sources) {
            let step = self.new_entry_step(origin, type_name, &source, type_condition, None)?;
            let keys = self.add_hidden_path(step, &[], type_name, path)?;
            return Ok(Located {
                step,
                position: Vec::new(),
                keys,
            });
        }

        let coordinate = SchemaCoordinate::new(type_name, &path[0]);
        if path.len() > 1 {
            let head = self.ensure_available(origin, type_name, &path[..1], consumer)?;
            let definition = schema.field(&coordinate).ok_or_else(|| {
                PlanningError::UnknownField {
                    type_name: type_name.to_string(),
                    field_name: path[0].clone(),
                }
            })?;
            let key = head
                .keys
                .first()
                .cloned()
                .ok_or_else(|| PlanningError::internal("requirement resolved without a key"))?;
            let mut child_path = origin.path.join_key(&key);
            for _ in 0..definition.ty.list_depth() {
                child_path = child_path.join_list();
            }
            let mut position = head.position;
            position.push(Position::Field(key.clone()));
            let child = Cursor {
                step: Some(head.step),
                position,
                path: child_path,
                ty: definition.ty.named_type().to_string(),
                type_condition: None,
            };
            let tail = self.ensure_available(&child, &child.ty, &path[1..], consumer)?;
            let mut keys = vec![key];
            keys.extend(tail.keys);
            return Ok(Located {
                step: tail.step,
                position: tail.position,
                keys,
            });
        }

        Err(PlanningError::unsatisfiable(
            coordinate,
            "it is required by another field but no source can provide it",
        ))
    }

    fn bind_variable(
        &mut self,
        consumer: usize,
        argument: &str,
        ty: FieldType,
        located: &Located,
    ) -> Result<String, PlanningError> {
        self.add_dependency(located.step, consumer)?;
        let name = self.generated_name(argument);
        self.operation_mut(consumer)?.variables.push(DraftBinding {
            name: name.clone(),
            ty,
            producer: located.step,
            path: FieldPath(located.keys.clone()),
        });
        Ok(name)
    }

    /// Adds a client field at the cursor and plans its selection set.
    fn add_inline_field(
        &mut self,
        cursor: &Cursor,
        field: &CollectedField,
        arguments: IndexMap<String, InputValue>,
    ) -> Result<(), PlanningError> {
        let schema = self.schema;
        let step = cursor
            .step
            .ok_or_else(|| PlanningError::internal("field outside of a step"))?;
        let definition = schema
            .field_definition(&cursor.ty, &field.field.name)
            .ok_or_else(|| PlanningError::UnknownField {
                type_name: cursor.ty.clone(),
                field_name: field.field.name.clone(),
            })?;
        let key = field.key().to_string();
        let mut document_field = field.document_field();
        document_field.arguments.extend(arguments);

        let draft = self.operation_mut(step)?;
        if cursor.position.is_empty() && draft.records_owned && !draft.owned_fields.contains(&key) {
            draft.owned_fields.push(key.clone());
        }
        merge_field(self.selection_mut(step, &cursor.position)?, document_field);

        let named = definition.ty.named_type();
        if schema
            .type_definition(named)
            .is_some_and(TypeDefinition::is_composite)
        {
            let mut path = cursor.path.join_key(&key);
            for _ in 0..definition.ty.list_depth() {
                path = path.join_list();
            }
            let mut position = cursor.position.clone();
            position.push(Position::Field(key));
            let child = Cursor {
                step: Some(step),
                position,
                path,
                ty: named.to_string(),
                type_condition: None,
            };
            self.plan_selection_set(&child, &field.field.selection_set)?;
        }
        Ok(())
    }

    /// Adds a field the client did not ask for and returns its response key.
    fn add_hidden_field(
        &mut self,
        step: usize,
        position: &[Position],
        name: &str,
    ) -> Result<String, PlanningError> {
        let selection = self.selection_mut(step, position)?;
        let mut taken = false;
        for selection in selection.iter() {
            let Selection::Field(field) = selection else {
                continue;
            };
            if field.name == name && field.arguments.is_empty() && field.conditions.is_empty() {
                return Ok(field.response_key().to_string());
            }
            taken |= field.response_key() == name && (field.name != name || !field.arguments.is_empty());
        }
        let mut field = Field::new(name);
        if taken {
            field = field.alias(self.generated_name(name));
        }
        let key = field.response_key().to_string();
        self.selection_mut(step, position)?.0.push(field.into());
        Ok(key)
    }

    fn add_hidden_path(
        &mut self,
        step: usize,
        position: &[Position],
        type_name: &str,
        path: &[String],
    ) -> Result<Vec<String>, PlanningError> {
        let schema = self.schema;
        let mut position = position.to_vec();
        let mut ty = type_name.to_string();
        let mut keys = Vec::with_capacity(path.len());
        for (index, segment) in path.iter().enumerate() {
            let key = self.add_hidden_field(step, &position, segment)?;
            if index + 1 < path.len() {
                let definition = schema.field_definition(&ty, segment).ok_or_else(|| {
                    PlanningError::UnknownField {
                        type_name: ty.clone(),
                        field_name: segment.clone(),
                    }
                })?;
                ty = definition.ty.named_type().to_string();
                position.push(Position::Field(key.clone()));
            }
            keys.push(key);
        }
        Ok(keys)
    }

    fn collect_fields(
        &self,
        type_name: &str,
        selection_set: &SelectionSet,
        conditions: &[Condition],
        into: &mut Collected,
    ) -> Result<(), PlanningError> {
        let schema = self.schema;
        let is_abstract = schema.is_abstract(type_name);
        for selection in selection_set.iter() {
            match selection {
                Selection::Field(field) => {
                    let mut collected = CollectedField {
                        field: field.clone(),
                        conditions: conditions.to_vec(),
                    };
                    collected
                        .conditions
                        .extend(std::mem::take(&mut collected.field.conditions));
                    push_collected(&mut into.fields, collected);
                }
                Selection::InlineFragment(fragment) => {
                    let mut inner_conditions = conditions.to_vec();
                    inner_conditions.extend(fragment.conditions.iter().cloned());
                    let Some(type_condition) = &fragment.type_condition else {
                        self.collect_fields(
                            type_name,
                            &fragment.selection_set,
                            &inner_conditions,
                            into,
                        )?;
                        continue;
                    };
                    if schema.type_definition(type_condition).is_none() {
                        return Err(PlanningError::UnknownType(type_condition.clone()));
                    }
                    let applies = type_condition == type_name
                        || (!is_abstract
                            && schema
                                .possible_types(type_condition)
                                .iter()
                                .any(|t| t == type_name));
                    if applies {
                        self.collect_fields(
                            type_name,
                            &fragment.selection_set,
                            &inner_conditions,
                            into,
                        )?;
                    } else if is_abstract {
                        let mut inner = Collected::default();
                        self.collect_fields(
                            type_condition,
                            &fragment.selection_set,
                            &inner_conditions,
                            &mut inner,
                        )?;
                        let fields = into.fragments.entry(type_condition.clone()).or_default();
                        for field in inner.fields {
                            push_collected(fields, field);
                        }
                        for (nested_type, nested) in inner.fragments {
                            let fields = into.fragments.entry(nested_type).or_default();
                            for field in nested {
                                push_collected(fields, field);
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn fields_for_type(&self, collected: &Collected, concrete: &str) -> Vec<CollectedField> {
        let mut fields = collected.fields.clone();
        for (type_name, fragment_fields) in &collected.fragments {
            if type_name == concrete || self.concrete_types(type_name).iter().any(|t| t == concrete) {
                for field in fragment_fields {
                    push_collected(&mut fields, field.clone());
                }
            }
        }
        fields
    }

    fn concrete_types(&self, type_name: &str) -> Vec<String> {
        if self.schema.is_abstract(type_name) {
            self.schema.possible_types(type_name).to_vec()
        } else {
            vec![type_name.to_string()]
        }
    }

    /// Whether `source` resolves the field without data from another step.
    fn resolves_inline(&self, source: &SourceSchemaName, coordinate: &SchemaCoordinate) -> bool {
        let Some(binding) = self.schema.binding(coordinate, source.as_str()) else {
            return false;
        };
        match &binding.requirement {
            None => true,
            Some(requirement) => {
                requirement.arguments.is_empty()
                    && requirement.fields.leaf_paths().iter().all(|path| {
                        self.can_resolve_path(source, &coordinate.type_name, path.segments())
                    })
            }
        }
    }

    /// Whether `source` resolves every field along `path` without requirements of its own.
    fn can_resolve_path(&self, source: &SourceSchemaName, type_name: &str, path: &[String]) -> bool {
        let mut ty = type_name.to_string();
        for segment in path {
            let coordinate = SchemaCoordinate::new(&ty, segment);
            let Some(binding) = self.schema.binding(&coordinate, source.as_str()) else {
                return false;
            };
            if binding.requirement.is_some() {
                return false;
            }
            let Some(definition) = self.schema.field(&coordinate) else {
                return false;
            };
            ty = definition.ty.named_type().to_string();
        }
        true
    }

    fn path_type(&self, type_name: &str, path: &[String]) -> Option<FieldType> {
        let mut ty = FieldType::named(type_name);
        for segment in path {
            ty = self
                .schema
                .field_definition(ty.named_type(), segment)?
                .ty
                .clone();
        }
        Some(ty)
    }

    fn preferred_source(&self, sources: Vec<SourceSchemaName>) -> Option<SourceSchemaName> {
        sources.into_iter().min_by(|a, b| {
            self.schema
                .source_weight(a.as_str())
                .total_cmp(&self.schema.source_weight(b.as_str()))
                .then_with(|| a.cmp(b))
        })
    }

    fn is_root(&self, cursor: &Cursor, type_name: &str) -> bool {
        cursor.path.is_root() && type_name == self.schema.query_type()
    }

    fn cursor_source(&self, cursor: &Cursor) -> Result<SourceSchemaName, PlanningError> {
        let step = cursor
            .step
            .ok_or_else(|| PlanningError::internal("selection outside of a step"))?;
        Ok(self.operation(step)?.source.clone())
    }

    fn generated_name(&mut self, base: &str) -> String {
        self.counter += 1;
        format!("__fusion_{}_{}", self.counter, base.trim_start_matches('_'))
    }

    fn push(&mut self, draft: Draft) -> usize {
        let id = self.drafts.len();
        self.drafts.push(draft);
        self.graph.add_node(());
        id
    }

    /// The draft scheduled for `id`: the dispatching draft for branches, `id` itself otherwise.
    fn owner(&self, id: usize) -> usize {
        match self.drafts.get(id) {
            Some(Draft::Operation(OperationDraft {
                branch_of: Some(dispatch),
                ..
            })) => *dispatch,
            _ => id,
        }
    }

    /// Whether `consumer` cannot depend on `producer` without creating a cycle.
    fn would_cycle(&self, producer: usize, consumer: usize) -> bool {
        let (producer, consumer) = (self.owner(producer), self.owner(consumer));
        producer == consumer
            || has_path_connecting(
                &self.graph,
                NodeIndex::new(consumer),
                NodeIndex::new(producer),
                None,
            )
    }

    fn add_dependency(&mut self, producer: usize, consumer: usize) -> Result<(), PlanningError> {
        let (producer, consumer) = (self.owner(producer), self.owner(consumer));
        if producer == consumer {
            return Ok(());
        }
        if has_path_connecting(
            &self.graph,
            NodeIndex::new(consumer),
            NodeIndex::new(producer),
            None,
        ) {
            return Err(PlanningError::internal(format!(
                "step {consumer} cannot depend on step {producer} without a cycle"
            )));
        }
        self.graph
            .update_edge(NodeIndex::new(producer), NodeIndex::new(consumer), ());
        Ok(())
    }

    fn operation(&self, id: usize) -> Result<&OperationDraft, PlanningError> {
        match self.drafts.get(id) {
            Some(Draft::Operation(draft)) => Ok(draft),
            _ => Err(PlanningError::internal(format!("draft {id} is not an operation"))),
        }
    }

    fn operation_mut(&mut self, id: usize) -> Result<&mut OperationDraft, PlanningError> {
        match self.drafts.get_mut(id) {
            Some(Draft::Operation(draft)) => Ok(draft),
            _ => Err(PlanningError::internal(format!("draft {id} is not an operation"))),
        }
    }

    fn dispatch_mut(&mut self, id: usize) -> Result<&mut DispatchDraft, PlanningError> {
        match self.drafts.get_mut(id) {
            Some(Draft::Dispatch(draft)) => Ok(draft),
            _ => Err(PlanningError::internal(format!("draft {id} is not a dispatch"))),
        }
    }

    fn selection_mut(
        &mut self,
        step: usize,
        position: &[Position],
    ) -> Result<&mut SelectionSet, PlanningError> {
        let draft = self.operation_mut(step)?;
        selection_at(&mut draft.selection, position).ok_or_else(|| {
            PlanningError::internal(format!("no selection at {position:?} in step {step}"))
        })
    }

    pub(crate) fn finish(self) -> Result<QueryPlan, PlanningError> {
        let shape = self
            .shape
            .clone()
            .ok_or_else(|| PlanningError::internal("operation was not planned"))?;
        let order = self.topological_order()?;
        let ids: HashMap<usize, StepId> = order
            .iter()
            .enumerate()
            .map(|(index, &draft)| (draft, StepId(index)))
            .collect();

        let mut steps = Vec::with_capacity(order.len());
        for (index, &draft_id) in order.iter().enumerate() {
            let id = StepId(index);
            let mut depends_on: Vec<StepId> = self
                .graph
                .neighbors_directed(NodeIndex::new(draft_id), Direction::Incoming)
                .filter_map(|producer| ids.get(&producer.index()).copied())
                .collect();
            depends_on.sort();
            depends_on.dedup();

            let step = match &self.drafts[draft_id] {
                Draft::Operation(draft) => PlanStep::Operation(OperationPlanStep {
                    id,
                    operation: self.source_operation(draft, id, &ids)?,
                    response_path: draft.response_path.clone(),
                    type_condition: draft.type_condition.clone(),
                    depends_on,
                    cost: self.operation_cost(draft),
                }),
                Draft::Dispatch(dispatch) => {
                    let mut branches = IndexMap::with_capacity(dispatch.branches.len());
                    let mut cost: f64 = 0.0;
                    for (discriminator, &branch) in &dispatch.branches {
                        let draft = self.operation(branch)?;
                        cost = cost.max(self.operation_cost(draft));
                        branches.insert(
                            discriminator.clone(),
                            self.source_operation(draft, id, &ids)?,
                        );
                    }
                    let fallback = match dispatch.fallback {
                        Some(fallback) => {
                            let draft = self.operation(fallback)?;
                            cost = cost.max(self.operation_cost(draft));
                            Some(self.source_operation(draft, id, &ids)?)
                        }
                        None => None,
                    };
                    let discriminator = match &dispatch.discriminator {
                        DraftDiscriminator::Field { producer, path } => Discriminator::Field {
                            producer: self.step_id(&ids, *producer)?,
                            path: path.clone(),
                        },
                        DraftDiscriminator::NodeId(id) => Discriminator::NodeId { id: id.clone() },
                    };
                    PlanStep::EntityLookup(EntityLookupPlanStep {
                        id,
                        response_path: dispatch.response_path.clone(),
                        discriminator,
                        branches,
                        fallback,
                        strict: dispatch.strict,
                        depends_on,
                        cost,
                    })
                }
            };
            steps.push(step);
        }

        let cost = steps.iter().map(PlanStep::cost).sum();
        Ok(QueryPlan {
            operation_kind: self.operation.kind,
            steps,
            response_shape: shape,
            cost,
        })
    }

    /// Scheduled drafts in dependency order, lowest draft id first among ready drafts.
    fn topological_order(&self) -> Result<Vec<usize>, PlanningError> {
        let scheduled: Vec<usize> = (0..self.drafts.len())
            .filter(|&id| self.owner(id) == id)
            .collect();
        let mut in_degree: HashMap<usize, usize> = scheduled
            .iter()
            .map(|&id| {
                let degree = self
                    .graph
                    .neighbors_directed(NodeIndex::new(id), Direction::Incoming)
                    .count();
                (id, degree)
            })
            .collect();
        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(&id, _)| Reverse(id))
            .collect();

        let mut order = Vec::with_capacity(scheduled.len());
        while let Some(Reverse(id)) = ready.pop() {
            order.push(id);
            for consumer in self
                .graph
                .neighbors_directed(NodeIndex::new(id), Direction::Outgoing)
            {
                if let Some(degree) = in_degree.get_mut(&consumer.index()) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(Reverse(consumer.index()));
                    }
                }
            }
        }
        if order.len() != scheduled.len() {
            return Err(PlanningError::internal("plan steps form a cycle"));
        }
        Ok(order)
    }

    fn step_id(&self, ids: &HashMap<usize, StepId>, draft: usize) -> Result<StepId, PlanningError> {
        ids.get(&self.owner(draft))
            .copied()
            .ok_or_else(|| PlanningError::internal(format!("draft {draft} was not scheduled")))
    }

    fn source_operation(
        &self,
        draft: &OperationDraft,
        id: StepId,
        ids: &HashMap<usize, StepId>,
    ) -> Result<SourceOperation, PlanningError> {
        let selection_set = match &draft.root {
            DraftRoot::Root => draft.selection.clone(),
            DraftRoot::Lookup { field, arguments } => {
                let mut lookup = Field::new(field.as_str());
                lookup.arguments = arguments.clone();
                lookup.selection_set = draft.selection.clone();
                SelectionSet(vec![lookup.into()])
            }
        };

        let mut variables = Vec::with_capacity(draft.variables.len());
        let mut definitions = Vec::new();
        for binding in &draft.variables {
            definitions.push(VariableDefinition::new(
                binding.name.as_str(),
                binding.ty.clone(),
            ));
            variables.push(VariableBinding {
                name: binding.name.clone(),
                ty: binding.ty.clone(),
                producer: self.step_id(ids, binding.producer)?,
                path: binding.path.clone(),
            });
        }
        let mut forwarded_variables = Vec::new();
        for name in selection_set.variable_references() {
            if draft.variables.iter().any(|binding| binding.name == name) {
                continue;
            }
            let definition = self
                .operation
                .variable_definition(&name)
                .ok_or_else(|| PlanningError::UnknownVariable(name.clone()))?;
            definitions.push(definition.clone());
            forwarded_variables.push(name);
        }

        let operation_name = self
            .operation
            .name
            .as_ref()
            .map(|name| format!("{name}__{}__{id}", draft.source));
        let document = Operation {
            kind: draft.kind,
            name: operation_name.clone(),
            variables: definitions,
            selection_set,
        };
        Ok(SourceOperation {
            source: draft.source.clone(),
            document: document.to_string(),
            operation_name,
            result_root: match &draft.root {
                DraftRoot::Root => None,
                DraftRoot::Lookup { field, .. } => Some(field.clone()),
            },
            owned_fields: draft.owned_fields.clone(),
            variables,
            forwarded_variables,
        })
    }

    fn operation_cost(&self, draft: &OperationDraft) -> f64 {
        self.config.step_cost * self.schema.source_weight(draft.source.as_str())
            + self.config.field_cost * count_fields(&draft.selection) as f64
    }
}

/// Adds a collected field, merging it into an earlier field with the same response key and
/// conditions.
fn push_collected(fields: &mut Vec<CollectedField>, field: CollectedField) {
    let existing = fields.iter_mut().find(|existing| {
        existing.key() == field.key()
            && existing.field.name == field.field.name
            && existing.conditions == field.conditions
    });
    match existing {
        Some(existing) => existing
            .field
            .selection_set
            .0
            .extend(field.field.selection_set.0),
        None => fields.push(field),
    }
}

/// Adds a field to a document selection. A field with the same key, name and arguments is
/// reused; if the two differ in conditions the field is fetched unconditionally, the response
/// shape still applies the client's conditions.
fn merge_field(selection: &mut SelectionSet, field: Field) {
    let existing = selection.0.iter_mut().find_map(|selection| match selection {
        Selection::Field(existing)
            if existing.response_key() == field.response_key()
                && existing.name == field.name
                && existing.arguments == field.arguments =>
        {
            Some(existing)
        }
        _ => None,
    });
    match existing {
        Some(existing) => {
            if existing.conditions != field.conditions {
                existing.conditions.clear();
            }
        }
        None => selection.0.push(field.into()),
    }
}

fn selection_at<'s>(
    selection: &'s mut SelectionSet,
    position: &[Position],
) -> Option<&'s mut SelectionSet> {
    let Some((first, rest)) = position.split_first() else {
        return Some(selection);
    };
    let next = match first {
        Position::Field(key) => selection.0.iter_mut().find_map(|selection| match selection {
            Selection::Field(field) if field.response_key() == key => {
                Some(&mut field.selection_set)
            }
            _ => None,
        })?,
        Position::Fragment(type_name) => {
            let index = selection.0.iter().position(|selection| {
                matches!(
                    selection,
                    Selection::InlineFragment(fragment)
                        if fragment.type_condition.as_deref() == Some(type_name.as_str())
                            && fragment.conditions.is_empty()
                )
            });
            let index = match index {
                Some(index) => index,
                None => {
                    selection
                        .0
                        .push(InlineFragment::on(type_name.as_str()).into());
                    selection.0.len() - 1
                }
            };
            match selection.0.get_mut(index)? {
                Selection::InlineFragment(fragment) => &mut fragment.selection_set,
                Selection::Field(_) => return None,
            }
        }
    };
    selection_at(next, rest)
}

fn count_fields(selection: &SelectionSet) -> usize {
    selection
        .iter()
        .map(|selection| match selection {
            Selection::Field(field) => 1 + count_fields(&field.selection_set),
            Selection::InlineFragment(fragment) => count_fields(&fragment.selection_set),
        })
        .sum()
}
