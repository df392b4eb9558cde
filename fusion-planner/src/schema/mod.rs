//! The composite schema model.
//!
//! A [`CompositeSchema`] is loaded once from the artifact produced by composition and is then
//! read-only: it is shared behind an `Arc` and queried concurrently by every planning request.
//! Types, fields, bindings and lookups live in flat tables keyed by type name or
//! [`SchemaCoordinate`]; relationships between types are looked up, never traversed through
//! references.

mod artifact;
mod coordinate;
mod field_set;
mod field_type;

use std::collections::BTreeMap;
use std::collections::HashMap;

use indexmap::IndexMap;
use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;
use sha2::Digest;
use sha2::Sha256;

pub use self::artifact::*;
pub use self::coordinate::SchemaCoordinate;
pub use self::coordinate::SourceSchemaName;
pub use self::field_set::FieldPath;
pub use self::field_set::FieldSet;
pub use self::field_set::FieldSetItem;
pub use self::field_type::FieldType;
use crate::error::SchemaError;

pub const TYPENAME_FIELD: &str = "__typename";

const BUILT_IN_SCALARS: [&str; 5] = ["String", "Int", "Float", "Boolean", "ID"];

#[derive(Clone, Debug, PartialEq)]
pub struct SourceSchema {
    pub name: SourceSchemaName,
    pub weight: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum_macros::Display)]
pub enum TypeKind {
    Object,
    Interface,
    Union,
    Scalar,
    Enum,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypeDefinition {
    pub name: String,
    pub kind: TypeKind,
    pub fields: IndexMap<String, FieldDefinition>,
    pub implements: Vec<String>,
}

impl TypeDefinition {
    pub fn is_abstract(&self) -> bool {
        matches!(self.kind, TypeKind::Interface | TypeKind::Union)
    }

    pub fn is_composite(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::Object | TypeKind::Interface | TypeKind::Union
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldDefinition {
    pub name: String,
    pub ty: FieldType,
    pub arguments: IndexMap<String, FieldType>,
}

/// One source schema able to resolve a field.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldBinding {
    pub source: SourceSchemaName,
    /// Sibling data the source needs before the field can be requested from it.
    pub requirement: Option<Requirement>,
    /// The source declares the field but does not resolve it.
    pub external: bool,
}

impl FieldBinding {
    pub fn is_resolvable(&self) -> bool {
        !self.external
    }

    /// Whether requirement values are passed to the source as field arguments, which forces the
    /// field into a step that runs after the data is available.
    pub fn has_argument_requirements(&self) -> bool {
        self.requirement
            .as_ref()
            .is_some_and(|requirement| !requirement.arguments.is_empty())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Requirement {
    pub fields: FieldSet,
    pub arguments: IndexMap<String, FieldPath>,
}

/// The field set identifying an entity instance within one source schema.
#[derive(Clone, Debug, PartialEq)]
pub struct EntityKey {
    pub fields: Vec<KeyField>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct KeyField {
    pub path: FieldPath,
    pub ty: FieldType,
}

/// A source schema's root field resolving an entity from its key.
#[derive(Clone, Debug, PartialEq)]
pub struct Lookup {
    pub type_name: String,
    pub source: SourceSchemaName,
    pub field_name: String,
    pub arguments: Vec<LookupArgument>,
    pub key: EntityKey,
}

impl Lookup {
    /// Lookups taking a single `id` usable to resolve global object identifiers.
    pub fn is_by_id(&self) -> bool {
        matches!(self.arguments.as_slice(), [argument] if argument.path.segments() == ["id"])
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LookupArgument {
    pub name: String,
    pub ty: FieldType,
    pub path: FieldPath,
}

#[derive(Debug)]
pub struct CompositeSchema {
    sources: IndexMap<SourceSchemaName, SourceSchema>,
    types: IndexMap<String, TypeDefinition>,
    bindings: HashMap<SchemaCoordinate, Vec<FieldBinding>>,
    lookups: HashMap<String, Vec<Lookup>>,
    possible_types: HashMap<String, Vec<String>>,
    query_type: String,
    mutation_type: Option<String>,
    hash: String,
}

impl CompositeSchema {
    pub fn parse_json(input: &str) -> Result<Self, SchemaError> {
        let definition: SchemaDefinition =
            serde_json::from_str(input).map_err(|error| SchemaError::Parse(error.to_string()))?;
        Self::new(definition)
    }

    pub fn parse_yaml(input: &str) -> Result<Self, SchemaError> {
        let definition: SchemaDefinition =
            serde_yaml::from_str(input).map_err(|error| SchemaError::Parse(error.to_string()))?;
        Self::new(definition)
    }

    pub fn new(definition: SchemaDefinition) -> Result<Self, SchemaError> {
        let hash = hex::encode(Sha256::digest(
            serde_json::to_vec(&definition).map_err(|error| SchemaError::Parse(error.to_string()))?,
        ));

        let mut sources = IndexMap::new();
        for source in &definition.sources {
            let name = SourceSchemaName::from(source.name.as_str());
            let schema = SourceSchema {
                name: name.clone(),
                weight: source.weight,
            };
            if sources.insert(name.clone(), schema).is_some() {
                return Err(SchemaError::DuplicateSource(name));
            }
        }

        let mut types = IndexMap::new();
        for name in BUILT_IN_SCALARS {
            types.insert(
                name.to_string(),
                TypeDefinition {
                    name: name.to_string(),
                    kind: TypeKind::Scalar,
                    fields: IndexMap::new(),
                    implements: Vec::new(),
                },
            );
        }
        for input in &definition.types {
            let definition = type_definition(input)?;
            if types.insert(definition.name.clone(), definition).is_some()
                && !BUILT_IN_SCALARS.contains(&input.name())
            {
                return Err(SchemaError::DuplicateType(input.name().to_string()));
            }
        }

        let mut schema = Self {
            sources,
            types,
            bindings: HashMap::new(),
            lookups: HashMap::new(),
            possible_types: HashMap::new(),
            query_type: definition
                .query_type
                .clone()
                .unwrap_or_else(|| "Query".to_string()),
            mutation_type: None,
            hash,
        };
        schema.check_type_references(&definition)?;
        schema.collect_possible_types(&definition);
        schema.collect_bindings(&definition)?;
        schema.collect_lookups(&definition)?;

        match schema.types.get(&schema.query_type) {
            Some(ty) if ty.kind == TypeKind::Object => {}
            _ => return Err(SchemaError::MissingRootType("query")),
        }
        schema.mutation_type = match &definition.mutation_type {
            Some(name) if schema.types.contains_key(name) => Some(name.clone()),
            Some(_) => return Err(SchemaError::MissingRootType("mutation")),
            None => schema
                .types
                .contains_key("Mutation")
                .then(|| "Mutation".to_string()),
        };

        schema.check_requirement_cycles()?;
        tracing::debug!(
            types = schema.types.len(),
            sources = schema.sources.len(),
            "composite schema loaded"
        );
        Ok(schema)
    }

    fn check_type_references(&self, definition: &SchemaDefinition) -> Result<(), SchemaError> {
        for ty in self.types.values() {
            for field in ty.fields.values() {
                self.expect_type(field.ty.named_type())?;
                for argument in field.arguments.values() {
                    self.expect_type(argument.named_type())?;
                }
            }
            for interface in &ty.implements {
                match self.types.get(interface) {
                    Some(definition) if definition.kind == TypeKind::Interface => {}
                    _ => return Err(SchemaError::UnknownType(interface.clone())),
                }
            }
        }
        for input in &definition.types {
            if let TypeDefinitionInput::Union { members, .. } = input {
                for member in members {
                    match self.types.get(member) {
                        Some(definition) if definition.kind == TypeKind::Object => {}
                        _ => return Err(SchemaError::UnknownType(member.clone())),
                    }
                }
            }
        }
        Ok(())
    }

    fn expect_type(&self, name: &str) -> Result<&TypeDefinition, SchemaError> {
        self.types
            .get(name)
            .ok_or_else(|| SchemaError::UnknownType(name.to_string()))
    }

    fn collect_possible_types(&mut self, definition: &SchemaDefinition) {
        let mut possible_types: HashMap<String, Vec<String>> = HashMap::new();
        for ty in self.types.values() {
            if ty.kind == TypeKind::Object {
                possible_types.insert(ty.name.clone(), vec![ty.name.clone()]);
                for interface in &ty.implements {
                    possible_types
                        .entry(interface.clone())
                        .or_default()
                        .push(ty.name.clone());
                }
            }
        }
        for input in &definition.types {
            if let TypeDefinitionInput::Union { name, members } = input {
                possible_types.insert(name.clone(), members.clone());
            }
        }
        self.possible_types = possible_types;
    }

    fn collect_bindings(&mut self, definition: &SchemaDefinition) -> Result<(), SchemaError> {
        let mut bindings = HashMap::new();
        let mut derived = Vec::new();
        for input in &definition.types {
            let (name, fields, is_interface) = match input {
                TypeDefinitionInput::Object { name, fields, .. } => (name, fields, false),
                TypeDefinitionInput::Interface { name, fields, .. } => (name, fields, true),
                _ => continue,
            };
            for field in fields {
                let coordinate = SchemaCoordinate::new(name.as_str(), field.name.as_str());
                let mut field_bindings = Vec::with_capacity(field.sources.len());
                for source in &field.sources {
                    field_bindings.push(self.field_binding(&coordinate, source)?);
                }
                if !field_bindings.iter().any(FieldBinding::is_resolvable) {
                    if is_interface && field_bindings.is_empty() {
                        derived.push(coordinate);
                        continue;
                    }
                    return Err(SchemaError::MissingBinding(coordinate));
                }
                bindings.insert(coordinate, field_bindings);
            }
        }

        // Interface fields without explicit bindings are resolvable by the sources that resolve
        // them, without requirements, on every implementation.
        for coordinate in derived {
            let mut common: Option<Vec<SourceSchemaName>> = None;
            for object in self.possible_types(&coordinate.type_name) {
                let implementation = SchemaCoordinate::new(object.as_str(), coordinate.field_name.as_str());
                let sources: Vec<SourceSchemaName> = bindings
                    .get(&implementation)
                    .into_iter()
                    .flatten()
                    .filter(|binding: &&FieldBinding| {
                        binding.is_resolvable() && binding.requirement.is_none()
                    })
                    .map(|binding| binding.source.clone())
                    .collect();
                common = Some(match common {
                    None => sources,
                    Some(common) => common.into_iter().filter(|s| sources.contains(s)).collect(),
                });
            }
            let field_bindings = common
                .unwrap_or_default()
                .into_iter()
                .map(|source| FieldBinding {
                    source,
                    requirement: None,
                    external: false,
                })
                .collect();
            bindings.insert(coordinate, field_bindings);
        }
        self.bindings = bindings;
        Ok(())
    }

    fn field_binding(
        &self,
        coordinate: &SchemaCoordinate,
        input: &FieldSourceInput,
    ) -> Result<FieldBinding, SchemaError> {
        let source = SourceSchemaName::from(input.source.as_str());
        if !self.sources.contains_key(&source) {
            return Err(SchemaError::UnknownSource {
                coordinate: coordinate.clone(),
                source_name: source,
            });
        }
        let requirement = match &input.requires {
            None => None,
            Some(RequirementInput::FieldSet(fields)) => Some(Requirement {
                fields: FieldSet::parse(fields)?,
                arguments: IndexMap::new(),
            }),
            Some(RequirementInput::Detailed { fields, arguments }) => Some(Requirement {
                fields: FieldSet::parse(fields)?,
                arguments: arguments
                    .iter()
                    .map(|(argument, path)| Ok((argument.clone(), FieldPath::parse(path)?)))
                    .collect::<Result<_, SchemaError>>()?,
            }),
        };
        if let Some(requirement) = &requirement {
            let referenced_by = format!("the requirement of `{coordinate}`");
            for path in requirement.fields.leaf_paths() {
                self.resolve_path(&coordinate.type_name, &path, &referenced_by)?;
            }
            for path in requirement.arguments.values() {
                if !requirement.fields.leaf_paths().contains(path) {
                    return Err(SchemaError::InvalidFieldSet {
                        field_set: requirement.fields.to_string(),
                        message: format!("argument path `{path}` is not selected"),
                    });
                }
            }
        }
        Ok(FieldBinding {
            source,
            requirement,
            external: input.external,
        })
    }

    fn collect_lookups(&mut self, definition: &SchemaDefinition) -> Result<(), SchemaError> {
        let mut lookups: HashMap<String, Vec<Lookup>> = HashMap::new();
        for input in &definition.types {
            let TypeDefinitionInput::Object {
                name,
                lookups: inputs,
                ..
            } = input
            else {
                continue;
            };
            for lookup in inputs {
                let source = SourceSchemaName::from(lookup.source.as_str());
                let invalid = |message: String| SchemaError::InvalidLookup {
                    type_name: name.clone(),
                    source_name: source.clone(),
                    field: lookup.field.clone(),
                    message,
                };
                if !self.sources.contains_key(&source) {
                    return Err(invalid("unknown source schema".to_string()));
                }
                if lookup.arguments.is_empty() {
                    return Err(invalid("a lookup takes at least one key argument".to_string()));
                }
                let referenced_by = format!("lookup `{}`", lookup.field);
                let mut arguments = Vec::with_capacity(lookup.arguments.len());
                for argument in &lookup.arguments {
                    let path = FieldPath::parse(&argument.path)?;
                    self.resolve_path(name, &path, &referenced_by)?;
                    arguments.push(LookupArgument {
                        name: argument.name.clone(),
                        ty: FieldType::parse(&argument.ty)?,
                        path,
                    });
                }
                let key = EntityKey {
                    fields: arguments
                        .iter()
                        .map(|argument| KeyField {
                            path: argument.path.clone(),
                            ty: argument.ty.clone(),
                        })
                        .collect(),
                };
                lookups.entry(name.clone()).or_default().push(Lookup {
                    type_name: name.clone(),
                    source: source.clone(),
                    field_name: lookup.field.clone(),
                    arguments,
                    key,
                });
            }
        }
        self.lookups = lookups;
        Ok(())
    }

    /// Follows `path` from `type_name` and returns the definition of the last field.
    fn resolve_path(
        &self,
        type_name: &str,
        path: &FieldPath,
        referenced_by: &str,
    ) -> Result<&FieldDefinition, SchemaError> {
        let mut current = type_name;
        let mut found = None;
        for segment in path.segments() {
            let field = self
                .types
                .get(current)
                .and_then(|ty| ty.fields.get(segment))
                .ok_or_else(|| SchemaError::UnknownField {
                    type_name: current.to_string(),
                    field_name: segment.clone(),
                    referenced_by: referenced_by.to_string(),
                })?;
            current = field.ty.named_type();
            found = Some(field);
        }
        found.ok_or_else(|| SchemaError::InvalidFieldSet {
            field_set: path.to_string(),
            message: "empty path".to_string(),
        })
    }

    /// Rejects requirement chains that loop back on themselves.
    ///
    /// Only fields whose every resolvable binding carries a requirement take part: a field some
    /// source resolves without requirements always breaks the chain.
    fn check_requirement_cycles(&self) -> Result<(), SchemaError> {
        let constrained: BTreeMap<&SchemaCoordinate, Vec<&Requirement>> = self
            .bindings
            .iter()
            .filter_map(|(coordinate, bindings)| {
                let requirements: Option<Vec<&Requirement>> = bindings
                    .iter()
                    .filter(|binding| binding.is_resolvable())
                    .map(|binding| binding.requirement.as_ref())
                    .collect();
                requirements
                    .filter(|requirements| !requirements.is_empty())
                    .map(|requirements| (coordinate, requirements))
            })
            .collect();

        let mut graph = DiGraph::<&SchemaCoordinate, ()>::new();
        let nodes: HashMap<&SchemaCoordinate, _> = constrained
            .keys()
            .map(|coordinate| (*coordinate, graph.add_node(*coordinate)))
            .collect();
        for (coordinate, requirements) in &constrained {
            for requirement in requirements {
                for path in requirement.fields.leaf_paths() {
                    let mut type_name = coordinate.type_name.as_str();
                    for segment in path.segments() {
                        let required = SchemaCoordinate::new(type_name, segment.as_str());
                        if let Some(target) = nodes.get(&required) {
                            graph.update_edge(nodes[coordinate], *target, ());
                        }
                        type_name = self
                            .field_definition(type_name, segment)
                            .map(|field| field.ty.named_type())
                            .unwrap_or_default();
                    }
                }
            }
        }

        for component in tarjan_scc(&graph) {
            let is_cycle = component.len() > 1
                || component
                    .first()
                    .is_some_and(|node| graph.contains_edge(*node, *node));
            if is_cycle {
                let mut chain: Vec<SchemaCoordinate> = component
                    .into_iter()
                    .map(|node| graph[node].clone())
                    .collect();
                chain.sort();
                if let Some(first) = chain.first().cloned() {
                    chain.push(first);
                }
                return Err(SchemaError::CircularRequirement(chain));
            }
        }
        Ok(())
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn sources(&self) -> impl Iterator<Item = &SourceSchema> {
        self.sources.values()
    }

    pub fn source(&self, name: &str) -> Option<&SourceSchema> {
        self.sources.get(name)
    }

    pub fn source_weight(&self, name: &str) -> f64 {
        self.source(name).map_or(1.0, |source| source.weight)
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDefinition> {
        self.types.values()
    }

    pub fn type_definition(&self, name: &str) -> Option<&TypeDefinition> {
        self.types.get(name)
    }

    pub fn field_definition(&self, type_name: &str, field_name: &str) -> Option<&FieldDefinition> {
        self.types.get(type_name)?.fields.get(field_name)
    }

    pub fn field(&self, coordinate: &SchemaCoordinate) -> Option<&FieldDefinition> {
        self.field_definition(&coordinate.type_name, &coordinate.field_name)
    }

    /// Every binding of a field, including external declarations.
    pub fn resolve_bindings(&self, coordinate: &SchemaCoordinate) -> &[FieldBinding] {
        self.bindings.get(coordinate).map_or(&[], Vec::as_slice)
    }

    /// The binding through which `source` resolves the field, if it resolves it at all.
    pub fn binding(&self, coordinate: &SchemaCoordinate, source: &str) -> Option<&FieldBinding> {
        self.resolve_bindings(coordinate)
            .iter()
            .find(|binding| binding.is_resolvable() && binding.source.as_str() == source)
    }

    pub fn can_resolve(&self, coordinate: &SchemaCoordinate, source: &str) -> bool {
        self.binding(coordinate, source).is_some()
    }

    /// Sources resolving the field, in declaration order.
    pub fn resolvable_sources(&self, coordinate: &SchemaCoordinate) -> Vec<SourceSchemaName> {
        self.resolve_bindings(coordinate)
            .iter()
            .filter(|binding| binding.is_resolvable())
            .map(|binding| binding.source.clone())
            .collect()
    }

    /// The key `source` identifies instances of `type_name` by, if the source can look them up.
    pub fn entity_keys(&self, type_name: &str, source: &str) -> Option<&EntityKey> {
        self.lookup(type_name, source).map(|lookup| &lookup.key)
    }

    pub fn is_entity(&self, type_name: &str) -> bool {
        !self.lookups(type_name).is_empty()
    }

    pub fn lookups(&self, type_name: &str) -> &[Lookup] {
        self.lookups.get(type_name).map_or(&[], Vec::as_slice)
    }

    pub fn lookup(&self, type_name: &str, source: &str) -> Option<&Lookup> {
        self.lookups(type_name)
            .iter()
            .find(|lookup| lookup.source.as_str() == source)
    }

    /// Concrete object types a value of `type_name` can have.
    pub fn possible_types(&self, type_name: &str) -> &[String] {
        self.possible_types.get(type_name).map_or(&[], Vec::as_slice)
    }

    pub fn is_abstract(&self, type_name: &str) -> bool {
        self.types
            .get(type_name)
            .is_some_and(TypeDefinition::is_abstract)
    }

    pub fn query_type(&self) -> &str {
        &self.query_type
    }

    pub fn mutation_type(&self) -> Option<&str> {
        self.mutation_type.as_deref()
    }

    /// The `node(id: ID!)` field of the query type, when it returns an abstract type.
    pub fn node_field(&self) -> Option<&FieldDefinition> {
        let field = self.field_definition(&self.query_type, "node")?;
        (field.arguments.contains_key("id") && self.is_abstract(field.ty.named_type()))
            .then_some(field)
    }
}

fn type_definition(input: &TypeDefinitionInput) -> Result<TypeDefinition, SchemaError> {
    let (kind, fields, implements) = match input {
        TypeDefinitionInput::Object {
            fields, implements, ..
        } => (TypeKind::Object, fields.as_slice(), implements.clone()),
        TypeDefinitionInput::Interface {
            fields, implements, ..
        } => (TypeKind::Interface, fields.as_slice(), implements.clone()),
        TypeDefinitionInput::Union { .. } => (TypeKind::Union, [].as_slice(), Vec::new()),
        TypeDefinitionInput::Scalar { .. } => (TypeKind::Scalar, [].as_slice(), Vec::new()),
        TypeDefinitionInput::Enum { .. } => (TypeKind::Enum, [].as_slice(), Vec::new()),
    };
    let mut definitions = IndexMap::with_capacity(fields.len());
    for field in fields {
        let arguments = field
            .arguments
            .iter()
            .map(|argument| Ok((argument.name.clone(), FieldType::parse(&argument.ty)?)))
            .collect::<Result<_, SchemaError>>()?;
        definitions.insert(
            field.name.clone(),
            FieldDefinition {
                name: field.name.clone(),
                ty: FieldType::parse(&field.ty)?,
                arguments,
            },
        );
    }
    Ok(TypeDefinition {
        name: input.name().to_string(),
        kind,
        fields: definitions,
        implements,
    })
}
