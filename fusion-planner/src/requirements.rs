use crate::error::PlanningError;
use crate::schema::CompositeSchema;
use crate::schema::Requirement;
use crate::schema::SchemaCoordinate;
use crate::schema::SourceSchemaName;

/// Answers which sibling data a field needs before a source can resolve it, and tracks the
/// chain of requirements currently being planned so that loops are rejected instead of followed.
#[derive(Debug)]
pub struct RequirementResolver<'a> {
    schema: &'a CompositeSchema,
    chain: Vec<SchemaCoordinate>,
}

impl<'a> RequirementResolver<'a> {
    pub fn new(schema: &'a CompositeSchema) -> Self {
        Self {
            schema,
            chain: Vec::new(),
        }
    }

    /// The selection that must already be available before `coordinate` can be requested from
    /// `source`, or `None` when the source needs nothing beyond the entity key.
    pub fn requirements_for(
        &self,
        coordinate: &SchemaCoordinate,
        source: &SourceSchemaName,
    ) -> Result<Option<&'a Requirement>, PlanningError> {
        let binding = self.schema.binding(coordinate, source.as_str()).ok_or_else(|| {
            PlanningError::unsatisfiable(
                coordinate.clone(),
                format!("source `{source}` does not resolve it"),
            )
        })?;
        Ok(binding.requirement.as_ref())
    }

    /// Marks `coordinate` as being planned, failing if it already is further up the chain.
    pub fn enter(&mut self, coordinate: &SchemaCoordinate) -> Result<(), PlanningError> {
        if let Some(start) = self.chain.iter().position(|c| c == coordinate) {
            let mut cycle = self.chain[start..].to_vec();
            cycle.push(coordinate.clone());
            return Err(PlanningError::CircularRequirement(cycle));
        }
        self.chain.push(coordinate.clone());
        Ok(())
    }

    pub fn leave(&mut self, coordinate: &SchemaCoordinate) {
        if self.chain.last() == Some(coordinate) {
            self.chain.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.chain.len()
    }
}
