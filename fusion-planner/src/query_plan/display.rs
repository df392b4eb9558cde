use std::fmt;

use super::Discriminator;
use super::EntityLookupPlanStep;
use super::OperationPlanStep;
use super::PlanStep;
use super::QueryPlan;
use super::SourceOperation;
use super::StepId;

impl fmt::Display for QueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "QueryPlan(cost: {}) {{", self.cost)?;
        for step in &self.steps {
            match step {
                PlanStep::Operation(step) => write_operation_step(f, step)?,
                PlanStep::EntityLookup(step) => write_entity_lookup_step(f, step)?,
            }
        }
        f.write_str("}")
    }
}

impl fmt::Display for Discriminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field { producer, path } => write!(f, "{producer}.{path}"),
            Self::NodeId { id } => write!(f, "nodeId({id})"),
        }
    }
}

fn write_operation_step(f: &mut fmt::Formatter<'_>, step: &OperationPlanStep) -> fmt::Result {
    write!(f, "  Operation(id: {}, source: {}", step.id, step.operation.source)?;
    if !step.response_path.is_root() {
        write!(f, ", path: {}", step.response_path)?;
    }
    if let Some(type_condition) = &step.type_condition {
        write!(f, ", typeCondition: {type_condition}")?;
    }
    write_depends_on(f, &step.depends_on)?;
    writeln!(f, ") {{")?;
    writeln!(f, "    {}", step.operation.document)?;
    writeln!(f, "  }}")
}

fn write_entity_lookup_step(f: &mut fmt::Formatter<'_>, step: &EntityLookupPlanStep) -> fmt::Result {
    write!(f, "  EntityLookup(id: {}", step.id)?;
    if !step.response_path.is_root() {
        write!(f, ", path: {}", step.response_path)?;
    }
    write!(f, ", discriminator: {}", step.discriminator)?;
    if step.strict {
        f.write_str(", strict")?;
    }
    write_depends_on(f, &step.depends_on)?;
    writeln!(f, ") {{")?;
    for (discriminator, operation) in &step.branches {
        write_branch(f, &format!("Branch({discriminator}, source: {}", operation.source), operation)?;
    }
    if let Some(fallback) = &step.fallback {
        write_branch(f, &format!("Fallback(source: {}", fallback.source), fallback)?;
    }
    writeln!(f, "  }}")
}

fn write_branch(f: &mut fmt::Formatter<'_>, header: &str, operation: &SourceOperation) -> fmt::Result {
    writeln!(f, "    {header}) {{")?;
    writeln!(f, "      {}", operation.document)?;
    writeln!(f, "    }}")
}

fn write_depends_on(f: &mut fmt::Formatter<'_>, depends_on: &[StepId]) -> fmt::Result {
    if depends_on.is_empty() {
        return Ok(());
    }
    f.write_str(", dependsOn: [")?;
    for (i, id) in depends_on.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{id}")?;
    }
    f.write_str("]")
}
