//! Best-first search over source assignments for a group of sibling fields.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::query_planner::QueryPlannerConfig;
use crate::schema::CompositeSchema;
use crate::schema::SourceSchemaName;

/// The fields of a group (by index) that one source resolves.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct SourceAssignment {
    pub(crate) source: SourceSchemaName,
    pub(crate) fields: Vec<usize>,
}

#[derive(Clone, Debug)]
struct PartialPlan {
    cost: f64,
    groups: Vec<SourceAssignment>,
    covered: Vec<bool>,
}

impl PartialPlan {
    fn next_uncovered(&self) -> Option<usize> {
        self.covered.iter().position(|covered| !covered)
    }

    fn source_names(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|group| group.source.as_str())
    }

    /// Adds a step on `source` that absorbs every uncovered field it can resolve.
    fn extend(
        &self,
        source: &SourceSchemaName,
        candidates: &[Vec<SourceSchemaName>],
        schema: &CompositeSchema,
        config: &QueryPlannerConfig,
    ) -> Self {
        let mut next = self.clone();
        let fields: Vec<usize> = (0..candidates.len())
            .filter(|&i| !self.covered[i] && candidates[i].contains(source))
            .collect();
        for &i in &fields {
            next.covered[i] = true;
        }
        next.cost += config.step_cost * schema.source_weight(source.as_str())
            + config.field_cost * fields.len() as f64;
        next.groups.push(SourceAssignment {
            source: source.clone(),
            fields,
        });
        next
    }
}

impl PartialEq for PartialPlan {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PartialPlan {}

impl PartialOrd for PartialPlan {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PartialPlan {
    // Reversed so that the max-heap pops the cheapest plan first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.groups.len().cmp(&self.groups.len()))
            .then_with(|| other.source_names().cmp(self.source_names()))
    }
}

/// Picks the sources resolving a group of sibling fields, where `candidates[i]` lists the sources
/// able to resolve field `i`. Every field must have at least one candidate.
///
/// Plans are expanded cheapest first: cost is a fixed per-step cost scaled by the source weight
/// plus a per-field cost, so fewer and lighter steps win. Ties go to fewer steps, then to source
/// names in lexicographic order. Once `max_evaluated_plans` have been expanded, the cheapest
/// remaining plan is completed greedily.
pub(crate) fn select_sources(
    schema: &CompositeSchema,
    config: &QueryPlannerConfig,
    candidates: &[Vec<SourceSchemaName>],
) -> Vec<SourceAssignment> {
    let initial = PartialPlan {
        cost: 0.0,
        groups: Vec::new(),
        covered: candidates.iter().map(Vec::is_empty).collect(),
    };
    let mut frontier = BinaryHeap::from([initial]);
    let mut evaluated = 0;
    let best = loop {
        let Some(plan) = frontier.pop() else {
            return Vec::new();
        };
        let Some(field) = plan.next_uncovered() else {
            break plan;
        };
        evaluated += 1;
        if evaluated > config.max_evaluated_plans {
            tracing::debug!(
                evaluated,
                "source selection budget exhausted, completing greedily"
            );
            break complete_greedily(plan, schema, config, candidates);
        }
        let mut sources = candidates[field].clone();
        sources.sort();
        sources.dedup();
        for source in &sources {
            frontier.push(plan.extend(source, candidates, schema, config));
        }
    };

    let mut groups = best.groups;
    groups.sort_by_key(|group| group.fields.first().copied());
    groups
}

fn complete_greedily(
    mut plan: PartialPlan,
    schema: &CompositeSchema,
    config: &QueryPlannerConfig,
    candidates: &[Vec<SourceSchemaName>],
) -> PartialPlan {
    while plan.next_uncovered().is_some() {
        let mut best: Option<(usize, &SourceSchemaName)> = None;
        for (i, sources) in candidates.iter().enumerate() {
            if plan.covered[i] {
                continue;
            }
            for source in sources {
                let absorbed = (0..candidates.len())
                    .filter(|&j| !plan.covered[j] && candidates[j].contains(source))
                    .count();
                let better = match best {
                    None => true,
                    Some((count, current)) => {
                        absorbed > count
                            || (absorbed == count
                                && schema
                                    .source_weight(source.as_str())
                                    .total_cmp(&schema.source_weight(current.as_str()))
                                    .then_with(|| source.cmp(current))
                                    == Ordering::Less)
                    }
                };
                if better {
                    best = Some((absorbed, source));
                }
            }
        }
        let Some((_, source)) = best else {
            break;
        };
        plan = plan.extend(source, candidates, schema, config);
    }
    plan
}
