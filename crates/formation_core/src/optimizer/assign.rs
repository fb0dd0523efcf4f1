//! Auto-assignment: exact bipartite matching of entities to slots.

use pathfinding::kuhn_munkres::kuhn_munkres;
use pathfinding::matrix::Matrix;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::chemistry::{compute_chemistry, ChemistryInput};
use crate::config::{AssignmentConfig, ChemistryWeights};
use crate::error::{FormationError, Result};
use crate::model::entity::raw_role_fit;
use crate::model::{Availability, Entity, EntityId, Formation, Role, Roster, Slot, SlotId};

/// Fixed-point scale for the integer solver
const SCORE_SCALE: f32 = 1_000_000.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AssignOptions {
    /// Leave slots that already hold an eligible entity as they are
    #[serde(default)]
    pub keep_existing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SlotScore {
    pub slot: SlotId,
    pub entity: EntityId,
    /// 0..=100, after familiarity and availability
    pub role_fit: f32,
    /// Mean chemistry with adjacent slots, 0..=100
    pub chemistry: f32,
    /// Weighted combination used by the solver
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AssignmentPlan {
    pub assignments: BTreeMap<SlotId, EntityId>,
    pub total_score: f32,
    pub slot_scores: Vec<SlotScore>,
}

impl AssignmentPlan {
    /// Write the plan into `formation`. Returns entities that lost their slot.
    ///
    /// Does not bump the revision.
    pub fn apply(&self, formation: &mut Formation) -> Result<Vec<EntityId>> {
        let before: BTreeSet<EntityId> = formation.assigned_entities().into_iter().collect();
        for (slot, entity) in &self.assignments {
            formation.assign(*slot, *entity)?;
        }
        let after: BTreeSet<EntityId> = formation.assigned_entities().into_iter().collect();
        Ok(before.difference(&after).copied().collect())
    }
}

/// Role fit of `entity` in `role` (0..=100): attribute fit × familiarity × availability.
pub fn role_fit(entity: &Entity, role: Role, config: &AssignmentConfig) -> f32 {
    let availability = match entity.availability {
        Availability::Available => 1.0,
        Availability::Doubtful => config.doubtful_factor,
        Availability::Injured | Availability::Suspended => config.unavailable_factor,
    };
    raw_role_fit(&entity.attributes, role) * entity.natural_role.familiarity(role) * availability
}

/// Assign entities from `pool` to the formation's slots, maximising
/// `fit_weight·fit + chemistry_weight·chemistry` summed over slots.
///
/// Deterministic for a given input: the pool is ordered by rating (higher
/// first, then id) and the solver's tie-break prefers earlier pool entries.
pub fn auto_assign(
    formation: &Formation,
    roster: &Roster,
    pool: &[EntityId],
    config: &AssignmentConfig,
    chemistry: &ChemistryWeights,
    options: &AssignOptions,
) -> Result<AssignmentPlan> {
    let mut entities = Vec::with_capacity(pool.len());
    let mut seen = BTreeSet::new();
    for id in pool {
        if seen.insert(*id) {
            entities.push(roster.require(*id)?);
        }
    }

    let eligible_ids: BTreeSet<EntityId> = entities
        .iter()
        .filter(|e| !config.exclude_unavailable || e.availability.is_selectable())
        .map(|e| e.id)
        .collect();

    // Slots kept as they are
    let mut fixed: BTreeMap<SlotId, EntityId> = BTreeMap::new();
    if options.keep_existing {
        for slot in &formation.slots {
            if let Some(entity) = slot.entity.filter(|e| eligible_ids.contains(e)) {
                fixed.insert(slot.id, entity);
            }
        }
    }
    let fixed_entities: BTreeSet<EntityId> = fixed.values().copied().collect();

    let mut targets: Vec<&Slot> = formation.slots.iter().filter(|s| !fixed.contains_key(&s.id)).collect();
    targets.sort_by_key(|s| s.id);

    let mut candidates: Vec<&Entity> = entities
        .into_iter()
        .filter(|e| eligible_ids.contains(&e.id) && !fixed_entities.contains(&e.id))
        .collect();
    candidates.sort_by(|a, b| b.rating().total_cmp(&a.rating()).then(a.id.cmp(&b.id)));

    let ctx = Scoring { formation, roster, config, chemistry };

    // Pass 0 uses whoever currently stands in the adjacent slots.
    let mut neighbours: BTreeMap<SlotId, EntityId> =
        formation.slots.iter().filter_map(|s| s.entity.map(|e| (s.id, e))).collect();

    if candidates.len() < targets.len() {
        let unfilled = ctx.unfillable(&targets, &candidates, &neighbours);
        info!(
            available = candidates.len(),
            required = targets.len(),
            unfilled = unfilled.len(),
            "auto-assign infeasible"
        );
        return Err(FormationError::AssignmentInfeasible {
            unfilled,
            available: candidates.len(),
            required: targets.len(),
        });
    }

    let mut best: Option<AssignmentPlan> = None;

    for pass in 0..=config.refinement_passes {
        let mut assignments = fixed.clone();
        if !targets.is_empty() {
            let table = ctx.score_table(&targets, &candidates, &neighbours);
            for (slot, entity) in solve(&targets, &candidates, &table) {
                assignments.insert(slot, entity);
            }
        }
        let plan = ctx.evaluate(&assignments);
        debug!(pass, total = plan.total_score, "assignment pass");

        let converged = assignments == neighbours;
        if best.as_ref().map_or(true, |b| plan.total_score > b.total_score) {
            best = Some(plan);
        }
        if converged {
            break;
        }
        neighbours = assignments;
    }

    let plan = best.ok_or_else(|| FormationError::validation("no assignment pass ran"))?;
    info!(slots = plan.assignments.len(), total = plan.total_score, "auto-assign complete");
    Ok(plan)
}

struct Scoring<'a> {
    formation: &'a Formation,
    roster: &'a Roster,
    config: &'a AssignmentConfig,
    chemistry: &'a ChemistryWeights,
}

impl Scoring<'_> {
    /// Mean chemistry of `entity` playing `slot` with the occupants of its adjacent slots.
    fn neighbour_chemistry(&self, slot: &Slot, entity: &Entity, occupants: &BTreeMap<SlotId, EntityId>) -> f32 {
        let me = ChemistryInput::placed(entity, slot.role, slot.position);
        let mut total = 0.0;
        let mut count = 0usize;
        for adj_id in self.formation.adjacent_slots(slot.id, self.config.adjacency_radius) {
            let Some(other) = occupants
                .get(&adj_id)
                .filter(|o| **o != entity.id)
                .and_then(|o| self.roster.get(*o))
            else {
                continue;
            };
            let Some(adj) = self.formation.slot(adj_id) else {
                continue;
            };
            let them = ChemistryInput::placed(other, adj.role, adj.position);
            total += compute_chemistry(me, them, self.chemistry).score;
            count += 1;
        }
        if count == 0 {
            0.0
        } else {
            total / count as f32
        }
    }

    fn slot_score(&self, slot: &Slot, entity: &Entity, occupants: &BTreeMap<SlotId, EntityId>) -> SlotScore {
        let fit = role_fit(entity, slot.role, self.config);
        let chem = self.neighbour_chemistry(slot, entity, occupants);
        SlotScore {
            slot: slot.id,
            entity: entity.id,
            role_fit: fit,
            chemistry: chem,
            score: self.config.fit_weight * fit / 100.0 + self.config.chemistry_weight * chem / 100.0,
        }
    }

    /// `table[slot_idx][entity_idx]`
    fn score_table(
        &self,
        targets: &[&Slot],
        candidates: &[&Entity],
        occupants: &BTreeMap<SlotId, EntityId>,
    ) -> Vec<Vec<f32>> {
        targets
            .iter()
            .map(|slot| candidates.iter().map(|e| self.slot_score(slot, e, occupants).score).collect())
            .collect()
    }

    fn evaluate(&self, assignments: &BTreeMap<SlotId, EntityId>) -> AssignmentPlan {
        let slot_scores: Vec<SlotScore> = assignments
            .iter()
            .filter_map(|(slot_id, entity_id)| {
                let slot = self.formation.slot(*slot_id)?;
                let entity = self.roster.get(*entity_id)?;
                Some(self.slot_score(slot, entity, assignments))
            })
            .collect();
        AssignmentPlan {
            assignments: assignments.clone(),
            total_score: slot_scores.iter().map(|s| s.score).sum(),
            slot_scores,
        }
    }

    /// Slots left empty by the best matching of a pool that is too small.
    fn unfillable(
        &self,
        targets: &[&Slot],
        candidates: &[&Entity],
        occupants: &BTreeMap<SlotId, EntityId>,
    ) -> Vec<SlotId> {
        if candidates.is_empty() {
            return targets.iter().map(|s| s.id).collect();
        }
        let table = self.score_table(targets, candidates, occupants);
        // Rows must not outnumber columns: entities × slots here.
        let weights = Matrix::from_fn(candidates.len(), targets.len(), |(e, s)| scaled(table[s][e]));
        let (_, slot_of_entity) = kuhn_munkres(&weights);
        let filled: BTreeSet<usize> = slot_of_entity.into_iter().collect();
        targets
            .iter()
            .enumerate()
            .filter(|(idx, _)| !filled.contains(idx))
            .map(|(_, s)| s.id)
            .collect()
    }
}

/// Maximum-weight matching, slots (rows) × candidates (columns).
fn solve(targets: &[&Slot], candidates: &[&Entity], table: &[Vec<f32>]) -> Vec<(SlotId, EntityId)> {
    let n = candidates.len() as i64;
    // Sum of tie terms over all rows stays below one scaled unit.
    let tie_span = n * targets.len() as i64 + 1;
    let weights = Matrix::from_fn(targets.len(), candidates.len(), |(s, e)| {
        scaled(table[s][e]) * tie_span + (n - e as i64)
    });
    let (_, entity_of_slot) = kuhn_munkres(&weights);
    entity_of_slot
        .into_iter()
        .enumerate()
        .map(|(s, e)| (targets[s].id, candidates[e].id))
        .collect()
}

#[inline]
fn scaled(score: f32) -> i64 {
    (score * SCORE_SCALE).round() as i64
}
