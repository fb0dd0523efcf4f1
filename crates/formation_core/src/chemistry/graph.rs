use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

use super::scorer::{compute_chemistry, ChemistryEdge, ChemistryInput};
use crate::config::ChemistryWeights;
use crate::model::{EntityId, EntityPair, Formation, Roster, SlotId};

/// Chemistry edges between every pair of placed entities.
///
/// Entities never reference each other; the only link is the edge map keyed by
/// [`EntityPair`], with `incidence` listing each entity's partners.
#[derive(Debug, Clone, Default)]
pub struct ChemistryGraph {
    weights: ChemistryWeights,
    edges: BTreeMap<EntityPair, ChemistryEdge>,
    incidence: BTreeMap<EntityId, BTreeSet<EntityId>>,
}

impl ChemistryGraph {
    pub fn new(weights: ChemistryWeights) -> Self {
        Self { weights, edges: BTreeMap::new(), incidence: BTreeMap::new() }
    }

    /// Full O(n²) build. Used on load and after whole-layout restores.
    pub fn build(weights: ChemistryWeights, formation: &Formation, roster: &Roster) -> Self {
        let mut graph = Self::new(weights);
        graph.rebuild(formation, roster);
        graph
    }

    pub fn weights(&self) -> &ChemistryWeights {
        &self.weights
    }

    pub fn rebuild(&mut self, formation: &Formation, roster: &Roster) {
        self.edges.clear();
        self.incidence.clear();
        let inputs: Vec<ChemistryInput<'_>> = formation
            .placed_entities()
            .into_iter()
            .filter_map(|(e, _)| roster.get(e))
            .map(|e| ChemistryInput::in_formation(e, formation))
            .collect();
        for (i, a) in inputs.iter().enumerate() {
            for b in &inputs[i + 1..] {
                let edge = compute_chemistry(*a, *b, &self.weights);
                self.insert(edge);
            }
        }
        trace!(edges = self.edges.len(), "chemistry graph rebuilt");
    }

    /// Recompute the edges of `entity` against every other placed entity: O(k).
    ///
    /// An entity that is no longer placed is detached instead. Returns the number
    /// of edges written.
    pub fn recompute_entity(&mut self, formation: &Formation, roster: &Roster, entity: EntityId) -> usize {
        let Some(record) = roster.get(entity).filter(|_| formation.is_placed(entity)) else {
            self.detach(entity);
            return 0;
        };
        let me = ChemistryInput::in_formation(record, formation);

        let mut partners = BTreeSet::new();
        for (other, _) in formation.placed_entities() {
            if other == entity {
                continue;
            }
            let Some(other_record) = roster.get(other) else {
                continue;
            };
            let edge = compute_chemistry(
                me,
                ChemistryInput::in_formation(other_record, formation),
                &self.weights,
            );
            self.insert(edge);
            partners.insert(other);
        }

        // Partners that left the pitch since the last update
        let stale: Vec<EntityId> = self
            .incidence
            .get(&entity)
            .map(|set| set.difference(&partners).copied().collect())
            .unwrap_or_default();
        for other in stale {
            self.remove_edge(EntityPair::new(entity, other));
        }
        partners.len()
    }

    /// Recompute only the edges touching the entity now in `slot`.
    pub fn recompute_affected(&mut self, formation: &Formation, roster: &Roster, slot: SlotId) -> usize {
        match formation.slot(slot).and_then(|s| s.entity) {
            Some(entity) => self.recompute_entity(formation, roster, entity),
            None => 0,
        }
    }

    /// Drop every edge of `entity`.
    pub fn detach(&mut self, entity: EntityId) {
        if let Some(partners) = self.incidence.remove(&entity) {
            for other in partners {
                self.edges.remove(&EntityPair::new(entity, other));
                if let Some(set) = self.incidence.get_mut(&other) {
                    set.remove(&entity);
                    if set.is_empty() {
                        self.incidence.remove(&other);
                    }
                }
            }
        }
    }

    pub fn edge(&self, a: EntityId, b: EntityId) -> Option<&ChemistryEdge> {
        self.edges.get(&EntityPair::new(a, b))
    }

    pub fn edges(&self) -> impl Iterator<Item = &ChemistryEdge> {
        self.edges.values()
    }

    pub fn edges_of(&self, entity: EntityId) -> Vec<&ChemistryEdge> {
        self.incidence
            .get(&entity)
            .map(|partners| partners.iter().filter_map(|o| self.edge(entity, *o)).collect())
            .unwrap_or_default()
    }

    /// Mean edge score (0 with fewer than two placed entities).
    pub fn average(&self) -> f32 {
        if self.edges.is_empty() {
            return 0.0;
        }
        self.edges.values().map(|e| e.score).sum::<f32>() / self.edges.len() as f32
    }

    /// Mean score of `entity`'s edges.
    pub fn average_of(&self, entity: EntityId) -> Option<f32> {
        let edges = self.edges_of(entity);
        (!edges.is_empty()).then(|| edges.iter().map(|e| e.score).sum::<f32>() / edges.len() as f32)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    fn insert(&mut self, edge: ChemistryEdge) {
        let pair = edge.pair;
        self.incidence.entry(pair.low()).or_default().insert(pair.high());
        self.incidence.entry(pair.high()).or_default().insert(pair.low());
        self.edges.insert(pair, edge);
    }

    fn remove_edge(&mut self, pair: EntityPair) {
        self.edges.remove(&pair);
        for (a, b) in [(pair.low(), pair.high()), (pair.high(), pair.low())] {
            if let Some(set) = self.incidence.get_mut(&a) {
                set.remove(&b);
                if set.is_empty() {
                    self.incidence.remove(&a);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Entity, FormationTemplate, Position, Role};

    fn setup() -> (Formation, Roster) {
        let mut f = Formation::from_template("Chem", FormationTemplate::F433);
        let entities: Vec<Entity> = f
            .slots
            .iter()
            .enumerate()
            .map(|(i, s)| {
                Entity::new(i as u32 + 1, format!("P{}", i + 1), s.role)
                    .with_club(if i % 2 == 0 { "North" } else { "South" }, (i * 5) as u16)
                    .with_age(20 + i as u8)
            })
            .collect();
        for (i, e) in entities.iter().enumerate() {
            f.assign(SlotId(i as u32), e.id).unwrap();
        }
        (f, Roster::new(entities).unwrap())
    }

    #[test]
    fn test_build_covers_every_pair() {
        let (f, roster) = setup();
        let graph = ChemistryGraph::build(ChemistryWeights::default(), &f, &roster);
        assert_eq!(graph.len(), 11 * 10 / 2);
        assert_eq!(graph.edges_of(EntityId(4)).len(), 10);
        assert!(graph.average() > 0.0);
    }

    #[test]
    fn test_incremental_update_matches_rebuild_and_leaves_others_untouched() {
        let (mut f, roster) = setup();
        let mut graph = ChemistryGraph::build(ChemistryWeights::default(), &f, &roster);
        let untouched = *graph.edge(EntityId(2), EntityId(3)).unwrap();

        f.set_entity_position(EntityId(6), Position::new(50.0, 60.0));
        let written = graph.recompute_affected(&f, &roster, SlotId(5));
        assert_eq!(written, 10);

        let full = ChemistryGraph::build(ChemistryWeights::default(), &f, &roster);
        for edge in full.edges() {
            assert_eq!(graph.edge(edge.pair.low(), edge.pair.high()), Some(edge));
        }
        assert_eq!(*graph.edge(EntityId(2), EntityId(3)).unwrap(), untouched);
    }

    #[test]
    fn test_unassigned_entity_is_detached() {
        let (mut f, roster) = setup();
        let mut graph = ChemistryGraph::build(ChemistryWeights::default(), &f, &roster);
        f.unassign(SlotId(10)).unwrap();
        graph.recompute_entity(&f, &roster, EntityId(11));
        assert!(graph.edges_of(EntityId(11)).is_empty());
        assert_eq!(graph.len(), 10 * 9 / 2);
        assert!(graph.edge(EntityId(1), EntityId(11)).is_none());
    }

    #[test]
    fn test_free_placed_entity_takes_part() {
        let (mut f, mut roster) = setup();
        roster.upsert(Entity::new(12, "Sub", Role::CM)).unwrap();
        let mut graph = ChemistryGraph::build(ChemistryWeights::default(), &f, &roster);
        f.set_entity_position(EntityId(12), Position::new(30.0, 60.0));
        assert_eq!(graph.recompute_entity(&f, &roster, EntityId(12)), 11);
        assert_eq!(graph.len(), 12 * 11 / 2);
    }
}
