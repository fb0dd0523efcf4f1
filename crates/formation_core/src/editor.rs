//! Formation editing session
//!
//! `FormationEditor` is the explicit session object every core operation goes
//! through. It owns the authoritative formation plus the derived state kept in
//! step with it (spatial index, chemistry graph, undo history). Every accepted
//! mutation bumps the revision, refreshes chemistry for the touched entities,
//! commits a history snapshot, hands the snapshot to the store and returns the
//! delta to broadcast.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::chemistry::{compute_chemistry, ChemistryEdge, ChemistryGraph, ChemistryInput};
use crate::collab::{Delta, DeltaOp};
use crate::collaborators::{RosterProvider, SnapshotStore};
use crate::config::EditorConfig;
use crate::error::{FormationError, Result};
use crate::history::HistoryManager;
use crate::model::{
    AssignChange, Entity, EntityId, Formation, FormationId, ParticipantId, Position, Roster,
    SlotId,
};
use crate::optimizer::{
    analyze_formation, auto_assign, optimize_formation, AssignOptions, AssignmentPlan,
    CancelToken, OptimizationResult, TacticalAnalysis,
};
use crate::spatial::{snap_slot, MoveMode, MoveOutcome, MoveRequest, PositioningEngine};

/// Result of an accepted mutation plus the delta describing it.
#[derive(Debug, Clone, PartialEq)]
pub struct EditOutcome<T> {
    pub result: T,
    pub delta: Delta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AutoAssignOutcome {
    pub plan: AssignmentPlan,
    /// Entities that held a slot before and no longer do
    pub displaced: Vec<EntityId>,
    /// Free placements removed because an assigned slot now covers them
    pub benched: Vec<EntityId>,
}

#[derive(Debug, Clone)]
pub struct OptimizeOutcome {
    pub result: OptimizationResult,
    /// `None` when the search found nothing better
    pub delta: Option<Delta>,
}

/// Edit requests a collaborator can send through a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EditCommand {
    Move(MoveRequest),
    Assign { slot: SlotId, entity: EntityId },
    Unassign { slot: SlotId },
    AutoAssign {
        #[serde(default)]
        options: AssignOptions,
    },
    Undo,
    Redo,
}

impl EditCommand {
    /// Slots the command writes to, or `None` for whole-formation edits.
    pub fn target_slots(&self, formation: &Formation) -> Option<Vec<SlotId>> {
        match self {
            EditCommand::Move(request) => {
                let mut slots: Vec<SlotId> = formation.slot_of(request.entity).map(|s| s.id).into_iter().collect();
                if request.mode == MoveMode::Snap {
                    if let Some(dest) = snap_slot(formation, request.entity, request.target) {
                        if !slots.contains(&dest) {
                            slots.push(dest);
                        }
                    }
                }
                Some(slots)
            }
            EditCommand::Assign { slot, entity } => {
                let mut slots = vec![*slot];
                if let Some(current) = formation.slot_of(*entity) {
                    if current.id != *slot {
                        slots.push(current.id);
                    }
                }
                Some(slots)
            }
            EditCommand::Unassign { slot } => Some(vec![*slot]),
            EditCommand::AutoAssign { .. } | EditCommand::Undo | EditCommand::Redo => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EditCommand::Move(_) => "move",
            EditCommand::Assign { .. } => "assign",
            EditCommand::Unassign { .. } => "unassign",
            EditCommand::AutoAssign { .. } => "auto-assign",
            EditCommand::Undo => "undo",
            EditCommand::Redo => "redo",
        }
    }
}

pub struct FormationEditor {
    formation: Formation,
    roster: Arc<Roster>,
    config: EditorConfig,
    positioning: PositioningEngine,
    chemistry: ChemistryGraph,
    history: HistoryManager,
    store: Option<Arc<dyn SnapshotStore>>,
}

impl std::fmt::Debug for FormationEditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormationEditor")
            .field("formation", &self.formation.id)
            .field("revision", &self.formation.revision)
            .field("roster", &self.roster.len())
            .field("history", &self.history.len())
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

impl FormationEditor {
    /// Start editing `formation`. Every placed entity must be in `roster`.
    pub fn new(formation: Formation, roster: Roster, config: EditorConfig) -> Result<Self> {
        config.validate()?;
        formation.validate(&config.positioning.bounds)?;
        for (entity, _) in formation.placed_entities() {
            roster.require(entity)?;
        }

        let positioning = PositioningEngine::for_formation(config.positioning.clone(), &formation);
        let chemistry = ChemistryGraph::build(config.chemistry.clone(), &formation, &roster);
        let history =
            HistoryManager::with_baseline(config.history.max_depth, formation.clone(), ParticipantId::system());
        info!(
            formation = %formation.id,
            revision = formation.revision,
            slots = formation.slots.len(),
            roster = roster.len(),
            "formation opened"
        );
        Ok(Self {
            formation,
            roster: Arc::new(roster),
            config,
            positioning,
            chemistry,
            history,
            store: None,
        })
    }

    /// Load eagerly from `store` and keep persisting committed snapshots to it.
    pub fn open(
        id: FormationId,
        store: Arc<dyn SnapshotStore>,
        roster: &dyn RosterProvider,
        config: EditorConfig,
    ) -> Result<Self> {
        let formation = store.load(id)?;
        let roster = roster.load_roster()?;
        Ok(Self::new(formation, roster, config)?.with_store(store))
    }

    pub fn with_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn formation(&self) -> &Formation {
        &self.formation
    }

    pub fn id(&self) -> FormationId {
        self.formation.id
    }

    pub fn revision(&self) -> u64 {
        self.formation.revision
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub(crate) fn roster_arc(&self) -> Arc<Roster> {
        Arc::clone(&self.roster)
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn chemistry(&self) -> &ChemistryGraph {
        &self.chemistry
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn positioning(&self) -> &PositioningEngine {
        &self.positioning
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    pub fn propose_move(&mut self, request: &MoveRequest, author: &ParticipantId) -> Result<EditOutcome<MoveOutcome>> {
        self.roster.require(request.entity)?;
        self.history.begin();
        let outcome = match self.positioning.propose_move(&mut self.formation, request) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.history.abort();
                return Err(e);
            }
        };
        self.chemistry.recompute_entity(&self.formation, &self.roster, request.entity);
        self.record(author, "move");

        let delta = self.delta(
            author,
            DeltaOp::Move { entity: outcome.entity, position: outcome.resolved, slot: outcome.slot },
        );
        Ok(EditOutcome { result: outcome, delta })
    }

    /// Put `entity` into `slot`. The previous occupant (if any) becomes unplaced.
    pub fn assign(&mut self, slot: SlotId, entity: EntityId, author: &ParticipantId) -> Result<EditOutcome<AssignChange>> {
        self.roster.require(entity)?;
        let target = self
            .formation
            .slot(slot)
            .ok_or_else(|| FormationError::NotFound(format!("slot {}", slot)))?;
        let (position, occupant) = (target.position, target.entity);

        let radius = self.config.positioning.collision_radius;
        let blocked = self
            .positioning
            .grid()
            .colliders(position, radius, Some(entity))
            .into_iter()
            .any(|(other, _, _)| Some(other) != occupant);
        if blocked {
            let region = self.positioning.allowed_region(&self.formation, Some(slot))?;
            return Err(FormationError::CollisionUnresolved {
                entity,
                requested: position,
                suggestion: self.positioning.suggest(entity, position, &region),
            });
        }

        self.history.begin();
        let change = match self.formation.assign(slot, entity) {
            Ok(change) => change,
            Err(e) => {
                self.history.abort();
                return Err(e);
            }
        };
        self.positioning.track(entity, position);
        if let Some(displaced) = change.displaced {
            self.positioning.forget(displaced);
            self.chemistry.detach(displaced);
        }
        self.formation.touch();
        self.chemistry.recompute_affected(&self.formation, &self.roster, slot);
        self.record(author, "assign");

        let delta = self.delta(author, DeltaOp::Assign { slot, entity });
        Ok(EditOutcome { result: change, delta })
    }

    /// Empty `slot`. Unassigning an empty slot is a validation error.
    pub fn unassign(&mut self, slot: SlotId, author: &ParticipantId) -> Result<EditOutcome<EntityId>> {
        let entity = self
            .formation
            .slot(slot)
            .ok_or_else(|| FormationError::NotFound(format!("slot {}", slot)))?
            .entity
            .ok_or_else(|| FormationError::validation(format!("slot {} is already empty", slot)))?;

        self.history.begin();
        self.formation.unassign(slot)?;
        self.positioning.forget(entity);
        self.chemistry.detach(entity);
        self.formation.touch();
        self.record(author, "unassign");

        let delta = self.delta(author, DeltaOp::Unassign { slot });
        Ok(EditOutcome { result: entity, delta })
    }

    /// Fill the slots from `pool` (the whole roster when `None`).
    pub fn auto_assign(
        &mut self,
        options: &AssignOptions,
        pool: Option<&[EntityId]>,
        author: &ParticipantId,
    ) -> Result<EditOutcome<AutoAssignOutcome>> {
        let roster_ids;
        let pool: &[EntityId] = match pool {
            Some(pool) => pool,
            None => {
                roster_ids = self.roster.ids();
                &roster_ids
            }
        };
        let plan = auto_assign(
            &self.formation,
            &self.roster,
            pool,
            &self.config.assignment,
            &self.config.chemistry,
            options,
        )?;

        let mut next = self.formation.clone();
        let displaced = plan.apply(&mut next)?;

        // Free placements now standing on an assigned slot leave the pitch
        let radius = self.config.positioning.collision_radius;
        let benched: Vec<EntityId> = next
            .placements
            .iter()
            .filter(|(_, p)| {
                next.slots
                    .iter()
                    .any(|s| s.entity.is_some() && s.position.distance(p) < radius)
            })
            .map(|(e, _)| *e)
            .collect();
        for entity in &benched {
            next.remove_placement(*entity);
        }

        // A filled slot keeps its previous occupant's position; re-seat it from
        // the anchor when that position is covered.
        let mut engine = PositioningEngine::for_formation(self.config.positioning.clone(), &next);
        for (slot, entity) in &plan.assignments {
            let unchanged = self.formation.slot(*slot).and_then(|s| s.entity) == Some(*entity);
            let Some(current) = next.slot(*slot).map(|s| (s.position, s.anchor)) else {
                continue;
            };
            let (position, anchor) = current;
            if unchanged || engine.is_clear(*entity, position) {
                continue;
            }
            let resolution = engine.resolve(&next, &MoveRequest::free(*entity, anchor))?;
            next.set_entity_position(*entity, resolution.position);
            engine.track(*entity, resolution.position);
            debug!(slot = %slot, entity = %entity, "filled slot re-seated");
        }
        next.validate(&self.config.positioning.bounds)?;

        self.history.begin();
        let before = self.formation.clone();
        self.formation = next;
        self.formation.touch();
        self.positioning.sync(&self.formation);
        self.refresh_changed(&before);
        self.record(author, "auto-assign");

        info!(
            formation = %self.formation.id,
            total = plan.total_score,
            displaced = displaced.len(),
            benched = benched.len(),
            "auto-assign committed"
        );
        let delta = self.delta(author, DeltaOp::OptimizeCommit(self.formation.layout()));
        Ok(EditOutcome { result: AutoAssignOutcome { plan, displaced, benched }, delta })
    }

    /// Run the local search on the current state. Read-only; see
    /// [`Self::commit_optimization`].
    pub fn optimize(&self, cancel: &CancelToken) -> Result<OptimizationResult> {
        optimize_formation(&self.formation, &self.roster, &self.config, cancel)
    }

    /// Adopt an optimisation result computed from this editor's state.
    ///
    /// `ConcurrencyConflict` if the formation moved on since the search started.
    /// `Ok(None)` when the result is not an improvement.
    pub fn commit_optimization(
        &mut self,
        result: &OptimizationResult,
        author: &ParticipantId,
    ) -> Result<Option<EditOutcome<f32>>> {
        if result.formation.id != self.formation.id {
            return Err(FormationError::validation("optimization result belongs to another formation"));
        }
        if result.formation.revision != self.formation.revision {
            return Err(FormationError::ConcurrencyConflict {
                expected: self.formation.revision,
                received: result.formation.revision,
                current: self.formation.revision,
            });
        }
        if !result.improved() {
            debug!(formation = %self.formation.id, "optimization found no improvement");
            return Ok(None);
        }

        let before = self.formation.clone();
        self.history.begin();
        if let Err(e) = self.formation.apply_layout(&result.formation.layout(), &self.config.positioning.bounds) {
            self.history.abort();
            return Err(e);
        }
        self.formation.touch();
        self.positioning.sync(&self.formation);
        self.refresh_changed(&before);
        self.record(author, "optimize");

        let delta = self.delta(author, DeltaOp::OptimizeCommit(self.formation.layout()));
        Ok(Some(EditOutcome { result: result.delta, delta }))
    }

    /// Search and commit in one step.
    pub fn optimize_and_commit(&mut self, cancel: &CancelToken, author: &ParticipantId) -> Result<OptimizeOutcome> {
        let result = self.optimize(cancel)?;
        let delta = self.commit_optimization(&result, author)?.map(|o| o.delta);
        Ok(OptimizeOutcome { result, delta })
    }

    /// Step back one history entry. `Ok(None)` when there is nothing to undo.
    pub fn undo(&mut self, author: &ParticipantId) -> Result<Option<EditOutcome<u64>>> {
        let snapshot = match self.history.peek_undo() {
            Some(entry) => entry.snapshot.clone(),
            None => return Ok(None),
        };
        // Cursor moves only once the layout is in place
        let outcome = self.restore(&snapshot, author)?;
        self.history.undo();
        Ok(Some(outcome))
    }

    /// Step forward one history entry. `Ok(None)` when there is nothing to redo.
    pub fn redo(&mut self, author: &ParticipantId) -> Result<Option<EditOutcome<u64>>> {
        let snapshot = match self.history.peek_redo() {
            Some(entry) => entry.snapshot.clone(),
            None => return Ok(None),
        };
        // Cursor moves only once the layout is in place
        let outcome = self.restore(&snapshot, author)?;
        self.history.redo();
        Ok(Some(outcome))
    }

    /// Apply a delta produced by another editor of the same formation.
    ///
    /// Only the next revision is accepted; stale, duplicate and gapped deltas are
    /// `ConcurrencyConflict`s and leave the state untouched.
    pub fn apply_remote_delta(&mut self, delta: &Delta) -> Result<u64> {
        if delta.formation_id != self.formation.id {
            return Err(FormationError::validation(format!(
                "delta for formation {} applied to {}",
                delta.formation_id, self.formation.id
            )));
        }
        let current = self.formation.revision;
        if delta.revision != current + 1 {
            info!(
                author = %delta.author,
                received = delta.revision,
                current,
                "remote delta discarded"
            );
            return Err(FormationError::ConcurrencyConflict {
                expected: current + 1,
                received: delta.revision,
                current,
            });
        }

        let bounds = self.config.positioning.bounds;
        let mut next = self.formation.clone();
        match &delta.op {
            DeltaOp::Move { entity, position, slot } => {
                self.roster.require(*entity)?;
                bounds.validate_position(*position)?;
                if let Some(slot) = slot {
                    next.assign(*slot, *entity)?;
                }
                next.set_entity_position(*entity, *position);
            }
            DeltaOp::Assign { slot, entity } => {
                self.roster.require(*entity)?;
                next.assign(*slot, *entity)?;
            }
            DeltaOp::Unassign { slot } => {
                next.unassign(*slot)?;
            }
            DeltaOp::OptimizeCommit(layout) => {
                for entity in layout.slots.iter().filter_map(|s| s.entity_id).chain(layout.placements.keys().copied()) {
                    self.roster.require(entity)?;
                }
                next.apply_layout(layout, &bounds)?;
            }
        }
        next.validate(&bounds)?;
        next.advance_to(delta.revision)?;

        let before = std::mem::replace(&mut self.formation, next);
        self.history.begin();
        self.positioning.sync(&self.formation);
        self.refresh_changed(&before);
        self.record(&delta.author, delta.op.kind());
        debug!(author = %delta.author, op = delta.op.kind(), revision = delta.revision, "remote delta applied");
        Ok(delta.revision)
    }

    /// Refresh an entity's attribute record. Only the edges touching it are recomputed.
    pub fn update_entity(&mut self, entity: Entity) -> Result<usize> {
        let id = entity.id;
        Arc::make_mut(&mut self.roster).upsert(entity)?;
        Ok(self.chemistry.recompute_entity(&self.formation, &self.roster, id))
    }

    /// Dispatch an [`EditCommand`]. `Ok(None)` when the command changed nothing.
    pub fn execute(&mut self, command: &EditCommand, author: &ParticipantId) -> Result<Option<Delta>> {
        Ok(match command {
            EditCommand::Move(request) => Some(self.propose_move(request, author)?.delta),
            EditCommand::Assign { slot, entity } => Some(self.assign(*slot, *entity, author)?.delta),
            EditCommand::Unassign { slot } => Some(self.unassign(*slot, author)?.delta),
            EditCommand::AutoAssign { options } => Some(self.auto_assign(options, None, author)?.delta),
            EditCommand::Undo => self.undo(author)?.map(|o| o.delta),
            EditCommand::Redo => self.redo(author)?.map(|o| o.delta),
        })
    }

    // ------------------------------------------------------------------
    // Read-only
    // ------------------------------------------------------------------

    pub fn analyze(&self) -> TacticalAnalysis {
        analyze_formation(&self.formation, &self.chemistry, &self.config.objective)
    }

    /// Chemistry of two roster entities as they currently stand in the formation.
    pub fn chemistry_between(&self, a: EntityId, b: EntityId) -> Result<ChemistryEdge> {
        let ea = self.roster.require(a)?;
        let eb = self.roster.require(b)?;
        Ok(compute_chemistry(
            ChemistryInput::in_formation(ea, &self.formation),
            ChemistryInput::in_formation(eb, &self.formation),
            &self.config.chemistry,
        ))
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn delta(&self, author: &ParticipantId, op: DeltaOp) -> Delta {
        Delta::new(self.formation.id, self.formation.revision, author.clone(), op)
    }

    /// Commit the current state to history and hand it to the store.
    fn record(&mut self, author: &ParticipantId, label: &str) {
        self.history.commit(self.formation.clone(), author.clone(), label);
        self.persist();
    }

    fn persist(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(&self.formation) {
                warn!(formation = %self.formation.id, revision = self.formation.revision, error = %e, "snapshot save failed");
            }
        }
    }

    /// Restore a history snapshot's layout under a fresh revision.
    fn restore(&mut self, snapshot: &Formation, author: &ParticipantId) -> Result<EditOutcome<u64>> {
        self.formation.apply_layout(&snapshot.layout(), &self.config.positioning.bounds)?;
        let revision = self.formation.touch();
        self.positioning.sync(&self.formation);
        self.chemistry.rebuild(&self.formation, &self.roster);
        self.persist();
        debug!(formation = %self.formation.id, revision, "history restored");

        let delta = self.delta(author, DeltaOp::OptimizeCommit(self.formation.layout()));
        Ok(EditOutcome { result: revision, delta })
    }

    /// Recompute chemistry for entities whose placement differs from `before`.
    fn refresh_changed(&mut self, before: &Formation) {
        let old: Vec<(EntityId, Position, Option<SlotId>)> = placement_index(before);
        let new: Vec<(EntityId, Position, Option<SlotId>)> = placement_index(&self.formation);
        let mut changed = BTreeSet::new();
        for entry in old.iter().filter(|e| !new.contains(e)) {
            changed.insert(entry.0);
        }
        for entry in new.iter().filter(|e| !old.contains(e)) {
            changed.insert(entry.0);
        }
        for entity in changed {
            self.chemistry.recompute_entity(&self.formation, &self.roster, entity);
        }
    }
}

fn placement_index(formation: &Formation) -> Vec<(EntityId, Position, Option<SlotId>)> {
    formation
        .placed_entities()
        .into_iter()
        .map(|(e, p)| (e, p, formation.slot_of(e).map(|s| s.id)))
        .collect()
}
