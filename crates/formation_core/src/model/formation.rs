use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::geometry::{FieldBounds, Position};
use super::ids::{EntityId, FormationId, SlotId};
use super::role::Role;
use super::template::FormationTemplate;
use crate::error::{FormationError, Result};

/// A named position in the formation awaiting (or holding) an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub id: SlotId,
    pub role: Role,
    /// Template anchor; target of snap moves
    pub anchor: Position,
    /// Current position of the slot (and of its entity, if any)
    pub position: Position,
    pub entity: Option<EntityId>,
    /// Allowed sub-region for the slot's entity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint: Option<FieldBounds>,
}

impl Slot {
    pub fn new(id: SlotId, role: Role, anchor: Position) -> Self {
        Self { id, role, anchor, position: anchor, entity: None, constraint: None }
    }

    pub fn with_constraint(mut self, region: FieldBounds) -> Self {
        self.constraint = Some(region);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entity.is_none()
    }
}

/// Side effects of an assignment on other slots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignChange {
    /// Entity that held the target slot before and is now unplaced
    pub displaced: Option<EntityId>,
    /// Slot the assigned entity was taken from
    pub vacated: Option<SlotId>,
    /// The assigned entity was free-placed before
    pub was_free: bool,
}

/// Authoritative formation state.
///
/// Invariants:
/// - `revision` strictly increases on every accepted mutation
/// - a slot holds at most one entity, an entity is in at most one slot
/// - an entity is never both slot-bound and free-placed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Formation {
    pub id: FormationId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<FormationTemplate>,
    pub slots: Vec<Slot>,
    /// Entities placed freely on the pitch rather than in a slot
    #[serde(default)]
    pub placements: BTreeMap<EntityId, Position>,
    pub revision: u64,
    pub updated_at: DateTime<Utc>,
}

impl Formation {
    /// Blank formation with no slots.
    pub fn blank(name: impl Into<String>) -> Self {
        Self {
            id: FormationId::new(),
            name: name.into(),
            template: None,
            slots: Vec::new(),
            placements: BTreeMap::new(),
            revision: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn from_template(name: impl Into<String>, template: FormationTemplate) -> Self {
        let mut formation = Self::blank(name);
        formation.template = Some(template);
        formation.slots = template.slots();
        formation
    }

    /// Build from explicit slots, validating ids and positions.
    pub fn with_slots(name: impl Into<String>, slots: Vec<Slot>) -> Result<Self> {
        let mut formation = Self::blank(name);
        formation.slots = slots;
        formation.validate(&FieldBounds::standard())?;
        Ok(formation)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn slot(&self, id: SlotId) -> Option<&Slot> {
        self.slots.iter().find(|s| s.id == id)
    }

    pub fn slot_mut(&mut self, id: SlotId) -> Option<&mut Slot> {
        self.slots.iter_mut().find(|s| s.id == id)
    }

    fn require_slot_mut(&mut self, id: SlotId) -> Result<&mut Slot> {
        self.slot_mut(id).ok_or_else(|| FormationError::NotFound(format!("slot {}", id)))
    }

    pub fn slot_of(&self, entity: EntityId) -> Option<&Slot> {
        self.slots.iter().find(|s| s.entity == Some(entity))
    }

    pub fn is_placed(&self, entity: EntityId) -> bool {
        self.slot_of(entity).is_some() || self.placements.contains_key(&entity)
    }

    /// Current position of an entity, slot-bound or free.
    pub fn position_of(&self, entity: EntityId) -> Option<Position> {
        self.slot_of(entity).map(|s| s.position).or_else(|| self.placements.get(&entity).copied())
    }

    /// Every placed entity and its position, ordered by entity id.
    pub fn placed_entities(&self) -> Vec<(EntityId, Position)> {
        let mut placed: Vec<(EntityId, Position)> = self
            .slots
            .iter()
            .filter_map(|s| s.entity.map(|e| (e, s.position)))
            .chain(self.placements.iter().map(|(e, p)| (*e, *p)))
            .collect();
        placed.sort_by_key(|(e, _)| *e);
        placed
    }

    /// Entities bound to slots, in slot order.
    pub fn assigned_entities(&self) -> Vec<EntityId> {
        self.slots.iter().filter_map(|s| s.entity).collect()
    }

    pub fn empty_slots(&self) -> Vec<SlotId> {
        self.slots.iter().filter(|s| s.is_empty()).map(|s| s.id).collect()
    }

    /// Slots whose anchors lie within `radius` of `slot`'s anchor (excluding itself).
    pub fn adjacent_slots(&self, slot: SlotId, radius: f32) -> Vec<SlotId> {
        let Some(origin) = self.slot(slot) else {
            return Vec::new();
        };
        self.slots
            .iter()
            .filter(|s| s.id != slot && s.anchor.distance(&origin.anchor) <= radius)
            .map(|s| s.id)
            .collect()
    }

    /// Compare editable state, ignoring revision and timestamp metadata.
    pub fn layout_eq(&self, other: &Formation) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.slots == other.slots
            && self.placements == other.placements
    }

    // ------------------------------------------------------------------
    // Mutations (callers bump the revision via `touch`)
    // ------------------------------------------------------------------

    /// Put `entity` into `slot`, vacating wherever it was before.
    pub fn assign(&mut self, slot: SlotId, entity: EntityId) -> Result<AssignChange> {
        if self.slot(slot).is_none() {
            return Err(FormationError::NotFound(format!("slot {}", slot)));
        }
        let mut change = AssignChange::default();
        if let Some(prev) = self.slots.iter_mut().find(|s| s.entity == Some(entity)) {
            if prev.id == slot {
                return Ok(change);
            }
            prev.entity = None;
            change.vacated = Some(prev.id);
        }
        change.was_free = self.placements.remove(&entity).is_some();
        let target = self.require_slot_mut(slot)?;
        change.displaced = target.entity.replace(entity);
        Ok(change)
    }

    pub fn unassign(&mut self, slot: SlotId) -> Result<Option<EntityId>> {
        Ok(self.require_slot_mut(slot)?.entity.take())
    }

    /// Move a slot-bound entity's slot, or the entity's free placement.
    /// Returns the slot when the entity is slot-bound.
    pub fn set_entity_position(&mut self, entity: EntityId, pos: Position) -> Option<SlotId> {
        if let Some(slot) = self.slots.iter_mut().find(|s| s.entity == Some(entity)) {
            slot.position = pos;
            return Some(slot.id);
        }
        self.placements.insert(entity, pos);
        None
    }

    pub fn set_slot_position(&mut self, slot: SlotId, pos: Position) -> Result<()> {
        self.require_slot_mut(slot)?.position = pos;
        Ok(())
    }

    pub fn remove_placement(&mut self, entity: EntityId) -> Option<Position> {
        self.placements.remove(&entity)
    }

    /// Record an accepted mutation.
    pub fn touch(&mut self) -> u64 {
        self.revision += 1;
        self.updated_at = Utc::now();
        self.revision
    }

    /// Adopt a revision assigned elsewhere (remote delta). Must move forward.
    pub fn advance_to(&mut self, revision: u64) -> Result<()> {
        if revision <= self.revision {
            return Err(FormationError::ConcurrencyConflict {
                expected: self.revision + 1,
                received: revision,
                current: self.revision,
            });
        }
        self.revision = revision;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Check structural invariants.
    pub fn validate(&self, bounds: &FieldBounds) -> Result<()> {
        let mut slot_ids = BTreeSet::new();
        let mut seen = BTreeSet::new();
        for slot in &self.slots {
            if !slot_ids.insert(slot.id) {
                return Err(FormationError::validation(format!("duplicate slot id {}", slot.id)));
            }
            bounds.validate_position(slot.position)?;
            bounds.validate_position(slot.anchor)?;
            if let Some(entity) = slot.entity {
                if !seen.insert(entity) {
                    return Err(FormationError::validation(format!(
                        "entity {} assigned to more than one slot",
                        entity
                    )));
                }
            }
        }
        for (entity, pos) in &self.placements {
            if seen.contains(entity) {
                return Err(FormationError::validation(format!(
                    "entity {} is both slot-bound and free-placed",
                    entity
                )));
            }
            bounds.validate_position(*pos)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Records
    // ------------------------------------------------------------------

    pub fn to_record(&self) -> FormationRecord {
        FormationRecord {
            id: self.id,
            name: self.name.clone(),
            revision: self.revision,
            updated_at: self.updated_at,
            slots: self.slots.iter().map(SlotRecord::from).collect(),
        }
    }

    pub fn layout(&self) -> LayoutPayload {
        LayoutPayload {
            slots: self.slots.iter().map(SlotRecord::from).collect(),
            placements: self.placements.clone(),
        }
    }

    /// Replace slot positions/occupants and free placements with `layout`.
    /// All-or-nothing: the formation is untouched when validation fails.
    pub fn apply_layout(&mut self, layout: &LayoutPayload, bounds: &FieldBounds) -> Result<()> {
        let mut next = self.clone();
        for record in &layout.slots {
            let slot = next
                .slot_mut(record.id)
                .ok_or_else(|| FormationError::NotFound(format!("slot {}", record.id)))?;
            slot.position = record.position;
            slot.entity = record.entity_id;
        }
        next.placements = layout.placements.clone();
        next.validate(bounds)?;
        self.slots = next.slots;
        self.placements = next.placements;
        Ok(())
    }
}

/// Serialized slot: `{ id, role, position: {x, y}, entityId }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SlotRecord {
    pub id: SlotId,
    pub role: Role,
    pub position: Position,
    pub entity_id: Option<EntityId>,
}

impl From<&Slot> for SlotRecord {
    fn from(slot: &Slot) -> Self {
        Self { id: slot.id, role: slot.role, position: slot.position, entity_id: slot.entity }
    }
}

/// Serialized formation: `{ id, name, revision, updatedAt, slots }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FormationRecord {
    pub id: FormationId,
    pub name: String,
    pub revision: u64,
    pub updated_at: DateTime<Utc>,
    pub slots: Vec<SlotRecord>,
}

/// Full editable layout carried by `optimize-commit` deltas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LayoutPayload {
    pub slots: Vec<SlotRecord>,
    #[serde(default)]
    pub placements: BTreeMap<EntityId, Position>,
}
