use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::entity::Entity;
use super::ids::EntityId;
use crate::error::{FormationError, Result};

/// Attribute records of every entity the editor may place, keyed by id.
///
/// Loaded eagerly from the roster provider and treated as read-only while
/// editing; `upsert` exists for attribute refreshes pushed by the provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Roster {
    entities: BTreeMap<EntityId, Entity>,
}

impl Roster {
    /// Build from records, rejecting duplicate ids and out-of-range attributes.
    pub fn new(entities: Vec<Entity>) -> Result<Self> {
        let mut roster = Self::default();
        for entity in entities {
            if !entity.attributes.is_valid() {
                return Err(FormationError::validation(format!(
                    "entity {} has attributes outside 0..=100",
                    entity.id
                )));
            }
            let id = entity.id;
            if roster.entities.insert(id, entity).is_some() {
                return Err(FormationError::validation(format!("duplicate entity id {}", id)));
            }
        }
        Ok(roster)
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn require(&self, id: EntityId) -> Result<&Entity> {
        self.get(id).ok_or_else(|| FormationError::NotFound(format!("entity {}", id)))
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entities in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn ids(&self) -> Vec<EntityId> {
        self.entities.keys().copied().collect()
    }

    /// Replace (or add) a record. Returns the previous one.
    pub fn upsert(&mut self, entity: Entity) -> Result<Option<Entity>> {
        if !entity.attributes.is_valid() {
            return Err(FormationError::validation(format!(
                "entity {} has attributes outside 0..=100",
                entity.id
            )));
        }
        Ok(self.entities.insert(entity.id, entity))
    }

    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        self.entities.remove(&id)
    }
}
