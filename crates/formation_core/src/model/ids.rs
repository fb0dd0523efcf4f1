use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Roster identity of an entity (player).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Slot identity, stable for the lifetime of a formation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct SlotId(pub u32);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct FormationId(pub Uuid);

impl FormationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FormationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FormationId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FormationId {
    type Err = crate::error::FormationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(FormationId)
            .map_err(|e| crate::error::FormationError::Validation(format!("invalid formation id '{}': {}", s, e)))
    }
}

/// Editor identity as supplied by the (external) auth layer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Author used for entries the editor records on its own behalf.
    pub fn system() -> Self {
        Self("system".to_string())
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unordered pair of entities. Always stored low id first so `(a, b)` and `(b, a)`
/// produce the same key.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub struct EntityPair {
    low: EntityId,
    high: EntityId,
}

impl EntityPair {
    pub fn new(a: EntityId, b: EntityId) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    pub fn low(&self) -> EntityId {
        self.low
    }

    pub fn high(&self) -> EntityId {
        self.high
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.low == id || self.high == id
    }

    /// The endpoint that is not `id`.
    pub fn other(&self, id: EntityId) -> Option<EntityId> {
        if self.low == id {
            Some(self.high)
        } else if self.high == id {
            Some(self.low)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_pair_is_unordered() {
        let ab = EntityPair::new(EntityId(7), EntityId(3));
        let ba = EntityPair::new(EntityId(3), EntityId(7));
        assert_eq!(ab, ba);
        assert_eq!(ab.low(), EntityId(3));
        assert_eq!(ab.other(EntityId(3)), Some(EntityId(7)));
        assert_eq!(ab.other(EntityId(9)), None);
    }

    #[test]
    fn test_formation_id_parse() {
        let id = FormationId::new();
        assert_eq!(id.to_string().parse::<FormationId>().unwrap(), id);
        assert!("not-a-uuid".parse::<FormationId>().is_err());
    }
}
