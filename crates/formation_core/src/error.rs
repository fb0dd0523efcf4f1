use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{EntityId, ParticipantId, Position, SlotId};

/// Errors surfaced by formation editing operations.
///
/// Optimiser budget exhaustion is not an error: it is reported through
/// [`crate::optimizer::OptimizationStatus`] on a result flagged `partial`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormationError {
    /// Malformed or out-of-bounds input. Never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Relaxation passes were exhausted without finding a collision-free point.
    #[error("Collision unresolved for entity {entity} at ({:.2}, {:.2})", .requested.x, .requested.y)]
    CollisionUnresolved {
        entity: EntityId,
        requested: Position,
        suggestion: Option<Position>,
    },

    #[error("Assignment infeasible: {available} eligible entities for {required} slots, unfilled {unfilled:?}")]
    AssignmentInfeasible {
        unfilled: Vec<SlotId>,
        available: usize,
        required: usize,
    },

    /// A remote delta did not carry the next expected revision.
    #[error("Concurrency conflict: expected revision {expected}, received {received} (current {current})")]
    ConcurrencyConflict {
        expected: u64,
        received: u64,
        current: u64,
    },

    #[error("Slot {slot} is locked by {holder} until {expires_at}")]
    LockUnavailable {
        slot: SlotId,
        holder: ParticipantId,
        expires_at: DateTime<Utc>,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Worker failure inside the engine (e.g. a panicked background search).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FormationError {
    /// Whether the caller can act on the error and retry with different input or fresh state.
    pub fn is_recoverable(&self) -> bool {
        match self {
            FormationError::Validation(_) => false,
            FormationError::CollisionUnresolved { .. } => true,
            FormationError::AssignmentInfeasible { .. } => true,
            FormationError::ConcurrencyConflict { .. } => true,
            FormationError::LockUnavailable { .. } => true,
            FormationError::NotFound(_) => false,
            FormationError::Storage(_) => true,
            FormationError::Serialization(_) => false,
            FormationError::Config(_) => false,
            FormationError::Internal(_) => false,
        }
    }

    /// Stable machine-readable code used by the JSON API.
    pub fn code(&self) -> &'static str {
        match self {
            FormationError::Validation(_) => "VALIDATION_ERROR",
            FormationError::CollisionUnresolved { .. } => "COLLISION_UNRESOLVED",
            FormationError::AssignmentInfeasible { .. } => "ASSIGNMENT_INFEASIBLE",
            FormationError::ConcurrencyConflict { .. } => "CONCURRENCY_CONFLICT",
            FormationError::LockUnavailable { .. } => "LOCK_UNAVAILABLE",
            FormationError::NotFound(_) => "NOT_FOUND",
            FormationError::Storage(_) => "STORAGE_ERROR",
            FormationError::Serialization(_) => "SERIALIZATION_ERROR",
            FormationError::Config(_) => "CONFIG_ERROR",
            FormationError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        FormationError::Validation(msg.into())
    }
}

impl From<serde_json::Error> for FormationError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            FormationError::Validation(err.to_string())
        } else {
            FormationError::Serialization(err.to_string())
        }
    }
}

impl From<serde_yaml::Error> for FormationError {
    fn from(err: serde_yaml::Error) -> Self {
        FormationError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FormationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(FormationError::validation("x").code(), "VALIDATION_ERROR");
        let conflict = FormationError::ConcurrencyConflict { expected: 5, received: 4, current: 5 };
        assert_eq!(conflict.code(), "CONCURRENCY_CONFLICT");
        assert!(conflict.is_recoverable());
        assert!(!FormationError::validation("bad").is_recoverable());
        assert_eq!(FormationError::Internal("worker".into()).code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_json_syntax_error_maps_to_validation() {
        let err: FormationError = serde_json::from_str::<u32>("{not json").unwrap_err().into();
        assert!(matches!(err, FormationError::Validation(_)));
    }
}
