use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::model::{EntityId, FormationId, LayoutPayload, ParticipantId, Position, SlotId};

/// Operation carried by a delta. Serialised as `"op": "<kind>", "payload": {...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "op", content = "payload", rename_all = "kebab-case")]
pub enum DeltaOp {
    /// Entity now stands at `position` (in `slot`, or free when `None`)
    Move {
        entity: EntityId,
        position: Position,
        #[serde(default)]
        slot: Option<SlotId>,
    },
    Assign {
        slot: SlotId,
        entity: EntityId,
    },
    Unassign {
        slot: SlotId,
    },
    /// Whole layout replacement (optimiser, auto-assign, undo, redo)
    OptimizeCommit(LayoutPayload),
}

impl DeltaOp {
    pub fn kind(&self) -> &'static str {
        match self {
            DeltaOp::Move { .. } => "move",
            DeltaOp::Assign { .. } => "assign",
            DeltaOp::Unassign { .. } => "unassign",
            DeltaOp::OptimizeCommit(_) => "optimize-commit",
        }
    }
}

/// `{ formationId, revision, author, op, payload }`
///
/// `revision` is the formation revision *after* applying the delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Delta {
    pub formation_id: FormationId,
    pub revision: u64,
    pub author: ParticipantId,
    #[serde(flatten)]
    pub op: DeltaOp,
}

impl Delta {
    pub fn new(formation_id: FormationId, revision: u64, author: ParticipantId, op: DeltaOp) -> Self {
        Self { formation_id, revision, author, op }
    }
}
