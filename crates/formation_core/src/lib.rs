//! # formation_core - Tactical Formation Editing Engine
//!
//! Place players on a normalised pitch, fill role slots, score pairwise
//! chemistry, search for better layouts, and keep several editors in sync.
//!
//! ## Features
//! - Collision-aware moves over a spatial hash (snap / free modes)
//! - Optimal role assignment (Kuhn-Munkres) and seeded local search
//! - Incremental chemistry graph (only the edited entity's edges are rebuilt)
//! - Linear undo/redo with bounded depth
//! - Revision-ordered deltas and TTL slot locks for collaborative sessions
//! - Compressed, checksummed snapshots and a JSON API
//!
//! ```rust
//! use formation_core::{EditorConfig, Entity, EntityId, Formation, FormationEditor, FormationTemplate, Roster};
//! use formation_core::{MoveRequest, ParticipantId, Position};
//!
//! let formation = Formation::from_template("Demo", FormationTemplate::F442);
//! let entities: Vec<Entity> = formation
//!     .slots
//!     .iter()
//!     .enumerate()
//!     .map(|(i, s)| Entity::new(i as u32 + 1, format!("P{}", i + 1), s.role))
//!     .collect();
//! let mut editor = FormationEditor::new(formation, Roster::new(entities).unwrap(), EditorConfig::test()).unwrap();
//!
//! let me = ParticipantId::new("coach");
//! editor.auto_assign(&Default::default(), None, &me).unwrap();
//! editor.propose_move(&MoveRequest::free(EntityId(1), Position::new(50.0, 8.0)), &me).unwrap();
//! assert_eq!(editor.revision(), 2);
//! ```

// Search and scoring helpers take many tuning inputs
#![allow(clippy::too_many_arguments)]
#![allow(clippy::field_reassign_with_default)]

pub mod api;
pub mod chemistry;
pub mod collab;
pub mod collaborators;
pub mod config;
pub mod editor;
pub mod error;
pub mod history;
pub mod model;
pub mod optimizer;
pub mod shared;
pub mod spatial;
pub mod store;

#[cfg(test)]
mod editor_tests;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use chemistry::{compute_chemistry, ChemistryEdge, ChemistryGraph};
pub use collab::{CollaborationSession, Delta, DeltaOp, Notification, SessionHub, SessionMessage};
pub use collaborators::{DeltaBroadcaster, Notifier, RosterProvider, SnapshotStore};
pub use config::EditorConfig;
pub use editor::{EditCommand, EditOutcome, FormationEditor};
pub use error::{FormationError, Result};
pub use history::HistoryManager;
pub use model::{
    Entity, EntityId, Formation, FormationId, FormationRecord, FormationTemplate, ParticipantId,
    Position, Role, Roster, SlotId,
};
pub use optimizer::{
    analyze_formation, auto_assign, optimize_formation, AssignOptions, CancelToken, OptimizationResult,
    TacticalAnalysis,
};
pub use shared::{FormationSnapshot, SharedFormation};
pub use spatial::{MoveMode, MoveRequest, PositioningEngine};
pub use store::FileSnapshotStore;
