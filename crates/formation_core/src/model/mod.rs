//! Formation data model
//!
//! Entities (players), role-based slots and the formation that owns every piece of
//! editable positional state. Coordinates are normalised to `[0,100]×[0,100]`:
//! - X: 0 = left touchline, 100 = right touchline
//! - Y: 0 = own goal line, 100 = opponent goal line

pub mod entity;
pub mod formation;
pub mod geometry;
pub mod ids;
pub mod role;
pub mod roster;
pub mod template;

pub use entity::{Availability, Entity, EntityAttributes};
pub use formation::{AssignChange, Formation, FormationRecord, LayoutPayload, Slot, SlotRecord};
pub use geometry::{FieldBounds, FieldThird, Position};
pub use ids::{EntityId, EntityPair, FormationId, ParticipantId, SlotId};
pub use role::{Role, RoleGroup};
pub use roster::Roster;
pub use template::FormationTemplate;
