//! Spatial Positioning
//!
//! Collision-aware placement of entities on the pitch.
//!
//! ## Grid
//! Uniform spatial hash with cell edge = 2 × collision radius. Any entity closer
//! than the radius to a point lies in that point's 3×3 cell neighbourhood, so a
//! collision query touches at most nine cells regardless of entity count.
//!
//! ## Move resolution
//! 1. Bounds check (out of bounds → `Validation`)
//! 2. `Snap`: nearest free anchor, ties broken by role group then slot id
//! 3. Relaxation: push away from every collider along the separating vector,
//!    at most `relaxation_passes` times
//! 4. Still colliding → `CollisionUnresolved` with the nearest clear point as a
//!    suggestion. The entity is never auto-placed there.

mod engine;
mod grid;


pub use engine::{snap_slot, MoveMode, MoveOutcome, MoveRequest, PositioningEngine, Resolution};
pub use grid::SpatialGrid;
