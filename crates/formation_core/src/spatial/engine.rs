use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;
use tracing::{debug, info};

use super::grid::SpatialGrid;
use crate::config::PositioningConfig;
use crate::error::{FormationError, Result};
use crate::model::{EntityId, FieldBounds, Formation, Position, Slot, SlotId};

/// Bearings sampled on each suggestion ring
const SUGGESTION_BEARINGS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MoveMode {
    /// Constrain to the nearest available template anchor
    Snap,
    /// Anywhere in bounds, subject to collision avoidance
    #[default]
    Free,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MoveRequest {
    pub entity: EntityId,
    pub target: Position,
    #[serde(default)]
    pub mode: MoveMode,
    /// Skip collision resolution entirely
    #[serde(default)]
    pub allow_overlap: bool,
}

impl MoveRequest {
    pub fn free(entity: EntityId, target: Position) -> Self {
        Self { entity, target, mode: MoveMode::Free, allow_overlap: false }
    }

    pub fn snap(entity: EntityId, target: Position) -> Self {
        Self { entity, target, mode: MoveMode::Snap, allow_overlap: false }
    }

    pub fn with_overlap(mut self) -> Self {
        self.allow_overlap = true;
        self
    }
}

/// Where a move would land, computed without touching the formation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    pub position: Position,
    /// Slot the entity occupies after the move (`None` = free placement)
    pub slot: Option<SlotId>,
    /// Relaxation passes that moved the point
    pub passes: u8,
}

/// Accepted move, as reported to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MoveOutcome {
    pub entity: EntityId,
    pub requested: Position,
    pub resolved: Position,
    /// `resolved` differs from `requested`
    pub adjusted: bool,
    pub slot: Option<SlotId>,
    /// Previous slot when a snap moved the entity into another slot
    pub reassigned_from: Option<SlotId>,
    pub passes: u8,
    pub revision: u64,
}

/// Collision-aware move resolution over a spatial hash of placed entities.
///
/// The grid mirrors the formation it was synced with; callers that mutate the
/// formation by other means re-sync (or `track` / `forget`) afterwards.
#[derive(Debug, Clone)]
pub struct PositioningEngine {
    config: PositioningConfig,
    grid: SpatialGrid,
}

impl PositioningEngine {
    pub fn new(config: PositioningConfig) -> Self {
        let grid = SpatialGrid::new(config.cell_size());
        Self { config, grid }
    }

    pub fn for_formation(config: PositioningConfig, formation: &Formation) -> Self {
        let mut engine = Self::new(config);
        engine.sync(formation);
        engine
    }

    pub fn config(&self) -> &PositioningConfig {
        &self.config
    }

    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    /// Re-index every placed entity.
    pub fn sync(&mut self, formation: &Formation) {
        self.grid = SpatialGrid::from_formation(formation, self.config.cell_size());
    }

    pub fn track(&mut self, entity: EntityId, pos: Position) {
        self.grid.insert(entity, pos);
    }

    pub fn forget(&mut self, entity: EntityId) {
        self.grid.remove(entity);
    }

    /// No other indexed entity lies within the collision radius of `pos`.
    pub fn is_clear(&self, entity: EntityId, pos: Position) -> bool {
        self.grid.is_clear(pos, self.config.collision_radius, Some(entity))
    }

    /// Resolve a move and, on acceptance, write it into `formation`.
    ///
    /// Rejections leave both the formation and the grid untouched.
    pub fn propose_move(
        &mut self,
        formation: &mut Formation,
        request: &MoveRequest,
    ) -> Result<MoveOutcome> {
        let resolution = match self.resolve(formation, request) {
            Ok(r) => r,
            Err(e) => {
                info!(entity = %request.entity, error = %e, "move rejected");
                return Err(e);
            }
        };

        let previous_slot = formation.slot_of(request.entity).map(|s| s.id);
        let mut reassigned_from = None;
        if resolution.slot != previous_slot {
            if let Some(slot) = resolution.slot {
                formation.assign(slot, request.entity)?;
                reassigned_from = previous_slot;
            }
        }
        formation.set_entity_position(request.entity, resolution.position);
        self.grid.insert(request.entity, resolution.position);
        let revision = formation.touch();

        let outcome = MoveOutcome {
            entity: request.entity,
            requested: request.target,
            resolved: resolution.position,
            adjusted: resolution.position != request.target,
            slot: resolution.slot,
            reassigned_from,
            passes: resolution.passes,
            revision,
        };
        debug!(
            entity = %outcome.entity,
            x = outcome.resolved.x,
            y = outcome.resolved.y,
            passes = outcome.passes,
            revision,
            "move accepted"
        );
        Ok(outcome)
    }

    /// Pure resolution step of [`Self::propose_move`].
    pub fn resolve(&self, formation: &Formation, request: &MoveRequest) -> Result<Resolution> {
        self.config.bounds.validate_position(request.target)?;

        let (target, slot) = match request.mode {
            MoveMode::Free => (request.target, formation.slot_of(request.entity).map(|s| s.id)),
            MoveMode::Snap => {
                let slot = nearest_anchor(formation, request.entity, request.target)
                    .ok_or_else(|| FormationError::validation("no available anchor to snap to"))?;
                (slot.anchor, Some(slot.id))
            }
        };

        let region = self.allowed_region(formation, slot)?;
        if !region.contains(target) {
            return Err(FormationError::validation(format!(
                "({:.2}, {:.2}) is outside the allowed region of slot {}",
                target.x,
                target.y,
                slot.map(|s| s.to_string()).unwrap_or_default()
            )));
        }

        if request.allow_overlap {
            return Ok(Resolution { position: target, slot, passes: 0 });
        }

        match self.relax(request.entity, target, &region) {
            Some((position, passes)) => Ok(Resolution { position, slot, passes }),
            None => Err(FormationError::CollisionUnresolved {
                entity: request.entity,
                requested: request.target,
                suggestion: self.suggest(request.entity, target, &region),
            }),
        }
    }

    /// Pitch bounds intersected with the slot's constraint.
    pub fn allowed_region(&self, formation: &Formation, slot: Option<SlotId>) -> Result<FieldBounds> {
        let constraint = slot.and_then(|id| formation.slot(id)).and_then(|s| s.constraint);
        match constraint {
            Some(c) => self.config.bounds.intersect(&c).ok_or_else(|| {
                FormationError::validation("slot constraint lies outside the pitch")
            }),
            None => Ok(self.config.bounds),
        }
    }

    /// Push `start` away from colliders until clear. `None` when still colliding
    /// after the last pass.
    fn relax(&self, entity: EntityId, start: Position, region: &FieldBounds) -> Option<(Position, u8)> {
        let radius = self.config.collision_radius;
        let target_gap = radius + self.config.separation_margin;
        let mut p = start;

        for pass in 0..self.config.relaxation_passes {
            let colliders = self.grid.colliders(p, radius, Some(entity));
            if colliders.is_empty() {
                return Some((p, pass));
            }
            let (mut push_x, mut push_y) = (0.0f32, 0.0f32);
            for (_, other, dist) in &colliders {
                let (dir_x, dir_y) = if *dist > f32::EPSILON {
                    ((p.x - other.x) / dist, (p.y - other.y) / dist)
                } else {
                    escape_direction(*other, region)
                };
                let overlap = target_gap - dist;
                push_x += dir_x * overlap;
                push_y += dir_y * overlap;
            }
            p = region.clamp(p.offset(push_x, push_y));
        }

        self.grid
            .is_clear(p, radius, Some(entity))
            .then_some((p, self.config.relaxation_passes))
    }

    /// Nearest clear point on concentric rings around `around`.
    pub fn suggest(&self, entity: EntityId, around: Position, region: &FieldBounds) -> Option<Position> {
        let step = (self.config.collision_radius * 0.5).max(0.5);
        for ring in 1..=self.config.suggestion_rings {
            let reach = step * ring as f32;
            let best = (0..SUGGESTION_BEARINGS)
                .map(|k| {
                    let angle = TAU * k as f32 / SUGGESTION_BEARINGS as f32;
                    region.clamp(around.offset(reach * angle.cos(), reach * angle.sin()))
                })
                .filter(|c| self.is_clear(entity, *c))
                .min_by(|a, b| a.distance_sq(&around).total_cmp(&b.distance_sq(&around)));
            if best.is_some() {
                return best;
            }
        }
        None
    }
}

/// Slot a snap move of `entity` toward `target` would land in.
pub fn snap_slot(formation: &Formation, entity: EntityId, target: Position) -> Option<SlotId> {
    nearest_anchor(formation, entity, target).map(|s| s.id)
}

/// Snap candidate: nearest anchor among slots that are empty or already hold
/// `entity`. Exact ties go to the higher-priority role group, then the lower id.
fn nearest_anchor(formation: &Formation, entity: EntityId, target: Position) -> Option<&Slot> {
    formation
        .slots
        .iter()
        .filter(|s| s.entity.is_none() || s.entity == Some(entity))
        .min_by(|a, b| {
            a.anchor
                .distance_sq(&target)
                .total_cmp(&b.anchor.distance_sq(&target))
                .then(a.role.group().cmp(&b.role.group()))
                .then(a.id.cmp(&b.id))
        })
}

/// Direction for a point sitting exactly on a collider: toward the centre of
/// the allowed region, or +x when the collider is the centre.
fn escape_direction(collider: Position, region: &FieldBounds) -> (f32, f32) {
    let c = region.center();
    let (dx, dy) = (c.x - collider.x, c.y - collider.y);
    let len = (dx * dx + dy * dy).sqrt();
    if len > f32::EPSILON {
        (dx / len, dy / len)
    } else {
        (1.0, 0.0)
    }
}
