//! Positioning Configuration

use serde::{Deserialize, Serialize};

use crate::model::FieldBounds;

/// 충돌 회피 / 스냅 파라미터
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositioningConfig {
    /// Minimum distance between two placed entities (기본: 5.0)
    pub collision_radius: f32,
    /// Relaxation passes before a move is rejected (기본: 5)
    pub relaxation_passes: u8,
    /// Rings searched for a suggestion after rejection (기본: 8)
    pub suggestion_rings: u8,
    /// Extra push beyond the exact overlap so float error cannot leave a pair
    /// fractionally inside the radius (기본: 0.01)
    pub separation_margin: f32,
    /// Pitch bounds
    #[serde(default)]
    pub bounds: FieldBounds,
}

impl Default for PositioningConfig {
    fn default() -> Self {
        Self {
            collision_radius: 5.0,
            relaxation_passes: 5,
            suggestion_rings: 8,
            separation_margin: 0.01,
            bounds: FieldBounds::standard(),
        }
    }
}

impl PositioningConfig {
    /// Spatial hash cell edge: twice the radius, so every collider of a point lies
    /// in its 3×3 cell neighbourhood.
    pub fn cell_size(&self) -> f32 {
        self.collision_radius * 2.0
    }
}
