use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{FormationError, Result};

/// Pitch extent in normalised units.
pub const FIELD_SIZE: f32 = 100.0;

/// Point on the normalised pitch.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub const CENTER: Position = Position { x: FIELD_SIZE / 2.0, y: FIELD_SIZE / 2.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn distance_sq(&self, other: &Position) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        dx * dx + dy * dy
    }

    #[inline]
    pub fn distance(&self, other: &Position) -> f32 {
        self.distance_sq(other).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Linear interpolation (t = 0 → self, t = 1 → other)
    pub fn lerp(&self, other: &Position, t: f32) -> Position {
        Position::new(self.x + (other.x - self.x) * t, self.y + (other.y - self.y) * t)
    }

    pub fn offset(&self, dx: f32, dy: f32) -> Position {
        Position::new(self.x + dx, self.y + dy)
    }

    /// Field third along the longitudinal axis.
    pub fn third(&self) -> FieldThird {
        if self.y < FIELD_SIZE / 3.0 {
            FieldThird::Defensive
        } else if self.y < FIELD_SIZE * 2.0 / 3.0 {
            FieldThird::Middle
        } else {
            FieldThird::Attacking
        }
    }

    /// Shortest distance from this point to the segment `a`–`b`.
    pub fn distance_to_segment(&self, a: &Position, b: &Position) -> f32 {
        let abx = b.x - a.x;
        let aby = b.y - a.y;
        let len_sq = abx * abx + aby * aby;
        if len_sq <= f32::EPSILON {
            return self.distance(a);
        }
        let t = (((self.x - a.x) * abx + (self.y - a.y) * aby) / len_sq).clamp(0.0, 1.0);
        self.distance(&Position::new(a.x + abx * t, a.y + aby * t))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FieldThird {
    Defensive,
    Middle,
    Attacking,
}

/// Axis-aligned rectangle on the pitch. Used both for the pitch itself and for
/// per-slot movement constraints.
///
/// Contract: all accepted positions satisfy `contains`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FieldBounds {
    pub x_min: f32,
    pub x_max: f32,
    pub y_min: f32,
    pub y_max: f32,
}

impl FieldBounds {
    /// Whole normalised pitch (100 × 100)
    pub fn standard() -> Self {
        Self { x_min: 0.0, x_max: FIELD_SIZE, y_min: 0.0, y_max: FIELD_SIZE }
    }

    pub fn new(x_min: f32, x_max: f32, y_min: f32, y_max: f32) -> Result<Self> {
        let bounds = Self { x_min, x_max, y_min, y_max };
        if ![x_min, x_max, y_min, y_max].iter().all(|v| v.is_finite())
            || x_min > x_max
            || y_min > y_max
        {
            return Err(FormationError::validation(format!(
                "degenerate bounds x=[{:.2}, {:.2}] y=[{:.2}, {:.2}]",
                x_min, x_max, y_min, y_max
            )));
        }
        Ok(bounds)
    }

    /// Validate a position against the bounds
    pub fn validate_position(&self, pos: Position) -> Result<()> {
        if !pos.is_finite() {
            return Err(FormationError::validation("position is not a finite number"));
        }
        if pos.x < self.x_min || pos.x > self.x_max {
            return Err(FormationError::validation(format!(
                "x={:.2} out of bounds [{:.2}, {:.2}]",
                pos.x, self.x_min, self.x_max
            )));
        }
        if pos.y < self.y_min || pos.y > self.y_max {
            return Err(FormationError::validation(format!(
                "y={:.2} out of bounds [{:.2}, {:.2}]",
                pos.y, self.y_min, self.y_max
            )));
        }
        Ok(())
    }

    pub fn contains(&self, pos: Position) -> bool {
        pos.x >= self.x_min && pos.x <= self.x_max && pos.y >= self.y_min && pos.y <= self.y_max
    }

    pub fn clamp(&self, pos: Position) -> Position {
        Position::new(pos.x.clamp(self.x_min, self.x_max), pos.y.clamp(self.y_min, self.y_max))
    }

    /// Overlap of two rectangles, `None` when disjoint.
    pub fn intersect(&self, other: &FieldBounds) -> Option<FieldBounds> {
        let b = FieldBounds {
            x_min: self.x_min.max(other.x_min),
            x_max: self.x_max.min(other.x_max),
            y_min: self.y_min.max(other.y_min),
            y_max: self.y_max.min(other.y_max),
        };
        (b.x_min <= b.x_max && b.y_min <= b.y_max).then_some(b)
    }

    pub fn center(&self) -> Position {
        Position::new((self.x_min + self.x_max) / 2.0, (self.y_min + self.y_max) / 2.0)
    }
}

impl Default for FieldBounds {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_bounds_validate() {
        let bounds = FieldBounds::standard();
        assert!(bounds.validate_position(Position::new(0.0, 100.0)).is_ok());
        assert!(bounds.validate_position(Position::new(-0.1, 50.0)).is_err());
        assert!(bounds.validate_position(Position::new(50.0, f32::NAN)).is_err());
        assert_eq!(bounds.clamp(Position::new(120.0, -3.0)), Position::new(100.0, 0.0));
    }

    #[test]
    fn test_thirds_split_longitudinally() {
        assert_eq!(Position::new(50.0, 10.0).third(), FieldThird::Defensive);
        assert_eq!(Position::new(50.0, 50.0).third(), FieldThird::Middle);
        assert_eq!(Position::new(50.0, 90.0).third(), FieldThird::Attacking);
    }

    #[test]
    fn test_segment_distance() {
        let a = Position::new(0.0, 0.0);
        let b = Position::new(10.0, 0.0);
        assert!((Position::new(5.0, 3.0).distance_to_segment(&a, &b) - 3.0).abs() < 1e-5);
        assert!((Position::new(13.0, 4.0).distance_to_segment(&a, &b) - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_intersect_disjoint() {
        let a = FieldBounds::new(0.0, 10.0, 0.0, 10.0).unwrap();
        let b = FieldBounds::new(20.0, 30.0, 0.0, 10.0).unwrap();
        assert!(a.intersect(&b).is_none());
        assert!(FieldBounds::new(5.0, 1.0, 0.0, 1.0).is_err());
    }
}
