use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::ChemistryWeights;
use crate::model::{Entity, EntityPair, Formation, Position, Role};

/// Contribution of each factor, all in `[0,1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct ChemistryBreakdown {
    pub shared_tenure: f32,
    pub adjacency: f32,
    pub age_gap: f32,
    pub shared_origin: f32,
    pub morale_alignment: f32,
}

impl ChemistryBreakdown {
    fn weighted(&self, w: &ChemistryWeights) -> f32 {
        let total = w.total();
        if total <= 0.0 {
            return 0.0;
        }
        let sum = self.shared_tenure * w.shared_tenure
            + self.adjacency * w.adjacency
            + self.age_gap * w.age_gap
            + self.shared_origin * w.shared_origin
            + self.morale_alignment * w.morale_alignment;
        (sum / total * 100.0).clamp(0.0, 100.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ChemistryEdge {
    pub pair: EntityPair,
    /// 0..=100
    pub score: f32,
    pub breakdown: ChemistryBreakdown,
}

/// One side of a chemistry evaluation: the entity plus where it plays.
#[derive(Debug, Clone, Copy)]
pub struct ChemistryInput<'a> {
    pub entity: &'a Entity,
    pub role: Role,
    pub position: Option<Position>,
}

impl<'a> ChemistryInput<'a> {
    /// Off the pitch: natural role, no position.
    pub fn unplaced(entity: &'a Entity) -> Self {
        Self { entity, role: entity.natural_role, position: None }
    }

    pub fn placed(entity: &'a Entity, role: Role, position: Position) -> Self {
        Self { entity, role, position: Some(position) }
    }

    /// Role from the entity's slot (natural role when free-placed), position from
    /// the formation.
    pub fn in_formation(entity: &'a Entity, formation: &Formation) -> Self {
        let role = formation.slot_of(entity.id).map(|s| s.role).unwrap_or(entity.natural_role);
        Self { entity, role, position: formation.position_of(entity.id) }
    }
}

/// Pairwise chemistry. Pure, and symmetric bit-for-bit: inputs are ordered by
/// entity id before any arithmetic.
pub fn compute_chemistry(
    a: ChemistryInput<'_>,
    b: ChemistryInput<'_>,
    weights: &ChemistryWeights,
) -> ChemistryEdge {
    let (a, b) = if a.entity.id <= b.entity.id { (a, b) } else { (b, a) };

    let breakdown = ChemistryBreakdown {
        shared_tenure: shared_tenure(a.entity, b.entity, weights.full_tenure_months),
        adjacency: adjacency(&a, &b, weights.adjacency_range),
        age_gap: age_gap(a.entity.age, b.entity.age),
        shared_origin: shared_origin(a.entity, b.entity),
        morale_alignment: morale_alignment(a.entity, b.entity),
    };

    ChemistryEdge {
        pair: EntityPair::new(a.entity.id, b.entity.id),
        score: breakdown.weighted(weights),
        breakdown,
    }
}

/// Same club: overlap of tenure relative to a full tenure.
fn shared_tenure(a: &Entity, b: &Entity, full_months: u16) -> f32 {
    if a.club.is_empty() || a.club != b.club {
        return 0.0;
    }
    let together = a.months_at_club.min(b.months_at_club) as f32;
    (together / full_months.max(1) as f32).min(1.0)
}

/// On-pitch distance when both are placed, role line/lane distance otherwise.
fn adjacency(a: &ChemistryInput<'_>, b: &ChemistryInput<'_>, range: f32) -> f32 {
    match (a.position, b.position) {
        (Some(pa), Some(pb)) => (1.0 - pa.distance(&pb) / range.max(f32::EPSILON)).clamp(0.0, 1.0),
        _ => {
            let line_gap = (a.role.line() - b.role.line()).unsigned_abs() as f32;
            let lane_gap = (a.role.lane() - b.role.lane()).unsigned_abs() as f32;
            (1.0 - 0.3 * line_gap - 0.2 * lane_gap).clamp(0.0, 1.0)
        }
    }
}

/// 나이 차이 구간
fn age_gap(a: u8, b: u8) -> f32 {
    match a.abs_diff(b) {
        0..=2 => 1.0,
        3..=5 => 0.7,
        6..=9 => 0.4,
        _ => 0.1,
    }
}

fn shared_origin(a: &Entity, b: &Entity) -> f32 {
    if !a.nationality.is_empty() && a.nationality.eq_ignore_ascii_case(&b.nationality) {
        1.0
    } else {
        0.0
    }
}

/// Half morale (1..=5), half form (0..=100).
fn morale_alignment(a: &Entity, b: &Entity) -> f32 {
    let morale_gap = a.morale.abs_diff(b.morale).min(4) as f32 / 4.0;
    let form_gap = a.attributes.form.abs_diff(b.attributes.form) as f32 / 100.0;
    (1.0 - 0.5 * morale_gap - 0.5 * form_gap).clamp(0.0, 1.0)
}
