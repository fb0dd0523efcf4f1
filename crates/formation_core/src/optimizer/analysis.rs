//! Derived tactical metrics. Read-only; doubles as the local-search objective.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::chemistry::ChemistryGraph;
use crate::config::ObjectiveWeights;
use crate::model::{FieldThird, Formation, Position, RoleGroup};

/// Share of outfield entities in each third (sums to 1 when any are placed).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct ThirdCoverage {
    pub defensive: f32,
    pub middle: f32,
    pub attacking: f32,
}

impl ThirdCoverage {
    pub fn as_array(&self) -> [f32; 3] {
        [self.defensive, self.middle, self.attacking]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TacticalAnalysis {
    pub coverage: ThirdCoverage,
    /// 1 = shares match the target exactly
    pub coverage_balance: f32,
    /// 0..=100
    pub average_chemistry: f32,
    /// Mean y of defence-slot entities
    pub defensive_line_height: Option<f32>,
    /// Flatness and height of the back line, 0..=1
    pub defensive_shape: f32,
    /// Mean open passing options per outfield entity (capped at 3), 0..=1
    pub passing_lane_quality: f32,
    /// Weighted aggregate, 0..=1
    pub objective: f32,
}

/// Outfield positions: every placed entity except the one in a goalkeeper slot.
fn outfield(formation: &Formation) -> Vec<Position> {
    let keepers: Vec<_> = formation
        .slots
        .iter()
        .filter(|s| s.role.group() == RoleGroup::Goalkeeper)
        .filter_map(|s| s.entity)
        .collect();
    formation
        .placed_entities()
        .into_iter()
        .filter(|(e, _)| !keepers.contains(e))
        .map(|(_, p)| p)
        .collect()
}

pub fn analyze_formation(
    formation: &Formation,
    chemistry: &ChemistryGraph,
    weights: &ObjectiveWeights,
) -> TacticalAnalysis {
    let players = outfield(formation);

    let coverage = third_coverage(&players);
    let deviation: f64 = coverage
        .as_array()
        .iter()
        .zip(weights.target_third_shares.iter())
        .map(|(share, target)| (*share as f64 - target).abs())
        .sum();
    let coverage_balance =
        if players.is_empty() { 0.0 } else { (1.0 - 0.5 * deviation).clamp(0.0, 1.0) as f32 };

    let average_chemistry = chemistry.average();

    let line: Vec<f32> = formation
        .slots
        .iter()
        .filter(|s| s.entity.is_some() && s.role.group() == RoleGroup::Defense)
        .map(|s| s.position.y)
        .collect();
    let (defensive_line_height, defensive_shape) = line_shape(&line, weights.target_line_height);

    let passing_lane_quality = lane_quality(&players, weights);

    let parts = [
        (weights.coverage, coverage_balance as f64),
        (weights.chemistry, (average_chemistry / 100.0) as f64),
        (weights.shape, defensive_shape as f64),
        (weights.passing_lanes, passing_lane_quality as f64),
    ];
    let total = weights.total();
    let objective = if total > 0.0 {
        (parts.iter().map(|(w, v)| w * v).sum::<f64>() / total) as f32
    } else {
        0.0
    };

    TacticalAnalysis {
        coverage,
        coverage_balance,
        average_chemistry,
        defensive_line_height,
        defensive_shape,
        passing_lane_quality,
        objective,
    }
}

fn third_coverage(players: &[Position]) -> ThirdCoverage {
    if players.is_empty() {
        return ThirdCoverage::default();
    }
    let mut counts = [0usize; 3];
    for p in players {
        let idx = match p.third() {
            FieldThird::Defensive => 0,
            FieldThird::Middle => 1,
            FieldThird::Attacking => 2,
        };
        counts[idx] += 1;
    }
    let n = players.len() as f32;
    ThirdCoverage {
        defensive: counts[0] as f32 / n,
        middle: counts[1] as f32 / n,
        attacking: counts[2] as f32 / n,
    }
}

/// (mean height, shape score). Half flatness, half closeness to the target height.
fn line_shape(line: &[f32], target_height: f32) -> (Option<f32>, f32) {
    if line.is_empty() {
        return (None, 0.5);
    }
    let n = line.len() as f32;
    let mean = line.iter().sum::<f32>() / n;
    let std_dev = (line.iter().map(|y| (y - mean).powi(2)).sum::<f32>() / n).sqrt();
    let flatness = (1.0 - std_dev / 10.0).clamp(0.0, 1.0);
    let height = (1.0 - (mean - target_height).abs() / target_height.max(1.0)).clamp(0.0, 1.0);
    (Some(mean), 0.5 * flatness + 0.5 * height)
}

/// A lane is open when the receiver is within pass range and no third entity
/// stands within `lane_clearance` of the segment.
fn lane_quality(players: &[Position], weights: &ObjectiveWeights) -> f32 {
    if players.len() < 2 {
        return 0.0;
    }
    let (min_range, max_range) = weights.pass_range;
    let mut total = 0.0;
    for (i, from) in players.iter().enumerate() {
        let mut open = 0usize;
        for (j, to) in players.iter().enumerate() {
            if i == j {
                continue;
            }
            let d = from.distance(to);
            if d < min_range || d > max_range {
                continue;
            }
            let blocked = players.iter().enumerate().any(|(k, p)| {
                k != i && k != j && p.distance_to_segment(from, to) < weights.lane_clearance
            });
            if !blocked {
                open += 1;
            }
        }
        total += open.min(3) as f32 / 3.0;
    }
    total / players.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChemistryWeights;
    use crate::model::{Entity, EntityId, FormationTemplate, Roster, SlotId};

    fn filled(template: FormationTemplate) -> (Formation, Roster) {
        let mut f = Formation::from_template("A", template);
        let entities: Vec<Entity> = f
            .slots
            .iter()
            .enumerate()
            .map(|(i, s)| Entity::new(i as u32 + 1, format!("P{}", i + 1), s.role))
            .collect();
        for e in &entities {
            f.assign(SlotId(e.id.0 - 1), e.id).unwrap();
        }
        (f, Roster::new(entities).unwrap())
    }

    #[test]
    fn test_442_thirds_and_line() {
        let (f, roster) = filled(FormationTemplate::F442);
        let graph = ChemistryGraph::build(ChemistryWeights::default(), &f, &roster);
        let a = analyze_formation(&f, &graph, &ObjectiveWeights::default());

        assert!((a.coverage.defensive - 0.4).abs() < 1e-6);
        assert!((a.coverage.middle - 0.4).abs() < 1e-6);
        assert!((a.coverage.attacking - 0.2).abs() < 1e-6);
        assert!((a.coverage_balance - 0.95).abs() < 1e-5);
        assert_eq!(a.defensive_line_height, Some(22.5));
        assert!(a.passing_lane_quality > 0.0);
        assert!((0.0..=1.0).contains(&a.objective));
    }

    #[test]
    fn test_empty_formation_is_neutral() {
        let f = Formation::from_template("Empty", FormationTemplate::F433);
        let graph = ChemistryGraph::default();
        let a = analyze_formation(&f, &graph, &ObjectiveWeights::default());
        assert_eq!(a.coverage, ThirdCoverage::default());
        assert_eq!(a.defensive_line_height, None);
        assert_eq!(a.passing_lane_quality, 0.0);
    }

    #[test]
    fn test_analysis_is_pure() {
        let (f, roster) = filled(FormationTemplate::F4231);
        let before = f.clone();
        let graph = ChemistryGraph::build(ChemistryWeights::default(), &f, &roster);
        let a = analyze_formation(&f, &graph, &ObjectiveWeights::default());
        let b = analyze_formation(&f, &graph, &ObjectiveWeights::default());
        assert_eq!(a, b);
        assert_eq!(f, before);
        assert!(graph.edge(EntityId(1), EntityId(2)).is_some());
    }
}
