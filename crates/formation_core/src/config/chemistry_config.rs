//! Chemistry Configuration

use serde::{Deserialize, Serialize};

/// Relative weight of each chemistry factor. Normalised at evaluation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChemistryWeights {
    /// Time spent together at the same club (기본: 0.25)
    pub shared_tenure: f32,
    /// Role / on-pitch adjacency (기본: 0.30)
    pub adjacency: f32,
    /// Age-gap bucket (기본: 0.10)
    pub age_gap: f32,
    /// Same nationality (기본: 0.15)
    pub shared_origin: f32,
    /// Morale and form alignment (기본: 0.20)
    pub morale_alignment: f32,
    /// Months together that count as a full tenure bonus (기본: 36)
    pub full_tenure_months: u16,
    /// Distance beyond which two positions are no longer adjacent (기본: 35.0)
    pub adjacency_range: f32,
}

impl Default for ChemistryWeights {
    fn default() -> Self {
        Self {
            shared_tenure: 0.25,
            adjacency: 0.30,
            age_gap: 0.10,
            shared_origin: 0.15,
            morale_alignment: 0.20,
            full_tenure_months: 36,
            adjacency_range: 35.0,
        }
    }
}

impl ChemistryWeights {
    pub fn total(&self) -> f32 {
        self.shared_tenure + self.adjacency + self.age_gap + self.shared_origin + self.morale_alignment
    }
}
