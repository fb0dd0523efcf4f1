//! Assignment / Local Search Configuration

use serde::{Deserialize, Serialize};

/// Auto-assignment scoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentConfig {
    /// Weight of role fit in the per-pair score (기본: 0.75)
    pub fit_weight: f32,
    /// Weight of chemistry with adjacent slots (기본: 0.25)
    pub chemistry_weight: f32,
    /// Anchor distance that makes two slots adjacent (기본: 26.0)
    pub adjacency_radius: f32,
    /// Multiplier for doubtful entities (기본: 0.8)
    pub doubtful_factor: f32,
    /// Multiplier for injured/suspended entities when not excluded (기본: 0.05)
    pub unavailable_factor: f32,
    /// Drop injured/suspended entities from the pool entirely (기본: true)
    pub exclude_unavailable: bool,
    /// Re-solves using the previous pass's neighbours for chemistry (기본: 2)
    pub refinement_passes: u8,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            fit_weight: 0.75,
            chemistry_weight: 0.25,
            adjacency_radius: 26.0,
            doubtful_factor: 0.8,
            unavailable_factor: 0.05,
            exclude_unavailable: true,
            refinement_passes: 2,
        }
    }
}

/// Simulated annealing over positions and assignments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Iteration budget per restart (기본: 2000)
    pub max_iterations: u32,
    /// Stop after this many iterations without improvement (기본: 400)
    pub patience: u32,
    /// Independent restarts evaluated in parallel (기본: 4)
    pub restarts: u8,
    /// Base RNG seed (restart i uses seed + i)
    pub seed: u64,
    /// Largest position nudge in pitch units (기본: 4.0)
    pub max_step: f32,
    /// Initial annealing temperature in objective units (기본: 0.02)
    pub initial_temperature: f64,
    /// Geometric cooling factor per iteration (기본: 0.995)
    pub cooling: f64,
    /// Probability of an assignment perturbation instead of a nudge (기본: 0.35)
    pub swap_probability: f64,
    /// Optional wall-clock budget in milliseconds
    #[serde(default)]
    pub time_budget_ms: Option<u64>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 2000,
            patience: 400,
            restarts: 4,
            seed: 42,
            max_step: 4.0,
            initial_temperature: 0.02,
            cooling: 0.995,
            swap_probability: 0.35,
            time_budget_ms: None,
        }
    }
}

/// Aggregate tactical objective
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectiveWeights {
    pub coverage: f64,
    pub chemistry: f64,
    pub shape: f64,
    pub passing_lanes: f64,
    /// Target share of outfield players per third (defensive, middle, attacking)
    pub target_third_shares: [f64; 3],
    /// Target mean y of the back line (기본: 22.0)
    pub target_line_height: f32,
    /// Pass length window for passing lanes (기본: 8..35)
    pub pass_range: (f32, f32),
    /// Clearance a lane needs from other teammates (기본: 3.0)
    pub lane_clearance: f32,
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        Self {
            coverage: 0.30,
            chemistry: 0.30,
            shape: 0.20,
            passing_lanes: 0.20,
            target_third_shares: [0.4, 0.35, 0.25],
            target_line_height: 22.0,
            pass_range: (8.0, 35.0),
            lane_clearance: 3.0,
        }
    }
}

impl ObjectiveWeights {
    pub fn total(&self) -> f64 {
        self.coverage + self.chemistry + self.shape + self.passing_lanes
    }
}
