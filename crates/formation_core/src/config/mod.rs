//! # Editor Configuration
//!
//! 모든 튜닝 상수를 중앙에서 관리하는 설정 시스템.
//!
//! The optimiser objective weights and the relaxation pass count have no
//! authoritative values; they live here rather than as constants.
//!
//! ```rust
//! use formation_core::config::EditorConfig;
//!
//! let config = EditorConfig::default();
//! let quick = EditorConfig::quick();
//! assert!(quick.optimizer.max_iterations < config.optimizer.max_iterations);
//! ```

mod chemistry_config;
mod optimizer_config;
mod positioning_config;
mod session_config;

pub use chemistry_config::ChemistryWeights;
pub use optimizer_config::{AssignmentConfig, ObjectiveWeights, OptimizerConfig};
pub use positioning_config::PositioningConfig;
pub use session_config::{CollaborationConfig, HistoryConfig};

use serde::{Deserialize, Serialize};

use crate::error::{FormationError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EditorConfig {
    #[serde(default)]
    pub positioning: PositioningConfig,
    #[serde(default)]
    pub chemistry: ChemistryWeights,
    #[serde(default)]
    pub assignment: AssignmentConfig,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub objective: ObjectiveWeights,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub collaboration: CollaborationConfig,
}

impl EditorConfig {
    /// 기본 설정
    pub fn standard() -> Self {
        Self::default()
    }

    /// Small search budget for interactive use
    pub fn quick() -> Self {
        let mut cfg = Self::default();
        cfg.optimizer.max_iterations = 400;
        cfg.optimizer.patience = 120;
        cfg.optimizer.restarts = 2;
        cfg.optimizer.time_budget_ms = Some(250);
        cfg
    }

    /// 테스트용 (결정적, 시간 제한 없음)
    pub fn test() -> Self {
        let mut cfg = Self::default();
        cfg.optimizer.max_iterations = 300;
        cfg.optimizer.patience = 100;
        cfg.optimizer.restarts = 2;
        cfg.optimizer.seed = 7;
        cfg.optimizer.time_budget_ms = None;
        cfg
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let cfg: Self = serde_yaml::from_str(yaml)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: Self =
            serde_json::from_str(json).map_err(|e| FormationError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        fn check(ok: bool, msg: &str) -> Result<()> {
            if ok {
                Ok(())
            } else {
                Err(FormationError::Config(msg.to_string()))
            }
        }

        let p = &self.positioning;
        check(p.collision_radius.is_finite() && p.collision_radius > 0.0, "collision_radius must be > 0")?;
        check(p.relaxation_passes > 0, "relaxation_passes must be > 0")?;
        check(p.separation_margin >= 0.0, "separation_margin must be >= 0")?;
        check(
            p.bounds.x_min < p.bounds.x_max && p.bounds.y_min < p.bounds.y_max,
            "bounds must have positive area",
        )?;

        let c = &self.chemistry;
        check(
            [c.shared_tenure, c.adjacency, c.age_gap, c.shared_origin, c.morale_alignment]
                .iter()
                .all(|w| *w >= 0.0)
                && c.total() > 0.0,
            "chemistry weights must be non-negative with a positive sum",
        )?;
        check(c.adjacency_range > 0.0, "adjacency_range must be > 0")?;

        let a = &self.assignment;
        check(a.fit_weight >= 0.0 && a.chemistry_weight >= 0.0, "assignment weights must be >= 0")?;
        check(a.fit_weight + a.chemistry_weight > 0.0, "assignment weights must not both be 0")?;
        check(
            (0.0..=1.0).contains(&a.doubtful_factor) && (0.0..=1.0).contains(&a.unavailable_factor),
            "availability factors must be within 0..=1",
        )?;

        let o = &self.optimizer;
        check(o.max_iterations > 0, "max_iterations must be > 0")?;
        check(o.patience > 0, "patience must be > 0")?;
        check(o.restarts > 0, "restarts must be > 0")?;
        check(o.max_step > 0.0, "max_step must be > 0")?;
        check(o.cooling > 0.0 && o.cooling <= 1.0, "cooling must be within (0, 1]")?;
        check((0.0..=1.0).contains(&o.swap_probability), "swap_probability must be within 0..=1")?;

        let w = &self.objective;
        check(
            [w.coverage, w.chemistry, w.shape, w.passing_lanes].iter().all(|v| *v >= 0.0)
                && w.total() > 0.0,
            "objective weights must be non-negative with a positive sum",
        )?;
        check(w.pass_range.0 < w.pass_range.1, "pass_range must be increasing")?;

        check(self.history.max_depth > 0, "history.max_depth must be > 0")?;
        check(self.collaboration.lock_ttl_secs > 0, "lock_ttl_secs must be > 0")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(EditorConfig::default().validate().is_ok());
        assert!(EditorConfig::quick().validate().is_ok());
        assert!(EditorConfig::test().validate().is_ok());
        assert_eq!(EditorConfig::default().positioning.relaxation_passes, 5);
        assert_eq!(EditorConfig::default().history.max_depth, 50);
    }

    #[test]
    fn test_partial_yaml_overrides() {
        let yaml = "positioning:\n  collision_radius: 3.0\n  relaxation_passes: 8\n  suggestion_rings: 4\n  separation_margin: 0.01\nhistory:\n  max_depth: 10\n";
        let cfg = EditorConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(cfg.positioning.collision_radius, 3.0);
        assert_eq!(cfg.positioning.cell_size(), 6.0);
        assert_eq!(cfg.history.max_depth, 10);
        assert_eq!(cfg.optimizer.max_iterations, OptimizerConfig::default().max_iterations);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut cfg = EditorConfig::default();
        cfg.positioning.relaxation_passes = 0;
        assert!(matches!(cfg.validate(), Err(FormationError::Config(_))));

        let json = r#"{"history": {"max_depth": 0}}"#;
        assert!(EditorConfig::from_json_str(json).is_err());
    }
}
