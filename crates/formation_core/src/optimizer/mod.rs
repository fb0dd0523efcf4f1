//! Assignment Optimizer
//!
//! - [`auto_assign`]: exact Kuhn–Munkres matching of a pool onto the slots
//! - [`optimize_formation`]: bounded, cancellable local search on positions and assignments
//! - [`analyze_formation`]: tactical metrics, also the search objective

mod analysis;
mod assign;
mod local_search;

#[cfg(test)]
mod assign_tests;

pub use analysis::{analyze_formation, TacticalAnalysis, ThirdCoverage};
pub use assign::{auto_assign, role_fit, AssignOptions, AssignmentPlan, SlotScore};
pub use local_search::{optimize_formation, CancelToken, OptimizationResult, OptimizationStatus};
