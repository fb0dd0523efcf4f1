//! Chemistry
//!
//! Symmetric pairwise compatibility between placed entities.
//!
//! - [`compute_chemistry`]: pure scorer, five factors in `[0,1]` weighted into `[0,100]`
//! - [`ChemistryGraph`]: edge map keyed by [`crate::model::EntityPair`] plus an incidence
//!   index, so an edit touching one entity recomputes only that entity's k edges

mod graph;
mod scorer;

pub use graph::ChemistryGraph;
pub use scorer::{compute_chemistry, ChemistryBreakdown, ChemistryEdge, ChemistryInput};
