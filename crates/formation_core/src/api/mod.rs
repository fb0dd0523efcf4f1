//! JSON surface for hosts that speak strings (UI bridges, scripting).

pub mod json_api;

pub use json_api::{
    analyze_formation_json, apply_delta_json, assign_json, auto_assign_json, compute_chemistry_json,
    delta_schema, formation_record_json, formation_record_schema, optimize_formation_json,
    propose_move_json, redo_json, undo_json, ApiError, ApiResponse, API_VERSION,
};
