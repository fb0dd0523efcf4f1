//! JSON API for formation editing
//!
//! String-in / string-out endpoints over an explicit [`FormationEditor`], for
//! hosts that talk JSON (UI bridges, scripting). Every response is wrapped in
//! [`ApiResponse`]; failures carry the stable `FormationError::code()`.

use chrono::{DateTime, Utc};
use schemars::schema_for;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, error, info, warn};
use validator::Validate;

use crate::chemistry::ChemistryEdge;
use crate::collab::Delta;
use crate::editor::{AutoAssignOutcome, FormationEditor};
use crate::error::FormationError;
use crate::model::{EntityId, FormationRecord, ParticipantId, Position, SlotId};
use crate::optimizer::{
    optimize_formation, AssignOptions, CancelToken, OptimizationStatus, TacticalAnalysis,
};
use crate::spatial::{MoveMode, MoveOutcome, MoveRequest};

/// API version for schema compatibility
pub const API_VERSION: &str = "v1";

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
    pub schema_version: String,
    pub timestamp: DateTime<Utc>,
}

/// Structured API error with codes and details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    pub details: Option<HashMap<String, serde_json::Value>>,
}

impl ApiError {
    pub fn new(code: &str, message: &str) -> Self {
        Self { code: code.to_string(), message: message.to_string(), details: None }
    }

    pub fn with_details(code: &str, message: &str, details: HashMap<String, serde_json::Value>) -> Self {
        Self { code: code.to_string(), message: message.to_string(), details: Some(details) }
    }
}

impl From<&FormationError> for ApiError {
    fn from(err: &FormationError) -> Self {
        let mut details = HashMap::new();
        match err {
            FormationError::CollisionUnresolved { entity, requested, suggestion } => {
                details.insert("entity".to_string(), serde_json::json!(entity));
                details.insert("requested".to_string(), serde_json::json!(requested));
                details.insert("suggestion".to_string(), serde_json::json!(suggestion));
            }
            FormationError::AssignmentInfeasible { unfilled, available, required } => {
                details.insert("unfilled".to_string(), serde_json::json!(unfilled));
                details.insert("available".to_string(), serde_json::json!(available));
                details.insert("required".to_string(), serde_json::json!(required));
            }
            FormationError::ConcurrencyConflict { expected, received, current } => {
                details.insert("expected".to_string(), serde_json::json!(expected));
                details.insert("received".to_string(), serde_json::json!(received));
                details.insert("current".to_string(), serde_json::json!(current));
            }
            FormationError::LockUnavailable { slot, holder, expires_at } => {
                details.insert("slot".to_string(), serde_json::json!(slot));
                details.insert("holder".to_string(), serde_json::json!(holder));
                details.insert("expires_at".to_string(), serde_json::json!(expires_at));
            }
            _ => {}
        }
        if details.is_empty() {
            Self::new(err.code(), &err.to_string())
        } else {
            Self::with_details(err.code(), &err.to_string(), details)
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            schema_version: API_VERSION.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn error(error: ApiError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            schema_version: API_VERSION.to_string(),
            timestamp: Utc::now(),
        }
    }
}

// ============================================================================
// Requests / responses
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ProposeMoveRequest {
    pub schema_version: Option<String>,
    #[validate(length(min = 1, max = 128))]
    pub participant: String,
    pub entity: EntityId,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub mode: MoveMode,
    #[serde(default)]
    pub allow_overlap: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AssignRequest {
    pub schema_version: Option<String>,
    #[validate(length(min = 1, max = 128))]
    pub participant: String,
    pub slot: SlotId,
    /// `None` empties the slot
    pub entity: Option<EntityId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AutoAssignRequest {
    pub schema_version: Option<String>,
    #[validate(length(min = 1, max = 128))]
    pub participant: String,
    #[serde(default)]
    pub keep_existing: bool,
    /// Whole roster when omitted
    #[validate(length(min = 1, max = 256))]
    pub pool: Option<Vec<EntityId>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OptimizeRequest {
    pub schema_version: Option<String>,
    #[validate(length(min = 1, max = 128))]
    pub participant: String,
    /// Commit an improvement (기본: true)
    #[serde(default = "default_commit")]
    pub commit: bool,
    pub seed: Option<u64>,
    #[validate(range(min = 1, max = 1_000_000))]
    pub max_iterations: Option<u32>,
    #[validate(range(max = 60_000))]
    pub time_budget_ms: Option<u64>,
}

fn default_commit() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ChemistryRequest {
    pub schema_version: Option<String>,
    pub a: EntityId,
    pub b: EntityId,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct HistoryRequest {
    pub schema_version: Option<String>,
    #[validate(length(min = 1, max = 128))]
    pub participant: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditResponse<T> {
    pub result: T,
    pub delta: Delta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignResponse {
    /// Entity that lost the slot (unassign: the entity removed)
    pub displaced: Option<EntityId>,
    /// Slot the assigned entity came from
    pub vacated: Option<SlotId>,
    pub delta: Delta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizeResponse {
    pub start_score: f32,
    pub best_score: f32,
    pub delta_score: f32,
    pub iterations: u64,
    pub status: OptimizationStatus,
    pub partial: bool,
    /// Best layout found (the committed one when `delta` is set)
    pub formation: FormationRecord,
    pub delta: Option<Delta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub revision: u64,
    pub can_undo: bool,
    pub can_redo: bool,
    /// `None` when there was nothing to step to
    pub delta: Option<Delta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionResponse {
    pub revision: u64,
}

// ============================================================================
// Helpers
// ============================================================================

fn respond<T: Serialize>(response: ApiResponse<T>) -> String {
    serde_json::to_string(&response).unwrap_or_else(|_| "{}".to_string())
}

fn fail<T: Serialize>(err: &FormationError) -> String {
    respond::<T>(ApiResponse::error(ApiError::from(err)))
}

/// Parse and validate a request; the error is a ready-to-send response.
fn parse_request<R: DeserializeOwned + Validate, T: Serialize>(request_json: &str) -> Result<R, String> {
    let request: R = serde_json::from_str(request_json).map_err(|e| {
        error!("Failed to parse request: {}", e);
        respond::<T>(ApiResponse::error(ApiError::new("INVALID_JSON", &format!("Invalid JSON format: {}", e))))
    })?;
    request.validate().map_err(|e| {
        warn!("Request validation failed: {}", e);
        respond::<T>(ApiResponse::error(ApiError::new("VALIDATION_ERROR", &e.to_string())))
    })?;
    Ok(request)
}

// ============================================================================
// Endpoints
// ============================================================================

/// `proposeMove`
pub fn propose_move_json(editor: &mut FormationEditor, request_json: &str) -> String {
    let request: ProposeMoveRequest = match parse_request::<_, EditResponse<MoveOutcome>>(request_json) {
        Ok(r) => r,
        Err(response) => return response,
    };
    let move_request = MoveRequest {
        entity: request.entity,
        target: Position::new(request.x, request.y),
        mode: request.mode,
        allow_overlap: request.allow_overlap,
    };
    match editor.propose_move(&move_request, &ParticipantId::new(request.participant)) {
        Ok(outcome) => respond(ApiResponse::success(EditResponse { result: outcome.result, delta: outcome.delta })),
        Err(e) => {
            debug!("Move rejected: {}", e);
            fail::<EditResponse<MoveOutcome>>(&e)
        }
    }
}

/// `assign` / `unassign` (when `entity` is null)
pub fn assign_json(editor: &mut FormationEditor, request_json: &str) -> String {
    let request: AssignRequest = match parse_request::<_, AssignResponse>(request_json) {
        Ok(r) => r,
        Err(response) => return response,
    };
    let author = ParticipantId::new(request.participant);
    let result = match request.entity {
        Some(entity) => editor.assign(request.slot, entity, &author).map(|o| AssignResponse {
            displaced: o.result.displaced,
            vacated: o.result.vacated,
            delta: o.delta,
        }),
        None => editor
            .unassign(request.slot, &author)
            .map(|o| AssignResponse { displaced: Some(o.result), vacated: None, delta: o.delta }),
    };
    match result {
        Ok(data) => respond(ApiResponse::success(data)),
        Err(e) => fail::<AssignResponse>(&e),
    }
}

/// `autoAssign`
pub fn auto_assign_json(editor: &mut FormationEditor, request_json: &str) -> String {
    let request: AutoAssignRequest = match parse_request::<_, EditResponse<AutoAssignOutcome>>(request_json) {
        Ok(r) => r,
        Err(response) => return response,
    };
    let options = AssignOptions { keep_existing: request.keep_existing };
    match editor.auto_assign(&options, request.pool.as_deref(), &ParticipantId::new(request.participant)) {
        Ok(outcome) => {
            info!("Auto-assign filled {} slots", outcome.result.plan.assignments.len());
            respond(ApiResponse::success(EditResponse { result: outcome.result, delta: outcome.delta }))
        }
        Err(e) => fail::<EditResponse<AutoAssignOutcome>>(&e),
    }
}

/// `optimizeFormation`, with optional per-call budget overrides.
pub fn optimize_formation_json(editor: &mut FormationEditor, request_json: &str) -> String {
    let request: OptimizeRequest = match parse_request::<_, OptimizeResponse>(request_json) {
        Ok(r) => r,
        Err(response) => return response,
    };
    let mut config = editor.config().clone();
    if let Some(seed) = request.seed {
        config.optimizer.seed = seed;
    }
    if let Some(max_iterations) = request.max_iterations {
        config.optimizer.max_iterations = max_iterations;
    }
    if request.time_budget_ms.is_some() {
        config.optimizer.time_budget_ms = request.time_budget_ms;
    }

    let result = match optimize_formation(editor.formation(), editor.roster(), &config, &CancelToken::new()) {
        Ok(result) => result,
        Err(e) => return fail::<OptimizeResponse>(&e),
    };
    let delta = if request.commit {
        match editor.commit_optimization(&result, &ParticipantId::new(request.participant)) {
            Ok(outcome) => outcome.map(|o| o.delta),
            Err(e) => return fail::<OptimizeResponse>(&e),
        }
    } else {
        None
    };
    let formation = if delta.is_some() { editor.formation().to_record() } else { result.formation.to_record() };
    respond(ApiResponse::success(OptimizeResponse {
        start_score: result.start_score,
        best_score: result.best_score,
        delta_score: result.delta,
        iterations: result.iterations,
        status: result.status,
        partial: result.partial,
        formation,
        delta,
    }))
}

/// `analyzeFormation`
pub fn analyze_formation_json(editor: &FormationEditor) -> String {
    respond::<TacticalAnalysis>(ApiResponse::success(editor.analyze()))
}

/// `computeChemistry`
pub fn compute_chemistry_json(editor: &FormationEditor, request_json: &str) -> String {
    let request: ChemistryRequest = match parse_request::<_, ChemistryEdge>(request_json) {
        Ok(r) => r,
        Err(response) => return response,
    };
    match editor.chemistry_between(request.a, request.b) {
        Ok(edge) => respond(ApiResponse::success(edge)),
        Err(e) => fail::<ChemistryEdge>(&e),
    }
}

fn history_json(editor: &mut FormationEditor, request_json: &str, forward: bool) -> String {
    let request: HistoryRequest = match parse_request::<_, HistoryResponse>(request_json) {
        Ok(r) => r,
        Err(response) => return response,
    };
    let author = ParticipantId::new(request.participant);
    let stepped = if forward { editor.redo(&author) } else { editor.undo(&author) };
    match stepped {
        Ok(outcome) => respond(ApiResponse::success(HistoryResponse {
            revision: editor.revision(),
            can_undo: editor.history().can_undo(),
            can_redo: editor.history().can_redo(),
            delta: outcome.map(|o| o.delta),
        })),
        Err(e) => fail::<HistoryResponse>(&e),
    }
}

/// `undo`
pub fn undo_json(editor: &mut FormationEditor, request_json: &str) -> String {
    history_json(editor, request_json, false)
}

/// `redo`
pub fn redo_json(editor: &mut FormationEditor, request_json: &str) -> String {
    history_json(editor, request_json, true)
}

/// `applyRemoteDelta`; a stale revision answers `CONCURRENCY_CONFLICT`.
pub fn apply_delta_json(editor: &mut FormationEditor, delta_json: &str) -> String {
    let delta: Delta = match serde_json::from_str(delta_json) {
        Ok(d) => d,
        Err(e) => {
            let error = ApiError::new("INVALID_JSON", &format!("Invalid delta: {}", e));
            return respond::<RevisionResponse>(ApiResponse::error(error));
        }
    };
    match editor.apply_remote_delta(&delta) {
        Ok(revision) => respond(ApiResponse::success(RevisionResponse { revision })),
        Err(e) => fail::<RevisionResponse>(&e),
    }
}

/// Current `{ id, name, revision, updatedAt, slots }` record.
pub fn formation_record_json(editor: &FormationEditor) -> String {
    respond(ApiResponse::success(editor.formation().to_record()))
}

/// JSON Schema of the formation record.
pub fn formation_record_schema() -> String {
    serde_json::to_string_pretty(&schema_for!(FormationRecord)).unwrap_or_else(|_| "{}".to_string())
}

/// JSON Schema of the delta envelope.
pub fn delta_schema() -> String {
    serde_json::to_string_pretty(&schema_for!(Delta)).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EditorConfig;
    use crate::model::{Entity, Formation, FormationTemplate, Roster};
    use serde_json::Value;

    fn editor() -> FormationEditor {
        let f = Formation::from_template("Api", FormationTemplate::F352);
        let entities: Vec<Entity> = f
            .slots
            .iter()
            .enumerate()
            .map(|(i, s)| Entity::new(i as u32 + 1, format!("P{}", i + 1), s.role))
            .collect();
        FormationEditor::new(f, Roster::new(entities).unwrap(), EditorConfig::test()).unwrap()
    }

    fn parse(json: &str) -> Value {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_auto_assign_then_record() {
        let mut ed = editor();
        let out = parse(&auto_assign_json(&mut ed, r#"{"participant": "a"}"#));
        assert_eq!(out["success"], true);
        assert_eq!(out["schema_version"], API_VERSION);
        assert_eq!(out["data"]["delta"]["op"], "optimize-commit");

        let record = parse(&formation_record_json(&ed));
        assert_eq!(record["data"]["revision"], 1);
        assert_eq!(record["data"]["slots"].as_array().unwrap().len(), 11);
        assert!(record["data"]["slots"][0]["entityId"].is_number());
        assert!(record["data"]["updatedAt"].is_string());
    }

    #[test]
    fn test_infeasible_pool_carries_unfilled_slots() {
        let mut ed = editor();
        let out = parse(&auto_assign_json(&mut ed, r#"{"participant": "a", "pool": [1, 2, 3]}"#));
        assert_eq!(out["success"], false);
        assert_eq!(out["error"]["code"], "ASSIGNMENT_INFEASIBLE");
        assert_eq!(out["error"]["details"]["available"], 3);
        assert!(!out["error"]["details"]["unfilled"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_move_errors() {
        let mut ed = editor();
        auto_assign_json(&mut ed, r#"{"participant": "a"}"#);

        let out = parse(&propose_move_json(&mut ed, r#"{"participant": "a", "entity": 2, "x": 120.0, "y": 10.0}"#));
        assert_eq!(out["error"]["code"], "VALIDATION_ERROR");

        let out = parse(&propose_move_json(&mut ed, r#"{"participant": "", "entity": 2, "x": 20.0, "y": 10.0}"#));
        assert_eq!(out["error"]["code"], "VALIDATION_ERROR");

        let out = parse(&propose_move_json(&mut ed, "not json"));
        assert_eq!(out["error"]["code"], "INVALID_JSON");
    }

    #[test]
    fn test_unassign_and_history() {
        let mut ed = editor();
        auto_assign_json(&mut ed, r#"{"participant": "a"}"#);
        let out = parse(&assign_json(&mut ed, r#"{"participant": "a", "slot": 10, "entity": null}"#));
        assert_eq!(out["data"]["delta"]["op"], "unassign");

        let out = parse(&undo_json(&mut ed, r#"{"participant": "a"}"#));
        assert_eq!(out["data"]["can_redo"], true);
        assert!(ed.formation().slot(SlotId(10)).unwrap().entity.is_some());

        let out = parse(&redo_json(&mut ed, r#"{"participant": "a"}"#));
        assert_eq!(out["data"]["can_redo"], false);
        let out = parse(&redo_json(&mut ed, r#"{"participant": "a"}"#));
        assert!(out["data"]["delta"].is_null());
    }

    #[test]
    fn test_stale_delta_reports_conflict_details() {
        let mut ed = editor();
        auto_assign_json(&mut ed, r#"{"participant": "a"}"#);
        let delta = Delta::new(ed.id(), 1, ParticipantId::new("b"), crate::collab::DeltaOp::Unassign { slot: SlotId(3) });
        let out = parse(&apply_delta_json(&mut ed, &serde_json::to_string(&delta).unwrap()));
        assert_eq!(out["error"]["code"], "CONCURRENCY_CONFLICT");
        assert_eq!(out["error"]["details"]["expected"], 2);
        assert_eq!(out["error"]["details"]["received"], 1);
    }

    #[test]
    fn test_optimize_analyze_and_chemistry() {
        let mut ed = editor();
        auto_assign_json(&mut ed, r#"{"participant": "a"}"#);
        let out = parse(&optimize_formation_json(
            &mut ed,
            r#"{"participant": "a", "commit": false, "max_iterations": 50}"#,
        ));
        assert_eq!(out["success"], true);
        assert!(out["data"]["delta"].is_null());
        assert!(out["data"]["best_score"].as_f64().unwrap() >= out["data"]["start_score"].as_f64().unwrap());
        assert_eq!(ed.revision(), 1);

        let analysis = parse(&analyze_formation_json(&ed));
        assert!(analysis["data"]["objective"].as_f64().unwrap() > 0.0);

        let edge = parse(&compute_chemistry_json(&ed, r#"{"a": 2, "b": 3}"#));
        let score = edge["data"]["score"].as_f64().unwrap();
        assert!((0.0..=100.0).contains(&score));
        let missing = parse(&compute_chemistry_json(&ed, r#"{"a": 2, "b": 99}"#));
        assert_eq!(missing["error"]["code"], "NOT_FOUND");
    }

    #[test]
    fn test_schemas_describe_records() {
        let schema = parse(&formation_record_schema());
        assert!(schema["properties"]["updatedAt"].is_object());
        let delta = parse(&delta_schema());
        assert!(delta.is_object());
    }
}
