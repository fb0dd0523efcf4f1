//! Formation CLI Library
//!
//! Roster CSV loading, config files and snapshot-store helpers shared by the
//! `formation_cli` binary.

pub mod roster_csv;

use anyhow::{Context, Result};
use formation_core::{EditorConfig, FileSnapshotStore, FormationEditor, FormationId, SnapshotStore};
use std::fs;
use std::path::Path;
use std::sync::Arc;

pub use roster_csv::{parse_roster_csv, parse_roster_str, CsvRosterProvider, ParseStats, RosterIndex};

/// Load an editor config from YAML (`.yaml`/`.yml`) or JSON; defaults when `None`.
pub fn load_config(path: Option<&Path>) -> Result<EditorConfig> {
    let Some(path) = path else {
        return Ok(EditorConfig::default());
    };
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read config: {}", path.display()))?;
    let is_yaml = matches!(path.extension().and_then(|e| e.to_str()), Some("yaml") | Some("yml"));
    let config = if is_yaml { EditorConfig::from_yaml_str(&text)? } else { EditorConfig::from_json_str(&text)? };
    Ok(config)
}

/// Open a stored formation for editing; committed edits are written back.
pub fn open_editor(store_dir: &Path, id: FormationId, roster_csv: &Path, config: EditorConfig) -> Result<FormationEditor> {
    let store: Arc<dyn SnapshotStore> = Arc::new(FileSnapshotStore::new(store_dir));
    let roster = CsvRosterProvider::new(roster_csv);
    FormationEditor::open(id, store, &roster, config)
        .with_context(|| format!("Failed to open formation {} in {}", id, store_dir.display()))
}
