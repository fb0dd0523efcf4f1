//! Thread-safe handle over one formation editor
//!
//! Mutations are serialised through a mutex (at most one in flight per
//! formation). After each mutation an immutable [`FormationSnapshot`] is
//! published so readers (analysis, chemistry lookups) never wait on writers and
//! never see an intermediate state.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use tracing::{debug, info};

use crate::chemistry::{compute_chemistry, ChemistryEdge, ChemistryGraph, ChemistryInput};
use crate::collab::Delta;
use crate::config::ObjectiveWeights;
use crate::editor::FormationEditor;
use crate::error::{FormationError, Result};
use crate::model::{EntityId, Formation, ParticipantId, Roster};
use crate::optimizer::{analyze_formation, optimize_formation, CancelToken, OptimizationResult, TacticalAnalysis};

/// Immutable view of a formation at one revision.
#[derive(Debug, Clone)]
pub struct FormationSnapshot {
    pub formation: Formation,
    pub chemistry: ChemistryGraph,
    pub roster: Arc<Roster>,
    objective: ObjectiveWeights,
}

impl FormationSnapshot {
    fn capture(editor: &FormationEditor) -> Self {
        Self {
            formation: editor.formation().clone(),
            chemistry: editor.chemistry().clone(),
            roster: editor.roster_arc(),
            objective: editor.config().objective.clone(),
        }
    }

    pub fn revision(&self) -> u64 {
        self.formation.revision
    }

    pub fn analyze(&self) -> TacticalAnalysis {
        analyze_formation(&self.formation, &self.chemistry, &self.objective)
    }

    pub fn chemistry_between(&self, a: EntityId, b: EntityId) -> Result<ChemistryEdge> {
        let ea = self.roster.require(a)?;
        let eb = self.roster.require(b)?;
        Ok(compute_chemistry(
            ChemistryInput::in_formation(ea, &self.formation),
            ChemistryInput::in_formation(eb, &self.formation),
            self.chemistry.weights(),
        ))
    }
}

/// Background optimisation started by [`SharedFormation::spawn_optimize`].
#[derive(Debug)]
pub struct OptimizationJob {
    cancel: CancelToken,
    handle: JoinHandle<Result<(OptimizationResult, Option<Delta>)>>,
}

impl OptimizationJob {
    /// Stop searching; the best candidate so far is still committed.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the search. The delta is `None` when nothing better was found.
    pub fn join(self) -> Result<(OptimizationResult, Option<Delta>)> {
        self.handle
            .join()
            .map_err(|_| FormationError::Internal("optimization worker panicked".to_string()))?
    }
}

#[derive(Debug, Clone)]
pub struct SharedFormation {
    editor: Arc<Mutex<FormationEditor>>,
    snapshot: Arc<RwLock<Arc<FormationSnapshot>>>,
}

impl SharedFormation {
    pub fn new(editor: FormationEditor) -> Self {
        let snapshot = Arc::new(FormationSnapshot::capture(&editor));
        Self { editor: Arc::new(Mutex::new(editor)), snapshot: Arc::new(RwLock::new(snapshot)) }
    }

    /// Latest published state. Cheap; never blocks on a running mutation.
    pub fn snapshot(&self) -> Arc<FormationSnapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Run a mutation with exclusive access, then publish the new state.
    ///
    /// Every successful write republishes: roster updates change chemistry
    /// without moving the revision.
    pub fn write<T>(&self, f: impl FnOnce(&mut FormationEditor) -> Result<T>) -> Result<T> {
        let mut editor = self.editor.lock().unwrap_or_else(PoisonError::into_inner);
        let out = f(&mut editor)?;
        let next = Arc::new(FormationSnapshot::capture(&editor));
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = next;
        Ok(out)
    }

    /// Read the live editor under the writer lock without publishing.
    pub fn read<T>(&self, f: impl FnOnce(&FormationEditor) -> T) -> T {
        let editor = self.editor.lock().unwrap_or_else(PoisonError::into_inner);
        f(&editor)
    }

    /// Search on the current snapshot in a background thread and commit the
    /// result only if no other mutation landed meanwhile (otherwise the job ends
    /// with `ConcurrencyConflict`).
    pub fn spawn_optimize(&self, author: ParticipantId) -> OptimizationJob {
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let shared = self.clone();
        let handle = thread::spawn(move || -> Result<(OptimizationResult, Option<Delta>)> {
            let snapshot = shared.snapshot();
            let config = shared.read(|editor| editor.config().clone());
            debug!(revision = snapshot.revision(), "background optimization started");
            let result = optimize_formation(&snapshot.formation, &snapshot.roster, &config, &token)?;
            let delta = shared.write(|editor| editor.commit_optimization(&result, &author))?.map(|o| o.delta);
            info!(
                delta = result.delta,
                status = ?result.status,
                committed = delta.is_some(),
                "background optimization finished"
            );
            Ok((result, delta))
        });
        OptimizationJob { cancel, handle }
    }
}
