//! History Manager
//!
//! Linear undo/redo over full formation snapshots. Committing after an undo
//! discards the redo tail; the oldest entry is evicted beyond `max_depth`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, trace};

use crate::model::{Formation, ParticipantId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HistoryState {
    #[default]
    Idle,
    /// An accepted edit is waiting for its snapshot
    Recording,
}

/// Immutable snapshot of a formation after an edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub snapshot: Formation,
    pub author: ParticipantId,
    pub timestamp: DateTime<Utc>,
    pub label: String,
}

#[derive(Debug, Clone)]
pub struct HistoryManager {
    entries: VecDeque<HistoryEntry>,
    /// Index of the entry matching the current state
    cursor: usize,
    max_depth: usize,
    state: HistoryState,
}

impl HistoryManager {
    pub fn new(max_depth: usize) -> Self {
        Self { entries: VecDeque::new(), cursor: 0, max_depth: max_depth.max(1), state: HistoryState::Idle }
    }

    /// History whose first entry is `snapshot`, so the first edit can be undone.
    pub fn with_baseline(max_depth: usize, snapshot: Formation, author: ParticipantId) -> Self {
        let mut history = Self::new(max_depth);
        history.commit(snapshot, author, "open");
        history
    }

    pub fn state(&self) -> HistoryState {
        self.state
    }

    /// Idle → Recording. Called once an edit has been accepted.
    pub fn begin(&mut self) {
        self.state = HistoryState::Recording;
    }

    /// Back to Idle without committing (edit rolled back).
    pub fn abort(&mut self) {
        self.state = HistoryState::Idle;
    }

    /// Push `snapshot` after the cursor, dropping the redo tail.
    pub fn commit(&mut self, snapshot: Formation, author: ParticipantId, label: impl Into<String>) {
        self.state = HistoryState::Recording;
        if !self.entries.is_empty() {
            let discarded = self.entries.len() - (self.cursor + 1);
            if discarded > 0 {
                trace!(discarded, "redo tail discarded");
            }
            self.entries.truncate(self.cursor + 1);
        }
        self.entries.push_back(HistoryEntry {
            snapshot,
            author,
            timestamp: Utc::now(),
            label: label.into(),
        });
        if self.entries.len() > self.max_depth {
            if let Some(evicted) = self.entries.pop_front() {
                debug!(label = %evicted.label, depth = self.max_depth, "history entry evicted");
            }
        }
        self.cursor = self.entries.len() - 1;
        self.state = HistoryState::Idle;
    }

    /// Step back. `None` at the oldest entry.
    pub fn undo(&mut self) -> Option<&HistoryEntry> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        self.entries.get(self.cursor)
    }

    /// Step forward. `None` at the newest entry.
    pub fn redo(&mut self) -> Option<&HistoryEntry> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        self.entries.get(self.cursor)
    }

    /// Entry an undo would step to, without moving the cursor.
    pub fn peek_undo(&self) -> Option<&HistoryEntry> {
        if !self.can_undo() {
            return None;
        }
        self.entries.get(self.cursor - 1)
    }

    /// Entry a redo would step to, without moving the cursor.
    pub fn peek_redo(&self) -> Option<&HistoryEntry> {
        if !self.can_redo() {
            return None;
        }
        self.entries.get(self.cursor + 1)
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    pub fn current(&self) -> Option<&HistoryEntry> {
        self.entries.get(self.cursor)
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityId, FormationTemplate, SlotId};
    use proptest::prelude::*;

    fn author() -> ParticipantId {
        ParticipantId::new("coach")
    }

    fn edited(base: &Formation, slot: u32, entity: u32) -> Formation {
        let mut f = base.clone();
        f.assign(SlotId(slot), EntityId(entity)).unwrap();
        f.touch();
        f
    }

    #[test]
    fn test_three_edits_two_undos_one_redo() {
        let base = Formation::from_template("H", FormationTemplate::F442);
        let e1 = edited(&base, 0, 1);
        let e2 = edited(&e1, 1, 2);
        let e3 = edited(&e2, 2, 3);
        let mut h = HistoryManager::with_baseline(50, base.clone(), author());
        for (f, label) in [(&e1, "e1"), (&e2, "e2"), (&e3, "e3")] {
            h.commit(f.clone(), author(), label);
        }

        h.undo();
        let after_two = h.undo().unwrap().snapshot.clone();
        assert_eq!(after_two, e1);

        let after_redo = h.redo().unwrap().snapshot.clone();
        assert_eq!(after_redo, e2);
        assert!(h.can_redo());
    }

    #[test]
    fn test_commit_after_undo_discards_tail() {
        let base = Formation::from_template("H", FormationTemplate::F433);
        let e1 = edited(&base, 0, 1);
        let e2 = edited(&e1, 1, 2);
        let mut h = HistoryManager::with_baseline(50, base.clone(), author());
        h.commit(e1.clone(), author(), "e1");
        h.commit(e2, author(), "e2");

        h.undo();
        let branch = edited(&e1, 5, 9);
        h.commit(branch.clone(), author(), "branch");

        assert!(!h.can_redo());
        assert!(h.redo().is_none());
        assert_eq!(h.len(), 3);
        assert_eq!(h.current().unwrap().snapshot, branch);
    }

    #[test]
    fn test_peek_does_not_move_cursor() {
        let base = Formation::from_template("H", FormationTemplate::F442);
        let e1 = edited(&base, 0, 1);
        let mut h = HistoryManager::with_baseline(50, base.clone(), author());
        h.commit(e1.clone(), author(), "e1");

        assert_eq!(h.peek_undo().unwrap().snapshot, base);
        assert!(h.peek_redo().is_none());
        assert_eq!(h.cursor(), 1);

        h.undo();
        assert!(h.peek_undo().is_none());
        assert_eq!(h.peek_redo().unwrap().snapshot, e1);
        assert_eq!(h.cursor(), 0);
    }

    #[test]
    fn test_depth_bound_evicts_oldest() {
        let mut f = Formation::from_template("H", FormationTemplate::F442);
        let mut h = HistoryManager::with_baseline(5, f.clone(), author());
        for i in 0..10u32 {
            f = edited(&f, i % 11, i + 1);
            h.commit(f.clone(), author(), format!("edit {}", i));
        }
        assert_eq!(h.len(), 5);
        let mut undos = 0;
        while h.undo().is_some() {
            undos += 1;
        }
        assert_eq!(undos, 4);
        assert_eq!(h.current().unwrap().label, "edit 5");
    }

    #[test]
    fn test_state_machine_transitions() {
        let f = Formation::from_template("H", FormationTemplate::F442);
        let mut h = HistoryManager::new(3);
        assert_eq!(h.state(), HistoryState::Idle);
        h.begin();
        assert_eq!(h.state(), HistoryState::Recording);
        h.commit(f, author(), "first");
        assert_eq!(h.state(), HistoryState::Idle);
        assert!(h.undo().is_none());
        h.begin();
        h.abort();
        assert_eq!(h.state(), HistoryState::Idle);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Commit(u32),
        Undo,
        Redo,
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u32..11).prop_map(Op::Commit),
            Just(Op::Undo),
            Just(Op::Redo),
        ]
    }

    proptest! {
        #[test]
        fn prop_undo_then_redo_restores_state(ops in prop::collection::vec(arb_op(), 1..60)) {
            let mut f = Formation::from_template("P", FormationTemplate::F4231);
            let mut h = HistoryManager::with_baseline(50, f.clone(), author());
            let mut next_entity = 1;
            for op in ops {
                match op {
                    Op::Commit(slot) => {
                        f = edited(&f, slot, next_entity);
                        next_entity += 1;
                        h.commit(f.clone(), author(), "edit");
                    }
                    Op::Undo => {
                        if let Some(e) = h.undo() {
                            f = e.snapshot.clone();
                        }
                    }
                    Op::Redo => {
                        if let Some(e) = h.redo() {
                            f = e.snapshot.clone();
                        }
                    }
                }
                prop_assert_eq!(&h.current().unwrap().snapshot, &f);
                if h.can_undo() {
                    let before = f.clone();
                    h.undo();
                    let restored = h.redo().unwrap().snapshot.clone();
                    prop_assert_eq!(restored, before);
                }
            }
        }
    }
}
