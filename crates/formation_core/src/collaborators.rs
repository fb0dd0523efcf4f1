//! External collaborators
//!
//! The editing core only talks to the outside world through these traits:
//! - `RosterProvider`: entity attribute records (read-only)
//! - `SnapshotStore`: eager load, fire-and-forget save of committed snapshots
//! - `DeltaBroadcaster`: fan-out of deltas to the other editors of a formation
//! - `Notifier`: user-visible signals (conflicts, rejections, optimizer results)
//!
//! In-memory adapters are provided for tests and single-process use. The file
//! store lives in [`crate::store`].

use fxhash::FxHashMap;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{mpsc, Mutex, PoisonError};

use crate::collab::{Delta, Notification};
use crate::error::{FormationError, Result};
use crate::model::{Entity, EntityId, Formation, FormationId, ParticipantId, Roster};

pub trait RosterProvider: Send + Sync {
    /// Every entity available to the formation's owner.
    fn load_roster(&self) -> Result<Roster>;

    fn entity(&self, id: EntityId) -> Result<Entity> {
        self.load_roster()?.require(id).cloned()
    }
}

pub trait SnapshotStore: Send + Sync {
    fn load(&self, id: FormationId) -> Result<Formation>;
    fn save(&self, formation: &Formation) -> Result<()>;
}

pub trait DeltaBroadcaster: Send + Sync {
    /// Deliver `delta` to every participant except `exclude`.
    fn broadcast(&self, delta: &Delta, exclude: Option<&ParticipantId>) -> Result<()>;
}

pub trait Notifier: Send + Sync {
    fn notify(&self, to: &ParticipantId, notification: &Notification);
}

// ============================================================================
// In-memory adapters
// ============================================================================

#[derive(Debug, Default)]
pub struct InMemoryRoster {
    roster: Roster,
}

impl InMemoryRoster {
    pub fn new(roster: Roster) -> Self {
        Self { roster }
    }
}

impl RosterProvider for InMemoryRoster {
    fn load_roster(&self) -> Result<Roster> {
        Ok(self.roster.clone())
    }

    fn entity(&self, id: EntityId) -> Result<Entity> {
        self.roster.require(id).cloned()
    }
}

/// Keeps the latest snapshot per formation.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: Mutex<FxHashMap<FormationId, Formation>>,
    fail_saves: bool,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose `save` always fails (exercises the fire-and-forget path).
    pub fn failing() -> Self {
        Self { snapshots: Mutex::default(), fail_saves: true }
    }

    pub fn revision_of(&self, id: FormationId) -> Option<u64> {
        self.snapshots.lock().unwrap_or_else(PoisonError::into_inner).get(&id).map(|f| f.revision)
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self, id: FormationId) -> Result<Formation> {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or_else(|| FormationError::NotFound(format!("formation {}", id)))
    }

    fn save(&self, formation: &Formation) -> Result<()> {
        if self.fail_saves {
            return Err(FormationError::Storage("store unavailable".to_string()));
        }
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(formation.id, formation.clone());
        Ok(())
    }
}

/// A delta addressed to everyone but `exclude`.
#[derive(Debug, Clone, PartialEq)]
pub struct Broadcast {
    pub delta: Delta,
    pub exclude: Option<ParticipantId>,
}

/// Pushes deltas into an `mpsc` channel owned by the transport layer.
#[derive(Debug)]
pub struct ChannelBroadcaster {
    tx: Mutex<Sender<Broadcast>>,
}

impl ChannelBroadcaster {
    pub fn new(tx: Sender<Broadcast>) -> Self {
        Self { tx: Mutex::new(tx) }
    }

    pub fn channel() -> (Self, Receiver<Broadcast>) {
        let (tx, rx) = mpsc::channel();
        (Self::new(tx), rx)
    }
}

impl DeltaBroadcaster for ChannelBroadcaster {
    fn broadcast(&self, delta: &Delta, exclude: Option<&ParticipantId>) -> Result<()> {
        let envelope = Broadcast { delta: delta.clone(), exclude: exclude.cloned() };
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send(envelope)
            .map_err(|_| FormationError::Storage("broadcast channel closed".to_string()))
    }
}

/// Collects notifications in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(ParticipantId, Notification)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain everything recorded so far.
    pub fn take(&self) -> Vec<(ParticipantId, Notification)> {
        std::mem::take(&mut *self.sent.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn sent_to(&self, participant: &ParticipantId) -> Vec<Notification> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(to, _)| to == participant)
            .map(|(_, n)| n.clone())
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, to: &ParticipantId, notification: &Notification) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((to.clone(), notification.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::DeltaOp;
    use crate::model::{FormationTemplate, Role, SlotId};

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemorySnapshotStore::new();
        let formation = Formation::from_template("Store", FormationTemplate::F433);
        assert!(matches!(store.load(formation.id), Err(FormationError::NotFound(_))));
        store.save(&formation).unwrap();
        assert_eq!(store.load(formation.id).unwrap(), formation);
        assert!(MemorySnapshotStore::failing().save(&formation).is_err());
    }

    #[test]
    fn test_roster_provider_lookup() {
        let roster = Roster::new(vec![Entity::new(1, "Park", Role::CM)]).unwrap();
        let provider = InMemoryRoster::new(roster);
        assert_eq!(provider.entity(EntityId(1)).unwrap().name, "Park");
        assert!(provider.entity(EntityId(2)).is_err());
    }

    #[test]
    fn test_channel_broadcaster_delivers() {
        let (broadcaster, rx) = ChannelBroadcaster::channel();
        let delta = Delta::new(
            FormationId::new(),
            1,
            ParticipantId::new("a"),
            DeltaOp::Unassign { slot: SlotId(0) },
        );
        broadcaster.broadcast(&delta, Some(&ParticipantId::new("a"))).unwrap();
        let got = rx.recv().unwrap();
        assert_eq!(got.delta, delta);
        assert_eq!(got.exclude, Some(ParticipantId::new("a")));

        drop(rx);
        assert!(broadcaster.broadcast(&delta, None).is_err());
    }
}
