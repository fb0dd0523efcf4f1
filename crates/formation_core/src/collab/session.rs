use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, info};

use crate::config::CollaborationConfig;
use crate::error::{FormationError, Result};
use crate::model::{FormationId, ParticipantId, Position, SlotId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SlotLock {
    pub owner: ParticipantId,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SlotLock {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LockOutcome {
    Granted { expires_at: DateTime<Utc> },
    /// Held by someone else; 1-based place in the waiting line
    Queued { position: usize },
    /// Held by someone else and the waiting line is full
    Rejected { holder: ParticipantId, expires_at: DateTime<Utc> },
}

impl LockOutcome {
    /// `Rejected` as a `LockUnavailable` error.
    pub fn into_result(self, slot: SlotId) -> Result<LockOutcome> {
        match self {
            LockOutcome::Rejected { holder, expires_at } => {
                Err(FormationError::LockUnavailable { slot, holder, expires_at })
            }
            other => Ok(other),
        }
    }
}

/// A waiter promoted to owner after a release or expiry.
#[derive(Debug, Clone, PartialEq)]
pub struct LockGrant {
    pub slot: SlotId,
    pub owner: ParticipantId,
    pub expires_at: DateTime<Utc>,
}

/// Result of a lock-table sweep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LockSweep {
    pub expired: Vec<(SlotId, ParticipantId)>,
    pub granted: Vec<LockGrant>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    /// Live pointer position for presence display
    pub cursor: Option<Position>,
    pub last_seen_revision: u64,
    pub joined_at: DateTime<Utc>,
}

/// Presence and advisory lock state of everyone editing one formation.
///
/// Invariant: a slot lock has at most one owner; expired locks count as free.
#[derive(Debug, Clone)]
pub struct CollaborationSession {
    formation_id: FormationId,
    config: CollaborationConfig,
    participants: BTreeMap<ParticipantId, Participant>,
    locks: BTreeMap<SlotId, SlotLock>,
    waiters: BTreeMap<SlotId, VecDeque<ParticipantId>>,
}

impl CollaborationSession {
    pub fn new(formation_id: FormationId, config: CollaborationConfig) -> Self {
        Self {
            formation_id,
            config,
            participants: BTreeMap::new(),
            locks: BTreeMap::new(),
            waiters: BTreeMap::new(),
        }
    }

    pub fn formation_id(&self) -> FormationId {
        self.formation_id
    }

    fn ttl(&self) -> Duration {
        Duration::seconds(self.config.lock_ttl_secs)
    }

    // ------------------------------------------------------------------
    // Presence
    // ------------------------------------------------------------------

    /// Returns `false` when the participant was already present.
    pub fn join(&mut self, id: ParticipantId, revision: u64, now: DateTime<Utc>) -> bool {
        if let Some(p) = self.participants.get_mut(&id) {
            p.last_seen_revision = p.last_seen_revision.max(revision);
            return false;
        }
        info!(participant = %id, formation = %self.formation_id, "participant joined");
        self.participants.insert(
            id.clone(),
            Participant { id, cursor: None, last_seen_revision: revision, joined_at: now },
        );
        true
    }

    /// Remove a participant, releasing their locks and queue places.
    pub fn leave(&mut self, id: &ParticipantId, now: DateTime<Utc>) -> Vec<LockGrant> {
        if self.participants.remove(id).is_none() {
            return Vec::new();
        }
        for queue in self.waiters.values_mut() {
            queue.retain(|w| w != id);
        }
        let held: Vec<SlotId> =
            self.locks.iter().filter(|(_, l)| &l.owner == id).map(|(s, _)| *s).collect();
        let mut grants = Vec::new();
        for slot in held {
            self.locks.remove(&slot);
            grants.extend(self.promote(slot, now));
        }
        self.waiters.retain(|_, q| !q.is_empty());
        info!(participant = %id, remaining = self.participants.len(), "participant left");
        grants
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn participant(&self, id: &ParticipantId) -> Option<&Participant> {
        self.participants.get(id)
    }

    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    fn require(&mut self, id: &ParticipantId) -> Result<&mut Participant> {
        self.participants
            .get_mut(id)
            .ok_or_else(|| FormationError::NotFound(format!("participant {}", id)))
    }

    pub fn set_cursor(&mut self, id: &ParticipantId, cursor: Position) -> Result<()> {
        self.require(id)?.cursor = Some(cursor);
        Ok(())
    }

    /// Record that `id` has seen `revision`. Never moves backwards.
    pub fn acknowledge(&mut self, id: &ParticipantId, revision: u64) -> Result<()> {
        let p = self.require(id)?;
        p.last_seen_revision = p.last_seen_revision.max(revision);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Locks
    // ------------------------------------------------------------------

    /// Active (unexpired) lock on `slot`.
    pub fn lock_holder(&self, slot: SlotId, now: DateTime<Utc>) -> Option<&SlotLock> {
        self.locks.get(&slot).filter(|l| !l.is_expired(now))
    }

    pub fn acquire_lock(&mut self, id: &ParticipantId, slot: SlotId, now: DateTime<Utc>) -> Result<LockOutcome> {
        self.require(id)?;
        self.expire_locks(now);

        let holder = self.locks.get(&slot).map(|l| (l.owner.clone(), l.expires_at));
        match holder {
            None => {
                let expires_at = now + self.ttl();
                self.locks.insert(slot, SlotLock { owner: id.clone(), acquired_at: now, expires_at });
                if let Some(q) = self.waiters.get_mut(&slot) {
                    q.retain(|w| w != id);
                }
                debug!(participant = %id, slot = %slot, "lock granted");
                Ok(LockOutcome::Granted { expires_at })
            }
            Some((owner, _)) if &owner == id => {
                // Re-acquire refreshes the lease
                let expires_at = now + self.ttl();
                if let Some(lock) = self.locks.get_mut(&slot) {
                    lock.expires_at = expires_at;
                }
                Ok(LockOutcome::Granted { expires_at })
            }
            Some((owner, expires_at)) => {
                let queue = self.waiters.entry(slot).or_default();
                if let Some(idx) = queue.iter().position(|w| w == id) {
                    return Ok(LockOutcome::Queued { position: idx + 1 });
                }
                if queue.len() >= self.config.max_queued {
                    debug!(participant = %id, slot = %slot, holder = %owner, "lock rejected");
                    return Ok(LockOutcome::Rejected { holder: owner, expires_at });
                }
                queue.push_back(id.clone());
                Ok(LockOutcome::Queued { position: queue.len() })
            }
        }
    }

    /// Release a held lock; the next waiter (if any) takes it over.
    pub fn release_lock(&mut self, id: &ParticipantId, slot: SlotId, now: DateTime<Utc>) -> Result<Option<LockGrant>> {
        match self.locks.get(&slot) {
            Some(lock) if &lock.owner == id => {
                self.locks.remove(&slot);
                debug!(participant = %id, slot = %slot, "lock released");
                Ok(self.promote(slot, now))
            }
            Some(lock) if !lock.is_expired(now) => Err(FormationError::validation(format!(
                "slot {} is locked by {}, not {}",
                slot, lock.owner, id
            ))),
            _ => {
                // Not held (or lapsed): leave the waiting line if queued
                if let Some(q) = self.waiters.get_mut(&slot) {
                    q.retain(|w| w != id);
                }
                Ok(None)
            }
        }
    }

    /// Extend every lock held by `id`. Returns how many were refreshed.
    pub fn heartbeat(&mut self, id: &ParticipantId, now: DateTime<Utc>) -> Result<usize> {
        self.require(id)?;
        let expires_at = now + self.ttl();
        let mut refreshed = 0;
        for lock in self.locks.values_mut() {
            if &lock.owner == id && !lock.is_expired(now) {
                lock.expires_at = expires_at;
                refreshed += 1;
            }
        }
        Ok(refreshed)
    }

    /// Drop lapsed locks and hand them to the next waiter.
    pub fn expire_locks(&mut self, now: DateTime<Utc>) -> LockSweep {
        let lapsed: Vec<(SlotId, ParticipantId)> = self
            .locks
            .iter()
            .filter(|(_, l)| l.is_expired(now))
            .map(|(s, l)| (*s, l.owner.clone()))
            .collect();
        let mut sweep = LockSweep::default();
        for (slot, owner) in lapsed {
            self.locks.remove(&slot);
            info!(slot = %slot, owner = %owner, "lock expired");
            sweep.expired.push((slot, owner));
            sweep.granted.extend(self.promote(slot, now));
        }
        sweep
    }

    /// Slots with an active lock held by anyone other than `id`.
    pub fn foreign_locks(&self, id: &ParticipantId, now: DateTime<Utc>) -> Vec<(SlotId, &SlotLock)> {
        self.locks
            .iter()
            .filter(|(_, l)| &l.owner != id && !l.is_expired(now))
            .map(|(s, l)| (*s, l))
            .collect()
    }

    /// `LockUnavailable` when another participant holds an active lock on `slot`.
    pub fn check_edit(&self, id: &ParticipantId, slot: SlotId, now: DateTime<Utc>) -> Result<()> {
        match self.lock_holder(slot, now) {
            Some(lock) if &lock.owner != id => Err(FormationError::LockUnavailable {
                slot,
                holder: lock.owner.clone(),
                expires_at: lock.expires_at,
            }),
            _ => Ok(()),
        }
    }

    fn promote(&mut self, slot: SlotId, now: DateTime<Utc>) -> Option<LockGrant> {
        let queue = self.waiters.get_mut(&slot)?;
        let mut next = None;
        while let Some(candidate) = queue.pop_front() {
            if self.participants.contains_key(&candidate) {
                next = Some(candidate);
                break;
            }
        }
        if queue.is_empty() {
            self.waiters.remove(&slot);
        }
        let owner = next?;
        let expires_at = now + self.ttl();
        self.locks.insert(slot, SlotLock { owner: owner.clone(), acquired_at: now, expires_at });
        debug!(participant = %owner, slot = %slot, "queued lock granted");
        Some(LockGrant { slot, owner, expires_at })
    }
}
