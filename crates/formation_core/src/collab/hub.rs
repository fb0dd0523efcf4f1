use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::mpsc::Receiver;
use tracing::{debug, info, warn};

use super::delta::Delta;
use super::session::{CollaborationSession, LockOutcome, LockSweep};
use crate::collaborators::{DeltaBroadcaster, Notifier};
use crate::editor::{EditCommand, FormationEditor};
use crate::error::{FormationError, Result};
use crate::model::{FormationId, FormationRecord, ParticipantId, Position, SlotId};
use crate::optimizer::{CancelToken, OptimizationStatus};

/// Inbound collaboration traffic for one formation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionMessage {
    Join { participant: ParticipantId },
    Leave { participant: ParticipantId },
    CursorMoved { participant: ParticipantId, position: Position },
    LockRequest { participant: ParticipantId, slot: SlotId },
    LockRelease { participant: ParticipantId, slot: SlotId },
    Heartbeat { participant: ParticipantId },
    /// Participant has caught up to `revision`
    Ack { participant: ParticipantId, revision: u64 },
    /// Delta produced by another replica; the sender is `delta.author`
    Delta { delta: Delta },
    Edit { participant: ParticipantId, command: EditCommand },
    Optimize { participant: ParticipantId },
    /// Periodic lock expiry sweep
    Tick,
}

/// User-visible signal for one participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    Welcome { revision: u64, formation: FormationRecord },
    LockGranted { slot: SlotId, expires_at: DateTime<Utc> },
    LockQueued { slot: SlotId, position: usize },
    LockRejected { slot: SlotId, holder: ParticipantId, expires_at: DateTime<Utc> },
    LockReleased { slot: SlotId },
    LockExpired { slot: SlotId },
    /// The sender's delta lost; `formation` is the state to re-derive from
    Conflict { expected: u64, received: u64, current: u64, formation: FormationRecord },
    Rejected { code: String, message: String },
    EditApplied { revision: u64 },
    OptimizationFinished { delta: f32, status: OptimizationStatus, partial: bool, committed: bool },
}

impl Notification {
    fn rejected(err: &FormationError) -> Self {
        Notification::Rejected { code: err.code().to_string(), message: err.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Broadcast { delta: Delta, exclude: Option<ParticipantId> },
    Notify { to: ParticipantId, notification: Notification },
    /// Last participant left; the formation is back in single-writer mode
    SessionClosed { formation: FormationId },
}

fn notify(to: &ParticipantId, notification: Notification) -> SessionEvent {
    SessionEvent::Notify { to: to.clone(), notification }
}

/// Single-threaded processor for one formation's collaboration traffic.
///
/// Messages are handled strictly in arrival order; every outcome is returned as
/// events so the conflict logic can be tested without a transport.
#[derive(Debug)]
pub struct SessionHub {
    editor: FormationEditor,
    session: Option<CollaborationSession>,
}

impl SessionHub {
    pub fn new(editor: FormationEditor) -> Self {
        Self { editor, session: None }
    }

    pub fn editor(&self) -> &FormationEditor {
        &self.editor
    }

    pub fn into_editor(self) -> FormationEditor {
        self.editor
    }

    /// `None` while nobody has joined (single-writer mode).
    pub fn session(&self) -> Option<&CollaborationSession> {
        self.session.as_ref()
    }

    pub fn process(&mut self, message: SessionMessage, now: DateTime<Utc>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        match message {
            SessionMessage::Join { participant } => self.on_join(participant, now, &mut events),
            SessionMessage::Leave { participant } => self.on_leave(&participant, now, &mut events),
            SessionMessage::CursorMoved { participant, position } => {
                if let Err(e) = self.session_mut().and_then(|s| s.set_cursor(&participant, position)) {
                    events.push(notify(&participant, Notification::rejected(&e)));
                }
            }
            SessionMessage::LockRequest { participant, slot } => {
                self.sweep(now, &mut events);
                self.on_lock_request(&participant, slot, now, &mut events);
            }
            SessionMessage::LockRelease { participant, slot } => {
                match self.session_mut().and_then(|s| s.release_lock(&participant, slot, now)) {
                    Ok(grant) => {
                        events.push(notify(&participant, Notification::LockReleased { slot }));
                        if let Some(g) = grant {
                            events.push(notify(
                                &g.owner,
                                Notification::LockGranted { slot: g.slot, expires_at: g.expires_at },
                            ));
                        }
                    }
                    Err(e) => events.push(notify(&participant, Notification::rejected(&e))),
                }
            }
            SessionMessage::Heartbeat { participant } => {
                self.sweep(now, &mut events);
                if let Err(e) = self.session_mut().and_then(|s| s.heartbeat(&participant, now)) {
                    events.push(notify(&participant, Notification::rejected(&e)));
                }
            }
            SessionMessage::Ack { participant, revision } => {
                if let Err(e) = self.session_mut().and_then(|s| s.acknowledge(&participant, revision)) {
                    events.push(notify(&participant, Notification::rejected(&e)));
                }
            }
            SessionMessage::Delta { delta } => self.on_remote_delta(delta, &mut events),
            SessionMessage::Edit { participant, command } => {
                self.sweep(now, &mut events);
                self.on_edit(&participant, &command, now, &mut events);
            }
            SessionMessage::Optimize { participant } => {
                self.sweep(now, &mut events);
                self.on_optimize(&participant, now, &mut events);
            }
            SessionMessage::Tick => self.sweep(now, &mut events),
        }
        events
    }

    fn session_mut(&mut self) -> Result<&mut CollaborationSession> {
        self.session
            .as_mut()
            .ok_or_else(|| FormationError::NotFound("no active collaboration session".to_string()))
    }

    fn on_join(&mut self, participant: ParticipantId, now: DateTime<Utc>, events: &mut Vec<SessionEvent>) {
        let revision = self.editor.revision();
        let id = self.editor.id();
        let collaboration = self.editor.config().collaboration.clone();
        let session = self.session.get_or_insert_with(|| {
            info!(formation = %id, "collaboration session created");
            CollaborationSession::new(id, collaboration)
        });
        session.join(participant.clone(), revision, now);
        events.push(notify(
            &participant,
            Notification::Welcome { revision, formation: self.editor.formation().to_record() },
        ));
    }

    fn on_leave(&mut self, participant: &ParticipantId, now: DateTime<Utc>, events: &mut Vec<SessionEvent>) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        for grant in session.leave(participant, now) {
            events.push(notify(
                &grant.owner,
                Notification::LockGranted { slot: grant.slot, expires_at: grant.expires_at },
            ));
        }
        if session.is_empty() {
            self.session = None;
            info!(formation = %self.editor.id(), "collaboration session closed");
            events.push(SessionEvent::SessionClosed { formation: self.editor.id() });
        }
    }

    fn on_lock_request(
        &mut self,
        participant: &ParticipantId,
        slot: SlotId,
        now: DateTime<Utc>,
        events: &mut Vec<SessionEvent>,
    ) {
        if self.editor.formation().slot(slot).is_none() {
            let err = FormationError::NotFound(format!("slot {}", slot));
            events.push(notify(participant, Notification::rejected(&err)));
            return;
        }
        let notification = match self.session_mut().and_then(|s| s.acquire_lock(participant, slot, now)) {
            Ok(LockOutcome::Granted { expires_at }) => Notification::LockGranted { slot, expires_at },
            Ok(LockOutcome::Queued { position }) => Notification::LockQueued { slot, position },
            Ok(LockOutcome::Rejected { holder, expires_at }) => {
                Notification::LockRejected { slot, holder, expires_at }
            }
            Err(e) => Notification::rejected(&e),
        };
        events.push(notify(participant, notification));
    }

    fn on_remote_delta(&mut self, delta: Delta, events: &mut Vec<SessionEvent>) {
        let author = delta.author.clone();
        match self.editor.apply_remote_delta(&delta) {
            Ok(revision) => {
                if let Some(session) = self.session.as_mut() {
                    // Sender may be a replica that never joined this hub
                    let _ = session.acknowledge(&author, revision);
                }
                events.push(SessionEvent::Broadcast { delta, exclude: Some(author.clone()) });
                events.push(notify(&author, Notification::EditApplied { revision }));
            }
            Err(FormationError::ConcurrencyConflict { expected, received, current }) => {
                warn!(author = %author, expected, received, current, "concurrency conflict");
                events.push(notify(
                    &author,
                    Notification::Conflict {
                        expected,
                        received,
                        current,
                        formation: self.editor.formation().to_record(),
                    },
                ));
            }
            Err(e) => events.push(notify(&author, Notification::rejected(&e))),
        }
    }

    /// Joined participants may only touch slots nobody else holds; whole
    /// formation edits need every foreign lock to be gone.
    fn check_locks(
        &self,
        participant: &ParticipantId,
        slots: Option<Vec<SlotId>>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let Some(session) = self.session.as_ref() else {
            return Ok(());
        };
        if session.participant(participant).is_none() {
            return Err(FormationError::NotFound(format!("participant {} has not joined", participant)));
        }
        match slots {
            Some(slots) => slots.into_iter().try_for_each(|slot| session.check_edit(participant, slot, now)),
            None => match session.foreign_locks(participant, now).first() {
                Some((slot, lock)) => Err(FormationError::LockUnavailable {
                    slot: *slot,
                    holder: lock.owner.clone(),
                    expires_at: lock.expires_at,
                }),
                None => Ok(()),
            },
        }
    }

    fn on_edit(
        &mut self,
        participant: &ParticipantId,
        command: &EditCommand,
        now: DateTime<Utc>,
        events: &mut Vec<SessionEvent>,
    ) {
        let targets = command.target_slots(self.editor.formation());
        let result = self
            .check_locks(participant, targets, now)
            .and_then(|_| self.editor.execute(command, participant));
        match result {
            Ok(Some(delta)) => {
                let revision = delta.revision;
                if let Some(session) = self.session.as_mut() {
                    let _ = session.acknowledge(participant, revision);
                }
                debug!(participant = %participant, command = command.label(), revision, "edit applied");
                events.push(SessionEvent::Broadcast { delta, exclude: Some(participant.clone()) });
                events.push(notify(participant, Notification::EditApplied { revision }));
            }
            Ok(None) => {}
            Err(e) => {
                debug!(participant = %participant, command = command.label(), error = %e, "edit rejected");
                events.push(notify(participant, Notification::rejected(&e)));
            }
        }
    }

    fn on_optimize(&mut self, participant: &ParticipantId, now: DateTime<Utc>, events: &mut Vec<SessionEvent>) {
        let result = self
            .check_locks(participant, None, now)
            .and_then(|_| self.editor.optimize_and_commit(&CancelToken::new(), participant));
        match result {
            Ok(outcome) => {
                let committed = outcome.delta.is_some();
                if let Some(delta) = outcome.delta {
                    events.push(SessionEvent::Broadcast { delta, exclude: Some(participant.clone()) });
                }
                events.push(notify(
                    participant,
                    Notification::OptimizationFinished {
                        delta: outcome.result.delta,
                        status: outcome.result.status,
                        partial: outcome.result.partial,
                        committed,
                    },
                ));
            }
            Err(e) => events.push(notify(participant, Notification::rejected(&e))),
        }
    }

    fn sweep(&mut self, now: DateTime<Utc>, events: &mut Vec<SessionEvent>) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let LockSweep { expired, granted } = session.expire_locks(now);
        for (slot, owner) in expired {
            events.push(notify(&owner, Notification::LockExpired { slot }));
        }
        for grant in granted {
            events.push(notify(
                &grant.owner,
                Notification::LockGranted { slot: grant.slot, expires_at: grant.expires_at },
            ));
        }
    }
}

/// Drive `hub` from `rx` until every sender is dropped, forwarding events to the
/// messaging and notification collaborators. Returns the hub for inspection.
pub fn run_session_loop(
    rx: Receiver<SessionMessage>,
    mut hub: SessionHub,
    broadcaster: &dyn DeltaBroadcaster,
    notifier: &dyn Notifier,
) -> SessionHub {
    for message in rx.iter() {
        for event in hub.process(message, Utc::now()) {
            match event {
                SessionEvent::Broadcast { delta, exclude } => {
                    if let Err(e) = broadcaster.broadcast(&delta, exclude.as_ref()) {
                        warn!(revision = delta.revision, error = %e, "delta broadcast failed");
                    }
                }
                SessionEvent::Notify { to, notification } => notifier.notify(&to, &notification),
                SessionEvent::SessionClosed { formation } => {
                    debug!(formation = %formation, "session loop idle");
                }
            }
        }
    }
    hub
}
