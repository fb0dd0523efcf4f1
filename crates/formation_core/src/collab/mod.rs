//! Collaboration Synchronizer
//!
//! Multi-editor state for one formation: presence, advisory slot locks with a
//! TTL, and revision-ordered delta exchange. Correctness rests on the revision
//! rule alone (a delta must carry exactly `local + 1`); locks only keep
//! editors from stepping on each other.

mod delta;
mod hub;
mod session;


pub use delta::{Delta, DeltaOp};
pub use hub::{run_session_loop, Notification, SessionEvent, SessionHub, SessionMessage};
pub use session::{CollaborationSession, LockGrant, LockOutcome, LockSweep, Participant, SlotLock};
