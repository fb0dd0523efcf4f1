//! Editor session tests: history, remote deltas, persistence, bulk edits.

use std::sync::Arc;

use crate::collab::DeltaOp;
use crate::collaborators::{InMemoryRoster, MemorySnapshotStore, SnapshotStore};
use crate::config::EditorConfig;
use crate::editor::{EditCommand, FormationEditor};
use crate::error::FormationError;
use crate::model::{
    Entity, EntityAttributes, EntityId, Formation, FormationTemplate, ParticipantId, Position,
    Role, Roster, SlotId,
};
use crate::optimizer::{AssignOptions, CancelToken};
use crate::spatial::MoveRequest;

fn roster() -> Roster {
    let f = Formation::from_template("Squad", FormationTemplate::F442);
    let mut entities: Vec<Entity> = f
        .slots
        .iter()
        .enumerate()
        .map(|(i, s)| {
            Entity::new(i as u32 + 1, format!("P{}", i + 1), s.role)
                .with_attributes(EntityAttributes::uniform(60 + i as u8))
                .with_club("Seoul", 12 + i as u16)
        })
        .collect();
    entities.push(Entity::new(12, "Bench CM", Role::CM));
    entities.push(Entity::new(13, "Bench ST", Role::ST));
    Roster::new(entities).unwrap()
}

fn assigned_formation() -> Formation {
    let mut f = Formation::from_template("Squad", FormationTemplate::F442);
    for i in 0..11u32 {
        f.assign(SlotId(i), EntityId(i + 1)).unwrap();
    }
    f
}

fn editor() -> FormationEditor {
    FormationEditor::new(assigned_formation(), roster(), EditorConfig::test()).unwrap()
}

fn me() -> ParticipantId {
    ParticipantId::new("coach")
}

#[test]
fn test_three_edits_two_undos_one_redo() {
    let mut ed = editor();
    let mut after = Vec::new();
    let mut revisions = vec![ed.revision()];
    for x in [38.0, 40.0, 42.0] {
        ed.propose_move(&MoveRequest::free(EntityId(7), Position::new(x, 45.0)), &me()).unwrap();
        after.push(ed.formation().clone());
        revisions.push(ed.revision());
    }

    ed.undo(&me()).unwrap().unwrap();
    revisions.push(ed.revision());
    ed.undo(&me()).unwrap().unwrap();
    revisions.push(ed.revision());
    assert!(ed.formation().layout_eq(&after[0]));

    ed.redo(&me()).unwrap().unwrap();
    revisions.push(ed.revision());
    assert!(ed.formation().layout_eq(&after[1]));

    assert!(revisions.windows(2).all(|w| w[1] > w[0]), "{:?}", revisions);
}

#[test]
fn test_undo_then_redo_restores_exact_layout() {
    let mut ed = editor();
    ed.unassign(SlotId(9), &me()).unwrap();
    ed.assign(SlotId(9), EntityId(13), &me()).unwrap();
    let before = ed.formation().clone();
    let chemistry_before = ed.chemistry().average();

    ed.undo(&me()).unwrap();
    assert!(ed.formation().slot(SlotId(9)).unwrap().is_empty());
    ed.redo(&me()).unwrap();
    assert!(ed.formation().layout_eq(&before));
    assert!((ed.chemistry().average() - chemistry_before).abs() < 1e-5);
}

#[test]
fn test_commit_after_undo_drops_redo_tail() {
    let mut ed = editor();
    ed.unassign(SlotId(10), &me()).unwrap();
    ed.undo(&me()).unwrap();
    assert!(ed.history().can_redo());
    ed.unassign(SlotId(9), &me()).unwrap();
    assert!(!ed.history().can_redo());
    assert!(ed.redo(&me()).unwrap().is_none());
}

#[test]
fn test_history_cursor_follows_restored_layout() {
    let mut ed = editor();
    ed.unassign(SlotId(9), &me()).unwrap();
    assert_eq!(ed.history().cursor(), 1);

    ed.undo(&me()).unwrap().unwrap();
    assert_eq!(ed.history().cursor(), 0);
    assert!(ed.formation().layout_eq(&ed.history().current().unwrap().snapshot));

    ed.redo(&me()).unwrap().unwrap();
    assert_eq!(ed.history().cursor(), 1);
    assert!(ed.formation().layout_eq(&ed.history().current().unwrap().snapshot));
}

#[test]
fn test_nothing_to_undo_is_a_no_op() {
    let mut ed = editor();
    let revision = ed.revision();
    assert!(ed.execute(&EditCommand::Undo, &me()).unwrap().is_none());
    assert_eq!(ed.revision(), revision);
}

#[test]
fn test_remote_deltas_converge() {
    let base = assigned_formation();
    let mut a = FormationEditor::new(base.clone(), roster(), EditorConfig::test()).unwrap();
    let mut b = FormationEditor::new(base, roster(), EditorConfig::test()).unwrap();

    let first = a.propose_move(&MoveRequest::free(EntityId(7), Position::new(38.0, 46.0)), &me()).unwrap();
    let second = a.unassign(SlotId(10), &me()).unwrap();

    assert_eq!(b.apply_remote_delta(&first.delta).unwrap(), 1);
    assert_eq!(b.apply_remote_delta(&second.delta).unwrap(), 2);
    assert!(a.formation().layout_eq(b.formation()));
    assert_eq!(b.history().current().unwrap().author, me());

    // Duplicate delivery
    assert!(matches!(
        b.apply_remote_delta(&second.delta),
        Err(FormationError::ConcurrencyConflict { expected: 3, received: 2, current: 2 })
    ));
}

#[test]
fn test_stale_delta_is_discarded() {
    let base = assigned_formation();
    let mut a = FormationEditor::new(base.clone(), roster(), EditorConfig::test()).unwrap();
    let mut b = FormationEditor::new(base, roster(), EditorConfig::test()).unwrap();
    for _ in 0..4 {
        a.propose_move(&MoveRequest::free(EntityId(2), Position::new(14.0, 26.0)), &me()).unwrap();
    }
    for _ in 0..4 {
        b.propose_move(&MoveRequest::free(EntityId(3), Position::new(36.0, 21.0)), &me()).unwrap();
    }
    assert_eq!(a.revision(), 4);

    // A moves to revision 5; B's revision-4 edit arrives afterward
    let b_edit = b.unassign(SlotId(9), &ParticipantId::new("b")).unwrap();
    a.unassign(SlotId(10), &me()).unwrap();
    assert_eq!(b_edit.delta.revision, 5);
    let stale = crate::collab::Delta { revision: 4, ..b_edit.delta };

    let snapshot = a.formation().clone();
    let err = a.apply_remote_delta(&stale).unwrap_err();
    assert_eq!(err, FormationError::ConcurrencyConflict { expected: 6, received: 4, current: 5 });
    assert_eq!(a.formation(), &snapshot);
}

#[test]
fn test_gapped_and_foreign_deltas_rejected() {
    let mut a = editor();
    let mut other = editor();
    let delta = other.unassign(SlotId(3), &me()).unwrap().delta;
    // Different formation id
    assert!(matches!(a.apply_remote_delta(&delta), Err(FormationError::Validation(_))));

    let mut b = FormationEditor::new(a.formation().clone(), roster(), EditorConfig::test()).unwrap();
    a.unassign(SlotId(3), &me()).unwrap();
    let gapped = a.unassign(SlotId(4), &me()).unwrap().delta;
    assert!(matches!(
        b.apply_remote_delta(&gapped),
        Err(FormationError::ConcurrencyConflict { expected: 1, received: 2, .. })
    ));
    assert_eq!(b.revision(), 0);
}

#[test]
fn test_remote_delta_with_unknown_entity_leaves_state() {
    let mut ed = editor();
    let delta = crate::collab::Delta::new(
        ed.id(),
        1,
        me(),
        DeltaOp::Assign { slot: SlotId(0), entity: EntityId(99) },
    );
    assert!(matches!(ed.apply_remote_delta(&delta), Err(FormationError::NotFound(_))));
    assert_eq!(ed.revision(), 0);
    assert_eq!(ed.formation().slot(SlotId(0)).unwrap().entity, Some(EntityId(1)));
}

#[test]
fn test_assign_displaces_occupant() {
    let mut ed = editor();
    let outcome = ed.assign(SlotId(6), EntityId(12), &me()).unwrap();
    assert_eq!(outcome.result.displaced, Some(EntityId(7)));
    assert_eq!(outcome.delta.op, DeltaOp::Assign { slot: SlotId(6), entity: EntityId(12) });
    assert!(!ed.formation().is_placed(EntityId(7)));
    assert!(ed.chemistry().edges_of(EntityId(7)).is_empty());
    assert_eq!(ed.chemistry().edges_of(EntityId(12)).len(), 10);
}

#[test]
fn test_assign_into_covered_slot_is_rejected() {
    let mut ed = editor();
    ed.unassign(SlotId(9), &me()).unwrap();
    // Free-place the bench striker right on the empty slot
    ed.propose_move(&MoveRequest::free(EntityId(13), Position::new(36.0, 78.0)), &me()).unwrap();
    let revision = ed.revision();

    let err = ed.assign(SlotId(9), EntityId(10), &me()).unwrap_err();
    assert!(matches!(err, FormationError::CollisionUnresolved { entity: EntityId(10), .. }));
    assert_eq!(ed.revision(), revision);
}

#[test]
fn test_unassign_empty_slot_is_validation_error() {
    let mut ed = editor();
    let outcome = ed.unassign(SlotId(5), &me()).unwrap();
    assert_eq!(outcome.result, EntityId(6));
    assert!(matches!(ed.unassign(SlotId(5), &me()), Err(FormationError::Validation(_))));
    assert!(matches!(ed.unassign(SlotId(40), &me()), Err(FormationError::NotFound(_))));
}

#[test]
fn test_auto_assign_commits_layout_delta() {
    let f = Formation::from_template("Empty", FormationTemplate::F442);
    let mut ed = FormationEditor::new(f, roster(), EditorConfig::test()).unwrap();
    let outcome = ed.auto_assign(&AssignOptions::default(), None, &me()).unwrap();

    assert!(ed.formation().empty_slots().is_empty());
    assert_eq!(outcome.result.plan.assignments.len(), 11);
    assert_eq!(outcome.delta.op.kind(), "optimize-commit");
    assert_eq!(outcome.delta.revision, ed.revision());
    assert_eq!(ed.history().len(), 2);
    assert_eq!(ed.chemistry().len(), 55);
}

#[test]
fn test_stale_optimization_is_a_conflict() {
    let mut ed = editor();
    let result = ed.optimize(&CancelToken::new()).unwrap();
    ed.unassign(SlotId(10), &me()).unwrap();
    assert!(matches!(
        ed.commit_optimization(&result, &me()),
        Err(FormationError::ConcurrencyConflict { .. })
    ));
}

#[test]
fn test_optimize_and_commit_never_regresses() {
    let mut ed = editor();
    ed.propose_move(&MoveRequest::free(EntityId(2), Position::new(15.0, 40.0)), &me()).unwrap();
    let before = ed.analyze().objective;
    let revision = ed.revision();

    let outcome = ed.optimize_and_commit(&CancelToken::new(), &me()).unwrap();
    assert!(ed.analyze().objective >= before - 1e-5);
    match outcome.delta {
        Some(delta) => {
            assert_eq!(delta.revision, revision + 1);
            assert!(outcome.result.improved());
        }
        None => assert_eq!(ed.revision(), revision),
    }
}

#[test]
fn test_snapshots_persisted_and_reopened() {
    let store = Arc::new(MemorySnapshotStore::new());
    let formation = assigned_formation();
    store.save(&formation).unwrap();

    let provider = InMemoryRoster::new(roster());
    let mut ed = FormationEditor::open(formation.id, store.clone(), &provider, EditorConfig::test()).unwrap();
    ed.unassign(SlotId(2), &me()).unwrap();
    assert_eq!(store.revision_of(formation.id), Some(1));

    let reopened = FormationEditor::open(formation.id, store, &provider, EditorConfig::test()).unwrap();
    assert!(reopened.formation().slot(SlotId(2)).unwrap().is_empty());
}

#[test]
fn test_store_failure_does_not_fail_edit() {
    let mut ed = editor().with_store(Arc::new(MemorySnapshotStore::failing()));
    assert!(ed.unassign(SlotId(1), &me()).is_ok());
    assert_eq!(ed.revision(), 1);
}

#[test]
fn test_attribute_update_touches_only_its_edges() {
    let mut ed = editor();
    let before = ed.chemistry_between(EntityId(6), EntityId(7)).unwrap();
    let updated = ed.roster().get(EntityId(7)).unwrap().clone().with_club("Busan", 40).with_morale(5);
    assert_eq!(ed.update_entity(updated).unwrap(), 10);
    let after = ed.chemistry_between(EntityId(6), EntityId(7)).unwrap();
    assert_ne!(before.score, after.score);
    assert_eq!(ed.revision(), 0);
}

#[test]
fn test_command_targets() {
    let ed = editor();
    let f = ed.formation();
    assert_eq!(
        EditCommand::Assign { slot: SlotId(1), entity: EntityId(3) }.target_slots(f),
        Some(vec![SlotId(1), SlotId(2)])
    );
    assert_eq!(EditCommand::Move(MoveRequest::free(EntityId(13), Position::new(50.0, 60.0))).target_slots(f), Some(vec![]));
    assert_eq!(EditCommand::Undo.target_slots(f), None);
}

#[test]
fn test_snap_move_targets_destination_slot() {
    let mut ed = editor();
    ed.unassign(SlotId(10), &me()).unwrap();
    let f = ed.formation();
    let anchor = f.slot(SlotId(10)).unwrap().anchor;
    let current = f.slot_of(EntityId(10)).unwrap().id;
    assert_eq!(
        EditCommand::Move(MoveRequest::snap(EntityId(10), anchor)).target_slots(f),
        Some(vec![current, SlotId(10)])
    );
    assert_eq!(EditCommand::Move(MoveRequest::free(EntityId(10), anchor)).target_slots(f), Some(vec![current]));
}

#[test]
fn test_auto_assign_reseats_covered_slot() {
    let mut ed = editor();
    let radius = ed.config().positioning.collision_radius;
    ed.unassign(SlotId(2), &me()).unwrap();
    let vacated = ed.formation().slot(SlotId(2)).unwrap().position;
    // Slot 1 drifts onto slot 2, then loses its occupant
    ed.propose_move(&MoveRequest::free(EntityId(2), vacated.offset(0.5, 0.0)).with_overlap(), &me())
        .unwrap();
    ed.unassign(SlotId(1), &me()).unwrap();

    ed.auto_assign(&AssignOptions::default(), None, &me()).unwrap();

    let placed = ed.formation().placed_entities();
    assert_eq!(ed.formation().assigned_entities().len(), 11);
    for (i, (a, pa)) in placed.iter().enumerate() {
        for (b, pb) in &placed[i + 1..] {
            assert!(pa.distance(pb) >= radius, "{} and {} are {} apart", a, b, pa.distance(pb));
        }
    }
}
