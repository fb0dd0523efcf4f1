//! Auto-assignment tests: completeness, determinism, infeasibility, availability.

use proptest::prelude::*;
use std::collections::BTreeSet;

use crate::config::{AssignmentConfig, ChemistryWeights};
use crate::error::FormationError;
use crate::model::{
    Availability, Entity, EntityAttributes, EntityId, Formation, FormationTemplate, Position, Role,
    Roster, Slot, SlotId,
};
use crate::optimizer::{auto_assign, AssignOptions};

fn squad_for(formation: &Formation) -> Vec<Entity> {
    formation
        .slots
        .iter()
        .enumerate()
        .map(|(i, s)| Entity::new(i as u32 + 1, format!("P{}", i + 1), s.role))
        .collect()
}

fn assign_all(formation: &Formation, roster: &Roster) -> crate::error::Result<crate::optimizer::AssignmentPlan> {
    auto_assign(
        formation,
        roster,
        &roster.ids(),
        &AssignmentConfig::default(),
        &ChemistryWeights::default(),
        &AssignOptions::default(),
    )
}

#[test]
fn test_eleven_for_eleven_fills_every_slot_once() {
    let f = Formation::from_template("Full", FormationTemplate::F442);
    let roster = Roster::new(squad_for(&f)).unwrap();

    let plan = assign_all(&f, &roster).unwrap();

    assert_eq!(plan.assignments.len(), 11);
    let distinct: BTreeSet<EntityId> = plan.assignments.values().copied().collect();
    assert_eq!(distinct.len(), 11);
    assert_eq!(plan.assignments[&SlotId(0)], EntityId(1), "keeper stays in goal");
    assert_eq!(plan.slot_scores.len(), 11);
    assert!(plan.total_score > 0.0);

    let mut applied = f.clone();
    let displaced = plan.apply(&mut applied).unwrap();
    assert!(displaced.is_empty());
    assert!(applied.empty_slots().is_empty());
}

#[test]
fn test_small_pool_names_unfilled_slots() {
    let f = Formation::from_template("Short", FormationTemplate::F442);
    let mut entities: Vec<Entity> = squad_for(&f).into_iter().take(9).collect();
    entities.push(Entity::new(50, "Hurt", Role::ST).with_availability(Availability::Injured));
    entities.push(Entity::new(51, "Banned", Role::ST).with_availability(Availability::Suspended));
    let roster = Roster::new(entities).unwrap();

    match assign_all(&f, &roster) {
        Err(FormationError::AssignmentInfeasible { unfilled, available, required }) => {
            assert_eq!(available, 9);
            assert_eq!(required, 11);
            assert_eq!(unfilled, vec![SlotId(9), SlotId(10)]);
        }
        other => panic!("expected AssignmentInfeasible, got {:?}", other),
    }
}

#[test]
fn test_injured_keeper_is_skipped() {
    let f = Formation::from_template("Keepers", FormationTemplate::F433);
    let mut entities = squad_for(&f);
    let mut strong = EntityAttributes::uniform(50);
    strong.goalkeeping = 95;
    entities[0] = entities[0].clone().with_attributes(strong).with_availability(Availability::Injured);
    entities.push(Entity::new(30, "Backup", Role::GK));
    let roster = Roster::new(entities).unwrap();

    let plan = assign_all(&f, &roster).unwrap();
    assert_eq!(plan.assignments[&SlotId(0)], EntityId(30));
}

#[test]
fn test_exact_tie_goes_to_lower_id() {
    let slots = vec![Slot::new(SlotId(0), Role::CM, Position::new(50.0, 50.0))];
    let f = Formation::with_slots("One", slots).unwrap();
    let roster = Roster::new(vec![Entity::new(5, "Five", Role::CM), Entity::new(3, "Three", Role::CM)]).unwrap();

    let plan = assign_all(&f, &roster).unwrap();
    assert_eq!(plan.assignments[&SlotId(0)], EntityId(3));
}

#[test]
fn test_higher_rated_entity_wins() {
    let slots = vec![Slot::new(SlotId(0), Role::ST, Position::new(50.0, 80.0))];
    let f = Formation::with_slots("One", slots).unwrap();
    let roster = Roster::new(vec![
        Entity::new(1, "Average", Role::ST),
        Entity::new(2, "Sharp", Role::ST).with_attributes(EntityAttributes::uniform(70)),
    ])
    .unwrap();

    let plan = assign_all(&f, &roster).unwrap();
    assert_eq!(plan.assignments[&SlotId(0)], EntityId(2));
}

#[test]
fn test_keep_existing_preserves_manual_choice() {
    let mut f = Formation::from_template("Manual", FormationTemplate::F442);
    let mut entities = squad_for(&f);
    entities.push(Entity::new(40, "Utility", Role::CM));
    f.assign(SlotId(3), EntityId(40)).unwrap();
    let roster = Roster::new(entities).unwrap();

    let plan = auto_assign(
        &f,
        &roster,
        &roster.ids(),
        &AssignmentConfig::default(),
        &ChemistryWeights::default(),
        &AssignOptions { keep_existing: true },
    )
    .unwrap();

    assert_eq!(plan.assignments[&SlotId(3)], EntityId(40));
    assert_eq!(plan.assignments.len(), 11);
}

#[test]
fn test_unknown_pool_entry_is_not_found() {
    let f = Formation::from_template("X", FormationTemplate::F442);
    let roster = Roster::new(squad_for(&f)).unwrap();
    let err = auto_assign(
        &f,
        &roster,
        &[EntityId(999)],
        &AssignmentConfig::default(),
        &ChemistryWeights::default(),
        &AssignOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, FormationError::NotFound(_)));
}

fn arb_pool() -> impl Strategy<Value = Vec<Entity>> {
    prop::collection::vec((0usize..Role::ALL.len(), 30u8..90, 30u8..90, 1u8..=5), 11..18).prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (role, skill, keeper, morale))| {
                let mut attrs = EntityAttributes::uniform(skill);
                attrs.goalkeeping = keeper;
                Entity::new(i as u32 + 1, format!("E{}", i + 1), Role::ALL[role])
                    .with_attributes(attrs)
                    .with_morale(morale)
            })
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_auto_assign_is_deterministic(pool in arb_pool(), template_idx in 0usize..FormationTemplate::ALL.len()) {
        let f = Formation::from_template("P", FormationTemplate::ALL[template_idx]);
        let roster = Roster::new(pool).unwrap();
        let mut reversed = roster.ids();
        reversed.reverse();

        let a = assign_all(&f, &roster).unwrap();
        let b = auto_assign(
            &f,
            &roster,
            &reversed,
            &AssignmentConfig::default(),
            &ChemistryWeights::default(),
            &AssignOptions::default(),
        )
        .unwrap();

        prop_assert_eq!(&a, &b);
        let distinct: BTreeSet<EntityId> = a.assignments.values().copied().collect();
        prop_assert_eq!(distinct.len(), f.slots.len());
    }
}
