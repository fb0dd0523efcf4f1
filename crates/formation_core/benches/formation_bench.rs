use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use formation_core::chemistry::ChemistryGraph;
use formation_core::model::EntityAttributes;
use formation_core::{
    auto_assign, optimize_formation, AssignOptions, CancelToken, EditorConfig, Entity, EntityId, Formation,
    FormationTemplate, Roster, SlotId,
};
use std::hint::black_box;

/// Squad of `size` entities cycling through the template's roles.
fn squad(template: FormationTemplate, size: u32) -> (Formation, Roster) {
    let formation = Formation::from_template("Bench", template);
    let roles: Vec<_> = formation.slots.iter().map(|s| s.role).collect();
    let entities: Vec<Entity> = (0..size)
        .map(|i| {
            Entity::new(i + 1, format!("P{}", i + 1), roles[i as usize % roles.len()])
                .with_attributes(EntityAttributes::uniform(40 + (i * 7 % 50) as u8))
        })
        .collect();
    let roster = Roster::new(entities).expect("bench roster");
    (formation, roster)
}

fn filled(template: FormationTemplate) -> (Formation, Roster) {
    let (mut formation, roster) = squad(template, 11);
    for i in 0..11u32 {
        formation.assign(SlotId(i), EntityId(i + 1)).expect("assign");
    }
    (formation, roster)
}

fn bench_auto_assign(c: &mut Criterion) {
    let config = EditorConfig::default();
    let mut group = c.benchmark_group("auto_assign");
    for size in [11u32, 23, 40] {
        let (formation, roster) = squad(FormationTemplate::F433, size);
        let pool = roster.ids();
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                auto_assign(
                    black_box(&formation),
                    &roster,
                    &pool,
                    &config.assignment,
                    &config.chemistry,
                    &AssignOptions::default(),
                )
            })
        });
    }
    group.finish();
}

fn bench_chemistry(c: &mut Criterion) {
    let config = EditorConfig::default();
    let (formation, roster) = filled(FormationTemplate::F442);
    c.bench_function("chemistry_rebuild", |b| {
        b.iter(|| ChemistryGraph::build(config.chemistry.clone(), black_box(&formation), &roster))
    });
    let graph = ChemistryGraph::build(config.chemistry.clone(), &formation, &roster);
    c.bench_function("chemistry_recompute_entity", |b| {
        b.iter_batched(
            || graph.clone(),
            |mut g| g.recompute_entity(&formation, &roster, EntityId(6)),
            BatchSize::SmallInput,
        )
    });
}

fn bench_optimize(c: &mut Criterion) {
    let config = EditorConfig::quick();
    let mut group = c.benchmark_group("optimize_formation");
    group.sample_size(10);
    for template in [FormationTemplate::F442, FormationTemplate::F352] {
        let (formation, roster) = filled(template);
        group.bench_function(template.code(), |b| {
            b.iter(|| optimize_formation(black_box(&formation), &roster, &config, &CancelToken::new()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_auto_assign, bench_chemistry, bench_optimize);
criterion_main!(benches);
