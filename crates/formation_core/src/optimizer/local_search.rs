//! Simulated annealing over positions and assignments.
//!
//! Perturbations:
//! - nudge: move one slot-bound entity by up to `max_step`
//! - swap: exchange the entities of two slots (role-compatible only)
//! - substitute: replace a slot's entity with a selectable bench entity
//!
//! Restarts run in parallel with independent seeds; the best candidate wins and
//! is never worse than the input.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::analysis::analyze_formation;
use crate::chemistry::ChemistryGraph;
use crate::config::EditorConfig;
use crate::error::Result;
use crate::model::{EntityId, FieldBounds, Formation, Position, Roster, SlotId};
use crate::spatial::SpatialGrid;

/// Improvements smaller than this do not reset patience.
const IMPROVEMENT_EPS: f32 = 1e-6;

/// Shared cancellation flag. Safe to trigger from any thread at any time.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationStatus {
    /// No improvement within `patience` iterations
    Converged,
    /// Iteration budget used up
    BudgetExhausted,
    /// Wall-clock budget used up
    TimedOut,
    Cancelled,
}

impl OptimizationStatus {
    fn severity(&self) -> u8 {
        match self {
            OptimizationStatus::Converged => 0,
            OptimizationStatus::BudgetExhausted => 1,
            OptimizationStatus::TimedOut => 2,
            OptimizationStatus::Cancelled => 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    /// Best layout found (revision unchanged; committing is the caller's job)
    pub formation: Formation,
    pub start_score: f32,
    pub best_score: f32,
    /// `best_score - start_score`, never negative
    pub delta: f32,
    /// Iterations across all restarts
    pub iterations: u64,
    pub status: OptimizationStatus,
    /// Search stopped before converging
    pub partial: bool,
}

impl OptimizationResult {
    pub fn improved(&self) -> bool {
        self.delta > IMPROVEMENT_EPS
    }
}

#[derive(Debug, Clone, Copy)]
enum Perturbation {
    Nudge { slot: SlotId, entity: EntityId, from: Position, to: Position },
    Swap { a: SlotId, b: SlotId },
    Substitute { slot: SlotId, outgoing: EntityId, incoming: EntityId, bench_idx: usize },
}

struct RestartOutcome {
    formation: Formation,
    score: f32,
    iterations: u64,
    status: OptimizationStatus,
}

/// Refine `formation` against the tactical objective.
pub fn optimize_formation(
    formation: &Formation,
    roster: &Roster,
    config: &EditorConfig,
    cancel: &CancelToken,
) -> Result<OptimizationResult> {
    config.validate()?;
    formation.validate(&config.positioning.bounds)?;

    let start_graph = ChemistryGraph::build(config.chemistry.clone(), formation, roster);
    let start_score = analyze_formation(formation, &start_graph, &config.objective).objective;
    let deadline = config.optimizer.time_budget_ms.map(|ms| Instant::now() + Duration::from_millis(ms));

    let outcomes: Vec<RestartOutcome> = (0..config.optimizer.restarts as usize)
        .into_par_iter()
        .map(|restart| {
            let mut search = Search::new(formation, roster, config, restart as u64, start_score);
            search.run(cancel, deadline)
        })
        .collect();

    let iterations = outcomes.iter().map(|o| o.iterations).sum();
    let status = outcomes
        .iter()
        .map(|o| o.status)
        .max_by_key(|s| s.severity())
        .unwrap_or(OptimizationStatus::Converged);

    // Earliest restart wins ties so parallel scheduling cannot change the result.
    let mut best: Option<RestartOutcome> = None;
    for outcome in outcomes {
        if best.as_ref().map_or(true, |b| outcome.score > b.score) {
            best = Some(outcome);
        }
    }

    let (best_formation, best_score) = match best {
        Some(b) if b.score > start_score + IMPROVEMENT_EPS => (b.formation, b.score),
        _ => (formation.clone(), start_score),
    };

    let result = OptimizationResult {
        formation: best_formation,
        start_score,
        best_score,
        delta: best_score - start_score,
        iterations,
        status,
        partial: status != OptimizationStatus::Converged,
    };
    info!(
        start = result.start_score,
        best = result.best_score,
        iterations = result.iterations,
        status = ?result.status,
        "optimization finished"
    );
    Ok(result)
}

/// One annealing run.
struct Search<'a> {
    roster: &'a Roster,
    config: &'a EditorConfig,
    restart: u64,
    rng: ChaCha8Rng,
    current: Formation,
    graph: ChemistryGraph,
    grid: SpatialGrid,
    bench: Vec<EntityId>,
    current_score: f32,
}

impl<'a> Search<'a> {
    fn new(start: &Formation, roster: &'a Roster, config: &'a EditorConfig, restart: u64, score: f32) -> Self {
        let bench = roster
            .iter()
            .filter(|e| e.availability.is_selectable() && !start.is_placed(e.id))
            .map(|e| e.id)
            .collect();
        Self {
            roster,
            config,
            restart,
            rng: ChaCha8Rng::seed_from_u64(config.optimizer.seed.wrapping_add(restart)),
            current: start.clone(),
            graph: ChemistryGraph::build(config.chemistry.clone(), start, roster),
            grid: SpatialGrid::from_formation(start, config.positioning.cell_size()),
            bench,
            current_score: score,
        }
    }

    fn run(&mut self, cancel: &CancelToken, deadline: Option<Instant>) -> RestartOutcome {
        let config: &'a EditorConfig = self.config;
        let opt = &config.optimizer;
        let mut best = self.current.clone();
        let mut best_score = self.current_score;
        let mut temperature = opt.initial_temperature;
        let mut stale = 0u32;
        let mut iterations = 0u64;
        let mut status = OptimizationStatus::BudgetExhausted;

        for _ in 0..opt.max_iterations {
            if cancel.is_cancelled() {
                status = OptimizationStatus::Cancelled;
                break;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                status = OptimizationStatus::TimedOut;
                break;
            }
            iterations += 1;

            if let Some(change) = self.propose() {
                self.apply(change);
                let score = self.score();
                let accept = score >= self.current_score || {
                    let loss = (self.current_score - score) as f64;
                    self.rng.gen::<f64>() < (-loss / temperature.max(1e-12)).exp()
                };
                if accept {
                    self.current_score = score;
                    if score > best_score + IMPROVEMENT_EPS {
                        best = self.current.clone();
                        best_score = score;
                        stale = 0;
                    } else {
                        stale += 1;
                    }
                } else {
                    self.revert(change);
                    stale += 1;
                }
            } else {
                stale += 1;
            }

            temperature *= opt.cooling;
            if stale >= opt.patience {
                status = OptimizationStatus::Converged;
                break;
            }
        }

        debug!(restart = self.restart, iterations, best = best_score, status = ?status, "restart done");
        RestartOutcome { formation: best, score: best_score, iterations, status }
    }

    fn score(&self) -> f32 {
        analyze_formation(&self.current, &self.graph, &self.config.objective).objective
    }

    fn region(&self, slot: SlotId) -> FieldBounds {
        let bounds = self.config.positioning.bounds;
        self.current
            .slot(slot)
            .and_then(|s| s.constraint)
            .and_then(|c| bounds.intersect(&c))
            .unwrap_or(bounds)
    }

    fn propose(&mut self) -> Option<Perturbation> {
        let assigned: Vec<(SlotId, EntityId)> =
            self.current.slots.iter().filter_map(|s| s.entity.map(|e| (s.id, e))).collect();
        if assigned.is_empty() {
            return None;
        }

        if self.rng.gen_bool(self.config.optimizer.swap_probability) {
            if !self.bench.is_empty() && self.rng.gen_bool(0.5) {
                self.propose_substitute(&assigned)
            } else {
                self.propose_swap(&assigned)
            }
        } else {
            self.propose_nudge(&assigned)
        }
    }

    fn propose_nudge(&mut self, assigned: &[(SlotId, EntityId)]) -> Option<Perturbation> {
        let (slot, entity) = assigned[self.rng.gen_range(0..assigned.len())];
        let from = self.current.slot(slot)?.position;
        let step = self.config.optimizer.max_step;
        let to = self
            .region(slot)
            .clamp(from.offset(self.rng.gen_range(-step..=step), self.rng.gen_range(-step..=step)));
        if to == from || !self.grid.is_clear(to, self.config.positioning.collision_radius, Some(entity)) {
            return None;
        }
        Some(Perturbation::Nudge { slot, entity, from, to })
    }

    fn propose_swap(&mut self, assigned: &[(SlotId, EntityId)]) -> Option<Perturbation> {
        if assigned.len() < 2 {
            return None;
        }
        let i = self.rng.gen_range(0..assigned.len());
        let mut j = self.rng.gen_range(0..assigned.len() - 1);
        if j >= i {
            j += 1;
        }
        let (slot_a, entity_a) = assigned[i];
        let (slot_b, entity_b) = assigned[j];
        let role_a = self.current.slot(slot_a)?.role;
        let role_b = self.current.slot(slot_b)?.role;
        let natural_a = self.roster.get(entity_a)?.natural_role;
        let natural_b = self.roster.get(entity_b)?.natural_role;
        if !natural_a.is_compatible(role_b) || !natural_b.is_compatible(role_a) {
            return None;
        }
        Some(Perturbation::Swap { a: slot_a, b: slot_b })
    }

    fn propose_substitute(&mut self, assigned: &[(SlotId, EntityId)]) -> Option<Perturbation> {
        let (slot, outgoing) = assigned[self.rng.gen_range(0..assigned.len())];
        let role = self.current.slot(slot)?.role;
        let options: Vec<usize> = self
            .bench
            .iter()
            .enumerate()
            .filter(|(_, id)| self.roster.get(**id).is_some_and(|e| e.natural_role.is_compatible(role)))
            .map(|(idx, _)| idx)
            .collect();
        if options.is_empty() {
            return None;
        }
        let bench_idx = options[self.rng.gen_range(0..options.len())];
        Some(Perturbation::Substitute { slot, outgoing, incoming: self.bench[bench_idx], bench_idx })
    }

    fn apply(&mut self, change: Perturbation) {
        match change {
            Perturbation::Nudge { slot, entity, to, .. } => self.place(slot, entity, to),
            Perturbation::Swap { a, b } => self.swap(a, b),
            Perturbation::Substitute { slot, outgoing, incoming, bench_idx } => {
                self.substitute(slot, outgoing, incoming, bench_idx)
            }
        }
    }

    fn revert(&mut self, change: Perturbation) {
        match change {
            Perturbation::Nudge { slot, entity, from, .. } => self.place(slot, entity, from),
            Perturbation::Swap { a, b } => self.swap(a, b),
            Perturbation::Substitute { slot, outgoing, incoming, bench_idx } => {
                self.substitute(slot, incoming, outgoing, bench_idx)
            }
        }
    }

    fn place(&mut self, slot: SlotId, entity: EntityId, pos: Position) {
        if let Some(s) = self.current.slot_mut(slot) {
            s.position = pos;
        }
        self.grid.insert(entity, pos);
        self.graph.recompute_entity(&self.current, self.roster, entity);
    }

    fn swap(&mut self, a: SlotId, b: SlotId) {
        let (Some(sa), Some(sb)) = (self.current.slot(a), self.current.slot(b)) else {
            return;
        };
        let (ea, pa, eb, pb) = (sa.entity, sa.position, sb.entity, sb.position);
        if let Some(s) = self.current.slot_mut(a) {
            s.entity = eb;
        }
        if let Some(s) = self.current.slot_mut(b) {
            s.entity = ea;
        }
        for (entity, pos) in [(ea, pb), (eb, pa)] {
            if let Some(e) = entity {
                self.grid.insert(e, pos);
                self.graph.recompute_entity(&self.current, self.roster, e);
            }
        }
    }

    /// `outgoing` leaves `slot` for the bench entry at `bench_idx`, `incoming` takes its place.
    fn substitute(&mut self, slot: SlotId, outgoing: EntityId, incoming: EntityId, bench_idx: usize) {
        let Some(s) = self.current.slot_mut(slot) else {
            return;
        };
        s.entity = Some(incoming);
        let pos = s.position;
        self.bench[bench_idx] = outgoing;
        self.grid.remove(outgoing);
        self.grid.insert(incoming, pos);
        self.graph.detach(outgoing);
        self.graph.recompute_entity(&self.current, self.roster, incoming);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Entity, EntityAttributes, FormationTemplate, Role};

    fn squad() -> (Formation, Roster) {
        let mut f = Formation::from_template("Opt", FormationTemplate::F433);
        let mut entities: Vec<Entity> = f
            .slots
            .iter()
            .enumerate()
            .map(|(i, s)| {
                Entity::new(i as u32 + 1, format!("P{}", i + 1), s.role)
                    .with_attributes(EntityAttributes::uniform(55 + (i as u8 * 3) % 30))
                    .with_club(if i < 6 { "Alpha" } else { "Beta" }, 24)
                    .with_age(22 + (i as u8 % 8))
            })
            .collect();
        entities.push(Entity::new(20, "Bench CM", Role::CM).with_club("Alpha", 30));
        entities.push(Entity::new(21, "Bench ST", Role::ST).with_club("Beta", 30));
        for i in 0..11u32 {
            f.assign(SlotId(i), EntityId(i + 1)).unwrap();
        }
        // Push the back line out of shape so there is something to improve.
        f.set_slot_position(SlotId(1), Position::new(15.0, 40.0)).unwrap();
        f.set_slot_position(SlotId(4), Position::new(85.0, 8.0)).unwrap();
        (f, Roster::new(entities).unwrap())
    }

    #[test]
    fn test_never_regresses_and_is_deterministic() {
        let (f, roster) = squad();
        let config = EditorConfig::test();
        let a = optimize_formation(&f, &roster, &config, &CancelToken::new()).unwrap();
        let b = optimize_formation(&f, &roster, &config, &CancelToken::new()).unwrap();

        assert!(a.best_score >= a.start_score);
        assert!(a.delta >= 0.0);
        assert_eq!(a.best_score, b.best_score);
        assert!(a.formation.layout_eq(&b.formation));
        assert_eq!(a.formation.revision, f.revision);
        assert!(a.formation.validate(&config.positioning.bounds).is_ok());
    }

    #[test]
    fn test_result_respects_collision_radius() {
        let (f, roster) = squad();
        let config = EditorConfig::test();
        let result = optimize_formation(&f, &roster, &config, &CancelToken::new()).unwrap();
        let placed = result.formation.placed_entities();
        for i in 0..placed.len() {
            for j in (i + 1)..placed.len() {
                assert!(placed[i].1.distance(&placed[j].1) >= config.positioning.collision_radius);
            }
        }
    }

    #[test]
    fn test_cancelled_before_start_returns_input_as_partial() {
        let (f, roster) = squad();
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = optimize_formation(&f, &roster, &EditorConfig::test(), &cancel).unwrap();
        assert_eq!(result.status, OptimizationStatus::Cancelled);
        assert!(result.partial);
        assert_eq!(result.delta, 0.0);
        assert!(result.formation.layout_eq(&f));
    }

    #[test]
    fn test_near_optimal_input_gains_little() {
        let (f, roster) = squad();
        let mut long = EditorConfig::test();
        long.optimizer.max_iterations = 1500;
        long.optimizer.patience = 300;
        let first = optimize_formation(&f, &roster, &long, &CancelToken::new()).unwrap();

        let config = EditorConfig::test();
        let second = optimize_formation(&first.formation, &roster, &config, &CancelToken::new()).unwrap();
        assert!(second.best_score >= second.start_score);
        assert!(second.delta < 0.05, "delta {}", second.delta);
        assert!(second.iterations <= config.optimizer.max_iterations as u64 * config.optimizer.restarts as u64);
    }

    #[test]
    fn test_zero_time_budget_times_out() {
        let (f, roster) = squad();
        let mut config = EditorConfig::test();
        config.optimizer.time_budget_ms = Some(0);
        let result = optimize_formation(&f, &roster, &config, &CancelToken::new()).unwrap();
        assert_eq!(result.status, OptimizationStatus::TimedOut);
        assert!(result.partial);
        assert!(result.best_score >= result.start_score);
    }
}
