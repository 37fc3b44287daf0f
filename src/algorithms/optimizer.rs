use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tokio::sync::broadcast;

use super::fitness::FitnessCalculator;
use crate::config::RunConfig;
use crate::models::{
    CatalogueSnapshot, ConstraintViolation, FitnessScore, Individual, ProgressRecord, Termination,
};

const HISTORY_PREALLOC: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Initialized,
    Running,
    Converged,
    BudgetExhausted,
    TimeExceeded,
    Done,
}

impl From<Termination> for EngineState {
    fn from(termination: Termination) -> Self {
        match termination {
            Termination::Converged => EngineState::Converged,
            Termination::BudgetExhausted => EngineState::BudgetExhausted,
            Termination::TimeExceeded => EngineState::TimeExceeded,
        }
    }
}

/// What one completed run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub best: Individual,
    pub score: FitnessScore,
    pub violations: Vec<ConstraintViolation>,
    pub termination: Termination,
    pub generations: usize,
    /// Elite fitness after each generation. Never increases.
    pub history: Vec<f64>,
    /// Room/slot draws spent on each pairing across initialization and mutation.
    pub attempts: Vec<u32>,
    pub seed: u64,
    pub elapsed: Duration,
}

pub struct GeneticEngine {
    population: Vec<Individual>,
    scores: Vec<FitnessScore>,
    best: Option<(Individual, FitnessScore)>,
    snapshot: Arc<CatalogueSnapshot>,
    config: RunConfig,
    rng: StdRng,
    seed: u64,
    attempts: Vec<u32>,
    history: Vec<f64>,
    state: EngineState,
    status_tx: Option<broadcast::Sender<ProgressRecord>>,
}

impl GeneticEngine {
    pub fn new(
        snapshot: Arc<CatalogueSnapshot>,
        config: RunConfig,
        status_tx: Option<broadcast::Sender<ProgressRecord>>,
    ) -> Self {
        let seed = config.seed.unwrap_or_else(|| rand::rng().random());
        let pairings = snapshot.pairings.len();

        GeneticEngine {
            population: Vec::with_capacity(config.population_size),
            scores: Vec::with_capacity(config.population_size),
            best: None,
            snapshot,
            rng: StdRng::seed_from_u64(seed),
            seed,
            attempts: vec![0; pairings],
            history: Vec::with_capacity(config.generations.min(HISTORY_PREALLOC)),
            state: EngineState::Initialized,
            status_tx,
            config,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Lowest-fitness individual seen in any completed generation.
    pub fn best_solution(&self) -> Option<&Individual> {
        self.best.as_ref().map(|(individual, _)| individual)
    }

    /// Runs generations until convergence, the generation budget or the
    /// wall-clock budget, whichever comes first.
    pub fn optimize(&mut self) -> RunOutcome {
        let start_time = Instant::now();
        let budget = self.config.runtime_budget();
        let total = self.config.generations;

        info!(
            "Starting GA - population {}, generations {}, {} pairings, seed {}",
            self.config.population_size,
            total,
            self.snapshot.pairings.len(),
            self.seed
        );

        self.state = EngineState::Running;
        self.initialize_population();

        let mut generation = 0;
        let termination = loop {
            self.evaluate_population();
            self.update_best();
            generation += 1;

            let best_fitness = self.best_score().value;
            self.history.push(best_fitness);
            self.progress(ProgressRecord::at(generation, total, best_fitness));
            debug!("generation {generation}/{total}: best fitness {best_fitness}");

            if self.best_score().is_feasible() {
                break Termination::Converged;
            }
            if generation >= total {
                break Termination::BudgetExhausted;
            }
            if start_time.elapsed() >= budget {
                break Termination::TimeExceeded;
            }

            self.next_generation();
        };
        self.state = termination.into();

        let (best, score) = self
            .best
            .clone()
            .unwrap_or_else(|| (Individual::new(Vec::new()), FitnessScore::default()));
        let (_, violations) =
            FitnessCalculator::new(&self.snapshot, self.config.max_consecutive).evaluate(&best);

        self.progress(ProgressRecord::searched(generation, total, score.value));
        self.state = EngineState::Done;

        info!(
            "GA finished after {generation} generations ({termination:?}) - best fitness {:.1}, {} hard, {} unassigned",
            score.value, score.hard, score.unassigned
        );

        RunOutcome {
            best,
            score,
            violations,
            termination,
            generations: generation,
            history: self.history.clone(),
            attempts: self.attempts.clone(),
            seed: self.seed,
            elapsed: start_time.elapsed(),
        }
    }

    fn initialize_population(&mut self) {
        let snapshot = Arc::clone(&self.snapshot);
        self.population = (0..self.config.population_size)
            .map(|_| {
                Individual::random(
                    &snapshot,
                    self.config.repair_attempts,
                    &mut self.attempts,
                    &mut self.rng,
                )
            })
            .collect();
        self.scores.clear();
        self.best = None;
    }

    /// Scores every individual on the rayon pool; `collect` is the barrier.
    fn evaluate_population(&mut self) {
        let calculator = FitnessCalculator::new(&self.snapshot, self.config.max_consecutive);
        self.scores = self
            .population
            .par_iter()
            .map(|individual| calculator.calculate_fitness(individual))
            .collect();
    }

    /// Replaces the elite only on strict improvement, so ties keep the earlier one.
    fn update_best(&mut self) {
        let Some(index) = self.fittest_index() else {
            return;
        };
        let score = self.scores[index];
        let improved = match &self.best {
            Some((_, best)) => score.value < best.value,
            None => true,
        };
        if improved {
            self.best = Some((self.population[index].clone(), score));
        }
    }

    fn fittest_index(&self) -> Option<usize> {
        let mut fittest: Option<usize> = None;
        for (i, score) in self.scores.iter().enumerate() {
            match fittest {
                Some(f) if self.scores[f].value <= score.value => {}
                _ => fittest = Some(i),
            }
        }
        fittest
    }

    fn best_score(&self) -> FitnessScore {
        self.best.as_ref().map(|(_, score)| *score).unwrap_or_default()
    }

    fn next_generation(&mut self) {
        let snapshot = Arc::clone(&self.snapshot);
        let size = self.config.population_size;
        let mut next = Vec::with_capacity(size);

        if let Some((elite, _)) = &self.best {
            next.push(elite.clone());
        }

        while next.len() < size {
            let first = self.tournament();
            let second = self.tournament();
            let mut child = if self.rng.random_bool(self.config.crossover_rate) {
                self.population[first].crossover(&self.population[second], &mut self.rng)
            } else {
                self.population[first].clone()
            };
            child.mutate(
                &snapshot,
                self.config.mutation_rate,
                self.config.repair_attempts,
                &mut self.attempts,
                &mut self.rng,
            );
            next.push(child);
        }

        self.population = next;
    }

    /// Tournament selection; the earliest contender wins ties.
    fn tournament(&mut self) -> usize {
        let size = self.population.len();
        let mut winner = self.rng.random_range(0..size);
        for _ in 1..self.config.tournament_size {
            let contender = self.rng.random_range(0..size);
            let (w, c) = (self.scores[winner].value, self.scores[contender].value);
            if c < w || (c == w && contender < winner) {
                winner = contender;
            }
        }
        winner
    }

    fn progress(&self, record: ProgressRecord) {
        if let Some(tx) = &self.status_tx {
            // No subscribers is fine; the loop never waits on a reader.
            let _ = tx.send(record);
        }
    }
}
