//! SA execution loop.

use super::config::SaParams;
use super::types::{Mutation, Solution, TemperatureSchedule};
use crate::error::Result;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The temperature dropped to or below the minimum.
    Frozen,
    /// `patience` consecutive levels passed without a new best.
    Stagnated,
}

/// Statistics of one [`Annealer::run`].
#[derive(Debug, Clone)]
pub struct AnnealOutcome {
    /// Objective of the best solution after the run.
    pub best_objective: u64,

    /// Total number of candidate evaluations.
    pub iterations: usize,

    /// Number of temperature levels completed.
    pub levels: usize,

    /// Number of accepted moves (including improvements).
    pub accepted_moves: usize,

    /// Number of accepted moves that strictly lowered the current objective.
    pub improving_moves: usize,

    /// Temperature when the run stopped.
    pub final_temperature: f64,

    pub stop: StopReason,

    /// Best objective at the start and after every temperature level.
    pub cost_history: Vec<u64>,
}

/// Single-threaded annealing engine.
///
/// Owns the current and best solutions, the mutation operator, the
/// temperature schedule and one seeded random generator from which every
/// random decision is drawn. Two engines built from equal inputs produce
/// identical runs.
///
/// [`run`](Annealer::run) may be called repeatedly; every call reheats to
/// `T0` and continues from the current solution. Between calls,
/// [`adopt`](Annealer::adopt) injects an external solution if it is
/// strictly better than the best one.
pub struct Annealer<S, M, T> {
    current: S,
    current_cost: u64,
    best: S,
    best_cost: u64,
    mutation: M,
    schedule: T,
    params: SaParams,
    rng: ChaCha8Rng,
}

impl<S, M, T> Annealer<S, M, T>
where
    S: Solution,
    M: Mutation<S>,
    T: TemperatureSchedule,
{
    /// Creates an engine starting from `initial`.
    ///
    /// Fails if `params` do not validate.
    pub fn new(initial: S, mutation: M, schedule: T, params: SaParams) -> Result<Self> {
        params.validate()?;
        let cost = initial.objective();
        Ok(Self {
            best: initial.clone(),
            best_cost: cost,
            current: initial,
            current_cost: cost,
            mutation,
            schedule,
            rng: ChaCha8Rng::seed_from_u64(params.seed),
            params,
        })
    }

    /// Runs one full cooling schedule.
    pub fn run(&mut self) -> AnnealOutcome {
        self.schedule.reset(self.params.initial_temperature);

        let mut iterations = 0usize;
        let mut levels = 0usize;
        let mut accepted_moves = 0usize;
        let mut improving_moves = 0usize;
        let mut stagnant_levels = 0usize;
        let mut cost_history = vec![self.best_cost];

        let stop = loop {
            let temperature = self.schedule.current();
            if temperature <= self.params.min_temperature {
                break StopReason::Frozen;
            }
            if stagnant_levels >= self.params.patience {
                break StopReason::Stagnated;
            }

            let mut improved_best = false;
            for _ in 0..self.params.iterations_per_temperature {
                let mut candidate = self.current.clone();
                self.mutation.apply(&mut candidate, &mut self.rng);
                let candidate_cost = candidate.objective();
                iterations += 1;

                if !self.accept(candidate_cost, temperature) {
                    continue;
                }
                accepted_moves += 1;
                if candidate_cost < self.current_cost {
                    improving_moves += 1;
                }
                self.current = candidate;
                self.current_cost = candidate_cost;

                if self.current_cost < self.best_cost {
                    self.best = self.current.clone();
                    self.best_cost = self.current_cost;
                    improved_best = true;
                }
            }

            if improved_best {
                stagnant_levels = 0;
            } else {
                stagnant_levels += 1;
            }
            levels += 1;
            cost_history.push(self.best_cost);

            tracing::trace!(
                level = levels,
                temperature,
                current = self.current_cost,
                best = self.best_cost,
                "temperature level done"
            );

            self.schedule.advance();
        };

        tracing::debug!(
            operator = self.mutation.name(),
            best = self.best_cost,
            iterations,
            levels,
            accepted_moves,
            ?stop,
            "annealing run finished"
        );

        AnnealOutcome {
            best_objective: self.best_cost,
            iterations,
            levels,
            accepted_moves,
            improving_moves,
            final_temperature: self.schedule.current(),
            stop,
            cost_history,
        }
    }

    /// Metropolis criterion: always accept non-worsening moves, accept a
    /// worsening move with probability `exp(-delta / T)`.
    fn accept(&mut self, candidate_cost: u64, temperature: f64) -> bool {
        if candidate_cost <= self.current_cost {
            return true;
        }
        let delta = (candidate_cost - self.current_cost) as f64;
        let probability = (-delta / temperature).exp();
        self.rng.random::<f64>() < probability
    }

    /// Replaces both current and best with `candidate` if it is strictly
    /// better than the best solution. Returns whether it was adopted.
    pub fn adopt(&mut self, candidate: S) -> bool {
        let cost = candidate.objective();
        if cost >= self.best_cost {
            return false;
        }
        self.current = candidate.clone();
        self.current_cost = cost;
        self.best = candidate;
        self.best_cost = cost;
        true
    }

    pub fn best(&self) -> &S {
        &self.best
    }

    pub fn best_objective(&self) -> u64 {
        self.best_cost
    }

    pub fn current(&self) -> &S {
        &self.current
    }

    pub fn current_objective(&self) -> u64 {
        self.current_cost
    }

    pub fn params(&self) -> &SaParams {
        &self.params
    }

    pub fn into_best(self) -> S {
        self.best
    }
}
