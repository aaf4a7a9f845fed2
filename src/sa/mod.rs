//! Simulated Annealing (SA).
//!
//! A single-solution trajectory metaheuristic inspired by the physical
//! annealing process. Accepts worsening moves with a probability that
//! decreases over time (temperature), allowing the search to escape
//! local optima.
//!
//! The engine is generic: it sees solutions through [`Solution`],
//! neighborhoods through [`Mutation`] and cooling through
//! [`TemperatureSchedule`]. The scheduling problem in
//! [`crate::schedule`] plugs into these seams.
//!
//! # References
//!
//! - Kirkpatrick, Gelatt & Vecchi (1983), "Optimization by Simulated Annealing"
//! - Cerny (1985), "Thermodynamical Approach to the Travelling Salesman Problem"
//! - Lundy & Mees (1986), "Convergence of an Annealing Algorithm"

mod config;
mod runner;
mod types;

pub use config::{CoolingSchedule, Geometric, LundyMees, SaParams};
pub use runner::{AnnealOutcome, Annealer, StopReason};
pub use types::{Mutation, Solution, TemperatureSchedule};
