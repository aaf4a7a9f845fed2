//! Simulated annealing for scheduling jobs on identical parallel machines.
//!
//! `N` jobs with known processing times go onto `M` identical machines;
//! the goal is the smallest K2 value, the sum of all completion times.
//!
//! - [`sa`]: a generic annealing engine (solutions, mutations and cooling
//!   schedules are traits).
//! - [`schedule`]: the scheduling problem itself: instances, the dual
//!   incidence/order representation, neighborhood moves, a binary codec
//!   and CSV input/output.
//! - [`parallel`]: a master process that coordinates several annealing
//!   workers over a Unix socket, broadcasting the global best.
//! - [`driver`]: the entry points that tie these together.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use k2_anneal::driver::run_sequential;
//! use k2_anneal::sa::{Geometric, SaParams, Solution};
//! use k2_anneal::schedule::{generate, Neighborhood};
//!
//! let instance = Arc::new(generate(40, 3, 1, 20, 11).unwrap());
//! let params = SaParams::default().with_iterations_per_temperature(50);
//! let best = run_sequential(instance, &params, None, Neighborhood::Mixed, Geometric::default())
//!     .unwrap();
//! assert!(best.is_consistent());
//! println!("K2 = {}", best.objective());
//! ```

pub mod driver;
pub mod error;
pub mod parallel;
pub mod sa;
pub mod schedule;

pub use error::{Error, Result};
