//! Identical parallel machines, total completion time (`P||ΣC_j`).
//!
//! `N` jobs with known processing times are assigned to `M` identical
//! machines and sequenced on each. The K2 objective sums every job's
//! completion time. [`Schedule`] implements [`crate::sa::Solution`] and the
//! operators in this module implement [`crate::sa::Mutation`], so the
//! generic annealer drives them directly.

mod codec;
mod instance;
mod io;
mod mutations;
mod solution;

pub use instance::Instance;
pub use io::{generate, load_csv, save_csv, save_schedule_csv};
pub use mutations::{MoveBetweenMachines, Neighborhood, ReassignGreedy, SwapInMachine};
pub use solution::{k2_objective, validate_orders, Schedule};
