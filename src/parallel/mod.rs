//! Master/worker coordination over a Unix socket.
//!
//! Several independent annealers (workers) periodically report their best
//! schedule to a master, which keeps the global best and broadcasts it
//! back. Workers adopt the broadcast when it beats their own best, so the
//! whole population ratchets downward. The master stops everyone after
//! `outer_patience` consecutive rounds without a global improvement.
//!
//! - [`wire`]: length-prefixed BEST/STOP frames.
//! - [`Master`]: the coordinator loop, on a tokio runtime.
//! - [`run_worker`]: the blocking worker loop.
//! - [`WorkerLauncher`]: how workers are started (processes or threads).

mod config;
mod launcher;
mod master;
pub mod wire;
mod worker;

pub use config::ParParams;
pub use launcher::{ProcessLauncher, ThreadLauncher, WorkerHandle, WorkerJob, WorkerLauncher};
pub use master::{bind, Master, MasterReport};
pub use worker::{run_worker, Drained, Link, WorkerConfig, WorkerSummary};
