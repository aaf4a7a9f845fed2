use clap::{Args, Parser, Subcommand, ValueEnum};
use k2_anneal::parallel::ParParams;
use k2_anneal::sa::{CoolingSchedule, SaParams};
use k2_anneal::schedule::Neighborhood;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Simulated annealing for identical parallel machine scheduling (sum of completion times)."
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Cli {
    /// Logging flags to forward to worker processes.
    pub fn verbosity_args(&self) -> Vec<String> {
        if self.quiet {
            vec!["--quiet".to_string()]
        } else if self.verbose > 0 {
            vec![format!("-{}", "v".repeat(self.verbose as usize))]
        } else {
            Vec::new()
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Solve an instance, sequentially or with cooperating worker processes.
    Solve(SolveArgs),
    /// Write a random instance as a `job,time` CSV file.
    Generate(GenerateArgs),
    /// Run one worker against a master socket (started by `solve --workers`).
    #[command(hide = true)]
    Worker(WorkerArgs),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoolingKind {
    Geometric,
    LundyMees,
}

/// Annealing parameters shared by `solve` and `worker`.
#[derive(Args, Debug, Clone)]
pub struct AnnealArgs {
    /// Initial temperature
    #[arg(long = "t0", default_value_t = 1.0, value_name = "FLOAT")]
    pub initial_temperature: f64,

    /// Temperature at which a run stops
    #[arg(long = "tmin", default_value_t = 1e-3, value_name = "FLOAT")]
    pub min_temperature: f64,

    /// Moves evaluated per temperature level
    #[arg(long = "iters", default_value_t = 100, value_name = "NUM")]
    pub iterations_per_temperature: usize,

    /// Temperature levels without a new best before a run stops
    #[arg(long, default_value_t = 100, value_name = "NUM")]
    pub patience: usize,

    /// Random seed
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Neighborhood: swap, move, greedy or mixed
    #[arg(long, default_value_t = Neighborhood::default(), value_name = "NAME")]
    pub neighborhood: Neighborhood,

    /// Cooling schedule
    #[arg(long, value_enum, default_value_t = CoolingKind::Geometric)]
    pub cooling: CoolingKind,

    /// Geometric cooling factor
    #[arg(long, default_value_t = 0.95, value_name = "FLOAT")]
    pub alpha: f64,

    /// Lundy-Mees cooling parameter
    #[arg(long, default_value_t = 1.0, value_name = "FLOAT")]
    pub beta: f64,
}

impl AnnealArgs {
    pub fn params(&self) -> SaParams {
        SaParams::default()
            .with_initial_temperature(self.initial_temperature)
            .with_min_temperature(self.min_temperature)
            .with_iterations_per_temperature(self.iterations_per_temperature)
            .with_patience(self.patience)
            .with_seed(self.seed)
    }

    pub fn cooling(&self) -> CoolingSchedule {
        match self.cooling {
            CoolingKind::Geometric => CoolingSchedule::Geometric { alpha: self.alpha },
            CoolingKind::LundyMees => CoolingSchedule::LundyMees { beta: self.beta },
        }
    }
}

/// Where the instance comes from.
#[derive(Args, Debug, Clone)]
pub struct InstanceArgs {
    /// `job,time` CSV file
    #[arg(short, long, value_name = "PATH", required_unless_present = "generate")]
    pub instance: Option<PathBuf>,

    /// Generate a random instance with this many jobs instead
    #[arg(long, value_name = "JOBS", conflicts_with = "instance")]
    pub generate: Option<u32>,

    /// Number of machines
    #[arg(short, long, value_name = "NUM")]
    pub machines: u32,

    /// Smallest generated processing time
    #[arg(long, default_value_t = 1, value_name = "NUM")]
    pub min_time: u32,

    /// Largest generated processing time
    #[arg(long, default_value_t = 100, value_name = "NUM")]
    pub max_time: u32,
}

#[derive(Args, Debug)]
pub struct SolveArgs {
    #[command(flatten)]
    pub source: InstanceArgs,

    #[command(flatten)]
    pub anneal: AnnealArgs,

    /// Run this many cooperating worker processes instead of one engine
    #[arg(short, long, value_name = "NUM")]
    pub workers: Option<u32>,

    /// Rounds without a global improvement before the workers are stopped
    #[arg(long, default_value_t = 10, value_name = "NUM")]
    pub outer_patience: u32,

    /// Coordinator socket path
    #[arg(long, default_value = "/tmp/sa.sock", value_name = "PATH")]
    pub socket: PathBuf,

    /// Longest wait for all workers to report in one round, in seconds
    #[arg(long, default_value_t = 30, value_name = "SECS")]
    pub round_timeout: u64,

    /// Write the best schedule as CSV
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

impl SolveArgs {
    pub fn par_params(&self, workers: u32) -> ParParams {
        ParParams::default()
            .with_workers(workers)
            .with_outer_patience(self.outer_patience)
            .with_socket_path(&self.socket)
            .with_round_timeout(Duration::from_secs(self.round_timeout))
    }
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Number of jobs
    #[arg(short = 'n', long, value_name = "NUM")]
    pub jobs: u32,

    /// Number of machines
    #[arg(short, long, value_name = "NUM")]
    pub machines: u32,

    /// Smallest processing time
    #[arg(long, default_value_t = 1, value_name = "NUM")]
    pub min_time: u32,

    /// Largest processing time
    #[arg(long, default_value_t = 100, value_name = "NUM")]
    pub max_time: u32,

    /// Random seed
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Output CSV file
    #[arg(short, long, value_name = "PATH")]
    pub output: PathBuf,
}

#[derive(Args, Debug)]
pub struct WorkerArgs {
    #[arg(long, value_name = "PATH")]
    pub socket: PathBuf,

    #[arg(long, value_name = "PATH")]
    pub instance: PathBuf,

    #[arg(long, value_name = "NUM")]
    pub machines: u32,

    #[arg(long, value_name = "NUM")]
    pub worker_id: u32,

    /// Seed of the shared initial schedule
    #[arg(long)]
    pub init_seed: u64,

    #[command(flatten)]
    pub anneal: AnnealArgs,
}
