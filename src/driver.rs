//! Entry points: one engine, cooperating workers, or a rayon portfolio.

use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tokio::net::UnixListener;
use tokio::runtime::Runtime;

use crate::error::{Error, Result};
use crate::parallel::{
    self, Master, MasterReport, ParParams, ProcessLauncher, WorkerConfig, WorkerJob,
    WorkerLauncher,
};
use crate::sa::{Annealer, CoolingSchedule, Mutation, SaParams, Solution, TemperatureSchedule};
use crate::schedule::{save_csv, Instance, Neighborhood, Schedule};

/// How long workers get to exit after the master stopped.
const REAP_GRACE: Duration = Duration::from_secs(5);

/// Runs a single annealer, no coordinator involved.
///
/// `seed`, when given, replaces `params.seed`. It drives both the random
/// initial schedule and the engine, so equal inputs give equal results.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use k2_anneal::driver::run_sequential;
/// use k2_anneal::sa::{Geometric, SaParams, Solution};
/// use k2_anneal::schedule::{Instance, Neighborhood};
///
/// let instance = Arc::new(Instance::new(vec![3, 1, 4, 2], 2).unwrap());
/// let best = run_sequential(
///     instance,
///     &SaParams::default(),
///     Some(7),
///     Neighborhood::Mixed,
///     Geometric::default(),
/// )
/// .unwrap();
/// assert!(best.objective() <= 14);
/// ```
pub fn run_sequential<M, T>(
    instance: Arc<Instance>,
    params: &SaParams,
    seed: Option<u64>,
    mutation: M,
    schedule: T,
) -> Result<Schedule>
where
    M: Mutation<Schedule>,
    T: TemperatureSchedule,
{
    instance.validate()?;
    let mut params = params.clone();
    if let Some(seed) = seed {
        params.seed = seed;
    }
    let initial = Schedule::random(instance, &mut ChaCha8Rng::seed_from_u64(params.seed));
    let mut annealer = Annealer::new(initial, mutation, schedule, params)?;
    let outcome = annealer.run();
    tracing::info!(
        best = outcome.best_objective,
        iterations = outcome.iterations,
        levels = outcome.levels,
        stop = ?outcome.stop,
        "sequential run finished"
    );
    Ok(annealer.into_best())
}

/// Runs `par.workers` worker processes of the current binary under a
/// master and returns the converged global best.
pub fn run_parallel(
    instance: Arc<Instance>,
    sa: &SaParams,
    par: &ParParams,
    neighborhood: Neighborhood,
    cooling: CoolingSchedule,
) -> Result<Schedule> {
    let report = run_processes(instance, sa, par, neighborhood, cooling, Vec::<OsString>::new())?;
    report.best.ok_or(Error::NoSolution)
}

/// [`run_parallel`] with extra arguments for every worker command line and
/// the full master report.
///
/// The instance is handed to the workers as a CSV file next to the socket.
/// It is written only once this run owns the socket and removed when the
/// run is over.
pub fn run_processes<I, A>(
    instance: Arc<Instance>,
    sa: &SaParams,
    par: &ParParams,
    neighborhood: Neighborhood,
    cooling: CoolingSchedule,
    worker_args: I,
) -> Result<MasterReport>
where
    I: IntoIterator<Item = A>,
    A: Into<OsString>,
{
    validate_run(&instance, sa, par, cooling)?;
    let (runtime, listener) = start(par)?;

    let instance_file = par.socket_path.with_extension("jobs.csv");
    let launcher = match save_csv(&instance_file, &instance)
        .and_then(|()| ProcessLauncher::current_exe(&instance_file))
    {
        Ok(launcher) => launcher.with_args(worker_args),
        Err(e) => {
            drop(listener);
            remove_file(&instance_file);
            remove_file(&par.socket_path);
            return Err(e);
        }
    };

    let result = coordinate(
        &runtime,
        listener,
        instance,
        sa,
        par,
        neighborhood,
        cooling,
        &launcher,
    );
    remove_file(&instance_file);
    result
}

/// Runs a master on `par.socket_path` with workers started by `launcher`.
///
/// Worker `k` gets engine seed `sa.seed + k + 1`; all share the initial
/// schedule drawn from `sa.seed`. Fails if the socket cannot be bound or
/// no worker could be launched.
pub fn run_parallel_with<L: WorkerLauncher>(
    instance: Arc<Instance>,
    sa: &SaParams,
    par: &ParParams,
    neighborhood: Neighborhood,
    cooling: CoolingSchedule,
    launcher: &L,
) -> Result<MasterReport> {
    validate_run(&instance, sa, par, cooling)?;
    let (runtime, listener) = start(par)?;
    coordinate(&runtime, listener, instance, sa, par, neighborhood, cooling, launcher)
}

fn validate_run(
    instance: &Instance,
    sa: &SaParams,
    par: &ParParams,
    cooling: CoolingSchedule,
) -> Result<()> {
    instance.validate()?;
    sa.validate()?;
    par.validate()?;
    cooling.validate()
}

/// Builds the coordinator runtime and binds the socket.
fn start(par: &ParParams) -> Result<(Runtime, UnixListener)> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let listener = runtime.block_on(parallel::bind(&par.socket_path))?;
    Ok((runtime, listener))
}

/// Launches the workers and serves them on a bound listener. The socket
/// file is removed on every path out.
#[allow(clippy::too_many_arguments)]
fn coordinate<L: WorkerLauncher>(
    runtime: &Runtime,
    listener: UnixListener,
    instance: Arc<Instance>,
    sa: &SaParams,
    par: &ParParams,
    neighborhood: Neighborhood,
    cooling: CoolingSchedule,
    launcher: &L,
) -> Result<MasterReport> {
    tracing::info!(
        workers = par.workers,
        jobs = instance.jobs(),
        machines = instance.machines(),
        socket = %par.socket_path.display(),
        "starting parallel run"
    );
    let master = Master::new(instance.clone(), par);

    let mut handles = Vec::with_capacity(par.workers as usize);
    let mut last_error = None;
    for k in 0..par.workers {
        let job = WorkerJob {
            config: WorkerConfig {
                worker_id: k,
                socket_path: par.socket_path.clone(),
                params: sa.clone().with_seed(sa.seed.wrapping_add(u64::from(k) + 1)),
                init_seed: sa.seed,
            },
            instance: instance.clone(),
            neighborhood,
            cooling,
        };
        match launcher.launch(job) {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                tracing::error!(worker = k, error = %e, "failed to launch worker");
                last_error = Some(e);
            }
        }
    }
    if handles.is_empty() {
        drop(listener);
        remove_file(&par.socket_path);
        return Err(last_error.unwrap_or(Error::NoSolution));
    }

    let report = runtime.block_on(master.serve(listener));
    remove_file(&par.socket_path);
    let summaries: Vec<_> = handles
        .into_iter()
        .filter_map(|handle| handle.reap(REAP_GRACE))
        .collect();
    tracing::info!(
        rounds = report.rounds,
        improvements = report.improvements,
        best = ?report.best_objective(),
        reaped = summaries.len(),
        "parallel run finished"
    );
    Ok(report)
}

fn remove_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::debug!(path = %path.display(), error = %e, "could not remove file");
    }
}

/// Runs `engines` independent sequential annealers on the rayon pool and
/// keeps the best result. Engine `k` is seeded with `params.seed + k`.
#[cfg(feature = "parallel")]
pub fn run_portfolio(
    instance: Arc<Instance>,
    params: &SaParams,
    engines: u32,
    neighborhood: Neighborhood,
    cooling: CoolingSchedule,
) -> Result<Schedule> {
    use rayon::prelude::*;

    if engines == 0 {
        return Err(Error::InvalidConfig("at least one engine is required".into()));
    }
    cooling.validate()?;

    let results: Vec<Schedule> = (0..engines)
        .into_par_iter()
        .map(|k| {
            run_sequential(
                instance.clone(),
                params,
                Some(params.seed.wrapping_add(u64::from(k))),
                neighborhood,
                cooling.build(),
            )
        })
        .collect::<Result<_>>()?;

    results
        .into_iter()
        .min_by_key(|s| s.objective())
        .ok_or(Error::NoSolution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::{run_worker, ThreadLauncher, WorkerHandle};
    use crate::sa::Geometric;
    use rand::Rng;
    use std::thread;
    use tempfile::tempdir;

    fn scenario() -> Arc<Instance> {
        Arc::new(Instance::new(vec![3, 1, 4, 2], 2).unwrap())
    }

    #[test]
    fn test_sequential_reaches_optimum() {
        let best = run_sequential(
            scenario(),
            &SaParams::default(),
            Some(42),
            Neighborhood::Mixed,
            Geometric::default(),
        )
        .unwrap();
        assert!(best.objective() <= 14);
        // SPT pairing {1, 3} / {2, 4}
        assert_eq!(best.objective(), 13);
        assert!(best.is_consistent());
    }

    #[test]
    fn test_sequential_is_deterministic() {
        let instance = Arc::new(crate::schedule::generate(30, 4, 1, 50, 3).unwrap());
        let params = SaParams::default().with_iterations_per_temperature(20);
        let run = |seed| {
            run_sequential(instance.clone(), &params, Some(seed), Neighborhood::Mixed, Geometric::default())
                .unwrap()
        };
        assert_eq!(run(5).orders(), run(5).orders());
    }

    #[test]
    fn test_sequential_rejects_bad_params() {
        let params = SaParams::default().with_min_temperature(5.0);
        let result = run_sequential(scenario(), &params, None, Neighborhood::Mixed, Geometric::default());
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_parallel_threads_converge() {
        let dir = tempdir().unwrap();
        let sa = SaParams::default().with_iterations_per_temperature(50);
        let par = ParParams::default()
            .with_workers(3)
            .with_outer_patience(3)
            .with_socket_path(dir.path().join("k2.sock"));

        let report = run_parallel_with(
            scenario(),
            &sa,
            &par,
            Neighborhood::Mixed,
            CoolingSchedule::default(),
            &ThreadLauncher,
        )
        .unwrap();

        let best = report.best.as_ref().unwrap();
        assert!(best.is_consistent());
        assert_eq!(best.objective(), 13);
        assert_eq!(report.stagnant_rounds, 3);
        assert!(!par.socket_path.exists(), "socket file must be removed");
    }

    struct Still;

    impl Mutation<Schedule> for Still {
        fn name(&self) -> &str {
            "still"
        }

        fn apply<R: Rng>(&self, _schedule: &mut Schedule, _rng: &mut R) {}
    }

    struct StillLauncher;

    impl WorkerLauncher for StillLauncher {
        fn launch(&self, job: WorkerJob) -> Result<WorkerHandle> {
            let handle = thread::spawn(move || {
                run_worker(job.instance, &job.config, Still, job.cooling.build())
            });
            Ok(WorkerHandle::Thread(handle))
        }
    }

    #[test]
    fn test_parallel_stops_after_outer_patience() {
        let dir = tempdir().unwrap();
        let sa = SaParams::default()
            .with_iterations_per_temperature(5)
            .with_patience(3);
        let par = ParParams::default()
            .with_workers(3)
            .with_outer_patience(10)
            .with_socket_path(dir.path().join("k2.sock"));

        let report = run_parallel_with(
            scenario(),
            &sa,
            &par,
            Neighborhood::default(),
            CoolingSchedule::default(),
            &StillLauncher,
        )
        .unwrap();

        assert_eq!(report.rounds, 10);
        assert_eq!(report.improvements, 0);
        assert_eq!(report.history.len(), 1);
    }

    #[test]
    fn test_parallel_rejects_invalid_config() {
        let par = ParParams::default().with_workers(0);
        let result = run_parallel_with(
            scenario(),
            &SaParams::default(),
            &par,
            Neighborhood::default(),
            CoolingSchedule::default(),
            &ThreadLauncher,
        );
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_parallel_leaves_a_live_master_alone() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("busy.sock");
        let _live = std::os::unix::net::UnixListener::bind(&path).unwrap();
        let par = ParParams::default().with_workers(1).with_socket_path(&path);

        let result = run_parallel_with(
            scenario(),
            &SaParams::default(),
            &par,
            Neighborhood::default(),
            CoolingSchedule::default(),
            &ThreadLauncher,
        );
        assert!(matches!(result, Err(Error::Bind { .. })));
        assert!(path.exists());
    }

    #[test]
    fn test_processes_leave_a_live_handover_file_alone() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("busy.sock");
        let _live = std::os::unix::net::UnixListener::bind(&path).unwrap();
        let handover = path.with_extension("jobs.csv");
        std::fs::write(&handover, "job,time\n0,9\n1,9\n").unwrap();
        let par = ParParams::default().with_workers(1).with_socket_path(&path);

        let result = run_processes(
            scenario(),
            &SaParams::default(),
            &par,
            Neighborhood::default(),
            CoolingSchedule::default(),
            Vec::<OsString>::new(),
        );
        assert!(matches!(result, Err(Error::Bind { .. })));
        assert!(path.exists());
        assert_eq!(
            std::fs::read_to_string(&handover).unwrap(),
            "job,time\n0,9\n1,9\n"
        );
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_portfolio_keeps_the_best_engine() {
        let instance = Arc::new(crate::schedule::generate(20, 3, 1, 30, 9).unwrap());
        let params = SaParams::default().with_iterations_per_temperature(20);
        let best = run_portfolio(instance.clone(), &params, 4, Neighborhood::Mixed, CoolingSchedule::default())
            .unwrap();
        for k in 0..4 {
            let single = run_sequential(
                instance.clone(),
                &params,
                Some(params.seed + k),
                Neighborhood::Mixed,
                Geometric::default(),
            )
            .unwrap();
            assert!(best.objective() <= single.objective());
        }
    }
}
