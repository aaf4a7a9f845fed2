//! Starting workers.
//!
//! The master does not care how a worker comes to life, only that it
//! connects to the socket. [`ProcessLauncher`] re-executes the current
//! binary with its hidden `worker` command; [`ThreadLauncher`] runs
//! [`run_worker`] on a thread of this process, which keeps tests and
//! embedders free of any binary.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Child, Command};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::worker::{run_worker, WorkerConfig, WorkerSummary};
use crate::error::{Error, Result};
use crate::sa::CoolingSchedule;
use crate::schedule::{Instance, Neighborhood};

const REAP_POLL: Duration = Duration::from_millis(20);

/// One worker to start.
#[derive(Debug, Clone)]
pub struct WorkerJob {
    pub config: WorkerConfig,
    pub instance: Arc<Instance>,
    pub neighborhood: Neighborhood,
    pub cooling: CoolingSchedule,
}

pub trait WorkerLauncher {
    fn launch(&self, job: WorkerJob) -> Result<WorkerHandle>;
}

/// A started worker.
#[derive(Debug)]
pub enum WorkerHandle {
    Process(Child),
    Thread(JoinHandle<Result<WorkerSummary>>),
}

impl WorkerHandle {
    /// Waits up to `grace` for the worker to exit.
    ///
    /// A process still running after that is killed; a thread is detached.
    /// Only thread workers can hand back a summary.
    pub fn reap(self, grace: Duration) -> Option<WorkerSummary> {
        let deadline = Instant::now() + grace;
        match self {
            WorkerHandle::Process(mut child) => {
                loop {
                    match child.try_wait() {
                        Ok(Some(status)) => {
                            if !status.success() {
                                tracing::warn!(pid = child.id(), %status, "worker exited abnormally");
                            }
                            return None;
                        }
                        Ok(None) if Instant::now() < deadline => thread::sleep(REAP_POLL),
                        Ok(None) => break,
                        Err(e) => {
                            tracing::warn!(pid = child.id(), error = %e, "cannot query worker");
                            break;
                        }
                    }
                }
                tracing::warn!(pid = child.id(), "worker still running, killing it");
                if let Err(e) = child.kill() {
                    tracing::debug!(error = %e, "kill failed");
                }
                let _ = child.wait();
                None
            }
            WorkerHandle::Thread(handle) => {
                while !handle.is_finished() && Instant::now() < deadline {
                    thread::sleep(REAP_POLL);
                }
                if !handle.is_finished() {
                    tracing::warn!("worker thread still running, detaching it");
                    return None;
                }
                match handle.join() {
                    Ok(Ok(summary)) => Some(summary),
                    Ok(Err(e)) => {
                        tracing::warn!(error = %e, "worker thread failed");
                        None
                    }
                    Err(_) => {
                        tracing::warn!("worker thread panicked");
                        None
                    }
                }
            }
        }
    }
}

/// Spawns each worker as a child process running `<program> worker ...`.
///
/// The child reads the instance from `instance_file`, so the file must
/// exist for as long as workers are being launched.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    instance_file: PathBuf,
    extra_args: Vec<OsString>,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>, instance_file: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            instance_file: instance_file.into(),
            extra_args: Vec::new(),
        }
    }

    /// Launcher that re-executes the running binary.
    pub fn current_exe(instance_file: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self::new(std::env::current_exe()?, instance_file))
    }

    /// Arguments appended to every worker command line, e.g. verbosity.
    pub fn with_args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The full argument list for `job`, excluding the program itself.
    pub fn args(&self, job: &WorkerJob) -> Vec<OsString> {
        let config = &job.config;
        let params = &config.params;
        let mut args: Vec<OsString> = vec![
            "worker".into(),
            "--socket".into(),
            config.socket_path.clone().into(),
            "--instance".into(),
            self.instance_file.clone().into(),
            "--machines".into(),
            job.instance.machines().to_string().into(),
            "--worker-id".into(),
            config.worker_id.to_string().into(),
            "--seed".into(),
            params.seed.to_string().into(),
            "--init-seed".into(),
            config.init_seed.to_string().into(),
            "--t0".into(),
            params.initial_temperature.to_string().into(),
            "--tmin".into(),
            params.min_temperature.to_string().into(),
            "--iters".into(),
            params.iterations_per_temperature.to_string().into(),
            "--patience".into(),
            params.patience.to_string().into(),
            "--neighborhood".into(),
            job.neighborhood.to_string().into(),
        ];
        match job.cooling {
            CoolingSchedule::Geometric { alpha } => {
                args.extend(["--cooling".into(), "geometric".into()]);
                args.extend(["--alpha".into(), alpha.to_string().into()]);
            }
            CoolingSchedule::LundyMees { beta } => {
                args.extend(["--cooling".into(), "lundy-mees".into()]);
                args.extend(["--beta".into(), beta.to_string().into()]);
            }
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn launch(&self, job: WorkerJob) -> Result<WorkerHandle> {
        let child = Command::new(&self.program)
            .args(self.args(&job))
            .spawn()
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!("failed to spawn worker {}: {e}", job.config.worker_id),
                ))
            })?;
        tracing::debug!(worker = job.config.worker_id, pid = child.id(), "spawned worker process");
        Ok(WorkerHandle::Process(child))
    }
}

/// Runs each worker on its own thread of the current process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadLauncher;

impl WorkerLauncher for ThreadLauncher {
    fn launch(&self, job: WorkerJob) -> Result<WorkerHandle> {
        let name = format!("k2-worker-{}", job.config.worker_id);
        let handle = thread::Builder::new().name(name).spawn(move || {
            run_worker(job.instance, &job.config, job.neighborhood, job.cooling.build())
        })?;
        Ok(WorkerHandle::Thread(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sa::SaParams;

    fn job() -> WorkerJob {
        WorkerJob {
            config: WorkerConfig {
                worker_id: 2,
                socket_path: PathBuf::from("/tmp/k2.sock"),
                params: SaParams::default().with_seed(45),
                init_seed: 42,
            },
            instance: Arc::new(Instance::new(vec![3, 1, 4, 2], 2).unwrap()),
            neighborhood: Neighborhood::Mixed,
            cooling: CoolingSchedule::LundyMees { beta: 0.01 },
        }
    }

    fn value_of<'a>(args: &'a [OsString], flag: &str) -> &'a str {
        let at = args.iter().position(|a| a == flag).unwrap();
        args[at + 1].to_str().unwrap()
    }

    #[test]
    fn test_process_args_carry_the_whole_job() {
        let launcher = ProcessLauncher::new("/bin/k2-anneal", "/tmp/jobs.csv").with_args(["-vv"]);
        let args = launcher.args(&job());

        assert_eq!(args[0], "worker");
        assert_eq!(value_of(&args, "--socket"), "/tmp/k2.sock");
        assert_eq!(value_of(&args, "--instance"), "/tmp/jobs.csv");
        assert_eq!(value_of(&args, "--machines"), "2");
        assert_eq!(value_of(&args, "--worker-id"), "2");
        assert_eq!(value_of(&args, "--seed"), "45");
        assert_eq!(value_of(&args, "--init-seed"), "42");
        assert_eq!(value_of(&args, "--neighborhood"), "mixed");
        assert_eq!(value_of(&args, "--cooling"), "lundy-mees");
        assert_eq!(value_of(&args, "--beta").parse::<f64>().unwrap(), 0.01);
        assert_eq!(args.last().unwrap(), "-vv");
    }

    #[test]
    fn test_thread_worker_without_master_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let mut job = job();
        job.config.socket_path = dir.path().join("nobody.sock");

        let handle = ThreadLauncher.launch(job).unwrap();
        let WorkerHandle::Thread(handle) = handle else {
            panic!("thread launcher must return a thread handle");
        };
        assert!(handle.join().unwrap().is_err());
    }
}
