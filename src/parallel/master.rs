//! Master: collects worker reports, keeps the global best, broadcasts it.
//!
//! The master runs on a single-threaded tokio runtime. Each connection gets
//! a reader task, which forwards frames to the coordinator loop over a
//! channel, and a writer task, which follows a latest-value `watch` channel.
//! A worker that has not consumed an older broadcast therefore only ever
//! receives the newest global best.
//!
//! Convergence is counted in rounds. A round closes once every worker that
//! was live when it opened has reported (or disconnected), or when the
//! round timeout expires. A round that lowered the global best resets the
//! stagnation counter; any other round increments it. At `outer_patience`
//! stagnant rounds the master broadcasts STOP.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;

use super::config::ParParams;
use super::wire::{self, Frame, FrameKind};
use crate::error::{Error, Result};
use crate::sa::Solution;
use crate::schedule::{Instance, Schedule};

/// How long the master waits for STOP frames to be flushed.
const STOP_FLUSH_GRACE: Duration = Duration::from_secs(2);

/// Pause after the first failed accept, doubled per consecutive failure.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);
const MAX_ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

/// Final state of a master run.
#[derive(Debug, Clone)]
pub struct MasterReport {
    /// The global best, if any worker ever delivered a valid report.
    pub best: Option<Schedule>,
    /// Rounds closed, including stagnant ones.
    pub rounds: u32,
    /// Value of the stagnation counter when the master stopped.
    pub stagnant_rounds: u32,
    /// Number of strict global-best improvements after the first report.
    pub improvements: u32,
    /// Every global-best objective adopted, in order.
    pub history: Vec<u64>,
    /// Connections accepted over the run.
    pub workers_seen: usize,
}

impl MasterReport {
    pub fn best_objective(&self) -> Option<u64> {
        self.best.as_ref().map(Solution::objective)
    }
}

#[derive(Debug)]
enum Event {
    Report { worker: usize, frame: Frame },
    Disconnected { worker: usize },
}

#[derive(Debug, Clone)]
enum Beacon {
    Idle,
    /// Encoded BEST frame carrying the global best.
    Best(Arc<Vec<u8>>),
    Stop,
}

struct Round {
    awaiting: HashSet<usize>,
    reports: usize,
    improved: bool,
    deadline: Instant,
}

impl Round {
    fn open(live: &HashSet<usize>, timeout: Duration) -> Self {
        Self {
            awaiting: live.clone(),
            reports: 0,
            improved: false,
            deadline: Instant::now() + timeout,
        }
    }
}

/// Binds the coordinator socket.
///
/// A leftover socket file that nobody accepts on is removed and the bind
/// retried once. If another master is listening, binding fails.
pub async fn bind(path: &Path) -> Result<UnixListener> {
    let bind_error = |source| Error::Bind {
        path: path.to_path_buf(),
        source,
    };
    match UnixListener::bind(path) {
        Ok(listener) => Ok(listener),
        Err(e) if e.kind() == ErrorKind::AddrInUse => {
            if std::os::unix::net::UnixStream::connect(path).is_ok() {
                return Err(bind_error(e));
            }
            tracing::warn!(path = %path.display(), "removing stale coordinator socket");
            std::fs::remove_file(path).map_err(bind_error)?;
            UnixListener::bind(path).map_err(bind_error)
        }
        Err(e) => Err(bind_error(e)),
    }
}

/// Coordinator state machine; see the module docs.
pub struct Master {
    instance: Arc<Instance>,
    outer_patience: u32,
    round_timeout: Duration,
}

impl Master {
    pub fn new(instance: Arc<Instance>, params: &ParParams) -> Self {
        Self {
            instance,
            outer_patience: params.outer_patience,
            round_timeout: params.round_timeout,
        }
    }

    /// Serves workers on `listener` until outer patience is exhausted.
    pub async fn serve(&self, listener: UnixListener) -> MasterReport {
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let (beacon, _) = watch::channel(Beacon::Idle);
        let mut readers = JoinSet::new();
        let mut writers = JoinSet::new();

        let mut live = HashSet::new();
        let mut ever_connected = false;
        let mut next_id = 0usize;
        let mut accept_failures = 0u32;
        let mut round = Round::open(&live, self.round_timeout);

        let mut report = MasterReport {
            best: None,
            rounds: 0,
            stagnant_rounds: 0,
            improvements: 0,
            history: Vec::new(),
            workers_seen: 0,
        };

        tracing::info!(
            jobs = self.instance.jobs(),
            machines = self.instance.machines(),
            outer_patience = self.outer_patience,
            "master listening"
        );

        while report.stagnant_rounds < self.outer_patience {
            let closable = round.awaiting.is_empty()
                && (round.reports > 0 || (ever_connected && live.is_empty()));
            if closable {
                self.close_round(&mut round, &mut report, &live, false);
                continue;
            }

            tokio::select! {
                biased;
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        accept_failures = 0;
                        let worker = next_id;
                        next_id += 1;
                        ever_connected = true;
                        report.workers_seen += 1;
                        live.insert(worker);
                        if round.reports == 0 {
                            round.awaiting.insert(worker);
                        }
                        tracing::info!(worker, "worker connected");

                        let (read_half, write_half) = stream.into_split();
                        readers.spawn(read_loop(read_half, worker, events_tx.clone()));
                        writers.spawn(write_loop(write_half, worker, beacon.subscribe()));
                    }
                    Err(e) => {
                        let pause = accept_backoff(accept_failures);
                        accept_failures = accept_failures.saturating_add(1);
                        tracing::warn!(error = %e, pause_ms = pause.as_millis() as u64, "accept failed");
                        tokio::time::sleep(pause).await;
                    }
                },
                Some(event) = events.recv() => match event {
                    Event::Report { worker, frame } => {
                        round.awaiting.remove(&worker);
                        round.reports += 1;
                        self.handle_report(worker, frame, &mut round, &mut report, &beacon);
                    }
                    Event::Disconnected { worker } => {
                        live.remove(&worker);
                        round.awaiting.remove(&worker);
                        tracing::info!(worker, remaining = live.len(), "worker disconnected");
                    }
                },
                _ = tokio::time::sleep_until(round.deadline) => {
                    self.close_round(&mut round, &mut report, &live, true);
                }
            }
        }

        tracing::info!(
            rounds = report.rounds,
            improvements = report.improvements,
            best = ?report.best_objective(),
            "outer patience exhausted, stopping workers"
        );
        beacon.send_replace(Beacon::Stop);
        let flushed = tokio::time::timeout(STOP_FLUSH_GRACE, async {
            while writers.join_next().await.is_some() {}
        })
        .await;
        if flushed.is_err() {
            tracing::warn!("some workers did not take the STOP frame in time");
        }
        readers.abort_all();
        report
    }

    fn handle_report(
        &self,
        worker: usize,
        frame: Frame,
        round: &mut Round,
        report: &mut MasterReport,
        beacon: &watch::Sender<Beacon>,
    ) {
        if frame.kind != FrameKind::Best {
            tracing::debug!(worker, kind = ?frame.kind, "ignoring frame from worker");
            return;
        }
        let candidate = match Schedule::decode(self.instance.clone(), &frame.payload) {
            Ok(candidate) => candidate,
            Err(e) => {
                tracing::warn!(worker, error = %e, "discarding malformed BEST");
                return;
            }
        };
        let objective = candidate.objective();
        if objective != frame.objective {
            tracing::warn!(
                worker,
                claimed = frame.objective,
                actual = objective,
                "discarding BEST with inconsistent objective"
            );
            return;
        }

        let improves = match report.best_objective() {
            None => false,
            Some(best) if objective < best => true,
            Some(_) => return,
        };
        if improves {
            round.improved = true;
            report.improvements += 1;
        }
        report.history.push(objective);
        report.best = Some(candidate);
        beacon.send_replace(Beacon::Best(Arc::new(Frame::best(objective, frame.payload).encode())));
        tracing::info!(worker, objective, "new global best");
    }

    fn close_round(
        &self,
        round: &mut Round,
        report: &mut MasterReport,
        live: &HashSet<usize>,
        timed_out: bool,
    ) {
        if timed_out && !round.awaiting.is_empty() {
            tracing::warn!(silent = ?round.awaiting, "round timed out waiting for workers");
        }
        report.rounds += 1;
        if round.improved {
            report.stagnant_rounds = 0;
        } else {
            report.stagnant_rounds += 1;
        }
        tracing::debug!(
            round = report.rounds,
            reports = round.reports,
            improved = round.improved,
            stagnant = report.stagnant_rounds,
            "round closed"
        );
        *round = Round::open(live, self.round_timeout);
    }
}

/// Backs off on persistent accept errors such as descriptor exhaustion,
/// which would otherwise fail again immediately.
fn accept_backoff(failures: u32) -> Duration {
    ACCEPT_BACKOFF
        .checked_mul(1u32 << failures.min(16))
        .map_or(MAX_ACCEPT_BACKOFF, |d| d.min(MAX_ACCEPT_BACKOFF))
}

async fn read_loop(mut reader: OwnedReadHalf, worker: usize, events: mpsc::UnboundedSender<Event>) {
    loop {
        let mut prefix = [0u8; 4];
        if let Err(e) = reader.read_exact(&mut prefix).await {
            if e.kind() != ErrorKind::UnexpectedEof {
                tracing::debug!(worker, error = %e, "read failed");
            }
            break;
        }
        let len = match wire::body_len(prefix) {
            Ok(len) => len,
            Err(e) => {
                tracing::warn!(worker, error = %e, "dropping connection");
                break;
            }
        };
        let mut body = vec![0u8; len];
        if let Err(e) = reader.read_exact(&mut body).await {
            tracing::debug!(worker, error = %e, "connection closed mid-frame");
            break;
        }
        match Frame::decode_body(&body) {
            Ok(frame) => {
                if events.send(Event::Report { worker, frame }).is_err() {
                    return;
                }
            }
            Err(e) => tracing::warn!(worker, error = %e, "discarding malformed frame"),
        }
    }
    let _ = events.send(Event::Disconnected { worker });
}

async fn write_loop(mut writer: OwnedWriteHalf, worker: usize, mut beacon: watch::Receiver<Beacon>) {
    loop {
        let current = beacon.borrow_and_update().clone();
        match current {
            Beacon::Idle => {}
            Beacon::Best(frame) => {
                if let Err(e) = writer.write_all(&frame).await {
                    tracing::debug!(worker, error = %e, "broadcast failed");
                    return;
                }
            }
            Beacon::Stop => {
                let _ = writer.write_all(&Frame::stop().encode()).await;
                let _ = writer.shutdown().await;
                return;
            }
        }
        if beacon.changed().await.is_err() {
            return;
        }
    }
}
