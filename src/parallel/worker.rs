//! Worker: one annealer that syncs with the master between epochs.
//!
//! An epoch is a full cooling run. After each epoch the worker reports its
//! best, drains whatever the master sent meanwhile without blocking, and
//! adopts the newest global best if it is strictly better than its own.
//! A STOP frame ends the loop at the next epoch boundary.

use std::io::{self, ErrorKind, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::wire::{Frame, FrameBuffer, FrameKind};
use crate::error::Result;
use crate::sa::{Annealer, Mutation, SaParams, Solution, TemperatureSchedule};
use crate::schedule::{Instance, Schedule};

/// Everything a worker needs besides the instance and its operators.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    pub worker_id: u32,
    pub socket_path: PathBuf,
    /// Annealing parameters; `params.seed` seeds this worker's engine.
    pub params: SaParams,
    /// Seed of the initial solution, shared by all workers of a run.
    pub init_seed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSummary {
    pub worker_id: u32,
    pub epochs: usize,
    /// Global bests taken over from the master.
    pub adopted: usize,
    pub best_objective: u64,
    /// `false` if the connection was lost before a STOP arrived.
    pub stopped_by_master: bool,
}

/// Blocking client end of a master connection.
pub struct Link {
    stream: UnixStream,
    inbox: FrameBuffer,
}

/// Frames read by one [`Link::drain`].
#[derive(Debug, Default)]
pub struct Drained {
    pub frames: Vec<Frame>,
    /// The master closed the connection or the stream became unreadable.
    pub closed: bool,
}

impl Link {
    pub fn connect(path: &Path) -> io::Result<Self> {
        Ok(Self {
            stream: UnixStream::connect(path)?,
            inbox: FrameBuffer::new(),
        })
    }

    /// Writes one frame, blocking until it is fully sent. A frame the
    /// master would reject is refused with `InvalidInput` before any byte
    /// is written.
    pub fn send(&mut self, frame: &Frame) -> io::Result<()> {
        frame
            .check_len()
            .map_err(|e| io::Error::new(ErrorKind::InvalidInput, e))?;
        self.stream.set_nonblocking(false)?;
        self.stream.write_all(&frame.encode())?;
        self.stream.flush()
    }

    /// Reads everything currently available without blocking.
    pub fn drain(&mut self) -> io::Result<Drained> {
        let mut drained = Drained::default();
        self.stream.set_nonblocking(true)?;
        let mut chunk = [0u8; 8192];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    drained.closed = true;
                    break;
                }
                Ok(n) => self.inbox.extend(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::debug!(error = %e, "read from master failed");
                    drained.closed = true;
                    break;
                }
            }
        }
        self.stream.set_nonblocking(false)?;

        loop {
            match self.inbox.next_frame() {
                Ok(None) => break,
                Ok(Some(Ok(frame))) => drained.frames.push(frame),
                Ok(Some(Err(e))) => tracing::warn!(error = %e, "discarding malformed frame"),
                Err(e) => {
                    tracing::warn!(error = %e, "unrecoverable frame from master");
                    drained.closed = true;
                    break;
                }
            }
        }
        Ok(drained)
    }
}

/// Runs a worker until the master stops it or the connection drops.
///
/// Fails if the master cannot be reached at all, the parameters are invalid
/// or the best schedule no longer fits in a frame.
pub fn run_worker<M, T>(
    instance: Arc<Instance>,
    config: &WorkerConfig,
    mutation: M,
    schedule: T,
) -> Result<WorkerSummary>
where
    M: Mutation<Schedule>,
    T: TemperatureSchedule,
{
    instance.validate()?;
    let mut link = Link::connect(&config.socket_path)?;
    let initial = Schedule::random(
        instance.clone(),
        &mut ChaCha8Rng::seed_from_u64(config.init_seed),
    );
    let mut annealer = Annealer::new(initial, mutation, schedule, config.params.clone())?;

    let worker = config.worker_id;
    tracing::info!(worker, start = annealer.best_objective(), "worker connected");

    let mut epochs = 0usize;
    let mut adopted = 0usize;
    let mut stopped_by_master = false;

    loop {
        let outcome = annealer.run();
        epochs += 1;

        let best = annealer.best();
        let report = Frame::best(best.objective(), best.serialize());
        report.check_len()?;
        if let Err(e) = link.send(&report) {
            // A STOP may already be buffered if the master hung up first.
            stopped_by_master = link
                .drain()
                .map(|d| d.frames.iter().any(|f| f.kind == FrameKind::Stop))
                .unwrap_or(false);
            if !stopped_by_master {
                tracing::warn!(worker, error = %e, "master unreachable, retiring");
            }
            break;
        }
        tracing::debug!(worker, epoch = epochs, best = outcome.best_objective, "reported");

        let drained = match link.drain() {
            Ok(drained) => drained,
            Err(e) => {
                tracing::warn!(worker, error = %e, "connection failed, retiring");
                break;
            }
        };

        let mut latest = None;
        for frame in drained.frames {
            match frame.kind {
                FrameKind::Best => latest = Some(frame),
                FrameKind::Stop => stopped_by_master = true,
            }
        }
        if stopped_by_master {
            break;
        }

        if let Some(frame) = latest {
            if frame.objective < annealer.best_objective() {
                match Schedule::decode(instance.clone(), &frame.payload) {
                    Ok(global) => {
                        if annealer.adopt(global) {
                            adopted += 1;
                            tracing::debug!(worker, objective = frame.objective, "adopted global best");
                        }
                    }
                    Err(e) => tracing::warn!(worker, error = %e, "discarding malformed global best"),
                }
            }
        }

        if drained.closed {
            tracing::warn!(worker, "master closed the connection without STOP");
            break;
        }
    }

    let summary = WorkerSummary {
        worker_id: worker,
        epochs,
        adopted,
        best_objective: annealer.best_objective(),
        stopped_by_master,
    };
    tracing::info!(
        worker,
        epochs,
        adopted,
        best = summary.best_objective,
        "worker finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::wire::MAX_BODY_LEN;
    use crate::sa::Geometric;
    use crate::schedule::Neighborhood;
    use rand::Rng;
    use std::net::Shutdown;
    use std::os::unix::net::UnixListener;
    use std::thread;
    use tempfile::{tempdir, TempDir};

    fn scenario() -> Arc<Instance> {
        Arc::new(Instance::new(vec![3, 1, 4, 2], 2).unwrap())
    }

    fn frame_for(orders: Vec<Vec<u32>>) -> Frame {
        let schedule = Schedule::from_orders(scenario(), orders).unwrap();
        Frame::best(schedule.objective(), schedule.serialize())
    }

    struct Still;

    impl Mutation<Schedule> for Still {
        fn name(&self) -> &str {
            "still"
        }

        fn apply<R: Rng>(&self, _schedule: &mut Schedule, _rng: &mut R) {}
    }

    /// Master end of one worker connection.
    struct Peer {
        stream: UnixStream,
        inbox: FrameBuffer,
    }

    impl Peer {
        fn recv(&mut self) -> Frame {
            let mut chunk = [0u8; 4096];
            loop {
                if let Some(frame) = self.inbox.next_frame().unwrap() {
                    return frame.unwrap();
                }
                let n = self.stream.read(&mut chunk).unwrap();
                assert!(n > 0, "worker hung up");
                self.inbox.extend(&chunk[..n]);
            }
        }

        fn send(&mut self, frame: &Frame) {
            self.stream.write_all(&frame.encode()).unwrap();
        }

        /// Closes the write side and swallows reports until the worker leaves.
        fn hang_up(&mut self) {
            self.stream.shutdown(Shutdown::Write).unwrap();
            let mut chunk = [0u8; 4096];
            while matches!(self.stream.read(&mut chunk), Ok(n) if n > 0) {}
        }

        fn stop(&mut self) {
            self.send(&Frame::stop());
            self.hang_up();
        }
    }

    /// Binds a listener before the worker starts and runs `script` on the
    /// first connection. The script returns the objectives it observed.
    fn fake_master<F>(script: F) -> (TempDir, WorkerConfig, thread::JoinHandle<Vec<u64>>)
    where
        F: FnOnce(&mut Peer) -> Vec<u64> + Send + 'static,
    {
        let dir = tempdir().unwrap();
        let path = dir.path().join("master.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut peer = Peer {
                stream,
                inbox: FrameBuffer::new(),
            };
            script(&mut peer)
        });
        let config = WorkerConfig {
            worker_id: 0,
            socket_path: path,
            params: SaParams::default()
                .with_iterations_per_temperature(10)
                .with_patience(5),
            init_seed: suboptimal_seed(),
        };
        (dir, config, handle)
    }

    /// A seed whose random start is worse than the optimum of 13.
    fn suboptimal_seed() -> u64 {
        (0..)
            .find(|&seed| {
                Schedule::random(scenario(), &mut ChaCha8Rng::seed_from_u64(seed)).objective() > 13
            })
            .unwrap()
    }

    #[test]
    fn test_stop_ends_the_worker() {
        let (_dir, config, master) = fake_master(|peer| {
            let first = peer.recv();
            peer.stop();
            vec![first.objective]
        });

        let summary =
            run_worker(scenario(), &config, Neighborhood::Mixed, Geometric::default()).unwrap();
        let seen = master.join().unwrap();

        assert!(summary.stopped_by_master);
        assert!(summary.epochs >= 1);
        assert!(summary.best_objective <= seen[0]);
    }

    #[test]
    fn test_better_global_best_is_adopted() {
        let (_dir, config, master) = fake_master(|peer| {
            let first = peer.recv();
            peer.send(&frame_for(vec![vec![1, 0], vec![3, 2]]));
            let mut seen = vec![first.objective];
            while seen.last() != Some(&13) {
                seen.push(peer.recv().objective);
            }
            peer.stop();
            seen
        });

        let summary = run_worker(scenario(), &config, Still, Geometric::default()).unwrap();
        let seen = master.join().unwrap();

        assert!(seen[0] > 13);
        assert_eq!(summary.adopted, 1);
        assert_eq!(summary.best_objective, 13);
        assert!(summary.stopped_by_master);
    }

    #[test]
    fn test_global_best_with_understated_objective_is_not_adopted() {
        let (_dir, config, master) = fake_master(|peer| {
            let first = peer.recv();
            // [[2, 0, 3, 1], []] costs 30 but claims 1
            let mut lying = frame_for(vec![vec![2, 0, 3, 1], vec![]]);
            lying.objective = 1;
            peer.send(&lying);
            let second = peer.recv();
            let third = peer.recv();
            peer.stop();
            vec![first.objective, second.objective, third.objective]
        });

        let summary = run_worker(scenario(), &config, Still, Geometric::default()).unwrap();
        let seen = master.join().unwrap();

        assert_eq!(summary.adopted, 0);
        assert_eq!(summary.best_objective, seen[0]);
        assert!(seen.iter().all(|&objective| objective == seen[0]));
    }

    #[test]
    fn test_corrupt_global_best_is_discarded() {
        let (_dir, config, master) = fake_master(|peer| {
            let first = peer.recv();
            let mut corrupt = frame_for(vec![vec![1, 0], vec![3, 2]]);
            let last = corrupt.payload.len() - 1;
            corrupt.payload[last] ^= 0xff;
            peer.send(&corrupt);
            let second = peer.recv();
            let third = peer.recv();
            peer.stop();
            vec![first.objective, second.objective, third.objective]
        });

        let summary = run_worker(scenario(), &config, Still, Geometric::default()).unwrap();
        let seen = master.join().unwrap();

        assert_eq!(summary.adopted, 0);
        assert_eq!(summary.best_objective, seen[0]);
        assert!(summary.stopped_by_master);
    }

    #[test]
    fn test_hang_up_without_stop_retires_the_worker() {
        let (_dir, config, master) = fake_master(|peer| {
            let first = peer.recv();
            peer.hang_up();
            vec![first.objective]
        });

        let summary = run_worker(scenario(), &config, Still, Geometric::default()).unwrap();
        master.join().unwrap();

        assert!(!summary.stopped_by_master);
        assert!(summary.epochs >= 1);
    }

    #[test]
    fn test_unreachable_master_is_an_error() {
        let dir = tempdir().unwrap();
        let config = WorkerConfig {
            worker_id: 0,
            socket_path: dir.path().join("nobody.sock"),
            params: SaParams::default(),
            init_seed: 0,
        };
        assert!(run_worker(scenario(), &config, Still, Geometric::default()).is_err());
    }

    #[test]
    fn test_drain_reassembles_split_frames() {
        let (ours, mut theirs) = UnixStream::pair().unwrap();
        let mut link = Link {
            stream: ours,
            inbox: FrameBuffer::new(),
        };
        let best = frame_for(vec![vec![1, 3], vec![0, 2]]).encode();

        theirs.write_all(&best[..6]).unwrap();
        let drained = link.drain().unwrap();
        assert!(drained.frames.is_empty());
        assert!(!drained.closed);

        theirs.write_all(&best[6..]).unwrap();
        theirs.write_all(&Frame::stop().encode()).unwrap();
        let drained = link.drain().unwrap();
        assert_eq!(drained.frames.len(), 2);
        assert_eq!(drained.frames[0].objective, 14);
        assert_eq!(drained.frames[1].kind, FrameKind::Stop);

        drop(theirs);
        assert!(link.drain().unwrap().closed);
    }

    #[test]
    fn test_oversized_frame_is_refused_before_writing() {
        let (ours, mut theirs) = UnixStream::pair().unwrap();
        let mut link = Link {
            stream: ours,
            inbox: FrameBuffer::new(),
        };

        let err = link.send(&Frame::best(0, vec![0; MAX_BODY_LEN])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        theirs.set_nonblocking(true).unwrap();
        let mut chunk = [0u8; 16];
        let read = theirs.read(&mut chunk);
        assert!(matches!(read, Err(ref e) if e.kind() == ErrorKind::WouldBlock));
    }
}
