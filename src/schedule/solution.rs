//! Job-to-machine assignment and the K2 objective.

use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;

use super::instance::Instance;
use crate::error::DecodeError;
use crate::sa::Solution;

/// K2 criterion: for every machine, walk its order accumulating the
/// running completion time and add it to the total after each job.
///
/// Depends only on the per-machine orders, so it doubles as an oracle
/// independent of the incidence matrix.
///
/// # Examples
///
/// ```
/// use k2_anneal::schedule::{k2_objective, Instance};
///
/// let instance = Instance::new(vec![3, 1, 4, 2], 2).unwrap();
/// // machine 0: 1 then 3 (C = 1, 3); machine 1: 0 then 2 (C = 3, 7)
/// assert_eq!(k2_objective(&instance, &[vec![1, 3], vec![0, 2]]), 14);
/// ```
pub fn k2_objective(instance: &Instance, orders: &[Vec<u32>]) -> u64 {
    let times = instance.times();
    let mut sum = 0u64;
    for order in orders {
        let mut completion = 0u64;
        for &job in order {
            completion += u64::from(times[job as usize]);
            sum += completion;
        }
    }
    sum
}

/// Checks that `orders` has one sequence per machine and holds every job
/// of `instance` exactly once.
pub fn validate_orders(instance: &Instance, orders: &[Vec<u32>]) -> Result<(), DecodeError> {
    let jobs = instance.jobs();
    if orders.len() != instance.machines() as usize {
        return Err(DecodeError::MachineCount {
            expected: instance.machines(),
            found: orders.len() as u32,
        });
    }
    let mut seen = vec![false; jobs as usize];
    let mut count = 0usize;
    for &job in orders.iter().flatten() {
        if job >= jobs {
            return Err(DecodeError::JobOutOfRange { job, jobs });
        }
        if std::mem::replace(&mut seen[job as usize], true) {
            return Err(DecodeError::DuplicateJob(job));
        }
        count += 1;
    }
    if count != jobs as usize {
        return Err(DecodeError::MissingJobs {
            missing: jobs as usize - count,
        });
    }
    Ok(())
}

/// A candidate schedule in two synchronized representations:
///
/// - an `N x M` binary incidence matrix, row = job, column = machine,
///   exactly one 1 per row;
/// - per-machine job orders (execution sequence on each machine).
///
/// Every job appears exactly once across all orders, on the machine its
/// matrix row marks. Mutation operators keep both sides in step; code that
/// edits one side directly restores the other with
/// [`rebuild_incidence_from_orders`](Schedule::rebuild_incidence_from_orders)
/// or [`rebuild_orders_from_incidence`](Schedule::rebuild_orders_from_incidence).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    instance: Arc<Instance>,
    /// Row-major: `incidence[job * M + machine]`.
    incidence: Vec<u8>,
    orders: Vec<Vec<u32>>,
}

impl Schedule {
    /// Uniform random machine for every job, then a random order on each
    /// machine.
    pub fn random<R: Rng>(instance: Arc<Instance>, rng: &mut R) -> Self {
        let machines = instance.machines() as usize;
        let jobs = instance.jobs() as usize;
        let mut schedule = Self {
            incidence: vec![0; jobs * machines],
            orders: vec![Vec::new(); machines],
            instance,
        };
        schedule.randomize(rng);
        schedule
    }

    /// Builds a schedule from explicit orders, rejecting anything that is
    /// not a valid assignment for `instance`.
    pub fn from_orders(
        instance: Arc<Instance>,
        orders: Vec<Vec<u32>>,
    ) -> Result<Self, DecodeError> {
        validate_orders(&instance, &orders)?;
        let cells = instance.jobs() as usize * instance.machines() as usize;
        let mut schedule = Self {
            incidence: vec![0; cells],
            orders,
            instance,
        };
        schedule.rebuild_incidence_from_orders();
        Ok(schedule)
    }

    /// Re-draws the whole assignment in place.
    pub fn randomize<R: Rng>(&mut self, rng: &mut R) {
        let machines = self.instance.machines();
        for order in &mut self.orders {
            order.clear();
        }
        for job in 0..self.instance.jobs() {
            let machine = rng.random_range(0..machines);
            self.orders[machine as usize].push(job);
        }
        for order in &mut self.orders {
            order.shuffle(rng);
        }
        self.rebuild_incidence_from_orders();
    }

    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    /// Job orders, one sequence per machine.
    pub fn orders(&self) -> &[Vec<u32>] {
        &self.orders
    }

    pub fn order(&self, machine: u32) -> &[u32] {
        &self.orders[machine as usize]
    }

    /// Row-major `N x M` incidence matrix.
    pub fn incidence(&self) -> &[u8] {
        &self.incidence
    }

    pub fn is_assigned(&self, job: u32, machine: u32) -> bool {
        let m = self.instance.machines() as usize;
        self.incidence[job as usize * m + machine as usize] == 1
    }

    /// Machine marked in `job`'s incidence row.
    pub fn machine_of(&self, job: u32) -> Option<u32> {
        let m = self.instance.machines() as usize;
        let row = &self.incidence[job as usize * m..(job as usize + 1) * m];
        row.iter().position(|&cell| cell == 1).map(|machine| machine as u32)
    }

    /// Reassigns `job` to `machine` in the incidence matrix only.
    ///
    /// The orders are stale until
    /// [`rebuild_orders_from_incidence`](Schedule::rebuild_orders_from_incidence)
    /// runs.
    pub fn set_incidence(&mut self, job: u32, machine: u32) {
        let m = self.instance.machines() as usize;
        let row = &mut self.incidence[job as usize * m..(job as usize + 1) * m];
        row.fill(0);
        row[machine as usize] = 1;
    }

    /// Recomputes the incidence matrix from the orders.
    pub fn rebuild_incidence_from_orders(&mut self) {
        let m = self.instance.machines() as usize;
        self.incidence.fill(0);
        for (machine, order) in self.orders.iter().enumerate() {
            for &job in order {
                self.incidence[job as usize * m + machine] = 1;
            }
        }
    }

    /// Recomputes the orders from the incidence matrix.
    ///
    /// Jobs that stay on their machine keep their relative order; jobs the
    /// matrix moved elsewhere are appended to their new machine in index
    /// order. Assumes every matrix row has exactly one 1.
    pub fn rebuild_orders_from_incidence(&mut self) {
        let m = self.instance.machines() as usize;
        let jobs = self.instance.jobs() as usize;
        let mut placed = vec![false; jobs];
        for (machine, order) in self.orders.iter_mut().enumerate() {
            order.retain(|&job| {
                let keep = self.incidence[job as usize * m + machine] == 1 && !placed[job as usize];
                if keep {
                    placed[job as usize] = true;
                }
                keep
            });
        }
        for job in 0..jobs as u32 {
            if placed[job as usize] {
                continue;
            }
            if let Some(machine) = self.machine_of(job) {
                self.orders[machine as usize].push(job);
            }
        }
    }

    /// Whether the orders form a valid assignment and the incidence matrix
    /// encodes the same one.
    pub fn is_consistent(&self) -> bool {
        if validate_orders(&self.instance, &self.orders).is_err() {
            return false;
        }
        let m = self.instance.machines() as usize;
        if self.incidence.len() != self.instance.jobs() as usize * m {
            return false;
        }
        let row_sums_ok = self
            .incidence
            .chunks(m)
            .all(|row| row.iter().map(|&c| c as u32).sum::<u32>() == 1);
        row_sums_ok
            && self
                .orders
                .iter()
                .enumerate()
                .all(|(machine, order)| order.iter().all(|&job| self.is_assigned(job, machine as u32)))
    }

    /// Completion time of every job, indexed by job.
    pub fn completion_times(&self) -> Vec<u64> {
        let mut completions = vec![0u64; self.instance.jobs() as usize];
        for order in &self.orders {
            let mut clock = 0u64;
            for &job in order {
                clock += u64::from(self.instance.time(job));
                completions[job as usize] = clock;
            }
        }
        completions
    }

    /// Swaps two positions of one machine's order.
    pub(crate) fn swap_positions(&mut self, machine: usize, a: usize, b: usize) {
        self.orders[machine].swap(a, b);
    }

    /// Removes the job at `position` on `from` and inserts it at `insert_at`
    /// on `to`, updating its incidence row.
    pub(crate) fn relocate(&mut self, from: usize, position: usize, to: usize, insert_at: usize) {
        let job = self.orders[from].remove(position);
        self.orders[to].insert(insert_at, job);
        let m = self.instance.machines() as usize;
        self.incidence[job as usize * m + from] = 0;
        self.incidence[job as usize * m + to] = 1;
    }

    pub(crate) fn orders_len(&self, machine: usize) -> usize {
        self.orders[machine].len()
    }

    /// Replaces the orders wholesale. Callers must have validated them.
    pub(crate) fn replace_orders(&mut self, orders: Vec<Vec<u32>>) {
        self.orders = orders;
        self.rebuild_incidence_from_orders();
    }
}

impl Solution for Schedule {
    fn objective(&self) -> u64 {
        k2_objective(&self.instance, &self.orders)
    }
}
