//! Neighborhood moves on a [`Schedule`].
//!
//! Every operator keeps the schedule valid and degrades to a no-op when no
//! move of its kind exists (a single machine, or no machine with enough
//! jobs).

use std::fmt;
use std::str::FromStr;

use rand::Rng;

use super::solution::Schedule;
use crate::sa::Mutation;

/// Swaps two distinct positions within one machine's order.
///
/// The machine is drawn uniformly among those holding at least two jobs.
/// Only that machine's prefix sums change.
#[derive(Debug, Clone, Copy, Default)]
pub struct SwapInMachine;

impl Mutation<Schedule> for SwapInMachine {
    fn name(&self) -> &str {
        "swap-in-machine"
    }

    fn apply<R: Rng>(&self, schedule: &mut Schedule, rng: &mut R) {
        let machines = schedule.orders().len();
        let eligible = (0..machines)
            .filter(|&m| schedule.orders_len(m) >= 2)
            .count();
        if eligible == 0 {
            return;
        }
        let pick = rng.random_range(0..eligible);
        let Some(machine) = (0..machines)
            .filter(|&m| schedule.orders_len(m) >= 2)
            .nth(pick)
        else {
            return;
        };

        let len = schedule.orders_len(machine);
        let a = rng.random_range(0..len);
        let mut b = rng.random_range(0..len - 1);
        if b >= a {
            b += 1;
        }
        schedule.swap_positions(machine, a, b);
    }
}

/// Moves a random job from one machine to a random position on another.
#[derive(Debug, Clone, Copy, Default)]
pub struct MoveBetweenMachines;

impl Mutation<Schedule> for MoveBetweenMachines {
    fn name(&self) -> &str {
        "move-between-machines"
    }

    fn apply<R: Rng>(&self, schedule: &mut Schedule, rng: &mut R) {
        let machines = schedule.orders().len();
        if machines < 2 {
            return;
        }
        let non_empty = (0..machines)
            .filter(|&m| schedule.orders_len(m) > 0)
            .count();
        if non_empty == 0 {
            return;
        }
        let pick = rng.random_range(0..non_empty);
        let Some(source) = (0..machines)
            .filter(|&m| schedule.orders_len(m) > 0)
            .nth(pick)
        else {
            return;
        };
        let target = other_machine(source, machines, rng);

        let position = rng.random_range(0..schedule.orders_len(source));
        let insert_at = rng.random_range(0..=schedule.orders_len(target));
        schedule.relocate(source, position, target, insert_at);
    }
}

/// Reassigns a random job to a random other machine, at the position that
/// adds the least K2 on that machine.
///
/// Inserting job `j` at position `p` of a `k`-job order adds
/// `P_p + t_j * (k - p + 1)`, where `P_p` is the processing time of the
/// first `p` jobs: `j` completes at `P_p + t_j` and pushes back the
/// remaining `k - p` jobs by `t_j` each. One pass over the target order
/// finds the minimum.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReassignGreedy;

impl Mutation<Schedule> for ReassignGreedy {
    fn name(&self) -> &str {
        "reassign-greedy"
    }

    fn apply<R: Rng>(&self, schedule: &mut Schedule, rng: &mut R) {
        let machines = schedule.orders().len();
        if machines < 2 {
            return;
        }
        let job = rng.random_range(0..schedule.instance().jobs());
        let Some(source) = schedule.machine_of(job).map(|m| m as usize) else {
            return;
        };
        let Some(position) = schedule.orders()[source].iter().position(|&j| j == job) else {
            return;
        };
        let target = other_machine(source, machines, rng);

        let insert_at = best_insertion(schedule, target, job);
        schedule.relocate(source, position, target, insert_at);
    }
}

/// Position on `machine` where inserting `job` adds the least K2.
/// Ties go to the earliest position.
fn best_insertion(schedule: &Schedule, machine: usize, job: u32) -> usize {
    let instance = schedule.instance();
    let order = &schedule.orders()[machine];
    let t_job = u64::from(instance.time(job));
    let k = order.len() as u64;

    let mut best_position = 0usize;
    let mut best_delta = t_job * (k + 1);
    let mut prefix = 0u64;
    for (p, &other) in order.iter().enumerate() {
        prefix += u64::from(instance.time(other));
        let p = p as u64 + 1;
        let delta = prefix + t_job * (k - p + 1);
        if delta < best_delta {
            best_delta = delta;
            best_position = p as usize;
        }
    }
    best_position
}

/// Uniform machine index different from `current`.
fn other_machine<R: Rng>(current: usize, machines: usize, rng: &mut R) -> usize {
    let candidate = rng.random_range(0..machines - 1);
    if candidate >= current {
        candidate + 1
    } else {
        candidate
    }
}

/// Neighborhood selection, usable wherever a mutation must be named or
/// shipped to another process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Neighborhood {
    /// See [`SwapInMachine`].
    SwapInMachine,
    /// See [`MoveBetweenMachines`].
    #[default]
    MoveBetweenMachines,
    /// See [`ReassignGreedy`].
    ReassignGreedy,
    /// Picks one of the three operators uniformly per application.
    Mixed,
}

impl Neighborhood {
    pub const ALL: [Neighborhood; 4] = [
        Neighborhood::SwapInMachine,
        Neighborhood::MoveBetweenMachines,
        Neighborhood::ReassignGreedy,
        Neighborhood::Mixed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Neighborhood::SwapInMachine => "swap",
            Neighborhood::MoveBetweenMachines => "move",
            Neighborhood::ReassignGreedy => "greedy",
            Neighborhood::Mixed => "mixed",
        }
    }
}

impl Mutation<Schedule> for Neighborhood {
    fn name(&self) -> &str {
        self.as_str()
    }

    fn apply<R: Rng>(&self, schedule: &mut Schedule, rng: &mut R) {
        match self {
            Neighborhood::SwapInMachine => SwapInMachine.apply(schedule, rng),
            Neighborhood::MoveBetweenMachines => MoveBetweenMachines.apply(schedule, rng),
            Neighborhood::ReassignGreedy => ReassignGreedy.apply(schedule, rng),
            Neighborhood::Mixed => match rng.random_range(0..3u8) {
                0 => SwapInMachine.apply(schedule, rng),
                1 => MoveBetweenMachines.apply(schedule, rng),
                _ => ReassignGreedy.apply(schedule, rng),
            },
        }
    }
}

impl fmt::Display for Neighborhood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Neighborhood {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Neighborhood::ALL
            .into_iter()
            .find(|n| n.as_str() == s)
            .ok_or_else(|| format!("unknown neighborhood '{s}' (expected swap, move, greedy or mixed)"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sa::Solution;
    use crate::schedule::Instance;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::sync::Arc;

    fn rng(seed: u64) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(seed)
    }

    fn schedule(times: Vec<u32>, orders: Vec<Vec<u32>>) -> Schedule {
        let machines = orders.len() as u32;
        let instance = Arc::new(Instance::new(times, machines).unwrap());
        Schedule::from_orders(instance, orders).unwrap()
    }

    fn job_sets(s: &Schedule) -> Vec<Vec<u32>> {
        s.orders()
            .iter()
            .map(|o| {
                let mut v = o.clone();
                v.sort_unstable();
                v
            })
            .collect()
    }

    #[test]
    fn test_swap_keeps_machine_contents() {
        let mut s = schedule(vec![1, 2, 3, 4, 5], vec![vec![0, 1, 2], vec![3, 4]]);
        let before = job_sets(&s);
        let mut r = rng(1);
        for _ in 0..50 {
            let prev = s.clone();
            SwapInMachine.apply(&mut s, &mut r);
            assert_ne!(s.orders(), prev.orders(), "swap of distinct positions must change an order");
            assert_eq!(job_sets(&s), before);
            assert!(s.is_consistent());
        }
    }

    #[test]
    fn test_swap_noop_when_no_machine_has_two_jobs() {
        let mut s = schedule(vec![1, 2], vec![vec![0], vec![1], vec![]]);
        let before = s.clone();
        SwapInMachine.apply(&mut s, &mut rng(7));
        assert_eq!(s, before);
    }

    #[test]
    fn test_move_shifts_one_job() {
        let mut s = schedule(vec![1, 2, 3, 4], vec![vec![0, 1], vec![2, 3], vec![]]);
        let mut r = rng(3);
        for _ in 0..50 {
            let before: Vec<usize> = s.orders().iter().map(Vec::len).collect();
            MoveBetweenMachines.apply(&mut s, &mut r);
            let after: Vec<usize> = s.orders().iter().map(Vec::len).collect();
            let diff: i64 = before
                .iter()
                .zip(&after)
                .map(|(&b, &a)| (a as i64 - b as i64).abs())
                .sum();
            assert_eq!(diff, 2);
            assert!(s.is_consistent());
        }
    }

    #[test]
    fn test_single_machine_moves_are_noops() {
        let mut s = schedule(vec![4, 2, 7], vec![vec![0, 1, 2]]);
        let before = s.clone();
        let mut r = rng(11);
        MoveBetweenMachines.apply(&mut s, &mut r);
        ReassignGreedy.apply(&mut s, &mut r);
        assert_eq!(s, before);
    }

    #[test]
    fn test_greedy_inserts_at_cheapest_position() {
        let times = vec![5, 1, 3, 8, 2, 6];
        let mut s = schedule(times.clone(), vec![vec![0, 1, 2], vec![3, 4, 5]]);
        let mut r = rng(5);
        for _ in 0..30 {
            let before = s.clone();
            ReassignGreedy.apply(&mut s, &mut r);
            assert!(s.is_consistent());

            let moved = (0..times.len() as u32)
                .find(|&j| before.machine_of(j) != s.machine_of(j))
                .expect("greedy reassignment must move a job");
            let target = s.machine_of(moved).unwrap() as usize;
            let order = &s.orders()[target];
            let at = order.iter().position(|&j| j == moved).unwrap();

            let mut without = order.clone();
            without.remove(at);
            let local = |o: &Vec<u32>| {
                let mut c = 0u64;
                o.iter()
                    .map(|&j| {
                        c += u64::from(times[j as usize]);
                        c
                    })
                    .sum::<u64>()
            };
            let chosen = local(order);
            for p in 0..=without.len() {
                let mut alt = without.clone();
                alt.insert(p, moved);
                assert!(chosen <= local(&alt), "position {at} is not the cheapest");
            }
        }
    }

    #[test]
    fn test_greedy_matches_spt_on_target() {
        // Target machine holds sorted times; the cheapest spot keeps it sorted.
        let s = schedule(vec![1, 3, 5, 4], vec![vec![0, 1, 2], vec![3]]);
        assert_eq!(best_insertion(&s, 0, 3), 2);
    }

    #[test]
    fn test_neighborhood_parse() {
        for n in Neighborhood::ALL {
            assert_eq!(n.as_str().parse::<Neighborhood>().unwrap(), n);
        }
        assert!("shuffle".parse::<Neighborhood>().is_err());
    }

    proptest! {
        #[test]
        fn prop_mutations_preserve_job_uniqueness(
            times in prop::collection::vec(1u32..30, 2..25),
            machines in 1u32..5,
            seed in any::<u64>(),
        ) {
            let instance = Arc::new(Instance::new(times, machines).unwrap());
            let mut r = rng(seed);
            let mut s = Schedule::random(instance, &mut r);
            for n in Neighborhood::ALL {
                for _ in 0..20 {
                    n.apply(&mut s, &mut r);
                    prop_assert!(s.is_consistent());
                }
            }
            let total: u64 = s.completion_times().iter().sum();
            prop_assert_eq!(s.objective(), total);
        }
    }
}
