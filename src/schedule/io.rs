//! Instance files and synthetic instances.
//!
//! Instance CSV: header row, then `job,time` per job. Rows may come in any
//! order but the job indices must be exactly `0..N`. The machine count is
//! not stored in the file; callers supply it.

use std::path::Path;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::instance::Instance;
use super::solution::Schedule;
use crate::error::{Error, Result};

fn csv_error(path: &Path, source: csv::Error) -> Error {
    Error::Csv {
        path: path.to_path_buf(),
        source,
    }
}

/// Reads an instance from a `job,time` CSV file.
pub fn load_csv(path: impl AsRef<Path>, machines: u32) -> Result<Instance> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| csv_error(path, e))?;

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| csv_error(path, e))?;
        let field = |i: usize, name: &str| -> Result<u32> {
            record
                .get(i)
                .ok_or_else(|| {
                    Error::InvalidInstance(format!("row {}: missing {name} column", line + 1))
                })?
                .parse::<u32>()
                .map_err(|e| Error::InvalidInstance(format!("row {}: bad {name}: {e}", line + 1)))
        };
        rows.push((field(0, "job")?, field(1, "time")?));
    }

    let mut times = vec![0u32; rows.len()];
    let mut seen = vec![false; rows.len()];
    for (job, time) in rows {
        let slot = job as usize;
        if slot >= times.len() {
            return Err(Error::InvalidInstance(format!(
                "job index {job} out of range for {} jobs",
                times.len()
            )));
        }
        if std::mem::replace(&mut seen[slot], true) {
            return Err(Error::InvalidInstance(format!("job {job} listed twice")));
        }
        times[slot] = time;
    }

    let instance = Instance::new(times, machines)?;
    tracing::debug!(
        path = %path.display(),
        jobs = instance.jobs(),
        machines,
        "loaded instance"
    );
    Ok(instance)
}

/// Writes `instance` as a `job,time` CSV file.
pub fn save_csv(path: impl AsRef<Path>, instance: &Instance) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;
    writer
        .write_record(["job", "time"])
        .map_err(|e| csv_error(path, e))?;
    for (job, time) in instance.times().iter().enumerate() {
        writer
            .write_record([job.to_string(), time.to_string()])
            .map_err(|e| csv_error(path, e))?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes one row per scheduled job:
/// `machine,position,job,time,completion`.
pub fn save_schedule_csv(path: impl AsRef<Path>, schedule: &Schedule) -> Result<()> {
    let path = path.as_ref();
    let instance = schedule.instance();
    let mut writer = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;
    writer
        .write_record(["machine", "position", "job", "time", "completion"])
        .map_err(|e| csv_error(path, e))?;
    for (machine, order) in schedule.orders().iter().enumerate() {
        let mut clock = 0u64;
        for (position, &job) in order.iter().enumerate() {
            let time = instance.time(job);
            clock += u64::from(time);
            writer
                .write_record([
                    machine.to_string(),
                    position.to_string(),
                    job.to_string(),
                    time.to_string(),
                    clock.to_string(),
                ])
                .map_err(|e| csv_error(path, e))?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Synthesizes an instance with processing times drawn uniformly from
/// `[min_time, max_time]`.
///
/// # Examples
///
/// ```
/// use k2_anneal::schedule::generate;
///
/// let a = generate(50, 4, 1, 100, 7).unwrap();
/// let b = generate(50, 4, 1, 100, 7).unwrap();
/// assert_eq!(a, b);
/// assert!(a.times().iter().all(|&t| (1..=100).contains(&t)));
/// ```
pub fn generate(
    jobs: u32,
    machines: u32,
    min_time: u32,
    max_time: u32,
    seed: u64,
) -> Result<Instance> {
    if min_time == 0 {
        return Err(Error::InvalidConfig("minimum processing time must be positive".into()));
    }
    if min_time > max_time {
        return Err(Error::InvalidConfig(format!(
            "time range [{min_time}, {max_time}] is empty"
        )));
    }
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let times = (0..jobs)
        .map(|_| rng.random_range(min_time..=max_time))
        .collect();
    Instance::new(times, machines)
}
