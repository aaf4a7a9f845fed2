//! Problem definition.

use crate::error::{Error, Result};

/// `N` jobs with known processing times on `M` identical machines.
///
/// The job identity is its index into [`times`](Instance::times).
/// Immutable once built; solutions share it through an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "RawInstance"))]
pub struct Instance {
    machines: u32,
    times: Vec<u32>,
}

/// Unchecked wire form; deserialized instances go through [`Instance::new`].
#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
struct RawInstance {
    machines: u32,
    times: Vec<u32>,
}

#[cfg(feature = "serde")]
impl TryFrom<RawInstance> for Instance {
    type Error = Error;

    fn try_from(raw: RawInstance) -> Result<Self> {
        Instance::new(raw.times, raw.machines)
    }
}

impl Instance {
    /// Builds and validates an instance.
    ///
    /// # Examples
    ///
    /// ```
    /// use k2_anneal::schedule::Instance;
    ///
    /// let instance = Instance::new(vec![3, 1, 4, 2], 2).unwrap();
    /// assert_eq!(instance.jobs(), 4);
    /// assert!(Instance::new(vec![3, 0], 2).is_err());
    /// ```
    pub fn new(times: Vec<u32>, machines: u32) -> Result<Self> {
        let instance = Self { machines, times };
        instance.validate()?;
        Ok(instance)
    }

    /// Checks the structural invariants: at least one job and one machine,
    /// every processing time positive, job count addressable as `u32`.
    pub fn validate(&self) -> Result<()> {
        if self.times.is_empty() {
            return Err(Error::InvalidInstance("instance has no jobs".into()));
        }
        if self.machines == 0 {
            return Err(Error::InvalidInstance("instance has no machines".into()));
        }
        if u32::try_from(self.times.len()).is_err() {
            return Err(Error::InvalidInstance(format!(
                "{} jobs exceed the supported maximum",
                self.times.len()
            )));
        }
        if let Some(job) = self.times.iter().position(|&t| t == 0) {
            return Err(Error::InvalidInstance(format!(
                "job {job} has a non-positive processing time"
            )));
        }
        Ok(())
    }

    /// Number of jobs `N`.
    pub fn jobs(&self) -> u32 {
        self.times.len() as u32
    }

    /// Number of machines `M`.
    pub fn machines(&self) -> u32 {
        self.machines
    }

    pub fn times(&self) -> &[u32] {
        &self.times
    }

    /// Processing time of `job`.
    ///
    /// # Panics
    /// Panics if `job` is out of range.
    pub fn time(&self, job: u32) -> u32 {
        self.times[job as usize]
    }

    pub fn total_time(&self) -> u64 {
        self.times.iter().map(|&t| u64::from(t)).sum()
    }
}
