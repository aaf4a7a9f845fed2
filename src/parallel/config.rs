//! Coordinator configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Parameters of a master/worker run.
///
/// # Examples
///
/// ```
/// use k2_anneal::parallel::ParParams;
/// use std::time::Duration;
///
/// let params = ParParams::default()
///     .with_workers(3)
///     .with_outer_patience(5)
///     .with_socket_path("/tmp/k2-demo.sock")
///     .with_round_timeout(Duration::from_secs(5));
/// assert!(params.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParParams {
    /// Number of worker processes.
    pub workers: u32,

    /// Consecutive rounds without a global improvement before the master
    /// stops every worker.
    pub outer_patience: u32,

    /// Filesystem path of the master's Unix socket.
    pub socket_path: PathBuf,

    /// Longest the master waits for every live worker to report before it
    /// closes a round anyway.
    pub round_timeout: Duration,
}

impl Default for ParParams {
    fn default() -> Self {
        Self {
            workers: 4,
            outer_patience: 10,
            socket_path: PathBuf::from("/tmp/sa.sock"),
            round_timeout: Duration::from_secs(30),
        }
    }
}

impl ParParams {
    pub fn with_workers(mut self, n: u32) -> Self {
        self.workers = n;
        self
    }

    pub fn with_outer_patience(mut self, n: u32) -> Self {
        self.outer_patience = n;
        self
    }

    pub fn with_socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket_path = path.into();
        self
    }

    pub fn with_round_timeout(mut self, timeout: Duration) -> Self {
        self.round_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::InvalidConfig("at least one worker is required".into()));
        }
        if self.outer_patience == 0 {
            return Err(Error::InvalidConfig("outer_patience must be at least 1".into()));
        }
        if self.socket_path.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("socket_path must not be empty".into()));
        }
        if self.round_timeout.is_zero() {
            return Err(Error::InvalidConfig("round_timeout must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = ParParams::default();
        assert_eq!(params.workers, 4);
        assert_eq!(params.outer_patience, 10);
        assert_eq!(params.socket_path, PathBuf::from("/tmp/sa.sock"));
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zeroes() {
        assert!(ParParams::default().with_workers(0).validate().is_err());
        assert!(ParParams::default().with_outer_patience(0).validate().is_err());
        assert!(ParParams::default().with_socket_path("").validate().is_err());
        assert!(ParParams::default()
            .with_round_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }
}
