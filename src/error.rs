//! Error taxonomy.
//!
//! [`Error`] covers everything that can abort a run: invalid instances or
//! parameters, file I/O and the master's socket bind. [`DecodeError`] and
//! [`WireError`] describe malformed payloads and frames; the coordinator
//! logs and discards those instead of propagating them.

use std::path::PathBuf;

use thiserror::Error;

/// Fatal errors surfaced to the caller of a driver.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid instance: {0}")]
    InvalidInstance(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read or write CSV file {path:?}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to bind coordinator socket {path:?}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed message: {0}")]
    Wire(#[from] WireError),

    #[error("malformed solution payload: {0}")]
    Decode(#[from] DecodeError),

    #[error("no worker reported a solution")]
    NoSolution,
}

/// Reasons a serialized solution is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("payload truncated: needed {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("bad magic 0x{0:08X}")]
    BadMagic(u32),

    #[error("checksum mismatch: stored 0x{stored:08X}, computed 0x{computed:08X}")]
    Checksum { stored: u32, computed: u32 },

    #[error("unsupported codec version {0}")]
    UnsupportedVersion(u8),

    #[error("job count mismatch: instance has {expected}, payload has {found}")]
    JobCount { expected: u32, found: u32 },

    #[error("machine count mismatch: instance has {expected}, payload has {found}")]
    MachineCount { expected: u32, found: u32 },

    #[error("job index {job} out of range for {jobs} jobs")]
    JobOutOfRange { job: u32, jobs: u32 },

    #[error("job {0} assigned more than once")]
    DuplicateJob(u32),

    #[error("{missing} jobs are not assigned to any machine")]
    MissingJobs { missing: usize },

    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),
}

/// Reasons a coordinator frame is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("frame body of {0} bytes exceeds limit")]
    Oversized(usize),

    #[error("frame body of {0} bytes is shorter than the header")]
    ShortBody(usize),

    #[error("unknown frame kind {0}")]
    UnknownKind(u8),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
