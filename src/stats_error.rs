//! StatsError: Unified error type for region-stats public APIs
//!
//! Configuration faults, communication faults and consistency faults are all
//! reported through this type. Consistency faults indicate a logic or
//! ownership bug; callers are expected to abort the whole process mesh when
//! they see one rather than retry.

use thiserror::Error;

/// Unified error type for region-stats operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StatsError {
    /// A setup parameter is missing or malformed.
    #[error("Configuration error: {0}")]
    Config(String),
    /// A region name was not found in the registry.
    #[error("Region ID `{0}` does not exist")]
    UnknownRegion(String),
    /// Sampling interval must be a positive number of steps.
    #[error("Illegal interval {0}: nevery must be a positive integer")]
    NonPositiveInterval(u64),
    /// `run` was called before `setup`.
    #[error("Aggregator used before setup")]
    NotSetUp,
    /// Message exchange with a peer failed.
    #[error("Communication error with rank {neighbor}: {source}")]
    CommError {
        neighbor: usize,
        #[source]
        source: CommFailure,
    },
    /// A peer rank aborted while this rank was blocked in a collective.
    #[error("Process mesh aborted by a failing rank")]
    CommAborted,
    /// `is_active` and the presence of the active communicator disagree.
    #[error("Active flag ({active}) disagrees with communicator presence ({has_comm}) on rank {rank}")]
    ActivityMismatch {
        rank: usize,
        active: bool,
        has_comm: bool,
    },
    /// An active rank holds a value that differs from the broadcast one.
    #[error("Rank {rank} holds {local} but the coordinator broadcast {broadcast}")]
    BroadcastMismatch {
        rank: usize,
        local: String,
        broadcast: String,
    },
    /// A triangle references an identifier absent from the vertex table.
    #[error("Vertex {0} referenced by a triangle is not in the global vertex table")]
    UnknownVertex(u64),
    /// Gathered vertex records do not match the table built at setup.
    #[error("Expected {expected} vertex records, gathered {found}")]
    VertexCountMismatch { expected: usize, found: usize },
    /// Output could not be written.
    #[error("I/O error: {0}")]
    Io(String),
}

/// Description of a communication failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct CommFailure(pub String);

impl From<String> for CommFailure {
    fn from(s: String) -> Self {
        CommFailure(s)
    }
}

impl From<&str> for CommFailure {
    fn from(s: &str) -> Self {
        CommFailure(s.to_owned())
    }
}

impl From<std::io::Error> for StatsError {
    fn from(e: std::io::Error) -> Self {
        StatsError::Io(e.to_string())
    }
}
