//! The error taxonomy (spec §7 "Error Handling Design").

use thiserror::Error;

use crate::types::NodeId;

/// Errors raised by [`crate::config::Config`] construction. Configuration errors are fatal at
/// construction time and never surface once a node has started (spec §7 "Configuration errors").
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum ConfigError {
    #[error("node id must be a positive integer, got {0}")]
    InvalidId(NodeId),

    #[error("duplicate node id {0} in cluster configuration")]
    DuplicateId(NodeId),

    #[error("cluster configuration must name at least one member")]
    EmptyCluster,

    #[error("this node's id {0} is not present in the cluster configuration")]
    SelfNotInCluster(NodeId),

    #[error("minSnapshotsRetention must be > 0, got {0}")]
    InvalidSnapshotRetention(u64),

    #[error("election timeout range is invalid: min={min}ms must be < max={max}ms")]
    InvalidElectionTimeoutRange { min: u64, max: u64 },

    #[error("ringBufferSize is required and must be > 0 when storageType=COMBINATION")]
    MissingRingBufferSize,
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Errors surfaced by the public [`crate::raft::Raft`] handle and the Raft loop.
///
/// A `RaftError::ShuttingDown` indicates the node is tearing down, usually in reaction to a fatal
/// storage error; callers should stop issuing new requests once observed (spec §7 "Propagation
/// policy").
#[derive(Error, Debug)]
pub enum RaftError {
    #[error("raft node is shutting down")]
    ShuttingDown,

    #[error("fatal write-ahead log error: {0}")]
    Wal(#[from] anyhow::Error),

    #[error("this node is not the leader; current leader is {0:?}")]
    NotLeader(Option<NodeId>),

    #[error("request channel is unavailable")]
    ChannelClosed,
}

pub type RaftResult<T> = std::result::Result<T, RaftError>;

/// Result of submitting a client proposal (spec §6 `propose(bytes) -> future`).
#[derive(Error, Debug)]
pub enum ClientWriteError {
    #[error(transparent)]
    RaftError(#[from] RaftError),

    #[error("request must be forwarded to leader {0:?}")]
    ForwardToLeader(Option<NodeId>),
}

/// Result of a linearizable-read guard request (spec §6 `client_read`).
#[derive(Error, Debug)]
pub enum ClientReadError {
    #[error(transparent)]
    RaftError(#[from] RaftError),

    #[error("request must be forwarded to leader {0:?}")]
    ForwardToLeader(Option<NodeId>),

    /// This node is the leader but has not yet replayed enough of its own term to answer a
    /// linearizable read (spec §4.3 "Leader lease", I6).
    #[error("leader has not yet cleared its replay barrier")]
    NotYetReplayed,
}

/// A write-ahead log append failure (spec §7 "WAL failures"). The batch that produced this error
/// is rejected atomically: no messages are sent, no apply is enqueued, `stableIndex` does not
/// advance.
#[derive(Error, Debug)]
#[error("wal append failed at index {index}: {source}")]
pub struct WalError {
    pub index: crate::types::Index,
    #[source]
    pub source: anyhow::Error,
}
