//! Observable node metrics (spec §6 "Metrics"), published over a `watch` channel the way the
//! teacher's `RaftMetrics`/`Wait` pair does.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::timeout;

use crate::cluster::GroupState;
use crate::node::Status;
use crate::types::Index;
use crate::types::NodeId;
use crate::types::Term;

/// A point-in-time snapshot of a node's state, re-published on every state transition.
#[derive(Clone, Debug, PartialEq)]
pub struct RaftMetrics {
    pub id: NodeId,
    pub status: Status,
    pub current_term: Term,
    pub last_log_index: Index,
    pub applied_index: Index,
    pub committed_index: Index,
    pub current_leader: Option<NodeId>,
    pub group_state: GroupState,
}

impl RaftMetrics {
    pub fn new_initial(id: NodeId) -> Self {
        Self {
            id,
            status: Status::Follower,
            current_term: 0,
            last_log_index: 0,
            applied_index: 0,
            committed_index: 0,
            current_leader: None,
            group_state: GroupState::Unavailable,
        }
    }
}

/// Sender half owned by the Raft loop; cloned receivers are handed out to callers of
/// [`crate::raft::Raft::metrics`].
pub type MetricsTx = watch::Sender<RaftMetrics>;
pub type MetricsRx = watch::Receiver<RaftMetrics>;

pub fn channel(initial: RaftMetrics) -> (MetricsTx, MetricsRx) {
    watch::channel(initial)
}

/// Polls a [`MetricsRx`] for a condition, bounded by a timeout. Mirrors the teacher's `Wait`
/// helper used throughout its integration tests to await a leader election or a commit index.
#[derive(Clone)]
pub struct Wait {
    pub rx: MetricsRx,
    pub timeout: Duration,
}

impl Wait {
    pub fn new(rx: MetricsRx, timeout_duration: Duration) -> Self {
        Self { rx, timeout: timeout_duration }
    }

    /// Wait until `current_leader` is `Some`, returning the elected leader's id.
    pub async fn until_leader(&mut self) -> Result<NodeId, WaitError> {
        self.until(|m| m.current_leader).await
    }

    /// Wait until the applied index reaches at least `index`.
    pub async fn until_applied_at_least(&mut self, index: Index) -> Result<(), WaitError> {
        self.until(|m| if m.applied_index >= index { Some(()) } else { None }).await
    }

    /// Wait until this node's own status becomes `target`.
    pub async fn until_status(&mut self, target: crate::node::Status) -> Result<(), WaitError> {
        self.until(|m| if m.status == target { Some(()) } else { None }).await
    }

    /// Wait until `group_state` becomes `target` (spec §5 "Group-state refresh").
    pub async fn until_group_state(&mut self, target: GroupState) -> Result<(), WaitError> {
        self.until(|m| if m.group_state == target { Some(()) } else { None }).await
    }

    async fn until<T>(&mut self, mut pred: impl FnMut(&RaftMetrics) -> Option<T>) -> Result<T, WaitError> {
        if let Some(v) = pred(&self.rx.borrow()) {
            return Ok(v);
        }
        timeout(self.timeout, async {
            loop {
                self.rx.changed().await.map_err(|_| WaitError::ChannelClosed)?;
                if let Some(v) = pred(&self.rx.borrow()) {
                    return Ok(v);
                }
            }
        })
        .await
        .map_err(|_| WaitError::Timeout)?
    }
}

#[derive(thiserror::Error, Debug, Eq, PartialEq)]
pub enum WaitError {
    #[error("timed out waiting for condition")]
    Timeout,
    #[error("metrics channel closed")]
    ChannelClosed,
}
