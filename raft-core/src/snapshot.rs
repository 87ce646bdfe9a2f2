//! Snapshot lifecycle orchestration (spec §4.8 "Snapshotting", §6 `minSnapshotsRetention`).

use std::sync::Arc;

use tracing::info;

use crate::error::WalError;
use crate::state_machine::StateMachine;
use crate::types::Index;
use crate::types::Snapshot;
use crate::types::SnapshotMetadata;
use crate::types::Term;
use crate::wal::Wal;

/// Drives the save-then-compact-then-prune sequence a leader (or a replaying follower) runs once
/// the log has grown past `snapshot_threshold_entries` (spec §4.8).
pub struct Snapshotter<W, S> {
    wal: Arc<W>,
    state_machine: Arc<S>,
    min_retention: usize,
}

impl<W, S> Snapshotter<W, S>
where
    W: Wal,
    S: StateMachine,
{
    pub fn new(wal: Arc<W>, state_machine: Arc<S>, min_retention: u64) -> Self {
        Self { wal, state_machine, min_retention: min_retention as usize }
    }

    /// Take a snapshot as of `(index, term)`, persist it, compact the log and WAL up to that
    /// point, and prune old snapshots beyond `min_retention` (spec §4.8, §6).
    ///
    /// Ordering matters: the snapshot must be durable before the log it replaces is compacted,
    /// or a crash between the two steps would lose data no snapshot covers (spec §7 "ordering
    /// invariants").
    pub async fn save_and_compact(&self, index: Index, term: Term) -> Result<(), WalError> {
        let data = self.state_machine.snapshot_data().await.map_err(|source| WalError { index, source })?;
        let snapshot = Snapshot { meta: SnapshotMetadata { index, term }, data };

        self.wal.save_snapshot(snapshot).await.map_err(|source| WalError { index, source })?;
        self.wal.compact(index).await.map_err(|source| WalError { index, source })?;
        info!(index, term, "snapshot saved and log compacted");

        self.prune().await.map_err(|source| WalError { index, source })?;
        Ok(())
    }

    async fn prune(&self) -> anyhow::Result<()> {
        self.wal.prune_snapshots(self.min_retention.max(1)).await
    }
}
