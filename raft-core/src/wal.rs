//! The write-ahead log storage contract (spec §5 "Persistence loop", §6 "storageType").
//!
//! Mirrors the shape of the teacher's `RaftStorage` trait: an async trait object the group-commit
//! loop drives, kept free of any in-process locking so implementations can batch and fsync on
//! their own terms.

use async_trait::async_trait;

use crate::types::Entry;
use crate::types::Index;
use crate::types::NodeId;
use crate::types::Snapshot;
use crate::types::SnapshotMetadata;
use crate::types::Term;

/// Durable state a [`Wal`] must persist and recover on restart (spec §3 "persistent state").
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct HardState {
    pub current_term: Term,
    pub voted_for: Option<NodeId>,
}

/// The durability contract driven by the group-commit loop (spec §4.6).
///
/// Every method is fallible. A write failure does not kill the owning loop (spec §7 "WAL
/// failures — reject the batch; do not advance `stableIndex`"): the group-commit loop logs the
/// error, drops the rejected batch, and keeps serving subsequent requests. [`crate::error::WalError`]
/// is used by [`crate::snapshot::Snapshotter`], whose save failures are likewise logged and
/// retried on the next trigger rather than torn down.
#[async_trait]
pub trait Wal: Send + Sync + 'static {
    /// Persist `current_term`/`voted_for`, fsyncing before returning.
    async fn save_hard_state(&self, state: HardState) -> anyhow::Result<()>;

    async fn load_hard_state(&self) -> anyhow::Result<HardState>;

    /// Append `entries` to the log, fsyncing before returning. Entries are always a gapless
    /// continuation of whatever was last appended (spec §4.4 "LogNonSequential" is rejected
    /// before reaching the WAL).
    async fn append(&self, entries: &[Entry]) -> anyhow::Result<()>;

    /// Drop everything at or after `from_index`, used when a follower's log conflicts with its
    /// leader's (spec §4.4 "conflict resolution").
    async fn truncate_suffix(&self, from_index: Index) -> anyhow::Result<()>;

    /// Drop everything up to and including `up_to_index`, called after a snapshot covering that
    /// range has been durably saved (spec §4.8 "Snapshotting").
    async fn compact(&self, up_to_index: Index) -> anyhow::Result<()>;

    async fn first_index(&self) -> anyhow::Result<Index>;

    async fn last_index(&self) -> anyhow::Result<Index>;

    async fn entries(&self, from: Index, max: usize) -> anyhow::Result<Vec<Entry>>;

    async fn term(&self, index: Index) -> anyhow::Result<Option<Term>>;

    async fn save_snapshot(&self, snapshot: Snapshot) -> anyhow::Result<()>;

    async fn latest_snapshot(&self) -> anyhow::Result<Option<Snapshot>>;

    /// List metadata for all retained snapshots, newest first, used by the retention sweep
    /// (spec §6 `minSnapshotsRetention`).
    async fn list_snapshots(&self) -> anyhow::Result<Vec<SnapshotMetadata>>;

    /// Delete all but the `retain` newest snapshots.
    async fn prune_snapshots(&self, retain: usize) -> anyhow::Result<()>;
}
