//! The application state machine contract (spec §4.7 "apply loop", §3 "StateMachine").

use async_trait::async_trait;

use crate::types::Entry;
use crate::types::Index;
use crate::types::Snapshot;

/// Implemented by the application embedding `raft-core`. The apply loop calls [`Self::apply`]
/// strictly in log order, once per committed batch (spec §4.7 "invoke stateMachine.apply(entries)",
/// I7 "total order apply").
#[async_trait]
pub trait StateMachine: Send + Sync + 'static {
    /// Apply a batch of committed entries, in order, as a single call.
    async fn apply(&self, entries: &[Entry]) -> anyhow::Result<()>;

    /// Install a snapshot, replacing all prior state (spec §4.8 "snapshot install").
    async fn apply_snapshot(&self, snapshot: &Snapshot) -> anyhow::Result<()>;

    /// Serialize current state for a new snapshot (spec §4.8).
    async fn snapshot_data(&self) -> anyhow::Result<Vec<u8>>;

    /// The index of the last entry this state machine has applied, used to resume after restart.
    async fn applied_index(&self) -> anyhow::Result<Index>;
}
