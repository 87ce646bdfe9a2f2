use std::sync::Mutex;

use async_trait::async_trait;
use raft_core::types::Entry;
use raft_core::types::Index;
use raft_core::types::Snapshot;
use raft_core::types::SnapshotMetadata;
use raft_core::types::Term;
use raft_core::wal::HardState;
use raft_core::wal::Wal;
use tracing::debug;

#[derive(Default)]
struct Inner {
    hard_state: HardState,
    entries: Vec<Entry>,
    offset: Index,
    snapshots: Vec<Snapshot>,
}

/// An in-memory [`Wal`]. Nothing here survives process restart; it exists purely so tests don't
/// need a filesystem, the same role the teacher's `MemStore` plays for `RaftStorage`.
#[derive(Default)]
pub struct MemWal {
    inner: Mutex<Inner>,
}

impl MemWal {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Wal for MemWal {
    async fn save_hard_state(&self, state: HardState) -> anyhow::Result<()> {
        self.inner.lock().unwrap().hard_state = state;
        Ok(())
    }

    async fn load_hard_state(&self) -> anyhow::Result<HardState> {
        Ok(self.inner.lock().unwrap().hard_state)
    }

    async fn append(&self, entries: &[Entry]) -> anyhow::Result<()> {
        self.inner.lock().unwrap().entries.extend_from_slice(entries);
        Ok(())
    }

    async fn truncate_suffix(&self, from_index: Index) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let offset = inner.offset;
        if from_index > offset {
            let slot = (from_index - offset - 1) as usize;
            inner.entries.truncate(slot);
        } else {
            inner.entries.clear();
        }
        Ok(())
    }

    async fn compact(&self, up_to_index: Index) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if up_to_index <= inner.offset {
            return Ok(());
        }
        let slot = (up_to_index - inner.offset) as usize;
        if slot <= inner.entries.len() {
            inner.entries.drain(0..slot);
        } else {
            inner.entries.clear();
        }
        inner.offset = up_to_index;
        debug!(up_to_index, "compacted in-memory log");
        Ok(())
    }

    async fn first_index(&self) -> anyhow::Result<Index> {
        Ok(self.inner.lock().unwrap().offset + 1)
    }

    async fn last_index(&self) -> anyhow::Result<Index> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.offset + inner.entries.len() as Index)
    }

    async fn entries(&self, from: Index, max: usize) -> anyhow::Result<Vec<Entry>> {
        let inner = self.inner.lock().unwrap();
        if from <= inner.offset {
            return Ok(Vec::new());
        }
        let start = (from - inner.offset - 1) as usize;
        Ok(inner.entries.iter().skip(start).take(max).cloned().collect())
    }

    async fn term(&self, index: Index) -> anyhow::Result<Option<Term>> {
        let inner = self.inner.lock().unwrap();
        if index <= inner.offset {
            return Ok(None);
        }
        let slot = (index - inner.offset - 1) as usize;
        Ok(inner.entries.get(slot).map(|e| e.term))
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> anyhow::Result<()> {
        self.inner.lock().unwrap().snapshots.push(snapshot);
        Ok(())
    }

    async fn latest_snapshot(&self) -> anyhow::Result<Option<Snapshot>> {
        Ok(self.inner.lock().unwrap().snapshots.last().cloned())
    }

    async fn list_snapshots(&self) -> anyhow::Result<Vec<SnapshotMetadata>> {
        Ok(self.inner.lock().unwrap().snapshots.iter().map(|s| s.meta).collect())
    }

    async fn prune_snapshots(&self, retain: usize) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let len = inner.snapshots.len();
        if len > retain {
            inner.snapshots.drain(0..len - retain);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raft_core::types::EntryType;

    #[tokio::test]
    async fn append_and_read_back_round_trips() {
        let wal = MemWal::new();
        let entry = Entry::new(EntryType::Normal, 1, 1, b"hello".to_vec());
        wal.append(&[entry]).await.unwrap();
        assert_eq!(wal.last_index().await.unwrap(), 1);
        let back = wal.entries(1, 10).await.unwrap();
        assert_eq!(back.len(), 1);
        assert!(back[0].verify_crc());
    }

    #[tokio::test]
    async fn compact_advances_first_index() {
        let wal = MemWal::new();
        let entries: Vec<_> = (1..=5).map(|i| Entry::new(EntryType::Normal, 1, i, vec![])).collect();
        wal.append(&entries).await.unwrap();
        wal.compact(3).await.unwrap();
        assert_eq!(wal.first_index().await.unwrap(), 4);
        assert!(wal.entries(1, 10).await.unwrap().is_empty());
    }
}
