use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use raft_core::state_machine::StateMachine;
use raft_core::types::Entry;
use raft_core::types::Index;
use raft_core::types::Snapshot;

#[derive(Default)]
struct Inner {
    /// The full history of applied entries, in order, used by tests asserting total ordering
    /// (spec I7 "total order apply").
    applied: Vec<Entry>,
    applied_index: Index,
    kv: BTreeMap<Vec<u8>, Vec<u8>>,
}

/// A trivial key-value state machine: a proposal's payload is its own key and value, split on the
/// first `=` byte, or stored verbatim under an incrementing counter if there is none.
#[derive(Default)]
pub struct MemStateMachine {
    inner: Mutex<Inner>,
}

impl MemStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn applied_entries(&self) -> Vec<Entry> {
        self.inner.lock().unwrap().applied.clone()
    }

    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.inner.lock().unwrap().kv.get(key).cloned()
    }
}

#[async_trait]
impl StateMachine for MemStateMachine {
    async fn apply(&self, entries: &[Entry]) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        for entry in entries {
            if let Some(pos) = entry.data.iter().position(|b| *b == b'=') {
                let (key, value) = entry.data.split_at(pos);
                inner.kv.insert(key.to_vec(), value[1..].to_vec());
            }
            inner.applied.push(entry.clone());
            inner.applied_index = entry.index;
        }
        Ok(())
    }

    async fn apply_snapshot(&self, snapshot: &Snapshot) -> anyhow::Result<()> {
        // serde_json objects require string keys, so the map is carried as a pair list rather
        // than serializing the `BTreeMap<Vec<u8>, Vec<u8>>` directly.
        let pairs: Vec<(Vec<u8>, Vec<u8>)> = serde_json::from_slice(&snapshot.data)?;
        let mut inner = self.inner.lock().unwrap();
        inner.kv = pairs.into_iter().collect();
        inner.applied.clear();
        inner.applied_index = snapshot.meta.index;
        Ok(())
    }

    async fn snapshot_data(&self) -> anyhow::Result<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        let pairs: Vec<(&Vec<u8>, &Vec<u8>)> = inner.kv.iter().collect();
        Ok(serde_json::to_vec(&pairs)?)
    }

    async fn applied_index(&self) -> anyhow::Result<Index> {
        Ok(self.inner.lock().unwrap().applied_index)
    }
}
