//! Core identifiers and the log entry model (spec §3 "Entry").

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

/// Unique identifier of a cluster member. Must be a positive integer, unique within a cluster.
pub type NodeId = u64;

/// A monotonically increasing term number.
pub type Term = u64;

/// A strictly monotone, gapless log position.
pub type Index = u64;

/// Sentinel used where the spec's `NOT_VOTE` marker would otherwise require a separate type.
pub const NOT_VOTE: Option<NodeId> = None;

/// The kind of payload carried by a log [`Entry`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum EntryType {
    /// An application-level entry, opaque to the engine.
    Normal,
    /// A cluster configuration change entry.
    Config,
}

/// A single record in the replicated log (spec §3 "Entry").
///
/// `index` is strictly monotone and gapless across the log; `term` is non-decreasing with
/// `index`. `crc` is computed over `(term, index, type, data)` and is validated whenever an
/// entry is read back from the write-ahead log (spec §6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Entry {
    pub entry_type: EntryType,
    pub term: Term,
    pub index: Index,
    pub crc: u32,
    pub data: Vec<u8>,
    pub attachments: BTreeMap<String, String>,
}

impl Entry {
    /// Build a new entry, computing its CRC from the remaining fields.
    pub fn new(entry_type: EntryType, term: Term, index: Index, data: Vec<u8>) -> Self {
        let crc = Self::compute_crc(term, index, entry_type, &data);
        Self {
            entry_type,
            term,
            index,
            crc,
            data,
            attachments: BTreeMap::new(),
        }
    }

    /// Build a blank (NOP) entry, used by a new leader to commit across the term boundary (§4.3,
    /// §4.4 NOP).
    pub fn new_nop(term: Term, index: Index) -> Self {
        Self::new(EntryType::Normal, term, index, Vec::new())
    }

    pub fn with_attachments(mut self, attachments: BTreeMap<String, String>) -> Self {
        self.attachments = attachments;
        self
    }

    /// Compute the CRC32 checksum covering `(term, index, type, data)`, per spec §6.
    pub fn compute_crc(term: Term, index: Index, entry_type: EntryType, data: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&term.to_be_bytes());
        hasher.update(&index.to_be_bytes());
        hasher.update(&[entry_type as u8]);
        hasher.update(data);
        hasher.finalize()
    }

    /// Verify this entry's stored CRC against its own fields.
    pub fn verify_crc(&self) -> bool {
        self.crc == Self::compute_crc(self.term, self.index, self.entry_type, &self.data)
    }
}

/// Metadata identifying a [`Snapshot`] (spec §3 "Snapshot").
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub index: Index,
    pub term: Term,
}

/// A compact state-machine snapshot, totally ordered by `meta.index`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub meta: SnapshotMetadata,
    pub data: Vec<u8>,
}

/// Leader-only cursor tracking the next local log offset used when accepting proposals (spec
/// §3 "NextOffsetMetaData").
#[derive(Clone, Copy, Debug, Default)]
pub struct NextOffsetMetaData {
    next_offset: Index,
}

impl NextOffsetMetaData {
    pub fn new(last_index: Index) -> Self {
        Self { next_offset: last_index + 1 }
    }

    /// Reserve and return the next offset, advancing the cursor.
    pub fn reserve(&mut self) -> Index {
        let idx = self.next_offset;
        self.next_offset += 1;
        idx
    }

    pub fn peek(&self) -> Index {
        self.next_offset
    }
}
