//! The in-memory log view, backed durably by a [`crate::wal::Wal`] (spec §3 "Log").

use crate::types::Entry;
use crate::types::Index;
use crate::types::Term;

/// A strictly monotone, gapless run of [`Entry`] values held in memory for fast access, mirrored
/// to the [`crate::wal::Wal`] for durability (spec §3 "Log", §4.6 "group-commit loop").
///
/// `entries[0]` corresponds to log index `offset + 1`; everything at or below `offset` has been
/// compacted into a snapshot.
#[derive(Debug, Default)]
pub struct Log {
    entries: Vec<Entry>,
    /// Index of the last entry folded into a snapshot (0 if none).
    offset: Index,
    /// Term of the entry at `offset`, used to answer `term_at(offset)` after compaction.
    offset_term: Term,
    pub stable_index: Index,
    pub committed_index: Index,
    pub applied_index: Index,
}

impl Log {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn first_index(&self) -> Index {
        self.offset + 1
    }

    pub fn last_index(&self) -> Index {
        self.offset + self.entries.len() as Index
    }

    /// `true` if `index` falls within the in-memory window (i.e. has not been compacted away).
    pub fn has(&self, index: Index) -> bool {
        index > self.offset && index <= self.last_index()
    }

    fn slot(&self, index: Index) -> Option<usize> {
        if self.has(index) {
            Some((index - self.offset - 1) as usize)
        } else {
            None
        }
    }

    pub fn term_at(&self, index: Index) -> Option<Term> {
        if index == self.offset {
            return Some(self.offset_term);
        }
        self.slot(index).map(|i| self.entries[i].term)
    }

    pub fn entry_at(&self, index: Index) -> Option<&Entry> {
        self.slot(index).map(|i| &self.entries[i])
    }

    /// Entries in `[from, last_index]`, capped at `max` entries (spec §4.4 "max_entries_per_append").
    pub fn entries_from(&self, from: Index, max: usize) -> Vec<Entry> {
        if from > self.last_index() {
            return Vec::new();
        }
        let start = self.slot(from).unwrap_or(0);
        self.entries.iter().skip(start).take(max).cloned().collect()
    }

    /// Append entries, rejecting (by truncating first) any suffix mismatch per spec §4.4
    /// "LogNonSequential": `new_entries[0].index` must equal `last_index() + 1`.
    pub fn append(&mut self, new_entries: Vec<Entry>) {
        for entry in new_entries {
            let expected = self.last_index() + 1;
            if entry.index != expected {
                debug_assert_eq!(entry.index, expected, "log append must be gapless");
            }
            self.entries.push(entry);
        }
    }

    /// Truncate the log to drop everything at or after `from_index` (spec §4.4 "conflict
    /// resolution": a follower rewinds its log to match a leader's `AppendEntries`).
    pub fn truncate_suffix(&mut self, from_index: Index) {
        if let Some(slot) = self.slot(from_index) {
            self.entries.truncate(slot);
        } else if from_index <= self.offset {
            self.entries.clear();
        }
        self.stable_index = self.stable_index.min(self.last_index());
    }

    /// Drop everything up to and including `up_to_index`, folding it into a snapshot taken at
    /// `(up_to_index, up_to_term)` (spec §4.8 "Snapshotting").
    pub fn compact(&mut self, up_to_index: Index, up_to_term: Term) {
        if up_to_index <= self.offset {
            return;
        }
        if let Some(slot) = self.slot(up_to_index) {
            self.entries.drain(0..=slot);
        } else {
            self.entries.clear();
        }
        self.offset = up_to_index;
        self.offset_term = up_to_term;
    }

    /// Replace the log view with a snapshot boundary, discarding any entries the snapshot
    /// supersedes (spec §4.7 "snapshot install", boundary scenario 5 "Snapshot catch-up").
    pub fn install_snapshot(&mut self, index: Index, term: Term) {
        self.entries.clear();
        self.offset = index;
        self.offset_term = term;
        self.stable_index = self.stable_index.max(index);
        self.committed_index = self.committed_index.max(index);
        self.applied_index = self.applied_index.max(index);
    }

    pub fn mark_stable(&mut self, index: Index) {
        self.stable_index = self.stable_index.max(index);
    }

    pub fn advance_committed(&mut self, index: Index) {
        self.committed_index = self.committed_index.max(index);
    }

    pub fn advance_applied(&mut self, index: Index) {
        self.applied_index = self.applied_index.max(index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntryType;

    fn e(term: Term, index: Index) -> Entry {
        Entry::new(EntryType::Normal, term, index, vec![])
    }

    #[test]
    fn append_and_read_back() {
        let mut log = Log::new();
        log.append(vec![e(1, 1), e(1, 2), e(2, 3)]);
        assert_eq!(log.last_index(), 3);
        assert_eq!(log.term_at(2), Some(1));
        assert_eq!(log.term_at(3), Some(2));
        assert_eq!(log.term_at(4), None);
    }

    #[test]
    fn truncate_suffix_drops_conflicting_tail() {
        let mut log = Log::new();
        log.append(vec![e(1, 1), e(1, 2), e(1, 3)]);
        log.truncate_suffix(2);
        assert_eq!(log.last_index(), 1);
        log.append(vec![e(2, 2), e(2, 3)]);
        assert_eq!(log.term_at(2), Some(2));
    }

    #[test]
    fn compact_folds_prefix_into_snapshot_offset() {
        let mut log = Log::new();
        log.append(vec![e(1, 1), e(1, 2), e(2, 3), e(2, 4)]);
        log.compact(2, 1);
        assert_eq!(log.first_index(), 3);
        assert_eq!(log.term_at(2), Some(1));
        assert!(log.entry_at(1).is_none());
        assert_eq!(log.entry_at(3).unwrap().index, 3);
    }

    #[test]
    fn install_snapshot_discards_everything_up_to_its_index() {
        let mut log = Log::new();
        log.append(vec![e(1, 1), e(1, 2)]);
        log.install_snapshot(5, 2);
        assert_eq!(log.first_index(), 6);
        assert_eq!(log.last_index(), 5);
        assert_eq!(log.term_at(5), Some(2));
        assert_eq!(log.committed_index, 5);
        assert_eq!(log.applied_index, 5);
    }

    #[test]
    fn entries_from_respects_max() {
        let mut log = Log::new();
        log.append(vec![e(1, 1), e(1, 2), e(1, 3), e(1, 4)]);
        let batch = log.entries_from(2, 2);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].index, 2);
        assert_eq!(batch[1].index, 3);
    }
}
