//! The wire-level message taxonomy (spec §6 "Wire protocol").

use serde::Deserialize;
use serde::Serialize;

use crate::types::Entry;
use crate::types::Index;
use crate::types::NodeId;
use crate::types::Snapshot;
use crate::types::Term;

/// The kind of event flowing through the [`crate::channel::RequestChannel`] (spec §4.1).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum EventType {
    Tick,
    Ready,
    Message,
    Proposal,
    Advance,
    Apply,
}

/// The reason an `AppendEntries`-family request was rejected (spec §4.4).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum RejectType {
    None,
    LowTerm,
    LogNotMatch,
    LogNonSequential,
}

/// The kind of a [`Message`] (spec §4.4 message handling table).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum MessageType {
    /// Local event requesting this node initiate a pre-vote.
    Hup,
    PreVote,
    PreVoteResponse,
    Vote,
    VoteResponse,
    AppendEntriesRequest,
    AppendEntriesResponse,
    SnapshotRequest,
    SnapshotResponse,
    Heartbeat,
    HeartbeatResponse,
    /// A local client proposal, addressed to self.
    Propose,
    /// Local lease-tick output.
    Lease,
    /// Empty no-op entry broadcast by a new leader to commit prior terms (§4.3, §4.4).
    Nop,
}

/// A single Raft protocol message, carried between peers by the [`crate::transport::Transporter`]
/// (spec §6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub msg_type: MessageType,
    pub term: Term,
    pub from: NodeId,
    pub to: NodeId,
    pub index: Index,
    pub log_term: Term,
    pub entries: Vec<Entry>,
    pub snapshot: Option<Snapshot>,
    pub commit_index: Index,
    pub reject: bool,
    pub reject_type: RejectType,
}

impl Message {
    /// Build the minimal message shared by most message kinds; callers fill in the rest.
    pub fn new(msg_type: MessageType, from: NodeId, to: NodeId, term: Term) -> Self {
        Self {
            msg_type,
            term,
            from,
            to,
            index: 0,
            log_term: 0,
            entries: Vec::new(),
            snapshot: None,
            commit_index: 0,
            reject: false,
            reject_type: RejectType::None,
        }
    }
}

/// A concise one-line description of a protocol value, used in trace logs so a full `Debug` dump
/// of an entry batch never has to be printed (mirrors the teacher's `MessageSummary` pattern in
/// `async-raft/src/raft.rs`).
pub trait MessageSummary {
    fn summary(&self) -> String;
}

impl MessageSummary for Message {
    fn summary(&self) -> String {
        format!(
            "{:?} term={} {}->{} index={} log_term={} n_entries={} commit={} reject={:?}",
            self.msg_type,
            self.term,
            self.from,
            self.to,
            self.index,
            self.log_term,
            self.entries.len(),
            self.commit_index,
            if self.reject { Some(self.reject_type) } else { None }
        )
    }
}

impl MessageSummary for crate::types::Entry {
    fn summary(&self) -> String {
        format!("{:?}@{} term={} len={}", self.entry_type, self.index, self.term, self.data.len())
    }
}
