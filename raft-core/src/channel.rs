//! The typed request channels connecting the three event loops (spec §4.1 "Request Channel",
//! §4.5-§4.7).
//!
//! The spec's reference design uses a hand-rolled `canFetch`/lock/semaphore pair to make waiting
//! "lost-wakeup-safe": a wakeup that arrives between a consumer's emptiness check and its wait
//! call must not be lost. `tokio::sync::mpsc::Receiver::recv` already gives that guarantee — a
//! `send` that races a `recv` either gets observed by the in-flight `recv` or wakes the task
//! blocked on it, never both missed — so the loops below just call `recv`/`try_recv` directly
//! instead of reimplementing the spec's locking idiom (see SPEC_FULL.md "Request Channel").
//!
//! TICK, MESSAGE, PROPOSAL and ADVANCE are kept on four independently-typed channels rather than
//! multiplexed onto one, so the Raft loop can honor the strict per-cycle draining order spec §4.5
//! mandates (TICK before MESSAGE before PROPOSAL before ADVANCE) instead of servicing whichever
//! event happened to arrive first.

use tokio::sync::mpsc;
use tokio::sync::oneshot;

use crate::clock::TickKind;
use crate::error::ClientReadError;
use crate::error::ClientWriteError;
use crate::message::Message;
use crate::types::Index;
use crate::types::Term;

/// A client write submitted via [`crate::raft::Raft::propose`] (spec §6 `propose`).
pub struct ProposalRequest {
    pub data: Vec<u8>,
    pub responder: oneshot::Sender<Result<(Term, Index), ClientWriteError>>,
}

/// A linearizable-read guard submitted via [`crate::raft::Raft::client_read`] (spec §6
/// `client_read`).
pub struct ClientReadRequest {
    pub responder: oneshot::Sender<Result<(), ClientReadError>>,
}

/// The PROPOSAL channel's payload: a write needing log space, or a read needing only the lease
/// guard (spec §4.5 "PROPOSAL").
pub enum ClientRequest {
    Write(ProposalRequest),
    Read(ClientReadRequest),
}

/// Everything the group-commit and apply loops report back to the Raft loop (spec §4.5 "ADVANCE").
pub enum AdvanceEvent {
    /// The group-commit loop reports the new stable index (spec §4.6 "ADVANCE").
    Stable { stable_index: Index },
    /// The apply loop reports the new applied index (spec §4.7 "APPLY" completion callback).
    Applied { applied_index: Index },
    /// The apply loop reports a just-completed snapshot-and-compact cycle (spec §4.8
    /// "triggerToSnapshot"), so the in-memory log view folds in the same boundary.
    Compacted { index: Index, term: Term },
    /// The apply loop is about to hand a batch to the state machine (spec I7 `applying`): set
    /// `true` until the matching `Applied` arrives.
    ApplyStarted,
}

/// A batch of freshly-appended entries awaiting durability (spec §4.6 "group-commit loop").
pub struct GroupCommitRequest {
    pub entries: Vec<crate::types::Entry>,
}

/// A request to apply committed entries up to (and including) `up_to` (spec §4.7 "apply loop").
pub struct ApplyRequest {
    pub up_to: Index,
}

/// Producer handles shared by the clock, transport, and the public [`crate::raft::Raft`] handle.
#[derive(Clone)]
pub struct Senders {
    pub tick: mpsc::Sender<TickKind>,
    pub message: mpsc::Sender<Message>,
    pub client: mpsc::Sender<ClientRequest>,
    pub advance: mpsc::Sender<AdvanceEvent>,
    pub group_commit: mpsc::Sender<GroupCommitRequest>,
    pub apply: mpsc::Sender<ApplyRequest>,
}

/// The consumer side owned by the Raft driver loop, one receiver per event kind so priority
/// draining (spec §4.5) can poll them independently.
pub struct RaftInbox {
    pub tick: mpsc::Receiver<TickKind>,
    pub message: mpsc::Receiver<Message>,
    pub client: mpsc::Receiver<ClientRequest>,
    pub advance: mpsc::Receiver<AdvanceEvent>,
}

/// The consumer side owned by the group-commit (persistence) loop.
pub struct GroupCommitInbox {
    pub rx: mpsc::Receiver<GroupCommitRequest>,
}

/// The consumer side owned by the apply loop.
pub struct ApplyInbox {
    pub rx: mpsc::Receiver<ApplyRequest>,
}

/// Build the channels with the configured capacity (spec §6 `requestChannelCapacity`). Bounding
/// each channel gives the natural backpressure the spec's semaphore-based design provides: a slow
/// consumer stalls its producers instead of growing an unbounded queue.
pub fn build(capacity: usize) -> (Senders, RaftInbox, GroupCommitInbox, ApplyInbox) {
    let (tick_tx, tick_rx) = mpsc::channel(capacity);
    let (message_tx, message_rx) = mpsc::channel(capacity);
    let (client_tx, client_rx) = mpsc::channel(capacity);
    let (advance_tx, advance_rx) = mpsc::channel(capacity);
    let (gc_tx, gc_rx) = mpsc::channel(capacity);
    let (apply_tx, apply_rx) = mpsc::channel(capacity);
    (
        Senders {
            tick: tick_tx,
            message: message_tx,
            client: client_tx,
            advance: advance_tx,
            group_commit: gc_tx,
            apply: apply_tx,
        },
        RaftInbox { tick: tick_rx, message: message_rx, client: client_rx, advance: advance_rx },
        GroupCommitInbox { rx: gc_rx },
        ApplyInbox { rx: apply_rx },
    )
}
