//! The Raft driver loop (spec §4.5 "Raft loop"): the single task that owns
//! [`crate::node::NodeCore`] and [`crate::log::Log`], reacting to every event type the request
//! channels carry.
//!
//! Each cycle drains pending `TICK`s eagerly, then services whichever of MESSAGE, PROPOSAL,
//! ADVANCE is ready, in that priority order, via a biased `select!` (spec §4.5: "1. Any pending
//! TICK events (time-sensitive; drained eagerly). 2. MESSAGE. 3. PROPOSAL. 4. ADVANCE").

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::error;
use tracing::trace;
use tracing::warn;

use crate::channel::AdvanceEvent;
use crate::channel::ApplyRequest;
use crate::channel::ClientRequest;
use crate::channel::GroupCommitRequest;
use crate::channel::RaftInbox;
use crate::channel::Senders;
use crate::clock::TickKind;
use crate::cluster::GroupState;
use crate::error::ClientWriteError;
use crate::error::RaftError;
use crate::message::Message;
use crate::message::MessageSummary;
use crate::message::MessageType;
use crate::metrics::MetricsTx;
use crate::metrics::RaftMetrics;
use crate::node::Status;
use crate::raft::Listeners;
use crate::raft_api::Driver;
use crate::state_machine::StateMachine;
use crate::transport::Transporter;
use crate::types::Index;
use crate::types::NodeId;
use crate::types::Term;
use crate::wal::Wal;

/// Join handles for the three spawned loops, kept so the owning [`crate::raft::Raft`] handle can
/// await or abort them on shutdown.
pub struct RaftLoopHandles {
    pub raft: JoinHandle<()>,
    pub group_commit: JoinHandle<()>,
    pub apply: JoinHandle<()>,
}

/// Owns the Raft driver's mutable state across cycles (spec §5 "single-writer rule": this is the
/// only task that ever mutates [`crate::node::NodeCore`] or [`crate::log::Log`]).
pub(crate) struct RaftLoop<T, W, S> {
    driver: Driver,
    transport: Arc<T>,
    wal: Arc<W>,
    state_machine: Arc<S>,
    senders: Senders,
    metrics_tx: MetricsTx,
    listeners: Listeners,
    last_status: Status,
    last_group_state: GroupState,
    pending: HashMap<Index, oneshot::Sender<Result<(Term, Index), ClientWriteError>>>,
    last_applied_reported: Index,
}

impl<T: Transporter, W: Wal, S: StateMachine> RaftLoop<T, W, S> {
    pub fn new(
        driver: Driver,
        transport: Arc<T>,
        wal: Arc<W>,
        state_machine: Arc<S>,
        senders: Senders,
        metrics_tx: MetricsTx,
        listeners: Listeners,
    ) -> Self {
        Self {
            driver,
            transport,
            wal,
            state_machine,
            senders,
            metrics_tx,
            listeners,
            last_status: Status::Follower,
            last_group_state: GroupState::Unavailable,
            pending: HashMap::new(),
            last_applied_reported: 0,
        }
    }

    pub async fn run(mut self, mut inbox: RaftInbox) {
        loop {
            // TICK is drained eagerly and fully before anything else is considered, so a burst of
            // inbound messages can never starve an election or heartbeat tick (spec §4.5).
            loop {
                match inbox.tick.try_recv() {
                    Ok(kind) => self.handle_tick(kind).await,
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => break,
                }
            }

            tokio::select! {
                biased;

                Some(kind) = inbox.tick.recv() => self.handle_tick(kind).await,
                Some(msg) = inbox.message.recv() => self.handle_message(msg).await,
                Some(req) = inbox.client.recv() => self.handle_client_request(req).await,
                Some(event) = inbox.advance.recv() => self.handle_advance(event).await,
                else => break,
            }
        }

        self.fail_all_pending();
    }

    async fn handle_tick(&mut self, kind: TickKind) {
        let prev_last_index = self.driver.log.last_index();
        let outbound = self.driver.tick(kind);
        self.dispatch(outbound).await;
        self.after_cycle(prev_last_index).await;
    }

    async fn handle_message(&mut self, msg: Message) {
        trace!(summary = %msg.summary(), "handling inbound message");
        let prev_last_index = self.driver.log.last_index();

        match msg.msg_type {
            MessageType::SnapshotRequest => self.handle_snapshot_request(msg).await,
            MessageType::SnapshotResponse => self.driver.mark_peer_snapshotted(msg.from, msg.index),
            _ => {
                let outbound = self.driver.step(msg);
                self.dispatch(outbound).await;
            }
        }

        self.after_cycle(prev_last_index).await;
    }

    async fn handle_client_request(&mut self, req: ClientRequest) {
        let prev_last_index = self.driver.log.last_index();

        match req {
            ClientRequest::Write(req) => match self.driver.propose(req.data) {
                Some((_term, index)) => {
                    self.pending.insert(index, req.responder);
                }
                None => {
                    let _ = req.responder.send(Err(ClientWriteError::ForwardToLeader(self.driver.node.leader_id)));
                }
            },
            ClientRequest::Read(req) => {
                let _ = req.responder.send(self.driver.client_read_guard());
            }
        }

        self.after_cycle(prev_last_index).await;
    }

    async fn handle_advance(&mut self, event: AdvanceEvent) {
        let prev_last_index = self.driver.log.last_index();

        match event {
            AdvanceEvent::Stable { stable_index } => self.driver.log.mark_stable(stable_index),
            AdvanceEvent::Applied { applied_index } => {
                self.driver.log.advance_applied(applied_index);
                self.driver.node.maybe_clear_replay_barrier(applied_index);
                self.set_applying(false);
                self.resolve_applied(applied_index);
            }
            AdvanceEvent::Compacted { index, term } => self.driver.record_snapshot_compacted(index, term),
            AdvanceEvent::ApplyStarted => self.set_applying(true),
        }

        self.after_cycle(prev_last_index).await;
    }

    /// Mirror an apply batch's lifetime onto this node's own `NodeInfo` entry (spec I7
    /// "`applying`").
    fn set_applying(&mut self, applying: bool) {
        let self_id = self.driver.node.id;
        if let Some(info) = self.driver.node.cluster.get_mut(self_id) {
            info.applying = applying;
        }
    }

    /// A new leader's Nop entry and any accepted client proposal land here; persist and replicate
    /// them without waiting for the next heartbeat tick (spec §4.5 "Ready").
    async fn after_cycle(&mut self, prev_last_index: Index) {
        let new_last_index = self.driver.log.last_index();
        if new_last_index > prev_last_index {
            let new_entries = self.driver.log.entries_from(prev_last_index + 1, usize::MAX);
            if self.senders.group_commit.send(GroupCommitRequest { entries: new_entries }).await.is_err() {
                warn!("group commit channel closed");
            }
            self.replicate_to_all_peers().await;
        }

        if self.driver.log.committed_index > self.last_applied_reported {
            self.last_applied_reported = self.driver.log.committed_index;
            if self.senders.apply.send(ApplyRequest { up_to: self.driver.log.committed_index }).await.is_err() {
                warn!("apply channel closed");
            }
        }

        self.publish_metrics();
    }

    /// Replicate to every peer, falling back to a snapshot transfer for any peer whose
    /// `next_index` the log has already compacted away (spec §4.4 "SNAPSHOT_REQUEST").
    async fn replicate_to_all_peers(&mut self) {
        let peers: Vec<NodeId> = self.driver.node.cluster.peer_ids().collect();
        for peer in peers {
            if self.driver.needs_snapshot(peer) {
                match self.wal.latest_snapshot().await {
                    Ok(Some(snapshot)) => {
                        let mut m =
                            Message::new(MessageType::SnapshotRequest, self.driver.node.id, peer, self.driver.node.current_term);
                        m.index = snapshot.meta.index;
                        m.log_term = snapshot.meta.term;
                        m.snapshot = Some(snapshot);
                        self.dispatch(vec![m]).await;
                    }
                    Ok(None) => warn!(peer, "peer needs a snapshot but none has been taken yet"),
                    Err(err) => error!(?err, peer, "failed to load latest snapshot for peer catch-up"),
                }
            } else if let Some(m) = self.driver.replicate_to(peer) {
                self.dispatch(vec![m]).await;
            }
        }
    }

    /// Install an inbound `SNAPSHOT_REQUEST` (spec §4.4, §4.7 "snapshot install", boundary
    /// scenario 5): persist it, replace the state machine's state, then reply so the leader can
    /// fast-forward this peer's replication progress.
    async fn handle_snapshot_request(&mut self, msg: Message) {
        if !self.driver.accept_snapshot(msg.from, msg.term) {
            return;
        }
        let snapshot = match msg.snapshot {
            Some(snapshot) => snapshot,
            None => {
                warn!(from = msg.from, "SNAPSHOT_REQUEST carried no snapshot body");
                return;
            }
        };
        let index = snapshot.meta.index;
        let term = snapshot.meta.term;

        if let Err(err) = self.wal.save_snapshot(snapshot.clone()).await {
            error!(?err, index, "failed to persist installed snapshot");
            return;
        }
        if let Err(err) = self.wal.compact(index).await {
            error!(?err, index, "failed to compact wal after snapshot install");
            return;
        }
        if let Err(err) = self.state_machine.apply_snapshot(&snapshot).await {
            error!(?err, index, "state machine rejected installed snapshot");
            return;
        }

        self.driver.record_snapshot_installed(index, term);
        let mut resp = Message::new(MessageType::SnapshotResponse, self.driver.node.id, msg.from, self.driver.node.current_term);
        resp.index = index;
        self.dispatch(vec![resp]).await;
    }

    /// Send each message, reflecting delivery success/failure into `NodeInfo::disconnected` so
    /// [`crate::cluster::Cluster::group_state`] tracks live reachability (spec §7 "Transport
    /// failures — mark peer disconnected; affect GroupState").
    async fn dispatch(&mut self, messages: Vec<Message>) {
        for msg in messages {
            let to = msg.to;
            match self.transport.send(to, msg).await {
                Ok(()) => {
                    if let Some(info) = self.driver.node.cluster.get_mut(to) {
                        info.disconnected = false;
                    }
                }
                Err(err) => {
                    warn!(?err, peer = to, "failed to send message");
                    self.transport.on_disconnect(to).await;
                    if let Some(info) = self.driver.node.cluster.get_mut(to) {
                        info.disconnected = true;
                    }
                }
            }
        }
    }

    fn resolve_applied(&mut self, applied_index: Index) {
        let current_term = self.driver.node.current_term;
        let ready: Vec<Index> = self.pending.keys().copied().filter(|i| *i <= applied_index).collect();
        for index in ready {
            if let Some(tx) = self.pending.remove(&index) {
                let _ = tx.send(Ok((current_term, index)));
            }
        }
    }

    fn fail_all_pending(self) {
        for (_, tx) in self.pending {
            let _ = tx.send(Err(ClientWriteError::RaftError(RaftError::ShuttingDown)));
        }
    }

    /// Publish the latest metrics snapshot and fire any election/group-state listeners whose
    /// condition just transitioned (spec §6 "addElectionListener"/"addGroupStateListener": fire
    /// on transition only, not on every tick).
    fn publish_metrics(&mut self) {
        let status = self.driver.node.status;
        let group_state = self.driver.node.cluster.group_state();

        if status != self.last_status {
            self.listeners.notify_election(status);
            self.last_status = status;
        }
        if group_state != self.last_group_state {
            self.listeners.notify_group_state(self.last_group_state, group_state);
            self.last_group_state = group_state;
        }

        let _ = self.metrics_tx.send(RaftMetrics {
            id: self.driver.node.id,
            status,
            current_term: self.driver.node.current_term,
            last_log_index: self.driver.log.last_index(),
            applied_index: self.driver.log.applied_index,
            committed_index: self.driver.log.committed_index,
            current_leader: self.driver.node.leader_id,
            group_state,
        });
    }
}
