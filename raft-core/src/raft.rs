//! The public node handle (spec §6 "Public API").

use std::sync::Arc;
use std::sync::Mutex;

use tokio::sync::oneshot;
use tracing::info;
use tracing_futures::Instrument;

use crate::channel::ClientReadRequest;
use crate::channel::ClientRequest;
use crate::channel::ProposalRequest;
use crate::channel::Senders;
use crate::clock::spawn_ticker;
use crate::clock::TickKind;
use crate::cluster::Cluster;
use crate::cluster::GroupState;
use crate::config::Config;
use crate::error::ClientReadError;
use crate::error::ClientWriteError;
use crate::error::RaftError;
use crate::log::Log;
use crate::loops::run_apply_loop;
use crate::loops::run_group_commit_loop;
use crate::loops::RaftLoop;
use crate::loops::RaftLoopHandles;
use crate::metrics::channel as metrics_channel;
use crate::metrics::MetricsRx;
use crate::metrics::RaftMetrics;
use crate::node::NodeCore;
use crate::node::Status;
use crate::raft_api::Driver;
use crate::state_machine::StateMachine;
use crate::transport::Transporter;
use crate::types::Index;
use crate::types::Term;
use crate::wal::Wal;

type ElectionListener = Box<dyn Fn(Status) + Send + Sync + 'static>;
type GroupStateListener = Box<dyn Fn(GroupState, GroupState) + Send + Sync + 'static>;

/// The embedding application's hook into role and reachability transitions (spec §6
/// "addElectionListener"/"addGroupStateListener", §9 "capability set"). Listeners fire only on
/// transition, never on every metrics tick, and a panicking listener is isolated so it cannot take
/// down the Raft loop or any other listener (spec §9 "isolated failure handling").
#[derive(Clone, Default)]
pub(crate) struct Listeners {
    election: Arc<Mutex<Vec<ElectionListener>>>,
    group_state: Arc<Mutex<Vec<GroupStateListener>>>,
}

impl Listeners {
    pub(crate) fn notify_election(&self, status: Status) {
        for listener in self.election.lock().unwrap().iter() {
            if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| listener(status))).is_err() {
                tracing::error!("election listener panicked, continuing without it");
            }
        }
    }

    pub(crate) fn notify_group_state(&self, from: GroupState, to: GroupState) {
        for listener in self.group_state.lock().unwrap().iter() {
            if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| listener(from, to))).is_err() {
                tracing::error!("group state listener panicked, continuing without it");
            }
        }
    }
}

/// A running Raft node: owns the three spawned loops and exposes the client-facing surface
/// (spec §6). Cloning a `Raft` is cheap; every clone shares the same underlying loops.
#[derive(Clone)]
pub struct Raft {
    senders: Senders,
    metrics_rx: MetricsRx,
    listeners: Listeners,
    handles: Arc<RaftLoopHandles>,
}

impl Raft {
    /// Start a node: build the driver from durable state (or fresh defaults), spawn the clock
    /// and the three loops, and return a handle (spec §4 "Wiring").
    pub async fn new<W, S, T>(config: Config, wal: Arc<W>, state_machine: Arc<S>, transport: Arc<T>) -> anyhow::Result<Self>
    where
        W: Wal,
        S: StateMachine,
        T: Transporter,
    {
        let hard_state = wal.load_hard_state().await?;
        let cluster = Cluster::new(config.id, config.members.clone());
        let election_timeout = config.election_timeout_min_ms;
        let mut node = NodeCore::new(config.id, cluster, election_timeout);
        node.current_term = hard_state.current_term;
        node.voted_for = hard_state.voted_for;

        let mut log = Log::new();
        let last_index = wal.last_index().await?;
        let first_index = wal.first_index().await?;
        if last_index >= first_index {
            let entries = wal.entries(first_index, (last_index - first_index + 1) as usize).await?;
            log.append(entries);
        }
        log.advance_applied(state_machine.applied_index().await?);

        let driver = Driver::new(
            node,
            log,
            config.election_timeout_min_ms,
            config.election_timeout_max_ms,
            config.heartbeat_interval_ms,
            config.max_entries_per_append,
        );

        let (senders, raft_inbox, gc_inbox, apply_inbox) = crate::channel::build(config.request_channel_capacity);
        let (metrics_tx, metrics_rx) = metrics_channel(RaftMetrics::new_initial(config.id));
        let listeners = Listeners::default();

        let id = config.id;
        let raft_loop = RaftLoop::new(driver, transport, wal.clone(), state_machine.clone(), senders.clone(), metrics_tx, listeners.clone());
        let raft_handle = tokio::spawn(raft_loop.run(raft_inbox).instrument(tracing::info_span!("raft_loop", id)));
        let group_commit_handle = tokio::spawn(
            run_group_commit_loop(
                wal.clone(),
                gc_inbox,
                senders.advance.clone(),
                config.group_commit_max_batch,
                std::time::Duration::from_millis(config.group_commit_max_delay_ms),
            )
            .instrument(tracing::info_span!("group_commit_loop", id)),
        );
        let apply_handle = tokio::spawn(
            run_apply_loop(
                state_machine,
                wal,
                apply_inbox,
                senders.advance.clone(),
                config.snapshot_threshold_entries,
                config.min_snapshots_retention,
            )
            .instrument(tracing::info_span!("apply_loop", id)),
        );

        spawn_ticker(
            TickKind::Election,
            std::time::Duration::from_millis(config.election_timeout_min_ms / 3 + 1),
            senders.tick.clone(),
        );
        spawn_ticker(TickKind::Heartbeat, std::time::Duration::from_millis(config.heartbeat_interval_ms), senders.tick.clone());
        spawn_ticker(TickKind::Lease, std::time::Duration::from_millis(config.lease_timeout_ms), senders.tick.clone());

        info!(id = config.id, "raft node started");

        Ok(Self {
            senders,
            metrics_rx,
            listeners,
            handles: Arc::new(RaftLoopHandles { raft: raft_handle, group_commit: group_commit_handle, apply: apply_handle }),
        })
    }

    /// Submit a client write, resolving once the entry has been applied locally (spec §6
    /// `propose`).
    pub async fn propose(&self, data: Vec<u8>) -> Result<(Term, Index), ClientWriteError> {
        let (tx, rx) = oneshot::channel();
        self.senders
            .client
            .send(ClientRequest::Write(ProposalRequest { data, responder: tx }))
            .await
            .map_err(|_| ClientWriteError::RaftError(RaftError::ChannelClosed))?;
        rx.await.map_err(|_| ClientWriteError::RaftError(RaftError::ChannelClosed))?
    }

    /// A linearizable-read guard: resolves once it is safe to serve a local read without risking a
    /// stale leader's view (spec §6 `client_read`, §4.3 "Leader lease"). Reads beyond the lease
    /// window are not provided; this only guarantees the lease has not expired.
    pub async fn client_read(&self) -> Result<(), ClientReadError> {
        let (tx, rx) = oneshot::channel();
        self.senders
            .client
            .send(ClientRequest::Read(ClientReadRequest { responder: tx }))
            .await
            .map_err(|_| ClientReadError::RaftError(RaftError::ChannelClosed))?;
        rx.await.map_err(|_| ClientReadError::RaftError(RaftError::ChannelClosed))?
    }

    /// A `watch` receiver over this node's metrics; clone it freely (spec §6 "Metrics").
    pub fn metrics(&self) -> MetricsRx {
        self.metrics_rx.clone()
    }

    /// Register a callback invoked on every role transition (spec §6 `addElectionListener`). The
    /// callback runs inline on the Raft loop between cycles; keep it cheap and non-blocking.
    pub fn add_election_listener(&self, listener: impl Fn(Status) + Send + Sync + 'static) {
        self.listeners.election.lock().unwrap().push(Box::new(listener));
    }

    /// Register a callback invoked whenever `GroupState` changes (spec §6
    /// `addGroupStateListener`). The callback receives `(from, to)`.
    pub fn add_group_state_listener(&self, listener: impl Fn(GroupState, GroupState) + Send + Sync + 'static) {
        self.listeners.group_state.lock().unwrap().push(Box::new(listener));
    }

    /// Feed an inbound peer message into the Raft loop (called by the embedding application's
    /// [`Transporter`] server side).
    pub async fn step(&self, message: crate::message::Message) -> Result<(), RaftError> {
        self.senders.message.send(message).await.map_err(|_| RaftError::ChannelClosed)
    }
}
