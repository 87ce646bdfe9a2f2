//! Pure message-handling transitions (spec §4.4 "message handling table", §4.3 "role
//! transitions"). Everything here is synchronous and side-effect-free beyond mutating
//! `self.node`/`self.log`; I/O (sending messages, persisting, applying) is the caller's job, kept
//! in the three loops under [`crate::loops`].

use rand::Rng;
use tracing::debug;
use tracing::warn;

use crate::clock::TickKind;
use crate::cluster::quorum;
use crate::cluster::ReplayState;
use crate::error::ClientReadError;
use crate::log::Log;
use crate::message::Message;
use crate::message::MessageType;
use crate::message::RejectType;
use crate::node::NodeCore;
use crate::node::Status;
use crate::types::Entry;
use crate::types::EntryType;
use crate::types::Index;
use crate::types::NodeId;
use crate::types::Term;

/// Bundles the node's volatile/persistent state with the timing knobs needed to decide when a
/// tick should fire an election or a heartbeat (spec §3 "NodeCore", §6 "timing configuration").
pub struct Driver {
    pub node: NodeCore,
    pub log: Log,
    election_timeout_min: u64,
    election_timeout_max: u64,
    heartbeat_timeout: u64,
    max_entries_per_append: usize,
}

impl Driver {
    pub fn new(
        node: NodeCore,
        log: Log,
        election_timeout_min: u64,
        election_timeout_max: u64,
        heartbeat_timeout: u64,
        max_entries_per_append: usize,
    ) -> Self {
        let mut driver = Self {
            node,
            log,
            election_timeout_min,
            election_timeout_max,
            heartbeat_timeout,
            max_entries_per_append,
        };
        driver.reset_randomized_election_timeout();
        driver
    }

    fn reset_randomized_election_timeout(&mut self) {
        self.node.randomized_election_timeout =
            rand::thread_rng().gen_range(self.election_timeout_min..=self.election_timeout_max);
        self.node.election_elapsed = 0;
    }

    fn last_log_term(&self) -> Term {
        self.log.term_at(self.log.last_index()).unwrap_or(0)
    }

    /// Advance the logical clock by one tick of `kind` (spec §4.1 "TICK", §4.3).
    pub fn tick(&mut self, kind: TickKind) -> Vec<Message> {
        match kind {
            TickKind::Election => self.tick_election(),
            TickKind::Heartbeat => self.tick_heartbeat(),
            TickKind::Lease => self.tick_lease(),
        }
    }

    fn tick_election(&mut self) -> Vec<Message> {
        if self.node.status == Status::Leader {
            return Vec::new();
        }
        self.node.election_elapsed += 1;
        if self.node.election_elapsed < self.node.randomized_election_timeout {
            return Vec::new();
        }
        self.hup()
    }

    fn tick_heartbeat(&mut self) -> Vec<Message> {
        if self.node.status != Status::Leader {
            return Vec::new();
        }
        self.node.heartbeat_elapsed += 1;
        if self.node.heartbeat_elapsed < self.heartbeat_timeout {
            return Vec::new();
        }
        self.node.heartbeat_elapsed = 0;
        self.broadcast_heartbeat()
    }

    /// Check the leader lease: if fewer than a quorum of peers have refreshed it via a
    /// `HeartbeatResponse` since the last tick for two consecutive ticks, step down to follower
    /// without incrementing the term (spec §4.3 "Leader lease", boundary scenario 3).
    fn tick_lease(&mut self) -> Vec<Message> {
        if self.node.status != Status::Leader {
            return Vec::new();
        }
        let quorum = self.node.cluster.quorum();
        let reachable = self.node.leased.len() + 1;
        self.node.leased.clear();
        if reachable < quorum {
            self.node.lease_violations += 1;
            warn!(
                id = self.node.id,
                reachable,
                quorum,
                violations = self.node.lease_violations,
                "lease tick missed quorum"
            );
            if self.node.lease_violations >= 2 {
                let term = self.node.current_term;
                self.node.become_follower(term, None);
            }
        } else {
            self.node.lease_violations = 0;
        }
        Vec::new()
    }

    /// A peer's heartbeat acknowledgement refreshes the leader's lease for this term (spec §4.3
    /// "Leader lease").
    fn handle_heartbeat_response(&mut self, msg: Message) -> Vec<Message> {
        if self.node.status == Status::Leader && !msg.reject && msg.term == self.node.current_term {
            self.node.leased.insert(msg.from);
        }
        Vec::new()
    }

    /// A linearizable-read guard (spec §6 `client_read`): only a leader that has cleared its
    /// replay barrier may answer locally.
    pub fn client_read_guard(&self) -> Result<(), ClientReadError> {
        if self.node.status != Status::Leader {
            return Err(ClientReadError::ForwardToLeader(self.node.leader_id));
        }
        if self.node.replay_state != ReplayState::Replayed {
            return Err(ClientReadError::NotYetReplayed);
        }
        Ok(())
    }

    /// Begin a fresh election round with the pre-vote phase (spec §4.3 "Pre-vote").
    fn hup(&mut self) -> Vec<Message> {
        self.node.become_pre_candidate();
        self.reset_randomized_election_timeout();
        let quorum = self.node.cluster.quorum();
        if quorum <= 1 {
            return self.win_pre_vote();
        }
        self.broadcast(MessageType::PreVote, self.node.current_term + 1, |_| {})
    }

    fn win_pre_vote(&mut self) -> Vec<Message> {
        self.node.become_candidate();
        let quorum = self.node.cluster.quorum();
        if quorum <= 1 {
            return self.become_leader_and_broadcast();
        }
        self.broadcast(MessageType::Vote, self.node.current_term, |_| {})
    }

    fn become_leader_and_broadcast(&mut self) -> Vec<Message> {
        self.node.become_leader(self.log.last_index(), self.log.applied_index);
        let term = self.node.current_term;
        let index = self.log.last_index() + 1;
        self.log.append(vec![Entry::new_nop(term, index)]);
        self.broadcast_heartbeat()
    }

    fn broadcast(&self, msg_type: MessageType, term: Term, configure: impl Fn(&mut Message)) -> Vec<Message> {
        self.node
            .cluster
            .peer_ids()
            .map(|to| {
                let mut m = Message::new(msg_type, self.node.id, to, term);
                m.index = self.log.last_index();
                m.log_term = self.last_log_term();
                configure(&mut m);
                m
            })
            .collect()
    }

    fn broadcast_heartbeat(&self) -> Vec<Message> {
        self.broadcast(MessageType::Heartbeat, self.node.current_term, |m| {
            m.commit_index = self.log.committed_index;
        })
    }

    /// `true` if `peer`'s `next_index` points at an entry the log has already compacted away, so
    /// replication must fall back to a snapshot transfer (spec §4.4 "SNAPSHOT_REQUEST", boundary
    /// scenario 5).
    pub fn needs_snapshot(&self, peer: NodeId) -> bool {
        match self.node.cluster.get(peer) {
            Some(info) => self.log.first_index() > 1 && info.next_index < self.log.first_index(),
            None => false,
        }
    }

    /// Build an `AppendEntriesRequest` replicating the log suffix `peer` is missing, per its
    /// tracked `next_index` (spec §4.4 "replication").
    pub fn replicate_to(&self, peer: NodeId) -> Option<Message> {
        let info = self.node.cluster.get(peer)?;
        let prev_index = info.next_index.saturating_sub(1);
        let prev_term = self.log.term_at(prev_index).unwrap_or(0);
        let entries = self.log.entries_from(info.next_index, self.max_entries_per_append);
        let mut m = Message::new(MessageType::AppendEntriesRequest, self.node.id, peer, self.node.current_term);
        m.index = prev_index;
        m.log_term = prev_term;
        m.entries = entries;
        m.commit_index = self.log.committed_index;
        Some(m)
    }

    /// Dispatch an inbound peer [`Message`] per the spec §4.4 handling table, returning any
    /// outbound messages the reaction produces.
    pub fn step(&mut self, msg: Message) -> Vec<Message> {
        if msg.term > self.node.current_term {
            let becomes_follower = !matches!(msg.msg_type, MessageType::PreVote | MessageType::PreVoteResponse);
            if becomes_follower {
                self.node.become_follower(msg.term, None);
            }
        }

        match msg.msg_type {
            MessageType::PreVote => self.handle_pre_vote(msg),
            MessageType::PreVoteResponse => self.handle_pre_vote_response(msg),
            MessageType::Vote => self.handle_vote(msg),
            MessageType::VoteResponse => self.handle_vote_response(msg),
            MessageType::AppendEntriesRequest => vec![self.handle_append_entries(msg)],
            MessageType::AppendEntriesResponse => self.handle_append_entries_response(msg),
            MessageType::Heartbeat => vec![self.handle_heartbeat(msg)],
            MessageType::HeartbeatResponse => self.handle_heartbeat_response(msg),
            MessageType::SnapshotRequest | MessageType::SnapshotResponse => Vec::new(),
            MessageType::Hup | MessageType::Propose | MessageType::Lease | MessageType::Nop => Vec::new(),
        }
    }

    fn handle_pre_vote(&mut self, msg: Message) -> Vec<Message> {
        let candidate_term = msg.term;
        let grant = candidate_term >= self.node.current_term
            && self.log_is_up_to_date(msg.log_term, msg.index)
            && self.node.election_elapsed >= self.election_timeout_min;
        let mut resp = Message::new(MessageType::PreVoteResponse, self.node.id, msg.from, candidate_term);
        resp.reject = !grant;
        vec![resp]
    }

    fn handle_pre_vote_response(&mut self, msg: Message) -> Vec<Message> {
        if self.node.status != Status::PreCandidate || msg.term != self.node.current_term + 1 || msg.reject {
            return Vec::new();
        }
        if self.node.record_vote(msg.from) {
            return self.win_pre_vote();
        }
        Vec::new()
    }

    fn handle_vote(&mut self, msg: Message) -> Vec<Message> {
        let can_vote = self.node.voted_for.is_none() || self.node.voted_for == Some(msg.from);
        let grant = msg.term == self.node.current_term
            && can_vote
            && self.log_is_up_to_date(msg.log_term, msg.index);
        if grant {
            self.node.voted_for = Some(msg.from);
            self.node.reset_election_elapsed();
        }
        let mut resp = Message::new(MessageType::VoteResponse, self.node.id, msg.from, self.node.current_term);
        resp.reject = !grant;
        vec![resp]
    }

    fn handle_vote_response(&mut self, msg: Message) -> Vec<Message> {
        if self.node.status != Status::Candidate || msg.term != self.node.current_term || msg.reject {
            return Vec::new();
        }
        if self.node.record_vote(msg.from) {
            return self.become_leader_and_broadcast();
        }
        Vec::new()
    }

    fn log_is_up_to_date(&self, candidate_log_term: Term, candidate_index: Index) -> bool {
        let my_term = self.last_log_term();
        candidate_log_term > my_term || (candidate_log_term == my_term && candidate_index >= self.log.last_index())
    }

    fn handle_heartbeat(&mut self, msg: Message) -> Message {
        if msg.term < self.node.current_term {
            let mut resp = Message::new(MessageType::HeartbeatResponse, self.node.id, msg.from, self.node.current_term);
            resp.reject = true;
            resp.reject_type = RejectType::LowTerm;
            return resp;
        }
        self.node.leader_id = Some(msg.from);
        self.node.reset_election_elapsed();
        self.log.advance_committed(msg.commit_index.min(self.log.last_index()));
        Message::new(MessageType::HeartbeatResponse, self.node.id, msg.from, self.node.current_term)
    }

    /// Apply (or reject) a leader's `AppendEntriesRequest` (spec §4.4 "LogNotMatch",
    /// "LogNonSequential").
    fn handle_append_entries(&mut self, msg: Message) -> Message {
        let mut resp = Message::new(MessageType::AppendEntriesResponse, self.node.id, msg.from, self.node.current_term);

        if msg.term < self.node.current_term {
            resp.reject = true;
            resp.reject_type = RejectType::LowTerm;
            return resp;
        }
        self.node.leader_id = Some(msg.from);
        self.node.reset_election_elapsed();

        if msg.index > self.log.last_index() {
            resp.reject = true;
            resp.reject_type = RejectType::LogNonSequential;
            resp.index = self.log.last_index();
            return resp;
        }
        if msg.index > 0 && self.log.term_at(msg.index) != Some(msg.log_term) {
            resp.reject = true;
            resp.reject_type = RejectType::LogNotMatch;
            resp.index = msg.index;
            return resp;
        }

        if let Some(first_new) = msg.entries.first() {
            if self.log.term_at(first_new.index) != Some(first_new.term) {
                self.log.truncate_suffix(first_new.index);
            }
        }
        let to_append: Vec<Entry> = msg
            .entries
            .into_iter()
            .filter(|e| e.index > self.log.last_index())
            .collect();
        self.log.append(to_append);

        self.log.advance_committed(msg.commit_index.min(self.log.last_index()));
        resp.index = self.log.last_index();
        resp
    }

    fn handle_append_entries_response(&mut self, msg: Message) -> Vec<Message> {
        if self.node.status != Status::Leader {
            return Vec::new();
        }
        let peer = match self.node.cluster.get_mut(msg.from) {
            Some(peer) => peer,
            None => return Vec::new(),
        };
        if msg.reject {
            match msg.reject_type {
                RejectType::LogNonSequential | RejectType::LogNotMatch => {
                    peer.next_index = (msg.index + 1).max(1);
                }
                _ => {}
            }
            if let Some(next) = self.replicate_to(msg.from) {
                return vec![next];
            }
            return Vec::new();
        }
        peer.match_index = peer.match_index.max(msg.index);
        peer.next_index = peer.match_index + 1;
        self.advance_commit();
        Vec::new()
    }

    /// Recompute `committed_index` as the highest index replicated to a quorum, refusing to
    /// commit an entry from a prior term purely on replication count (spec §4.4 "no commit
    /// across terms"; this is the rule that makes the classic Raft figure-8 split-brain scenario
    /// impossible).
    fn advance_commit(&mut self) {
        if self.node.status != Status::Leader {
            return;
        }
        let mut match_indices: Vec<Index> = self.node.cluster.all().map(|n| n.match_index).collect();
        match_indices.push(self.log.last_index());
        match_indices.sort_unstable_by(|a, b| b.cmp(a));
        let q = quorum(self.node.cluster.len());
        let candidate = match_indices[q - 1];
        if candidate <= self.log.committed_index {
            return;
        }
        match self.log.term_at(candidate) {
            Some(term) if term == self.node.current_term => {
                self.log.advance_committed(candidate);
            }
            Some(term) => {
                debug!(candidate, term, current_term = self.node.current_term, "withholding commit across term boundary");
            }
            None => {
                warn!(candidate, "advance_commit candidate index missing from log");
            }
        }
    }

    /// Decide whether an inbound `SNAPSHOT_REQUEST` should be installed: reject stale terms the
    /// same way `handle_append_entries` does, otherwise record the sender as leader (spec §4.4
    /// "SNAPSHOT_REQUEST").
    pub fn accept_snapshot(&mut self, from: NodeId, term: Term) -> bool {
        if term < self.node.current_term {
            return false;
        }
        if term > self.node.current_term {
            self.node.become_follower(term, Some(from));
        } else {
            self.node.leader_id = Some(from);
            self.node.reset_election_elapsed();
        }
        true
    }

    /// Record that a snapshot has been durably installed locally, collapsing the in-memory log
    /// view to the snapshot boundary (spec §4.7 "snapshot install").
    pub fn record_snapshot_installed(&mut self, index: Index, term: Term) {
        self.log.install_snapshot(index, term);
        self.node.maybe_clear_replay_barrier(index);
    }

    /// Record that a snapshot taken locally (by the apply loop, on trigger) has compacted the WAL
    /// up to `index`; fold the same boundary into the in-memory log view (spec §4.8).
    pub fn record_snapshot_compacted(&mut self, index: Index, term: Term) {
        self.log.compact(index, term);
    }

    /// A leader learns a peer has finished installing a snapshot: fast-forward its replication
    /// progress past the snapshot boundary (spec §4.4 "SNAPSHOT_RESPONSE").
    pub fn mark_peer_snapshotted(&mut self, peer: NodeId, index: Index) {
        if let Some(info) = self.node.cluster.get_mut(peer) {
            info.match_index = info.match_index.max(index);
            info.next_index = info.next_index.max(index + 1);
        }
        self.advance_commit();
    }

    /// Append a client proposal to the leader's log (spec §6 `propose`). Returns the `(term,
    /// index)` the entry was assigned, or `None` if this node is not the leader.
    pub fn propose(&mut self, data: Vec<u8>) -> Option<(Term, Index)> {
        if self.node.status != Status::Leader {
            return None;
        }
        let term = self.node.current_term;
        let index = self.log.last_index() + 1;
        self.log.append(vec![Entry::new(EntryType::Normal, term, index, data)]);
        Some((term, index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::Cluster;

    fn driver(id: NodeId) -> Driver {
        let cluster = Cluster::new(id, vec![(1, "a".into()), (2, "b".into()), (3, "c".into())]);
        let node = NodeCore::new(id, cluster, 10);
        Driver::new(node, Log::new(), 10, 20, 3, 100)
    }

    #[test]
    fn single_candidate_wins_election_with_enough_votes() {
        let mut d = driver(1);
        let out = d.hup();
        assert_eq!(out.len(), 2);
        assert_eq!(d.node.status, Status::PreCandidate);

        let resp = Message::new(MessageType::PreVoteResponse, 2, 1, d.node.current_term + 1);
        d.step(resp);
        assert_eq!(d.node.status, Status::Candidate);

        let out = d.step(Message::new(MessageType::VoteResponse, 3, 1, d.node.current_term));
        assert_eq!(d.node.status, Status::Leader);
        assert!(!out.is_empty());
    }

    #[test]
    fn rejects_append_entries_on_log_mismatch() {
        let mut d = driver(2);
        d.log.append(vec![Entry::new(EntryType::Normal, 1, 1, vec![])]);
        let mut m = Message::new(MessageType::AppendEntriesRequest, 1, 2, 1);
        m.index = 1;
        m.log_term = 2;
        let resp = d.handle_append_entries(m);
        assert!(resp.reject);
        assert_eq!(resp.reject_type, RejectType::LogNotMatch);
    }

    #[test]
    fn commit_does_not_advance_across_term_boundary_on_count_alone() {
        let mut d = driver(1);
        d.node.status = Status::Leader;
        d.node.current_term = 2;
        d.log.append(vec![Entry::new(EntryType::Normal, 1, 1, vec![])]);
        d.log.append(vec![Entry::new(EntryType::Normal, 2, 2, vec![])]);
        d.node.cluster.get_mut(2).unwrap().match_index = 1;
        d.node.cluster.get_mut(3).unwrap().match_index = 1;
        d.advance_commit();
        assert_eq!(d.log.committed_index, 0, "term-1 entry must not commit via count alone");

        d.node.cluster.get_mut(2).unwrap().match_index = 2;
        d.advance_commit();
        assert_eq!(d.log.committed_index, 2);
    }

    #[test]
    fn leader_steps_down_after_two_missed_lease_ticks() {
        let mut d = driver(1);
        d.node.status = Status::Leader;
        d.node.leader_id = Some(1);

        // Quorum of this 3-node cluster is 2; a lone leader with no refreshed peers never
        // reaches it.
        d.tick(TickKind::Lease);
        assert_eq!(d.node.status, Status::Leader);
        assert_eq!(d.node.lease_violations, 1);

        d.tick(TickKind::Lease);
        assert_eq!(d.node.status, Status::Follower);
    }

    #[test]
    fn heartbeat_response_refreshes_the_lease_and_resets_violations() {
        let mut d = driver(1);
        d.node.status = Status::Leader;
        d.node.leader_id = Some(1);
        d.node.lease_violations = 1;

        let resp = Message::new(MessageType::HeartbeatResponse, 2, 1, d.node.current_term);
        d.step(resp);
        d.tick(TickKind::Lease);

        assert_eq!(d.node.status, Status::Leader);
        assert_eq!(d.node.lease_violations, 0);
    }

    #[test]
    fn follower_behind_retention_needs_a_snapshot_until_it_installs_one() {
        let mut leader = driver(1);
        leader.node.status = Status::Leader;
        leader.node.cluster.get_mut(2).unwrap().next_index = 1;
        leader.log.compact(1000, 7);
        assert!(leader.needs_snapshot(2), "peer asking for index 1 can't be served from a compacted log");

        let mut follower = driver(2);
        assert!(follower.accept_snapshot(1, 7));
        follower.record_snapshot_installed(1000, 7);
        assert_eq!(follower.log.first_index(), 1001);
        assert_eq!(follower.log.term_at(1000), Some(7));

        leader.mark_peer_snapshotted(2, 1000);
        assert_eq!(leader.node.cluster.get(2).unwrap().match_index, 1000);
        assert!(!leader.needs_snapshot(2), "peer caught up via snapshot no longer needs one");
    }
}
