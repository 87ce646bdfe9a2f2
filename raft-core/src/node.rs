//! The node state machine (spec §4.3 "Node roles and transitions").

use std::collections::HashSet;

use tracing::debug;
use tracing::info;

use crate::cluster::Cluster;
use crate::cluster::ReplayState;
use crate::types::Index;
use crate::types::NodeId;
use crate::types::Term;
use crate::types::NOT_VOTE;

/// A node's role, per spec §4.3. `PreCandidate` runs the pre-vote phase without incrementing
/// `current_term`, avoiding the term-inflation a partitioned node would otherwise cause on
/// rejoining (spec §4.3 "Pre-vote").
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    Follower,
    PreCandidate,
    Candidate,
    Leader,
}

/// Persistent + volatile state for a single Raft node (spec §3 "NodeCore").
///
/// `current_term`, `voted_for`, and the log (owned separately by [`crate::log::Log`]) are the
/// only fields that must survive a restart; everything else is rebuilt from the log and from
/// peer responses.
pub struct NodeCore {
    pub id: NodeId,
    pub status: Status,
    pub current_term: Term,
    pub voted_for: Option<NodeId>,
    pub leader_id: Option<NodeId>,
    pub cluster: Cluster,

    /// Votes granted to self during the current pre-vote or vote round.
    pub votes_granted: HashSet<NodeId>,
    /// Lowest index that must be applied before `replay_state` flips to `Replayed` (spec I6).
    pub replay_low_water_mark: Index,
    pub replay_state: ReplayState,

    /// Peers that have returned a `HeartbeatResponse` for the current term since the last lease
    /// tick, refreshed on every response and drained on every `TickKind::Lease` (spec §4.3
    /// "Leader lease").
    pub leased: HashSet<NodeId>,
    /// Consecutive lease ticks that failed to see a quorum of `leased` peers. Reaching 2 forces a
    /// step-down (spec §4.3 "Leader lease").
    pub lease_violations: u32,

    /// Monotonic logical clock driving election/heartbeat/lease timers (spec §2 item 1).
    pub election_elapsed: u64,
    pub election_timeout: u64,
    pub heartbeat_elapsed: u64,
    pub randomized_election_timeout: u64,
}

impl NodeCore {
    pub fn new(id: NodeId, cluster: Cluster, election_timeout: u64) -> Self {
        Self {
            id,
            status: Status::Follower,
            current_term: 0,
            voted_for: NOT_VOTE,
            leader_id: None,
            cluster,
            votes_granted: HashSet::new(),
            replay_low_water_mark: 0,
            replay_state: ReplayState::Replayed,
            leased: HashSet::new(),
            lease_violations: 0,
            election_elapsed: 0,
            election_timeout,
            heartbeat_elapsed: 0,
            randomized_election_timeout: election_timeout,
        }
    }

    pub fn is_leader(&self) -> bool {
        self.status == Status::Leader
    }

    /// Reset to `Follower` under `term`, clearing leader-only bookkeeping (spec §4.3
    /// "become_follower").
    #[tracing::instrument(level = "debug", skip(self), fields(id = self.id))]
    pub fn become_follower(&mut self, term: Term, leader_id: Option<NodeId>) {
        self.status = Status::Follower;
        self.current_term = term;
        self.voted_for = NOT_VOTE;
        self.leader_id = leader_id;
        self.votes_granted.clear();
        self.leased.clear();
        self.lease_violations = 0;
        self.reset_election_elapsed();
        info!(id = self.id, term, ?leader_id, "became follower");
    }

    /// Enter the pre-vote phase without incrementing `current_term` (spec §4.3 "Pre-vote").
    #[tracing::instrument(level = "debug", skip(self), fields(id = self.id))]
    pub fn become_pre_candidate(&mut self) {
        self.status = Status::PreCandidate;
        self.leader_id = None;
        self.votes_granted.clear();
        self.votes_granted.insert(self.id);
        self.reset_election_elapsed();
        debug!(id = self.id, term = self.current_term, "became pre-candidate");
    }

    /// Enter the real vote phase: increments `current_term`, votes for self (spec §4.3
    /// "become_candidate").
    #[tracing::instrument(level = "debug", skip(self), fields(id = self.id))]
    pub fn become_candidate(&mut self) {
        self.status = Status::Candidate;
        self.current_term += 1;
        self.voted_for = Some(self.id);
        self.leader_id = None;
        self.votes_granted.clear();
        self.votes_granted.insert(self.id);
        self.reset_election_elapsed();
        info!(id = self.id, term = self.current_term, "became candidate");
    }

    /// Transition to leader: captures the replay low-water-mark at `last_log_index` so the node
    /// knows when it has replayed enough of its own term to serve linearizable reads (spec I6
    /// "`lowWaterMark` is `lastIndex` captured at transition time"). If `applied_index` has
    /// already caught up to `last_log_index` there is nothing left to replay, so `replay_state`
    /// is set to `Replayed` immediately instead of waiting for the next apply (spec §4.3).
    #[tracing::instrument(level = "debug", skip(self), fields(id = self.id))]
    pub fn become_leader(&mut self, last_log_index: Index, applied_index: Index) {
        self.status = Status::Leader;
        self.leader_id = Some(self.id);
        self.votes_granted.clear();
        self.heartbeat_elapsed = 0;
        self.leased.clear();
        self.lease_violations = 0;
        self.replay_low_water_mark = last_log_index;
        self.replay_state =
            if applied_index >= last_log_index { ReplayState::Replayed } else { ReplayState::Replaying };
        for node in self.cluster.all_mut() {
            node.next_index = last_log_index + 1;
            node.match_index = 0;
        }
        let self_id = self.id;
        let replay_state = self.replay_state;
        if let Some(info) = self.cluster.get_mut(self_id) {
            info.replay_state = replay_state;
        }
        info!(
            id = self.id,
            term = self.current_term,
            low_water_mark = self.replay_low_water_mark,
            replay_state = ?self.replay_state,
            "became leader"
        );
    }

    /// Record a granted pre-vote/vote from `from` and report whether a quorum has now been
    /// reached (spec §4.4 "VoteResponse handling").
    pub fn record_vote(&mut self, from: NodeId) -> bool {
        self.votes_granted.insert(from);
        self.votes_granted.len() >= self.cluster.quorum()
    }

    pub fn reset_election_elapsed(&mut self) {
        self.election_elapsed = 0;
    }

    /// Mark the replay barrier satisfied once `applied_index` has caught up (spec I6).
    pub fn maybe_clear_replay_barrier(&mut self, applied_index: Index) {
        if self.replay_state == ReplayState::Replaying && applied_index >= self.replay_low_water_mark {
            self.replay_state = ReplayState::Replayed;
            let self_id = self.id;
            if let Some(info) = self.cluster.get_mut(self_id) {
                info.replay_state = ReplayState::Replayed;
            }
            info!(id = self.id, applied_index, "replay barrier cleared");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster() -> Cluster {
        Cluster::new(1, vec![(1, "a".into()), (2, "b".into()), (3, "c".into())])
    }

    #[test]
    fn become_candidate_increments_term_and_votes_self() {
        let mut n = NodeCore::new(1, cluster(), 100);
        n.become_candidate();
        assert_eq!(n.current_term, 1);
        assert_eq!(n.voted_for, Some(1));
        assert_eq!(n.status, Status::Candidate);
        assert!(n.votes_granted.contains(&1));
    }

    #[test]
    fn become_leader_sets_replay_barrier_at_last_index() {
        let mut n = NodeCore::new(1, cluster(), 100);
        n.become_candidate();
        n.become_leader(9, 0);
        assert_eq!(n.replay_low_water_mark, 9);
        assert_eq!(n.replay_state, ReplayState::Replaying);
        n.maybe_clear_replay_barrier(8);
        assert_eq!(n.replay_state, ReplayState::Replaying);
        n.maybe_clear_replay_barrier(9);
        assert_eq!(n.replay_state, ReplayState::Replayed);
        assert_eq!(n.cluster.get(1).unwrap().replay_state, ReplayState::Replayed);
    }

    #[test]
    fn become_leader_is_immediately_replayed_when_already_caught_up() {
        let mut n = NodeCore::new(1, cluster(), 100);
        n.become_candidate();
        n.become_leader(5, 5);
        assert_eq!(n.replay_state, ReplayState::Replayed);
        assert_eq!(n.cluster.get(1).unwrap().replay_state, ReplayState::Replayed);
    }

    #[test]
    fn record_vote_reaches_quorum_at_two_of_three() {
        let mut n = NodeCore::new(1, cluster(), 100);
        n.become_pre_candidate();
        assert_eq!(n.cluster.quorum(), 2);
        assert!(n.record_vote(2));
    }

    #[test]
    fn become_follower_clears_vote_and_leader_tracking() {
        let mut n = NodeCore::new(1, cluster(), 100);
        n.become_candidate();
        n.become_follower(5, Some(2));
        assert_eq!(n.current_term, 5);
        assert_eq!(n.voted_for, NOT_VOTE);
        assert_eq!(n.leader_id, Some(2));
        assert!(n.votes_granted.is_empty());
    }
}
