//! Cluster membership and group-state derivation (spec §3 "NodeInfo", "Cluster", "GroupState").

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::types::Index;
use crate::types::NodeId;

/// Whether a peer's log replay has caught up to the watermark captured at the last role
/// transition (spec §3 I6, GLOSSARY "Replay state").
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ReplayState {
    Replaying,
    Replayed,
}

/// Identity and runtime replication progress for a single cluster member (spec §3 "NodeInfo").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: NodeId,
    pub address: String,
    /// Next log index to send to this peer (leader-only bookkeeping).
    pub next_index: Index,
    /// Highest index known to be replicated to this peer (leader-only bookkeeping).
    pub match_index: Index,
    pub disconnected: bool,
    /// Set while an apply batch covering this node's locally-applied state is in flight (I7).
    pub applying: bool,
    pub replay_state: ReplayState,
}

impl NodeInfo {
    pub fn new(id: NodeId, address: impl Into<String>) -> Self {
        Self {
            id,
            address: address.into(),
            next_index: 1,
            match_index: 0,
            disconnected: false,
            applying: false,
            replay_state: ReplayState::Replayed,
        }
    }
}

/// An immutable mapping `id -> NodeInfo` built from configuration (spec §3 "Cluster").
#[derive(Clone, Debug)]
pub struct Cluster {
    self_id: NodeId,
    nodes: BTreeMap<NodeId, NodeInfo>,
}

impl Cluster {
    /// Build a cluster from a configured member list. `self_id` must be present in `members`.
    pub fn new(self_id: NodeId, members: Vec<(NodeId, String)>) -> Self {
        let nodes = members.into_iter().map(|(id, addr)| (id, NodeInfo::new(id, addr))).collect();
        Self { self_id, nodes }
    }

    pub fn self_id(&self) -> NodeId {
        self.self_id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn get(&self, id: NodeId) -> Option<&NodeInfo> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut NodeInfo> {
        self.nodes.get_mut(&id)
    }

    pub fn all(&self) -> impl Iterator<Item = &NodeInfo> {
        self.nodes.values()
    }

    pub fn all_mut(&mut self) -> impl Iterator<Item = &mut NodeInfo> {
        self.nodes.values_mut()
    }

    /// A view excluding self.
    pub fn peers(&self) -> impl Iterator<Item = &NodeInfo> {
        let self_id = self.self_id;
        self.nodes.values().filter(move |n| n.id != self_id)
    }

    pub fn peer_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.peers().map(|n| n.id)
    }

    /// `quorum = floor(N/2) + 1`.
    pub fn quorum(&self) -> usize {
        quorum(self.nodes.len())
    }

    /// Number of reachable members including self.
    pub fn available(&self) -> usize {
        1 + self.peers().filter(|n| !n.disconnected).count()
    }

    pub fn group_state(&self) -> GroupState {
        derive_group_state(self.available(), self.len(), self.quorum())
    }
}

/// `quorum = floor(N/2) + 1`, per spec GLOSSARY.
pub fn quorum(n: usize) -> usize {
    n / 2 + 1
}

/// Reachability of the cluster, recomputed on peer connect/disconnect (spec §5 "Group-state
/// refresh").
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum GroupState {
    /// All peers reachable.
    Stable,
    /// At least a quorum reachable.
    Partial,
    /// Fewer than a quorum reachable.
    Unavailable,
}

pub fn derive_group_state(available: usize, total: usize, quorum: usize) -> GroupState {
    if available >= total {
        GroupState::Stable
    } else if available >= quorum {
        GroupState::Partial
    } else {
        GroupState::Unavailable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(n: u64) -> Cluster {
        let members = (1..=n).map(|id| (id, format!("127.0.0.1:{}", 9000 + id))).collect();
        Cluster::new(1, members)
    }

    #[test]
    fn quorum_matches_spec_glossary() {
        assert_eq!(quorum(1), 1);
        assert_eq!(quorum(2), 2);
        assert_eq!(quorum(3), 2);
        assert_eq!(quorum(4), 3);
        assert_eq!(quorum(5), 3);
    }

    #[test]
    fn group_state_transitions() {
        let mut c = cluster(5);
        assert_eq!(c.group_state(), GroupState::Stable);

        c.get_mut(2).unwrap().disconnected = true;
        assert_eq!(c.group_state(), GroupState::Partial);

        c.get_mut(3).unwrap().disconnected = true;
        c.get_mut(4).unwrap().disconnected = true;
        assert_eq!(c.group_state(), GroupState::Unavailable);
    }

    #[test]
    fn single_node_cluster_is_stable_and_quorum_one() {
        let c = cluster(1);
        assert_eq!(c.quorum(), 1);
        assert_eq!(c.group_state(), GroupState::Stable);
    }
}
