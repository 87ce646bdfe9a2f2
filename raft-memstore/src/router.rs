//! An in-process router standing in for a real network, mirroring the teacher's
//! `fixtures::RaftRouter` used throughout its integration tests.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::RwLock;

use async_trait::async_trait;
use raft_core::message::Message;
use raft_core::transport::Transporter;
use raft_core::types::NodeId;
use raft_core::Raft;

/// Shared routing table. Nodes register themselves after starting; messages addressed to an
/// isolated node (or sent from one) are silently dropped, simulating a network partition (spec
/// §8 "leader step-down on partition").
#[derive(Default)]
pub struct MemRouter {
    nodes: RwLock<HashMap<NodeId, Raft>>,
    isolated: RwLock<HashSet<NodeId>>,
}

impl MemRouter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, id: NodeId, raft: Raft) {
        self.nodes.write().unwrap().insert(id, raft);
    }

    pub fn isolate(&self, id: NodeId) {
        self.isolated.write().unwrap().insert(id);
    }

    pub fn restore(&self, id: NodeId) {
        self.isolated.write().unwrap().remove(&id);
    }

    fn is_isolated(&self, id: NodeId) -> bool {
        self.isolated.read().unwrap().contains(&id)
    }
}

/// The per-node [`Transporter`] handed to [`Raft::new`]; every node holds its own `RouterHandle`
/// bound to its own id but sharing the same [`MemRouter`].
pub struct RouterHandle {
    router: Arc<MemRouter>,
    from: NodeId,
}

impl RouterHandle {
    pub fn new(router: Arc<MemRouter>, from: NodeId) -> Self {
        Self { router, from }
    }
}

#[async_trait]
impl Transporter for RouterHandle {
    async fn send(&self, to: NodeId, message: Message) -> anyhow::Result<()> {
        if self.router.is_isolated(self.from) || self.router.is_isolated(to) {
            anyhow::bail!("peer {} is isolated", to);
        }
        let target = self.router.nodes.read().unwrap().get(&to).cloned();
        match target {
            Some(raft) => {
                let _ = raft.step(message).await;
                Ok(())
            }
            None => anyhow::bail!("peer {} is not registered with the router", to),
        }
    }

    async fn on_disconnect(&self, _peer: NodeId) {}
}
