//! Fixtures for testing raft-core, grounded on the teacher's `fixtures::RaftRouter` pattern.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use raft_core::config::Config;
use raft_core::metrics::Wait;
use raft_core::Raft;
use raft_memstore::MemRouter;
use raft_memstore::MemStateMachine;
use raft_memstore::MemWal;
use raft_memstore::RouterHandle;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).try_init();
}

pub struct ClusterNode {
    pub id: u64,
    pub raft: Raft,
    pub state_machine: Arc<MemStateMachine>,
}

pub struct Cluster {
    pub router: Arc<MemRouter>,
    pub nodes: Vec<ClusterNode>,
}

impl Cluster {
    pub fn wait(&self, id: u64, timeout: Duration) -> Wait {
        let node = self.nodes.iter().find(|n| n.id == id).expect("unknown node id");
        Wait::new(node.raft.metrics(), timeout)
    }

    pub fn node(&self, id: u64) -> &ClusterNode {
        self.nodes.iter().find(|n| n.id == id).expect("unknown node id")
    }

    pub fn isolate(&self, id: u64) {
        self.router.isolate(id);
    }

    pub fn restore(&self, id: u64) {
        self.router.restore(id);
    }
}

/// Start an `n`-node cluster wired together through an in-process [`MemRouter`], mirroring the
/// teacher's `fixtures::RaftRouter::new` + per-node `Raft::new` setup.
pub async fn start_cluster(n: u64) -> Cluster {
    init_tracing();
    let members: Vec<(u64, String)> = (1..=n).map(|id| (id, format!("node-{}", id))).collect();
    let router = MemRouter::new();

    let mut nodes = Vec::new();
    for id in 1..=n {
        let config = Config::builder(id)
            .members(members.clone())
            .election_timeout_range(150, 300)
            .heartbeat_interval_ms(30)
            .build()
            .expect("valid config");
        let wal = Arc::new(MemWal::new());
        let state_machine = Arc::new(MemStateMachine::new());
        let transport = Arc::new(RouterHandle::new(router.clone(), id));
        let raft = Raft::new(config, wal, state_machine.clone(), transport).await.expect("node starts");
        router.register(id, raft.clone());
        nodes.push(ClusterNode { id, raft, state_machine });
    }

    Cluster { router, nodes }
}
