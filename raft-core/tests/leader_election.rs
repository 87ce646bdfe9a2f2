use std::time::Duration;

mod fixtures;

/// A three-node cluster should converge on exactly one leader, and the other two should agree on
/// who it is.
///
/// RUST_LOG=raft_core,raft_memstore,leader_election=trace cargo test -p raft-core --test leader_election

#[tokio::test(flavor = "multi_thread")]
async fn three_node_cluster_elects_a_single_leader() {
    let cluster = fixtures::start_cluster(3).await;

    let leader_id = cluster.wait(1, Duration::from_secs(5)).until_leader().await.expect("a leader is elected");

    for node in &cluster.nodes {
        let seen = cluster.wait(node.id, Duration::from_secs(5)).until_leader().await.expect("sees a leader");
        assert_eq!(seen, leader_id, "every node must agree on the current leader");
    }

    let leader = cluster.node(leader_id);
    assert_eq!(leader.raft.metrics().borrow().id, leader_id);
}

#[tokio::test(flavor = "multi_thread")]
async fn single_node_cluster_is_its_own_leader() {
    let cluster = fixtures::start_cluster(1).await;
    let leader_id = cluster.wait(1, Duration::from_secs(5)).until_leader().await.expect("a leader is elected");
    assert_eq!(leader_id, 1);
}
