use std::time::Duration;

mod fixtures;

/// Every node that applies a given set of committed entries must apply them in the same order
/// (spec I7 "total order apply").
///
/// RUST_LOG=raft_core,raft_memstore,total_order_apply=trace cargo test -p raft-core --test total_order_apply
#[tokio::test(flavor = "multi_thread")]
async fn all_nodes_apply_committed_entries_in_the_same_order() {
    let cluster = fixtures::start_cluster(3).await;
    let leader_id = cluster.wait(1, Duration::from_secs(5)).until_leader().await.expect("a leader is elected");
    let leader = cluster.node(leader_id);

    let mut last_index = 0;
    for i in 0..10u32 {
        let payload = format!("key{}=value{}", i, i).into_bytes();
        let (_, index) = leader.raft.propose(payload).await.expect("proposal is accepted");
        last_index = last_index.max(index);
    }

    for node in &cluster.nodes {
        cluster
            .wait(node.id, Duration::from_secs(5))
            .until_applied_at_least(last_index)
            .await
            .expect("node catches up");
    }

    let reference: Vec<Vec<u8>> = cluster.node(leader_id).state_machine.applied_entries().iter().map(|e| e.data.clone()).collect();
    for node in &cluster.nodes {
        let applied: Vec<Vec<u8>> = node.state_machine.applied_entries().iter().map(|e| e.data.clone()).collect();
        assert_eq!(applied, reference, "node {} diverged from the leader's apply order", node.id);
    }
}
