use std::time::Duration;

use raft_core::cluster::GroupState;
use raft_core::node::Status;

mod fixtures;

/// Isolating the leader from the rest of a three-node cluster must cause the remaining two nodes
/// to elect a new leader among themselves, while the isolated node's own view of the cluster loses
/// quorum and it steps itself down once its leader lease expires (spec §8 "leader step-down on
/// partition", §4.3 "Leader lease", boundary scenario 3 "STABLE -> UNAVAILABLE").
///
/// RUST_LOG=raft_core,raft_memstore,partition_leader_step_down=trace cargo test -p raft-core --test partition_leader_step_down
#[tokio::test(flavor = "multi_thread")]
async fn isolating_the_leader_triggers_a_new_election_and_self_demotion() {
    let cluster = fixtures::start_cluster(3).await;
    let original_leader = cluster.wait(1, Duration::from_secs(5)).until_leader().await.expect("a leader is elected");

    cluster.isolate(original_leader);

    let survivors: Vec<u64> = cluster.nodes.iter().map(|n| n.id).filter(|id| *id != original_leader).collect();
    let mut new_leader = None;
    for id in &survivors {
        let seen = cluster.wait(*id, Duration::from_secs(10)).until_leader().await.expect("survivors elect a leader");
        if let Some(existing) = new_leader {
            assert_eq!(existing, seen, "the two survivors must agree on the new leader");
        }
        new_leader = Some(seen);
    }
    assert_ne!(new_leader, Some(original_leader), "the isolated node cannot still be recognized as leader");

    // The isolated node's own GroupState reflects its lost quorum view, and its leader lease
    // expires after two missed ticks, forcing a self step-down to FOLLOWER.
    cluster
        .wait(original_leader, Duration::from_secs(5))
        .until_group_state(GroupState::Unavailable)
        .await
        .expect("the isolated leader loses its quorum view");
    cluster
        .wait(original_leader, Duration::from_secs(5))
        .until_status(Status::Follower)
        .await
        .expect("the isolated leader steps itself down once its lease expires");

    cluster.restore(original_leader);
}
