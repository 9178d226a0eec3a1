//! Replication behavior when nodes drop out of the cluster.

use std::time::Duration;

use tessera_dht::DhtError;
use tessera_tests::TestCluster;
use tessera_types::{PeerId, RecordId};

#[tokio::test]
async fn test_put_fails_without_a_replica_majority() {
    let cluster = TestCluster::new(4);
    let value = b"ballot batch 7".to_vec();
    let key = RecordId::from_data(&value);

    // Two of the three replica targets are unreachable.
    let targets = cluster.nodes[0].dht.closest_peers(&PeerId::from(key), 3);
    cluster.set_down(targets[0], true);
    cluster.set_down(targets[1], true);

    match cluster.nodes[0].dht.put(key, value).await {
        Err(DhtError::ReplicationFailed { acks, needed }) => {
            assert_eq!(acks, 1);
            assert_eq!(needed, 2);
        }
        other => panic!("expected ReplicationFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_put_tolerates_a_single_down_replica() {
    let cluster = TestCluster::new(4);
    let value = b"ballot batch 8".to_vec();
    let key = RecordId::from_data(&value);

    let targets = cluster.nodes[0].dht.closest_peers(&PeerId::from(key), 3);
    cluster.set_down(targets[0], true);

    cluster.nodes[0].dht.put(key, value).await.unwrap();
}

#[tokio::test]
async fn test_get_routes_around_a_down_holder() {
    let cluster = TestCluster::new(5);
    let value = b"tally attachment".to_vec();
    let key = RecordId::from_data(&value);
    cluster.nodes[0].dht.put(key, value.clone()).await.unwrap();

    // Take down one replica; a node that holds nothing locally must still
    // find the value on a surviving holder.
    let targets = cluster.nodes[0].dht.closest_peers(&PeerId::from(key), 3);
    cluster.set_down(targets[0], true);

    let reader = cluster
        .nodes
        .iter()
        .find(|n| n.id() != cluster.nodes[0].id() && !targets.contains(&n.id()))
        .unwrap();
    assert_eq!(reader.dht.get(key).await.unwrap(), value);
}

#[tokio::test(start_paused = true)]
async fn test_missed_replica_is_retried_after_revival() {
    let cluster = TestCluster::new(4);
    let value = b"late replica".to_vec();
    let key = RecordId::from_data(&value);

    let targets = cluster.nodes[0].dht.closest_peers(&PeerId::from(key), 3);
    let straggler = targets[0];
    cluster.set_down(straggler, true);

    cluster.nodes[0].dht.put(key, value.clone()).await.unwrap();

    let node = cluster
        .nodes
        .iter()
        .find(|n| n.id() == straggler)
        .unwrap()
        .clone();
    let (missing, _) = node.dht.handle_find_value(key).await;
    assert!(missing.is_none());

    // The background retry catches the node up once it is reachable again.
    cluster.set_down(straggler, false);
    tokio::time::sleep(Duration::from_secs(8)).await;

    let (record, _) = node.dht.handle_find_value(key).await;
    assert_eq!(record.unwrap().value, value);
}
