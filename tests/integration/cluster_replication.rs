//! Record replication across a multi-node cluster.

use tessera_dht::DhtError;
use tessera_net::RecordPayload;
use tessera_tests::{standalone_node, TestCluster};
use tessera_types::RecordId;

#[tokio::test]
async fn test_put_is_readable_from_every_node() {
    let cluster = TestCluster::new(5);
    let value = b"ballot batch 42".to_vec();
    let key = RecordId::from_data(&value);

    cluster.nodes[0]
        .dht
        .put(key, value.clone())
        .await
        .unwrap();

    // Every node can retrieve it, holders directly and the rest through
    // the iterative lookup.
    for node in &cluster.nodes {
        assert_eq!(node.dht.get(key).await.unwrap(), value);
    }
}

#[tokio::test]
async fn test_put_rejects_key_that_is_not_the_content_address() {
    let cluster = TestCluster::new(3);
    let value = b"tally sheet".to_vec();
    let wrong = RecordId::from_data(b"something else");

    match cluster.nodes[0].dht.put(wrong, value).await {
        Err(DhtError::KeyMismatch { provided, .. }) => assert_eq!(provided, wrong),
        other => panic!("expected KeyMismatch, got {other:?}"),
    }
}

#[tokio::test]
async fn test_replicas_reject_tampered_records() {
    let cluster = TestCluster::new(3);
    let node = &cluster.nodes[1];

    let tampered = RecordPayload {
        id: RecordId::from_data(b"original"),
        value: b"altered in flight".to_vec(),
        expires_at: node.dht.retention_deadline(),
    };
    assert!(!node.dht.handle_store(tampered).await);
}

#[tokio::test]
async fn test_missing_value_is_not_found() {
    let cluster = TestCluster::new(3);
    let key = RecordId::from_data(b"never stored");

    match cluster.nodes[2].dht.get(key).await {
        Err(DhtError::NotFound(k)) => assert_eq!(k, key),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_new_node_joins_via_seed_and_reads_existing_records() {
    let cluster = TestCluster::new(4);
    let value = b"archived proof bundle".to_vec();
    let key = RecordId::from_data(&value);
    cluster.nodes[0].dht.put(key, value.clone()).await.unwrap();

    let joiner = standalone_node(99, cluster.rpc.clone());
    cluster.register(joiner.clone());
    assert_eq!(joiner.dht.peer_count(), 0);

    joiner.dht.bootstrap(&[cluster.nodes[0].id()]).await;
    assert!(joiner.dht.peer_count() > 1);

    assert_eq!(joiner.dht.get(key).await.unwrap(), value);
}
