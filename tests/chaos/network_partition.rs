//! Checkpoint signing under a network partition: sessions expire while
//! signers are cut off, and the next attempt succeeds once the partition
//! heals.

use std::time::Duration;

use tessera_quorum::{start, QuorumConfig, QuorumError, SessionState};
use tessera_tests::{append_event, replicate_log, signer_set, TestCluster};
use tessera_types::{NodeEvent, RecordId};
use tokio::sync::broadcast;

#[tokio::test(start_paused = true)]
async fn test_partition_expires_session_and_heal_recovers() {
    let cluster = TestCluster::new(4);
    let out = signer_set(4);
    let proposer = &cluster.nodes[0];

    let (events, mut rx) = broadcast::channel(16);
    let handle = start(
        QuorumConfig {
            group_key: out.group_key.clone(),
            signers: out.public_shares.clone(),
            session_ttl: Duration::from_secs(5),
            sweep_interval: Duration::from_millis(100),
        },
        events,
    );

    for i in 0..3 {
        append_event(&proposer.log, &format!("{i}"));
    }
    let head = proposer.log.checkpoint_head().unwrap();
    handle.begin_session(head).await;

    // Partition: nodes 2 and 3 are unreachable, so only the proposer's
    // own share ever arrives.
    cluster.set_down(cluster.nodes[2].id(), true);
    cluster.set_down(cluster.nodes[3].id(), true);
    let msg = head.signing_bytes();
    handle
        .submit_share(head.tree_size, out.secret_shares[0].sign(&msg))
        .await
        .unwrap();

    // Replication to the minority side also fails while partitioned.
    let value = b"partitioned archive".to_vec();
    assert!(proposer
        .dht
        .put(RecordId::from_data(&value), value)
        .await
        .is_err());

    tokio::time::sleep(Duration::from_secs(7)).await;
    assert_eq!(
        handle.status(head.tree_size).await.unwrap().state,
        SessionState::Expired
    );
    assert!(matches!(
        rx.recv().await.unwrap(),
        NodeEvent::CheckpointExpired { tree_size } if tree_size == head.tree_size
    ));

    // A share that was stuck on the far side of the partition is refused.
    assert!(matches!(
        handle
            .submit_share(head.tree_size, out.secret_shares[1].sign(&msg))
            .await,
        Err(QuorumError::SessionExpired(_))
    ));

    // Heal. The log kept appending; a fresh session over the larger tree
    // reaches quorum.
    cluster.set_down(cluster.nodes[2].id(), false);
    cluster.set_down(cluster.nodes[3].id(), false);
    append_event(&proposer.log, "post-partition");
    let head2 = proposer.log.checkpoint_head().unwrap();
    assert!(head2.tree_size > head.tree_size);
    handle.begin_session(head2).await;

    let msg2 = head2.signing_bytes();
    for share in &out.secret_shares[..3] {
        let replica = replicate_log(&proposer.log);
        assert_eq!(replica.root_at(head2.tree_size).unwrap(), head2.root_hash);
        handle
            .submit_share(head2.tree_size, share.sign(&msg2))
            .await
            .unwrap();
    }

    let checkpoint = handle.signed_checkpoint(head2.tree_size).await.unwrap();
    assert!(checkpoint.verify(&out.group_key));
    proposer.log.record_signed_checkpoint(&checkpoint).unwrap();

    // The expired session never produced a checkpoint.
    assert!(handle.signed_checkpoint(head.tree_size).await.is_none());

    loop {
        match rx.recv().await.unwrap() {
            NodeEvent::CheckpointSigned(cp) => {
                assert_eq!(cp, checkpoint);
                break;
            }
            NodeEvent::CheckpointExpired { .. } => continue,
            other => panic!("unexpected event: {other:?}"),
        }
    }

    handle.shutdown();
}
