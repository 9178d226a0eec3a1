//! End-to-end checkpoint flow: append, threshold-sign, archive, audit.

use std::time::Duration;

use tessera_log::LogError;
use tessera_quorum::{start, QuorumConfig, SessionState};
use tessera_tests::{append_event, replicate_log, sign_head, signer_set, TestCluster};
use tessera_types::{NodeEvent, RecordId};
use tokio::sync::broadcast;

#[tokio::test]
async fn test_checkpoint_reaches_quorum_and_survives_archival() {
    let cluster = TestCluster::new(4);
    let out = signer_set(4);
    let proposer = &cluster.nodes[0];

    for i in 0..4 {
        append_event(&proposer.log, &format!("{i}"));
    }
    let head = proposer.log.checkpoint_head().unwrap();
    assert_eq!(head.tree_size, 4);

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
    handle.begin_session(head).await;

    // Each signer reproduces the proposed root from its own replica of the
    // log before contributing a share.
    let msg = head.signing_bytes();
    for share in &out.secret_shares[..3] {
        let replica = replicate_log(&proposer.log);
        assert_eq!(replica.root_at(head.tree_size).unwrap(), head.root_hash);
        handle.submit_share(head.tree_size, share.sign(&msg)).await.unwrap();
    }

    let status = handle.status(head.tree_size).await.unwrap();
    assert_eq!(status.state, SessionState::Signed);
    let checkpoint = handle.signed_checkpoint(head.tree_size).await.unwrap();
    assert!(checkpoint.verify(&out.group_key));

    match rx.recv().await.unwrap() {
        NodeEvent::CheckpointSigned(cp) => assert_eq!(cp, checkpoint),
        other => panic!("unexpected event: {other:?}"),
    }

    // The proposer persists the checkpoint and archives it in the value
    // store; another node retrieves and decodes the identical checkpoint.
    proposer.log.record_signed_checkpoint(&checkpoint).unwrap();
    let encoded = postcard::to_allocvec(&checkpoint).unwrap();
    let key = RecordId::from_data(&encoded);
    proposer.dht.put(key, encoded).await.unwrap();

    let fetched = cluster.nodes[3].dht.get(key).await.unwrap();
    let decoded: tessera_types::SignedCheckpoint = postcard::from_bytes(&fetched).unwrap();
    assert_eq!(decoded, checkpoint);

    // An auditor checks inclusion of leaf 2 against the signed checkpoint.
    let entry = proposer.log.entry(2).unwrap().unwrap();
    let (proof, cp) = proposer.log.proof_for_audit(2).unwrap();
    assert!(tessera_audit::verify(
        &entry.leaf_hash(),
        &proof,
        &cp,
        &out.group_key
    ));

    handle.shutdown();
}

#[tokio::test]
async fn test_replica_rebuilt_from_entries_accepts_checkpoint() {
    let cluster = TestCluster::new(1);
    let out = signer_set(4);
    let log = &cluster.nodes[0].log;

    for i in 0..5 {
        append_event(log, &format!("{i}"));
    }
    let checkpoint = sign_head(&out, log.checkpoint_head().unwrap());
    assert!(checkpoint.verify(&out.group_key));

    // Entries carry their timestamps, so a rebuilt replica converges on
    // the same root and accepts the checkpoint.
    let replica = replicate_log(log);
    replica.record_signed_checkpoint(&checkpoint).unwrap();
    assert_eq!(
        replica.signed_checkpoint(5).unwrap().unwrap(),
        checkpoint
    );
}

#[tokio::test]
async fn test_diverged_replica_refuses_checkpoint() {
    let cluster = TestCluster::new(1);
    let out = signer_set(4);
    let log = &cluster.nodes[0].log;

    for i in 0..4 {
        append_event(log, &format!("{i}"));
    }
    let checkpoint = sign_head(&out, log.checkpoint_head().unwrap());

    // A replica whose fourth entry differs cannot reproduce the signed
    // root at the same tree size.
    let diverged = TestCluster::new(1);
    let diverged_log = &diverged.nodes[0].log;
    for i in 0..3 {
        append_event(diverged_log, &format!("{i}"));
    }
    append_event(diverged_log, "tampered");

    match diverged_log.record_signed_checkpoint(&checkpoint) {
        Err(LogError::RootMismatch { tree_size }) => assert_eq!(tree_size, 4),
        other => panic!("expected RootMismatch, got {other:?}"),
    }
}
