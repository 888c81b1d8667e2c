//! # Label Guarantee Scenarios
//!
//! A start-event listener that vetoes unlabeled transactions must make their
//! commit fail on every node it observes, while labeled transactions commit.
//!
//! ```text
//! node-0 (listener owner)            node-1
//!   start(None) ──TxStarted──→ veto     start(None) ──Deliver──→ node-0 predicate
//!   commit() → TransactionRollback      ←──Verdict(veto)──
//!                                       commit() → TransactionRollback
//! ```

#[cfg(test)]
mod tests {
    use tokio::time::timeout;

    use shared_bus::{EventType, ListenerError, TxEvent, Verdict};
    use shared_types::Targets;
    use tx_coordinator::{TxError, TxState, VetoSource};

    use crate::integration::fixtures::{calls, cluster, require_label, Counting, STEP};

    // =============================================================================
    // LABELS
    // =============================================================================

    #[tokio::test]
    async fn test_label_survives_lifecycle() {
        let (_cluster, nodes) = cluster(1);
        let node = &nodes[0];

        for label in ["lbl0", "lbl1"] {
            let tx = node.transactions().with_label(label).start().await.unwrap();
            assert_eq!(tx.label(), Some(label));

            tx.put(b"0".to_vec(), b"0".to_vec()).unwrap();
            assert_eq!(tx.label(), Some(label));

            tx.commit().await.unwrap();
            assert_eq!(tx.label(), Some(label));
        }
        assert_eq!(node.manager().stats().committed, 2);
    }

    #[tokio::test]
    async fn test_unlabeled_start_has_no_label() {
        let (_cluster, nodes) = cluster(1);
        let tx = nodes[0].transactions().start().await.unwrap();
        assert_eq!(tx.label(), None);
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_label_rejected_without_side_effects() {
        let (_cluster, nodes) = cluster(1);
        let node = &nodes[0];
        node.events().enable_local(&EventType::ALL_TX);
        let (listener, counter) = Counting::new(|_: &TxEvent| -> Result<Verdict, ListenerError> {
            Ok(Verdict::allow())
        });
        node.events().local_listen(listener, &EventType::ALL_TX);

        let err = node.transactions().with_label("").start().await.unwrap_err();

        assert!(matches!(err, TxError::InvalidLabel { .. }));
        assert!(err.to_string().contains("label should not be empty."));
        assert_eq!(calls(&counter), 0);
        assert_eq!(node.manager().active_count(), 0);
        assert_eq!(node.manager().stats().started, 0);
    }

    // =============================================================================
    // LOCAL GUARANTEE
    // =============================================================================

    #[tokio::test]
    async fn test_local_guarantee() {
        let (_cluster, nodes) = cluster(1);
        let node = &nodes[0];
        node.events().enable_local(&EventType::ALL_TX);
        node.events()
            .local_listen(require_label, &[EventType::TxStarted]);

        let tx = node.transactions().with_label("test").start().await.unwrap();
        tx.commit().await.unwrap();

        let tx = node.transactions().start().await.unwrap();
        let err = tx.commit().await.unwrap_err();
        assert!(err.is_rollback(), "expected rollback, got {err:?}");
        assert_eq!(tx.state(), TxState::RolledBack);
        assert_eq!(node.storage().commit_count(), 1);
    }

    #[tokio::test]
    async fn test_local_listener_without_enable_sees_nothing() {
        let (_cluster, nodes) = cluster(1);
        let node = &nodes[0];
        let (listener, counter) = Counting::new(require_label);
        node.events().local_listen(listener, &[EventType::TxStarted]);

        let tx = node.transactions().start().await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(calls(&counter), 0);

        node.events().enable_local(&[EventType::TxStarted]);
        let tx = node.transactions().start().await.unwrap();
        assert!(tx.commit().await.unwrap_err().is_rollback());
        assert_eq!(calls(&counter), 1);

        node.events().disable_local(&[EventType::TxStarted]);
        let tx = node.transactions().start().await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(calls(&counter), 1);
    }

    // =============================================================================
    // REMOTE GUARANTEE
    // =============================================================================

    #[tokio::test]
    async fn test_remote_guarantee_on_both_nodes() {
        let (_cluster, nodes) = cluster(2);
        let (owner, remote) = (&nodes[0], &nodes[1]);
        owner.events().enable_local(&EventType::ALL_TX);

        timeout(
            STEP,
            owner
                .events()
                .remote_listen(Targets::All, require_label, &[EventType::TxStarted]),
        )
        .await
        .unwrap()
        .unwrap();

        for node in [owner, remote] {
            let tx = node.transactions().with_label("test").start().await.unwrap();
            tx.commit().await.unwrap();
        }

        for node in [owner, remote] {
            let tx = timeout(STEP, node.transactions().start())
                .await
                .unwrap()
                .unwrap();
            let err = tx.commit().await.unwrap_err();
            assert!(err.is_rollback(), "node {}: {err:?}", node.node_id());
        }
    }

    #[tokio::test]
    async fn test_remote_veto_names_owner_node() {
        let (_cluster, nodes) = cluster(2);
        nodes[0]
            .events()
            .remote_listen(Targets::All, require_label, &[EventType::TxStarted])
            .await
            .unwrap();

        let tx = nodes[1].transactions().start().await.unwrap();
        let reason = tx.veto_reason().unwrap();
        assert_eq!(reason.reason, "label required");
        assert!(matches!(
            reason.source,
            VetoSource::Listener { node, .. } if node == nodes[0].node_id()
        ));
    }

    #[tokio::test]
    async fn test_remote_listener_sees_origin_and_label() {
        let (_cluster, nodes) = cluster(3);
        let seen = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        nodes[0]
            .events()
            .remote_listen(
                Targets::All,
                move |e: &TxEvent| -> Result<Verdict, ListenerError> {
                    sink.lock().push((e.origin, e.label().map(String::from)));
                    Ok(Verdict::allow())
                },
                &[EventType::TxStarted],
            )
            .await
            .unwrap();

        for node in &nodes {
            let label = format!("from-{}", node.node_id());
            let tx = node.transactions().with_label(label).start().await.unwrap();
            tx.commit().await.unwrap();
        }

        let seen = seen.lock().clone();
        assert_eq!(seen.len(), 3);
        for (node, (origin, label)) in nodes.iter().zip(seen) {
            assert_eq!(origin, node.node_id());
            assert_eq!(label, Some(format!("from-{}", node.node_id())));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_starts_across_nodes() {
        let (_cluster, nodes) = cluster(3);
        nodes[0]
            .events()
            .remote_listen(Targets::All, require_label, &[EventType::TxStarted])
            .await
            .unwrap();

        let mut tasks = Vec::new();
        for i in 0..30usize {
            let node = nodes[i % nodes.len()].clone();
            tasks.push(tokio::spawn(async move {
                let start = if i % 2 == 0 {
                    node.transactions().with_label(format!("tx-{i}")).start().await
                } else {
                    node.transactions().start().await
                };
                let tx = start.unwrap();
                (i, tx.commit().await)
            }));
        }

        for task in tasks {
            let (i, result) = timeout(STEP, task).await.unwrap().unwrap();
            if i % 2 == 0 {
                assert!(result.is_ok(), "labeled tx {i} failed: {result:?}");
            } else {
                assert!(result.unwrap_err().is_rollback(), "unlabeled tx {i} committed");
            }
        }

        let committed: u64 = nodes.iter().map(|n| n.manager().stats().committed).sum();
        assert_eq!(committed, 15);
    }
}
