//! # Remote Propagation Scenarios
//!
//! Registration lifetime and failure handling for cluster-wide listeners:
//!
//! 1. **Retain**: `retain == false` stops a listener on the node where it was
//!    returned
//! 2. **Stop**: `stop_listen` removes every mirror
//! 3. **Fail-closed**: slow or isolated owners break the start, never allow it
//! 4. **Membership**: `Targets::All` is resolved at registration time

#[cfg(test)]
mod tests {
    use std::time::Duration;
    use tokio::time::timeout;

    use node_runtime::ClusterNode;
    use shared_bus::{BusError, EventType, ListenerError, TransportError, TxEvent, Verdict};
    use shared_types::{NodeId, Targets};
    use tx_coordinator::TxError;

    use crate::integration::fixtures::{
        calls, cluster, config, require_label, Counting, REMOTE_TIMEOUT_MS, STEP,
    };

    fn veto_once(_: &TxEvent) -> Result<Verdict, ListenerError> {
        Ok(Verdict::veto("first one only").and_stop())
    }

    // =============================================================================
    // RETAIN
    // =============================================================================

    #[tokio::test]
    async fn test_retain_false_stops_remote_listener() {
        let (_cluster, nodes) = cluster(2);
        let (listener, counter) = Counting::new(veto_once);
        nodes[0]
            .events()
            .remote_listen(Targets::nodes([NodeId::new(1)]), listener, &[EventType::TxStarted])
            .await
            .unwrap();
        assert_eq!(nodes[1].bus().mirror_count(), 1);

        let tx = nodes[1].transactions().start().await.unwrap();
        assert!(tx.commit().await.unwrap_err().is_rollback());

        let tx = nodes[1].transactions().start().await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(calls(&counter), 1);
        assert_eq!(nodes[1].bus().mirror_count(), 0);
    }

    #[tokio::test]
    async fn test_retain_false_is_per_node() {
        let (_cluster, nodes) = cluster(3);
        let (listener, counter) = Counting::new(veto_once);
        let id = nodes[0]
            .events()
            .remote_listen(
                Targets::nodes([NodeId::new(1), NodeId::new(2)]),
                listener,
                &[EventType::TxStarted],
            )
            .await
            .unwrap();

        // Retired on node-1 only.
        let tx = nodes[1].transactions().start().await.unwrap();
        assert!(tx.commit().await.unwrap_err().is_rollback());
        let tx = nodes[1].transactions().start().await.unwrap();
        tx.commit().await.unwrap();
        assert!(nodes[0].bus().has_listener(id));

        // Still active on node-2 until it says stop there too.
        let tx = nodes[2].transactions().start().await.unwrap();
        assert!(tx.commit().await.unwrap_err().is_rollback());
        assert_eq!(calls(&counter), 2);
        assert!(!nodes[0].bus().has_listener(id));
    }

    #[tokio::test]
    async fn test_retain_false_on_local_leg() {
        let (_cluster, nodes) = cluster(2);
        let (listener, counter) = Counting::new(veto_once);
        nodes[0]
            .events()
            .remote_listen(Targets::All, listener, &[EventType::TxStarted])
            .await
            .unwrap();

        for _ in 0..2 {
            let tx = nodes[0].transactions().start().await.unwrap();
            let _ = tx.commit().await;
        }
        assert_eq!(calls(&counter), 1);

        // node-1 still has its own active mirror.
        let tx = nodes[1].transactions().start().await.unwrap();
        assert!(tx.commit().await.unwrap_err().is_rollback());
        assert_eq!(calls(&counter), 2);
    }

    // =============================================================================
    // STOP
    // =============================================================================

    #[tokio::test]
    async fn test_stop_listen_removes_every_mirror() {
        let (_cluster, nodes) = cluster(3);
        let (listener, counter) = Counting::new(require_label);
        let id = nodes[0]
            .events()
            .remote_listen(Targets::All, listener, &[EventType::TxStarted])
            .await
            .unwrap();
        assert_eq!(nodes[1].bus().mirror_count(), 1);
        assert_eq!(nodes[2].bus().mirror_count(), 1);

        assert!(nodes[0].events().stop_listen(id).await);
        assert!(!nodes[0].events().stop_listen(id).await);

        assert_eq!(nodes[1].bus().mirror_count(), 0);
        assert_eq!(nodes[2].bus().mirror_count(), 0);
        for node in &nodes {
            let tx = node.transactions().start().await.unwrap();
            tx.commit().await.unwrap();
        }
        assert_eq!(calls(&counter), 0);
    }

    #[tokio::test]
    async fn test_stale_mirror_answers_unknown_listener() {
        let (cluster, nodes) = cluster(2);
        let (listener, counter) = Counting::new(require_label);
        let id = nodes[0]
            .events()
            .remote_listen(Targets::nodes([NodeId::new(1)]), listener, &[EventType::TxStarted])
            .await
            .unwrap();

        // Unsubscribe cannot reach node-1, so its mirror outlives the listener.
        cluster.isolate(NodeId::new(1));
        assert!(nodes[0].events().stop_listen(id).await);
        cluster.heal(NodeId::new(1));
        assert_eq!(nodes[1].bus().mirror_count(), 1);

        let tx = nodes[1].transactions().start().await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(nodes[1].bus().mirror_count(), 0);
        assert_eq!(calls(&counter), 0);
    }

    // =============================================================================
    // FAIL-CLOSED
    // =============================================================================

    #[tokio::test]
    async fn test_slow_owner_fails_start() {
        let (cluster, nodes) = cluster(2);
        nodes[0]
            .events()
            .remote_listen(Targets::All, require_label, &[EventType::TxStarted])
            .await
            .unwrap();
        cluster.set_latency(NodeId::new(0), Duration::from_millis(REMOTE_TIMEOUT_MS * 5));

        let err = timeout(STEP, nodes[1].transactions().with_label("ok").start())
            .await
            .unwrap()
            .unwrap_err();

        match err {
            TxError::DispatchFailure {
                source:
                    BusError::Remote {
                        source: TransportError::Timeout { node, .. },
                        ..
                    },
                ..
            } => assert_eq!(node, NodeId::new(0)),
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(nodes[1].manager().active_count(), 0);
        assert_eq!(nodes[1].manager().stats().dispatch_failures, 1);
    }

    #[tokio::test]
    async fn test_abandoned_start_leaves_nothing_active() {
        let (cluster, nodes) = cluster(2);
        nodes[0]
            .events()
            .remote_listen(Targets::All, require_label, &[EventType::TxStarted])
            .await
            .unwrap();
        cluster.set_latency(NodeId::new(0), Duration::from_millis(REMOTE_TIMEOUT_MS * 5));

        let caller_bound = Duration::from_millis(REMOTE_TIMEOUT_MS / 4);
        for _ in 0..3 {
            let attempt = timeout(caller_bound, nodes[1].transactions().with_label("ok").start()).await;
            assert!(attempt.is_err());
        }

        let stats = nodes[1].manager().stats();
        assert_eq!(nodes[1].manager().active_count(), 0);
        assert_eq!(stats.started, 3);
        assert_eq!(stats.rolled_back, 3);
        assert_eq!(stats.dispatch_failures, 0);
    }

    #[tokio::test]
    async fn test_isolated_owner_fails_start() {
        let (cluster, nodes) = cluster(2);
        nodes[0]
            .events()
            .remote_listen(Targets::All, require_label, &[EventType::TxStarted])
            .await
            .unwrap();
        cluster.isolate(NodeId::new(0));

        let err = nodes[1].transactions().with_label("ok").start().await.unwrap_err();
        assert!(matches!(err, TxError::DispatchFailure { .. }));
        assert!(!err.is_rollback());

        cluster.heal(NodeId::new(0));
        let tx = nodes[1].transactions().with_label("ok").start().await.unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_remote_listener_error_fails_start() {
        let (_cluster, nodes) = cluster(2);
        nodes[0]
            .events()
            .remote_listen(
                Targets::nodes([NodeId::new(1)]),
                |_: &TxEvent| -> Result<Verdict, ListenerError> {
                    Err(ListenerError::new("predicate crashed"))
                },
                &[EventType::TxStarted],
            )
            .await
            .unwrap();

        let err = nodes[1].transactions().start().await.unwrap_err();
        match err {
            TxError::DispatchFailure {
                source: BusError::ListenerFailed { node, reason, .. },
                ..
            } => {
                assert_eq!(node, NodeId::new(0));
                assert_eq!(reason, "predicate crashed");
            }
            other => panic!("expected listener failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_registration_to_unreachable_target_fails() {
        let (cluster, nodes) = cluster(3);
        cluster.isolate(NodeId::new(2));

        let err = nodes[0]
            .events()
            .remote_listen(Targets::All, require_label, &[EventType::TxStarted])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BusError::RegistrationFailed { node, .. } if node == NodeId::new(2)
        ));

        // node-1 acknowledged before node-2 failed; its mirror was withdrawn.
        assert_eq!(nodes[1].bus().mirror_count(), 0);
        assert_eq!(nodes[0].bus().listener_count(EventType::TxStarted), 0);
    }

    // =============================================================================
    // MEMBERSHIP
    // =============================================================================

    #[tokio::test]
    async fn test_all_targets_resolved_at_registration() {
        let (cluster, nodes) = cluster(2);
        nodes[0]
            .events()
            .remote_listen(Targets::All, require_label, &[EventType::TxStarted])
            .await
            .unwrap();

        let late = ClusterNode::join(config().with_node_id(NodeId::new(5)), &cluster).unwrap();
        late.events().enable_local(&[EventType::TxStarted]);

        let tx = late.transactions().start().await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(late.bus().mirror_count(), 0);
    }

    #[tokio::test]
    async fn test_no_targets_rejected() {
        let (_cluster, nodes) = cluster(1);
        let err = nodes[0]
            .events()
            .remote_listen(Targets::nodes([]), require_label, &[EventType::TxStarted])
            .await
            .unwrap_err();
        assert_eq!(err, BusError::NoTargets);
    }
}
