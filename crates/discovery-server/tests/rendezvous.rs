//! Rendezvous Tests for the Transport Registry
//!
//! These tests verify the registry contract end to end:
//! - Agreement: both edges converge on one transport id, in either order
//! - Idempotence and liveness under deadlines
//! - Status authorization and aggregation
//! - Deregistration without resurrection
//! - Ephemeral and durable backends behave alike where they overlap

use std::sync::Arc;
use std::time::Duration;

use discovery_core::{EdgePair, Identity, KeyPair, Scope, ScopeError};
use discovery_server::{
    DurableRegistry, MemoryLedger, MemoryRegistry, StorageError, TransportRegistry,
};

// =============================================================================
// Test Helpers
// =============================================================================

fn durable() -> Arc<DurableRegistry<MemoryLedger>> {
    Arc::new(DurableRegistry::new(MemoryLedger::new()).with_poll_interval(Duration::from_millis(25)))
}

fn backends() -> Vec<Arc<dyn TransportRegistry>> {
    let ephemeral: Arc<dyn TransportRegistry> = Arc::new(MemoryRegistry::new());
    let durable: Arc<dyn TransportRegistry> = durable();
    vec![ephemeral, durable]
}

fn identities() -> (Identity, Identity) {
    (KeyPair::generate().identity(), KeyPair::generate().identity())
}

fn pair(a: Identity, b: Identity) -> EdgePair {
    EdgePair::new(a, b).expect("distinct identities")
}

fn deadline(ms: u64) -> Scope {
    Scope::with_timeout(Duration::from_millis(ms))
}

/// Register {A,B} from both sides concurrently and return both results
async fn converge(
    registry: Arc<dyn TransportRegistry>,
    a: Identity,
    b: Identity,
) -> (discovery_core::Transport, discovery_core::Transport) {
    let from_a = {
        let registry = registry.clone();
        tokio::spawn(async move { registry.register(&deadline(5_000), pair(a, b), &a).await })
    };
    let from_b = {
        let registry = registry.clone();
        tokio::spawn(async move { registry.register(&deadline(5_000), pair(b, a), &b).await })
    };
    (
        from_a.await.unwrap().expect("A converges"),
        from_b.await.unwrap().expect("B converges"),
    )
}

// =============================================================================
// Agreement
// =============================================================================

#[tokio::test]
async fn test_both_orders_converge_to_same_id() {
    for registry in backends() {
        let (a, b) = identities();
        let (ta, tb) = converge(registry.clone(), a, b).await;

        assert_eq!(ta.id, tb.id, "backend {}", registry.backend_name());
        assert_eq!(ta.edges, tb.edges);
    }
}

#[tokio::test]
async fn test_late_peer_unblocks_waiting_edge() {
    let registry = durable();
    let (a, b) = identities();

    let waiting = {
        let registry = registry.clone();
        tokio::spawn(async move { registry.register(&deadline(5_000), pair(a, b), &a).await })
    };

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!waiting.is_finished(), "A must not succeed before B registers");

    let tb = registry.register(&deadline(5_000), pair(b, a), &b).await.unwrap();
    let ta = tokio::time::timeout(Duration::from_secs(1), waiting)
        .await
        .expect("A wakes promptly after B's ACK")
        .unwrap()
        .unwrap();

    assert_eq!(ta.id, tb.id);
}

#[tokio::test]
async fn test_many_concurrent_callers_agree() {
    let registry = durable();
    let (a, b) = identities();

    let calls: Vec<_> = (0..16)
        .map(|i| {
            let registry = registry.clone();
            let (me, edges) = if i % 2 == 0 { (a, pair(a, b)) } else { (b, pair(b, a)) };
            tokio::spawn(async move { registry.register(&deadline(5_000), edges, &me).await })
        })
        .collect();

    let mut ids = Vec::new();
    for call in calls {
        ids.push(call.await.unwrap().unwrap().id);
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);
}

// =============================================================================
// Idempotence and liveness
// =============================================================================

#[tokio::test]
async fn test_register_after_convergence_is_idempotent() {
    for registry in backends() {
        let (a, b) = identities();
        let (first, _) = converge(registry.clone(), a, b).await;

        let again = tokio::time::timeout(
            Duration::from_millis(500),
            registry.register(&deadline(5_000), pair(a, b), &a),
        )
        .await
        .expect("no wait once converged")
        .unwrap();

        assert_eq!(again.id, first.id);
        assert_eq!(registry.list_by_edge(&Scope::background(), &a).await.unwrap().len(), 1);
    }
}

#[tokio::test]
async fn test_lonely_caller_sees_its_deadline() {
    let registry = durable();
    let (a, b) = identities();

    let result = registry.register(&deadline(100), pair(a, b), &a).await;
    assert!(matches!(
        result,
        Err(StorageError::Scope(ScopeError::DeadlineExceeded))
    ));

    // The row and the single ACK remain
    let record = registry.store().find_pair(&pair(a, b)).unwrap();
    assert_eq!(record.acks, 1);
}

#[tokio::test]
async fn test_peer_after_timeout_converges_immediately() {
    let registry = durable();
    let (a, b) = identities();

    assert!(registry.register(&deadline(100), pair(a, b), &a).await.is_err());
    let pending_id = registry.store().find_pair(&pair(a, b)).unwrap().transport.id;

    let tb = tokio::time::timeout(
        Duration::from_millis(500),
        registry.register(&deadline(5_000), pair(b, a), &b),
    )
    .await
    .expect("second ACK satisfies the open row")
    .unwrap();
    assert_eq!(tb.id, pending_id);

    // A retrying now receives the same id
    let ta = registry.register(&deadline(5_000), pair(a, b), &a).await.unwrap();
    assert_eq!(ta.id, pending_id);
}

#[tokio::test]
async fn test_outsider_cannot_ack() {
    for registry in backends() {
        let (a, b) = identities();
        let mallory = KeyPair::generate().identity();

        let result = registry.register(&deadline(200), pair(a, b), &mallory).await;
        assert!(matches!(result, Err(StorageError::Unauthorized(_))));
    }
}

// =============================================================================
// Status
// =============================================================================

#[tokio::test]
async fn test_status_is_and_of_both_edges() {
    for registry in backends() {
        let (a, b) = identities();
        let (t, _) = converge(registry.clone(), a, b).await;
        let scope = Scope::background();

        let fresh = registry.get(&scope, t.id).await.unwrap();
        assert!(fresh.is_up);
        assert_eq!(fresh.statuses, [true, true]);

        let down = registry.set_status(&scope, t.id, &a, false).await.unwrap();
        assert!(!down.is_up);

        let still_down = registry.set_status(&scope, t.id, &b, true).await.unwrap();
        assert!(!still_down.is_up);

        let up = registry.set_status(&scope, t.id, &a, true).await.unwrap();
        assert!(up.is_up);
    }
}

#[tokio::test]
async fn test_non_edge_status_rejected() {
    for registry in backends() {
        let (a, b) = identities();
        let (t, _) = converge(registry.clone(), a, b).await;
        let mallory = KeyPair::generate().identity();

        let result = registry
            .set_status(&Scope::background(), t.id, &mallory, false)
            .await;
        assert!(matches!(result, Err(StorageError::Unauthorized(_))));
        assert!(registry.get(&Scope::background(), t.id).await.unwrap().is_up);
    }
}

// =============================================================================
// Deregistration
// =============================================================================

#[tokio::test]
async fn test_deregister_then_register_gives_new_id() {
    for registry in backends() {
        let (a, b) = identities();
        let (old, _) = converge(registry.clone(), a, b).await;
        let scope = Scope::background();

        let removed = registry.deregister(&scope, old.id, &b).await.unwrap();
        assert_eq!(removed.id, old.id);
        assert!(matches!(
            registry.get(&scope, old.id).await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            registry.deregister(&scope, old.id, &b).await,
            Err(StorageError::NotFound(_))
        ));

        let (fresh, _) = converge(registry.clone(), a, b).await;
        assert_ne!(fresh.id, old.id);
    }
}

#[tokio::test]
async fn test_list_by_edge_only_converged() {
    let registry = durable();
    let (a, b) = identities();
    let c = KeyPair::generate().identity();

    converge(registry.clone(), a, b).await;
    let _ = registry.register(&deadline(60), pair(a, c), &a).await;

    let listed = registry.list_by_edge(&Scope::background(), &a).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].entry.edges.contains(&b));
    assert!(registry
        .list_by_edge(&Scope::background(), &c)
        .await
        .unwrap()
        .is_empty());
}
