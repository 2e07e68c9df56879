//! Registry bookkeeping and endpoint exclusivity.

use std::collections::HashSet;
use std::time::Duration;

use feedback_broker::models::session::SessionState;
use feedback_broker::orchestrator::allocator::ChannelAllocator;
use feedback_broker::orchestrator::registry::SessionRegistry;
use feedback_broker::AppError;

#[test]
fn reserve_inserts_launching_entry() {
    let registry = SessionRegistry::new();
    let allocator = ChannelAllocator::new(43_000..=43_099, 32);

    let (id, endpoint) = registry.reserve(&allocator).expect("reserve");
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.state(&id), Some(SessionState::Launching));
    assert_eq!(registry.endpoint(&id), Some(endpoint));
    assert!(endpoint.ip().is_loopback());
}

#[test]
fn concurrent_reservations_never_share_a_port() {
    let registry = SessionRegistry::new();
    let allocator = ChannelAllocator::new(43_100..=43_399, 64);

    let handles: Vec<_> = (0..40)
        .map(|_| {
            let registry = registry.clone();
            let allocator = allocator.clone();
            std::thread::spawn(move || registry.reserve(&allocator))
        })
        .collect();

    let mut ports = HashSet::new();
    for handle in handles {
        let (_, endpoint) = handle.join().expect("thread").expect("reserve");
        assert!(ports.insert(endpoint.port()), "port {} handed out twice", endpoint.port());
    }
    assert_eq!(registry.len(), 40);
    assert_eq!(registry.endpoints().len(), 40);
}

#[test]
fn removed_port_becomes_available_again() {
    let registry = SessionRegistry::new();
    let port = {
        let spare = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        spare.local_addr().expect("addr").port()
    };
    let allocator = ChannelAllocator::new(port..=port, 4);

    let (first, _) = registry.reserve(&allocator).expect("first reserve");
    let err = registry.reserve(&allocator).expect_err("port held");
    assert!(matches!(err, AppError::ResourceExhausted(_)));

    assert!(registry.remove(&first).is_some());
    let (_, endpoint) = registry.reserve(&allocator).expect("reserve after release");
    assert_eq!(endpoint.port(), port);
}

#[test]
fn externally_bound_port_is_skipped() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();

    let registry = SessionRegistry::new();
    let err = registry
        .reserve(&ChannelAllocator::new(port..=port, 3))
        .expect_err("port is taken");
    assert!(matches!(err, AppError::ResourceExhausted(_)));
    assert!(registry.is_empty());
}

#[test]
fn state_transitions_follow_lifecycle() {
    let registry = SessionRegistry::new();
    let (id, _) = registry
        .reserve(&ChannelAllocator::new(43_400..=43_499, 32))
        .expect("reserve");

    assert!(!registry.set_state(&id, SessionState::Completed));
    assert!(registry.set_state(&id, SessionState::AwaitingResponse));
    assert!(registry.set_state(&id, SessionState::Completed));
    assert!(!registry.set_state(&id, SessionState::Failed));
    assert_eq!(registry.state(&id), Some(SessionState::Completed));
}

#[test]
fn remove_is_idempotent() {
    let registry = SessionRegistry::new();
    let (id, _) = registry
        .reserve(&ChannelAllocator::new(43_500..=43_599, 32))
        .expect("reserve");
    assert!(registry.remove(&id).is_some());
    assert!(registry.remove(&id).is_none());
    assert!(!registry.set_state(&id, SessionState::Failed));
}

#[tokio::test]
async fn shutdown_closes_registry() {
    let registry = SessionRegistry::new();
    let allocator = ChannelAllocator::new(43_600..=43_699, 32);
    registry.reserve(&allocator).expect("reserve");

    // Entries without a launched process are dropped but not counted.
    let terminated = registry.shutdown_all(Duration::from_millis(100)).await;
    assert_eq!(terminated, 0);
    assert!(registry.is_empty());

    let err = registry.reserve(&allocator).expect_err("closed registry");
    assert!(matches!(err, AppError::Cancelled(_)));
}
