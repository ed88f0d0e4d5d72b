//! Integration tests for the session pool: hand-off discipline, cap
//! enforcement, error-threshold retirement, degradation, and the health sweep.

mod common;

use common::StubProvisioner;
use director_core::events::EventPublisher;
use director_core::models::session::PoolKey;
use director_core::pool::session_pool::{PoolError, SessionOutcome, SessionPool};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn pool_with(provisioner: Arc<StubProvisioner>, tweak: impl FnOnce(&mut director_core::config::PoolConfig)) -> Arc<SessionPool> {
    let mut config = common::quick_config().pool;
    tweak(&mut config);
    Arc::new(SessionPool::new(provisioner, config, EventPublisher::default()))
}

async fn eventually<F>(mut check: F, what: &str)
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition never became true: {what}");
}

#[tokio::test]
async fn acquire_creates_below_cap_and_reuses_after_release() {
    director_core::logging::init_structured_logging();
    let provisioner = StubProvisioner::new();
    let pool = pool_with(provisioner.clone(), |c| c.max_size = 2);
    let key = PoolKey::from("general");

    let first = pool.acquire(&key, Duration::from_millis(200)).await.unwrap();
    let first_provider = first.provider_session_id().to_string();
    pool.release(first, SessionOutcome::Success).await;

    let second = pool.acquire(&key, Duration::from_millis(200)).await.unwrap();
    assert_eq!(second.provider_session_id(), first_provider);
    assert_eq!(provisioner.created_count(), 1);
    pool.release(second, SessionOutcome::Success).await;
}

#[tokio::test]
async fn acquire_at_cap_times_out_unless_released() {
    let provisioner = StubProvisioner::new();
    let pool = pool_with(provisioner, |c| c.max_size = 1);
    let key = PoolKey::from("general");

    let held = pool.acquire(&key, Duration::from_millis(200)).await.unwrap();

    // all sessions Active: a bounded wait ends in AcquireTimeout
    let err = pool.acquire(&key, Duration::from_millis(100)).await.unwrap_err();
    assert!(matches!(err, PoolError::AcquireTimeout { .. }), "got {err}");

    // a zero timeout reports NoSessionAvailable instead of waiting
    let err = pool.acquire(&key, Duration::ZERO).await.unwrap_err();
    assert!(matches!(err, PoolError::NoSessionAvailable { .. }), "got {err}");

    // a waiter still inside its budget is unblocked by a release
    let waiter = {
        let pool = Arc::clone(&pool);
        let key = key.clone();
        tokio::spawn(async move { pool.acquire(&key, Duration::from_secs(2)).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    pool.release(held, SessionOutcome::Success).await;

    let acquired = waiter.await.unwrap().unwrap();
    pool.release(acquired, SessionOutcome::Success).await;
}

#[tokio::test]
async fn error_threshold_retires_the_session() {
    let provisioner = StubProvisioner::new();
    let pool = pool_with(provisioner.clone(), |c| {
        c.max_size = 1;
        c.error_threshold = 2;
    });
    let key = PoolKey::from("submission");

    let session = pool.acquire(&key, Duration::from_millis(200)).await.unwrap();
    let first_provider = session.provider_session_id().to_string();
    let session_id = session.id();
    pool.release(session, SessionOutcome::Failure).await;

    let info = pool.session_info(session_id).await.unwrap();
    assert_eq!(info.error_count, 1);

    let session = pool.acquire(&key, Duration::from_millis(200)).await.unwrap();
    assert_eq!(session.provider_session_id(), first_provider);
    pool.release(session, SessionOutcome::Failure).await;

    // second failure crossed the threshold; a replacement is created and the
    // unhealthy session is never handed out again
    let provisioner_for_check = provisioner.clone();
    eventually(
        move || provisioner_for_check.closed_ids().contains(&first_provider),
        "unhealthy session closed",
    )
    .await;

    let session = pool.acquire(&key, Duration::from_millis(500)).await.unwrap();
    assert_ne!(session.provider_session_id(), provisioner.closed_ids()[0]);
    pool.release(session, SessionOutcome::Success).await;
}

#[tokio::test]
async fn abandoned_sessions_are_replaced() {
    let provisioner = StubProvisioner::new();
    let pool = pool_with(provisioner.clone(), |c| c.max_size = 1);
    let key = PoolKey::from("general");

    let session = pool.acquire(&key, Duration::from_millis(200)).await.unwrap();
    let abandoned_provider = session.provider_session_id().to_string();
    pool.release(session, SessionOutcome::Abandoned).await;

    let provisioner_for_check = provisioner.clone();
    let closed_provider = abandoned_provider.clone();
    eventually(
        move || provisioner_for_check.closed_ids().contains(&closed_provider),
        "abandoned session closed",
    )
    .await;

    let session = pool.acquire(&key, Duration::from_millis(500)).await.unwrap();
    assert_ne!(session.provider_session_id(), abandoned_provider);
    pool.release(session, SessionOutcome::Success).await;
}

#[tokio::test]
async fn repeated_creation_failures_degrade_the_pool_key() {
    let provisioner = StubProvisioner::new();
    provisioner.set_always_fail(true);
    let pool = pool_with(provisioner.clone(), |c| {
        c.max_size = 2;
        c.degraded_threshold = 2;
        c.degraded_reset_timeout = Duration::from_millis(150);
    });
    let key = PoolKey::from("discovery");

    // enough failed creations to open the breaker
    let mut degraded = false;
    for _ in 0..3 {
        match pool.acquire(&key, Duration::from_millis(50)).await {
            Err(PoolError::Degraded { .. }) => {
                degraded = true;
                break;
            }
            Err(_) => {}
            Ok(_) => panic!("creation should fail"),
        }
    }
    assert!(degraded, "pool key never degraded");

    // degraded acquisitions fail fast
    let err = pool.acquire(&key, Duration::from_secs(5)).await.unwrap_err();
    assert!(matches!(err, PoolError::Degraded { .. }));
    let stats = pool.stats().await;
    assert!(stats.get("discovery").unwrap().degraded);

    // provider recovers; the half-open probe heals the pool key
    provisioner.set_always_fail(false);
    tokio::time::sleep(Duration::from_millis(200)).await;
    let session = pool.acquire(&key, Duration::from_millis(500)).await.unwrap();
    pool.release(session, SessionOutcome::Success).await;
    let stats = pool.stats().await;
    assert!(!stats.get("discovery").unwrap().degraded);
}

#[tokio::test]
async fn sweep_replaces_unhealthy_sessions_and_copies_context() {
    let provisioner = StubProvisioner::new();
    let pool = pool_with(provisioner.clone(), |c| {
        c.min_warm = 1;
        c.max_size = 2;
    });
    let key = PoolKey::from("profile");
    pool.initialize(std::slice::from_ref(&key)).await;

    let session = pool.acquire(&key, Duration::from_millis(200)).await.unwrap();
    let old_provider = session.provider_session_id().to_string();
    pool.store_context(session.id(), "last_search_filters", json!({"remote": true}));
    pool.release(session, SessionOutcome::Success).await;

    provisioner.mark_unhealthy(&old_provider);
    pool.sweep_once().await;

    let session = pool.acquire(&key, Duration::from_millis(500)).await.unwrap();
    assert_ne!(session.provider_session_id(), old_provider);
    assert_eq!(
        pool.get_context(session.id(), "last_search_filters"),
        Some(json!({"remote": true}))
    );
    assert!(provisioner.closed_ids().contains(&old_provider));
    pool.release(session, SessionOutcome::Success).await;
}

#[tokio::test]
async fn sweep_expires_sessions_past_ttl() {
    let provisioner = StubProvisioner::new();
    let pool = pool_with(provisioner.clone(), |c| {
        c.min_warm = 1;
        c.max_size = 2;
        c.session_ttl = Duration::from_millis(50);
    });
    let key = PoolKey::from("general");
    pool.initialize(std::slice::from_ref(&key)).await;
    assert_eq!(provisioner.created_count(), 1);

    tokio::time::sleep(Duration::from_millis(80)).await;
    pool.sweep_once().await;

    // the expired session was replaced, never handed out
    assert!(!provisioner.closed_ids().is_empty());
    let session = pool.acquire(&key, Duration::from_millis(500)).await.unwrap();
    assert_ne!(session.provider_session_id(), "prov-0");
    pool.release(session, SessionOutcome::Success).await;
}

#[tokio::test]
async fn stats_track_the_hand_off() {
    let provisioner = StubProvisioner::new();
    let pool = pool_with(provisioner, |c| c.max_size = 2);
    let key = PoolKey::from("general");

    let session = pool.acquire(&key, Duration::from_millis(200)).await.unwrap();
    let stats = pool.stats().await;
    let key_stats = stats.get("general").unwrap();
    assert_eq!((key_stats.active, key_stats.idle, key_stats.total), (1, 0, 1));

    pool.release(session, SessionOutcome::Success).await;
    let stats = pool.stats().await;
    let key_stats = stats.get("general").unwrap();
    assert_eq!((key_stats.active, key_stats.idle, key_stats.total), (0, 1, 1));
}

#[tokio::test]
async fn shutdown_closes_every_session_and_blocks_acquire() {
    let provisioner = StubProvisioner::new();
    let pool = pool_with(provisioner.clone(), |c| {
        c.min_warm = 2;
        c.max_size = 2;
    });
    let key = PoolKey::from("general");
    pool.initialize(std::slice::from_ref(&key)).await;
    assert_eq!(provisioner.created_count(), 2);

    pool.shutdown().await;
    assert_eq!(provisioner.closed_ids().len(), 2);

    let err = pool.acquire(&key, Duration::from_millis(50)).await.unwrap_err();
    assert!(matches!(err, PoolError::NoSessionAvailable { .. }));
}
