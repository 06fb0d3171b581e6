//! Acquire/release under contention: queueing, FIFO handoff, timeouts

mod common;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use tessera_pool::{Error, ResourceState, SessionProvider};

use common::{config, pool, until_waiting, warmed};

#[tokio::test(start_paused = true)]
async fn acquire_marks_busy_and_release_frees() {
    let (pool, _control) = warmed(2).await;

    let lease = pool.acquire().await.expect("acquire");
    let stats = pool.stats();
    assert_eq!(stats.busy, 1);
    assert_eq!(stats.ready, 2);
    assert_eq!(
        pool.snapshot()[lease.id().index()].state,
        ResourceState::ReadyBusy
    );

    pool.release(lease);
    let stats = pool.stats();
    assert_eq!(stats.busy, 0);
    assert_eq!(stats.completed, 1);
}

#[tokio::test(start_paused = true)]
async fn distinct_leases_get_distinct_clients() {
    let (pool, _control) = warmed(3).await;

    let a = pool.acquire().await.expect("a");
    let b = pool.acquire().await.expect("b");
    let c = pool.acquire().await.expect("c");

    let mut ids = vec![a.id(), b.id(), c.id()];
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn queued_acquire_gets_released_client() {
    let (pool, _control) = warmed(1).await;
    let held = pool.acquire().await.expect("first acquire");
    let held_id = held.id();

    let waiter = tokio::spawn({
        let pool = pool.clone();
        async move {
            pool.acquire_timeout(Duration::from_secs(5))
                .await
                .map(|lease| lease.id())
        }
    });
    until_waiting(&pool, 1).await;
    assert_eq!(pool.stats().queued, 1);

    drop(held);

    let got = waiter.await.expect("task").expect("acquire");
    assert_eq!(got, held_id);
    assert_eq!(pool.stats().waiting, 0);
}

#[tokio::test(start_paused = true)]
async fn queued_acquire_times_out() {
    let (pool, _control) = warmed(1).await;
    let _held = pool.acquire().await.expect("first acquire");

    let err = pool
        .acquire_timeout(Duration::from_millis(200))
        .await
        .expect_err("all clients busy");

    assert!(matches!(
        err,
        Error::QueueTimeout {
            timeout_ms: 200,
            waiters: 0
        }
    ));
    assert!(err.is_retryable());
    assert_eq!(pool.stats().waiting, 0);
}

#[tokio::test(start_paused = true)]
async fn default_queue_timeout_comes_from_config() {
    let (pool, _control) = pool(config(1).with_queue_timeout(Duration::from_millis(750)));
    pool.warmup().await.expect("warmup");
    let _held = pool.acquire().await.expect("first acquire");

    let err = pool.acquire().await.expect_err("busy");
    assert!(matches!(err, Error::QueueTimeout { timeout_ms: 750, .. }));
}

#[tokio::test(start_paused = true)]
async fn no_ready_clients_fails_without_queueing() {
    let (pool, _control) = pool(config(2));

    let err = pool.acquire().await.expect_err("nothing warmed");

    assert!(matches!(err, Error::NoHealthyClients { pool_size: 2 }));
    assert!(!err.is_retryable());
    let stats = pool.stats();
    assert_eq!(stats.waiting, 0);
    assert_eq!(stats.queued, 0);
}

#[tokio::test(start_paused = true)]
async fn waiters_are_served_in_arrival_order() {
    let (pool, _control) = warmed(1).await;
    let held = pool.acquire().await.expect("first acquire");
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut tasks = Vec::new();
    for n in 0..4 {
        let task_pool = pool.clone();
        let order = Arc::clone(&order);
        tasks.push(tokio::spawn(async move {
            let lease = task_pool
                .acquire_timeout(Duration::from_secs(10))
                .await
                .expect("acquire");
            order.lock().push(n);
            tokio::time::sleep(Duration::from_millis(10)).await;
            drop(lease);
        }));
        until_waiting(&pool, n + 1).await;
    }

    drop(held);
    for task in tasks {
        task.await.expect("task");
    }

    assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
    assert_eq!(pool.stats().completed, 5);
}

#[tokio::test(start_paused = true)]
async fn timed_out_waiter_is_skipped_by_handoff() {
    let (pool, _control) = warmed(1).await;
    let held = pool.acquire().await.expect("first acquire");

    let impatient = tokio::spawn({
        let pool = pool.clone();
        async move { pool.acquire_timeout(Duration::from_millis(100)).await.map(|l| l.id()) }
    });
    until_waiting(&pool, 1).await;
    let patient = tokio::spawn({
        let pool = pool.clone();
        async move { pool.acquire_timeout(Duration::from_secs(10)).await.map(|l| l.id()) }
    });
    until_waiting(&pool, 2).await;

    let err = impatient.await.expect("task").expect_err("times out");
    assert!(matches!(err, Error::QueueTimeout { waiters: 1, .. }));

    drop(held);
    assert!(patient.await.expect("task").is_ok());
}

#[tokio::test(start_paused = true)]
async fn cancelled_waiter_does_not_strand_client() {
    let (pool, _control) = warmed(1).await;
    let held = pool.acquire().await.expect("first acquire");

    let waiter = tokio::spawn({
        let pool = pool.clone();
        async move { pool.acquire_timeout(Duration::from_secs(10)).await.map(|l| l.id()) }
    });
    until_waiting(&pool, 1).await;
    waiter.abort();
    assert!(waiter.await.expect_err("aborted").is_cancelled());

    drop(held);

    let stats = pool.stats();
    assert_eq!(stats.busy, 0);
    assert_eq!(stats.waiting, 0);
    assert!(pool.acquire_timeout(Duration::from_millis(1)).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn lease_exposes_session_provider() {
    let (pool, control) = warmed(1).await;
    let mut lease = pool.acquire().await.expect("acquire");
    let before = lease.token().expect("established");

    lease.reset_session();
    assert_eq!(lease.token(), None);
    lease.ensure_session().await.expect("re-establish");

    let after = lease.token().expect("established");
    assert_ne!(before, after);
    assert_eq!(control.established(), 2);
    assert_eq!(lease.call("ping").await.expect("call"), format!("client-0:{after}:ping"));
}

#[tokio::test]
async fn concurrent_callers_never_share_a_client() {
    let (pool, _control) = warmed(3).await;
    let in_use = Arc::new(Mutex::new(std::collections::HashSet::new()));

    let mut tasks = Vec::new();
    for _ in 0..24 {
        let pool = pool.clone();
        let in_use = Arc::clone(&in_use);
        tasks.push(tokio::spawn(async move {
            let lease = pool
                .acquire_timeout(Duration::from_secs(30))
                .await
                .expect("acquire");
            assert!(in_use.lock().insert(lease.id()), "client leased twice");
            tokio::time::sleep(Duration::from_millis(2)).await;
            in_use.lock().remove(&lease.id());
        }));
    }
    for task in tasks {
        task.await.expect("task");
    }

    let stats = pool.stats();
    assert_eq!(stats.completed, 24);
    assert_eq!(stats.busy, 0);
    assert_eq!(stats.ready, 3);
}
