//! Execute: release on every path and session-failure classification

mod common;

use std::time::Duration;

use pretty_assertions::assert_eq;
use tessera_pool::testing::MockCallError;
use tessera_pool::{Error, ExecuteError, ResourceState};
use tokio::sync::oneshot;

use common::{config, pool, until_waiting, warmed};

#[tokio::test(start_paused = true)]
async fn returns_operation_result_and_releases() {
    let (pool, _control) = warmed(2).await;

    let reply = pool
        .execute(|client| Box::pin(async move { client.call("hello").await }))
        .await
        .expect("execute");

    assert!(reply.ends_with(":hello"));
    let stats = pool.stats();
    assert_eq!(stats.busy, 0);
    assert_eq!(stats.completed, 1);
}

#[tokio::test(start_paused = true)]
async fn session_failure_invalidates_client() {
    let (pool, control) = warmed(1).await;

    let err = pool
        .execute(|_client| {
            Box::pin(async move {
                Err::<(), _>(MockCallError("401 Unauthorized: missing access token".into()))
            })
        })
        .await
        .expect_err("operation fails");

    assert_eq!(
        err.into_operation(),
        Some(MockCallError("401 Unauthorized: missing access token".into()))
    );
    assert_eq!(control.reset_calls(), 1);
    let snapshot = pool.snapshot();
    assert_eq!(snapshot[0].state, ResourceState::Unhealthy);
    assert!(matches!(
        pool.acquire().await,
        Err(Error::NoHealthyClients { pool_size: 1 })
    ));
}

#[tokio::test(start_paused = true)]
async fn invalidated_client_is_repaired_by_next_check() {
    let (pool, control) = warmed(1).await;
    let before = pool
        .execute(|client| Box::pin(async move { Ok::<_, MockCallError>(client.token()) }))
        .await
        .expect("token");

    let _ = pool
        .execute(|_client| {
            Box::pin(async move { Err::<(), _>(MockCallError("Session expired".into())) })
        })
        .await;
    assert_eq!(pool.stats().ready, 0);

    let report = pool.run_health_check().await;
    assert_eq!(report.repair.succeeded, 1);

    let after = pool
        .execute(|client| Box::pin(async move { Ok::<_, MockCallError>(client.token()) }))
        .await
        .expect("token");
    assert!(after.is_some());
    assert_ne!(before, after);
    assert_eq!(control.established(), 2);
}

#[tokio::test(start_paused = true)]
async fn invalidated_client_is_not_handed_to_waiter() {
    let (pool, _control) = warmed(1).await;
    let (fail_tx, fail_rx) = oneshot::channel::<()>();

    let failing = tokio::spawn({
        let pool = pool.clone();
        async move {
            pool.execute(move |_client| {
                Box::pin(async move {
                    let _ = fail_rx.await;
                    Err::<(), _>(MockCallError("403 Forbidden".into()))
                })
            })
            .await
        }
    });
    while pool.stats().busy == 0 {
        tokio::task::yield_now().await;
    }

    let waiter = tokio::spawn({
        let pool = pool.clone();
        async move { pool.acquire_timeout(Duration::from_millis(500)).await.map(|l| l.id()) }
    });
    until_waiting(&pool, 1).await;

    fail_tx.send(()).expect("operation waiting");
    assert!(failing.await.expect("task").is_err());

    let err = waiter.await.expect("task").expect_err("client was invalidated");
    assert!(matches!(err, Error::QueueTimeout { .. }));
}

#[tokio::test(start_paused = true)]
async fn unclassified_error_passes_through() {
    let (pool, control) = warmed(1).await;

    let err = pool
        .execute(|_client| {
            Box::pin(async move { Err::<(), _>(MockCallError("quota exceeded for model".into())) })
        })
        .await
        .expect_err("operation fails");

    assert!(matches!(err, ExecuteError::Operation(_)));
    assert_eq!(control.reset_calls(), 0);
    assert_eq!(pool.stats().ready, 1);
}

#[tokio::test(start_paused = true)]
async fn custom_markers_replace_defaults() {
    let (pool, _control) = pool(config(1).with_session_markers(["CAPTCHA"]));
    pool.warmup().await.expect("warmup");

    let _ = pool
        .execute(|_client| {
            Box::pin(async move { Err::<(), _>(MockCallError("401 Unauthorized".into())) })
        })
        .await;
    assert_eq!(pool.stats().ready, 1);

    let _ = pool
        .execute(|_client| {
            Box::pin(async move { Err::<(), _>(MockCallError("captcha required".into())) })
        })
        .await;
    assert_eq!(pool.stats().ready, 0);
}

#[tokio::test(start_paused = true)]
async fn acquire_failure_is_a_pool_error() {
    let (pool, _control) = pool(config(2));

    let err = pool
        .execute(|client| Box::pin(async move { client.call("never").await }))
        .await
        .expect_err("not warmed");

    assert!(matches!(
        err.as_pool(),
        Some(Error::NoHealthyClients { pool_size: 2 })
    ));
}

#[tokio::test(start_paused = true)]
async fn panicking_operation_still_releases() {
    let (pool, _control) = warmed(1).await;

    let task = tokio::spawn({
        let pool = pool.clone();
        async move {
            pool.execute(|client| {
                Box::pin(async move {
                    let reply = client.call("boom").await?;
                    assert!(reply.is_empty(), "operation panicked");
                    Ok::<(), MockCallError>(())
                })
            })
            .await
        }
    });

    assert!(task.await.expect_err("panicked").is_panic());
    let stats = pool.stats();
    assert_eq!(stats.busy, 0);
    assert_eq!(stats.ready, 1);
}

#[tokio::test(start_paused = true)]
async fn dropped_execute_still_releases() {
    let (pool, _control) = warmed(1).await;

    let outcome = tokio::time::timeout(
        Duration::from_millis(10),
        pool.execute(|_client| {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<(), MockCallError>(())
            })
        }),
    )
    .await;

    assert!(outcome.is_err());
    assert_eq!(pool.stats().busy, 0);
    assert!(pool.acquire_timeout(Duration::from_millis(1)).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn execute_timeout_overrides_queue_timeout() {
    let (pool, _control) = warmed(1).await;
    let _held = pool.acquire().await.expect("acquire");

    let err = pool
        .execute_timeout(
            |client| Box::pin(async move { client.call("late").await }),
            Duration::from_millis(50),
        )
        .await
        .expect_err("busy");

    assert!(matches!(
        err,
        ExecuteError::Pool(Error::QueueTimeout { timeout_ms: 50, .. })
    ));
}
