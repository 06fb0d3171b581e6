//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::time::Duration;

use tessera_pool::testing::{MockControl, MockSession};
use tessera_pool::{ClientPool, PoolConfig};

/// Small pool: batches of two, no stagger, one-second queue timeout.
pub fn config(pool_size: usize) -> PoolConfig {
    PoolConfig::default()
        .with_pool_size(pool_size)
        .with_batch_size(2)
        .with_stagger(Duration::ZERO)
        .with_queue_timeout(Duration::from_secs(1))
}

pub fn pool(config: PoolConfig) -> (ClientPool<MockSession>, MockControl) {
    tessera_log::init_for_tests();
    let control = MockControl::new();
    let pool = ClientPool::new(config, control.factory()).expect("valid config");
    (pool, control)
}

/// Pool with every client warmed up.
pub async fn warmed(pool_size: usize) -> (ClientPool<MockSession>, MockControl) {
    let (pool, control) = pool(config(pool_size));
    pool.warmup().await.expect("warmup");
    (pool, control)
}

/// Yield until `pool` has `n` queued acquire requests.
pub async fn until_waiting(pool: &ClientPool<MockSession>, n: usize) {
    while pool.stats().waiting < n {
        tokio::task::yield_now().await;
    }
}
