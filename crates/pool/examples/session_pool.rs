//! Session pool example
//!
//! Warms a pool of mock clients, fans requests out over it, lets one request
//! hit a dead session, repairs it and shuts down.
//!
//! `POOL_SIZE`, `QUEUE_TIMEOUT` (ms) and `PROXY_URL` are read from the
//! environment; `TESSERA_LOG` sets the log filter.

use std::time::Duration;

use tessera_pool::testing::{MockCallError, MockControl};
use tessera_pool::{ClientPool, ExecuteError, PoolConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tessera_log::init(tessera_log::Config::from_env())?;

    let config = PoolConfig::from_env()?.with_stagger(Duration::from_millis(200));
    let control = MockControl::new();
    control.set_delay(Duration::from_millis(50));

    let pool = ClientPool::new(config, control.factory())?;
    let report = pool.warmup().await?;
    println!(
        "warmed {}/{} clients in {:?}",
        report.ready, report.pool_size, report.elapsed
    );

    let mut tasks = Vec::new();
    for n in 0..12 {
        let pool = pool.clone();
        tasks.push(tokio::spawn(async move {
            let body = format!("request-{n}");
            pool.execute(move |client| Box::pin(async move { client.call(&body).await }))
                .await
        }));
    }
    for task in tasks {
        match task.await? {
            Ok(reply) => println!("ok: {reply}"),
            Err(err) => println!("failed: {err}"),
        }
    }

    let outcome: Result<(), ExecuteError<MockCallError>> = pool
        .execute(|client| {
            Box::pin(async move {
                tracing::info!(client = %client.id(), "Simulating an expired session");
                Err(MockCallError("401 Unauthorized: token expired".into()))
            })
        })
        .await;
    println!("dead session: {:?}", outcome.err());
    println!("after failure: {:?}", pool.stats());

    let health = pool.run_health_check().await;
    println!("repaired {} client(s)", health.repair.succeeded);

    let summary = pool.shutdown().await;
    println!(
        "shutdown: {}/{} ready, {} requests completed",
        summary.ready, summary.pool_size, summary.completed
    );
    Ok(())
}
