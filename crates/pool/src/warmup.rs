//! Staggered batch warmup.

use std::time::Duration;

use futures::future::join_all;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::health;
use crate::pool::{ClientPool, Establish};
use crate::session::SessionProvider;
use crate::slot::ResourceId;

/// Outcome of a successful warmup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarmupReport {
    /// Resources ready after warmup
    pub ready: usize,
    /// Pool size
    pub pool_size: usize,
    /// Wall time spent warming up
    pub elapsed: Duration,
}

impl<P: SessionProvider> ClientPool<P> {
    /// Establish sessions for every resource, in batches.
    ///
    /// Resources are initialized `warmup.batch_size` at a time in index order,
    /// concurrently within a batch, with `warmup.stagger` between batches. A
    /// resource that fails is left not ready. Succeeds if at least one
    /// resource is ready, then starts the health monitor.
    ///
    /// # Errors
    /// [`Error::WarmupFailed`] when no resource became ready.
    pub async fn warmup(&self) -> Result<WarmupReport> {
        let config = &self.shared.config;
        let pool_size = config.pool_size;
        let batch_size = config.warmup.batch_size;
        let total_batches = pool_size.div_ceil(batch_size);
        let started = Instant::now();

        info!(
            pool_size,
            batch_size,
            proxy = %config.transport.redacted_proxy(),
            "Warming up clients"
        );

        let ids: Vec<ResourceId> = (0..pool_size).map(ResourceId::new).collect();
        for (index, batch) in ids.chunks(batch_size).enumerate() {
            let batch_no = index + 1;
            info!(
                batch = batch_no,
                total_batches,
                first = batch[0].index(),
                last = batch[batch.len() - 1].index(),
                "Initializing batch"
            );

            join_all(batch.iter().map(|&id| self.warm_one(id))).await;

            if batch_no < total_batches && !config.warmup.stagger.is_zero() {
                tokio::time::sleep(config.warmup.stagger).await;
            }
        }

        let ready = self.stats().ready;
        if ready == 0 {
            return Err(Error::WarmupFailed { pool_size });
        }

        let report = WarmupReport {
            ready,
            pool_size,
            elapsed: started.elapsed(),
        };
        info!(
            ready,
            pool_size,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Warmup complete"
        );

        health::start(&self.shared);
        Ok(report)
    }

    async fn warm_one(&self, id: ResourceId) {
        match self.shared.establish(id, Establish::Warmup).await {
            Some(Ok(())) => info!(resource_id = %id, "Client ready"),
            Some(Err(err)) => warn!(resource_id = %id, error = %err, "Client warmup failed"),
            None => {}
        }
    }
}
