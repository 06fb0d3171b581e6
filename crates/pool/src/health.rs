//! Background health monitoring
//!
//! Each tick runs two independent passes:
//! - **repair**: re-establish every resource that is not ready, not busy and
//!   not initializing;
//! - **refresh**: reset and re-establish idle ready resources whose session is
//!   older than `health.session_max_age`, locking them as busy meanwhile.
//!
//! A failure is scoped to its resource; it never aborts the tick or the loop.
//!
//! Cancelling the monitor drops a tick in progress; a resource caught
//! mid-establishment goes back to its slot as unhealthy.

use std::sync::{Arc, Weak};

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::pool::{ClientPool, Establish, Shared};
use crate::session::SessionProvider;
use crate::slot::ResourceId;

/// Outcome of one pass over the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Resources selected by the scan
    pub candidates: usize,
    /// Resources whose session was (re-)established
    pub succeeded: usize,
    /// Resources left or made unhealthy
    pub failed: usize,
    /// Candidates skipped because another task touched them after the scan
    pub skipped: usize,
}

/// Outcome of one health monitor tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthReport {
    /// Repair pass
    pub repair: PassReport,
    /// Proactive refresh pass
    pub refresh: PassReport,
}

/// Handle to the running monitor task.
#[derive(Debug)]
pub(crate) struct HealthMonitor {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl HealthMonitor {
    /// Cancel the loop, including a tick in progress, and wait for the task
    /// to finish.
    pub(crate) async fn stop(self) {
        self.cancel.cancel();
        if let Err(err) = self.handle.await {
            if err.is_panic() {
                warn!(error = %err, "Health monitor task panicked");
            }
        }
    }
}

/// Start the monitor for `shared` unless one is already running.
pub(crate) fn start<P: SessionProvider>(shared: &Arc<Shared<P>>) {
    let mut monitor = shared.monitor.lock();
    if monitor.is_some() {
        return;
    }

    let cancel = CancellationToken::new();
    let interval = shared.config.health.interval;
    let weak = Arc::downgrade(shared);
    let token = cancel.clone();

    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                () = tokio::time::sleep(interval) => {}
                () = token.cancelled() => break,
            }

            let Some(pool) = upgrade(&weak) else {
                break;
            };
            tokio::select! {
                _ = pool.run_health_check() => {}
                () = token.cancelled() => break,
            }
        }
        debug!("Health monitor stopped");
    });

    *monitor = Some(HealthMonitor { cancel, handle });
    debug!(interval_ms = interval.as_millis() as u64, "Health monitor started");
}

fn upgrade<P: SessionProvider>(weak: &Weak<Shared<P>>) -> Option<ClientPool<P>> {
    weak.upgrade().map(|shared| ClientPool { shared })
}

impl<P: SessionProvider> ClientPool<P> {
    /// Whether the background health monitor is running
    #[must_use]
    pub fn is_monitoring(&self) -> bool {
        self.shared
            .monitor
            .lock()
            .as_ref()
            .is_some_and(|m| !m.handle.is_finished())
    }

    /// Run one health monitor tick: the repair pass, then the refresh pass.
    pub async fn run_health_check(&self) -> HealthReport {
        let repair = self.repair_pass().await;
        let refresh = self.refresh_pass().await;
        HealthReport { repair, refresh }
    }

    /// Re-establish every resource that is not ready and not in use.
    pub async fn repair_pass(&self) -> PassReport {
        let candidates = self.select(|slot| slot.needs_repair());
        if candidates.is_empty() {
            return PassReport::default();
        }
        info!(count = candidates.len(), "Health check: clients need re-init");

        let mut report = PassReport {
            candidates: candidates.len(),
            ..PassReport::default()
        };
        for id in candidates {
            match self.shared.establish(id, Establish::Repair).await {
                Some(Ok(())) => {
                    report.succeeded += 1;
                    info!(resource_id = %id, "Client re-initialized");
                }
                Some(Err(err)) => {
                    report.failed += 1;
                    warn!(resource_id = %id, error = %err, "Client re-init failed");
                }
                None => report.skipped += 1,
            }
        }
        report
    }

    /// Refresh idle resources whose session is older than the max age.
    ///
    /// A refreshed resource is marked busy for the duration, so `acquire`
    /// cannot take it. On failure it becomes not ready and the next repair
    /// pass retries it.
    pub async fn refresh_pass(&self) -> PassReport {
        let now = Instant::now();
        let max_age = self.shared.config.health.session_max_age;
        let candidates = self.select(|slot| slot.is_stale(now, max_age));
        if candidates.is_empty() {
            return PassReport::default();
        }
        info!(count = candidates.len(), "Proactive refresh: stale sessions");

        let mut report = PassReport {
            candidates: candidates.len(),
            ..PassReport::default()
        };
        for id in candidates {
            match self.shared.establish(id, Establish::Refresh).await {
                Some(Ok(())) => {
                    report.succeeded += 1;
                    info!(resource_id = %id, "Client session refreshed");
                }
                Some(Err(err)) => {
                    report.failed += 1;
                    warn!(resource_id = %id, error = %err, "Client refresh failed");
                }
                None => report.skipped += 1,
            }
        }
        report
    }

    fn select<F>(&self, filter: F) -> Vec<ResourceId>
    where
        F: Fn(&crate::slot::Slot<P>) -> bool,
    {
        self.shared
            .state
            .lock()
            .slots
            .iter()
            .filter(|slot| filter(slot))
            .map(|slot| slot.id)
            .collect()
    }
}
