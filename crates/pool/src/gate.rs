//! Concurrency limit for session establishment.
//!
//! Establishing a session is far more expensive than using one, so the number
//! of establishments running at once is bounded separately from pool size.
//! Waiters are served in FIFO order (tokio's semaphore is fair). There is no
//! acquire timeout: a hung establishment holds its permit until it returns.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Semaphore;
use tracing::trace;

use crate::error::SessionError;

/// FIFO semaphore guarding `ensure_session` calls.
///
/// Cloning shares the underlying permits, so one gate can be handed to several
/// pools with [`ClientPool::with_gate`](crate::pool::ClientPool::with_gate).
#[derive(Debug, Clone)]
pub struct EstablishGate {
    semaphore: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    limit: usize,
}

impl EstablishGate {
    /// Create a gate allowing `limit` concurrent establishments.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            limit,
        }
    }

    /// Maximum concurrent establishments
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Permits currently free
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Establishments currently running
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run `establish` once a permit is available.
    pub async fn run<T, F>(&self, establish: F) -> Result<T, SessionError>
    where
        F: Future<Output = Result<T, SessionError>>,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| SessionError::new("establishment gate closed"))?;

        let active = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        trace!(active, limit = self.limit, "Session establishment started");

        let _in_flight = InFlight(&self.in_flight);
        establish.await
    }
}

impl Default for EstablishGate {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Decrements the in-flight counter even if the establishment is cancelled.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}
