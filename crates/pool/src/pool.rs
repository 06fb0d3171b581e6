//! Client pool: a fixed set of session-bound resources shared by many callers.
//!
//! All slot and wait-queue mutation happens under one `parking_lot::Mutex`,
//! held only across synchronous check-and-mutate sections and never across an
//! `.await`. A leased provider is moved out of its slot into the [`Lease`] and
//! moved back on release, so exclusive use is enforced by ownership as well as
//! by the `busy` flag.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::classify::SessionFailureClassifier;
use crate::config::PoolConfig;
use crate::error::{Error, Result, SessionError};
use crate::gate::EstablishGate;
use crate::health::HealthMonitor;
use crate::lease::Lease;
use crate::queue::{Handoff, WaitQueue};
use crate::session::{SessionFactory, SessionProvider};
use crate::slot::{ResourceId, ResourceSnapshot, Slot};

/// Pool statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Number of resources, fixed at construction
    pub pool_size: usize,
    /// Resources with an established session (busy or idle)
    pub ready: usize,
    /// Resources leased to callers or locked for refresh
    pub busy: usize,
    /// Resources whose session is being established
    pub initializing: usize,
    /// Resources that are not ready
    pub unhealthy: usize,
    /// Acquire requests currently queued
    pub waiting: usize,
    /// Releases over the pool's lifetime
    pub completed: u64,
    /// Acquire requests that had to queue over the pool's lifetime
    pub queued: u64,
}

/// Diagnostic summary returned by [`ClientPool::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownSummary {
    /// Resources that were ready when shutdown began
    pub ready: usize,
    /// Pool size
    pub pool_size: usize,
    /// Releases over the pool's lifetime
    pub completed: u64,
}

/// Which path is (re-)establishing a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Establish {
    Warmup,
    Repair,
    Refresh,
}

pub(crate) struct PoolState<P> {
    pub(crate) slots: Vec<Slot<P>>,
    pub(crate) waiters: WaitQueue<P>,
    completed: u64,
    queued: u64,
    shut_down: bool,
}

impl<P> PoolState<P> {
    fn ready_count(&self) -> usize {
        self.slots.iter().filter(|s| s.ready).count()
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            pool_size: self.slots.len(),
            ready: self.ready_count(),
            busy: self.slots.iter().filter(|s| s.busy).count(),
            initializing: self.slots.iter().filter(|s| s.initializing).count(),
            unhealthy: self.slots.iter().filter(|s| !s.ready).count(),
            waiting: self.waiters.len(),
            completed: self.completed,
            queued: self.queued,
        }
    }

    /// Return a checked-out resource: hand it to the oldest waiter if it is
    /// still ready, otherwise park it idle in its slot.
    ///
    /// Readiness is checked here, under the lock, at the moment of handoff.
    fn return_to_pool(&mut self, id: ResourceId, session: P) {
        let Self { slots, waiters, .. } = self;
        let slot = &mut slots[id.index()];

        if slot.ready {
            match waiters.hand_off(Handoff { id, session }) {
                Ok(()) => {
                    slot.busy = true;
                    slot.initializing = false;
                    debug!(resource_id = %id, "Handed resource to waiter");
                }
                Err(returned) => slot.park(returned.session),
            }
        } else {
            slot.park(session);
        }
    }
}

pub(crate) struct Shared<P> {
    pub(crate) config: PoolConfig,
    pub(crate) gate: EstablishGate,
    pub(crate) classifier: SessionFailureClassifier,
    pub(crate) state: Mutex<PoolState<P>>,
    pub(crate) monitor: Mutex<Option<HealthMonitor>>,
}

impl<P: SessionProvider> Shared<P> {
    pub(crate) fn mark_unhealthy(&self, id: ResourceId) {
        self.state.lock().slots[id.index()].mark_unhealthy();
    }

    /// Release path for leases.
    pub(crate) fn release_session(&self, id: ResourceId, session: P) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.completed += 1;

        if state.completed % 10 == 0 {
            let busy = state.slots.iter().filter(|s| s.busy).count();
            debug!(completed = state.completed, busy, "Pool progress");
        }

        if state.shut_down {
            let slot = &mut state.slots[id.index()];
            slot.mark_unhealthy();
            slot.busy = false;
            drop(guard);
            close_detached(session);
            return;
        }

        state.return_to_pool(id, session);
    }

    /// Establish (warmup), or reset and re-establish (repair, refresh), the
    /// session of one slot.
    ///
    /// Eligibility is re-checked under the lock before anything is mutated,
    /// since other tasks may have touched the slot since it was selected.
    /// Returns `None` when the slot was no longer eligible.
    pub(crate) async fn establish(
        &self,
        id: ResourceId,
        mode: Establish,
    ) -> Option<std::result::Result<(), SessionError>> {
        let session = {
            let mut state = self.state.lock();
            let slot = &mut state.slots[id.index()];
            let eligible = match mode {
                Establish::Warmup => !slot.ready,
                Establish::Repair => slot.needs_repair(),
                Establish::Refresh => {
                    slot.is_stale(Instant::now(), self.config.health.session_max_age)
                }
            };
            if !eligible {
                return None;
            }
            slot.begin_establish(mode == Establish::Refresh)?
        };

        let mut pending = Establishing {
            shared: self,
            id,
            session: Some(session),
        };
        if mode != Establish::Warmup {
            pending.session_mut().reset_session();
        }

        let result = self.gate.run(pending.session_mut().ensure_session()).await;
        pending.finish(result.is_ok());

        Some(result)
    }

    /// Put a provider back after an establishment attempt.
    ///
    /// After shutdown the provider is closed instead, since shutdown only
    /// closes what is parked in slots.
    fn settle(&self, id: ResourceId, session: P, established: bool) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let slot = &mut state.slots[id.index()];

        if state.shut_down {
            slot.mark_unhealthy();
            slot.busy = false;
            slot.initializing = false;
            drop(guard);
            close_detached(session);
        } else if established {
            slot.mark_established(Instant::now());
            slot.busy = true;
            state.return_to_pool(id, session);
        } else {
            slot.mark_unhealthy();
            slot.park(session);
        }
    }
}

/// A provider checked out of its slot for (re-)establishment.
///
/// If the establishing future is dropped before [`finish`](Self::finish),
/// the provider goes back to its slot as unhealthy.
struct Establishing<'a, P: SessionProvider> {
    shared: &'a Shared<P>,
    id: ResourceId,
    session: Option<P>,
}

impl<P: SessionProvider> Establishing<'_, P> {
    fn session_mut(&mut self) -> &mut P {
        match self.session.as_mut() {
            Some(session) => session,
            None => unreachable!("session is only taken by finish or drop"),
        }
    }

    fn finish(mut self, established: bool) {
        if let Some(session) = self.session.take() {
            self.shared.settle(self.id, session, established);
        }
    }
}

impl<P: SessionProvider> Drop for Establishing<'_, P> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            debug!(resource_id = %self.id, "Session establishment cancelled");
            self.shared.settle(self.id, session, false);
        }
    }
}

/// Close a session that came back after shutdown, without blocking the
/// releasing caller.
fn close_detached<P: SessionProvider>(mut session: P) {
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        handle.spawn(async move { session.close().await });
    }
}

/// An acquire request sitting in the wait queue.
///
/// If the acquiring future is dropped after a handoff already reached its
/// channel, the resource is put back instead of being lost with the receiver.
struct PendingAcquire<P: SessionProvider> {
    shared: Arc<Shared<P>>,
    ticket: u64,
    rx: Option<oneshot::Receiver<Handoff<P>>>,
}

impl<P: SessionProvider> PendingAcquire<P> {
    async fn wait(mut self, timeout: Duration) -> Result<Handoff<P>> {
        let Some(rx) = self.rx.as_mut() else {
            return Err(Error::ShutDown);
        };

        let outcome = tokio::time::timeout(timeout, rx).await;
        match outcome {
            Ok(Ok(handoff)) => {
                self.rx = None;
                Ok(handoff)
            }
            Ok(Err(_)) => {
                self.rx = None;
                Err(Error::ShutDown)
            }
            Err(_) => self.on_timeout(timeout),
        }
    }

    fn on_timeout(&mut self, timeout: Duration) -> Result<Handoff<P>> {
        let remaining = {
            let mut state = self.shared.state.lock();
            state
                .waiters
                .remove(self.ticket)
                .then(|| state.waiters.len())
        };

        let Some(mut rx) = self.rx.take() else {
            return Err(Error::ShutDown);
        };

        match remaining {
            Some(waiters) => Err(Error::QueueTimeout {
                timeout_ms: timeout.as_millis() as u64,
                waiters,
            }),
            // A release consumed this waiter before the timer's removal; the
            // resource is already in the channel.
            None => rx.try_recv().map_err(|_| Error::ShutDown),
        }
    }
}

impl<P: SessionProvider> Drop for PendingAcquire<P> {
    fn drop(&mut self) {
        let Some(mut rx) = self.rx.take() else {
            return;
        };
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        if !state.waiters.remove(self.ticket) {
            if let Ok(handoff) = rx.try_recv() {
                state.return_to_pool(handoff.id, handoff.session);
            }
        }
    }
}

/// Pool of session-bound clients.
///
/// Cloning is cheap and shares the pool.
pub struct ClientPool<P: SessionProvider> {
    pub(crate) shared: Arc<Shared<P>>,
}

impl<P: SessionProvider> Clone for ClientPool<P> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<P: SessionProvider> std::fmt::Debug for ClientPool<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientPool")
            .field("stats", &self.stats())
            .field("transport", &self.shared.config.transport)
            .finish()
    }
}

impl<P: SessionProvider> ClientPool<P> {
    /// Create a pool with its own establishment gate sized by
    /// `config.establish_concurrency`.
    ///
    /// Resources start uninitialized; call [`warmup`](Self::warmup) before
    /// serving requests.
    ///
    /// # Errors
    /// Returns error if `config` is invalid (e.g. pool_size == 0).
    pub fn new<F>(config: PoolConfig, factory: F) -> Result<Self>
    where
        F: SessionFactory<P>,
    {
        let gate = EstablishGate::new(config.establish_concurrency);
        Self::with_gate(config, gate, factory)
    }

    /// Create a pool that shares `gate` with other pools.
    pub fn with_gate<F>(config: PoolConfig, gate: EstablishGate, mut factory: F) -> Result<Self>
    where
        F: SessionFactory<P>,
    {
        config.validate()?;

        let slots = (0..config.pool_size)
            .map(|index| {
                let id = ResourceId::new(index);
                Slot::new(id, factory.create(id, &config.transport))
            })
            .collect();

        Ok(Self {
            shared: Arc::new(Shared {
                classifier: SessionFailureClassifier::new(config.session_markers.iter()),
                gate,
                config,
                state: Mutex::new(PoolState {
                    slots,
                    waiters: WaitQueue::new(),
                    completed: 0,
                    queued: 0,
                    shut_down: false,
                }),
                monitor: Mutex::new(None),
            }),
        })
    }

    /// Acquire a resource, waiting up to the configured queue timeout.
    pub async fn acquire(&self) -> Result<Lease<P>> {
        self.acquire_timeout(self.shared.config.queue_timeout).await
    }

    /// Acquire a resource, waiting up to `timeout` if all ready resources
    /// are busy.
    ///
    /// Fails immediately with [`Error::NoHealthyClients`] when no resource is
    /// ready at all; such a request is never queued.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<Lease<P>> {
        let (ticket, rx) = {
            let mut guard = self.shared.state.lock();
            let state = &mut *guard;

            if state.shut_down {
                return Err(Error::ShutDown);
            }

            if let Some(slot) = state.slots.iter_mut().find(|s| s.is_available()) {
                if let Some(session) = slot.checkout() {
                    return Ok(Lease::new(slot.id, session, Arc::clone(&self.shared)));
                }
            }

            let ready = state.ready_count();
            if ready == 0 {
                return Err(Error::NoHealthyClients {
                    pool_size: state.slots.len(),
                });
            }

            state.queued += 1;
            if state.queued <= 3 || state.queued % 10 == 1 {
                info!(
                    ready,
                    waiting = state.waiters.len() + 1,
                    "All clients busy, waiting for release"
                );
            }

            state.waiters.push()
        };

        let pending = PendingAcquire {
            shared: Arc::clone(&self.shared),
            ticket,
            rx: Some(rx),
        };
        let handoff = pending.wait(timeout).await?;
        Ok(Lease::new(
            handoff.id,
            handoff.session,
            Arc::clone(&self.shared),
        ))
    }

    /// Return a resource to the pool. Equivalent to dropping the lease.
    pub fn release(&self, lease: Lease<P>) {
        drop(lease);
    }

    /// Current pool statistics
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.shared.state.lock().stats()
    }

    /// Per-resource state, in index order
    #[must_use]
    pub fn snapshot(&self) -> Vec<ResourceSnapshot> {
        let now = Instant::now();
        self.shared
            .state
            .lock()
            .slots
            .iter()
            .map(|slot| slot.snapshot(now))
            .collect()
    }

    /// The pool's configuration
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// The session-establishment gate
    #[must_use]
    pub fn gate(&self) -> &EstablishGate {
        &self.shared.gate
    }

    /// Stop the health monitor, fail queued waiters and close idle sessions.
    ///
    /// Operations already running keep their lease; their sessions are closed
    /// when the lease is released.
    pub async fn shutdown(&self) -> ShutdownSummary {
        let monitor = self.shared.monitor.lock().take();
        if let Some(monitor) = monitor {
            monitor.stop().await;
        }

        let (summary, idle) = {
            let mut guard = self.shared.state.lock();
            let state = &mut *guard;

            let summary = ShutdownSummary {
                ready: state.ready_count(),
                pool_size: state.slots.len(),
                completed: state.completed,
            };

            state.shut_down = true;
            let refused = state.waiters.close_all();
            if refused > 0 {
                debug!(refused, "Refused queued waiters at shutdown");
            }

            let idle: Vec<P> = state
                .slots
                .iter_mut()
                .filter(|slot| !slot.busy)
                .filter_map(|slot| {
                    slot.mark_unhealthy();
                    slot.session.take()
                })
                .collect();

            (summary, idle)
        };

        for mut session in idle {
            session.close().await;
        }

        info!(
            ready = summary.ready,
            pool_size = summary.pool_size,
            completed = summary.completed,
            "Pool shut down"
        );

        summary
    }
}
