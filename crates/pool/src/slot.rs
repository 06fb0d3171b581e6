//! Pool slots: one resource's bookkeeping plus its parked session.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Ordinal of a resource in its pool, `0..pool_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(usize);

impl ResourceId {
    /// Wrap a slot index
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// The slot index
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Observable lifecycle state of a resource.
///
/// ```text
/// Uninitialized -> Initializing -> ReadyIdle | Unhealthy
/// ReadyIdle <-> ReadyBusy
/// ReadyIdle -> Initializing      (proactive refresh)
/// Unhealthy -> Initializing      (repair)
/// ReadyBusy -> Unhealthy         (session failure during use)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceState {
    /// Never attempted to establish a session
    Uninitialized,
    /// A session is being established, repaired or refreshed
    Initializing,
    /// Ready and free
    ReadyIdle,
    /// Ready and leased to a caller
    ReadyBusy,
    /// Not ready; waiting for the health monitor to repair it
    Unhealthy,
}

/// Point-in-time view of one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSnapshot {
    /// Resource ordinal
    pub id: ResourceId,
    /// Lifecycle state
    pub state: ResourceState,
    /// Age of the current session, if one is established
    pub session_age: Option<Duration>,
}

/// One pool slot.
///
/// `session` is `Some` exactly when nobody has checked the provider out: a
/// lease, a warmup task or a health pass takes it and puts it back.
#[derive(Debug)]
pub(crate) struct Slot<P> {
    pub(crate) id: ResourceId,
    pub(crate) session: Option<P>,
    pub(crate) ready: bool,
    pub(crate) busy: bool,
    pub(crate) initializing: bool,
    pub(crate) established_at: Option<Instant>,
    attempted: bool,
}

impl<P> Slot<P> {
    pub(crate) fn new(id: ResourceId, session: P) -> Self {
        Self {
            id,
            session: Some(session),
            ready: false,
            busy: false,
            initializing: false,
            established_at: None,
            attempted: false,
        }
    }

    /// Ready, idle, and its provider is parked here.
    pub(crate) fn is_available(&self) -> bool {
        self.ready && !self.busy && self.session.is_some()
    }

    /// Candidate for the repair pass.
    pub(crate) fn needs_repair(&self) -> bool {
        !self.ready && !self.busy && !self.initializing && self.session.is_some()
    }

    /// Candidate for the proactive refresh pass.
    pub(crate) fn is_stale(&self, now: Instant, max_age: Duration) -> bool {
        self.is_available()
            && !self.initializing
            && self
                .established_at
                .is_some_and(|at| now.saturating_duration_since(at) > max_age)
    }

    /// Lease the provider to a caller.
    pub(crate) fn checkout(&mut self) -> Option<P> {
        if !self.is_available() {
            return None;
        }
        self.busy = true;
        self.session.take()
    }

    /// Take the provider to (re-)establish its session.
    ///
    /// `lock_busy` also marks the slot busy, which keeps `acquire` away while
    /// a ready slot is being refreshed.
    pub(crate) fn begin_establish(&mut self, lock_busy: bool) -> Option<P> {
        if self.busy || self.initializing {
            return None;
        }
        let session = self.session.take()?;
        self.initializing = true;
        self.attempted = true;
        if lock_busy {
            self.busy = true;
        }
        Some(session)
    }

    pub(crate) fn mark_established(&mut self, now: Instant) {
        self.ready = true;
        self.initializing = false;
        self.established_at = Some(now);
    }

    pub(crate) fn mark_unhealthy(&mut self) {
        self.ready = false;
        self.established_at = None;
    }

    /// Put the provider back and clear `busy`.
    pub(crate) fn park(&mut self, session: P) {
        self.session = Some(session);
        self.busy = false;
        self.initializing = false;
    }

    pub(crate) fn state(&self) -> ResourceState {
        if self.initializing {
            ResourceState::Initializing
        } else if self.ready && self.busy {
            ResourceState::ReadyBusy
        } else if self.ready {
            ResourceState::ReadyIdle
        } else if self.attempted {
            ResourceState::Unhealthy
        } else {
            ResourceState::Uninitialized
        }
    }

    pub(crate) fn snapshot(&self, now: Instant) -> ResourceSnapshot {
        ResourceSnapshot {
            id: self.id,
            state: self.state(),
            session_age: self
                .established_at
                .map(|at| now.saturating_duration_since(at)),
        }
    }
}
