//! Testing utilities: a scriptable [`SessionProvider`].

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::config::TransportConfig;
use crate::error::SessionError;
use crate::session::SessionProvider;
use crate::slot::ResourceId;

#[derive(Debug, Default)]
struct ControlInner {
    fail_next: AtomicUsize,
    always_fail: AtomicBool,
    failing: Mutex<HashSet<ResourceId>>,
    starts: Mutex<Vec<(ResourceId, Instant)>>,
    delay_ms: AtomicU64,
    generation: AtomicU64,
    ensure_calls: AtomicUsize,
    established: AtomicUsize,
    reset_calls: AtomicUsize,
    close_calls: AtomicUsize,
    active: AtomicUsize,
    peak_active: AtomicUsize,
}

/// Shared switchboard for every [`MockSession`] built from it.
#[derive(Debug, Clone, Default)]
pub struct MockControl {
    inner: Arc<ControlInner>,
}

impl MockControl {
    /// A control where every establishment succeeds immediately
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory for [`ClientPool::new`](crate::pool::ClientPool::new)
    pub fn factory(&self) -> impl FnMut(ResourceId, &TransportConfig) -> MockSession + use<> {
        let control = self.clone();
        move |id: ResourceId, transport: &TransportConfig| {
            MockSession::new(id, control.clone(), transport)
        }
    }

    /// Fail the next `n` establishments, whichever resources attempt them
    pub fn fail_next(&self, n: usize) {
        self.inner.fail_next.store(n, Ordering::SeqCst);
    }

    /// Fail every establishment until switched off
    pub fn set_always_fail(&self, fail: bool) {
        self.inner.always_fail.store(fail, Ordering::SeqCst);
    }

    /// Fail establishments for one resource until [`heal`](Self::heal)
    pub fn fail_resource(&self, id: ResourceId) {
        self.inner.failing.lock().insert(id);
    }

    /// Stop failing establishments for `id`
    pub fn heal(&self, id: ResourceId) {
        self.inner.failing.lock().remove(&id);
    }

    /// Make each establishment take `delay`
    pub fn set_delay(&self, delay: Duration) {
        self.inner
            .delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// `ensure_session` calls, including idempotent ones
    pub fn ensure_calls(&self) -> usize {
        self.inner.ensure_calls.load(Ordering::SeqCst)
    }

    /// Sessions actually established (fresh tokens issued)
    pub fn established(&self) -> usize {
        self.inner.established.load(Ordering::SeqCst)
    }

    /// `reset_session` calls
    pub fn reset_calls(&self) -> usize {
        self.inner.reset_calls.load(Ordering::SeqCst)
    }

    /// `close` calls
    pub fn close_calls(&self) -> usize {
        self.inner.close_calls.load(Ordering::SeqCst)
    }

    /// Resource and start time of every establishment attempt, in start order
    pub fn establish_starts(&self) -> Vec<(ResourceId, Instant)> {
        self.inner.starts.lock().clone()
    }

    /// Most establishments observed running at the same time
    pub fn peak_concurrency(&self) -> usize {
        self.inner.peak_active.load(Ordering::SeqCst)
    }

    fn should_fail(&self, id: ResourceId) -> bool {
        if self.inner.always_fail.load(Ordering::SeqCst) || self.inner.failing.lock().contains(&id)
        {
            return true;
        }
        self.inner
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// In-memory session provider driven by a [`MockControl`].
///
/// A session is an opaque token; `reset_session` clears it and the next
/// `ensure_session` issues a new one.
#[derive(Debug)]
pub struct MockSession {
    id: ResourceId,
    control: MockControl,
    proxy: Option<String>,
    token: Option<u64>,
    closed: bool,
}

impl MockSession {
    /// Create a provider for slot `id`
    pub fn new(id: ResourceId, control: MockControl, transport: &TransportConfig) -> Self {
        Self {
            id,
            control,
            proxy: transport.proxy.clone(),
            token: None,
            closed: false,
        }
    }

    /// Slot this provider was built for
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Current session token, if established
    pub fn token(&self) -> Option<u64> {
        self.token
    }

    /// Proxy received from the pool's transport config
    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    /// Whether `close` was called
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// A stand-in upstream call: succeeds with the token when a session
    /// exists, fails with an auth error otherwise.
    pub async fn call(&mut self, body: &str) -> Result<String, MockCallError> {
        tokio::task::yield_now().await;
        match self.token {
            Some(token) => Ok(format!("{}:{token}:{body}", self.id)),
            None => Err(MockCallError("401 Unauthorized: missing access token".into())),
        }
    }
}

impl SessionProvider for MockSession {
    async fn ensure_session(&mut self) -> Result<(), SessionError> {
        let inner = &self.control.inner;
        inner.ensure_calls.fetch_add(1, Ordering::SeqCst);
        if self.token.is_some() {
            return Ok(());
        }

        inner.starts.lock().push((self.id, Instant::now()));
        let active = inner.active.fetch_add(1, Ordering::SeqCst) + 1;
        inner.peak_active.fetch_max(active, Ordering::SeqCst);

        let delay = inner.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let outcome = if self.control.should_fail(self.id) {
            Err(SessionError::new(format!("{}: token request failed", self.id)))
        } else {
            let token = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
            self.token = Some(token);
            inner.established.fetch_add(1, Ordering::SeqCst);
            Ok(())
        };

        inner.active.fetch_sub(1, Ordering::SeqCst);
        outcome
    }

    fn reset_session(&mut self) {
        self.control.inner.reset_calls.fetch_add(1, Ordering::SeqCst);
        self.token = None;
    }

    async fn close(&mut self) {
        self.control.inner.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed = true;
    }
}

/// Error returned by [`MockSession::call`] and by test operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct MockCallError(pub String);
