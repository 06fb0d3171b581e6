//! RAII handle for an acquired resource

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::pool::Shared;
use crate::session::SessionProvider;
use crate::slot::ResourceId;

/// Exclusive use of one pooled resource.
///
/// Dereferences to the resource's [`SessionProvider`]. Dropping the lease (or
/// passing it to [`ClientPool::release`](crate::pool::ClientPool::release))
/// returns the resource to the pool, handing it straight to the oldest waiter
/// if there is one.
pub struct Lease<P: SessionProvider> {
    id: ResourceId,
    session: Option<P>,
    pool: Arc<Shared<P>>,
}

impl<P: SessionProvider> Lease<P> {
    pub(crate) fn new(id: ResourceId, session: P, pool: Arc<Shared<P>>) -> Self {
        Self {
            id,
            session: Some(session),
            pool,
        }
    }

    /// Ordinal of the leased resource
    #[must_use]
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Mark the resource unhealthy and reset its session.
    ///
    /// On release the resource is parked instead of handed to a waiter, and
    /// the next health monitor tick repairs it.
    pub fn invalidate(&mut self) {
        self.pool.mark_unhealthy(self.id);
        if let Some(session) = self.session.as_mut() {
            session.reset_session();
        }
    }
}

impl<P: SessionProvider> Deref for Lease<P> {
    type Target = P;

    fn deref(&self) -> &P {
        match self.session.as_ref() {
            Some(session) => session,
            None => unreachable!("lease session is only taken in drop"),
        }
    }
}

impl<P: SessionProvider> DerefMut for Lease<P> {
    fn deref_mut(&mut self) -> &mut P {
        match self.session.as_mut() {
            Some(session) => session,
            None => unreachable!("lease session is only taken in drop"),
        }
    }
}

impl<P: SessionProvider> Drop for Lease<P> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.pool.release_session(self.id, session);
        }
    }
}

impl<P: SessionProvider> fmt::Debug for Lease<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease").field("id", &self.id).finish()
    }
}
