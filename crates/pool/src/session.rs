//! The session capability every pooled resource wraps.

use std::future::Future;

use crate::config::TransportConfig;
use crate::error::SessionError;
use crate::slot::ResourceId;

/// An authenticated, time-bounded connection to an upstream system.
///
/// The pool owns one provider per resource and never calls two of its methods
/// concurrently: a provider is either parked in its slot or owned by exactly
/// one lease, warmup task or health pass.
pub trait SessionProvider: Send + 'static {
    /// Establish or validate a usable session.
    ///
    /// Must be idempotent when a valid session already exists.
    fn ensure_session(&mut self) -> impl Future<Output = Result<(), SessionError>> + Send;

    /// Discard cached session material so the next
    /// [`ensure_session`](Self::ensure_session) authenticates from scratch.
    fn reset_session(&mut self);

    /// Release transport resources. Called once at pool shutdown.
    fn close(&mut self) -> impl Future<Output = ()> + Send {
        async {}
    }
}

/// Builds the provider for one pool slot.
///
/// Blanket-implemented for `FnMut(ResourceId, &TransportConfig) -> P`.
pub trait SessionFactory<P> {
    /// Create the provider for slot `id`.
    fn create(&mut self, id: ResourceId, transport: &TransportConfig) -> P;
}

impl<P, F> SessionFactory<P> for F
where
    F: FnMut(ResourceId, &TransportConfig) -> P,
{
    fn create(&mut self, id: ResourceId, transport: &TransportConfig) -> P {
        self(id, transport)
    }
}
