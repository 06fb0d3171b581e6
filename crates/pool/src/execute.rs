//! Acquire, run, classify, release.

use std::fmt::Display;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::warn;

use crate::error::ExecuteError;
use crate::pool::ClientPool;
use crate::session::SessionProvider;

impl<P: SessionProvider> ClientPool<P> {
    /// Run `operation` against an acquired resource's session, waiting up to
    /// the configured queue timeout for a resource.
    ///
    /// ```ignore
    /// let answer = pool
    ///     .execute(|client| Box::pin(async move { client.prompt("hello").await }))
    ///     .await?;
    /// ```
    pub async fn execute<T, E, F>(&self, operation: F) -> Result<T, ExecuteError<E>>
    where
        F: for<'a> FnOnce(&'a mut P) -> BoxFuture<'a, Result<T, E>>,
        E: Display,
    {
        self.execute_timeout(operation, self.shared.config.queue_timeout)
            .await
    }

    /// Run `operation` against an acquired resource's session, waiting up to
    /// `timeout` for a resource.
    ///
    /// The resource is released on every exit path, including a panic or the
    /// returned future being dropped. If the operation fails with an error
    /// the session-failure classifier matches, the resource is marked not
    /// ready and its session reset *before* release, so it is never handed to
    /// a waiter. The operation's error is returned unchanged; the pool never
    /// retries.
    pub async fn execute_timeout<T, E, F>(
        &self,
        operation: F,
        timeout: Duration,
    ) -> Result<T, ExecuteError<E>>
    where
        F: for<'a> FnOnce(&'a mut P) -> BoxFuture<'a, Result<T, E>>,
        E: Display,
    {
        let mut lease = self
            .acquire_timeout(timeout)
            .await
            .map_err(ExecuteError::Pool)?;

        let result = operation(&mut *lease).await;

        if let Err(err) = &result {
            if self.shared.classifier.is_session_failure(err) {
                warn!(
                    resource_id = %lease.id(),
                    error = %err,
                    "Session error, marking client unhealthy"
                );
                lease.invalidate();
            }
        }

        self.release(lease);
        result.map_err(ExecuteError::Operation)
    }
}
