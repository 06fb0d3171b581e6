//! # Tessera Pool
//!
//! A fixed-size pool of expensive, externally-authenticated clients shared by
//! many concurrent callers. Each caller gets exclusive use of one client for
//! the duration of an operation.
//!
//! - **Warmup** establishes sessions in staggered batches.
//! - **Acquire / release** hand out idle clients and queue callers FIFO, with
//!   a per-request timeout, when every ready client is busy.
//! - **Execute** wraps acquire/release around caller work and invalidates the
//!   client when the work fails with a session error.
//! - **Health monitor** repairs unhealthy clients and refreshes aging sessions
//!   in the background.
//! - **Establish gate** bounds how many session establishments run at once,
//!   independently of pool size.
//!
//! Session mechanics stay behind the [`SessionProvider`] trait.

pub mod classify;
pub mod config;
pub mod error;
pub mod gate;
pub mod health;
pub mod lease;
pub mod pool;
pub mod session;
pub mod slot;
pub mod testing;
pub mod warmup;

mod execute;
mod queue;

pub use classify::SessionFailureClassifier;
pub use config::{HealthConfig, PoolConfig, TransportConfig, WarmupConfig};
pub use error::{Error, ExecuteError, Result, SessionError};
pub use gate::EstablishGate;
pub use health::{HealthReport, PassReport};
pub use lease::Lease;
pub use pool::{ClientPool, PoolStats, ShutdownSummary};
pub use session::{SessionFactory, SessionProvider};
pub use slot::{ResourceId, ResourceSnapshot, ResourceState};
pub use warmup::WarmupReport;
