//! # Tessera Log
//!
//! One-call `tracing` subscriber setup for tessera binaries, demos and tests.
//!
//! ```no_run
//! tessera_log::init(tessera_log::Config::from_env())?;
//! tracing::info!(pool_size = 15, "Pool starting");
//! # Ok::<(), tessera_log::LogError>(())
//! ```

pub mod builder;
pub mod config;
pub mod error;

pub use builder::{LoggerBuilder, init, init_for_tests, try_init_default};
pub use config::{Config, DisplayConfig, Format, WriterConfig};
pub use error::{LogError, LogResult};
