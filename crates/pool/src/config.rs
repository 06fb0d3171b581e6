//! Pool configuration types

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable holding the pool size
pub const ENV_POOL_SIZE: &str = "POOL_SIZE";
/// Environment variable holding the queue timeout, in milliseconds
pub const ENV_QUEUE_TIMEOUT: &str = "QUEUE_TIMEOUT";
/// Environment variable holding the proxy URL
pub const ENV_PROXY_URL: &str = "PROXY_URL";

/// Markers that classify an operation failure as a dead session.
pub const DEFAULT_SESSION_MARKERS: &[&str] = &[
    "access token",
    "lsd token",
    "invalid token",
    "expired token",
    "401",
    "403",
    "unauthorized",
    "forbidden",
    "session",
    "exhausted",
];

/// Configuration for the client pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of resources in the pool, fixed for the pool's lifetime
    pub pool_size: usize,
    /// Default time a queued acquire waits for a resource
    #[serde(with = "humantime_serde")]
    pub queue_timeout: Duration,
    /// Maximum number of concurrent session establishments
    pub establish_concurrency: usize,
    /// Transport settings handed to every session provider
    pub transport: TransportConfig,
    /// Warmup batching
    pub warmup: WarmupConfig,
    /// Background health monitor
    pub health: HealthConfig,
    /// Substrings that mark an operation error as a session failure
    pub session_markers: Vec<String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: 15,
            queue_timeout: Duration::from_secs(120),
            establish_concurrency: 3,
            transport: TransportConfig::default(),
            warmup: WarmupConfig::default(),
            health: HealthConfig::default(),
            session_markers: DEFAULT_SESSION_MARKERS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// Warmup batching configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarmupConfig {
    /// Resources initialized concurrently per batch
    pub batch_size: usize,
    /// Delay between batches (not applied after the last one)
    #[serde(with = "humantime_serde")]
    pub stagger: Duration,
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            batch_size: 2,
            stagger: Duration::from_secs(5),
        }
    }
}

/// Health monitor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Period between health monitor ticks
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Sessions older than this are refreshed while idle
    #[serde(with = "humantime_serde")]
    pub session_max_age: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            session_max_age: Duration::from_secs(10 * 60),
        }
    }
}

/// Transport settings passed through opaquely to each session provider.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Proxy URL, possibly with `user:pass@` credentials
    pub proxy: Option<String>,
}

impl TransportConfig {
    /// Proxy suitable for logs: credentials stripped, or `none (direct)`.
    #[must_use]
    pub fn redacted_proxy(&self) -> String {
        let Some(proxy) = self.proxy.as_deref() else {
            return "none (direct)".to_string();
        };
        match proxy.rsplit_once('@') {
            Some((userinfo, host)) => {
                let scheme = userinfo
                    .split_once("://")
                    .map(|(scheme, _)| format!("{scheme}://"))
                    .unwrap_or_default();
                format!("{scheme}{host}")
            }
            None => proxy.to_string(),
        }
    }
}

impl std::fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportConfig")
            .field("proxy", &self.redacted_proxy())
            .finish()
    }
}

impl PoolConfig {
    /// Validate pool configuration, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(Error::configuration("pool_size must be greater than 0"));
        }
        if self.queue_timeout.is_zero() {
            return Err(Error::configuration(
                "queue_timeout must be greater than zero",
            ));
        }
        if self.establish_concurrency == 0 {
            return Err(Error::configuration(
                "establish_concurrency must be greater than 0",
            ));
        }
        if self.warmup.batch_size == 0 {
            return Err(Error::configuration(
                "warmup.batch_size must be greater than 0",
            ));
        }
        if self.health.interval.is_zero() {
            return Err(Error::configuration(
                "health.interval must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Build a configuration from `POOL_SIZE`, `QUEUE_TIMEOUT` (ms) and
    /// `PROXY_URL`, keeping defaults for unset variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_POOL_SIZE) {
            config.pool_size = raw.trim().parse().map_err(|_| {
                Error::configuration(format!("{ENV_POOL_SIZE} must be an integer, got {raw:?}"))
            })?;
        }

        if let Some(raw) = lookup(ENV_QUEUE_TIMEOUT) {
            let ms: u64 = raw.trim().parse().map_err(|_| {
                Error::configuration(format!(
                    "{ENV_QUEUE_TIMEOUT} must be milliseconds, got {raw:?}"
                ))
            })?;
            config.queue_timeout = Duration::from_millis(ms);
        }

        config.transport.proxy = lookup(ENV_PROXY_URL).filter(|proxy| !proxy.trim().is_empty());

        config.validate()?;
        Ok(config)
    }

    /// Set the pool size
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Set the default queue timeout
    pub fn with_queue_timeout(mut self, timeout: Duration) -> Self {
        self.queue_timeout = timeout;
        self
    }

    /// Set the session-establishment concurrency limit
    pub fn with_establish_concurrency(mut self, limit: usize) -> Self {
        self.establish_concurrency = limit;
        self
    }

    /// Set the warmup batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.warmup.batch_size = batch_size;
        self
    }

    /// Set the delay between warmup batches
    pub fn with_stagger(mut self, stagger: Duration) -> Self {
        self.warmup.stagger = stagger;
        self
    }

    /// Set the health monitor period
    pub fn with_health_interval(mut self, interval: Duration) -> Self {
        self.health.interval = interval;
        self
    }

    /// Set the session age that triggers proactive refresh
    pub fn with_session_max_age(mut self, max_age: Duration) -> Self {
        self.health.session_max_age = max_age;
        self
    }

    /// Set the proxy URL
    pub fn with_proxy<S: Into<String>>(mut self, proxy: S) -> Self {
        self.transport.proxy = Some(proxy.into());
        self
    }

    /// Replace the session-failure markers
    pub fn with_session_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.session_markers = markers.into_iter().map(Into::into).collect();
        self
    }
}
