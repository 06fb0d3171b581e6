//! Subscriber construction

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::{self, TestWriter};
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, Format, WriterConfig};
use crate::error::{LogError, LogResult};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Logger builder
#[derive(Debug)]
pub struct LoggerBuilder {
    config: Config,
}

impl LoggerBuilder {
    /// Create builder from config
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Parse the filter directive without installing anything
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Filter`] if the directive is invalid
    pub fn filter(&self) -> LogResult<EnvFilter> {
        EnvFilter::try_new(&self.config.level)
            .map_err(|e| LogError::Filter(format!("{}: {}", self.config.level, e)))
    }

    /// Build and install the global subscriber
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Filter string cannot be parsed
    /// - A global subscriber is already set
    pub fn build(self) -> LogResult<()> {
        let filter = self.filter()?;
        Registry::default()
            .with(self.fmt_layer())
            .with(filter)
            .try_init()
            .map_err(|e| LogError::AlreadyInitialized(e.to_string()))?;

        tracing::debug!(
            level = %self.config.level,
            format = ?self.config.format,
            "Logger initialized"
        );
        Ok(())
    }

    fn fmt_layer(&self) -> BoxedLayer {
        let display = &self.config.display;
        let writer = match self.config.writer {
            WriterConfig::Stderr => BoxMakeWriter::new(std::io::stderr),
            WriterConfig::Stdout => BoxMakeWriter::new(std::io::stdout),
            WriterConfig::Test => BoxMakeWriter::new(TestWriter::default()),
        };

        let base = fmt::layer()
            .with_writer(writer)
            .with_ansi(display.colors)
            .with_target(display.target)
            .with_file(display.source)
            .with_line_number(display.source)
            .with_thread_ids(display.thread_ids);

        match (self.config.format, display.time) {
            (Format::Pretty, true) => base.pretty().boxed(),
            (Format::Pretty, false) => base.pretty().without_time().boxed(),
            (Format::Compact, true) => base.compact().boxed(),
            (Format::Compact, false) => base.compact().without_time().boxed(),
            (Format::Json, true) => base.json().flatten_event(display.flatten).boxed(),
            (Format::Json, false) => base
                .json()
                .flatten_event(display.flatten)
                .without_time()
                .boxed(),
        }
    }
}

/// Install the global subscriber described by `config`
///
/// # Errors
///
/// See [`LoggerBuilder::build`]
pub fn init(config: Config) -> LogResult<()> {
    LoggerBuilder::from_config(config).build()
}

/// Install a subscriber from the environment, ignoring "already set"
///
/// Returns an error only when the environment holds an invalid filter.
///
/// # Errors
///
/// Returns [`LogError::Filter`] for an unparsable `TESSERA_LOG`/`RUST_LOG`
pub fn try_init_default() -> LogResult<()> {
    match init(Config::from_env()) {
        Ok(()) | Err(LogError::AlreadyInitialized(_)) => Ok(()),
        Err(err) => Err(err),
    }
}

/// Route logs into libtest's captured output; safe to call from every test
pub fn init_for_tests() {
    let _ = init(Config::test());
}
