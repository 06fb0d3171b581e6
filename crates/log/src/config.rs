//! Logger configuration and presets

use serde::{Deserialize, Serialize};

/// Environment variable holding the filter directive
pub const ENV_LOG: &str = "TESSERA_LOG";
/// Fallback filter variable
pub const ENV_RUST_LOG: &str = "RUST_LOG";
/// Environment variable selecting the output format
pub const ENV_LOG_FORMAT: &str = "TESSERA_LOG_FORMAT";

/// Output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Multi-line, human oriented
    Pretty,
    /// Single line per event
    #[default]
    Compact,
    /// One JSON object per event
    Json,
}

impl Format {
    /// Parse a format name, falling back to [`Format::Compact`]
    #[must_use]
    pub fn parse_lossy(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "pretty" => Self::Pretty,
            "json" => Self::Json,
            _ => Self::Compact,
        }
    }
}

/// Where formatted events go
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriterConfig {
    /// Standard error
    #[default]
    Stderr,
    /// Standard output
    Stdout,
    /// libtest's captured output
    Test,
}

/// What each event line shows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub time: bool,
    pub target: bool,
    pub source: bool,
    pub thread_ids: bool,
    pub colors: bool,
    /// Lift event fields to the top level of JSON output
    pub flatten: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            time: true,
            target: true,
            source: false,
            thread_ids: false,
            colors: true,
            flatten: false,
        }
    }
}

/// Logger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `EnvFilter` directive, e.g. `info` or `tessera_pool=debug,warn`
    pub level: String,
    pub format: Format,
    pub writer: WriterConfig,
    pub display: DisplayConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: Format::default(),
            writer: WriterConfig::default(),
            display: DisplayConfig::default(),
        }
    }
}

impl Config {
    /// Create configuration from environment variables
    ///
    /// `TESSERA_LOG` wins over `RUST_LOG`; `TESSERA_LOG_FORMAT` picks the
    /// format.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit lookup
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(level) = lookup(ENV_LOG).or_else(|| lookup(ENV_RUST_LOG)) {
            if !level.trim().is_empty() {
                config.level = level;
            }
        }

        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            config.format = Format::parse_lossy(&format);
            if config.format == Format::Json {
                config.display.colors = false;
                config.display.flatten = true;
            }
        }

        config
    }

    /// Development configuration (pretty, debug level)
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            format: Format::Pretty,
            display: DisplayConfig {
                colors: true,
                source: true,
                ..DisplayConfig::default()
            },
            ..Self::default()
        }
    }

    /// Production configuration (JSON, info level)
    #[must_use]
    pub fn production() -> Self {
        Self {
            level: "info".to_string(),
            format: Format::Json,
            display: DisplayConfig {
                colors: false,
                source: false,
                flatten: true,
                ..DisplayConfig::default()
            },
            ..Self::default()
        }
    }

    /// Test configuration (captured by libtest)
    #[must_use]
    pub fn test() -> Self {
        Self {
            level: "debug".to_string(),
            format: Format::Compact,
            writer: WriterConfig::Test,
            display: DisplayConfig {
                colors: false,
                time: false,
                ..DisplayConfig::default()
            },
        }
    }

    /// Replace the filter directive
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(Config::from_lookup(lookup(&[])), Config::default());
    }

    #[test]
    fn tessera_log_wins_over_rust_log() {
        let config =
            Config::from_lookup(lookup(&[(ENV_LOG, "trace"), (ENV_RUST_LOG, "warn")]));
        assert_eq!(config.level, "trace");

        let config = Config::from_lookup(lookup(&[(ENV_RUST_LOG, "warn")]));
        assert_eq!(config.level, "warn");
    }

    #[test]
    fn blank_level_is_ignored() {
        let config = Config::from_lookup(lookup(&[(ENV_LOG, "  ")]));
        assert_eq!(config.level, "info");
    }

    #[rstest]
    #[case("pretty", Format::Pretty)]
    #[case("JSON", Format::Json)]
    #[case("compact", Format::Compact)]
    #[case("logfmt", Format::Compact)]
    fn format_names(#[case] raw: &str, #[case] expected: Format) {
        assert_eq!(Format::parse_lossy(raw), expected);
    }

    #[test]
    fn json_from_env_disables_colors() {
        let config = Config::from_lookup(lookup(&[(ENV_LOG_FORMAT, "json")]));
        assert_eq!(config.format, Format::Json);
        assert!(!config.display.colors);
        assert!(config.display.flatten);
    }

    #[test]
    fn presets() {
        assert_eq!(Config::development().format, Format::Pretty);
        assert_eq!(Config::production().format, Format::Json);
        assert_eq!(Config::test().writer, WriterConfig::Test);
        assert_eq!(Config::test().with_level("trace").level, "trace");
    }

    #[test]
    fn deserializes_partial_config() {
        let config: Config =
            serde_json::from_str(r#"{"level":"debug","format":"json"}"#).expect("valid json");
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, Format::Json);
        assert_eq!(config.writer, WriterConfig::Stderr);
    }
}
