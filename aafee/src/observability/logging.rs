//! `tracing-subscriber` initialisation.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

/// Filter used when neither the config nor `RUST_LOG` gives one.
pub const DEFAULT_FILTER: &str = "aafee=info,warn";

/// How the process-wide subscriber is set up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directive string, e.g. `aafee=debug`. `RUST_LOG` takes precedence.
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Include the event target.
    pub with_target: bool,
    /// Write to stderr instead of stdout.
    pub stderr: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            json: false,
            with_target: true,
            stderr: false,
        }
    }
}

impl LoggingConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the filter directives.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Switches JSON output on or off.
    #[must_use]
    pub const fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    /// Shows or hides event targets.
    #[must_use]
    pub const fn with_target(mut self, with_target: bool) -> Self {
        self.with_target = with_target;
        self
    }

    /// Sends output to stderr, for processes whose stdout is a protocol
    /// channel.
    #[must_use]
    pub const fn with_stderr(mut self, stderr: bool) -> Self {
        self.stderr = stderr;
        self
    }

    /// Builds the filter, preferring `RUST_LOG` when it is set and valid.
    pub fn env_filter(&self) -> Result<EnvFilter, ConfigError> {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.filter))
            .map_err(|e| ConfigError::Logging(e.to_string()))
    }

    /// Installs the global subscriber.
    ///
    /// Fails if the filter is invalid or a subscriber is already installed.
    pub fn init(&self) -> Result<(), ConfigError> {
        let filter = self.env_filter()?;
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(self.with_target)
            .with_writer(if self.stderr {
                BoxMakeWriter::new(std::io::stderr)
            } else {
                BoxMakeWriter::new(std::io::stdout)
            });
        let result = if self.json {
            builder.json().try_init()
        } else {
            builder.try_init()
        };
        result.map_err(|e| ConfigError::Logging(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_serde_defaults() {
        let config = LoggingConfig::new().with_filter("aafee=debug").with_json(true);
        assert_eq!(config.filter, "aafee=debug");
        assert!(config.json);
        assert!(config.with_target);

        let parsed: LoggingConfig = serde_json::from_str(r#"{"json": true}"#).unwrap();
        assert_eq!(parsed.filter, DEFAULT_FILTER);
        assert!(parsed.json);
    }

    #[test]
    fn test_second_init_fails() {
        let config = LoggingConfig::new().with_filter("off");
        // Another test may have installed one already; either way the
        // second attempt must fail.
        let _ = config.init();
        assert!(matches!(config.init(), Err(ConfigError::Logging(_))));
    }
}
