//! Configuration loading and typed config structures.
//!
//! The configuration lives in `tally-config.yaml`. Every section and field
//! has a default, so an empty file (or no file at all) yields a working
//! setup. A few environment variables override the file so containers can
//! be configured without editing it:
//!
//! - `TALLY_HOST` overrides `server.host`
//! - `TALLY_PORT` overrides `server.port`
//! - `TALLY_MAX_SUBSCRIBERS` overrides `stream.max_subscribers`

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::bridge::{BridgeOptions, MAX_KEEP_ALIVE};

/// Upper bound for `stream.write_buffer`.
pub const MAX_WRITE_BUFFER: usize = 1024;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// An environment override held a value of the wrong type.
    #[error("invalid value {value:?} for {var}: {reason}")]
    Env {
        /// The environment variable name.
        var: &'static str,
        /// The rejected value.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A setting is outside the range the server can run with.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending setting.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration, mirroring `tally-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TallyConfig {
    /// Listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Event stream settings.
    #[serde(default)]
    pub stream: StreamConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TallyConfig {
    /// Load configuration from a YAML file and apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if it is not valid YAML, or
    /// [`ConfigError::Env`] if an override does not parse, or
    /// [`ConfigError::Invalid`] if a setting is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, apply environment
    /// overrides, and validate the result.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        // serde_yml rejects an empty document for a struct; treat it as
        // "all defaults".
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.apply_env_overrides(|var| std::env::var(var).ok())?;
        config.stream.validate()?;
        Ok(config)
    }

    /// Apply overrides looked up through `lookup`.
    ///
    /// Takes the lookup as a parameter so tests need not touch the real
    /// process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        if let Some(host) = lookup("TALLY_HOST") {
            self.server.host = host;
        }
        if let Some(value) = lookup("TALLY_PORT") {
            self.server.port = value.trim().parse().map_err(|e| ConfigError::Env {
                var: "TALLY_PORT",
                value: value.clone(),
                reason: format!("{e}"),
            })?;
        }
        if let Some(value) = lookup("TALLY_MAX_SUBSCRIBERS") {
            self.stream.max_subscribers =
                value.trim().parse().map_err(|e| ConfigError::Env {
                    var: "TALLY_MAX_SUBSCRIBERS",
                    value: value.clone(),
                    reason: format!("{e}"),
                })?;
        }
        Ok(())
    }
}

/// Listener configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Event stream configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamConfig {
    /// Maximum concurrent stream connections (0 = unlimited).
    #[serde(default)]
    pub max_subscribers: usize,

    /// Seconds of idleness before a keep-alive comment is sent
    /// (0 = never).
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    /// Frames buffered between a connection's bridge and its socket.
    #[serde(default = "default_write_buffer")]
    pub write_buffer: usize,
}

impl StreamConfig {
    /// Check that every setting is within the range the server can run
    /// with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let max_keep_alive = MAX_KEEP_ALIVE.as_secs();
        if self.keep_alive_secs > max_keep_alive {
            return Err(ConfigError::Invalid {
                field: "stream.keep_alive_secs",
                reason: format!(
                    "{} exceeds the maximum of {max_keep_alive}",
                    self.keep_alive_secs
                ),
            });
        }
        if !(1..=MAX_WRITE_BUFFER).contains(&self.write_buffer) {
            return Err(ConfigError::Invalid {
                field: "stream.write_buffer",
                reason: format!(
                    "{} is outside 1..={MAX_WRITE_BUFFER}",
                    self.write_buffer
                ),
            });
        }
        Ok(())
    }

    /// Options for each connection's subscription bridge.
    pub const fn bridge_options(&self) -> BridgeOptions {
        BridgeOptions {
            keep_alive: if self.keep_alive_secs == 0 {
                None
            } else {
                Some(Duration::from_secs(self.keep_alive_secs))
            },
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_subscribers: 0,
            keep_alive_secs: default_keep_alive_secs(),
            write_buffer: default_write_buffer(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default log filter when `RUST_LOG` is unset
    /// (trace, debug, info, warn, error, or a full filter directive).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    String::from("0.0.0.0")
}

const fn default_port() -> u16 {
    3000
}

const fn default_keep_alive_secs() -> u64 {
    15
}

const fn default_write_buffer() -> usize {
    4
}

fn default_log_level() -> String {
    String::from("info")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn no_env(_: &'static str) -> Option<String> {
        None
    }

    #[test]
    fn defaults() {
        let config = TallyConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.stream.max_subscribers, 0);
        assert_eq!(config.stream.keep_alive_secs, 15);
        assert_eq!(config.stream.write_buffer, 4);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let yaml = "server:\n  port: 8081\nstream:\n  max_subscribers: 250\n";
        let mut config: TallyConfig = serde_yml::from_str(yaml).unwrap();
        config.apply_env_overrides(no_env).unwrap();

        assert_eq!(config.server.port, 8081);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.stream.max_subscribers, 250);
        assert_eq!(config.stream.keep_alive_secs, 15);
    }

    #[test]
    fn empty_document_is_default() {
        let config = TallyConfig::parse("  \n").unwrap();
        assert_eq!(config.stream, StreamConfig::default());
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn invalid_yaml_is_rejected() {
        let result: Result<TallyConfig, _> = serde_yml::from_str("server: [1, 2");
        assert!(result.is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = TallyConfig::default();
        config
            .apply_env_overrides(|var| match var {
                "TALLY_HOST" => Some(String::from("127.0.0.1")),
                "TALLY_PORT" => Some(String::from("9000")),
                "TALLY_MAX_SUBSCRIBERS" => Some(String::from("100")),
                _ => None,
            })
            .unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.stream.max_subscribers, 100);
    }

    #[test]
    fn bad_env_port_is_an_error() {
        let mut config = TallyConfig::default();
        let err = config
            .apply_env_overrides(|var| (var == "TALLY_PORT").then(|| String::from("http")))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: "TALLY_PORT", .. }));
    }

    #[test]
    fn default_stream_is_valid() {
        StreamConfig::default().validate().unwrap();
    }

    #[test]
    fn keep_alive_upper_bound() {
        let at_limit = StreamConfig {
            keep_alive_secs: MAX_KEEP_ALIVE.as_secs(),
            ..StreamConfig::default()
        };
        at_limit.validate().unwrap();

        let yaml = format!("stream:\n  keep_alive_secs: {}\n", u64::MAX);
        let err = TallyConfig::parse(&yaml).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "stream.keep_alive_secs",
                ..
            }
        ));
    }

    #[test]
    fn write_buffer_bounds() {
        for write_buffer in [1, MAX_WRITE_BUFFER] {
            let stream = StreamConfig {
                write_buffer,
                ..StreamConfig::default()
            };
            stream.validate().unwrap();
        }

        for write_buffer in [0, MAX_WRITE_BUFFER.saturating_add(1), usize::MAX] {
            let stream = StreamConfig {
                write_buffer,
                ..StreamConfig::default()
            };
            let err = stream.validate().unwrap_err();
            assert!(matches!(
                err,
                ConfigError::Invalid {
                    field: "stream.write_buffer",
                    ..
                }
            ));
        }

        let err = TallyConfig::parse("stream:\n  write_buffer: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn keep_alive_zero_disables() {
        let stream = StreamConfig {
            keep_alive_secs: 0,
            ..StreamConfig::default()
        };
        assert_eq!(stream.bridge_options().keep_alive, None);
        assert_eq!(
            StreamConfig::default().bridge_options().keep_alive,
            Some(Duration::from_secs(15))
        );
    }
}
