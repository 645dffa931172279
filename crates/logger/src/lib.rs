//! Tracing setup for the substrate's binaries.
//!
//! Every crate in this workspace logs through the `tracing` facade directly;
//! this crate only owns turning that into output, the way the binary used to
//! do it inline with `tracing_subscriber::fmt().with_env_filter(...).init()`.
//! The difference here is a configurable destination (stderr or a rolling
//! file) and a guard the caller must hold for the process lifetime.

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

/// Errors from setting up tracing.
#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    /// A global subscriber was already installed (e.g. `init` called twice).
    #[error("a tracing subscriber is already installed")]
    AlreadyInitialized,
}

/// Where log output goes.
#[derive(Debug, Clone)]
pub enum LogDestination {
    /// Human-readable lines on stderr.
    Stderr,
    /// A daily-rolling file under `directory`, named with `prefix`.
    RollingFile {
        /// Directory the rolling appender creates files in.
        directory: PathBuf,
        /// Filename prefix; the appender appends a date suffix.
        prefix: String,
    },
}

/// Runtime configuration for [`init`].
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Where output goes.
    pub destination: LogDestination,
    /// Filter directive used when `RUST_LOG` is unset, e.g. `"info"` or
    /// `"geneva_broker=debug,info"`.
    pub default_filter: String,
}

/// Builder for [`LoggerConfig`].
#[derive(Debug)]
pub struct LoggerConfigBuilder {
    destination: LogDestination,
    default_filter: String,
}

impl LoggerConfig {
    /// Create a builder. Defaults: stderr destination, `default_filter = "info"`.
    #[must_use]
    pub fn builder() -> LoggerConfigBuilder {
        LoggerConfigBuilder {
            destination: LogDestination::Stderr,
            default_filter: "info".to_owned(),
        }
    }
}

impl LoggerConfigBuilder {
    /// Route output to a daily-rolling file instead of stderr.
    #[must_use]
    pub fn rolling_file(mut self, directory: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        self.destination = LogDestination::RollingFile {
            directory: directory.into(),
            prefix: prefix.into(),
        };
        self
    }

    /// Override the default filter directive used when `RUST_LOG` is unset.
    #[must_use]
    pub fn default_filter(mut self, filter: impl Into<String>) -> Self {
        self.default_filter = filter.into();
        self
    }

    /// Finalize the configuration.
    #[must_use]
    pub fn build(self) -> LoggerConfig {
        LoggerConfig {
            destination: self.destination,
            default_filter: self.default_filter,
        }
    }
}

/// Holds resources `init` allocated (currently just the non-blocking file
/// writer's flush thread, when logging to a file). Drop it only at process
/// exit -- dropping it early silently stops log output.
#[derive(Debug)]
pub struct LoggerGuard {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Install a global `tracing` subscriber per `config`.
///
/// `RUST_LOG` overrides `config.default_filter` when set, following the same
/// convention the source binary used inline before this crate existed.
///
/// # Errors
///
/// [`LoggerError::AlreadyInitialized`] if a global subscriber is already set.
pub fn init(config: LoggerConfig) -> Result<LoggerGuard, LoggerError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.default_filter));

    match config.destination {
        LogDestination::Stderr => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init()
                .map_err(|_| LoggerError::AlreadyInitialized)?;
            Ok(LoggerGuard { _file_guard: None })
        }
        LogDestination::RollingFile { directory, prefix } => {
            let appender = tracing_appender::rolling::daily(directory, prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .try_init()
                .map_err(|_| LoggerError::AlreadyInitialized)?;
            Ok(LoggerGuard {
                _file_guard: Some(guard),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{LogDestination, LoggerConfig};

    #[test]
    fn builder_defaults_to_stderr_and_info() {
        let config = LoggerConfig::builder().build();
        assert!(matches!(config.destination, LogDestination::Stderr));
        assert_eq!(config.default_filter, "info");
    }

    #[test]
    fn rolling_file_overrides_destination() {
        let config = LoggerConfig::builder()
            .rolling_file("/tmp/geneva-logs", "geneva")
            .build();
        assert!(matches!(config.destination, LogDestination::RollingFile { .. }));
    }

    // `init` itself is not exercised here: installing a global subscriber
    // is process-wide and would race with every other test in this binary.
}
