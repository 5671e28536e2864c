//! Logging setup for the sesslock CLI
//!
//! Console output always goes to stderr so command results on stdout stay
//! clean. When a log file is configured, events are also written to it
//! through a non-blocking appender.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

/// Logging configuration for the CLI.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Optional log file; its directory is created when missing
    pub logfile: Option<PathBuf>,
    /// Default level when `RUST_LOG` is unset
    pub level: Level,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            logfile: None,
            level: Level::WARN,
        }
    }
}

impl LoggingConfig {
    /// Create from application configuration; `debug` lowers the level to DEBUG.
    pub fn from_config(logfile: Option<String>, debug: bool) -> Self {
        Self {
            logfile: logfile.map(PathBuf::from),
            level: if debug { Level::DEBUG } else { Level::WARN },
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level.to_string()))
    }
}

/// Guard that keeps the file appender alive.
///
/// Buffered log output is flushed when it is dropped.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize the global subscriber with a console layer and an optional file layer.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<LoggingGuard> {
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(config.filter());
    layers.push(Box::new(console_layer));

    let mut file_guard = None;
    if let Some(logfile) = &config.logfile {
        let (dir, file_name) = split_logfile(logfile)?;
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create log directory {}", dir.display()))?;

        let appender = RollingFileAppender::new(Rotation::NEVER, &dir, file_name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        file_guard = Some(guard);

        let file_layer = fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_thread_names(true)
            .with_ansi(false)
            .with_filter(config.filter());
        layers.push(Box::new(file_layer));
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    if let Some(logfile) = &config.logfile {
        tracing::debug!(logfile = %logfile.display(), "File logging initialized");
    }

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

fn split_logfile(logfile: &Path) -> anyhow::Result<(PathBuf, String)> {
    let file_name = logfile
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("invalid log file path {}", logfile.display()))?
        .to_string();
    let dir = match logfile.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, file_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let config = LoggingConfig::from_config(None, false);
        assert!(config.logfile.is_none());
        assert_eq!(config.level, Level::WARN);

        let config = LoggingConfig::from_config(Some("logs/sesslock.log".to_string()), true);
        assert_eq!(config.logfile, Some(PathBuf::from("logs/sesslock.log")));
        assert_eq!(config.level, Level::DEBUG);
    }

    #[test]
    fn test_split_logfile() {
        let (dir, name) = split_logfile(Path::new("/var/log/sesslock.log")).unwrap();
        assert_eq!(dir, PathBuf::from("/var/log"));
        assert_eq!(name, "sesslock.log");

        let (dir, name) = split_logfile(Path::new("sesslock.log")).unwrap();
        assert_eq!(dir, PathBuf::from("."));
        assert_eq!(name, "sesslock.log");

        assert!(split_logfile(Path::new("/")).is_err());
    }
}
