//! Configuration management for the sesslock CLI
//!
//! Values are layered: built-in defaults, then the YAML file, then
//! `SESSLOCK_`-prefixed environment variables, then command-line flags.

use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::{Config, ConfigBuilder, Environment, builder::DefaultState};

use sesslock_backend::RedisBackend;
use sesslock_common::settings::{
    DEFAULT_LOCK_BACKOFF_MS, DEFAULT_LOCK_MAX_ATTEMPTS, DEFAULT_LOCK_TIMEOUT_SECONDS,
    DEFAULT_SESSION_NAME, DEFAULT_SESSION_TTL_SECONDS,
};
use sesslock_common::{ArrayCompat, SessionSettings};

pub const DEFAULT_CONFIG_FILE: &str = "conf/application.yml";
pub const ENV_PREFIX: &str = "SESSLOCK";

pub const DEFAULT_REDIS_HOST: &str = "127.0.0.1";
pub const DEFAULT_REDIS_PORT: u16 = 6379;
pub const DEFAULT_REDIS_DATABASE: i64 = 0;

pub const REDIS_HOST: &str = "redis_host";
pub const REDIS_PORT: &str = "redis_port";
pub const REDIS_DATABASE: &str = "redis_database";
pub const SESSION_NAME: &str = "session_name";
pub const SESSION_TTL: &str = "session_ttl";
pub const SESSION_ARRAY_COMPAT: &str = "session_array_compat";
pub const LOCK_TIMEOUT: &str = "lock_timeout";
pub const LOCK_MAX_ATTEMPTS: &str = "lock_max_attempts";
pub const LOCK_BACKOFF_MS: &str = "lock_backoff_ms";
pub const LOGFILE: &str = "logfile";
pub const DEBUG: &str = "debug";

/// Command line arguments
#[derive(Debug, Parser)]
#[command(
    name = "sesslock",
    version,
    about = "Inspect and edit sesslock sessions"
)]
pub struct Cli {
    /// Configuration file
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_FILE)]
    pub config_file: String,
    #[arg(long = "redis-host")]
    pub redis_host: Option<String>,
    #[arg(long = "redis-port")]
    pub redis_port: Option<u16>,
    #[arg(long = "redis-database")]
    pub redis_database: Option<i64>,
    #[arg(short = 'n', long = "session-name")]
    pub session_name: Option<String>,
    /// Session identifier; a new one is generated when omitted
    #[arg(short = 'i', long = "id")]
    pub session_id: Option<String>,
    #[arg(long = "logfile")]
    pub logfile: Option<String>,
    #[arg(short = 'd', long = "debug")]
    pub debug: bool,
    /// Use a process-local in-memory store instead of Redis
    #[arg(long = "memory")]
    pub memory: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Print the value at a path, or the whole session
    Get {
        #[arg(default_value = "")]
        path: String,
    },
    /// Set the value at a path; the value is parsed as JSON, else taken as a string
    Set {
        path: String,
        value: String,
        /// Write without taking the field lock
        #[arg(long = "no-lock")]
        no_lock: bool,
    },
    /// Remove the value at a path
    Delete {
        path: String,
        #[arg(long = "no-lock")]
        no_lock: bool,
    },
    /// Acquire a session-scoped lock, hold it, then release it
    Lock {
        name: String,
        /// Seconds to hold the lock before releasing
        #[arg(long = "hold", default_value_t = 0)]
        hold: u64,
    },
    /// Delete the session and report the replacement identifier
    Destroy,
}

/// Application configuration loaded from defaults, file, environment and flags
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    pub fn from_cli(cli: &Cli) -> anyhow::Result<Self> {
        let mut builder = defaults()?
            .add_source(config::File::with_name(&cli.config_file).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        if let Some(v) = &cli.redis_host {
            builder = builder.set_override(REDIS_HOST, v.as_str())?;
        }
        if let Some(v) = cli.redis_port {
            builder = builder.set_override(REDIS_PORT, i64::from(v))?;
        }
        if let Some(v) = cli.redis_database {
            builder = builder.set_override(REDIS_DATABASE, v)?;
        }
        if let Some(v) = &cli.session_name {
            builder = builder.set_override(SESSION_NAME, v.as_str())?;
        }
        if let Some(v) = &cli.logfile {
            builder = builder.set_override(LOGFILE, v.as_str())?;
        }
        if cli.debug {
            builder = builder.set_override(DEBUG, true)?;
        }

        let config = builder
            .build()
            .with_context(|| format!("failed to load configuration from {}", cli.config_file))?;
        Ok(Configuration { config })
    }

    // ========================================================================
    // Backend Configuration
    // ========================================================================

    pub fn redis_host(&self) -> String {
        self.config
            .get_string(REDIS_HOST)
            .unwrap_or(DEFAULT_REDIS_HOST.to_string())
    }

    pub fn redis_port(&self) -> u16 {
        self.config
            .get_int(REDIS_PORT)
            .ok()
            .and_then(|v| u16::try_from(v).ok())
            .unwrap_or(DEFAULT_REDIS_PORT)
    }

    pub fn redis_database(&self) -> i64 {
        self.config
            .get_int(REDIS_DATABASE)
            .unwrap_or(DEFAULT_REDIS_DATABASE)
    }

    pub fn redis_url(&self) -> String {
        RedisBackend::url(&self.redis_host(), self.redis_port(), self.redis_database())
    }

    // ========================================================================
    // Session Configuration
    // ========================================================================

    pub fn session_name(&self) -> Option<String> {
        self.config
            .get_string(SESSION_NAME)
            .ok()
            .filter(|v| !v.is_empty())
    }

    pub fn session_ttl_seconds(&self) -> u64 {
        self.get_u64(SESSION_TTL, DEFAULT_SESSION_TTL_SECONDS)
    }

    pub fn session_array_compat(&self) -> anyhow::Result<Option<ArrayCompat>> {
        match self.config.get_string(SESSION_ARRAY_COMPAT) {
            Ok(v) if v.is_empty() => Ok(None),
            Ok(v) => v.parse().map(Some).map_err(anyhow::Error::msg),
            Err(_) => Ok(None),
        }
    }

    pub fn lock_timeout_seconds(&self) -> u64 {
        self.get_u64(LOCK_TIMEOUT, DEFAULT_LOCK_TIMEOUT_SECONDS)
    }

    pub fn lock_max_attempts(&self) -> u32 {
        self.config
            .get_int(LOCK_MAX_ATTEMPTS)
            .ok()
            .and_then(|v| u32::try_from(v).ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_LOCK_MAX_ATTEMPTS)
    }

    pub fn lock_backoff_ms(&self) -> u64 {
        self.get_u64(LOCK_BACKOFF_MS, DEFAULT_LOCK_BACKOFF_MS)
    }

    /// Coordinator settings assembled from the session and lock keys
    pub fn settings(&self) -> anyhow::Result<SessionSettings> {
        Ok(SessionSettings {
            session_name: self.session_name(),
            ttl: Duration::from_secs(self.session_ttl_seconds()),
            lock_timeout: Duration::from_secs(self.lock_timeout_seconds()),
            lock_max_attempts: self.lock_max_attempts(),
            lock_backoff: Duration::from_millis(self.lock_backoff_ms()),
            array_compat: self.session_array_compat()?,
        })
    }

    // ========================================================================
    // Logging Configuration
    // ========================================================================

    pub fn logfile(&self) -> Option<String> {
        self.config
            .get_string(LOGFILE)
            .ok()
            .filter(|v| !v.is_empty())
    }

    pub fn debug(&self) -> bool {
        self.config.get_bool(DEBUG).unwrap_or(false)
    }

    fn get_u64(&self, key: &str, default: u64) -> u64 {
        self.config
            .get_int(key)
            .ok()
            .and_then(|v| u64::try_from(v).ok())
            .unwrap_or(default)
    }
}

fn defaults() -> anyhow::Result<ConfigBuilder<DefaultState>> {
    let builder = Config::builder()
        .set_default(REDIS_HOST, DEFAULT_REDIS_HOST)?
        .set_default(REDIS_PORT, i64::from(DEFAULT_REDIS_PORT))?
        .set_default(REDIS_DATABASE, DEFAULT_REDIS_DATABASE)?
        .set_default(SESSION_NAME, DEFAULT_SESSION_NAME)?
        .set_default(SESSION_TTL, DEFAULT_SESSION_TTL_SECONDS)?
        .set_default(LOCK_TIMEOUT, DEFAULT_LOCK_TIMEOUT_SECONDS)?
        .set_default(LOCK_MAX_ATTEMPTS, i64::from(DEFAULT_LOCK_MAX_ATTEMPTS))?
        .set_default(LOCK_BACKOFF_MS, DEFAULT_LOCK_BACKOFF_MS)?
        .set_default(DEBUG, false)?;
    Ok(builder)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["sesslock", "--config", "/nonexistent/sesslock.yml"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults_without_file() {
        let configuration = Configuration::from_cli(&parse(&["get"])).unwrap();

        assert_eq!(configuration.redis_url(), "redis://127.0.0.1:6379/0");
        assert_eq!(
            configuration.session_name().as_deref(),
            Some(DEFAULT_SESSION_NAME)
        );
        assert_eq!(configuration.logfile(), None);
        assert!(!configuration.debug());

        let settings = configuration.settings().unwrap();
        assert_eq!(settings.ttl, Duration::from_secs(1440));
        assert_eq!(settings.lock_timeout, Duration::from_secs(20));
        assert_eq!(settings.lock_max_attempts, 10);
        assert_eq!(settings.lock_backoff, Duration::from_millis(500));
        assert_eq!(settings.array_compat, None);
    }

    #[test]
    fn test_file_values_and_flag_overrides() {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        writeln!(
            file,
            "redis_host: cache.internal\nredis_port: 6380\nsession_name: APP\n\
             session_array_compat: populate\nlock_max_attempts: 3\nlock_backoff_ms: 50"
        )
        .unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let cli = Cli::try_parse_from([
            "sesslock",
            "--config",
            &path,
            "--redis-port",
            "7000",
            "--debug",
            "--logfile",
            "/tmp/sesslock.log",
            "get",
        ])
        .unwrap();
        let configuration = Configuration::from_cli(&cli).unwrap();

        assert_eq!(configuration.redis_host(), "cache.internal");
        assert_eq!(configuration.redis_port(), 7000);
        assert!(configuration.debug());
        assert_eq!(
            configuration.logfile().as_deref(),
            Some("/tmp/sesslock.log")
        );

        let settings = configuration.settings().unwrap();
        assert_eq!(settings.session_name.as_deref(), Some("APP"));
        assert_eq!(settings.array_compat, Some(ArrayCompat::Populate));
        assert_eq!(settings.lock_max_attempts, 3);
        assert_eq!(settings.lock_backoff, Duration::from_millis(50));
    }

    #[test]
    fn test_invalid_array_compat_is_rejected() {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        writeln!(file, "session_array_compat: superglobal").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let cli = Cli::try_parse_from(["sesslock", "--config", &path, "destroy"]).unwrap();
        let configuration = Configuration::from_cli(&cli).unwrap();
        assert!(configuration.settings().is_err());
    }

    #[test]
    fn test_subcommands() {
        assert_eq!(
            parse(&["get"]).command,
            Command::Get {
                path: String::new()
            }
        );
        assert_eq!(
            parse(&["set", "user.id", "42", "--no-lock"]).command,
            Command::Set {
                path: "user.id".to_string(),
                value: "42".to_string(),
                no_lock: true,
            }
        );
        assert_eq!(
            parse(&["lock", "checkout", "--hold", "5"]).command,
            Command::Lock {
                name: "checkout".to_string(),
                hold: 5,
            }
        );
        assert!(Cli::try_parse_from(["sesslock"]).is_err());
    }
}
