//! Session settings shared by the coordinator and the host adapter

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default session namespace
pub const DEFAULT_SESSION_NAME: &str = "SESSLOCK";

/// Default record lifetime in seconds
pub const DEFAULT_SESSION_TTL_SECONDS: u64 = 1440;

/// Default lock expiry in seconds
pub const DEFAULT_LOCK_TIMEOUT_SECONDS: u64 = 20;

/// Default number of acquire attempts before giving up
pub const DEFAULT_LOCK_MAX_ATTEMPTS: u32 = 10;

/// Default sleep between acquire attempts in milliseconds
pub const DEFAULT_LOCK_BACKOFF_MS: u64 = 500;

/// How a host adapter exposes session data to its callers.
///
/// The core never reads this; it is parsed and carried for the adapter layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrayCompat {
    /// Expose the session as an object proxying reads and writes
    Object,
    /// Populate a plain mapping from the record on start
    Populate,
}

impl ArrayCompat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArrayCompat::Object => "object",
            ArrayCompat::Populate => "populate",
        }
    }
}

impl std::fmt::Display for ArrayCompat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ArrayCompat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "object" => Ok(ArrayCompat::Object),
            "populate" => Ok(ArrayCompat::Populate),
            _ => Err(format!("Invalid session array compat mode: {}", s)),
        }
    }
}

/// Tunables of one session coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Namespace override; the host's own name is used when `None`
    pub session_name: Option<String>,
    /// Lifetime applied to a record on creation and on id rotation
    pub ttl: Duration,
    /// How far in the future a freshly acquired lock expires
    pub lock_timeout: Duration,
    /// Acquire attempts before reporting contention
    pub lock_max_attempts: u32,
    /// Fixed sleep between acquire attempts
    pub lock_backoff: Duration,
    pub array_compat: Option<ArrayCompat>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            session_name: None,
            ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECONDS),
            lock_timeout: Duration::from_secs(DEFAULT_LOCK_TIMEOUT_SECONDS),
            lock_max_attempts: DEFAULT_LOCK_MAX_ATTEMPTS,
            lock_backoff: Duration::from_millis(DEFAULT_LOCK_BACKOFF_MS),
            array_compat: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_compat_parse() {
        assert_eq!(
            "object".parse::<ArrayCompat>().unwrap(),
            ArrayCompat::Object
        );
        assert_eq!(
            "populate".parse::<ArrayCompat>().unwrap(),
            ArrayCompat::Populate
        );
        assert!("superglobal".parse::<ArrayCompat>().is_err());
        assert_eq!(ArrayCompat::Populate.to_string(), "populate");
    }

    #[test]
    fn test_default_settings() {
        let settings = SessionSettings::default();
        assert_eq!(settings.session_name, None);
        assert_eq!(settings.ttl, Duration::from_secs(1440));
        assert_eq!(settings.lock_timeout, Duration::from_secs(20));
        assert_eq!(settings.lock_max_attempts, 10);
        assert_eq!(settings.lock_backoff, Duration::from_millis(500));
        assert!(settings.array_compat.is_none());
    }
}
