//! Lock record data model

use std::time::Duration;

use sesslock_common::SessionSettings;
use sesslock_common::settings::{
    DEFAULT_LOCK_BACKOFF_MS, DEFAULT_LOCK_MAX_ATTEMPTS, DEFAULT_LOCK_TIMEOUT_SECONDS,
};

/// Separator between expiry and owner in a stored lock value
pub const LOCK_VALUE_SEPARATOR: char = '-';

/// Slack added to every lock expiry, in seconds
pub const EXPIRY_SLACK_SECONDS: i64 = 1;

/// Decoded value of a lock key: `"<expiryEpochSeconds>-<owner>"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockValue {
    /// Expiry timestamp (Unix seconds)
    pub expires_at: i64,
    /// Identity of the holding process
    pub owner: String,
}

impl LockValue {
    pub fn new(expires_at: i64, owner: impl Into<String>) -> Self {
        Self {
            expires_at,
            owner: owner.into(),
        }
    }

    /// Value for a lock taken at `now` that should last `timeout`
    pub fn expiring_after(now: i64, timeout: Duration, owner: impl Into<String>) -> Self {
        let secs = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
        let secs = i64::try_from(secs).unwrap_or(i64::MAX / 2);
        let expires_at = now.saturating_add(secs.saturating_add(EXPIRY_SLACK_SECONDS));
        Self::new(expires_at, owner)
    }

    pub fn encode(&self) -> String {
        format!("{}{}{}", self.expires_at, LOCK_VALUE_SEPARATOR, self.owner)
    }

    /// Parse a stored value; `None` when it is not `<integer>-<owner>`.
    ///
    /// The owner may itself contain the separator, only the first one splits.
    pub fn parse(raw: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(raw).ok()?;
        let (expiry, owner) = text.split_once(LOCK_VALUE_SEPARATOR)?;
        let expires_at = expiry.parse::<i64>().ok()?;
        Some(Self::new(expires_at, owner))
    }

    /// Whether the expiry has passed at `now`
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at < now
    }

    pub fn is_owned_by(&self, owner: &str) -> bool {
        self.owner == owner
    }
}

/// Parameters of one acquire call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    /// How far in the future the lock expires; does not bound the wait
    pub timeout: Duration,
    /// Attempts before reporting contention
    pub max_attempts: u32,
    /// Fixed sleep after each failed attempt
    pub backoff: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_LOCK_TIMEOUT_SECONDS),
            max_attempts: DEFAULT_LOCK_MAX_ATTEMPTS,
            backoff: Duration::from_millis(DEFAULT_LOCK_BACKOFF_MS),
        }
    }
}

impl From<&SessionSettings> for LockOptions {
    fn from(settings: &SessionSettings) -> Self {
        Self {
            timeout: settings.lock_timeout,
            max_attempts: settings.lock_max_attempts,
            backoff: settings.lock_backoff,
        }
    }
}

/// Lock statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockStats {
    /// Locks currently recorded as held by this service
    pub held_locks: usize,
    /// Successful acquisitions, steals included
    pub total_acquisitions: u64,
    /// Acquisitions that reclaimed an expired lock
    pub stolen_locks: u64,
    /// Acquire calls that exhausted their attempts
    pub failed_acquisitions: u64,
    pub total_releases: u64,
    /// Releases refused because the lock expired or changed owner
    pub refused_releases: u64,
}
