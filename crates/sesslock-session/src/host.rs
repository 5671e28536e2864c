//! Host request-lifecycle contract
//!
//! The coordinator never manages identifiers or client correlation itself; it
//! asks a [`SessionHost`] for them.

use sesslock_common::settings::DEFAULT_SESSION_NAME;
use sesslock_common::{Result, SessionError};

/// Session lifecycle owned by the embedding request framework
pub trait SessionHost: Send + Sync {
    /// Namespace of the session (e.g. the cookie name)
    fn session_name(&self) -> &str;

    /// Identifier of the current session, if one is assigned
    fn session_id(&self) -> Option<&str>;

    /// Whether a session has been started for the current request
    fn is_active(&self) -> bool;

    /// Start the session, assigning an identifier when none exists; returns it
    fn start(&mut self) -> Result<String>;

    /// Fresh candidate identifier; the current one is left untouched
    fn generate_id(&self) -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }

    /// Switch to `new_id`, clearing client-side correlation state
    fn regenerate_id(&mut self, new_id: &str) -> Result<()>;
}

/// Host with an explicitly supplied identifier and random rotation.
///
/// Suits command-line tools and tests, where there is no cookie to manage.
#[derive(Debug, Clone)]
pub struct StaticSessionHost {
    name: String,
    id: Option<String>,
    active: bool,
}

impl StaticSessionHost {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            active: false,
        }
    }

    pub fn with_id(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: Some(id.into()),
            active: false,
        }
    }

    /// Deactivate the session, keeping its identifier
    pub fn close(&mut self) {
        self.active = false;
    }
}

impl Default for StaticSessionHost {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_NAME)
    }
}

impl SessionHost for StaticSessionHost {
    fn session_name(&self) -> &str {
        &self.name
    }

    fn session_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn start(&mut self) -> Result<String> {
        if self.name.is_empty() {
            return Err(SessionError::invalid_argument(
                "session name must not be empty",
            ));
        }
        let id = match &self.id {
            Some(id) => id.clone(),
            None => {
                let id = self.generate_id();
                self.id = Some(id.clone());
                id
            }
        };
        self.active = true;
        Ok(id)
    }

    fn regenerate_id(&mut self, new_id: &str) -> Result<()> {
        if !self.active {
            return Err(SessionError::PreconditionFailed(
                "cannot rotate the identifier of an inactive session".to_string(),
            ));
        }
        if new_id.is_empty() {
            return Err(SessionError::invalid_argument(
                "session identifier must not be empty",
            ));
        }
        self.id = Some(new_id.to_string());
        Ok(())
    }
}
