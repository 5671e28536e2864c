//! Subcommand execution against one session

use std::time::Duration;

use serde_json::Value;
use tracing::info;

use sesslock_session::SessionCoordinator;

use crate::config::Command;

/// Result of one subcommand: what to print and whether it succeeded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub output: String,
    pub success: bool,
}

impl Outcome {
    fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: true,
        }
    }

    fn failed(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: false,
        }
    }
}

/// JSON when the input parses as JSON, otherwise the raw string
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Run `command` on a started session
pub async fn run(command: &Command, session: &mut SessionCoordinator) -> anyhow::Result<Outcome> {
    match command {
        Command::Get { path } => match session.read(path, false, true).await? {
            Some(value) => Ok(Outcome::ok(serde_json::to_string_pretty(&value)?)),
            None => Ok(Outcome::failed(format!("{}: not set", display_path(path)))),
        },
        Command::Set {
            path,
            value,
            no_lock,
        } => {
            if session.write(path, parse_value(value), !no_lock).await? {
                Ok(Outcome::ok("OK"))
            } else {
                Ok(Outcome::failed(format!("{}: field is locked", path)))
            }
        }
        Command::Delete { path, no_lock } => {
            if session.delete(path, !no_lock).await? {
                Ok(Outcome::ok("OK"))
            } else {
                Ok(Outcome::failed(format!("{}: field is locked", path)))
            }
        }
        Command::Lock { name, hold } => {
            if !session.lock(name).await? {
                return Ok(Outcome::failed(format!("{}: lock is held elsewhere", name)));
            }
            info!(lock = %name, hold_secs = hold, "Holding session lock");
            if *hold > 0 {
                tokio::time::sleep(Duration::from_secs(*hold)).await;
            }
            if session.unlock(name).await? {
                Ok(Outcome::ok("OK"))
            } else {
                Ok(Outcome::failed(format!("{}: lock expired", name)))
            }
        }
        Command::Destroy => {
            let id = session.destroy().await?;
            Ok(Outcome::ok(id))
        }
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() { "<session>" } else { path }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use sesslock_backend::MemoryBackend;
    use sesslock_common::SessionSettings;
    use sesslock_consistency::LockService;
    use sesslock_session::StaticSessionHost;

    use super::*;

    async fn session(backend: &Arc<MemoryBackend>, owner: &str) -> SessionCoordinator {
        let mut session = SessionCoordinator::new(
            Box::new(StaticSessionHost::with_id("APP", "sid")),
            backend.clone(),
            Arc::new(LockService::with_owner(backend.clone(), owner)),
            SessionSettings {
                lock_max_attempts: 1,
                lock_backoff: Duration::from_millis(10),
                ..Default::default()
            },
        );
        session.start().await.unwrap();
        session
    }

    fn set(path: &str, value: &str) -> Command {
        Command::Set {
            path: path.to_string(),
            value: value.to_string(),
            no_lock: false,
        }
    }

    fn get(path: &str) -> Command {
        Command::Get {
            path: path.to_string(),
        }
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("42"), json!(42));
        assert_eq!(parse_value("{\"a\":[1]}"), json!({"a": [1]}));
        assert_eq!(parse_value("Alice"), json!("Alice"));
        assert_eq!(parse_value("\"quoted\""), json!("quoted"));
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let backend = Arc::new(MemoryBackend::new());
        let mut session = session(&backend, "a").await;

        let outcome = run(&set("profile.name", "Alice"), &mut session)
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::ok("OK"));
        let outcome = run(&get("profile.name"), &mut session).await.unwrap();
        assert_eq!(outcome.output, "\"Alice\"");

        let delete = Command::Delete {
            path: "profile.name".to_string(),
            no_lock: false,
        };
        assert!(run(&delete, &mut session).await.unwrap().success);
        assert!(!run(&get("profile"), &mut session).await.unwrap().success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_reports_contention() {
        let backend = Arc::new(MemoryBackend::new());
        let mut holder = session(&backend, "a").await;
        let mut other = session(&backend, "b").await;
        assert!(holder.lock("checkout").await.unwrap());

        let lock = Command::Lock {
            name: "checkout".to_string(),
            hold: 0,
        };
        assert!(!run(&lock, &mut other).await.unwrap().success);

        holder.unlock("checkout").await.unwrap();
        assert!(run(&lock, &mut other).await.unwrap().success);
    }

    #[tokio::test]
    async fn test_destroy_prints_new_id() {
        let backend = Arc::new(MemoryBackend::new());
        let mut session = session(&backend, "a").await;
        run(&set("a", "1"), &mut session).await.unwrap();

        let outcome = run(&Command::Destroy, &mut session).await.unwrap();
        assert!(outcome.success);
        assert_ne!(outcome.output, "sid");
        assert_eq!(session.session_id(), Some(outcome.output.as_str()));
    }
}
