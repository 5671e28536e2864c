use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use sesslock_backend::{KvBackend, MemoryBackend, RedisBackend};
use sesslock_cli::{Cli, Configuration, LoggingConfig, init_logging, run};
use sesslock_common::SessionSettings;
use sesslock_consistency::LockService;
use sesslock_session::{SessionCoordinator, StaticSessionHost};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let configuration = Configuration::from_cli(&cli)?;

    let _logging_guard = init_logging(&LoggingConfig::from_config(
        configuration.logfile(),
        configuration.debug(),
    ))?;

    let settings = configuration.settings()?;

    let backend: Arc<dyn KvBackend> = if cli.memory {
        info!("Using in-memory backend");
        Arc::new(MemoryBackend::new())
    } else {
        Arc::new(RedisBackend::connect(&configuration.redis_url()).await?)
    };
    let locks = Arc::new(LockService::new(backend.clone()));

    let host = host_for(&cli, &settings);
    let mut session = SessionCoordinator::new(Box::new(host), backend, locks.clone(), settings);
    session.start().await?;
    if cli.session_id.is_none()
        && let Some(id) = session.session_id()
    {
        eprintln!("session id: {}", id);
    }

    let result = run(&cli.command, &mut session).await;

    let released = locks.shutdown().await;
    if released > 0 {
        warn!(released, "Released locks left held at exit");
    }

    let outcome = result?;
    if outcome.success {
        println!("{}", outcome.output);
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("{}", outcome.output);
        Ok(ExitCode::FAILURE)
    }
}

fn host_for(cli: &Cli, settings: &SessionSettings) -> StaticSessionHost {
    let name = settings
        .session_name
        .clone()
        .unwrap_or_else(|| sesslock_common::settings::DEFAULT_SESSION_NAME.to_string());
    match &cli.session_id {
        Some(id) => StaticSessionHost::with_id(name, id),
        None => StaticSessionHost::new(name),
    }
}
