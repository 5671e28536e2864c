//! sesslock CLI - configuration, logging and subcommands of the `sesslock` binary

pub mod commands;
pub mod config;
pub mod logging;

pub use commands::{Outcome, parse_value, run};
pub use config::{Cli, Command, Configuration};
pub use logging::{LoggingConfig, LoggingGuard, init_logging};
