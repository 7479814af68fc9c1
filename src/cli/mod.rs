//! cli
//!
//! Command-line interface for forgeops.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Install logging
//! - Load settings, build the provider registry and dispatch
//!
//! # Architecture
//!
//! The CLI layer is thin. Every command resolves its provider through
//! [`crate::registry`] and calls one `ScmClient` operation. Results go to
//! stdout; logs go to stderr.

pub mod args;
pub mod commands;

pub use args::Cli;

use anyhow::{Context as _, Result};
use tracing_subscriber::EnvFilter;

use crate::config::Settings;
use crate::registry::{build_registry, ProcessEnv};

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<()> {
    let cli = Cli::parse_args();
    init_tracing(cli.debug);

    let env = ProcessEnv;
    let loaded = Settings::load(&env, cli.config.as_deref()).context("failed to load settings")?;
    let ctx = commands::Context {
        registry: build_registry(&loaded.settings)?,
        env: Box::new(env),
    };

    commands::dispatch(cli.command, &ctx)
}

/// Log to stderr. `RUST_LOG` wins unless `--debug` is given.
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("forgeops=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("forgeops=info"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
