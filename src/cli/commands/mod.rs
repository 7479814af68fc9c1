//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Async Commands
//!
//! Provider commands are async because they involve network I/O. Each
//! handler is a synchronous wrapper that runs its async implementation on
//! a fresh tokio runtime.

mod providers;
mod repo;
mod status;

pub use providers::providers;
pub use repo::{branch_exists, cleanup_webhooks, delete_branch, delete_repo, list_prs};
pub use status::status;

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context as _, Result};

use super::args::Command;
use crate::forge::{GitProvider, ScmClient};
use crate::registry::{Env, ProviderRegistry, RegistryError};

/// Everything a handler needs.
pub struct Context {
    pub registry: ProviderRegistry,
    pub env: Box<dyn Env>,
}

impl Context {
    /// Build the client for `provider` with the token from its variable.
    ///
    /// # Errors
    ///
    /// Fails if the provider is unregistered or its token variable is unset.
    pub fn client(&self, provider: GitProvider) -> Result<Arc<dyn ScmClient>> {
        let config = self.registry.get_config(provider)?;
        let token = self.env.get_or(&config.token_env, "");
        if token.is_empty() {
            return Err(RegistryError::MissingCredential {
                provider,
                var: config.token_env.clone(),
            }
            .into());
        }
        let client = config
            .build_client(&token)
            .with_context(|| format!("failed to create {} client", provider))?;
        Ok(client)
    }
}

/// Dispatch a parsed command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<()> {
    match command {
        Command::Providers { only } => providers(ctx, only.as_deref()),
        Command::BranchExists { target, branch } => branch_exists(ctx, &target, &branch),
        Command::DeleteBranch { target, branch } => delete_branch(ctx, &target, &branch),
        Command::ListPrs { target } => list_prs(ctx, &target),
        Command::CleanupWebhooks { target, host } => cleanup_webhooks(ctx, &target, &host),
        Command::DeleteRepo { target } => delete_repo(ctx, &target),
        Command::Status {
            target,
            sha,
            name,
            timeout,
            interval,
        } => status(ctx, &target, &sha, &name, timeout, interval),
    }
}

/// Run an async handler to completion.
fn block_on<F: Future<Output = Result<()>>>(future: F) -> Result<()> {
    let rt = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    rt.block_on(future)
}
