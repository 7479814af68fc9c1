//! cli::commands::repo
//!
//! Single-operation repository commands.

use anyhow::{Context as _, Result};
use tracing::info;

use super::{block_on, Context};
use crate::cli::args::RepoArgs;
use crate::forge::IgnoreNotFound;

/// Print `true` or `false`.
pub fn branch_exists(ctx: &Context, target: &RepoArgs, branch: &str) -> Result<()> {
    block_on(async {
        let client = ctx.client(target.provider)?;
        let exists = client
            .branch_exists(&target.repo, branch)
            .await
            .with_context(|| format!("failed to check branch '{}'", branch))?;
        println!("{}", exists);
        Ok(())
    })
}

pub fn delete_branch(ctx: &Context, target: &RepoArgs, branch: &str) -> Result<()> {
    block_on(async {
        let client = ctx.client(target.provider)?;
        let deleted = client
            .delete_branch(&target.repo, branch)
            .await
            .ignore_not_found()
            .with_context(|| format!("failed to delete branch '{}'", branch))?;
        match deleted {
            Some(()) => println!("Deleted branch '{}'.", branch),
            None => println!("Branch '{}' does not exist.", branch),
        }
        Ok(())
    })
}

/// One line per open pull request: number, source -> target, head SHA.
pub fn list_prs(ctx: &Context, target: &RepoArgs) -> Result<()> {
    block_on(async {
        let client = ctx.client(target.provider)?;
        let mut prs = client
            .list_pull_requests(&target.repo)
            .await
            .context("failed to list pull requests")?;
        prs.sort_by_key(|pr| pr.number);
        for pr in &prs {
            println!(
                "#{:<5} {} -> {} {}",
                pr.number, pr.source_branch, pr.target_branch, pr.head_sha
            );
        }
        info!(count = prs.len(), "listed pull requests");
        Ok(())
    })
}

pub fn cleanup_webhooks(ctx: &Context, target: &RepoArgs, host: &str) -> Result<()> {
    block_on(async {
        let client = ctx.client(target.provider)?;
        client
            .cleanup_webhooks(&target.repo, host)
            .await
            .context("failed to clean up webhooks")?;
        Ok(())
    })
}

pub fn delete_repo(ctx: &Context, target: &RepoArgs) -> Result<()> {
    block_on(async {
        let client = ctx.client(target.provider)?;
        let deleted = client
            .delete_repository_if_exists(&target.repo)
            .await
            .with_context(|| format!("failed to delete repository '{}'", target.repo))?;
        if deleted {
            println!("Deleted repository '{}'.", target.repo);
        } else {
            println!("Repository '{}' does not exist.", target.repo);
        }
        Ok(())
    })
}
