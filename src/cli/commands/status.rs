//! cli::commands::status
//!
//! Wait for a CI status and print its terminal state.
//!
//! Exits non-zero when the state is anything other than `success` or
//! `skipped`, so the command can gate a shell pipeline.

use std::time::Duration;

use anyhow::{bail, Context as _, Result};

use super::{block_on, Context};
use crate::cli::args::RepoArgs;
use crate::forge::StatusState;

pub fn status(
    ctx: &Context,
    target: &RepoArgs,
    sha: &str,
    name: &str,
    timeout: Option<u64>,
    interval: Option<u64>,
) -> Result<()> {
    let config = ctx.registry.get_config(target.provider)?;
    let mut options = config.timeouts.status;
    if let Some(secs) = timeout {
        options.timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = interval {
        options.interval = Duration::from_secs(secs.max(1));
    }

    block_on(async {
        let client = ctx.client(target.provider)?;
        let state = client
            .commit_status_conclusion(&target.repo, sha, name, options)
            .await
            .with_context(|| format!("failed waiting for status '{}' on {}", name, sha))?;
        println!("{}", state);
        match state {
            StatusState::Success | StatusState::Skipped => Ok(()),
            other => bail!("status '{}' finished as {}", name, other),
        }
    })
}
