//! cli::commands::providers
//!
//! List registered providers.
//!
//! # Example
//!
//! ```bash
//! $ E2E_GIT_PROVIDERS=gl forgeops providers
//!   gh  github   redhat-appstudio-qe  GITHUB_TOKEN
//! * gl  gitlab   konflux-qe           GITLAB_BOT_TOKEN
//!   fj  forgejo  konflux-qe           FORGEJO_BOT_TOKEN
//! ```

use anyhow::Result;

use super::Context;
use crate::registry::PROVIDERS_ENV;

/// Print every registered provider, marking the enabled ones with `*`.
///
/// `only` replaces the `E2E_GIT_PROVIDERS` allow-list.
pub fn providers(ctx: &Context, only: Option<&str>) -> Result<()> {
    let from_env = ctx.env.var(PROVIDERS_ENV);
    let allow_list = only.or(from_env.as_deref());
    let enabled = ctx.registry.enabled(allow_list);

    for config in ctx.registry.registered() {
        let marker = if enabled.iter().any(|c| c.provider == config.provider) {
            '*'
        } else {
            ' '
        };
        println!(
            "{} {:<3} {:<8} {:<20} {}",
            marker,
            config.prefix(),
            config.provider.label(),
            config.org,
            config.token_env
        );
    }
    Ok(())
}
