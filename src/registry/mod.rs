//! registry
//!
//! Provider selection, credentials and per-run repository setup.
//!
//! # Design
//!
//! The registry is an ordinary value built once by [`build_registry`] and
//! passed to whatever needs it. Registration order is fixed (GitHub,
//! GitLab, Forgejo) and the table is never mutated after it is built.
//!
//! # Provider Selection
//!
//! `E2E_GIT_PROVIDERS` holds a comma-separated allow-list of provider
//! prefixes (`gh`, `gl`, `fj`; labels such as `github` also work):
//!
//! - unset or empty: every registered provider is enabled
//! - `gh,gl`: GitHub and GitLab only
//! - nothing matches (a typo, say): every registered provider is enabled,
//!   so a suite is never skipped silently
//!
//! # Example
//!
//! ```
//! use forgeops::config::Settings;
//! use forgeops::forge::GitProvider;
//! use forgeops::registry::build_registry;
//!
//! let registry = build_registry(&Settings::default()).unwrap();
//! let enabled: Vec<_> = registry.enabled(Some("gl")).iter().map(|c| c.provider).collect();
//! assert_eq!(enabled, vec![GitProvider::GitLab]);
//!
//! // A typo enables everything rather than nothing.
//! assert_eq!(registry.enabled(Some("gitbucket")).len(), 3);
//! ```

mod env;
mod setup;

pub use env::{Env, MapEnv, ProcessEnv};
pub use setup::{random_suffix, setup_provider, setup_with_client, BuildSecretProvisioner, ProviderSetup};

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::config::{ProviderSettings, Settings};
use crate::forge::forgejo::ForgejoClient;
use crate::forge::github::GitHubClient;
use crate::forge::gitlab::GitLabClient;
use crate::forge::{GitProvider, RepoRef, ScmClient, ScmError};
use crate::wait::Timeouts;

/// Environment variable holding the provider allow-list.
pub const PROVIDERS_ENV: &str = "E2E_GIT_PROVIDERS";

/// Repository forked for each run unless configured otherwise.
pub const DEFAULT_SOURCE_REPO: &str = "devfile-sample-hello-world";

/// GitLab imports are slow; forks get this long to finish by default.
const GITLAB_FORK_READY: Duration = Duration::from_secs(20 * 60);

/// Errors from provider lookup and setup.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("git provider {0} is not registered")]
    NotRegistered(GitProvider),

    #[error("git provider {0} is already registered")]
    Duplicate(GitProvider),

    #[error("{provider} token environment variable {var} is not set")]
    MissingCredential { provider: GitProvider, var: String },

    #[error("failed to set up build secret '{secret}' for {provider}: {message}")]
    SecretSetup {
        provider: GitProvider,
        secret: String,
        message: String,
    },

    #[error(transparent)]
    Scm(#[from] ScmError),
}

/// Everything needed to talk to one provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub provider: GitProvider,
    /// REST API root.
    pub api_base: String,
    /// Web root for repository URLs.
    pub web_base: String,
    /// Organization or group owning the test repositories.
    pub org: String,
    /// Repository forked for each run; bare names live in `org`.
    pub source_repo: String,
    /// Environment variable holding the API token.
    pub token_env: String,
    /// Build secret provisioned before forking, if the provider needs one.
    pub secret_name: Option<String>,
    pub timeouts: Timeouts,
}

impl ProviderConfig {
    /// Short prefix, e.g. `"gh"`.
    pub fn prefix(&self) -> &'static str {
        self.provider.prefix()
    }

    /// Full path of the source repository.
    pub fn source_repo_path(&self) -> String {
        RepoRef::parse(&self.source_repo, &self.org).full_path()
    }

    /// Name of a fresh fork target: the source's base name plus `-suffix`.
    ///
    /// GitLab targets are group-qualified paths; other providers use a bare
    /// name inside `org`.
    pub fn target_repo_name(&self, suffix: &str) -> String {
        let base = RepoRef::parse(&self.source_repo, &self.org).name;
        let name = format!("{}-{}", base, suffix);
        match self.provider {
            GitProvider::GitLab => format!("{}/{}", self.org, name),
            GitProvider::GitHub | GitProvider::Forgejo => name,
        }
    }

    /// Web URL of a repository produced by [`Self::target_repo_name`].
    pub fn target_repo_url(&self, target_repo_name: &str) -> String {
        let web = self.web_base.trim_end_matches('/');
        if target_repo_name.contains('/') {
            format!("{}/{}", web, target_repo_name)
        } else {
            format!("{}/{}/{}", web, self.org, target_repo_name)
        }
    }

    /// Construct the adapter for this provider.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the API base or token cannot be used.
    pub fn build_client(&self, token: &str) -> Result<Arc<dyn ScmClient>, ScmError> {
        let client: Arc<dyn ScmClient> = match self.provider {
            GitProvider::GitHub => Arc::new(
                GitHubClient::with_api_base(token, &self.org, &self.api_base)?
                    .with_timeouts(self.timeouts),
            ),
            GitProvider::GitLab => Arc::new(
                GitLabClient::with_api_base(token, &self.org, &self.api_base)?
                    .with_timeouts(self.timeouts),
            ),
            GitProvider::Forgejo => Arc::new(
                ForgejoClient::with_api_base(token, &self.org, &self.api_base)?
                    .with_timeouts(self.timeouts),
            ),
        };
        Ok(client)
    }
}

/// Registered providers, in registration order.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    configs: Vec<ProviderConfig>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider.
    ///
    /// # Errors
    ///
    /// `Duplicate` if the provider is already registered.
    pub fn register(&mut self, config: ProviderConfig) -> Result<(), RegistryError> {
        if self.configs.iter().any(|c| c.provider == config.provider) {
            return Err(RegistryError::Duplicate(config.provider));
        }
        self.configs.push(config);
        Ok(())
    }

    /// # Errors
    ///
    /// `NotRegistered` if the provider was never registered.
    pub fn get_config(&self, provider: GitProvider) -> Result<&ProviderConfig, RegistryError> {
        self.configs
            .iter()
            .find(|c| c.provider == provider)
            .ok_or(RegistryError::NotRegistered(provider))
    }

    /// Every registered provider, in registration order.
    pub fn registered(&self) -> &[ProviderConfig] {
        &self.configs
    }

    /// Providers selected by `allow_list`, falling back to all of them when
    /// the list is absent, empty, or matches nothing.
    pub fn enabled(&self, allow_list: Option<&str>) -> Vec<&ProviderConfig> {
        let Some(wanted) = parse_allow_list(allow_list) else {
            return self.configs.iter().collect();
        };
        let matched: Vec<&ProviderConfig> = self
            .configs
            .iter()
            .filter(|c| wanted.contains(&c.provider))
            .collect();
        if matched.is_empty() {
            return self.configs.iter().collect();
        }
        matched
    }

    /// Whether `provider` is registered and selected by `allow_list`.
    ///
    /// Unlike [`Self::enabled`], there is no fallback: a list that matches
    /// nothing disables every provider here.
    pub fn is_enabled(&self, provider: GitProvider, allow_list: Option<&str>) -> bool {
        if self.get_config(provider).is_err() {
            return false;
        }
        match parse_allow_list(allow_list) {
            None => true,
            Some(wanted) => wanted.contains(&provider),
        }
    }

    /// [`Self::enabled`] with the allow-list read from `E2E_GIT_PROVIDERS`.
    pub fn enabled_from_env(&self, env: &dyn Env) -> Vec<&ProviderConfig> {
        let raw = env.var(PROVIDERS_ENV);
        self.enabled(raw.as_deref())
    }
}

/// `None` when every provider is enabled.
fn parse_allow_list(allow_list: Option<&str>) -> Option<Vec<GitProvider>> {
    let entries: Vec<String> = allow_list?
        .split(',')
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect();
    if entries.is_empty() {
        return None;
    }
    Some(entries.iter().filter_map(|e| GitProvider::parse(e)).collect())
}

/// Build the registry from settings: GitHub, GitLab, Forgejo, in that
/// order, with defaults for anything the settings leave out.
///
/// # Errors
///
/// `Duplicate` if the provider table names a provider twice.
pub fn build_registry(settings: &Settings) -> Result<ProviderRegistry, RegistryError> {
    let mut timeouts = Timeouts::default();
    if let Some(secs) = settings.timeouts.branch {
        timeouts.branch = timeouts.branch.with_timeout(Duration::from_secs(secs));
    }
    if let Some(secs) = settings.timeouts.status {
        timeouts.status = timeouts.status.with_timeout(Duration::from_secs(secs));
    }
    if let Some(secs) = settings.timeouts.fork {
        timeouts.fork = timeouts.fork.with_timeout(Duration::from_secs(secs));
    }

    let defaults = [
        Defaults {
            provider: GitProvider::GitHub,
            api_base: crate::forge::github::DEFAULT_API_BASE,
            web_base: "https://github.com",
            org: "redhat-appstudio-qe",
            token_env: "GITHUB_TOKEN",
            secret_name: None,
            fork_ready: None,
        },
        Defaults {
            provider: GitProvider::GitLab,
            api_base: crate::forge::gitlab::DEFAULT_API_BASE,
            web_base: "https://gitlab.com",
            org: "konflux-qe",
            token_env: "GITLAB_BOT_TOKEN",
            secret_name: Some("pipelines-as-code-secret"),
            fork_ready: Some(GITLAB_FORK_READY),
        },
        Defaults {
            provider: GitProvider::Forgejo,
            api_base: crate::forge::forgejo::DEFAULT_API_BASE,
            web_base: "https://codeberg.org",
            org: "konflux-qe",
            token_env: "FORGEJO_BOT_TOKEN",
            secret_name: None,
            fork_ready: None,
        },
    ];

    let mut registry = ProviderRegistry::new();
    for d in defaults {
        let section = match d.provider {
            GitProvider::GitHub => &settings.github,
            GitProvider::GitLab => &settings.gitlab,
            GitProvider::Forgejo => &settings.forgejo,
        };
        registry.register(d.resolve(section, timeouts))?;
    }
    Ok(registry)
}

struct Defaults {
    provider: GitProvider,
    api_base: &'static str,
    web_base: &'static str,
    org: &'static str,
    token_env: &'static str,
    secret_name: Option<&'static str>,
    fork_ready: Option<Duration>,
}

impl Defaults {
    fn resolve(self, section: &ProviderSettings, mut timeouts: Timeouts) -> ProviderConfig {
        let fork_ready = section.fork_ready.map(Duration::from_secs).or(self.fork_ready);
        if let Some(t) = fork_ready {
            timeouts.fork_ready = timeouts.fork_ready.with_timeout(t);
        }
        let pick = |v: &Option<String>, d: &str| v.clone().unwrap_or_else(|| d.to_string());
        ProviderConfig {
            provider: self.provider,
            api_base: pick(&section.api_base, self.api_base),
            web_base: pick(&section.web_base, self.web_base),
            org: pick(&section.org, self.org),
            source_repo: pick(&section.source_repo, DEFAULT_SOURCE_REPO),
            token_env: pick(&section.token_env, self.token_env),
            secret_name: section
                .secret_name
                .clone()
                .or_else(|| self.secret_name.map(str::to_string)),
            timeouts,
        }
    }
}
