//! registry::setup
//!
//! Going from "I want provider X" to a working client and a scratch fork.

use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use tracing::info;

use super::env::Env;
use super::{ProviderConfig, ProviderRegistry, RegistryError};
use crate::forge::{GitProvider, ScmClient};

const SUFFIX_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const SUFFIX_LEN: usize = 6;

/// Creates the build secret a provider needs before a run (for GitLab, the
/// Pipelines-as-Code secret holding the bot token).
///
/// Implemented by the caller; this crate only decides when it is needed.
#[async_trait]
pub trait BuildSecretProvisioner: Send + Sync {
    async fn provision(
        &self,
        provider: GitProvider,
        secret_name: &str,
        token: &str,
    ) -> anyhow::Result<()>;
}

/// A ready client and the fork created for this run.
pub struct ProviderSetup {
    pub client: Arc<dyn ScmClient>,
    pub target_repo_url: String,
    /// Name passed to the client for the fork (group-qualified on GitLab).
    pub target_repo_name: String,
}

impl std::fmt::Debug for ProviderSetup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSetup")
            .field("provider", &self.client.provider())
            .field("target_repo_url", &self.target_repo_url)
            .field("target_repo_name", &self.target_repo_name)
            .finish()
    }
}

/// Six random lowercase alphanumerics.
pub fn random_suffix() -> String {
    let mut rng = rand::rng();
    (0..SUFFIX_LEN)
        .map(|_| SUFFIX_CHARS[rng.random_range(0..SUFFIX_CHARS.len())] as char)
        .collect()
}

/// Resolve `provider`, build its client, provision its build secret if it
/// declares one, and fork the source repository under a fresh name.
///
/// # Errors
///
/// - `NotRegistered` if `provider` is not in `registry`
/// - `MissingCredential` if a build secret is declared but the token is unset
/// - `SecretSetup` if the provisioner fails, or none was supplied
/// - `Scm` if the client cannot be built or the fork fails
pub async fn setup_provider(
    registry: &ProviderRegistry,
    provider: GitProvider,
    env: &dyn Env,
    secrets: Option<&dyn BuildSecretProvisioner>,
) -> Result<ProviderSetup, RegistryError> {
    let config = registry.get_config(provider)?;
    let token = env.get_or(&config.token_env, "");
    let client = config.build_client(&token)?;
    setup_with_client(config, client, env, secrets).await
}

/// [`setup_provider`] with a client the caller already built.
pub async fn setup_with_client(
    config: &ProviderConfig,
    client: Arc<dyn ScmClient>,
    env: &dyn Env,
    secrets: Option<&dyn BuildSecretProvisioner>,
) -> Result<ProviderSetup, RegistryError> {
    if let Some(secret) = &config.secret_name {
        let token = env.get_or(&config.token_env, "");
        if token.is_empty() {
            return Err(RegistryError::MissingCredential {
                provider: config.provider,
                var: config.token_env.clone(),
            });
        }
        let provisioner = secrets.ok_or_else(|| RegistryError::SecretSetup {
            provider: config.provider,
            secret: secret.clone(),
            message: "no build secret provisioner was supplied".into(),
        })?;
        provisioner
            .provision(config.provider, secret, &token)
            .await
            .map_err(|e| RegistryError::SecretSetup {
                provider: config.provider,
                secret: secret.clone(),
                message: format!("{:#}", e),
            })?;
        info!(provider = %config.provider, secret = %secret, "provisioned build secret");
    }

    let target_repo_name = config.target_repo_name(&random_suffix());
    let target_repo_url = config.target_repo_url(&target_repo_name);
    let source = config.source_repo_path();

    client.fork_repository(&source, &target_repo_name).await?;
    info!(
        provider = %config.provider,
        source = %source,
        target = %target_repo_name,
        "forked source repository"
    );

    Ok(ProviderSetup {
        client,
        target_repo_url,
        target_repo_name,
    })
}
