//! config
//!
//! Settings loading.
//!
//! # Precedence
//!
//! Values are resolved in this order (later overrides earlier):
//! 1. Built-in defaults (applied by the registry)
//! 2. Settings file
//! 3. Environment variables
//!
//! # Locations
//!
//! Searched in order:
//! 1. The `--config` path, if given (must exist)
//! 2. `$FORGEOPS_CONFIG` if set
//! 3. `$XDG_CONFIG_HOME/forgeops/config.toml`
//! 4. `~/.forgeops/config.toml`
//!
//! # Environment Overrides
//!
//! | Variable | Setting |
//! |---|---|
//! | `GITHUB_E2E_ORGANIZATION` | `github.org` |
//! | `GITLAB_QE_ORG` | `gitlab.org` |
//! | `GITLAB_API_URL` | `gitlab.api_base` |
//! | `GITLAB_FORK_IMPORT_TIMEOUT_MINUTES` | `gitlab.fork_ready` |
//! | `FORGEJO_ORG` | `forgejo.org` |
//! | `FORGEJO_API_URL` | `forgejo.api_base` |
//!
//! # Example
//!
//! ```no_run
//! use forgeops::config::Settings;
//! use forgeops::registry::ProcessEnv;
//!
//! let loaded = Settings::load(&ProcessEnv, None).unwrap();
//! if let Some(path) = &loaded.path {
//!     println!("settings from {}", path.display());
//! }
//! ```

pub mod schema;

pub use schema::{ProviderSettings, Settings, TimeoutSettings};

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::registry::Env;

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Loaded settings and where they came from.
#[derive(Debug, Clone, Default)]
pub struct LoadedSettings {
    pub settings: Settings,
    /// The file read, or `None` when only defaults and environment apply.
    pub path: Option<PathBuf>,
}

impl Settings {
    /// Load settings from `explicit` or the standard locations, then apply
    /// environment overrides and validate.
    ///
    /// # Errors
    ///
    /// - `ReadError` if `explicit` is given and cannot be read
    /// - `ParseError` if a settings file exists but is malformed
    /// - `InvalidValue` if a value fails validation
    ///
    /// A missing file at a standard location is not an error.
    pub fn load(env: &dyn Env, explicit: Option<&Path>) -> Result<LoadedSettings, ConfigError> {
        let (mut settings, path) = match explicit {
            Some(p) => (Self::read(p)?, Some(p.to_path_buf())),
            None => match Self::find(env) {
                Some(p) => (Self::read(&p)?, Some(p)),
                None => (Settings::default(), None),
            },
        };
        if let Some(p) = &path {
            debug!(path = %p.display(), "loaded settings");
        }

        settings.apply_env(env);
        settings.validate()?;
        Ok(LoadedSettings { settings, path })
    }

    /// First existing settings file in the standard locations.
    fn find(env: &dyn Env) -> Option<PathBuf> {
        let mut candidates = Vec::new();
        if let Some(p) = env.var("FORGEOPS_CONFIG").filter(|p| !p.is_empty()) {
            candidates.push(PathBuf::from(p));
        }
        if let Some(xdg) = env.var("XDG_CONFIG_HOME").filter(|p| !p.is_empty()) {
            candidates.push(PathBuf::from(xdg).join("forgeops/config.toml"));
        }
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join(".forgeops/config.toml"));
        }
        candidates.into_iter().find(|p| p.exists())
    }

    fn read(path: &Path) -> Result<Settings, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Overlay the environment variables listed in the module docs.
    pub fn apply_env(&mut self, env: &dyn Env) {
        let set = |slot: &mut Option<String>, key: &str| {
            if let Some(v) = env.var(key).filter(|v| !v.is_empty()) {
                *slot = Some(v);
            }
        };
        set(&mut self.github.org, "GITHUB_E2E_ORGANIZATION");
        set(&mut self.gitlab.org, "GITLAB_QE_ORG");
        set(&mut self.gitlab.api_base, "GITLAB_API_URL");
        set(&mut self.forgejo.org, "FORGEJO_ORG");
        set(&mut self.forgejo.api_base, "FORGEJO_API_URL");

        if let Some(raw) = env
            .var("GITLAB_FORK_IMPORT_TIMEOUT_MINUTES")
            .filter(|v| !v.is_empty())
        {
            let secs = raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|m| *m > 0)
                .and_then(|m| m.checked_mul(60));
            match secs {
                Some(secs) => self.gitlab.fork_ready = Some(secs),
                None => warn!(value = %raw, "ignoring invalid GITLAB_FORK_IMPORT_TIMEOUT_MINUTES"),
            }
        }
    }
}
