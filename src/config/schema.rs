//! config::schema
//!
//! Settings file schema.
//!
//! # Example
//!
//! ```toml
//! [github]
//! org = "redhat-appstudio-qe"
//!
//! [gitlab]
//! api_base = "https://gitlab.example.com/api/v4"
//! web_base = "https://gitlab.example.com"
//! org = "konflux-qe"
//! fork_ready = 1800
//!
//! [forgejo]
//! api_base = "https://codeberg.org/api/v1"
//!
//! [timeouts]
//! branch = 120
//! status = 600
//! fork = 300
//! ```
//!
//! # Validation
//!
//! Values are checked after parsing and after environment overrides:
//! organizations must be non-empty and URLs must be http(s).

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// All settings. Every field is optional; the registry fills in defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub github: ProviderSettings,
    pub gitlab: ProviderSettings,
    pub forgejo: ProviderSettings,
    pub timeouts: TimeoutSettings,
}

impl Settings {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.github.validate("github")?;
        self.gitlab.validate("gitlab")?;
        self.forgejo.validate("forgejo")?;
        self.timeouts.validate()
    }
}

/// Per-provider overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderSettings {
    /// REST API root, including any version prefix.
    pub api_base: Option<String>,
    /// Web root used to build repository URLs.
    pub web_base: Option<String>,
    /// Organization, group or user that owns the test repositories.
    pub org: Option<String>,
    /// Repository forked for each run.
    pub source_repo: Option<String>,
    /// Environment variable holding the API token.
    pub token_env: Option<String>,
    /// Build secret to provision before forking.
    pub secret_name: Option<String>,
    /// Seconds to wait for a new fork to become usable.
    pub fork_ready: Option<u64>,
}

impl ProviderSettings {
    fn validate(&self, section: &str) -> Result<(), ConfigError> {
        if let Some(org) = &self.org {
            if org.trim().is_empty() {
                return Err(ConfigError::InvalidValue(format!(
                    "{}.org cannot be empty",
                    section
                )));
            }
        }
        for (key, value) in [("api_base", &self.api_base), ("web_base", &self.web_base)] {
            if let Some(url) = value {
                if !is_http_url(url) {
                    return Err(ConfigError::InvalidValue(format!(
                        "{}.{} must be an http(s) URL, got '{}'",
                        section, key, url
                    )));
                }
            }
        }
        if let Some(secs) = self.fork_ready {
            check_timeout(&format!("{}.fork_ready", section), secs)?;
        }
        if let Some(name) = &self.token_env {
            if name.is_empty() {
                return Err(ConfigError::InvalidValue(format!(
                    "{}.token_env cannot be empty",
                    section
                )));
            }
        }
        Ok(())
    }
}

/// Default wait deadlines, in seconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutSettings {
    pub branch: Option<u64>,
    pub status: Option<u64>,
    pub fork: Option<u64>,
}

impl TimeoutSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("branch", self.branch),
            ("status", self.status),
            ("fork", self.fork),
        ] {
            if let Some(secs) = value {
                check_timeout(&format!("timeouts.{}", key), secs)?;
            }
        }
        Ok(())
    }
}

/// Largest accepted timeout, in seconds (one week).
pub const MAX_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;

fn check_timeout(key: &str, secs: u64) -> Result<(), ConfigError> {
    if secs == 0 {
        return Err(ConfigError::InvalidValue(format!(
            "{} must be greater than zero",
            key
        )));
    }
    if secs > MAX_TIMEOUT_SECS {
        return Err(ConfigError::InvalidValue(format!(
            "{} must be at most {} seconds, got {}",
            key, MAX_TIMEOUT_SECS, secs
        )));
    }
    Ok(())
}

fn is_http_url(s: &str) -> bool {
    (s.starts_with("https://") || s.starts_with("http://")) && reqwest::Url::parse(s).is_ok()
}
