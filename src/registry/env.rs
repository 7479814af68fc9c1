//! registry::env
//!
//! Environment lookup behind a trait, so provider selection and
//! credentials can be resolved from a fixed map in tests.

use std::collections::HashMap;

/// Read-only view of environment variables.
pub trait Env: Send + Sync {
    /// The raw value of `key`, if set.
    fn var(&self, key: &str) -> Option<String>;

    /// The value of `key`, or `default` when unset or empty.
    fn get_or(&self, key: &str, default: &str) -> String {
        self.var(key)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default.to_string())
    }
}

/// The process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl Env for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// A fixed set of variables.
///
/// ```
/// use forgeops::registry::{Env, MapEnv};
///
/// let env = MapEnv::new().with("E2E_GIT_PROVIDERS", "gh");
/// assert_eq!(env.get_or("E2E_GIT_PROVIDERS", ""), "gh");
/// assert_eq!(env.get_or("GITLAB_QE_ORG", "konflux-qe"), "konflux-qe");
/// ```
#[derive(Debug, Clone, Default)]
pub struct MapEnv {
    vars: HashMap<String, String>,
}

impl MapEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }
}

impl Env for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}
