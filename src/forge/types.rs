//! forge::types
//!
//! Provider-neutral value types shared by every adapter.
//!
//! # Design
//!
//! Adapters deserialize provider responses into private wire structs and
//! convert them into these types at the boundary. Nothing in this module
//! knows about a particular provider's field names.

use std::fmt;

/// A pull request (GitHub, Forgejo) or merge request (GitLab).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullRequest {
    /// Provider-local identifier, unique per repository.
    ///
    /// GitHub issue number, GitLab `iid`, Forgejo index.
    pub number: u64,
    /// Branch containing the changes.
    pub source_branch: String,
    /// Branch the changes merge into.
    pub target_branch: String,
    /// Tip of the source branch when this value was observed.
    pub head_sha: String,
    /// Merge commit, empty until the PR is merged.
    pub merge_commit_sha: String,
}

impl PullRequest {
    /// Whether a merge commit has been recorded.
    pub fn is_merged(&self) -> bool {
        !self.merge_commit_sha.is_empty()
    }
}

/// File content at a specific ref.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositoryFile {
    /// The commit that produced or contains this content.
    pub commit_sha: String,
    /// Decoded file body.
    pub content: String,
}

/// A CI status report attached to a commit.
///
/// GitHub check runs, GitLab commit statuses and Forgejo status contexts
/// all normalize into this shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitStatus {
    /// Status name (check run name, GitLab job name, Forgejo context).
    pub name: String,
    /// Current state.
    pub state: StatusState,
}

impl CommitStatus {
    /// Create a status record.
    pub fn new(name: impl Into<String>, state: StatusState) -> Self {
        Self {
            name: name.into(),
            state,
        }
    }
}

/// State of a CI status.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StatusState {
    /// Reported but not started.
    Pending,
    /// In progress.
    Running,
    Success,
    Failure,
    Error,
    Cancelled,
    Skipped,
    /// A provider value with no normalized counterpart.
    Other(String),
}

impl StatusState {
    /// Parse a provider state string.
    ///
    /// Matching is case-insensitive. Unknown values are kept as
    /// [`StatusState::Other`] rather than rejected.
    ///
    /// # Example
    ///
    /// ```
    /// use forgeops::forge::StatusState;
    ///
    /// assert_eq!(StatusState::parse("in_progress"), StatusState::Running);
    /// assert_eq!(StatusState::parse("FAILED"), StatusState::Failure);
    /// assert!(StatusState::parse("queued").is_pending());
    /// ```
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" | "queued" | "created" | "waiting_for_resource" | "preparing"
            | "scheduled" | "manual" | "requested" | "waiting" => StatusState::Pending,
            "running" | "in_progress" => StatusState::Running,
            "success" | "succeeded" => StatusState::Success,
            "failure" | "failed" => StatusState::Failure,
            "error" | "warning" | "timed_out" | "action_required" | "stale" => StatusState::Error,
            "canceled" | "cancelled" => StatusState::Cancelled,
            "skipped" | "neutral" => StatusState::Skipped,
            other => StatusState::Other(other.to_string()),
        }
    }

    /// True while the CI run has not reached a terminal state.
    pub fn is_pending(&self) -> bool {
        matches!(self, StatusState::Pending | StatusState::Running)
    }
}

impl fmt::Display for StatusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusState::Pending => write!(f, "pending"),
            StatusState::Running => write!(f, "running"),
            StatusState::Success => write!(f, "success"),
            StatusState::Failure => write!(f, "failure"),
            StatusState::Error => write!(f, "error"),
            StatusState::Cancelled => write!(f, "cancelled"),
            StatusState::Skipped => write!(f, "skipped"),
            StatusState::Other(raw) => write!(f, "{}", raw),
        }
    }
}

/// Supported SCM providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GitProvider {
    GitHub,
    GitLab,
    /// Forgejo and other Gitea-compatible hosts.
    Forgejo,
}

impl GitProvider {
    /// All known providers, in registration order.
    pub fn all() -> &'static [GitProvider] {
        &[GitProvider::GitHub, GitProvider::GitLab, GitProvider::Forgejo]
    }

    /// Short prefix used in allow-lists and resource names.
    pub fn prefix(&self) -> &'static str {
        match self {
            GitProvider::GitHub => "gh",
            GitProvider::GitLab => "gl",
            GitProvider::Forgejo => "fj",
        }
    }

    /// Lowercase provider name.
    pub fn label(&self) -> &'static str {
        match self {
            GitProvider::GitHub => "github",
            GitProvider::GitLab => "gitlab",
            GitProvider::Forgejo => "forgejo",
        }
    }

    /// Parse a provider from its prefix or label.
    ///
    /// # Example
    ///
    /// ```
    /// use forgeops::forge::GitProvider;
    ///
    /// assert_eq!(GitProvider::parse("gh"), Some(GitProvider::GitHub));
    /// assert_eq!(GitProvider::parse("GitLab"), Some(GitProvider::GitLab));
    /// assert_eq!(GitProvider::parse("gitea"), Some(GitProvider::Forgejo));
    /// assert_eq!(GitProvider::parse("bitbucket"), None);
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gh" | "github" => Some(GitProvider::GitHub),
            "gl" | "gitlab" => Some(GitProvider::GitLab),
            "fj" | "forgejo" | "gt" | "gitea" => Some(GitProvider::Forgejo),
            _ => None,
        }
    }
}

impl fmt::Display for GitProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A repository reference split into owner and name.
///
/// Callers pass repositories either as `"owner/repo"` or as a bare name
/// that lives in the adapter's organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    /// User, organization, or (possibly nested) group path.
    pub owner: String,
    /// Repository or project name.
    pub name: String,
}

impl RepoRef {
    /// Split `repo`, falling back to `default_owner` for bare names.
    ///
    /// Nested GitLab groups keep everything before the last `/` as owner.
    ///
    /// # Example
    ///
    /// ```
    /// use forgeops::forge::RepoRef;
    ///
    /// let r = RepoRef::parse("octo-org/hello", "fallback");
    /// assert_eq!((r.owner.as_str(), r.name.as_str()), ("octo-org", "hello"));
    ///
    /// let r = RepoRef::parse("hello", "fallback");
    /// assert_eq!(r.owner, "fallback");
    /// ```
    pub fn parse(repo: &str, default_owner: &str) -> Self {
        let repo = repo.trim().trim_matches('/');
        match repo.rsplit_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() => Self {
                owner: owner.to_string(),
                name: name.to_string(),
            },
            _ => Self {
                owner: default_owner.to_string(),
                name: repo.to_string(),
            },
        }
    }

    /// Full `owner/name` path.
    pub fn full_path(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}
