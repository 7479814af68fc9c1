//! forge::traits
//!
//! The provider-neutral SCM contract.
//!
//! # Design
//!
//! `ScmClient` is async because every operation is network I/O. Callers
//! await operations one at a time; an adapter never reorders or batches
//! calls and never spawns tasks.
//!
//! Repositories are named `"owner/repo"` (GitLab: the full project path,
//! nested groups included). A bare name resolves against the adapter's
//! organization.
//!
//! Operations that mutate eventually-consistent state confirm the write
//! before returning: `create_branch` polls `branch_exists`, forks poll for
//! readiness. See [`crate::wait`].
//!
//! # Example
//!
//! ```ignore
//! use forgeops::forge::{IgnoreNotFound, ScmClient, ScmError};
//!
//! async fn scratch_branch(client: &dyn ScmClient) -> Result<(), ScmError> {
//!     client.create_branch("org/repo", "main", "", "feat-x").await?;
//!     assert!(client.branch_exists("org/repo", "feat-x").await?);
//!     client.delete_branch("org/repo", "feat-x").await.ignore_not_found()?;
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;

use super::error::ScmError;
use super::types::{CommitStatus, GitProvider, PullRequest, RepositoryFile, StatusState};
use crate::wait::{wait_for_status, WaitOptions};

/// Branch, pull request, file, webhook and repository operations against a
/// hosted git provider.
///
/// Every error is classified: branch on [`ScmError::kind`], never on the
/// message text.
#[async_trait]
pub trait ScmClient: Send + Sync {
    /// The provider behind this client.
    fn provider(&self) -> GitProvider;

    /// Short lowercase name, e.g. `"github"`.
    fn name(&self) -> &'static str {
        self.provider().label()
    }

    /// Create `new_branch` from the tip of `base_branch`, or from
    /// `base_revision` when it is non-empty.
    ///
    /// Returns only once the branch is visible to [`ScmClient::branch_exists`].
    ///
    /// # Errors
    ///
    /// - `NotFound` if the repository or base branch does not exist
    /// - `Conflict` if `new_branch` already exists
    /// - `Transient` on retryable transport failures
    /// - `Timeout` if the branch never became visible
    async fn create_branch(
        &self,
        repo: &str,
        base_branch: &str,
        base_revision: &str,
        new_branch: &str,
    ) -> Result<(), ScmError>;

    /// Delete a branch.
    ///
    /// # Errors
    ///
    /// A missing branch is reported as `NotFound`, never as a provider
    /// error. Cleanup code tolerates it with
    /// [`IgnoreNotFound::ignore_not_found`](super::IgnoreNotFound::ignore_not_found).
    async fn delete_branch(&self, repo: &str, branch: &str) -> Result<(), ScmError>;

    /// Whether a branch exists. `Ok(false)` only on a confirmed not-found.
    async fn branch_exists(&self, repo: &str, branch: &str) -> Result<bool, ScmError>;

    /// All open pull requests, every page folded into one vector.
    ///
    /// Order is unspecified.
    async fn list_pull_requests(&self, repo: &str) -> Result<Vec<PullRequest>, ScmError>;

    async fn create_pull_request(
        &self,
        repo: &str,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<PullRequest, ScmError>;

    /// Merge with a plain merge commit (no squash, no rebase).
    ///
    /// The returned value always carries `merge_commit_sha`.
    async fn merge_pull_request(&self, repo: &str, number: u64) -> Result<PullRequest, ScmError>;

    /// Delete the source branch of a pull request and close it.
    ///
    /// A source branch that is already gone is not an error.
    async fn delete_branch_and_close_pull_request(
        &self,
        repo: &str,
        number: u64,
    ) -> Result<(), ScmError>;

    /// Create a file on `branch`, returning the commit that added it.
    async fn create_file(
        &self,
        repo: &str,
        path: &str,
        content: &str,
        branch: &str,
    ) -> Result<RepositoryFile, ScmError>;

    /// Read a file at the tip of `branch`.
    async fn get_file(&self, repo: &str, path: &str, branch: &str)
        -> Result<RepositoryFile, ScmError>;

    /// Delete the first webhook whose URL contains `host_substring`.
    ///
    /// At most one webhook is deleted per call. No match is not an error.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty `host_substring`, which would match
    /// every hook.
    async fn cleanup_webhooks(&self, repo: &str, host_substring: &str) -> Result<(), ScmError>;

    /// Fork `source_repo` into the adapter's organization as `target_repo`,
    /// returning once the fork is usable.
    async fn fork_repository(&self, source_repo: &str, target_repo: &str)
        -> Result<(), ScmError>;

    /// Delete a repository. Returns `false` if it did not exist.
    async fn delete_repository_if_exists(&self, repo: &str) -> Result<bool, ScmError>;

    /// Every CI status currently reported for `sha`.
    async fn list_commit_statuses(&self, repo: &str, sha: &str)
        -> Result<Vec<CommitStatus>, ScmError>;

    /// Wait for the status named `status_name` to appear on `sha` and then
    /// to finish, returning its terminal state.
    ///
    /// `options` applies to each of the two phases.
    async fn commit_status_conclusion(
        &self,
        repo: &str,
        sha: &str,
        status_name: &str,
        options: WaitOptions,
    ) -> Result<StatusState, ScmError> {
        let state = wait_for_status(status_name, options, options, || {
            self.list_commit_statuses(repo, sha)
        })
        .await?;
        Ok(state)
    }
}
