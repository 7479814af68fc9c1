//! forge::github
//!
//! GitHub adapter over the REST API.
//!
//! # Design
//!
//! - Branches use the git refs API (`git/ref/heads/..`, `git/refs`).
//! - Files use the contents API. GitHub returns bodies base64-encoded and
//!   wrapped at 60 columns.
//! - CI state comes from check runs.
//! - Forks are created under the adapter's organization with the target
//!   name in the same request. GitHub answers 403 while a previous fork of
//!   the same source is still in progress, so the request is retried.
//!
//! A repository argument is either `"owner/repo"` or a bare name inside the
//! adapter's organization.
//!
//! # Example
//!
//! ```ignore
//! use forgeops::forge::github::GitHubClient;
//! use forgeops::forge::ScmClient;
//!
//! let client = GitHubClient::new(&token, "redhat-appstudio-qe")?;
//! let prs = client.list_pull_requests("devfile-sample-hello-world").await?;
//! ```

use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::error::{ErrorKind, IgnoreNotFound, ScmError};
use super::http::{decode_base64, encode_base64, Auth, RestClient};
use super::traits::ScmClient;
use super::types::{CommitStatus, GitProvider, PullRequest, RepoRef, RepositoryFile, StatusState};
use crate::wait::{wait_until, Timeouts};

/// Default GitHub API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// REST API version pinned in every request.
const API_VERSION: &str = "2022-11-28";

/// Commit message used for files written by [`GitHubClient::create_file`].
const COMMIT_MESSAGE: &str = "e2e test commit message";

/// GitHub's maximum page size.
const PER_PAGE: usize = 100;

/// GitHub adapter.
pub struct GitHubClient {
    http: RestClient,
    org: String,
    timeouts: Timeouts,
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("api_base", &self.http.base().as_str())
            .field("org", &self.org)
            .finish()
    }
}

impl GitHubClient {
    /// Create a client for `api.github.com`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the token cannot be sent as a header.
    pub fn new(token: &str, org: impl Into<String>) -> Result<Self, ScmError> {
        Self::with_api_base(token, org, DEFAULT_API_BASE)
    }

    /// Create a client for a GitHub Enterprise (or test) API base URL, e.g.
    /// `https://github.example.com/api/v3`.
    pub fn with_api_base(
        token: &str,
        org: impl Into<String>,
        api_base: &str,
    ) -> Result<Self, ScmError> {
        let http = RestClient::new(
            api_base,
            Auth::Bearer(token.to_string()),
            &[("x-github-api-version", API_VERSION)],
        )?;
        Ok(Self {
            http,
            org: org.into(),
            timeouts: Timeouts::default(),
        })
    }

    /// Replace the default confirmation timeouts.
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Organization that bare repository names and forks resolve to.
    pub fn org(&self) -> &str {
        &self.org
    }

    fn repo(&self, repo: &str) -> RepoRef {
        RepoRef::parse(repo, &self.org)
    }

    /// `repos/{owner}/{name}/{rest..}`. Each element of `rest` may contain
    /// `/`, which is treated as a path separator.
    fn repo_url(&self, repo: &RepoRef, rest: &[&str]) -> Url {
        let mut segments: Vec<&str> = vec!["repos", repo.owner.as_str(), repo.name.as_str()];
        for part in rest {
            segments.extend(part.split('/').filter(|s| !s.is_empty()));
        }
        self.http.url(&segments)
    }

    async fn get_pull_request(&self, repo: &RepoRef, number: u64) -> Result<PullRequest, ScmError> {
        let ctx = format!("get PR #{} in {}", number, repo);
        let url = self.repo_url(repo, &["pulls", number.to_string().as_str()]);
        let pr: GitHubPullRequest = self.http.send_json(&ctx, self.http.get(url)).await?;
        Ok(pr.into())
    }

    /// Commit that last touched `path` on `branch`.
    async fn last_commit_for_path(
        &self,
        repo: &RepoRef,
        path: &str,
        branch: &str,
        ctx: &str,
    ) -> Result<String, ScmError> {
        let mut url = self.repo_url(repo, &["commits"]);
        url.query_pairs_mut()
            .append_pair("path", path)
            .append_pair("sha", branch)
            .append_pair("per_page", "1");
        let commits: Vec<GitHubCommitRef> = self.http.send_json(ctx, self.http.get(url)).await?;
        Ok(commits.into_iter().next().map(|c| c.sha).unwrap_or_default())
    }
}

#[async_trait]
impl ScmClient for GitHubClient {
    fn provider(&self) -> GitProvider {
        GitProvider::GitHub
    }

    async fn create_branch(
        &self,
        repo: &str,
        base_branch: &str,
        base_revision: &str,
        new_branch: &str,
    ) -> Result<(), ScmError> {
        let r = self.repo(repo);
        let ctx = format!("create branch '{}' in {}", new_branch, r);

        // Resolving the base ref also confirms it exists.
        let base_ref = format!("heads/{}", base_branch);
        let url = self.repo_url(&r, &["git/ref", base_ref.as_str()]);
        let base: GitHubGitRef = self.http.send_json(&ctx, self.http.get(url)).await?;
        let sha = if base_revision.is_empty() {
            base.object.sha.as_str()
        } else {
            base_revision
        };

        let body = CreateRefBody {
            ref_name: format!("refs/heads/{}", new_branch),
            sha,
        };
        let url = self.repo_url(&r, &["git/refs"]);
        self.http
            .send_empty(&ctx, self.http.post(url).json(&body))
            .await?;
        info!(repo = %r, branch = new_branch, sha, "created branch");

        let what = format!("branch '{}' in {} to exist", new_branch, r);
        wait_until(&what, self.timeouts.branch, || {
            self.branch_exists(repo, new_branch)
        })
        .await?;
        Ok(())
    }

    async fn delete_branch(&self, repo: &str, branch: &str) -> Result<(), ScmError> {
        let r = self.repo(repo);
        let ctx = format!("delete branch '{}' in {}", branch, r);
        let ref_path = format!("heads/{}", branch);
        let url = self.repo_url(&r, &["git/refs", ref_path.as_str()]);
        self.http.send_empty(&ctx, self.http.delete(url)).await?;
        info!(repo = %r, branch, "deleted branch");
        Ok(())
    }

    async fn branch_exists(&self, repo: &str, branch: &str) -> Result<bool, ScmError> {
        let r = self.repo(repo);
        let ctx = format!("check branch '{}' in {}", branch, r);
        let ref_path = format!("heads/{}", branch);
        let url = self.repo_url(&r, &["git/ref", ref_path.as_str()]);
        match self.http.send_empty(&ctx, self.http.get(url)).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list_pull_requests(&self, repo: &str) -> Result<Vec<PullRequest>, ScmError> {
        let r = self.repo(repo);
        let ctx = format!("list pull requests in {}", r);
        let mut url = self.repo_url(&r, &["pulls"]);
        url.query_pairs_mut().append_pair("state", "open");
        let prs: Vec<GitHubPullRequest> = self
            .http
            .get_all_pages(&ctx, url, "per_page", PER_PAGE)
            .await?;
        Ok(prs.into_iter().map(Into::into).collect())
    }

    async fn create_pull_request(
        &self,
        repo: &str,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<PullRequest, ScmError> {
        let r = self.repo(repo);
        let ctx = format!("create PR {} -> {} in {}", head, base, r);
        let request = CreatePrBody {
            title,
            body,
            head,
            base,
        };
        let url = self.repo_url(&r, &["pulls"]);
        let pr: GitHubPullRequest = self
            .http
            .send_json(&ctx, self.http.post(url).json(&request))
            .await?;
        info!(repo = %r, number = pr.number, "created pull request");
        Ok(pr.into())
    }

    async fn merge_pull_request(&self, repo: &str, number: u64) -> Result<PullRequest, ScmError> {
        let r = self.repo(repo);
        let ctx = format!("merge PR #{} in {}", number, r);
        let n = number.to_string();
        let url = self.repo_url(&r, &["pulls", n.as_str(), "merge"]);
        let body = MergePrBody {
            merge_method: "merge",
        };

        let merged: GitHubMergeResult = match self
            .http
            .send_json(&ctx, self.http.put(url).json(&body))
            .await
        {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::Conflict => {
                // Head is behind base; bring it up to date for the next attempt.
                let update = self.repo_url(&r, &["pulls", n.as_str(), "update-branch"]);
                if let Err(update_err) = self
                    .http
                    .send_empty(&ctx, self.http.put(update).json(&serde_json::json!({})))
                    .await
                {
                    warn!(repo = %r, number, error = %update_err, "update-branch failed");
                }
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let mut pr = self.get_pull_request(&r, number).await?;
        if pr.merge_commit_sha.is_empty() {
            pr.merge_commit_sha = merged.sha.unwrap_or_default();
        }
        info!(repo = %r, number, sha = %pr.merge_commit_sha, "merged pull request");
        Ok(pr)
    }

    async fn delete_branch_and_close_pull_request(
        &self,
        repo: &str,
        number: u64,
    ) -> Result<(), ScmError> {
        // GitHub closes a pull request once its head branch is gone.
        let r = self.repo(repo);
        let pr = self.get_pull_request(&r, number).await?;
        self.delete_branch(repo, &pr.source_branch)
            .await
            .ignore_not_found()?;
        Ok(())
    }

    async fn create_file(
        &self,
        repo: &str,
        path: &str,
        content: &str,
        branch: &str,
    ) -> Result<RepositoryFile, ScmError> {
        let r = self.repo(repo);
        let ctx = format!("create file '{}' on '{}' in {}", path, branch, r);
        let body = CreateFileBody {
            message: COMMIT_MESSAGE,
            content: encode_base64(content),
            branch,
        };
        let url = self.repo_url(&r, &["contents", path]);
        let written: GitHubContentWrite = self
            .http
            .send_json(&ctx, self.http.put(url).json(&body))
            .await?;
        Ok(RepositoryFile {
            commit_sha: written.commit.sha,
            content: content.to_string(),
        })
    }

    async fn get_file(
        &self,
        repo: &str,
        path: &str,
        branch: &str,
    ) -> Result<RepositoryFile, ScmError> {
        let r = self.repo(repo);
        let ctx = format!("get file '{}' on '{}' in {}", path, branch, r);
        let mut url = self.repo_url(&r, &["contents", path]);
        if !branch.is_empty() {
            url.query_pairs_mut().append_pair("ref", branch);
        }
        let file: GitHubContent = self.http.send_json(&ctx, self.http.get(url)).await?;
        let content = match (file.encoding.as_deref(), file.content) {
            (Some("base64"), Some(raw)) => decode_base64(&ctx, &raw)?,
            (_, Some(raw)) => raw,
            (_, None) => String::new(),
        };
        let commit_sha = self.last_commit_for_path(&r, path, branch, &ctx).await?;
        Ok(RepositoryFile {
            commit_sha,
            content,
        })
    }

    async fn cleanup_webhooks(&self, repo: &str, host_substring: &str) -> Result<(), ScmError> {
        if host_substring.is_empty() {
            return Err(ScmError::InvalidArgument(
                "webhook host substring must not be empty".into(),
            ));
        }
        let r = self.repo(repo);
        let ctx = format!("clean up webhooks in {}", r);
        let url = self.repo_url(&r, &["hooks"]);
        let hooks: Vec<GitHubHook> = self
            .http
            .get_all_pages(&ctx, url, "per_page", PER_PAGE)
            .await?;

        let matching = hooks.into_iter().find(|h| {
            h.config
                .url
                .as_deref()
                .is_some_and(|u| u.contains(host_substring))
        });
        if let Some(hook) = matching {
            let url = self.repo_url(&r, &["hooks", hook.id.to_string().as_str()]);
            self.http.send_empty(&ctx, self.http.delete(url)).await?;
            info!(repo = %r, hook = hook.id, url = hook.config.url.as_deref().unwrap_or(""), "removed webhook");
        }
        Ok(())
    }

    async fn fork_repository(&self, source_repo: &str, target_repo: &str) -> Result<(), ScmError> {
        let source = self.repo(source_repo);
        let target = RepoRef::parse(target_repo, &self.org);
        let ctx = format!("fork {} into {}", source, target);
        let body = ForkBody {
            organization: &target.owner,
            name: &target.name,
            default_branch_only: false,
        };

        // 403 while another fork of the same source is in flight, 5xx on
        // hiccups; both are retried. Anything else stops the wait.
        let fatal: Mutex<Option<ScmError>> = Mutex::new(None);
        wait_until(&format!("{} to be accepted", ctx), self.timeouts.fork, || {
            let url = self.repo_url(&source, &["forks"]);
            let request = self.http.post(url).json(&body);
            let (ctx, fatal) = (&ctx, &fatal);
            async move {
                match self.http.send_empty(ctx, request).await {
                    Ok(()) => Ok(true),
                    Err(e) if e.is_retryable() || e.status() == Some(403) => Err(e),
                    Err(e) => {
                        *fatal.lock().unwrap_or_else(|p| p.into_inner()) = Some(e);
                        Ok(true)
                    }
                }
            }
        })
        .await?;
        if let Some(e) = fatal.into_inner().unwrap_or_else(|p| p.into_inner()) {
            return Err(e);
        }

        // The fork is created asynchronously; it is usable once it has commits.
        wait_until(&format!("{} to be ready", ctx), self.timeouts.fork_ready, || {
            let mut url = self.repo_url(&target, &["commits"]);
            url.query_pairs_mut().append_pair("per_page", "1");
            let request = self.http.get(url);
            let ctx = &ctx;
            async move {
                let commits: Vec<GitHubCommitRef> = self.http.send_json(ctx, request).await?;
                Ok::<_, ScmError>(!commits.is_empty())
            }
        })
        .await?;
        info!(source = %source, target = %target, "forked repository");
        Ok(())
    }

    async fn delete_repository_if_exists(&self, repo: &str) -> Result<bool, ScmError> {
        let r = self.repo(repo);
        let ctx = format!("delete repository {}", r);
        let url = self.repo_url(&r, &[]);
        match self.http.send_empty(&ctx, self.http.get(url.clone())).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e),
        }
        let deleted = self
            .http
            .send_empty(&ctx, self.http.delete(url))
            .await
            .ignore_not_found()?
            .is_some();
        if deleted {
            info!(repo = %r, "deleted repository");
        }
        Ok(deleted)
    }

    async fn list_commit_statuses(
        &self,
        repo: &str,
        sha: &str,
    ) -> Result<Vec<CommitStatus>, ScmError> {
        let r = self.repo(repo);
        let ctx = format!("list check runs for {} in {}", sha, r);
        let url = self.repo_url(&r, &["commits", sha, "check-runs"]);
        let runs = self
            .http
            .get_all_pages_with(&ctx, url, "per_page", PER_PAGE, |page: GitHubCheckRuns| {
                page.check_runs
            })
            .await?;
        Ok(runs.into_iter().map(Into::into).collect())
    }
}

// --------------------------------------------------------------------------
// API Request/Response Types
// --------------------------------------------------------------------------

#[derive(Serialize)]
struct CreateRefBody<'a> {
    #[serde(rename = "ref")]
    ref_name: String,
    sha: &'a str,
}

#[derive(Serialize)]
struct CreatePrBody<'a> {
    title: &'a str,
    body: &'a str,
    head: &'a str,
    base: &'a str,
}

#[derive(Serialize)]
struct MergePrBody<'a> {
    merge_method: &'a str,
}

#[derive(Serialize)]
struct CreateFileBody<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
}

#[derive(Serialize)]
struct ForkBody<'a> {
    organization: &'a str,
    name: &'a str,
    default_branch_only: bool,
}

/// Response of `git/ref/{ref}`.
#[derive(Deserialize)]
struct GitHubGitRef {
    object: GitHubCommitRef,
}

#[derive(Deserialize)]
struct GitHubCommitRef {
    sha: String,
}

/// GitHub PR response format.
///
/// `merge_commit_sha` holds a test-merge commit while the PR is open; it
/// only counts once `merged_at` is set.
#[derive(Deserialize)]
struct GitHubPullRequest {
    number: u64,
    head: GitHubRef,
    base: GitHubRef,
    merge_commit_sha: Option<String>,
    merged_at: Option<String>,
}

/// GitHub ref (head/base) format.
#[derive(Deserialize)]
struct GitHubRef {
    #[serde(rename = "ref")]
    ref_name: String,
    sha: String,
}

#[derive(Deserialize)]
struct GitHubMergeResult {
    sha: Option<String>,
}

#[derive(Deserialize)]
struct GitHubContentWrite {
    commit: GitHubCommitRef,
}

#[derive(Deserialize)]
struct GitHubContent {
    content: Option<String>,
    encoding: Option<String>,
}

#[derive(Deserialize)]
struct GitHubHook {
    id: u64,
    config: GitHubHookConfig,
}

#[derive(Deserialize)]
struct GitHubHookConfig {
    url: Option<String>,
}

#[derive(Deserialize)]
struct GitHubCheckRuns {
    check_runs: Vec<GitHubCheckRun>,
}

#[derive(Deserialize)]
struct GitHubCheckRun {
    name: String,
    status: String,
    conclusion: Option<String>,
}

impl From<GitHubPullRequest> for PullRequest {
    fn from(pr: GitHubPullRequest) -> Self {
        let merge_commit_sha = match pr.merged_at {
            Some(_) => pr.merge_commit_sha.unwrap_or_default(),
            None => String::new(),
        };
        PullRequest {
            number: pr.number,
            source_branch: pr.head.ref_name,
            target_branch: pr.base.ref_name,
            head_sha: pr.head.sha,
            merge_commit_sha,
        }
    }
}

impl From<GitHubCheckRun> for CommitStatus {
    fn from(run: GitHubCheckRun) -> Self {
        let state = if run.status == "completed" {
            StatusState::parse(run.conclusion.as_deref().unwrap_or("success"))
        } else {
            StatusState::parse(&run.status)
        };
        CommitStatus::new(run.name, state)
    }
}
