//! forge::forgejo
//!
//! Forgejo (and Gitea-compatible) adapter over the REST API (`/api/v1`).
//!
//! # Design
//!
//! The API mirrors GitHub's closely but differs in the details this adapter
//! absorbs:
//!
//! - Branch creation answers 201 on success; anything else is a failure.
//! - Merging returns no body, so the pull request is re-fetched for its
//!   merge commit.
//! - A pull request stays open when its branch is deleted and is closed
//!   explicitly.
//! - CI state comes from the combined commit status, whose entries carry
//!   only `pending` before they finish.
//! - Pages are sized with `limit` rather than `per_page`.

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::{IgnoreNotFound, ScmError};
use super::http::{decode_base64, encode_base64, Auth, RestClient};
use super::traits::ScmClient;
use super::types::{CommitStatus, GitProvider, PullRequest, RepoRef, RepositoryFile, StatusState};
use crate::wait::{wait_until, Timeouts};

/// Codeberg, the public Forgejo instance.
pub const DEFAULT_API_BASE: &str = "https://codeberg.org/api/v1";

const COMMIT_MESSAGE: &str = "e2e test commit message";

/// Forgejo's default maximum page size.
const PAGE_LIMIT: usize = 50;

/// Forgejo adapter.
pub struct ForgejoClient {
    http: RestClient,
    org: String,
    timeouts: Timeouts,
}

impl std::fmt::Debug for ForgejoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForgejoClient")
            .field("api_base", &self.http.base().as_str())
            .field("org", &self.org)
            .finish()
    }
}

impl ForgejoClient {
    /// Create a client for Codeberg.
    pub fn new(token: &str, org: impl Into<String>) -> Result<Self, ScmError> {
        Self::with_api_base(token, org, DEFAULT_API_BASE)
    }

    /// Create a client for another instance. `api_base` includes the API
    /// prefix, e.g. `https://forgejo.example.com/api/v1`.
    pub fn with_api_base(
        token: &str,
        org: impl Into<String>,
        api_base: &str,
    ) -> Result<Self, ScmError> {
        let http = RestClient::new(api_base, Auth::Token(token.to_string()), &[])?;
        Ok(Self {
            http,
            org: org.into(),
            timeouts: Timeouts::default(),
        })
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn org(&self) -> &str {
        &self.org
    }

    fn repo(&self, repo: &str) -> RepoRef {
        RepoRef::parse(repo, &self.org)
    }

    /// `repos/{owner}/{name}/{rest..}`; `/` inside `rest` separates segments.
    fn repo_url(&self, repo: &RepoRef, rest: &[&str]) -> Url {
        let mut segments = vec!["repos", repo.owner.as_str(), repo.name.as_str()];
        for part in rest {
            segments.extend(part.split('/').filter(|s| !s.is_empty()));
        }
        self.http.url(&segments)
    }

    async fn get_pull_request(&self, repo: &RepoRef, number: u64) -> Result<PullRequest, ScmError> {
        let ctx = format!("get PR #{} in {}", number, repo);
        let url = self.repo_url(repo, &["pulls", number.to_string().as_str()]);
        let pr: ForgejoPullRequest = self.http.send_json(&ctx, self.http.get(url)).await?;
        Ok(pr.into())
    }
}

#[async_trait]
impl ScmClient for ForgejoClient {
    fn provider(&self) -> GitProvider {
        GitProvider::Forgejo
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

        // Forgejo answers 404 for an unknown old branch but 409 or 422 for
        // other failures; confirm the base first for a precise NotFound.
        let url = self.repo_url(&r, &["branches", base_branch]);
        self.http.send_empty(&ctx, self.http.get(url)).await?;

        let body = CreateBranchBody {
            new_branch_name: new_branch,
            old_ref_name: if base_revision.is_empty() {
                base_branch
            } else {
                base_revision
            },
        };
        let url = self.repo_url(&r, &["branches"]);
        let response = self
            .http
            .send(&ctx, self.http.post(url).json(&body))
            .await?;
        if response.status() != StatusCode::CREATED {
            return Err(ScmError::provider(
                &ctx,
                Some(response.status().as_u16()),
                "branch creation did not answer 201 Created",
            ));
        }
        info!(repo = %r, branch = new_branch, "created branch");

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
        let url = self.repo_url(&r, &["branches", branch]);
        self.http.send_empty(&ctx, self.http.delete(url)).await?;
        info!(repo = %r, branch, "deleted branch");
        Ok(())
    }

    async fn branch_exists(&self, repo: &str, branch: &str) -> Result<bool, ScmError> {
        let r = self.repo(repo);
        let ctx = format!("check branch '{}' in {}", branch, r);
        let url = self.repo_url(&r, &["branches", branch]);
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
        let prs: Vec<ForgejoPullRequest> = self
            .http
            .get_all_pages(&ctx, url, "limit", PAGE_LIMIT)
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
            head,
            base,
            title,
            body,
        };
        let url = self.repo_url(&r, &["pulls"]);
        let pr: ForgejoPullRequest = self
            .http
            .send_json(&ctx, self.http.post(url).json(&request))
            .await?;
        info!(repo = %r, number = pr.number, "created pull request");
        Ok(pr.into())
    }

    async fn merge_pull_request(&self, repo: &str, number: u64) -> Result<PullRequest, ScmError> {
        let r = self.repo(repo);
        let ctx = format!("merge PR #{} in {}", number, r);
        let url = self.repo_url(&r, &["pulls", number.to_string().as_str(), "merge"]);
        self.http
            .send_empty(&ctx, self.http.post(url).json(&MergePrBody { style: "merge" }))
            .await?;

        let pr = self.get_pull_request(&r, number).await?;
        if pr.merge_commit_sha.is_empty() {
            return Err(ScmError::provider(
                &ctx,
                None,
                "merge succeeded but the pull request has no merge commit",
            ));
        }
        info!(repo = %r, number, sha = %pr.merge_commit_sha, "merged pull request");
        Ok(pr)
    }

    async fn delete_branch_and_close_pull_request(
        &self,
        repo: &str,
        number: u64,
    ) -> Result<(), ScmError> {
        let r = self.repo(repo);
        let pr = self.get_pull_request(&r, number).await?;
        if !pr.source_branch.is_empty() {
            self.delete_branch(repo, &pr.source_branch)
                .await
                .ignore_not_found()?;
        }

        let ctx = format!("close PR #{} in {}", number, r);
        let url = self.repo_url(&r, &["pulls", number.to_string().as_str()]);
        self.http
            .send_empty(
                &ctx,
                self.http.patch(url).json(&EditPrBody { state: "closed" }),
            )
            .await?;
        info!(repo = %r, number, "closed pull request");
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
            content: encode_base64(content),
            branch,
            message: COMMIT_MESSAGE,
        };
        let url = self.repo_url(&r, &["contents", path]);
        let written: ForgejoFileResponse = self
            .http
            .send_json(&ctx, self.http.post(url).json(&body))
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
        let file: ForgejoContents = self.http.send_json(&ctx, self.http.get(url)).await?;
        let content = match (file.encoding.as_deref(), file.content) {
            (Some("base64"), Some(raw)) => decode_base64(&ctx, &raw)?,
            (_, Some(raw)) => raw,
            (_, None) => String::new(),
        };
        Ok(RepositoryFile {
            commit_sha: file.last_commit_sha.unwrap_or(file.sha),
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
        let hooks: Vec<ForgejoHook> = self
            .http
            .get_all_pages(&ctx, url, "limit", PAGE_LIMIT)
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
            info!(repo = %r, hook = hook.id, "removed webhook");
        }
        Ok(())
    }

    async fn fork_repository(&self, source_repo: &str, target_repo: &str) -> Result<(), ScmError> {
        let source = self.repo(source_repo);
        let target = self.repo(target_repo);
        let ctx = format!("fork {} into {}", source, target);
        let body = ForkBody {
            organization: &target.owner,
            name: &target.name,
        };

        // Any failure is retried until the fork deadline.
        wait_until(&format!("{} to succeed", ctx), self.timeouts.fork, || {
            let url = self.repo_url(&source, &["forks"]);
            let request = self.http.post(url).json(&body);
            let ctx = &ctx;
            async move {
                self.http.send_empty(ctx, request).await?;
                Ok::<_, ScmError>(true)
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
        let ctx = format!("get combined status for {} in {}", sha, r);
        let url = self.repo_url(&r, &["commits", sha, "status"]);
        let combined: ForgejoCombinedStatus = self.http.send_json(&ctx, self.http.get(url)).await?;
        Ok(combined
            .statuses
            .unwrap_or_default()
            .into_iter()
            .map(|s| CommitStatus::new(s.context, StatusState::parse(&s.status)))
            .collect())
    }
}

// --------------------------------------------------------------------------
// API Request/Response Types
// --------------------------------------------------------------------------

#[derive(Serialize)]
struct CreateBranchBody<'a> {
    new_branch_name: &'a str,
    old_ref_name: &'a str,
}

#[derive(Serialize)]
struct CreatePrBody<'a> {
    head: &'a str,
    base: &'a str,
    title: &'a str,
    body: &'a str,
}

#[derive(Serialize)]
struct MergePrBody<'a> {
    #[serde(rename = "Do")]
    style: &'a str,
}

#[derive(Serialize)]
struct EditPrBody<'a> {
    state: &'a str,
}

#[derive(Serialize)]
struct CreateFileBody<'a> {
    content: String,
    branch: &'a str,
    message: &'a str,
}

#[derive(Serialize)]
struct ForkBody<'a> {
    organization: &'a str,
    name: &'a str,
}

/// Forgejo PR format. `number` is the repository-local index.
#[derive(Deserialize)]
struct ForgejoPullRequest {
    number: u64,
    head: ForgejoBranchRef,
    base: ForgejoBranchRef,
    #[serde(default)]
    merged: bool,
    merge_commit_sha: Option<String>,
}

#[derive(Deserialize)]
struct ForgejoBranchRef {
    #[serde(rename = "ref")]
    ref_name: String,
    #[serde(default)]
    sha: String,
}

#[derive(Deserialize)]
struct ForgejoFileResponse {
    commit: ForgejoCommitMeta,
}

#[derive(Deserialize)]
struct ForgejoCommitMeta {
    sha: String,
}

#[derive(Deserialize)]
struct ForgejoContents {
    sha: String,
    last_commit_sha: Option<String>,
    content: Option<String>,
    encoding: Option<String>,
}

#[derive(Deserialize)]
struct ForgejoHook {
    id: u64,
    config: ForgejoHookConfig,
}

#[derive(Deserialize)]
struct ForgejoHookConfig {
    url: Option<String>,
}

#[derive(Deserialize)]
struct ForgejoCombinedStatus {
    statuses: Option<Vec<ForgejoStatus>>,
}

#[derive(Deserialize)]
struct ForgejoStatus {
    context: String,
    status: String,
}

impl From<ForgejoPullRequest> for PullRequest {
    fn from(pr: ForgejoPullRequest) -> Self {
        let merge_commit_sha = if pr.merged {
            pr.merge_commit_sha.unwrap_or_default()
        } else {
            String::new()
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
