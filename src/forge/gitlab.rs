//! forge::gitlab
//!
//! GitLab adapter over the REST API (v4).
//!
//! # Design
//!
//! Projects are addressed by their full path (`group/sub/project`), sent
//! as a single URL-encoded path segment. Merge requests are identified by
//! their project-local `iid`, which becomes [`PullRequest::number`].
//!
//! GitLab specifics handled here:
//!
//! - Listing merge requests is retried on transient failures (GitLab.com
//!   answers 408 under load), up to five attempts with doubling delays.
//! - Forks are imported asynchronously. The fork request is retried, then
//!   the project's `import_status` is polled until it reads `finished`.
//! - Deleting a project first renames it (`-deleted-<id>` or
//!   `-deletion_scheduled-<id>`); a renamed project gets a second,
//!   permanent delete.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::error::{IgnoreNotFound, ScmError};
use super::http::{decode_base64, Auth, RestClient};
use super::traits::ScmClient;
use super::types::{CommitStatus, GitProvider, PullRequest, RepoRef, RepositoryFile, StatusState};
use crate::wait::{wait_until, Timeouts};

/// Default GitLab API base URL.
pub const DEFAULT_API_BASE: &str = "https://gitlab.com/api/v4";

const COMMIT_MESSAGE: &str = "e2e test commit message";

const PER_PAGE: usize = 100;

/// Attempts for list calls that GitLab may time out.
const LIST_ATTEMPTS: u32 = 5;

/// First delay between list attempts; doubles on each retry.
const LIST_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Name fragments GitLab appends to a project on its first delete.
const DELETED_MARKERS: [&str; 2] = ["-deleted-", "-deletion_scheduled-"];

/// GitLab adapter.
pub struct GitLabClient {
    http: RestClient,
    group: String,
    timeouts: Timeouts,
    retry_delay: Duration,
}

impl std::fmt::Debug for GitLabClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitLabClient")
            .field("api_base", &self.http.base().as_str())
            .field("group", &self.group)
            .finish()
    }
}

impl GitLabClient {
    /// Create a client for `gitlab.com`.
    pub fn new(token: &str, group: impl Into<String>) -> Result<Self, ScmError> {
        Self::with_api_base(token, group, DEFAULT_API_BASE)
    }

    /// Create a client for a self-managed instance, e.g.
    /// `https://gitlab.example.com/api/v4`.
    pub fn with_api_base(
        token: &str,
        group: impl Into<String>,
        api_base: &str,
    ) -> Result<Self, ScmError> {
        let http = RestClient::new(api_base, Auth::PrivateToken(token.to_string()), &[])?;
        Ok(Self {
            http,
            group: group.into(),
            timeouts: Timeouts::default(),
            retry_delay: LIST_RETRY_DELAY,
        })
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Replace the initial delay between list retries.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Group that bare project names and forks resolve to.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Full project path for `repo`.
    fn project(&self, repo: &str) -> String {
        RepoRef::parse(repo, &self.group).full_path()
    }

    /// `projects/{id}/{rest..}`. Each element of `rest` is one segment, so
    /// branch names and file paths containing `/` are encoded.
    fn project_url(&self, project: &str, rest: &[&str]) -> Url {
        let mut segments = vec!["projects", project];
        segments.extend_from_slice(rest);
        self.http.url(&segments)
    }

    async fn get_merge_request(&self, project: &str, iid: u64) -> Result<PullRequest, ScmError> {
        let ctx = format!("get MR !{} in {}", iid, project);
        let url = self.project_url(project, &["merge_requests", iid.to_string().as_str()]);
        let mr: GitLabMergeRequest = self.http.send_json(&ctx, self.http.get(url)).await?;
        Ok(mr.into())
    }

    async fn get_project(&self, ctx: &str, project: &str) -> Result<GitLabProject, ScmError> {
        let url = self.project_url(project, &[]);
        self.http.send_json(ctx, self.http.get(url)).await
    }

    /// Second, permanent delete of a project already renamed by a first one.
    async fn delete_permanently(&self, path_with_namespace: &str) -> Result<(), ScmError> {
        let ctx = format!("permanently delete project {}", path_with_namespace);
        let mut url = self.project_url(path_with_namespace, &[]);
        url.query_pairs_mut()
            .append_pair("full_path", path_with_namespace)
            .append_pair("permanently_remove", "true");
        self.http.send_empty(&ctx, self.http.delete(url)).await?;
        info!(project = path_with_namespace, "permanently deleted project");
        Ok(())
    }

    /// Retry `op` on transient failures with doubling delays.
    async fn retry_transient<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, ScmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ScmError>>,
    {
        let mut delay = self.retry_delay;
        let mut attempt = 1;
        loop {
            match op().await {
                Err(e) if e.is_retryable() && attempt < LIST_ATTEMPTS => {
                    warn!(what, attempt, error = %e, "retrying");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

/// Whether `actual` is `requested` renamed by a first delete.
fn is_soft_deleted(requested: &str, actual: &str) -> bool {
    actual != requested
        && DELETED_MARKERS
            .iter()
            .any(|marker| actual.contains(&format!("{}{}", requested, marker)))
}

#[async_trait]
impl ScmClient for GitLabClient {
    fn provider(&self) -> GitProvider {
        GitProvider::GitLab
    }

    async fn create_branch(
        &self,
        repo: &str,
        base_branch: &str,
        base_revision: &str,
        new_branch: &str,
    ) -> Result<(), ScmError> {
        let project = self.project(repo);
        let ctx = format!("create branch '{}' in {}", new_branch, project);

        // GitLab reports an unknown ref as 400; check the base explicitly so
        // a missing base is NotFound.
        let url = self.project_url(&project, &["repository", "branches", base_branch]);
        self.http.send_empty(&ctx, self.http.get(url)).await?;

        let from = if base_revision.is_empty() {
            base_branch
        } else {
            base_revision
        };
        let mut url = self.project_url(&project, &["repository", "branches"]);
        url.query_pairs_mut()
            .append_pair("branch", new_branch)
            .append_pair("ref", from);
        self.http.send_empty(&ctx, self.http.post(url)).await?;
        info!(project = %project, branch = new_branch, from, "created branch");

        let what = format!("branch '{}' in {} to exist", new_branch, project);
        wait_until(&what, self.timeouts.branch, || {
            self.branch_exists(repo, new_branch)
        })
        .await?;
        Ok(())
    }

    async fn delete_branch(&self, repo: &str, branch: &str) -> Result<(), ScmError> {
        let project = self.project(repo);
        let ctx = format!("delete branch '{}' in {}", branch, project);
        let url = self.project_url(&project, &["repository", "branches", branch]);
        self.http.send_empty(&ctx, self.http.delete(url)).await?;
        info!(project = %project, branch, "deleted branch");
        Ok(())
    }

    async fn branch_exists(&self, repo: &str, branch: &str) -> Result<bool, ScmError> {
        let project = self.project(repo);
        let ctx = format!("check branch '{}' in {}", branch, project);
        let url = self.project_url(&project, &["repository", "branches", branch]);
        match self.http.send_empty(&ctx, self.http.get(url)).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list_pull_requests(&self, repo: &str) -> Result<Vec<PullRequest>, ScmError> {
        let project = self.project(repo);
        let ctx = format!("list merge requests in {}", project);
        let mut url = self.project_url(&project, &["merge_requests"]);
        url.query_pairs_mut().append_pair("state", "opened");

        let mrs: Vec<GitLabMergeRequest> = self
            .retry_transient(&ctx, || {
                self.http
                    .get_all_pages(&ctx, url.clone(), "per_page", PER_PAGE)
            })
            .await?;
        Ok(mrs.into_iter().map(Into::into).collect())
    }

    async fn create_pull_request(
        &self,
        repo: &str,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<PullRequest, ScmError> {
        let project = self.project(repo);
        let ctx = format!("create MR {} -> {} in {}", head, base, project);
        let request = CreateMergeRequestBody {
            source_branch: head,
            target_branch: base,
            title,
            description: body,
        };
        let url = self.project_url(&project, &["merge_requests"]);
        let mr: GitLabMergeRequest = self
            .http
            .send_json(&ctx, self.http.post(url).json(&request))
            .await?;
        info!(project = %project, iid = mr.iid, "created merge request");
        Ok(mr.into())
    }

    async fn merge_pull_request(&self, repo: &str, number: u64) -> Result<PullRequest, ScmError> {
        let project = self.project(repo);
        let ctx = format!("merge MR !{} in {}", number, project);
        let url = self.project_url(
            &project,
            &["merge_requests", number.to_string().as_str(), "merge"],
        );
        let merged: GitLabMergeRequest = self
            .http
            .send_json(&ctx, self.http.put(url).json(&AcceptMergeRequestBody { squash: false }))
            .await?;

        let mut pr: PullRequest = merged.into();
        if pr.merge_commit_sha.is_empty() {
            // GitLab records the merge commit asynchronously.
            let latest: Mutex<Option<PullRequest>> = Mutex::new(None);
            let what = format!("merge commit of MR !{} in {}", number, project);
            let recorded = wait_until(&what, self.timeouts.branch, || {
                let (project, latest) = (&project, &latest);
                async move {
                    let mr = self.get_merge_request(project, number).await?;
                    let done = mr.is_merged();
                    *latest.lock().unwrap_or_else(|p| p.into_inner()) = Some(mr);
                    Ok::<_, ScmError>(done)
                }
            })
            .await;
            if let Err(e) = recorded {
                return Err(ScmError::provider(
                    &ctx,
                    None,
                    format!("merge reported no merge commit: {}", e),
                ));
            }
            if let Some(mr) = latest.into_inner().unwrap_or_else(|p| p.into_inner()) {
                pr = mr;
            }
        }
        info!(project = %project, iid = number, sha = %pr.merge_commit_sha, "merged merge request");
        Ok(pr)
    }

    async fn delete_branch_and_close_pull_request(
        &self,
        repo: &str,
        number: u64,
    ) -> Result<(), ScmError> {
        let project = self.project(repo);
        let mr = self.get_merge_request(&project, number).await?;
        self.delete_branch(repo, &mr.source_branch)
            .await
            .ignore_not_found()?;

        let ctx = format!("close MR !{} in {}", number, project);
        let url = self.project_url(&project, &["merge_requests", number.to_string().as_str()]);
        self.http
            .send_empty(
                &ctx,
                self.http.put(url).json(&UpdateMergeRequestBody {
                    state_event: "close",
                }),
            )
            .await?;
        info!(project = %project, iid = number, "closed merge request");
        Ok(())
    }

    async fn create_file(
        &self,
        repo: &str,
        path: &str,
        content: &str,
        branch: &str,
    ) -> Result<RepositoryFile, ScmError> {
        let project = self.project(repo);
        let ctx = format!("create file '{}' on '{}' in {}", path, branch, project);
        let body = CreateFileBody {
            branch,
            content,
            commit_message: COMMIT_MESSAGE,
        };
        let url = self.project_url(&project, &["repository", "files", path]);
        self.http
            .send_empty(&ctx, self.http.post(url).json(&body))
            .await?;

        // The create response carries no commit id.
        self.get_file(repo, path, branch).await
    }

    async fn get_file(
        &self,
        repo: &str,
        path: &str,
        branch: &str,
    ) -> Result<RepositoryFile, ScmError> {
        let project = self.project(repo);
        let ctx = format!("get file '{}' on '{}' in {}", path, branch, project);
        let mut url = self.project_url(&project, &["repository", "files", path]);
        url.query_pairs_mut().append_pair("ref", branch);
        let file: GitLabFile = self.http.send_json(&ctx, self.http.get(url)).await?;
        let content = if file.encoding == "base64" {
            decode_base64(&ctx, &file.content)?
        } else {
            file.content
        };
        Ok(RepositoryFile {
            commit_sha: file.commit_id,
            content,
        })
    }

    async fn cleanup_webhooks(&self, repo: &str, host_substring: &str) -> Result<(), ScmError> {
        if host_substring.is_empty() {
            return Err(ScmError::InvalidArgument(
                "webhook host substring must not be empty".into(),
            ));
        }
        let project = self.project(repo);
        let ctx = format!("clean up webhooks in {}", project);
        let url = self.project_url(&project, &["hooks"]);
        let hooks: Vec<GitLabHook> = self
            .http
            .get_all_pages(&ctx, url, "per_page", PER_PAGE)
            .await?;

        if let Some(hook) = hooks.into_iter().find(|h| h.url.contains(host_substring)) {
            let url = self.project_url(&project, &["hooks", hook.id.to_string().as_str()]);
            self.http.send_empty(&ctx, self.http.delete(url)).await?;
            info!(project = %project, hook = hook.id, url = %hook.url, "removed webhook");
        }
        Ok(())
    }

    async fn fork_repository(&self, source_repo: &str, target_repo: &str) -> Result<(), ScmError> {
        let source = self.project(source_repo);
        let target = RepoRef::parse(target_repo, &self.group);
        let ctx = format!("fork {} into {}", source, target);
        let body = ForkBody {
            name: &target.name,
            path: &target.name,
            namespace_path: &target.owner,
        };

        let forked: Mutex<Option<GitLabProject>> = Mutex::new(None);
        wait_until(&format!("{} to be accepted", ctx), self.timeouts.fork, || {
            let url = self.project_url(&source, &["fork"]);
            let request = self.http.post(url).json(&body);
            let (ctx, forked) = (&ctx, &forked);
            async move {
                let project: GitLabProject = self.http.send_json(ctx, request).await?;
                *forked.lock().unwrap_or_else(|p| p.into_inner()) = Some(project);
                Ok::<_, ScmError>(true)
            }
        })
        .await?;
        let project_id = forked
            .into_inner()
            .unwrap_or_else(|p| p.into_inner())
            .map(|p| p.id.to_string())
            .ok_or_else(|| ScmError::provider(&ctx, None, "fork accepted without a project"))?;

        // failed/timeout end the wait early; the outcome is checked below.
        let import_status: Mutex<String> = Mutex::new(String::new());
        let what = format!("import of {} to finish", target);
        wait_until(&what, self.timeouts.fork_ready, || {
            let (ctx, import_status, project_id) = (&ctx, &import_status, &project_id);
            async move {
                let project = self.get_project(ctx, project_id).await?;
                let status = project.import_status.unwrap_or_default();
                let done = matches!(status.as_str(), "finished" | "failed" | "timeout");
                *import_status.lock().unwrap_or_else(|p| p.into_inner()) = status;
                Ok::<_, ScmError>(done)
            }
        })
        .await?;

        let status = import_status.into_inner().unwrap_or_else(|p| p.into_inner());
        if status != "finished" {
            return Err(ScmError::provider(
                &ctx,
                None,
                format!("fork import ended with import_status={}", status),
            ));
        }
        info!(source = %source, target = %target, "forked project");
        Ok(())
    }

    async fn delete_repository_if_exists(&self, repo: &str) -> Result<bool, ScmError> {
        let project = self.project(repo);
        let ctx = format!("delete project {}", project);

        let existing = match self.get_project(&ctx, &project).await {
            Ok(p) => p,
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e),
        };
        if is_soft_deleted(&project, &existing.path_with_namespace) {
            self.delete_permanently(&existing.path_with_namespace).await?;
            return Ok(true);
        }

        let url = self.project_url(&project, &[]);
        if self
            .http
            .send_empty(&ctx, self.http.delete(url))
            .await
            .ignore_not_found()?
            .is_none()
        {
            return Ok(false);
        }
        info!(project = %project, "deleted project");

        let what = format!("project {} to be deleted", project);
        wait_until(&what, self.timeouts.delete, || {
            let (ctx, project) = (&ctx, &project);
            async move {
                match self.get_project(ctx, project).await {
                    Err(e) if e.is_not_found() => Ok(true),
                    Err(e) => Err(e),
                    Ok(p) if is_soft_deleted(project, &p.path_with_namespace) => self
                        .delete_permanently(&p.path_with_namespace)
                        .await
                        .map(|()| true),
                    Ok(_) => Ok(false),
                }
            }
        })
        .await?;
        Ok(true)
    }

    async fn list_commit_statuses(
        &self,
        repo: &str,
        sha: &str,
    ) -> Result<Vec<CommitStatus>, ScmError> {
        let project = self.project(repo);
        let ctx = format!("list commit statuses for {} in {}", sha, project);
        let url = self.project_url(&project, &["repository", "commits", sha, "statuses"]);
        let statuses: Vec<GitLabCommitStatus> = self
            .http
            .get_all_pages(&ctx, url, "per_page", PER_PAGE)
            .await?;
        Ok(statuses
            .into_iter()
            .map(|s| CommitStatus::new(s.name, StatusState::parse(&s.status)))
            .collect())
    }
}

// --------------------------------------------------------------------------
// API Request/Response Types
// --------------------------------------------------------------------------

#[derive(Serialize)]
struct CreateMergeRequestBody<'a> {
    source_branch: &'a str,
    target_branch: &'a str,
    title: &'a str,
    description: &'a str,
}

#[derive(Serialize)]
struct AcceptMergeRequestBody {
    squash: bool,
}

#[derive(Serialize)]
struct UpdateMergeRequestBody<'a> {
    state_event: &'a str,
}

#[derive(Serialize)]
struct CreateFileBody<'a> {
    branch: &'a str,
    content: &'a str,
    commit_message: &'a str,
}

#[derive(Serialize)]
struct ForkBody<'a> {
    name: &'a str,
    path: &'a str,
    namespace_path: &'a str,
}

#[derive(Deserialize)]
struct GitLabMergeRequest {
    iid: u64,
    source_branch: String,
    target_branch: String,
    sha: Option<String>,
    merge_commit_sha: Option<String>,
}

#[derive(Deserialize)]
struct GitLabFile {
    content: String,
    #[serde(default)]
    encoding: String,
    commit_id: String,
}

#[derive(Deserialize)]
struct GitLabHook {
    id: u64,
    url: String,
}

#[derive(Deserialize)]
struct GitLabProject {
    id: u64,
    path_with_namespace: String,
    import_status: Option<String>,
}

#[derive(Deserialize)]
struct GitLabCommitStatus {
    name: String,
    status: String,
}

impl From<GitLabMergeRequest> for PullRequest {
    fn from(mr: GitLabMergeRequest) -> Self {
        PullRequest {
            number: mr.iid,
            source_branch: mr.source_branch,
            target_branch: mr.target_branch,
            head_sha: mr.sha.unwrap_or_default(),
            merge_commit_sha: mr.merge_commit_sha.unwrap_or_default(),
        }
    }
}
