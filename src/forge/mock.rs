//! forge::mock
//!
//! In-memory SCM client for deterministic testing.
//!
//! # Design
//!
//! `MockClient` implements [`ScmClient`] over a small in-memory model of
//! repositories: branches pointing at commit SHAs, pull requests, files per
//! branch, webhooks and scripted CI statuses. It follows the same error
//! classification as the real adapters, so contract tests written against
//! it hold for GitHub, GitLab and Forgejo as well.
//!
//! Writes are visible immediately; nothing here is eventually consistent.
//!
//! # Example
//!
//! ```
//! use forgeops::forge::mock::MockClient;
//! use forgeops::forge::{GitProvider, ScmClient};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let client = MockClient::new(GitProvider::GitHub).with_repository("org/app", &["main"]);
//!
//! client.create_branch("org/app", "main", "", "feat-x").await.unwrap();
//! assert!(client.branch_exists("org/app", "feat-x").await.unwrap());
//!
//! let pr = client
//!     .create_pull_request("org/app", "Add x", "", "feat-x", "main")
//!     .await
//!     .unwrap();
//! assert_eq!(pr.number, 1);
//! # }
//! ```

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use super::error::ScmError;
use super::traits::ScmClient;
use super::types::{CommitStatus, GitProvider, PullRequest, RepoRef, RepositoryFile};

/// Owner used for bare repository names.
pub const MOCK_ORG: &str = "mock-org";

/// Mock SCM client for testing.
///
/// Clones share state through an internal `Arc<Mutex<...>>`.
#[derive(Debug, Clone)]
pub struct MockClient {
    provider: GitProvider,
    inner: Arc<Mutex<MockInner>>,
}

#[derive(Debug, Default)]
struct MockInner {
    repos: HashMap<String, MockRepo>,
    /// Counter feeding generated commit SHAs.
    next_commit: u64,
    next_hook_id: u64,
    fail_on: Option<FailOn>,
    operations: Vec<MockOperation>,
}

#[derive(Debug, Default, Clone)]
struct MockRepo {
    /// Branch name to tip SHA.
    branches: BTreeMap<String, String>,
    pulls: BTreeMap<u64, MockPull>,
    next_pr_number: u64,
    /// `(branch, path)` to file.
    files: HashMap<(String, String), RepositoryFile>,
    /// `(id, url)` in creation order.
    hooks: Vec<(u64, String)>,
    /// Per-SHA status snapshots; the last one repeats once the rest are used.
    statuses: HashMap<String, VecDeque<Vec<CommitStatus>>>,
}

#[derive(Debug, Clone)]
struct MockPull {
    pr: PullRequest,
    open: bool,
}

/// Which operation should fail, and with what error.
///
/// The failure is persistent until [`MockClient::clear_fail_on`].
#[derive(Debug, Clone)]
pub enum FailOn {
    CreateBranch(ScmError),
    DeleteBranch(ScmError),
    BranchExists(ScmError),
    ListPullRequests(ScmError),
    CreatePullRequest(ScmError),
    MergePullRequest(ScmError),
    ClosePullRequest(ScmError),
    CreateFile(ScmError),
    GetFile(ScmError),
    CleanupWebhooks(ScmError),
    ForkRepository(ScmError),
    DeleteRepository(ScmError),
    ListCommitStatuses(ScmError),
}

/// Recorded operation for test verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOperation {
    CreateBranch {
        repo: String,
        base: String,
        branch: String,
    },
    DeleteBranch {
        repo: String,
        branch: String,
    },
    BranchExists {
        repo: String,
        branch: String,
    },
    ListPullRequests {
        repo: String,
    },
    CreatePullRequest {
        repo: String,
        head: String,
        base: String,
    },
    MergePullRequest {
        repo: String,
        number: u64,
    },
    ClosePullRequest {
        repo: String,
        number: u64,
    },
    CreateFile {
        repo: String,
        path: String,
        branch: String,
    },
    GetFile {
        repo: String,
        path: String,
        branch: String,
    },
    CleanupWebhooks {
        repo: String,
        host_substring: String,
    },
    ForkRepository {
        source: String,
        target: String,
    },
    DeleteRepository {
        repo: String,
    },
    ListCommitStatuses {
        repo: String,
        sha: String,
    },
}

impl MockClient {
    /// Create an empty mock that reports itself as `provider`.
    pub fn new(provider: GitProvider) -> Self {
        Self {
            provider,
            inner: Arc::new(Mutex::new(MockInner {
                next_commit: 1,
                next_hook_id: 1,
                ..MockInner::default()
            })),
        }
    }

    /// Add a repository with the given branches, all pointing at one
    /// initial commit.
    pub fn with_repository(self, repo: &str, branches: &[&str]) -> Self {
        {
            let mut inner = self.lock();
            let sha = inner.new_sha();
            let mock = MockRepo {
                branches: branches
                    .iter()
                    .map(|b| (b.to_string(), sha.clone()))
                    .collect(),
                next_pr_number: 1,
                ..MockRepo::default()
            };
            inner.repos.insert(key(repo), mock);
        }
        self
    }

    /// Configure an operation to fail.
    ///
    /// ```
    /// use forgeops::forge::mock::{FailOn, MockClient};
    /// use forgeops::forge::{GitProvider, ScmError};
    ///
    /// let client = MockClient::new(GitProvider::GitHub)
    ///     .fail_on(FailOn::CreateBranch(ScmError::transient("create", "HTTP 503")));
    /// ```
    pub fn fail_on(self, fail_on: FailOn) -> Self {
        self.lock().fail_on = Some(fail_on);
        self
    }

    pub fn clear_fail_on(&self) {
        self.lock().fail_on = None;
    }

    /// Register a webhook.
    pub fn add_webhook(&self, repo: &str, url: &str) {
        let mut inner = self.lock();
        let id = inner.next_hook_id;
        inner.next_hook_id += 1;
        if let Some(r) = inner.repos.get_mut(&key(repo)) {
            r.hooks.push((id, url.to_string()));
        }
    }

    /// Webhook URLs currently registered, in creation order.
    pub fn webhooks(&self, repo: &str) -> Vec<String> {
        self.lock()
            .repos
            .get(&key(repo))
            .map(|r| r.hooks.iter().map(|(_, url)| url.clone()).collect())
            .unwrap_or_default()
    }

    /// Script the statuses reported for `sha`.
    ///
    /// Each call to `list_commit_statuses` consumes one snapshot; the last
    /// snapshot keeps being returned.
    pub fn script_statuses(&self, repo: &str, sha: &str, snapshots: Vec<Vec<CommitStatus>>) {
        if let Some(r) = self.lock().repos.get_mut(&key(repo)) {
            r.statuses.insert(sha.to_string(), snapshots.into());
        }
    }

    /// Tip SHA of a branch.
    pub fn branch_sha(&self, repo: &str, branch: &str) -> Option<String> {
        self.lock()
            .repos
            .get(&key(repo))
            .and_then(|r| r.branches.get(branch).cloned())
    }

    /// Whether a repository exists.
    pub fn has_repository(&self, repo: &str) -> bool {
        self.lock().repos.contains_key(&key(repo))
    }

    /// Open pull request by number, if any (for test verification).
    pub fn is_open(&self, repo: &str, number: u64) -> bool {
        self.lock()
            .repos
            .get(&key(repo))
            .and_then(|r| r.pulls.get(&number))
            .is_some_and(|p| p.open)
    }

    /// All recorded operations.
    pub fn operations(&self) -> Vec<MockOperation> {
        self.lock().operations.clone()
    }

    pub fn clear_operations(&self) {
        self.lock().operations.clear();
    }

    fn lock(&self) -> MutexGuard<'_, MockInner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Record `op`, then fail if the configured failure matches.
    fn begin(&self, op: MockOperation) -> Result<MutexGuard<'_, MockInner>, ScmError> {
        let mut inner = self.lock();
        let failure = match (&inner.fail_on, &op) {
            (Some(FailOn::CreateBranch(e)), MockOperation::CreateBranch { .. })
            | (Some(FailOn::DeleteBranch(e)), MockOperation::DeleteBranch { .. })
            | (Some(FailOn::BranchExists(e)), MockOperation::BranchExists { .. })
            | (Some(FailOn::ListPullRequests(e)), MockOperation::ListPullRequests { .. })
            | (Some(FailOn::CreatePullRequest(e)), MockOperation::CreatePullRequest { .. })
            | (Some(FailOn::MergePullRequest(e)), MockOperation::MergePullRequest { .. })
            | (Some(FailOn::ClosePullRequest(e)), MockOperation::ClosePullRequest { .. })
            | (Some(FailOn::CreateFile(e)), MockOperation::CreateFile { .. })
            | (Some(FailOn::GetFile(e)), MockOperation::GetFile { .. })
            | (Some(FailOn::CleanupWebhooks(e)), MockOperation::CleanupWebhooks { .. })
            | (Some(FailOn::ForkRepository(e)), MockOperation::ForkRepository { .. })
            | (Some(FailOn::DeleteRepository(e)), MockOperation::DeleteRepository { .. })
            | (Some(FailOn::ListCommitStatuses(e)), MockOperation::ListCommitStatuses { .. }) => {
                Some(e.clone())
            }
            _ => None,
        };
        inner.operations.push(op);
        match failure {
            Some(e) => Err(e),
            None => Ok(inner),
        }
    }
}

impl MockInner {
    fn new_sha(&mut self) -> String {
        let n = self.next_commit;
        self.next_commit += 1;
        format!("{:040x}", n)
    }

    fn repo_mut(&mut self, ctx: &str, repo: &str) -> Result<&mut MockRepo, ScmError> {
        self.repos
            .get_mut(&key(repo))
            .ok_or_else(|| ScmError::not_found(ctx, format!("repository {} does not exist", key(repo))))
    }
}

fn key(repo: &str) -> String {
    RepoRef::parse(repo, MOCK_ORG).full_path()
}

fn missing_branch(ctx: &str, branch: &str) -> ScmError {
    ScmError::not_found(ctx, format!("branch '{}' does not exist", branch))
}

#[async_trait]
impl ScmClient for MockClient {
    fn provider(&self) -> GitProvider {
        self.provider
    }

    async fn create_branch(
        &self,
        repo: &str,
        base_branch: &str,
        base_revision: &str,
        new_branch: &str,
    ) -> Result<(), ScmError> {
        let mut inner = self.begin(MockOperation::CreateBranch {
            repo: key(repo),
            base: base_branch.to_string(),
            branch: new_branch.to_string(),
        })?;
        let ctx = format!("create branch '{}' in {}", new_branch, key(repo));
        let r = inner.repo_mut(&ctx, repo)?;
        let base_sha = r
            .branches
            .get(base_branch)
            .cloned()
            .ok_or_else(|| missing_branch(&ctx, base_branch))?;
        if r.branches.contains_key(new_branch) {
            return Err(ScmError::conflict(&ctx, "branch already exists"));
        }
        let sha = if base_revision.is_empty() {
            base_sha
        } else {
            base_revision.to_string()
        };
        r.branches.insert(new_branch.to_string(), sha);
        Ok(())
    }

    async fn delete_branch(&self, repo: &str, branch: &str) -> Result<(), ScmError> {
        let mut inner = self.begin(MockOperation::DeleteBranch {
            repo: key(repo),
            branch: branch.to_string(),
        })?;
        let ctx = format!("delete branch '{}' in {}", branch, key(repo));
        let r = inner.repo_mut(&ctx, repo)?;
        r.branches
            .remove(branch)
            .map(|_| ())
            .ok_or_else(|| missing_branch(&ctx, branch))
    }

    async fn branch_exists(&self, repo: &str, branch: &str) -> Result<bool, ScmError> {
        let mut inner = self.begin(MockOperation::BranchExists {
            repo: key(repo),
            branch: branch.to_string(),
        })?;
        let ctx = format!("check branch '{}' in {}", branch, key(repo));
        Ok(inner.repo_mut(&ctx, repo)?.branches.contains_key(branch))
    }

    async fn list_pull_requests(&self, repo: &str) -> Result<Vec<PullRequest>, ScmError> {
        let mut inner = self.begin(MockOperation::ListPullRequests { repo: key(repo) })?;
        let ctx = format!("list pull requests in {}", key(repo));
        let r = inner.repo_mut(&ctx, repo)?;
        Ok(r.pulls
            .values()
            .filter(|p| p.open)
            .map(|p| p.pr.clone())
            .collect())
    }

    async fn create_pull_request(
        &self,
        repo: &str,
        _title: &str,
        _body: &str,
        head: &str,
        base: &str,
    ) -> Result<PullRequest, ScmError> {
        let mut inner = self.begin(MockOperation::CreatePullRequest {
            repo: key(repo),
            head: head.to_string(),
            base: base.to_string(),
        })?;
        let ctx = format!("create PR {} -> {} in {}", head, base, key(repo));
        let r = inner.repo_mut(&ctx, repo)?;
        let head_sha = r
            .branches
            .get(head)
            .cloned()
            .ok_or_else(|| missing_branch(&ctx, head))?;
        if !r.branches.contains_key(base) {
            return Err(missing_branch(&ctx, base));
        }
        if r.pulls.values().any(|p| p.open && p.pr.source_branch == head) {
            return Err(ScmError::conflict(
                &ctx,
                "a pull request for this branch already exists",
            ));
        }

        let number = r.next_pr_number.max(1);
        r.next_pr_number = number + 1;
        let pr = PullRequest {
            number,
            source_branch: head.to_string(),
            target_branch: base.to_string(),
            head_sha,
            merge_commit_sha: String::new(),
        };
        r.pulls.insert(
            number,
            MockPull {
                pr: pr.clone(),
                open: true,
            },
        );
        Ok(pr)
    }

    async fn merge_pull_request(&self, repo: &str, number: u64) -> Result<PullRequest, ScmError> {
        let mut inner = self.begin(MockOperation::MergePullRequest {
            repo: key(repo),
            number,
        })?;
        let ctx = format!("merge PR #{} in {}", number, key(repo));
        let sha = inner.new_sha();
        let r = inner.repo_mut(&ctx, repo)?;
        let pull = r
            .pulls
            .get_mut(&number)
            .ok_or_else(|| ScmError::not_found(&ctx, "pull request does not exist"))?;
        if !pull.open {
            return Err(ScmError::provider(
                &ctx,
                Some(405),
                "pull request is not open",
            ));
        }
        pull.open = false;
        pull.pr.merge_commit_sha = sha.clone();
        let merged = pull.pr.clone();
        r.branches.insert(merged.target_branch.clone(), sha);
        Ok(merged)
    }

    async fn delete_branch_and_close_pull_request(
        &self,
        repo: &str,
        number: u64,
    ) -> Result<(), ScmError> {
        let mut inner = self.begin(MockOperation::ClosePullRequest {
            repo: key(repo),
            number,
        })?;
        let ctx = format!("close PR #{} in {}", number, key(repo));
        let r = inner.repo_mut(&ctx, repo)?;
        let pull = r
            .pulls
            .get_mut(&number)
            .ok_or_else(|| ScmError::not_found(&ctx, "pull request does not exist"))?;
        pull.open = false;
        let source = pull.pr.source_branch.clone();
        r.branches.remove(&source);
        Ok(())
    }

    async fn create_file(
        &self,
        repo: &str,
        path: &str,
        content: &str,
        branch: &str,
    ) -> Result<RepositoryFile, ScmError> {
        let mut inner = self.begin(MockOperation::CreateFile {
            repo: key(repo),
            path: path.to_string(),
            branch: branch.to_string(),
        })?;
        let ctx = format!("create file '{}' on '{}' in {}", path, branch, key(repo));
        let sha = inner.new_sha();
        let r = inner.repo_mut(&ctx, repo)?;
        if !r.branches.contains_key(branch) {
            return Err(missing_branch(&ctx, branch));
        }
        let file_key = (branch.to_string(), path.to_string());
        if r.files.contains_key(&file_key) {
            return Err(ScmError::conflict(&ctx, "file already exists"));
        }
        let file = RepositoryFile {
            commit_sha: sha.clone(),
            content: content.to_string(),
        };
        r.files.insert(file_key, file.clone());
        r.branches.insert(branch.to_string(), sha);
        Ok(file)
    }

    async fn get_file(
        &self,
        repo: &str,
        path: &str,
        branch: &str,
    ) -> Result<RepositoryFile, ScmError> {
        let mut inner = self.begin(MockOperation::GetFile {
            repo: key(repo),
            path: path.to_string(),
            branch: branch.to_string(),
        })?;
        let ctx = format!("get file '{}' on '{}' in {}", path, branch, key(repo));
        let r = inner.repo_mut(&ctx, repo)?;
        r.files
            .get(&(branch.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| ScmError::not_found(&ctx, "file does not exist"))
    }

    async fn cleanup_webhooks(&self, repo: &str, host_substring: &str) -> Result<(), ScmError> {
        let mut inner = self.begin(MockOperation::CleanupWebhooks {
            repo: key(repo),
            host_substring: host_substring.to_string(),
        })?;
        if host_substring.is_empty() {
            return Err(ScmError::InvalidArgument(
                "webhook host substring must not be empty".into(),
            ));
        }
        let ctx = format!("clean up webhooks in {}", key(repo));
        let r = inner.repo_mut(&ctx, repo)?;
        if let Some(pos) = r.hooks.iter().position(|(_, url)| url.contains(host_substring)) {
            r.hooks.remove(pos);
        }
        Ok(())
    }

    async fn fork_repository(&self, source_repo: &str, target_repo: &str) -> Result<(), ScmError> {
        let mut inner = self.begin(MockOperation::ForkRepository {
            source: key(source_repo),
            target: key(target_repo),
        })?;
        let ctx = format!("fork {} into {}", key(source_repo), key(target_repo));
        if inner.repos.contains_key(&key(target_repo)) {
            return Err(ScmError::conflict(&ctx, "repository has already been taken"));
        }
        let source = inner.repo_mut(&ctx, source_repo)?;
        let fork = MockRepo {
            branches: source.branches.clone(),
            files: source.files.clone(),
            next_pr_number: 1,
            ..MockRepo::default()
        };
        inner.repos.insert(key(target_repo), fork);
        Ok(())
    }

    async fn delete_repository_if_exists(&self, repo: &str) -> Result<bool, ScmError> {
        let mut inner = self.begin(MockOperation::DeleteRepository { repo: key(repo) })?;
        Ok(inner.repos.remove(&key(repo)).is_some())
    }

    async fn list_commit_statuses(
        &self,
        repo: &str,
        sha: &str,
    ) -> Result<Vec<CommitStatus>, ScmError> {
        let mut inner = self.begin(MockOperation::ListCommitStatuses {
            repo: key(repo),
            sha: sha.to_string(),
        })?;
        let ctx = format!("list statuses for {} in {}", sha, key(repo));
        let r = inner.repo_mut(&ctx, repo)?;
        let Some(queue) = r.statuses.get_mut(sha) else {
            return Ok(Vec::new());
        };
        let snapshot = if queue.len() > 1 {
            queue.pop_front().unwrap_or_default()
        } else {
            queue.front().cloned().unwrap_or_default()
        };
        Ok(snapshot)
    }
}
