//! forge
//!
//! Provider-neutral operations against hosted git providers (GitHub,
//! GitLab, Forgejo).
//!
//! # Architecture
//!
//! The `ScmClient` trait defines every operation an end-to-end test run
//! needs from a provider. Callers obtain clients from
//! [`crate::registry`] rather than constructing adapters directly, so the
//! provider set is a runtime decision.
//!
//! - Adapters classify provider failures into [`ScmError`] at the boundary.
//! - Writes that providers apply asynchronously are confirmed with
//!   [`crate::wait`] before an operation returns.
//! - Adapters hold no mutable state; they are `Send + Sync` and shared
//!   behind `Arc`.
//!
//! # Modules
//!
//! - `types`: value types shared by every adapter
//! - `error`: error taxonomy
//! - `traits`: the `ScmClient` contract
//! - `http`: REST plumbing shared by the adapters
//! - [`github`], [`gitlab`], [`forgejo`]: provider adapters
//! - [`mock`]: in-memory implementation for deterministic testing
//!
//! # Example
//!
//! ```ignore
//! use forgeops::forge::{github::GitHubClient, ScmClient};
//!
//! let client = GitHubClient::new(&token, "octo-org")?;
//! let pr = client
//!     .create_pull_request("octo-org/app", "Add feature", "", "feature", "main")
//!     .await?;
//! let merged = client.merge_pull_request("octo-org/app", pr.number).await?;
//! println!("merged as {}", merged.merge_commit_sha);
//! ```

mod error;
pub mod forgejo;
pub mod github;
pub mod gitlab;
pub mod http;
pub mod mock;
mod traits;
mod types;

pub use error::{ErrorKind, IgnoreNotFound, ScmError};
pub use traits::ScmClient;
pub use types::{CommitStatus, GitProvider, PullRequest, RepoRef, RepositoryFile, StatusState};
