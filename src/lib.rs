//! forgeops - Multi-provider SCM operations for end-to-end test suites
//!
//! forgeops gives test harnesses one contract for the repository chores an
//! end-to-end run performs against GitHub, GitLab and Forgejo: creating and
//! deleting branches, opening and merging pull requests, committing files,
//! forking and deleting repositories, cleaning up webhooks, and waiting for
//! CI statuses to settle.
//!
//! # Architecture
//!
//! - [`forge`] - The `ScmClient` contract, domain types, errors and adapters
//! - [`wait`] - Bounded polling for eventually-consistent provider state
//! - [`registry`] - Provider selection, credentials and per-run setup
//! - [`config`] - Settings file and environment overrides
//! - [`cli`] - The `forgeops` command-line interface
//!
//! # Guarantees
//!
//! 1. Every failure is classified (not found, conflict, transient, provider,
//!    invalid argument, timeout); callers never parse message text
//! 2. Every wait is bounded by an explicit timeout
//! 3. Operations run one at a time; nothing is spawned in the background

pub mod cli;
pub mod config;
pub mod forge;
pub mod registry;
pub mod wait;
