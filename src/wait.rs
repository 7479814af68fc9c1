//! wait
//!
//! Bounded polling for eventually-consistent provider state.
//!
//! Provider APIs acknowledge a mutation before it is visible to reads: a
//! branch created through the refs API may 404 for a few seconds, a fork is
//! created asynchronously, and CI statuses show up some time after a push.
//! Every such wait in the crate goes through [`wait_until`].
//!
//! # Semantics
//!
//! - The check runs immediately, then once per `interval`.
//! - `Ok(true)` ends the wait successfully.
//! - `Ok(false)` and `Err(_)` both mean "not yet". The most recent error
//!   text is kept and reported in the timeout.
//! - A single check is cut off after `max(remaining, interval)`, and sleeps
//!   never run past the deadline, so a wait returns within
//!   `timeout + interval` of being started.
//!
//! A check that needs to stop early on a terminal failure (a GitLab import
//! that reports `failed`, say) records the outcome in a variable it
//! captures and returns `Ok(true)`; the caller inspects the outcome after
//! the wait.

use std::fmt::Display;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::forge::{CommitStatus, StatusState};

/// Stand-in deadline for timeouts too large to add to the current instant.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Interval and deadline for a single wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Delay between checks.
    pub interval: Duration,
    /// Total time budget.
    pub timeout: Duration,
}

impl WaitOptions {
    /// Branch creation becoming readable.
    pub const BRANCH: WaitOptions = WaitOptions::secs(2, 120);
    /// Each phase of a commit status wait.
    pub const STATUS: WaitOptions = WaitOptions::secs(2, 600);
    /// Retrying a fork request.
    pub const FORK: WaitOptions = WaitOptions::secs(10, 300);
    /// A fork becoming usable after the request was accepted.
    pub const FORK_READY: WaitOptions = WaitOptions::secs(10, 600);
    /// A deleted repository disappearing.
    pub const DELETE: WaitOptions = WaitOptions::secs(10, 300);

    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    pub const fn secs(interval: u64, timeout: u64) -> Self {
        Self::new(Duration::from_secs(interval), Duration::from_secs(timeout))
    }

    /// Same interval, different deadline.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }
}

/// Wait options used by an adapter for its internal confirmations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// New branch becoming visible.
    pub branch: WaitOptions,
    /// Each phase of a commit status wait.
    pub status: WaitOptions,
    /// Retrying the fork request itself.
    pub fork: WaitOptions,
    /// Fork becoming usable.
    pub fork_ready: WaitOptions,
    /// Deleted repository disappearing.
    pub delete: WaitOptions,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            branch: WaitOptions::BRANCH,
            status: WaitOptions::STATUS,
            fork: WaitOptions::FORK,
            fork_ready: WaitOptions::FORK_READY,
            delete: WaitOptions::DELETE,
        }
    }
}

impl Timeouts {
    /// The same interval and timeout for every wait. Mostly for tests.
    pub fn uniform(options: WaitOptions) -> Self {
        Self {
            branch: options,
            status: options,
            fork: options,
            fork_ready: options,
            delete: options,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WaitError {
    #[error(
        "timed out after {timeout:?} waiting for {what} ({attempts} attempts){}",
        .last_error.as_ref().map(|e| format!("; last error: {}", e)).unwrap_or_default()
    )]
    Timeout {
        what: String,
        timeout: Duration,
        attempts: u32,
        last_error: Option<String>,
    },
}

impl WaitError {
    /// Number of times the check ran before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            WaitError::Timeout { attempts, .. } => *attempts,
        }
    }
}

/// Poll `check` until it reports `Ok(true)` or the deadline passes.
///
/// `what` completes the sentence "waiting for ..." in logs and in the
/// timeout error, e.g. `"branch 'feature' in octo/hello to exist"`.
///
/// # Errors
///
/// Returns [`WaitError::Timeout`] when the deadline passes without a
/// successful check.
///
/// # Example
///
/// ```
/// use forgeops::wait::{wait_until, WaitOptions};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut calls = 0;
/// let opts = WaitOptions::new(Duration::from_millis(1), Duration::from_secs(1));
/// wait_until("the third call", opts, || {
///     calls += 1;
///     let done = calls >= 3;
///     async move { Ok::<_, String>(done) }
/// })
/// .await
/// .unwrap();
/// assert_eq!(calls, 3);
/// # }
/// ```
pub async fn wait_until<F, Fut, E>(
    what: &str,
    options: WaitOptions,
    mut check: F,
) -> Result<(), WaitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: Display,
{
    let deadline = deadline_after(options.timeout);
    let mut attempts: u32 = 0;
    let mut last_error: Option<String> = None;

    loop {
        attempts += 1;
        let remaining = deadline.saturating_duration_since(Instant::now());
        let budget = remaining.max(options.interval);

        match tokio::time::timeout(budget, check()).await {
            Ok(Ok(true)) => {
                debug!(what, attempts, "wait condition met");
                return Ok(());
            }
            Ok(Ok(false)) => {
                debug!(what, attempts, "wait condition not met yet");
            }
            Ok(Err(e)) => {
                warn!(what, attempts, error = %e, "wait check failed, retrying");
                last_error = Some(e.to_string());
            }
            Err(_) => {
                warn!(what, attempts, ?budget, "wait check did not finish in time");
                last_error = Some(format!("check did not finish within {:?}", budget));
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(WaitError::Timeout {
                what: what.to_string(),
                timeout: options.timeout,
                attempts,
                last_error,
            });
        }
        tokio::time::sleep(options.interval.min(deadline - now)).await;
    }
}

/// `now + timeout`, saturating at a far-future instant instead of
/// overflowing.
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Two-phase wait on a commit status.
///
/// Phase one waits until a status whose name contains `name` is reported.
/// Phase two waits until that status leaves the pending/running states and
/// returns its terminal state. Each phase has its own options and its own
/// timeout message.
///
/// `fetch` returns every status currently attached to the commit.
///
/// # Errors
///
/// [`WaitError::Timeout`] naming `"... to appear"` or `"... to complete"`
/// depending on which phase ran out of time.
pub async fn wait_for_status<F, Fut, E>(
    name: &str,
    appear: WaitOptions,
    complete: WaitOptions,
    mut fetch: F,
) -> Result<StatusState, WaitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Vec<CommitStatus>, E>>,
    E: Display,
{
    wait_until(&format!("status '{}' to appear", name), appear, || {
        let statuses = fetch();
        async move { statuses.await.map(|all| find_status(&all, name).is_some()) }
    })
    .await?;

    let terminal: Mutex<Option<StatusState>> = Mutex::new(None);
    wait_until(&format!("status '{}' to complete", name), complete, || {
        let statuses = fetch();
        let terminal = &terminal;
        async move {
            match statuses.await {
                Err(e) => Err(e),
                Ok(all) => match find_status(&all, name) {
                    Some(status) if !status.state.is_pending() => {
                        *terminal.lock().unwrap_or_else(|p| p.into_inner()) =
                            Some(status.state.clone());
                        Ok(true)
                    }
                    _ => Ok(false),
                },
            }
        }
    })
    .await?;

    let state = terminal
        .into_inner()
        .unwrap_or_else(|p| p.into_inner())
        .unwrap_or_else(|| StatusState::Other("unknown".to_string()));
    Ok(state)
}

fn find_status<'a>(statuses: &'a [CommitStatus], name: &str) -> Option<&'a CommitStatus> {
    statuses.iter().find(|s| s.name.contains(name))
}
