//! Poller behavior under paused tokio time.

use std::cell::Cell;
use std::time::Duration;

use forgeops::forge::{CommitStatus, StatusState};
use forgeops::wait::{wait_for_status, wait_until, WaitError, WaitOptions};
use tokio::time::Instant;

fn opts(interval: u64, timeout: u64) -> WaitOptions {
    WaitOptions::secs(interval, timeout)
}

// =============================================================================
// wait_until
// =============================================================================

mod until {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_kth_call() {
        let calls = Cell::new(0u32);
        let start = Instant::now();
        wait_until("fifth call", opts(2, 60), || {
            calls.set(calls.get() + 1);
            let done = calls.get() == 5;
            async move { Ok::<_, String>(done) }
        })
        .await
        .unwrap();

        assert_eq!(calls.get(), 5);
        // First check is immediate, then four intervals.
        assert_eq!(start.elapsed(), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn unrepresentable_deadline_saturates() {
        let calls = Cell::new(0u32);
        let options = WaitOptions::new(Duration::from_millis(1), Duration::MAX);
        wait_until("third call", options, || {
            calls.set(calls.get() + 1);
            let done = calls.get() == 3;
            async move { Ok::<_, String>(done) }
        })
        .await
        .unwrap();
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn errors_count_as_not_yet() {
        let calls = Cell::new(0u32);
        wait_until("recovery", opts(1, 30), || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move {
                if n < 3 {
                    Err(format!("HTTP 503 on attempt {}", n))
                } else {
                    Ok(true)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_bounded_and_reports_last_error() {
        let start = Instant::now();
        let err = wait_until("never", opts(3, 10), || async {
            Err::<bool, _>("HTTP 502".to_string())
        })
        .await
        .unwrap_err();

        assert!(start.elapsed() <= Duration::from_secs(10 + 3));
        let WaitError::Timeout {
            what,
            timeout,
            attempts,
            last_error,
        } = err;
        assert_eq!(what, "never");
        assert_eq!(timeout, Duration::from_secs(10));
        // t = 0, 3, 6, 9, 10
        assert_eq!(attempts, 5);
        assert_eq!(last_error.as_deref(), Some("HTTP 502"));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_check_is_cut_off() {
        let start = Instant::now();
        let err = wait_until("hung", opts(1, 5), || async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok::<_, String>(true)
        })
        .await
        .unwrap_err();

        assert!(start.elapsed() <= Duration::from_secs(6));
        assert!(err.to_string().contains("did not finish"));
    }

    #[tokio::test(start_paused = true)]
    async fn not_met_without_error_has_no_last_error() {
        let err = wait_until("quiet", opts(1, 2), || async { Ok::<_, String>(false) })
            .await
            .unwrap_err();
        let WaitError::Timeout { last_error, .. } = &err;
        assert!(last_error.is_none());
        assert!(err.to_string().starts_with("timed out after 2s waiting for quiet"));
    }
}

// =============================================================================
// wait_for_status
// =============================================================================

mod status {
    use super::*;

    fn snapshot(state: Option<StatusState>) -> Vec<CommitStatus> {
        let mut all = vec![CommitStatus::new("ci/lint", StatusState::Success)];
        if let Some(state) = state {
            all.push(CommitStatus::new("Konflux / app-on-push", state));
        }
        all
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_appearance_then_completion() {
        let script = [
            snapshot(None),
            snapshot(None),
            snapshot(Some(StatusState::Pending)),
            snapshot(Some(StatusState::Running)),
            snapshot(Some(StatusState::Failure)),
        ];
        let calls = Cell::new(0usize);
        let state = wait_for_status("app-on-push", opts(1, 60), opts(1, 60), || {
            let i = calls.get().min(script.len() - 1);
            calls.set(calls.get() + 1);
            let snap = script[i].clone();
            async move { Ok::<_, String>(snap) }
        })
        .await
        .unwrap();

        assert_eq!(state, StatusState::Failure);
        // Three calls until it appears, then running and failure.
        assert_eq!(calls.get(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn appearance_timeout_names_phase() {
        let err = wait_for_status("app-on-push", opts(1, 3), opts(1, 3), || async {
            Ok::<_, String>(snapshot(None))
        })
        .await
        .unwrap_err();
        assert!(err.to_string().contains("status 'app-on-push' to appear"));
    }

    #[tokio::test(start_paused = true)]
    async fn completion_timeout_names_phase() {
        let err = wait_for_status("app-on-push", opts(1, 3), opts(1, 3), || async {
            Ok::<_, String>(snapshot(Some(StatusState::Running)))
        })
        .await
        .unwrap_err();
        assert!(err.to_string().contains("status 'app-on-push' to complete"));
    }

    #[tokio::test(start_paused = true)]
    async fn skipped_is_terminal() {
        let state = wait_for_status("app-on-push", opts(1, 3), opts(1, 3), || async {
            Ok::<_, String>(snapshot(Some(StatusState::Skipped)))
        })
        .await
        .unwrap();
        assert_eq!(state, StatusState::Skipped);
    }
}
