//! Forgejo adapter tests against a local wiremock server.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use forgeops::forge::forgejo::ForgejoClient;
use forgeops::forge::{ErrorKind, ScmClient, StatusState};
use forgeops::wait::{Timeouts, WaitOptions};

const SHA_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
const SHA_M: &str = "0123456789abcdef0123456789abcdef01234567";

fn fast() -> WaitOptions {
    WaitOptions::new(Duration::from_millis(10), Duration::from_secs(2))
}

fn client(server: &MockServer) -> ForgejoClient {
    ForgejoClient::with_api_base("fj-token", "konflux-qe", &server.uri())
        .unwrap()
        .with_timeouts(Timeouts::uniform(fast()))
}

fn pr_json(number: u64, merged: bool) -> serde_json::Value {
    json!({
        "id": 500 + number,
        "number": number,
        "state": if merged { "closed" } else { "open" },
        "head": {"ref": "feat-x", "sha": SHA_A},
        "base": {"ref": "main", "sha": "b".repeat(40)},
        "merged": merged,
        "merge_commit_sha": if merged { json!(SHA_M) } else { json!(null) },
    })
}

// =============================================================================
// Branches
// =============================================================================

mod branches {
    use super::*;

    #[tokio::test]
    async fn create_requires_201() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/konflux-qe/app/branches/main"))
            .and(header("authorization", "token fj-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "main"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/repos/konflux-qe/app/branches"))
            .and(body_json(json!({"new_branch_name": "feat-x", "old_ref_name": "main"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "feat-x"})))
            .mount(&server)
            .await;

        let err = client(&server)
            .create_branch("app", "main", "", "feat-x")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Provider);
        assert_eq!(err.status(), Some(200));
    }

    #[tokio::test]
    async fn create_from_revision() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/konflux-qe/app/branches/main"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "main"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/repos/konflux-qe/app/branches"))
            .and(body_json(json!({"new_branch_name": "feat-x", "old_ref_name": SHA_A})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"name": "feat-x"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/konflux-qe/app/branches/feat-x"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "feat-x"})))
            .mount(&server)
            .await;

        client(&server)
            .create_branch("app", "main", SHA_A, "feat-x")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn missing_branch_reads_false() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/konflux-qe/app/branches/gone"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "branch does not exist"})))
            .mount(&server)
            .await;

        assert!(!client(&server).branch_exists("app", "gone").await.unwrap());
    }
}

// =============================================================================
// Pull requests
// =============================================================================

mod pulls {
    use super::*;

    #[tokio::test]
    async fn list_uses_limit_pagination() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/konflux-qe/app/pulls"))
            .and(query_param("state", "open"))
            .and(query_param("limit", "50"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([pr_json(1, false)])))
            .expect(1)
            .mount(&server)
            .await;

        let prs = client(&server).list_pull_requests("app").await.unwrap();
        assert_eq!(prs.len(), 1);
        assert_eq!(prs[0].source_branch, "feat-x");
        assert_eq!(prs[0].head_sha, SHA_A);
    }

    #[tokio::test]
    async fn merge_reads_back_merge_commit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/konflux-qe/app/pulls/2/merge"))
            .and(body_json(json!({"Do": "merge"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/konflux-qe/app/pulls/2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(pr_json(2, true)))
            .mount(&server)
            .await;

        let pr = client(&server).merge_pull_request("app", 2).await.unwrap();
        assert_eq!(pr.merge_commit_sha, SHA_M);
    }

    #[tokio::test]
    async fn merge_without_commit_is_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/konflux-qe/app/pulls/2/merge"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/konflux-qe/app/pulls/2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(pr_json(2, false)))
            .mount(&server)
            .await;

        let err = client(&server).merge_pull_request("app", 2).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Provider);
    }

    #[tokio::test]
    async fn close_patches_state() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/konflux-qe/app/pulls/2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(pr_json(2, false)))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/repos/konflux-qe/app/branches/feat-x"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "not found"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/repos/konflux-qe/app/pulls/2"))
            .and(body_json(json!({"state": "closed"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(pr_json(2, false)))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .delete_branch_and_close_pull_request("app", 2)
            .await
            .unwrap();
    }
}

// =============================================================================
// Files, forks, statuses
// =============================================================================

mod contents {
    use super::*;

    #[tokio::test]
    async fn get_file_prefers_last_commit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/konflux-qe/app/contents/.tekton/push.yaml"))
            .and(query_param("ref", "main"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sha": "f".repeat(40),
                "last_commit_sha": SHA_M,
                "encoding": "base64",
                "content": "cHVzaA=="
            })))
            .mount(&server)
            .await;

        let file = client(&server)
            .get_file("app", ".tekton/push.yaml", "main")
            .await
            .unwrap();
        assert_eq!(file.content, "push");
        assert_eq!(file.commit_sha, SHA_M);
    }

    #[tokio::test]
    async fn create_file_posts_contents() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/konflux-qe/app/contents/notes.txt"))
            .and(body_json(json!({
                "content": "aGk=",
                "branch": "feat-x",
                "message": "e2e test commit message"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "content": {"name": "notes.txt"},
                "commit": {"sha": SHA_M}
            })))
            .mount(&server)
            .await;

        let file = client(&server)
            .create_file("app", "notes.txt", "hi", "feat-x")
            .await
            .unwrap();
        assert_eq!(file.commit_sha, SHA_M);
    }
}

mod forks {
    use super::*;

    #[tokio::test]
    async fn fork_retries_any_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/konflux-qe/source/forks"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/repos/konflux-qe/source/forks"))
            .and(body_json(json!({"organization": "konflux-qe", "name": "source-abc123"})))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({"full_name": "konflux-qe/source-abc123"})))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .fork_repository("source", "source-abc123")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn fork_gives_up_with_last_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/konflux-qe/source/forks"))
            .respond_with(
                ResponseTemplate::new(422).set_body_json(json!({"message": "repository is already forked"})),
            )
            .mount(&server)
            .await;

        let fj = ForgejoClient::with_api_base("fj-token", "konflux-qe", &server.uri())
            .unwrap()
            .with_timeouts(Timeouts::uniform(WaitOptions::new(
                Duration::from_millis(10),
                Duration::from_millis(80),
            )));
        let err = fj.fork_repository("source", "source-abc123").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(err.to_string().contains("already forked"));
    }
}

mod statuses {
    use super::*;

    #[tokio::test]
    async fn combined_status_maps_contexts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/repos/konflux-qe/app/commits/{}/status", SHA_A)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "state": "pending",
                "statuses": [
                    {"context": "ci/lint", "status": "success"},
                    {"context": "konflux/build", "status": "pending"}
                ]
            })))
            .mount(&server)
            .await;

        let statuses = client(&server)
            .list_commit_statuses("app", SHA_A)
            .await
            .unwrap();
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].state, StatusState::Success);
        assert!(statuses[1].state.is_pending());
    }

    #[tokio::test]
    async fn no_statuses_yet_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/repos/konflux-qe/app/commits/{}/status", SHA_A)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"state": "", "statuses": null})))
            .mount(&server)
            .await;

        assert!(client(&server)
            .list_commit_statuses("app", SHA_A)
            .await
            .unwrap()
            .is_empty());
    }
}
