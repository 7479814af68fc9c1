//! GitLab adapter tests against a local wiremock server.
//!
//! Project paths travel as one encoded segment, so mock paths spell the
//! separator as `%2F`.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use forgeops::forge::gitlab::GitLabClient;
use forgeops::forge::{ErrorKind, ScmClient, StatusState};
use forgeops::wait::{Timeouts, WaitOptions};

const PROJECT: &str = "/projects/konflux-qe%2Fapp";
const SHA_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
const SHA_M: &str = "0123456789abcdef0123456789abcdef01234567";

fn fast() -> WaitOptions {
    WaitOptions::new(Duration::from_millis(10), Duration::from_secs(2))
}

fn client(server: &MockServer) -> GitLabClient {
    GitLabClient::with_api_base("gl-token", "konflux-qe", &server.uri())
        .unwrap()
        .with_timeouts(Timeouts::uniform(fast()))
        .with_retry_delay(Duration::from_millis(1))
}

fn at(suffix: &str) -> String {
    format!("{}{}", PROJECT, suffix)
}

fn mr_json(iid: u64, merge_commit_sha: Option<&str>) -> serde_json::Value {
    json!({
        "id": 9000 + iid,
        "iid": iid,
        "state": if merge_commit_sha.is_some() { "merged" } else { "opened" },
        "source_branch": "feat-x",
        "target_branch": "main",
        "sha": SHA_A,
        "merge_commit_sha": merge_commit_sha,
    })
}

// =============================================================================
// Branches
// =============================================================================

mod branches {
    use super::*;

    #[tokio::test]
    async fn create_checks_base_then_confirms() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(at("/repository/branches/main")))
            .and(header("private-token", "gl-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "main"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(at("/repository/branches")))
            .and(query_param("branch", "feat-x"))
            .and(query_param("ref", "main"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"name": "feat-x"})))
            .expect(1)
            .mount(&server)
            .await;
        // Not yet visible on the first poll.
        Mock::given(method("GET"))
            .and(path(at("/repository/branches/feat-x")))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "404 Branch Not Found"})))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(at("/repository/branches/feat-x")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "feat-x"})))
            .mount(&server)
            .await;

        client(&server)
            .create_branch("konflux-qe/app", "main", "", "feat-x")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn create_from_missing_base_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(at("/repository/branches/nope")))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "404 Branch Not Found"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let err = client(&server)
            .create_branch("app", "nope", "", "feat-x")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn branch_names_with_slashes_are_encoded() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path(at("/repository/branches/feature%2Fone")))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .delete_branch("konflux-qe/app", "feature/one")
            .await
            .unwrap();
    }
}

// =============================================================================
// Merge requests
// =============================================================================

mod merge_requests {
    use super::*;

    #[tokio::test]
    async fn list_retries_transient_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(at("/merge_requests")))
            .respond_with(ResponseTemplate::new(408).set_body_string("request timeout"))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(at("/merge_requests")))
            .and(query_param("state", "opened"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([mr_json(4, None), mr_json(5, None)])))
            .mount(&server)
            .await;

        let mrs = client(&server).list_pull_requests("app").await.unwrap();
        let mut numbers: Vec<u64> = mrs.iter().map(|m| m.number).collect();
        numbers.sort();
        assert_eq!(numbers, vec![4, 5]);
    }

    #[tokio::test]
    async fn list_gives_up_after_five_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(at("/merge_requests")))
            .respond_with(ResponseTemplate::new(503))
            .expect(5)
            .mount(&server)
            .await;

        let err = client(&server).list_pull_requests("app").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transient);
    }

    #[tokio::test]
    async fn list_follows_next_page_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(at("/merge_requests")))
            .and(query_param("page", "1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-next-page", "2")
                    .set_body_json(json!([mr_json(1, None)])),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(at("/merge_requests")))
            .and(query_param("page", "2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-next-page", "")
                    .set_body_json(json!([mr_json(2, None)])),
            )
            .mount(&server)
            .await;

        let mrs = client(&server).list_pull_requests("app").await.unwrap();
        assert_eq!(mrs.len(), 2);
    }

    #[tokio::test]
    async fn merge_refetches_when_sha_missing() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(at("/merge_requests/4/merge")))
            .and(body_json(json!({"squash": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(mr_json(4, None)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(at("/merge_requests/4")))
            .respond_with(ResponseTemplate::new(200).set_body_json(mr_json(4, Some(SHA_M))))
            .expect(1)
            .mount(&server)
            .await;

        let pr = client(&server).merge_pull_request("app", 4).await.unwrap();
        assert_eq!(pr.merge_commit_sha, SHA_M);
    }

    #[tokio::test]
    async fn merge_uses_inline_sha() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(at("/merge_requests/4/merge")))
            .respond_with(ResponseTemplate::new(200).set_body_json(mr_json(4, Some(SHA_M))))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(at("/merge_requests/4")))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let pr = client(&server).merge_pull_request("app", 4).await.unwrap();
        assert!(pr.is_merged());
        assert_eq!(pr.merge_commit_sha.len(), 40);
    }

    #[tokio::test]
    async fn merge_waits_for_late_sha() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(at("/merge_requests/4/merge")))
            .respond_with(ResponseTemplate::new(200).set_body_json(mr_json(4, None)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(at("/merge_requests/4")))
            .respond_with(ResponseTemplate::new(200).set_body_json(mr_json(4, None)))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(at("/merge_requests/4")))
            .respond_with(ResponseTemplate::new(200).set_body_json(mr_json(4, Some(SHA_M))))
            .mount(&server)
            .await;

        let pr = client(&server).merge_pull_request("app", 4).await.unwrap();
        assert_eq!(pr.merge_commit_sha, SHA_M);
    }

    #[tokio::test]
    async fn merge_without_commit_is_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(at("/merge_requests/4/merge")))
            .respond_with(ResponseTemplate::new(200).set_body_json(mr_json(4, None)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(at("/merge_requests/4")))
            .respond_with(ResponseTemplate::new(200).set_body_json(mr_json(4, None)))
            .mount(&server)
            .await;

        let client = GitLabClient::with_api_base("gl-token", "konflux-qe", &server.uri())
            .unwrap()
            .with_timeouts(Timeouts::uniform(WaitOptions::new(
                Duration::from_millis(10),
                Duration::from_millis(200),
            )));
        let err = client.merge_pull_request("app", 4).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Provider);
        assert!(err.to_string().contains("no merge commit"));
    }

    #[tokio::test]
    async fn close_deletes_branch_then_closes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(at("/merge_requests/4")))
            .respond_with(ResponseTemplate::new(200).set_body_json(mr_json(4, None)))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(at("/repository/branches/feat-x")))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(at("/merge_requests/4")))
            .and(body_json(json!({"state_event": "close"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(mr_json(4, None)))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .delete_branch_and_close_pull_request("app", 4)
            .await
            .unwrap();
    }
}

// =============================================================================
// Files and webhooks
// =============================================================================

mod files {
    use super::*;

    #[tokio::test]
    async fn create_reads_back_commit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(at("/repository/files/.tekton%2Fpull.yaml")))
            .and(body_json(json!({
                "branch": "feat-x",
                "content": "kind: PipelineRun",
                "commit_message": "e2e test commit message"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "file_path": ".tekton/pull.yaml", "branch": "feat-x"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(at("/repository/files/.tekton%2Fpull.yaml")))
            .and(query_param("ref", "feat-x"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "file_path": ".tekton/pull.yaml",
                "encoding": "base64",
                "content": "a2luZDogUGlwZWxpbmVSdW4=",
                "commit_id": SHA_M
            })))
            .mount(&server)
            .await;

        let file = client(&server)
            .create_file("app", ".tekton/pull.yaml", "kind: PipelineRun", "feat-x")
            .await
            .unwrap();
        assert_eq!(file.content, "kind: PipelineRun");
        assert_eq!(file.commit_sha, SHA_M);
    }

    #[tokio::test]
    async fn existing_file_is_conflict() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(at("/repository/files/README.md")))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({"message": "A file with this name already exists"})),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .create_file("app", "README.md", "x", "main")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn webhook_cleanup_removes_first_match() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(at("/hooks")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 11, "url": "https://pac.cluster-a.example/hook"},
                {"id": 12, "url": "https://pac.cluster-a.example/hook2"}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(at("/hooks/11")))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(at("/hooks/12")))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        client(&server)
            .cleanup_webhooks("app", "cluster-a")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn webhook_cleanup_without_match_is_noop() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(at("/hooks")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 11, "url": "https://elsewhere.example/hook"}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        client(&server)
            .cleanup_webhooks("app", "cluster-a")
            .await
            .unwrap();
    }
}

// =============================================================================
// Projects
// =============================================================================

mod projects {
    use super::*;

    fn project(id: u64, path: &str, import_status: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "id": id,
            "path_with_namespace": path,
            "import_status": import_status
        }))
    }

    #[tokio::test]
    async fn fork_waits_for_import() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/projects/konflux-qe%2Fsource/fork"))
            .and(body_json(json!({
                "name": "source-abc123",
                "path": "source-abc123",
                "namespace_path": "konflux-qe"
            })))
            .respond_with(project(77, "konflux-qe/source-abc123", "scheduled"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/projects/77"))
            .respond_with(project(77, "konflux-qe/source-abc123", "started"))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/projects/77"))
            .respond_with(project(77, "konflux-qe/source-abc123", "finished"))
            .mount(&server)
            .await;

        client(&server)
            .fork_repository("konflux-qe/source", "konflux-qe/source-abc123")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn failed_import_is_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/projects/konflux-qe%2Fsource/fork"))
            .respond_with(project(78, "konflux-qe/source-x", "scheduled"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/projects/78"))
            .respond_with(project(78, "konflux-qe/source-x", "failed"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server)
            .fork_repository("source", "source-x")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Provider);
        assert!(err.to_string().contains("import_status=failed"));
    }

    #[tokio::test]
    async fn delete_waits_until_gone() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(PROJECT))
            .respond_with(project(5, "konflux-qe/app", "none"))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(PROJECT))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "404 Project Not Found"})))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(PROJECT))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({"message": "202 Accepted"})))
            .expect(1)
            .mount(&server)
            .await;

        assert!(client(&server)
            .delete_repository_if_exists("konflux-qe/app")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn soft_deleted_project_is_removed_permanently() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(PROJECT))
            .respond_with(project(5, "konflux-qe/app-deletion_scheduled-5", "none"))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/projects/konflux-qe%2Fapp-deletion_scheduled-5"))
            .and(query_param("permanently_remove", "true"))
            .and(query_param("full_path", "konflux-qe/app-deletion_scheduled-5"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(PROJECT))
            .respond_with(ResponseTemplate::new(202))
            .expect(0)
            .mount(&server)
            .await;

        assert!(client(&server)
            .delete_repository_if_exists("konflux-qe/app")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn delete_missing_project_returns_false() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(PROJECT))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "404 Project Not Found"})))
            .mount(&server)
            .await;

        assert!(!client(&server)
            .delete_repository_if_exists("app")
            .await
            .unwrap());
    }
}

// =============================================================================
// Commit statuses
// =============================================================================

mod statuses {
    use super::*;

    #[tokio::test]
    async fn conclusion_follows_pipeline() {
        let server = MockServer::start().await;
        let url = at(&format!("/repository/commits/{}/statuses", SHA_A));
        Mock::given(method("GET"))
            .and(path(url.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"name": "app-on-pull-request", "status": "pending"}
            ])))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(url.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"name": "app-on-pull-request", "status": "running"}
            ])))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(url.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"name": "app-on-pull-request", "status": "success"}
            ])))
            .mount(&server)
            .await;

        let state = client(&server)
            .commit_status_conclusion("app", SHA_A, "on-pull-request", fast())
            .await
            .unwrap();
        assert_eq!(state, StatusState::Success);
    }
}
