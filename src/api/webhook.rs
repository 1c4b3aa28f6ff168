//! Webhook handler for GitHub push events

use axum::{
    Json,
    body::Bytes,
    extract::State as AxumState,
    http::{HeaderMap, StatusCode},
};
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::HookError;
use crate::job::Job;
use crate::runner::JobReport;
use crate::utils::{find_matching_hook, verify_github_signature};
use crate::webhook::{EventKind, PushEvent, classify_event};
use crate::{AppState, SharedState};

pub const SIGNATURE_HEADER: &str = "x-hub-signature";
pub const SIGNATURE_256_HEADER: &str = "x-hub-signature-256";

/// Handles the GitHub webhook POST request.
///
/// Answers as soon as the job is dispatched; the script's outcome only shows up in the log.
pub async fn handle_webhook(
    AxumState(state): AxumState<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    match dispatch_webhook(&state, &headers, &body) {
        Ok(_handle) => (StatusCode::OK, Json(json!({ "status": "OK" }))),
        Err(e) => {
            match &e {
                HookError::NoMatchingHook { .. } | HookError::UnhandledEvent { .. } => {
                    warn!("{}. Got:\n{}", e, String::from_utf8_lossy(&body));
                }
                _ => warn!("Rejecting webhook: {}", e),
            }
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "ERROR" })),
            )
        }
    }
}

/// Authenticate, parse, match and classify a webhook, then dispatch its job.
///
/// Returns the handle of the spawned job. Must be called within a tokio runtime.
pub fn dispatch_webhook(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<JoinHandle<JobReport>, HookError> {
    let signature = headers
        .get(SIGNATURE_256_HEADER)
        .or_else(|| headers.get(SIGNATURE_HEADER))
        .and_then(|v| v.to_str().ok());
    verify_github_signature(&state.config.secret, body, signature)?;

    let event = PushEvent::from_slice(body)?;
    debug!("{:#?}", &event);

    let hook = find_matching_hook(&state.config, &event).ok_or_else(|| {
        HookError::NoMatchingHook {
            repository: event.repository.full_name.clone(),
            reference: event.reference.clone(),
        }
    })?;

    let classified = classify_event(&event, &hook.branch);
    if classified.kind == EventKind::Unhandled {
        return Err(HookError::UnhandledEvent {
            repository: event.repository.full_name,
            reference: event.reference,
        });
    }

    let job = Job::new(&event.repository.full_name, hook, classified);
    info!(
        "Dispatching job {} for '{}' branch '{}': {} {}",
        job.id, job.repository, job.branch, job.kind, job.value
    );

    Ok(state.runner.dispatch(&hook.shell, job))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::JobOutcome;
    use crate::utils::{SignatureAlgorithm, sign_payload};
    use crate::{Hook, HookConfig};
    use axum::http::HeaderValue;
    use axum::response::IntoResponse;
    use std::path::PathBuf;
    use std::sync::Arc;

    const SECRET: &str = "webhook-secret";

    fn state_with(hooks: Vec<Hook>, scripts_path: Option<PathBuf>) -> SharedState {
        Arc::new(AppState::new(HookConfig {
            secret: SECRET.to_string(),
            scripts_path,
            hooks,
        }))
    }

    fn hook(shell: &str) -> Hook {
        Hook {
            repo: "o/r".to_string(),
            branch: "main".to_string(),
            shell: shell.to_string(),
        }
    }

    fn payload(reference: &str, deleted: bool) -> Vec<u8> {
        json!({
            "ref": reference,
            "after": "abcdef1234567890",
            "deleted": deleted,
            "repository": { "full_name": "o/r" }
        })
        .to_string()
        .into_bytes()
    }

    fn signed(body: &[u8]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let signature = sign_payload(SECRET, body, SignatureAlgorithm::Sha1).unwrap();
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(&signature).unwrap());
        headers
    }

    async fn respond(state: SharedState, headers: HeaderMap, body: Vec<u8>) -> (StatusCode, Value) {
        let response = handle_webhook(AxumState(state), headers, Bytes::from(body))
            .await
            .into_response();
        let status = response.status();
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn signed_branch_push_answers_ok() {
        let body = payload("refs/heads/main", false);
        let (status, json) = respond(state_with(vec![hook("true")], None), signed(&body), body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, json!({ "status": "OK" }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn dispatched_branch_push_runs_the_script() {
        let state = state_with(vec![hook("echo")], None);
        let body = payload("refs/heads/main", false);
        let handle = dispatch_webhook(&state, &signed(&body), &body).unwrap();
        let report = handle.await.unwrap();
        assert_eq!(report.outcome, JobOutcome::Success);
        assert_eq!(report.stdout_lines, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn sha256_header_is_preferred() {
        let state = state_with(vec![hook("true")], None);
        let body = payload("refs/tags/v1.2.0", false);
        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_static("sha1=00"));
        let signature = sign_payload(SECRET, &body, SignatureAlgorithm::Sha256).unwrap();
        headers.insert(
            SIGNATURE_256_HEADER,
            HeaderValue::from_str(&signature).unwrap(),
        );
        let report = dispatch_webhook(&state, &headers, &body)
            .unwrap()
            .await
            .unwrap();
        assert_eq!(report.outcome, JobOutcome::Success);
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn answers_before_slow_script_finishes() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let finished = dir.path().join("finished");
        let script = dir.path().join("slow.sh");
        std::fs::write(
            &script,
            format!("#!/bin/sh\nsleep 2\ntouch '{}'\n", finished.display()),
        )
        .unwrap();
        let mut perms = std::fs::metadata(&script).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&script, perms).unwrap();

        let state = state_with(vec![hook("slow.sh")], Some(dir.path().to_path_buf()));
        let body = payload("refs/heads/main", false);
        let started = std::time::Instant::now();
        let (status, json) = respond(state, signed(&body), body).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, json!({ "status": "OK" }));
        assert!(started.elapsed() < std::time::Duration::from_secs(2));
        assert!(!finished.exists());
    }

    #[tokio::test]
    async fn failed_script_still_answers_ok() {
        let state = state_with(
            vec![hook("deploy.sh")],
            Some(PathBuf::from("/nonexistent/hooks/dir")),
        );
        let body = payload("refs/heads/main", false);
        let handle = dispatch_webhook(&state, &signed(&body), &body).unwrap();
        let report = handle.await.unwrap();
        assert!(matches!(report.outcome, JobOutcome::LaunchFailure { .. }));

        let (status, _) = respond(state, signed(&body), body).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_signature_is_rejected() {
        let state = state_with(vec![hook("true")], None);
        let body = payload("refs/heads/main", false);
        let err = dispatch_webhook(&state, &HeaderMap::new(), &body).unwrap_err();
        assert!(matches!(err, HookError::AuthenticationFailure(_)));

        let (status, json) = respond(state, HeaderMap::new(), body).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json, json!({ "status": "ERROR" }));
    }

    #[tokio::test]
    async fn missing_signature_wins_over_bad_payload() {
        let state = state_with(vec![hook("true")], None);
        let err = dispatch_webhook(&state, &HeaderMap::new(), b"not json").unwrap_err();
        assert!(matches!(err, HookError::AuthenticationFailure(_)));
    }

    #[tokio::test]
    async fn signature_for_other_body_is_rejected() {
        let state = state_with(vec![hook("true")], None);
        let body = payload("refs/heads/main", false);
        let headers = signed(&payload("refs/heads/other", false));
        let err = dispatch_webhook(&state, &headers, &body).unwrap_err();
        assert!(matches!(err, HookError::AuthenticationFailure(_)));
    }

    #[tokio::test]
    async fn malformed_json_is_a_parse_failure() {
        let state = state_with(vec![hook("true")], None);
        let body = b"{\"ref\": ".to_vec();
        let err = dispatch_webhook(&state, &signed(&body), &body).unwrap_err();
        assert!(matches!(err, HookError::PayloadParseFailure(_)));

        let (status, _) = respond(state, signed(&body), body).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn unknown_branch_has_no_matching_hook() {
        let state = state_with(vec![hook("true")], None);
        let body = payload("refs/heads/feature", false);
        let err = dispatch_webhook(&state, &signed(&body), &body).unwrap_err();
        assert!(matches!(err, HookError::NoMatchingHook { .. }));

        let (status, _) = respond(state, signed(&body), body).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn deletions_are_unhandled() {
        let state = state_with(vec![hook("true")], None);
        for reference in ["refs/heads/main", "refs/tags/v1.2.0"] {
            let body = payload(reference, true);
            let err = dispatch_webhook(&state, &signed(&body), &body).unwrap_err();
            assert!(matches!(err, HookError::UnhandledEvent { .. }), "{reference}");
        }
    }
}
