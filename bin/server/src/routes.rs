//! HTTP routes for starting, signalling, and inspecting workflow runs.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use flowmentor_core::{UserId, WorkflowRunId};
use flowmentor_workflow::{CancelOutcome, RunOutcome};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use std::str::FromStr;
use tower_http::trace::TraceLayer;

/// Body of a start request.
#[derive(Debug, Deserialize)]
pub struct StartRequest {
    /// Defaults to the configured user.
    #[serde(default)]
    pub user_id: Option<String>,
    pub input: JsonValue,
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    // One parameter name per segment position; the first segment is a
    // workflow kind on start and a run id everywhere else.
    Router::new()
        .route("/health", get(health))
        .route("/api/workflows/{id}", post(start_workflow))
        .route("/api/workflows/{id}/signals/{name}", post(send_signal))
        .route("/api/workflows/{id}/result", get(get_result))
        .route("/api/workflows/{id}/cancel", post(cancel_run))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<JsonValue> {
    Json(json!({ "status": "ok" }))
}

fn parse_run_id(raw: &str) -> Result<WorkflowRunId, ApiError> {
    WorkflowRunId::from_str(raw).map_err(|e| ApiError::BadRequest {
        reason: e.to_string(),
    })
}

/// Resolves the run's user and makes the input carry the same one.
///
/// The request's `user_id` wins, then the input's, then the configured
/// default. An input naming a different user than the request is rejected.
fn resolve_user(
    requested: Option<String>,
    input: &mut JsonValue,
    default_user: &UserId,
) -> Result<UserId, ApiError> {
    let from_input = input.get("user_id").cloned();
    let user_id = match (requested, &from_input) {
        (Some(raw), _) => UserId::new(raw),
        (None, Some(JsonValue::String(raw))) => UserId::new(raw.clone()),
        (None, _) => Ok(default_user.clone()),
    }
    .map_err(|e| ApiError::BadRequest {
        reason: e.to_string(),
    })?;

    match (from_input, input.as_object_mut()) {
        (Some(given), _) if given.as_str() != Some(user_id.as_str()) => {
            Err(ApiError::UserMismatch {
                requested: user_id.to_string(),
                input: given.to_string(),
            })
        }
        (None, Some(fields)) => {
            fields.insert("user_id".to_string(), json!(user_id.as_str()));
            Ok(user_id)
        }
        _ => Ok(user_id),
    }
}

async fn start_workflow(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Json(request): Json<StartRequest>,
) -> Result<Response, ApiError> {
    let mut input = request.input;
    let user_id = resolve_user(request.user_id, &mut input, &state.default_user)?;

    let run_id = state.runner.start(&kind, user_id, input).await?;
    let run = state.runner.describe(run_id).await?;
    let body = json!({
        "run_id": run_id.to_string(),
        "kind": run.kind,
        "status": run.status.as_str(),
    });
    Ok((StatusCode::ACCEPTED, Json(body)).into_response())
}

async fn send_signal(
    State(state): State<AppState>,
    Path((run_id, name)): Path<(String, String)>,
    Json(payload): Json<JsonValue>,
) -> Result<Json<JsonValue>, ApiError> {
    let run_id = parse_run_id(&run_id)?;
    let outcome = state.runner.signal(run_id, &name, payload).await?;
    Ok(Json(json!({ "outcome": outcome.as_str() })))
}

async fn get_result(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Response, ApiError> {
    let run_id = parse_run_id(&run_id)?;
    let (status, body) = match state.runner.get_result(run_id).await? {
        RunOutcome::Completed(result) => (
            StatusCode::OK,
            json!({ "status": "completed", "result": result }),
        ),
        RunOutcome::Pending(status) => (StatusCode::ACCEPTED, json!({ "status": status.as_str() })),
        RunOutcome::Failed(error) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "status": "failed", "error": error }),
        ),
        RunOutcome::TimedOut(error) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "status": "timed_out", "error": error }),
        ),
        RunOutcome::Cancelled => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "status": "cancelled", "error": "workflow run was cancelled" }),
        ),
    };
    Ok((status, Json(body)).into_response())
}

async fn cancel_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<JsonValue>, ApiError> {
    let run_id = parse_run_id(&run_id)?;
    let status = match state.runner.cancel(run_id).await? {
        CancelOutcome::Cancelled => "cancelled",
        CancelOutcome::AlreadyTerminal(status) => status.as_str(),
    };
    Ok(Json(json!({ "status": status })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_runner;
    use axum::body::Body;
    use axum::http::Request;
    use flowmentor_ai::StaticTextGenerator;
    use flowmentor_integration::{InMemoryDocumentStore, RecordingNotifier};
    use flowmentor_workflow::{InMemoryHistoryStore, SystemClock, WorkflowRunner};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn state() -> AppState {
        let runner = build_runner(
            Arc::new(InMemoryHistoryStore::new()),
            Arc::new(InMemoryDocumentStore::new()),
            Arc::new(RecordingNotifier::new()),
            Arc::new(StaticTextGenerator::sample()),
            Arc::new(SystemClock),
        );
        AppState::new(runner, UserId::new("demo-user").expect("user"))
    }

    async fn call(app: Router, method: &str, uri: &str, body: Option<JsonValue>) -> (StatusCode, JsonValue) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = app.oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let json = if bytes.is_empty() {
            JsonValue::Null
        } else {
            serde_json::from_slice(&bytes).expect("json")
        };
        (status, json)
    }

    fn focus_block() -> JsonValue {
        json!({
            "input": {
                "block": {
                    "block_id": "block-1",
                    "user_id": "demo-user",
                    "date": "2024-06-03",
                    "title": "Write report",
                    "duration_minutes": 25,
                }
            }
        })
    }

    async fn started(runner: &WorkflowRunner, app: Router, kind: &str, body: JsonValue) -> String {
        let (status, json) = call(app, "POST", &format!("/api/workflows/{kind}"), Some(body)).await;
        assert_eq!(status, StatusCode::ACCEPTED, "{json}");
        runner.wait_idle().await;
        json["run_id"].as_str().expect("run id").to_string()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (status, json) = call(router(state()), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn start_returns_run_id_and_kind() {
        let (status, json) = call(
            router(state()),
            "POST",
            "/api/workflows/morning-check",
            Some(json!({"input": {"user_id": "demo-user", "date": "2024-06-03", "energy_level": 3}})),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(json["kind"], "morning_check");
        assert!(json["run_id"].as_str().expect("run id").starts_with("run_"));
    }

    #[tokio::test]
    async fn unknown_kind_is_not_found() {
        let (status, _) = call(
            router(state()),
            "POST",
            "/api/workflows/lunch_break",
            Some(json!({"input": {}})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_and_unknown_run_ids() {
        let app = router(state());
        let (status, _) = call(app.clone(), "GET", "/api/workflows/not-a-run/result", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let unknown = WorkflowRunId::new();
        let (status, _) = call(app, "GET", &format!("/api/workflows/{unknown}/result"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn completed_run_reports_result() {
        let state = state();
        let app = router(state.clone());
        let run_id = started(
            &state.runner,
            app.clone(),
            "daily_reflection",
            json!({"input": {"user_id": "demo-user", "date": "2024-06-03"}}),
        )
        .await;

        let (status, json) = call(app, "GET", &format!("/api/workflows/{run_id}/result"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "completed");
        assert_eq!(json["result"]["success"], true);
    }

    #[tokio::test]
    async fn waiting_run_is_pending_then_cancelled() {
        let state = state();
        let app = router(state.clone());
        let run_id = started(&state.runner, app.clone(), "focus_loop", focus_block()).await;

        let (status, json) = call(app.clone(), "GET", &format!("/api/workflows/{run_id}/result"), None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(json["status"], "waiting");

        let (status, json) = call(
            app.clone(),
            "POST",
            &format!("/api/workflows/{run_id}/signals/submit_feedback"),
            Some(json!("too early")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["outcome"], "ignored");

        let (status, json) = call(app.clone(), "POST", &format!("/api/workflows/{run_id}/cancel"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "cancelled");

        let (status, json) = call(app, "GET", &format!("/api/workflows/{run_id}/result"), None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["status"], "cancelled");
    }

    #[tokio::test]
    async fn failed_run_is_unprocessable() {
        let state = state();
        let app = router(state.clone());
        let run_id = started(
            &state.runner,
            app.clone(),
            "morning_check",
            json!({"input": {"user_id": "demo-user", "date": "2024-06-03", "energy_level": 0}}),
        )
        .await;

        let (status, json) = call(app, "GET", &format!("/api/workflows/{run_id}/result"), None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["status"], "failed");
        assert!(json["error"].as_str().expect("error").contains("energy level"));
    }

    #[tokio::test]
    async fn input_user_must_match_request_user() {
        let (status, json) = call(
            router(state()),
            "POST",
            "/api/workflows/morning_check",
            Some(json!({
                "user_id": "ana",
                "input": {"user_id": "bo", "date": "2024-06-03", "energy_level": 3},
            })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(json["error"].as_str().expect("error").contains("ana"));
    }

    #[tokio::test]
    async fn input_without_user_gets_resolved_user() {
        let state = state();
        let app = router(state.clone());
        let run_id = started(
            &state.runner,
            app,
            "morning_check",
            json!({
                "user_id": "ana",
                "input": {"date": "2024-06-03", "energy_level": 3},
            }),
        )
        .await;

        let run = state
            .runner
            .describe(parse_run_id(&run_id).expect("run id"))
            .await
            .expect("run");
        assert_eq!(run.user_id.as_str(), "ana");
        assert_eq!(run.input["user_id"], "ana");
    }

    #[test]
    fn input_user_is_used_when_request_names_none() {
        let default_user = UserId::new("demo-user").expect("user");
        let mut input = json!({"user_id": "bo"});
        let user = resolve_user(None, &mut input, &default_user).expect("user");
        assert_eq!(user.as_str(), "bo");

        let mut input = json!(["not", "an", "object"]);
        let user = resolve_user(None, &mut input, &default_user).expect("user");
        assert_eq!(user, default_user);
        assert_eq!(input, json!(["not", "an", "object"]));
    }
}
