//! HTTP handlers for the CodePanda server

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::types::{ErrorResponse, HintRequestBody, HintResponse};
use codepanda::{AnalysisMode, ErrorKind, HintEngine, HintError, HintRequest};

/// Shared server state
pub struct AppState {
    /// The one engine for the process, or why it could not be built
    pub engine: Result<Arc<HintEngine>, HintError>,
    pub model_path: PathBuf,
    /// Single generation slot; the model runtime is not safe for concurrent calls
    pub gate: Mutex<()>,
}

impl AppState {
    pub fn new(engine: codepanda::Result<HintEngine>, model_path: PathBuf) -> Self {
        Self {
            engine: engine.map(Arc::new),
            model_path,
            gate: Mutex::new(()),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/hint", post(create_hint))
        .route("/v1/health", get(health))
        .with_state(state)
}

/// Map an engine error to a status code and error body
fn error_response(err: &HintError) -> Response {
    let (status, kind) = match (err, err.kind()) {
        (HintError::UnknownMode(_), _) => (StatusCode::BAD_REQUEST, "unknown_mode"),
        (_, ErrorKind::ModelMissing) => (StatusCode::SERVICE_UNAVAILABLE, "model_missing"),
        (_, ErrorKind::InputIncomplete) => (StatusCode::UNPROCESSABLE_ENTITY, "input_incomplete"),
        (_, ErrorKind::EngineNotReady) => (StatusCode::SERVICE_UNAVAILABLE, "engine_not_ready"),
        (_, ErrorKind::Internal) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    };
    let message = match err {
        HintError::UnknownMode(_) => err.to_string(),
        _ => err.user_message(),
    };
    (status, Json(ErrorResponse::new(kind, message))).into_response()
}

/// Handler for POST /v1/hint
pub async fn create_hint(
    State(state): State<Arc<AppState>>,
    body: Result<Json<HintRequestBody>, JsonRejection>,
) -> Response {
    let request_id = format!("hint-{}", Uuid::new_v4());

    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            tracing::debug!(%request_id, error = %rejection, "malformed hint request");
            return (
                rejection.status(),
                Json(ErrorResponse::new("input_incomplete", rejection.body_text())),
            )
                .into_response();
        }
    };

    let engine = match &state.engine {
        Ok(engine) => engine.clone(),
        Err(e) => return error_response(e),
    };

    let mode: AnalysisMode = match body.mode.parse() {
        Ok(mode) => mode,
        Err(e) => return error_response(&e),
    };

    let request = HintRequest {
        code: body.code,
        mode,
        goal: body.goal,
        error: body.error,
    };

    // Incomplete input never waits for the generation slot
    if let Err(e) = engine.validate(&request) {
        return error_response(&e);
    }

    let _slot = state.gate.lock().await;
    tracing::debug!(%request_id, %mode, "generation slot acquired");

    // Run generation in a blocking task (the engine is synchronous)
    let result = tokio::task::spawn_blocking(move || engine.complete(&request)).await;

    match result {
        Ok(Ok(completion)) => (
            StatusCode::OK,
            Json(HintResponse {
                id: request_id,
                completion,
            }),
        )
            .into_response(),
        Ok(Err(e)) => {
            tracing::warn!(%request_id, error = %e, "hint generation failed");
            error_response(&e)
        }
        Err(e) => {
            tracing::error!(%request_id, error = %e, "generation task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(
                    "internal",
                    "Something went wrong while preparing your hint.",
                )),
            )
                .into_response()
        }
    }
}

/// Handler for GET /v1/health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let (ready, style) = match &state.engine {
        Ok(engine) => (true, Some(engine.style().to_string())),
        Err(_) => (false, None),
    };
    Json(serde_json::json!({
        "ready": ready,
        "style": style,
        "model_path": state.model_path.display().to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use codepanda::{
        CompletionRuntime, EngineConfig, GenerationConfig, RawCompletion, TemplateStyle,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    struct Canned {
        reply: &'static str,
        calls: Arc<AtomicUsize>,
    }

    impl CompletionRuntime for Canned {
        fn complete(&self, _prompt: &str, _config: &GenerationConfig) -> codepanda::Result<RawCompletion> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RawCompletion::new(self.reply))
        }
    }

    struct Down;

    impl CompletionRuntime for Down {
        fn complete(&self, _prompt: &str, _config: &GenerationConfig) -> codepanda::Result<RawCompletion> {
            Err(HintError::GenerationUnavailable("connection refused".into()))
        }
    }

    fn ready_app(reply: &'static str) -> (Router, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let engine = HintEngine::with_runtime(
            EngineConfig::default().with_style(TemplateStyle::Xml),
            Canned {
                reply,
                calls: calls.clone(),
            },
        );
        let state = Arc::new(AppState::new(engine, PathBuf::from("model.gguf")));
        (router(state), calls)
    }

    async fn post_hint(app: Router, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::post("/v1/hint")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_hint_success() {
        let (app, calls) = ready_app(" Which index does `n` belong to?</hint>");
        let (status, json) = post_hint(
            app,
            serde_json::json!({
                "code": "for n in nums:\n    n *= 2",
                "mode": "Buggy",
                "goal": "double every number in place"
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["hint"], "Which index does `n` belong to?");
        assert_eq!(json["mode"], "Buggy");
        assert!(json["id"].as_str().unwrap().starts_with("hint-"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_code_rejected_before_generation() {
        let (app, calls) = ready_app("unused");
        let (status, json) = post_hint(
            app,
            serde_json::json!({ "code": "", "mode": "Buggy", "goal": "anything" }),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["error"]["kind"], "input_incomplete");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_malformed_body_gets_json_error() {
        let (app, calls) = ready_app("unused");
        let response = app
            .oneshot(
                Request::post("/v1/hint")
                    .header("content-type", "application/json")
                    .body(Body::from("{\"code\": \"x = 1\", "))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"]["kind"], "input_incomplete");

        let (app, _) = ready_app("unused");
        let (status, json) =
            post_hint(app, serde_json::json!({ "code": "x = 1", "goal": "set x" })).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["error"]["kind"], "input_incomplete");
        assert!(json["error"]["message"].as_str().unwrap().contains("mode"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_mode() {
        let (app, _) = ready_app("unused");
        let (status, json) = post_hint(
            app,
            serde_json::json!({ "code": "x = 1", "mode": "Refactor", "goal": "set x" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["kind"], "unknown_mode");
    }

    #[tokio::test]
    async fn test_model_missing_degrades() {
        let state = Arc::new(AppState::new(
            HintEngine::new(EngineConfig::new("/no/such/model.gguf")),
            PathBuf::from("/no/such/model.gguf"),
        ));

        let (status, json) = post_hint(
            router(state.clone()),
            serde_json::json!({ "code": "x = 1", "mode": "Correct", "goal": "set x" }),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["error"]["kind"], "model_missing");

        let response = router(state)
            .oneshot(Request::get("/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let health: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(health["ready"], false);
        assert_eq!(health["model_path"], "/no/such/model.gguf");
    }

    #[tokio::test]
    async fn test_runtime_down() {
        let engine = HintEngine::with_runtime(EngineConfig::default(), Down);
        let state = Arc::new(AppState::new(engine, PathBuf::from("model.gguf")));
        let (status, json) = post_hint(
            router(state),
            serde_json::json!({ "code": "x = 1", "mode": "Buggy", "goal": "set x" }),
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["error"]["kind"], "engine_not_ready");
        assert!(!json["error"]["message"].as_str().unwrap().contains("refused"));
    }
}
