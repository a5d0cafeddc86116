use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, post},
    Json, Router,
};
use parley_shared::{ChatRequest, ChatResponse, HistoryResponse, ModelsResponse};
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::chat::ChatService;
use crate::error::ApiError;
use crate::providers::Provider;

pub struct AppState {
    pub chat: ChatService,
    pub local_models: Vec<String>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/history/:conversation_id", get(conversation_history))
        .nest(
            "/api/openai",
            Router::new().route("/chat", post(openai_chat)),
        )
        .nest(
            "/api/ollama",
            Router::new()
                .route("/chat", post(ollama_chat))
                .route("/models", get(ollama_models)),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Welcome to the parley chat gateway",
        "endpoints": ["/api/openai", "/api/ollama", "/history/{conversation_id}"],
    }))
}

async fn health() -> &'static str {
    "OK"
}

async fn openai_chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    chat(&state, Provider::OpenAi, payload).await
}

async fn ollama_chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    chat(&state, Provider::Ollama, payload).await
}

/// Both chat namespaces funnel into the one orchestrator; only the
/// `Provider` value differs.
async fn chat(
    state: &AppState,
    provider: Provider,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    // Malformed bodies (bad JSON, missing `message`) are the caller's
    // fault: 400, not axum's default 422.
    let Json(request) = payload.map_err(|rejection| ApiError::Validation(rejection.body_text()))?;
    let response = state.chat.complete(provider, request).await?;
    Ok(Json(response))
}

async fn conversation_history(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let messages = state.chat.history(&conversation_id).ok_or_else(|| {
        ApiError::NotFound(format!("No history for conversation '{conversation_id}'"))
    })?;

    Ok(Json(HistoryResponse {
        message_count: messages.len(),
        conversation_id,
        messages,
    }))
}

async fn ollama_models(State(state): State<Arc<AppState>>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: state.local_models.clone(),
    })
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use parley_shared::Usage;
    use tower::ServiceExt;

    use super::*;
    use crate::chat::testing::{scripted_service, ScriptedBackend};

    fn test_app() -> (Router, Arc<ScriptedBackend>, Arc<ScriptedBackend>) {
        let openai = Arc::new(
            ScriptedBackend::new(Provider::OpenAi, "gpt-4o-mini").with_usage(Usage {
                completion_tokens: 5,
                prompt_tokens: 11,
                total_tokens: 16,
            }),
        );
        let ollama = Arc::new(ScriptedBackend::new(Provider::Ollama, "llama3"));
        let (chat, _) = scripted_service(openai.clone(), ollama.clone());

        let state = Arc::new(AppState {
            chat,
            local_models: vec!["llama3".to_string(), "mistral".to_string()],
        });
        (router(state), openai, ollama)
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };
        (status, body)
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn chat_round_trip_records_history() {
        let (app, _, ollama) = test_app();

        let (status, body) = send(
            app.clone(),
            post_json(
                "/api/ollama/chat",
                r#"{"message":"hello","conversation_id":"c1"}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"]["role"], "assistant");
        assert_eq!(body["message"]["content"], "reply 1");
        assert_eq!(body["usage"], serde_json::Value::Null);
        assert_eq!(body["model"], "llama3");

        let (status, body) = send(
            app.clone(),
            post_json(
                "/api/ollama/chat",
                r#"{"message":"again","conversation_id":"c1"}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"]["content"], "reply 2");

        // Second outbound request: preamble + first pair + new turn.
        let (outbound, _) = ollama.last_request().unwrap();
        assert_eq!(outbound.len(), 4);

        let (status, body) = send(app, get_req("/history/c1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["conversation_id"], "c1");
        assert_eq!(body["message_count"], 4);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"], "hello");
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[2]["content"], "again");
        // The preamble is never part of recorded history.
        assert!(messages.iter().all(|m| m["role"] != "system"));
    }

    #[tokio::test]
    async fn openai_chat_reports_usage_verbatim() {
        let (app, _, _) = test_app();

        let (status, body) =
            send(app, post_json("/api/openai/chat", r#"{"message":"hi"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["usage"]["completion_tokens"], 5);
        assert_eq!(body["usage"]["prompt_tokens"], 11);
        assert_eq!(body["usage"]["total_tokens"], 16);
        assert_eq!(body["model"], "gpt-4o-mini");
    }

    #[tokio::test]
    async fn empty_message_is_400_and_never_reaches_the_backend() {
        let (app, _, ollama) = test_app();

        let (status, body) =
            send(app, post_json("/api/ollama/chat", r#"{"message":""}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "No message provided");
        assert_eq!(ollama.call_count(), 0);
    }

    #[tokio::test]
    async fn missing_message_field_is_400() {
        let (app, _, ollama) = test_app();

        let (status, _) = send(
            app,
            post_json("/api/ollama/chat", r#"{"conversation_id":"c1"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(ollama.call_count(), 0);
    }

    #[tokio::test]
    async fn malformed_json_is_400() {
        let (app, _, _) = test_app();

        let (status, _) = send(app, post_json("/api/ollama/chat", "{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_conversation_is_404() {
        let (app, _, _) = test_app();

        let (status, body) = send(app, get_req("/history/unknown-id")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["detail"].as_str().unwrap().contains("unknown-id"));
    }

    #[tokio::test]
    async fn provider_failure_is_500_and_history_is_untouched() {
        let (app, _, ollama) = test_app();

        let (status, _) = send(
            app.clone(),
            post_json(
                "/api/ollama/chat",
                r#"{"message":"hello","conversation_id":"c1"}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        ollama.set_failing(true);
        let (status, body) = send(
            app.clone(),
            post_json(
                "/api/ollama/chat",
                r#"{"message":"boom","conversation_id":"c1"}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["detail"].as_str().unwrap().contains("ollama"));

        let (status, body) = send(app, get_req("/history/c1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message_count"], 2);
    }

    #[tokio::test]
    async fn models_endpoint_lists_local_models() {
        let (app, _, _) = test_app();

        let (status, body) = send(app, get_req("/api/ollama/models")).await;
        assert_eq!(status, StatusCode::OK);
        let models = body["models"].as_array().unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0], "llama3");
    }

    #[tokio::test]
    async fn health_and_root_respond() {
        let (app, _, _) = test_app();

        let response = app
            .clone()
            .oneshot(get_req("/health"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let (status, body) = send(app, get_req("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["message"].as_str().unwrap().contains("parley"));
    }
}
