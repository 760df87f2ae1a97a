//! Guidance API
//!
//! JSON API for emergency guidance. Input validation mirrors the
//! deployed service: a missing or empty prompt and an out-of-range
//! `max_tokens` are 400s with a JSON error body, and the health check
//! always answers 200 so load balancers can tell "up but still
//! loading" apart from "down".

use anyhow::{Context, Result};
use axum::{
    extract::rejection::JsonRejection,
    extract::State,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::AppState;
use crate::assistant::{EmergencyAssistant, GeneratorState};
use crate::generation::{chat_prompt, situation_prompt, SamplingParams, COORDINATOR_SYSTEM_PROMPT};

const DEFAULT_MAX_TOKENS: usize = 300;
const MIN_MAX_TOKENS: usize = 10;
const MAX_MAX_TOKENS: usize = 1000;

/// Canned scenario for `GET /test`
const TEST_PROMPT: &str = "What are the first steps to take when coordinating disaster response?";

/// Request body for `POST /emergency-guidance`
#[derive(Debug, Deserialize)]
pub struct GuidanceRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<usize>,
}

/// Metadata attached to successful responses
#[derive(Debug, Serialize)]
pub struct GuidanceMetadata {
    /// Wall-clock seconds spent answering
    pub generation_time: f64,
    /// Length of the formatted prompt in characters
    pub prompt_length: usize,
    /// Length of the response in characters
    pub response_length: usize,
    /// Model the server was configured with
    pub model_path: String,
}

/// Success body for guidance endpoints
#[derive(Debug, Serialize)]
pub struct GuidanceResponse {
    pub prompt: String,
    pub response: String,
    pub metadata: GuidanceMetadata,
}

/// Error body shared by all failure paths
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub response: Option<String>,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/emergency-guidance", post(emergency_guidance))
        .route("/test", get(test_endpoint))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Start the guidance API server
pub async fn serve_api(assistant: Arc<EmergencyAssistant>, host: &str, port: u16) -> Result<()> {
    let state = AppState { assistant };
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid address: {}:{}", host, port))?;

    tracing::info!("Guidance API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

/// Service descriptor
async fn root(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "Emergency Relief AI API",
        "version": env!("CARGO_PKG_VERSION"),
        "model_loaded": state.assistant.handle().is_ready(),
        "endpoints": {
            "/health": "GET - Health check",
            "/emergency-guidance": "POST - Get emergency relief guidance",
            "/test": "GET - Test with sample scenario"
        },
        "usage": {
            "example_request": {
                "method": "POST",
                "url": "/emergency-guidance",
                "body": {
                    "prompt": "How do you set up an emergency shelter?",
                    "max_tokens": 300
                }
            }
        }
    }))
}

/// Health check, always 200
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let handle = state.assistant.handle();
    let generator_state = handle.state();
    let status = match &generator_state {
        GeneratorState::Ready => "healthy",
        GeneratorState::Uninitialized | GeneratorState::Loading => "loading",
        GeneratorState::Failed(_) => "degraded",
    };

    Json(serde_json::json!({
        "status": status,
        "model_loaded": generator_state.is_ready(),
        "model_path": handle.config().model_id,
    }))
}

/// Main guidance endpoint
async fn emergency_guidance(
    State(state): State<AppState>,
    body: Result<Json<GuidanceRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(request)) = body else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'prompt' in request body");
    };
    let Some(prompt) = request.prompt else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'prompt' in request body");
    };
    if prompt.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Empty prompt provided");
    }

    let max_tokens = request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
    if !(MIN_MAX_TOKENS..=MAX_MAX_TOKENS).contains(&max_tokens) {
        return error_response(
            StatusCode::BAD_REQUEST,
            "max_tokens must be between 10 and 1000",
        );
    }

    match generate_guidance(&state, prompt, max_tokens).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => {
            tracing::error!("Guidance request failed: {:#}", e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Server error: {}", e),
            )
        }
    }
}

/// Canned-scenario endpoint for quick smoke checks
async fn test_endpoint(State(state): State<AppState>) -> Response {
    match generate_guidance(&state, TEST_PROMPT.to_string(), 200).await {
        Ok(result) => Json(serde_json::json!({
            "test_prompt": TEST_PROMPT,
            "response": result.response,
            "metadata": result.metadata,
            "error": null,
        }))
        .into_response(),
        Err(e) => Json(serde_json::json!({
            "test_prompt": TEST_PROMPT,
            "response": null,
            "metadata": null,
            "error": e.to_string(),
        }))
        .into_response(),
    }
}

/// Run the pipeline off the async runtime and assemble the response body.
///
/// `prompt_length` reports the formatted prompt actually sent to the
/// model, not the raw user text.
async fn generate_guidance(
    state: &AppState,
    prompt: String,
    max_tokens: usize,
) -> Result<GuidanceResponse> {
    let assistant = Arc::clone(&state.assistant);
    let params = SamplingParams::service().with_max_new_tokens(max_tokens);
    let input = prompt.clone();

    let guidance = tokio::task::spawn_blocking(move || assistant.respond_with(&input, params))
        .await
        .context("Guidance worker failed")?;

    let prompt_length = chat_prompt(COORDINATOR_SYSTEM_PROMPT, &situation_prompt(&prompt)).len();
    let response_length = guidance.text.len();

    Ok(GuidanceResponse {
        prompt,
        response: guidance.text,
        metadata: GuidanceMetadata {
            generation_time: guidance.elapsed.as_secs_f64(),
            prompt_length,
            response_length,
            model_path: state.assistant.handle().config().model_id.clone(),
        },
    })
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
            response: None,
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::AnswerMode;
    use crate::generation::GeneratorConfig;

    fn test_state() -> AppState {
        let assistant = EmergencyAssistant::new(GeneratorConfig::new("/nonexistent/model"))
            .with_mode(AnswerMode::TemplateOnly);
        AppState {
            assistant: Arc::new(assistant),
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_missing_prompt_is_bad_request() {
        let response = emergency_guidance(
            State(test_state()),
            Ok(Json(GuidanceRequest {
                prompt: None,
                max_tokens: None,
            })),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Missing 'prompt' in request body");
        assert!(body["response"].is_null());
    }

    #[tokio::test]
    async fn test_empty_prompt_is_bad_request() {
        let response = emergency_guidance(
            State(test_state()),
            Ok(Json(GuidanceRequest {
                prompt: Some("   ".to_string()),
                max_tokens: None,
            })),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Empty prompt provided");
    }

    #[tokio::test]
    async fn test_max_tokens_bounds() {
        for bad in [5usize, 1001] {
            let response = emergency_guidance(
                State(test_state()),
                Ok(Json(GuidanceRequest {
                    prompt: Some("Flooding downtown".to_string()),
                    max_tokens: Some(bad),
                })),
            )
            .await;

            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let body = body_json(response).await;
            assert_eq!(body["error"], "max_tokens must be between 10 and 1000");
        }
    }

    #[tokio::test]
    async fn test_guidance_succeeds_on_template_fallback() {
        let response = emergency_guidance(
            State(test_state()),
            Ok(Json(GuidanceRequest {
                prompt: Some("Wildfire approaching, 500 residents to evacuate".to_string()),
                max_tokens: None,
            })),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body["response"]
            .as_str()
            .unwrap()
            .contains("WILDFIRE EVACUATION PROTOCOL"));
        assert!(body["metadata"]["prompt_length"].as_u64().unwrap() > 0);
        assert_eq!(
            body["metadata"]["model_path"].as_str().unwrap(),
            "/nonexistent/model"
        );
    }

    #[tokio::test]
    async fn test_health_reports_loading_before_any_load() {
        let response = health(State(test_state())).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "loading");
        assert_eq!(body["model_loaded"], false);
    }
}
