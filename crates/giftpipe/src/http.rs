use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use giftpipe_core::{Error, GiftRequest};
use giftpipe_local::GiftPipeline;
use tower_http::cors::{Any, CorsLayer};

use crate::error::ApiFailure;

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<GiftPipeline>,
}

impl AppState {
    pub fn new(pipeline: GiftPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}

/// `POST /` and `POST /generate-gift-suggestions` run the pipeline; `GET /health` answers
/// liveness checks. Any other method on those paths gets a JSON 405.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let suggest = post(generate_gift_suggestions).fallback(method_not_allowed);

    Router::new()
        .route("/", suggest.clone())
        .route("/generate-gift-suggestions", suggest)
        .route("/health", get(health).fallback(method_not_allowed))
        .layer(cors)
        .with_state(state)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let raw = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = raw.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

async fn generate_gift_suggestions(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<GiftRequest>, JsonRejection>,
) -> Response {
    let token = bearer_token(&headers);
    let request = match body {
        Ok(Json(req)) => req,
        // Auth is reported before anything about the body.
        Err(_) if token.is_none() => {
            return ApiFailure(Error::Unauthorized("missing bearer token".to_string()))
                .into_response()
        }
        Err(rejection) => {
            return ApiFailure(Error::InvalidInput(format!(
                "invalid request body: {}",
                rejection.body_text()
            )))
            .into_response()
        }
    };

    match state.pipeline.run(token, &request).await {
        Ok(resp) => Json(resp).into_response(),
        Err(e) => ApiFailure(e).into_response(),
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "ok": true,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(serde_json::json!({
            "success": false,
            "error": "method not allowed",
        })),
    )
        .into_response()
}
