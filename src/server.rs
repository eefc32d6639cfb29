use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context as AnyhowContext, Result};
use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::Html,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{error, info};
use uuid::Uuid;

use crate::outline::{GenerationError, Outline, OutlineGenerator};

const INDEX_HTML: &str = include_str!("../assets/index.html");

pub async fn run(addr: SocketAddr, generator: Arc<OutlineGenerator>) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .context("failed to bind outline service listener")?;
    run_with_listener(listener, generator).await
}

pub async fn run_with_listener(
    listener: TcpListener,
    generator: Arc<OutlineGenerator>,
) -> Result<()> {
    let state = Arc::new(ServeState { generator });
    let router = build_router(state);
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "slideforge listening");
    } else {
        info!("slideforge listening");
    }
    axum::serve(listener, router.into_make_service())
        .await
        .context("outline service failed")
}

struct ServeState {
    generator: Arc<OutlineGenerator>,
}

fn build_router(state: Arc<ServeState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route(
            "/api/generate",
            post(generate_handler).fallback(method_not_allowed_handler),
        )
        .with_state(state)
}

#[derive(Deserialize)]
struct GenerateRequest {
    topic: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(
    status: StatusCode,
    message: impl Into<String>,
) -> (StatusCode, Json<ErrorBody>) {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn generate_handler(
    State(state): State<Arc<ServeState>>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<Outline>, (StatusCode, Json<ErrorBody>)> {
    let Json(request) = payload.map_err(|_| {
        error_response(StatusCode::BAD_REQUEST, "A valid study topic is required")
    })?;
    let topic = request.topic.trim().to_string();
    if topic.is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "A valid study topic is required",
        ));
    }

    let request_id = Uuid::new_v4();
    info!(%request_id, topic = %topic, "outline generation requested");

    match state.generator.generate(&topic).await {
        Ok(outline) => {
            info!(%request_id, slides = outline.slides.len(), "outline generated");
            Ok(Json(outline))
        }
        Err(err @ GenerationError::InvalidTopic) => {
            Err(error_response(StatusCode::BAD_REQUEST, err.to_string()))
        }
        Err(err) => {
            error!(%request_id, error = %err, "outline generation failed");
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                err.to_string(),
            ))
        }
    }
}

async fn method_not_allowed_handler() -> (StatusCode, Json<ErrorBody>) {
    error_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
}
