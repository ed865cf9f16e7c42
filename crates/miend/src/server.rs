//! Axum HTTP surface.
//!
//! One classification endpoint plus a liveness probe. Classification runs
//! on the blocking pool; the pipeline is pure CPU work over an immutable
//! artifact bundle, so handlers share it without locking.

use axum::{
    extract::{DefaultBodyLimit, Form, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use mien_core::{Outcome, Pipeline};

// Base64 payloads run ~4/3 the image size; this allows ~12MB images.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

pub fn create_router(pipeline: Pipeline) -> Router {
    Router::new()
        .route("/", get(liveness_handler))
        .route("/api/classify_image", post(classify_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(pipeline)
}

async fn liveness_handler() -> &'static str {
    "miend is up"
}

#[derive(Deserialize)]
struct ClassifyRequest {
    image_data: String,
}

async fn classify_handler(
    State(pipeline): State<Pipeline>,
    Form(request): Form<ClassifyRequest>,
) -> Json<Vec<Outcome>> {
    let outcomes = tokio::task::spawn_blocking(move || {
        pipeline.classify_base64(&request.image_data)
    })
    .await
    .unwrap_or_else(|join_err| {
        tracing::error!(%join_err, "classification task panicked");
        vec![Outcome::error("internal classification failure")]
    });

    Json(outcomes)
}
