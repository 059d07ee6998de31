//! HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/ask` | Run a query; server-sent event stream of pipeline events |
//! | `POST` | `/check_pose` | Multipart image upload (field `image`); posture feedback |
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/static/*` | Files from `[server].static_dir` |
//!
//! # Error Contract
//!
//! `/ask` errors use the JSON shape
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "No query provided" } }
//! ```
//!
//! `/check_pose` errors use a flat `{ "message": "..." }` body so the
//! upload form can show the message as-is.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted for the browser client.

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::PoseError;
use crate::pipeline::Pipeline;
use crate::pose::{create_estimator, PoseChecker, PoseReport, NO_PERSON_MESSAGE};

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub pose: Arc<PoseChecker>,
}

/// Builds the pipeline, warms the vector index, and serves until the
/// process is terminated. Warmup failure is returned as an error.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pipeline = Arc::new(Pipeline::from_config(config).await?);
    pipeline
        .warmup()
        .await
        .map_err(|e| anyhow::anyhow!("Startup warmup failed: {}", e))?;

    let estimator = create_estimator(&config.pose)?;
    let pose = Arc::new(PoseChecker::new(estimator, &config.server.static_dir));

    let app = router(AppState { pipeline, pose }, &config.server.static_dir);

    tracing::info!(bind = %config.server.bind, "server listening");
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(state: AppState, static_dir: &Path) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ask", post(handle_ask))
        .route(
            "/check_pose",
            post(handle_check_pose).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/health", get(handle_health))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskRequest {
    #[serde(default)]
    query: String,
}

async fn handle_ask(
    State(state): State<AppState>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>> + Send>, AppError> {
    let Json(req) = payload.map_err(|rejection| bad_request(rejection.body_text()))?;
    let query = req.query.trim().to_string();
    if query.is_empty() {
        return Err(bad_request("No query provided"));
    }
    tracing::info!(query = %query, "received query");

    let stream = state.pipeline.run(query).map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok::<_, Infallible>(Event::default().event(event.event_name()).data(data))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

// ============ POST /check_pose ============

#[derive(Serialize)]
struct PoseResponse {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_path: Option<String>,
}

fn pose_reply(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(PoseResponse {
            message: message.into(),
            image_path: None,
        }),
    )
        .into_response()
}

async fn handle_check_pose(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut image = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("image") => match field.bytes().await {
                Ok(bytes) => {
                    image = Some(bytes);
                    break;
                }
                Err(e) => return pose_reply(StatusCode::BAD_REQUEST, e.body_text()),
            },
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(e) => return pose_reply(StatusCode::BAD_REQUEST, e.body_text()),
        }
    }

    let Some(bytes) = image.filter(|b| !b.is_empty()) else {
        return pose_reply(StatusCode::BAD_REQUEST, "No image uploaded");
    };

    match state.pose.check(&bytes).await {
        Ok(PoseReport::Assessed {
            message,
            image_path,
            ..
        }) => Json(PoseResponse {
            message,
            image_path: Some(image_path),
        })
        .into_response(),
        Ok(PoseReport::NoPerson) => pose_reply(StatusCode::BAD_REQUEST, NO_PERSON_MESSAGE),
        Err(PoseError::InvalidImage) => {
            pose_reply(StatusCode::BAD_REQUEST, PoseError::InvalidImage.to_string())
        }
        Err(e) => {
            tracing::error!(error = %e, "pose check failed");
            pose_reply(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
