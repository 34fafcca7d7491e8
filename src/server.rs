//! HTTP API server: axum router and request handlers.
//!
//! The server runs on the tokio runtime while the render thread runs on a
//! plain `std::thread`. Handlers never touch the output directly; they send
//! `RenderCommand`s and read the shared `DisplayStatus` and warning list.

use crate::media::{self, MediaEntry};
use crate::render::{DisplayState, DisplayStatus, RenderCommand, lock_status};
use crate::warnings::{Warning, WarningHolder};
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

type ApiResult = Result<StatusCode, (StatusCode, String)>;

// ── App State ────────────────────────────────────────────────────────

/// Shared application state, cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    /// Channel to the render thread
    pub command_tx: Sender<RenderCommand>,
    /// Render thread writes, handlers read
    pub status: Arc<Mutex<DisplayStatus>>,
    pub warnings: WarningHolder,
    /// Root directory for media files (images/)
    pub media_dir: PathBuf,
}

impl AppState {
    fn send(&self, cmd: RenderCommand) -> ApiResult {
        self.command_tx.send(cmd).map_err(|_| {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Render thread gone".to_string(),
            )
        })?;
        Ok(StatusCode::OK)
    }
}

// ── OpenAPI Documentation ────────────────────────────────────────────

#[derive(OpenApi)]
#[openapi(
    paths(
        get_status,
        get_warnings,
        get_images,
        post_display_image,
        post_display_frame,
        post_display_test,
        post_display_panels,
        post_display_clear,
        post_display_stop,
    ),
    components(schemas(DisplayStatus, DisplayState, Warning, MediaEntry, ImageRequest)),
    tags(
        (name = "display", description = "Display control endpoints"),
        (name = "media", description = "Media discovery endpoints"),
        (name = "system", description = "Output status and warnings"),
    ),
    info(
        title = "ColorLight Wall API",
        version = env!("CARGO_PKG_VERSION"),
        description = "HTTP API for a ColorLight 5a-75 LED video wall"
    )
)]
pub struct ApiDoc;

#[derive(Deserialize, utoipa::ToSchema)]
pub struct ImageRequest {
    /// Path to image file relative to media directory
    #[schema(example = "images/test.png")]
    path: String,
}

// ── Router ───────────────────────────────────────────────────────────

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(
            SwaggerUi::new("/docs")
                .url("/api-docs/openapi.json", ApiDoc::openapi())
                .config(
                    utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
                        .validator_url("none"),
                ),
        )
        .route("/api/v1/status", get(get_status))
        .route("/api/v1/warnings", get(get_warnings))
        .route("/api/v1/images", get(get_images))
        .route("/api/v1/display/image", post(post_display_image))
        .route("/api/v1/display/frame", post(post_display_frame))
        .route("/api/v1/display/test", post(post_display_test))
        .route("/api/v1/display/panels", post(post_display_panels))
        .route("/api/v1/display/clear", post(post_display_clear))
        .route("/api/v1/display/stop", post(post_display_stop))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Handlers ─────────────────────────────────────────────────────────

/// GET /api/v1/status
#[utoipa::path(
    get,
    path = "/api/v1/status",
    tag = "system",
    responses(
        (status = 200, description = "Current output status", body = DisplayStatus)
    )
)]
async fn get_status(State(state): State<AppState>) -> Json<DisplayStatus> {
    Json(lock_status(&state.status).clone())
}

/// GET /api/v1/warnings
#[utoipa::path(
    get,
    path = "/api/v1/warnings",
    tag = "system",
    responses(
        (status = 200, description = "Active operator warnings", body = Vec<Warning>)
    )
)]
async fn get_warnings(State(state): State<AppState>) -> Json<Vec<Warning>> {
    Json(state.warnings.active())
}

/// GET /api/v1/images
#[utoipa::path(
    get,
    path = "/api/v1/images",
    tag = "media",
    responses(
        (status = 200, description = "List of available images", body = Vec<MediaEntry>)
    )
)]
async fn get_images(State(state): State<AppState>) -> Json<Vec<MediaEntry>> {
    Json(media::list_images(&state.media_dir))
}

/// POST /api/v1/display/image
#[utoipa::path(
    post,
    path = "/api/v1/display/image",
    tag = "display",
    request_body = ImageRequest,
    responses(
        (status = 200, description = "Image queued for display"),
        (status = 404, description = "Image not found"),
        (status = 400, description = "Invalid path")
    )
)]
async fn post_display_image(
    State(state): State<AppState>,
    Json(req): Json<ImageRequest>,
) -> ApiResult {
    let full_path = validate_media_path(&state.media_dir, &req.path)?;
    state.send(RenderCommand::ShowImage(full_path))
}

/// POST /api/v1/display/frame
///
/// Body is `application/octet-stream` with exactly width*height*3 bytes.
#[utoipa::path(
    post,
    path = "/api/v1/display/frame",
    tag = "display",
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Frame queued for display"),
        (status = 400, description = "Wrong frame size")
    )
)]
async fn post_display_frame(State(state): State<AppState>, body: Bytes) -> ApiResult {
    let (expected, width, height) = {
        let s = lock_status(&state.status);
        (s.channel_count, s.width, s.height)
    };
    if body.len() != expected {
        return Err((
            StatusCode::BAD_REQUEST,
            format!(
                "Expected {} bytes ({}x{}x3 RGB), got {} bytes",
                expected,
                width,
                height,
                body.len()
            ),
        ));
    }
    state.send(RenderCommand::ShowFrame(body.to_vec()))
}

/// POST /api/v1/display/test
#[utoipa::path(
    post,
    path = "/api/v1/display/test",
    tag = "display",
    responses(
        (status = 200, description = "Test pattern started"),
    )
)]
async fn post_display_test(State(state): State<AppState>) -> ApiResult {
    state.send(RenderCommand::TestPattern)
}

/// POST /api/v1/display/panels
#[utoipa::path(
    post,
    path = "/api/v1/display/panels",
    tag = "display",
    responses(
        (status = 200, description = "Panels stamped with output and chain numbers"),
    )
)]
async fn post_display_panels(State(state): State<AppState>) -> ApiResult {
    state.send(RenderCommand::PanelTest)
}

/// POST /api/v1/display/clear
#[utoipa::path(
    post,
    path = "/api/v1/display/clear",
    tag = "display",
    responses(
        (status = 200, description = "Wall blanked"),
    )
)]
async fn post_display_clear(State(state): State<AppState>) -> ApiResult {
    state.send(RenderCommand::Clear)
}

/// POST /api/v1/display/stop
#[utoipa::path(
    post,
    path = "/api/v1/display/stop",
    tag = "display",
    responses(
        (status = 200, description = "Current content frozen"),
    )
)]
async fn post_display_stop(State(state): State<AppState>) -> ApiResult {
    state.send(RenderCommand::Stop)
}

// ── Path validation ──────────────────────────────────────────────────

/// Resolve `relative_path` under `media_dir`, rejecting anything that
/// escapes it.
fn validate_media_path(
    media_dir: &Path,
    relative_path: &str,
) -> Result<PathBuf, (StatusCode, String)> {
    let canonical = media_dir.join(relative_path).canonicalize().map_err(|_| {
        (
            StatusCode::NOT_FOUND,
            format!("Path not found: {relative_path}"),
        )
    })?;

    let canonical_media = media_dir.canonicalize().map_err(|_| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Media directory not found".to_string(),
        )
    })?;

    if !canonical.starts_with(&canonical_media) {
        return Err((
            StatusCode::BAD_REQUEST,
            "Path is outside the media directory".to_string(),
        ));
    }

    Ok(canonical)
}
