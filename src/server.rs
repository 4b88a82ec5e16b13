//! HTTP server.
//!
//! Exposes the generate / regenerate / download pipeline as a JSON HTTP API
//! for browser front-ends and scripts.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/generate` | Multipart upload (field `file`) → generated suite |
//! | `POST` | `/regenerate` | `{filename, suggestions}` → refined suite under a new key |
//! | `GET`  | `/download/{key}` | Stored suite as a file attachment |
//! | `GET`  | `/artifacts` | All stored artifacts, oldest first |
//! | `GET`  | `/artifacts/{key}/lineage` | Refinement chain back to the first generation |
//! | `GET`  | `/health` | Health check: version, model and a live backend call |
//!
//! # Error Contract
//!
//! ```json
//! { "success": false, "error": "test file not found: 3f2a…", "code": "not_found" }
//! ```
//!
//! Codes: `invalid_request`, `malformed_spec`, `empty_spec` (400),
//! `not_found` (404), `upload_too_large` (413), `generation_backend` (502),
//! `generation_timeout` (504), `storage` (500).

use axum::{
    extract::{
        multipart::MultipartError, rejection::JsonRejection, DefaultBodyLimit, Multipart, Path,
        State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use suitegen_core::error::PipelineError;
use suitegen_core::models::{ArtifactSummary, GenerationResponse, SpecFormat};

use crate::backend::{create_generator, TextGenerator};
use crate::config::Config;
use crate::controller::{GenerateRequest, RegenerateRequest, SessionController};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    controller: Arc<SessionController>,
}

/// Starts the HTTP server with the backend selected in `[generation]`.
///
/// Binds to `[server].bind` and runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let generator = create_generator(&config.generation)?;
    run_server_with_generator(config, generator).await
}

/// Starts the HTTP server with a caller-supplied text generator.
///
/// Like [`run_server`], but lets embedders and tests plug in their own
/// [`TextGenerator`].
pub async fn run_server_with_generator(
    config: &Config,
    generator: Arc<dyn TextGenerator>,
) -> anyhow::Result<()> {
    let controller = SessionController::from_config(config, generator).await?;
    let app = router(Arc::new(controller), config.server.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "suitegen server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Builds the router around an existing controller.
pub fn router(controller: Arc<SessionController>, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/generate", post(handle_generate))
        .route("/regenerate", post(handle_regenerate))
        .route("/download/{key}", get(handle_download))
        .route("/artifacts", get(handle_list))
        .route("/artifacts/{key}/lineage", get(handle_lineage))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .with_state(AppState { controller })
}

// ============ Error response ============

/// Pipeline failure rendered as an HTTP response.
struct AppError(PipelineError);

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        AppError(err)
    }
}

fn status_for(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::InvalidRequest(_)
        | PipelineError::MalformedSpec(_)
        | PipelineError::EmptySpec => StatusCode::BAD_REQUEST,
        PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
        PipelineError::UploadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        PipelineError::GenerationBackend(_) => StatusCode::BAD_GATEWAY,
        PipelineError::GenerationTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        PipelineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = GenerationResponse::from(&self.0);
        (status_for(&self.0), Json(body)).into_response()
    }
}

// ============ POST /generate ============

fn upload_error(err: MultipartError) -> PipelineError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        PipelineError::UploadTooLarge(err.body_text())
    } else {
        PipelineError::InvalidRequest(err.body_text())
    }
}

/// Reads the `file` field (and an optional `format` field) of the upload.
async fn read_upload(mut multipart: Multipart) -> Result<GenerateRequest, PipelineError> {
    let mut request = GenerateRequest::default();
    let mut saw_file = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(upload_error)?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                saw_file = true;
                request.filename = Some(field.file_name().unwrap_or_default().to_string());
                request.content = field
                    .bytes()
                    .await
                    .map_err(upload_error)?
                    .to_vec();
            }
            Some("format") => {
                let text = field
                    .text()
                    .await
                    .map_err(upload_error)?;
                if !text.trim().is_empty() {
                    request.format = Some(text.trim().parse::<SpecFormat>()?);
                }
            }
            _ => {}
        }
    }

    if !saw_file {
        return Err(PipelineError::InvalidRequest("No file uploaded".to_string()));
    }
    Ok(request)
}

async fn handle_generate(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<GenerationResponse>, AppError> {
    let request = read_upload(multipart).await?;
    let description = request.into_description()?;
    let result = state.controller.handle_generate(description).await?;
    Ok(Json(result.into()))
}

// ============ POST /regenerate ============

async fn handle_regenerate(
    State(state): State<AppState>,
    body: Result<Json<RegenerateRequest>, JsonRejection>,
) -> Result<Json<GenerationResponse>, AppError> {
    let Json(request) = body.map_err(|e| PipelineError::InvalidRequest(e.body_text()))?;
    let result = state.controller.handle_regenerate(request).await?;
    Ok(Json(result.into()))
}

// ============ GET /download/{key} ============

async fn handle_download(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    let artifact = state.controller.handle_download(&key).await?;
    let filename = artifact.provenance.digest.download_filename();
    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        artifact.source_text,
    )
        .into_response())
}

// ============ GET /artifacts ============

#[derive(Serialize)]
struct ArtifactListResponse {
    artifacts: Vec<ArtifactSummary>,
}

async fn handle_list(State(state): State<AppState>) -> Result<Json<ArtifactListResponse>, AppError> {
    let artifacts = state.controller.store().list().await?;
    Ok(Json(ArtifactListResponse { artifacts }))
}

#[derive(Serialize)]
struct LineageResponse {
    lineage: Vec<ArtifactSummary>,
}

async fn handle_lineage(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<LineageResponse>, AppError> {
    let lineage = state.controller.lineage(&key).await?;
    Ok(Json(LineageResponse { lineage }))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
}

/// Reports `ok` when the backend answers a tiny prompt, `unhealthy` (503)
/// when it fails, and `disabled` without calling anything when no backend
/// is configured.
async fn handle_health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let engine = state.controller.engine();
    let mut body = HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        model: engine.model_name().to_string(),
        error: None,
        code: None,
    };

    if !engine.backend_enabled() {
        body.status = "disabled";
        return (StatusCode::OK, Json(body));
    }

    match engine.check_backend().await {
        Ok(()) => (StatusCode::OK, Json(body)),
        Err(err) => {
            tracing::warn!(code = err.code(), error = %err, "health check failed");
            body.status = "unhealthy";
            body.error = Some(err.to_string());
            body.code = Some(err.code());
            (StatusCode::SERVICE_UNAVAILABLE, Json(body))
        }
    }
}
