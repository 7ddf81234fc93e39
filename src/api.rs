// HTTP surface: health check + three pipeline endpoints

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::PipelineError;
use crate::pipeline::{ExportedToSheets, PdfGenerated, Pipeline, Stored};
use crate::schema::{RawInput, ValidationError};

/// Error response wrapper
#[derive(Serialize)]
struct ErrorBody<'a> {
    status: &'static str,
    error: &'static str,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<&'a [ValidationError]>,
}

pub struct ApiError(pub PipelineError);

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
            PipelineError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PipelineError::Export { .. } => StatusCode::BAD_GATEWAY,
            PipelineError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let fields = match &self.0 {
            PipelineError::Validation(errors) => Some(errors.as_slice()),
            _ => None,
        };

        let body = ErrorBody {
            status: "error",
            error: self.0.kind(),
            detail: self.0.to_string(),
            fields,
        };

        (status, Json(body)).into_response()
    }
}

fn parse_input(pipeline: &Pipeline, body: &Bytes) -> Result<RawInput, ApiError> {
    pipeline
        .validator()
        .parse_raw_input(body)
        .map_err(|errors| ApiError(PipelineError::Validation(errors)))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET / - Health check
async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// POST /pipeline/clean_store
async fn clean_store(State(pipeline): State<Pipeline>, body: Bytes) -> Result<Json<Stored>, ApiError> {
    let input = parse_input(&pipeline, &body)?;
    Ok(Json(pipeline.clean_and_store(&input).await?))
}

/// POST /pipeline/clean_to_sheets
async fn clean_to_sheets(
    State(pipeline): State<Pipeline>,
    body: Bytes,
) -> Result<Json<ExportedToSheets>, ApiError> {
    let input = parse_input(&pipeline, &body)?;
    Ok(Json(pipeline.clean_and_export_to_sheet(&input).await?))
}

/// POST /pipeline/clean_to_pdf
async fn clean_to_pdf(State(pipeline): State<Pipeline>, body: Bytes) -> Result<Json<PdfGenerated>, ApiError> {
    let input = parse_input(&pipeline, &body)?;
    Ok(Json(pipeline.clean_and_render_to_pdf(&input).await?))
}

// ============================================================================
// Router
// ============================================================================

pub fn build_router(pipeline: Pipeline) -> Router {
    let pipeline_routes = Router::new()
        .route("/clean_store", post(clean_store))
        .route("/clean_to_sheets", post(clean_to_sheets))
        .route("/clean_to_pdf", post(clean_to_pdf));

    Router::new()
        .route("/", get(health_check))
        .nest("/pipeline", pipeline_routes)
        .with_state(pipeline)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
