//! HTTP surface consumed by the add-on panel.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::Json as ResponseJson,
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::info;

use crate::api::{AnalysisRequest, JobManager, Services};
use crate::error::{PublisherError, Result};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Background analysis jobs
    pub job_manager: Arc<JobManager>,
}

impl AppState {
    /// Wraps `services` in a fresh job manager
    pub fn new(services: Services) -> Self {
        Self {
            job_manager: Arc::new(JobManager::new(Arc::new(services))),
        }
    }

    fn services(&self) -> &Services {
        self.job_manager.services()
    }
}

/// Create the main application with all routes
pub fn create_app(state: AppState) -> Router {
    let uploads = ServeDir::new(state.services().store.root());
    let body_limit = state.services().config.server.max_upload_bytes;

    Router::new()
        .route("/", get(index))
        .route("/api/health", get(health_check))
        // Add-on tools
        .route("/api/design/generate", post(generate_design))
        .route("/api/compliance/check", post(compliance_check))
        .route("/api/compliance/copyright", post(copyright_check))
        // Uploads
        .route("/api/uploads", get(list_uploads))
        .route("/api/uploads/brand-assets", post(upload_brand_asset))
        .route("/api/uploads/brand-guidelines", post(upload_brand_guidelines))
        // Past-post analysis
        .route("/api/analysis", post(submit_analysis))
        .route("/api/analysis/jobs", get(list_jobs))
        .route("/api/analysis/jobs/:job_id", get(get_job_status))
        .route("/api/analysis/latest", get(latest_analysis))
        .route("/api/images/generate", post(generate_image))
        .nest_service("/uploads", uploads)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Root endpoint - returns basic service information
async fn index() -> ResponseJson<Value> {
    ResponseJson(json!({
        "service": "ContentPublisher",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Backend for the content publisher Adobe Express add-on",
        "endpoints": {
            "health": "/api/health",
            "design": "/api/design/generate",
            "compliance": "/api/compliance/check",
            "copyright": "/api/compliance/copyright",
            "uploads": "/api/uploads",
            "analysis": "/api/analysis",
            "images": "/api/images/generate"
        }
    }))
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> ResponseJson<Value> {
    let health = state.job_manager.get_health().await;
    ResponseJson(json!(health))
}

#[derive(Debug, Deserialize)]
struct PromptRequest {
    prompt: String,
}

async fn generate_design(
    State(state): State<AppState>,
    Json(request): Json<PromptRequest>,
) -> Result<ResponseJson<Value>> {
    info!("Design request: {}", request.prompt);
    let design = state.services().design_generator().generate(&request.prompt).await?;
    Ok(ResponseJson(json!({
        "success": true,
        "message": format!("Code saved to {}", design.saved_to.display()),
        "code": design.code,
        "prompt": design.prompt,
        "saved_to": design.saved_to,
    })))
}

async fn compliance_check(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<ResponseJson<Value>> {
    let upload = read_file_field(multipart).await?;
    let response = state.services().check_compliance(&upload.bytes).await?;
    Ok(ResponseJson(json!(response)))
}

async fn copyright_check(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<ResponseJson<Value>> {
    let upload = read_file_field(multipart).await?;
    let response = state.services().check_copyright(&upload.bytes).await?;
    Ok(ResponseJson(json!(response)))
}

async fn list_uploads(State(state): State<AppState>) -> Result<ResponseJson<Value>> {
    let files = state.services().store.list().await?;
    Ok(ResponseJson(json!({
        "success": true,
        "total": files.len(),
        "files": files,
    })))
}

async fn upload_brand_asset(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<ResponseJson<Value>> {
    let upload = read_file_field(multipart).await?;
    let stored = state
        .services()
        .store
        .save_brand_asset(&upload.file_name, upload.content_type.as_deref(), &upload.bytes)
        .await?;
    Ok(ResponseJson(json!({
        "success": true,
        "message": format!("Brand asset uploaded: {}", stored.filename),
        "file": stored,
    })))
}

async fn upload_brand_guidelines(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<ResponseJson<Value>> {
    let upload = read_file_field(multipart).await?;
    let stored = state
        .services()
        .store
        .save_brand_guidelines(&upload.file_name, upload.content_type.as_deref(), &upload.bytes)
        .await?;
    Ok(ResponseJson(json!({
        "success": true,
        "message": format!("Brand guidelines uploaded: {}", stored.filename),
        "file": stored,
        "original_filename": upload.file_name,
    })))
}

async fn submit_analysis(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, ResponseJson<Value>)> {
    let request = parse_analysis_request(&body)?;
    let response = state.job_manager.submit_analysis(request).await?;
    info!("Analysis job submitted: {}", response.job_id);
    Ok((StatusCode::ACCEPTED, ResponseJson(json!(response))))
}

/// An empty body means default options; anything else must be a valid request
fn parse_analysis_request(body: &[u8]) -> Result<AnalysisRequest> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(AnalysisRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| PublisherError::Validation(format!("Invalid analysis request: {}", e)))
}

async fn list_jobs(State(state): State<AppState>) -> ResponseJson<Value> {
    let jobs = state.job_manager.list_jobs().await;
    ResponseJson(json!({
        "total": jobs.len(),
        "jobs": jobs,
    }))
}

async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<ResponseJson<Value>> {
    let status = state.job_manager.get_job_status(&job_id).await?;
    Ok(ResponseJson(json!(status)))
}

async fn latest_analysis(State(state): State<AppState>) -> Result<ResponseJson<Value>> {
    let report = state.services().store.read_analysis().await?;
    Ok(ResponseJson(json!(report)))
}

async fn generate_image(
    State(state): State<AppState>,
    Json(request): Json<PromptRequest>,
) -> Result<ResponseJson<Value>> {
    let generated = state.services().image_generator()?.generate(&request.prompt).await?;
    let url = format!("/uploads/generated_images/{}", generated.image_filename);
    Ok(ResponseJson(json!({
        "success": true,
        "message": "Design generated successfully!",
        "image_url": url,
        "result": generated,
    })))
}

struct Upload {
    file_name: String,
    content_type: Option<String>,
    bytes: Bytes,
}

/// Reads the multipart field named `file`
async fn read_file_field(mut multipart: Multipart) -> Result<Upload> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| PublisherError::Validation(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| PublisherError::Validation(format!("Failed to read upload: {}", e)))?;
        if bytes.is_empty() {
            return Err(PublisherError::Validation("Uploaded file is empty".into()));
        }
        return Ok(Upload {
            file_name,
            content_type,
            bytes,
        });
    }
    Err(PublisherError::Validation("Missing multipart field 'file'".into()))
}
