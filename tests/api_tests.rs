mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use common::{test_services, write_posts, FakeModel, FAKE_MODEL_ID, MINIMAL_FEATURES};
use contentpublisher::routes::{create_app, AppState};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "publisher-test-boundary";

async fn app(dir: &Path, model: Arc<FakeModel>) -> Router {
    create_app(AppState::new(test_services(dir, model).await))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_file(uri: &str, file_name: &str, content_type: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_health_reports_model() {
    let dir = TempDir::new().unwrap();
    let app = app(dir.path(), Arc::new(FakeModel::replying("ok"))).await;

    let (status, body) = send(&app, get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["model"], FAKE_MODEL_ID);
    assert_eq!(body["active_jobs"], 0);
}

#[tokio::test]
async fn test_design_generation_writes_code() {
    let dir = TempDir::new().unwrap();
    let model = Arc::new(FakeModel::replying(
        "Here you go:\n```js\nconst rect = editor.createRectangle();\n```\nEnjoy.",
    ));
    let app = app(dir.path(), Arc::clone(&model)).await;

    let (status, body) = send(
        &app,
        post_json("/api/design/generate", json!({"prompt": "a blue square"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["code"], "const rect = editor.createRectangle();");

    let written = std::fs::read_to_string(dir.path().join("code.js")).unwrap();
    assert_eq!(written, "const rect = editor.createRectangle();");

    let requests = model.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].system_instruction.is_some());
    assert!(requests[0].text_content().contains("a blue square"));
}

#[tokio::test]
async fn test_design_without_code_block_is_bad_gateway() {
    let dir = TempDir::new().unwrap();
    let app = app(dir.path(), Arc::new(FakeModel::replying("I cannot draw that."))).await;

    let (status, body) = send(
        &app,
        post_json("/api/design/generate", json!({"prompt": "a blue square"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["success"], false);
    assert!(!dir.path().join("code.js").exists());
}

#[tokio::test]
async fn test_empty_design_prompt_is_rejected() {
    let dir = TempDir::new().unwrap();
    let model = Arc::new(FakeModel::replying("```js\nx\n```"));
    let app = app(dir.path(), Arc::clone(&model)).await;

    let (status, _) = send(&app, post_json("/api/design/generate", json!({"prompt": "   "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(model.call_count(), 0);
}

#[tokio::test]
async fn test_compliance_without_guidelines() {
    let dir = TempDir::new().unwrap();
    let model = Arc::new(FakeModel::replying("COMPLIANCE STATUS: COMPLIANT"));
    let app = app(dir.path(), Arc::clone(&model)).await;

    let (status, body) = send(
        &app,
        post_file("/api/compliance/check", "export.png", "image/png", b"png-bytes"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "No brand guidelines found");
    assert_eq!(model.call_count(), 0);
}

#[tokio::test]
async fn test_compliance_against_uploaded_guidelines() {
    let dir = TempDir::new().unwrap();
    let model = Arc::new(FakeModel::replying(
        "COMPLIANCE STATUS: COMPLIANT\nOverall Score: 8/10\nColours match the palette.",
    ));
    let app = app(dir.path(), Arc::clone(&model)).await;

    let (status, body) = send(
        &app,
        post_file(
            "/api/uploads/brand-guidelines",
            "brand.txt",
            "text/plain",
            b"Use teal and white. No gradients.",
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["original_filename"], "brand.txt");

    let (status, body) = send(
        &app,
        post_file("/api/compliance/check", "export.png", "image/png", b"png-bytes"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let compliance = &body["compliance"];
    assert_eq!(compliance["status"], "passed");
    assert_eq!(compliance["compliant"], true);
    assert_eq!(compliance["score"], 8.0);
    assert!(compliance["details"]["guideline_used"]
        .as_str()
        .unwrap()
        .starts_with("brand_guidelines_"));

    let requests = model.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].text_content().contains("Use teal and white"));
    assert_eq!(requests[0].inline_count(), 1);
}

#[tokio::test]
async fn test_compliance_rejects_empty_upload() {
    let dir = TempDir::new().unwrap();
    let app = app(dir.path(), Arc::new(FakeModel::replying("x"))).await;

    let (status, _) = send(
        &app,
        post_file("/api/compliance/check", "export.png", "image/png", b""),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_brand_asset_uploads() {
    let dir = TempDir::new().unwrap();
    let app = app(dir.path(), Arc::new(FakeModel::replying("x"))).await;

    let (status, body) = send(
        &app,
        post_file("/api/uploads/brand-assets", "post1.png", "image/png", b"png-bytes"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["file"]["filename"], "post1.png");
    assert!(dir.path().join("uploads/brand_images/post1.png").is_file());

    let (status, _) = send(
        &app,
        post_file("/api/uploads/brand-assets", "notes.txt", "text/plain", b"hello"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        post_file("/api/uploads/brand-guidelines", "brand.png", "image/png", b"png"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_uploads_classifies_files() {
    let dir = TempDir::new().unwrap();
    let app = app(dir.path(), Arc::new(FakeModel::replying("x"))).await;

    send(
        &app,
        post_file("/api/uploads/brand-guidelines", "brand.pdf", "application/pdf", b"%PDF-1.4"),
    )
    .await;

    let (status, body) = send(&app, get("/api/uploads")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["files"][0]["type"], "brand_guidelines");
    assert!(body["files"][0]["filename"].as_str().unwrap().ends_with(".pdf"));
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let dir = TempDir::new().unwrap();
    let app = app(dir.path(), Arc::new(FakeModel::replying("x"))).await;

    let (status, body) = send(&app, get("/api/analysis/jobs/does-not-exist")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_analysis_without_csv_is_not_found() {
    let dir = TempDir::new().unwrap();
    let app = app(dir.path(), Arc::new(FakeModel::replying("x"))).await;

    let (status, _) = send(&app, post_json("/api/analysis", json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, get("/api/analysis/latest")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_analysis_rejects_bad_options() {
    let dir = TempDir::new().unwrap();
    let app = app(dir.path(), Arc::new(FakeModel::replying("x"))).await;

    let (status, _) = send(&app, post_json("/api/analysis", json!({"top_percentage": 1.5}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_analysis_rejects_malformed_body() {
    let dir = TempDir::new().unwrap();
    let model = Arc::new(FakeModel::replying("x"));
    let app = app(dir.path(), Arc::clone(&model)).await;
    write_posts(&dir.path().join("uploads/brand_images"), &[("a.png", 5), ("b.png", 1)]);

    let (status, body) = send(&app, post_json("/api/analysis", json!({"top_percentage": "abc"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.to_string().contains("Invalid analysis request"));

    let truncated = Request::builder()
        .method("POST")
        .uri("/api/analysis")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"csv_file\": "))
        .unwrap();
    let (status, _) = send(&app, truncated).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, get("/api/analysis/jobs")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 0);
    assert_eq!(model.call_count(), 0);
}

#[tokio::test]
async fn test_analysis_accepts_empty_body() {
    let dir = TempDir::new().unwrap();
    let app = app(dir.path(), Arc::new(FakeModel::replying(MINIMAL_FEATURES))).await;
    write_posts(&dir.path().join("uploads/brand_images"), &[("a.png", 5), ("b.png", 1)]);

    let request = Request::builder()
        .method("POST")
        .uri("/api/analysis")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["total_posts"], 2);
}

#[tokio::test]
async fn test_analysis_job_runs_to_completion() {
    let dir = TempDir::new().unwrap();
    let model = Arc::new(FakeModel::new(|request| {
        Ok(if request.inline_count() > 0 {
            MINIMAL_FEATURES.to_string()
        } else {
            "Popular posts are minimal and teal.".to_string()
        })
    }));
    let app = app(dir.path(), Arc::clone(&model)).await;
    write_posts(
        &dir.path().join("uploads/brand_images"),
        &[("a.png", 500), ("b.png", 20), ("c.png", 300), ("d.png", 10)],
    );

    let (status, body) = send(
        &app,
        post_json("/api/analysis", json!({"top_percentage": 0.5, "feature_threshold": 0.5})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["total_posts"], 4);
    assert_eq!(body["missing_images"], json!([]));
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let mut job = Value::Null;
    for _ in 0..200 {
        let (status, body) = send(&app, get(&format!("/api/analysis/jobs/{}", job_id))).await;
        assert_eq!(status, StatusCode::OK);
        if body["status"] == "completed" || body["status"] == "failed" {
            job = body;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(job["status"], "completed", "job did not complete: {job}");
    assert_eq!(job["progress"], 100);
    assert_eq!(job["analyzed_posts"], 4);
    assert_eq!(job["result"]["popular_posts"], 2);
    assert_eq!(job["result"]["less_popular_posts"], 2);
    // four images plus the insights request
    assert_eq!(model.call_count(), 5);

    let (status, report) = send(&app, get("/api/analysis/latest")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["insights"], "Popular posts are minimal and teal.");
    assert_eq!(report["metadata"]["total_posts"], 4);
    assert_eq!(report["metadata"]["model"], FAKE_MODEL_ID);
    assert_eq!(report["popular_posts"]["posts"][0]["likes"], 500);

    let (_, jobs) = send(&app, get("/api/analysis/jobs")).await;
    assert_eq!(jobs["total"], 1);
}

#[tokio::test]
async fn test_analysis_reports_missing_images() {
    let dir = TempDir::new().unwrap();
    let model = Arc::new(FakeModel::new(|request| {
        Ok(if request.inline_count() > 0 {
            MINIMAL_FEATURES.to_string()
        } else {
            "insights".to_string()
        })
    }));
    let app = app(dir.path(), model).await;
    let images = dir.path().join("uploads/brand_images");
    write_posts(&images, &[("a.png", 5), ("gone.png", 3)]);
    std::fs::remove_file(images.join("gone.png")).unwrap();

    let (status, body) = send(
        &app,
        post_json("/api/analysis", json!({"csv_file": "posts.csv"})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["total_posts"], 1);
    assert_eq!(body["missing_images"], json!(["gone.png"]));
}

#[tokio::test]
async fn test_optional_integrations_without_keys() {
    let dir = TempDir::new().unwrap();
    let app = app(dir.path(), Arc::new(FakeModel::replying("x"))).await;

    let (status, body) = send(
        &app,
        post_file("/api/compliance/copyright", "export.png", "image/png", b"png-bytes"),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("IMGBB_API_KEY"));

    let (status, body) = send(
        &app,
        post_json("/api/images/generate", json!({"prompt": "summer sale"})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("CLIPDROP_API_KEY"));
}

#[tokio::test]
async fn test_uploads_are_served() {
    let dir = TempDir::new().unwrap();
    let app = app(dir.path(), Arc::new(FakeModel::replying("x"))).await;
    std::fs::write(dir.path().join("uploads/generated_images/g.png"), b"image").unwrap();

    let response = app
        .clone()
        .oneshot(get("/uploads/generated_images/g.png"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"image");
}
