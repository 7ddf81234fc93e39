//! HTTP contract tests for the pipeline endpoints.
//!
//! Each test builds the router over a fresh SQLite file and PDF directory in a
//! temp dir and drives it with `tower::ServiceExt::oneshot`.

#![cfg(feature = "server")]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use data_pipeline::api::build_router;
use data_pipeline::{count_records, get_record, Config, Pipeline};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    dir: TempDir,
    pipeline: Pipeline,
}

impl TestApp {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let config = Config {
            database_url: format!("sqlite:///{}", dir.path().join("pipeline.db").display()),
            pdf_output_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        let pipeline = Pipeline::from_config(&config).unwrap();
        TestApp { dir, pipeline }
    }

    async fn request(&self, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();

        let response = build_router(self.pipeline.clone())
            .oneshot(request)
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request("POST", uri, Some(&body.to_string())).await
    }

    fn row_count(&self) -> i64 {
        self.pipeline
            .store_sink()
            .with_connection(count_records)
            .unwrap()
    }
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new();
    let (status, body) = app.request("GET", "/", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn test_clean_store_on_empty_table() {
    let app = TestApp::new();

    let (status, body) = app
        .post("/pipeline/clean_store", json!({"source": "invoice_scan_1", "text": "anything"}))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "stored", "id": 1}));

    let row = app
        .pipeline
        .store_sink()
        .with_connection(|c| get_record(c, 1))
        .unwrap()
        .unwrap();
    assert_eq!(row.record.source, "invoice_scan_1");
    assert_eq!(row.record.document_type, "invoice");
    assert_eq!(row.record.client, "ACME GmbH");
    assert_eq!(row.record.amount, 1999.99);
    assert_eq!(row.record.currency, "EUR");
}

#[tokio::test]
async fn test_clean_store_ids_increase() {
    let app = TestApp::new();
    let payload = json!({"source": "same", "text": "same"});

    let (_, first) = app.post("/pipeline/clean_store", payload.clone()).await;
    let (_, second) = app.post("/pipeline/clean_store", payload).await;

    assert!(second["id"].as_i64().unwrap() > first["id"].as_i64().unwrap());
    assert_eq!(app.row_count(), 2);
}

#[tokio::test]
async fn test_clean_to_pdf() {
    let app = TestApp::new();

    let (status, body) = app
        .post("/pipeline/clean_to_pdf", json!({"source": "x", "text": "y"}))
        .await;

    let expected = app.dir.path().join("x.pdf");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"status": "pdf_generated", "path": expected.display().to_string()})
    );

    let bytes = std::fs::read(&expected).unwrap();
    assert!(bytes.starts_with(b"%PDF"));
    assert!(bytes.windows(b"(source: x)".len()).any(|w| w == b"(source: x)"));
    assert_eq!(app.row_count(), 0);
}

#[tokio::test]
async fn test_clean_to_sheets_unconfigured_is_5xx() {
    let app = TestApp::new();

    let (status, body) = app
        .post("/pipeline/clean_to_sheets", json!({"source": "x", "text": "y"}))
        .await;

    assert!(status.is_server_error());
    assert_eq!(body["status"], "error");
    assert_eq!(body["error"], "export_error");
}

#[tokio::test]
async fn test_missing_text_is_400_on_every_endpoint() {
    let app = TestApp::new();

    for uri in [
        "/pipeline/clean_store",
        "/pipeline/clean_to_sheets",
        "/pipeline/clean_to_pdf",
    ] {
        let (status, body) = app.post(uri, json!({"source": "x"})).await;

        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(body["error"], "validation_error");
        assert_eq!(body["fields"][0]["field"], "text");
    }

    // No sink ran
    assert_eq!(app.row_count(), 0);
    assert!(!app.dir.path().join("x.pdf").exists());
}

#[tokio::test]
async fn test_mistyped_and_malformed_bodies_are_400() {
    let app = TestApp::new();

    let (status, body) = app
        .post("/pipeline/clean_store", json!({"source": 1, "text": "t"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["fields"][0]["field"], "source");

    let (status, body) = app
        .request("POST", "/pipeline/clean_store", Some("{not json"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["fields"][0]["field"], "body");

    assert_eq!(app.row_count(), 0);
}

#[tokio::test]
async fn test_render_failure_is_5xx_without_status() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        database_url: dir.path().join("pipeline.db").display().to_string(),
        pdf_output_dir: dir.path().join("missing"),
        ..Config::default()
    };
    let app = TestApp {
        pipeline: Pipeline::from_config(&config).unwrap(),
        dir,
    };

    let (status, body) = app
        .post("/pipeline/clean_to_pdf", json!({"source": "x", "text": "y"}))
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "error");
    assert_eq!(body["error"], "render_error");
}
