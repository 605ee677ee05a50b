//! Three-step file upload against a local stand-in for the LMS.
//!
//! Binds an ephemeral port, serves the preflight endpoint and an upload
//! slot, and records what the uploader sends to each.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Multipart, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use lms_sync::models::upload::{BatchRequest, FileUploadContext, UploadFile};
use lms_sync::remote::http::HttpApi;
use lms_sync::upload::http::HttpUploader;
use lms_sync::upload::FileUploader;
use lms_sync::AppError;

#[derive(Debug, Clone)]
struct ReceivedField {
    name: String,
    file_name: Option<String>,
    data: Vec<u8>,
}

#[derive(Clone, Default)]
struct FakeLms {
    base_url: String,
    reject_slot: bool,
    preflight: Arc<Mutex<Vec<(Option<String>, Value)>>>,
    fields: Arc<Mutex<Vec<ReceivedField>>>,
    slot_authorized: Arc<Mutex<Vec<bool>>>,
}

async fn preflight(
    State(lms): State<FakeLms>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    let auth = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    lms.preflight.lock().unwrap().push((auth, body));
    Json(json!({
        "upload_url": format!("{}/slot", lms.base_url),
        "upload_params": { "key": "uploads/notes.txt", "acl": "private" },
    }))
}

async fn slot(
    State(lms): State<FakeLms>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<Value>, StatusCode> {
    lms.slot_authorized
        .lock()
        .unwrap()
        .push(headers.contains_key(AUTHORIZATION));
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_owned();
        let file_name = field.file_name().map(str::to_owned);
        let data = field.bytes().await.unwrap().to_vec();
        lms.fields.lock().unwrap().push(ReceivedField {
            name,
            file_name,
            data,
        });
    }
    if lms.reject_slot {
        return Err(StatusCode::PAYLOAD_TOO_LARGE);
    }
    Ok(Json(json!({ "id": "f-77" })))
}

async fn spawn_lms(reject_slot: bool) -> FakeLms {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral");
    let addr = listener.local_addr().expect("local addr");
    let lms = FakeLms {
        base_url: format!("http://{addr}"),
        reject_slot,
        ..FakeLms::default()
    };

    let app = Router::new()
        .route(
            "/api/v1/courses/c1/assignments/a1/submissions/self/comments/files",
            post(preflight),
        )
        .route("/slot", post(slot))
        .with_state(lms.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    lms
}

fn batch_for(path: std::path::PathBuf) -> BatchRequest {
    BatchRequest {
        batch_id: "batch-1".into(),
        context: FileUploadContext::SubmissionComment {
            course_id: "c1".into(),
            assignment_id: "a1".into(),
        },
        files: vec![UploadFile::from_path(path)],
    }
}

fn uploader(lms: &FakeLms) -> HttpUploader {
    let api = HttpApi::new(&lms.base_url, "secret", 50, Duration::from_secs(10)).expect("client");
    HttpUploader::new(api)
}

#[tokio::test]
async fn file_is_sent_as_multipart_after_slot_params() {
    let lms = spawn_lms(false).await;
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("notes.txt");
    std::fs::write(&path, b"hello canvas").expect("write");

    let mut batch = uploader(&lms).upload(batch_for(path), CancellationToken::new());
    let file_ids = batch.terminal().await.expect("uploaded");

    assert_eq!(file_ids, ["f-77"]);

    let preflight = lms.preflight.lock().unwrap().clone();
    assert_eq!(preflight.len(), 1);
    assert_eq!(preflight[0].0.as_deref(), Some("Bearer secret"));
    assert_eq!(preflight[0].1, json!({ "name": "notes.txt", "size": 12 }));

    let fields = lms.fields.lock().unwrap().clone();
    let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names.len(), 3);
    assert!(names[..2].contains(&"key") && names[..2].contains(&"acl"));
    assert_eq!(names[2], "file", "bytes go last");

    let key = fields.iter().find(|f| f.name == "key").expect("key field");
    assert_eq!(key.data, b"uploads/notes.txt");
    assert_eq!(key.file_name, None);
    assert_eq!(fields[2].file_name.as_deref(), Some("notes.txt"));
    assert_eq!(fields[2].data, b"hello canvas");

    assert_eq!(*lms.slot_authorized.lock().unwrap(), [false]);
}

#[tokio::test]
async fn rejected_slot_fails_the_batch() {
    let lms = spawn_lms(true).await;
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("big.pdf");
    std::fs::write(&path, b"%PDF").expect("write");

    let mut batch = uploader(&lms).upload(batch_for(path), CancellationToken::new());
    let err = batch.terminal().await.expect_err("slot rejected");

    assert!(matches!(err, AppError::Upload(ref msg) if msg.starts_with("big.pdf: ")));
}
