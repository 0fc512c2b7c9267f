//! Router tests driven through `tower::ServiceExt::oneshot`

use std::sync::Arc;

use annotate_core::{ExportOptions, MemoryMetadata, MemoryStorage, Storage};
use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use http_body_util::BodyExt;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::router;
use crate::state::AppState;

fn create_test_pdf(num_pages: u32) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let mut page_ids = Vec::new();
    for _ in 0..num_pages {
        let content = Content {
            operations: vec![
                Operation::new(
                    "rg",
                    vec![Object::Integer(0), Object::Integer(0), Object::Integer(1)],
                ),
                Operation::new(
                    "re",
                    vec![
                        Object::Integer(72),
                        Object::Integer(72),
                        Object::Integer(100),
                        Object::Integer(50),
                    ],
                ),
                Operation::new("f", vec![]),
            ],
        };
        let content_id =
            doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));
        page_ids.push(doc.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
            ("Contents", Object::Reference(content_id)),
        ])));
    }

    let pages = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Count", Object::Integer(num_pages as i64)),
        (
            "Kids",
            Object::Array(page_ids.iter().map(|id| Object::Reference(*id)).collect()),
        ),
        (
            "MediaBox",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ]),
        ),
    ]);
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

struct TestApp {
    router: Router,
    storage: Arc<MemoryStorage>,
    metadata: Arc<MemoryMetadata>,
}

fn test_app() -> TestApp {
    let storage = Arc::new(MemoryStorage::default());
    let metadata = Arc::new(MemoryMetadata::new());
    let state = AppState::new(
        storage.clone(),
        metadata.clone(),
        ExportOptions::default(),
    );
    TestApp {
        router: router(Arc::new(state), None),
        storage,
        metadata,
    }
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, body)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send_json(app: &TestApp, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
    let (status, _, bytes) = send(app, json_request(method, uri, body)).await;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// Open a session with a two-page PDF attached; returns the session id
async fn open_session(app: &TestApp) -> String {
    let (status, body) = send_json(
        app,
        "POST",
        "/api/templates",
        json!({
            "name": "Site Inspection",
            "document": {
                "filename": "inspection.pdf",
                "data_base64": BASE64.encode(create_test_pdf(2)),
            }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["page_count"], 2);
    assert_eq!(body["template"]["attachment"]["kind"], "pdf");
    body["session_id"].as_str().unwrap().to_string()
}

fn geometry() -> Value {
    json!({"left": 0.0, "top": 0.0, "width": 800.0, "height": 1200.0, "page_count": 2})
}

#[tokio::test]
async fn test_health() {
    let app = test_app();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"OK");
}

#[tokio::test]
async fn test_upload_is_stored_under_session() {
    let app = test_app();
    let session = open_session(&app).await;
    let stored = app
        .storage
        .fetch(&format!("memory://files/uploads/{}/inspection.pdf", session))
        .await
        .unwrap();
    assert_eq!(stored, create_test_pdf(2));
}

#[tokio::test]
async fn test_broken_pdf_upload_is_rejected() {
    let app = test_app();
    let (status, body) = send_json(
        &app,
        "POST",
        "/api/templates",
        json!({
            "name": "Broken",
            "document": {"filename": "x.pdf", "data_base64": BASE64.encode(b"not a pdf")}
        }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["status"], 422);
    assert!(app.storage.is_empty());
}

#[tokio::test]
async fn test_click_edit_and_overlay() {
    let app = test_app();
    let session = open_session(&app).await;

    let (status, draft) = send_json(
        &app,
        "POST",
        &format!("/api/templates/{}/click", session),
        json!({"client_x": 400.0, "client_y": 900.0, "geometry": geometry()}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(draft["text"], "New text");
    let annotation_id = draft["id"].as_str().unwrap().to_string();

    let (status, updated) = send_json(
        &app,
        "PUT",
        &format!("/api/templates/{}/annotations/{}", session, annotation_id),
        json!({"text": "Passed", "font_size": 14, "font_color": "#008000"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["annotation"]["page_index"], 1);
    assert_eq!(updated["annotation"]["x_fraction"], 0.5);
    assert_eq!(updated["annotation"]["content"]["text"], "Passed");

    let (status, markers) = send_json(
        &app,
        "POST",
        &format!("/api/templates/{}/overlay", session),
        json!({"geometry": geometry()}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(markers[0]["left"], 400.0);
    assert_eq!(markers[0]["top"], 900.0);
    assert_eq!(markers[0]["label"], "Passed");

    let (status, body) = send_json(
        &app,
        "POST",
        &format!("/api/templates/{}/overlay", session),
        json!({"geometry": geometry(), "visible_pages": [0]}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_empty_text_is_a_bad_request() {
    let app = test_app();
    let session = open_session(&app).await;
    let (_, draft) = send_json(
        &app,
        "POST",
        &format!("/api/templates/{}/click", session),
        json!({"client_x": 10.0, "client_y": 10.0, "geometry": geometry()}),
    )
    .await;

    let (status, body) = send_json(
        &app,
        "PUT",
        &format!(
            "/api/templates/{}/annotations/{}",
            session,
            draft["id"].as_str().unwrap()
        ),
        json!({"text": "", "font_size": 12, "font_color": "#000000"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Annotation text must not be empty");
}

#[tokio::test]
async fn test_delete_annotation() {
    let app = test_app();
    let session = open_session(&app).await;
    let (_, draft) = send_json(
        &app,
        "POST",
        &format!("/api/templates/{}/click", session),
        json!({"client_x": 10.0, "client_y": 10.0, "geometry": geometry()}),
    )
    .await;
    let uri = format!(
        "/api/templates/{}/annotations/{}",
        session,
        draft["id"].as_str().unwrap()
    );

    let request = Request::builder()
        .method("DELETE")
        .uri(&uri)
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let request = Request::builder()
        .method("DELETE")
        .uri(&uri)
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_click_without_document() {
    let app = test_app();
    let (_, body) = send_json(&app, "POST", "/api/templates", json!({"name": "Blank"})).await;
    let session = body["session_id"].as_str().unwrap();

    let (status, _) = send_json(
        &app,
        "POST",
        &format!("/api/templates/{}/click", session),
        json!({"client_x": 10.0, "client_y": 10.0, "geometry": geometry()}),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = send_json(
        &app,
        "POST",
        &format!("/api/templates/{}/export", session),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "Template has no attachment to export");
}

#[tokio::test]
async fn test_export_returns_pdf_download() {
    let app = test_app();
    let session = open_session(&app).await;
    send_json(
        &app,
        "POST",
        &format!("/api/templates/{}/click", session),
        json!({"client_x": 400.0, "client_y": 100.0, "geometry": geometry()}),
    )
    .await;

    let request = Request::builder()
        .method("POST")
        .uri(format!("/api/templates/{}/export", session))
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"Site-Inspection-annotated.pdf\""
    );
    assert_eq!(headers["x-annotations-skipped"], "0");
    assert!(headers.get("x-saved-file-url").is_none());
    assert!(body.starts_with(b"%PDF"));

    let doc = Document::load_mem(&body).unwrap();
    assert_eq!(doc.get_pages().len(), 2);
}

#[tokio::test]
async fn test_export_with_saved_copy() {
    let app = test_app();
    let session = open_session(&app).await;
    let (status, saved) = send_json(
        &app,
        "POST",
        &format!("/api/templates/{}/save", session),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let template_id = saved["id"].as_str().unwrap().to_string();

    let (status, headers, body) = send(
        &app,
        json_request(
            "POST",
            &format!("/api/templates/{}/export", session),
            json!({"save_copy": true, "owner_id": "inspector-7"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let url = headers["x-saved-file-url"].to_str().unwrap().to_string();
    assert!(url.starts_with(&format!("memory://files/exports/{}/", template_id)));
    assert_eq!(app.storage.fetch(&url).await.unwrap(), body.to_vec());

    let files = app.metadata.files();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].owner_id, "inspector-7");
    assert!(app.metadata.template(&template_id).is_some());
}

#[tokio::test]
async fn test_unknown_session() {
    let app = test_app();
    let request = Request::builder()
        .uri("/api/templates/missing")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["error"], "Session not found: missing");
}

#[tokio::test]
async fn test_saved_template_reopens_with_annotations() {
    let app = test_app();
    let session = open_session(&app).await;
    send_json(
        &app,
        "POST",
        &format!("/api/templates/{}/click", session),
        json!({"client_x": 400.0, "client_y": 900.0, "geometry": geometry()}),
    )
    .await;
    let (_, saved) = send_json(
        &app,
        "POST",
        &format!("/api/templates/{}/save", session),
        json!({}),
    )
    .await;
    let stored = app
        .metadata
        .template(saved["id"].as_str().unwrap())
        .unwrap();

    let (status, reopened) = send_json(&app, "POST", "/api/templates/open", stored.data).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_ne!(reopened["session_id"], json!(session));
    assert_eq!(reopened["template"]["id"], saved["id"]);
    assert_eq!(
        reopened["template"]["annotations"][0]["page_index"],
        1
    );
}

#[tokio::test]
async fn test_reopened_template_ignores_client_supplied_url() {
    let app = test_app();
    let (status, body) = send_json(
        &app,
        "POST",
        "/api/templates/open",
        json!({
            "name": "Imported",
            "attachment": {
                "kind": "pdf",
                "url": "http://169.254.169.254/latest/meta-data",
                "storage_path": "uploads/imported.pdf"
            }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
        body["template"]["attachment"]["url"],
        "memory://files/uploads/imported.pdf"
    );
    let session = body["session_id"].as_str().unwrap().to_string();

    let (status, body) = send_json(
        &app,
        "POST",
        &format!("/api/templates/{}/export", session),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let message = body["error"].as_str().unwrap();
    assert!(message.starts_with("Failed to fetch source document"));
    assert!(!message.contains("169.254.169.254"));
}

#[tokio::test]
async fn test_dot_filename_is_a_bad_request() {
    let app = test_app();
    let (status, body) = send_json(
        &app,
        "POST",
        "/api/templates",
        json!({
            "name": "Dots",
            "document": {"filename": "..", "data_base64": BASE64.encode(create_test_pdf(1))}
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid request: Invalid document filename: ..");
    assert!(app.storage.is_empty());
}

#[tokio::test]
async fn test_non_ascii_name_keeps_content_disposition() {
    let app = test_app();
    let (_, body) = send_json(
        &app,
        "POST",
        "/api/templates",
        json!({
            "name": "Überstunden",
            "document": {"filename": "u.pdf", "data_base64": BASE64.encode(create_test_pdf(1))}
        }),
    )
    .await;
    let session = body["session_id"].as_str().unwrap().to_string();

    let request = Request::builder()
        .method("POST")
        .uri(format!("/api/templates/{}/export", session))
        .body(Body::empty())
        .unwrap();
    let (status, headers, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"berstunden-annotated.pdf\""
    );
}
