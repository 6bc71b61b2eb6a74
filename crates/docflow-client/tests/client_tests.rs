//! Integration tests for `DocflowClient` against an in-process mock server.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Form, Multipart, Path, State};
use axum::http::header::{AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use docflow_client::{ClientConfig, DocflowClient};
use docflow_core::{
    ActionError, AuthFlow, AuthService, DocumentDetailController, DocumentId,
    DocumentListController, DocumentService, FileUpload, Grant, Lenient, Navigate, Preview,
    RowAction, RowStatus, ServiceError, Session,
};
use serde::Deserialize;
use serde_json::{Value, json};

const TOKEN: &str = "tok-alice";

struct StoredDoc {
    id: i64,
    title: String,
    signed: bool,
    rejected: Option<String>,
    users: Vec<Value>,
    content_type: String,
    bytes: Vec<u8>,
}

impl StoredDoc {
    /// The server's document shape. Who it was sent to only shows in the
    /// grant list.
    fn json(&self) -> Value {
        let mut doc = json!({
            "id": self.id,
            "original_filename": self.title,
            "upload_date": "2024-05-01T10:00:00",
            "is_signed": self.signed,
            "owner": {"id": 1, "email": "alice@example.com", "full_name": "Alice", "is_active": true},
            "size": self.bytes.len(),
        });
        if let Some(reason) = &self.rejected {
            doc["rejected_reason"] = json!(reason);
        }
        doc
    }
}

#[derive(Default)]
struct Mock {
    next_id: i64,
    documents: Vec<StoredDoc>,
    sign_comments: Vec<String>,
    list_calls: usize,
    fail_lists: usize,
    null_documents: bool,
    users_calls: usize,
    sign_calls: usize,
    fail_signs: bool,
}

type Shared = Arc<Mutex<Mock>>;

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TOKEN}"))
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"detail": "Not authenticated"})),
    )
        .into_response()
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"detail": "Document not found"})),
    )
        .into_response()
}

async fn read_upload(mut multipart: Multipart) -> (Option<String>, Option<(String, Vec<u8>)>) {
    let mut title = None;
    let mut file = None;
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("title") => title = Some(field.text().await.unwrap()),
            Some("file") => {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_owned();
                file = Some((content_type, field.bytes().await.unwrap().to_vec()));
            }
            _ => {}
        }
    }
    (title, file)
}

async fn login(Form(form): Form<HashMap<String, String>>) -> Response {
    match (form.get("username").map(String::as_str), form.get("password").map(String::as_str)) {
        (Some("alice"), Some("secret")) => Json(json!({"access_token": TOKEN})).into_response(),
        (Some("alice"), _) => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "incorrect_password"})),
        )
            .into_response(),
        _ => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "user_not_found"})),
        )
            .into_response(),
    }
}

async fn register(Json(body): Json<Value>) -> Response {
    if body["username"] == "alice" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "username_exists"})),
        )
            .into_response();
    }
    Json(json!({"access_token": "tok-new"})).into_response()
}

async fn list_documents(State(state): State<Shared>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let mut mock = state.lock().unwrap();
    mock.list_calls += 1;
    if mock.fail_lists > 0 {
        mock.fail_lists -= 1;
        return (StatusCode::SERVICE_UNAVAILABLE, "busy").into_response();
    }
    if mock.null_documents {
        return Json(json!({ "documents": null })).into_response();
    }
    let documents: Vec<Value> = mock.documents.iter().map(StoredDoc::json).collect();
    Json(json!({ "documents": documents })).into_response()
}

async fn get_document(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let mock = state.lock().unwrap();
    match mock.documents.iter().find(|d| d.id == id) {
        Some(doc) => Json(doc.json()).into_response(),
        None => not_found(),
    }
}

async fn add_document(
    State(state): State<Shared>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let (title, file) = read_upload(multipart).await;
    let (Some(title), Some((content_type, bytes))) = (title, file) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"detail": "No file provided or filename is missing."})),
        )
            .into_response();
    };
    let mut mock = state.lock().unwrap();
    mock.next_id += 1;
    let id = mock.next_id;
    mock.documents.push(StoredDoc {
        id,
        title,
        signed: false,
        rejected: None,
        users: Vec::new(),
        content_type,
        bytes,
    });
    (StatusCode::CREATED, Json(json!({"id": id}))).into_response()
}

async fn replace_document(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let (_, file) = read_upload(multipart).await;
    let mut mock = state.lock().unwrap();
    let Some(doc) = mock.documents.iter_mut().find(|d| d.id == id) else {
        return not_found();
    };
    if let Some((content_type, bytes)) = file {
        doc.content_type = content_type;
        doc.bytes = bytes;
    }
    Json(doc.json()).into_response()
}

async fn delete_document(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let mut mock = state.lock().unwrap();
    let before = mock.documents.len();
    mock.documents.retain(|d| d.id != id);
    if mock.documents.len() == before {
        return not_found();
    }
    StatusCode::NO_CONTENT.into_response()
}

#[derive(Deserialize)]
struct SignBody {
    comments: String,
}

async fn sign_document(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<SignBody>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let mut mock = state.lock().unwrap();
    mock.sign_calls += 1;
    if mock.fail_signs {
        return (StatusCode::SERVICE_UNAVAILABLE, "busy").into_response();
    }
    mock.sign_comments.push(body.comments);
    let Some(doc) = mock.documents.iter_mut().find(|d| d.id == id) else {
        return not_found();
    };
    doc.signed = true;
    Json(json!({"message": "signed"})).into_response()
}

#[derive(Deserialize)]
struct RejectBody {
    reason: String,
}

async fn reject_document(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<RejectBody>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let mut mock = state.lock().unwrap();
    let Some(doc) = mock.documents.iter_mut().find(|d| d.id == id) else {
        return not_found();
    };
    if doc.signed {
        return (
            StatusCode::CONFLICT,
            Json(json!({"detail": "Document already signed"})),
        )
            .into_response();
    }
    doc.rejected = Some(body.reason);
    Json(json!({"message": "rejected"})).into_response()
}

async fn list_users(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let mut mock = state.lock().unwrap();
    mock.users_calls += 1;
    match mock.documents.iter().find(|d| d.id == id) {
        Some(doc) => Json(doc.users.clone()).into_response(),
        None => not_found(),
    }
}

async fn add_user(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(grant): Json<Grant>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let mut mock = state.lock().unwrap();
    let Some(doc) = mock.documents.iter_mut().find(|d| d.id == id) else {
        return not_found();
    };
    let user_id = doc.users.len() + 2;
    doc.users.push(json!({
        "user_id": user_id,
        "email": grant.email,
        "full_name": null,
        "can_view": grant.can_view,
        "can_sign": grant.can_sign,
    }));
    (StatusCode::CREATED, Json(json!({"message": "added"}))).into_response()
}

async fn download(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let mock = state.lock().unwrap();
    let Some(doc) = mock.documents.iter().find(|d| d.id == id) else {
        return not_found();
    };
    (
        [
            (CONTENT_TYPE, doc.content_type.clone()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", doc.title),
            ),
        ],
        doc.bytes.clone(),
    )
        .into_response()
}

fn router(state: Shared) -> Router {
    Router::new()
        .route("/users/login", post(login))
        .route("/users/register", post(register))
        .route("/documents/getDocuments", get(list_documents))
        .route("/documents/getDocument/{id}", get(get_document))
        .route("/documents/addDocument/", post(add_document))
        .route("/documents/replaceDocument/{id}", put(replace_document))
        .route("/documents/deleteDocument/{id}", delete(delete_document))
        .route("/documents/signDocument/{id}/", post(sign_document))
        .route("/documents/rejectDocument/{id}/", post(reject_document))
        .route("/documents/getUsers/{id}", get(list_users))
        .route("/documents/addUser/{id}", post(add_user))
        .route("/documents/{id}/download/", get(download))
        .with_state(state)
}

async fn spawn() -> (Shared, DocflowClient) {
    let state: Shared = Arc::default();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = DocflowClient::with_config(ClientConfig {
        base_url: format!("http://{addr}"),
        max_retries: Some(2),
        retry_base_delay: Duration::from_millis(5),
        ..ClientConfig::default()
    })
    .unwrap();
    (state, client)
}

async fn upload(client: &DocflowClient, name: &str, body: &[u8]) -> DocumentId {
    client
        .add_document(
            TOKEN,
            &FileUpload::new(name, body.to_vec()).with_content_type("text/plain"),
        )
        .await
        .unwrap();
    client
        .list_documents(TOKEN)
        .await
        .unwrap()
        .into_iter()
        .rfind(|d| d.original_filename == name)
        .unwrap()
        .id
}

// ── Auth ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn login_returns_token_or_error_code() {
    let (_state, client) = spawn().await;

    assert_eq!(client.login("alice", "secret").await.unwrap(), TOKEN);
    assert_eq!(
        client.login("alice", "wrong").await.unwrap_err(),
        ServiceError::Domain {
            code: "incorrect_password".to_owned()
        }
    );
    assert_eq!(
        client.login("nobody", "x").await.unwrap_err(),
        ServiceError::Domain {
            code: "user_not_found".to_owned()
        }
    );
}

#[tokio::test]
async fn register_maps_error_code() {
    let (_state, client) = spawn().await;
    let taken = docflow_core::Registration {
        username: "alice".to_owned(),
        password: "pw".to_owned(),
        email: "alice@example.com".to_owned(),
    };
    assert_eq!(
        client.register(&taken).await.unwrap_err(),
        ServiceError::Domain {
            code: "username_exists".to_owned()
        }
    );

    let fresh = docflow_core::Registration {
        username: "bob".to_owned(),
        ..taken
    };
    assert_eq!(client.register(&fresh).await.unwrap(), "tok-new");
}

#[tokio::test]
async fn bad_token_is_unauthenticated() {
    let (_state, client) = spawn().await;
    let err = client.list_documents("stale").await.unwrap_err();
    assert_eq!(err, ServiceError::Unauthenticated);
}

// ── Documents ────────────────────────────────────────────────────────

#[tokio::test]
async fn null_document_list_reads_as_empty() {
    let (state, client) = spawn().await;
    upload(&client, "a.txt", b"x").await;
    state.lock().unwrap().null_documents = true;

    assert!(client.list_documents(TOKEN).await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_document_is_absent_not_an_error() {
    let (_state, client) = spawn().await;
    let id = DocumentId::from("999");
    assert_eq!(client.get_document(TOKEN, &id).await.unwrap(), None);
    assert_eq!(client.download_document(TOKEN, &id).await.unwrap(), None);

    let err = client.delete_document(TOKEN, &id).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(matches!(err, ServiceError::Http { ref message, .. } if message == "Document not found"));
}

#[tokio::test]
async fn upload_sends_title_and_numeric_ids_are_normalized() {
    let (_state, client) = spawn().await;
    let id = upload(&client, "contract.txt", b"hello").await;
    assert_eq!(id.as_str(), "1");

    let doc = client.get_document(TOKEN, &id).await.unwrap().unwrap();
    assert_eq!(doc.original_filename, "contract.txt");
    assert_eq!(doc.size, Some(5));
    assert!(!doc.is_signed);
}

#[tokio::test]
async fn download_reads_headers() {
    let (_state, client) = spawn().await;
    let id = upload(&client, "notes.txt", b"line one").await;

    let file = client.download_document(TOKEN, &id).await.unwrap().unwrap();
    assert_eq!(file.filename.as_deref(), Some("notes.txt"));
    assert_eq!(file.content_type.as_deref(), Some("text/plain"));
    assert_eq!(file.bytes, b"line one".to_vec());
}

#[tokio::test]
async fn replace_substitutes_content() {
    let (_state, client) = spawn().await;
    let id = upload(&client, "a.txt", b"v1").await;
    client
        .replace_document(TOKEN, &id, &FileUpload::new("a.txt", b"version two".to_vec()))
        .await
        .unwrap();

    let file = client.download_document(TOKEN, &id).await.unwrap().unwrap();
    assert_eq!(file.bytes, b"version two".to_vec());
}

#[tokio::test]
async fn reject_sends_reason() {
    let (_state, client) = spawn().await;
    let id = upload(&client, "a.txt", b"x").await;
    client.reject_document(TOKEN, &id, "wrong totals").await.unwrap();

    let doc = client.get_document(TOKEN, &id).await.unwrap().unwrap();
    assert_eq!(doc.rejected_reason.as_deref(), Some("wrong totals"));
}

// ── Retries ──────────────────────────────────────────────────────────

#[tokio::test]
async fn reads_retry_transient_failures() {
    let (state, client) = spawn().await;
    state.lock().unwrap().fail_lists = 2;

    assert!(client.list_documents(TOKEN).await.unwrap().is_empty());
    assert_eq!(state.lock().unwrap().list_calls, 3);
}

#[tokio::test]
async fn reads_give_up_after_max_retries() {
    let (state, client) = spawn().await;
    state.lock().unwrap().fail_lists = 10;

    let err = client.list_documents(TOKEN).await.unwrap_err();
    assert_eq!(err.status(), Some(503));
    assert_eq!(state.lock().unwrap().list_calls, 3);
}

#[tokio::test]
async fn mutations_are_sent_once() {
    let (state, client) = spawn().await;
    let id = upload(&client, "a.txt", b"x").await;
    state.lock().unwrap().fail_signs = true;

    let err = client.sign_document(TOKEN, &id, "ok").await.unwrap_err();
    assert_eq!(err.status(), Some(503));
    assert_eq!(state.lock().unwrap().sign_calls, 1);
}

// ── Swallow-and-flag ─────────────────────────────────────────────────

#[tokio::test]
async fn lenient_calls_never_fail_on_unreachable_server() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = DocflowClient::with_config(ClientConfig {
        base_url: format!("http://{addr}"),
        max_retries: Some(0),
        ..ClientConfig::default()
    })
    .unwrap();
    let id = DocumentId::from("1");

    assert!(client.list_documents_or_empty(TOKEN).await.is_empty());
    assert_eq!(client.get_document_or_none(TOKEN, &id).await, None);
    assert!(client.list_file_users_or_empty(TOKEN, &id).await.is_empty());
    assert!(!client.add_document_ok(TOKEN, &FileUpload::new("a", vec![1])).await);
    assert!(!client.sign_document_ok(TOKEN, &id).await);
    assert!(!client.delete_document_ok(TOKEN, &id).await);
    assert!(!client.add_file_user_ok(TOKEN, &id, "b@example.com").await);

    let err = client.list_documents(TOKEN).await.unwrap_err();
    assert!(err.is_transport());
}

// ── Controllers over HTTP ────────────────────────────────────────────

#[tokio::test]
async fn document_lifecycle_through_controllers() {
    let (state, client) = spawn().await;
    let client = Arc::new(client);
    let session = Session::in_memory();

    let auth = AuthFlow::new(client.clone(), session.clone());
    assert_eq!(
        auth.login("alice", "secret").await.unwrap(),
        Navigate::DocumentList
    );

    let list = DocumentListController::new(client.clone(), session.clone());
    list.upload(&FileUpload::new("memo.txt", b"please sign".to_vec()).with_content_type("text/plain"))
        .await
        .unwrap();
    let row = list.rows().await.remove(0);
    assert_eq!(row.actions, vec![RowAction::Send]);
    let id = row.document.id;

    list.send(&id, "bob@example.com").await.unwrap();
    let row = list.rows().await.remove(0);
    assert!(!row.document.is_signed);
    assert_eq!(
        row.status,
        RowStatus::PendingSignature {
            recipient: Some("bob@example.com".to_owned())
        }
    );
    assert_eq!(row.actions, vec![RowAction::Sign, RowAction::Reject]);
    assert!(state.lock().unwrap().users_calls >= 1);

    list.sign(&id).await.unwrap();
    assert_eq!(list.rows().await[0].status, RowStatus::Signed);
    assert_eq!(
        state.lock().unwrap().sign_comments,
        vec![docflow_core::service::DEFAULT_SIGN_COMMENT.to_owned()]
    );

    let detail = DocumentDetailController::new(client.clone(), session.clone());
    let loaded = detail.load(&id).await.unwrap();
    assert_eq!(loaded.users.len(), 1);
    assert_eq!(loaded.users[0].email, "bob@example.com");
    assert_eq!(
        detail.view().await.unwrap(),
        Preview::Text("please sign".to_owned())
    );

    let next = detail.delete(&|_: &str| true).await.unwrap();
    assert_eq!(next, Some(Navigate::DocumentList));
    list.load().await.unwrap();
    assert!(list.documents().await.is_empty());

    let err = detail.load(&id).await.unwrap_err();
    assert!(matches!(err, ActionError::NotFound { .. }));
}
