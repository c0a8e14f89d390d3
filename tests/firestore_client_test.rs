//! Integration tests for the Firestore REST client
//! Runs the client against a small fake of the Firestore v1 API served by axum

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde_json::{json, Value};

use bookshelf::config::Config;
use bookshelf::store::{DocumentStore, FirestoreStore, WriteMode};
use bookshelf::{Error, Record};

const ROOT: &str = "projects/gdgoc-backend-6ba98/databases/(default)/documents";

#[derive(Default)]
struct FakeFirestore {
    /// (collection, id) -> encoded fields
    docs: BTreeMap<(String, String), Value>,
    commits: Vec<Value>,
    list_tokens: Vec<Option<String>>,
    auth_headers: Vec<String>,
    fail_after_first_page: bool,
    fail_commit: bool,
}

type Shared = Arc<Mutex<FakeFirestore>>;

fn google_error(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({"error": {"code": status.as_u16(), "message": message}})),
    )
        .into_response()
}

fn record_auth(fake: &mut FakeFirestore, headers: &HeaderMap) {
    if let Some(value) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        fake.auth_headers.push(value.to_string());
    }
}

async fn list_documents(
    State(fake): State<Shared>,
    Path((_project, _database, collection)): Path<(String, String, String)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let mut fake = fake.lock().unwrap();
    record_auth(&mut fake, &headers);

    let page_token = query.get("pageToken").cloned();
    fake.list_tokens.push(page_token.clone());

    let start: usize = page_token.as_deref().map(|t| t.parse().unwrap()).unwrap_or(0);
    if start > 0 && fake.fail_after_first_page {
        return google_error(StatusCode::SERVICE_UNAVAILABLE, "The service is currently unavailable.");
    }
    let page_size: usize = query["pageSize"].parse().unwrap();

    let in_collection: Vec<(&String, &Value)> = fake
        .docs
        .iter()
        .filter(|((c, _), _)| *c == collection)
        .map(|((_, id), fields)| (id, fields))
        .collect();

    let documents: Vec<Value> = in_collection
        .iter()
        .skip(start)
        .take(page_size)
        .map(|(id, fields)| json!({"name": format!("{}/{}/{}", ROOT, collection, id), "fields": fields}))
        .collect();

    let mut body = serde_json::Map::new();
    if !documents.is_empty() {
        body.insert("documents".into(), Value::Array(documents));
    }
    if start + page_size < in_collection.len() {
        body.insert("nextPageToken".into(), Value::from((start + page_size).to_string()));
    }
    Json(Value::Object(body)).into_response()
}

async fn get_document(
    State(fake): State<Shared>,
    Path((_project, _database, collection, id)): Path<(String, String, String, String)>,
    headers: HeaderMap,
) -> Response {
    let mut fake = fake.lock().unwrap();
    record_auth(&mut fake, &headers);

    match fake.docs.get(&(collection.clone(), id.clone())) {
        Some(fields) => Json(json!({
            "name": format!("{}/{}/{}", ROOT, collection, id),
            "fields": fields,
        }))
        .into_response(),
        None => google_error(StatusCode::NOT_FOUND, "Document not found."),
    }
}

fn split_name(name: &str) -> (String, String) {
    let path = name.split("/documents/").nth(1).unwrap();
    let (collection, id) = path.split_once('/').unwrap();
    (collection.to_string(), id.to_string())
}

async fn commit(State(fake): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    let mut fake = fake.lock().unwrap();
    record_auth(&mut fake, &headers);
    fake.commits.push(body.clone());

    if fake.fail_commit {
        return google_error(StatusCode::FORBIDDEN, "Missing or insufficient permissions.");
    }

    for write in body["writes"].as_array().unwrap() {
        if let Some(name) = write["delete"].as_str() {
            fake.docs.remove(&split_name(name));
            continue;
        }

        let update = &write["update"];
        let key = split_name(update["name"].as_str().unwrap());
        let fields = update["fields"].clone();

        match write.get("updateMask") {
            // Top-level only: enough for the fields these tests merge
            Some(_) => {
                let existing = fake.docs.entry(key).or_insert_with(|| json!({}));
                for (k, v) in fields.as_object().unwrap() {
                    existing[k] = v.clone();
                }
            }
            None => {
                fake.docs.insert(key, fields);
            }
        }
    }

    Json(json!({"writeResults": [{}], "commitTime": "2024-10-25T13:36:09Z"})).into_response()
}

async fn spawn_fake(fake: Shared) -> SocketAddr {
    let app = Router::new()
        .route(
            "/v1/projects/{project}/databases/{database}/documents/{collection}",
            get(list_documents),
        )
        .route(
            "/v1/projects/{project}/databases/{database}/documents/{collection}/{id}",
            get(get_document),
        )
        .route(
            "/v1/projects/{project}/databases/{database}/documents:commit",
            post(commit),
        )
        .with_state(fake);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

struct FirestoreTestFixture {
    fake: Shared,
    store: FirestoreStore,
    config: Config,
}

impl FirestoreTestFixture {
    async fn new() -> Self {
        let fake: Shared = Arc::default();
        let addr = spawn_fake(fake.clone()).await;

        let mut config = Config::default();
        config.firestore.emulator_host = Some(addr.to_string());
        config.firestore.page_size = 2;

        let store = FirestoreStore::new(&config).expect("Failed to create Firestore client");
        Self { fake, store, config }
    }

    fn seed(&self, collection: &str, id: &str, fields: Value) {
        let mut fake = self.fake.lock().unwrap();
        fake.docs.insert((collection.to_string(), id.to_string()), fields);
    }

    fn last_commit(&self) -> Value {
        self.fake.lock().unwrap().commits.last().cloned().expect("no commit received")
    }
}

fn record(value: Value) -> Record {
    value.as_object().cloned().unwrap()
}

mod list_tests {
    use super::*;

    #[tokio::test]
    async fn test_list_follows_pages() {
        let fixture = FirestoreTestFixture::new().await;
        for i in 1..=5 {
            fixture.seed("gdgoc", &i.to_string(), json!({"n": {"integerValue": i.to_string()}}));
        }
        fixture.seed("items", "9", json!({"n": {"integerValue": "9"}}));

        let docs: Vec<Record> = fixture
            .store
            .list("gdgoc")
            .map(|d| d.unwrap())
            .collect()
            .await;

        let ns: Vec<i64> = docs.iter().map(|d| d["n"].as_i64().unwrap()).collect();
        assert_eq!(ns, vec![1, 2, 3, 4, 5]);

        let fake = fixture.fake.lock().unwrap();
        assert_eq!(
            fake.list_tokens,
            vec![None, Some("2".to_string()), Some("4".to_string())]
        );
        assert!(fake.auth_headers.iter().all(|h| h == "Bearer owner"));
    }

    #[tokio::test]
    async fn test_list_empty_collection() {
        let fixture = FirestoreTestFixture::new().await;
        let docs: Vec<_> = fixture.store.list("gdgoc").collect().await;
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn test_list_reports_fault_then_ends() {
        let fixture = FirestoreTestFixture::new().await;
        for i in 1..=4 {
            fixture.seed("gdgoc", &i.to_string(), json!({"n": {"integerValue": i.to_string()}}));
        }
        fixture.fake.lock().unwrap().fail_after_first_page = true;

        let items: Vec<_> = fixture.store.list("gdgoc").collect().await;

        assert_eq!(items.len(), 3);
        assert!(items[0].is_ok());
        assert!(items[1].is_ok());
        match &items[2] {
            Err(Error::Store(message)) => assert!(message.contains("currently unavailable")),
            other => panic!("expected store error, got {:?}", other),
        }
    }
}

mod document_tests {
    use super::*;

    #[tokio::test]
    async fn test_get_decodes_fields() {
        let fixture = FirestoreTestFixture::new().await;
        fixture.seed(
            "gdgoc",
            "2",
            json!({
                "title": {"stringValue": "Dune"},
                "id": {"integerValue": "2"},
                "rating": {"doubleValue": 4.5}
            }),
        );

        let doc = fixture.store.get("gdgoc", "2").await.unwrap();
        assert_eq!(Value::Object(doc), json!({"title": "Dune", "id": 2, "rating": 4.5}));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let fixture = FirestoreTestFixture::new().await;
        let err = fixture.store.get("gdgoc", "2").await.unwrap_err();
        assert!(matches!(err, Error::DocumentNotFound(_)));
    }

    #[tokio::test]
    async fn test_overwrite_sends_no_mask() {
        let fixture = FirestoreTestFixture::new().await;

        fixture
            .store
            .set("gdgoc", "2", record(json!({"title": "A", "id": 2})), WriteMode::Overwrite)
            .await
            .unwrap();

        let commit = fixture.last_commit();
        let write = &commit["writes"][0];
        assert_eq!(write["update"]["name"], format!("{}/gdgoc/2", ROOT));
        assert_eq!(write["update"]["fields"]["id"], json!({"integerValue": "2"}));
        assert!(write.get("updateMask").is_none());

        let doc = fixture.store.get("gdgoc", "2").await.unwrap();
        assert_eq!(Value::Object(doc), json!({"title": "A", "id": 2}));
    }

    #[tokio::test]
    async fn test_merge_sends_field_mask() {
        let fixture = FirestoreTestFixture::new().await;
        fixture.seed(
            "gdgoc",
            "2",
            json!({"title": {"stringValue": "A"}, "author": {"stringValue": "B"}}),
        );

        fixture
            .store
            .set("gdgoc", "2", record(json!({"title": "X"})), WriteMode::Merge)
            .await
            .unwrap();

        let commit = fixture.last_commit();
        assert_eq!(commit["writes"][0]["updateMask"], json!({"fieldPaths": ["title"]}));

        let doc = fixture.store.get("gdgoc", "2").await.unwrap();
        assert_eq!(Value::Object(doc), json!({"title": "X", "author": "B"}));
    }

    #[tokio::test]
    async fn test_delete_write() {
        let fixture = FirestoreTestFixture::new().await;
        fixture.seed("items", "2", json!({}));

        fixture.store.delete("items", "2").await.unwrap();

        let commit = fixture.last_commit();
        assert_eq!(commit, json!({"writes": [{"delete": format!("{}/items/2", ROOT)}]}));
        assert!(fixture.fake.lock().unwrap().docs.is_empty());
    }

    #[tokio::test]
    async fn test_commit_error_message() {
        let fixture = FirestoreTestFixture::new().await;
        fixture.fake.lock().unwrap().fail_commit = true;

        let err = fixture
            .store
            .set("gdgoc", "2", record(json!({"title": "A"})), WriteMode::Overwrite)
            .await
            .unwrap_err();

        match err {
            Error::Store(message) => {
                assert!(message.contains("403"));
                assert!(message.contains("Missing or insufficient permissions."));
            }
            other => panic!("expected store error, got {:?}", other),
        }
    }
}

mod api_tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use bookshelf::api::{create_router, AppState};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn call(router: &Router, method: Method, uri: &str, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_book_lifecycle_through_firestore() {
        let fixture = FirestoreTestFixture::new().await;
        let store = Arc::new(FirestoreStore::new(&fixture.config).unwrap());
        let router = create_router(AppState::new(store, fixture.config.books.clone()));

        let (status, _) = call(
            &router,
            Method::POST,
            "/api/books",
            r#"{"title":"A","author":"B","published_at":"2024-01-01"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = call(&router, Method::PUT, "/api/books/2", r#"{"title":"X"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["title"], "X");
        assert_eq!(body["data"]["author"], "B");
        assert_eq!(body["data"]["id"], 2);

        let (status, _) = call(&router, Method::DELETE, "/api/books/2", "").await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(&router, Method::GET, "/api/books", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
        assert_eq!(body["data"][0]["title"], "X");
    }
}
