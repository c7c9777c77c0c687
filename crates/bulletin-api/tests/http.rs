/// Drives the router end to end with in-memory storage.
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use bulletin_api::coordinator::Coordinator;
use bulletin_api::routes::router;
use bulletin_api::state::AppStateInner;
use bulletin_db::Database;
use bulletin_notify::NotificationDispatcher;
use bulletin_notify::retry::RetryPolicy;
use bulletin_notify::testing::{Outcome, ScriptedProvider};

fn app(provider: &Arc<ScriptedProvider>) -> Router {
    let db = Database::open_in_memory().unwrap();
    let dispatcher = NotificationDispatcher::new(
        provider.clone(),
        RetryPolicy {
            max_retries: 0,
            ..RetryPolicy::default()
        },
        Duration::from_secs(600),
    );
    router(Arc::new(AppStateInner {
        coordinator: Coordinator::new(Arc::new(db), dispatcher, "all"),
    }))
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let resp = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, value)
}

async fn create_article(app: &Router, title: &str) -> i64 {
    let (status, body) = call(
        app,
        Method::POST,
        "/articles",
        Some(json!({ "title": title, "text": "body", "image": "3q0=", "group_id": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["article"]["id"].as_i64().unwrap()
}

#[tokio::test]
async fn root_reports_running() {
    let app = app(&Arc::new(ScriptedProvider::new()));
    let (status, body) = call(&app, Method::GET, "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("API is running.".into()));
}

#[tokio::test]
async fn article_creation_reports_notification_outcome() {
    let provider = Arc::new(ScriptedProvider::new());
    let app = app(&provider);

    let (status, body) = call(
        &app,
        Method::POST,
        "/articles",
        Some(json!({ "title": "Launch", "text": "We shipped", "image": "3q0=", "group_id": 2 })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["article"]["title"], "Launch");
    assert_eq!(body["article"]["image"], "3q0=");
    assert_eq!(body["notification"], json!({ "status": "delivered", "message_id": "msg-1" }));
    assert_eq!(provider.delivered()[0].body, "Article 'Launch' was added.");

    let (_, grouped) = call(&app, Method::GET, "/companies/2/articles", None).await;
    assert_eq!(grouped.as_array().unwrap().len(), 1);
    let (_, other) = call(&app, Method::GET, "/companies/3/articles", None).await;
    assert!(other.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn failed_announcement_still_creates_article() {
    let provider = Arc::new(ScriptedProvider::new().with_outcomes([Outcome::Refused(400)]));
    let app = app(&provider);

    let (status, body) = call(&app, Method::POST, "/articles", Some(json!({ "title": "A", "text": "" }))).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["notification"]["status"], "failed");
    let (_, all) = call(&app, Method::GET, "/articles", None).await;
    assert_eq!(all.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn invalid_article_payloads_are_rejected() {
    let app = app(&Arc::new(ScriptedProvider::new()));

    let (status, body) = call(&app, Method::POST, "/articles", Some(json!({ "title": " ", "text": "x" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");

    let (status, _) = call(
        &app,
        Method::POST,
        "/articles",
        Some(json!({ "title": "t", "text": "x", "image": "not base64!" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn companies_are_listed_and_fetched() {
    let app = app(&Arc::new(ScriptedProvider::new()));

    let (status, body) = call(&app, Method::GET, "/companies", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());

    let (status, acme) = call(&app, Method::POST, "/companies", Some(json!({ "title": "Acme", "image": "3q0=" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    let (_, globex) = call(&app, Method::POST, "/companies", Some(json!({ "title": "Globex" }))).await;

    let (_, listed) = call(&app, Method::GET, "/companies", None).await;
    let titles: Vec<_> = listed.as_array().unwrap().iter().map(|c| c["title"].clone()).collect();
    assert_eq!(titles, vec![json!("Acme"), json!("Globex")]);

    let (status, fetched) = call(&app, Method::GET, &format!("/companies/{}", acme["id"]), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["image"], "3q0=");
    assert_eq!(globex["image"], Value::Null);

    let (status, body) = call(&app, Method::GET, "/companies/999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");

    let (status, _) = call(&app, Method::POST, "/companies", Some(json!({ "title": "" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn company_articles_are_filtered_by_company_id() {
    let app = app(&Arc::new(ScriptedProvider::new()));
    let (_, acme) = call(&app, Method::POST, "/companies", Some(json!({ "title": "Acme" }))).await;
    let acme = acme["id"].as_i64().unwrap();

    call(&app, Method::POST, "/articles", Some(json!({ "title": "Ours", "text": "", "group_id": acme }))).await;
    call(&app, Method::POST, "/articles", Some(json!({ "title": "Loose", "text": "" }))).await;

    let (status, articles) = call(&app, Method::GET, &format!("/companies/{acme}/articles"), None).await;
    assert_eq!(status, StatusCode::OK);
    let articles = articles.as_array().unwrap();
    assert_eq!(articles.len(), 1);
    assert_eq!(articles[0]["title"], "Ours");
}

#[tokio::test]
async fn comment_lifecycle() {
    let provider = Arc::new(ScriptedProvider::new());
    let app = app(&provider);
    let article = create_article(&app, "Thread").await;
    let comments_uri = format!("/articles/{article}/comments");

    let (status, _) = call(&app, Method::GET, &comments_uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, root) = call(
        &app,
        Method::POST,
        &comments_uri,
        Some(json!({ "author": "alice", "body": "first" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(root["notification"]["status"], "not_requested");
    let root_id = root["comment"]["id"].as_i64().unwrap();

    let (status, reply) = call(
        &app,
        Method::POST,
        &comments_uri,
        Some(json!({ "parent_id": root_id, "author": "bob", "body": "second" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(reply["notification"]["status"], "queued");
    assert_eq!(reply["comment"]["parent_id"], root_id);

    let (_, listed) = call(&app, Method::GET, &comments_uri, None).await;
    let authors: Vec<_> = listed.as_array().unwrap().iter().map(|c| c["author"].clone()).collect();
    assert_eq!(authors, vec![json!("bob"), json!("alice")]);

    let (status, deleted) = call(&app, Method::DELETE, &format!("/comments/{root_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted, json!({ "deleted": 2 }));

    let (status, body) = call(&app, Method::GET, &format!("/comments/{root_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn reply_to_foreign_parent_is_unprocessable() {
    let app = app(&Arc::new(ScriptedProvider::new()));
    let first = create_article(&app, "one").await;
    let second = create_article(&app, "two").await;

    let (_, root) = call(
        &app,
        Method::POST,
        &format!("/articles/{first}/comments"),
        Some(json!({ "author": "alice", "body": "hi" })),
    )
    .await;
    let root_id = root["comment"]["id"].as_i64().unwrap();

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/articles/{second}/comments"),
        Some(json!({ "parent_id": root_id, "author": "bob", "body": "yo" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "invalid_parent");

    let (status, _) = call(
        &app,
        Method::POST,
        "/articles/999/comments",
        Some(json!({ "author": "bob", "body": "yo" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_notification_endpoint_reports_status() {
    let provider = Arc::new(ScriptedProvider::new().with_outcomes([Outcome::Refused(403)]));
    let app = app(&provider);

    let (status, body) = call(&app, Method::POST, "/notifications/test", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "failed");

    let (_, body) = call(&app, Method::POST, "/notifications/test", None).await;
    assert_eq!(body["status"], "delivered");
}
