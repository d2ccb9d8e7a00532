use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header::CONTENT_TYPE},
};
use hanzi_server::{app, config::Config, state::State};
use serde_json::{Value, json};
use tower::ServiceExt;

fn test_app() -> Router {
    let config = Config::from_lookup(
        |key| match key {
            "STORE_BACKEND" => Some("memory".into()),
            "SYNC_ON_STARTUP" | "SYNC_SCHEDULE_ENABLED" => Some("false".into()),
            _ => None,
        },
        |_| None,
    )
    .unwrap();

    app(State::in_memory(config))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();

    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };

    (status, value)
}

async fn create(app: &Router, uri: &str, body: Value) -> Value {
    let (status, created) = send(app, Method::POST, uri, Some(body)).await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    created
}

fn hits(value: &Value) -> usize {
    value.as_array().map_or(0, Vec::len)
}

#[tokio::test]
async fn test_vocabulary_lifecycle_reaches_search() {
    let app = test_app();

    let created = create(
        &app,
        "/vocabularies",
        json!({ "hanzi": "你好", "pinyin": "nǐ hǎo", "meaning": "hello", "variant": "BOTH", "hskLevel": 1 }),
    )
    .await;
    let id = created["id"].as_i64().unwrap();
    assert!(id > 0);
    assert!(created["createdAt"].is_string());

    let (status, fetched) = send(&app, Method::GET, &format!("/vocabularies/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["hanzi"], "你好");

    let (_, found) = send(&app, Method::GET, "/search/vocabularies?q=hello", None).await;
    assert_eq!(hits(&found), 1);
    assert_eq!(found[0]["id"], id);

    let (status, updated) = send(
        &app,
        Method::PUT,
        &format!("/vocabularies/{id}"),
        Some(json!({ "hanzi": "你好", "pinyin": "nǐ hǎo", "meaning": "hi there", "variant": "BOTH" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["meaning"], "hi there");
    assert_eq!(updated["createdAt"], created["createdAt"]);

    let (_, found) = send(&app, Method::GET, "/search/vocabularies?q=there", None).await;
    assert_eq!(hits(&found), 1);

    let (status, _) = send(&app, Method::DELETE, &format!("/vocabularies/{id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, Method::GET, &format!("/vocabularies/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, found) = send(&app, Method::GET, "/search/vocabularies?q=hello", None).await;
    assert_eq!(hits(&found), 0);
}

#[tokio::test]
async fn test_vocabulary_page_and_filters() {
    let app = test_app();

    for (hanzi, variant, level) in [("书", "SIMPLIFIED", 1), ("書", "TRADITIONAL", 1), ("好", "BOTH", 2)] {
        create(
            &app,
            "/vocabularies",
            json!({ "hanzi": hanzi, "pinyin": "x", "meaning": "word", "variant": variant, "hskLevel": level }),
        )
        .await;
    }

    let (status, page) = send(&app, Method::GET, "/vocabularies/page?page=0&size=2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["totalElements"], 3);
    assert_eq!(page["totalPages"], 2);
    assert_eq!(hits(&page["content"]), 2);

    let (_, simplified) = send(
        &app,
        Method::GET,
        "/vocabularies/page?variant=simplified",
        None,
    )
    .await;
    assert_eq!(simplified["totalElements"], 2);

    let (_, level_one) = send(&app, Method::GET, "/vocabularies/hsk/1", None).await;
    assert_eq!(hits(&level_one), 2);

    let (_, traditional) = send(
        &app,
        Method::GET,
        "/search/vocabularies?q=word&variant=TRADITIONAL&limit=10",
        None,
    )
    .await;
    assert_eq!(hits(&traditional), 2);

    let (status, _) = send(&app, Method::GET, "/vocabularies/page?size=0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_invalid_requests() {
    let app = test_app();

    let (status, _) = send(
        &app,
        Method::POST,
        "/vocabularies",
        Some(json!({ "hanzi": " ", "pinyin": "x", "meaning": "y", "variant": "BOTH" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::POST, "/vocabularies", Some(json!({ "hanzi": "好" }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(&app, Method::GET, "/search/users?q=x", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::GET, "/search/courses?variant=cantonese", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::GET, "/search/courses?limit=0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::GET, "/textbooks/version/ANCIENT", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::GET, "/grammar-topics/404", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let huge_page = format!("/vocabularies/page?page={}&size=20", usize::MAX / 2);
    let (status, _) = send(&app, Method::GET, &huge_page, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_textbook_courses_and_cascade() {
    let app = test_app();

    let textbook = create(
        &app,
        "/textbooks",
        json!({ "name": "HSK Standard Course 1", "version": "NEW", "publicationYear": 2014 }),
    )
    .await;
    let textbook_id = textbook["id"].as_i64().unwrap();

    let course = json!({
        "textbookId": textbook_id,
        "level": "L1",
        "title": "First steps",
        "difficulty": "BEGINNER"
    });
    let created = create(&app, "/courses", course.clone()).await;
    let course_id = created["id"].as_i64().unwrap();
    assert_eq!(created["textbookName"], "HSK Standard Course 1");

    let (status, _) = send(&app, Method::POST, "/courses", Some(course)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        Method::POST,
        "/courses",
        Some(json!({ "textbookId": 999, "level": "L1", "title": "Orphan", "difficulty": "BEGINNER" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, owned) = send(&app, Method::GET, &format!("/courses/textbook/{textbook_id}"), None).await;
    assert_eq!(hits(&owned), 1);

    let (_, by_version) = send(&app, Method::GET, "/textbooks/version/new", None).await;
    assert_eq!(hits(&by_version), 1);
    let (_, by_year) = send(&app, Method::GET, "/textbooks/year/2014", None).await;
    assert_eq!(hits(&by_year), 1);

    let (_, found) = send(&app, Method::GET, "/search/courses?q=HSK", None).await;
    assert_eq!(hits(&found), 1);

    let (status, _) = send(&app, Method::DELETE, &format!("/textbooks/{textbook_id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, Method::GET, &format!("/courses/{course_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, found) = send(&app, Method::GET, "/search/courses?q=HSK", None).await;
    assert_eq!(hits(&found), 0);
}

#[tokio::test]
async fn test_grammar_and_radical_lookups() {
    let app = test_app();

    create(
        &app,
        "/grammar-topics",
        json!({
            "title": "把 construction",
            "structure": "S + 把 + O + V",
            "explanation": "Moves the object before the verb",
            "tags": ["hsk3", "word-order"]
        }),
    )
    .await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/grammar-topics",
        Some(json!({ "title": "把 CONSTRUCTION", "structure": "x", "explanation": "y" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, tagged) = send(&app, Method::GET, "/grammar-topics/tag/hsk3", None).await;
    assert_eq!(hits(&tagged), 1);

    let (_, found) = send(&app, Method::GET, "/search/grammar-topics?q=object", None).await;
    assert_eq!(hits(&found), 1);

    create(&app, "/radicals", json!({ "hanzi": "口", "strokes": 3, "meaning": "mouth" })).await;
    create(&app, "/radicals", json!({ "hanzi": "女", "strokes": 3, "meaning": "woman" })).await;

    let (status, mouth) = send(&app, Method::GET, "/radicals/hanzi/%E5%8F%A3", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mouth["meaning"], "mouth");

    let (_, three) = send(&app, Method::GET, "/radicals/strokes/3", None).await;
    assert_eq!(hits(&three), 2);

    let (status, _) = send(&app, Method::GET, "/radicals/hanzi/%E6%9C%A8", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_cache_and_sync() {
    let app = test_app();

    create(
        &app,
        "/vocabularies",
        json!({ "hanzi": "水", "pinyin": "shuǐ", "meaning": "water", "variant": "BOTH" }),
    )
    .await;

    let (status, warmed) = send(&app, Method::POST, "/admin/cache/warmup", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(warmed["warmed"], 5);

    let (_, stats) = send(&app, Method::GET, "/admin/cache/stats", None).await;
    assert_eq!(stats["connected"], true);
    assert_eq!(stats["totalKeys"], 5);
    assert_eq!(stats["namespaces"]["vocabularies"], 1);

    let (status, cleared) = send(&app, Method::DELETE, "/admin/cache/radicals", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cleared["removed"], 1);

    let (status, _) = send(&app, Method::DELETE, "/admin/cache/bogus", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, cleared) = send(&app, Method::DELETE, "/admin/cache/all", None).await;
    assert_eq!(cleared["removed"], 4);

    let (status, reports) = send(&app, Method::POST, "/admin/sync/all", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(hits(&reports), 3);

    let (status, report) = send(&app, Method::POST, "/admin/sync/vocabularies", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["index"], "vocabularies");
    assert_eq!(report["indexed"], 1);

    let (status, _) = send(&app, Method::POST, "/admin/sync/radicals", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_state_is_shared_across_requests() {
    let config = Config::from_lookup(|_| None, |_| None).unwrap();
    let state = State::in_memory(config);
    let app = app(state.clone());

    create(&app, "/radicals", json!({ "hanzi": "木", "strokes": 4 })).await;

    assert_eq!(state.services.radicals.list_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_admin_single_record_sync() {
    let app = test_app();

    let created = create(
        &app,
        "/vocabularies",
        json!({ "hanzi": "火", "pinyin": "huǒ", "meaning": "fire", "variant": "BOTH" }),
    )
    .await;
    let id = created["id"].as_i64().unwrap();

    let (status, synced) = send(&app, Method::POST, &format!("/admin/sync/vocabularies/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(synced["index"], "vocabularies");
    assert_eq!(synced["id"], id);

    let (status, _) = send(&app, Method::POST, "/admin/sync/courses/999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::POST, "/admin/sync/radicals/1", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
