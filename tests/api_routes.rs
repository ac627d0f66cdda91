mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use carlot_rust::{backend::EntityKind, build_app};
use common::{seed_vehicle, test_app, token_for, user, TestApp, BUYER, SELLER};
use serde_json::{json, Value};
use tower::ServiceExt;

async fn call(app: &TestApp, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let router: Router = build_app(app.state.clone());
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

async fn seeded_app() -> TestApp {
    let app = test_app();
    seed_vehicle(&app.data, "v1", SELLER, 18500.0).await;
    seed_vehicle(&app.data, "v2", SELLER, 25000.0).await;
    seed_vehicle(&app.data, "v3", SELLER, 15000.0).await;
    app.data
        .seed(
            EntityKind::Vehicle,
            json!({ "id": "sold", "make": "Honda", "model": "Civic", "price": 9000, "status": "sold" }),
        )
        .await;
    app
}

#[tokio::test]
async fn protected_routes_answer_401_with_a_login_url() {
    let app = test_app();

    let (status, body) = call(&app, Method::POST, "/api/drafts", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["login_url"]
        .as_str()
        .unwrap()
        .starts_with("https://login.test/login?from_url="));

    let (status, _) = call(&app, Method::GET, "/api/saved", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn anonymous_search_filters_sorts_and_pages() {
    let app = seeded_app().await;

    let request = json!({
        "state": { "filters": { "maxPrice": "20000" }, "sort": "price" },
        "page": 1,
        "page_size": 1
    });
    let (status, body) = call(&app, Method::POST, "/api/marketplace/search", None, Some(request)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["has_more"], true);
    assert_eq!(body["items"][0]["id"], "v3");

    let (status, body) = call(&app, Method::POST, "/api/marketplace/search", None, Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);

    let bad = json!({ "state": { "filters": { "max_price": 500 } } });
    let (status, _) = call(&app, Method::POST, "/api/marketplace/search", None, Some(bad)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn signed_in_search_state_is_remembered() {
    let app = seeded_app().await;
    let token = token_for(BUYER);

    let state = json!({ "filters": { "make": "honda" }, "sort": "-price" });
    let (status, _) = call(&app, Method::PUT, "/api/marketplace/state", Some(&token), Some(state)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, stored) = call(&app, Method::GET, "/api/marketplace/state", Some(&token), None).await;
    assert_eq!(stored["sort"], "-price");

    let (_, body) = call(&app, Method::POST, "/api/marketplace/search", Some(&token), Some(json!({}))).await;
    assert_eq!(body["items"][0]["id"], "v2");
}

#[tokio::test]
async fn saving_a_listing_toggles() {
    let app = seeded_app().await;
    let token = token_for(BUYER);

    let (_, body) = call(&app, Method::POST, "/api/vehicles/v1/save", Some(&token), None).await;
    assert_eq!(body["saved"], true);
    let (_, saved) = call(&app, Method::GET, "/api/saved", Some(&token), None).await;
    assert_eq!(saved.as_array().unwrap().len(), 1);

    let (_, body) = call(&app, Method::POST, "/api/vehicles/v1/save", Some(&token), None).await;
    assert_eq!(body["saved"], false);

    let (status, _) = call(&app, Method::GET, "/api/vehicles/missing", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn draft_lifecycle_ends_in_a_published_listing() {
    let app = test_app();
    let token = token_for(SELLER);

    let (status, draft) = call(&app, Method::POST, "/api/drafts", Some(&token), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(draft["step"], "basic_info");
    let id = draft["id"].as_str().unwrap().to_string();

    let patch = json!({
        "title": "2020 Toyota Camry SE - One Owner",
        "make": "Toyota",
        "model": "Camry",
        "year": 2020,
        "price": 21000,
        "mileage": 30000,
        "location": "Dallas, TX",
        "contact_info": { "phone": "(214) 555-0199", "email": SELLER }
    });
    let (status, draft) = call(&app, Method::PATCH, &format!("/api/drafts/{}", id), Some(&token), Some(patch)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(draft["form"]["make"], "Toyota");

    let (status, draft) = call(&app, Method::POST, &format!("/api/drafts/{}/next", id), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(draft["step"], "images_ai");

    let other = token_for(BUYER);
    let (status, _) = call(&app, Method::GET, &format!("/api/drafts/{}", id), Some(&other), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, vehicle) = call(&app, Method::POST, &format!("/api/drafts/{}/publish", id), Some(&token), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(vehicle["status"], "active");
    assert_eq!(vehicle["created_by"], SELLER);
    assert_eq!(vehicle["latitude"], 32.7767);

    let (status, _) = call(&app, Method::GET, &format!("/api/drafts/{}", id), Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, mine) = call(&app, Method::GET, "/api/my-listings", Some(&token), None).await;
    assert_eq!(mine.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn publishing_an_incomplete_draft_is_unprocessable() {
    let app = test_app();
    let token = token_for(SELLER);

    let (_, draft) = call(&app, Method::POST, "/api/drafts", Some(&token), None).await;
    let id = draft["id"].as_str().unwrap().to_string();

    let (status, body) = call(&app, Method::POST, &format!("/api/drafts/{}/publish", id), Some(&token), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["section"], "basic_info");
    assert_eq!(body["fields"][0]["field"], "title");
    assert_eq!(app.data.count(EntityKind::Vehicle).await, 0);
}

#[tokio::test]
async fn buyers_message_sellers_over_http() {
    let app = seeded_app().await;
    let buyer = token_for(BUYER);
    let seller = token_for(SELLER);

    let (status, thread) = call(&app, Method::POST, "/api/threads", Some(&buyer), Some(json!({ "vehicle_id": "v1" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    let thread_id = thread["id"].as_str().unwrap().to_string();

    let uri = format!("/api/threads/{}/messages", thread_id);
    let (status, _) = call(&app, Method::POST, &uri, Some(&buyer), Some(json!({ "content": "Still available?" }))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, messages) = call(&app, Method::GET, &uri, Some(&seller), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(messages.as_array().unwrap().len(), 2);

    let outsider = token_for("outsider@example.com");
    let (status, _) = call(&app, Method::GET, &uri, Some(&outsider), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn loosely_typed_and_broken_records_do_not_fail_search() {
    let app = test_app();
    seed_vehicle(&app.data, "v1", SELLER, 18500.0).await;
    app.data
        .seed(
            EntityKind::Vehicle,
            json!({ "id": "v2", "status": "active", "mileage": null, "price": 9000 }),
        )
        .await;
    app.data
        .seed(
            EntityKind::Vehicle,
            json!({ "id": "v3", "status": "active", "price": 12000, "images": "front.jpg" }),
        )
        .await;

    let (status, body) = call(&app, Method::POST, "/api/marketplace/search", None, Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    let ids: Vec<&str> = body["items"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|item| item["id"].as_str())
        .collect();
    assert!(ids.contains(&"v1"));
    assert!(ids.contains(&"v2"));
}

#[tokio::test]
async fn profile_picture_can_be_generated_from_a_prompt() {
    let app = test_app();
    let token = token_for(BUYER);
    app.auth.register(token.clone(), user(BUYER, "Ada Buyer")).await;

    let uri = "/api/profile/picture/generate";
    let (status, _) = call(&app, Method::POST, uri, Some(&token), Some(json!({ "prompt": "   " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = json!({ "prompt": "red sedan at sunset" });
    let (status, profile) = call(&app, Method::POST, uri, Some(&token), Some(request)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["profile_picture_url"], "https://images.test/19.png");
    assert_eq!(app.integrations.prompts_containing("red sedan at sunset"), 1);
}
