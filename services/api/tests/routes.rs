//! End-to-end checks of the REST surface against the in-memory repository.

use api_lib::{adapters::MemoryRepository, web};
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use synthstyle_core::{domain::ProductRecord, ports::ProfileRepository};
use tower::ServiceExt;

fn test_app() -> (Router, Arc<MemoryRepository>) {
    let repo = Arc::new(MemoryRepository::new());
    let state = Arc::new(web::state::AppState {
        db: repo.clone(),
        advisor: None,
    });
    (web::app(state), repo)
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    cookie: Option<&str>,
) -> (StatusCode, Option<String>, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(str::to_string);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, set_cookie, value)
}

async fn register(app: &Router, email: &str) -> String {
    let (status, cookie, _) = send(
        app,
        "POST",
        "/api/auth/register",
        Some(json!({ "email": email, "password": "hunter22", "name": "Sam" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    cookie.unwrap()
}

fn product(id: &str, name: &str, brand: &str, category: &str, score: u8) -> ProductRecord {
    serde_json::from_value(json!({
        "id": id,
        "name": name,
        "brand": brand,
        "category": category,
        "price": { "current": 49.0 },
        "sustainability": { "overallScore": score }
    }))
    .unwrap()
}

#[tokio::test]
async fn preferences_round_trip() {
    let (app, _) = test_app();
    let body = json!({
        "userId": "u1",
        "preferences": {
            "style": ["Casual", "Vintage"],
            "sustainability": { "preferOrganic": true, "preferRecycled": false, "maxPrice": 150 }
        }
    });

    let (status, _, saved) = send(&app, "POST", "/api/preferences", Some(body), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["userId"], "u1");

    let (status, _, fetched) = send(&app, "GET", "/api/preferences/u1", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["sustainability"]["maxPrice"], 150.0);
    assert_eq!(fetched["sustainability"]["preferRecycled"], false);
    assert_eq!(fetched["style"], json!(["Casual", "Vintage"]));
}

#[tokio::test]
async fn out_of_range_max_price_is_rejected() {
    let (app, _) = test_app();
    let body = json!({
        "userId": "u1",
        "preferences": { "sustainability": { "maxPrice": 20 } }
    });

    let (status, _, error) = send(&app, "POST", "/api/preferences", Some(body), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error["message"].as_str().unwrap().contains("maxPrice"));
}

#[tokio::test]
async fn missing_documents_are_null() {
    let (app, _) = test_app();
    let (status, _, prefs) = send(&app, "GET", "/api/preferences/nobody", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(prefs.is_null());

    let (status, _, profile) = send(&app, "GET", "/api/user/profile/nobody", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(profile.is_null());
}

#[tokio::test]
async fn saved_profile_gets_a_recomputed_score_and_can_be_cleared() {
    let (app, _) = test_app();
    let body = json!({
        "userId": "u2",
        "profile": {
            "purchaseHistory": [
                { "productId": "a", "purchasedAt": "2024-01-01T00:00:00Z", "price": 10.0, "sustainabilityScore": 90.0 },
                { "productId": "b", "purchasedAt": "2024-01-02T00:00:00Z", "price": 20.0, "sustainabilityScore": 50.0 }
            ],
            "sustainabilityScore": 3.0
        }
    });

    let (status, _, saved) = send(&app, "POST", "/api/user/profile", Some(body), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["userId"], "u2");
    assert_eq!(saved["sustainabilityScore"], 70.0);

    let (status, _, _) = send(&app, "POST", "/api/user/clear/u2", None, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, _, profile) = send(&app, "GET", "/api/user/profile/u2", None, None).await;
    assert!(profile.is_null());
}

#[tokio::test]
async fn register_login_and_duplicate_accounts() {
    let (app, _) = test_app();
    let cookie = register(&app, "Sam@Example.com").await;
    assert!(cookie.starts_with("session="));

    let (status, _, error) = send(
        &app,
        "POST",
        "/api/auth/register",
        Some(json!({ "email": "sam@example.com", "password": "other", "name": "Sam" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["message"], "User already exists");

    let (status, _, error) = send(
        &app,
        "POST",
        "/api/auth/login",
        Some(json!({ "email": "sam@example.com", "password": "wrong" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error["message"], "Invalid email or password");

    let (status, login_cookie, account) = send(
        &app,
        "POST",
        "/api/auth/login",
        Some(json!({ "email": "sam@example.com", "password": "hunter22" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(login_cookie.is_some());
    assert_eq!(account["email"], "sam@example.com");
}

#[tokio::test]
async fn purchases_require_a_session() {
    let (app, _) = test_app();
    let purchase = json!({
        "userId": "u3",
        "productId": "p1",
        "price": 30.0,
        "sustainabilityScore": 80.0
    });

    let (status, _, error) =
        send(&app, "POST", "/api/user/purchases", Some(purchase.clone()), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error["message"], "Authentication required");

    let (status, _, _) = send(
        &app,
        "POST",
        "/api/user/purchases",
        Some(purchase.clone()),
        Some("session=forged"),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let cookie = register(&app, "buyer@example.com").await;
    let (status, _, _) =
        send(&app, "POST", "/api/user/purchases", Some(purchase), Some(&cookie)).await;
    assert_eq!(status, StatusCode::OK);

    let second = json!({
        "userId": "u3",
        "productId": "p2",
        "price": 30.0,
        "sustainabilityScore": 60.0
    });
    let (status, _, profile) =
        send(&app, "POST", "/api/user/purchases", Some(second), Some(&cookie)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["sustainabilityScore"], 70.0);
    assert_eq!(profile["purchaseHistory"].as_array().unwrap().len(), 2);

    let bad = json!({
        "userId": "u3",
        "productId": "p3",
        "price": 30.0,
        "sustainabilityScore": 140.0
    });
    let (status, _, _) = send(&app, "POST", "/api/user/purchases", Some(bad), Some(&cookie)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn logout_invalidates_the_session() {
    let (app, _) = test_app();
    let cookie = register(&app, "leaver@example.com").await;

    let (status, cleared, _) = send(&app, "POST", "/api/auth/logout", None, Some(&cookie)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cleared.as_deref(), Some("session="));

    let purchase = json!({
        "userId": "u4",
        "productId": "p1",
        "price": 10.0,
        "sustainabilityScore": 50.0
    });
    let (status, _, _) =
        send(&app, "POST", "/api/user/purchases", Some(purchase), Some(&cookie)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_product_is_404_with_a_message() {
    let (app, _) = test_app();
    let (status, _, error) = send(&app, "GET", "/api/products/missing", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(error["message"].as_str().unwrap().contains("missing"));
}

#[tokio::test]
async fn search_filters_sorts_and_caps_results() {
    let (app, repo) = test_app();
    for i in 0..25u8 {
        repo.save_product(&product(&format!("t{i}"), &format!("Tee {i}"), "Patagonia", "Tops", i * 4))
            .await
            .unwrap();
    }
    repo.save_product(&product("j1", "Organic Jeans", "Levi's", "Bottoms", 55))
        .await
        .unwrap();

    let (status, _, all_tops) = send(&app, "GET", "/api/products?category=tops", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let all_tops = all_tops.as_array().unwrap();
    assert_eq!(all_tops.len(), 20);
    assert_eq!(all_tops[0]["id"], "t24");
    assert_eq!(all_tops[0]["sustainability"]["overallScore"], 96);

    let (_, _, jeans) = send(&app, "GET", "/api/products?query=jeans&brand=", None, None).await;
    let jeans = jeans.as_array().unwrap();
    assert_eq!(jeans.len(), 1);
    assert_eq!(jeans[0]["brand"], "Levi's");

    let (_, _, none) = send(&app, "GET", "/api/products?brand=Nobody", None, None).await;
    assert!(none.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn product_updates_recompute_the_overall_score() {
    let (app, repo) = test_app();
    let body = json!({
        "id": "ignored",
        "name": "Hemp Shirt",
        "brand": "Patagonia",
        "category": "Tops",
        "price": { "current": 60.0 },
        "sustainability": {
            "overallScore": 1,
            "waterUsage": 80.0,
            "carbonFootprint": 80.0,
            "recycledMaterials": true,
            "organicMaterials": true,
            "sustainablePackaging": true,
            "energyEfficiency": 80.0,
            "wasteManagement": 80.0,
            "laborConditions": 80.0
        }
    });

    let (status, _, _) = send(&app, "PUT", "/api/products/h1", Some(body.clone()), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let cookie = register(&app, "editor@example.com").await;
    let (status, _, saved) = send(&app, "PUT", "/api/products/h1", Some(body), Some(&cookie)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["id"], "h1");
    assert_eq!(saved["sustainability"]["overallScore"], 88);

    let mut stale = product("h2", "Wool Coat", "Everlane", "Outerwear", 99);
    stale.sustainability.labor_conditions = Some(80.0);
    repo.save_product(&stale).await.unwrap();
    let (status, _, metrics) =
        send(&app, "POST", "/api/products/h2/sustainability", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(metrics["overallScore"], 10);
    assert_eq!(repo.get_product("h2").await.unwrap().sustainability.overall_score, 10);
}

#[tokio::test]
async fn style_advice_without_an_advisor_is_unavailable() {
    let (app, _) = test_app();
    let (status, _, error) = send(
        &app,
        "POST",
        "/api/ai/style-advice",
        Some(json!({ "userId": "u1" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(error["message"], "Style advice is not configured");
}

#[tokio::test]
async fn openapi_document_lists_the_routes() {
    let (app, _) = test_app();
    let (status, _, doc) = send(&app, "GET", "/api-docs/openapi.json", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let paths = doc["paths"].as_object().unwrap();
    assert!(paths.contains_key("/api/preferences"));
    assert!(paths.contains_key("/api/products/{id}"));
    assert!(paths.contains_key("/api/auth/register"));
}
