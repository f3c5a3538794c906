use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use caption_gallery::{
    gallery::GalleryAssembler,
    handlers::VERIFIER_COOKIE,
    memory::{InMemoryGalleryRepository, InMemoryIdentityProvider},
    routes::create_router,
    AppState,
};
use serde_json::{json, Value};
use tower::ServiceExt;

const ORIGIN: &str = "http://gallery.test";

fn app(page_size: u32) -> (Router, Arc<InMemoryGalleryRepository>) {
    let repo = Arc::new(InMemoryGalleryRepository::new());
    let state = Arc::new(AppState {
        gallery: GalleryAssembler::new(repo.clone(), page_size),
        repo: repo.clone(),
        identity: Arc::new(InMemoryIdentityProvider::new("visitor@example.com")),
        oauth_provider: "google".to_string(),
        public_origin: ORIGIN.to_string(),
    });
    (create_router(state), repo)
}

async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

fn post_json(uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Runs the redirect + callback dance and returns the access token.
async fn sign_in(router: &Router) -> String {
    let resp = router.clone().oneshot(get("/auth/sign-in", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);

    let location = resp.headers()[header::LOCATION].to_str().unwrap().to_string();
    assert!(location.starts_with(&format!("{}/auth/callback?code=", ORIGIN)));
    let code = location.split("code=").nth(1).unwrap().to_string();

    let set_cookie = resp.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
    let cookie = set_cookie.split(';').next().unwrap().to_string();
    assert!(cookie.starts_with(VERIFIER_COOKIE));

    let req = Request::builder()
        .uri(format!("/auth/callback?code={}", code))
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap();
    let (status, session) = send(router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["user"]["email"], "visitor@example.com");
    session["access_token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn empty_gallery_has_no_pages() {
    let (router, _) = app(36);
    let (status, body) = send(&router, get("/captions", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["page"], 1);
    assert_eq!(body["total_pages"], 0);
    assert_eq!(body["captions"], json!([]));
}

#[tokio::test]
async fn page_zero_is_a_bad_request() {
    let (router, _) = app(36);
    let (status, body) = send(&router, get("/captions?page=0", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("start at 1"));
}

#[tokio::test]
async fn malformed_page_gets_a_json_error() {
    let (router, _) = app(36);
    let (status, body) = send(&router, get("/captions?page=abc", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, body) = send(&router, get("/captions?page=-1", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn malformed_caption_body_gets_a_json_error() {
    let (router, repo) = app(36);
    let token = sign_in(&router).await;
    let req = Request::builder()
        .method("POST")
        .uri("/protected/captions")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&router, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
    assert_eq!(repo.store_calls(), 0);
}

#[tokio::test]
async fn gated_routes_need_a_session() {
    let (router, _) = app(36);
    let (status, _) = send(&router, get("/protected", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(&router, get("/protected", Some("not-a-token"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn callback_without_verifier_cookie_is_rejected() {
    let (router, _) = app(36);
    let (status, _) = send(&router, get("/auth/callback?code=abc", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn sign_in_create_captions_and_page_through_them() {
    let (router, repo) = app(2);
    let token = sign_in(&router).await;

    let (status, body) = send(&router, get("/protected", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "visitor@example.com");

    let calls_before = repo.store_calls();
    let (status, body) = send(
        &router,
        post_json("/protected/captions", &token, json!({ "content": "   ", "image_url": "https://img.example.com/a.png" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Caption text is required");
    assert_eq!(repo.store_calls(), calls_before);

    for n in 1..=3 {
        let (status, body) = send(
            &router,
            post_json(
                "/protected/captions",
                &token,
                json!({ "content": format!("caption {}", n), "image_url": format!("https://img.example.com/{}.png", n) }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["content"], format!("caption {}", n));
    }

    let (status, first) = send(&router, get("/captions?page=1", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["total_pages"], 2);
    assert_eq!(first["total_count"], 3);
    let captions = first["captions"].as_array().unwrap();
    assert_eq!(captions.len(), 2);
    let created = |c: &Value| chrono::DateTime::parse_from_rfc3339(c["created_datetime_utc"].as_str().unwrap()).unwrap();
    assert!(created(&captions[0]) >= created(&captions[1]));

    let (_, second) = send(&router, get("/captions?page=2", None)).await;
    assert_eq!(second["captions"].as_array().unwrap().len(), 1);

    let (status, past_end) = send(&router, get("/captions?page=3", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(past_end["captions"], json!([]));
}

#[tokio::test]
async fn failed_caption_write_reports_an_error() {
    let (router, repo) = app(36);
    let token = sign_in(&router).await;
    repo.fail_caption_inserts.store(true, std::sync::atomic::Ordering::Relaxed);

    let (status, body) = send(
        &router,
        post_json("/protected/captions", &token, json!({ "content": "hi", "image_url": "https://img.example.com/a.png" })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Failed to save caption");
    // The image row is left behind.
    assert_eq!(repo.image_count().await, 1);
}

#[tokio::test]
async fn sign_out_closes_the_gated_route() {
    let (router, _) = app(36);
    let token = sign_in(&router).await;

    let req = Request::builder()
        .method("POST")
        .uri("/auth/sign-out")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&router, req).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&router, get("/protected", Some(&token))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(
        &router,
        post_json("/protected/captions", &token, json!({ "content": "late", "image_url": "https://img.example.com/x.png" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
