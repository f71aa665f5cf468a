//! Integration tests for the site's HTTP surface.
//!
//! Covers credential bootstrap, rate-limited login, the admin guard, uploads
//! and the admin user operations.

use axum::{
    Router,
    body::Body,
    extract::ConnectInfo,
    http::{Request, Response, StatusCode, header},
};
use advancements::api::AppState;
use advancements::config::Config;
use advancements::db::Store;
use advancements::services::{FileAuthService, GalleryService};
use http_body_util::BodyExt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    uploads: PathBuf,
}

async fn spawn_app(master_key: Option<&str>) -> TestApp {
    let root = std::env::temp_dir().join(format!("advancements-api-test-{}", uuid::Uuid::new_v4()));

    let mut config = Config::default();
    config.storage.credentials_path = root.join("data/credentials.json");
    config.storage.attempts_path = root.join("data/attempts.json");
    config.storage.upload_path = root.join("uploads");
    config.security.master_key = master_key.map(str::to_string);
    config.security.argon2_memory_cost_kib = 1024;
    config.security.argon2_time_cost = 1;

    let uploads = config.storage.upload_path.clone();
    let state = advancements::api::create_app_state(config, None)
        .await
        .expect("Failed to create app state");

    TestApp {
        router: advancements::api::router(state.clone()),
        state,
        uploads,
    }
}

/// Like [`spawn_app`], but admin sessions are issued with the given lifetime.
async fn spawn_app_with_session_ttl(ttl_seconds: i64) -> TestApp {
    let base = spawn_app(None).await;
    let config = base.state.config.clone();

    let store = Store::open(&config).await.expect("Failed to open store");
    let state = Arc::new(AppState {
        auth: Arc::new(FileAuthService::new(store, None, ttl_seconds)),
        gallery: Arc::new(GalleryService::new(&config.storage.upload_path)),
        config,
        start_time: std::time::Instant::now(),
        prometheus_handle: None,
    });

    TestApp {
        router: advancements::api::router(state.clone()),
        state,
        uploads: base.uploads,
    }
}

fn with_peer(mut request: Request<Body>, ip: &str) -> Request<Body> {
    let addr: SocketAddr = format!("{ip}:40000").parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    with_peer(builder.body(Body::empty()).unwrap(), "127.0.0.1")
}

fn post_form(uri: &str, body: &str, cookie: Option<&str>, ip: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    with_peer(builder.body(Body::from(body.to_string())).unwrap(), ip)
}

async fn send(app: &TestApp, request: Request<Body>) -> Response<Body> {
    app.router.clone().oneshot(request).await.unwrap()
}

fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// The `id=...` pair of the session cookie, if the response set one.
fn session_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("id="))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Creates `alice` as owner through the setup page.
async fn bootstrap_owner(app: &TestApp) {
    let response = send(
        app,
        post_form("/set_credentials", "new_login=alice&new_pass=pw1", None, "127.0.0.1"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
}

async fn login(app: &TestApp, username: &str, password: &str, ip: &str) -> Response<Body> {
    send(
        app,
        post_form(
            "/locked_login",
            &format!("username={username}&password={password}"),
            None,
            ip,
        ),
    )
    .await
}

async fn login_cookie(app: &TestApp) -> String {
    let response = login(app, "alice", "pw1", "127.0.0.1").await;
    assert_eq!(location(&response), "/locked_area");
    session_cookie(&response).expect("login should set a session cookie")
}

#[tokio::test]
async fn test_initial_setup_then_master_key_gate() {
    let app = spawn_app(Some("sesame")).await;

    let response = send(&app, get("/set_credentials", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!body_text(response).await.contains("master_key"));

    bootstrap_owner(&app).await;
    let users = app.state.auth.list_users().await;
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].username, "alice");
    assert!(users[0].owner);

    let response = send(
        &app,
        post_form("/set_credentials", "new_login=bob&new_pass=pw2", None, "127.0.0.1"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/set_credentials");
    let cookie = session_cookie(&response).unwrap();
    assert_eq!(app.state.auth.list_users().await.len(), 1);

    let page = body_text(send(&app, get("/set_credentials", Some(&cookie))).await).await;
    assert!(page.contains("Invalid master key"));
    assert!(page.contains("master_key"));

    let response = send(
        &app,
        post_form(
            "/set_credentials",
            "master_key=sesame&new_login=bob&new_pass=pw2",
            None,
            "127.0.0.1",
        ),
    )
    .await;
    assert_eq!(location(&response), "/");

    let users = app.state.auth.list_users().await;
    assert_eq!(users.len(), 2);
    let bob = users.iter().find(|u| u.username == "bob").unwrap();
    assert!(!bob.owner);
}

#[tokio::test]
async fn test_login_rate_limited_per_ip() {
    let app = spawn_app(None).await;
    bootstrap_owner(&app).await;

    for name in ["eve", "mallory", "trent", "oscar"] {
        let response = login(&app, name, "guess", "10.0.0.9").await;
        assert_eq!(location(&response), "/");
    }

    let response = login(&app, "alice", "pw1", "10.0.0.9").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    let cookie = session_cookie(&response).unwrap();
    let page = body_text(send(&app, get("/", Some(&cookie))).await).await;
    assert!(page.contains("Too many failed login attempts"));

    let response = send(
        &app,
        with_peer(
            Request::builder()
                .uri("/attempts_left?username=alice")
                .body(Body::empty())
                .unwrap(),
            "10.0.0.9",
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["max_attempts"], 4);
    assert_eq!(json["data"]["ip"]["remaining"], 0);
    assert_eq!(json["data"]["user"]["remaining"], 4);

    let response = login(&app, "alice", "pw1", "10.0.0.10").await;
    assert_eq!(location(&response), "/locked_area");
}

#[tokio::test]
async fn test_invalid_credentials_flash() {
    let app = spawn_app(None).await;
    bootstrap_owner(&app).await;

    let response = login(&app, "alice", "wrong", "127.0.0.1").await;
    assert_eq!(location(&response), "/");
    let cookie = session_cookie(&response).unwrap();

    let page = body_text(send(&app, get("/", Some(&cookie))).await).await;
    assert!(page.contains("Invalid username or password"));

    // Flash messages are shown once.
    let page = body_text(send(&app, get("/", Some(&cookie))).await).await;
    assert!(!page.contains("Invalid username or password"));
}

#[tokio::test]
async fn test_admin_pages_require_session() {
    let app = spawn_app(None).await;

    let response = send(&app, get("/locked_area", None)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");

    let response = send(
        &app,
        post_form("/upload_text", "text=sneaky", None, "127.0.0.1"),
    )
    .await;
    assert_eq!(location(&response), "/");
    assert!(!app.uploads.join("text.txt").exists());

    let response = send(
        &app,
        post_form("/admin_create_user", "new_login=x&new_pass=y", None, "127.0.0.1"),
    )
    .await;
    assert_eq!(location(&response), "/");
    assert!(app.state.auth.list_users().await.is_empty());
}

#[tokio::test]
async fn test_dashboard_and_logout() {
    let app = spawn_app(None).await;
    bootstrap_owner(&app).await;
    let cookie = login_cookie(&app).await;

    let response = send(&app, get("/locked_area", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_text(response).await;
    assert!(page.contains("Logged in as <strong>alice</strong>"));
    assert!(page.contains("Welcome, alice"));

    let response = send(&app, post_form("/admin_logout", "", Some(&cookie), "127.0.0.1")).await;
    assert_eq!(location(&response), "/");

    let response = send(&app, get("/locked_area", Some(&cookie))).await;
    assert_eq!(location(&response), "/");
}

#[tokio::test]
async fn test_expired_session_is_logged_out() {
    let app = spawn_app_with_session_ttl(0).await;
    bootstrap_owner(&app).await;
    let cookie = login_cookie(&app).await;

    let response = send(&app, get("/locked_area", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    let fresh = session_cookie(&response).expect("flash should be stored in the session");

    let page = body_text(send(&app, get("/", Some(&fresh))).await).await;
    assert!(page.contains("Your session has expired"));

    let response = send(&app, get("/locked_area", Some(&cookie))).await;
    assert_eq!(location(&response), "/");
    let response = send(
        &app,
        post_form("/upload_text", "text=late", Some(&cookie), "127.0.0.1"),
    )
    .await;
    assert_eq!(location(&response), "/");
    assert!(!app.uploads.join("text.txt").exists());
}

#[tokio::test]
async fn test_upload_text_and_image() {
    let app = spawn_app(None).await;
    bootstrap_owner(&app).await;
    let cookie = login_cookie(&app).await;

    let response = send(
        &app,
        post_form("/upload_text", "text=Reached+the+nether", Some(&cookie), "127.0.0.1"),
    )
    .await;
    assert_eq!(location(&response), "/advancements");

    let page = body_text(send(&app, get("/advancements", None)).await).await;
    assert!(page.contains("Reached the nether"));

    let boundary = "XBOUNDARYX";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"gallery\"\r\n\r\nBakaV1\r\n\
             --{boundary}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"my pic.png\"\r\n\
             Content-Type: image/png\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"\x89PNG\r\n\x1a\nfake");
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    let request = Request::builder()
        .method("POST")
        .uri("/upload_image")
        .header(header::COOKIE, &cookie)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap();
    let response = send(&app, with_peer(request, "127.0.0.1")).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/advancements/BakaV1");

    let page = body_text(send(&app, get("/advancements/BakaV1", None)).await).await;
    assert!(page.contains("/uploads/BakaV1/my_pic.png"));

    let response = send(&app, get("/uploads/BakaV1/my_pic.png", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.ends_with("fake"));

    let index = body_text(send(&app, get("/", None)).await).await;
    assert!(index.contains(r#"href="/advancements/BakaV1""#));
}

#[tokio::test]
async fn test_admin_user_management() {
    let app = spawn_app(None).await;
    bootstrap_owner(&app).await;
    let cookie = login_cookie(&app).await;

    let response = send(
        &app,
        post_form("/admin_create_user", "new_login=Bob&new_pass=pw2", Some(&cookie), "127.0.0.1"),
    )
    .await;
    assert_eq!(location(&response), "/locked_area");
    assert!(app.state.auth.list_users().await.iter().any(|u| u.username == "bob"));

    let response = send(
        &app,
        post_form("/admin_delete_user", "username=alice", Some(&cookie), "127.0.0.1"),
    )
    .await;
    assert_eq!(location(&response), "/locked_area");
    assert_eq!(app.state.auth.list_users().await.len(), 2);

    // The old password stops working once reset.
    let response = send(
        &app,
        post_form(
            "/admin_reset_password",
            "username=bob&new_pass=fresh",
            Some(&cookie),
            "127.0.0.1",
        ),
    )
    .await;
    assert_eq!(location(&response), "/locked_area");
    assert_eq!(
        location(&login(&app, "bob", "fresh", "127.0.0.2").await),
        "/locked_area"
    );
    assert_eq!(location(&login(&app, "bob", "pw2", "127.0.0.3").await), "/");

    let response = send(
        &app,
        post_form("/admin_delete_user", "username=bob", Some(&cookie), "127.0.0.1"),
    )
    .await;
    assert_eq!(location(&response), "/locked_area");
    let users = app.state.auth.list_users().await;
    assert_eq!(users.len(), 1);
    assert!(users[0].owner);
}

#[tokio::test]
async fn test_admin_reset_attempts_unblocks_ip() {
    let app = spawn_app(None).await;
    bootstrap_owner(&app).await;
    let cookie = login_cookie(&app).await;

    for _ in 0..4 {
        login(&app, "nobody", "x", "192.0.2.1").await;
    }
    assert_eq!(location(&login(&app, "alice", "pw1", "192.0.2.1").await), "/");

    let response = send(
        &app,
        post_form(
            "/admin_reset_attempts",
            "key=192.0.2.1&scope=ip",
            Some(&cookie),
            "127.0.0.1",
        ),
    )
    .await;
    assert_eq!(location(&response), "/locked_area");

    assert_eq!(
        location(&login(&app, "alice", "pw1", "192.0.2.1").await),
        "/locked_area"
    );
}

#[tokio::test]
async fn test_unknown_gallery_is_not_found() {
    let app = spawn_app(None).await;

    let response = send(&app, get("/advancements/LasV1", None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(&app, get("/advancements/..", None)).await;
    assert_ne!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_gallery_consumes_pending_flash() {
    let app = spawn_app(None).await;
    bootstrap_owner(&app).await;

    let response = login(&app, "alice", "wrong", "127.0.0.1").await;
    let cookie = session_cookie(&response).unwrap();

    let response = send(&app, get("/advancements/LasV1", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let page = body_text(send(&app, get("/", Some(&cookie))).await).await;
    assert!(!page.contains("Invalid username or password"));
}

#[tokio::test]
async fn test_security_headers() {
    let app = spawn_app(None).await;

    let response = send(&app, get("/", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-frame-options").unwrap(),
        "DENY"
    );
    assert!(response.headers().contains_key("content-security-policy"));
}
