//! Router tests driven through `tower::ServiceExt::oneshot`.

use super::*;
use crate::constants::GLOBAL_NAMESPACE;
use crate::platform::cache::CountCache;
use crate::platform::queue::{QueueConfig, QueueService};
use crate::platform::sql::SqlService;
use crate::service::{App, DayCount, Session, SessionQuery, Store};
use anyhow::Result;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::io::Read;
use tower::ServiceExt;

struct Harness {
    router: Router,
    app: App,
}

async fn harness_with(config: Config) -> Result<Harness> {
    let queue = QueueService::memory(QueueConfig::default());
    let services = Services::new(SqlService::memory()?, queue, CountCache::default());
    let app = services
        .apps
        .put(GLOBAL_NAMESPACE, App::new(1, "test", "router tests", false))
        .await?;
    let router = build_app(AppState::new(services, config));
    Ok(Harness { router, app })
}

async fn harness() -> Result<Harness> {
    harness_with(Config::default()).await
}

fn basic(user: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{password}")))
}

fn get(uri: &str, auth: Option<String>) -> Request<Body> {
    let mut req = Request::get(uri).header(header::USER_AGENT, "tests/1.0");
    if let Some(auth) = auth {
        req = req.header(header::AUTHORIZATION, auth);
    }
    req.body(Body::empty()).expect("request")
}

fn send_json(method: &str, uri: &str, auth: Option<String>, body: &Value) -> Request<Body> {
    let body = body.to_string();
    let mut req = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::USER_AGENT, "tests/1.0")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_LENGTH, body.len());
    if let Some(auth) = auth {
        req = req.header(header::AUTHORIZATION, auth);
    }
    req.body(Body::from(body)).expect("request")
}

async fn json_body(resp: Response<Body>) -> Result<Value> {
    let bytes = resp.into_body().collect().await?.to_bytes();
    Ok(serde_json::from_slice(&bytes)?)
}

fn error_code(body: &Value) -> u64 {
    body["errors"][0]["code"].as_u64().unwrap_or(u64::MAX)
}

async fn call(router: &Router, req: Request<Body>) -> Result<Response<Body>> {
    Ok(router.clone().oneshot(req).await?)
}

/// Signs up `name` and returns the session token.
async fn signup(h: &Harness, name: &str) -> Result<(String, String)> {
    let resp = call(
        &h.router,
        send_json(
            "POST",
            "/0.4/users",
            Some(basic(&h.app.token, "")),
            &json!({"user_name": name, "email": format!("{name}@example.com"), "password": "hunter22"}),
        ),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body = json_body(resp).await?;
    let id = body["id"].as_str().unwrap_or_default().to_string();
    let token = body["session_token"].as_str().unwrap_or_default().to_string();
    assert!(!token.is_empty());
    Ok((id, token))
}

#[tokio::test]
async fn test_health_reports_services() -> Result<()> {
    let h = harness().await?;
    let resp = call(&h.router, Request::get("/health").body(Body::empty())?).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await?;
    assert_eq!(body["healthy"], json!(true));
    Ok(())
}

#[tokio::test]
async fn test_missing_user_agent() -> Result<()> {
    let h = harness().await?;
    let req = Request::get("/0.4/me")
        .header(header::AUTHORIZATION, basic(&h.app.token, "x"))
        .body(Body::empty())?;
    let resp = call(&h.router, req).await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&json_body(resp).await?), 5002);
    Ok(())
}

#[tokio::test]
async fn test_unknown_app_token() -> Result<()> {
    let h = harness().await?;
    let resp = call(&h.router, get("/0.4/me", Some(basic(&"0".repeat(32), "x")))).await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&json_body(resp).await?), 1001);

    let resp = call(&h.router, get("/0.4/me", None)).await?;
    assert_eq!(error_code(&json_body(resp).await?), 1001);
    Ok(())
}

#[tokio::test]
async fn test_content_checks() -> Result<()> {
    let h = harness().await?;
    let auth = basic(&h.app.token, "");

    let req = Request::post("/0.4/users")
        .header(header::USER_AGENT, "tests/1.0")
        .header(header::AUTHORIZATION, auth.clone())
        .body(Body::from("{}"))?;
    let resp = call(&h.router, req).await?;
    assert_eq!(error_code(&json_body(resp).await?), 5003);

    let req = Request::post("/0.4/users")
        .header(header::USER_AGENT, "tests/1.0")
        .header(header::AUTHORIZATION, auth.clone())
        .header(header::CONTENT_LENGTH, "2")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("{}"))?;
    let resp = call(&h.router, req).await?;
    assert_eq!(error_code(&json_body(resp).await?), 5007);

    let req = Request::post("/0.4/users")
        .header(header::USER_AGENT, "tests/1.0")
        .header(header::AUTHORIZATION, auth.clone())
        .header(header::CONTENT_LENGTH, "40000")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))?;
    let resp = call(&h.router, req).await?;
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(error_code(&json_body(resp).await?), 5011);

    let req = Request::post("/0.4/users")
        .header(header::USER_AGENT, "tests/1.0")
        .header(header::AUTHORIZATION, auth)
        .header(header::CONTENT_LENGTH, "9")
        .header(header::CONTENT_TYPE, "application/json; charset=UTF-8")
        .body(Body::from("{\"user_na"))?;
    let resp = call(&h.router, req).await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&json_body(resp).await?), 5012);
    Ok(())
}

#[tokio::test]
async fn test_signup_login_and_me() -> Result<()> {
    let h = harness().await?;
    let (id, token) = signup(&h, "alice").await?;

    let resp = call(&h.router, get("/0.4/me", Some(basic(&h.app.token, &token)))).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let me = json_body(resp).await?;
    assert_eq!(me["id"], json!(id));
    assert_eq!(me["user_name"], json!("alice"));
    assert!(me.get("password").is_none());

    let resp = call(
        &h.router,
        send_json(
            "POST",
            "/0.4/me/login",
            Some(basic(&h.app.token, "")),
            &json!({"email": "alice@example.com", "password": "hunter22"}),
        ),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let second = json_body(resp).await?;
    assert_ne!(second["session_token"], json!(token));

    let resp = call(
        &h.router,
        send_json(
            "POST",
            "/0.4/me/login",
            Some(basic(&h.app.token, "")),
            &json!({"email": "alice@example.com", "password": "wrong"}),
        ),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn test_session_required_for_user_routes() -> Result<()> {
    let h = harness().await?;
    let resp = call(&h.router, get("/0.4/me", Some(basic(&h.app.token, "nope")))).await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&json_body(resp).await?), 4013);

    let resp = call(&h.router, get("/0.4/me", Some(basic(&h.app.backend_token, "12")))).await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&json_body(resp).await?), 4007);
    Ok(())
}

/// Session store whose backend is down.
struct UnavailableSessions;

fn unavailable() -> crate::Error {
    crate::Error::Storage(anyhow::anyhow!("disk I/O error"))
}

#[async_trait::async_trait]
impl Store for UnavailableSessions {
    type Entity = Session;
    type Query = SessionQuery;

    fn name(&self) -> &'static str {
        "sessions"
    }

    async fn put(&self, _: &str, _: Session) -> crate::error::Result<Session> {
        Err(unavailable())
    }

    async fn query(&self, _: &str, _: &SessionQuery) -> crate::error::Result<Vec<Session>> {
        Err(unavailable())
    }

    async fn count(&self, _: &str, _: &SessionQuery) -> crate::error::Result<u64> {
        Err(unavailable())
    }

    async fn created_by_day(
        &self,
        _: &str,
        _: DateTime<Utc>,
        _: DateTime<Utc>,
    ) -> crate::error::Result<Vec<DayCount>> {
        Err(unavailable())
    }

    async fn setup(&self, _: &str) -> crate::error::Result<()> {
        Err(unavailable())
    }

    async fn teardown(&self, _: &str) -> crate::error::Result<()> {
        Err(unavailable())
    }
}

#[tokio::test]
async fn test_session_store_failure_is_server_error() -> Result<()> {
    let queue = QueueService::memory(QueueConfig::default());
    let mut services = Services::new(SqlService::memory()?, queue, CountCache::default());
    let app = services
        .apps
        .put(GLOBAL_NAMESPACE, App::new(1, "test", "router tests", false))
        .await?;
    services.sessions = Arc::new(UnavailableSessions);
    let router = build_app(AppState::new(services, Config::default()));

    let resp = call(&router, get("/0.4/me", Some(basic(&app.token, "some-session")))).await?;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    Ok(())
}

#[tokio::test]
async fn test_backend_token_acts_as_user() -> Result<()> {
    let h = harness().await?;
    let (id, _) = signup(&h, "bob").await?;
    let resp = call(&h.router, get("/0.4/me", Some(basic(&h.app.backend_token, &id)))).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await?["user_name"], json!("bob"));
    Ok(())
}

#[tokio::test]
async fn test_follow_then_list_followers() -> Result<()> {
    let h = harness().await?;
    let (alice, alice_token) = signup(&h, "alice").await?;
    let (bob, bob_token) = signup(&h, "bob").await?;

    let resp = call(
        &h.router,
        send_json(
            "PUT",
            "/0.4/me/connections",
            Some(basic(&h.app.token, &alice_token)),
            &json!({"user_to_id": bob, "type": "follow", "state": "confirmed"}),
        ),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let con = json_body(resp).await?;
    assert_eq!(con["user_from_id"], json!(alice));

    let resp = call(&h.router, get("/0.4/me/followers", Some(basic(&h.app.token, &bob_token)))).await?;
    let body = json_body(resp).await?;
    assert_eq!(body["users_count"], json!(1));
    assert_eq!(body["users"][0]["id"], json!(alice));
    assert!(body.get("paging").is_none());
    Ok(())
}

#[tokio::test]
async fn test_post_comment_like_flow() -> Result<()> {
    let h = harness().await?;
    let (_, token) = signup(&h, "carol").await?;
    let auth = || Some(basic(&h.app.token, &token));

    let resp = call(
        &h.router,
        send_json("POST", "/0.4/posts", auth(), &json!({"visibility": 30, "tags": ["hello"]})),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let post = json_body(resp).await?;
    let post_id = post["id"].as_str().unwrap_or_default().to_string();

    let resp = call(
        &h.router,
        send_json("POST", &format!("/0.4/posts/{post_id}/likes"), auth(), &json!({})),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = call(&h.router, get(&format!("/0.4/posts/{post_id}"), auth())).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let post = json_body(resp).await?;
    assert_eq!(post["is_liked"], json!(true));

    let resp = call(&h.router, get(&format!("/0.4/posts/{post_id}/likes"), auth())).await?;
    let likes = json_body(resp).await?;
    assert_eq!(likes["likes_count"], json!(1));
    assert!(likes["paging"].is_object());

    let resp = call(&h.router, get("/0.4/posts/abc", auth())).await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn test_rate_limit_headers_and_rejection() -> Result<()> {
    let mut config = Config::default();
    config.rate_limit.staging = 2;
    let h = harness_with(config).await?;

    let mut remaining = Vec::new();
    for _ in 0..3 {
        let resp = call(&h.router, get("/0.4/me", Some(basic(&h.app.token, "none")))).await?;
        let header = resp
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert_eq!(
            resp.headers().get("x-ratelimit-quota").and_then(|v| v.to_str().ok()),
            Some("2")
        );
        assert!(resp.headers().contains_key("x-ratelimit-reset"));
        remaining.push((resp.status(), header));
    }

    assert_eq!(remaining[0], (StatusCode::UNAUTHORIZED, "1".to_string()));
    assert_eq!(remaining[1], (StatusCode::UNAUTHORIZED, "0".to_string()));
    assert_eq!(remaining[2], (StatusCode::TOO_MANY_REQUESTS, "-1".to_string()));
    Ok(())
}

#[tokio::test]
async fn test_cors_preflight() -> Result<()> {
    let h = harness().await?;
    let req = Request::builder()
        .method("OPTIONS")
        .uri("/0.4/me")
        .body(Body::empty())?;
    let resp = call(&h.router, req).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
    Ok(())
}

#[tokio::test]
async fn test_security_and_debug_headers() -> Result<()> {
    let h = harness().await?;
    let resp = call(&h.router, Request::get("/health").body(Body::empty())?).await?;
    let headers = resp.headers();
    assert_eq!(
        headers.get(header::X_CONTENT_TYPE_OPTIONS).and_then(|v| v.to_str().ok()),
        Some("nosniff")
    );
    assert!(headers.contains_key(header::STRICT_TRANSPORT_SECURITY));
    assert!(headers.contains_key(middleware::HEADER_REVISION));
    Ok(())
}

#[tokio::test]
async fn test_gzip_when_accepted() -> Result<()> {
    let h = harness().await?;
    let req = Request::get("/health")
        .header(header::ACCEPT_ENCODING, "deflate, gzip;q=1.0")
        .body(Body::empty())?;
    let resp = call(&h.router, req).await?;
    assert_eq!(
        resp.headers().get(header::CONTENT_ENCODING).and_then(|v| v.to_str().ok()),
        Some("gzip")
    );

    let compressed = resp.into_body().collect().await?.to_bytes();
    let mut plain = String::new();
    GzDecoder::new(compressed.as_ref()).read_to_string(&mut plain)?;
    let body: Value = serde_json::from_str(&plain)?;
    assert_eq!(body["healthy"], json!(true));
    Ok(())
}
