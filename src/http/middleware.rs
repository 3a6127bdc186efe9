//! Request middleware, listed outermost first as assembled by
//! [`super::build_app`]: security headers, debug headers, CORS, gzip,
//! logging, instrumentation, user agent, content validation, app auth,
//! rate limit and user auth.

use axum::body::{Body, HttpBody};
use axum::extract::{MatchedPath, Request, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::write::GzEncoder;
use http_body_util::BodyExt;
use std::io::Write;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::AppState;
use super::audit::{AuditEvent, log_audit_event};
use super::error::{ApiError, codes};
use crate::constants::{APP_TOKEN_LEN, BACKEND_TOKEN_LEN, GLOBAL_NAMESPACE, MAX_CONTENT_LENGTH};
use crate::controller::{Integration, Origin};
use crate::service::codec::Redacted;
use crate::service::{App, AppQuery};
use crate::telemetry;

pub const HEADER_HOST: &str = "x-tapglue-host";
pub const HEADER_REVISION: &str = "x-tapglue-revision";
pub const HEADER_QUOTA: &str = "x-ratelimit-quota";
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RESET: &str = "x-ratelimit-reset";

/// Authenticated application of a request.
#[derive(Clone)]
pub struct AppContext {
    pub app: App,
    pub namespace: String,
    pub integration: Integration,
    /// Password part of the basic credentials: a session token for
    /// application tokens, a user id for backend tokens.
    pub secret: String,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("app", &self.app)
            .field("namespace", &self.namespace)
            .field("integration", &self.integration)
            .field("secret", &Redacted(&self.secret))
            .finish()
    }
}

pub async fn security_headers(req: Request, next: Next) -> Response {
    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();
    headers.insert(
        header::STRICT_TRANSPORT_SECURITY,
        HeaderValue::from_static("max-age=63072000"),
    );
    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    resp
}

pub async fn debug_headers(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let mut resp = next.run(req).await;
    let server = &state.config.server;
    let headers = resp.headers_mut();
    if let Ok(host) = HeaderValue::from_str(&server.hostname) {
        headers.insert(HEADER_HOST, host);
    }
    if let Ok(revision) = HeaderValue::from_str(&server.revision) {
        headers.insert(HEADER_REVISION, revision);
    }
    resp
}

fn apply_cors(headers: &mut HeaderMap) {
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, GET, OPTIONS, PUT, DELETE"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("User-Agent, Content-Type, Content-Length, Accept-Encoding, Authorization"),
    );
}

/// Answers preflight requests and marks every response cross-origin.
pub async fn cors(req: Request, next: Next) -> Response {
    if req.method() == Method::OPTIONS {
        let mut resp = StatusCode::OK.into_response();
        apply_cors(resp.headers_mut());
        return resp;
    }
    let mut resp = next.run(req).await;
    apply_cors(resp.headers_mut());
    resp
}

fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|enc| enc.trim().split(';').next() == Some("gzip"))
}

/// Compresses the response body when the client accepts gzip.
pub async fn gzip(req: Request, next: Next) -> Response {
    let wanted = accepts_gzip(req.headers());
    let resp = next.run(req).await;
    if !wanted || resp.headers().contains_key(header::CONTENT_ENCODING) {
        return resp;
    }

    let (mut parts, body) = resp.into_parts();
    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(target: "http", error = %e, "reading response body failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        },
    };
    if bytes.is_empty() {
        return Response::from_parts(parts, Body::empty());
    }

    let mut encoder = GzEncoder::new(Vec::with_capacity(bytes.len() / 2), Compression::default());
    let compressed = encoder.write_all(&bytes).and_then(|()| encoder.finish());
    match compressed {
        Ok(compressed) => {
            parts.headers.remove(header::CONTENT_LENGTH);
            parts
                .headers
                .insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
            parts
                .headers
                .insert(header::VARY, HeaderValue::from_static("Accept-Encoding"));
            Response::from_parts(parts, Body::from(compressed))
        },
        Err(e) => {
            warn!(target: "http", error = %e, "gzip failed");
            Response::from_parts(parts, Body::from(bytes))
        },
    }
}

fn route_of(req: &Request) -> String {
    req.extensions()
        .get::<MatchedPath>()
        .map_or_else(|| "unmatched".to_string(), |p| p.as_str().to_string())
}

pub async fn log_request(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let route = route_of(&req);
    let start = Instant::now();

    let resp = next.run(req).await;

    let status = resp.status().as_u16();
    let duration_ms = start.elapsed().as_millis() as u64;
    if resp.status().is_server_error() {
        warn!(target: "http", %method, %route, status, duration_ms, "request");
    } else {
        info!(target: "http", %method, %route, status, duration_ms, "request");
    }
    resp
}

pub async fn instrument(req: Request, next: Next) -> Response {
    let route = route_of(&req);
    let start = Instant::now();

    let resp = next.run(req).await;

    let bytes = resp.body().size_hint().exact().unwrap_or(0);
    telemetry::record_request(&route, resp.status().as_u16(), start.elapsed(), bytes);
    resp
}

pub async fn require_user_agent(req: Request, next: Next) -> Response {
    let present = req
        .headers()
        .get(header::USER_AGENT)
        .is_some_and(|ua| !ua.is_empty());
    if !present {
        return ApiError::bad_request(codes::USER_AGENT_MISSING, "User-Agent header must be set").into_response();
    }
    next.run(req).await
}

fn check_content(method: &Method, headers: &HeaderMap) -> Result<(), ApiError> {
    if method != Method::POST && method != Method::PUT {
        return Ok(());
    }

    let Some(raw) = headers.get(header::CONTENT_LENGTH) else {
        return Err(ApiError::bad_request(
            codes::CONTENT_LENGTH_MISSING,
            "Content-Length header missing",
        ));
    };
    let length: u64 = raw
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| ApiError::bad_request(codes::CONTENT_LENGTH_INVALID, "Content-Length header is invalid"))?;

    if length > MAX_CONTENT_LENGTH {
        return Err(ApiError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            codes::PAYLOAD_TOO_BIG,
            format!("payload exceeds {MAX_CONTENT_LENGTH} bytes"),
        ));
    }
    if length == 0 {
        if method == Method::PUT {
            return Err(ApiError::bad_request(codes::CONTENT_EMPTY, "payload must not be empty"));
        }
        return Ok(());
    }

    let Some(content_type) = headers.get(header::CONTENT_TYPE) else {
        return Err(ApiError::bad_request(
            codes::CONTENT_TYPE_MISSING,
            "Content-Type header missing",
        ));
    };
    let normalized = content_type
        .to_str()
        .unwrap_or_default()
        .to_ascii_lowercase()
        .replace(' ', "");
    if normalized != "application/json" && normalized != "application/json;charset=utf-8" {
        return Err(ApiError::bad_request(
            codes::CONTENT_TYPE_INVALID,
            "Content-Type must be application/json",
        ));
    }
    Ok(())
}

pub async fn validate_content(req: Request, next: Next) -> Response {
    if let Err(e) = check_content(req.method(), req.headers()) {
        return e.into_response();
    }
    next.run(req).await
}

/// Username and password of a basic `Authorization` header.
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = String::from_utf8(STANDARD.decode(encoded.trim()).ok()?).ok()?;
    let (user, password) = decoded.split_once(':').unwrap_or((decoded.as_str(), ""));
    Some((user.to_string(), password.to_string()))
}

async fn authenticate_app(state: &AppState, headers: &HeaderMap) -> Result<AppContext, String> {
    let Some((token, secret)) = basic_credentials(headers) else {
        return Err("missing basic credentials".into());
    };

    let (query, integration) = match token.len() {
        APP_TOKEN_LEN => (
            AppQuery {
                enabled: Some(true),
                tokens: vec![token.clone()],
                ..Default::default()
            },
            Integration::Application,
        ),
        BACKEND_TOKEN_LEN => (
            AppQuery {
                backend_tokens: vec![token.clone()],
                enabled: Some(true),
                ..Default::default()
            },
            Integration::Backend,
        ),
        len => return Err(format!("token of unexpected length {len}")),
    };

    let apps = state
        .services
        .apps
        .query(GLOBAL_NAMESPACE, &query)
        .await
        .map_err(|e| format!("app lookup failed: {e}"))?;
    let app = apps
        .into_iter()
        .find(|app| match integration {
            Integration::Application => app.matches_token(&token),
            Integration::Backend => app.matches_backend_token(&token),
        })
        .ok_or_else(|| "application not found".to_string())?;

    Ok(AppContext {
        namespace: app.namespace(),
        app,
        integration,
        secret,
    })
}

/// Resolves the app of the basic credentials' username.
pub async fn app_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    match authenticate_app(&state, req.headers()).await {
        Ok(ctx) => {
            debug!(target: "http", namespace = %ctx.namespace, "app authenticated");
            req.extensions_mut().insert(ctx);
            next.run(req).await
        },
        Err(reason) => {
            log_audit_event(AuditEvent::AppAuthFailure {
                path: req.uri().path().to_string(),
                reason,
            });
            ApiError::unauthorized(codes::APP_AUTH, "application user not found").into_response()
        },
    }
}

fn quota_headers(headers: &mut HeaderMap, limit: i64, remaining: i64, reset: i64) {
    headers.insert(HEADER_QUOTA, HeaderValue::from(limit));
    headers.insert(HEADER_REMAINING, HeaderValue::from(remaining));
    headers.insert(HEADER_RESET, HeaderValue::from(reset));
}

/// Counts the request against the app's quota.
pub async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(ctx) = req.extensions().get::<AppContext>() else {
        return next.run(req).await;
    };
    let limit = state.config.rate_limit.limit_for(&ctx.app);
    let quota = state.limiter.request(&ctx.app.token, limit);
    let reset = quota.reset.timestamp();

    if quota.exceeded() {
        log_audit_event(AuditEvent::RateLimited {
            namespace: ctx.namespace.clone(),
            limit,
            remaining: quota.remaining,
        });
        let mut resp = ApiError::new(
            StatusCode::TOO_MANY_REQUESTS,
            codes::GENERIC,
            "rate limit exceeded",
        )
        .into_response();
        quota_headers(resp.headers_mut(), limit, quota.remaining, reset);
        return resp;
    }

    let mut resp = next.run(req).await;
    quota_headers(resp.headers_mut(), limit, quota.remaining, reset);
    resp
}

async fn authenticate_user(state: &AppState, ctx: &AppContext) -> Result<Origin, ApiError> {
    match ctx.integration {
        Integration::Application => {
            if ctx.secret.is_empty() {
                return Err(ApiError::unauthorized(codes::USER_SESSION, "session token missing"));
            }
            let user = state
                .controllers
                .users
                .by_session(&ctx.namespace, &ctx.secret)
                .await
                .map_err(|e| match e {
                    crate::Error::Unauthorized(_) => ApiError::unauthorized(codes::USER_SESSION, "session not found"),
                    other => ApiError::from(other),
                })?;
            Ok(Origin::application(user.id).with_session(ctx.secret.clone()))
        },
        Integration::Backend => {
            let id: u64 = ctx
                .secret
                .parse()
                .map_err(|_| ApiError::unauthorized(codes::USER_NOT_FOUND, "user id missing"))?;
            let user = state
                .controllers
                .users
                .by_id(&ctx.namespace, id)
                .await
                .map_err(|e| match e {
                    crate::Error::Unauthorized(_) => ApiError::unauthorized(codes::USER_NOT_FOUND, "user not found"),
                    other => ApiError::from(other),
                })?;
            Ok(Origin::backend(user.id))
        },
    }
}

/// Resolves the acting user of an authenticated app.
pub async fn user_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let Some(ctx) = req.extensions().get::<AppContext>().cloned() else {
        return ApiError::unauthorized(codes::APP_AUTH, "application user not found").into_response();
    };
    match authenticate_user(&state, &ctx).await {
        Ok(origin) => {
            req.extensions_mut().insert(origin);
            next.run(req).await
        },
        Err(e) => {
            log_audit_event(AuditEvent::UserAuthFailure {
                namespace: ctx.namespace,
                path: req.uri().path().to_string(),
                reason: e.message.clone(),
            });
            e.into_response()
        },
    }
}
