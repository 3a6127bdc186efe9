//! JSON API served by `tapglue api`.
//!
//! Routes live under the `/0.4` prefix and authenticate with HTTP Basic:
//! the username is an application token (32 characters) or a backend token
//! (44 characters); the password is a session token or, for backend
//! tokens, the id of the acting user. `/health` and `/metrics` are open.

pub mod audit;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod paging;

#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use axum::Router;
use axum::routing::{get, post, put};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tracing::info;

use crate::config::Config;
use crate::controller::Controllers;
use crate::platform::limiter::RateLimiter;
use crate::service::Services;

use handlers::{connection, device, event, feed, health, post as posts, recommendation, user};

/// Shared state of every handler.
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub controllers: Controllers,
    pub limiter: RateLimiter,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(services: Services, config: Config) -> Self {
        Self {
            controllers: Controllers::new(&services),
            services,
            limiter: RateLimiter::default(),
            config: Arc::new(config),
        }
    }
}

/// Routes acting on behalf of a user.
fn user_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        // Current user
        .route("/0.4/me", get(user::me).put(user::update).delete(user::delete))
        .route("/0.4/me/logout", axum::routing::delete(user::logout))
        // Users
        .route("/0.4/users/search", get(user::search))
        .route("/0.4/users/search/emails", post(user::search_emails))
        .route("/0.4/users/search/{platform}", post(user::search_platform))
        .route("/0.4/users/{userID}", get(user::retrieve))
        // Connections
        .route("/0.4/me/connections", put(connection::update))
        .route("/0.4/me/connections/social", post(connection::social))
        .route("/0.4/me/connections/{state}", get(connection::by_state))
        .route(
            "/0.4/me/connections/{type}/{userID}",
            axum::routing::delete(connection::delete),
        )
        .route("/0.4/me/followers", get(connection::my_followers))
        .route("/0.4/me/follows", get(connection::my_followings))
        .route("/0.4/me/friends", get(connection::my_friends))
        .route("/0.4/users/{userID}/followers", get(connection::user_followers))
        .route("/0.4/users/{userID}/follows", get(connection::user_followings))
        .route("/0.4/users/{userID}/friends", get(connection::user_friends))
        // Events
        .route("/0.4/me/events", post(event::create).get(event::list_me))
        .route("/0.4/me/events/{eventID}", put(event::update).delete(event::delete))
        .route("/0.4/users/{userID}/events", get(event::list_user))
        // Feeds
        .route("/0.4/me/feed", get(feed::news))
        .route("/0.4/me/feed/events", get(feed::events))
        .route("/0.4/me/feed/posts", get(feed::posts))
        .route("/0.4/me/feed/notifications/self", get(feed::notifications_self))
        // Posts
        .route("/0.4/posts", post(posts::create).get(posts::list_all))
        .route(
            "/0.4/posts/{postID}",
            get(posts::retrieve).put(posts::update).delete(posts::delete),
        )
        .route("/0.4/me/posts", get(posts::list_me))
        .route("/0.4/users/{userID}/posts", get(posts::list_user))
        .route(
            "/0.4/posts/{postID}/comments",
            post(posts::comment_create).get(posts::comment_list),
        )
        .route(
            "/0.4/posts/{postID}/comments/{commentID}",
            get(posts::comment_retrieve)
                .put(posts::comment_update)
                .delete(posts::comment_delete),
        )
        .route(
            "/0.4/posts/{postID}/likes",
            post(posts::like_create)
                .delete(posts::like_delete)
                .get(posts::like_list),
        )
        // Recommendations
        .route(
            "/0.4/recommendations/users/active/{period}",
            get(recommendation::users_active),
        )
        // Devices
        .route(
            "/0.4/me/devices/{deviceID}",
            put(device::update).delete(device::delete),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::user_auth,
        ))
}

/// Versioned API: app-only routes plus the user routes, behind user agent,
/// content, app auth and rate limit checks.
fn api_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/0.4/users", post(user::create))
        .route("/0.4/me/login", post(user::login))
        .merge(user_routes(state))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit,
        ))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::app_auth,
        ))
        .route_layer(axum::middleware::from_fn(middleware::validate_content))
        .route_layer(axum::middleware::from_fn(middleware::require_user_agent))
}

/// Build the full application router.
pub fn build_app(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.server.request_timeout_secs.max(1));

    Router::new()
        .route("/health", get(health::health))
        .route("/metrics", get(health::metrics))
        .merge(api_routes(&state))
        .layer(axum::middleware::from_fn(middleware::instrument))
        .layer(axum::middleware::from_fn(middleware::log_request))
        .layer(axum::middleware::from_fn(middleware::gzip))
        .layer(axum::middleware::from_fn(middleware::cors))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::debug_headers,
        ))
        .layer(axum::middleware::from_fn(middleware::security_headers))
        .layer(TimeoutLayer::new(timeout))
        .with_state(state)
}

/// Serves the API on `listen` until the process is interrupted.
///
/// # Errors
///
/// Fails when the address cannot be bound or the server stops with an error.
pub async fn serve(state: AppState, listen: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("Failed to bind {listen}"))?;
    info!(target: "http", %listen, version = crate::constants::API_VERSION, "API listening");

    axum::serve(listener, build_app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server failed")
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!(target: "http", "shutdown requested");
    }
}
