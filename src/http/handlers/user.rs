//! User handlers.

use axum::extract::{Extension, OriginalUri, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use super::super::AppState;
use super::super::audit::{AuditEvent, log_audit_event};
use super::super::error::ApiResult;
use super::super::middleware::AppContext;
use super::super::paging::{PageParams, Paging};
use super::{Caller, Payload, UsersResponse, parse_id};
use crate::controller::Credentials;
use crate::service::User;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailsRequest {
    #[serde(default)]
    pub emails: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct PlatformIdsRequest {
    #[serde(default)]
    pub ids: Vec<String>,
}

/// POST /0.4/users - Sign up, or log in when the user exists.
pub(crate) async fn create(
    State(state): State<AppState>,
    Extension(ctx): Extension<AppContext>,
    Payload(user): Payload<User>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let user = state.controllers.users.create(&ctx.namespace, user).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// POST /0.4/me/login - Log in by email or username.
pub(crate) async fn login(
    State(state): State<AppState>,
    Extension(ctx): Extension<AppContext>,
    Payload(credentials): Payload<Credentials>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let user = state.controllers.users.login(&ctx.namespace, credentials).await?;
    log_audit_event(AuditEvent::Login {
        namespace: ctx.namespace,
        user_id: user.id,
    });
    Ok((StatusCode::CREATED, Json(user)))
}

/// DELETE /0.4/me/logout - Close the current session.
pub(crate) async fn logout(State(state): State<AppState>, caller: Caller) -> ApiResult<StatusCode> {
    let token = caller.origin.session.clone().unwrap_or_default();
    state
        .controllers
        .users
        .logout(&caller.namespace, &caller.origin, &token)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /0.4/me - The current user.
pub(crate) async fn me(State(state): State<AppState>, caller: Caller) -> ApiResult<Json<User>> {
    let user = state
        .controllers
        .users
        .retrieve(&caller.namespace, &caller.origin, caller.origin.user_id)
        .await?;
    Ok(Json(user))
}

/// PUT /0.4/me - Update the current user.
pub(crate) async fn update(
    State(state): State<AppState>,
    caller: Caller,
    Payload(user): Payload<User>,
) -> ApiResult<Json<User>> {
    let user = state
        .controllers
        .users
        .update(&caller.namespace, &caller.origin, user)
        .await?;
    Ok(Json(user))
}

/// DELETE /0.4/me - Delete the current user.
pub(crate) async fn delete(State(state): State<AppState>, caller: Caller) -> ApiResult<StatusCode> {
    state
        .controllers
        .users
        .delete(&caller.namespace, &caller.origin)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /0.4/users/{userID} - A user with their relation to the caller.
pub(crate) async fn retrieve(
    State(state): State<AppState>,
    caller: Caller,
    Path(user_id): Path<String>,
) -> ApiResult<Json<User>> {
    let id = parse_id(&user_id, "user")?;
    let user = state
        .controllers
        .users
        .retrieve(&caller.namespace, &caller.origin, id)
        .await?;
    Ok(Json(user))
}

/// GET /0.4/users/search?q= - Prefix search.
pub(crate) async fn search(
    State(state): State<AppState>,
    caller: Caller,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<SearchParams>,
    Query(paging): Query<PageParams>,
) -> ApiResult<Json<UsersResponse>> {
    let page = paging.page()?;
    let users = state
        .controllers
        .users
        .search(&caller.namespace, &caller.origin, &params.q, page)
        .await?;
    let paging = Paging::new(&uri, &page, users.iter().map(|u| u.created_at));
    Ok(Json(UsersResponse::from(users).with_paging(paging)))
}

/// POST /0.4/users/search/emails - Users registered with the given emails.
pub(crate) async fn search_emails(
    State(state): State<AppState>,
    caller: Caller,
    Payload(req): Payload<EmailsRequest>,
) -> ApiResult<Json<UsersResponse>> {
    let users = state
        .controllers
        .users
        .list_by_emails(&caller.namespace, &caller.origin, req.emails)
        .await?;
    Ok(Json(users.into()))
}

/// POST /0.4/users/search/{platform} - Users registered with the given
/// platform ids.
pub(crate) async fn search_platform(
    State(state): State<AppState>,
    caller: Caller,
    Path(platform): Path<String>,
    Payload(req): Payload<PlatformIdsRequest>,
) -> ApiResult<Json<UsersResponse>> {
    let users = state
        .controllers
        .users
        .list_by_platform_ids(&caller.namespace, &caller.origin, &platform, req.ids)
        .await?;
    Ok(Json(users.into()))
}
