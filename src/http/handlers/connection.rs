//! Connection handlers.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use super::super::AppState;
use super::super::error::ApiResult;
use super::super::paging::PageParams;
use super::{Caller, Payload, UsersResponse, parse_id};
use crate::controller::{Page, UserMap};
use crate::service::{Connection, ConnectionState, ConnectionType, User};

#[derive(Debug, Deserialize)]
pub struct SocialRequest {
    pub platform: String,
    #[serde(default)]
    pub connection_ids: Vec<String>,
    #[serde(rename = "type")]
    pub kind: ConnectionType,
    #[serde(default)]
    pub state: Option<ConnectionState>,
}

#[derive(Debug, Serialize)]
pub struct ConnectionsResponse {
    pub incoming: Vec<Connection>,
    pub outgoing: Vec<Connection>,
    pub users: Vec<User>,
    pub incoming_connections_count: usize,
    pub outgoing_connections_count: usize,
    pub users_count: usize,
}

/// PUT /0.4/me/connections - Create or transition a connection.
pub(crate) async fn update(
    State(state): State<AppState>,
    caller: Caller,
    Payload(con): Payload<Connection>,
) -> ApiResult<Json<Connection>> {
    let con = state
        .controllers
        .connections
        .update(&caller.namespace, &caller.origin, con)
        .await?;
    Ok(Json(con))
}

/// DELETE /0.4/me/connections/{type}/{userID} - Remove a connection.
pub(crate) async fn delete(
    State(state): State<AppState>,
    caller: Caller,
    Path((kind, user_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let kind: ConnectionType = kind.parse()?;
    let to_id = parse_id(&user_id, "user")?;
    state
        .controllers
        .connections
        .delete(&caller.namespace, &caller.origin, kind, to_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /0.4/me/connections/social - Connect to users known by platform ids.
pub(crate) async fn social(
    State(state): State<AppState>,
    caller: Caller,
    Payload(req): Payload<SocialRequest>,
) -> ApiResult<(StatusCode, Json<UsersResponse>)> {
    let default_state = match req.kind {
        ConnectionType::Follow => ConnectionState::Confirmed,
        ConnectionType::Friend => ConnectionState::Pending,
    };
    let users = state
        .controllers
        .connections
        .create_social(
            &caller.namespace,
            &caller.origin,
            &req.platform,
            req.connection_ids,
            req.kind,
            req.state.unwrap_or(default_state),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(users.into())))
}

/// GET /0.4/me/connections/{state} - Incoming and outgoing connections.
pub(crate) async fn by_state(
    State(state): State<AppState>,
    caller: Caller,
    Path(raw_state): Path<String>,
) -> ApiResult<Json<ConnectionsResponse>> {
    let con_state: ConnectionState = raw_state.parse()?;
    let listing = state
        .controllers
        .connections
        .by_state(&caller.namespace, &caller.origin, con_state)
        .await?;

    let me = caller.origin.user_id;
    let (incoming, outgoing): (Vec<_>, Vec<_>) = listing.items.into_iter().partition(|c| c.to_id == me);
    let users = into_users(listing.users);
    Ok(Json(ConnectionsResponse {
        incoming_connections_count: incoming.len(),
        outgoing_connections_count: outgoing.len(),
        users_count: users.len(),
        incoming,
        outgoing,
        users,
    }))
}

fn into_users(map: UserMap) -> Vec<User> {
    let mut users: Vec<User> = map.into_values().collect();
    users.sort_by_key(|u| u.id);
    users
}

#[derive(Debug, Clone, Copy)]
enum List {
    Followers,
    Followings,
    Friends,
}

async fn list(
    state: &AppState,
    caller: &Caller,
    user_id: u64,
    page: Page,
    which: List,
) -> ApiResult<Json<UsersResponse>> {
    let connections = &state.controllers.connections;
    let (ns, origin) = (&caller.namespace, &caller.origin);
    let users = match which {
        List::Followers => connections.followers(ns, origin, user_id, page).await?,
        List::Followings => connections.followings(ns, origin, user_id, page).await?,
        List::Friends => connections.friends(ns, origin, user_id, page).await?,
    };
    Ok(Json(users.into()))
}

/// GET /0.4/me/followers
pub(crate) async fn my_followers(
    State(state): State<AppState>,
    caller: Caller,
    Query(paging): Query<PageParams>,
) -> ApiResult<Json<UsersResponse>> {
    let me = caller.origin.user_id;
    list(&state, &caller, me, paging.page()?, List::Followers).await
}

/// GET /0.4/me/follows
pub(crate) async fn my_followings(
    State(state): State<AppState>,
    caller: Caller,
    Query(paging): Query<PageParams>,
) -> ApiResult<Json<UsersResponse>> {
    let me = caller.origin.user_id;
    list(&state, &caller, me, paging.page()?, List::Followings).await
}

/// GET /0.4/me/friends
pub(crate) async fn my_friends(
    State(state): State<AppState>,
    caller: Caller,
    Query(paging): Query<PageParams>,
) -> ApiResult<Json<UsersResponse>> {
    let me = caller.origin.user_id;
    list(&state, &caller, me, paging.page()?, List::Friends).await
}

/// GET /0.4/users/{userID}/followers
pub(crate) async fn user_followers(
    State(state): State<AppState>,
    caller: Caller,
    Path(user_id): Path<String>,
    Query(paging): Query<PageParams>,
) -> ApiResult<Json<UsersResponse>> {
    let id = parse_id(&user_id, "user")?;
    list(&state, &caller, id, paging.page()?, List::Followers).await
}

/// GET /0.4/users/{userID}/follows
pub(crate) async fn user_followings(
    State(state): State<AppState>,
    caller: Caller,
    Path(user_id): Path<String>,
    Query(paging): Query<PageParams>,
) -> ApiResult<Json<UsersResponse>> {
    let id = parse_id(&user_id, "user")?;
    list(&state, &caller, id, paging.page()?, List::Followings).await
}

/// GET /0.4/users/{userID}/friends
pub(crate) async fn user_friends(
    State(state): State<AppState>,
    caller: Caller,
    Path(user_id): Path<String>,
    Query(paging): Query<PageParams>,
) -> ApiResult<Json<UsersResponse>> {
    let id = parse_id(&user_id, "user")?;
    list(&state, &caller, id, paging.page()?, List::Friends).await
}
