//! Event handlers.

use axum::Json;
use axum::extract::{OriginalUri, Path, Query, State};
use axum::http::StatusCode;
use serde::Serialize;

use super::super::AppState;
use super::super::error::ApiResult;
use super::super::paging::{PageParams, Paging};
use super::{Caller, Payload, parse_id};
use crate::controller::UserMap;
use crate::service::Event;

#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub events: Vec<Event>,
    pub events_count: usize,
    pub users: UserMap,
    pub users_count: usize,
    pub paging: Paging,
}

/// POST /0.4/me/events - Create an event of the current user.
pub(crate) async fn create(
    State(state): State<AppState>,
    caller: Caller,
    Payload(event): Payload<Event>,
) -> ApiResult<(StatusCode, Json<Event>)> {
    let event = state
        .controllers
        .events
        .create(&caller.namespace, &caller.origin, event)
        .await?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// PUT /0.4/me/events/{eventID} - Update an own event.
pub(crate) async fn update(
    State(state): State<AppState>,
    caller: Caller,
    Path(event_id): Path<String>,
    Payload(event): Payload<Event>,
) -> ApiResult<Json<Event>> {
    let id = parse_id(&event_id, "event")?;
    let event = state
        .controllers
        .events
        .update(&caller.namespace, &caller.origin, id, event)
        .await?;
    Ok(Json(event))
}

/// DELETE /0.4/me/events/{eventID} - Delete an own event.
pub(crate) async fn delete(
    State(state): State<AppState>,
    caller: Caller,
    Path(event_id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&event_id, "event")?;
    state
        .controllers
        .events
        .delete(&caller.namespace, &caller.origin, id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /0.4/me/events - Events of the current user.
pub(crate) async fn list_me(
    State(state): State<AppState>,
    caller: Caller,
    OriginalUri(uri): OriginalUri,
    Query(paging): Query<PageParams>,
) -> ApiResult<Json<EventsResponse>> {
    let page = paging.page()?;
    let listing = state
        .controllers
        .events
        .list_me(&caller.namespace, &caller.origin, page)
        .await?;
    Ok(Json(EventsResponse {
        paging: Paging::new(&uri, &page, listing.items.iter().map(|e| e.created_at)),
        events_count: listing.items.len(),
        users_count: listing.users.len(),
        events: listing.items,
        users: listing.users,
    }))
}

/// GET /0.4/users/{userID}/events - Events of a user visible to the caller.
pub(crate) async fn list_user(
    State(state): State<AppState>,
    caller: Caller,
    OriginalUri(uri): OriginalUri,
    Path(user_id): Path<String>,
    Query(paging): Query<PageParams>,
) -> ApiResult<Json<EventsResponse>> {
    let id = parse_id(&user_id, "user")?;
    let page = paging.page()?;
    let listing = state
        .controllers
        .events
        .list_user(&caller.namespace, &caller.origin, id, page)
        .await?;
    Ok(Json(EventsResponse {
        paging: Paging::new(&uri, &page, listing.items.iter().map(|e| e.created_at)),
        events_count: listing.items.len(),
        users_count: listing.users.len(),
        events: listing.items,
        users: listing.users,
    }))
}
