//! Feed handlers.

use axum::Json;
use axum::extract::State;
use serde::Serialize;
use std::collections::HashMap;

use super::super::AppState;
use super::super::error::ApiResult;
use super::Caller;
use crate::controller::{Feed, Post, UserMap};
use crate::service::Event;

/// Any of the feeds; empty parts are omitted.
#[derive(Debug, Default, Serialize)]
pub struct FeedResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<Event>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub posts: Option<Vec<Post>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub posts_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_map: Option<HashMap<u64, Post>>,
    pub users: UserMap,
    pub users_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unread_events_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unread_posts_count: Option<usize>,
}

impl FeedResponse {
    fn events(feed: Feed) -> Self {
        Self {
            events_count: Some(feed.events.len()),
            events: Some(feed.events),
            post_map: Some(feed.post_map),
            users_count: feed.users.len(),
            users: feed.users,
            unread_events_count: Some(feed.unread_events),
            ..Default::default()
        }
    }

    fn posts(feed: Feed) -> Self {
        Self {
            posts_count: Some(feed.posts.len()),
            posts: Some(feed.posts),
            users_count: feed.users.len(),
            users: feed.users,
            unread_posts_count: Some(feed.unread_posts),
            ..Default::default()
        }
    }

    fn news(feed: Feed) -> Self {
        Self {
            events_count: Some(feed.events.len()),
            events: Some(feed.events),
            posts_count: Some(feed.posts.len()),
            posts: Some(feed.posts),
            post_map: Some(feed.post_map),
            users_count: feed.users.len(),
            users: feed.users,
            unread_events_count: Some(feed.unread_events),
            unread_posts_count: Some(feed.unread_posts),
        }
    }
}

/// GET /0.4/me/feed - Events and posts with unread counts.
pub(crate) async fn news(State(state): State<AppState>, caller: Caller) -> ApiResult<Json<FeedResponse>> {
    let feed = state.controllers.feed.news(&caller.namespace, &caller.origin).await?;
    Ok(Json(FeedResponse::news(feed)))
}

/// GET /0.4/me/feed/events - Events of the caller's graph.
pub(crate) async fn events(State(state): State<AppState>, caller: Caller) -> ApiResult<Json<FeedResponse>> {
    let feed = state.controllers.feed.events(&caller.namespace, &caller.origin).await?;
    Ok(Json(FeedResponse::events(feed)))
}

/// GET /0.4/me/feed/posts - Posts of the caller's graph.
pub(crate) async fn posts(State(state): State<AppState>, caller: Caller) -> ApiResult<Json<FeedResponse>> {
    let feed = state.controllers.feed.posts(&caller.namespace, &caller.origin).await?;
    Ok(Json(FeedResponse::posts(feed)))
}

/// GET /0.4/me/feed/notifications/self - Activity on the caller's content.
pub(crate) async fn notifications_self(
    State(state): State<AppState>,
    caller: Caller,
) -> ApiResult<Json<FeedResponse>> {
    let feed = state
        .controllers
        .feed
        .notifications_self(&caller.namespace, &caller.origin)
        .await?;
    Ok(Json(FeedResponse::events(feed)))
}
