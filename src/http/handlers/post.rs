//! Post, comment and like handlers.

use axum::Json;
use axum::extract::{OriginalUri, Path, Query, State};
use axum::http::StatusCode;
use serde::Serialize;

use super::super::AppState;
use super::super::error::{ApiError, ApiResult};
use super::super::paging::{PageParams, Paging};
use super::{Caller, Payload, parse_id};
use crate::controller::{Listing, Page, Post, UserMap};
use crate::service::{Event, Object};

#[derive(Debug, Serialize)]
pub struct PostsResponse {
    pub posts: Vec<Post>,
    pub posts_count: usize,
    pub users: UserMap,
    pub users_count: usize,
    pub paging: Paging,
}

#[derive(Debug, Serialize)]
pub struct CommentsResponse {
    pub comments: Vec<Object>,
    pub comments_count: usize,
    pub users: UserMap,
    pub users_count: usize,
    pub paging: Paging,
}

#[derive(Debug, Serialize)]
pub struct LikesResponse {
    pub likes: Vec<Event>,
    pub likes_count: usize,
    pub users: UserMap,
    pub users_count: usize,
    pub paging: Paging,
}

fn posts_response(uri: &axum::http::Uri, page: &Page, listing: Listing<Post>) -> PostsResponse {
    PostsResponse {
        paging: Paging::new(uri, page, listing.items.iter().map(|p| p.object.created_at)),
        posts_count: listing.items.len(),
        users_count: listing.users.len(),
        posts: listing.items,
        users: listing.users,
    }
}

/// POST /0.4/posts - Create a post.
pub(crate) async fn create(
    State(state): State<AppState>,
    caller: Caller,
    Payload(post): Payload<Object>,
) -> ApiResult<(StatusCode, Json<Post>)> {
    let post = state
        .controllers
        .posts
        .create(&caller.namespace, &caller.origin, post)
        .await?;
    Ok((StatusCode::CREATED, Json(post)))
}

/// GET /0.4/posts - Public and global posts.
pub(crate) async fn list_all(
    State(state): State<AppState>,
    caller: Caller,
    OriginalUri(uri): OriginalUri,
    Query(paging): Query<PageParams>,
) -> ApiResult<Json<PostsResponse>> {
    let page = paging.page()?;
    let listing = state
        .controllers
        .posts
        .list_all(&caller.namespace, &caller.origin, page)
        .await?;
    Ok(Json(posts_response(&uri, &page, listing)))
}

/// GET /0.4/me/posts - Posts of the current user.
pub(crate) async fn list_me(
    State(state): State<AppState>,
    caller: Caller,
    OriginalUri(uri): OriginalUri,
    Query(paging): Query<PageParams>,
) -> ApiResult<Json<PostsResponse>> {
    let page = paging.page()?;
    let listing = state
        .controllers
        .posts
        .list_user(&caller.namespace, &caller.origin, caller.origin.user_id, page)
        .await?;
    Ok(Json(posts_response(&uri, &page, listing)))
}

/// GET /0.4/users/{userID}/posts - Posts of a user visible to the caller.
pub(crate) async fn list_user(
    State(state): State<AppState>,
    caller: Caller,
    OriginalUri(uri): OriginalUri,
    Path(user_id): Path<String>,
    Query(paging): Query<PageParams>,
) -> ApiResult<Json<PostsResponse>> {
    let id = parse_id(&user_id, "user")?;
    let page = paging.page()?;
    let listing = state
        .controllers
        .posts
        .list_user(&caller.namespace, &caller.origin, id, page)
        .await?;
    Ok(Json(posts_response(&uri, &page, listing)))
}

/// GET /0.4/posts/{postID} - A single post.
pub(crate) async fn retrieve(
    State(state): State<AppState>,
    caller: Caller,
    Path(post_id): Path<String>,
) -> ApiResult<Json<Post>> {
    let id = parse_id(&post_id, "post")?;
    let listing = state
        .controllers
        .posts
        .retrieve(&caller.namespace, &caller.origin, id)
        .await?;
    listing
        .items
        .into_iter()
        .next()
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("post {id}")))
}

/// PUT /0.4/posts/{postID} - Update an own post.
pub(crate) async fn update(
    State(state): State<AppState>,
    caller: Caller,
    Path(post_id): Path<String>,
    Payload(post): Payload<Object>,
) -> ApiResult<Json<Post>> {
    let id = parse_id(&post_id, "post")?;
    let post = state
        .controllers
        .posts
        .update(&caller.namespace, &caller.origin, id, post)
        .await?;
    Ok(Json(post))
}

/// DELETE /0.4/posts/{postID} - Delete an own post.
pub(crate) async fn delete(
    State(state): State<AppState>,
    caller: Caller,
    Path(post_id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&post_id, "post")?;
    state
        .controllers
        .posts
        .delete(&caller.namespace, &caller.origin, id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /0.4/posts/{postID}/comments - Comment on a post.
pub(crate) async fn comment_create(
    State(state): State<AppState>,
    caller: Caller,
    Path(post_id): Path<String>,
    Payload(comment): Payload<Object>,
) -> ApiResult<(StatusCode, Json<Object>)> {
    let post_id = parse_id(&post_id, "post")?;
    let comment = state
        .controllers
        .comments
        .create(&caller.namespace, &caller.origin, post_id, comment)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// GET /0.4/posts/{postID}/comments - Comments of a post.
pub(crate) async fn comment_list(
    State(state): State<AppState>,
    caller: Caller,
    OriginalUri(uri): OriginalUri,
    Path(post_id): Path<String>,
    Query(paging): Query<PageParams>,
) -> ApiResult<Json<CommentsResponse>> {
    let post_id = parse_id(&post_id, "post")?;
    let page = paging.page()?;
    let listing = state
        .controllers
        .comments
        .list(&caller.namespace, &caller.origin, post_id, page)
        .await?;
    Ok(Json(CommentsResponse {
        paging: Paging::new(&uri, &page, listing.items.iter().map(|c| c.created_at)),
        comments_count: listing.items.len(),
        users_count: listing.users.len(),
        comments: listing.items,
        users: listing.users,
    }))
}

/// GET /0.4/posts/{postID}/comments/{commentID} - An own comment.
pub(crate) async fn comment_retrieve(
    State(state): State<AppState>,
    caller: Caller,
    Path((post_id, comment_id)): Path<(String, String)>,
) -> ApiResult<Json<Object>> {
    let post_id = parse_id(&post_id, "post")?;
    let id = parse_id(&comment_id, "comment")?;
    let comment = state
        .controllers
        .comments
        .retrieve(&caller.namespace, &caller.origin, post_id, id)
        .await?;
    Ok(Json(comment))
}

/// PUT /0.4/posts/{postID}/comments/{commentID} - Edit an own comment.
pub(crate) async fn comment_update(
    State(state): State<AppState>,
    caller: Caller,
    Path((post_id, comment_id)): Path<(String, String)>,
    Payload(comment): Payload<Object>,
) -> ApiResult<Json<Object>> {
    let post_id = parse_id(&post_id, "post")?;
    let id = parse_id(&comment_id, "comment")?;
    let comment = state
        .controllers
        .comments
        .update(&caller.namespace, &caller.origin, post_id, id, comment)
        .await?;
    Ok(Json(comment))
}

/// DELETE /0.4/posts/{postID}/comments/{commentID} - Delete an own comment.
pub(crate) async fn comment_delete(
    State(state): State<AppState>,
    caller: Caller,
    Path((post_id, comment_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let post_id = parse_id(&post_id, "post")?;
    let id = parse_id(&comment_id, "comment")?;
    state
        .controllers
        .comments
        .delete(&caller.namespace, &caller.origin, post_id, id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /0.4/posts/{postID}/likes - Like a post.
pub(crate) async fn like_create(
    State(state): State<AppState>,
    caller: Caller,
    Path(post_id): Path<String>,
) -> ApiResult<(StatusCode, Json<Event>)> {
    let post_id = parse_id(&post_id, "post")?;
    let like = state
        .controllers
        .likes
        .create(&caller.namespace, &caller.origin, post_id)
        .await?;
    Ok((StatusCode::CREATED, Json(like)))
}

/// DELETE /0.4/posts/{postID}/likes - Withdraw a like.
pub(crate) async fn like_delete(
    State(state): State<AppState>,
    caller: Caller,
    Path(post_id): Path<String>,
) -> ApiResult<StatusCode> {
    let post_id = parse_id(&post_id, "post")?;
    state
        .controllers
        .likes
        .delete(&caller.namespace, &caller.origin, post_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /0.4/posts/{postID}/likes - Likes of a post.
pub(crate) async fn like_list(
    State(state): State<AppState>,
    caller: Caller,
    OriginalUri(uri): OriginalUri,
    Path(post_id): Path<String>,
    Query(paging): Query<PageParams>,
) -> ApiResult<Json<LikesResponse>> {
    let post_id = parse_id(&post_id, "post")?;
    let page = paging.page()?;
    let listing = state
        .controllers
        .likes
        .list(&caller.namespace, &caller.origin, post_id, page)
        .await?;
    Ok(Json(LikesResponse {
        paging: Paging::new(&uri, &page, listing.items.iter().map(|l| l.created_at)),
        likes_count: listing.items.len(),
        users_count: listing.users.len(),
        likes: listing.items,
        users: listing.users,
    }))
}
