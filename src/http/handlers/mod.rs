//! HTTP API handlers organized by resource.

pub mod connection;
pub mod device;
pub mod event;
pub mod feed;
pub mod health;
pub mod post;
pub mod recommendation;
pub mod user;

use axum::Json;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::request::Parts;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::error::{ApiError, codes};
use super::middleware::AppContext;
use super::paging::Paging;
use crate::controller::Origin;
use crate::service::User;

/// JSON body whose rejections render as API errors.
pub struct Payload<T>(pub T);

impl<S, T> FromRequest<S> for Payload<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

/// Namespace and acting user of an authenticated request.
pub struct Caller {
    pub namespace: String,
    pub origin: Origin,
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let namespace = parts
            .extensions
            .get::<AppContext>()
            .map(|ctx| ctx.namespace.clone())
            .ok_or_else(|| ApiError::unauthorized(codes::APP_AUTH, "application user not found"))?;
        let origin = parts
            .extensions
            .get::<Origin>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized(codes::USER_SESSION, "session not found"))?;
        Ok(Self { namespace, origin })
    }
}

/// Parses a decimal id path segment.
pub(crate) fn parse_id(raw: &str, what: &str) -> Result<u64, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::bad_request(codes::GENERIC, format!("{what} id '{raw}' is malformed")))
}

/// Users list response.
#[derive(Debug, Serialize)]
pub struct UsersResponse {
    pub users: Vec<User>,
    pub users_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paging: Option<Paging>,
}

impl UsersResponse {
    #[must_use]
    pub fn with_paging(mut self, paging: Paging) -> Self {
        self.paging = Some(paging);
        self
    }
}

impl From<Vec<User>> for UsersResponse {
    fn from(users: Vec<User>) -> Self {
        Self {
            users_count: users.len(),
            users,
            paging: None,
        }
    }
}
