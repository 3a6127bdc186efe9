//! Recommendation handlers.

use axum::Json;
use axum::extract::{Path, State};

use super::super::AppState;
use super::super::error::ApiResult;
use super::{Caller, UsersResponse};
use crate::controller::Period;

/// GET /0.4/recommendations/users/active/{period} - Active users the caller
/// is not connected to.
pub(crate) async fn users_active(
    State(state): State<AppState>,
    caller: Caller,
    Path(period): Path<String>,
) -> ApiResult<Json<UsersResponse>> {
    let period: Period = period.parse()?;
    let users = state
        .controllers
        .recommendations
        .users_active(&caller.namespace, &caller.origin, period)
        .await?;
    Ok(Json(users.into()))
}
