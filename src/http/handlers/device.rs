//! Device handlers.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;

use super::super::AppState;
use super::super::error::ApiResult;
use super::{Caller, Payload};
use crate::service::{Device, Platform};

#[derive(Debug, Deserialize)]
pub struct DeviceRequest {
    pub platform: Platform,
    pub token: String,
    #[serde(default)]
    pub language: String,
}

/// PUT /0.4/me/devices/{deviceID} - Register or refresh a push device.
pub(crate) async fn update(
    State(state): State<AppState>,
    caller: Caller,
    Path(device_id): Path<String>,
    Payload(req): Payload<DeviceRequest>,
) -> ApiResult<Json<Device>> {
    let device = state
        .controllers
        .devices
        .update(
            &caller.namespace,
            &caller.origin,
            &device_id,
            req.platform,
            &req.token,
            &req.language,
        )
        .await?;
    Ok(Json(device))
}

/// DELETE /0.4/me/devices/{deviceID} - Remove a push device.
pub(crate) async fn delete(
    State(state): State<AppState>,
    caller: Caller,
    Path(device_id): Path<String>,
) -> ApiResult<StatusCode> {
    state
        .controllers
        .devices
        .delete(&caller.namespace, &caller.origin, &device_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
