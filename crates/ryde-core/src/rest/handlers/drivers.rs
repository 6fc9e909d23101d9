// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Driver reads and working-hours verbs.
//!
//! The working-hours endpoints invoke the same service functions as the
//! realtime `driverGoOnline`/`driverOffline` events; the decision tree
//! lives in one place.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use ryde_protocol::DriverStatus;

use crate::error::{CoreError, Result};
use crate::rest::AuthClaims;
use crate::state::CoreState;
use crate::working_hours;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverIdRequest {
    pub driver_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendRequest {
    pub driver_id: String,
    pub additional_hours: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FcmTokenRequest {
    pub driver_id: String,
    pub fcm_token: String,
}

/// `GET /drivers/{driverId}`
pub async fn get_driver(
    State(state): State<Arc<CoreState>>,
    claims: AuthClaims,
    Path(driver_id): Path<String>,
) -> Result<Json<Value>> {
    claims.require_subject(&driver_id)?;
    let driver = state
        .store
        .get_driver(&driver_id)
        .await?
        .ok_or_else(|| CoreError::NotFound {
            entity: "driver",
            id: driver_id,
        })?;
    Ok(Json(json!({ "success": true, "driver": driver })))
}

/// `PATCH /drivers/{driverId}/status`
pub async fn update_status(
    State(state): State<Arc<CoreState>>,
    claims: AuthClaims,
    Path(driver_id): Path<String>,
    Json(request): Json<StatusRequest>,
) -> Result<Json<Value>> {
    claims.require_subject(&driver_id)?;
    let status: DriverStatus = request.status.parse().map_err(|_| CoreError::InvalidInput {
        field: "status".to_string(),
        message: format!("unknown status '{}'", request.status),
    })?;
    state.store.update_driver_status(&driver_id, status).await?;
    state.presence.set_status(&driver_id, status);
    Ok(Json(json!({ "success": true, "status": status.as_str() })))
}

/// `POST /drivers/fcm-token`
pub async fn update_fcm_token(
    State(state): State<Arc<CoreState>>,
    claims: AuthClaims,
    Json(request): Json<FcmTokenRequest>,
) -> Result<Json<Value>> {
    claims.require_subject(&request.driver_id)?;
    state
        .store
        .update_driver_push_token(&request.driver_id, &request.fcm_token)
        .await?;
    Ok(Json(json!({ "success": true })))
}

/// `POST /drivers/working-hours/start` (and `resume`)
pub async fn working_hours_start(
    State(state): State<Arc<CoreState>>,
    claims: AuthClaims,
    Json(request): Json<DriverIdRequest>,
) -> Result<Json<Value>> {
    claims.require_subject(&request.driver_id)?;
    let outcome = working_hours::start(&state, &request.driver_id).await?;
    Ok(Json(json!({
        "success": true,
        "amountDeducted": outcome.amount_deducted,
        "remainingSeconds": outcome.remaining_seconds,
        "resumed": outcome.resumed,
        "newWalletBalance": outcome.new_balance,
    })))
}

/// `POST /drivers/working-hours/stop` (and `pause`)
pub async fn working_hours_stop(
    State(state): State<Arc<CoreState>>,
    claims: AuthClaims,
    Json(request): Json<DriverIdRequest>,
) -> Result<Json<Value>> {
    claims.require_subject(&request.driver_id)?;
    let remaining = working_hours::stop(&state, &request.driver_id).await?;
    Ok(Json(json!({ "success": true, "remainingSeconds": remaining })))
}

/// `POST /drivers/working-hours/extend`
pub async fn working_hours_extend(
    State(state): State<Arc<CoreState>>,
    claims: AuthClaims,
    Json(request): Json<ExtendRequest>,
) -> Result<Json<Value>> {
    claims.require_subject(&request.driver_id)?;
    let outcome =
        working_hours::extend(&state, &request.driver_id, request.additional_hours).await?;
    Ok(Json(json!({
        "success": true,
        "amountDeducted": outcome.amount_deducted,
        "remainingSeconds": outcome.remaining_seconds,
        "newWalletBalance": outcome.new_balance,
    })))
}

/// `POST /drivers/working-hours/add-half-time`
pub async fn working_hours_add_half(
    State(state): State<Arc<CoreState>>,
    claims: AuthClaims,
    Json(request): Json<DriverIdRequest>,
) -> Result<Json<Value>> {
    claims.require_subject(&request.driver_id)?;
    let outcome = working_hours::add_time(&state, &request.driver_id, false).await?;
    Ok(Json(json!({
        "success": true,
        "amountDeducted": outcome.amount_deducted,
        "remainingSeconds": outcome.remaining_seconds,
        "newWalletBalance": outcome.new_balance,
    })))
}

/// `POST /drivers/working-hours/add-full-time`
pub async fn working_hours_add_full(
    State(state): State<Arc<CoreState>>,
    claims: AuthClaims,
    Json(request): Json<DriverIdRequest>,
) -> Result<Json<Value>> {
    claims.require_subject(&request.driver_id)?;
    let outcome = working_hours::add_time(&state, &request.driver_id, true).await?;
    Ok(Json(json!({
        "success": true,
        "amountDeducted": outcome.amount_deducted,
        "remainingSeconds": outcome.remaining_seconds,
        "newWalletBalance": outcome.new_balance,
    })))
}

/// `GET /drivers/working-hours/status/{driverId}`
pub async fn working_hours_status(
    State(state): State<Arc<CoreState>>,
    claims: AuthClaims,
    Path(driver_id): Path<String>,
) -> Result<Json<Value>> {
    claims.require_subject(&driver_id)?;
    let snapshot = working_hours::status_snapshot(&state, &driver_id).await?;
    Ok(Json(json!({ "success": true, "workingHours": snapshot })))
}

/// `GET /drivers/{driverId}/transactions`
pub async fn list_transactions(
    State(state): State<Arc<CoreState>>,
    claims: AuthClaims,
    Path(driver_id): Path<String>,
) -> Result<Json<Value>> {
    claims.require_subject(&driver_id)?;
    let transactions = state.store.list_transactions(&driver_id, 50).await?;
    Ok(Json(json!({ "success": true, "transactions": transactions })))
}
