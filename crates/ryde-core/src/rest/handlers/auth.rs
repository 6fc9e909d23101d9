// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Auth bootstrap handlers.
//!
//! Phone-OTP identity verification is an external trusted assertion: the
//! upstream identity provider confirms the phone, these endpoints only look
//! the driver up and mint the session token.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::auth::Role;
use crate::error::{CoreError, Result};
use crate::state::CoreState;

/// Session token lifetime: 30 days.
const TOKEN_TTL_SECONDS: i64 = 30 * 24 * 3600;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhoneRequest {
    pub phone_number: String,
}

/// `POST /auth/request-driver-otp`
pub async fn request_driver_otp(
    State(state): State<Arc<CoreState>>,
    Json(request): Json<PhoneRequest>,
) -> Result<Json<Value>> {
    if request.phone_number.trim().is_empty() {
        return Err(CoreError::InvalidInput {
            field: "phoneNumber".to_string(),
            message: "required".to_string(),
        });
    }
    let driver = state
        .store
        .get_driver_by_phone(&request.phone_number)
        .await?
        .ok_or_else(|| CoreError::NotFound {
            entity: "driver",
            id: request.phone_number.clone(),
        })?;

    // Delivery of the OTP itself happens in the external identity provider.
    Ok(Json(json!({
        "success": true,
        "driverId": driver.driver_id,
        "message": "OTP sent",
    })))
}

/// `POST /auth/get-complete-driver-info`
pub async fn get_complete_driver_info(
    State(state): State<Arc<CoreState>>,
    Json(request): Json<PhoneRequest>,
) -> Result<Json<Value>> {
    let driver = state
        .store
        .get_driver_by_phone(&request.phone_number)
        .await?
        .ok_or_else(|| CoreError::NotFound {
            entity: "driver",
            id: request.phone_number.clone(),
        })?;

    let token = state
        .tokens
        .mint(&driver.driver_id, Role::Driver, TOKEN_TTL_SECONDS)?;

    Ok(Json(json!({
        "success": true,
        "token": token,
        "driver": driver,
    })))
}
