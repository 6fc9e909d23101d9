// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Passenger wallet endpoints.
//!
//! Passenger wallets hold the same invariant as driver wallets (balance
//! never goes negative, debits are conditional updates) but produce no
//! driver transactions.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::rest::AuthClaims;
use crate::state::CoreState;
use crate::wallet;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmountRequest {
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditRideRequest {
    pub ride_id: String,
}

fn claims_user_id(claims: &AuthClaims) -> Result<Uuid> {
    claims.0.sub.parse().map_err(|_| CoreError::Unauthorized {
        reason: "token subject is not a passenger".to_string(),
    })
}

/// `GET /wallet/balance`
pub async fn balance(
    State(state): State<Arc<CoreState>>,
    claims: AuthClaims,
) -> Result<Json<Value>> {
    let user_id = claims_user_id(&claims)?;
    let user = state
        .store
        .get_user(user_id)
        .await?
        .ok_or_else(|| CoreError::NotFound {
            entity: "user",
            id: user_id.to_string(),
        })?;
    Ok(Json(json!({ "success": true, "balance": user.wallet })))
}

/// `POST /wallet/add-money`
pub async fn add_money(
    State(state): State<Arc<CoreState>>,
    claims: AuthClaims,
    Json(request): Json<AmountRequest>,
) -> Result<Json<Value>> {
    let user_id = claims_user_id(&claims)?;
    if request.amount <= 0 {
        return Err(CoreError::InvalidInput {
            field: "amount".to_string(),
            message: "must be positive".to_string(),
        });
    }
    let balance = wallet::credit_user(&state, user_id, request.amount).await?;
    Ok(Json(json!({ "success": true, "balance": balance })))
}

/// `POST /wallet/payment` (and `withdraw`)
pub async fn payment(
    State(state): State<Arc<CoreState>>,
    claims: AuthClaims,
    Json(request): Json<AmountRequest>,
) -> Result<Json<Value>> {
    let user_id = claims_user_id(&claims)?;
    if request.amount <= 0 {
        return Err(CoreError::InvalidInput {
            field: "amount".to_string(),
            message: "must be positive".to_string(),
        });
    }
    let balance = wallet::debit_user(&state, user_id, request.amount).await?;
    Ok(Json(json!({ "success": true, "balance": balance })))
}

/// `POST /wallet/credit-ride` - settle a completed ride's fare from the
/// passenger wallet after the fact (cash-free settlement fallback).
pub async fn credit_ride(
    State(state): State<Arc<CoreState>>,
    claims: AuthClaims,
    Json(request): Json<CreditRideRequest>,
) -> Result<Json<Value>> {
    let user_id = claims_user_id(&claims)?;
    let ride = state
        .store
        .get_ride(&request.ride_id)
        .await?
        .ok_or_else(|| CoreError::NotFound {
            entity: "ride",
            id: request.ride_id.clone(),
        })?;
    if ride.user_id != user_id {
        return Err(CoreError::Unauthorized {
            reason: "ride belongs to a different passenger".to_string(),
        });
    }
    let fare = ride.actual_fare.unwrap_or(ride.fare);
    let balance = wallet::debit_user(&state, user_id, fare).await?;
    Ok(Json(json!({
        "success": true,
        "balance": balance,
        "fare": fare,
    })))
}
