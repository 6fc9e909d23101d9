// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Administrative writes: pricing and direct wallet adjustments.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use ryde_protocol::{ServerEvent, TransactionKind, TransactionMethod, VehicleType};

use crate::error::{CoreError, Result};
use crate::rest::AuthClaims;
use crate::state::CoreState;
use crate::wallet;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceRequest {
    pub vehicle_type: VehicleType,
    pub price_per_km: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectWalletRequest {
    pub amount: i64,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub method: Option<TransactionMethod>,
    pub description: Option<String>,
}

/// `GET /admin/ride-prices` - the one read served from cache.
pub async fn get_ride_prices(
    State(state): State<Arc<CoreState>>,
    claims: AuthClaims,
) -> Result<Json<Value>> {
    claims.require_admin()?;
    Ok(Json(json!({ "success": true, "prices": state.pricing.table() })))
}

/// `POST /admin/ride-prices` - persist, swap the cache snapshot, broadcast.
pub async fn set_ride_price(
    State(state): State<Arc<CoreState>>,
    claims: AuthClaims,
    Json(request): Json<PriceRequest>,
) -> Result<Json<Value>> {
    claims.require_admin()?;
    if request.price_per_km <= 0 {
        return Err(CoreError::InvalidInput {
            field: "pricePerKm".to_string(),
            message: "must be positive".to_string(),
        });
    }

    state
        .store
        .upsert_price(request.vehicle_type, request.price_per_km)
        .await?;
    let table = state.pricing.update(request.vehicle_type, request.price_per_km);
    state
        .rooms
        .broadcast_all(&ServerEvent::PriceUpdate(table.clone()));

    Ok(Json(json!({ "success": true, "prices": table })))
}

/// `POST /admin/direct-wallet/{driverId}` - ledger adjustment with a paired
/// transaction, like every other wallet mutation.
pub async fn direct_wallet(
    State(state): State<Arc<CoreState>>,
    claims: AuthClaims,
    Path(driver_id): Path<String>,
    Json(request): Json<DirectWalletRequest>,
) -> Result<Json<Value>> {
    claims.require_admin()?;
    if request.amount <= 0 {
        return Err(CoreError::InvalidInput {
            field: "amount".to_string(),
            message: "must be positive".to_string(),
        });
    }

    let description = request
        .description
        .unwrap_or_else(|| "Admin wallet adjustment".to_string());
    let outcome = match request.kind {
        TransactionKind::Credit => {
            let method = request.method.unwrap_or(TransactionMethod::AdminCredit);
            wallet::credit(&state, &driver_id, request.amount, method, &description, None).await?
        }
        TransactionKind::Debit => {
            let method = request.method.unwrap_or(TransactionMethod::AdminDebit);
            wallet::debit(&state, &driver_id, request.amount, method, &description, None).await?
        }
    };

    Ok(Json(json!({
        "success": true,
        "newWalletBalance": outcome.balance,
        "transactionId": outcome.txn_id,
    })))
}
