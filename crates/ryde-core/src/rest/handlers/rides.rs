// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Ride booking, reads and state transitions.
//!
//! `simple-complete` invokes the same completion protocol as the realtime
//! `driverCompletedRide`: identical side-effect ordering, identical events.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use ryde_protocol::events::{BookRide, DriverCompletedRide};
use ryde_protocol::Place;

use crate::dispatch;
use crate::error::{CoreError, Result};
use crate::rest::AuthClaims;
use crate::rides;
use crate::state::CoreState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideDriverRequest {
    pub ride_id: String,
    pub driver_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub ride_id: String,
    pub driver_id: String,
    pub otp: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleCompleteRequest {
    pub ride_id: String,
    pub driver_id: String,
    pub distance: f64,
    pub fare: Option<f64>,
    pub actual_pickup: Option<Place>,
    pub actual_drop: Option<Place>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub ride_id: String,
    pub reason: Option<String>,
}

/// `POST /rides/book-ride-enhanced` - same semantics as realtime `bookRide`.
pub async fn book_ride_enhanced(
    State(state): State<Arc<CoreState>>,
    _claims: AuthClaims,
    Json(request): Json<BookRide>,
) -> Result<Json<Value>> {
    let outcome = dispatch::handle_book_ride(&state, request).await?;
    Ok(Json(json!({
        "success": true,
        "rideId": outcome.raid_id,
        "internalId": outcome.internal_id,
        "otp": outcome.otp,
        "fare": outcome.fare,
        "vehicleType": outcome.vehicle_type,
        "driversFound": outcome.drivers_found,
        "alreadySent": outcome.already_sent,
    })))
}

/// `GET /rides/{rideId}` - ride record with the user snapshot populated.
pub async fn get_ride(
    State(state): State<Arc<CoreState>>,
    _claims: AuthClaims,
    Path(ride_id): Path<String>,
) -> Result<Json<Value>> {
    let ride = state
        .store
        .get_ride(&ride_id)
        .await?
        .ok_or_else(|| CoreError::NotFound {
            entity: "ride",
            id: ride_id,
        })?;
    Ok(Json(json!({ "success": true, "ride": ride })))
}

/// `POST /rides/arrived`
pub async fn arrived(
    State(state): State<Arc<CoreState>>,
    claims: AuthClaims,
    Json(request): Json<RideDriverRequest>,
) -> Result<Json<Value>> {
    claims.require_subject(&request.driver_id)?;
    rides::handle_arrived(&state, &request.ride_id, &request.driver_id).await?;
    Ok(Json(json!({ "success": true, "status": "arrived" })))
}

/// `POST /rides/start`
pub async fn start(
    State(state): State<Arc<CoreState>>,
    claims: AuthClaims,
    Json(request): Json<StartRequest>,
) -> Result<Json<Value>> {
    claims.require_subject(&request.driver_id)?;
    rides::handle_start(
        &state,
        &request.ride_id,
        &request.driver_id,
        request.otp.as_deref(),
    )
    .await?;
    Ok(Json(json!({ "success": true, "status": "started" })))
}

/// `POST /rides/simple-complete` - completion fallback for flaky realtime
/// connections.
pub async fn simple_complete(
    State(state): State<Arc<CoreState>>,
    claims: AuthClaims,
    Json(request): Json<SimpleCompleteRequest>,
) -> Result<Json<Value>> {
    claims.require_subject(&request.driver_id)?;
    let outcome = rides::handle_complete(
        &state,
        DriverCompletedRide {
            ride_id: request.ride_id,
            driver_id: request.driver_id,
            distance: request.distance,
            fare: request.fare,
            actual_pickup: request.actual_pickup,
            actual_drop: request.actual_drop,
        },
    )
    .await?;
    Ok(Json(json!({
        "success": true,
        "rideId": outcome.raid_id,
        "fare": outcome.fare,
        "distanceKm": outcome.distance_km,
        "newWalletBalance": outcome.driver_balance,
    })))
}

/// `POST /rides/cancel` - permitted from pending/accepted/arrived.
pub async fn cancel(
    State(state): State<Arc<CoreState>>,
    _claims: AuthClaims,
    Json(request): Json<CancelRequest>,
) -> Result<Json<Value>> {
    rides::handle_cancel(&state, &request.ride_id, request.reason.as_deref()).await?;
    Ok(Json(json!({ "success": true, "status": "cancelled" })))
}
