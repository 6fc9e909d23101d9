// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Dispatch engine: booking fan-out and acceptance arbitration.
//!
//! Fan-out is strictly vehicle-type scoped: `newRideRequest` goes to the
//! `drivers_<vehicleType>` room exactly once, never to a global drivers
//! room. A payload fingerprint suppresses repeated fan-out for retried
//! submissions within the dedup window and answers the retry with the
//! already-allocated ride. Acceptance is a transactional CAS on the ride
//! row; reads-before-write are never trusted.

use chrono::Utc;
use rand::Rng;
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use ryde_protocol::events::{
    AcceptRide, BookRide, DriverRejectedRide, NewRideRequest, RideAccepted, RideAlreadyAccepted,
};
use ryde_protocol::{RideStatus, ServerEvent, VehicleType};

use crate::error::{CoreError, Result};
use crate::gateway::rooms::{user_room, SessionId};
use crate::model::{booking_fingerprint, ActiveRide, DedupEntry, Rejection, RideRecord};
use crate::push::PushMessage;
use crate::ride_id;
use crate::state::CoreState;

/// Window during which a repeated identical submission is suppressed.
pub const DEDUP_WINDOW: Duration = Duration::from_secs(5);

/// What `bookRide` returns to the caller.
#[derive(Debug, Clone)]
pub struct BookingOutcome {
    pub raid_id: String,
    pub internal_id: Uuid,
    pub otp: String,
    pub fare: i64,
    pub vehicle_type: VehicleType,
    pub drivers_found: usize,
    pub already_sent: bool,
}

/// Handle `bookRide`.
#[instrument(skip(state, request), fields(user = %request.user, vehicle_type = %request.vehicle_type))]
pub async fn handle_book_ride(state: &CoreState, request: BookRide) -> Result<BookingOutcome> {
    if request.user.trim().is_empty() {
        return Err(CoreError::InvalidInput {
            field: "user".to_string(),
            message: "required".to_string(),
        });
    }
    if !request.distance.is_finite() || request.distance < 0.0 {
        return Err(CoreError::InvalidInput {
            field: "distance".to_string(),
            message: "must be a non-negative number".to_string(),
        });
    }

    let vehicle_type = request.vehicle_type;

    // Resolve the passenger: internal uuid, or external customer id.
    let (user_id, customer_id) = resolve_user(state, &request).await?;

    // A retried identical submission within the window resolves to the ride
    // it already created; no second fan-out.
    let fingerprint = booking_fingerprint(&request.user, &request.pickup, &request.drop, vehicle_type);
    if let Some(entry) = state.dedup.get(&fingerprint) {
        if entry.last_emitted_at.elapsed() < DEDUP_WINDOW {
            info!(raid_id = %entry.raid_id, "duplicate booking suppressed");
            return Ok(BookingOutcome {
                raid_id: entry.raid_id.clone(),
                internal_id: entry.internal_id,
                otp: entry.otp.clone(),
                fare: entry.fare,
                vehicle_type,
                drivers_found: state.rooms.room_size(&vehicle_type.room()),
                already_sent: true,
            });
        }
    }

    let fare = state.pricing.calculate_fare(vehicle_type, request.distance);
    let otp = derive_otp(customer_id.as_deref());
    let payment_method = request.payment_method.unwrap_or_default();

    // Allocate and insert; a duplicate raid_id (fallback allocator
    // collision) is retried once with a fresh id.
    let mut ride = RideRecord {
        id: Uuid::new_v4(),
        raid_id: ride_id::next_raid_id(state.store.as_ref()).await?,
        user_id,
        customer_id: customer_id.clone(),
        user_name: request.user_name.clone(),
        user_phone: request.user_mobile.clone(),
        vehicle_type,
        pickup: request.pickup.clone(),
        drop: request.drop.clone(),
        distance_km: request.distance,
        fare,
        otp: otp.clone(),
        status: RideStatus::Pending,
        payment_method,
        driver_id: None,
        created_at: Utc::now(),
        accepted_at: None,
        arrived_at: None,
        started_at: None,
        completed_at: None,
        cancelled_at: None,
        actual_distance_km: None,
        actual_fare: None,
        actual_pickup: None,
        actual_drop: None,
        rejected_by: Vec::new(),
    };
    if let Err(err) = state.store.insert_ride(&ride).await {
        match err {
            CoreError::DuplicateKey { .. } => {
                warn!(raid_id = %ride.raid_id, "ride id collision, retrying with fresh id");
                ride.raid_id = ride_id::next_raid_id(state.store.as_ref()).await?;
                state.store.insert_ride(&ride).await?;
            }
            other => return Err(other),
        }
    }

    state.active_rides.insert(
        ride.raid_id.clone(),
        ActiveRide {
            raid_id: ride.raid_id.clone(),
            user_id,
            vehicle_type,
            fare,
            driver_id: None,
            created_at_monotonic: Instant::now(),
            rejected_by: Vec::new(),
        },
    );
    state.dedup.insert(
        fingerprint,
        DedupEntry {
            raid_id: ride.raid_id.clone(),
            internal_id: ride.id,
            otp: otp.clone(),
            fare,
            last_emitted_at: Instant::now(),
        },
    );

    let drivers_found = fan_out(state, &ride).await;

    info!(raid_id = %ride.raid_id, fare, drivers_found, "ride dispatched");
    Ok(BookingOutcome {
        raid_id: ride.raid_id,
        internal_id: ride.id,
        otp,
        fare,
        vehicle_type,
        drivers_found,
        already_sent: false,
    })
}

/// Handle `acceptRide`: single-winner arbitration under contention.
#[instrument(skip(state, request), fields(ride_id = %request.ride_id, driver_id = %request.driver_id))]
pub async fn handle_accept_ride(
    state: &CoreState,
    winner_session: Option<SessionId>,
    request: AcceptRide,
) -> Result<(RideRecord, RideAccepted)> {
    let driver = state
        .store
        .get_driver(&request.driver_id)
        .await?
        .ok_or_else(|| CoreError::NotFound {
            entity: "driver",
            id: request.driver_id.clone(),
        })?;

    // The CAS: update-where-status-pending decides the winner.
    let won = state
        .store
        .try_accept_ride(&request.ride_id, &request.driver_id)
        .await?;
    if !won {
        return Err(CoreError::RideTaken {
            ride_id: request.ride_id.clone(),
        });
    }

    // Winner path: read the ride back with its user snapshot for the
    // passenger-facing payload.
    let ride = state
        .store
        .get_ride(&request.ride_id)
        .await?
        .ok_or_else(|| CoreError::NotFound {
            entity: "ride",
            id: request.ride_id.clone(),
        })?;

    if let Some(mut active) = state.active_rides.get_mut(&request.ride_id) {
        active.driver_id = Some(driver.driver_id.clone());
    }

    state
        .store
        .update_driver_status(&driver.driver_id, ryde_protocol::DriverStatus::OnRide)
        .await?;
    state
        .presence
        .set_status(&driver.driver_id, ryde_protocol::DriverStatus::OnRide);

    let accepted = RideAccepted {
        ride_id: ride.raid_id.clone(),
        driver_id: driver.driver_id.clone(),
        driver_name: driver.name.clone(),
        driver_phone: driver.phone.clone(),
        vehicle_number: driver.vehicle_number.clone(),
        vehicle_type: driver.vehicle_type,
        driver_lat: request.driver_lat.or(driver.last_lat),
        driver_lng: request.driver_lng.or(driver.last_lng),
    };

    state.rooms.emit_to_room(
        &user_room(&ride.user_id.to_string()),
        &ServerEvent::RideAccepted(accepted.clone()),
    );
    state.rooms.emit_to_room_except(
        &ride.vehicle_type.room(),
        winner_session,
        &ServerEvent::RideAlreadyAccepted(RideAlreadyAccepted {
            ride_id: ride.raid_id.clone(),
        }),
    );

    info!("ride accepted");
    Ok((ride, accepted))
}

/// Handle `rejectRide`: records the rejection, ride stays dispatchable.
#[instrument(skip(state), fields(ride_id = %ride_id, driver_id = %driver_id))]
pub async fn handle_reject_ride(
    state: &CoreState,
    ride_id: &str,
    driver_id: &str,
    reason: Option<String>,
) -> Result<()> {
    let rejection = Rejection {
        driver_id: driver_id.to_string(),
        reason: reason.clone(),
        at: Utc::now(),
    };

    let user_id = match state.active_rides.get_mut(ride_id) {
        Some(mut active) => {
            active.rejected_by.push(rejection.clone());
            Some(active.user_id)
        }
        None => state.store.get_ride(ride_id).await?.map(|r| r.user_id),
    };

    state.store.append_ride_rejection(ride_id, &rejection).await?;

    if let Some(user_id) = user_id {
        state.rooms.emit_to_room(
            &user_room(&user_id.to_string()),
            &ServerEvent::DriverRejectedRide(DriverRejectedRide {
                ride_id: ride_id.to_string(),
                driver_id: driver_id.to_string(),
                reason,
            }),
        );
    }
    Ok(())
}

/// Fan the offer out: realtime room (exactly once) plus best-effort push to
/// eligible drivers from the store.
async fn fan_out(state: &CoreState, ride: &RideRecord) -> usize {
    let room = ride.vehicle_type.room();
    let drivers_found = state.rooms.room_size(&room);

    state.rooms.emit_to_room(
        &room,
        &ServerEvent::NewRideRequest(NewRideRequest {
            ride_id: ride.raid_id.clone(),
            pickup: ride.pickup.clone(),
            drop: ride.drop.clone(),
            vehicle_type: ride.vehicle_type,
            distance_km: ride.distance_km,
            fare: ride.fare,
            user_name: ride.user_name.clone(),
            user_mobile: ride.user_phone.clone(),
            payment_method: ride.payment_method,
            travel_time: None,
            want_return: None,
        }),
    );

    match state.store.list_push_targets(ride.vehicle_type).await {
        Ok(targets) => {
            for target in targets {
                let Some(token) = target.push_token else { continue };
                state.push.enqueue(PushMessage {
                    token,
                    title: "New ride request".to_string(),
                    body: format!(
                        "{} \u{2022} {:.1} km \u{2022} \u{20b9}{}",
                        ride.vehicle_type, ride.distance_km, ride.fare
                    ),
                    data: json!({
                        "rideId": ride.raid_id,
                        "vehicleType": ride.vehicle_type,
                        "fare": ride.fare,
                    }),
                });
            }
        }
        Err(err) => {
            // Push is secondary delivery; the room fan-out already went out.
            warn!(error = %err, "push target query failed");
        }
    }

    drivers_found
}

async fn resolve_user(
    state: &CoreState,
    request: &BookRide,
) -> Result<(Uuid, Option<String>)> {
    if let Ok(id) = request.user.parse::<Uuid>() {
        let customer_id = match &request.customer_id {
            Some(c) => Some(c.clone()),
            None => state.store.get_user(id).await?.and_then(|u| u.customer_id),
        };
        return Ok((id, customer_id));
    }
    let lookup_key = request.customer_id.as_deref().unwrap_or(&request.user);
    let user = state
        .store
        .get_user_by_customer_id(lookup_key)
        .await?
        .ok_or_else(|| CoreError::InvalidInput {
            field: "user".to_string(),
            message: "not a known user reference".to_string(),
        })?;
    Ok((user.id, user.customer_id))
}

/// OTP derivation: last 4 characters of the customer id when it has at
/// least 4; otherwise 4 uniformly random digits.
pub fn derive_otp(customer_id: Option<&str>) -> String {
    match customer_id {
        Some(id) if id.len() >= 4 => id[id.len() - 4..].to_string(),
        _ => format!("{:04}", rand::thread_rng().gen_range(0..10_000)),
    }
}
