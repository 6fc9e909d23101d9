// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Ride state machine.
//!
//! Transitions are CAS on the ride row's current status. Completion follows
//! a strict side-effect order per ride: persist terminal state, credit the
//! driver, settle a wallet payment, then `billAlert` before `rideCompleted`
//! (which carries no terminal status: the bill modal is the passenger UI
//! gate), then `rideStatusUpdate`. A per-ride lock serialises completion
//! handlers for the same `raid_id`.

use tracing::{info, instrument, warn};

use ryde_protocol::events::{
    BillAlert, DriverCompletedRide, OtpVerifiedOut, RideCompleted, RideStatusUpdate,
};
use ryde_protocol::{DriverStatus, PaymentMethod, RideStatus, ServerEvent, TransactionMethod};

use crate::error::{CoreError, Result};
use crate::gateway::rooms::{driver_room, user_room};
use crate::model::RideRecord;
use crate::persistence::RideActuals;
use crate::state::CoreState;
use crate::wallet;

/// What completion reports back to the driver's acknowledgement.
#[derive(Debug, Clone)]
pub struct CompletionOutcome {
    pub raid_id: String,
    pub fare: i64,
    pub distance_km: f64,
    pub driver_balance: i64,
}

async fn load_ride(state: &CoreState, ride_id: &str) -> Result<RideRecord> {
    state
        .store
        .get_ride(ride_id)
        .await?
        .ok_or_else(|| CoreError::NotFound {
            entity: "ride",
            id: ride_id.to_string(),
        })
}

fn require_assigned_driver(ride: &RideRecord, driver_id: &str) -> Result<()> {
    match ride.driver_id.as_deref() {
        Some(assigned) if assigned == driver_id => Ok(()),
        _ => Err(CoreError::Unauthorized {
            reason: "ride is assigned to a different driver".to_string(),
        }),
    }
}

fn emit_status(state: &CoreState, ride: &RideRecord, status: RideStatus) {
    let event = ServerEvent::RideStatusUpdate(RideStatusUpdate {
        ride_id: ride.raid_id.clone(),
        status,
    });
    state
        .rooms
        .emit_to_room(&user_room(&ride.user_id.to_string()), &event);
    if let Some(driver_id) = &ride.driver_id {
        state.rooms.emit_to_room(&driver_room(driver_id), &event);
    }
}

/// Driver reached the pickup point: `accepted -> arrived`.
#[instrument(skip(state), fields(ride_id = %ride_id, driver_id = %driver_id))]
pub async fn handle_arrived(state: &CoreState, ride_id: &str, driver_id: &str) -> Result<()> {
    let ride = load_ride(state, ride_id).await?;
    require_assigned_driver(&ride, driver_id)?;

    let moved = state
        .store
        .transition_ride(ride_id, &[RideStatus::Accepted], RideStatus::Arrived)
        .await?;
    if !moved {
        return Err(CoreError::InvalidTransition {
            ride_id: ride_id.to_string(),
            from: ride.status.as_str().to_string(),
            to: RideStatus::Arrived.as_str().to_string(),
        });
    }
    emit_status(state, &ride, RideStatus::Arrived);
    Ok(())
}

/// OTP-gated start: `accepted | arrived -> started`.
///
/// Idempotent on an already-started ride so that `otpVerified` followed by
/// `driverStartedRide` does not fail the second call.
#[instrument(skip(state, otp_submitted), fields(ride_id = %ride_id, driver_id = %driver_id))]
pub async fn handle_start(
    state: &CoreState,
    ride_id: &str,
    driver_id: &str,
    otp_submitted: Option<&str>,
) -> Result<()> {
    let ride = load_ride(state, ride_id).await?;
    require_assigned_driver(&ride, driver_id)?;

    if ride.status == RideStatus::Started {
        return Ok(());
    }

    match otp_submitted {
        Some(otp) if otp == ride.otp => {}
        _ => {
            return Err(CoreError::InvalidOtp {
                ride_id: ride_id.to_string(),
            })
        }
    }

    let moved = state
        .store
        .transition_ride(
            ride_id,
            &[RideStatus::Accepted, RideStatus::Arrived],
            RideStatus::Started,
        )
        .await?;
    if !moved {
        return Err(CoreError::InvalidTransition {
            ride_id: ride_id.to_string(),
            from: ride.status.as_str().to_string(),
            to: RideStatus::Started.as_str().to_string(),
        });
    }

    state.rooms.emit_to_room(
        &user_room(&ride.user_id.to_string()),
        &ServerEvent::OtpVerified(OtpVerifiedOut {
            ride_id: ride.raid_id.clone(),
        }),
    );
    emit_status(state, &ride, RideStatus::Started);
    info!("ride started");
    Ok(())
}

/// Completion protocol. The ordering here is contractual; see module docs.
#[instrument(skip(state, request), fields(ride_id = %request.ride_id, driver_id = %request.driver_id))]
pub async fn handle_complete(
    state: &CoreState,
    request: DriverCompletedRide,
) -> Result<CompletionOutcome> {
    // Completion handlers for one raid_id run one at a time.
    let _guard = state.ride_locks.acquire(&request.ride_id).await;

    let ride = load_ride(state, &request.ride_id).await?;

    // A re-sent completion (client retry after a dropped ack) answers with
    // the committed outcome instead of double-crediting.
    if ride.status == RideStatus::Completed {
        let driver = state
            .store
            .get_driver(&request.driver_id)
            .await?
            .ok_or_else(|| CoreError::NotFound {
                entity: "driver",
                id: request.driver_id.clone(),
            })?;
        return Ok(CompletionOutcome {
            raid_id: ride.raid_id,
            fare: ride.actual_fare.unwrap_or(ride.fare),
            distance_km: ride.actual_distance_km.unwrap_or(ride.distance_km),
            driver_balance: driver.wallet,
        });
    }

    require_assigned_driver(&ride, &request.driver_id)?;

    if !request.distance.is_finite() || request.distance < 0.0 {
        return Err(CoreError::InvalidInput {
            field: "distance".to_string(),
            message: "must be a non-negative number".to_string(),
        });
    }

    // The client-supplied fare is untrusted; recompute from the actual
    // distance at the authoritative per-km price.
    let actual_fare = state
        .pricing
        .calculate_fare(ride.vehicle_type, request.distance);

    // 1. Terminal state and actuals are durable before any money moves.
    let moved = state
        .store
        .complete_ride(
            &ride.raid_id,
            &RideActuals {
                distance_km: request.distance,
                fare: actual_fare,
                pickup: request.actual_pickup.clone(),
                drop: request.actual_drop.clone(),
            },
        )
        .await?;
    if !moved {
        return Err(CoreError::InvalidTransition {
            ride_id: ride.raid_id.clone(),
            from: ride.status.as_str().to_string(),
            to: RideStatus::Completed.as_str().to_string(),
        });
    }

    // 2. Credit the driver, with the paired transaction.
    let credit = wallet::credit(
        state,
        &request.driver_id,
        actual_fare,
        TransactionMethod::RideFare,
        &format!("Ride fare for {}", ride.raid_id),
        Some(&ride.raid_id),
    )
    .await?;

    // 3. Wallet-paying passengers settle the same amount.
    if ride.payment_method == PaymentMethod::Wallet {
        if let Err(err) = wallet::debit_user(state, ride.user_id, actual_fare).await {
            // The ride is complete and the driver is credited; the shortfall
            // becomes a collection problem, not a state-machine one.
            warn!(user_id = %ride.user_id, error = %err, "passenger wallet debit failed");
        }
    }

    let passenger_room = user_room(&ride.user_id.to_string());

    // 4. Bill first.
    state.rooms.emit_to_room(
        &passenger_room,
        &ServerEvent::BillAlert(BillAlert {
            ride_id: ride.raid_id.clone(),
            fare: actual_fare,
            distance_km: request.distance,
            payment_method: ride.payment_method,
        }),
    );

    // 5. Then completion, without a terminal status field.
    state.rooms.emit_to_room(
        &passenger_room,
        &ServerEvent::RideCompleted(RideCompleted {
            ride_id: ride.raid_id.clone(),
            fare: actual_fare,
            distance_km: request.distance,
        }),
    );

    // 6. Then the terminal status notification.
    emit_status(state, &ride, RideStatus::Completed);

    // 7. The driver is dispatchable again; the ride leaves memory.
    state
        .store
        .update_driver_status(&request.driver_id, DriverStatus::Live)
        .await?;
    state
        .presence
        .set_status(&request.driver_id, DriverStatus::Live);
    state.active_rides.remove(&ride.raid_id);

    info!(fare = actual_fare, "ride completed");
    Ok(CompletionOutcome {
        raid_id: ride.raid_id,
        fare: actual_fare,
        distance_km: request.distance,
        driver_balance: credit.balance,
    })
}

/// Cancellation, permitted from `pending`, `accepted` and `arrived` by
/// either party. A started ride has no cancellation path; it completes with
/// the recorded distance.
#[instrument(skip(state), fields(ride_id = %ride_id))]
pub async fn handle_cancel(state: &CoreState, ride_id: &str, reason: Option<&str>) -> Result<()> {
    let ride = load_ride(state, ride_id).await?;

    let moved = state
        .store
        .transition_ride(
            ride_id,
            &[RideStatus::Pending, RideStatus::Accepted, RideStatus::Arrived],
            RideStatus::Cancelled,
        )
        .await?;
    if !moved {
        return Err(CoreError::InvalidTransition {
            ride_id: ride_id.to_string(),
            from: ride.status.as_str().to_string(),
            to: RideStatus::Cancelled.as_str().to_string(),
        });
    }

    if let Some(reason) = reason {
        info!(reason, "ride cancelled");
    }

    emit_status(state, &ride, RideStatus::Cancelled);

    if let Some(driver_id) = &ride.driver_id {
        state
            .store
            .update_driver_status(driver_id, DriverStatus::Live)
            .await?;
        state.presence.set_status(driver_id, DriverStatus::Live);
    }
    state.active_rides.remove(ride_id);
    Ok(())
}

/// `requestRideOTP`: only the booking passenger may read the OTP back.
pub async fn handle_request_otp(
    state: &CoreState,
    ride_id: &str,
    requester_user_id: Option<&str>,
) -> Result<String> {
    let ride = load_ride(state, ride_id).await?;
    match requester_user_id {
        Some(requester) if requester == ride.user_id.to_string() => Ok(ride.otp),
        _ => Err(CoreError::Unauthorized {
            reason: "OTP is only visible to the booking passenger".to_string(),
        }),
    }
}
