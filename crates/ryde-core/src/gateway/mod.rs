// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Realtime gateway.
//!
//! One WebSocket per client. Inbound frames are processed serially in
//! arrival order per connection; outbound frames flow through the
//! connection's queue and a single writer task, which preserves emission
//! order per session. Handlers run to completion on disconnect; their
//! side-effects are idempotent through the ride CAS and booking dedup, so
//! in-flight cancellation is unnecessary.

pub mod rooms;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use ryde_protocol::events::ClientEvent;
use ryde_protocol::{Ack, ClientFrame, ServerEvent};

use crate::auth::Role;
use crate::dispatch;
use crate::error::{CoreError, Result};
use crate::presence;
use crate::rides;
use crate::state::CoreState;
use crate::working_hours;

use self::rooms::{user_room, SessionId};

/// Identity bound to the session by `registerUser` / `registerDriver`.
#[derive(Debug, Default, Clone)]
struct SessionIdentity {
    user_id: Option<String>,
    driver_id: Option<String>,
}

/// Axum handler performing the WebSocket upgrade.
pub async fn ws_handler(
    State(state): State<Arc<CoreState>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Run one connection to completion.
#[instrument(skip_all)]
pub async fn handle_socket(socket: WebSocket, state: Arc<CoreState>) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    let session = state.rooms.register(tx);
    info!(session, "realtime connection opened");

    // Single writer drains the session queue; emission order is delivery
    // order.
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    // Prices greet every new connection.
    state.rooms.send_to_session(
        session,
        &ServerEvent::CurrentPrices(state.pricing.table()),
    );

    let mut identity = SessionIdentity::default();
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                process_frame(&state, session, &mut identity, &text).await;
            }
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {} // binary/ping/pong are not part of the protocol
        }
    }

    state.rooms.unregister(session);
    writer.abort();
    // Presence outlives the socket briefly; the sweeper marks the driver
    // offline when the silence exceeds the online window.
    debug!(session, "realtime connection closed");
}

/// Parse, decode and route one inbound frame, answering the ack if asked.
async fn process_frame(
    state: &CoreState,
    session: SessionId,
    identity: &mut SessionIdentity,
    text: &str,
) {
    let frame = match ClientFrame::parse(text) {
        Ok(frame) => frame,
        Err(err) => {
            debug!(error = %err, "unparseable frame dropped");
            return;
        }
    };
    let ack_id = frame.ack_id;

    let outcome = match frame.decode() {
        Ok(event) => {
            debug!(event = event.name(), session, "inbound event");
            route_event(state, session, identity, event).await
        }
        Err(err) => {
            warn!(event = %frame.event, "rejected unknown event");
            Err(CoreError::InvalidInput {
                field: "event".to_string(),
                message: err.to_string(),
            })
        }
    };

    if let Some(ack_id) = ack_id {
        let ack = match outcome {
            Ok(ack) => ack,
            Err(err) => err.to_ack(),
        };
        if let Some(tx) = state_session_sender(state, session) {
            let _ = tx.send(ack.into_frame(ack_id));
        }
    } else if let Err(err) = outcome {
        // No ack requested; the failure is still worth a log line.
        debug!(error = %err, "handler failed without ack channel");
    }
}

fn state_session_sender(
    state: &CoreState,
    session: SessionId,
) -> Option<tokio::sync::mpsc::UnboundedSender<String>> {
    state.rooms.session_sender(session)
}

/// Route an inbound event to its handler. Closed set: every variant is
/// matched here, unknown names were rejected at decode time.
async fn route_event(
    state: &CoreState,
    session: SessionId,
    identity: &mut SessionIdentity,
    event: ClientEvent,
) -> Result<Ack> {
    match event {
        ClientEvent::RegisterUser(request) => {
            if let Some(token) = &request.token {
                state
                    .tokens
                    .verify_subject(token, &request.user_id, Role::User)?;
            }
            identity.user_id = Some(request.user_id.clone());
            state.rooms.join(&user_room(&request.user_id), session);
            Ok(Ack::ok_with("User registered"))
        }

        ClientEvent::RegisterDriver(request) => {
            if let Some(token) = &request.token {
                state
                    .tokens
                    .verify_subject(token, &request.driver_id, Role::Driver)?;
            }
            let driver = presence::handle_register_driver(state, session, request).await?;
            identity.driver_id = Some(driver.driver_id.clone());
            Ok(Ack::ok_with("Driver registered")
                .field("driverId", driver.driver_id)
                .field("vehicleType", driver.vehicle_type.as_str())
                .field("walletBalance", driver.wallet)
                .field("status", driver.status.as_str()))
        }

        ClientEvent::DriverGoOnline(request) => {
            ensure_driver(identity, &request.driver_id)?;
            let outcome = working_hours::start(state, &request.driver_id).await?;
            if let (Some(lat), Some(lng)) = (request.lat, request.lng) {
                state
                    .presence
                    .update_location(&request.driver_id, lat, lng, None);
            }
            let mut ack = Ack::ok_with(if outcome.resumed {
                "Shift resumed"
            } else {
                "You are online"
            })
            .field("amountDeducted", outcome.amount_deducted)
            .field("remainingSeconds", outcome.remaining_seconds)
            .field("resumed", outcome.resumed);
            if let Some(balance) = outcome.new_balance {
                ack = ack.field("newWalletBalance", balance);
            }
            Ok(ack)
        }

        ClientEvent::DriverOffline(request) => {
            ensure_driver(identity, &request.driver_id)?;
            let remaining = working_hours::stop(state, &request.driver_id).await?;
            Ok(Ack::ok_with("You are offline").field("remainingSeconds", remaining))
        }

        ClientEvent::DriverLocationUpdate(request) => {
            ensure_driver(identity, &request.driver_id)?;
            presence::handle_location_update(
                state,
                &request.driver_id,
                request.lat,
                request.lng,
                request.status,
            )
            .await?;
            Ok(Ack::ok())
        }

        ClientEvent::DriverHeartbeat(request) => {
            ensure_driver(identity, &request.driver_id)?;
            state.presence.touch(&request.driver_id);
            Ok(Ack::ok())
        }

        ClientEvent::RequestDriverLocations(request)
        | ClientEvent::RequestNearbyDrivers(request) => {
            let update = presence::handle_request_driver_locations(state, &request);
            let count = update.drivers.len();
            state
                .rooms
                .send_to_session(session, &ServerEvent::DriverLocationsUpdate(update));
            Ok(Ack::ok().field("driversFound", count))
        }

        ClientEvent::GetCurrentPrices => {
            state
                .rooms
                .send_to_session(session, &ServerEvent::CurrentPrices(state.pricing.table()));
            Ok(Ack::ok())
        }

        ClientEvent::BookRide(request) => {
            let outcome = dispatch::handle_book_ride(state, request).await?;
            Ok(Ack::ok_with(if outcome.already_sent {
                "Ride request already sent"
            } else {
                "Ride booked"
            })
            .field("rideId", outcome.raid_id)
            .field("internalId", outcome.internal_id.to_string())
            .field("otp", outcome.otp)
            .field("fare", outcome.fare)
            .field("vehicleType", outcome.vehicle_type.as_str())
            .field("driversFound", outcome.drivers_found)
            .field("alreadySent", outcome.already_sent))
        }

        ClientEvent::AcceptRide(request) => {
            ensure_driver(identity, &request.driver_id)?;
            let (ride, _) = dispatch::handle_accept_ride(state, Some(session), request).await?;
            Ok(Ack::ok_with("Ride accepted")
                .field("rideId", ride.raid_id)
                .field("userName", ride.user_name.unwrap_or_default())
                .field("userMobile", ride.user_phone.unwrap_or_default())
                .field("pickup", serde_json::to_value(&ride.pickup)?)
                .field("drop", serde_json::to_value(&ride.drop)?)
                .field("distanceKm", ride.distance_km)
                .field("fare", ride.fare)
                .field("paymentMethod", ride.payment_method.as_str()))
        }

        ClientEvent::RejectRide(request) => {
            ensure_driver(identity, &request.driver_id)?;
            dispatch::handle_reject_ride(state, &request.ride_id, &request.driver_id, request.reason)
                .await?;
            Ok(Ack::ok_with("Ride rejected"))
        }

        ClientEvent::OtpVerified(request) => {
            ensure_driver(identity, &request.driver_id)?;
            rides::handle_start(
                state,
                &request.ride_id,
                &request.driver_id,
                request.otp.as_deref(),
            )
            .await?;
            Ok(Ack::ok_with("OTP verified"))
        }

        ClientEvent::DriverStartedRide(request) => {
            ensure_driver(identity, &request.driver_id)?;
            rides::handle_start(
                state,
                &request.ride_id,
                &request.driver_id,
                request.otp.as_deref(),
            )
            .await?;
            Ok(Ack::ok_with("Ride started"))
        }

        ClientEvent::DriverCompletedRide(request) => {
            ensure_driver(identity, &request.driver_id)?;
            let outcome = rides::handle_complete(state, request).await?;
            Ok(Ack::ok_with("Ride completed")
                .field("rideId", outcome.raid_id)
                .field("fare", outcome.fare)
                .field("distanceKm", outcome.distance_km)
                .field("newWalletBalance", outcome.driver_balance))
        }

        ClientEvent::UserLocationUpdate(request) => {
            presence::handle_user_location_update(state, request).await?;
            Ok(Ack::ok())
        }

        ClientEvent::UpdateFcmToken(request) => {
            ensure_driver(identity, &request.driver_id)?;
            state
                .store
                .update_driver_push_token(&request.driver_id, &request.fcm_token)
                .await?;
            Ok(Ack::ok_with("Token updated"))
        }

        ClientEvent::RequestRideOtp(request) => {
            let otp = rides::handle_request_otp(
                state,
                &request.ride_id,
                identity.user_id.as_deref(),
            )
            .await?;
            Ok(Ack::ok().field("otp", otp))
        }
    }
}

/// A session that bound a driver identity may only act as that driver.
/// Unbound sessions (legacy clients registering late) pass through; the
/// state machine CAS still protects every transition.
fn ensure_driver(identity: &SessionIdentity, driver_id: &str) -> Result<()> {
    match &identity.driver_id {
        Some(bound) if bound != driver_id => Err(CoreError::Unauthorized {
            reason: "session is bound to a different driver".to_string(),
        }),
        _ => Ok(()),
    }
}
