// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Closed event unions for the realtime channel.
//!
//! Inbound and outbound events are tagged unions over the event name and the
//! payload shape. The sets are closed: adding an event means adding a
//! variant here, and unknown inbound names never reach a handler.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

use crate::types::{DriverStatus, PaymentMethod, Place, RideStatus, VehicleType};

/// Per-vehicle-type price per kilometre, as carried by `currentPrices` and
/// `priceUpdate`.
pub type PriceTable = BTreeMap<VehicleType, i64>;

// ============================================================================
// Inbound payloads
// ============================================================================

/// `registerUser` - bind a passenger identity to the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUser {
    /// Internal user id (string form).
    pub user_id: String,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Session token minted by the auth bootstrap.
    #[serde(default)]
    pub token: Option<String>,
}

/// `registerDriver` - bind a driver identity to the session and join the
/// vehicle-type dispatch room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDriver {
    pub driver_id: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    /// Client-side hint only; the server re-reads the authoritative vehicle
    /// type from the store.
    #[serde(default)]
    pub vehicle_type: Option<VehicleType>,
    #[serde(default)]
    pub token: Option<String>,
}

/// `driverGoOnline` - start or resume a shift.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverGoOnline {
    pub driver_id: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
}

/// `driverOffline` - pause the shift and leave dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverOffline {
    pub driver_id: String,
}

/// `driverLocationUpdate` - presence location delta.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverLocationUpdate {
    pub driver_id: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub status: Option<DriverStatus>,
}

/// `driverHeartbeat` - keep-alive without a location write.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverHeartbeat {
    pub driver_id: String,
}

/// `requestDriverLocations` - snapshot of online drivers, optionally
/// bounding-box filtered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDriverLocations {
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    /// Half-width of the bounding box, in kilometres.
    #[serde(default)]
    pub radius: Option<f64>,
    #[serde(default)]
    pub vehicle_type: Option<VehicleType>,
}

/// `bookRide` - create a ride and dispatch it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookRide {
    /// Internal user id (string form).
    pub user: String,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub user_mobile: Option<String>,
    pub pickup: Place,
    pub drop: Place,
    pub vehicle_type: VehicleType,
    /// Route distance in kilometres, computed server-side upstream.
    pub distance: f64,
    #[serde(default)]
    pub travel_time: Option<String>,
    #[serde(default)]
    pub want_return: Option<bool>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
}

/// `acceptRide` - driver claims a pending ride.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptRide {
    pub ride_id: String,
    pub driver_id: String,
    #[serde(default)]
    pub driver_name: Option<String>,
    #[serde(default)]
    pub driver_lat: Option<f64>,
    #[serde(default)]
    pub driver_lng: Option<f64>,
    #[serde(default)]
    pub vehicle_type: Option<VehicleType>,
}

/// `rejectRide` - driver declines; the ride stays dispatchable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectRide {
    pub ride_id: String,
    pub driver_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// `otpVerified` - OTP-gated ride start.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpVerified {
    pub ride_id: String,
    pub driver_id: String,
    #[serde(default)]
    pub otp: Option<String>,
}

/// `driverStartedRide` - start confirmation; carries the OTP when the start
/// has not yet been gated through `otpVerified`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverStartedRide {
    pub ride_id: String,
    pub driver_id: String,
    #[serde(default)]
    pub otp: Option<String>,
}

/// `driverCompletedRide` - completion with actuals. The client-supplied fare
/// is untrusted and recomputed server-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverCompletedRide {
    pub ride_id: String,
    pub driver_id: String,
    /// Actual travelled distance in kilometres.
    pub distance: f64,
    #[serde(default)]
    pub fare: Option<f64>,
    #[serde(default)]
    pub actual_pickup: Option<Place>,
    #[serde(default)]
    pub actual_drop: Option<Place>,
}

/// `userLocationUpdate` - passenger tracking during an active ride.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLocationUpdate {
    /// Internal user id or external customer id; the server resolves.
    pub user_id: String,
    pub ride_id: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// `updateFCMToken` - refresh the driver's push token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFcmToken {
    pub driver_id: String,
    pub fcm_token: String,
}

/// `requestRideOTP` - passenger asks for the ride's OTP again.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRideOtp {
    pub ride_id: String,
}

/// Closed inbound event set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "registerUser")]
    RegisterUser(RegisterUser),
    #[serde(rename = "registerDriver")]
    RegisterDriver(RegisterDriver),
    #[serde(rename = "driverGoOnline")]
    DriverGoOnline(DriverGoOnline),
    #[serde(rename = "driverOffline")]
    DriverOffline(DriverOffline),
    #[serde(rename = "driverLocationUpdate")]
    DriverLocationUpdate(DriverLocationUpdate),
    #[serde(rename = "driverHeartbeat")]
    DriverHeartbeat(DriverHeartbeat),
    #[serde(rename = "requestDriverLocations")]
    RequestDriverLocations(RequestDriverLocations),
    #[serde(rename = "requestNearbyDrivers")]
    RequestNearbyDrivers(RequestDriverLocations),
    #[serde(rename = "getCurrentPrices")]
    GetCurrentPrices,
    #[serde(rename = "bookRide")]
    BookRide(BookRide),
    #[serde(rename = "acceptRide")]
    AcceptRide(AcceptRide),
    #[serde(rename = "rejectRide")]
    RejectRide(RejectRide),
    #[serde(rename = "otpVerified")]
    OtpVerified(OtpVerified),
    #[serde(rename = "driverStartedRide")]
    DriverStartedRide(DriverStartedRide),
    #[serde(rename = "driverCompletedRide")]
    DriverCompletedRide(DriverCompletedRide),
    #[serde(rename = "userLocationUpdate")]
    UserLocationUpdate(UserLocationUpdate),
    #[serde(rename = "updateFCMToken")]
    UpdateFcmToken(UpdateFcmToken),
    #[serde(rename = "requestRideOTP")]
    RequestRideOtp(RequestRideOtp),
}

/// The closed set of inbound event names.
pub const CLIENT_EVENT_NAMES: [&str; 18] = [
    "registerUser",
    "registerDriver",
    "driverGoOnline",
    "driverOffline",
    "driverLocationUpdate",
    "driverHeartbeat",
    "requestDriverLocations",
    "requestNearbyDrivers",
    "getCurrentPrices",
    "bookRide",
    "acceptRide",
    "rejectRide",
    "otpVerified",
    "driverStartedRide",
    "driverCompletedRide",
    "userLocationUpdate",
    "updateFCMToken",
    "requestRideOTP",
];

/// Whether `name` is part of the closed inbound set.
pub fn is_client_event(name: &str) -> bool {
    CLIENT_EVENT_NAMES.contains(&name)
}

impl ClientEvent {
    /// Wire name of the event, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::RegisterUser(_) => "registerUser",
            ClientEvent::RegisterDriver(_) => "registerDriver",
            ClientEvent::DriverGoOnline(_) => "driverGoOnline",
            ClientEvent::DriverOffline(_) => "driverOffline",
            ClientEvent::DriverLocationUpdate(_) => "driverLocationUpdate",
            ClientEvent::DriverHeartbeat(_) => "driverHeartbeat",
            ClientEvent::RequestDriverLocations(_) => "requestDriverLocations",
            ClientEvent::RequestNearbyDrivers(_) => "requestNearbyDrivers",
            ClientEvent::GetCurrentPrices => "getCurrentPrices",
            ClientEvent::BookRide(_) => "bookRide",
            ClientEvent::AcceptRide(_) => "acceptRide",
            ClientEvent::RejectRide(_) => "rejectRide",
            ClientEvent::OtpVerified(_) => "otpVerified",
            ClientEvent::DriverStartedRide(_) => "driverStartedRide",
            ClientEvent::DriverCompletedRide(_) => "driverCompletedRide",
            ClientEvent::UserLocationUpdate(_) => "userLocationUpdate",
            ClientEvent::UpdateFcmToken(_) => "updateFCMToken",
            ClientEvent::RequestRideOtp(_) => "requestRideOTP",
        }
    }
}

// ============================================================================
// Outbound payloads
// ============================================================================

/// One driver's live position, as broadcast to observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverLocation {
    pub driver_id: String,
    pub lat: f64,
    pub lng: f64,
    pub vehicle_type: VehicleType,
    pub status: DriverStatus,
}

/// `driverLocationsUpdate` - periodic snapshot of the online fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverLocationsUpdate {
    pub drivers: Vec<DriverLocation>,
}

/// `userLiveLocationUpdate` - passenger position forwarded to the assigned
/// driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLiveLocationUpdate {
    pub user_id: String,
    pub ride_id: String,
    pub lat: f64,
    pub lng: f64,
}

/// `newRideRequest` - dispatch offer fanned out to the vehicle-type room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRideRequest {
    pub ride_id: String,
    pub pickup: Place,
    pub drop: Place,
    pub vehicle_type: VehicleType,
    pub distance_km: f64,
    pub fare: i64,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub user_mobile: Option<String>,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub travel_time: Option<String>,
    #[serde(default)]
    pub want_return: Option<bool>,
}

/// `rideAccepted` - winner details delivered to the passenger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideAccepted {
    pub ride_id: String,
    pub driver_id: String,
    pub driver_name: String,
    pub driver_phone: String,
    pub vehicle_number: String,
    pub vehicle_type: VehicleType,
    #[serde(default)]
    pub driver_lat: Option<f64>,
    #[serde(default)]
    pub driver_lng: Option<f64>,
}

/// `rideAlreadyAccepted` - retraction sent to the losing drivers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideAlreadyAccepted {
    pub ride_id: String,
}

/// `driverRejectedRide` - informational note to the passenger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverRejectedRide {
    pub ride_id: String,
    pub driver_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// `otpVerified` (outbound) - start gate passed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpVerifiedOut {
    pub ride_id: String,
}

/// `rideStatusUpdate` - lifecycle notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideStatusUpdate {
    pub ride_id: String,
    pub status: RideStatus,
}

/// `billAlert` - the bill, emitted to the passenger before `rideCompleted`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillAlert {
    pub ride_id: String,
    pub fare: i64,
    pub distance_km: f64,
    pub payment_method: PaymentMethod,
}

/// `rideCompleted` - completion notice.
///
/// Deliberately carries no `status` field: the bill modal is the UI gate,
/// and a terminal status here would navigate the passenger away before the
/// bill is shown.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideCompleted {
    pub ride_id: String,
    pub fare: i64,
    pub distance_km: f64,
}

/// `walletUpdate` - ledger delta pushed to the driver's private room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletUpdate {
    pub balance: i64,
    pub amount: i64,
    pub kind: crate::types::TransactionKind,
    pub method: crate::types::TransactionMethod,
}

/// `workingHoursWarning` - tiered countdown warning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkingHoursWarning {
    /// Warning tier: 1, 2 or 3.
    pub warning: u8,
    pub remaining_seconds: i64,
    pub message: String,
}

/// `autoStop` - the timer expired and the wallet could not cover the
/// extension.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoStop {
    pub reason: String,
    pub message: String,
}

/// Closed outbound event set, serialized as `{"event": name, "data": payload}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "currentPrices")]
    CurrentPrices(PriceTable),
    #[serde(rename = "priceUpdate")]
    PriceUpdate(PriceTable),
    #[serde(rename = "driverLocationsUpdate")]
    DriverLocationsUpdate(DriverLocationsUpdate),
    #[serde(rename = "driverLiveLocationUpdate")]
    DriverLiveLocationUpdate(DriverLocation),
    #[serde(rename = "userLiveLocationUpdate")]
    UserLiveLocationUpdate(UserLiveLocationUpdate),
    #[serde(rename = "newRideRequest")]
    NewRideRequest(NewRideRequest),
    #[serde(rename = "rideAccepted")]
    RideAccepted(RideAccepted),
    #[serde(rename = "rideAlreadyAccepted")]
    RideAlreadyAccepted(RideAlreadyAccepted),
    #[serde(rename = "driverRejectedRide")]
    DriverRejectedRide(DriverRejectedRide),
    #[serde(rename = "otpVerified")]
    OtpVerified(OtpVerifiedOut),
    #[serde(rename = "rideStatusUpdate")]
    RideStatusUpdate(RideStatusUpdate),
    #[serde(rename = "billAlert")]
    BillAlert(BillAlert),
    #[serde(rename = "rideCompleted")]
    RideCompleted(RideCompleted),
    #[serde(rename = "walletUpdate")]
    WalletUpdate(WalletUpdate),
    #[serde(rename = "workingHoursWarning")]
    WorkingHoursWarning(WorkingHoursWarning),
    #[serde(rename = "autoStop")]
    AutoStop(AutoStop),
}

impl ServerEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::CurrentPrices(_) => "currentPrices",
            ServerEvent::PriceUpdate(_) => "priceUpdate",
            ServerEvent::DriverLocationsUpdate(_) => "driverLocationsUpdate",
            ServerEvent::DriverLiveLocationUpdate(_) => "driverLiveLocationUpdate",
            ServerEvent::UserLiveLocationUpdate(_) => "userLiveLocationUpdate",
            ServerEvent::NewRideRequest(_) => "newRideRequest",
            ServerEvent::RideAccepted(_) => "rideAccepted",
            ServerEvent::RideAlreadyAccepted(_) => "rideAlreadyAccepted",
            ServerEvent::DriverRejectedRide(_) => "driverRejectedRide",
            ServerEvent::OtpVerified(_) => "otpVerified",
            ServerEvent::RideStatusUpdate(_) => "rideStatusUpdate",
            ServerEvent::BillAlert(_) => "billAlert",
            ServerEvent::RideCompleted(_) => "rideCompleted",
            ServerEvent::WalletUpdate(_) => "walletUpdate",
            ServerEvent::WorkingHoursWarning(_) => "workingHoursWarning",
            ServerEvent::AutoStop(_) => "autoStop",
        }
    }

    /// Serialize as a wire frame.
    ///
    /// Serialization of these closed variants cannot fail; a failure would be
    /// a programming error, so it degrades to an empty error frame rather
    /// than panicking in the fan-out path.
    pub fn to_frame(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| json!({ "event": "error", "data": null }).to_string())
    }
}
