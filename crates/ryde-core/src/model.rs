// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Domain records and process-local cache entries.
//!
//! Persistent entities are flat rows with id references; cyclic
//! relationships (ride - driver - transaction) are expressed through ids,
//! never owned pointers. In-memory entries hold value snapshots with
//! explicit TTLs enforced by the sweeper.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;

use ryde_protocol::{
    DriverStatus, PaymentMethod, Place, RideStatus, TransactionKind, TransactionMethod,
    VehicleType,
};

/// A driver as persisted in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverRecord {
    /// Stable external id, e.g. `DRV001`.
    pub driver_id: String,
    pub name: String,
    pub phone: String,
    /// Immutable after provisioning; never mutated by any core path.
    pub vehicle_type: VehicleType,
    pub vehicle_number: String,
    /// Whole currency units; non-negative after any committed debit.
    pub wallet: i64,
    pub status: DriverStatus,
    /// Shift length in hours: 12 or 24.
    pub working_hours_limit: i64,
    /// Amount auto-debited when the timer expires (default 100).
    pub working_hours_deduction_amount: i64,
    pub remaining_working_seconds: i64,
    pub timer_active: bool,
    /// 0..=3 warnings issued for the current countdown.
    pub warnings_issued: i64,
    pub extended_hours_purchased: bool,
    /// Whether the shift-start fee was taken for the current session.
    pub wallet_deducted: bool,
    pub last_lat: Option<f64>,
    pub last_lng: Option<f64>,
    pub push_token: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// A passenger as persisted in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    /// Opaque internal id.
    pub id: Uuid,
    /// External customer id, e.g. `CUS0065`.
    pub customer_id: Option<String>,
    pub name: String,
    pub phone: String,
    pub wallet: i64,
}

/// A driver's rejection of a dispatch offer. Recorded on the ride; does not
/// change the ride's status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rejection {
    pub driver_id: String,
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

/// A booking instance as persisted in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideRecord {
    /// Opaque internal id.
    pub id: Uuid,
    /// Human-readable id: `RID` + six-digit zero-padded sequence.
    pub raid_id: String,
    pub user_id: Uuid,
    pub customer_id: Option<String>,
    /// Passenger snapshot taken at booking time.
    pub user_name: Option<String>,
    pub user_phone: Option<String>,
    /// Immutable after creation.
    pub vehicle_type: VehicleType,
    pub pickup: Place,
    pub drop: Place,
    pub distance_km: f64,
    /// Authoritative server-computed fare; set at creation, never modified.
    pub fare: i64,
    /// 4-digit start gate; set at creation, never modified.
    pub otp: String,
    pub status: RideStatus,
    pub payment_method: PaymentMethod,
    /// Set exactly once, by the winning accept.
    pub driver_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub arrived_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub actual_distance_km: Option<f64>,
    pub actual_fare: Option<i64>,
    pub actual_pickup: Option<Place>,
    pub actual_drop: Option<Place>,
    pub rejected_by: Vec<Rejection>,
}

/// An immutable ledger entry paired with every wallet mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub id: Uuid,
    pub driver_id: String,
    /// Positive magnitude; direction is `kind`.
    pub amount: i64,
    pub kind: TransactionKind,
    pub method: TransactionMethod,
    pub description: String,
    /// The driver's wallet immediately after this entry committed.
    pub balance_after: i64,
    pub ride_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Who a location sample belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleKind {
    Driver,
    User,
}

impl SampleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleKind::Driver => "driver",
            SampleKind::User => "user",
        }
    }
}

/// An append-only location point sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSampleRecord {
    pub subject_id: String,
    pub kind: SampleKind,
    pub lat: f64,
    pub lng: f64,
    pub ride_id: Option<String>,
    pub status: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Consolidated working-hours fields persisted in a single driver update, so
/// the decision tree commits atomically against the driver row.
#[derive(Debug, Clone)]
pub struct WorkingHoursUpdate {
    pub remaining_working_seconds: i64,
    pub timer_active: bool,
    pub warnings_issued: i64,
    pub extended_hours_purchased: bool,
    pub wallet_deducted: bool,
    pub status: DriverStatus,
}

// ============================================================================
// In-memory only
// ============================================================================

/// Mirror of a pending/accepted ride kept in memory for dispatch bookkeeping.
#[derive(Debug, Clone)]
pub struct ActiveRide {
    pub raid_id: String,
    pub user_id: Uuid,
    pub vehicle_type: VehicleType,
    pub fare: i64,
    pub driver_id: Option<String>,
    pub created_at_monotonic: Instant,
    pub rejected_by: Vec<Rejection>,
}

/// Suppresses repeated `bookRide` fan-out for the same submission.
///
/// Keyed by a payload fingerprint so a retried identical submission resolves
/// to the already-allocated ride.
#[derive(Debug, Clone)]
pub struct DedupEntry {
    pub raid_id: String,
    pub internal_id: Uuid,
    pub otp: String,
    pub fare: i64,
    pub last_emitted_at: Instant,
}

/// Fingerprint identifying a booking submission for deduplication.
pub fn booking_fingerprint(
    user: &str,
    pickup: &Place,
    drop: &Place,
    vehicle_type: VehicleType,
) -> String {
    format!(
        "{}|{:.6},{:.6}|{:.6},{:.6}|{}",
        user, pickup.lat, pickup.lng, drop.lat, drop.lng, vehicle_type
    )
}
