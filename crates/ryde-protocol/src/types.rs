// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared wire types: vehicle classes, statuses, geography, money.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Vehicle class a driver is provisioned for. Immutable after provisioning;
/// always lowercase on the wire. Deserialization normalizes case, since
/// clients have shipped `Bike`/`BIKE` variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleType {
    Bike,
    Taxi,
    Port,
}

impl<'de> Deserialize<'de> for VehicleType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse()
            .map_err(|_| serde::de::Error::custom(format!("unknown vehicle type '{}'", raw)))
    }
}

impl VehicleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleType::Bike => "bike",
            VehicleType::Taxi => "taxi",
            VehicleType::Port => "port",
        }
    }

    /// Realtime room carrying dispatch fan-out for this vehicle class.
    pub fn room(&self) -> String {
        format!("drivers_{}", self.as_str())
    }

    pub fn all() -> [VehicleType; 3] {
        [VehicleType::Bike, VehicleType::Taxi, VehicleType::Port]
    }
}

impl FromStr for VehicleType {
    type Err = ();

    /// Case-insensitive parse; clients are normalized to lowercase.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bike" => Ok(VehicleType::Bike),
            "taxi" => Ok(VehicleType::Taxi),
            "port" => Ok(VehicleType::Port),
            _ => Err(()),
        }
    }
}

impl fmt::Display for VehicleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Driver availability as seen by dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriverStatus {
    #[serde(rename = "offline")]
    Offline,
    #[serde(rename = "live")]
    Live,
    #[serde(rename = "onRide")]
    OnRide,
}

impl DriverStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverStatus::Offline => "offline",
            DriverStatus::Live => "live",
            DriverStatus::OnRide => "onRide",
        }
    }
}

impl FromStr for DriverStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "offline" => Ok(DriverStatus::Offline),
            // "online" and "available" appear in legacy driver rows; both
            // mean dispatchable.
            "live" | "online" | "available" => Ok(DriverStatus::Live),
            "onRide" | "on_ride" => Ok(DriverStatus::OnRide),
            _ => Err(()),
        }
    }
}

impl fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ride lifecycle status. Progression is monotonic; see the state machine in
/// the core crate for the allowed transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RideStatus {
    Pending,
    Accepted,
    Arrived,
    Started,
    Completed,
    Cancelled,
}

impl RideStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RideStatus::Pending => "pending",
            RideStatus::Accepted => "accepted",
            RideStatus::Arrived => "arrived",
            RideStatus::Started => "started",
            RideStatus::Completed => "completed",
            RideStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RideStatus::Completed | RideStatus::Cancelled)
    }
}

impl FromStr for RideStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RideStatus::Pending),
            "accepted" => Ok(RideStatus::Accepted),
            "arrived" => Ok(RideStatus::Arrived),
            "started" => Ok(RideStatus::Started),
            "completed" => Ok(RideStatus::Completed),
            "cancelled" => Ok(RideStatus::Cancelled),
            _ => Err(()),
        }
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the passenger settles the fare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Online,
    Wallet,
    DriverTransfer,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Online => "online",
            PaymentMethod::Wallet => "wallet",
            PaymentMethod::DriverTransfer => "driver_transfer",
        }
    }
}

impl Default for PaymentMethod {
    fn default() -> Self {
        PaymentMethod::Cash
    }
}

impl FromStr for PaymentMethod {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(PaymentMethod::Cash),
            "online" => Ok(PaymentMethod::Online),
            "wallet" => Ok(PaymentMethod::Wallet),
            "driver_transfer" => Ok(PaymentMethod::DriverTransfer),
            _ => Err(()),
        }
    }
}

/// Direction of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Debit,
    Credit,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Debit => "debit",
            TransactionKind::Credit => "credit",
        }
    }
}

impl FromStr for TransactionKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debit" => Ok(TransactionKind::Debit),
            "credit" => Ok(TransactionKind::Credit),
            _ => Err(()),
        }
    }
}

/// What a ledger entry paid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionMethod {
    ShiftStartFee,
    ExtendedHoursAutoDebit,
    ExtendedHoursPurchase,
    ExtraHalfTime,
    ExtraFullTime,
    RideFare,
    AdminCredit,
    AdminDebit,
}

impl TransactionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionMethod::ShiftStartFee => "shift_start_fee",
            TransactionMethod::ExtendedHoursAutoDebit => "extended_hours_auto_debit",
            TransactionMethod::ExtendedHoursPurchase => "extended_hours_purchase",
            TransactionMethod::ExtraHalfTime => "extra_half_time",
            TransactionMethod::ExtraFullTime => "extra_full_time",
            TransactionMethod::RideFare => "ride_fare",
            TransactionMethod::AdminCredit => "admin_credit",
            TransactionMethod::AdminDebit => "admin_debit",
        }
    }
}

impl FromStr for TransactionMethod {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shift_start_fee" => Ok(TransactionMethod::ShiftStartFee),
            "extended_hours_auto_debit" => Ok(TransactionMethod::ExtendedHoursAutoDebit),
            "extended_hours_purchase" => Ok(TransactionMethod::ExtendedHoursPurchase),
            "extra_half_time" => Ok(TransactionMethod::ExtraHalfTime),
            "extra_full_time" => Ok(TransactionMethod::ExtraFullTime),
            "ride_fare" => Ok(TransactionMethod::RideFare),
            "admin_credit" => Ok(TransactionMethod::AdminCredit),
            "admin_debit" => Ok(TransactionMethod::AdminDebit),
            _ => Err(()),
        }
    }
}

/// A bare coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

/// A coordinate pair with a human-readable address, as supplied by the
/// booking client for pickup and drop points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub address: String,
}
