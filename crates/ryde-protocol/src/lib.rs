// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Ryde Protocol - JSON wire protocol for the dispatch core
//!
//! This crate defines the messages carried over the two surfaces of the
//! dispatch core:
//! - The realtime event channel (JSON frames over a persistent WebSocket)
//! - The shared vocabulary (vehicle types, statuses, error codes) reused by
//!   the request/response surface
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ryde-protocol                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Envelope: {event, data, ackId?} + acknowledgement frames   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Events: closed ClientEvent / ServerEvent tagged unions     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Serialization: JSON (serde)                                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Inbound events
//!
//! Inbound frames carry an event name, a payload, and an optional `ackId`.
//! The event set is closed: an unknown event name fails to decode and is
//! rejected before it reaches a handler.
//!
//! | Event | Purpose |
//! |-------|---------|
//! | `registerUser` / `registerDriver` | Bind an identity to the session |
//! | `driverGoOnline` / `driverOffline` | Shift start / stop |
//! | `driverLocationUpdate` / `driverHeartbeat` | Presence upkeep |
//! | `bookRide` | Create and dispatch a ride |
//! | `acceptRide` / `rejectRide` | Driver-side dispatch responses |
//! | `otpVerified` / `driverStartedRide` | OTP-gated ride start |
//! | `driverCompletedRide` | Completion with actual distance |
//! | `userLocationUpdate` | Passenger tracking during a ride |
//!
//! # Acknowledgements
//!
//! When an inbound frame carries an `ackId`, the server answers with an
//! `ack` frame echoing that id and carrying `{success, message?, ...}` plus
//! event-specific fields (`rideId`, `fare`, `newWalletBalance`, ...).

pub mod codes;
pub mod envelope;
pub mod events;
pub mod types;

pub use envelope::{Ack, ClientFrame, ProtocolError};
pub use events::{ClientEvent, ServerEvent};
pub use types::{
    DriverStatus, LatLng, PaymentMethod, Place, RideStatus, TransactionKind, TransactionMethod,
    VehicleType,
};
