// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Ryde Core - Real-time Dispatch Engine
//!
//! This crate is the stateful backend core of the ryde ride-hailing
//! platform. It matches ride requests to eligible drivers, runs the ride
//! lifecycle, drives per-driver working-hours countdowns with automatic
//! wallet debits, and maintains the monetary ledger, serving the mobile
//! apps over a realtime WebSocket channel and a small REST surface.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                  Mobile apps (driver / passenger)                   │
//! └─────────────────────────────────────────────────────────────────────┘
//!            │ WebSocket (JSON events)            │ REST (bearer token)
//!            ▼                                    ▼
//! ┌──────────────────────┐             ┌──────────────────────┐
//! │   Realtime Gateway   │             │     REST Surface     │
//! │  sessions + rooms    │             │  reads/admin writes  │
//! └──────────┬───────────┘             └──────────┬───────────┘
//!            │          shared handler services   │
//!            ▼                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  Dispatch Engine · Ride State Machine · Working-Hours · Wallet      │
//! │  Presence Registry · Pricing Cache · Ride Identity                  │
//! └──────────────────────────────┬──────────────────────────────────────┘
//!                                ▼
//!                     ┌──────────────────────┐
//!                     │      PostgreSQL      │
//!                     │   (durable storage)  │
//!                     └──────────────────────┘
//! ```
//!
//! # Ride lifecycle
//!
//! ```text
//! pending ──accept──▶ accepted ──arrived──▶ arrived ──start(otp)──▶ started
//!    │                    │                    │                       │
//!    └──cancel──▶ cancelled ◀──────────────────┘                   complete
//!                                                                      │
//!                                                                      ▼
//!                                                                  completed
//! ```
//!
//! Acceptance is a compare-and-set on the ride row; completion follows a
//! contractual emission order per passenger session (`billAlert` strictly
//! before `rideCompleted`, which carries no terminal status).
//!
//! # Modules
//!
//! - [`config`]: Server configuration from environment variables
//! - [`error`]: Error taxonomy with ack-code and HTTP-status mapping
//! - [`model`]: Persistent records and process-local cache entries
//! - [`persistence`]: Store trait with Postgres and in-memory backends
//! - [`pricing`]: Per-vehicle-type fare cache
//! - [`ride_id`]: `RIDnnnnnn` allocation with wrap recycling
//! - [`wallet`]: Ledger debits/credits with paired transactions
//! - [`presence`]: Driver presence, live-location fan-out, sweeper
//! - [`dispatch`]: Booking pipeline, dedup, acceptance arbitration
//! - [`rides`]: Ride state machine and the completion protocol
//! - [`working_hours`]: Shift timers, warnings, auto-debit
//! - [`push`]: Fire-and-forget push-notification sink
//! - [`auth`]: HMAC-signed session tokens
//! - [`gateway`]: WebSocket sessions, rooms, inbound routing
//! - [`rest`]: HTTP router and handlers
//! - [`runtime`]: Embeddable runtime with graceful shutdown

pub mod auth;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod model;
pub mod persistence;
pub mod presence;
pub mod pricing;
pub mod push;
pub mod rest;
pub mod ride_id;
pub mod rides;
pub mod runtime;
pub mod state;
pub mod wallet;
pub mod working_hours;

#[cfg(test)]
pub(crate) mod testutil;
