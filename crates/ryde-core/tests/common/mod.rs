// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for ryde-core scenario tests.
//!
//! Wires a full core state against the in-memory persistence and fakes
//! realtime sessions as raw frame queues, so scenarios drive the same
//! handler functions the gateway routes to.

#![allow(dead_code)]

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

use ryde_core::config::Config;
use ryde_core::gateway::rooms::{driver_room, user_room, SessionId};
use ryde_core::model::{DriverRecord, UserRecord};
use ryde_core::persistence::{InMemoryPersistence, Persistence};
use ryde_core::presence;
use ryde_core::state::CoreState;
use ryde_protocol::events::RegisterDriver;
use ryde_protocol::{DriverStatus, VehicleType};

/// Test context holding the shared state and the store it wraps.
pub struct TestContext {
    pub state: Arc<CoreState>,
    pub store: Arc<InMemoryPersistence>,
}

impl TestContext {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryPersistence::new());
        let state = CoreState::new(Config::for_tests(), store.clone());
        Self { state, store }
    }

    /// Provision a driver row.
    pub async fn seed_driver(&self, driver_id: &str, vehicle_type: VehicleType, wallet: i64) {
        self.store
            .insert_driver(&DriverRecord {
                driver_id: driver_id.to_string(),
                name: format!("Driver {}", driver_id),
                phone: format!("90000{}", driver_id),
                vehicle_type,
                vehicle_number: "TN 33 XY 9876".to_string(),
                wallet,
                status: DriverStatus::Offline,
                working_hours_limit: 12,
                working_hours_deduction_amount: 100,
                remaining_working_seconds: 0,
                timer_active: false,
                warnings_issued: 0,
                extended_hours_purchased: false,
                wallet_deducted: false,
                last_lat: None,
                last_lng: None,
                push_token: None,
                updated_at: Utc::now(),
            })
            .await
            .expect("seed driver");
    }

    /// Provision a passenger; returns the internal id.
    pub async fn seed_user(&self, customer_id: &str, wallet: i64) -> Uuid {
        let id = Uuid::new_v4();
        self.store
            .insert_user(&UserRecord {
                id,
                customer_id: Some(customer_id.to_string()),
                name: "Asha".to_string(),
                phone: "9876543210".to_string(),
                wallet,
            })
            .await
            .expect("seed user");
        id
    }

    /// Open a raw session (queue only, no room membership).
    pub fn open_session(&self) -> (SessionId, UnboundedReceiver<String>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (self.state.rooms.register(tx), rx)
    }

    /// Connect a driver: session + `registerDriver` handler (rooms joined,
    /// presence entry created).
    pub async fn connect_driver(
        &self,
        driver_id: &str,
    ) -> (SessionId, UnboundedReceiver<String>) {
        let (session, rx) = self.open_session();
        presence::handle_register_driver(
            &self.state,
            session,
            RegisterDriver {
                driver_id: driver_id.to_string(),
                lat: Some(11.3459),
                lng: Some(77.7216),
                vehicle_type: None,
                token: None,
            },
        )
        .await
        .expect("register driver");
        (session, rx)
    }

    /// Connect a passenger session to their private room.
    pub fn connect_user(&self, user_id: Uuid) -> (SessionId, UnboundedReceiver<String>) {
        let (session, rx) = self.open_session();
        self.state
            .rooms
            .join(&user_room(&user_id.to_string()), session);
        (session, rx)
    }

    /// Join a session to a driver's private room.
    pub fn join_driver_room(&self, driver_id: &str, session: SessionId) {
        self.state.rooms.join(&driver_room(driver_id), session);
    }
}

/// Drain every frame currently queued on a session receiver.
pub fn drain(rx: &mut UnboundedReceiver<String>) -> Vec<serde_json::Value> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(serde_json::from_str(&frame).expect("frame is json"));
    }
    frames
}

/// Event names of the drained frames, in emission order.
pub fn event_names(frames: &[serde_json::Value]) -> Vec<String> {
    frames
        .iter()
        .map(|f| f["event"].as_str().unwrap_or_default().to_string())
        .collect()
}
