//! Shared helpers for unit tests.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

use ryde_protocol::{DriverStatus, RideStatus, VehicleType};

use crate::config::Config;
use crate::error::CoreError;
use crate::gateway::rooms::SessionId;
use crate::model::{
    DriverRecord, LocationSampleRecord, Rejection, RideRecord, TransactionRecord, UserRecord,
    WorkingHoursUpdate,
};
use crate::persistence::{InMemoryPersistence, Persistence, RideActuals};
use crate::state::CoreState;

/// A core state wired to a fresh in-memory store.
pub fn test_state() -> (Arc<CoreState>, Arc<InMemoryPersistence>) {
    let store = Arc::new(InMemoryPersistence::new());
    let state = CoreState::new(Config::for_tests(), store.clone());
    (state, store)
}

/// A core state wired through a [`FlakyStore`], for store-failure paths.
pub fn flaky_state() -> (Arc<CoreState>, Arc<FlakyStore>, Arc<InMemoryPersistence>) {
    let inner = Arc::new(InMemoryPersistence::new());
    let flaky = Arc::new(FlakyStore::new(inner.clone()));
    let state = CoreState::new(Config::for_tests(), flaky.clone());
    (state, flaky, inner)
}

/// Provision an offline bike driver with the given wallet.
pub async fn seed_driver(store: &InMemoryPersistence, driver_id: &str, wallet: i64) {
    seed_driver_with(store, driver_id, wallet, VehicleType::Bike, 12).await;
}

/// Provision a driver with explicit vehicle type and working-hours limit.
pub async fn seed_driver_with(
    store: &InMemoryPersistence,
    driver_id: &str,
    wallet: i64,
    vehicle_type: VehicleType,
    working_hours_limit: i64,
) {
    store
        .insert_driver(&DriverRecord {
            driver_id: driver_id.to_string(),
            name: format!("Driver {}", driver_id),
            phone: format!("90000{}", driver_id),
            vehicle_type,
            vehicle_number: "TN 01 AB 1234".to_string(),
            wallet,
            status: DriverStatus::Offline,
            working_hours_limit,
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
pub async fn seed_user(store: &InMemoryPersistence, customer_id: &str, wallet: i64) -> Uuid {
    let id = Uuid::new_v4();
    store
        .insert_user(&UserRecord {
            id,
            customer_id: Some(customer_id.to_string()),
            name: "Test Passenger".to_string(),
            phone: "9876543210".to_string(),
            wallet,
        })
        .await
        .expect("seed user");
    id
}

/// Register a session and return its id plus the outbound frame receiver.
pub fn attach_session(state: &CoreState) -> (SessionId, UnboundedReceiver<String>) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let session = state.rooms.register(tx);
    (session, rx)
}

/// Drain every frame currently queued on a session receiver.
pub fn drain_frames(rx: &mut UnboundedReceiver<String>) -> Vec<serde_json::Value> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(serde_json::from_str(&frame).expect("frame is json"));
    }
    frames
}

/// Persistence wrapper that can fail the next wallet mutation with
/// `STORE_UNAVAILABLE`, delegating everything else to the in-memory store.
pub struct FlakyStore {
    inner: Arc<InMemoryPersistence>,
    fail_next_wallet_op: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: Arc<InMemoryPersistence>) -> Self {
        Self {
            inner,
            fail_next_wallet_op: AtomicBool::new(false),
        }
    }

    /// Make the next driver-wallet mutation fail once.
    pub fn fail_next_wallet_op(&self) {
        self.fail_next_wallet_op.store(true, Ordering::SeqCst);
    }

    fn take_failure(&self) -> Option<CoreError> {
        self.fail_next_wallet_op
            .swap(false, Ordering::SeqCst)
            .then(|| CoreError::StoreUnavailable {
                operation: "wallet".to_string(),
                details: "injected failure".to_string(),
            })
    }
}

#[async_trait]
impl Persistence for FlakyStore {
    async fn insert_driver(&self, driver: &DriverRecord) -> Result<(), CoreError> {
        self.inner.insert_driver(driver).await
    }

    async fn get_driver(&self, driver_id: &str) -> Result<Option<DriverRecord>, CoreError> {
        self.inner.get_driver(driver_id).await
    }

    async fn get_driver_by_phone(&self, phone: &str) -> Result<Option<DriverRecord>, CoreError> {
        self.inner.get_driver_by_phone(phone).await
    }

    async fn update_driver_status(
        &self,
        driver_id: &str,
        status: DriverStatus,
    ) -> Result<(), CoreError> {
        self.inner.update_driver_status(driver_id, status).await
    }

    async fn update_driver_push_token(
        &self,
        driver_id: &str,
        token: &str,
    ) -> Result<(), CoreError> {
        self.inner.update_driver_push_token(driver_id, token).await
    }

    async fn update_driver_location(
        &self,
        driver_id: &str,
        lat: f64,
        lng: f64,
    ) -> Result<(), CoreError> {
        self.inner.update_driver_location(driver_id, lat, lng).await
    }

    async fn debit_driver_wallet(
        &self,
        driver_id: &str,
        amount: i64,
    ) -> Result<Option<i64>, CoreError> {
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        self.inner.debit_driver_wallet(driver_id, amount).await
    }

    async fn credit_driver_wallet(
        &self,
        driver_id: &str,
        amount: i64,
    ) -> Result<i64, CoreError> {
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        self.inner.credit_driver_wallet(driver_id, amount).await
    }

    async fn update_working_hours(
        &self,
        driver_id: &str,
        update: &WorkingHoursUpdate,
    ) -> Result<(), CoreError> {
        self.inner.update_working_hours(driver_id, update).await
    }

    async fn persist_remaining_seconds(
        &self,
        driver_id: &str,
        remaining: i64,
        warnings_issued: i64,
    ) -> Result<(), CoreError> {
        self.inner
            .persist_remaining_seconds(driver_id, remaining, warnings_issued)
            .await
    }

    async fn list_push_targets(
        &self,
        vehicle_type: VehicleType,
    ) -> Result<Vec<DriverRecord>, CoreError> {
        self.inner.list_push_targets(vehicle_type).await
    }

    async fn list_armed_timers(&self) -> Result<Vec<DriverRecord>, CoreError> {
        self.inner.list_armed_timers().await
    }

    async fn insert_user(&self, user: &UserRecord) -> Result<(), CoreError> {
        self.inner.insert_user(user).await
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<UserRecord>, CoreError> {
        self.inner.get_user(id).await
    }

    async fn get_user_by_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<UserRecord>, CoreError> {
        self.inner.get_user_by_customer_id(customer_id).await
    }

    async fn debit_user_wallet(&self, id: Uuid, amount: i64) -> Result<Option<i64>, CoreError> {
        self.inner.debit_user_wallet(id, amount).await
    }

    async fn credit_user_wallet(&self, id: Uuid, amount: i64) -> Result<i64, CoreError> {
        self.inner.credit_user_wallet(id, amount).await
    }

    async fn insert_ride(&self, ride: &RideRecord) -> Result<(), CoreError> {
        self.inner.insert_ride(ride).await
    }

    async fn get_ride(&self, raid_id: &str) -> Result<Option<RideRecord>, CoreError> {
        self.inner.get_ride(raid_id).await
    }

    async fn try_accept_ride(&self, raid_id: &str, driver_id: &str) -> Result<bool, CoreError> {
        self.inner.try_accept_ride(raid_id, driver_id).await
    }

    async fn transition_ride(
        &self,
        raid_id: &str,
        from: &[RideStatus],
        to: RideStatus,
    ) -> Result<bool, CoreError> {
        self.inner.transition_ride(raid_id, from, to).await
    }

    async fn complete_ride(
        &self,
        raid_id: &str,
        actuals: &RideActuals,
    ) -> Result<bool, CoreError> {
        self.inner.complete_ride(raid_id, actuals).await
    }

    async fn append_ride_rejection(
        &self,
        raid_id: &str,
        rejection: &Rejection,
    ) -> Result<(), CoreError> {
        self.inner.append_ride_rejection(raid_id, rejection).await
    }

    async fn insert_transaction(&self, txn: &TransactionRecord) -> Result<(), CoreError> {
        self.inner.insert_transaction(txn).await
    }

    async fn list_transactions(
        &self,
        driver_id: &str,
        limit: i64,
    ) -> Result<Vec<TransactionRecord>, CoreError> {
        self.inner.list_transactions(driver_id, limit).await
    }

    async fn insert_location_sample(
        &self,
        sample: &LocationSampleRecord,
    ) -> Result<(), CoreError> {
        self.inner.insert_location_sample(sample).await
    }

    async fn next_ride_sequence(&self) -> Result<i64, CoreError> {
        self.inner.next_ride_sequence().await
    }

    async fn load_prices(&self) -> Result<Vec<(VehicleType, i64)>, CoreError> {
        self.inner.load_prices().await
    }

    async fn upsert_price(
        &self,
        vehicle_type: VehicleType,
        per_km: i64,
    ) -> Result<(), CoreError> {
        self.inner.upsert_price(vehicle_type, per_km).await
    }

    async fn health_check_db(&self) -> Result<bool, CoreError> {
        self.inner.health_check_db().await
    }
}
