//! Persistence interfaces and backends for ryde-core.
//!
//! This module defines the persistence abstraction and backend
//! implementations. The durable store owns all persistent entities; the
//! serialisation points are the driver row (wallet + working-hours
//! mutations) and the ride row (status transitions), both expressed as
//! single conditional updates.

pub mod memory;
pub mod postgres;

pub use self::memory::InMemoryPersistence;
pub use self::postgres::PostgresPersistence;

use async_trait::async_trait;
use uuid::Uuid;

use ryde_protocol::{DriverStatus, Place, RideStatus, VehicleType};

use crate::error::CoreError;
use crate::model::{
    DriverRecord, LocationSampleRecord, Rejection, RideRecord, TransactionRecord, UserRecord,
    WorkingHoursUpdate,
};

/// Actual distance/fare/endpoints recorded at completion.
#[derive(Debug, Clone)]
pub struct RideActuals {
    pub distance_km: f64,
    pub fare: i64,
    pub pickup: Option<Place>,
    pub drop: Option<Place>,
}

/// Persistence interface used by core services.
#[allow(missing_docs)]
#[async_trait]
pub trait Persistence: Send + Sync {
    // ------------------------------------------------------------------
    // Drivers
    // ------------------------------------------------------------------

    /// Provision a driver row (admin path; the core only reads these).
    async fn insert_driver(&self, driver: &DriverRecord) -> Result<(), CoreError>;

    async fn get_driver(&self, driver_id: &str) -> Result<Option<DriverRecord>, CoreError>;

    async fn get_driver_by_phone(&self, phone: &str) -> Result<Option<DriverRecord>, CoreError>;

    async fn update_driver_status(
        &self,
        driver_id: &str,
        status: DriverStatus,
    ) -> Result<(), CoreError>;

    async fn update_driver_push_token(
        &self,
        driver_id: &str,
        token: &str,
    ) -> Result<(), CoreError>;

    async fn update_driver_location(
        &self,
        driver_id: &str,
        lat: f64,
        lng: f64,
    ) -> Result<(), CoreError>;

    /// Conditional wallet debit: subtracts `amount` only while the balance
    /// covers it. Returns the new balance, or `None` when the guard failed.
    async fn debit_driver_wallet(
        &self,
        driver_id: &str,
        amount: i64,
    ) -> Result<Option<i64>, CoreError>;

    /// Wallet credit. Returns the new balance.
    async fn credit_driver_wallet(&self, driver_id: &str, amount: i64)
        -> Result<i64, CoreError>;

    /// Commit the working-hours decision-tree outcome in one driver update.
    async fn update_working_hours(
        &self,
        driver_id: &str,
        update: &WorkingHoursUpdate,
    ) -> Result<(), CoreError>;

    /// Periodic countdown checkpoint while the timer runs.
    async fn persist_remaining_seconds(
        &self,
        driver_id: &str,
        remaining: i64,
        warnings_issued: i64,
    ) -> Result<(), CoreError>;

    /// Drivers eligible for push on dispatch: matching vehicle type, a
    /// dispatchable status, and a non-empty push token.
    async fn list_push_targets(
        &self,
        vehicle_type: VehicleType,
    ) -> Result<Vec<DriverRecord>, CoreError>;

    /// Drivers whose countdown should be re-armed after a restart.
    async fn list_armed_timers(&self) -> Result<Vec<DriverRecord>, CoreError>;

    // ------------------------------------------------------------------
    // Users (passengers)
    // ------------------------------------------------------------------

    async fn insert_user(&self, user: &UserRecord) -> Result<(), CoreError>;

    async fn get_user(&self, id: Uuid) -> Result<Option<UserRecord>, CoreError>;

    async fn get_user_by_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<UserRecord>, CoreError>;

    /// Same guard as the driver debit; passenger wallets share the ledger
    /// invariant but produce no driver transaction.
    async fn debit_user_wallet(&self, id: Uuid, amount: i64) -> Result<Option<i64>, CoreError>;

    async fn credit_user_wallet(&self, id: Uuid, amount: i64) -> Result<i64, CoreError>;

    // ------------------------------------------------------------------
    // Rides
    // ------------------------------------------------------------------

    /// Insert a new ride in `pending`. A duplicate `raid_id` surfaces as
    /// [`CoreError::DuplicateKey`] and is retried by the caller.
    async fn insert_ride(&self, ride: &RideRecord) -> Result<(), CoreError>;

    async fn get_ride(&self, raid_id: &str) -> Result<Option<RideRecord>, CoreError>;

    /// Acceptance CAS: `pending -> accepted` + driver assignment in one
    /// conditional update. Returns whether this caller won.
    async fn try_accept_ride(&self, raid_id: &str, driver_id: &str) -> Result<bool, CoreError>;

    /// Status CAS guarded on the observed status being one of `from`.
    async fn transition_ride(
        &self,
        raid_id: &str,
        from: &[RideStatus],
        to: RideStatus,
    ) -> Result<bool, CoreError>;

    /// Completion write: terminal status, timestamps and actuals in one
    /// conditional update, guarded on the ride being `started` (the OTP
    /// gate precedes completion).
    async fn complete_ride(&self, raid_id: &str, actuals: &RideActuals)
        -> Result<bool, CoreError>;

    async fn append_ride_rejection(
        &self,
        raid_id: &str,
        rejection: &Rejection,
    ) -> Result<(), CoreError>;

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    async fn insert_transaction(&self, txn: &TransactionRecord) -> Result<(), CoreError>;

    async fn list_transactions(
        &self,
        driver_id: &str,
        limit: i64,
    ) -> Result<Vec<TransactionRecord>, CoreError>;

    // ------------------------------------------------------------------
    // Location samples
    // ------------------------------------------------------------------

    async fn insert_location_sample(
        &self,
        sample: &LocationSampleRecord,
    ) -> Result<(), CoreError>;

    // ------------------------------------------------------------------
    // Sequence counter
    // ------------------------------------------------------------------

    /// Atomic increment of the ride-id sequence. Recycles to 100000 after
    /// exceeding 999999.
    async fn next_ride_sequence(&self) -> Result<i64, CoreError>;

    // ------------------------------------------------------------------
    // Prices
    // ------------------------------------------------------------------

    async fn load_prices(&self) -> Result<Vec<(VehicleType, i64)>, CoreError>;

    async fn upsert_price(&self, vehicle_type: VehicleType, per_km: i64)
        -> Result<(), CoreError>;

    // ------------------------------------------------------------------
    // Health
    // ------------------------------------------------------------------

    async fn health_check_db(&self) -> Result<bool, CoreError>;
}
