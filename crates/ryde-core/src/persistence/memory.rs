//! In-memory persistence implementation.
//!
//! Backs unit and integration tests and embedded demos. All operations take
//! a single process-wide mutex, which makes every conditional update (wallet
//! guard, ride CAS) trivially atomic with the same observable semantics as
//! the Postgres backend.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use ryde_protocol::{DriverStatus, RideStatus, VehicleType};

use crate::error::CoreError;
use crate::model::{
    DriverRecord, LocationSampleRecord, Rejection, RideRecord, TransactionRecord, UserRecord,
    WorkingHoursUpdate,
};

use super::{Persistence, RideActuals};

#[derive(Default)]
struct Inner {
    drivers: HashMap<String, DriverRecord>,
    users: HashMap<Uuid, UserRecord>,
    rides: HashMap<String, RideRecord>,
    transactions: Vec<TransactionRecord>,
    samples: Vec<LocationSampleRecord>,
    sequence: i64,
    prices: HashMap<VehicleType, i64>,
}

/// In-memory persistence provider.
#[derive(Default)]
pub struct InMemoryPersistence {
    inner: Mutex<Inner>,
}

impl InMemoryPersistence {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned lock means a test panicked mid-write; the state is
        // still usable for inspection.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Test hook: all transactions recorded so far.
    pub fn transactions_snapshot(&self) -> Vec<TransactionRecord> {
        self.lock().transactions.clone()
    }

    /// Test hook: all location samples recorded so far.
    pub fn samples_snapshot(&self) -> Vec<LocationSampleRecord> {
        self.lock().samples.clone()
    }

    /// Test hook: force the sequence counter, e.g. to exercise the wrap.
    pub fn set_sequence(&self, value: i64) {
        self.lock().sequence = value;
    }
}

#[async_trait]
impl Persistence for InMemoryPersistence {
    async fn insert_driver(&self, driver: &DriverRecord) -> Result<(), CoreError> {
        let mut inner = self.lock();
        if inner.drivers.contains_key(&driver.driver_id) {
            return Err(CoreError::DuplicateKey {
                entity: "driver",
                id: driver.driver_id.clone(),
            });
        }
        inner.drivers.insert(driver.driver_id.clone(), driver.clone());
        Ok(())
    }

    async fn get_driver(&self, driver_id: &str) -> Result<Option<DriverRecord>, CoreError> {
        Ok(self.lock().drivers.get(driver_id).cloned())
    }

    async fn get_driver_by_phone(&self, phone: &str) -> Result<Option<DriverRecord>, CoreError> {
        Ok(self
            .lock()
            .drivers
            .values()
            .find(|d| d.phone == phone)
            .cloned())
    }

    async fn update_driver_status(
        &self,
        driver_id: &str,
        status: DriverStatus,
    ) -> Result<(), CoreError> {
        let mut inner = self.lock();
        let driver = inner
            .drivers
            .get_mut(driver_id)
            .ok_or_else(|| CoreError::NotFound {
                entity: "driver",
                id: driver_id.to_string(),
            })?;
        driver.status = status;
        driver.updated_at = Utc::now();
        Ok(())
    }

    async fn update_driver_push_token(
        &self,
        driver_id: &str,
        token: &str,
    ) -> Result<(), CoreError> {
        let mut inner = self.lock();
        let driver = inner
            .drivers
            .get_mut(driver_id)
            .ok_or_else(|| CoreError::NotFound {
                entity: "driver",
                id: driver_id.to_string(),
            })?;
        driver.push_token = Some(token.to_string());
        driver.updated_at = Utc::now();
        Ok(())
    }

    async fn update_driver_location(
        &self,
        driver_id: &str,
        lat: f64,
        lng: f64,
    ) -> Result<(), CoreError> {
        if let Some(driver) = self.lock().drivers.get_mut(driver_id) {
            driver.last_lat = Some(lat);
            driver.last_lng = Some(lng);
            driver.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn debit_driver_wallet(
        &self,
        driver_id: &str,
        amount: i64,
    ) -> Result<Option<i64>, CoreError> {
        let mut inner = self.lock();
        match inner.drivers.get_mut(driver_id) {
            Some(driver) if driver.wallet >= amount => {
                driver.wallet -= amount;
                driver.updated_at = Utc::now();
                Ok(Some(driver.wallet))
            }
            _ => Ok(None),
        }
    }

    async fn credit_driver_wallet(
        &self,
        driver_id: &str,
        amount: i64,
    ) -> Result<i64, CoreError> {
        let mut inner = self.lock();
        let driver = inner
            .drivers
            .get_mut(driver_id)
            .ok_or_else(|| CoreError::NotFound {
                entity: "driver",
                id: driver_id.to_string(),
            })?;
        driver.wallet += amount;
        driver.updated_at = Utc::now();
        Ok(driver.wallet)
    }

    async fn update_working_hours(
        &self,
        driver_id: &str,
        update: &WorkingHoursUpdate,
    ) -> Result<(), CoreError> {
        let mut inner = self.lock();
        let driver = inner
            .drivers
            .get_mut(driver_id)
            .ok_or_else(|| CoreError::NotFound {
                entity: "driver",
                id: driver_id.to_string(),
            })?;
        driver.remaining_working_seconds = update.remaining_working_seconds;
        driver.timer_active = update.timer_active;
        driver.warnings_issued = update.warnings_issued;
        driver.extended_hours_purchased = update.extended_hours_purchased;
        driver.wallet_deducted = update.wallet_deducted;
        driver.status = update.status;
        driver.updated_at = Utc::now();
        Ok(())
    }

    async fn persist_remaining_seconds(
        &self,
        driver_id: &str,
        remaining: i64,
        warnings_issued: i64,
    ) -> Result<(), CoreError> {
        if let Some(driver) = self.lock().drivers.get_mut(driver_id) {
            driver.remaining_working_seconds = remaining;
            driver.warnings_issued = warnings_issued;
            driver.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn list_push_targets(
        &self,
        vehicle_type: VehicleType,
    ) -> Result<Vec<DriverRecord>, CoreError> {
        Ok(self
            .lock()
            .drivers
            .values()
            .filter(|d| {
                d.vehicle_type == vehicle_type
                    && d.status == DriverStatus::Live
                    && d.push_token.as_deref().is_some_and(|t| !t.is_empty())
            })
            .cloned()
            .collect())
    }

    async fn list_armed_timers(&self) -> Result<Vec<DriverRecord>, CoreError> {
        Ok(self
            .lock()
            .drivers
            .values()
            .filter(|d| d.timer_active && d.remaining_working_seconds > 0)
            .cloned()
            .collect())
    }

    async fn insert_user(&self, user: &UserRecord) -> Result<(), CoreError> {
        let mut inner = self.lock();
        if inner.users.contains_key(&user.id) {
            return Err(CoreError::DuplicateKey {
                entity: "user",
                id: user.id.to_string(),
            });
        }
        inner.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<UserRecord>, CoreError> {
        Ok(self.lock().users.get(&id).cloned())
    }

    async fn get_user_by_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<UserRecord>, CoreError> {
        Ok(self
            .lock()
            .users
            .values()
            .find(|u| u.customer_id.as_deref() == Some(customer_id))
            .cloned())
    }

    async fn debit_user_wallet(&self, id: Uuid, amount: i64) -> Result<Option<i64>, CoreError> {
        let mut inner = self.lock();
        match inner.users.get_mut(&id) {
            Some(user) if user.wallet >= amount => {
                user.wallet -= amount;
                Ok(Some(user.wallet))
            }
            _ => Ok(None),
        }
    }

    async fn credit_user_wallet(&self, id: Uuid, amount: i64) -> Result<i64, CoreError> {
        let mut inner = self.lock();
        let user = inner.users.get_mut(&id).ok_or_else(|| CoreError::NotFound {
            entity: "user",
            id: id.to_string(),
        })?;
        user.wallet += amount;
        Ok(user.wallet)
    }

    async fn insert_ride(&self, ride: &RideRecord) -> Result<(), CoreError> {
        let mut inner = self.lock();
        if inner.rides.contains_key(&ride.raid_id) {
            return Err(CoreError::DuplicateKey {
                entity: "ride",
                id: ride.raid_id.clone(),
            });
        }
        inner.rides.insert(ride.raid_id.clone(), ride.clone());
        Ok(())
    }

    async fn get_ride(&self, raid_id: &str) -> Result<Option<RideRecord>, CoreError> {
        Ok(self.lock().rides.get(raid_id).cloned())
    }

    async fn try_accept_ride(&self, raid_id: &str, driver_id: &str) -> Result<bool, CoreError> {
        let mut inner = self.lock();
        match inner.rides.get_mut(raid_id) {
            Some(ride) if ride.status == RideStatus::Pending => {
                ride.status = RideStatus::Accepted;
                ride.driver_id = Some(driver_id.to_string());
                ride.accepted_at = Some(Utc::now());
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Ok(false),
        }
    }

    async fn transition_ride(
        &self,
        raid_id: &str,
        from: &[RideStatus],
        to: RideStatus,
    ) -> Result<bool, CoreError> {
        let mut inner = self.lock();
        match inner.rides.get_mut(raid_id) {
            Some(ride) if from.contains(&ride.status) => {
                ride.status = to;
                let now = Some(Utc::now());
                match to {
                    RideStatus::Arrived => ride.arrived_at = now,
                    RideStatus::Started => ride.started_at = now,
                    RideStatus::Completed => ride.completed_at = now,
                    RideStatus::Cancelled => ride.cancelled_at = now,
                    RideStatus::Accepted => ride.accepted_at = now,
                    RideStatus::Pending => {}
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete_ride(
        &self,
        raid_id: &str,
        actuals: &RideActuals,
    ) -> Result<bool, CoreError> {
        let mut inner = self.lock();
        match inner.rides.get_mut(raid_id) {
            Some(ride) if ride.status == RideStatus::Started => {
                ride.status = RideStatus::Completed;
                ride.completed_at = Some(Utc::now());
                ride.actual_distance_km = Some(actuals.distance_km);
                ride.actual_fare = Some(actuals.fare);
                ride.actual_pickup = actuals.pickup.clone();
                ride.actual_drop = actuals.drop.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn append_ride_rejection(
        &self,
        raid_id: &str,
        rejection: &Rejection,
    ) -> Result<(), CoreError> {
        if let Some(ride) = self.lock().rides.get_mut(raid_id) {
            ride.rejected_by.push(rejection.clone());
        }
        Ok(())
    }

    async fn insert_transaction(&self, txn: &TransactionRecord) -> Result<(), CoreError> {
        self.lock().transactions.push(txn.clone());
        Ok(())
    }

    async fn list_transactions(
        &self,
        driver_id: &str,
        limit: i64,
    ) -> Result<Vec<TransactionRecord>, CoreError> {
        let mut txns: Vec<TransactionRecord> = self
            .lock()
            .transactions
            .iter()
            .filter(|t| t.driver_id == driver_id)
            .cloned()
            .collect();
        txns.reverse();
        txns.truncate(limit as usize);
        Ok(txns)
    }

    async fn insert_location_sample(
        &self,
        sample: &LocationSampleRecord,
    ) -> Result<(), CoreError> {
        self.lock().samples.push(sample.clone());
        Ok(())
    }

    async fn next_ride_sequence(&self) -> Result<i64, CoreError> {
        let mut inner = self.lock();
        inner.sequence = if inner.sequence >= 999999 {
            100000
        } else {
            inner.sequence + 1
        };
        Ok(inner.sequence)
    }

    async fn load_prices(&self) -> Result<Vec<(VehicleType, i64)>, CoreError> {
        Ok(self.lock().prices.iter().map(|(k, v)| (*k, *v)).collect())
    }

    async fn upsert_price(
        &self,
        vehicle_type: VehicleType,
        per_km: i64,
    ) -> Result<(), CoreError> {
        self.lock().prices.insert(vehicle_type, per_km);
        Ok(())
    }

    async fn health_check_db(&self) -> Result<bool, CoreError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn driver(id: &str, wallet: i64) -> DriverRecord {
        DriverRecord {
            driver_id: id.to_string(),
            name: "Test Driver".to_string(),
            phone: "9000000000".to_string(),
            vehicle_type: VehicleType::Bike,
            vehicle_number: "TN 01 AB 1234".to_string(),
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
        }
    }

    #[tokio::test]
    async fn debit_respects_the_balance_guard() {
        let store = InMemoryPersistence::new();
        store.insert_driver(&driver("DRV001", 150)).await.unwrap();

        assert_eq!(
            store.debit_driver_wallet("DRV001", 100).await.unwrap(),
            Some(50)
        );
        // Guard fails; balance untouched.
        assert_eq!(store.debit_driver_wallet("DRV001", 100).await.unwrap(), None);
        let d = store.get_driver("DRV001").await.unwrap().unwrap();
        assert_eq!(d.wallet, 50);
    }

    #[tokio::test]
    async fn accept_cas_admits_exactly_one_winner() {
        let store = InMemoryPersistence::new();
        let ride = RideRecord {
            id: Uuid::new_v4(),
            raid_id: "RID000002".to_string(),
            user_id: Uuid::new_v4(),
            customer_id: None,
            user_name: None,
            user_phone: None,
            vehicle_type: VehicleType::Bike,
            pickup: ryde_protocol::Place {
                lat: 0.0,
                lng: 0.0,
                address: String::new(),
            },
            drop: ryde_protocol::Place {
                lat: 1.0,
                lng: 1.0,
                address: String::new(),
            },
            distance_km: 2.0,
            fare: 30,
            otp: "1234".to_string(),
            status: RideStatus::Pending,
            payment_method: Default::default(),
            driver_id: None,
            created_at: Utc::now(),
            accepted_at: None,
            arrived_at: None,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
            actual_distance_km: None,
            actual_fare: None,
            actual_pickup: None,
            actual_drop: None,
            rejected_by: Vec::new(),
        };
        store.insert_ride(&ride).await.unwrap();

        assert!(store.try_accept_ride("RID000002", "DRV001").await.unwrap());
        assert!(!store.try_accept_ride("RID000002", "DRV002").await.unwrap());
        let stored = store.get_ride("RID000002").await.unwrap().unwrap();
        assert_eq!(stored.driver_id.as_deref(), Some("DRV001"));
    }

    #[tokio::test]
    async fn sequence_wraps_from_999999_to_100000() {
        let store = InMemoryPersistence::new();
        store.set_sequence(999998);
        assert_eq!(store.next_ride_sequence().await.unwrap(), 999999);
        assert_eq!(store.next_ride_sequence().await.unwrap(), 100000);
    }
}
