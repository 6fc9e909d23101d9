// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL-backed persistence for ryde-core.
//!
//! All serialisation-point mutations (wallet, working-hours, ride status)
//! are single conditional updates; reads-before-write are never relied on
//! for correctness.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use ryde_protocol::{DriverStatus, Place, RideStatus, VehicleType};

use crate::error::CoreError;
use crate::model::{
    DriverRecord, LocationSampleRecord, Rejection, RideRecord, TransactionRecord, UserRecord,
    WorkingHoursUpdate,
};

use super::{Persistence, RideActuals};

/// PostgreSQL-backed persistence implementation.
#[derive(Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    /// Create a new Postgres-backed persistence implementation.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Row types
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
struct DriverRow {
    driver_id: String,
    name: String,
    phone: String,
    vehicle_type: String,
    vehicle_number: String,
    wallet: i64,
    status: String,
    working_hours_limit: i64,
    working_hours_deduction_amount: i64,
    remaining_working_seconds: i64,
    timer_active: bool,
    warnings_issued: i64,
    extended_hours_purchased: bool,
    wallet_deducted: bool,
    last_lat: Option<f64>,
    last_lng: Option<f64>,
    push_token: Option<String>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DriverRow> for DriverRecord {
    type Error = CoreError;

    fn try_from(row: DriverRow) -> Result<Self, CoreError> {
        Ok(DriverRecord {
            vehicle_type: parse_enum(&row.vehicle_type, "vehicle_type")?,
            status: parse_enum(&row.status, "status")?,
            driver_id: row.driver_id,
            name: row.name,
            phone: row.phone,
            vehicle_number: row.vehicle_number,
            wallet: row.wallet,
            working_hours_limit: row.working_hours_limit,
            working_hours_deduction_amount: row.working_hours_deduction_amount,
            remaining_working_seconds: row.remaining_working_seconds,
            timer_active: row.timer_active,
            warnings_issued: row.warnings_issued,
            extended_hours_purchased: row.extended_hours_purchased,
            wallet_deducted: row.wallet_deducted,
            last_lat: row.last_lat,
            last_lng: row.last_lng,
            push_token: row.push_token,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RideRow {
    id: Uuid,
    raid_id: String,
    user_id: Uuid,
    customer_id: Option<String>,
    user_name: Option<String>,
    user_phone: Option<String>,
    vehicle_type: String,
    pickup_lat: f64,
    pickup_lng: f64,
    pickup_address: String,
    drop_lat: f64,
    drop_lng: f64,
    drop_address: String,
    distance_km: f64,
    fare: i64,
    otp: String,
    status: String,
    payment_method: String,
    driver_id: Option<String>,
    created_at: DateTime<Utc>,
    accepted_at: Option<DateTime<Utc>>,
    arrived_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    actual_distance_km: Option<f64>,
    actual_fare: Option<i64>,
    actual_pickup: Option<Json<Place>>,
    actual_drop: Option<Json<Place>>,
    rejected_by: Json<Vec<Rejection>>,
}

impl TryFrom<RideRow> for RideRecord {
    type Error = CoreError;

    fn try_from(row: RideRow) -> Result<Self, CoreError> {
        Ok(RideRecord {
            vehicle_type: parse_enum(&row.vehicle_type, "vehicle_type")?,
            status: parse_enum(&row.status, "status")?,
            payment_method: parse_enum(&row.payment_method, "payment_method")?,
            id: row.id,
            raid_id: row.raid_id,
            user_id: row.user_id,
            customer_id: row.customer_id,
            user_name: row.user_name,
            user_phone: row.user_phone,
            pickup: Place {
                lat: row.pickup_lat,
                lng: row.pickup_lng,
                address: row.pickup_address,
            },
            drop: Place {
                lat: row.drop_lat,
                lng: row.drop_lng,
                address: row.drop_address,
            },
            distance_km: row.distance_km,
            fare: row.fare,
            otp: row.otp,
            driver_id: row.driver_id,
            created_at: row.created_at,
            accepted_at: row.accepted_at,
            arrived_at: row.arrived_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            cancelled_at: row.cancelled_at,
            actual_distance_km: row.actual_distance_km,
            actual_fare: row.actual_fare,
            actual_pickup: row.actual_pickup.map(|j| j.0),
            actual_drop: row.actual_drop.map(|j| j.0),
            rejected_by: row.rejected_by.0,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    driver_id: String,
    amount: i64,
    kind: String,
    method: String,
    description: String,
    balance_after: i64,
    ride_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for TransactionRecord {
    type Error = CoreError;

    fn try_from(row: TransactionRow) -> Result<Self, CoreError> {
        Ok(TransactionRecord {
            kind: parse_enum(&row.kind, "kind")?,
            method: parse_enum(&row.method, "method")?,
            id: row.id,
            driver_id: row.driver_id,
            amount: row.amount,
            description: row.description,
            balance_after: row.balance_after,
            ride_id: row.ride_id,
            created_at: row.created_at,
        })
    }
}

fn parse_enum<T: std::str::FromStr>(value: &str, column: &str) -> Result<T, CoreError> {
    value.parse().map_err(|_| CoreError::Internal {
        details: format!("unrecognized {} value '{}'", column, value),
    })
}

const DRIVER_COLUMNS: &str = "driver_id, name, phone, vehicle_type, vehicle_number, wallet, \
     status, working_hours_limit, working_hours_deduction_amount, remaining_working_seconds, \
     timer_active, warnings_issued, extended_hours_purchased, wallet_deducted, last_lat, \
     last_lng, push_token, updated_at";

const RIDE_COLUMNS: &str = "id, raid_id, user_id, customer_id, user_name, user_phone, \
     vehicle_type, pickup_lat, pickup_lng, pickup_address, drop_lat, drop_lng, drop_address, \
     distance_km, fare, otp, status, payment_method, driver_id, created_at, accepted_at, \
     arrived_at, started_at, completed_at, cancelled_at, actual_distance_km, actual_fare, \
     actual_pickup, actual_drop, rejected_by";

// ============================================================================
// Trait implementation
// ============================================================================

#[async_trait]
impl Persistence for PostgresPersistence {
    async fn insert_driver(&self, driver: &DriverRecord) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO drivers (driver_id, name, phone, vehicle_type, vehicle_number, wallet,
                                 status, working_hours_limit, working_hours_deduction_amount,
                                 remaining_working_seconds, timer_active, warnings_issued,
                                 extended_hours_purchased, wallet_deducted, last_lat, last_lng,
                                 push_token, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, NOW())
            "#,
        )
        .bind(&driver.driver_id)
        .bind(&driver.name)
        .bind(&driver.phone)
        .bind(driver.vehicle_type.as_str())
        .bind(&driver.vehicle_number)
        .bind(driver.wallet)
        .bind(driver.status.as_str())
        .bind(driver.working_hours_limit)
        .bind(driver.working_hours_deduction_amount)
        .bind(driver.remaining_working_seconds)
        .bind(driver.timer_active)
        .bind(driver.warnings_issued)
        .bind(driver.extended_hours_purchased)
        .bind(driver.wallet_deducted)
        .bind(driver.last_lat)
        .bind(driver.last_lng)
        .bind(&driver.push_token)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_driver(&self, driver_id: &str) -> Result<Option<DriverRecord>, CoreError> {
        let row = sqlx::query_as::<_, DriverRow>(&format!(
            "SELECT {DRIVER_COLUMNS} FROM drivers WHERE driver_id = $1"
        ))
        .bind(driver_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(DriverRecord::try_from).transpose()
    }

    async fn get_driver_by_phone(&self, phone: &str) -> Result<Option<DriverRecord>, CoreError> {
        let row = sqlx::query_as::<_, DriverRow>(&format!(
            "SELECT {DRIVER_COLUMNS} FROM drivers WHERE phone = $1"
        ))
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;
        row.map(DriverRecord::try_from).transpose()
    }

    async fn update_driver_status(
        &self,
        driver_id: &str,
        status: DriverStatus,
    ) -> Result<(), CoreError> {
        let result =
            sqlx::query("UPDATE drivers SET status = $2, updated_at = NOW() WHERE driver_id = $1")
                .bind(driver_id)
                .bind(status.as_str())
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound {
                entity: "driver",
                id: driver_id.to_string(),
            });
        }
        Ok(())
    }

    async fn update_driver_push_token(
        &self,
        driver_id: &str,
        token: &str,
    ) -> Result<(), CoreError> {
        let result = sqlx::query(
            "UPDATE drivers SET push_token = $2, updated_at = NOW() WHERE driver_id = $1",
        )
        .bind(driver_id)
        .bind(token)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound {
                entity: "driver",
                id: driver_id.to_string(),
            });
        }
        Ok(())
    }

    async fn update_driver_location(
        &self,
        driver_id: &str,
        lat: f64,
        lng: f64,
    ) -> Result<(), CoreError> {
        sqlx::query(
            "UPDATE drivers SET last_lat = $2, last_lng = $3, updated_at = NOW() WHERE driver_id = $1",
        )
        .bind(driver_id)
        .bind(lat)
        .bind(lng)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn debit_driver_wallet(
        &self,
        driver_id: &str,
        amount: i64,
    ) -> Result<Option<i64>, CoreError> {
        // Balance guard and subtraction in one statement: the row is the
        // serialisation point for all wallet mutations.
        let balance: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE drivers
            SET wallet = wallet - $2, updated_at = NOW()
            WHERE driver_id = $1 AND wallet >= $2
            RETURNING wallet
            "#,
        )
        .bind(driver_id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?;
        Ok(balance)
    }

    async fn credit_driver_wallet(
        &self,
        driver_id: &str,
        amount: i64,
    ) -> Result<i64, CoreError> {
        let balance: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE drivers
            SET wallet = wallet + $2, updated_at = NOW()
            WHERE driver_id = $1
            RETURNING wallet
            "#,
        )
        .bind(driver_id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?;
        balance.ok_or_else(|| CoreError::NotFound {
            entity: "driver",
            id: driver_id.to_string(),
        })
    }

    async fn update_working_hours(
        &self,
        driver_id: &str,
        update: &WorkingHoursUpdate,
    ) -> Result<(), CoreError> {
        let result = sqlx::query(
            r#"
            UPDATE drivers
            SET remaining_working_seconds = $2,
                timer_active = $3,
                warnings_issued = $4,
                extended_hours_purchased = $5,
                wallet_deducted = $6,
                status = $7,
                updated_at = NOW()
            WHERE driver_id = $1
            "#,
        )
        .bind(driver_id)
        .bind(update.remaining_working_seconds)
        .bind(update.timer_active)
        .bind(update.warnings_issued)
        .bind(update.extended_hours_purchased)
        .bind(update.wallet_deducted)
        .bind(update.status.as_str())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound {
                entity: "driver",
                id: driver_id.to_string(),
            });
        }
        Ok(())
    }

    async fn persist_remaining_seconds(
        &self,
        driver_id: &str,
        remaining: i64,
        warnings_issued: i64,
    ) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            UPDATE drivers
            SET remaining_working_seconds = $2, warnings_issued = $3, updated_at = NOW()
            WHERE driver_id = $1
            "#,
        )
        .bind(driver_id)
        .bind(remaining)
        .bind(warnings_issued)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_push_targets(
        &self,
        vehicle_type: VehicleType,
    ) -> Result<Vec<DriverRecord>, CoreError> {
        let rows = sqlx::query_as::<_, DriverRow>(&format!(
            r#"
            SELECT {DRIVER_COLUMNS} FROM drivers
            WHERE vehicle_type = $1
              AND status IN ('live', 'online', 'available')
              AND push_token IS NOT NULL AND push_token <> ''
            "#
        ))
        .bind(vehicle_type.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(DriverRecord::try_from).collect()
    }

    async fn list_armed_timers(&self) -> Result<Vec<DriverRecord>, CoreError> {
        let rows = sqlx::query_as::<_, DriverRow>(&format!(
            r#"
            SELECT {DRIVER_COLUMNS} FROM drivers
            WHERE timer_active = TRUE AND remaining_working_seconds > 0
            "#
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(DriverRecord::try_from).collect()
    }

    async fn insert_user(&self, user: &UserRecord) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, customer_id, name, phone, wallet)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(user.id)
        .bind(&user.customer_id)
        .bind(&user.name)
        .bind(&user.phone)
        .bind(user.wallet)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<UserRecord>, CoreError> {
        let user = sqlx::query_as::<_, UserRecord>(
            "SELECT id, customer_id, name, phone, wallet FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn get_user_by_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<UserRecord>, CoreError> {
        let user = sqlx::query_as::<_, UserRecord>(
            "SELECT id, customer_id, name, phone, wallet FROM users WHERE customer_id = $1",
        )
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn debit_user_wallet(&self, id: Uuid, amount: i64) -> Result<Option<i64>, CoreError> {
        let balance: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE users
            SET wallet = wallet - $2
            WHERE id = $1 AND wallet >= $2
            RETURNING wallet
            "#,
        )
        .bind(id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?;
        Ok(balance)
    }

    async fn credit_user_wallet(&self, id: Uuid, amount: i64) -> Result<i64, CoreError> {
        let balance: Option<i64> = sqlx::query_scalar(
            "UPDATE users SET wallet = wallet + $2 WHERE id = $1 RETURNING wallet",
        )
        .bind(id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?;
        balance.ok_or_else(|| CoreError::NotFound {
            entity: "user",
            id: id.to_string(),
        })
    }

    async fn insert_ride(&self, ride: &RideRecord) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO rides (id, raid_id, user_id, customer_id, user_name, user_phone,
                               vehicle_type, pickup_lat, pickup_lng, pickup_address,
                               drop_lat, drop_lng, drop_address, distance_km, fare, otp,
                               status, payment_method, created_at, rejected_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19, $20)
            "#,
        )
        .bind(ride.id)
        .bind(&ride.raid_id)
        .bind(ride.user_id)
        .bind(&ride.customer_id)
        .bind(&ride.user_name)
        .bind(&ride.user_phone)
        .bind(ride.vehicle_type.as_str())
        .bind(ride.pickup.lat)
        .bind(ride.pickup.lng)
        .bind(&ride.pickup.address)
        .bind(ride.drop.lat)
        .bind(ride.drop.lng)
        .bind(&ride.drop.address)
        .bind(ride.distance_km)
        .bind(ride.fare)
        .bind(&ride.otp)
        .bind(ride.status.as_str())
        .bind(ride.payment_method.as_str())
        .bind(ride.created_at)
        .bind(Json(&ride.rejected_by))
        .execute(&self.pool)
        .await
        .map_err(|e| match CoreError::from(e) {
            CoreError::DuplicateKey { .. } => CoreError::DuplicateKey {
                entity: "ride",
                id: ride.raid_id.clone(),
            },
            other => other,
        })?;
        Ok(())
    }

    async fn get_ride(&self, raid_id: &str) -> Result<Option<RideRecord>, CoreError> {
        let row = sqlx::query_as::<_, RideRow>(&format!(
            "SELECT {RIDE_COLUMNS} FROM rides WHERE raid_id = $1"
        ))
        .bind(raid_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(RideRecord::try_from).transpose()
    }

    async fn try_accept_ride(&self, raid_id: &str, driver_id: &str) -> Result<bool, CoreError> {
        // The transactional CAS for acceptance arbitration: only one caller
        // observes status = 'pending'.
        let result = sqlx::query(
            r#"
            UPDATE rides
            SET status = 'accepted', driver_id = $2, accepted_at = NOW()
            WHERE raid_id = $1 AND status = 'pending'
            "#,
        )
        .bind(raid_id)
        .bind(driver_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn transition_ride(
        &self,
        raid_id: &str,
        from: &[RideStatus],
        to: RideStatus,
    ) -> Result<bool, CoreError> {
        let from: Vec<String> = from.iter().map(|s| s.as_str().to_string()).collect();
        let timestamp_column = match to {
            RideStatus::Arrived => "arrived_at",
            RideStatus::Started => "started_at",
            RideStatus::Cancelled => "cancelled_at",
            RideStatus::Completed => "completed_at",
            RideStatus::Accepted => "accepted_at",
            RideStatus::Pending => "created_at",
        };
        let result = sqlx::query(&format!(
            r#"
            UPDATE rides
            SET status = $2, {timestamp_column} = NOW()
            WHERE raid_id = $1 AND status = ANY($3)
            "#
        ))
        .bind(raid_id)
        .bind(to.as_str())
        .bind(&from)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn complete_ride(
        &self,
        raid_id: &str,
        actuals: &RideActuals,
    ) -> Result<bool, CoreError> {
        // Completion is only reachable from 'started': the OTP gate on the
        // start transition cannot be bypassed by completing early.
        let result = sqlx::query(
            r#"
            UPDATE rides
            SET status = 'completed',
                completed_at = NOW(),
                actual_distance_km = $2,
                actual_fare = $3,
                actual_pickup = $4,
                actual_drop = $5
            WHERE raid_id = $1 AND status = 'started'
            "#,
        )
        .bind(raid_id)
        .bind(actuals.distance_km)
        .bind(actuals.fare)
        .bind(actuals.pickup.as_ref().map(Json))
        .bind(actuals.drop.as_ref().map(Json))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn append_ride_rejection(
        &self,
        raid_id: &str,
        rejection: &Rejection,
    ) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            UPDATE rides
            SET rejected_by = rejected_by || $2
            WHERE raid_id = $1
            "#,
        )
        .bind(raid_id)
        .bind(Json(vec![rejection.clone()]))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_transaction(&self, txn: &TransactionRecord) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO transactions (id, driver_id, amount, kind, method, description,
                                      balance_after, ride_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(txn.id)
        .bind(&txn.driver_id)
        .bind(txn.amount)
        .bind(txn.kind.as_str())
        .bind(txn.method.as_str())
        .bind(&txn.description)
        .bind(txn.balance_after)
        .bind(&txn.ride_id)
        .bind(txn.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_transactions(
        &self,
        driver_id: &str,
        limit: i64,
    ) -> Result<Vec<TransactionRecord>, CoreError> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, driver_id, amount, kind, method, description, balance_after, ride_id,
                   created_at
            FROM transactions
            WHERE driver_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(driver_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TransactionRecord::try_from).collect()
    }

    async fn insert_location_sample(
        &self,
        sample: &LocationSampleRecord,
    ) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO location_samples (subject_id, kind, lat, lng, ride_id, status, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&sample.subject_id)
        .bind(sample.kind.as_str())
        .bind(sample.lat)
        .bind(sample.lng)
        .bind(&sample.ride_id)
        .bind(&sample.status)
        .bind(sample.recorded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn next_ride_sequence(&self) -> Result<i64, CoreError> {
        // Single-statement increment with wrap recycling: exceeding 999999
        // restarts the sequence at 100000.
        let sequence: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sequence_counters (id, sequence)
            VALUES ('raid_id', 1)
            ON CONFLICT (id) DO UPDATE
            SET sequence = CASE
                WHEN sequence_counters.sequence >= 999999 THEN 100000
                ELSE sequence_counters.sequence + 1
            END
            RETURNING sequence
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(sequence)
    }

    async fn load_prices(&self) -> Result<Vec<(VehicleType, i64)>, CoreError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT vehicle_type, price_per_km FROM ride_prices")
                .fetch_all(&self.pool)
                .await?;
        let mut prices = Vec::with_capacity(rows.len());
        for (vehicle_type, per_km) in rows {
            prices.push((parse_enum(&vehicle_type, "vehicle_type")?, per_km));
        }
        Ok(prices)
    }

    async fn upsert_price(
        &self,
        vehicle_type: VehicleType,
        per_km: i64,
    ) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO ride_prices (vehicle_type, price_per_km)
            VALUES ($1, $2)
            ON CONFLICT (vehicle_type) DO UPDATE SET price_per_km = $2
            "#,
        )
        .bind(vehicle_type.as_str())
        .bind(per_km)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn health_check_db(&self) -> Result<bool, CoreError> {
        let row: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&self.pool).await?;
        Ok(row.0 == 1)
    }
}

// UserRecord maps straight off the row; no string enums involved.
impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for UserRecord {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(UserRecord {
            id: row.try_get("id")?,
            customer_id: row.try_get("customer_id")?,
            name: row.try_get("name")?,
            phone: row.try_get("phone")?,
            wallet: row.try_get("wallet")?,
        })
    }
}
