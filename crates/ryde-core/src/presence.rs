// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Driver presence and live-location fan-out.
//!
//! The presence map is process-local; per-driver entries follow a
//! single-writer convention (the connection that registered the driver owns
//! the entry, later registrations replace it). Receivers of the broadcasts
//! tolerate out-of-order samples by trusting the latest timestamp.

use dashmap::DashMap;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use ryde_protocol::events::{
    DriverLocation, DriverLocationsUpdate, RegisterDriver, RequestDriverLocations,
    UserLiveLocationUpdate, UserLocationUpdate,
};
use ryde_protocol::{DriverStatus, ServerEvent, VehicleType};

use crate::error::{CoreError, Result};
use crate::gateway::rooms::{driver_room, SessionId};
use crate::model::{DriverRecord, LocationSampleRecord, SampleKind};
use crate::state::CoreState;
use crate::wallet;

/// A driver older than this is no longer broadcast and is marked offline.
pub const ONLINE_WINDOW: Duration = Duration::from_secs(60);
/// Offline presence entries older than this are evicted.
const EVICT_AFTER: Duration = Duration::from_secs(5 * 60);
/// Pending rides older than this are evicted from memory (store row stays).
const ACTIVE_RIDE_TTL: Duration = Duration::from_secs(3 * 60 * 60);
/// Dedup entries older than this are evicted.
const DEDUP_TTL: Duration = Duration::from_secs(60);
/// Passenger tracking entries older than this are evicted.
const USER_TRACK_TTL: Duration = Duration::from_secs(30 * 60);
/// Cadence of the fleet-snapshot broadcast.
pub const BROADCAST_PERIOD: Duration = Duration::from_secs(3);
/// Cadence of the eviction sweep.
pub const SWEEP_PERIOD: Duration = Duration::from_secs(60);

/// In-memory presence of one online driver.
#[derive(Debug, Clone)]
pub struct PresenceEntry {
    pub session: Option<SessionId>,
    pub vehicle_type: VehicleType,
    pub lat: f64,
    pub lng: f64,
    pub status: DriverStatus,
    pub is_online: bool,
    pub last_update: Instant,
}

/// Passenger tracking during an active ride.
#[derive(Debug, Clone)]
pub struct UserTrack {
    pub ride_id: String,
    pub last_update: Instant,
}

/// Process-local map of online drivers.
#[derive(Default)]
pub struct PresenceRegistry {
    entries: DashMap<String, PresenceEntry>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a driver's entry (latest registration wins).
    pub fn upsert(&self, driver_id: &str, entry: PresenceEntry) {
        self.entries.insert(driver_id.to_string(), entry);
    }

    pub fn get(&self, driver_id: &str) -> Option<PresenceEntry> {
        self.entries.get(driver_id).map(|e| e.clone())
    }

    /// Update location and freshness, if the driver is registered.
    pub fn update_location(
        &self,
        driver_id: &str,
        lat: f64,
        lng: f64,
        status: Option<DriverStatus>,
    ) -> bool {
        match self.entries.get_mut(driver_id) {
            Some(mut entry) => {
                entry.lat = lat;
                entry.lng = lng;
                if let Some(status) = status {
                    entry.status = status;
                }
                entry.is_online = true;
                entry.last_update = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Refresh freshness without a location write.
    pub fn touch(&self, driver_id: &str) -> bool {
        match self.entries.get_mut(driver_id) {
            Some(mut entry) => {
                entry.last_update = Instant::now();
                entry.is_online = true;
                true
            }
            None => false,
        }
    }

    pub fn set_status(&self, driver_id: &str, status: DriverStatus) {
        if let Some(mut entry) = self.entries.get_mut(driver_id) {
            entry.status = status;
            entry.last_update = Instant::now();
        }
    }

    pub fn mark_offline(&self, driver_id: &str) {
        if let Some(mut entry) = self.entries.get_mut(driver_id) {
            entry.is_online = false;
            entry.status = DriverStatus::Offline;
        }
    }

    pub fn remove(&self, driver_id: &str) {
        self.entries.remove(driver_id);
    }

    /// Fresh online drivers as broadcast payload entries.
    pub fn online_snapshot(&self) -> Vec<DriverLocation> {
        self.entries
            .iter()
            .filter(|e| e.is_online && e.last_update.elapsed() < ONLINE_WINDOW)
            .map(|e| DriverLocation {
                driver_id: e.key().clone(),
                lat: e.lat,
                lng: e.lng,
                vehicle_type: e.vehicle_type,
                status: e.status,
            })
            .collect()
    }

    fn stale_online(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.is_online && e.last_update.elapsed() >= ONLINE_WINDOW)
            .map(|e| e.key().clone())
            .collect()
    }

    fn evictable(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| !e.is_online && e.last_update.elapsed() >= EVICT_AFTER)
            .map(|e| e.key().clone())
            .collect()
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Handle `registerDriver`.
///
/// The client-supplied vehicle type is untrusted (stale caches); the
/// authoritative value is re-read from the store and decides the dispatch
/// room.
#[instrument(skip(state, request), fields(driver_id = %request.driver_id))]
pub async fn handle_register_driver(
    state: &CoreState,
    session: SessionId,
    request: RegisterDriver,
) -> Result<DriverRecord> {
    let driver = state
        .store
        .get_driver(&request.driver_id)
        .await?
        .ok_or_else(|| CoreError::NotFound {
            entity: "driver",
            id: request.driver_id.clone(),
        })?;

    if let Some(hint) = request.vehicle_type {
        if hint != driver.vehicle_type {
            debug!(
                hint = %hint,
                actual = %driver.vehicle_type,
                "ignoring stale client vehicle type"
            );
        }
    }

    let lat = request.lat.or(driver.last_lat).unwrap_or(0.0);
    let lng = request.lng.or(driver.last_lng).unwrap_or(0.0);

    state.rooms.join(&driver.vehicle_type.room(), session);
    state.rooms.join(&driver_room(&driver.driver_id), session);

    state.presence.upsert(
        &driver.driver_id,
        PresenceEntry {
            session: Some(session),
            vehicle_type: driver.vehicle_type,
            lat,
            lng,
            status: DriverStatus::Live,
            is_online: true,
            last_update: Instant::now(),
        },
    );

    state
        .store
        .update_driver_status(&driver.driver_id, DriverStatus::Live)
        .await?;
    persist_driver_sample(state, &driver.driver_id, lat, lng, Some(DriverStatus::Live)).await;

    state
        .rooms
        .broadcast_all(&ServerEvent::DriverLiveLocationUpdate(DriverLocation {
            driver_id: driver.driver_id.clone(),
            lat,
            lng,
            vehicle_type: driver.vehicle_type,
            status: DriverStatus::Live,
        }));

    info!(vehicle_type = %driver.vehicle_type, "driver registered");
    Ok(driver)
}

/// Handle `driverLocationUpdate`.
#[instrument(skip(state), fields(driver_id = %driver_id))]
pub async fn handle_location_update(
    state: &CoreState,
    driver_id: &str,
    lat: f64,
    lng: f64,
    status: Option<DriverStatus>,
) -> Result<()> {
    if !state.presence.update_location(driver_id, lat, lng, status) {
        // Location before registration: accept it, but presence stays
        // driven by registerDriver for room membership.
        let driver = state
            .store
            .get_driver(driver_id)
            .await?
            .ok_or_else(|| CoreError::NotFound {
                entity: "driver",
                id: driver_id.to_string(),
            })?;
        state.presence.upsert(
            driver_id,
            PresenceEntry {
                session: None,
                vehicle_type: driver.vehicle_type,
                lat,
                lng,
                status: status.unwrap_or(driver.status),
                is_online: true,
                last_update: Instant::now(),
            },
        );
    }

    state.store.update_driver_location(driver_id, lat, lng).await?;
    persist_driver_sample(state, driver_id, lat, lng, status).await;

    if let Some(entry) = state.presence.get(driver_id) {
        state
            .rooms
            .broadcast_all(&ServerEvent::DriverLiveLocationUpdate(DriverLocation {
                driver_id: driver_id.to_string(),
                lat,
                lng,
                vehicle_type: entry.vehicle_type,
                status: entry.status,
            }));
    }
    Ok(())
}

/// Handle `requestDriverLocations` / `requestNearbyDrivers`: the current
/// online set, bounding-box filtered when a radius is supplied.
pub fn handle_request_driver_locations(
    state: &CoreState,
    request: &RequestDriverLocations,
) -> DriverLocationsUpdate {
    let mut drivers = state.presence.online_snapshot();
    if let Some(vehicle_type) = request.vehicle_type {
        drivers.retain(|d| d.vehicle_type == vehicle_type);
    }
    if let (Some(lat), Some(lng), Some(radius)) = (request.lat, request.lng, request.radius) {
        // Bounding box only; one degree is roughly 111 km.
        let half_width = radius.max(0.0) / 111.0;
        drivers.retain(|d| {
            (d.lat - lat).abs() <= half_width && (d.lng - lng).abs() <= half_width
        });
    }
    DriverLocationsUpdate { drivers }
}

/// Handle `userLocationUpdate`: persist the sample and forward it to the
/// assigned driver, if any.
#[instrument(skip(state, request), fields(ride_id = %request.ride_id))]
pub async fn handle_user_location_update(
    state: &CoreState,
    request: UserLocationUpdate,
) -> Result<()> {
    // The id may be the internal uuid or the external customer id.
    let user_id = match request.user_id.parse::<Uuid>() {
        Ok(id) => id.to_string(),
        Err(_) => state
            .store
            .get_user_by_customer_id(&request.user_id)
            .await?
            .map(|u| u.id.to_string())
            .ok_or_else(|| CoreError::NotFound {
                entity: "user",
                id: request.user_id.clone(),
            })?,
    };

    state
        .store
        .insert_location_sample(&LocationSampleRecord {
            subject_id: user_id.clone(),
            kind: SampleKind::User,
            lat: request.latitude,
            lng: request.longitude,
            ride_id: Some(request.ride_id.clone()),
            status: None,
            recorded_at: chrono::Utc::now(),
        })
        .await?;

    state.user_tracks.insert(
        user_id.clone(),
        UserTrack {
            ride_id: request.ride_id.clone(),
            last_update: Instant::now(),
        },
    );

    let assigned_driver = match state.active_rides.get(&request.ride_id) {
        Some(active) => active.driver_id.clone(),
        None => state
            .store
            .get_ride(&request.ride_id)
            .await?
            .and_then(|r| r.driver_id),
    };

    // No driver yet: the sample is persisted but not forwarded.
    if let Some(driver_id) = assigned_driver {
        state.rooms.emit_to_room(
            &driver_room(&driver_id),
            &ServerEvent::UserLiveLocationUpdate(UserLiveLocationUpdate {
                user_id,
                ride_id: request.ride_id,
                lat: request.latitude,
                lng: request.longitude,
            }),
        );
    }
    Ok(())
}

async fn persist_driver_sample(
    state: &CoreState,
    driver_id: &str,
    lat: f64,
    lng: f64,
    status: Option<DriverStatus>,
) {
    let sample = LocationSampleRecord {
        subject_id: driver_id.to_string(),
        kind: SampleKind::Driver,
        lat,
        lng,
        ride_id: None,
        status: status.map(|s| s.as_str().to_string()),
        recorded_at: chrono::Utc::now(),
    };
    // Location history is best-effort; presence and fan-out continue when
    // the store hiccups.
    if let Err(err) = state.store.insert_location_sample(&sample).await {
        warn!(driver_id = %driver_id, error = %err, "location sample not persisted");
    }
}

// ============================================================================
// Background tasks
// ============================================================================

/// Periodic fleet-snapshot broadcaster (3s cadence).
pub async fn run_broadcaster(state: std::sync::Arc<CoreState>, mut shutdown: watch::Receiver<bool>) {
    info!(period_secs = BROADCAST_PERIOD.as_secs(), "location broadcaster started");
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("location broadcaster shutting down");
                    break;
                }
            }
            _ = tokio::time::sleep(BROADCAST_PERIOD) => {
                let drivers = state.presence.online_snapshot();
                if !drivers.is_empty() {
                    state
                        .rooms
                        .broadcast_all(&ServerEvent::DriverLocationsUpdate(DriverLocationsUpdate {
                            drivers,
                        }));
                }
            }
        }
    }
}

/// Periodic eviction sweeper (60s cadence).
pub async fn run_sweeper(state: std::sync::Arc<CoreState>, mut shutdown: watch::Receiver<bool>) {
    info!(period_secs = SWEEP_PERIOD.as_secs(), "presence sweeper started");
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("presence sweeper shutting down");
                    break;
                }
            }
            _ = tokio::time::sleep(SWEEP_PERIOD) => {
                sweep_once(&state).await;
            }
        }
    }
}

/// One sweep pass. Separated from the loop so tests can drive it directly.
pub async fn sweep_once(state: &CoreState) {
    // (a) Silent drivers are treated as offline.
    for driver_id in state.presence.stale_online() {
        state.presence.mark_offline(&driver_id);
        if let Err(err) = state
            .store
            .update_driver_status(&driver_id, DriverStatus::Offline)
            .await
        {
            warn!(driver_id = %driver_id, error = %err, "offline mark not persisted");
        }
        debug!(driver_id = %driver_id, "presence timed out");
    }

    // (b) Long-offline entries are evicted.
    for driver_id in state.presence.evictable() {
        state.presence.remove(&driver_id);
    }

    // (c) Stale pending rides leave memory; the store row persists.
    state
        .active_rides
        .retain(|_, ride| ride.created_at_monotonic.elapsed() < ACTIVE_RIDE_TTL);

    // (d) Expired dedup entries.
    state
        .dedup
        .retain(|_, entry| entry.last_emitted_at.elapsed() < DEDUP_TTL);

    // (e) Stale passenger tracking.
    state
        .user_tracks
        .retain(|_, track| track.last_update.elapsed() < USER_TRACK_TTL);

    wallet::prune_receipts(state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::Persistence as _;
    use crate::testutil::{attach_session, drain_frames, seed_driver_with, test_state};

    #[tokio::test]
    async fn register_uses_store_vehicle_type_not_client_hint() {
        let (state, store) = test_state();
        seed_driver_with(&store, "DRV010", 500, VehicleType::Taxi, 12).await;
        let (session, _rx) = attach_session(&state);

        let driver = handle_register_driver(
            &state,
            session,
            RegisterDriver {
                driver_id: "DRV010".to_string(),
                lat: Some(11.0),
                lng: Some(77.0),
                // Stale client cache claims bike.
                vehicle_type: Some(VehicleType::Bike),
                token: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(driver.vehicle_type, VehicleType::Taxi);
        assert_eq!(state.rooms.room_size("drivers_taxi"), 1);
        assert_eq!(state.rooms.room_size("drivers_bike"), 0);
        let entry = state.presence.get("DRV010").unwrap();
        assert_eq!(entry.vehicle_type, VehicleType::Taxi);
    }

    #[tokio::test]
    async fn register_persists_live_status_and_sample() {
        let (state, store) = test_state();
        seed_driver_with(&store, "DRV011", 500, VehicleType::Bike, 12).await;
        let (session, _rx) = attach_session(&state);

        handle_register_driver(
            &state,
            session,
            RegisterDriver {
                driver_id: "DRV011".to_string(),
                lat: Some(11.0),
                lng: Some(77.0),
                vehicle_type: None,
                token: None,
            },
        )
        .await
        .unwrap();

        let driver = store.get_driver("DRV011").await.unwrap().unwrap();
        assert_eq!(driver.status, DriverStatus::Live);
        assert_eq!(store.samples_snapshot().len(), 1);
    }

    #[tokio::test]
    async fn location_update_broadcasts_to_observers() {
        let (state, store) = test_state();
        seed_driver_with(&store, "DRV012", 500, VehicleType::Bike, 12).await;
        let (session, _rx) = attach_session(&state);
        let (_observer, mut observer_rx) = attach_session(&state);

        handle_register_driver(
            &state,
            session,
            RegisterDriver {
                driver_id: "DRV012".to_string(),
                lat: Some(11.0),
                lng: Some(77.0),
                vehicle_type: None,
                token: None,
            },
        )
        .await
        .unwrap();
        drain_frames(&mut observer_rx);

        handle_location_update(&state, "DRV012", 11.5, 77.5, None)
            .await
            .unwrap();
        let frames = drain_frames(&mut observer_rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["event"], "driverLiveLocationUpdate");
        assert_eq!(frames[0]["data"]["driverId"], "DRV012");
    }

    #[tokio::test]
    async fn bounding_box_filter_applies_when_radius_given() {
        let (state, store) = test_state();
        seed_driver_with(&store, "DRVNEAR", 0, VehicleType::Bike, 12).await;
        seed_driver_with(&store, "DRVFAR", 0, VehicleType::Bike, 12).await;
        state.presence.upsert(
            "DRVNEAR",
            PresenceEntry {
                session: None,
                vehicle_type: VehicleType::Bike,
                lat: 11.0,
                lng: 77.0,
                status: DriverStatus::Live,
                is_online: true,
                last_update: Instant::now(),
            },
        );
        state.presence.upsert(
            "DRVFAR",
            PresenceEntry {
                session: None,
                vehicle_type: VehicleType::Bike,
                lat: 13.0,
                lng: 80.0,
                status: DriverStatus::Live,
                is_online: true,
                last_update: Instant::now(),
            },
        );

        let update = handle_request_driver_locations(
            &state,
            &RequestDriverLocations {
                lat: Some(11.0),
                lng: Some(77.0),
                radius: Some(5.0),
                vehicle_type: None,
            },
        );
        assert_eq!(update.drivers.len(), 1);
        assert_eq!(update.drivers[0].driver_id, "DRVNEAR");
    }

    #[tokio::test]
    async fn user_location_without_assigned_driver_is_persisted_not_forwarded() {
        let (state, store) = test_state();
        let user_id = crate::testutil::seed_user(&store, "CUS0065", 0).await;

        handle_user_location_update(
            &state,
            UserLocationUpdate {
                user_id: user_id.to_string(),
                ride_id: "RID000404".to_string(),
                latitude: 11.0,
                longitude: 77.0,
            },
        )
        .await
        .unwrap();

        assert_eq!(store.samples_snapshot().len(), 1);
        assert!(state.user_tracks.contains_key(&user_id.to_string()));
    }
}
