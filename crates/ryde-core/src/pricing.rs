// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-vehicle-type pricing cache.
//!
//! Initialized from the store on startup, replaced atomically on admin
//! writes; readers always see a consistent snapshot. Fare calculation never
//! returns a non-positive fare for a positive distance: missing or
//! non-positive prices fall back to the built-in defaults.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use ryde_protocol::events::PriceTable;
use ryde_protocol::VehicleType;

use crate::error::CoreError;
use crate::persistence::Persistence;

/// Built-in per-km defaults, applied when the store has no (valid) price.
pub const DEFAULT_PRICES: [(VehicleType, i64); 3] = [
    (VehicleType::Bike, 15),
    (VehicleType::Taxi, 40),
    (VehicleType::Port, 75),
];

/// Atomic snapshot cache of per-km prices.
pub struct PricingCache {
    snapshot: RwLock<Arc<HashMap<VehicleType, i64>>>,
}

impl Default for PricingCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PricingCache {
    /// Cache seeded with the built-in defaults.
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(DEFAULT_PRICES.into_iter().collect())),
        }
    }

    /// Replace the cache from the store, keeping defaults for vehicle types
    /// the store does not cover.
    pub async fn load_from_store(&self, store: &dyn Persistence) -> Result<(), CoreError> {
        let mut prices: HashMap<VehicleType, i64> = DEFAULT_PRICES.into_iter().collect();
        for (vehicle_type, per_km) in store.load_prices().await? {
            if per_km > 0 {
                prices.insert(vehicle_type, per_km);
            }
        }
        self.replace(prices);
        Ok(())
    }

    fn replace(&self, prices: HashMap<VehicleType, i64>) {
        let mut guard = self
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(prices);
    }

    fn snapshot(&self) -> Arc<HashMap<VehicleType, i64>> {
        self.snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Effective per-km price for a vehicle type.
    pub fn price_per_km(&self, vehicle_type: VehicleType) -> i64 {
        let snapshot = self.snapshot();
        match snapshot.get(&vehicle_type) {
            Some(price) if *price > 0 => *price,
            _ => default_price(vehicle_type),
        }
    }

    /// Authoritative fare: `round(km * price)`.
    pub fn calculate_fare(&self, vehicle_type: VehicleType, distance_km: f64) -> i64 {
        let km = distance_km.max(0.0);
        (km * self.price_per_km(vehicle_type) as f64).round() as i64
    }

    /// Apply an admin price write and return the new table for broadcast.
    pub fn update(&self, vehicle_type: VehicleType, per_km: i64) -> PriceTable {
        let mut prices: HashMap<VehicleType, i64> = self.snapshot().as_ref().clone();
        if per_km > 0 {
            prices.insert(vehicle_type, per_km);
        }
        self.replace(prices);
        self.table()
    }

    /// The current table, for `currentPrices` / `priceUpdate`.
    pub fn table(&self) -> PriceTable {
        self.snapshot().iter().map(|(k, v)| (*k, *v)).collect()
    }
}

fn default_price(vehicle_type: VehicleType) -> i64 {
    DEFAULT_PRICES
        .iter()
        .find(|(v, _)| *v == vehicle_type)
        .map(|(_, p)| *p)
        .unwrap_or(15)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::InMemoryPersistence;

    #[test]
    fn fare_is_rounded_km_times_price() {
        let cache = PricingCache::new();
        // S1: 5.4 km on a bike at 15/km.
        assert_eq!(cache.calculate_fare(VehicleType::Bike, 5.4), 81);
        assert_eq!(cache.calculate_fare(VehicleType::Taxi, 2.0), 80);
        assert_eq!(cache.calculate_fare(VehicleType::Port, 1.1), 83);
    }

    #[test]
    fn zero_distance_is_zero_fare() {
        let cache = PricingCache::new();
        assert_eq!(cache.calculate_fare(VehicleType::Bike, 0.0), 0);
    }

    #[test]
    fn non_positive_price_falls_back_to_default() {
        let cache = PricingCache::new();
        cache.update(VehicleType::Bike, 0);
        assert_eq!(cache.price_per_km(VehicleType::Bike), 15);
    }

    #[test]
    fn update_replaces_the_snapshot() {
        let cache = PricingCache::new();
        let table = cache.update(VehicleType::Taxi, 55);
        assert_eq!(table.get(&VehicleType::Taxi), Some(&55));
        assert_eq!(cache.calculate_fare(VehicleType::Taxi, 2.0), 110);
    }

    #[tokio::test]
    async fn load_from_store_keeps_defaults_for_missing_types() {
        let store = InMemoryPersistence::new();
        store.upsert_price(VehicleType::Taxi, 45).await.unwrap();
        let cache = PricingCache::new();
        cache.load_from_store(&store).await.unwrap();
        assert_eq!(cache.price_per_km(VehicleType::Taxi), 45);
        assert_eq!(cache.price_per_km(VehicleType::Bike), 15);
        assert_eq!(cache.price_per_km(VehicleType::Port), 75);
    }
}
