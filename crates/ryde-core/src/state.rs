// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Process-wide shared state.
//!
//! No ambient singletons: a single [`CoreState`] value is built at startup
//! and threaded through every handler. It owns the in-memory caches
//! (presence, dedup, active rides, pricing, timers), the fan-out registry,
//! the push sink, and the persistence handle.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::auth::TokenSigner;
use crate::config::Config;
use crate::model::{ActiveRide, DedupEntry};
use crate::persistence::Persistence;
use crate::presence::{PresenceRegistry, UserTrack};
use crate::pricing::PricingCache;
use crate::push::PushSink;
use crate::gateway::rooms::RoomRegistry;
use crate::wallet::WalletReceipt;
use crate::working_hours::TimerEntry;

/// Per-key async mutexes.
///
/// The driver row and the ride row are the serialisation points for their
/// mutations; these locks serialise the in-process decision trees around
/// the conditional updates (never held across an emit to another session).
#[derive(Default)]
pub struct KeyedLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `key`, creating it on first use.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}

/// Shared state for all handlers and background tasks.
pub struct CoreState {
    pub config: Config,
    pub store: Arc<dyn Persistence>,
    pub pricing: PricingCache,
    pub rooms: RoomRegistry,
    pub presence: PresenceRegistry,
    /// Pending/accepted rides mirrored in memory for dispatch bookkeeping.
    pub active_rides: DashMap<String, ActiveRide>,
    /// Booking dedup entries, keyed by payload fingerprint.
    pub dedup: DashMap<String, DedupEntry>,
    /// Passenger tracking during active rides, keyed by user id.
    pub user_tracks: DashMap<String, UserTrack>,
    /// Armed working-hours countdowns, keyed by driver id.
    pub timers: DashMap<String, TimerEntry>,
    /// Completed wallet operations kept briefly for retry idempotency.
    pub wallet_receipts: DashMap<String, WalletReceipt>,
    pub push: PushSink,
    pub tokens: TokenSigner,
    pub driver_locks: KeyedLocks,
    pub ride_locks: KeyedLocks,
}

impl CoreState {
    /// Build the shared state. The push sink starts only when provider
    /// credentials are configured; otherwise push degrades to a no-op.
    pub fn new(config: Config, store: Arc<dyn Persistence>) -> Arc<Self> {
        let push = match (&config.push_api_url, &config.push_api_key) {
            (Some(url), Some(key)) => {
                PushSink::start(url.clone(), key.clone(), config.push_deadline)
            }
            _ => PushSink::disabled(),
        };
        let tokens = TokenSigner::new(&config.token_secret);
        Arc::new(Self {
            store,
            pricing: PricingCache::new(),
            rooms: RoomRegistry::new(),
            presence: PresenceRegistry::new(),
            active_rides: DashMap::new(),
            dedup: DashMap::new(),
            user_tracks: DashMap::new(),
            timers: DashMap::new(),
            wallet_receipts: DashMap::new(),
            push,
            tokens,
            driver_locks: KeyedLocks::new(),
            ride_locks: KeyedLocks::new(),
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn keyed_locks_serialize_per_key() {
        let locks = Arc::new(KeyedLocks::new());
        let guard = locks.acquire("DRV001").await;

        // A different key is independent.
        let other = locks.acquire("DRV002").await;
        drop(other);

        // The same key waits until the first guard drops.
        let locks2 = locks.clone();
        let waiter = tokio::spawn(async move {
            let _guard = locks2.acquire("DRV001").await;
        });
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }
}
