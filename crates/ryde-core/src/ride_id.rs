// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Ride identifier allocation.
//!
//! Normal path: atomic increment of the durable sequence counter, formatted
//! as `RID` + six zero-padded digits. On a store failure the allocator falls
//! back to a time-derived identifier; the insert's uniqueness constraint on
//! `raid_id` catches the rare collision and the caller retries.

use rand::Rng;
use tracing::warn;

use crate::error::CoreError;
use crate::persistence::Persistence;

/// Allocate the next ride identifier.
pub async fn next_raid_id(store: &dyn Persistence) -> Result<String, CoreError> {
    match store.next_ride_sequence().await {
        Ok(sequence) => Ok(format!("RID{:06}", sequence)),
        Err(err) => {
            warn!(error = %err, "sequence counter unavailable, using fallback ride id");
            Ok(fallback_raid_id())
        }
    }
}

/// Time-derived fallback: last 6 digits of unix-millis + 3 random digits.
fn fallback_raid_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix: u32 = rand::thread_rng().gen_range(0..1000);
    format!("RID{:06}{:03}", millis.rem_euclid(1_000_000), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::InMemoryPersistence;

    #[tokio::test]
    async fn first_allocation_is_rid000001() {
        let store = InMemoryPersistence::new();
        assert_eq!(next_raid_id(&store).await.unwrap(), "RID000001");
        assert_eq!(next_raid_id(&store).await.unwrap(), "RID000002");
    }

    #[tokio::test]
    async fn sequence_rolls_over_after_999999() {
        let store = InMemoryPersistence::new();
        store.set_sequence(999999);
        assert_eq!(next_raid_id(&store).await.unwrap(), "RID100000");
    }

    #[test]
    fn fallback_id_has_rid_prefix_and_nine_digits() {
        let id = fallback_raid_id();
        assert!(id.starts_with("RID"));
        assert_eq!(id.len(), 3 + 6 + 3);
        assert!(id[3..].chars().all(|c| c.is_ascii_digit()));
    }
}
