// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Wallet ledger.
//!
//! Every wallet mutation is a single conditional update against the driver
//! row paired with exactly one Transaction record, followed by a
//! `walletUpdate` emission to the driver's private room. A failed store
//! call is retried once with backoff; before that retry, a receipt keyed by
//! (driver, method, ride, minute bucket) is consulted so a retry of an
//! operation that already committed does not charge twice. Receipts are
//! never consulted on the healthy path: distinct operations sharing the key
//! each mutate.

use chrono::Utc;
use std::time::{Duration, Instant};
use tracing::{error, instrument};
use uuid::Uuid;

use ryde_protocol::events::WalletUpdate;
use ryde_protocol::{ServerEvent, TransactionKind, TransactionMethod};

use crate::error::{CoreError, Result};
use crate::gateway::rooms::driver_room;
use crate::model::TransactionRecord;
use crate::state::CoreState;

/// How long a committed wallet operation shields its idempotency key.
pub const RECEIPT_TTL: Duration = Duration::from_secs(120);

const RETRY_BACKOFF: Duration = Duration::from_millis(200);

/// Cached outcome of a committed wallet operation.
#[derive(Debug, Clone)]
pub struct WalletReceipt {
    pub balance: i64,
    pub txn_id: Uuid,
    pub at: Instant,
}

/// What a wallet operation reports back.
#[derive(Debug, Clone)]
pub struct WalletOutcome {
    pub balance: i64,
    pub txn_id: Uuid,
    /// False when the result was answered from a retry receipt instead of
    /// a fresh mutation. Callers granting something in exchange for the
    /// charge must gate the grant on this.
    pub fresh: bool,
}

fn idempotency_key(
    driver_id: &str,
    kind: TransactionKind,
    method: TransactionMethod,
    ride_id: Option<&str>,
) -> String {
    let minute_bucket = Utc::now().timestamp() / 60;
    format!(
        "{}|{}|{}|{}|{}",
        driver_id,
        kind.as_str(),
        method.as_str(),
        ride_id.unwrap_or("-"),
        minute_bucket
    )
}

/// Debit a driver's wallet.
///
/// Fails with `INSUFFICIENT_BALANCE` (no state change, no transaction) when
/// the balance does not cover `amount`.
#[instrument(skip(state, description), fields(driver_id = %driver_id, amount = amount))]
pub async fn debit(
    state: &CoreState,
    driver_id: &str,
    amount: i64,
    method: TransactionMethod,
    description: &str,
    ride_id: Option<&str>,
) -> Result<WalletOutcome> {
    let key = idempotency_key(driver_id, TransactionKind::Debit, method, ride_id);

    let balance = match state.store.debit_driver_wallet(driver_id, amount).await {
        Ok(balance) => balance,
        Err(CoreError::StoreUnavailable { .. }) => {
            // Retry path only: the failing call may be a retry of an
            // operation that already committed, so the receipt is consulted
            // here and nowhere else.
            if let Some(receipt) = fresh_receipt(state, &key) {
                return Ok(WalletOutcome {
                    balance: receipt.balance,
                    txn_id: receipt.txn_id,
                    fresh: false,
                });
            }
            tokio::time::sleep(RETRY_BACKOFF).await;
            state.store.debit_driver_wallet(driver_id, amount).await?
        }
        Err(err) => return Err(err),
    };
    let balance = balance.ok_or(CoreError::InsufficientBalance { required: amount })?;

    let txn_id = record_and_announce(
        state,
        driver_id,
        amount,
        TransactionKind::Debit,
        method,
        description,
        ride_id,
        balance,
    )
    .await;

    state.wallet_receipts.insert(
        key,
        WalletReceipt {
            balance,
            txn_id,
            at: Instant::now(),
        },
    );
    Ok(WalletOutcome {
        balance,
        txn_id,
        fresh: true,
    })
}

/// Credit a driver's wallet.
#[instrument(skip(state, description), fields(driver_id = %driver_id, amount = amount))]
pub async fn credit(
    state: &CoreState,
    driver_id: &str,
    amount: i64,
    method: TransactionMethod,
    description: &str,
    ride_id: Option<&str>,
) -> Result<WalletOutcome> {
    let key = idempotency_key(driver_id, TransactionKind::Credit, method, ride_id);

    let balance = match state.store.credit_driver_wallet(driver_id, amount).await {
        Ok(balance) => balance,
        Err(CoreError::StoreUnavailable { .. }) => {
            if let Some(receipt) = fresh_receipt(state, &key) {
                return Ok(WalletOutcome {
                    balance: receipt.balance,
                    txn_id: receipt.txn_id,
                    fresh: false,
                });
            }
            tokio::time::sleep(RETRY_BACKOFF).await;
            state.store.credit_driver_wallet(driver_id, amount).await?
        }
        Err(err) => return Err(err),
    };

    let txn_id = record_and_announce(
        state,
        driver_id,
        amount,
        TransactionKind::Credit,
        method,
        description,
        ride_id,
        balance,
    )
    .await;

    state.wallet_receipts.insert(
        key,
        WalletReceipt {
            balance,
            txn_id,
            at: Instant::now(),
        },
    );
    Ok(WalletOutcome {
        balance,
        txn_id,
        fresh: true,
    })
}

/// Debit a passenger wallet under the same balance invariant. Passenger
/// wallets produce no driver Transaction and no `walletUpdate`.
pub async fn debit_user(state: &CoreState, user_id: Uuid, amount: i64) -> Result<i64> {
    state
        .store
        .debit_user_wallet(user_id, amount)
        .await?
        .ok_or(CoreError::InsufficientBalance { required: amount })
}

/// Credit a passenger wallet.
pub async fn credit_user(state: &CoreState, user_id: Uuid, amount: i64) -> Result<i64> {
    state.store.credit_user_wallet(user_id, amount).await
}

fn fresh_receipt(state: &CoreState, key: &str) -> Option<WalletReceipt> {
    let receipt = state.wallet_receipts.get(key)?;
    (receipt.at.elapsed() < RECEIPT_TTL).then(|| receipt.clone())
}

/// Evict expired idempotency receipts (called by the sweeper).
pub fn prune_receipts(state: &CoreState) {
    state
        .wallet_receipts
        .retain(|_, receipt| receipt.at.elapsed() < RECEIPT_TTL);
}

#[allow(clippy::too_many_arguments)]
async fn record_and_announce(
    state: &CoreState,
    driver_id: &str,
    amount: i64,
    kind: TransactionKind,
    method: TransactionMethod,
    description: &str,
    ride_id: Option<&str>,
    balance_after: i64,
) -> Uuid {
    let txn = TransactionRecord {
        id: Uuid::new_v4(),
        driver_id: driver_id.to_string(),
        amount,
        kind,
        method,
        description: description.to_string(),
        balance_after,
        ride_id: ride_id.map(str::to_string),
        created_at: Utc::now(),
    };
    if let Err(first) = state.store.insert_transaction(&txn).await {
        // The wallet is already committed; the paired record must land.
        tokio::time::sleep(RETRY_BACKOFF).await;
        if let Err(err) = state.store.insert_transaction(&txn).await {
            error!(
                driver_id = %driver_id,
                txn_id = %txn.id,
                first_error = %first,
                error = %err,
                "transaction record lost after committed wallet mutation"
            );
        }
    }

    state.rooms.emit_to_room(
        &driver_room(driver_id),
        &ServerEvent::WalletUpdate(WalletUpdate {
            balance: balance_after,
            amount,
            kind,
            method,
        }),
    );
    txn.id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::Persistence as _;
    use crate::testutil::{flaky_state, seed_driver, test_state};

    #[tokio::test]
    async fn debit_pairs_exactly_one_transaction() {
        let (state, store) = test_state();
        seed_driver(&store, "DRV001", 500).await;

        let outcome = debit(
            &state,
            "DRV001",
            100,
            TransactionMethod::ShiftStartFee,
            "Shift start fee",
            None,
        )
        .await
        .unwrap();
        assert_eq!(outcome.balance, 400);
        assert!(outcome.fresh);

        let txns = store.transactions_snapshot();
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].amount, 100);
        assert_eq!(txns[0].kind, TransactionKind::Debit);
        assert_eq!(txns[0].balance_after, 400);
    }

    #[tokio::test]
    async fn insufficient_balance_leaves_no_trace() {
        let (state, store) = test_state();
        seed_driver(&store, "DRV004", 50).await;

        let err = debit(
            &state,
            "DRV004",
            100,
            TransactionMethod::ShiftStartFee,
            "Shift start fee",
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CoreError::InsufficientBalance { .. }));

        let driver = store.get_driver("DRV004").await.unwrap().unwrap();
        assert_eq!(driver.wallet, 50);
        assert!(store.transactions_snapshot().is_empty());
    }

    #[tokio::test]
    async fn distinct_debits_in_the_same_minute_each_charge() {
        let (state, store) = test_state();
        seed_driver(&store, "DRV001", 500).await;

        // Two legitimate operations sharing the idempotency tuple must both
        // mutate; receipts only shield the store-failure retry path.
        for _ in 0..2 {
            let outcome = debit(
                &state,
                "DRV001",
                100,
                TransactionMethod::ExtendedHoursPurchase,
                "Extended hours purchase",
                None,
            )
            .await
            .unwrap();
            assert!(outcome.fresh);
        }

        let driver = store.get_driver("DRV001").await.unwrap().unwrap();
        assert_eq!(driver.wallet, 300);
        assert_eq!(store.transactions_snapshot().len(), 2);
    }

    #[tokio::test]
    async fn store_failure_is_retried_once_and_charges_once() {
        let (state, flaky, store) = flaky_state();
        seed_driver(&store, "DRV001", 500).await;

        flaky.fail_next_wallet_op();
        let outcome = debit(
            &state,
            "DRV001",
            100,
            TransactionMethod::ShiftStartFee,
            "Shift start fee",
            None,
        )
        .await
        .unwrap();
        assert!(outcome.fresh);
        assert_eq!(outcome.balance, 400);

        let driver = store.get_driver("DRV001").await.unwrap().unwrap();
        assert_eq!(driver.wallet, 400);
        assert_eq!(store.transactions_snapshot().len(), 1);
    }

    #[tokio::test]
    async fn retry_of_a_committed_debit_answers_from_the_receipt() {
        let (state, flaky, store) = flaky_state();
        seed_driver(&store, "DRV001", 500).await;

        // First invocation commits and leaves a receipt.
        let first = debit(
            &state,
            "DRV001",
            100,
            TransactionMethod::ShiftStartFee,
            "Shift start fee",
            None,
        )
        .await
        .unwrap();
        assert!(first.fresh);

        // The caller retry hits a flapping store: the receipt answers, no
        // second charge, no second transaction.
        flaky.fail_next_wallet_op();
        let second = debit(
            &state,
            "DRV001",
            100,
            TransactionMethod::ShiftStartFee,
            "Shift start fee",
            None,
        )
        .await
        .unwrap();
        assert!(!second.fresh);
        assert_eq!(second.balance, first.balance);
        assert_eq!(second.txn_id, first.txn_id);

        let driver = store.get_driver("DRV001").await.unwrap().unwrap();
        assert_eq!(driver.wallet, 400);
        assert_eq!(store.transactions_snapshot().len(), 1);
    }

    #[tokio::test]
    async fn credit_announces_the_new_balance() {
        let (state, store) = test_state();
        seed_driver(&store, "DRV001", 400).await;

        let outcome = credit(
            &state,
            "DRV001",
            81,
            TransactionMethod::RideFare,
            "Ride fare",
            Some("RID000001"),
        )
        .await
        .unwrap();
        assert_eq!(outcome.balance, 481);

        let txns = store.transactions_snapshot();
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].ride_id.as_deref(), Some("RID000001"));
        assert_eq!(txns[0].method, TransactionMethod::RideFare);
    }
}
