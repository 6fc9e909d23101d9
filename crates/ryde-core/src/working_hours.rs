// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Working-hours timer service.
//!
//! Per-driver countdown at 1s tick granularity. The start decision tree
//! (duplicate start, resume, new shift) is evaluated under the driver lock
//! and is the sole debit site for the shift-start fee; a resume (remaining
//! seconds left, timer inactive) never debits. Expiry auto-debits the
//! extension fee when the wallet covers it, otherwise stops the driver.
//! The running countdown is authoritative in memory and checkpointed to the
//! store periodically and on every transition.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use ryde_protocol::events::{AutoStop, WorkingHoursWarning};
use ryde_protocol::{DriverStatus, ServerEvent, TransactionMethod};

use crate::error::{CoreError, Result};
use crate::gateway::rooms::driver_room;
use crate::model::{DriverRecord, WorkingHoursUpdate};
use crate::push::PushMessage;
use crate::state::CoreState;
use crate::wallet;

/// Fee taken once per contiguous online session.
pub const SHIFT_START_FEE: i64 = 100;
/// Hours granted by a successful expiry auto-debit.
pub const AUTO_EXTEND_HOURS: i64 = 12;
/// Countdown checkpoint cadence, in ticks.
const PERSIST_EVERY_TICKS: u32 = 60;

/// Warning tiers: remaining seconds at which each fires.
const WARNING_TIERS: [(i64, i64); 3] = [(3600, 1), (1800, 2), (600, 3)];

/// An armed countdown.
#[derive(Debug, Clone)]
pub struct TimerEntry {
    pub remaining_seconds: i64,
    pub warnings_issued: i64,
    ticks_since_persist: u32,
}

/// What the start decision tree reports back.
#[derive(Debug, Clone)]
pub struct StartOutcome {
    pub amount_deducted: i64,
    pub remaining_seconds: i64,
    pub resumed: bool,
    pub new_balance: Option<i64>,
}

/// Timer state snapshot for the status endpoint.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub remaining_seconds: i64,
    pub timer_active: bool,
    pub warnings_issued: i64,
    pub status: DriverStatus,
    pub working_hours_limit: i64,
}

fn arm(state: &CoreState, driver_id: &str, remaining_seconds: i64, warnings_issued: i64) {
    state.timers.insert(
        driver_id.to_string(),
        TimerEntry {
            remaining_seconds,
            warnings_issued,
            ticks_since_persist: 0,
        },
    );
}

async fn load_driver(state: &CoreState, driver_id: &str) -> Result<DriverRecord> {
    state
        .store
        .get_driver(driver_id)
        .await?
        .ok_or_else(|| CoreError::NotFound {
            entity: "driver",
            id: driver_id.to_string(),
        })
}

/// Start or resume a shift (`driverGoOnline`).
#[instrument(skip(state), fields(driver_id = %driver_id))]
pub async fn start(state: &CoreState, driver_id: &str) -> Result<StartOutcome> {
    let _guard = state.driver_locks.acquire(driver_id).await;
    let driver = load_driver(state, driver_id).await?;

    // Duplicate start: already live with an armed countdown.
    if driver.status == DriverStatus::Live && driver.timer_active {
        if let Some(entry) = state.timers.get(driver_id) {
            return Ok(StartOutcome {
                amount_deducted: 0,
                remaining_seconds: entry.remaining_seconds,
                resumed: false,
                new_balance: None,
            });
        }
    }

    // Resume: seconds left from an earlier session, timer parked.
    if driver.remaining_working_seconds > 0 && !driver.timer_active {
        arm(
            state,
            driver_id,
            driver.remaining_working_seconds,
            driver.warnings_issued,
        );
        state
            .store
            .update_working_hours(
                driver_id,
                &WorkingHoursUpdate {
                    remaining_working_seconds: driver.remaining_working_seconds,
                    timer_active: true,
                    warnings_issued: driver.warnings_issued,
                    extended_hours_purchased: driver.extended_hours_purchased,
                    wallet_deducted: driver.wallet_deducted,
                    status: DriverStatus::Live,
                },
            )
            .await?;
        state.presence.set_status(driver_id, DriverStatus::Live);
        info!(
            remaining = driver.remaining_working_seconds,
            "shift resumed without debit"
        );
        return Ok(StartOutcome {
            amount_deducted: 0,
            remaining_seconds: driver.remaining_working_seconds,
            resumed: true,
            new_balance: None,
        });
    }

    // New shift: the only path that takes the shift-start fee.
    if driver.wallet < SHIFT_START_FEE {
        return Err(CoreError::InsufficientBalance {
            required: SHIFT_START_FEE,
        });
    }
    let charge = wallet::debit(
        state,
        driver_id,
        SHIFT_START_FEE,
        TransactionMethod::ShiftStartFee,
        "Shift start fee",
        None,
    )
    .await?;

    let remaining = driver.working_hours_limit * 3600;
    state
        .store
        .update_working_hours(
            driver_id,
            &WorkingHoursUpdate {
                remaining_working_seconds: remaining,
                timer_active: true,
                warnings_issued: 0,
                extended_hours_purchased: false,
                wallet_deducted: true,
                status: DriverStatus::Live,
            },
        )
        .await?;
    arm(state, driver_id, remaining, 0);
    state.presence.set_status(driver_id, DriverStatus::Live);

    info!(remaining, balance = charge.balance, "new shift started");
    Ok(StartOutcome {
        amount_deducted: SHIFT_START_FEE,
        remaining_seconds: remaining,
        resumed: false,
        new_balance: Some(charge.balance),
    })
}

/// Pause the countdown and go offline (`driverOffline`). Never debits.
#[instrument(skip(state), fields(driver_id = %driver_id))]
pub async fn stop(state: &CoreState, driver_id: &str) -> Result<i64> {
    let _guard = state.driver_locks.acquire(driver_id).await;
    let driver = load_driver(state, driver_id).await?;

    let (remaining, warnings) = match state.timers.remove(driver_id) {
        Some((_, entry)) => (entry.remaining_seconds, entry.warnings_issued),
        None => (driver.remaining_working_seconds, driver.warnings_issued),
    };

    state
        .store
        .update_working_hours(
            driver_id,
            &WorkingHoursUpdate {
                remaining_working_seconds: remaining,
                timer_active: false,
                warnings_issued: warnings,
                extended_hours_purchased: driver.extended_hours_purchased,
                wallet_deducted: driver.wallet_deducted,
                status: DriverStatus::Offline,
            },
        )
        .await?;
    state.presence.mark_offline(driver_id);

    info!(remaining, "shift paused");
    Ok(remaining)
}

/// Manual extension purchase: debits the deduction amount, adds hours,
/// resets the warning tier.
#[instrument(skip(state), fields(driver_id = %driver_id, additional_hours = additional_hours))]
pub async fn extend(
    state: &CoreState,
    driver_id: &str,
    additional_hours: i64,
) -> Result<StartOutcome> {
    if additional_hours <= 0 {
        return Err(CoreError::InvalidInput {
            field: "additionalHours".to_string(),
            message: "must be positive".to_string(),
        });
    }
    let _guard = state.driver_locks.acquire(driver_id).await;
    let driver = load_driver(state, driver_id).await?;

    let charge = wallet::debit(
        state,
        driver_id,
        driver.working_hours_deduction_amount,
        TransactionMethod::ExtendedHoursPurchase,
        "Extended hours purchase",
        None,
    )
    .await?;

    // A retry answered from the wallet receipt already granted its time.
    if !charge.fresh {
        return Ok(StartOutcome {
            amount_deducted: driver.working_hours_deduction_amount,
            remaining_seconds: current_remaining(state, driver_id, &driver),
            resumed: false,
            new_balance: Some(charge.balance),
        });
    }

    let remaining = add_seconds(state, driver_id, &driver, additional_hours * 3600, true).await?;
    Ok(StartOutcome {
        amount_deducted: driver.working_hours_deduction_amount,
        remaining_seconds: remaining,
        resumed: false,
        new_balance: Some(charge.balance),
    })
}

/// Half/full time purchase. The price follows the shift length: a 12h limit
/// buys half for 50 and full for 100, a 24h limit doubles both.
#[instrument(skip(state), fields(driver_id = %driver_id, full = full))]
pub async fn add_time(state: &CoreState, driver_id: &str, full: bool) -> Result<StartOutcome> {
    let _guard = state.driver_locks.acquire(driver_id).await;
    let driver = load_driver(state, driver_id).await?;

    let base = if driver.working_hours_limit >= 24 { 100 } else { 50 };
    let amount = if full { base * 2 } else { base };
    let method = if full {
        TransactionMethod::ExtraFullTime
    } else {
        TransactionMethod::ExtraHalfTime
    };
    let added_seconds = if full {
        driver.working_hours_limit * 3600
    } else {
        driver.working_hours_limit * 1800
    };

    let charge = wallet::debit(
        state,
        driver_id,
        amount,
        method,
        if full { "Extra full time" } else { "Extra half time" },
        None,
    )
    .await?;

    // A retry answered from the wallet receipt already granted its time.
    if !charge.fresh {
        return Ok(StartOutcome {
            amount_deducted: amount,
            remaining_seconds: current_remaining(state, driver_id, &driver),
            resumed: false,
            new_balance: Some(charge.balance),
        });
    }

    let remaining = add_seconds(state, driver_id, &driver, added_seconds, false).await?;
    Ok(StartOutcome {
        amount_deducted: amount,
        remaining_seconds: remaining,
        resumed: false,
        new_balance: Some(charge.balance),
    })
}

fn current_remaining(state: &CoreState, driver_id: &str, driver: &DriverRecord) -> i64 {
    state
        .timers
        .get(driver_id)
        .map(|entry| entry.remaining_seconds)
        .unwrap_or(driver.remaining_working_seconds)
}

async fn add_seconds(
    state: &CoreState,
    driver_id: &str,
    driver: &DriverRecord,
    seconds: i64,
    reset_warnings: bool,
) -> Result<i64> {
    let (remaining, warnings) = match state.timers.get_mut(driver_id) {
        Some(mut entry) => {
            entry.remaining_seconds += seconds;
            if reset_warnings {
                entry.warnings_issued = 0;
            }
            (entry.remaining_seconds, entry.warnings_issued)
        }
        None => {
            let remaining = driver.remaining_working_seconds + seconds;
            let warnings = if reset_warnings { 0 } else { driver.warnings_issued };
            (remaining, warnings)
        }
    };
    state
        .store
        .persist_remaining_seconds(driver_id, remaining, warnings)
        .await?;
    Ok(remaining)
}

/// Timer snapshot for the status endpoint: live countdown if armed, stored
/// fields otherwise.
pub async fn status_snapshot(state: &CoreState, driver_id: &str) -> Result<TimerSnapshot> {
    let driver = load_driver(state, driver_id).await?;
    match state.timers.get(driver_id) {
        Some(entry) => Ok(TimerSnapshot {
            remaining_seconds: entry.remaining_seconds,
            timer_active: true,
            warnings_issued: entry.warnings_issued,
            status: driver.status,
            working_hours_limit: driver.working_hours_limit,
        }),
        None => Ok(TimerSnapshot {
            remaining_seconds: driver.remaining_working_seconds,
            timer_active: driver.timer_active,
            warnings_issued: driver.warnings_issued,
            status: driver.status,
            working_hours_limit: driver.working_hours_limit,
        }),
    }
}

/// Re-arm countdowns for drivers that were mid-shift at the last shutdown.
pub async fn recover(state: &CoreState) -> Result<usize> {
    let drivers = state.store.list_armed_timers().await?;
    let count = drivers.len();
    for driver in drivers {
        arm(
            state,
            &driver.driver_id,
            driver.remaining_working_seconds,
            driver.warnings_issued,
        );
    }
    if count > 0 {
        info!(count, "recovered armed working-hours timers");
    }
    Ok(count)
}

// ============================================================================
// Ticking
// ============================================================================

enum TickAction {
    Warn {
        driver_id: String,
        tier: i64,
        remaining: i64,
    },
    Checkpoint {
        driver_id: String,
        remaining: i64,
        warnings: i64,
    },
    Expire {
        driver_id: String,
    },
}

/// One tick over every armed countdown.
///
/// Mutation of the timer map happens synchronously; store writes and
/// emissions happen afterwards so no map lock is held across a suspension
/// point.
pub async fn tick_all(state: &CoreState) {
    let mut actions = Vec::new();

    for mut entry in state.timers.iter_mut() {
        let driver_id = entry.key().clone();
        entry.remaining_seconds -= 1;
        entry.ticks_since_persist += 1;

        if entry.remaining_seconds <= 0 {
            actions.push(TickAction::Expire { driver_id });
            continue;
        }

        for (threshold, tier) in WARNING_TIERS {
            if entry.remaining_seconds == threshold && entry.warnings_issued < tier {
                entry.warnings_issued = tier;
                actions.push(TickAction::Warn {
                    driver_id: driver_id.clone(),
                    tier,
                    remaining: entry.remaining_seconds,
                });
            }
        }

        if entry.ticks_since_persist >= PERSIST_EVERY_TICKS {
            entry.ticks_since_persist = 0;
            actions.push(TickAction::Checkpoint {
                driver_id,
                remaining: entry.remaining_seconds,
                warnings: entry.warnings_issued,
            });
        }
    }

    for action in actions {
        match action {
            TickAction::Warn {
                driver_id,
                tier,
                remaining,
            } => issue_warning(state, &driver_id, tier, remaining).await,
            TickAction::Checkpoint {
                driver_id,
                remaining,
                warnings,
            } => {
                if let Err(err) = state
                    .store
                    .persist_remaining_seconds(&driver_id, remaining, warnings)
                    .await
                {
                    warn!(driver_id = %driver_id, error = %err, "countdown checkpoint failed");
                }
            }
            TickAction::Expire { driver_id } => {
                // The entry leaves the wheel; a successful auto-debit
                // re-arms it.
                state.timers.remove(&driver_id);
                handle_expiry(state, &driver_id).await;
            }
        }
    }
}

async fn issue_warning(state: &CoreState, driver_id: &str, tier: i64, remaining: i64) {
    let message = match tier {
        1 => "1 hour of working time remaining",
        2 => "30 minutes of working time remaining",
        _ => "10 minutes of working time remaining",
    };
    info!(driver_id = %driver_id, tier, remaining, "working-hours warning");

    if let Err(err) = state
        .store
        .persist_remaining_seconds(driver_id, remaining, tier)
        .await
    {
        warn!(driver_id = %driver_id, error = %err, "warning persist failed");
    }

    state.rooms.emit_to_room(
        &driver_room(driver_id),
        &ServerEvent::WorkingHoursWarning(WorkingHoursWarning {
            warning: tier as u8,
            remaining_seconds: remaining,
            message: message.to_string(),
        }),
    );

    if let Ok(Some(driver)) = state.store.get_driver(driver_id).await {
        if let Some(token) = driver.push_token.filter(|t| !t.is_empty()) {
            state.push.enqueue(PushMessage {
                token,
                title: "Working hours".to_string(),
                body: message.to_string(),
                data: serde_json::json!({ "warning": tier, "remainingSeconds": remaining }),
            });
        }
    }
}

async fn handle_expiry(state: &CoreState, driver_id: &str) {
    let _guard = state.driver_locks.acquire(driver_id).await;
    let driver = match state.store.get_driver(driver_id).await {
        Ok(Some(driver)) => driver,
        Ok(None) => return,
        Err(err) => {
            warn!(driver_id = %driver_id, error = %err, "expiry load failed");
            return;
        }
    };

    if driver.wallet >= driver.working_hours_deduction_amount {
        match wallet::debit(
            state,
            driver_id,
            driver.working_hours_deduction_amount,
            TransactionMethod::ExtendedHoursAutoDebit,
            "Extended hours auto debit",
            None,
        )
        .await
        {
            Ok(_) => {
                let remaining = AUTO_EXTEND_HOURS * 3600;
                if let Err(err) = state
                    .store
                    .update_working_hours(
                        driver_id,
                        &WorkingHoursUpdate {
                            remaining_working_seconds: remaining,
                            timer_active: true,
                            warnings_issued: 0,
                            extended_hours_purchased: true,
                            wallet_deducted: driver.wallet_deducted,
                            status: DriverStatus::Live,
                        },
                    )
                    .await
                {
                    warn!(driver_id = %driver_id, error = %err, "auto-extend persist failed");
                }
                arm(state, driver_id, remaining, 0);
                info!(driver_id = %driver_id, "working hours auto-extended");
                return;
            }
            Err(err) => {
                warn!(driver_id = %driver_id, error = %err, "auto-debit failed, stopping driver");
            }
        }
    }

    // Wallet cannot cover the extension: the driver stops.
    if let Err(err) = state
        .store
        .update_working_hours(
            driver_id,
            &WorkingHoursUpdate {
                remaining_working_seconds: 0,
                timer_active: false,
                warnings_issued: driver.warnings_issued,
                extended_hours_purchased: driver.extended_hours_purchased,
                wallet_deducted: driver.wallet_deducted,
                status: DriverStatus::Offline,
            },
        )
        .await
    {
        warn!(driver_id = %driver_id, error = %err, "auto-stop persist failed");
    }
    state.presence.mark_offline(driver_id);

    state.rooms.emit_to_room(
        &driver_room(driver_id),
        &ServerEvent::AutoStop(AutoStop {
            reason: "working_hours_expired".to_string(),
            message: "Working hours expired and wallet balance is too low to extend".to_string(),
        }),
    );
    if let Some(token) = driver.push_token.filter(|t| !t.is_empty()) {
        state.push.enqueue(PushMessage {
            token,
            title: "You are offline".to_string(),
            body: "Working hours expired".to_string(),
            data: serde_json::json!({ "reason": "working_hours_expired" }),
        });
    }
    info!(driver_id = %driver_id, "driver auto-stopped");
}

/// 1s ticker loop; runs on its own scheduling facility, independent of
/// connection handlers.
pub async fn run_ticker(state: Arc<CoreState>, mut shutdown: watch::Receiver<bool>) {
    info!("working-hours ticker started");
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("working-hours ticker shutting down");
                    break;
                }
            }
            _ = interval.tick() => {
                tick_all(&state).await;
            }
        }
    }
}

/// Persist every armed countdown (graceful shutdown).
pub async fn checkpoint_all(state: &CoreState) {
    let entries: Vec<(String, i64, i64)> = state
        .timers
        .iter()
        .map(|e| (e.key().clone(), e.remaining_seconds, e.warnings_issued))
        .collect();
    for (driver_id, remaining, warnings) in entries {
        if let Err(err) = state
            .store
            .persist_remaining_seconds(&driver_id, remaining, warnings)
            .await
        {
            warn!(driver_id = %driver_id, error = %err, "shutdown checkpoint failed");
        }
    }
}
