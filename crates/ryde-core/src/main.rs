// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Ryde Core - Real-time Dispatch Engine
//!
//! The core is responsible for:
//! - Dispatch (vehicle-type-filtered fan-out, single-winner acceptance)
//! - The ride lifecycle and completion protocol
//! - Working-hours timers with automatic wallet debits
//! - The wallet ledger and driver presence

use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

use ryde_core::config::Config;
use ryde_core::persistence::PostgresPersistence;
use ryde_core::runtime::CoreRuntime;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ryde_core=info".parse().unwrap()),
        )
        .init();

    info!("Starting Ryde Core");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        http_port = config.http_port,
        push_configured = config.push_api_url.is_some(),
        "Configuration loaded"
    );

    // Connect to database
    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(config.store_timeout)
        .connect(&config.database_url)
        .await?;

    info!("Database connection established");

    // Verify connection
    let row: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&pool).await?;
    info!(result = row.0, "Database health check passed");

    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations completed");

    let persistence = Arc::new(PostgresPersistence::new(pool.clone()));

    let runtime = CoreRuntime::builder(config)
        .persistence(persistence)
        .build()?
        .start()
        .await?;

    info!("Ryde Core initialized successfully");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    runtime.shutdown().await?;
    pool.close().await;
    info!("Shutdown complete");

    Ok(())
}
