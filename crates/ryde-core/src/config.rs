// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::time::Duration;

/// Ryde Core configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL
    pub database_url: String,
    /// HTTP listen port (REST surface + realtime WebSocket upgrade)
    pub http_port: u16,
    /// Signing secret for session tokens
    pub token_secret: String,
    /// Push provider endpoint; `None` degrades push to a no-op
    pub push_api_url: Option<String>,
    /// Push provider credential
    pub push_api_key: Option<String>,
    /// Deadline imposed on every store operation
    pub store_timeout: Duration,
    /// Deadline imposed on a single push-notification send
    pub push_deadline: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `RYDE_DATABASE_URL`: PostgreSQL connection string
    /// - `RYDE_TOKEN_SECRET`: session token signing secret
    ///
    /// Optional (with defaults):
    /// - `RYDE_HTTP_PORT`: listen port (default: 8090)
    /// - `RYDE_PUSH_API_URL` / `RYDE_PUSH_API_KEY`: push provider; absent
    ///   means push is disabled and realtime fan-out is the only delivery
    /// - `RYDE_STORE_TIMEOUT_MS`: store deadline (default: 5000)
    /// - `RYDE_PUSH_DEADLINE_MS`: push send deadline (default: 3000)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("RYDE_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("RYDE_DATABASE_URL"))?;

        let token_secret = std::env::var("RYDE_TOKEN_SECRET")
            .map_err(|_| ConfigError::Missing("RYDE_TOKEN_SECRET"))?;

        let http_port: u16 = std::env::var("RYDE_HTTP_PORT")
            .unwrap_or_else(|_| "8090".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("RYDE_HTTP_PORT", "must be a valid port number"))?;

        let store_timeout_ms: u64 = std::env::var("RYDE_STORE_TIMEOUT_MS")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("RYDE_STORE_TIMEOUT_MS", "must be a positive integer")
            })?;

        let push_deadline_ms: u64 = std::env::var("RYDE_PUSH_DEADLINE_MS")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("RYDE_PUSH_DEADLINE_MS", "must be a positive integer")
            })?;

        Ok(Self {
            database_url,
            http_port,
            token_secret,
            push_api_url: std::env::var("RYDE_PUSH_API_URL").ok(),
            push_api_key: std::env::var("RYDE_PUSH_API_KEY").ok(),
            store_timeout: Duration::from_millis(store_timeout_ms),
            push_deadline: Duration::from_millis(push_deadline_ms),
        })
    }

    /// Minimal configuration for in-process tests: no database URL, no push
    /// credentials, short deadlines.
    pub fn for_tests() -> Self {
        Self {
            database_url: String::new(),
            http_port: 0,
            token_secret: "test-secret".to_string(),
            push_api_url: None,
            push_api_key: None,
            store_timeout: Duration::from_secs(5),
            push_deadline: Duration::from_secs(1),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
