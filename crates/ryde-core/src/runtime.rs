// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for ryde-core.
//!
//! [`CoreRuntime`] wires the shared state, runs startup recovery (price
//! cache load, timer re-arming), spawns the HTTP/WebSocket server and the
//! background tasks (working-hours ticker, location broadcaster, presence
//! sweeper), and tears everything down gracefully: on shutdown the armed
//! countdowns are checkpointed to the store before the process exits.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::Config;
use crate::persistence::Persistence;
use crate::presence;
use crate::rest;
use crate::state::CoreState;
use crate::working_hours;

/// Builder for creating a [`CoreRuntime`].
pub struct CoreRuntimeBuilder {
    config: Config,
    persistence: Option<Arc<dyn Persistence>>,
}

impl CoreRuntimeBuilder {
    /// Create a builder from a configuration.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            persistence: None,
        }
    }

    /// Set the persistence layer (required).
    pub fn persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Validate and produce the startable configuration.
    pub fn build(self) -> Result<CoreRuntimeConfig> {
        let persistence = self
            .persistence
            .ok_or_else(|| anyhow::anyhow!("persistence is required"))?;
        Ok(CoreRuntimeConfig {
            config: self.config,
            persistence,
        })
    }
}

/// Configuration for a [`CoreRuntime`].
pub struct CoreRuntimeConfig {
    config: Config,
    persistence: Arc<dyn Persistence>,
}

impl std::fmt::Debug for CoreRuntimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreRuntimeConfig")
            .field("config", &self.config)
            .field("persistence", &"<dyn Persistence>")
            .finish()
    }
}

impl CoreRuntimeConfig {
    /// Start the runtime: recovery, background tasks, HTTP server.
    pub async fn start(self) -> Result<CoreRuntime> {
        let http_port = self.config.http_port;
        let state = CoreState::new(self.config, self.persistence);

        // Startup recovery: prices into cache, countdowns re-armed.
        state.pricing.load_from_store(state.store.as_ref()).await?;
        working_hours::recover(&state).await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut task_handles = Vec::new();
        task_handles.push(tokio::spawn(working_hours::run_ticker(
            state.clone(),
            shutdown_rx.clone(),
        )));
        task_handles.push(tokio::spawn(presence::run_broadcaster(
            state.clone(),
            shutdown_rx.clone(),
        )));
        task_handles.push(tokio::spawn(presence::run_sweeper(
            state.clone(),
            shutdown_rx.clone(),
        )));

        let bind_addr = SocketAddr::from(([0, 0, 0, 0], http_port));
        let listener = tokio::net::TcpListener::bind(bind_addr).await?;
        let local_addr = listener.local_addr()?;
        let router = rest::create_router(state.clone());

        let mut server_shutdown = shutdown_rx.clone();
        let server_handle = tokio::spawn(async move {
            let shutdown = async move {
                // Wait for the shutdown flag to flip.
                while server_shutdown.changed().await.is_ok() {
                    if *server_shutdown.borrow() {
                        break;
                    }
                }
            };
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!("HTTP server error: {}", e);
            }
        });

        info!(addr = %local_addr, "CoreRuntime started");
        Ok(CoreRuntime {
            state,
            shutdown_tx,
            server_handle,
            task_handles,
            local_addr,
        })
    }
}

/// A running dispatch core that can be embedded in an application.
pub struct CoreRuntime {
    state: Arc<CoreState>,
    shutdown_tx: watch::Sender<bool>,
    server_handle: JoinHandle<()>,
    task_handles: Vec<JoinHandle<()>>,
    local_addr: SocketAddr,
}

impl CoreRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder(config: Config) -> CoreRuntimeBuilder {
        CoreRuntimeBuilder::new(config)
    }

    /// The bound listen address (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// A reference to the shared state.
    pub fn state(&self) -> &Arc<CoreState> {
        &self.state
    }

    /// Check if the runtime is still serving.
    pub fn is_running(&self) -> bool {
        !self.server_handle.is_finished()
    }

    /// Gracefully shut down: stop the server and tickers, then checkpoint
    /// every armed countdown.
    pub async fn shutdown(self) -> Result<()> {
        info!("CoreRuntime shutting down...");
        let _ = self.shutdown_tx.send(true);

        if let Err(e) = self.server_handle.await {
            error!("HTTP server task panicked: {}", e);
        }
        for handle in self.task_handles {
            if let Err(e) = handle.await {
                error!("background task panicked: {}", e);
            }
        }

        working_hours::checkpoint_all(&self.state).await;
        info!("CoreRuntime shutdown complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::InMemoryPersistence;

    #[test]
    fn builder_requires_persistence() {
        let result = CoreRuntimeBuilder::new(Config::for_tests()).build();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("persistence is required"));
    }

    #[tokio::test]
    async fn runtime_starts_and_shuts_down() {
        let persistence = Arc::new(InMemoryPersistence::new());
        let config = CoreRuntime::builder(Config::for_tests())
            .persistence(persistence)
            .build()
            .unwrap();

        // Port 0: the OS assigns a free port; start may still fail in
        // sandboxed environments without sockets.
        if let Ok(runtime) = config.start().await {
            assert!(runtime.is_running());
            assert_ne!(runtime.local_addr().port(), 0);
            runtime.shutdown().await.unwrap();
        }
    }
}
