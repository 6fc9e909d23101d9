// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Request/response surface.
//!
//! Stateless reads and administrative writes over HTTP, plus the WebSocket
//! upgrade for the realtime channel. Reads bypass in-memory caches and hit
//! the authoritative store, with the single exception of prices.

pub mod handlers;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::routing::{get, patch, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{Claims, Role};
use crate::error::CoreError;
use crate::gateway;
use crate::state::CoreState;

/// Verified bearer-token claims, extracted from `Authorization`.
pub struct AuthClaims(pub Claims);

impl AuthClaims {
    /// Require the claims to speak for `subject` (admins pass).
    pub fn require_subject(&self, subject: &str) -> Result<(), CoreError> {
        if self.0.role == Role::Admin || self.0.sub == subject {
            Ok(())
        } else {
            Err(CoreError::Unauthorized {
                reason: "token is bound to a different subject".to_string(),
            })
        }
    }

    /// Require an admin token.
    pub fn require_admin(&self) -> Result<(), CoreError> {
        if self.0.role == Role::Admin {
            Ok(())
        } else {
            Err(CoreError::Unauthorized {
                reason: "admin token required".to_string(),
            })
        }
    }
}

#[axum::async_trait]
impl FromRequestParts<Arc<CoreState>> for AuthClaims {
    type Rejection = CoreError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<CoreState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(CoreError::Unauthenticated)?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or(CoreError::Unauthenticated)?;
        Ok(AuthClaims(state.tokens.verify(token)?))
    }
}

/// Create the HTTP router: REST surface + `/ws` realtime upgrade.
pub fn create_router(state: Arc<CoreState>) -> Router {
    Router::new()
        // Realtime channel
        .route("/ws", get(gateway::ws_handler))
        // Health
        .route("/health", get(handlers::health::health_check))
        // Auth bootstrap
        .route(
            "/auth/request-driver-otp",
            post(handlers::auth::request_driver_otp),
        )
        .route(
            "/auth/get-complete-driver-info",
            post(handlers::auth::get_complete_driver_info),
        )
        // Drivers
        .route("/drivers/fcm-token", post(handlers::drivers::update_fcm_token))
        .route(
            "/drivers/working-hours/start",
            post(handlers::drivers::working_hours_start),
        )
        .route(
            "/drivers/working-hours/stop",
            post(handlers::drivers::working_hours_stop),
        )
        .route(
            "/drivers/working-hours/pause",
            post(handlers::drivers::working_hours_stop),
        )
        .route(
            "/drivers/working-hours/resume",
            post(handlers::drivers::working_hours_start),
        )
        .route(
            "/drivers/working-hours/extend",
            post(handlers::drivers::working_hours_extend),
        )
        .route(
            "/drivers/working-hours/add-half-time",
            post(handlers::drivers::working_hours_add_half),
        )
        .route(
            "/drivers/working-hours/add-full-time",
            post(handlers::drivers::working_hours_add_full),
        )
        .route(
            "/drivers/working-hours/status/:driver_id",
            get(handlers::drivers::working_hours_status),
        )
        .route(
            "/drivers/:driver_id/transactions",
            get(handlers::drivers::list_transactions),
        )
        .route(
            "/drivers/:driver_id/status",
            patch(handlers::drivers::update_status),
        )
        .route("/drivers/:driver_id", get(handlers::drivers::get_driver))
        // Rides
        .route(
            "/rides/book-ride-enhanced",
            post(handlers::rides::book_ride_enhanced),
        )
        .route("/rides/arrived", post(handlers::rides::arrived))
        .route("/rides/start", post(handlers::rides::start))
        .route(
            "/rides/simple-complete",
            post(handlers::rides::simple_complete),
        )
        .route("/rides/cancel", post(handlers::rides::cancel))
        .route("/rides/:ride_id", get(handlers::rides::get_ride))
        // Admin
        .route(
            "/admin/ride-prices",
            get(handlers::admin::get_ride_prices).post(handlers::admin::set_ride_price),
        )
        .route(
            "/admin/direct-wallet/:driver_id",
            post(handlers::admin::direct_wallet),
        )
        // Passenger wallet
        .route("/wallet/balance", get(handlers::wallet::balance))
        .route("/wallet/add-money", post(handlers::wallet::add_money))
        .route("/wallet/payment", post(handlers::wallet::payment))
        .route("/wallet/withdraw", post(handlers::wallet::payment))
        .route("/wallet/credit-ride", post(handlers::wallet::credit_ride))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
