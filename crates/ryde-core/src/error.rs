// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for ryde-core.
//!
//! Provides a unified error type that maps to acknowledgement codes on the
//! realtime channel and to HTTP statuses on the REST surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

use ryde_protocol::codes;
use ryde_protocol::Ack;

/// Result type using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur during request processing.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum CoreError {
    /// A required field is missing or malformed.
    InvalidInput {
        /// The field that failed validation.
        field: String,
        /// The validation error message.
        message: String,
    },

    /// The request carried no valid session token.
    Unauthenticated,

    /// The session is not allowed to perform the operation.
    Unauthorized {
        /// Why the operation was refused.
        reason: String,
    },

    /// A referenced entity does not exist.
    NotFound {
        /// Entity kind ("ride", "driver", "user").
        entity: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// A ride was accepted by another driver first.
    RideTaken {
        /// The contested ride.
        ride_id: String,
    },

    /// An insert hit a uniqueness constraint.
    DuplicateKey {
        /// Entity kind.
        entity: &'static str,
        /// The conflicting identifier.
        id: String,
    },

    /// A state-machine transition was attempted from the wrong status.
    InvalidTransition {
        /// The ride in question.
        ride_id: String,
        /// Observed status.
        from: String,
        /// Requested status.
        to: String,
    },

    /// Wallet balance below the required amount.
    InsufficientBalance {
        /// Amount the operation needed.
        required: i64,
    },

    /// Submitted OTP does not match the ride's OTP.
    InvalidOtp {
        /// The ride in question.
        ride_id: String,
    },

    /// The durable store failed or timed out.
    StoreUnavailable {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },

    /// An external collaborator (push, geocoding) is unavailable.
    ExternalUnavailable {
        /// The collaborator.
        service: &'static str,
        /// Error details.
        details: String,
    },

    /// Unexpected server-side failure.
    Internal {
        /// Error details.
        details: String,
    },
}

impl CoreError {
    /// Get the stable error code string for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => codes::INVALID_INPUT,
            Self::Unauthenticated => codes::UNAUTHENTICATED,
            Self::Unauthorized { .. } => codes::UNAUTHORIZED,
            Self::NotFound { .. } => codes::NOT_FOUND,
            Self::RideTaken { .. } => codes::RIDE_TAKEN,
            Self::DuplicateKey { .. } => codes::CONFLICT,
            Self::InvalidTransition { .. } => codes::CONFLICT,
            Self::InsufficientBalance { .. } => codes::INSUFFICIENT_BALANCE,
            Self::InvalidOtp { .. } => codes::INVALID_OTP,
            Self::StoreUnavailable { .. } => codes::STORE_UNAVAILABLE,
            Self::ExternalUnavailable { .. } => codes::EXTERNAL_UNAVAILABLE,
            Self::Internal { .. } => codes::INTERNAL,
        }
    }

    /// HTTP status for the REST surface.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Unauthorized { .. } => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::RideTaken { .. } | Self::DuplicateKey { .. } | Self::InvalidTransition { .. } => {
                StatusCode::CONFLICT
            }
            Self::InsufficientBalance { .. } | Self::InvalidOtp { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::StoreUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::ExternalUnavailable { .. } => StatusCode::BAD_GATEWAY,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert to a failed acknowledgement for the realtime channel.
    ///
    /// Internal details are not leaked: `INTERNAL` and store failures carry
    /// a generic message, everything else is caller-actionable.
    pub fn to_ack(&self) -> Ack {
        Ack::fail(self.error_code(), self.public_message())
    }

    /// The user-visible message for this error.
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal { .. } => "Something went wrong. Please try again.".to_string(),
            Self::StoreUnavailable { .. } => "Service temporarily unavailable".to_string(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput { field, message } => {
                write!(f, "Invalid input for '{}': {}", field, message)
            }
            Self::Unauthenticated => write!(f, "Authentication required"),
            Self::Unauthorized { reason } => write!(f, "Not authorized: {}", reason),
            Self::NotFound { entity, id } => write!(f, "{} '{}' not found", entity, id),
            Self::RideTaken { ride_id } => {
                write!(f, "Ride '{}' is not available", ride_id)
            }
            Self::DuplicateKey { entity, id } => {
                write!(f, "{} '{}' already exists", entity, id)
            }
            Self::InvalidTransition { ride_id, from, to } => {
                write!(
                    f,
                    "Ride '{}' cannot move from '{}' to '{}'",
                    ride_id, from, to
                )
            }
            Self::InsufficientBalance { required } => {
                write!(
                    f,
                    "Insufficient wallet balance. Minimum \u{20b9}{} required",
                    required
                )
            }
            Self::InvalidOtp { ride_id } => write!(f, "Invalid OTP for ride '{}'", ride_id),
            Self::StoreUnavailable { operation, details } => {
                write!(f, "Store error during '{}': {}", operation, details)
            }
            Self::ExternalUnavailable { service, details } => {
                write!(f, "{} unavailable: {}", service, details)
            }
            Self::Internal { details } => write!(f, "Internal error: {}", details),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return CoreError::DuplicateKey {
                    entity: "row",
                    id: db.constraint().unwrap_or("unknown").to_string(),
                };
            }
        }
        CoreError::StoreUnavailable {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Internal {
            details: format!("json: {}", err),
        }
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.error_code(), error = %self, "request failed");
        }
        let body = json!({
            "success": false,
            "code": self.error_code(),
            "message": self.public_message(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        let cases: Vec<(CoreError, &str)> = vec![
            (
                CoreError::InvalidInput {
                    field: "pickup".to_string(),
                    message: "required".to_string(),
                },
                "INVALID_INPUT",
            ),
            (
                CoreError::RideTaken {
                    ride_id: "RID000002".to_string(),
                },
                "RIDE_TAKEN",
            ),
            (
                CoreError::InsufficientBalance { required: 100 },
                "INSUFFICIENT_BALANCE",
            ),
            (
                CoreError::InvalidOtp {
                    ride_id: "RID000002".to_string(),
                },
                "INVALID_OTP",
            ),
            (
                CoreError::StoreUnavailable {
                    operation: "insert".to_string(),
                    details: "connection refused".to_string(),
                },
                "STORE_UNAVAILABLE",
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(error.error_code(), expected, "{:?}", error);
        }
    }

    #[test]
    fn http_statuses_follow_the_taxonomy() {
        assert_eq!(
            CoreError::Unauthenticated.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            CoreError::RideTaken {
                ride_id: "RID000002".to_string()
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            CoreError::InsufficientBalance { required: 100 }.status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            CoreError::NotFound {
                entity: "driver",
                id: "DRV999".to_string()
            }
            .status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn insufficient_balance_message_names_the_minimum() {
        let err = CoreError::InsufficientBalance { required: 100 };
        assert_eq!(
            err.to_string(),
            "Insufficient wallet balance. Minimum \u{20b9}100 required"
        );
    }

    #[test]
    fn internal_errors_do_not_leak_details() {
        let err = CoreError::Internal {
            details: "secret pool state".to_string(),
        };
        let ack = err.to_ack();
        assert!(!ack.message.unwrap().contains("secret"));
    }
}
