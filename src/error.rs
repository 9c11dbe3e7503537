// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Position unavailable: {0}")]
    SensorUnavailable(String),

    #[error("Not at the current stop")]
    NotAtStop,

    #[error("A round is already being logged at stop {0}")]
    RoundInFlight(String),

    #[error("Route is already finalized")]
    RouteFinalized,

    #[error("Cannot finish route: {0}")]
    FinalizeRejected(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Whether the error came from a collaborator call (network/persistence).
    pub fn is_backend_error(&self) -> bool {
        matches!(self, AppError::Backend(_))
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::SensorUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "sensor_unavailable",
                Some(msg.clone()),
            ),
            AppError::NotAtStop => (StatusCode::CONFLICT, "not_at_stop", None),
            AppError::RoundInFlight(stop_id) => (
                StatusCode::CONFLICT,
                "round_in_flight",
                Some(stop_id.clone()),
            ),
            AppError::RouteFinalized => (StatusCode::CONFLICT, "route_finalized", None),
            AppError::FinalizeRejected(msg) => (
                StatusCode::CONFLICT,
                "finalize_rejected",
                Some(msg.clone()),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", Some(msg.clone())),
            AppError::Backend(msg) => {
                tracing::warn!(error = %msg, "Backend error");
                (StatusCode::BAD_GATEWAY, "backend_error", Some(msg.clone()))
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for engine operations and handlers
pub type Result<T> = std::result::Result<T, AppError>;
