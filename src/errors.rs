use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::models::CheckoutErrorCode;

/// Error body returned by the HTTP surface.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g. "Not Found", "Bad Request")
    pub error: String,
    /// Human-readable description
    pub message: String,
    /// Symbolic code for the presentation layer, when one applies
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<CheckoutErrorCode>,
    /// ISO 8601 timestamp
    pub timestamp: String,
}

/// Domain-level failures raised by the cart, checkout, and payment services.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// Step-local validation failure. Carries a symbolic code consumed by
    /// the presentation layer for localized messaging, never free text.
    #[error("Validation error: {0}")]
    Validation(CheckoutErrorCode),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Assembly was invoked before the state machine populated customer or
    /// delivery data. A programming-contract violation, not a user error.
    #[error("Missing checkout data: {0}")]
    MissingCheckoutData(&'static str),

    /// A payment method was selected whose gateway is disabled or lacks
    /// credentials. Blocks dispatch before any network call.
    #[error("Gateway not configured: {0}")]
    GatewayNotConfigured(String),

    /// Transient failure talking to a collaborator (order store, preference
    /// API, intent API). Recoverable: the user may retry the step.
    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Payment rejected: {0}")]
    PaymentRejected(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::InvalidOperation(_) => StatusCode::CONFLICT,
            ServiceError::GatewayNotConfigured(_) => StatusCode::BAD_REQUEST,
            ServiceError::PaymentRejected(_) => StatusCode::PAYMENT_REQUIRED,
            ServiceError::ExternalServiceError(_) => StatusCode::BAD_GATEWAY,
            ServiceError::MissingCheckoutData(_) | ServiceError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Symbolic code for errors the presentation layer renders itself.
    pub fn checkout_code(&self) -> Option<CheckoutErrorCode> {
        match self {
            ServiceError::Validation(code) => Some(*code),
            ServiceError::GatewayNotConfigured(_) => Some(CheckoutErrorCode::GatewayNotConfigured),
            ServiceError::PaymentRejected(_) => Some(CheckoutErrorCode::PaymentRejected),
            ServiceError::ExternalServiceError(_) => Some(CheckoutErrorCode::PaymentFailed),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        ServiceError::ExternalServiceError(err.to_string())
    }
}

/// Errors produced by the HTTP surface.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Service error: {0}")]
    ServiceError(#[from] ServiceError),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, code) = match &self {
            ApiError::ServiceError(err) => {
                (err.status_code(), err.to_string(), err.checkout_code())
            }
            ApiError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone(), None),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
        };

        let body = ErrorResponse {
            error: status
                .canonical_reason()
                .unwrap_or("Unknown Error")
                .to_string(),
            message,
            code,
            timestamp: Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_carry_their_symbolic_code() {
        let err = ServiceError::Validation(CheckoutErrorCode::NameRequired);
        assert_eq!(err.checkout_code(), Some(CheckoutErrorCode::NameRequired));
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn external_failures_surface_as_generic_payment_failure() {
        let err = ServiceError::ExternalServiceError("connection reset".to_string());
        assert_eq!(err.checkout_code(), Some(CheckoutErrorCode::PaymentFailed));
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn contract_violations_have_no_presentation_code() {
        let err = ServiceError::MissingCheckoutData("customer");
        assert_eq!(err.checkout_code(), None);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
