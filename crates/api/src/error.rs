//! API error types with HTTP response mapping.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::CheckoutError;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The body could not be decoded as a `PlaceOrder` request.
    #[error("{0}")]
    BadRequest(String),
    /// Order placement failed.
    #[error(transparent)]
    Checkout(#[from] CheckoutError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Checkout(err) => checkout_status(err),
        }
    }
}

fn checkout_status(err: &CheckoutError) -> StatusCode {
    match err {
        CheckoutError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        CheckoutError::PaymentFailed(_) => StatusCode::PAYMENT_REQUIRED,
        CheckoutError::Cancelled { .. } | CheckoutError::DeadlineExceeded { .. } => {
            StatusCode::GATEWAY_TIMEOUT
        }
        CheckoutError::CartUnavailable { .. }
        | CheckoutError::CatalogUnavailable { .. }
        | CheckoutError::PricingUnavailable { .. }
        | CheckoutError::ShippingQuoteFailed(_)
        | CheckoutError::ShippingFailed(_) => StatusCode::BAD_GATEWAY,
        CheckoutError::InvalidAmount { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "order placement failed");
        }

        let mut body = serde_json::json!({ "error": self.to_string() });
        if let ApiError::Checkout(err) = &self {
            body["step"] = serde_json::Value::from(err.step().as_str());
        }
        (status, axum::Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkout::{Step, TransportError, ValidationError};

    #[test]
    fn test_status_mapping() {
        let unavailable = || TransportError::Unavailable("down".to_string());

        assert_eq!(
            ApiError::from(CheckoutError::from(ValidationError::MissingAddress)).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(CheckoutError::PaymentFailed(unavailable())).status(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            ApiError::from(CheckoutError::ShippingFailed(unavailable())).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::from(CheckoutError::DeadlineExceeded {
                step: Step::ChargePayment
            })
            .status(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[tokio::test]
    async fn test_body_names_failed_step() {
        let response =
            ApiError::from(CheckoutError::ShippingQuoteFailed(TransportError::DeadlineExceeded))
                .into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["step"], "quote_shipping");
        assert!(json["error"].as_str().unwrap().contains("shipping quote"));
    }
}
