//! Checkout error types.
//!
//! [`CheckoutError`] aborts `PlaceOrder` and reaches the caller.
//! [`BestEffortError`] is only ever logged and recorded on spans.

use common::{CurrencyCode, MoneyError, ProductId, UserId};
use thiserror::Error;

use crate::model::ValidationError;
use crate::steps::Step;
use crate::transport::TransportError;

/// Fatal failures of order placement.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The request was rejected before any collaborator was called.
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] ValidationError),

    /// The user's cart could not be read.
    #[error("Failed to get cart for user {user_id}: {source}")]
    CartUnavailable {
        user_id: UserId,
        #[source]
        source: TransportError,
    },

    /// A product in the cart could not be priced.
    #[error("Failed to get product {product_id}: {source}")]
    CatalogUnavailable {
        product_id: ProductId,
        #[source]
        source: TransportError,
    },

    /// An amount could not be converted to the requester's currency.
    #[error("Failed to convert {from} to {to}: {source}")]
    PricingUnavailable {
        from: CurrencyCode,
        to: CurrencyCode,
        #[source]
        source: TransportError,
    },

    #[error("Failed to get shipping quote: {0}")]
    ShippingQuoteFailed(#[source] TransportError),

    #[error("Failed to charge card: {0}")]
    PaymentFailed(#[source] TransportError),

    /// Shipping failed after the card was charged. No refund is issued.
    #[error("Failed to ship order: {0}")]
    ShippingFailed(#[source] TransportError),

    /// Order arithmetic failed (overflow, currency mismatch).
    #[error("Failed to compute order amount at {step}: {source}")]
    InvalidAmount {
        step: Step,
        #[source]
        source: MoneyError,
    },

    /// The caller cancelled while `step` was in flight.
    #[error("Request cancelled during {step}")]
    Cancelled { step: Step },

    /// The caller's deadline passed while `step` was in flight.
    #[error("Deadline exceeded during {step}")]
    DeadlineExceeded { step: Step },
}

impl CheckoutError {
    /// The step that failed.
    pub fn step(&self) -> Step {
        match self {
            CheckoutError::InvalidRequest(_) => Step::Validate,
            CheckoutError::CartUnavailable { .. } => Step::GetCart,
            CheckoutError::CatalogUnavailable { .. } => Step::GetProduct,
            CheckoutError::PricingUnavailable { .. } => Step::ConvertCurrency,
            CheckoutError::ShippingQuoteFailed(_) => Step::QuoteShipping,
            CheckoutError::PaymentFailed(_) => Step::ChargePayment,
            CheckoutError::ShippingFailed(_) => Step::ShipOrder,
            CheckoutError::InvalidAmount { step, .. }
            | CheckoutError::Cancelled { step }
            | CheckoutError::DeadlineExceeded { step } => *step,
        }
    }

    /// The collaborator error behind this failure, if there is one.
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            CheckoutError::CartUnavailable { source, .. }
            | CheckoutError::CatalogUnavailable { source, .. }
            | CheckoutError::PricingUnavailable { source, .. } => Some(source),
            CheckoutError::ShippingQuoteFailed(source)
            | CheckoutError::PaymentFailed(source)
            | CheckoutError::ShippingFailed(source) => Some(source),
            _ => None,
        }
    }
}

/// Failures of steps that never fail the order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BestEffortError {
    #[error("Failed to empty cart: {0}")]
    CartClearFailed(#[source] TransportError),

    #[error("Failed to send order confirmation: {0}")]
    NotificationFailed(#[source] TransportError),

    #[error("Failed to publish order event: {0}")]
    EventPublishFailed(#[source] TransportError),
}

impl BestEffortError {
    pub fn step(&self) -> Step {
        match self {
            BestEffortError::CartClearFailed(_) => Step::EmptyCart,
            BestEffortError::NotificationFailed(_) => Step::SendConfirmation,
            BestEffortError::EventPublishFailed(_) => Step::PublishEvent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_fatal_error_keeps_cause_chain() {
        let err = CheckoutError::PaymentFailed(TransportError::Unavailable(
            "connection refused".to_string(),
        ));
        assert_eq!(err.step(), Step::ChargePayment);
        assert!(err.to_string().contains("connection refused"));

        let source = err.source().expect("cause should be preserved");
        assert_eq!(
            source.to_string(),
            "collaborator unavailable: connection refused"
        );
        assert!(matches!(
            err.transport_error(),
            Some(TransportError::Unavailable(_))
        ));
    }

    #[test]
    fn test_catalog_error_names_product() {
        let err = CheckoutError::CatalogUnavailable {
            product_id: ProductId::new("SKU9"),
            source: TransportError::status(404, "no such product"),
        };
        assert_eq!(err.step(), Step::GetProduct);
        assert!(err.to_string().contains("SKU9"));
    }

    #[test]
    fn test_interruptions_carry_step() {
        let err = CheckoutError::Cancelled {
            step: Step::QuoteShipping,
        };
        assert_eq!(err.step(), Step::QuoteShipping);
        assert!(err.transport_error().is_none());
        assert_eq!(err.to_string(), "Request cancelled during quote_shipping");
    }

    #[test]
    fn test_validation_converts_into_invalid_request() {
        let err: CheckoutError = ValidationError::MissingAddress.into();
        assert_eq!(err.step(), Step::Validate);
    }

    #[test]
    fn test_best_effort_steps() {
        let cause = TransportError::DeadlineExceeded;
        assert_eq!(
            BestEffortError::CartClearFailed(cause.clone()).step(),
            Step::EmptyCart
        );
        assert_eq!(
            BestEffortError::NotificationFailed(cause.clone()).step(),
            Step::SendConfirmation
        );
        assert_eq!(
            BestEffortError::EventPublishFailed(cause).step(),
            Step::PublishEvent
        );
    }
}
