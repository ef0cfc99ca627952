//! Named steps of order placement, used in errors, logs and metrics labels.

use serde::{Deserialize, Serialize};

/// A single collaborator interaction (or local phase) of `place_order`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Validate,
    GetCart,
    GetProduct,
    ConvertCurrency,
    QuoteShipping,
    PrepareTotal,
    ChargePayment,
    ShipOrder,
    EmptyCart,
    SendConfirmation,
    PublishEvent,
}

impl Step {
    /// Returns the step name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Validate => "validate",
            Step::GetCart => "get_cart",
            Step::GetProduct => "get_product",
            Step::ConvertCurrency => "convert_currency",
            Step::QuoteShipping => "quote_shipping",
            Step::PrepareTotal => "prepare_total",
            Step::ChargePayment => "charge_payment",
            Step::ShipOrder => "ship_order",
            Step::EmptyCart => "empty_cart",
            Step::SendConfirmation => "send_confirmation",
            Step::PublishEvent => "publish_event",
        }
    }

    /// Failure of a best-effort step never fails the order.
    pub fn is_best_effort(&self) -> bool {
        matches!(
            self,
            Step::EmptyCart | Step::SendConfirmation | Step::PublishEvent
        )
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
