//! Request and result types of order placement.

use common::{CurrencyCode, Money, OrderId, ProductId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a `PlaceOrder` request was rejected before any collaborator call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("user id is required")]
    MissingUserId,

    #[error("currency code is required")]
    MissingCurrency,

    #[error("unsupported currency code {0:?}")]
    InvalidCurrency(String),

    #[error("shipping address is required")]
    MissingAddress,

    #[error("shipping address field '{0}' is required")]
    IncompleteAddress(&'static str),

    #[error("credit card is required")]
    MissingCreditCard,

    #[error("credit card field '{0}' is required")]
    IncompleteCreditCard(&'static str),
}

/// Shipping destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street_address: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub zip_code: String,
}

impl Address {
    fn validate(&self) -> Result<(), ValidationError> {
        let required = [
            ("street_address", &self.street_address),
            ("city", &self.city),
            ("country", &self.country),
            ("zip_code", &self.zip_code),
        ];
        match required.iter().find(|(_, value)| value.trim().is_empty()) {
            Some((field, _)) => Err(ValidationError::IncompleteAddress(field)),
            None => Ok(()),
        }
    }
}

/// Card details forwarded to the payment collaborator, never inspected further.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditCardInfo {
    pub credit_card_number: String,
    pub credit_card_cvv: u32,
    pub credit_card_expiration_year: i32,
    pub credit_card_expiration_month: u32,
}

impl CreditCardInfo {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.credit_card_number.trim().is_empty() {
            return Err(ValidationError::IncompleteCreditCard("credit_card_number"));
        }
        if !(1..=12).contains(&self.credit_card_expiration_month) {
            return Err(ValidationError::IncompleteCreditCard(
                "credit_card_expiration_month",
            ));
        }
        if self.credit_card_expiration_year <= 0 {
            return Err(ValidationError::IncompleteCreditCard(
                "credit_card_expiration_year",
            ));
        }
        Ok(())
    }

    /// Last four digits, for logs.
    pub fn last_four(&self) -> &str {
        let number = self.credit_card_number.trim();
        let start = number
            .char_indices()
            .rev()
            .nth(3)
            .map(|(idx, _)| idx)
            .unwrap_or(0);
        &number[start..]
    }
}

impl std::fmt::Debug for CreditCardInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreditCardInfo")
            .field("credit_card_number", &format_args!("****{}", self.last_four()))
            .field(
                "credit_card_expiration_month",
                &self.credit_card_expiration_month,
            )
            .field(
                "credit_card_expiration_year",
                &self.credit_card_expiration_year,
            )
            .finish_non_exhaustive()
    }
}

/// The inbound `PlaceOrder` call, as received from the storefront.
///
/// Optional fields are optional only so that their absence is reported as a
/// [`ValidationError`] instead of a decoding failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceOrderRequest {
    pub user_id: UserId,
    #[serde(default)]
    pub user_currency: String,
    #[serde(default)]
    pub address: Option<Address>,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub credit_card: Option<CreditCardInfo>,
}

/// A [`PlaceOrderRequest`] whose required fields are known to be present.
#[derive(Debug, Clone)]
pub struct ValidatedOrder {
    pub user_id: UserId,
    pub currency: CurrencyCode,
    pub address: Address,
    pub email: String,
    pub credit_card: CreditCardInfo,
}

impl PlaceOrderRequest {
    /// Checks currency, address and card fields.
    pub fn validate(self) -> Result<ValidatedOrder, ValidationError> {
        if self.user_id.is_empty() {
            return Err(ValidationError::MissingUserId);
        }

        let currency = self.user_currency.trim();
        if currency.is_empty() {
            return Err(ValidationError::MissingCurrency);
        }
        let currency = CurrencyCode::parse(currency)
            .map_err(|_| ValidationError::InvalidCurrency(self.user_currency.clone()))?;

        let address = self.address.ok_or(ValidationError::MissingAddress)?;
        address.validate()?;

        let credit_card = self.credit_card.ok_or(ValidationError::MissingCreditCard)?;
        credit_card.validate()?;

        Ok(ValidatedOrder {
            user_id: self.user_id,
            currency,
            address,
            email: self.email.trim().to_string(),
            credit_card,
        })
    }
}

/// One line of the user's cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl CartItem {
    pub fn new(product_id: impl Into<ProductId>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// The cart contents read at the start of checkout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartSnapshot {
    items: Vec<CartItem>,
}

impl CartSnapshot {
    /// Builds a snapshot, rejecting blank product ids and zero quantities.
    pub fn from_items(items: Vec<CartItem>) -> Result<Self, String> {
        if let Some(item) = items.iter().find(|item| item.product_id.as_str().trim().is_empty()) {
            return Err(format!("cart line with blank product id (quantity {})", item.quantity));
        }
        if let Some(item) = items.iter().find(|item| item.quantity == 0) {
            return Err(format!("cart line for {} has zero quantity", item.product_id));
        }
        Ok(Self { items })
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A cart line joined with its unit price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub item: CartItem,
    pub cost: Money,
}

impl OrderItem {
    /// `cost * quantity`.
    pub fn line_total(&self) -> Result<Money, common::MoneyError> {
        self.cost.multiply(self.item.quantity)
    }
}

/// Price of shipping the whole order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingQuote {
    pub cost: Money,
}

/// Proof that the payment collaborator took the money.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeResult {
    pub transaction_id: String,
}

/// The committed order handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: OrderId,
    pub shipping_tracking_id: String,
    pub shipping_cost: Money,
    pub shipping_address: Address,
    pub items: Vec<OrderItem>,
    pub total_cost: Money,
}
