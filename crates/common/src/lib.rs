//! Shared value types for the checkout service.
//!
//! - [`Money`]: exact fixed-point currency amounts with checked arithmetic
//! - Identifier newtypes for orders, users and products

pub mod money;
pub mod types;

pub use money::{CurrencyCode, Money, MoneyError, NANOS_PER_UNIT};
pub use types::{OrderId, ProductId, UserId};
