//! Checkout state machine.

use serde::{Deserialize, Serialize};

/// Progress of a single `place_order` call through its mandatory steps.
///
/// State transitions:
/// ```text
/// Validating ──► CartFetched ──► PricedAndQuoted ──► Charged ──► Shipped ──► CartCleared ──► Completed
/// ```
///
/// Notification and event publication are attempted after `CartCleared`
/// and never gate `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CheckoutState {
    /// Request fields are being checked; nothing has been called yet.
    #[default]
    Validating,

    /// The user's cart snapshot has been read.
    CartFetched,

    /// Item prices and the shipping quote are known in the user's currency.
    PricedAndQuoted,

    /// Payment has been taken.
    Charged,

    /// Fulfillment accepted the order and returned a tracking id.
    Shipped,

    /// Cart emptying was attempted (its failure is not fatal).
    CartCleared,

    /// The order result has been assembled (terminal state).
    Completed,
}

impl CheckoutState {
    /// The state that follows this one, or `None` for the terminal state.
    pub fn next(&self) -> Option<CheckoutState> {
        match self {
            CheckoutState::Validating => Some(CheckoutState::CartFetched),
            CheckoutState::CartFetched => Some(CheckoutState::PricedAndQuoted),
            CheckoutState::PricedAndQuoted => Some(CheckoutState::Charged),
            CheckoutState::Charged => Some(CheckoutState::Shipped),
            CheckoutState::Shipped => Some(CheckoutState::CartCleared),
            CheckoutState::CartCleared => Some(CheckoutState::Completed),
            CheckoutState::Completed => None,
        }
    }

    /// Returns true once money has been taken from the customer.
    pub fn is_charged(&self) -> bool {
        matches!(
            self,
            CheckoutState::Charged
                | CheckoutState::Shipped
                | CheckoutState::CartCleared
                | CheckoutState::Completed
        )
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CheckoutState::Completed)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutState::Validating => "Validating",
            CheckoutState::CartFetched => "CartFetched",
            CheckoutState::PricedAndQuoted => "PricedAndQuoted",
            CheckoutState::Charged => "Charged",
            CheckoutState::Shipped => "Shipped",
            CheckoutState::CartCleared => "CartCleared",
            CheckoutState::Completed => "Completed",
        }
    }
}

impl std::fmt::Display for CheckoutState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_validating() {
        assert_eq!(CheckoutState::default(), CheckoutState::Validating);
    }

    #[test]
    fn test_walks_every_state_in_order() {
        let mut state = CheckoutState::default();
        let mut visited = vec![state];
        while let Some(next) = state.next() {
            visited.push(next);
            state = next;
        }
        assert_eq!(
            visited,
            vec![
                CheckoutState::Validating,
                CheckoutState::CartFetched,
                CheckoutState::PricedAndQuoted,
                CheckoutState::Charged,
                CheckoutState::Shipped,
                CheckoutState::CartCleared,
                CheckoutState::Completed,
            ]
        );
        assert!(state.is_terminal());
    }

    #[test]
    fn test_is_charged() {
        assert!(!CheckoutState::Validating.is_charged());
        assert!(!CheckoutState::PricedAndQuoted.is_charged());
        assert!(CheckoutState::Charged.is_charged());
        assert!(CheckoutState::Completed.is_charged());
    }

    #[test]
    fn test_display() {
        assert_eq!(CheckoutState::PricedAndQuoted.to_string(), "PricedAndQuoted");
        assert_eq!(CheckoutState::CartCleared.to_string(), "CartCleared");
    }

    #[test]
    fn test_serialization() {
        let state = CheckoutState::Charged;
        let json = serde_json::to_string(&state).unwrap();
        let deserialized: CheckoutState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, deserialized);
    }
}
