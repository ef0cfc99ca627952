//! Exact fixed-point currency amounts.
//!
//! A [`Money`] value is a whole-unit `i64` plus a nano-unit `i32`
//! (billionths of one unit). Arithmetic goes through a 128-bit nano total
//! so intermediate results never lose precision; results that do not fit
//! back into the `units`/`nanos` pair fail with [`MoneyError::Overflow`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of nano-units in one whole unit.
pub const NANOS_PER_UNIT: i32 = 1_000_000_000;

const NANOS_PER_UNIT_WIDE: i128 = NANOS_PER_UNIT as i128;

/// Errors produced by money construction and arithmetic.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MoneyError {
    /// Arithmetic between two different currencies.
    #[error("Currency mismatch: {left} vs {right}")]
    CurrencyMismatch {
        left: CurrencyCode,
        right: CurrencyCode,
    },

    /// The result does not fit in the units/nanos representation.
    #[error("Money arithmetic overflow")]
    Overflow,

    /// The nanos part is out of range or disagrees in sign with units.
    #[error("Invalid money value: units {units}, nanos {nanos}")]
    InvalidNanos { units: i64, nanos: i32 },

    /// Not a three-letter currency code.
    #[error("Invalid currency code: {0:?}")]
    InvalidCurrencyCode(String),

    /// NaN or infinite floating point input.
    #[error("Cannot convert non-finite value {0} to money")]
    NonFinite(f64),
}

/// ISO-4217 style three-letter currency code, stored upper-cased.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode([u8; 3]);

impl CurrencyCode {
    /// Parses a three-letter alphabetic code, normalizing to upper case.
    pub fn parse(code: &str) -> Result<Self, MoneyError> {
        match code.as_bytes() {
            [a, b, c] if [a, b, c].iter().all(|ch| ch.is_ascii_alphabetic()) => Ok(Self([
                a.to_ascii_uppercase(),
                b.to_ascii_uppercase(),
                c.to_ascii_uppercase(),
            ])),
            _ => Err(MoneyError::InvalidCurrencyCode(code.to_string())),
        }
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        // Only ASCII letters are ever stored.
        std::str::from_utf8(&self.0).unwrap_or("???")
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CurrencyCode({})", self.as_str())
    }
}

impl FromStr for CurrencyCode {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = MoneyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for CurrencyCode {
    type Error = MoneyError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.as_str().to_string()
    }
}

/// An exact amount of a single currency.
///
/// Invariants: `|nanos| < 10^9`, and `nanos` is zero or has the same sign
/// as `units` (when `units` is non-zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "MoneyRepr")]
pub struct Money {
    currency_code: CurrencyCode,
    units: i64,
    nanos: i32,
}

#[derive(Deserialize)]
struct MoneyRepr {
    currency_code: CurrencyCode,
    units: i64,
    nanos: i32,
}

impl TryFrom<MoneyRepr> for Money {
    type Error = MoneyError;

    fn try_from(repr: MoneyRepr) -> Result<Self, Self::Error> {
        Money::new(repr.currency_code, repr.units, repr.nanos)
    }
}

impl Money {
    /// Creates a validated money value.
    pub fn new(currency_code: CurrencyCode, units: i64, nanos: i32) -> Result<Self, MoneyError> {
        let nanos_in_range = nanos > -NANOS_PER_UNIT && nanos < NANOS_PER_UNIT;
        let signs_agree = !((units > 0 && nanos < 0) || (units < 0 && nanos > 0));
        if !nanos_in_range || !signs_agree {
            return Err(MoneyError::InvalidNanos { units, nanos });
        }
        Ok(Self {
            currency_code,
            units,
            nanos,
        })
    }

    /// A whole-unit amount with no fractional part.
    pub fn from_units(currency_code: CurrencyCode, units: i64) -> Self {
        Self {
            currency_code,
            units,
            nanos: 0,
        }
    }

    /// Zero in the given currency.
    pub fn zero(currency_code: CurrencyCode) -> Self {
        Self::from_units(currency_code, 0)
    }

    pub fn currency(&self) -> CurrencyCode {
        self.currency_code
    }

    pub fn units(&self) -> i64 {
        self.units
    }

    pub fn nanos(&self) -> i32 {
        self.nanos
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.units == 0 && self.nanos == 0
    }

    /// Returns true if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.units < 0 || self.nanos < 0
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.units > 0 || self.nanos > 0
    }

    /// Adds two amounts of the same currency.
    ///
    /// Nanos overflowing one unit carry into `units`, and opposite-signed
    /// parts borrow from each other so the result keeps the sign invariant.
    pub fn add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        Self::from_total_nanos(self.currency_code, self.total_nanos() + other.total_nanos())
    }

    /// Multiplies by a non-negative quantity without wrapping.
    pub fn multiply(&self, quantity: u32) -> Result<Money, MoneyError> {
        let total = self
            .total_nanos()
            .checked_mul(i128::from(quantity))
            .ok_or(MoneyError::Overflow)?;
        Self::from_total_nanos(self.currency_code, total)
    }

    /// Sums amounts, starting from zero in `currency_code`.
    pub fn sum<'a, I>(currency_code: CurrencyCode, amounts: I) -> Result<Money, MoneyError>
    where
        I: IntoIterator<Item = &'a Money>,
    {
        amounts
            .into_iter()
            .try_fold(Money::zero(currency_code), |acc, amount| acc.add(amount))
    }

    /// Lossy floating point view, for diagnostics and rate conversion only.
    pub fn to_f64(&self) -> f64 {
        self.units as f64 + f64::from(self.nanos) / f64::from(NANOS_PER_UNIT)
    }

    /// Quantizes a floating point amount to the nearest nano-unit.
    pub fn from_f64(value: f64, currency_code: CurrencyCode) -> Result<Money, MoneyError> {
        if !value.is_finite() {
            return Err(MoneyError::NonFinite(value));
        }

        let whole = value.trunc();
        // i64::MAX is not representable as f64; the cast rounds up to 2^63.
        if whole >= i64::MAX as f64 || whole < i64::MIN as f64 {
            return Err(MoneyError::Overflow);
        }

        let mut units = whole as i64;
        let mut nanos = ((value - whole) * f64::from(NANOS_PER_UNIT)).round() as i32;
        if nanos >= NANOS_PER_UNIT {
            units = units.checked_add(1).ok_or(MoneyError::Overflow)?;
            nanos -= NANOS_PER_UNIT;
        } else if nanos <= -NANOS_PER_UNIT {
            units = units.checked_sub(1).ok_or(MoneyError::Overflow)?;
            nanos += NANOS_PER_UNIT;
        }

        Money::new(currency_code, units, nanos)
    }

    fn ensure_same_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency_code != other.currency_code {
            return Err(MoneyError::CurrencyMismatch {
                left: self.currency_code,
                right: other.currency_code,
            });
        }
        Ok(())
    }

    fn total_nanos(&self) -> i128 {
        i128::from(self.units) * NANOS_PER_UNIT_WIDE + i128::from(self.nanos)
    }

    fn from_total_nanos(currency_code: CurrencyCode, total: i128) -> Result<Money, MoneyError> {
        // Truncating division keeps remainder and quotient on the same side of zero.
        let units = i64::try_from(total / NANOS_PER_UNIT_WIDE).map_err(|_| MoneyError::Overflow)?;
        let nanos = (total % NANOS_PER_UNIT_WIDE) as i32;
        Ok(Money {
            currency_code,
            units,
            nanos,
        })
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.is_negative() { "-" } else { "" };
        write!(
            f,
            "{}{}.{:09} {}",
            sign,
            self.units.unsigned_abs(),
            self.nanos.unsigned_abs(),
            self.currency_code
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usd() -> CurrencyCode {
        CurrencyCode::parse("USD").unwrap()
    }

    fn eur() -> CurrencyCode {
        CurrencyCode::parse("EUR").unwrap()
    }

    fn money(units: i64, nanos: i32) -> Money {
        Money::new(usd(), units, nanos).unwrap()
    }

    #[test]
    fn test_currency_code_normalizes_case() {
        assert_eq!(CurrencyCode::parse("usd").unwrap(), usd());
        assert_eq!(usd().to_string(), "USD");
    }

    #[test]
    fn test_currency_code_rejects_bad_input() {
        for bad in ["", "US", "USDX", "U$D", "12A"] {
            assert!(
                matches!(CurrencyCode::parse(bad), Err(MoneyError::InvalidCurrencyCode(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_new_rejects_out_of_range_nanos() {
        assert!(Money::new(usd(), 1, NANOS_PER_UNIT).is_err());
        assert!(Money::new(usd(), -1, -NANOS_PER_UNIT).is_err());
        assert!(Money::new(usd(), 0, 999_999_999).is_ok());
    }

    #[test]
    fn test_new_rejects_sign_disagreement() {
        assert_eq!(
            Money::new(usd(), 1, -5),
            Err(MoneyError::InvalidNanos { units: 1, nanos: -5 })
        );
        assert!(Money::new(usd(), -1, 5).is_err());
        assert!(Money::new(usd(), 0, -5).is_ok());
    }

    #[test]
    fn test_add_carries_nanos_into_units() {
        let sum = money(1, 600_000_000).add(&money(2, 700_000_000)).unwrap();
        assert_eq!(sum, money(4, 300_000_000));
    }

    #[test]
    fn test_add_borrows_across_signs() {
        let sum = money(5, 100_000_000).add(&money(-2, -300_000_000)).unwrap();
        assert_eq!(sum, money(2, 800_000_000));

        let sum = money(1, 0).add(&money(-1, -500_000_000)).unwrap();
        assert_eq!(sum, money(0, -500_000_000));
    }

    #[test]
    fn test_add_rejects_currency_mismatch() {
        let result = money(1, 0).add(&Money::from_units(eur(), 1));
        assert_eq!(
            result,
            Err(MoneyError::CurrencyMismatch {
                left: usd(),
                right: eur()
            })
        );
    }

    #[test]
    fn test_add_overflow_is_reported() {
        let max = Money::new(usd(), i64::MAX, 999_999_999).unwrap();
        assert_eq!(max.add(&money(0, 1)), Err(MoneyError::Overflow));
    }

    #[test]
    fn test_multiply() {
        assert_eq!(money(10, 0).multiply(2).unwrap(), money(20, 0));
        assert_eq!(
            money(0, 350_000_000).multiply(3).unwrap(),
            money(1, 50_000_000)
        );
        assert_eq!(money(7, 990_000_000).multiply(0).unwrap(), money(0, 0));
    }

    #[test]
    fn test_multiply_overflow_is_reported() {
        let big = Money::from_units(usd(), i64::MAX / 2);
        assert_eq!(big.multiply(3), Err(MoneyError::Overflow));
    }

    #[test]
    fn test_sum() {
        let amounts = [money(1, 500_000_000), money(2, 500_000_000), money(3, 0)];
        assert_eq!(Money::sum(usd(), &amounts).unwrap(), money(7, 0));
        assert_eq!(Money::sum(usd(), &[]).unwrap(), Money::zero(usd()));
    }

    #[test]
    fn test_float_round_trip() {
        let m = Money::from_f64(19.99, usd()).unwrap();
        assert_eq!(m.units(), 19);
        assert_eq!(m.nanos(), 990_000_000);
        assert!((m.to_f64() - 19.99).abs() < 1e-9);

        let negative = Money::from_f64(-0.25, usd()).unwrap();
        assert_eq!(negative, money(0, -250_000_000));
    }

    #[test]
    fn test_from_f64_carries_rounded_nanos() {
        let m = Money::from_f64(0.999_999_999_9, usd()).unwrap();
        assert_eq!(m, money(1, 0));
    }

    #[test]
    fn test_from_f64_rejects_non_finite_and_huge() {
        assert!(matches!(
            Money::from_f64(f64::NAN, usd()),
            Err(MoneyError::NonFinite(_))
        ));
        assert_eq!(Money::from_f64(1e20, usd()), Err(MoneyError::Overflow));
    }

    #[test]
    fn test_display() {
        assert_eq!(money(25, 0).to_string(), "25.000000000 USD");
        assert_eq!(money(0, -50_000_000).to_string(), "-0.050000000 USD");
    }

    #[test]
    fn test_serde_validates_on_deserialize() {
        let m = money(3, 140_000_000);
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(
            json,
            r#"{"currency_code":"USD","units":3,"nanos":140000000}"#
        );
        assert_eq!(serde_json::from_str::<Money>(&json).unwrap(), m);

        let bad = r#"{"currency_code":"USD","units":3,"nanos":-1}"#;
        assert!(serde_json::from_str::<Money>(bad).is_err());
        let missing = r#"{"currency_code":"USD","units":3}"#;
        assert!(serde_json::from_str::<Money>(missing).is_err());
    }
}
