//! Fixed-point money math.
//!
//! Every amount is a `rust_decimal::Decimal` held at a fixed scale of 4
//! fractional digits and rounded half away from zero whenever a value is
//! produced. Binary floating point is never involved, not even when a VAT
//! rate is turned into a multiplication factor: `17.00 %` becomes the exact
//! decimal `0.1700` by shifting the scale, no division happens.

use core::fmt;
use core::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// Internal scale of every persisted amount and quantity.
pub const MONEY_SCALE: u32 = 4;
/// Scale used when rendering amounts for display.
pub const DISPLAY_SCALE: u32 = 2;
/// Scale of VAT rates (percentages such as `17.00`).
pub const RATE_SCALE: u32 = 2;

fn round_to(value: Decimal, scale: u32) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(scale);
    rounded
}

/// Number of fractional digits actually carried by `value` (trailing zeros ignored).
fn significant_scale(value: Decimal) -> u32 {
    value.normalize().scale()
}

/// A monetary amount at scale 4.
///
/// The sign is not restricted here: credit notes carry negative amounts.
/// Whether a negative amount is acceptable is decided by the document type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl ValueObject for Money {}

impl Money {
    /// Round `value` half-up to the internal scale.
    pub fn new(value: Decimal) -> Self {
        Self(round_to(value, MONEY_SCALE))
    }

    pub fn zero() -> Self {
        Self::new(Decimal::ZERO)
    }

    /// Build from an integer amount of minor units at scale 4 (`1_2345` = `1.2345`).
    pub fn from_scaled(units: i64) -> Self {
        Self(Decimal::new(units, MONEY_SCALE))
    }

    /// Parse a decimal string (`"100"`, `"99.95"`).
    pub fn parse(input: &str) -> DomainResult<Self> {
        let value = Decimal::from_str(input.trim())
            .map_err(|e| DomainError::invalid_amount(format!("'{input}' is not a decimal: {e}")))?;
        Ok(Self::new(value))
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn negate(&self) -> Self {
        Self::new(-self.0)
    }

    /// Rendered with 2 fractional digits, rounded half-up (`175.5000` -> `"175.50"`).
    pub fn display(&self) -> String {
        round_to(self.0, DISPLAY_SCALE).to_string()
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Self::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A non-negative quantity with at most 4 fractional digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Quantity(Decimal);

impl ValueObject for Quantity {}

impl Quantity {
    pub fn new(value: Decimal) -> DomainResult<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(DomainError::invalid_amount(format!(
                "quantity must not be negative (got {value})"
            )));
        }
        if significant_scale(value) > MONEY_SCALE {
            return Err(DomainError::invalid_amount(format!(
                "quantity supports at most {MONEY_SCALE} decimals (got {value})"
            )));
        }
        let mut scaled = value;
        scaled.rescale(MONEY_SCALE);
        Ok(Self(scaled))
    }

    pub fn parse(input: &str) -> DomainResult<Self> {
        let value = Decimal::from_str(input.trim()).map_err(|e| {
            DomainError::invalid_amount(format!("'{input}' is not a quantity: {e}"))
        })?;
        Self::new(value)
    }

    pub fn one() -> Self {
        Self(Decimal::new(1, 0)).rescaled()
    }

    fn rescaled(mut self) -> Self {
        self.0.rescale(MONEY_SCALE);
        self
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Quantity {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Quantity> for Decimal {
    fn from(value: Quantity) -> Self {
        value.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A VAT rate expressed as a percentage with 2 fractional digits (`17.00`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct VatRate(Decimal);

impl ValueObject for VatRate {}

impl VatRate {
    pub fn new(percent: Decimal) -> DomainResult<Self> {
        if percent.is_sign_negative() && !percent.is_zero() {
            return Err(DomainError::invalid_amount(format!(
                "VAT rate must not be negative (got {percent})"
            )));
        }
        if percent > Decimal::new(100, 0) {
            return Err(DomainError::invalid_amount(format!(
                "VAT rate must not exceed 100% (got {percent})"
            )));
        }
        if significant_scale(percent) > RATE_SCALE {
            return Err(DomainError::invalid_amount(format!(
                "VAT rate supports at most {RATE_SCALE} decimals (got {percent})"
            )));
        }
        let mut scaled = percent.abs();
        scaled.rescale(RATE_SCALE);
        Ok(Self(scaled))
    }

    /// Whole-number percentage (`VatRate::percent(17)` = 17.00 %).
    pub fn percent(whole: u8) -> DomainResult<Self> {
        Self::new(Decimal::from(whole))
    }

    pub fn zero() -> Self {
        Self(Decimal::new(0, RATE_SCALE))
    }

    pub fn parse(input: &str) -> DomainResult<Self> {
        let value = Decimal::from_str(input.trim()).map_err(|e| {
            DomainError::invalid_amount(format!("'{input}' is not a VAT rate: {e}"))
        })?;
        Self::new(value)
    }

    pub fn percentage(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// `rate / 100` as an exact decimal at scale 4, obtained by shifting the
    /// scale of the rate (scale 2 -> scale 4).
    pub fn factor(&self) -> Decimal {
        Decimal::from_i128_with_scale(self.0.mantissa(), self.0.scale() + 2)
    }
}

impl TryFrom<Decimal> for VatRate {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<VatRate> for Decimal {
    fn from(value: VatRate) -> Self {
        value.0
    }
}

impl fmt::Display for VatRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Money arithmetic primitives.
///
/// All operations are checked: an overflow of the underlying 96-bit mantissa
/// is reported as `InvalidAmount`, never wrapped or saturated.
#[derive(Debug, Clone, Copy, Default)]
pub struct MoneyMath;

impl MoneyMath {
    pub fn add(a: Money, b: Money) -> DomainResult<Money> {
        a.0.checked_add(b.0)
            .map(Money::new)
            .ok_or_else(|| DomainError::invalid_amount(format!("overflow adding {a} and {b}")))
    }

    /// `quantity × unit price`, rounded half-up to scale 4.
    pub fn multiply(quantity: Quantity, unit_price: Money) -> DomainResult<Money> {
        quantity
            .0
            .checked_mul(unit_price.0)
            .map(Money::new)
            .ok_or_else(|| {
                DomainError::invalid_amount(format!(
                    "overflow multiplying {quantity} by {unit_price}"
                ))
            })
    }

    /// `amount × rate / 100`, rounded half-up to scale 4.
    pub fn percentage_of(amount: Money, rate: VatRate) -> DomainResult<Money> {
        amount
            .0
            .checked_mul(rate.factor())
            .map(Money::new)
            .ok_or_else(|| {
                DomainError::invalid_amount(format!("overflow applying {rate} to {amount}"))
            })
    }

    pub fn sum<I>(amounts: I) -> DomainResult<Money>
    where
        I: IntoIterator<Item = Money>,
    {
        amounts.into_iter().try_fold(Money::zero(), MoneyMath::add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn money(s: &str) -> Money {
        Money::parse(s).unwrap()
    }

    #[test]
    fn amounts_are_held_at_scale_four() {
        assert_eq!(money("100").to_string(), "100.0000");
        assert_eq!(money("0.12345").to_string(), "0.1235");
        assert_eq!(money("-0.12345").to_string(), "-0.1235");
    }

    #[test]
    fn display_rounds_half_up_to_two_digits() {
        assert_eq!(money("175.5").display(), "175.50");
        assert_eq!(money("0.125").display(), "0.13");
        assert_eq!(money("0.1249").display(), "0.12");
    }

    #[test]
    fn vat_factor_is_an_exact_scale_shift() {
        let rate = VatRate::percent(17).unwrap();
        assert_eq!(rate.factor().to_string(), "0.1700");
        let reduced = VatRate::parse("5.5").unwrap();
        assert_eq!(reduced.factor().to_string(), "0.0550");
    }

    #[test]
    fn percentage_of_matches_hand_computed_values() {
        let vat = MoneyMath::percentage_of(money("100"), VatRate::percent(17).unwrap()).unwrap();
        assert_eq!(vat.to_string(), "17.0000");

        let vat = MoneyMath::percentage_of(money("0.0333"), VatRate::percent(17).unwrap()).unwrap();
        // 0.0333 * 0.17 = 0.005661 -> 0.0057
        assert_eq!(vat.to_string(), "0.0057");
    }

    #[test]
    fn negative_quantity_is_invalid_amount() {
        let err = Quantity::parse("-1").unwrap_err();
        assert!(matches!(err, DomainError::InvalidAmount(_)));
    }

    #[test]
    fn quantity_with_too_many_decimals_is_rejected() {
        assert!(Quantity::parse("1.00001").is_err());
        assert_eq!(Quantity::parse("1.50000").unwrap().to_string(), "1.5000");
    }

    #[test]
    fn vat_rate_domain_is_enforced() {
        assert!(matches!(
            VatRate::parse("-3").unwrap_err(),
            DomainError::InvalidAmount(_)
        ));
        assert!(VatRate::parse("100.01").is_err());
        assert!(VatRate::parse("8.125").is_err());
        assert_eq!(VatRate::parse("8").unwrap().to_string(), "8.00%");
    }

    #[test]
    fn sum_of_nothing_is_zero() {
        assert_eq!(MoneyMath::sum(Vec::new()).unwrap(), Money::zero());
    }

    #[test]
    fn money_serializes_as_string() {
        let json = serde_json::to_string(&money("12.5")).unwrap();
        assert_eq!(json, "\"12.5000\"");
        let back: Money = serde_json::from_str("\"12.50\"").unwrap();
        assert_eq!(back.to_string(), "12.5000");
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 512,
            ..ProptestConfig::default()
        })]

        /// Property: multiplication is deterministic down to the scale.
        #[test]
        fn multiply_is_deterministic(q in 0i64..10_000_000, p in 0i64..10_000_000_000) {
            let quantity = Quantity::new(Decimal::new(q, 4)).unwrap();
            let price = Money::from_scaled(p);
            let a = MoneyMath::multiply(quantity, price).unwrap();
            let b = MoneyMath::multiply(quantity, price).unwrap();
            prop_assert_eq!(a.to_string(), b.to_string());
            prop_assert_eq!(a.amount().scale(), MONEY_SCALE);
        }

        /// Property: addition never loses the fixed scale.
        #[test]
        fn add_keeps_scale(a in -1_000_000_000i64..1_000_000_000, b in -1_000_000_000i64..1_000_000_000) {
            let total = MoneyMath::add(Money::from_scaled(a), Money::from_scaled(b)).unwrap();
            prop_assert_eq!(total, Money::from_scaled(a + b));
            prop_assert_eq!(total.amount().scale(), MONEY_SCALE);
        }
    }
}
