use serde::{Deserialize, Serialize};

/// Monetary amount in minor units (cents).
///
/// Serializes as a bare integer so event payloads carry `"totalAmount": 15000`
/// rather than a nested object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub fn zero() -> Self {
        Self(0)
    }

    pub fn cents(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Price of `quantity` units at this unit price, `None` on overflow.
    pub fn checked_mul(&self, quantity: u32) -> Option<Money> {
        self.0.checked_mul(i64::from(quantity)).map(Money)
    }

    pub fn checked_add(&self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    /// Sums `amounts`, `None` if any partial sum overflows.
    pub fn checked_sum(amounts: impl IntoIterator<Item = Money>) -> Option<Money> {
        amounts
            .into_iter()
            .try_fold(Money::zero(), |acc, m| acc.checked_add(m))
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats_minor_units() {
        assert_eq!(Money::from_cents(15000).to_string(), "150.00");
        assert_eq!(Money::from_cents(1234).to_string(), "12.34");
        assert_eq!(Money::from_cents(-5).to_string(), "-0.05");
    }

    #[test]
    fn multiply_and_sum() {
        let line = Money::from_cents(2500).checked_mul(4).unwrap();
        let total = Money::checked_sum([line, Money::from_cents(5000)]);
        assert_eq!(total, Some(Money::from_cents(15000)));
    }

    #[test]
    fn overflow_is_reported_not_wrapped() {
        let half = Money::from_cents(i64::MAX / 2 + 1);
        assert_eq!(half.checked_mul(2), None);
        assert_eq!(Money::checked_sum([half, half]), None);
        assert_eq!(Money::from_cents(i64::MAX).checked_mul(1), Some(Money::from_cents(i64::MAX)));
    }

    #[test]
    fn serializes_as_integer() {
        assert_eq!(serde_json::to_string(&Money::from_cents(999)).unwrap(), "999");
    }
}
