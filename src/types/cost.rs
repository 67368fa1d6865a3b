use crate::constants::{COST_DISPLAY_SCALE, UNITS_PER_RATE};
use crate::types::AuditEntry;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::Add;

/// A newtype wrapper for cost values in EUR
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cost(Decimal);

impl Cost {
    pub const ZERO: Cost = Cost(Decimal::ZERO);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Cost(value)
    }

    /// Price `units` usage units at `rate_per_million` per million units
    pub fn from_units(units: u64, rate_per_million: Decimal) -> Self {
        Cost(Decimal::from(units) / Decimal::from(UNITS_PER_RATE) * rate_per_million)
    }

    /// Sum of the estimated costs of a run of audit entries
    pub fn from_entries<'a, I>(entries: I) -> Self
    where
        I: Iterator<Item = &'a AuditEntry>,
    {
        entries.map(|entry| entry.estimated_cost).sum()
    }

    #[inline]
    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Format as currency string (e.g., "€0.000054")
    pub fn to_formatted_string(&self) -> String {
        let mut rounded = self.0.round_dp(COST_DISPLAY_SCALE);
        rounded.rescale(COST_DISPLAY_SCALE);
        // Avoid printing "-0.000000" for tiny negative values
        if rounded.is_zero() {
            rounded.set_sign_positive(true);
        }
        format!("€{}", rounded)
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    #[inline]
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }
}

impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_formatted_string())
    }
}

impl From<Decimal> for Cost {
    fn from(value: Decimal) -> Self {
        Cost(value)
    }
}

impl From<Cost> for Decimal {
    fn from(cost: Cost) -> Self {
        cost.0
    }
}

impl Add for Cost {
    type Output = Cost;

    fn add(self, rhs: Cost) -> Cost {
        Cost(self.0 + rhs.0)
    }
}

impl Sum for Cost {
    fn sum<I: Iterator<Item = Cost>>(iter: I) -> Self {
        iter.fold(Cost::ZERO, Add::add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_formatting() {
        assert_eq!(Cost::new(Decimal::new(9, 6)).to_formatted_string(), "€0.000009");
        assert_eq!(Cost::ZERO.to_formatted_string(), "€0.000000");
        assert_eq!(Cost::new(Decimal::new(15, 1)).to_formatted_string(), "€1.500000");
        // Rounded to six places
        assert_eq!(
            Cost::new(Decimal::new(12345675, 12)).to_formatted_string(),
            "€0.000012"
        );
        assert_eq!(
            Cost::new(Decimal::new(-1, 9)).to_formatted_string(),
            "€0.000000"
        );
    }

    #[test]
    fn test_cost_from_units() {
        let rate = Decimal::new(450, 2);
        assert_eq!(Cost::from_units(2, rate), Cost::new(Decimal::new(9, 6)));
        assert_eq!(Cost::from_units(10, rate), Cost::new(Decimal::new(45, 6)));
        assert_eq!(Cost::from_units(0, rate), Cost::ZERO);
    }

    #[test]
    fn test_cost_sum_and_checks() {
        let total: Cost = [Decimal::new(9, 6), Decimal::new(45, 6)]
            .into_iter()
            .map(Cost::new)
            .sum();
        assert_eq!(total, Cost::new(Decimal::new(54, 6)));
        assert!(total.is_positive());
        assert!(!Cost::ZERO.is_positive());
        assert!(Cost::new(Decimal::new(-1, 2)).is_negative());
        assert!(!Cost::ZERO.is_negative());
    }

    #[test]
    fn test_cost_display() {
        let cost = Cost::new(Decimal::new(54, 6));
        assert_eq!(format!("{}", cost), "€0.000054");
    }
}
