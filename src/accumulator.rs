use crate::error::ChargeError;
use crate::types::{Cost, MessageId};
use std::collections::HashSet;

/// Running session cost. `add` is the only mutator and accepts each priced
/// event once; the total never decreases.
#[derive(Debug, Default, Clone)]
pub struct CostAccumulator {
    total: Cost,
    charged: HashSet<MessageId>,
}

impl CostAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Charge `amount` for the priced event identified by `event`
    pub fn add(&mut self, event: &MessageId, amount: Cost) -> Result<Cost, ChargeError> {
        if amount.is_negative() {
            return Err(ChargeError::Negative(amount));
        }
        if self.charged.contains(event) {
            return Err(ChargeError::AlreadyCharged(event.clone()));
        }
        self.charged.insert(event.clone());
        self.total = self.total + amount;
        Ok(self.total)
    }

    #[inline]
    pub fn total(&self) -> Cost {
        self.total
    }

    /// Number of events charged so far
    #[inline]
    pub fn events(&self) -> usize {
        self.charged.len()
    }

    pub fn is_charged(&self, event: &MessageId) -> bool {
        self.charged.contains(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_add_accumulates() {
        let mut acc = CostAccumulator::new();
        let user = MessageId::from("msg_user");
        let reply = MessageId::from("msg_reply");

        acc.add(&user, Cost::new(Decimal::new(9, 6))).unwrap();
        let total = acc.add(&reply, Cost::new(Decimal::new(45, 6))).unwrap();

        assert_eq!(total, Cost::new(Decimal::new(54, 6)));
        assert_eq!(acc.total(), total);
        assert_eq!(acc.events(), 2);
        assert!(acc.is_charged(&user));
    }

    #[test]
    fn test_double_charge_is_rejected() {
        let mut acc = CostAccumulator::new();
        let event = MessageId::from("msg_123");

        acc.add(&event, Cost::new(Decimal::new(9, 6))).unwrap();
        let second = acc.add(&event, Cost::new(Decimal::new(9, 6)));

        assert_eq!(second, Err(ChargeError::AlreadyCharged(event)));
        assert_eq!(acc.total(), Cost::new(Decimal::new(9, 6)));
        assert_eq!(acc.events(), 1);
    }

    #[test]
    fn test_negative_amount_is_rejected() {
        let mut acc = CostAccumulator::new();
        let result = acc.add(&MessageId::from("refund"), Cost::new(Decimal::new(-1, 2)));
        assert!(matches!(result, Err(ChargeError::Negative(_))));
        assert_eq!(acc.total(), Cost::ZERO);
        assert_eq!(acc.events(), 0);
    }

    #[test]
    fn test_zero_cost_events_still_count() {
        let mut acc = CostAccumulator::new();
        acc.add(&MessageId::from("empty"), Cost::ZERO).unwrap();
        assert_eq!(acc.events(), 1);
        assert_eq!(acc.total(), Cost::ZERO);
    }
}
