use crate::domain::types::{Amount, BlockDuration, RateId};
use crate::error::{BillingError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Billing rules a handler checks vehicles in against.
///
/// Rates are immutable once created: a session snapshots its `RateId` at
/// check-in and checkout always bills against that snapshot, so later rate
/// additions never change an open session's bill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateConfig {
    pub id: RateId,
    pub label: String,
    pub initial_amount: Amount,
    pub initial_duration: BlockDuration,
    pub extra_charge: Amount,
    pub extra_charge_duration: BlockDuration,
    pub created_at: DateTime<Utc>,
}

impl RateConfig {
    pub fn new(
        label: impl Into<String>,
        initial_amount: Amount,
        initial_duration: BlockDuration,
        extra_charge: Amount,
        extra_charge_duration: BlockDuration,
    ) -> Result<Self> {
        if initial_amount.is_negative() {
            return Err(BillingError::InvalidRate {
                reason: "initial amount must not be negative".to_string(),
            });
        }
        if extra_charge.is_negative() {
            return Err(BillingError::InvalidRate {
                reason: "extra charge must not be negative".to_string(),
            });
        }

        Ok(Self {
            id: RateId::new(),
            label: label.into(),
            initial_amount,
            initial_duration,
            extra_charge,
            extra_charge_duration,
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn hours(h: u32) -> BlockDuration {
        BlockDuration::from_hours(h).unwrap()
    }

    #[test]
    fn test_rate_creation() {
        let rate = RateConfig::new(
            "standard",
            Amount::from_decimal(dec!(20)),
            hours(2),
            Amount::from_decimal(dec!(10)),
            hours(1),
        )
        .unwrap();

        assert_eq!(rate.label, "standard");
        assert_eq!(rate.initial_amount.as_decimal(), dec!(20));
        assert_eq!(rate.initial_duration.num_minutes(), 120);
    }

    #[test]
    fn test_rate_rejects_negative_amounts() {
        let result = RateConfig::new(
            "broken",
            Amount::from_decimal(dec!(-5)),
            hours(2),
            Amount::from_decimal(dec!(10)),
            hours(1),
        );
        assert!(matches!(result, Err(BillingError::InvalidRate { .. })));

        let result = RateConfig::new(
            "broken",
            Amount::from_decimal(dec!(5)),
            hours(2),
            Amount::from_decimal(dec!(-10)),
            hours(1),
        );
        assert!(matches!(result, Err(BillingError::InvalidRate { .. })));
    }
}
