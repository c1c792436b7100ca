use crate::domain::rates::RateConfig;
use crate::domain::types::Amount;
use crate::error::{BillingError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Decomposition of a session's total charge into the initial block and the
/// extra increments accrued past it. `initial_payment + additional_charge`
/// always equals `total_charge`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeBreakdown {
    pub initial_payment: Amount,
    pub additional_charge: Amount,
    pub extra_units: u64,
    pub total_charge: Amount,
}

/// Tiered duration pricing.
///
/// Stays of up to `initial_duration` cost `initial_amount` (a zero-length
/// stay still pays the full initial block; tier boundaries belong to the
/// lower tier). Past that, every started `extra_charge_duration` block costs
/// `extra_charge`; partial increments round up as billing policy.
///
/// Elapsed time is measured in seconds. A negative elapsed duration can only
/// come from an inconsistent session and is reported, never clamped.
pub fn compute_charge(
    checkin_time: DateTime<Utc>,
    checkout_time: DateTime<Utc>,
    rate: &RateConfig,
) -> Result<ChargeBreakdown> {
    let elapsed_seconds = checkout_time
        .signed_duration_since(checkin_time)
        .num_seconds();
    if elapsed_seconds < 0 {
        return Err(BillingError::CorruptSession {
            reason: format!(
                "checkout time {} precedes checkin time {}",
                checkout_time, checkin_time
            ),
        });
    }

    let covered_seconds = rate.initial_duration.num_seconds();
    if elapsed_seconds <= covered_seconds {
        return Ok(ChargeBreakdown {
            initial_payment: rate.initial_amount,
            additional_charge: Amount::zero(),
            extra_units: 0,
            total_charge: rate.initial_amount,
        });
    }

    let over_seconds = elapsed_seconds - covered_seconds;
    let unit_seconds = rate.extra_charge_duration.num_seconds();
    let extra_units = ((over_seconds + unit_seconds - 1) / unit_seconds) as u64;

    let additional_charge = rate.extra_charge.multiply(Decimal::from(extra_units));
    let total_charge = rate.initial_amount.add(additional_charge);

    Ok(ChargeBreakdown {
        initial_payment: rate.initial_amount,
        additional_charge,
        extra_units,
        total_charge,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::BlockDuration;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn standard_rate() -> RateConfig {
        RateConfig::new(
            "standard",
            Amount::from_decimal(dec!(20)),
            BlockDuration::from_hours(2).unwrap(),
            Amount::from_decimal(dec!(10)),
            BlockDuration::from_hours(1).unwrap(),
        )
        .unwrap()
    }

    fn checkin() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 14, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_zero_elapsed_charges_initial_block() {
        let charge = compute_charge(checkin(), checkin(), &standard_rate()).unwrap();
        assert_eq!(charge.total_charge.as_decimal(), dec!(20));
        assert_eq!(charge.extra_units, 0);
        assert_eq!(charge.additional_charge, Amount::zero());
    }

    #[test]
    fn test_within_initial_block() {
        // 10:00 -> 11:59 is 1h59m, inside the 2h block
        let checkout = checkin() + Duration::minutes(119);
        let charge = compute_charge(checkin(), checkout, &standard_rate()).unwrap();
        assert_eq!(charge.total_charge.as_decimal(), dec!(20));
        assert_eq!(charge.extra_units, 0);
    }

    #[test]
    fn test_boundary_belongs_to_lower_tier() {
        // Exactly 2h: no extra unit
        let checkout = checkin() + Duration::hours(2);
        let charge = compute_charge(checkin(), checkout, &standard_rate()).unwrap();
        assert_eq!(charge.total_charge.as_decimal(), dec!(20));
        assert_eq!(charge.extra_units, 0);

        // Exactly 3h: the first extra hour is complete, still one unit
        let checkout = checkin() + Duration::hours(3);
        let charge = compute_charge(checkin(), checkout, &standard_rate()).unwrap();
        assert_eq!(charge.total_charge.as_decimal(), dec!(30));
        assert_eq!(charge.extra_units, 1);
    }

    #[test]
    fn test_partial_increment_rounds_up() {
        // 10:00 -> 12:01 is one minute over the initial block
        let checkout = checkin() + Duration::minutes(121);
        let charge = compute_charge(checkin(), checkout, &standard_rate()).unwrap();
        assert_eq!(charge.extra_units, 1);
        assert_eq!(charge.additional_charge.as_decimal(), dec!(10));
        assert_eq!(charge.total_charge.as_decimal(), dec!(30));

        // One second over a completed extra hour starts the next unit
        let checkout = checkin() + Duration::hours(3) + Duration::seconds(1);
        let charge = compute_charge(checkin(), checkout, &standard_rate()).unwrap();
        assert_eq!(charge.extra_units, 2);
        assert_eq!(charge.total_charge.as_decimal(), dec!(40));
    }

    #[test]
    fn test_four_hour_stay() {
        let checkout = checkin() + Duration::hours(4);
        let charge = compute_charge(checkin(), checkout, &standard_rate()).unwrap();
        assert_eq!(charge.extra_units, 2);
        assert_eq!(charge.initial_payment.as_decimal(), dec!(20));
        assert_eq!(charge.additional_charge.as_decimal(), dec!(20));
        assert_eq!(charge.total_charge.as_decimal(), dec!(40));
    }

    #[test]
    fn test_negative_elapsed_is_reported_not_clamped() {
        let checkout = checkin() - Duration::seconds(1);
        let result = compute_charge(checkin(), checkout, &standard_rate());
        assert!(matches!(result, Err(BillingError::CorruptSession { .. })));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arbitrary_rate() -> impl Strategy<Value = RateConfig> {
            (0u32..500, 1u32..600, 0u32..200, 1u32..240).prop_map(
                |(initial, initial_minutes, extra, extra_minutes)| {
                    RateConfig::new(
                        "generated",
                        Amount::from_decimal(Decimal::from(initial)),
                        BlockDuration::from_minutes(initial_minutes).unwrap(),
                        Amount::from_decimal(Decimal::from(extra)),
                        BlockDuration::from_minutes(extra_minutes).unwrap(),
                    )
                    .unwrap()
                },
            )
        }

        proptest! {
            #[test]
            fn split_always_sums_to_total(
                rate in arbitrary_rate(),
                elapsed_minutes in 0i64..20_000,
            ) {
                let checkout = checkin() + Duration::minutes(elapsed_minutes);
                let charge = compute_charge(checkin(), checkout, &rate).unwrap();
                prop_assert_eq!(
                    charge.initial_payment.add(charge.additional_charge),
                    charge.total_charge
                );
            }

            #[test]
            fn within_initial_block_charges_exactly_initial(
                rate in arbitrary_rate(),
                elapsed_minutes in 0i64..20_000,
            ) {
                let checkout = checkin() + Duration::minutes(elapsed_minutes);
                let charge = compute_charge(checkin(), checkout, &rate).unwrap();
                if elapsed_minutes <= i64::from(rate.initial_duration.num_minutes()) {
                    prop_assert_eq!(charge.total_charge, rate.initial_amount);
                    prop_assert_eq!(charge.extra_units, 0);
                } else {
                    let over = elapsed_minutes - i64::from(rate.initial_duration.num_minutes());
                    let unit = i64::from(rate.extra_charge_duration.num_minutes());
                    let expected_units = ((over + unit - 1) / unit) as u64;
                    prop_assert_eq!(charge.extra_units, expected_units);
                }
            }

            #[test]
            fn charge_is_monotone_in_elapsed_time(
                rate in arbitrary_rate(),
                elapsed_minutes in 0i64..20_000,
            ) {
                let shorter = compute_charge(
                    checkin(),
                    checkin() + Duration::minutes(elapsed_minutes),
                    &rate,
                )
                .unwrap();
                let longer = compute_charge(
                    checkin(),
                    checkin() + Duration::minutes(elapsed_minutes + 1),
                    &rate,
                )
                .unwrap();
                prop_assert!(longer.total_charge >= shorter.total_charge);
            }
        }
    }
}
