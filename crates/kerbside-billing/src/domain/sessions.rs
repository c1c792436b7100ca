use crate::domain::tariff::ChargeBreakdown;
use crate::domain::types::{
    Amount, HandlerId, PaymentMode, RateId, SessionId, SessionState, VehicleNumber,
};
use crate::error::{BillingError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The uniqueness scope for active sessions: one vehicle may be checked in at
/// most once per handler at any time. Different handlers are independent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub vehicle: VehicleNumber,
    pub handler: HandlerId,
}

impl SessionKey {
    pub fn new(vehicle: VehicleNumber, handler: HandlerId) -> Self {
        Self { vehicle, handler }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.vehicle, self.handler)
    }
}

/// How a completed session's charge was settled.
///
/// `initial_payment` is owed against the mode recorded at check-in;
/// `additional_charge` against `additional_payment_mode`. The two amounts sum
/// to `total_charge` by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeRecord {
    pub initial_payment: Amount,
    pub additional_charge: Amount,
    pub additional_payment_mode: Option<PaymentMode>,
    pub total_charge: Amount,
}

/// One vehicle's parked interval from check-in to checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleSession {
    pub id: SessionId,
    pub vehicle_number: VehicleNumber,
    pub handled_by: HandlerId,
    pub checkin_time: DateTime<Utc>,
    pub checkout_time: Option<DateTime<Utc>>,
    pub payment_mode: PaymentMode,
    pub rate_id: RateId,
    pub state: SessionState,
    pub charge: Option<ChargeRecord>,
}

impl VehicleSession {
    pub fn open(
        vehicle_number: VehicleNumber,
        handled_by: HandlerId,
        payment_mode: PaymentMode,
        rate_id: RateId,
    ) -> Self {
        Self {
            id: SessionId::new(),
            vehicle_number,
            handled_by,
            checkin_time: Utc::now(),
            checkout_time: None,
            payment_mode,
            rate_id,
            state: SessionState::Active,
            charge: None,
        }
    }

    pub fn key(&self) -> SessionKey {
        SessionKey::new(self.vehicle_number.clone(), self.handled_by.clone())
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active && self.checkout_time.is_none()
    }

    /// Record the computed charge and move the session to its terminal state.
    ///
    /// The additional mode falls back to the check-in mode when an overage
    /// exists but no separate mode was given, and is dropped entirely when
    /// there is nothing additional to pay.
    pub fn close(
        &mut self,
        breakdown: &ChargeBreakdown,
        additional_payment_mode: Option<PaymentMode>,
        checkout_time: DateTime<Utc>,
    ) -> Result<()> {
        if !self.state.can_transition_to(SessionState::Completed) {
            return Err(BillingError::CorruptSession {
                reason: format!("session {} is already {}", self.id, self.state),
            });
        }

        let additional_payment_mode = if breakdown.additional_charge.is_zero() {
            None
        } else {
            Some(additional_payment_mode.unwrap_or_else(|| self.payment_mode.clone()))
        };

        self.checkout_time = Some(checkout_time);
        self.state = SessionState::Completed;
        self.charge = Some(ChargeRecord {
            initial_payment: breakdown.initial_payment,
            additional_charge: breakdown.additional_charge,
            additional_payment_mode,
            total_charge: breakdown.total_charge,
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn open_session() -> VehicleSession {
        VehicleSession::open(
            VehicleNumber::parse("KA01AB1234").unwrap(),
            HandlerId::new("gate_a"),
            PaymentMode::parse("cash").unwrap(),
            RateId::new(),
        )
    }

    fn breakdown(initial: rust_decimal::Decimal, additional: rust_decimal::Decimal) -> ChargeBreakdown {
        let initial_payment = Amount::from_decimal(initial);
        let additional_charge = Amount::from_decimal(additional);
        ChargeBreakdown {
            initial_payment,
            additional_charge,
            extra_units: u64::from(!additional_charge.is_zero()),
            total_charge: initial_payment.add(additional_charge),
        }
    }

    #[test]
    fn test_open_session_is_active() {
        let session = open_session();
        assert!(session.is_active());
        assert_eq!(session.state, SessionState::Active);
        assert!(session.checkout_time.is_none());
        assert!(session.charge.is_none());
    }

    #[test]
    fn test_close_records_split_with_separate_mode() {
        let mut session = open_session();
        session
            .close(
                &breakdown(dec!(20), dec!(10)),
                Some(PaymentMode::parse("card").unwrap()),
                Utc::now(),
            )
            .unwrap();

        assert!(!session.is_active());
        let charge = session.charge.unwrap();
        assert_eq!(charge.initial_payment.as_decimal(), dec!(20));
        assert_eq!(charge.additional_charge.as_decimal(), dec!(10));
        assert_eq!(
            charge.additional_payment_mode,
            Some(PaymentMode::parse("card").unwrap())
        );
        assert_eq!(charge.total_charge.as_decimal(), dec!(30));
    }

    #[test]
    fn test_close_defaults_additional_mode_to_initial() {
        let mut session = open_session();
        session
            .close(&breakdown(dec!(20), dec!(10)), None, Utc::now())
            .unwrap();

        let charge = session.charge.unwrap();
        assert_eq!(
            charge.additional_payment_mode,
            Some(PaymentMode::parse("cash").unwrap())
        );
    }

    #[test]
    fn test_close_without_overage_drops_additional_mode() {
        let mut session = open_session();
        session
            .close(
                &breakdown(dec!(20), dec!(0)),
                Some(PaymentMode::parse("card").unwrap()),
                Utc::now(),
            )
            .unwrap();

        let charge = session.charge.unwrap();
        assert_eq!(charge.additional_payment_mode, None);
        assert_eq!(charge.total_charge.as_decimal(), dec!(20));
    }

    #[test]
    fn test_close_is_terminal() {
        let mut session = open_session();
        session
            .close(&breakdown(dec!(20), dec!(0)), None, Utc::now())
            .unwrap();

        let result = session.close(&breakdown(dec!(20), dec!(0)), None, Utc::now());
        assert!(matches!(result, Err(BillingError::CorruptSession { .. })));
    }
}
