//! In-process aggregation over typed session records.
//!
//! Spreadsheet rendering and delivery belong to the surrounding service;
//! this module only turns stored sessions into summary figures.

use crate::domain::rates::RateConfig;
use crate::domain::sessions::VehicleSession;
use crate::domain::types::{Amount, HandlerId, PaymentMode, RateId};
use crate::error::Result;
use crate::storage::{RateRepository, SessionRepository};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModeTotals {
    pub count: u64,
    pub amount: Amount,
}

impl Default for ModeTotals {
    fn default() -> Self {
        Self {
            count: 0,
            amount: Amount::zero(),
        }
    }
}

/// Check-ins in a window, tallied by the initial payment mode. The amount is
/// the rate's initial block price: what the attendant collects at the gate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckinSummary {
    pub by_mode: HashMap<PaymentMode, ModeTotals>,
    pub total_count: u64,
    pub total_amount: Amount,
}

impl CheckinSummary {
    pub fn from_sessions(
        sessions: &[VehicleSession],
        rates: &HashMap<RateId, RateConfig>,
    ) -> Self {
        let mut by_mode: HashMap<PaymentMode, ModeTotals> = HashMap::new();
        let mut total_count = 0;
        let mut total_amount = Amount::zero();

        for session in sessions {
            // Completed sessions carry the exact recorded initial payment;
            // active ones are priced off the rate snapshot.
            let amount = session
                .charge
                .as_ref()
                .map(|c| c.initial_payment)
                .or_else(|| rates.get(&session.rate_id).map(|r| r.initial_amount))
                .unwrap_or_else(Amount::zero);

            let entry = by_mode.entry(session.payment_mode.clone()).or_default();
            entry.count += 1;
            entry.amount = entry.amount.add(amount);
            total_count += 1;
            total_amount = total_amount.add(amount);
        }

        Self {
            by_mode,
            total_count,
            total_amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutModeTotals {
    pub count: u64,
    pub initial_amount: Amount,
    pub additional_amount: Amount,
    pub total_amount: Amount,
}

impl Default for CheckoutModeTotals {
    fn default() -> Self {
        Self {
            count: 0,
            initial_amount: Amount::zero(),
            additional_amount: Amount::zero(),
            total_amount: Amount::zero(),
        }
    }
}

/// Checkouts in a window: the initial payment lands in the initial mode's
/// bucket, the overage in the additional mode's bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutSummary {
    pub by_mode: HashMap<PaymentMode, CheckoutModeTotals>,
    pub total_count: u64,
    pub total_initial: Amount,
    pub total_additional: Amount,
    pub total_amount: Amount,
}

impl CheckoutSummary {
    pub fn from_sessions(sessions: &[VehicleSession]) -> Self {
        let mut by_mode: HashMap<PaymentMode, CheckoutModeTotals> = HashMap::new();
        let mut total_count = 0;
        let mut total_initial = Amount::zero();
        let mut total_additional = Amount::zero();

        for session in sessions {
            let Some(charge) = session.charge.as_ref() else {
                continue;
            };

            let entry = by_mode.entry(session.payment_mode.clone()).or_default();
            entry.count += 1;
            entry.initial_amount = entry.initial_amount.add(charge.initial_payment);
            entry.total_amount = entry.total_amount.add(charge.initial_payment);

            if let Some(mode) = &charge.additional_payment_mode {
                let entry = by_mode.entry(mode.clone()).or_default();
                entry.additional_amount = entry.additional_amount.add(charge.additional_charge);
                entry.total_amount = entry.total_amount.add(charge.additional_charge);
            }

            total_count += 1;
            total_initial = total_initial.add(charge.initial_payment);
            total_additional = total_additional.add(charge.additional_charge);
        }

        Self {
            by_mode,
            total_count,
            total_initial,
            total_additional,
            total_amount: total_initial.add(total_additional),
        }
    }
}

/// One handler's figures for one day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyFinancialSummary {
    pub handler: HandlerId,
    pub date: NaiveDate,
    pub checkins: CheckinSummary,
    pub checkouts: CheckoutSummary,
}

impl DailyFinancialSummary {
    /// Money collected during the day: initial payments of the day's
    /// check-ins plus overage charges of the day's checkouts. (Counting full
    /// checkout totals as well would bill the initial payment twice.)
    pub fn collected_total(&self) -> Amount {
        self.checkins
            .total_amount
            .add(self.checkouts.total_additional)
    }

    pub fn collected_by_mode(&self) -> HashMap<PaymentMode, Amount> {
        let mut by_mode: HashMap<PaymentMode, Amount> = HashMap::new();
        for (mode, totals) in &self.checkins.by_mode {
            let entry = by_mode.entry(mode.clone()).or_insert_with(Amount::zero);
            *entry = entry.add(totals.amount);
        }
        for (mode, totals) in &self.checkouts.by_mode {
            if totals.additional_amount.is_zero() {
                continue;
            }
            let entry = by_mode.entry(mode.clone()).or_insert_with(Amount::zero);
            *entry = entry.add(totals.additional_amount);
        }
        by_mode
    }
}

/// Report queries over the repositories.
pub struct Reporting {
    sessions: Arc<dyn SessionRepository>,
    rates: Arc<dyn RateRepository>,
}

impl Reporting {
    pub fn new(sessions: Arc<dyn SessionRepository>, rates: Arc<dyn RateRepository>) -> Self {
        Self { sessions, rates }
    }

    pub async fn currently_parked(
        &self,
        handler: Option<&HandlerId>,
    ) -> Result<Vec<VehicleSession>> {
        self.sessions.list_active(handler).await
    }

    pub async fn checkins_on(
        &self,
        handler: &HandlerId,
        date: NaiveDate,
    ) -> Result<Vec<VehicleSession>> {
        let (from, to) = day_bounds(date);
        self.sessions
            .list_checked_in_between(handler, from, to)
            .await
    }

    pub async fn checkouts_on(
        &self,
        handler: &HandlerId,
        date: NaiveDate,
    ) -> Result<Vec<VehicleSession>> {
        let (from, to) = day_bounds(date);
        self.sessions
            .list_completed_between(handler, from, to)
            .await
    }

    pub async fn daily_financial_summary(
        &self,
        handler: &HandlerId,
        date: NaiveDate,
    ) -> Result<DailyFinancialSummary> {
        let checkins = self.checkins_on(handler, date).await?;
        let checkouts = self.checkouts_on(handler, date).await?;

        let rate_ids: HashSet<RateId> = checkins.iter().map(|s| s.rate_id).collect();
        let mut rates = HashMap::new();
        for rate_id in rate_ids {
            if let Some(rate) = self.rates.get_rate(&rate_id).await? {
                rates.insert(rate_id, rate);
            }
        }

        Ok(DailyFinancialSummary {
            handler: handler.clone(),
            date,
            checkins: CheckinSummary::from_sessions(&checkins, &rates),
            checkouts: CheckoutSummary::from_sessions(&checkouts),
        })
    }
}

fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let from = date.and_hms_opt(0, 0, 0).expect("midnight is valid").and_utc();
    (from, from + Duration::days(1))
}
