pub mod bootstrap;
pub mod locks;

pub use bootstrap::ensure_default_rate;
pub use locks::KeyedLocks;

use crate::domain::sessions::{SessionKey, VehicleSession};
use crate::domain::tariff::{compute_charge, ChargeBreakdown};
use crate::domain::types::{HandlerId, PaymentMode, VehicleNumber};
use crate::error::{BillingError, Result};
use crate::storage::{RateRepository, SessionRepository};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

/// Orchestrates the session lifecycle over the session store and rate
/// catalog: check-in uniqueness, checkout billing and the atomic move to
/// completed storage.
pub struct SessionLifecycle {
    sessions: Arc<dyn SessionRepository>,
    rates: Arc<dyn RateRepository>,
    locks: KeyedLocks,
}

impl SessionLifecycle {
    pub fn new(sessions: Arc<dyn SessionRepository>, rates: Arc<dyn RateRepository>) -> Self {
        Self {
            sessions,
            rates,
            locks: KeyedLocks::new(),
        }
    }

    /// Check a vehicle in under the acting handler.
    ///
    /// Fails with `DuplicateActiveSession` if the handler already has this
    /// vehicle checked in, and with `RateNotFound` if the handler has no
    /// assigned rate. The created session snapshots the rate id.
    pub async fn open_session(
        &self,
        vehicle_number: &str,
        handler: &HandlerId,
        payment_mode: &str,
    ) -> Result<VehicleSession> {
        let vehicle = VehicleNumber::parse(vehicle_number)?;
        let payment_mode = PaymentMode::parse(payment_mode)?;
        let key = SessionKey::new(vehicle.clone(), handler.clone());

        let _guard = self.locks.acquire(&key).await;

        if self.sessions.find_active(&key).await?.is_some() {
            return Err(BillingError::DuplicateActiveSession {
                vehicle: vehicle.to_string(),
                handler: handler.to_string(),
            });
        }

        let rate = self.rates.rate_for_handler(handler).await?;
        let session = VehicleSession::open(vehicle, handler.clone(), payment_mode, rate.id);
        self.sessions.insert_active(&session).await?;

        info!(
            session = %session.id,
            vehicle = %session.vehicle_number,
            handler = %handler,
            rate = %rate.label,
            "Vehicle checked in"
        );
        Ok(session)
    }

    /// Check a vehicle out, billing the elapsed stay against the rate
    /// snapshot taken at check-in.
    ///
    /// An overage may be settled in a different mode than the initial
    /// payment. On `CorruptSession` (negative elapsed time, missing rate
    /// snapshot) the session is left active and unbilled for administrative
    /// review.
    pub async fn close_session(
        &self,
        vehicle_number: &str,
        handler: &HandlerId,
        additional_payment_mode: Option<&str>,
    ) -> Result<(VehicleSession, ChargeBreakdown)> {
        let vehicle = VehicleNumber::parse(vehicle_number)?;
        let additional_payment_mode = additional_payment_mode
            .map(PaymentMode::parse)
            .transpose()?;
        let key = SessionKey::new(vehicle.clone(), handler.clone());

        let _guard = self.locks.acquire(&key).await;

        let mut session =
            self.sessions
                .find_active(&key)
                .await?
                .ok_or_else(|| BillingError::NoActiveSession {
                    vehicle: vehicle.to_string(),
                    handler: handler.to_string(),
                })?;

        let rate = self
            .rates
            .get_rate(&session.rate_id)
            .await?
            .ok_or_else(|| BillingError::CorruptSession {
                reason: format!(
                    "rate snapshot {} for session {} is missing",
                    session.rate_id, session.id
                ),
            })?;

        let checkout_time = Utc::now();
        let breakdown = compute_charge(session.checkin_time, checkout_time, &rate)?;

        session.close(&breakdown, additional_payment_mode, checkout_time)?;
        self.sessions.complete_session(&session).await?;

        info!(
            session = %session.id,
            vehicle = %session.vehicle_number,
            handler = %handler,
            total = %breakdown.total_charge,
            extra_units = breakdown.extra_units,
            "Vehicle checked out"
        );
        Ok((session, breakdown))
    }

    /// Compute what a checkout at `as_of` would charge, without committing
    /// anything. Safe to call repeatedly.
    pub async fn preview_charge(
        &self,
        vehicle_number: &str,
        handler: &HandlerId,
        as_of: DateTime<Utc>,
    ) -> Result<ChargeBreakdown> {
        let vehicle = VehicleNumber::parse(vehicle_number)?;
        let key = SessionKey::new(vehicle.clone(), handler.clone());

        let session =
            self.sessions
                .find_active(&key)
                .await?
                .ok_or_else(|| BillingError::NoActiveSession {
                    vehicle: vehicle.to_string(),
                    handler: handler.to_string(),
                })?;

        let rate = self
            .rates
            .get_rate(&session.rate_id)
            .await?
            .ok_or_else(|| BillingError::CorruptSession {
                reason: format!(
                    "rate snapshot {} for session {} is missing",
                    session.rate_id, session.id
                ),
            })?;

        debug!(session = %session.id, %as_of, "Previewing charge");
        compute_charge(session.checkin_time, as_of, &rate)
    }

    pub async fn active_sessions(
        &self,
        handler: Option<&HandlerId>,
    ) -> Result<Vec<VehicleSession>> {
        self.sessions.list_active(handler).await
    }

    /// Vehicle-number typeahead over the handler's active sessions.
    pub async fn suggest_vehicles(
        &self,
        handler: &HandlerId,
        prefix: &str,
    ) -> Result<Vec<VehicleNumber>> {
        let sessions = self
            .sessions
            .search_active_by_prefix(handler, prefix)
            .await?;
        Ok(sessions.into_iter().map(|s| s.vehicle_number).collect())
    }
}
