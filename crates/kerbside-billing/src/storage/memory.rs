use crate::domain::rates::RateConfig;
use crate::domain::sessions::{SessionKey, VehicleSession};
use crate::domain::types::{HandlerId, RateId};
use crate::error::{BillingError, Result};
use crate::storage::rates::RateRepository;
use crate::storage::sessions::SessionRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct SessionStoreState {
    active: HashMap<SessionKey, VehicleSession>,
    completed: Vec<VehicleSession>,
}

/// In-memory session store for tests and development. One lock guards both
/// stores, which makes the active-to-completed move atomic for free.
pub struct MemorySessionRepository {
    state: Arc<RwLock<SessionStoreState>>,
}

impl MemorySessionRepository {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(SessionStoreState::default())),
        }
    }

    pub async fn completed_count(&self) -> usize {
        self.state.read().await.completed.len()
    }
}

impl Default for MemorySessionRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionRepository for MemorySessionRepository {
    async fn find_active(&self, key: &SessionKey) -> Result<Option<VehicleSession>> {
        let state = self.state.read().await;
        Ok(state.active.get(key).cloned())
    }

    async fn insert_active(&self, session: &VehicleSession) -> Result<()> {
        let mut state = self.state.write().await;
        let key = session.key();
        if state.active.contains_key(&key) {
            return Err(BillingError::DuplicateActiveSession {
                vehicle: session.vehicle_number.to_string(),
                handler: session.handled_by.to_string(),
            });
        }
        state.active.insert(key, session.clone());
        Ok(())
    }

    async fn complete_session(&self, session: &VehicleSession) -> Result<()> {
        if session.charge.is_none() || session.checkout_time.is_none() {
            return Err(BillingError::CorruptSession {
                reason: format!("session {} is not closed", session.id),
            });
        }

        let mut state = self.state.write().await;
        let key = session.key();
        match state.active.remove(&key) {
            Some(_) => {
                state.completed.push(session.clone());
                Ok(())
            }
            None => Err(BillingError::NoActiveSession {
                vehicle: session.vehicle_number.to_string(),
                handler: session.handled_by.to_string(),
            }),
        }
    }

    async fn list_active(&self, handler: Option<&HandlerId>) -> Result<Vec<VehicleSession>> {
        let state = self.state.read().await;
        let mut sessions: Vec<VehicleSession> = state
            .active
            .values()
            .filter(|s| handler.map_or(true, |h| s.handled_by == *h))
            .cloned()
            .collect();
        sessions.sort_by_key(|s| std::cmp::Reverse(s.checkin_time));
        Ok(sessions)
    }

    async fn search_active_by_prefix(
        &self,
        handler: &HandlerId,
        prefix: &str,
    ) -> Result<Vec<VehicleSession>> {
        let prefix = prefix.trim().to_uppercase();
        let state = self.state.read().await;
        let mut sessions: Vec<VehicleSession> = state
            .active
            .values()
            .filter(|s| s.handled_by == *handler && s.vehicle_number.as_str().starts_with(&prefix))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| a.vehicle_number.as_str().cmp(b.vehicle_number.as_str()));
        Ok(sessions)
    }

    async fn list_checked_in_between(
        &self,
        handler: &HandlerId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<VehicleSession>> {
        let state = self.state.read().await;
        let mut sessions: Vec<VehicleSession> = state
            .active
            .values()
            .chain(state.completed.iter())
            .filter(|s| s.handled_by == *handler && s.checkin_time >= from && s.checkin_time < to)
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.checkin_time);
        Ok(sessions)
    }

    async fn list_completed_between(
        &self,
        handler: &HandlerId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<VehicleSession>> {
        let state = self.state.read().await;
        let mut sessions: Vec<VehicleSession> = state
            .completed
            .iter()
            .filter(|s| {
                s.handled_by == *handler
                    && s.checkout_time
                        .map(|t| t >= from && t < to)
                        .unwrap_or(false)
            })
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.checkout_time);
        Ok(sessions)
    }
}

#[derive(Default)]
struct RateState {
    rates: HashMap<RateId, RateConfig>,
    assignments: HashMap<HandlerId, RateId>,
}

/// In-memory rate catalog for tests and development.
pub struct MemoryRateRepository {
    state: Arc<RwLock<RateState>>,
}

impl MemoryRateRepository {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(RateState::default())),
        }
    }
}

impl Default for MemoryRateRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateRepository for MemoryRateRepository {
    async fn rate_for_handler(&self, handler: &HandlerId) -> Result<RateConfig> {
        let state = self.state.read().await;
        state
            .assignments
            .get(handler)
            .and_then(|rate_id| state.rates.get(rate_id))
            .cloned()
            .ok_or_else(|| BillingError::RateNotFound {
                handler: handler.to_string(),
            })
    }

    async fn get_rate(&self, id: &RateId) -> Result<Option<RateConfig>> {
        let state = self.state.read().await;
        Ok(state.rates.get(id).cloned())
    }

    async fn create_rate(&self, rate: &RateConfig) -> Result<()> {
        let mut state = self.state.write().await;
        state.rates.insert(rate.id, rate.clone());
        Ok(())
    }

    async fn assign_handler(&self, handler: &HandlerId, rate_id: &RateId) -> Result<()> {
        let mut state = self.state.write().await;
        state.assignments.insert(handler.clone(), *rate_id);
        Ok(())
    }

    async fn list_rates(&self) -> Result<Vec<RateConfig>> {
        let state = self.state.read().await;
        let mut rates: Vec<RateConfig> = state.rates.values().cloned().collect();
        rates.sort_by_key(|r| r.created_at);
        Ok(rates)
    }
}
