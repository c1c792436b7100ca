use crate::domain::sessions::{ChargeRecord, SessionKey, VehicleSession};
use crate::domain::types::{
    Amount, HandlerId, PaymentMode, RateId, SessionId, SessionState, VehicleNumber,
};
use crate::error::{BillingError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

/// Store adapter over active and completed vehicle sessions. No business
/// logic lives here; the lifecycle manager owns the rules.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn find_active(&self, key: &SessionKey) -> Result<Option<VehicleSession>>;

    /// Insert a new ACTIVE session. Must refuse a second active row for the
    /// same `(vehicle_number, handled_by)` key with `DuplicateActiveSession`.
    async fn insert_active(&self, session: &VehicleSession) -> Result<()>;

    /// Move a closed session from active to completed storage. The move is
    /// atomic: no observer sees the session in both stores or in neither.
    async fn complete_session(&self, session: &VehicleSession) -> Result<()>;

    async fn list_active(&self, handler: Option<&HandlerId>) -> Result<Vec<VehicleSession>>;

    async fn search_active_by_prefix(
        &self,
        handler: &HandlerId,
        prefix: &str,
    ) -> Result<Vec<VehicleSession>>;

    /// Sessions checked in inside `[from, to)`, across both stores.
    async fn list_checked_in_between(
        &self,
        handler: &HandlerId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<VehicleSession>>;

    /// Completed sessions checked out inside `[from, to)`.
    async fn list_completed_between(
        &self,
        handler: &HandlerId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<VehicleSession>>;
}

pub struct SqlSessionRepository {
    pool: PgPool,
}

impl SqlSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn store_error(operation: &str, e: sqlx::Error) -> BillingError {
        BillingError::StoreUnavailable {
            operation: operation.to_string(),
            source: Box::new(e),
        }
    }

    fn is_unique_violation(e: &sqlx::Error) -> bool {
        e.as_database_error()
            .and_then(|d| d.code())
            .map(|code| code == "23505")
            .unwrap_or(false)
    }

    fn session_from_active_row(r: &sqlx::postgres::PgRow) -> Result<VehicleSession> {
        Ok(VehicleSession {
            id: SessionId::from_uuid(r.get("session_id")),
            vehicle_number: VehicleNumber::parse(r.get("vehicle_number"))?,
            handled_by: HandlerId::new(r.get::<String, _>("handled_by")),
            checkin_time: r.get("checkin_time"),
            checkout_time: None,
            payment_mode: PaymentMode::parse(r.get("payment_mode"))?,
            rate_id: RateId::from_uuid(r.get("rate_id")),
            state: SessionState::Active,
            charge: None,
        })
    }

    fn session_from_completed_row(r: &sqlx::postgres::PgRow) -> Result<VehicleSession> {
        let additional_payment_mode = r
            .get::<Option<String>, _>("additional_payment_mode")
            .map(|m| PaymentMode::parse(&m))
            .transpose()?;

        Ok(VehicleSession {
            id: SessionId::from_uuid(r.get("session_id")),
            vehicle_number: VehicleNumber::parse(r.get("vehicle_number"))?,
            handled_by: HandlerId::new(r.get::<String, _>("handled_by")),
            checkin_time: r.get("checkin_time"),
            checkout_time: Some(r.get("checkout_time")),
            payment_mode: PaymentMode::parse(r.get("payment_mode"))?,
            rate_id: RateId::from_uuid(r.get("rate_id")),
            state: SessionState::Completed,
            charge: Some(ChargeRecord {
                initial_payment: Amount::from_decimal(r.get("initial_payment")),
                additional_charge: Amount::from_decimal(r.get("additional_charge")),
                additional_payment_mode,
                total_charge: Amount::from_decimal(r.get("total_charge")),
            }),
        })
    }
}

#[async_trait]
impl SessionRepository for SqlSessionRepository {
    async fn find_active(&self, key: &SessionKey) -> Result<Option<VehicleSession>> {
        let row = sqlx::query(
            r#"
            SELECT session_id, vehicle_number, handled_by, checkin_time,
                   payment_mode, rate_id
            FROM active_sessions
            WHERE vehicle_number = $1 AND handled_by = $2
            "#,
        )
        .bind(key.vehicle.as_str())
        .bind(key.handler.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Self::store_error("find_active", e))?;

        row.map(|r| Self::session_from_active_row(&r)).transpose()
    }

    async fn insert_active(&self, session: &VehicleSession) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO active_sessions
            (session_id, vehicle_number, handled_by, checkin_time, payment_mode, rate_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(session.id.as_uuid())
        .bind(session.vehicle_number.as_str())
        .bind(session.handled_by.as_str())
        .bind(session.checkin_time)
        .bind(session.payment_mode.as_str())
        .bind(session.rate_id.as_uuid())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if Self::is_unique_violation(&e) => Err(BillingError::DuplicateActiveSession {
                vehicle: session.vehicle_number.to_string(),
                handler: session.handled_by.to_string(),
            }),
            Err(e) => Err(Self::store_error("insert_active", e)),
        }
    }

    async fn complete_session(&self, session: &VehicleSession) -> Result<()> {
        let charge = session
            .charge
            .as_ref()
            .ok_or_else(|| BillingError::CorruptSession {
                reason: format!("session {} has no charge record at completion", session.id),
            })?;
        let checkout_time = session
            .checkout_time
            .ok_or_else(|| BillingError::CorruptSession {
                reason: format!("session {} has no checkout time at completion", session.id),
            })?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Self::store_error("complete_session", e))?;

        let deleted = sqlx::query("DELETE FROM active_sessions WHERE session_id = $1")
            .bind(session.id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| Self::store_error("complete_session", e))?;

        if deleted.rows_affected() == 0 {
            return Err(BillingError::NoActiveSession {
                vehicle: session.vehicle_number.to_string(),
                handler: session.handled_by.to_string(),
            });
        }

        sqlx::query(
            r#"
            INSERT INTO completed_sessions
            (session_id, vehicle_number, handled_by, checkin_time, checkout_time,
             payment_mode, rate_id, initial_payment, additional_charge,
             additional_payment_mode, total_charge)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(session.id.as_uuid())
        .bind(session.vehicle_number.as_str())
        .bind(session.handled_by.as_str())
        .bind(session.checkin_time)
        .bind(checkout_time)
        .bind(session.payment_mode.as_str())
        .bind(session.rate_id.as_uuid())
        .bind(charge.initial_payment.as_decimal())
        .bind(charge.additional_charge.as_decimal())
        .bind(charge.additional_payment_mode.as_ref().map(|m| m.as_str()))
        .bind(charge.total_charge.as_decimal())
        .execute(&mut *tx)
        .await
        .map_err(|e| Self::store_error("complete_session", e))?;

        tx.commit()
            .await
            .map_err(|e| Self::store_error("complete_session", e))
    }

    async fn list_active(&self, handler: Option<&HandlerId>) -> Result<Vec<VehicleSession>> {
        let query = if let Some(handler) = handler {
            sqlx::query(
                r#"
                SELECT session_id, vehicle_number, handled_by, checkin_time,
                       payment_mode, rate_id
                FROM active_sessions
                WHERE handled_by = $1
                ORDER BY checkin_time DESC
                "#,
            )
            .bind(handler.as_str())
        } else {
            sqlx::query(
                r#"
                SELECT session_id, vehicle_number, handled_by, checkin_time,
                       payment_mode, rate_id
                FROM active_sessions
                ORDER BY checkin_time DESC
                "#,
            )
        };

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Self::store_error("list_active", e))?;

        rows.iter().map(Self::session_from_active_row).collect()
    }

    async fn search_active_by_prefix(
        &self,
        handler: &HandlerId,
        prefix: &str,
    ) -> Result<Vec<VehicleSession>> {
        // LIKE special characters in a plate prefix are escaped rather than
        // interpreted.
        let escaped = prefix
            .trim()
            .to_uppercase()
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");

        let rows = sqlx::query(
            r#"
            SELECT session_id, vehicle_number, handled_by, checkin_time,
                   payment_mode, rate_id
            FROM active_sessions
            WHERE handled_by = $1 AND vehicle_number LIKE $2 || '%'
            ORDER BY vehicle_number
            "#,
        )
        .bind(handler.as_str())
        .bind(escaped)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Self::store_error("search_active_by_prefix", e))?;

        rows.iter().map(Self::session_from_active_row).collect()
    }

    async fn list_checked_in_between(
        &self,
        handler: &HandlerId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<VehicleSession>> {
        let active_rows = sqlx::query(
            r#"
            SELECT session_id, vehicle_number, handled_by, checkin_time,
                   payment_mode, rate_id
            FROM active_sessions
            WHERE handled_by = $1 AND checkin_time >= $2 AND checkin_time < $3
            "#,
        )
        .bind(handler.as_str())
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Self::store_error("list_checked_in_between", e))?;

        let completed_rows = sqlx::query(
            r#"
            SELECT session_id, vehicle_number, handled_by, checkin_time, checkout_time,
                   payment_mode, rate_id, initial_payment, additional_charge,
                   additional_payment_mode, total_charge
            FROM completed_sessions
            WHERE handled_by = $1 AND checkin_time >= $2 AND checkin_time < $3
            "#,
        )
        .bind(handler.as_str())
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Self::store_error("list_checked_in_between", e))?;

        let mut sessions: Vec<VehicleSession> = active_rows
            .iter()
            .map(Self::session_from_active_row)
            .collect::<Result<_>>()?;
        for row in &completed_rows {
            sessions.push(Self::session_from_completed_row(row)?);
        }
        sessions.sort_by_key(|s| s.checkin_time);
        Ok(sessions)
    }

    async fn list_completed_between(
        &self,
        handler: &HandlerId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<VehicleSession>> {
        let rows = sqlx::query(
            r#"
            SELECT session_id, vehicle_number, handled_by, checkin_time, checkout_time,
                   payment_mode, rate_id, initial_payment, additional_charge,
                   additional_payment_mode, total_charge
            FROM completed_sessions
            WHERE handled_by = $1 AND checkout_time >= $2 AND checkout_time < $3
            ORDER BY checkout_time
            "#,
        )
        .bind(handler.as_str())
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Self::store_error("list_completed_between", e))?;

        rows.iter().map(Self::session_from_completed_row).collect()
    }
}
