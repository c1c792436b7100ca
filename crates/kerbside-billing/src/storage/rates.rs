use crate::domain::rates::RateConfig;
use crate::domain::types::{Amount, BlockDuration, HandlerId, RateId};
use crate::error::{BillingError, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Rate catalog: administrator-owned billing rules looked up through the
/// handler's assignment. Rates are immutable once created; assignments may
/// be repointed.
#[async_trait]
pub trait RateRepository: Send + Sync {
    /// Resolve the rate the handler currently checks vehicles in against.
    async fn rate_for_handler(&self, handler: &HandlerId) -> Result<RateConfig>;

    async fn get_rate(&self, id: &RateId) -> Result<Option<RateConfig>>;

    async fn create_rate(&self, rate: &RateConfig) -> Result<()>;

    async fn assign_handler(&self, handler: &HandlerId, rate_id: &RateId) -> Result<()>;

    async fn list_rates(&self) -> Result<Vec<RateConfig>>;
}

pub struct SqlRateRepository {
    pool: PgPool,
    // Rates never change after creation, so cache entries cannot go stale.
    cache: Arc<RwLock<HashMap<RateId, RateConfig>>>,
}

impl SqlRateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn store_error(operation: &str, e: sqlx::Error) -> BillingError {
        BillingError::StoreUnavailable {
            operation: operation.to_string(),
            source: Box::new(e),
        }
    }

    fn rate_from_row(r: &sqlx::postgres::PgRow) -> Result<RateConfig> {
        let initial_minutes: i32 = r.get("initial_duration_minutes");
        let extra_minutes: i32 = r.get("extra_charge_duration_minutes");

        Ok(RateConfig {
            id: RateId::from_uuid(r.get("rate_id")),
            label: r.get("label"),
            initial_amount: Amount::from_decimal(r.get("initial_amount")),
            initial_duration: BlockDuration::from_minutes(initial_minutes as u32)?,
            extra_charge: Amount::from_decimal(r.get("extra_charge")),
            extra_charge_duration: BlockDuration::from_minutes(extra_minutes as u32)?,
            created_at: r.get("created_at"),
        })
    }

    async fn load_rate(&self, id: &RateId) -> Result<Option<RateConfig>> {
        let row = sqlx::query(
            r#"
            SELECT rate_id, label, initial_amount, initial_duration_minutes,
                   extra_charge, extra_charge_duration_minutes, created_at
            FROM rates
            WHERE rate_id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Self::store_error("load_rate", e))?;

        row.map(|r| Self::rate_from_row(&r)).transpose()
    }
}

#[async_trait]
impl RateRepository for SqlRateRepository {
    async fn rate_for_handler(&self, handler: &HandlerId) -> Result<RateConfig> {
        let row = sqlx::query("SELECT rate_id FROM rate_assignments WHERE handler_id = $1")
            .bind(handler.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Self::store_error("rate_for_handler", e))?;

        let rate_id = match row {
            Some(r) => RateId::from_uuid(r.get("rate_id")),
            None => {
                return Err(BillingError::RateNotFound {
                    handler: handler.to_string(),
                })
            }
        };

        self.get_rate(&rate_id)
            .await?
            .ok_or_else(|| BillingError::RateNotFound {
                handler: handler.to_string(),
            })
    }

    async fn get_rate(&self, id: &RateId) -> Result<Option<RateConfig>> {
        {
            let cache = self.cache.read().await;
            if let Some(rate) = cache.get(id) {
                return Ok(Some(rate.clone()));
            }
        }

        let loaded = self.load_rate(id).await?;
        if let Some(rate) = &loaded {
            let mut cache = self.cache.write().await;
            cache.insert(*id, rate.clone());
        }
        Ok(loaded)
    }

    async fn create_rate(&self, rate: &RateConfig) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO rates
            (rate_id, label, initial_amount, initial_duration_minutes,
             extra_charge, extra_charge_duration_minutes, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(rate.id.as_uuid())
        .bind(&rate.label)
        .bind(rate.initial_amount.as_decimal())
        .bind(rate.initial_duration.num_minutes() as i32)
        .bind(rate.extra_charge.as_decimal())
        .bind(rate.extra_charge_duration.num_minutes() as i32)
        .bind(rate.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::store_error("create_rate", e))?;

        Ok(())
    }

    async fn assign_handler(&self, handler: &HandlerId, rate_id: &RateId) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO rate_assignments (handler_id, rate_id, assigned_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (handler_id) DO UPDATE
            SET rate_id = EXCLUDED.rate_id, assigned_at = EXCLUDED.assigned_at
            "#,
        )
        .bind(handler.as_str())
        .bind(rate_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|e| Self::store_error("assign_handler", e))?;

        Ok(())
    }

    async fn list_rates(&self) -> Result<Vec<RateConfig>> {
        let rows = sqlx::query(
            r#"
            SELECT rate_id, label, initial_amount, initial_duration_minutes,
                   extra_charge, extra_charge_duration_minutes, created_at
            FROM rates
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Self::store_error("list_rates", e))?;

        rows.iter().map(Self::rate_from_row).collect()
    }
}
