use crate::config::DatabaseConfig;
use crate::error::{BillingError, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::info;

/// Connection pool over the billing database.
pub struct DatabaseConnection {
    pool: PgPool,
}

impl DatabaseConnection {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .connect(&config.url)
            .await
            .map_err(|e| BillingError::StoreUnavailable {
                operation: "connect".to_string(),
                source: Box::new(e),
            })?;

        info!("Connected to billing database");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| BillingError::StoreUnavailable {
                operation: "migrate".to_string(),
                source: Box::new(e),
            })?;

        info!("Database migrations completed");
        Ok(())
    }
}
