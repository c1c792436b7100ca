use anyhow::{anyhow, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BillingConfig {
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    pub default_rate: DefaultRateConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub environment: String,
    pub lot_name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_seconds: u64,
    pub run_migrations: bool,
}

/// Seed values for the idempotent default-rate bootstrap step.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DefaultRateConfig {
    pub label: String,
    pub initial_amount: Decimal,
    pub initial_hours: u32,
    pub extra_charge: Decimal,
    pub extra_charge_hours: u32,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                environment: "development".to_string(),
                lot_name: "main-lot".to_string(),
            },
            database: DatabaseConfig {
                url: "postgres://kerbside@localhost:5432/kerbside_billing".to_string(),
                max_connections: 10,
                connect_timeout_seconds: 5,
                run_migrations: true,
            },
            default_rate: DefaultRateConfig {
                label: "standard".to_string(),
                initial_amount: dec!(20.00),
                initial_hours: 2,
                extra_charge: dec!(10.00),
                extra_charge_hours: 1,
            },
        }
    }
}

impl BillingConfig {
    pub fn load(path_override: Option<PathBuf>) -> Result<Self> {
        let default_config = BillingConfig::default();
        let mut figment = Figment::from(Serialized::defaults(default_config));

        if let Some(path) = path_override {
            if path.exists() {
                figment = figment.merge(Toml::file(&path));
            }
        } else {
            let default_path = PathBuf::from("kerbside.toml");
            if default_path.exists() {
                figment = figment.merge(Toml::file(default_path));
            }
        }

        figment = figment.merge(Env::prefixed("KERBSIDE_").split("__"));

        figment
            .extract()
            .map_err(|e| anyhow!("Configuration error: {}", e))
    }

    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }
}
