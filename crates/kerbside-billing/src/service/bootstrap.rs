use crate::config::DefaultRateConfig;
use crate::domain::rates::RateConfig;
use crate::domain::types::{Amount, BlockDuration, RateId};
use crate::error::Result;
use crate::storage::RateRepository;
use tracing::{debug, info};

/// Idempotent startup seeding: make sure a default rate exists so a fresh
/// deployment can assign handlers immediately. Invoked once at process
/// startup, never per request.
pub async fn ensure_default_rate(
    rates: &dyn RateRepository,
    defaults: &DefaultRateConfig,
) -> Result<RateId> {
    if let Some(existing) = rates
        .list_rates()
        .await?
        .into_iter()
        .find(|r| r.label == defaults.label)
    {
        debug!(rate = %existing.label, "Default rate already present");
        return Ok(existing.id);
    }

    let rate = RateConfig::new(
        defaults.label.clone(),
        Amount::from_decimal(defaults.initial_amount),
        BlockDuration::from_hours(defaults.initial_hours)?,
        Amount::from_decimal(defaults.extra_charge),
        BlockDuration::from_hours(defaults.extra_charge_hours)?,
    )?;
    rates.create_rate(&rate).await?;

    info!(rate = %rate.label, id = %rate.id, "Seeded default rate");
    Ok(rate.id)
}
