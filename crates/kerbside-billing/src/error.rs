use thiserror::Error;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Vehicle {vehicle} is already checked in under handler {handler}")]
    DuplicateActiveSession { vehicle: String, handler: String },

    #[error("No active session for vehicle {vehicle} under handler {handler}")]
    NoActiveSession { vehicle: String, handler: String },

    #[error("No rate configuration assigned to handler {handler}")]
    RateNotFound { handler: String },

    #[error("Corrupt session: {reason}")]
    CorruptSession { reason: String },

    #[error("Session store unavailable during {operation}: {source}")]
    StoreUnavailable {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Vehicle number is empty after normalization")]
    InvalidVehicleNumber,

    #[error("Invalid rate configuration: {reason}")]
    InvalidRate { reason: String },

    #[error("Payment mode is empty")]
    InvalidPaymentMode,
}

impl BillingError {
    /// Whether the caller can surface this as a rejected operation and
    /// re-prompt the attendant. `StoreUnavailable` should be retried with
    /// backoff instead; `CorruptSession` needs administrative review and the
    /// session stays active and unbilled.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BillingError::DuplicateActiveSession { .. }
                | BillingError::NoActiveSession { .. }
                | BillingError::RateNotFound { .. }
                | BillingError::InvalidVehicleNumber
                | BillingError::InvalidRate { .. }
                | BillingError::InvalidPaymentMode
        )
    }
}

pub type Result<T> = std::result::Result<T, BillingError>;
