pub mod rates;
pub mod sessions;
pub mod tariff;
pub mod types;

pub use rates::RateConfig;
pub use sessions::{ChargeRecord, SessionKey, VehicleSession};
pub use tariff::{compute_charge, ChargeBreakdown};
pub use types::{
    Amount, BlockDuration, HandlerId, PaymentMode, RateId, SessionId, SessionState, VehicleNumber,
};
