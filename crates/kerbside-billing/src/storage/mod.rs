pub mod connection;
pub mod memory;
pub mod rates;
pub mod sessions;

pub use connection::DatabaseConnection;

pub use rates::{RateRepository, SqlRateRepository};

pub use sessions::{SessionRepository, SqlSessionRepository};

pub use memory::{MemoryRateRepository, MemorySessionRepository};
