pub mod manager;

pub use manager::{LockOutcome, MaintenanceLock};
