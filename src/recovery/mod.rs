pub mod tablespace;
pub mod target;

pub use tablespace::{TablespaceRules, parse_rules, validate_rules};
pub use target::{RecoveryTarget, check_destination};
