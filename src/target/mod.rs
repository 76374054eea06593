pub mod classifier;
pub mod resolver;

pub use classifier::{ErrorPolicy, TargetAction, classify};
pub use resolver::*;
