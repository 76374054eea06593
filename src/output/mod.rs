pub mod console;
pub mod manager;
pub mod nagios;

#[cfg(test)]
pub mod memory;

pub use console::ConsoleOutput;
pub use manager::{INTERRUPTED, Output, OutputFormat, report_interrupt};
pub use nagios::NagiosOutput;
