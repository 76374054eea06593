pub mod backup;
pub mod command;
pub mod config;
pub mod error;
pub mod lock;
pub mod logging;
pub mod output;
pub mod recovery;
pub mod server;
pub mod target;
