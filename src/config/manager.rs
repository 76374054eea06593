use mockall::automock;
use std::path::PathBuf;

use crate::config::model::{GlobalConfig, ServerConfig};

/// Read-only view over a loaded configuration.
///
/// Everything here is computed once at load time; callers never observe a
/// change for the rest of a command invocation.
#[automock]
pub trait ConfigProvider {
    fn global(&self) -> GlobalConfig;

    /// Every configured server, sorted by name.
    fn servers(&self) -> Vec<ServerConfig>;

    fn get_server(&self, name: &str) -> Option<ServerConfig>;

    /// Cross-server clashes, in discovery order.
    fn global_conflicts(&self) -> Vec<String>;

    fn lock_directory(&self) -> PathBuf;
}
