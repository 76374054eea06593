use crate::config::{ReuseBackup, ServerConfig};
use crate::server::{BackupOptions, FileScope};

/// `backup` overrides. `None` keeps the per-server configuration value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupArgs {
    pub immediate_checkpoint: Option<bool>,
    pub reuse_backup: Option<ReuseBackup>,
    pub retry_times: Option<u32>,
    pub retry_sleep: Option<u64>,
}

impl BackupArgs {
    pub fn options_for(&self, config: &ServerConfig) -> BackupOptions {
        BackupOptions {
            reuse_backup: self.reuse_backup.unwrap_or(config.reuse_backup),
            immediate_checkpoint: self
                .immediate_checkpoint
                .unwrap_or(config.immediate_checkpoint),
            retry_times: self.retry_times.unwrap_or(config.basebackup_retry_times),
            retry_sleep: self.retry_sleep.unwrap_or(config.basebackup_retry_sleep),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoverArgs {
    pub server_name: String,
    pub backup_id: String,
    pub destination: String,
    pub target_tli: Option<u32>,
    pub target_time: Option<String>,
    pub target_xid: Option<String>,
    pub target_name: Option<String>,
    pub exclusive: bool,

    /// Raw `NAME:LOCATION` relocation rules
    pub tablespaces: Vec<String>,

    pub remote_ssh_command: Option<String>,
    pub retry_times: Option<u32>,
    pub retry_sleep: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListFilesArgs {
    pub server_name: String,
    pub backup_id: String,
    pub scope: FileScope,
}
