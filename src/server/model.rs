use anyhow::{Error, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::config::ReuseBackup;
use crate::recovery::RecoveryTarget;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackupStatus {
    /// Catalog entry created, nothing copied yet
    Empty,

    /// Copy in progress
    Started,

    Failed,
    Done,
}

impl fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackupStatus::Empty => "EMPTY",
            BackupStatus::Started => "STARTED",
            BackupStatus::Failed => "FAILED",
            BackupStatus::Done => "DONE",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tablespace {
    pub name: String,
    pub oid: u32,

    /// Location on the origin server
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub backup_id: String,
    pub server_name: String,
    pub status: BackupStatus,
    pub begin_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub begin_wal: Option<String>,
    pub end_wal: Option<String>,
    pub tablespaces: Vec<Tablespace>,
    pub error: Option<String>,
}

impl BackupRecord {
    pub fn new(server_name: &str, backup_id: &str, begin_time: DateTime<Utc>) -> Self {
        Self {
            backup_id: backup_id.to_string(),
            server_name: server_name.to_string(),
            status: BackupStatus::Empty,
            begin_time,
            end_time: None,
            begin_wal: None,
            end_wal: None,
            tablespaces: Vec::new(),
            error: None,
        }
    }

    pub fn tablespace_names(&self) -> Vec<String> {
        self.tablespaces.iter().map(|t| t.name.clone()).collect()
    }
}

/// Options of a single backup run, config values already overridden by the
/// command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupOptions {
    pub reuse_backup: ReuseBackup,
    pub immediate_checkpoint: bool,
    pub retry_times: u32,
    pub retry_sleep: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryRequest {
    pub destination: String,

    /// Tablespace name -> new location
    pub tablespaces: BTreeMap<String, String>,

    pub target: RecoveryTarget,
    pub remote_command: Option<String>,
    pub retry_times: u32,
    pub retry_sleep: u64,
}

/// Which files `list-files` reports for a backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileScope {
    /// Data files plus the WAL files needed to make them consistent
    #[default]
    Standalone,

    Data,

    /// WAL files from the backup start up to the next backup
    Wal,

    /// Data plus Wal
    Full,
}

impl FromStr for FileScope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standalone" => Ok(FileScope::Standalone),
            "data" => Ok(FileScope::Data),
            "wal" => Ok(FileScope::Wal),
            "full" => Ok(FileScope::Full),
            other => Err(anyhow!(
                "invalid target '{other}' (expected standalone, data, wal or full)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,
    pub ok: bool,
    pub hint: Option<String>,
}

impl CheckResult {
    pub fn new(name: &str, ok: bool, hint: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            ok,
            hint,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CronReport {
    /// WAL files moved from the incoming directory into the catalog
    pub archived: usize,
}

/// Ordered key/value pairs for `status` and `show-server`.
pub type Properties = Vec<(String, String)>;
