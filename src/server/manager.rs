use anyhow::Error;
use mockall::automock;

use crate::config::ServerConfig;
use crate::server::model::*;

/// Executes the actual work for one target.
///
/// Callers only invoke these after every argument has been validated;
/// failures here are I/O or tooling faults.
#[automock]
pub trait Server {
    fn backup(&mut self, options: &BackupOptions) -> Result<BackupRecord, Error>;

    /// Every catalogued backup, oldest first.
    fn list_backups(&self) -> Result<Vec<BackupRecord>, Error>;

    fn get_backup(&self, backup_id: &str) -> Result<Option<BackupRecord>, Error>;

    fn first_backup_id(&self) -> Result<Option<String>, Error>;

    fn last_backup_id(&self) -> Result<Option<String>, Error>;

    fn recover(&mut self, backup: &BackupRecord, request: &RecoveryRequest) -> Result<(), Error>;

    fn delete_backup(&mut self, backup: &BackupRecord) -> Result<(), Error>;

    /// Rebuilds the WAL catalog from disk, returns the number of entries.
    fn rebuild_wal_catalog(&mut self) -> Result<usize, Error>;

    fn cron(&mut self) -> Result<CronReport, Error>;

    fn status(&self) -> Result<Properties, Error>;

    fn show(&self) -> Result<Properties, Error>;

    fn check(&self) -> Result<Vec<CheckResult>, Error>;

    fn list_files(&self, backup: &BackupRecord, scope: FileScope) -> Result<Vec<String>, Error>;

    fn diagnose(&self) -> Result<serde_json::Value, Error>;
}

#[automock]
pub trait ServerFactory {
    fn create(&self, config: &ServerConfig) -> Box<dyn Server>;
}
