use anyhow::{Context, Error, Result, anyhow, bail};
use chrono::Utc;
use serde_json::json;
use std::fs::{self, File, OpenOptions, create_dir_all};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::manager::{Server, ServerFactory};
use super::model::*;
use crate::config::ServerConfig;

const BACKUP_INFO: &str = "backup.info";
const DATA_DIR: &str = "data";
const WAL_CATALOG: &str = "xlog.db";

/// Catalog-backed server: metadata on local disk, copying done by the
/// configured hook commands.
pub struct FsServer {
    config: ServerConfig,
}

pub struct FsServerFactory;

impl ServerFactory for FsServerFactory {
    fn create(&self, config: &ServerConfig) -> Box<dyn Server> {
        Box::new(FsServer::new(config.clone()))
    }
}

impl FsServer {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    fn backup_dir(&self, backup_id: &str) -> PathBuf {
        self.config.basebackups_directory.join(backup_id)
    }

    fn info_path(&self, backup_id: &str) -> PathBuf {
        self.backup_dir(backup_id).join(BACKUP_INFO)
    }

    fn wal_catalog_path(&self) -> PathBuf {
        self.config.wals_directory.join(WAL_CATALOG)
    }

    fn load_record(&self, path: &Path) -> Result<BackupRecord, Error> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open file: {}", path.display()))?;
        let reader = BufReader::new(file);

        bincode::deserialize_from(reader)
            .with_context(|| format!("Failed to deserialize data from file: {}", path.display()))
    }

    pub(crate) fn save_record(&self, record: &BackupRecord) -> Result<(), Error> {
        let dir = self.backup_dir(&record.backup_id);
        create_dir_all(&dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

        let path = self.info_path(&record.backup_id);
        let file = File::create(&path)
            .with_context(|| format!("Failed to create file: {}", path.display()))?;
        let writer = BufWriter::new(file);

        bincode::serialize_into(writer, record)
            .with_context(|| format!("Failed to serialize data to file: {}", path.display()))
    }

    fn read_wal_catalog(&self) -> Result<Vec<String>, Error> {
        let path = self.wal_catalog_path();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read WAL catalog: {}", path.display()))?;
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect())
    }

    fn write_wal_catalog(&self, names: &[String]) -> Result<(), Error> {
        let path = self.wal_catalog_path();
        let mut content = names.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        fs::write(&path, content)
            .with_context(|| format!("Failed to write WAL catalog: {}", path.display()))
    }

    fn run_hook(&self, command: &str, env: &[(&str, String)]) -> Result<String, Error> {
        debug!(server = %self.config.name, "running hook: {}", command);
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .env("BMAN_SERVER", &self.config.name)
            .envs(env.iter().map(|(k, v)| (*k, v.as_str())))
            .output()
            .with_context(|| format!("Failed to execute '{command}'"))?;

        if !output.status.success() {
            bail!(
                "'{}' failed ({}): {}",
                command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Runs a hook, retrying `retry_times` more times after a failure.
    fn run_hook_with_retry(
        &self,
        command: &str,
        env: &[(&str, String)],
        retry_times: u32,
        retry_sleep: u64,
    ) -> Result<String, Error> {
        let mut attempt = 0;
        loop {
            match self.run_hook(command, env) {
                Ok(stdout) => return Ok(stdout),
                Err(e) if attempt < retry_times => {
                    attempt += 1;
                    warn!(
                        server = %self.config.name,
                        "copy failed ({:#}), retrying in {}s ({}/{})",
                        e, retry_sleep, attempt, retry_times
                    );
                    thread::sleep(Duration::from_secs(retry_sleep));
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn parse_hook_output(stdout: &str, record: &mut BackupRecord) {
        for line in stdout.lines() {
            let mut fields = line.split_whitespace();
            match (fields.next(), fields.next()) {
                (Some("begin_wal"), Some(wal)) => record.begin_wal = Some(wal.to_string()),
                (Some("end_wal"), Some(wal)) => record.end_wal = Some(wal.to_string()),
                (Some("tablespace"), Some(name)) => {
                    let oid = fields.next().and_then(|oid| oid.parse().ok());
                    let location = fields.collect::<Vec<_>>().join(" ");
                    match oid {
                        Some(oid) if !location.is_empty() => record.tablespaces.push(Tablespace {
                            name: name.to_string(),
                            oid,
                            location,
                        }),
                        _ => warn!("ignoring malformed tablespace line: {}", line),
                    }
                }
                _ => {}
            }
        }
    }

    fn data_files(&self, backup: &BackupRecord) -> Vec<String> {
        let data_dir = self.backup_dir(&backup.backup_id).join(DATA_DIR);
        let mut files: Vec<String> = WalkDir::new(&data_dir)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.path().display().to_string())
            .collect();
        files.sort();
        files
    }

    fn wal_files(&self, from: &str, to: Option<&str>, inclusive: bool) -> Result<Vec<String>> {
        let wals = self.read_wal_catalog()?;
        Ok(wals
            .into_iter()
            .filter(|wal| wal.as_str() >= from)
            .filter(|wal| match to {
                Some(to) if inclusive => wal.as_str() <= to,
                Some(to) => wal.as_str() < to,
                None => true,
            })
            .map(|wal| self.config.wals_directory.join(wal).display().to_string())
            .collect())
    }

    fn next_backup(&self, backup: &BackupRecord) -> Result<Option<BackupRecord>> {
        Ok(self
            .list_backups()?
            .into_iter()
            .find(|b| b.backup_id > backup.backup_id))
    }
}

impl Server for FsServer {
    fn backup(&mut self, options: &BackupOptions) -> Result<BackupRecord, Error> {
        let command = self
            .config
            .backup_command
            .clone()
            .ok_or_else(|| anyhow!("backup_command is not configured"))?;

        let begin_time = Utc::now();
        let backup_id = begin_time.format("%Y%m%dT%H%M%S").to_string();
        let backup_dir = self.backup_dir(&backup_id);
        if backup_dir.exists() {
            bail!("backup '{}' already exists", backup_id);
        }
        let data_dir = backup_dir.join(DATA_DIR);
        create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create directory: {}", data_dir.display()))?;

        let mut record = BackupRecord::new(&self.config.name, &backup_id, begin_time);
        record.status = BackupStatus::Started;
        self.save_record(&record)?;
        info!(server = %self.config.name, backup_id = %backup_id, "starting backup");

        let env = [
            ("BMAN_BACKUP_ID", backup_id.clone()),
            ("BMAN_BACKUP_DIR", data_dir.display().to_string()),
            ("BMAN_REUSE_BACKUP", options.reuse_backup.to_string()),
            ("BMAN_IMMEDIATE_CHECKPOINT", options.immediate_checkpoint.to_string()),
        ];
        let result =
            self.run_hook_with_retry(&command, &env, options.retry_times, options.retry_sleep);

        match result {
            Ok(stdout) => {
                Self::parse_hook_output(&stdout, &mut record);
                record.status = BackupStatus::Done;
            }
            Err(e) => {
                record.status = BackupStatus::Failed;
                record.error = Some(format!("{e:#}"));
            }
        }
        record.end_time = Some(Utc::now());
        self.save_record(&record)?;
        info!(
            server = %self.config.name,
            backup_id = %backup_id,
            status = %record.status,
            "backup finished"
        );

        Ok(record)
    }

    fn list_backups(&self) -> Result<Vec<BackupRecord>, Error> {
        let base = &self.config.basebackups_directory;
        if !base.exists() {
            return Ok(Vec::new());
        }

        let mut backups = Vec::new();
        for entry in fs::read_dir(base)
            .with_context(|| format!("Failed to read directory: {}", base.display()))?
        {
            let path = entry?.path().join(BACKUP_INFO);
            if path.is_file() {
                backups.push(self.load_record(&path)?);
            }
        }
        backups.sort_by(|a, b| a.backup_id.cmp(&b.backup_id));
        Ok(backups)
    }

    fn get_backup(&self, backup_id: &str) -> Result<Option<BackupRecord>, Error> {
        if backup_id.is_empty() || backup_id.contains(['/', '\\']) || backup_id.starts_with('.') {
            return Ok(None);
        }

        let path = self.info_path(backup_id);
        if !path.is_file() {
            return Ok(None);
        }
        self.load_record(&path).map(Some)
    }

    fn first_backup_id(&self) -> Result<Option<String>, Error> {
        Ok(self.list_backups()?.into_iter().next().map(|b| b.backup_id))
    }

    fn last_backup_id(&self) -> Result<Option<String>, Error> {
        Ok(self.list_backups()?.into_iter().last().map(|b| b.backup_id))
    }

    fn recover(&mut self, backup: &BackupRecord, request: &RecoveryRequest) -> Result<(), Error> {
        let command = self
            .config
            .recovery_command
            .clone()
            .ok_or_else(|| anyhow!("recovery_command is not configured"))?;

        let tablespaces = request
            .tablespaces
            .iter()
            .map(|(name, location)| format!("{name}:{location}"))
            .collect::<Vec<_>>()
            .join("\n");
        let target = &request.target;
        let optional = |value: Option<String>| value.unwrap_or_default();

        let env = [
            ("BMAN_BACKUP_ID", backup.backup_id.clone()),
            (
                "BMAN_BACKUP_DIR",
                self.backup_dir(&backup.backup_id).join(DATA_DIR).display().to_string(),
            ),
            ("BMAN_DESTINATION", request.destination.clone()),
            ("BMAN_TABLESPACES", tablespaces),
            ("BMAN_TARGET_TLI", optional(target.tli.map(|t| t.to_string()))),
            ("BMAN_TARGET_TIME", optional(target.time.map(|t| t.to_rfc3339()))),
            ("BMAN_TARGET_XID", optional(target.xid.map(|x| x.to_string()))),
            ("BMAN_TARGET_NAME", optional(target.name.clone())),
            ("BMAN_TARGET_EXCLUSIVE", target.exclusive.to_string()),
            ("BMAN_REMOTE_COMMAND", optional(request.remote_command.clone())),
        ];

        info!(
            server = %self.config.name,
            backup_id = %backup.backup_id,
            destination = %request.destination,
            "starting recovery"
        );
        self.run_hook_with_retry(&command, &env, request.retry_times, request.retry_sleep)?;
        Ok(())
    }

    fn delete_backup(&mut self, backup: &BackupRecord) -> Result<(), Error> {
        let dir = self.backup_dir(&backup.backup_id);
        fs::remove_dir_all(&dir)
            .with_context(|| format!("Failed to delete backup directory: {}", dir.display()))?;
        info!(server = %self.config.name, backup_id = %backup.backup_id, "backup deleted");
        Ok(())
    }

    fn rebuild_wal_catalog(&mut self) -> Result<usize, Error> {
        let dir = &self.config.wals_directory;
        create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

        let mut names: Vec<String> = fs::read_dir(dir)
            .with_context(|| format!("Failed to read directory: {}", dir.display()))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name != WAL_CATALOG)
            .collect();
        names.sort();

        self.write_wal_catalog(&names)?;
        Ok(names.len())
    }

    fn cron(&mut self) -> Result<CronReport, Error> {
        for dir in [
            &self.config.basebackups_directory,
            &self.config.wals_directory,
            &self.config.incoming_wals_directory,
        ] {
            create_dir_all(dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }

        let incoming = &self.config.incoming_wals_directory;
        let mut pending: Vec<PathBuf> = fs::read_dir(incoming)
            .with_context(|| format!("Failed to read directory: {}", incoming.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file())
            .collect();
        pending.sort();

        let catalog_path = self.wal_catalog_path();
        let mut catalog = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&catalog_path)
            .with_context(|| format!("Failed to open WAL catalog: {}", catalog_path.display()))?;

        let mut report = CronReport::default();
        for path in pending {
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(String::from) else {
                warn!("skipping WAL file with a non UTF-8 name: {}", path.display());
                continue;
            };
            let dest = self.config.wals_directory.join(&name);
            fs::rename(&path, &dest)
                .with_context(|| format!("Failed to archive WAL file: {}", path.display()))?;
            writeln!(catalog, "{name}")
                .with_context(|| format!("Failed to write WAL catalog: {}", catalog_path.display()))?;
            report.archived += 1;
        }

        if report.archived > 0 {
            info!(server = %self.config.name, archived = report.archived, "archived WAL files");
        }
        Ok(report)
    }

    fn status(&self) -> Result<Properties, Error> {
        let backups = self.list_backups()?;
        let wals = self.read_wal_catalog()?;
        let describe = |backup: Option<&BackupRecord>| {
            backup
                .map(|b| format!("{} ({})", b.backup_id, b.status))
                .unwrap_or_else(|| "-".to_string())
        };

        Ok(vec![
            ("Description".to_string(), self.config.description.clone()),
            ("Active".to_string(), self.config.active.to_string()),
            ("Disabled".to_string(), self.config.disabled().to_string()),
            ("No. of available backups".to_string(), backups.len().to_string()),
            ("First available backup".to_string(), describe(backups.first())),
            ("Last available backup".to_string(), describe(backups.last())),
            ("No. of WAL files".to_string(), wals.len().to_string()),
            (
                "Backup directory".to_string(),
                self.config.backup_directory.display().to_string(),
            ),
        ])
    }

    fn show(&self) -> Result<Properties, Error> {
        let c = &self.config;
        let optional = |value: &Option<String>| value.clone().unwrap_or_default();

        Ok(vec![
            ("active".to_string(), c.active.to_string()),
            ("description".to_string(), c.description.clone()),
            ("disabled".to_string(), c.disabled().to_string()),
            ("backup_directory".to_string(), c.backup_directory.display().to_string()),
            (
                "basebackups_directory".to_string(),
                c.basebackups_directory.display().to_string(),
            ),
            ("wals_directory".to_string(), c.wals_directory.display().to_string()),
            (
                "incoming_wals_directory".to_string(),
                c.incoming_wals_directory.display().to_string(),
            ),
            ("backup_command".to_string(), optional(&c.backup_command)),
            ("recovery_command".to_string(), optional(&c.recovery_command)),
            ("ssh_command".to_string(), optional(&c.ssh_command)),
            ("reuse_backup".to_string(), c.reuse_backup.to_string()),
            ("immediate_checkpoint".to_string(), c.immediate_checkpoint.to_string()),
            (
                "basebackup_retry_times".to_string(),
                c.basebackup_retry_times.to_string(),
            ),
            (
                "basebackup_retry_sleep".to_string(),
                c.basebackup_retry_sleep.to_string(),
            ),
        ])
    }

    fn check(&self) -> Result<Vec<CheckResult>, Error> {
        let missing: Vec<String> = self
            .config
            .paths()
            .iter()
            .filter(|(_, path)| !path.is_dir())
            .map(|(option, path)| format!("{}={}", option, path.display()))
            .collect();
        let directories = if missing.is_empty() {
            CheckResult::new("directories", true, None)
        } else {
            CheckResult::new("directories", false, Some(format!("missing {}", missing.join(", "))))
        };

        let backup_command = CheckResult::new(
            "backup_command",
            self.config.backup_command.is_some(),
            None,
        );

        let catalog = match self.list_backups() {
            Ok(_) => CheckResult::new("backup catalog", true, None),
            Err(e) => CheckResult::new("backup catalog", false, Some(format!("{e:#}"))),
        };

        Ok(vec![directories, backup_command, catalog])
    }

    fn list_files(&self, backup: &BackupRecord, scope: FileScope) -> Result<Vec<String>, Error> {
        let mut files = Vec::new();

        if matches!(scope, FileScope::Standalone | FileScope::Data | FileScope::Full) {
            files.extend(self.data_files(backup));
        }

        let Some(begin_wal) = backup.begin_wal.as_deref() else {
            return Ok(files);
        };
        match scope {
            FileScope::Standalone => {
                let end_wal = backup.end_wal.as_deref().unwrap_or(begin_wal);
                files.extend(self.wal_files(begin_wal, Some(end_wal), true)?);
            }
            FileScope::Wal | FileScope::Full => {
                let next = self.next_backup(backup)?;
                let until = next.as_ref().and_then(|b| b.begin_wal.as_deref());
                files.extend(self.wal_files(begin_wal, until, false)?);
            }
            FileScope::Data => {}
        }

        Ok(files)
    }

    fn diagnose(&self) -> Result<serde_json::Value, Error> {
        let backups: serde_json::Map<String, serde_json::Value> = self
            .list_backups()?
            .into_iter()
            .map(|b| (b.backup_id, json!(b.status.to_string())))
            .collect();

        Ok(json!({
            "config": serde_json::to_value(&self.config)?,
            "backups": backups,
            "wal_files": self.read_wal_catalog()?.len(),
        }))
    }
}
