use anyhow::Error;
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use super::args::{BackupArgs, ListFilesArgs, RecoverArgs};
use crate::backup::BackupIdentifier;
use crate::config::ConfigProvider;
use crate::error::CommandError;
use crate::lock::{LockOutcome, MaintenanceLock};
use crate::output::Output;
use crate::recovery::{RecoveryTarget, check_destination, parse_rules, validate_rules};
use crate::server::{BackupRecord, BackupStatus, Properties, RecoveryRequest, ServerFactory};
use crate::target::{
    ErrorPolicy, ResolveOptions, ResolvedTarget, SingleTarget, Target, TargetMap, TargetRequest,
    TargetResolver, classify,
};

const DISABLED_SUFFIX: &str = "  (WARNING: Server temporarily disabled due to configuration errors)";
const INACTIVE_SUFFIX: &str = "  (WARNING: Server is not active)";
const TIME_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

enum Admission {
    Proceed(Target),

    /// Reported, go on with the next target
    Skip,

    /// Reported, the whole command stops
    Abort,
}

/// Runs one command against the configured targets.
///
/// Every user-facing problem is reported through the output channel and the
/// method returns `Ok`; `Err` means an unexpected collaborator fault.
pub struct CommandRunner<'a> {
    config: &'a dyn ConfigProvider,
    resolver: TargetResolver<'a>,
    out: &'a mut dyn Output,
}

impl<'a> CommandRunner<'a> {
    pub fn new(
        config: &'a dyn ConfigProvider,
        factory: &'a dyn ServerFactory,
        out: &'a mut dyn Output,
    ) -> Self {
        Self {
            config,
            resolver: TargetResolver::new(config, factory),
            out,
        }
    }

    fn report(&mut self, error: CommandError) {
        self.out.error(&error.to_string());
    }

    fn targets(&mut self, names: &[String], options: ResolveOptions) -> Option<TargetMap> {
        self.resolver
            .resolve(&TargetRequest::from_names(names), options, self.out)
    }

    fn admit(&mut self, name: String, resolved: ResolvedTarget, policy: ErrorPolicy) -> Admission {
        match resolved {
            ResolvedTarget::Unknown => {
                self.report(CommandError::UnknownTarget(name));
                Admission::Skip
            }
            ResolvedTarget::Known(target) => {
                if classify(&target.config, policy).report(self.out) {
                    Admission::Proceed(target)
                } else {
                    Admission::Abort
                }
            }
        }
    }

    fn single(&mut self, name: &str, policy: ErrorPolicy) -> Option<Target> {
        match self.resolver.resolve_one(name, policy, self.out) {
            SingleTarget::Ready(target) => Some(target),
            SingleTarget::Unknown => {
                self.report(CommandError::UnknownTarget(name.to_string()));
                None
            }
            SingleTarget::Aborted => None,
        }
    }

    fn backup_of(&mut self, target: &Target, backup_id: &str) -> Result<Option<BackupRecord>, Error> {
        let backup = BackupIdentifier::parse(backup_id).resolve(target.server.as_ref())?;
        if backup.is_none() {
            self.report(CommandError::UnknownBackup {
                server: target.name().to_string(),
                id: backup_id.to_string(),
            });
        }
        Ok(backup)
    }

    fn properties(&mut self, name: &str, properties: Properties) {
        self.out.result(&format!("Server {name}:"));
        for (key, value) in properties {
            self.out.result(&format!("\t{key}: {value}"));
        }
    }

    pub fn list_server(&mut self, minimal: bool) -> Result<(), Error> {
        let Some(targets) = self.targets(&[], ResolveOptions::default()) else {
            return Ok(());
        };

        for (name, resolved) in targets {
            let ResolvedTarget::Known(target) = resolved else {
                continue;
            };
            if minimal {
                self.out.result(&name);
                continue;
            }

            let mut description = target.config.description.clone();
            if target.config.disabled() {
                description.push_str(DISABLED_SUFFIX);
            } else if !target.config.active {
                description.push_str(INACTIVE_SUFFIX);
            }
            self.out.result(&format!("{name} - {description}"));
        }
        Ok(())
    }

    /// Maintenance sweep over every active target, one at a time host-wide.
    pub fn cron(&mut self) -> Result<(), Error> {
        let lock = MaintenanceLock::new(&self.config.lock_directory());
        match lock.run_exclusive(|| self.cron_sweep())? {
            LockOutcome::Completed(result) => result?,
            LockOutcome::AlreadyRunning => self.out.info(&CommandError::LockBusy.to_string()),
            LockOutcome::PermissionDenied(path) => {
                self.report(CommandError::LockPermissionDenied(path))
            }
        }
        Ok(())
    }

    fn cron_sweep(&mut self) -> Result<(), Error> {
        let options = ResolveOptions {
            skip_inactive: true,
            ..ResolveOptions::default()
        };
        let Some(targets) = self.targets(&[], options) else {
            return Ok(());
        };

        for (name, resolved) in targets {
            let mut target = match self.admit(name, resolved, ErrorPolicy::BLOCKING) {
                Admission::Proceed(target) => target,
                Admission::Skip => continue,
                Admission::Abort => return Ok(()),
            };

            let report = target.server.cron()?;
            if report.archived > 0 {
                self.out.info(&format!(
                    "{}: {} WAL file(s) archived",
                    target.name(),
                    report.archived
                ));
            }
            debug!("maintenance done for {}", target.name());
        }
        Ok(())
    }

    pub fn backup(&mut self, names: &[String], args: &BackupArgs) -> Result<(), Error> {
        let options = ResolveOptions {
            skip_inactive: true,
            skip_disabled: true,
            ..ResolveOptions::default()
        };
        let Some(targets) = self.targets(names, options) else {
            return Ok(());
        };

        for (name, resolved) in targets {
            let mut target = match self.admit(name, resolved, ErrorPolicy::BLOCKING) {
                Admission::Proceed(target) => target,
                Admission::Skip => continue,
                Admission::Abort => return Ok(()),
            };

            let options = args.options_for(&target.config);
            self.out
                .info(&format!("Starting backup for server {}", target.name()));
            let record = target.server.backup(&options)?;
            match record.status {
                BackupStatus::Done => {
                    info!("backup {} of {} completed", record.backup_id, target.name());
                    self.out
                        .info(&format!("Backup completed: {}", record.backup_id));
                }
                status => self.out.error(&format!(
                    "Backup {} for server '{}' ended with status {}: {}",
                    record.backup_id,
                    target.name(),
                    status,
                    record.error.as_deref().unwrap_or("unknown error")
                )),
            }
        }
        Ok(())
    }

    pub fn list_backup(&mut self, names: &[String], minimal: bool) -> Result<(), Error> {
        let Some(targets) = self.targets(names, ResolveOptions::default()) else {
            return Ok(());
        };

        for (name, resolved) in targets {
            let target = match self.admit(name, resolved, ErrorPolicy::WARN) {
                Admission::Proceed(target) => target,
                Admission::Skip => continue,
                Admission::Abort => return Ok(()),
            };

            for backup in target.server.list_backups()?.iter().rev() {
                if minimal {
                    self.out.result(&backup.backup_id);
                } else {
                    self.out.result(&format!(
                        "{} {} - {} - {}",
                        target.name(),
                        backup.backup_id,
                        backup.begin_time.format(TIME_FORMAT),
                        backup.status
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn status(&mut self, names: &[String]) -> Result<(), Error> {
        let Some(targets) = self.targets(names, ResolveOptions::default()) else {
            return Ok(());
        };

        for (name, resolved) in targets {
            let target = match self.admit(name, resolved, ErrorPolicy::WARN) {
                Admission::Proceed(target) => target,
                Admission::Skip => continue,
                Admission::Abort => return Ok(()),
            };
            let properties = target.server.status()?;
            self.properties(target.name(), properties);
        }
        Ok(())
    }

    pub fn rebuild_xlogdb(&mut self, names: &[String]) -> Result<(), Error> {
        let Some(targets) = self.targets(names, ResolveOptions::default()) else {
            return Ok(());
        };

        for (name, resolved) in targets {
            let mut target = match self.admit(name, resolved, ErrorPolicy::BLOCKING) {
                Admission::Proceed(target) => target,
                Admission::Skip => continue,
                Admission::Abort => return Ok(()),
            };

            self.out
                .info(&format!("Rebuilding xlogdb for server {}", target.name()));
            let count = target.server.rebuild_wal_catalog()?;
            self.out.info(&format!(
                "Done rebuilding xlogdb for server {} (WAL files: {count})",
                target.name()
            ));
        }
        Ok(())
    }

    /// Validates every argument, cheapest first, and only then hands the
    /// request to the server.
    pub fn recover(&mut self, args: &RecoverArgs) -> Result<(), Error> {
        if let Err(e) = check_destination(&args.destination) {
            self.report(e);
            return Ok(());
        }

        let recovery_target = match RecoveryTarget::parse(
            args.target_tli,
            args.target_time.as_deref(),
            args.target_xid.as_deref(),
            args.target_name.as_deref(),
            args.exclusive,
        ) {
            Ok(recovery_target) => recovery_target,
            Err(e) => {
                self.report(e);
                return Ok(());
            }
        };

        let rules = match parse_rules(&args.tablespaces) {
            Ok(rules) => rules,
            Err(e) => {
                self.report(e);
                return Ok(());
            }
        };

        let Some(mut target) = self.single(&args.server_name, ErrorPolicy::BLOCKING) else {
            return Ok(());
        };

        let backup = match BackupIdentifier::parse(&args.backup_id).resolve(target.server.as_ref())? {
            Some(backup) if backup.status == BackupStatus::Done => backup,
            _ => {
                self.report(CommandError::UnknownBackup {
                    server: args.server_name.clone(),
                    id: args.backup_id.clone(),
                });
                return Ok(());
            }
        };

        if let Err(e) = validate_rules(&rules, &backup.tablespace_names()) {
            self.report(e);
            return Ok(());
        }

        let request = RecoveryRequest {
            destination: args.destination.clone(),
            tablespaces: rules,
            target: recovery_target,
            remote_command: args.remote_ssh_command.clone(),
            retry_times: args
                .retry_times
                .unwrap_or(target.config.basebackup_retry_times),
            retry_sleep: args
                .retry_sleep
                .unwrap_or(target.config.basebackup_retry_sleep),
        };

        self.out.info(&format!(
            "Starting recovery of backup {} for server {} into {}",
            backup.backup_id,
            target.name(),
            request.destination
        ));
        target.server.recover(&backup, &request)?;
        self.out.info("Recovery completed");
        Ok(())
    }

    pub fn show_server(&mut self, names: &[String]) -> Result<(), Error> {
        let Some(targets) = self.targets(names, ResolveOptions::default()) else {
            return Ok(());
        };

        for (name, resolved) in targets {
            let target = match self.admit(name, resolved, ErrorPolicy::WARN_IGNORE_ACTIVE) {
                Admission::Proceed(target) => target,
                Admission::Skip => continue,
                Admission::Abort => return Ok(()),
            };
            let properties = target.server.show()?;
            self.properties(target.name(), properties);
        }
        Ok(())
    }

    pub fn check(&mut self, names: &[String]) -> Result<(), Error> {
        let options = ResolveOptions {
            skip_inactive: true,
            ..ResolveOptions::default()
        };
        let Some(targets) = self.targets(names, options) else {
            return Ok(());
        };

        for (name, resolved) in targets {
            let ResolvedTarget::Known(target) = resolved else {
                self.report(CommandError::UnknownTarget(name));
                continue;
            };

            let label = if target.config.active {
                name
            } else {
                format!("{name} (not active)")
            };
            for result in target.server.check()? {
                self.out.check_result(
                    &label,
                    &result.name,
                    result.ok,
                    result.hint.as_deref().unwrap_or(""),
                );
            }
        }
        Ok(())
    }

    /// Dumps configuration and catalog state as JSON, even when the
    /// configuration has conflicts.
    pub fn diagnose(&mut self) -> Result<(), Error> {
        let options = ResolveOptions {
            on_error_stop: false,
            suppress_errors: true,
            ..ResolveOptions::default()
        };
        let targets = self.targets(&[], options).unwrap_or_default();

        let errors_list = if targets.is_empty() {
            Vec::new()
        } else {
            self.config.global_conflicts()
        };

        let mut servers = Map::new();
        for (name, resolved) in targets {
            if let ResolvedTarget::Known(target) = resolved {
                servers.insert(name, target.server.diagnose()?);
            }
        }

        let report: Value = json!({
            "global": {
                "config": serde_json::to_value(self.config.global())?,
                "errors_list": errors_list,
            },
            "servers": servers,
        });
        self.out.result(&serde_json::to_string_pretty(&report)?);
        Ok(())
    }

    pub fn show_backup(&mut self, server_name: &str, backup_id: &str) -> Result<(), Error> {
        let Some(target) = self.single(server_name, ErrorPolicy::WARN) else {
            return Ok(());
        };
        let Some(backup) = self.backup_of(&target, backup_id)? else {
            return Ok(());
        };

        let optional = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());
        self.out.result(&format!("Backup {}:", backup.backup_id));
        self.out.result(&format!("  Server Name            : {}", backup.server_name));
        self.out.result(&format!("  Status                 : {}", backup.status));
        self.out.result(&format!(
            "  Begin time             : {}",
            backup.begin_time.format(TIME_FORMAT)
        ));
        self.out.result(&format!(
            "  End time               : {}",
            backup
                .end_time
                .map(|t| t.format(TIME_FORMAT).to_string())
                .unwrap_or_else(|| "-".to_string())
        ));
        self.out
            .result(&format!("  Begin WAL              : {}", optional(&backup.begin_wal)));
        self.out
            .result(&format!("  End WAL                : {}", optional(&backup.end_wal)));
        if !backup.tablespaces.is_empty() {
            self.out.result("  Tablespaces:");
            for tablespace in &backup.tablespaces {
                self.out.result(&format!(
                    "    {}: {} (oid: {})",
                    tablespace.name, tablespace.location, tablespace.oid
                ));
            }
        }
        if let Some(error) = &backup.error {
            self.out.result(&format!("  Error                  : {error}"));
        }
        Ok(())
    }

    pub fn list_files(&mut self, args: &ListFilesArgs) -> Result<(), Error> {
        let Some(target) = self.single(&args.server_name, ErrorPolicy::WARN) else {
            return Ok(());
        };
        let Some(backup) = self.backup_of(&target, &args.backup_id)? else {
            return Ok(());
        };

        for file in target.server.list_files(&backup, args.scope)? {
            self.out.result(&file);
        }
        Ok(())
    }

    pub fn delete(&mut self, server_name: &str, backup_id: &str) -> Result<(), Error> {
        let Some(mut target) = self.single(server_name, ErrorPolicy::BLOCKING) else {
            return Ok(());
        };
        let Some(backup) = self.backup_of(&target, backup_id)? else {
            return Ok(());
        };

        self.out.info(&format!(
            "Deleting backup {} for server {}",
            backup.backup_id, server_name
        ));
        target.server.delete_backup(&backup)?;
        self.out.info("Done");
        Ok(())
    }
}
