use anyhow::{Error, anyhow};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_HOME: &str = "/var/lib/bman";
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReuseBackup {
    /// Always copy every file
    #[default]
    Off,

    /// Copy unchanged files from the previous backup
    Copy,

    /// Hard-link unchanged files from the previous backup
    Link,
}

impl ReuseBackup {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReuseBackup::Off => "off",
            ReuseBackup::Copy => "copy",
            ReuseBackup::Link => "link",
        }
    }
}

impl fmt::Display for ReuseBackup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReuseBackup {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(ReuseBackup::Off),
            "copy" => Ok(ReuseBackup::Copy),
            "link" => Ok(ReuseBackup::Link),
            other => Err(anyhow!(
                "invalid reuse_backup value '{other}' (expected off, copy or link)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalConfig {
    /// Main configuration file
    pub config_file: PathBuf,

    /// Root of the per-server backup directories
    pub home: PathBuf,

    /// Where the maintenance lock file lives
    pub lock_directory: PathBuf,

    pub log_file: Option<PathBuf>,
    pub log_level: String,

    /// Directory scanned for additional `*.toml` server definitions
    pub configuration_files_directory: Option<PathBuf>,
}

impl GlobalConfig {
    pub fn new(config_file: &Path) -> Self {
        Self {
            config_file: config_file.to_path_buf(),
            home: PathBuf::from(DEFAULT_HOME),
            lock_directory: PathBuf::from(DEFAULT_HOME),
            log_file: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            configuration_files_directory: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerConfig {
    pub name: String,
    pub description: String,

    /// Administrative on/off switch
    pub active: bool,

    pub backup_directory: PathBuf,
    pub basebackups_directory: PathBuf,
    pub wals_directory: PathBuf,
    pub incoming_wals_directory: PathBuf,

    pub backup_command: Option<String>,
    pub recovery_command: Option<String>,
    pub ssh_command: Option<String>,

    pub reuse_backup: ReuseBackup,
    pub immediate_checkpoint: bool,
    pub basebackup_retry_times: u32,

    /// Seconds between two copy attempts
    pub basebackup_retry_sleep: u64,

    /// Configuration errors, in discovery order. Non-empty means disabled.
    pub msg_list: Vec<String>,
}

impl ServerConfig {
    pub fn new(name: &str, home: &Path) -> Self {
        let backup_directory = home.join(name);
        Self {
            name: name.to_string(),
            description: String::new(),
            active: true,
            basebackups_directory: backup_directory.join("base"),
            wals_directory: backup_directory.join("wals"),
            incoming_wals_directory: backup_directory.join("incoming"),
            backup_directory,
            backup_command: None,
            recovery_command: None,
            ssh_command: None,
            reuse_backup: ReuseBackup::Off,
            immediate_checkpoint: false,
            basebackup_retry_times: 0,
            basebackup_retry_sleep: 30,
            msg_list: Vec::new(),
        }
    }

    /// A disabled server failed configuration validation.
    pub fn disabled(&self) -> bool {
        !self.msg_list.is_empty()
    }

    pub fn disable(&mut self, message: impl Into<String>) {
        self.msg_list.push(message.into());
    }

    /// The four storage paths, labelled with their option names.
    pub fn paths(&self) -> [(&'static str, &Path); 4] {
        [
            ("backup_directory", self.backup_directory.as_path()),
            ("basebackups_directory", self.basebackups_directory.as_path()),
            ("wals_directory", self.wals_directory.as_path()),
            ("incoming_wals_directory", self.incoming_wals_directory.as_path()),
        ]
    }
}
