use anyhow::{Context, Error, Result, anyhow};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::manager::ConfigProvider;
use super::model::*;

pub const CONFIG_FILES: [&str; 3] = ["~/.bman.toml", "/etc/bman.toml", "/etc/bman/bman.toml"];

const RESERVED_NAME: &str = "all";

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    global: GlobalSection,

    #[serde(default)]
    servers: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct GlobalSection {
    home: Option<PathBuf>,
    lock_directory: Option<PathBuf>,
    log_file: Option<PathBuf>,
    log_level: Option<String>,
    configuration_files_directory: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct ServerSection {
    description: Option<String>,
    active: Option<bool>,
    backup_directory: Option<PathBuf>,
    basebackups_directory: Option<PathBuf>,
    wals_directory: Option<PathBuf>,
    incoming_wals_directory: Option<PathBuf>,
    backup_command: Option<String>,
    recovery_command: Option<String>,
    ssh_command: Option<String>,
    reuse_backup: Option<String>,
    immediate_checkpoint: Option<bool>,
    basebackup_retry_times: Option<u32>,
    basebackup_retry_sleep: Option<u64>,
}

/// Configuration loaded from TOML files.
#[derive(Debug, Clone)]
pub struct TomlConfig {
    global: GlobalConfig,
    servers: BTreeMap<String, ServerConfig>,
    conflicts: Vec<String>,
}

impl TomlConfig {
    /// Picks the explicit file, or the first existing default location.
    pub fn find_config_file(explicit: Option<&Path>) -> Result<PathBuf, Error> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }

        let home = std::env::var("HOME").unwrap_or_default();
        CONFIG_FILES
            .iter()
            .map(|candidate| PathBuf::from(candidate.replacen('~', &home, 1)))
            .find(|candidate| candidate.exists())
            .ok_or_else(|| {
                anyhow!(
                    "Could not find any configuration file at default locations ({})",
                    CONFIG_FILES.join(", ")
                )
            })
    }

    pub fn load(config_file: &Path) -> Result<Self, Error> {
        let content = fs::read_to_string(config_file).with_context(|| {
            format!("Failed to read configuration file: {}", config_file.display())
        })?;
        let main: ConfigFile = toml::from_str(&content).with_context(|| {
            format!("Failed to parse configuration file: {}", config_file.display())
        })?;

        let global = Self::build_global(config_file, main.global);

        let mut sections = main.servers;
        if let Some(dir) = &global.configuration_files_directory {
            debug!("Loading additional configuration files from {}", dir.display());
            for (name, value) in Self::load_directory(dir)? {
                if sections.contains_key(&name) {
                    warn!("Ignoring duplicate definition of server '{}'", name);
                    continue;
                }
                sections.insert(name, value);
            }
        }

        let servers: BTreeMap<String, ServerConfig> = sections
            .into_iter()
            .map(|(name, value)| {
                let config = Self::build_server(&name, value, &global.home);
                (name, config)
            })
            .collect();
        let conflicts = Self::find_conflicts(&servers);

        Ok(Self {
            global,
            servers,
            conflicts,
        })
    }

    fn build_global(config_file: &Path, section: GlobalSection) -> GlobalConfig {
        let mut global = GlobalConfig::new(config_file);
        if let Some(home) = section.home {
            global.lock_directory = home.clone();
            global.home = home;
        }
        if let Some(lock_directory) = section.lock_directory {
            global.lock_directory = lock_directory;
        }
        if let Some(log_level) = section.log_level {
            global.log_level = log_level;
        }
        global.log_file = section.log_file;
        global.configuration_files_directory = section.configuration_files_directory;
        global
    }

    fn load_directory(dir: &Path) -> Result<Vec<(String, toml::Value)>, Error> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)
            .with_context(|| format!("Failed to read directory: {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        files.sort();

        let mut sections = Vec::new();
        for file in files {
            let content = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read configuration file: {}", file.display()))?;
            let parsed: ConfigFile = toml::from_str(&content)
                .with_context(|| format!("Failed to parse configuration file: {}", file.display()))?;
            sections.extend(parsed.servers);
        }
        Ok(sections)
    }

    fn build_server(name: &str, value: toml::Value, home: &Path) -> ServerConfig {
        let mut config = ServerConfig::new(name, home);

        if name == RESERVED_NAME {
            config.disable(format!(
                "'{RESERVED_NAME}' is a reserved word and cannot be used as server name"
            ));
        }

        let section: ServerSection = match value.try_into() {
            Ok(section) => section,
            Err(e) => {
                config.disable(format!("invalid configuration for server '{name}': {e}"));
                return config;
            }
        };

        if let Some(description) = section.description {
            config.description = description;
        }
        if let Some(active) = section.active {
            config.active = active;
        }
        if let Some(dir) = section.backup_directory {
            config.basebackups_directory = dir.join("base");
            config.wals_directory = dir.join("wals");
            config.incoming_wals_directory = dir.join("incoming");
            config.backup_directory = dir;
        }
        if let Some(dir) = section.basebackups_directory {
            config.basebackups_directory = dir;
        }
        if let Some(dir) = section.wals_directory {
            config.wals_directory = dir;
        }
        if let Some(dir) = section.incoming_wals_directory {
            config.incoming_wals_directory = dir;
        }
        if let Some(value) = section.reuse_backup {
            match value.parse() {
                Ok(reuse) => config.reuse_backup = reuse,
                Err(e) => config.disable(format!("reuse_backup: {e}")),
            }
        }
        if let Some(immediate) = section.immediate_checkpoint {
            config.immediate_checkpoint = immediate;
        }
        if let Some(times) = section.basebackup_retry_times {
            config.basebackup_retry_times = times;
        }
        if let Some(sleep) = section.basebackup_retry_sleep {
            config.basebackup_retry_sleep = sleep;
        }

        match section.backup_command {
            Some(command) if !command.trim().is_empty() => config.backup_command = Some(command),
            _ => config.disable("backup_command: option is required"),
        }
        config.recovery_command = section.recovery_command;
        config.ssh_command = section.ssh_command;

        config
    }

    fn find_conflicts(servers: &BTreeMap<String, ServerConfig>) -> Vec<String> {
        let mut seen: HashMap<PathBuf, (&'static str, &str)> = HashMap::new();
        let mut conflicts = Vec::new();

        for config in servers.values() {
            for (option, path) in config.paths() {
                match seen.get(path) {
                    Some((other_option, other_name)) => conflicts.push(format!(
                        "Conflicting path: {}={} for server '{}': {}={} for server '{}'",
                        option,
                        path.display(),
                        config.name,
                        other_option,
                        path.display(),
                        other_name
                    )),
                    None => {
                        seen.insert(path.to_path_buf(), (option, config.name.as_str()));
                    }
                }
            }
        }

        conflicts
    }
}

impl ConfigProvider for TomlConfig {
    fn global(&self) -> GlobalConfig {
        self.global.clone()
    }

    fn servers(&self) -> Vec<ServerConfig> {
        self.servers.values().cloned().collect()
    }

    fn get_server(&self, name: &str) -> Option<ServerConfig> {
        self.servers.get(name).cloned()
    }

    fn global_conflicts(&self) -> Vec<String> {
        self.conflicts.clone()
    }

    fn lock_directory(&self) -> PathBuf {
        self.global.lock_directory.clone()
    }
}
