use anyhow::Error;
use clap::{Args, Parser, Subcommand};
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::path::PathBuf;
use std::process::exit;
use std::str::FromStr;
use std::thread;
use tracing::{debug, error, warn};

use bman::command::{BackupArgs, CommandRunner, ListFilesArgs, RecoverArgs};
use bman::config::{ConfigProvider, ReuseBackup, TomlConfig};
use bman::logging;
use bman::output::{Output, OutputFormat, report_interrupt};
use bman::server::{FileScope, FsServerFactory};

/// Backup orchestration for a fleet of database servers
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Use a specific configuration file
    #[arg(short, long, global = true, env = "BMAN_CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Be quiet
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Debug output
    #[arg(short, long, global = true)]
    debug: bool,

    /// Output format: console or nagios
    #[arg(short, long, global = true, default_value = "console")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List available servers
    ListServer {
        /// Machine readable output
        #[arg(long)]
        minimal: bool,
    },

    /// Run maintenance tasks
    Cron,

    /// Take a base backup of the given servers ('all' for every server)
    Backup(BackupCli),

    /// List available backups of the given servers
    ListBackup {
        #[arg(required = true)]
        server_name: Vec<String>,

        /// Machine readable output
        #[arg(long)]
        minimal: bool,
    },

    /// Show status information of the given servers
    Status {
        #[arg(required = true)]
        server_name: Vec<String>,
    },

    /// Rebuild the WAL catalog from the files on disk
    RebuildXlogdb {
        #[arg(required = true)]
        server_name: Vec<String>,
    },

    /// Recover a server at a given time, transaction or restore point
    Recover(RecoverCli),

    /// Show the configuration of the given servers
    ShowServer {
        #[arg(required = true)]
        server_name: Vec<String>,
    },

    /// Check that the given servers are correctly configured
    Check {
        #[arg(required = true)]
        server_name: Vec<String>,

        /// Nagios plugin compatible output
        #[arg(long)]
        nagios: bool,
    },

    /// Dump configuration and catalog state as JSON
    Diagnose,

    /// Show a single backup
    ShowBackup { server_name: String, backup_id: String },

    /// List the files of a single backup
    ListFiles {
        server_name: String,
        backup_id: String,

        /// standalone, data, wal or full
        #[arg(long, default_value = "standalone")]
        target: FileScope,
    },

    /// Delete a backup
    Delete { server_name: String, backup_id: String },
}

#[derive(Args, Debug)]
struct RetryCli {
    /// Retries after a failed base backup copy
    #[arg(long, allow_negative_numbers = true, value_parser = parse_positive::<u32>)]
    retry_times: Option<u32>,

    /// Seconds to wait between two copy attempts
    #[arg(long, allow_negative_numbers = true, value_parser = parse_positive::<u64>)]
    retry_sleep: Option<u64>,

    /// Disable the copy retry logic
    #[arg(long, conflicts_with = "retry_times")]
    no_retry: bool,
}

impl RetryCli {
    fn retry_times(&self) -> Option<u32> {
        if self.no_retry { Some(0) } else { self.retry_times }
    }
}

#[derive(Args, Debug)]
struct BackupCli {
    #[arg(required = true)]
    server_name: Vec<String>,

    /// Force the initial checkpoint to be done as quickly as possible
    #[arg(long, conflicts_with = "no_immediate_checkpoint")]
    immediate_checkpoint: bool,

    /// Force the initial checkpoint to be spread
    #[arg(long)]
    no_immediate_checkpoint: bool,

    /// Reuse the previous backup; "link" when given without a value
    #[arg(long, num_args = 0..=1, default_missing_value = "link")]
    reuse_backup: Option<ReuseBackup>,

    #[command(flatten)]
    retry: RetryCli,
}

impl BackupCli {
    fn args(&self) -> BackupArgs {
        let immediate_checkpoint = match (self.immediate_checkpoint, self.no_immediate_checkpoint) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        BackupArgs {
            immediate_checkpoint,
            reuse_backup: self.reuse_backup,
            retry_times: self.retry.retry_times(),
            retry_sleep: self.retry.retry_sleep,
        }
    }
}

#[derive(Args, Debug)]
struct RecoverCli {
    server_name: String,
    backup_id: String,

    /// Directory where the recovered server is created
    destination_directory: String,

    #[arg(long)]
    target_tli: Option<u32>,

    /// e.g. "YYYY-MM-DD HH:MM:SS.mmm"
    #[arg(long)]
    target_time: Option<String>,

    #[arg(long)]
    target_xid: Option<String>,

    /// Restore point created with pg_create_restore_point()
    #[arg(long)]
    target_name: Option<String>,

    /// Stop just before the target
    #[arg(long)]
    exclusive: bool,

    /// Tablespace relocation rule
    #[arg(long = "tablespace", value_name = "NAME:LOCATION")]
    tablespaces: Vec<String>,

    /// Recover on a remote host through this command, e.g. "ssh postgres@db2"
    #[arg(long, value_name = "SSH_COMMAND")]
    remote_ssh_command: Option<String>,

    #[command(flatten)]
    retry: RetryCli,
}

impl RecoverCli {
    fn args(self) -> RecoverArgs {
        let retry_times = self.retry.retry_times();
        RecoverArgs {
            server_name: self.server_name,
            backup_id: self.backup_id,
            destination: self.destination_directory,
            target_tli: self.target_tli,
            target_time: self.target_time,
            target_xid: self.target_xid,
            target_name: self.target_name,
            exclusive: self.exclusive,
            tablespaces: self.tablespaces,
            remote_ssh_command: self.remote_ssh_command,
            retry_times,
            retry_sleep: self.retry.retry_sleep,
        }
    }
}

fn parse_positive<T: FromStr>(value: &str) -> Result<T, String> {
    value
        .parse::<T>()
        .map_err(|_| format!("'{value}' is not a valid positive integer"))
}

impl Cli {
    fn output_format(&self) -> OutputFormat {
        match self.command {
            Command::Check { nagios: true, .. } => OutputFormat::Nagios,
            _ => self.format,
        }
    }
}

/// Exits on SIGINT/SIGTERM after reporting through a fresh writer of the
/// selected format. A held cron lock goes away with the process.
fn watch_interrupts(format: OutputFormat, quiet: bool) {
    thread::spawn(move || {
        let mut signals = match Signals::new([SIGINT, SIGTERM]) {
            Ok(signals) => signals,
            Err(err) => {
                warn!("signal handler setup failed: {err}");
                return;
            }
        };
        if signals.forever().next().is_some() {
            let mut out = format.open(quiet);
            exit(report_interrupt(out.as_mut()));
        }
    });
}

fn dispatch(command: Command, mut runner: CommandRunner<'_>) -> Result<(), Error> {
    match command {
        Command::ListServer { minimal } => runner.list_server(minimal),
        Command::Cron => runner.cron(),
        Command::Backup(cli) => runner.backup(&cli.server_name, &cli.args()),
        Command::ListBackup {
            server_name,
            minimal,
        } => runner.list_backup(&server_name, minimal),
        Command::Status { server_name } => runner.status(&server_name),
        Command::RebuildXlogdb { server_name } => runner.rebuild_xlogdb(&server_name),
        Command::Recover(cli) => runner.recover(&cli.args()),
        Command::ShowServer { server_name } => runner.show_server(&server_name),
        Command::Check { server_name, .. } => runner.check(&server_name),
        Command::Diagnose => runner.diagnose(),
        Command::ShowBackup {
            server_name,
            backup_id,
        } => runner.show_backup(&server_name, &backup_id),
        Command::ListFiles {
            server_name,
            backup_id,
            target,
        } => runner.list_files(&ListFilesArgs {
            server_name,
            backup_id,
            scope: target,
        }),
        Command::Delete {
            server_name,
            backup_id,
        } => runner.delete(&server_name, &backup_id),
    }
}

fn run(cli: Cli) -> Result<i32, Error> {
    let config_file = TomlConfig::find_config_file(cli.config.as_deref())?;
    let config = TomlConfig::load(&config_file)?;

    let global = config.global();
    logging::init(&global.log_level, global.log_file.as_deref(), cli.debug);
    debug!("initialised bman {} (config: {})", env!("CARGO_PKG_VERSION"), config_file.display());

    let mut out: Box<dyn Output> = cli.output_format().open(cli.quiet);

    let factory = FsServerFactory;
    let result = dispatch(cli.command, CommandRunner::new(&config, &factory, out.as_mut()));
    if let Err(e) = result {
        error!("{e:#}");
        out.error(&format!("{e:#}\nSee log file for more details."));
    }
    Ok(out.close())
}

fn main() {
    let cli = Cli::parse();
    let (output_format, quiet) = (cli.output_format(), cli.quiet);
    watch_interrupts(output_format, quiet);

    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            let mut out = output_format.open(quiet);
            out.error(&format!("{e:#}\nSee log file for more details."));
            out.close()
        }
    };
    exit(code);
}
