use std::path::PathBuf;
use thiserror::Error;

/// Diagnostics reported to the user through the output channel.
///
/// None of these are fatal: the command stops (or skips the target) and the
/// process exits with a non-zero status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Unknown server '{0}'")]
    UnknownTarget(String),

    #[error("Not active server: {0}")]
    TargetInactive(String),

    #[error("Unknown backup '{id}' for server '{server}'")]
    UnknownBackup { server: String, id: String },

    #[error(
        "Invalid tablespace relocation rule '{0}'\n\
         HINT: The valid syntax for a relocation rule is NAME:LOCATION"
    )]
    MalformedRule(String),

    #[error(
        "Invalid tablespace name '{name}'\n\
         HINT: Please use any of the following tablespaces: {}",
        .known.join(", ")
    )]
    UnknownTablespace { name: String, known: Vec<String> },

    #[error(
        "The destination directory parameter cannot contain the ':' character\n\
         HINT: If you want to do a remote recovery you have to use \
         the --remote-ssh-command option"
    )]
    RemoteDestination,

    #[error("Invalid recovery target: {0}")]
    InvalidRecoveryTarget(String),

    #[error("Another cron is running")]
    LockBusy,

    #[error("Permission denied, unable to access '{}'", .0.display())]
    LockPermissionDenied(PathBuf),
}
