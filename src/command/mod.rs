pub mod args;
pub mod runner;

pub use args::{BackupArgs, ListFilesArgs, RecoverArgs};
pub use runner::CommandRunner;
