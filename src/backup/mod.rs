pub mod identifier;

pub use identifier::BackupIdentifier;
