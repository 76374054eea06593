use anyhow::Error;
use std::fmt;

use crate::server::{BackupRecord, Server};

/// A backup id as typed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupIdentifier {
    /// `latest` or `last`
    Latest,

    /// `oldest` or `first`
    Oldest,

    Literal(String),
}

impl BackupIdentifier {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "latest" | "last" => BackupIdentifier::Latest,
            "oldest" | "first" => BackupIdentifier::Oldest,
            other => BackupIdentifier::Literal(other.to_string()),
        }
    }

    /// Looks the identifier up in the server's current catalog.
    ///
    /// Never cached: the catalog may change between two calls. `Ok(None)`
    /// means no such backup.
    pub fn resolve(&self, server: &dyn Server) -> Result<Option<BackupRecord>, Error> {
        let backup_id = match self {
            BackupIdentifier::Latest => server.last_backup_id()?,
            BackupIdentifier::Oldest => server.first_backup_id()?,
            BackupIdentifier::Literal(id) => Some(id.clone()),
        };

        match backup_id {
            Some(id) => server.get_backup(&id),
            None => Ok(None),
        }
    }
}

impl fmt::Display for BackupIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupIdentifier::Latest => f.write_str("latest"),
            BackupIdentifier::Oldest => f.write_str("oldest"),
            BackupIdentifier::Literal(id) => f.write_str(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::BackupStatus;
    use crate::server::manager::MockServer;
    use chrono::{TimeZone, Utc};
    use rstest::rstest;

    fn record(id: &str) -> BackupRecord {
        let mut record = BackupRecord::new("main", id, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        record.status = BackupStatus::Done;
        record
    }

    fn catalog_mock(first: &'static str, last: &'static str) -> MockServer {
        let mut server = MockServer::new();
        server
            .expect_first_backup_id()
            .returning(move || Ok(Some(first.to_string())));
        server
            .expect_last_backup_id()
            .returning(move || Ok(Some(last.to_string())));
        server
            .expect_get_backup()
            .returning(|id| Ok(Some(record(id))));
        server
    }

    #[rstest]
    #[case("latest", BackupIdentifier::Latest)]
    #[case("last", BackupIdentifier::Latest)]
    #[case("oldest", BackupIdentifier::Oldest)]
    #[case("first", BackupIdentifier::Oldest)]
    #[case("20240101T000000", BackupIdentifier::Literal("20240101T000000".to_string()))]
    #[case("Latest", BackupIdentifier::Literal("Latest".to_string()))]
    fn test_parse(#[case] raw: &str, #[case] expected: BackupIdentifier) {
        assert_eq!(BackupIdentifier::parse(raw), expected);
    }

    #[test]
    fn test_aliases_are_equivalent() {
        let server = catalog_mock("20240101T000000", "20240103T000000");

        let latest = BackupIdentifier::parse("latest").resolve(&server).unwrap();
        let last = BackupIdentifier::parse("last").resolve(&server).unwrap();
        assert_eq!(latest, last);
        assert_eq!(latest.unwrap().backup_id, "20240103T000000");

        let oldest = BackupIdentifier::parse("oldest").resolve(&server).unwrap();
        let first = BackupIdentifier::parse("first").resolve(&server).unwrap();
        assert_eq!(oldest, first);
        assert_eq!(oldest.unwrap().backup_id, "20240101T000000");
    }

    #[test]
    fn test_literal_lookup_is_repeated() {
        let mut server = MockServer::new();
        server
            .expect_get_backup()
            .withf(|id| id == "20240102T000000")
            .times(2)
            .returning(|id| Ok(Some(record(id))));

        let id = BackupIdentifier::parse("20240102T000000");
        let first = id.resolve(&server).unwrap();
        let second = id.resolve(&server).unwrap();

        assert_eq!(first.map(|b| b.backup_id), second.map(|b| b.backup_id));
    }

    #[test]
    fn test_latest_on_empty_catalog() {
        let mut server = MockServer::new();
        server.expect_last_backup_id().returning(|| Ok(None));
        server.expect_get_backup().never();

        assert_eq!(BackupIdentifier::Latest.resolve(&server).unwrap(), None);
    }

    #[test]
    fn test_unknown_literal() {
        let mut server = MockServer::new();
        server.expect_get_backup().returning(|_| Ok(None));

        let id = BackupIdentifier::parse("nope");
        assert_eq!(id.resolve(&server).unwrap(), None);
    }

    #[test]
    fn test_resolution_follows_catalog_changes() {
        let mut server = MockServer::new();
        let mut seq = mockall::Sequence::new();
        server
            .expect_last_backup_id()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(Some("20240101T000000".to_string())));
        server
            .expect_last_backup_id()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(Some("20240102T000000".to_string())));
        server
            .expect_get_backup()
            .returning(|id| Ok(Some(record(id))));

        let before = BackupIdentifier::Latest.resolve(&server).unwrap().unwrap();
        let after = BackupIdentifier::Latest.resolve(&server).unwrap().unwrap();

        assert_eq!(before.backup_id, "20240101T000000");
        assert_eq!(after.backup_id, "20240102T000000");
    }
}
