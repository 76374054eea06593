use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone};

use crate::error::CommandError;

const TIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

/// Point in time a recovery stops at.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecoveryTarget {
    pub tli: Option<u32>,
    pub time: Option<DateTime<FixedOffset>>,
    pub xid: Option<u64>,

    /// Restore point created with `pg_create_restore_point()`
    pub name: Option<String>,

    /// Stop just before the target instead of just after
    pub exclusive: bool,
}

impl RecoveryTarget {
    pub fn parse(
        tli: Option<u32>,
        time: Option<&str>,
        xid: Option<&str>,
        name: Option<&str>,
        exclusive: bool,
    ) -> Result<Self, CommandError> {
        let given = [time.is_some(), xid.is_some(), name.is_some()]
            .iter()
            .filter(|given| **given)
            .count();
        if given > 1 {
            return Err(CommandError::InvalidRecoveryTarget(
                "only one of --target-time, --target-xid and --target-name can be used"
                    .to_string(),
            ));
        }
        if exclusive && time.is_none() && xid.is_none() {
            return Err(CommandError::InvalidRecoveryTarget(
                "--exclusive requires --target-time or --target-xid".to_string(),
            ));
        }

        let time = time.map(parse_time).transpose()?;
        let xid = xid
            .map(|value| match value.trim().parse::<u64>() {
                Ok(xid) if xid > 0 => Ok(xid),
                _ => Err(CommandError::InvalidRecoveryTarget(format!(
                    "'{value}' is not a valid transaction ID"
                ))),
            })
            .transpose()?;

        Ok(Self {
            tli,
            time,
            xid,
            name: name.map(String::from),
            exclusive,
        })
    }
}

/// Accepts RFC 3339, or `YYYY-MM-DD HH:MM:SS[.fff]` with an optional
/// offset. Without an offset the local time zone applies.
fn parse_time(value: &str) -> Result<DateTime<FixedOffset>, CommandError> {
    let value = value.trim();
    if let Ok(time) = DateTime::parse_from_rfc3339(value) {
        return Ok(time);
    }
    for format in TIME_FORMATS {
        if let Ok(time) = DateTime::parse_from_str(value, &format!("{format}%#z")) {
            return Ok(time);
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            if let Some(local) = Local.from_local_datetime(&naive).single() {
                return Ok(local.fixed_offset());
            }
        }
    }

    Err(CommandError::InvalidRecoveryTarget(format!(
        "'{value}' is not a valid target time"
    )))
}

/// Remote destinations in rsync syntax (`host:/path`) are a common
/// mistake; remote recovery goes through `--remote-ssh-command`.
pub fn check_destination(destination: &str) -> Result<(), CommandError> {
    if destination.contains(':') {
        return Err(CommandError::RemoteDestination);
    }
    Ok(())
}
