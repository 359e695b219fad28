//! Version resolver - maps a target to the concrete versions an operation touches
//!
//! Every function here is pure: it looks at the loaded descriptors and/or a
//! version-log snapshot and decides what should happen, without touching the store.

use crate::migration::record::{instant_to_version, VersionLog, VersionLogEntry};
use crate::migration::{MigrationDescriptor, MigrationError};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// Where a migrate or rollback should end up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// No target given: newest for migrate, single most recent entry for rollback
    Latest,
    /// `0` or `all`: everything
    All,
    /// An explicit version
    Version(i64),
    /// A migration name, looked up before any numeric interpretation
    Name(String),
    /// A calendar instant
    Date(DateTime<Utc>),
    /// A relative number of units
    Steps(usize),
}

impl Target {
    /// Interpret a user-supplied string
    ///
    /// Empty, `last` and `latest` mean [`Target::Latest`]; `0` and `all` mean
    /// [`Target::All`]; digits are a version; anything else is a name.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        match value.to_ascii_lowercase().as_str() {
            "" | "last" | "latest" => return Target::Latest,
            "all" => return Target::All,
            _ => {}
        }
        if value.chars().all(|c| c.is_ascii_digit()) {
            return match value.parse::<i64>() {
                Ok(0) => Target::All,
                Ok(version) => Target::Version(version),
                Err(_) => Target::Name(value.to_string()),
            };
        }
        Target::Name(value.to_string())
    }

    /// Interpret a date or date-time target
    ///
    /// Accepts `YYYYMMDD`, `YYYYMMDDHHMMSS`, `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS`
    /// and RFC 3339.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::InvalidTarget` if no layout matches.
    pub fn parse_date(value: &str) -> Result<Self, MigrationError> {
        parse_instant(value).map(Target::Date)
    }
}

impl FromStr for Target {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Target::parse(s))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Latest => write!(f, "latest"),
            Target::All => write!(f, "0"),
            Target::Version(v) => write!(f, "{v}"),
            Target::Name(n) => write!(f, "{n}"),
            Target::Date(d) => write!(f, "{}", d.format("%Y-%m-%d %H:%M:%S")),
            Target::Steps(n) => write!(f, "{n} step(s)"),
        }
    }
}

/// Parse a calendar instant in any of the accepted layouts
///
/// # Errors
///
/// Returns `MigrationError::InvalidTarget` if no layout matches.
pub fn parse_instant(value: &str) -> Result<DateTime<Utc>, MigrationError> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    for layout in ["%Y%m%d%H%M%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, layout) {
            return Ok(naive.and_utc());
        }
    }
    for layout in ["%Y%m%d", "%Y-%m-%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(value, layout) {
            if let Some(naive) = date.and_hms_opt(0, 0, 0) {
                return Ok(naive.and_utc());
            }
        }
    }
    Err(MigrationError::InvalidTarget(format!(
        "'{value}' is not a date (expected YYYYMMDD, YYYYMMDDHHMMSS or YYYY-MM-DD[ HH:MM:SS])"
    )))
}

/// Outcome of resolving a migrate target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrateResolution {
    /// Nothing is loaded and nothing is logged
    Nothing,
    /// The explicit target is neither `0` nor a loaded version
    InvalidVersion(i64),
    /// No migration name matched
    NameNotFound(String),
    /// Bring the store to exactly this version
    To(i64),
    /// Apply exactly these pending versions, ascending, reverting nothing
    Apply(Vec<i64>),
}

/// Resolve a migrate target
///
/// `descriptors` must be ascending by version.
#[must_use]
pub fn resolve_migrate(
    descriptors: &[MigrationDescriptor],
    log: &VersionLog,
    target: &Target,
) -> MigrateResolution {
    if descriptors.is_empty() && log.is_empty() {
        return MigrateResolution::Nothing;
    }

    match target {
        Target::Latest => {
            let newest_loaded = descriptors.last().map_or(0, |d| d.version);
            MigrateResolution::To(newest_loaded.max(log.current_version()))
        }
        Target::All => MigrateResolution::To(0),
        Target::Version(version) => {
            if descriptors.iter().any(|d| d.version == *version) {
                MigrateResolution::To(*version)
            } else {
                MigrateResolution::InvalidVersion(*version)
            }
        }
        Target::Name(name) => descriptors
            .iter()
            .find(|d| d.name == *name)
            .map_or_else(|| MigrateResolution::NameNotFound(name.clone()), |d| MigrateResolution::To(d.version)),
        Target::Date(instant) => match resolve_migrate_date(descriptors, instant) {
            Some(version) => MigrateResolution::To(version),
            None => MigrateResolution::Nothing,
        },
        Target::Steps(steps) => {
            // Skipped units ride along (so they report as skipped) but do not count as a step
            let mut remaining = *steps;
            let mut versions = Vec::new();
            for descriptor in descriptors.iter().filter(|d| !log.contains(d.version)) {
                if remaining == 0 {
                    break;
                }
                if descriptor.should_execute() {
                    remaining -= 1;
                }
                versions.push(descriptor.version);
            }
            if versions.is_empty() {
                MigrateResolution::Nothing
            } else {
                MigrateResolution::Apply(versions)
            }
        }
    }
}

/// Greatest loaded version at or before `instant`
#[must_use]
pub fn resolve_migrate_date(
    descriptors: &[MigrationDescriptor],
    instant: &DateTime<Utc>,
) -> Option<i64> {
    let cutoff = instant_to_version(instant);
    descriptors
        .iter()
        .map(|d| d.version)
        .filter(|v| *v <= cutoff)
        .max()
}

/// Outcome of resolving a rollback target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackResolution {
    /// Entries to revert, most recent first, before breakpoints are considered
    Revert(Vec<VersionLogEntry>),
    /// Nothing qualifies (empty log, target already most recent, no entry after a date)
    NothingToRollback,
    /// A name target matched no log entry
    NameNotFound(String),
    /// A version target is not in the log
    TargetNotFound(i64),
}

/// Resolve a rollback target against a version-log snapshot
///
/// "Most recent" follows the snapshot's ordering mode, so under execution-time
/// ordering a migration created earlier but run later is reverted first.
#[must_use]
pub fn resolve_rollback(log: &VersionLog, target: &Target) -> RollbackResolution {
    let target = match target {
        Target::Name(name) => match log.find_by_name(name) {
            Some(entry) => Target::Version(entry.version),
            None => return RollbackResolution::NameNotFound(name.clone()),
        },
        other => other.clone(),
    };

    let entries = log.most_recent_first();
    let Some(most_recent) = entries.first() else {
        return RollbackResolution::NothingToRollback;
    };

    let selected: Vec<VersionLogEntry> = match target {
        Target::All => entries.iter().map(|e| (*e).clone()).collect(),
        Target::Latest => vec![(*most_recent).clone()],
        Target::Steps(steps) => entries.iter().take(steps).map(|e| (*e).clone()).collect(),
        Target::Version(version) => {
            if version == most_recent.version {
                return RollbackResolution::NothingToRollback;
            }
            if !log.contains(version) {
                return RollbackResolution::TargetNotFound(version);
            }
            entries
                .iter()
                .take_while(|e| e.version != version)
                .map(|e| (*e).clone())
                .collect()
        }
        Target::Date(instant) => entries
            .iter()
            .take_while(|e| log.is_at_or_after(e, &instant))
            .map(|e| (*e).clone())
            .collect(),
        Target::Name(_) => Vec::new(),
    };

    if selected.is_empty() {
        RollbackResolution::NothingToRollback
    } else {
        RollbackResolution::Revert(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::record::VersionOrder;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, 0, 0, 0).unwrap()
    }

    fn log(order: VersionOrder) -> VersionLog {
        VersionLog::new(
            vec![
                VersionLogEntry::new(20120111235330, "TestMigration", at(2012, 1, 20), at(2012, 1, 20)),
                VersionLogEntry::new(20120116183504, "TestMigration2", at(2012, 1, 18), at(2012, 1, 18)),
            ],
            order,
        )
    }

    fn versions(resolution: RollbackResolution) -> Vec<i64> {
        match resolution {
            RollbackResolution::Revert(entries) => entries.iter().map(|e| e.version).collect(),
            other => panic!("expected entries to revert, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_target() {
        assert_eq!(Target::parse(""), Target::Latest);
        assert_eq!(Target::parse("0"), Target::All);
        assert_eq!(Target::parse("all"), Target::All);
        assert_eq!(Target::parse("20120111235330"), Target::Version(20120111235330));
        assert_eq!(Target::parse("TestMigration"), Target::Name("TestMigration".to_string()));
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(Target::parse_date("20120117").unwrap(), Target::Date(at(2012, 1, 17)));
        assert_eq!(Target::parse_date("2012-01-17").unwrap(), Target::Date(at(2012, 1, 17)));
        assert_eq!(
            parse_instant("20120117183504").unwrap(),
            Utc.with_ymd_and_hms(2012, 1, 17, 18, 35, 4).unwrap()
        );
        assert!(matches!(
            Target::parse_date("yesterday"),
            Err(MigrationError::InvalidTarget(_))
        ));
    }

    #[test]
    fn test_rollback_latest_creation_order() {
        let resolution = resolve_rollback(&log(VersionOrder::Creation), &Target::Latest);
        assert_eq!(versions(resolution), vec![20120116183504]);
    }

    #[test]
    fn test_rollback_latest_execution_order() {
        let resolution = resolve_rollback(&log(VersionOrder::Execution), &Target::Latest);
        assert_eq!(versions(resolution), vec![20120111235330]);
    }

    #[test]
    fn test_rollback_to_version() {
        let resolution = resolve_rollback(&log(VersionOrder::Creation), &Target::Version(20120111235330));
        assert_eq!(versions(resolution), vec![20120116183504]);

        assert_eq!(
            resolve_rollback(&log(VersionOrder::Creation), &Target::Version(20120116183504)),
            RollbackResolution::NothingToRollback
        );
        assert_eq!(
            resolve_rollback(&log(VersionOrder::Creation), &Target::Version(20121225000000)),
            RollbackResolution::TargetNotFound(20121225000000)
        );
    }

    #[test]
    fn test_rollback_all_and_steps() {
        let resolution = resolve_rollback(&log(VersionOrder::Creation), &Target::All);
        assert_eq!(versions(resolution), vec![20120116183504, 20120111235330]);

        let resolution = resolve_rollback(&log(VersionOrder::Execution), &Target::Steps(1));
        assert_eq!(versions(resolution), vec![20120111235330]);

        assert_eq!(
            resolve_rollback(&log(VersionOrder::Creation), &Target::Steps(0)),
            RollbackResolution::NothingToRollback
        );
    }

    #[test]
    fn test_rollback_by_name() {
        let resolution = resolve_rollback(
            &log(VersionOrder::Creation),
            &Target::Name("TestMigration".to_string()),
        );
        assert_eq!(versions(resolution), vec![20120116183504]);

        assert_eq!(
            resolve_rollback(&log(VersionOrder::Creation), &Target::Name("Ghost".to_string())),
            RollbackResolution::NameNotFound("Ghost".to_string())
        );
    }

    #[test]
    fn test_rollback_to_date_by_mode() {
        let cutoff = Target::Date(at(2012, 1, 16));

        // Creation order compares versions: only 20120116183504 is on/after the 16th.
        let resolution = resolve_rollback(&log(VersionOrder::Creation), &cutoff);
        assert_eq!(versions(resolution), vec![20120116183504]);

        // Execution order compares start times: both ran on/after the 16th.
        let resolution = resolve_rollback(&log(VersionOrder::Execution), &cutoff);
        assert_eq!(versions(resolution), vec![20120111235330, 20120116183504]);

        assert_eq!(
            resolve_rollback(&log(VersionOrder::Creation), &Target::Date(at(2013, 1, 1))),
            RollbackResolution::NothingToRollback
        );
    }

    #[test]
    fn test_rollback_empty_log() {
        let empty = VersionLog::new(Vec::new(), VersionOrder::Creation);
        assert_eq!(
            resolve_rollback(&empty, &Target::All),
            RollbackResolution::NothingToRollback
        );
    }
}
