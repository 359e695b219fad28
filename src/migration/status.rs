//! Migration status reporting
//!
//! A status is computed fresh from the loaded descriptors and a version-log
//! snapshot every time it is requested. Logged entries come first in the active
//! ordering mode (including entries whose file is missing), then pending
//! descriptors ascending by version.

use crate::migration::record::VersionLog;
use crate::migration::MigrationDescriptor;
use serde::Serialize;
use std::collections::HashMap;

/// Whether a version is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationState {
    Up,
    Down,
}

impl MigrationState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MigrationState::Up => "up",
            MigrationState::Down => "down",
        }
    }
}

/// One record of the status report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusLine {
    pub status: MigrationState,
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub missing: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub breakpoint: bool,
}

/// Migration status information
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    /// Number of loaded migrations not yet applied
    pub pending_count: usize,

    /// Number of applied versions with no loaded migration
    pub missing_count: usize,

    /// Number of records
    pub total_count: usize,

    #[serde(rename = "migrations")]
    pub lines: Vec<StatusLine>,
}

impl MigrationStatus {
    /// Merge descriptors and the version log by version
    #[must_use]
    pub fn build(descriptors: &[MigrationDescriptor], log: &VersionLog) -> Self {
        let loaded: HashMap<i64, &MigrationDescriptor> =
            descriptors.iter().map(|d| (d.version, d)).collect();

        let mut lines = Vec::with_capacity(descriptors.len() + log.len());
        for entry in log.ordered() {
            let descriptor = loaded.get(&entry.version);
            lines.push(StatusLine {
                status: MigrationState::Up,
                id: entry.version.to_string(),
                name: descriptor.map_or_else(|| entry.migration_name.clone(), |d| d.name.clone()),
                missing: descriptor.is_none(),
                breakpoint: entry.breakpoint,
            });
        }

        for descriptor in descriptors.iter().filter(|d| !log.contains(d.version)) {
            lines.push(StatusLine {
                status: MigrationState::Down,
                id: descriptor.version.to_string(),
                name: descriptor.name.clone(),
                missing: false,
                breakpoint: false,
            });
        }

        let pending_count = lines.iter().filter(|l| l.status == MigrationState::Down).count();
        let missing_count = lines.iter().filter(|l| l.missing).count();
        Self {
            pending_count,
            missing_count,
            total_count: lines.len(),
            lines,
        }
    }

    /// Check if all migrations are applied
    #[must_use]
    pub fn is_up_to_date(&self) -> bool {
        self.pending_count == 0
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending_count > 0
    }

    #[must_use]
    pub fn has_missing(&self) -> bool {
        self.missing_count > 0
    }

    /// Get the line for a version
    #[must_use]
    pub fn line(&self, version: i64) -> Option<&StatusLine> {
        let id = version.to_string();
        self.lines.iter().find(|l| l.id == id)
    }

    /// Plain-text table
    #[must_use]
    pub fn render_plain(&self) -> String {
        let mut out = String::new();
        out.push_str(" Status  Migration ID    Migration Name \n");
        out.push_str("-----------------------------------------\n");
        for line in &self.lines {
            out.push_str(&format!("{:>7}  {:<14}  {}", line.status.as_str(), line.id, line.name));
            if line.missing {
                out.push_str("  ** MISSING MIGRATION FILE **");
            }
            if line.breakpoint {
                out.push_str("  BREAKPOINT SET");
            }
            out.push('\n');
        }
        out
    }

    /// Machine-readable rendering
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if serialisation fails.
    pub fn render_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::AdapterError;
    use crate::migration::record::{VersionLogEntry, VersionOrder};
    use crate::migration::{Migration, SchemaManager};
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    struct Unit;

    impl Migration for Unit {
        fn version(&self) -> i64 {
            20120116183504
        }
        fn name(&self) -> &str {
            "TestMigration2"
        }
        fn up(&self, _manager: &SchemaManager<'_>) -> Result<(), AdapterError> {
            Ok(())
        }
        fn down(&self, _manager: &SchemaManager<'_>) -> Result<(), AdapterError> {
            Ok(())
        }
    }

    fn sample() -> MigrationStatus {
        let descriptors = vec![MigrationDescriptor::new(
            20120116183504,
            "TestMigration2",
            "m20120116183504_test_migration2.rs",
            Arc::new(Unit),
        )];
        let when = Utc.with_ymd_and_hms(2012, 1, 20, 0, 0, 0).unwrap();
        let mut missing = VersionLogEntry::new(20120111235330, "TestMigration", when, when);
        missing.breakpoint = true;
        let log = VersionLog::new(vec![missing], VersionOrder::Creation);
        MigrationStatus::build(&descriptors, &log)
    }

    #[test]
    fn test_missing_and_pending() {
        let status = sample();
        let missing = status.line(20120111235330).unwrap();
        assert_eq!(missing.status, MigrationState::Up);
        assert!(missing.missing);
        assert!(missing.breakpoint);

        let pending = status.line(20120116183504).unwrap();
        assert_eq!(pending.status, MigrationState::Down);
        assert!(!pending.missing);

        assert!(status.has_pending());
        assert!(status.has_missing());
        assert_eq!(status.total_count, 2);
    }

    #[test]
    fn test_json_rendering() {
        let json = sample().render_json().unwrap();
        assert_eq!(
            json,
            r#"{"pending_count":1,"missing_count":1,"total_count":2,"migrations":[{"status":"up","id":"20120111235330","name":"TestMigration","missing":true,"breakpoint":true},{"status":"down","id":"20120116183504","name":"TestMigration2"}]}"#
        );
    }

    #[test]
    fn test_plain_rendering() {
        let text = sample().render_plain();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(" Status  Migration ID    Migration Name "));
        assert_eq!(lines.next(), Some("-----------------------------------------"));
        assert_eq!(text.lines().count(), 4);
        assert!(text.contains("     up  20120111235330  TestMigration  ** MISSING MIGRATION FILE **  BREAKPOINT SET"));
        assert!(text.contains("   down  20120116183504  TestMigration2"));
    }
}
