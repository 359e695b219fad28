//! `VersionLogEntry` / `VersionLog` - the persisted migration history

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Timestamp layout used for migration versions (`YYYYMMDDHHMMSS`)
pub const VERSION_FORMAT: &str = "%Y%m%d%H%M%S";

/// How "most recent" is decided for an environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionOrder {
    /// Sort by the declared version (creation time of the migration)
    #[default]
    #[serde(alias = "creation_time")]
    Creation,
    /// Sort by recorded `start_time`, falling back to version
    #[serde(alias = "execution_time")]
    Execution,
}

/// One row of the version-log table
///
/// Created when a migration's `up` completes, removed when its `down` completes.
/// `breakpoint` is mutated independently and never touches the timing fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionLogEntry {
    /// Migration version (timestamp: YYYYMMDDHHMMSS)
    pub version: i64,

    /// Normalised migration name at the time it was applied
    pub migration_name: String,

    /// When execution of `up` started
    pub start_time: DateTime<Utc>,

    /// When execution of `up` finished
    pub end_time: DateTime<Utc>,

    /// Whether rollback must stop at this entry
    pub breakpoint: bool,
}

impl VersionLogEntry {
    /// Create a new entry with `breakpoint = false`
    #[must_use]
    pub fn new(
        version: i64,
        migration_name: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            version,
            migration_name: migration_name.into(),
            start_time,
            end_time,
            breakpoint: false,
        }
    }

    /// Parse a timestamp column read back from the store
    ///
    /// # Errors
    ///
    /// Returns a message naming the value when no known layout matches.
    pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
        const LAYOUTS: [&str; 4] = [
            "%Y-%m-%d %H:%M:%S%.f",
            "%Y-%m-%d %H:%M:%S",
            "%Y-%m-%dT%H:%M:%S%.f",
            "%Y-%m-%dT%H:%M:%S",
        ];
        let value = value.trim().trim_end_matches('Z');
        LAYOUTS
            .iter()
            .find_map(|layout| NaiveDateTime::parse_from_str(value, layout).ok())
            .map(|naive| naive.and_utc())
            .ok_or_else(|| format!("Failed to parse timestamp '{value}': unrecognized format"))
    }

    /// Format a timestamp for storage
    #[must_use]
    pub fn format_timestamp(value: &DateTime<Utc>) -> String {
        value.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

/// Convert an instant to the comparable `YYYYMMDDHHMMSS` integer form
#[must_use]
pub fn instant_to_version(instant: &DateTime<Utc>) -> i64 {
    instant
        .format(VERSION_FORMAT)
        .to_string()
        .parse()
        .unwrap_or(0)
}

/// Ordered-by-key snapshot of the version log
///
/// Read fully before each top-level operation and treated as immutable for its
/// duration. Ordering follows the environment's [`VersionOrder`].
#[derive(Debug, Clone, Default)]
pub struct VersionLog {
    entries: BTreeMap<i64, VersionLogEntry>,
    order: VersionOrder,
}

impl VersionLog {
    /// Build a snapshot from rows in any order
    #[must_use]
    pub fn new(entries: impl IntoIterator<Item = VersionLogEntry>, order: VersionOrder) -> Self {
        Self {
            entries: entries.into_iter().map(|e| (e.version, e)).collect(),
            order,
        }
    }

    /// The ordering mode this snapshot sorts by
    #[must_use]
    pub fn order(&self) -> VersionOrder {
        self.order
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn contains(&self, version: i64) -> bool {
        self.entries.contains_key(&version)
    }

    #[must_use]
    pub fn get(&self, version: i64) -> Option<&VersionLogEntry> {
        self.entries.get(&version)
    }

    /// Entries oldest-first under the active ordering mode
    #[must_use]
    pub fn ordered(&self) -> Vec<&VersionLogEntry> {
        let mut entries: Vec<&VersionLogEntry> = self.entries.values().collect();
        if self.order == VersionOrder::Execution {
            entries.sort_by_key(|e| (e.start_time, e.version));
        }
        entries
    }

    /// Entries most-recent-first under the active ordering mode
    #[must_use]
    pub fn most_recent_first(&self) -> Vec<&VersionLogEntry> {
        let mut entries = self.ordered();
        entries.reverse();
        entries
    }

    /// Versions oldest-first under the active ordering mode
    #[must_use]
    pub fn versions(&self) -> Vec<i64> {
        self.ordered().iter().map(|e| e.version).collect()
    }

    /// The most recently applied entry under the active ordering mode
    #[must_use]
    pub fn most_recent(&self) -> Option<&VersionLogEntry> {
        match self.order {
            VersionOrder::Creation => self.entries.values().next_back(),
            VersionOrder::Execution => self
                .entries
                .values()
                .max_by_key(|e| (e.start_time, e.version)),
        }
    }

    /// Highest applied version regardless of ordering mode
    #[must_use]
    pub fn current_version(&self) -> i64 {
        self.entries.keys().next_back().copied().unwrap_or(0)
    }

    /// Look up an entry by its recorded migration name
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<&VersionLogEntry> {
        self.entries.values().find(|e| e.migration_name == name)
    }

    /// Whether `entry` sits at or after `instant` under the active ordering mode
    ///
    /// Creation ordering compares the version as a `YYYYMMDDHHMMSS` number;
    /// execution ordering compares `start_time`.
    #[must_use]
    pub fn is_at_or_after(&self, entry: &VersionLogEntry, instant: &DateTime<Utc>) -> bool {
        match self.order {
            VersionOrder::Creation => entry.version >= instant_to_version(instant),
            VersionOrder::Execution => entry.start_time >= *instant,
        }
    }

    /// Iterate entries by ascending version
    pub fn iter(&self) -> impl Iterator<Item = &VersionLogEntry> {
        self.entries.values()
    }
}
