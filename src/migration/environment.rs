//! Environment - one named target store and its version log
//!
//! An environment binds an adapter to a version-log table and an ordering mode.
//! It is passed explicitly into every migrator operation; there is no "current
//! environment" state anywhere in the crate.
//!
//! Each unit runs inside its own [`TransactionGuard`]. The version-log write for
//! that unit happens inside the same transaction, right before commit, so a
//! failed unit never leaves a log row behind.

use crate::adapter::{Adapter, AdapterError};
use crate::migration::record::{VersionLog, VersionLogEntry, VersionOrder};
use crate::migration::state_table::DEFAULT_VERSION_TABLE;
use crate::migration::{MigrationDescriptor, MigrationError, SchemaManager, SeedDescriptor};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// Direction of a migration run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

/// Per-environment settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentOptions {
    /// Name of the version-log table
    pub version_table: String,
    /// How "most recent" is decided
    pub version_order: VersionOrder,
}

impl Default for EnvironmentOptions {
    fn default() -> Self {
        Self {
            version_table: DEFAULT_VERSION_TABLE.to_string(),
            version_order: VersionOrder::Creation,
        }
    }
}

impl EnvironmentOptions {
    #[must_use]
    pub fn with_version_order(mut self, order: VersionOrder) -> Self {
        self.version_order = order;
        self
    }

    #[must_use]
    pub fn with_version_table(mut self, table: impl Into<String>) -> Self {
        self.version_table = table.into();
        self
    }
}

/// Scoped transaction: rolled back on drop unless committed
///
/// When the adapter has no transaction support the guard is inert.
pub struct TransactionGuard<'a> {
    adapter: &'a dyn Adapter,
    active: bool,
}

impl<'a> TransactionGuard<'a> {
    /// Begin a transaction if the adapter supports them
    ///
    /// # Errors
    ///
    /// Returns `AdapterError` if the adapter refuses to begin.
    pub fn begin(adapter: &'a dyn Adapter) -> Result<Self, AdapterError> {
        let active = adapter.has_transactions();
        if active {
            adapter.begin_transaction()?;
        }
        Ok(Self { adapter, active })
    }

    /// Commit the transaction
    ///
    /// # Errors
    ///
    /// Returns `AdapterError` if the commit fails. The guard is spent either way.
    pub fn commit(mut self) -> Result<(), AdapterError> {
        if self.active {
            self.active = false;
            self.adapter.commit_transaction()?;
        }
        Ok(())
    }

    /// Whether a transaction is open and owned by this guard
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl Drop for TransactionGuard<'_> {
    fn drop(&mut self) {
        if self.active {
            if let Err(e) = self.adapter.rollback_transaction() {
                log::error!("Failed to roll back transaction: {e}");
            }
        }
    }
}

/// A named target: adapter plus version-log access
pub struct Environment {
    name: String,
    options: EnvironmentOptions,
    adapter: Arc<dyn Adapter>,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("dialect", &self.adapter.dialect())
            .finish()
    }
}

impl Environment {
    pub fn new(name: impl Into<String>, options: EnvironmentOptions, adapter: Arc<dyn Adapter>) -> Self {
        Self {
            name: name.into(),
            options,
            adapter,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn options(&self) -> &EnvironmentOptions {
        &self.options
    }

    #[must_use]
    pub fn version_order(&self) -> VersionOrder {
        self.options.version_order
    }

    #[must_use]
    pub fn adapter(&self) -> &dyn Adapter {
        self.adapter.as_ref()
    }

    fn table(&self) -> &str {
        &self.options.version_table
    }

    /// Read the full version log
    ///
    /// Creates the version-log table first if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Adapter` if the table cannot be created or read.
    pub fn version_log(&self) -> Result<VersionLog, MigrationError> {
        self.adapter.ensure_version_table(self.table())?;
        let entries = self.adapter.fetch_version_log(self.table())?;
        log::debug!(
            "Read {} version log entries from {} ({})",
            entries.len(),
            self.table(),
            self.name
        );
        Ok(VersionLog::new(entries, self.options.version_order))
    }

    /// Highest applied version, or 0
    ///
    /// # Errors
    ///
    /// Same as [`Environment::version_log`].
    pub fn current_version(&self) -> Result<i64, MigrationError> {
        Ok(self.version_log()?.current_version())
    }

    /// Run one migration in one direction inside its own transaction
    ///
    /// `fake` records or removes the log entry without running the unit.
    ///
    /// # Errors
    ///
    /// - `Irreversible` when reverting a unit without a down step (nothing is touched)
    /// - `ExecutionFailed` when the unit fails (its transaction is rolled back)
    /// - `Adapter` when the transaction or log write fails
    pub fn execute_migration(
        &self,
        migration: &MigrationDescriptor,
        direction: Direction,
        fake: bool,
    ) -> Result<Duration, MigrationError> {
        if direction == Direction::Down && !fake && !migration.has_down() {
            return Err(MigrationError::Irreversible {
                version: migration.version,
                name: migration.name.clone(),
            });
        }

        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!(
            "tidemark.migration",
            version = migration.version,
            name = %migration.name,
            direction = direction.as_str(),
            fake
        )
        .entered();

        let started = Instant::now();
        let start_time = Utc::now();
        let guard = TransactionGuard::begin(self.adapter())?;

        if !fake {
            let manager = SchemaManager::new(self.adapter());
            let result = match direction {
                Direction::Up if migration.has_up() => migration.unit().up(&manager),
                Direction::Up => Ok(()),
                Direction::Down => migration.unit().down(&manager),
            };
            result.map_err(|source| MigrationError::ExecutionFailed {
                unit: format!("{} {}", migration.version, migration.name),
                source,
            })?;
        }

        match direction {
            Direction::Up => {
                let entry = VersionLogEntry::new(migration.version, migration.name.clone(), start_time, Utc::now());
                self.adapter.insert_version(self.table(), &entry)?;
            }
            Direction::Down => self.adapter.remove_version(self.table(), migration.version)?,
        }

        guard.commit()?;
        let elapsed = started.elapsed();

        #[cfg(feature = "metrics")]
        METRICS.record_migration(direction, elapsed);

        log::info!(
            "{} {} {} in {:.4}s ({})",
            match direction {
                Direction::Up => "Applied",
                Direction::Down => "Reverted",
            },
            migration.version,
            migration.name,
            elapsed.as_secs_f64(),
            self.name
        );
        Ok(elapsed)
    }

    /// Remove a log entry whose migration file is missing
    ///
    /// Only the log row is removed; whatever the migration created in the store
    /// is left as it is.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Adapter` if the transaction or log write fails.
    pub fn remove_log_entry(&self, version: i64) -> Result<(), MigrationError> {
        let guard = TransactionGuard::begin(self.adapter())?;
        self.adapter.remove_version(self.table(), version)?;
        guard.commit()?;
        Ok(())
    }

    /// Run one seed inside its own transaction
    ///
    /// # Errors
    ///
    /// - `ExecutionFailed` when the seed fails (its transaction is rolled back)
    /// - `Adapter` when the transaction fails
    pub fn execute_seed(&self, seed: &SeedDescriptor) -> Result<Duration, MigrationError> {
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("tidemark.seed", name = %seed.name).entered();

        let started = Instant::now();
        let guard = TransactionGuard::begin(self.adapter())?;
        let manager = SchemaManager::new(self.adapter());
        seed.unit()
            .run(&manager)
            .map_err(|source| MigrationError::ExecutionFailed {
                unit: seed.name.clone(),
                source,
            })?;
        guard.commit()?;
        let elapsed = started.elapsed();

        #[cfg(feature = "metrics")]
        METRICS.record_seed(elapsed);

        log::info!("Seeded {} in {:.4}s ({})", seed.name, elapsed.as_secs_f64(), self.name);
        Ok(elapsed)
    }

    /// Update only the breakpoint flag of one entry
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Adapter` if the write fails.
    pub fn set_breakpoint(&self, version: i64, breakpoint: bool) -> Result<(), MigrationError> {
        self.adapter.set_breakpoint(self.table(), version, breakpoint)?;
        Ok(())
    }

    /// Clear every breakpoint, returning how many were set
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Adapter` if the write fails.
    pub fn reset_breakpoints(&self) -> Result<u64, MigrationError> {
        self.adapter.ensure_version_table(self.table())?;
        Ok(self.adapter.reset_breakpoints(self.table())?)
    }

    /// Release the adapter's connection
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Adapter` if the adapter fails to disconnect.
    pub fn disconnect(&self) -> Result<(), MigrationError> {
        self.adapter.disconnect()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MemoryAdapter;
    use crate::migration::Migration;

    struct CreateUsers;

    impl Migration for CreateUsers {
        fn version(&self) -> i64 {
            20240101000000
        }
        fn name(&self) -> &str {
            "CreateUsers"
        }
        fn up(&self, manager: &SchemaManager<'_>) -> Result<(), AdapterError> {
            manager.execute("CREATE TABLE users (id integer)")?;
            manager.execute("CREATE INDEX idx_users_id ON users (id)")?;
            Ok(())
        }
        fn down(&self, manager: &SchemaManager<'_>) -> Result<(), AdapterError> {
            manager.execute("DROP TABLE users").map(|_| ())
        }
    }

    fn descriptor() -> MigrationDescriptor {
        MigrationDescriptor::new(
            20240101000000,
            "CreateUsers",
            "m20240101000000_create_users.rs",
            Arc::new(CreateUsers),
        )
    }

    fn env(adapter: &Arc<MemoryAdapter>) -> Environment {
        let shared: Arc<dyn Adapter> = adapter.clone();
        Environment::new("test", EnvironmentOptions::default(), shared)
    }

    #[test]
    fn test_up_records_log_entry() {
        let adapter = Arc::new(MemoryAdapter::new());
        let env = env(&adapter);

        env.execute_migration(&descriptor(), Direction::Up, false).unwrap();

        let log = env.version_log().unwrap();
        let entry = log.get(20240101000000).unwrap();
        assert_eq!(entry.migration_name, "CreateUsers");
        assert!(!entry.breakpoint);
        assert!(entry.start_time <= entry.end_time);
        assert!(adapter.has_table("users").unwrap());
        assert!(!adapter.in_transaction());
    }

    #[test]
    fn test_failed_up_leaves_nothing_behind() {
        let adapter = Arc::new(MemoryAdapter::new());
        adapter.fail_on("CREATE INDEX");
        let env = env(&adapter);

        let err = env.execute_migration(&descriptor(), Direction::Up, false).unwrap_err();
        assert!(matches!(err, MigrationError::ExecutionFailed { .. }));
        assert!(!adapter.has_table("users").unwrap());
        assert!(env.version_log().unwrap().is_empty());
        assert!(!adapter.in_transaction());
    }

    #[test]
    fn test_fake_up_records_without_running() {
        let adapter = Arc::new(MemoryAdapter::new());
        let env = env(&adapter);

        env.execute_migration(&descriptor(), Direction::Up, true).unwrap();
        assert!(env.version_log().unwrap().contains(20240101000000));
        assert!(!adapter.has_table("users").unwrap());
    }

    #[test]
    fn test_down_removes_log_entry() {
        let adapter = Arc::new(MemoryAdapter::new());
        let env = env(&adapter);
        env.execute_migration(&descriptor(), Direction::Up, false).unwrap();
        env.execute_migration(&descriptor(), Direction::Down, false).unwrap();

        assert!(env.version_log().unwrap().is_empty());
        assert!(!adapter.has_table("users").unwrap());
    }

    #[test]
    fn test_guard_rolls_back_on_drop() {
        let adapter = MemoryAdapter::new();
        {
            let guard = TransactionGuard::begin(&adapter).unwrap();
            assert!(guard.is_active());
            adapter.execute("CREATE TABLE scratch (id integer)").unwrap();
        }
        assert!(!adapter.has_table("scratch").unwrap());
        assert!(!adapter.in_transaction());
    }

    #[test]
    fn test_guard_is_inert_without_transactions() {
        let adapter = MemoryAdapter::without_transactions();
        let guard = TransactionGuard::begin(&adapter).unwrap();
        assert!(!guard.is_active());
        guard.commit().unwrap();
    }
}
