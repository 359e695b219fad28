//! Shared fixtures for the root integration tests

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use tidemark::migration::{
    Environment, EnvironmentOptions, Migration, MigrationRegistry, Migrator, SchemaManager, Seed,
    SeedRegistry, VersionLogEntry, VersionOrder,
};
use tidemark::{Adapter, AdapterError, MemoryAdapter};

pub const LOG_TABLE: &str = "tidemark_log";

/// Migration creating (and dropping) one table
pub struct TableMigration {
    pub version: i64,
    pub name: String,
    pub table: String,
    pub reversible: bool,
    pub execute: bool,
}

impl TableMigration {
    pub fn new(version: i64, name: &str, table: &str) -> Self {
        Self {
            version,
            name: name.to_string(),
            table: table.to_string(),
            reversible: true,
            execute: true,
        }
    }

    pub fn irreversible(mut self) -> Self {
        self.reversible = false;
        self
    }

    pub fn skipped(mut self) -> Self {
        self.execute = false;
        self
    }
}

impl Migration for TableMigration {
    fn version(&self) -> i64 {
        self.version
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn up(&self, manager: &SchemaManager<'_>) -> Result<(), AdapterError> {
        manager.execute(&format!("CREATE TABLE {} (id integer PRIMARY KEY)", self.table))?;
        Ok(())
    }

    fn down(&self, manager: &SchemaManager<'_>) -> Result<(), AdapterError> {
        manager.execute(&format!("DROP TABLE {}", self.table))?;
        Ok(())
    }

    fn has_down(&self) -> bool {
        self.reversible
    }

    fn should_execute(&self) -> bool {
        self.execute
    }
}

/// Seed inserting one row into a table
pub struct RowSeed {
    pub name: String,
    pub table: String,
    pub dependencies: Vec<String>,
    pub execute: bool,
}

impl RowSeed {
    pub fn new(name: &str, table: &str) -> Self {
        Self {
            name: name.to_string(),
            table: table.to_string(),
            dependencies: Vec::new(),
            execute: true,
        }
    }

    pub fn after(mut self, dependency: &str) -> Self {
        self.dependencies.push(dependency.to_string());
        self
    }

    pub fn skipped(mut self) -> Self {
        self.execute = false;
        self
    }
}

impl Seed for RowSeed {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, manager: &SchemaManager<'_>) -> Result<(), AdapterError> {
        manager.execute(&format!("INSERT INTO {} (id) VALUES (1)", self.table))?;
        Ok(())
    }

    fn dependencies(&self) -> Vec<String> {
        self.dependencies.clone()
    }

    fn should_execute(&self) -> bool {
        self.execute
    }
}

/// The two migrations used throughout: `TestMigration` and `TestMigration2`
pub fn standard_registry() -> MigrationRegistry {
    MigrationRegistry::new()
        .with(TableMigration::new(20120111235330, "TestMigration", "info"))
        .unwrap()
        .with(TableMigration::new(20120116183504, "TestMigration2", "info_two"))
        .unwrap()
}

pub fn migrator(registry: &MigrationRegistry) -> Migrator {
    Migrator::from_registries(registry, &SeedRegistry::new()).unwrap()
}

pub fn seeded_migrator(registry: &MigrationRegistry, seeds: &SeedRegistry) -> Migrator {
    Migrator::from_registries(registry, seeds).unwrap()
}

pub fn memory_env(order: VersionOrder) -> (Arc<MemoryAdapter>, Environment) {
    let adapter = Arc::new(MemoryAdapter::new());
    let shared: Arc<dyn Adapter> = adapter.clone();
    let env = Environment::new(
        "test",
        EnvironmentOptions::default().with_version_order(order),
        shared,
    );
    (adapter, env)
}

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
}

/// Write a log entry directly, as if the migration had been applied at `start`
pub fn log_entry(adapter: &MemoryAdapter, version: i64, name: &str, start: DateTime<Utc>, breakpoint: bool) {
    let mut entry = VersionLogEntry::new(version, name, start, start + chrono::Duration::seconds(1));
    entry.breakpoint = breakpoint;
    adapter.insert_log_entry(LOG_TABLE, entry).unwrap();
}

/// Versions in the log, most recent first
pub fn logged(env: &Environment) -> Vec<i64> {
    env.version_log()
        .unwrap()
        .most_recent_first()
        .iter()
        .map(|e| e.version)
        .collect()
}

/// Log contents without timing fields
pub fn log_shape(env: &Environment) -> Vec<(i64, String, bool)> {
    env.version_log()
        .unwrap()
        .ordered()
        .iter()
        .map(|e| (e.version, e.migration_name.clone(), e.breakpoint))
        .collect()
}
