//! Migration and seed trait definitions

use super::schema_manager::SchemaManager;
use crate::adapter::AdapterError;

/// Trait that all migrations must implement
///
/// Each migration file defines a struct implementing this trait, and the
/// application registers it in a [`MigrationRegistry`](super::MigrationRegistry).
/// The engine pairs the registered unit with its file by version and name.
///
/// Tidemark uses coroutines (`may` runtime) for Postgres access, so this is
/// synchronous, not async.
pub trait Migration: Send + Sync {
    /// Migration version (timestamp: YYYYMMDDHHMMSS)
    fn version(&self) -> i64;

    /// Migration name, either snake_case or UpperCamelCase
    fn name(&self) -> &str;

    /// Apply the migration (forward change)
    fn up(&self, manager: &SchemaManager<'_>) -> Result<(), AdapterError>;

    /// Revert the migration (reverse change)
    fn down(&self, manager: &SchemaManager<'_>) -> Result<(), AdapterError>;

    /// Whether `up` does anything; when false the version is recorded without calling it
    fn has_up(&self) -> bool {
        true
    }

    /// Whether `down` exists; when false rollback of this unit fails
    fn has_down(&self) -> bool {
        true
    }

    /// Evaluated just before `up`; returning false skips the unit without recording it
    fn should_execute(&self) -> bool {
        true
    }
}

/// Trait that all seeds must implement
///
/// Seeds are not versioned and never recorded in the version log, so they can be
/// run any number of times.
pub trait Seed: Send + Sync {
    /// Seed name; must equal the seed file's stem
    fn name(&self) -> &str;

    /// Load the data
    fn run(&self, manager: &SchemaManager<'_>) -> Result<(), AdapterError>;

    /// Names of seeds that must run before this one
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Evaluated just before `run`; returning false reports the seed as skipped
    fn should_execute(&self) -> bool {
        true
    }
}
