//! Migration-specific error types
//!
//! Errors fall into four groups:
//! - load errors, raised while descriptors are built and before any store access
//! - addressing errors, raised before any mutation begins
//! - execution errors, raised after the failing unit's own transaction is rolled back
//! - configuration errors
//!
//! Soft anomalies (breakpoint reached, missing migration file, invalid breakpoint
//! target, nothing to do) are not errors. They are reported through
//! [`Output`](crate::migration::Output) and the operation returns normally.

use crate::adapter::AdapterError;
use std::path::PathBuf;

/// Migration-specific errors
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// Two migration files declare the same version
    #[error("Duplicate migration - \"{}\" has the same version as \"{}\"", .second.display(), .first.display())]
    DuplicateVersion {
        version: i64,
        first: PathBuf,
        second: PathBuf,
    },

    /// Two migration files declare the same name
    #[error("Migration \"{}\" has the same name as \"{}\"", .second.display(), .first.display())]
    DuplicateName {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    /// A file was found but no unit with a matching name is registered for it
    #[error("Could not find {kind} unit \"{name}\" in file \"{}\"", .path.display())]
    UnitNotFound {
        kind: &'static str,
        name: String,
        path: PathBuf,
    },

    /// A `.rs` file in a migration directory does not follow the naming scheme
    #[error("Invalid migration file name \"{}\": expected m{{YYYYMMDDHHMMSS}}_{{name}}.rs", .0.display())]
    InvalidFileName(PathBuf),

    /// A configured migration or seed directory does not exist
    #[error("Directory \"{}\" does not exist", .0.display())]
    DirectoryNotFound(PathBuf),

    /// A directory or file could not be read
    #[error("Failed to read \"{}\": {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Two seed files share a name
    #[error("Seed \"{}\" has the same name as \"{}\"", .second.display(), .first.display())]
    DuplicateSeed {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    /// A unit with the same identity was registered twice
    #[error("{0} is already registered")]
    AlreadyRegistered(String),

    /// Seed dependencies reference an unknown seed or form a cycle
    #[error("Seed dependency error: {0}")]
    SeedDependency(String),

    /// Rollback target is not `0`/"all" and not present in the version log
    #[error("Target version ({0}) not found")]
    TargetNotFound(String),

    /// Seed requested by name is not loaded
    #[error("The seed class \"{0}\" does not exist")]
    UnknownSeed(String),

    /// Environment requested by name is not configured
    #[error("The environment \"{0}\" does not exist")]
    UnknownEnvironment(String),

    /// Target string could not be interpreted as a version, date, name or step count
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// A unit failed while running against the store
    #[error("{unit} failed: {source}")]
    ExecutionFailed {
        unit: String,
        #[source]
        source: AdapterError,
    },

    /// Rollback reached a migration that has no down step
    #[error("Migration {version} {name} has no down step and cannot be rolled back")]
    Irreversible { version: i64, name: String },

    /// Store-level failure outside of a unit (version log access, transactions)
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),
}

impl MigrationError {
    /// Whether this error was raised before any unit touched the store
    #[must_use]
    pub fn is_load_error(&self) -> bool {
        matches!(
            self,
            MigrationError::DuplicateVersion { .. }
                | MigrationError::DuplicateName { .. }
                | MigrationError::UnitNotFound { .. }
                | MigrationError::InvalidFileName(_)
                | MigrationError::DirectoryNotFound(_)
                | MigrationError::Io { .. }
                | MigrationError::DuplicateSeed { .. }
                | MigrationError::AlreadyRegistered(_)
                | MigrationError::SeedDependency(_)
        )
    }
}

impl From<config::ConfigError> for MigrationError {
    fn from(err: config::ConfigError) -> Self {
        MigrationError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_version_names_both_files() {
        let err = MigrationError::DuplicateVersion {
            version: 20120111235330,
            first: PathBuf::from("db/m20120111235330_test_migration.rs"),
            second: PathBuf::from("db/m20120111235330_other.rs"),
        };
        assert_eq!(
            err.to_string(),
            "Duplicate migration - \"db/m20120111235330_other.rs\" has the same version as \"db/m20120111235330_test_migration.rs\""
        );
        assert!(err.is_load_error());
    }

    #[test]
    fn test_addressing_messages() {
        assert_eq!(
            MigrationError::TargetNotFound("20121225000000".to_string()).to_string(),
            "Target version (20121225000000) not found"
        );
        assert_eq!(
            MigrationError::UnknownSeed("UserSeeder".to_string()).to_string(),
            "The seed class \"UserSeeder\" does not exist"
        );
        assert_eq!(
            MigrationError::UnknownEnvironment("staging".to_string()).to_string(),
            "The environment \"staging\" does not exist"
        );
    }

    #[test]
    fn test_unit_not_found_message() {
        let err = MigrationError::UnitNotFound {
            kind: "migration",
            name: "CreateUsers".to_string(),
            path: PathBuf::from("m20240101000000_create_users.rs"),
        };
        assert_eq!(
            err.to_string(),
            "Could not find migration unit \"CreateUsers\" in file \"m20240101000000_create_users.rs\""
        );
    }

    #[test]
    fn test_execution_failed_wraps_adapter_error() {
        let err = MigrationError::ExecutionFailed {
            unit: "20240101000000 CreateUsers".to_string(),
            source: AdapterError::Query("boom".to_string()),
        };
        assert_eq!(err.to_string(), "20240101000000 CreateUsers failed: Query error: boom");
        assert!(!err.is_load_error());
    }
}
