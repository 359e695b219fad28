//! Adapter Module
//!
//! Provides the `Adapter` trait: the capability contract the migration engine
//! requires from a store-specific backend.
//!
//! The engine never issues dialect SQL for structural checks itself. It only asks
//! the adapter capability questions (`has_table`, `has_column`, ...), runs the
//! statements a migration unit hands it, and reads/writes the version log through
//! the persistence primitives below.
//!
//! Two implementations ship with the crate:
//! - [`PostgresAdapter`] over `may_postgres`
//! - [`MemoryAdapter`], an in-process store used by tests and dry runs

pub mod memory;
pub mod postgres;

pub use memory::MemoryAdapter;
pub use postgres::PostgresAdapter;

use crate::connection::ConnectionError;
use crate::migration::VersionLogEntry;

/// SQL dialect spoken by an adapter
///
/// `SchemaManager` uses this to pick the `sea-query` builder when rendering
/// statements handed to it by migration units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    MySql,
    Sqlite,
}

/// Adapter error type
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// `PostgreSQL` error from `may_postgres`
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] may_postgres::Error),
    /// Statement execution error
    #[error("Query error: {0}")]
    Query(String),
    /// Row parsing/conversion error
    #[error("Parse error: {0}")]
    Parse(String),
    /// Transaction state error (nested begin, commit without begin, ...)
    #[error("Transaction error: {0}")]
    Transaction(String),
    /// Capability the backend does not provide
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
    /// Connection could not be established
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    /// Other execution errors
    #[error("Execution error: {0}")]
    Other(String),
}

/// Capability contract implemented once per data store
///
/// Every method takes `&self`; implementations own their connection lifecycle and
/// use interior mutability where they need it. The engine drives one adapter per
/// environment, strictly sequentially.
pub trait Adapter {
    /// Dialect used to render `sea-query` statements
    fn dialect(&self) -> Dialect;

    /// Whether the store can scope a migration in a transaction
    ///
    /// When `false`, the engine runs each unit without a transaction and the
    /// begin/commit/rollback methods are never called.
    fn has_transactions(&self) -> bool;

    /// Begin a transaction
    ///
    /// # Errors
    ///
    /// Returns `AdapterError` if a transaction is already open or the store refuses.
    fn begin_transaction(&self) -> Result<(), AdapterError>;

    /// Commit the open transaction
    ///
    /// # Errors
    ///
    /// Returns `AdapterError` if no transaction is open or the commit fails.
    fn commit_transaction(&self) -> Result<(), AdapterError>;

    /// Roll back the open transaction
    ///
    /// # Errors
    ///
    /// Returns `AdapterError` if no transaction is open or the rollback fails.
    fn rollback_transaction(&self) -> Result<(), AdapterError>;

    /// Execute a statement and return the number of rows affected
    ///
    /// # Errors
    ///
    /// Returns `AdapterError` if the statement fails.
    fn execute(&self, sql: &str) -> Result<u64, AdapterError>;

    /// Check whether a table exists
    fn has_table(&self, table: &str) -> Result<bool, AdapterError>;

    /// Check whether a column exists on a table
    fn has_column(&self, table: &str, column: &str) -> Result<bool, AdapterError>;

    /// Check whether an index covering exactly `columns` (in order) exists
    fn has_index(&self, table: &str, columns: &[&str]) -> Result<bool, AdapterError>;

    /// Check whether an index with the given name exists on a table
    fn has_index_by_name(&self, table: &str, index_name: &str) -> Result<bool, AdapterError>;

    /// Check whether a foreign key exists
    ///
    /// When `constraint` is given, the constraint name must match as well.
    fn has_foreign_key(
        &self,
        table: &str,
        columns: &[&str],
        constraint: Option<&str>,
    ) -> Result<bool, AdapterError>;

    /// Check whether a database exists
    fn has_database(&self, name: &str) -> Result<bool, AdapterError>;

    /// Create a database
    fn create_database(&self, name: &str) -> Result<(), AdapterError>;

    /// Drop a database
    fn drop_database(&self, name: &str) -> Result<(), AdapterError>;

    /// Check whether a schema namespace exists
    fn has_schema(&self, name: &str) -> Result<bool, AdapterError>;

    /// Create a schema namespace (stores where schema differs from database)
    fn create_schema(&self, name: &str) -> Result<(), AdapterError>;

    /// Drop a schema namespace
    fn drop_schema(&self, name: &str) -> Result<(), AdapterError>;

    /// Release the underlying connection
    fn disconnect(&self) -> Result<(), AdapterError>;

    /// Create the version-log table if it does not exist
    fn ensure_version_table(&self, table: &str) -> Result<(), AdapterError>;

    /// Read the full version log (any order; the engine orders it)
    fn fetch_version_log(&self, table: &str) -> Result<Vec<VersionLogEntry>, AdapterError>;

    /// Append an entry after a successful "up"
    fn insert_version(&self, table: &str, entry: &VersionLogEntry) -> Result<(), AdapterError>;

    /// Remove an entry after a successful "down"
    fn remove_version(&self, table: &str, version: i64) -> Result<(), AdapterError>;

    /// Update only the breakpoint flag of an entry
    fn set_breakpoint(&self, table: &str, version: i64, breakpoint: bool) -> Result<(), AdapterError>;

    /// Clear every breakpoint, returning how many were set
    fn reset_breakpoints(&self, table: &str) -> Result<u64, AdapterError>;
}

impl<A: Adapter + ?Sized> Adapter for Box<A> {
    fn dialect(&self) -> Dialect {
        (**self).dialect()
    }

    fn has_transactions(&self) -> bool {
        (**self).has_transactions()
    }

    fn begin_transaction(&self) -> Result<(), AdapterError> {
        (**self).begin_transaction()
    }

    fn commit_transaction(&self) -> Result<(), AdapterError> {
        (**self).commit_transaction()
    }

    fn rollback_transaction(&self) -> Result<(), AdapterError> {
        (**self).rollback_transaction()
    }

    fn execute(&self, sql: &str) -> Result<u64, AdapterError> {
        (**self).execute(sql)
    }

    fn has_table(&self, table: &str) -> Result<bool, AdapterError> {
        (**self).has_table(table)
    }

    fn has_column(&self, table: &str, column: &str) -> Result<bool, AdapterError> {
        (**self).has_column(table, column)
    }

    fn has_index(&self, table: &str, columns: &[&str]) -> Result<bool, AdapterError> {
        (**self).has_index(table, columns)
    }

    fn has_index_by_name(&self, table: &str, index_name: &str) -> Result<bool, AdapterError> {
        (**self).has_index_by_name(table, index_name)
    }

    fn has_foreign_key(
        &self,
        table: &str,
        columns: &[&str],
        constraint: Option<&str>,
    ) -> Result<bool, AdapterError> {
        (**self).has_foreign_key(table, columns, constraint)
    }

    fn has_database(&self, name: &str) -> Result<bool, AdapterError> {
        (**self).has_database(name)
    }

    fn create_database(&self, name: &str) -> Result<(), AdapterError> {
        (**self).create_database(name)
    }

    fn drop_database(&self, name: &str) -> Result<(), AdapterError> {
        (**self).drop_database(name)
    }

    fn has_schema(&self, name: &str) -> Result<bool, AdapterError> {
        (**self).has_schema(name)
    }

    fn create_schema(&self, name: &str) -> Result<(), AdapterError> {
        (**self).create_schema(name)
    }

    fn drop_schema(&self, name: &str) -> Result<(), AdapterError> {
        (**self).drop_schema(name)
    }

    fn disconnect(&self) -> Result<(), AdapterError> {
        (**self).disconnect()
    }

    fn ensure_version_table(&self, table: &str) -> Result<(), AdapterError> {
        (**self).ensure_version_table(table)
    }

    fn fetch_version_log(&self, table: &str) -> Result<Vec<VersionLogEntry>, AdapterError> {
        (**self).fetch_version_log(table)
    }

    fn insert_version(&self, table: &str, entry: &VersionLogEntry) -> Result<(), AdapterError> {
        (**self).insert_version(table, entry)
    }

    fn remove_version(&self, table: &str, version: i64) -> Result<(), AdapterError> {
        (**self).remove_version(table, version)
    }

    fn set_breakpoint(&self, table: &str, version: i64, breakpoint: bool) -> Result<(), AdapterError> {
        (**self).set_breakpoint(table, version, breakpoint)
    }

    fn reset_breakpoints(&self, table: &str) -> Result<u64, AdapterError> {
        (**self).reset_breakpoints(table)
    }
}
