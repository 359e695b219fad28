//! # Tidemark
//!
//! Versioned schema-migration and seeding engine: ordered migrations and seeds,
//! a persisted version log, date and execution-order aware rollback, and
//! breakpoints that stop accidental destructive rollbacks.
//!
//! Stores plug in through the [`Adapter`] trait. [`PostgresAdapter`] runs on the
//! `may` coroutine runtime through `may_postgres`; [`MemoryAdapter`] keeps an
//! in-process model for tests and dry runs.

pub mod adapter;
pub mod config;
pub mod connection;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod migration;

pub use adapter::{Adapter, AdapterError, Dialect, MemoryAdapter, PostgresAdapter};
pub use config::{AdapterKind, EnvironmentConfig, TidemarkConfig, DEFAULT_CONFIG_FILE};
pub use connection::{connect, validate_connection_string, ConnectionError};
pub use migration::{
    Environment, EnvironmentOptions, MigrateOptions, Migration, MigrationError, Migrator, RollbackOptions,
    SchemaManager, Seed, Target,
};
