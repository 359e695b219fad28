//! Migration system for Tidemark
//!
//! This module provides the migration manager and everything it runs on:
//! - `Migration` and `Seed` unit traits, handed a `SchemaManager`
//! - explicit registries plus a file loader that matches files to units
//! - the version log model and the target resolver
//! - `Environment` (one adapter plus its version-log table)
//! - `Migrator`: migrate, rollback, seed, status and breakpoints
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tidemark::migration::{
//!     Environment, EnvironmentOptions, MigrateOptions, Migration, MigrationRegistry, Migrator,
//!     SchemaManager, SeedRegistry, Target,
//! };
//! use tidemark::{AdapterError, MemoryAdapter};
//! use sea_query::{ColumnDef, Table};
//!
//! pub struct CreateUsersTable;
//!
//! impl Migration for CreateUsersTable {
//!     fn name(&self) -> &str {
//!         "CreateUsersTable"
//!     }
//!
//!     fn version(&self) -> i64 {
//!         20240120120000
//!     }
//!
//!     fn up(&self, manager: &SchemaManager) -> Result<(), AdapterError> {
//!         let table = Table::create()
//!             .table("users")
//!             .col(ColumnDef::new("id").integer().not_null().primary_key())
//!             .col(ColumnDef::new("email").string().not_null())
//!             .to_owned();
//!         manager.create_table(table)
//!     }
//!
//!     fn down(&self, manager: &SchemaManager) -> Result<(), AdapterError> {
//!         manager.drop_table(Table::drop().table("users").to_owned())
//!     }
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = MigrationRegistry::new().with(CreateUsersTable)?;
//!     let mut migrator = Migrator::from_registries(&registry, &SeedRegistry::new())?;
//!     let env = Environment::new("development", EnvironmentOptions::default(), Arc::new(MemoryAdapter::new()));
//!
//!     migrator.migrate(&env, &Target::Latest, MigrateOptions::default())?;
//!     println!("{}", migrator.status(&env)?.render_plain());
//!     Ok(())
//! }
//! ```

pub mod dependency_ordering;
pub mod environment;
pub mod error;
pub mod file;
pub mod loader;
#[allow(clippy::module_inception)]
pub mod migration;
pub mod migrator;
pub mod output;
pub mod record;
pub mod registry;
pub mod resolver;
pub mod schema_manager;
pub mod startup;
pub mod state_table;
pub mod status;

pub use environment::{Direction, Environment, EnvironmentOptions, TransactionGuard};
pub use error::MigrationError;
pub use loader::{
    load_migrations, load_registered, load_registered_seeds, load_seeds, MigrationDescriptor,
    SeedDescriptor,
};
pub use migration::{Migration, Seed};
pub use migrator::{MigrateOptions, Migrator, PlannedStep, RollbackOptions};
pub use output::Output;
pub use record::{VersionLog, VersionLogEntry, VersionOrder};
pub use registry::{MigrationRegistry, SeedRegistry};
pub use resolver::Target;
pub use schema_manager::SchemaManager;
pub use startup::startup_migrations;
pub use status::{MigrationState, MigrationStatus, StatusLine};
