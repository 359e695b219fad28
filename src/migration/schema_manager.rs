//! SchemaManager - Provides methods for schema operations in migrations and seeds

use crate::adapter::{Adapter, AdapterError, Dialect};
use sea_query::{
    ColumnDef, IndexCreateStatement, IndexDropStatement, MysqlQueryBuilder, PostgresQueryBuilder,
    SqliteQueryBuilder, Table, TableAlterStatement, TableCreateStatement, TableDropStatement,
    TableRenameStatement,
};
use std::fmt::Display;

/// Render a `sea-query` schema statement with the builder matching the adapter's dialect
macro_rules! render {
    ($dialect:expr, $stmt:expr) => {
        match $dialect {
            Dialect::Postgres => $stmt.build(PostgresQueryBuilder),
            Dialect::MySql => $stmt.build(MysqlQueryBuilder),
            Dialect::Sqlite => $stmt.build(SqliteQueryBuilder),
        }
    };
}

/// SchemaManager provides methods for performing schema operations in migrations
///
/// It borrows the environment's adapter for the duration of a single unit. DDL is
/// built with `sea-query` and rendered for the adapter's [`Dialect`]; capability
/// questions are passed straight through to the adapter.
pub struct SchemaManager<'a> {
    adapter: &'a dyn Adapter,
}

impl<'a> SchemaManager<'a> {
    /// Create a new SchemaManager over the given adapter
    pub fn new(adapter: &'a dyn Adapter) -> Self {
        Self { adapter }
    }

    /// Create a table
    ///
    /// # Example
    /// ```rust,no_run
    /// use sea_query::{Table, ColumnDef};
    /// # fn run(manager: &tidemark::migration::SchemaManager<'_>) -> Result<(), tidemark::AdapterError> {
    /// let table = Table::create()
    ///     .table("users")
    ///     .col(ColumnDef::new("id").integer().not_null().auto_increment().primary_key())
    ///     .col(ColumnDef::new("email").string().not_null().unique_key())
    ///     .to_owned();
    ///
    /// manager.create_table(table)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn create_table(&self, table: TableCreateStatement) -> Result<(), AdapterError> {
        let sql = render!(self.adapter.dialect(), table);
        self.execute(&sql).map(|_| ())
    }

    /// Drop a table
    pub fn drop_table(&self, table: TableDropStatement) -> Result<(), AdapterError> {
        let sql = render!(self.adapter.dialect(), table);
        self.execute(&sql).map(|_| ())
    }

    /// Rename a table
    pub fn rename_table(&self, rename: TableRenameStatement) -> Result<(), AdapterError> {
        let sql = render!(self.adapter.dialect(), rename);
        self.execute(&sql).map(|_| ())
    }

    /// Alter a table
    ///
    /// # Example
    /// ```rust,no_run
    /// use sea_query::{Table, ColumnDef};
    /// # fn run(manager: &tidemark::migration::SchemaManager<'_>) -> Result<(), tidemark::AdapterError> {
    /// let alter = Table::alter()
    ///     .table("users")
    ///     .add_column(ColumnDef::new("avatar_url").string().null())
    ///     .to_owned();
    ///
    /// manager.alter_table(alter)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn alter_table(&self, alter: TableAlterStatement) -> Result<(), AdapterError> {
        let sql = render!(self.adapter.dialect(), alter);
        self.execute(&sql).map(|_| ())
    }

    /// Create an index
    pub fn create_index(&self, index: IndexCreateStatement) -> Result<(), AdapterError> {
        let sql = render!(self.adapter.dialect(), index);
        self.execute(&sql).map(|_| ())
    }

    /// Drop an index
    pub fn drop_index(&self, index: IndexDropStatement) -> Result<(), AdapterError> {
        let sql = render!(self.adapter.dialect(), index);
        self.execute(&sql).map(|_| ())
    }

    /// Add a column to an existing table
    pub fn add_column<T: Display>(&self, table: T, column: ColumnDef) -> Result<(), AdapterError> {
        let alter = Table::alter()
            .table(table.to_string())
            .add_column(column)
            .to_owned();
        self.alter_table(alter)
    }

    /// Drop a column from an existing table
    pub fn drop_column<T: Display>(&self, table: T, column: &str) -> Result<(), AdapterError> {
        let alter = Table::alter()
            .table(table.to_string())
            .drop_column(column.to_string())
            .to_owned();
        self.alter_table(alter)
    }

    /// Rename a column in an existing table
    pub fn rename_column<T: Display>(
        &self,
        table: T,
        old_name: &str,
        new_name: &str,
    ) -> Result<(), AdapterError> {
        let alter = Table::alter()
            .table(table.to_string())
            .rename_column(old_name.to_string(), new_name.to_string())
            .to_owned();
        self.alter_table(alter)
    }

    /// Execute a raw statement, returning rows affected
    pub fn execute(&self, sql: &str) -> Result<u64, AdapterError> {
        log::debug!("Executing: {sql}");
        self.adapter.execute(sql)
    }

    pub fn has_table(&self, table: &str) -> Result<bool, AdapterError> {
        self.adapter.has_table(table)
    }

    pub fn has_column(&self, table: &str, column: &str) -> Result<bool, AdapterError> {
        self.adapter.has_column(table, column)
    }

    pub fn has_index(&self, table: &str, columns: &[&str]) -> Result<bool, AdapterError> {
        self.adapter.has_index(table, columns)
    }

    pub fn has_index_by_name(&self, table: &str, index_name: &str) -> Result<bool, AdapterError> {
        self.adapter.has_index_by_name(table, index_name)
    }

    pub fn has_foreign_key(
        &self,
        table: &str,
        columns: &[&str],
        constraint: Option<&str>,
    ) -> Result<bool, AdapterError> {
        self.adapter.has_foreign_key(table, columns, constraint)
    }

    pub fn has_schema(&self, name: &str) -> Result<bool, AdapterError> {
        self.adapter.has_schema(name)
    }

    pub fn create_schema(&self, name: &str) -> Result<(), AdapterError> {
        self.adapter.create_schema(name)
    }

    pub fn drop_schema(&self, name: &str) -> Result<(), AdapterError> {
        self.adapter.drop_schema(name)
    }

    /// Get a reference to the underlying adapter
    pub fn adapter(&self) -> &dyn Adapter {
        self.adapter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MemoryAdapter;
    use sea_query::{Expr, Index};

    #[test]
    fn test_create_table_through_sea_query() {
        let adapter = MemoryAdapter::new();
        let manager = SchemaManager::new(&adapter);

        let table = Table::create()
            .table("users")
            .col(ColumnDef::new("id").integer().not_null().primary_key())
            .col(ColumnDef::new("email").string().not_null())
            .to_owned();
        manager.create_table(table).unwrap();

        assert!(manager.has_table("users").unwrap());
        assert!(manager.has_column("users", "email").unwrap());
    }

    #[test]
    fn test_column_helpers() {
        let adapter = MemoryAdapter::new();
        let manager = SchemaManager::new(&adapter);
        manager.execute("CREATE TABLE users (id integer)").unwrap();

        manager
            .add_column("users", ColumnDef::new("avatar_url").string().null().to_owned())
            .unwrap();
        assert!(manager.has_column("users", "avatar_url").unwrap());

        manager.rename_column("users", "avatar_url", "avatar").unwrap();
        assert!(manager.has_column("users", "avatar").unwrap());

        manager.drop_column("users", "avatar").unwrap();
        assert!(!manager.has_column("users", "avatar").unwrap());
    }

    #[test]
    fn test_index_and_foreign_key() {
        let adapter = MemoryAdapter::new();
        let manager = SchemaManager::new(&adapter);
        manager.execute("CREATE TABLE banks (id integer PRIMARY KEY)").unwrap();

        manager
            .execute(
                r#"CREATE TABLE "accounts" ( "id" integer NOT NULL PRIMARY KEY, "bank_id" integer NOT NULL, CONSTRAINT "fk_accounts_bank" FOREIGN KEY ("bank_id") REFERENCES "banks" ("id") )"#,
            )
            .unwrap();
        assert!(manager.has_foreign_key("accounts", &["bank_id"], None).unwrap());

        let index = Index::create()
            .name("idx_accounts_bank_id")
            .table("accounts")
            .col(Expr::col("bank_id"))
            .to_owned();
        manager.create_index(index).unwrap();
        assert!(manager.has_index("accounts", &["bank_id"]).unwrap());

        let drop = Index::drop().name("idx_accounts_bank_id").table("accounts").to_owned();
        manager.drop_index(drop).unwrap();
        assert!(!manager.has_index_by_name("accounts", "idx_accounts_bank_id").unwrap());
    }

    #[test]
    fn test_drop_table() {
        let adapter = MemoryAdapter::new();
        let manager = SchemaManager::new(&adapter);
        manager.execute("CREATE TABLE users (id integer)").unwrap();
        manager.drop_table(Table::drop().table("users").to_owned()).unwrap();
        assert!(!manager.has_table("users").unwrap());
    }
}
