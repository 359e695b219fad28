//! `PostgresAdapter` - the `Adapter` implementation over `may_postgres`

use crate::adapter::{Adapter, AdapterError, Dialect};
use crate::connection::connect;
use crate::migration::state_table::{create_version_table, create_version_table_index};
use crate::migration::VersionLogEntry;
use chrono::{DateTime, Utc};
use may_postgres::types::ToSql;
use may_postgres::{Client, Row};
use sea_query::PostgresQueryBuilder;
use std::cell::Cell;
use std::collections::BTreeMap;

/// Adapter backed by a single `may_postgres::Client`
///
/// The adapter owns the connection for the lifetime of the environment.
/// Transactions are plain `BEGIN`/`COMMIT`/`ROLLBACK` on that connection.
pub struct PostgresAdapter {
    client: Client,
    in_transaction: Cell<bool>,
    disconnected: Cell<bool>,
}

impl PostgresAdapter {
    /// Wrap an already-connected client
    pub fn new(client: Client) -> Self {
        Self {
            client,
            in_transaction: Cell::new(false),
            disconnected: Cell::new(false),
        }
    }

    /// Connect using a URI or key-value connection string
    ///
    /// # Errors
    ///
    /// Returns `AdapterError::Connection` if the string is invalid or the server refuses.
    pub fn connect(connection_string: &str) -> Result<Self, AdapterError> {
        Ok(Self::new(connect(connection_string)?))
    }

    /// Get a reference to the underlying client
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn ensure_connected(&self) -> Result<(), AdapterError> {
        if self.disconnected.get() {
            return Err(AdapterError::Other("Adapter has been disconnected".to_string()));
        }
        Ok(())
    }

    fn run(&self, sql: &str, params: &[&dyn ToSql]) -> Result<u64, AdapterError> {
        self.ensure_connected()?;
        log::trace!("execute: {sql}");
        Ok(self.client.execute(sql, params)?)
    }

    fn rows(&self, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, AdapterError> {
        self.ensure_connected()?;
        log::trace!("query: {sql}");
        Ok(self.client.query(sql, params)?)
    }

    fn exists(&self, sql: &str, params: &[&dyn ToSql]) -> Result<bool, AdapterError> {
        let rows = self.rows(sql, params)?;
        match rows.first() {
            Some(row) => row
                .try_get::<_, bool>(0)
                .map_err(|e| AdapterError::Parse(e.to_string())),
            None => Ok(false),
        }
    }

    /// Split an optionally schema-qualified table name
    fn split_table(table: &str) -> (String, String) {
        match table.split_once('.') {
            Some((schema, name)) => (schema.to_string(), name.to_string()),
            None => ("public".to_string(), table.to_string()),
        }
    }

    /// Columns of every index (or foreign key) keyed by name, in key order
    fn grouped(rows: &[Row]) -> Result<BTreeMap<String, Vec<String>>, AdapterError> {
        let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for row in rows {
            let name: String = row.try_get(0).map_err(|e| AdapterError::Parse(e.to_string()))?;
            let column: String = row.try_get(1).map_err(|e| AdapterError::Parse(e.to_string()))?;
            grouped.entry(name).or_default().push(column);
        }
        Ok(grouped)
    }

    fn entry_from_row(row: &Row) -> Result<VersionLogEntry, AdapterError> {
        let parse = |e: may_postgres::Error| AdapterError::Parse(e.to_string());
        let version: i64 = row.try_get(0).map_err(parse)?;
        let migration_name: Option<String> = row.try_get(1).map_err(parse)?;
        let start_time: Option<String> = row.try_get(2).map_err(parse)?;
        let end_time: Option<String> = row.try_get(3).map_err(parse)?;
        let breakpoint: bool = row.try_get(4).map_err(parse)?;

        let timestamp = |value: Option<String>| -> Result<DateTime<Utc>, AdapterError> {
            match value {
                Some(value) => VersionLogEntry::parse_timestamp(&value).map_err(AdapterError::Parse),
                None => Ok(DateTime::<Utc>::UNIX_EPOCH),
            }
        };

        Ok(VersionLogEntry {
            version,
            migration_name: migration_name.unwrap_or_default(),
            start_time: timestamp(start_time)?,
            end_time: timestamp(end_time)?,
            breakpoint,
        })
    }
}

/// Quote a possibly schema-qualified identifier
pub(crate) fn quote_ident(name: &str) -> String {
    name.split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}

impl Adapter for PostgresAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn has_transactions(&self) -> bool {
        true
    }

    fn begin_transaction(&self) -> Result<(), AdapterError> {
        if self.in_transaction.get() {
            return Err(AdapterError::Transaction("A transaction is already open".to_string()));
        }
        self.run("BEGIN", &[])?;
        self.in_transaction.set(true);
        Ok(())
    }

    fn commit_transaction(&self) -> Result<(), AdapterError> {
        if !self.in_transaction.get() {
            return Err(AdapterError::Transaction("No open transaction to commit".to_string()));
        }
        self.in_transaction.set(false);
        self.run("COMMIT", &[])?;
        Ok(())
    }

    fn rollback_transaction(&self) -> Result<(), AdapterError> {
        if !self.in_transaction.get() {
            return Err(AdapterError::Transaction("No open transaction to roll back".to_string()));
        }
        self.in_transaction.set(false);
        self.run("ROLLBACK", &[])?;
        Ok(())
    }

    fn execute(&self, sql: &str) -> Result<u64, AdapterError> {
        self.run(sql, &[])
    }

    fn has_table(&self, table: &str) -> Result<bool, AdapterError> {
        let (schema, name) = Self::split_table(table);
        self.exists(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_schema = $1 AND table_name = $2)",
            &[&schema, &name],
        )
    }

    fn has_column(&self, table: &str, column: &str) -> Result<bool, AdapterError> {
        let (schema, name) = Self::split_table(table);
        self.exists(
            "SELECT EXISTS (SELECT 1 FROM information_schema.columns \
             WHERE table_schema = $1 AND table_name = $2 AND column_name = $3)",
            &[&schema, &name, &column],
        )
    }

    fn has_index(&self, table: &str, columns: &[&str]) -> Result<bool, AdapterError> {
        let (schema, name) = Self::split_table(table);
        let rows = self.rows(
            r#"
            SELECT ic.relname::text, a.attname::text
            FROM pg_index ix
            JOIN pg_class t ON t.oid = ix.indrelid
            JOIN pg_class ic ON ic.oid = ix.indexrelid
            JOIN pg_namespace n ON n.oid = t.relnamespace
            JOIN LATERAL unnest(ix.indkey) WITH ORDINALITY AS k(attnum, ord) ON true
            JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
            WHERE n.nspname = $1 AND t.relname = $2
            ORDER BY ic.relname, k.ord
            "#,
            &[&schema, &name],
        )?;
        let indexes = Self::grouped(&rows)?;
        Ok(indexes
            .values()
            .any(|cols| cols.iter().map(String::as_str).eq(columns.iter().copied())))
    }

    fn has_index_by_name(&self, table: &str, index_name: &str) -> Result<bool, AdapterError> {
        let (schema, name) = Self::split_table(table);
        self.exists(
            "SELECT EXISTS (SELECT 1 FROM pg_indexes WHERE schemaname = $1 AND tablename = $2 AND indexname = $3)",
            &[&schema, &name, &index_name],
        )
    }

    fn has_foreign_key(
        &self,
        table: &str,
        columns: &[&str],
        constraint: Option<&str>,
    ) -> Result<bool, AdapterError> {
        let (schema, name) = Self::split_table(table);
        let rows = self.rows(
            r#"
            SELECT tc.constraint_name::text, kcu.column_name::text
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
              ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema
            WHERE tc.constraint_type = 'FOREIGN KEY' AND tc.table_schema = $1 AND tc.table_name = $2
            ORDER BY tc.constraint_name, kcu.ordinal_position
            "#,
            &[&schema, &name],
        )?;
        let keys = Self::grouped(&rows)?;
        Ok(keys.iter().any(|(key_name, cols)| {
            let name_matches = constraint.map_or(true, |c| c == key_name);
            let cols_match = (constraint.is_some() && columns.is_empty())
                || cols.iter().map(String::as_str).eq(columns.iter().copied());
            name_matches && cols_match
        }))
    }

    fn has_database(&self, name: &str) -> Result<bool, AdapterError> {
        self.exists(
            "SELECT EXISTS (SELECT 1 FROM pg_database WHERE datname = $1)",
            &[&name],
        )
    }

    fn create_database(&self, name: &str) -> Result<(), AdapterError> {
        self.run(&format!("CREATE DATABASE {}", quote_ident(name)), &[])?;
        Ok(())
    }

    fn drop_database(&self, name: &str) -> Result<(), AdapterError> {
        self.run(&format!("DROP DATABASE IF EXISTS {}", quote_ident(name)), &[])?;
        Ok(())
    }

    fn has_schema(&self, name: &str) -> Result<bool, AdapterError> {
        self.exists(
            "SELECT EXISTS (SELECT 1 FROM pg_namespace WHERE nspname = $1)",
            &[&name],
        )
    }

    fn create_schema(&self, name: &str) -> Result<(), AdapterError> {
        self.run(&format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(name)), &[])?;
        Ok(())
    }

    fn drop_schema(&self, name: &str) -> Result<(), AdapterError> {
        self.run(&format!("DROP SCHEMA IF EXISTS {} CASCADE", quote_ident(name)), &[])?;
        Ok(())
    }

    fn disconnect(&self) -> Result<(), AdapterError> {
        if self.in_transaction.get() {
            self.rollback_transaction()?;
        }
        self.disconnected.set(true);
        Ok(())
    }

    fn ensure_version_table(&self, table: &str) -> Result<(), AdapterError> {
        self.run(&create_version_table(table).build(PostgresQueryBuilder), &[])?;
        self.run(&create_version_table_index(table).build(PostgresQueryBuilder), &[])?;
        Ok(())
    }

    fn fetch_version_log(&self, table: &str) -> Result<Vec<VersionLogEntry>, AdapterError> {
        let sql = format!(
            "SELECT version, migration_name, start_time::text, end_time::text, breakpoint FROM {}",
            quote_ident(table)
        );
        self.rows(&sql, &[])?
            .iter()
            .map(Self::entry_from_row)
            .collect()
    }

    fn insert_version(&self, table: &str, entry: &VersionLogEntry) -> Result<(), AdapterError> {
        let sql = format!(
            "INSERT INTO {} (version, migration_name, start_time, end_time, breakpoint) \
             VALUES ($1, $2, $3::text::timestamp, $4::text::timestamp, $5)",
            quote_ident(table)
        );
        let start_time = VersionLogEntry::format_timestamp(&entry.start_time);
        let end_time = VersionLogEntry::format_timestamp(&entry.end_time);
        self.run(
            &sql,
            &[&entry.version, &entry.migration_name, &start_time, &end_time, &entry.breakpoint],
        )?;
        Ok(())
    }

    fn remove_version(&self, table: &str, version: i64) -> Result<(), AdapterError> {
        let sql = format!("DELETE FROM {} WHERE version = $1", quote_ident(table));
        self.run(&sql, &[&version])?;
        Ok(())
    }

    fn set_breakpoint(&self, table: &str, version: i64, breakpoint: bool) -> Result<(), AdapterError> {
        // start_time is assigned to itself so stores with ON UPDATE timestamps keep it
        let sql = format!(
            "UPDATE {} SET breakpoint = $1, start_time = start_time WHERE version = $2",
            quote_ident(table)
        );
        self.run(&sql, &[&breakpoint, &version])?;
        Ok(())
    }

    fn reset_breakpoints(&self, table: &str) -> Result<u64, AdapterError> {
        let sql = format!(
            "UPDATE {} SET breakpoint = FALSE, start_time = start_time WHERE breakpoint = TRUE",
            quote_ident(table)
        );
        self.run(&sql, &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("tidemark_log"), "\"tidemark_log\"");
        assert_eq!(quote_ident("audit.tidemark_log"), "\"audit\".\"tidemark_log\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_split_table_defaults_to_public() {
        assert_eq!(
            PostgresAdapter::split_table("users"),
            ("public".to_string(), "users".to_string())
        );
        assert_eq!(
            PostgresAdapter::split_table("crm.users"),
            ("crm".to_string(), "users".to_string())
        );
    }
}
