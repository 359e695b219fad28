//! Version-log table definition

use sea_query::{ColumnDef, Expr, Index, IndexCreateStatement, Table, TableCreateStatement};

/// Default name of the version-log table
pub const DEFAULT_VERSION_TABLE: &str = "tidemark_log";

/// Build the `CREATE TABLE IF NOT EXISTS` statement for the version log
///
/// Columns:
/// - `version` (primary key, `YYYYMMDDHHMMSS`)
/// - `migration_name`
/// - `start_time` / `end_time` bracketing execution of `up`
/// - `breakpoint` (defaults to false)
pub fn create_version_table(table: &str) -> TableCreateStatement {
    Table::create()
        .table(table.to_string())
        .if_not_exists()
        .col(
            ColumnDef::new("version")
                .big_integer()
                .not_null()
                .primary_key()
        )
        .col(
            ColumnDef::new("migration_name")
                .string()
                .string_len(100)
                .null()
        )
        .col(
            ColumnDef::new("start_time")
                .timestamp()
                .null()
        )
        .col(
            ColumnDef::new("end_time")
                .timestamp()
                .null()
        )
        .col(
            ColumnDef::new("breakpoint")
                .boolean()
                .not_null()
                .default(false)
        )
        .to_owned()
}

/// Index on `start_time`, used when the environment orders by execution time
pub fn create_version_table_index(table: &str) -> IndexCreateStatement {
    Index::create()
        .if_not_exists()
        .name(format!("idx_{table}_start_time"))
        .table(table.to_string())
        .col(Expr::col("start_time"))
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_query::PostgresQueryBuilder;

    #[test]
    fn test_create_version_table_sql() {
        let sql = create_version_table("tidemark_log").build(PostgresQueryBuilder);
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS \"tidemark_log\""));
        assert!(sql.contains("\"version\" bigint"));
        assert!(sql.contains("\"breakpoint\" bool"));
    }

    #[test]
    fn test_create_version_table_index_sql() {
        let sql = create_version_table_index("custom_log").build(PostgresQueryBuilder);
        assert!(sql.contains("idx_custom_log_start_time"));
        assert!(sql.contains("\"custom_log\""));
    }
}
