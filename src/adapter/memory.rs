//! `MemoryAdapter` - an in-process `Adapter` implementation
//!
//! Keeps a small structural model of the store (tables, columns, indexes, foreign
//! keys, schemas, databases) plus any number of version-log tables, and records
//! every executed statement in a journal. DDL is recognised for the shapes the
//! `sea-query` Postgres builder and hand-written migrations produce; anything else
//! is journaled and otherwise ignored.
//!
//! Transactions snapshot the whole model on `BEGIN` and restore it on `ROLLBACK`,
//! so a failed migration leaves neither structures, journal lines, nor version-log
//! rows behind.

use crate::adapter::{Adapter, AdapterError, Dialect};
use crate::migration::VersionLogEntry;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

const IDENT: &str = r#"(?:"[^"]+"(?:\."[^"]+")?|[A-Za-z_][\w.]*)"#;

static CREATE_TABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?is)^\s*CREATE\s+(?:TEMP(?:ORARY)?\s+)?TABLE\s+(IF\s+NOT\s+EXISTS\s+)?({IDENT})\s*\((.*)\)\s*;?\s*$"
    ))
    .expect("valid CREATE TABLE pattern")
});
static DROP_TABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?is)^\s*DROP\s+TABLE\s+(IF\s+EXISTS\s+)?({IDENT})"))
        .expect("valid DROP TABLE pattern")
});
static ALTER_TABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?is)^\s*ALTER\s+TABLE\s+(?:IF\s+EXISTS\s+)?({IDENT})\s+(.*?)\s*;?\s*$"))
        .expect("valid ALTER TABLE pattern")
});
static CREATE_INDEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?is)^\s*CREATE\s+(?:UNIQUE\s+)?INDEX\s+(IF\s+NOT\s+EXISTS\s+)?({IDENT})\s+ON\s+({IDENT})\s*(?:USING\s+\w+\s*)?\((.*?)\)"
    ))
    .expect("valid CREATE INDEX pattern")
});
static DROP_INDEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?is)^\s*DROP\s+INDEX\s+(IF\s+EXISTS\s+)?({IDENT})"))
        .expect("valid DROP INDEX pattern")
});
static SCHEMA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?is)^\s*(CREATE|DROP)\s+SCHEMA\s+(?:IF\s+(?:NOT\s+)?EXISTS\s+)?({IDENT})"
    ))
    .expect("valid SCHEMA pattern")
});
static DATABASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?is)^\s*(CREATE|DROP)\s+DATABASE\s+(?:IF\s+(?:NOT\s+)?EXISTS\s+)?({IDENT})"
    ))
    .expect("valid DATABASE pattern")
});
static INSERT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?is)^\s*INSERT\s+INTO\s+({IDENT})")).expect("valid INSERT pattern")
});
static FOREIGN_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?is)^(?:CONSTRAINT\s+({IDENT})\s+)?FOREIGN\s+KEY\s*\((.*?)\)"
    ))
    .expect("valid FOREIGN KEY pattern")
});

fn unquote(ident: &str) -> String {
    ident.replace('"', "")
}

fn split_columns(list: &str) -> Vec<String> {
    list.split(',')
        .map(|c| unquote(c.split_whitespace().next().unwrap_or_default()))
        .filter(|c| !c.is_empty())
        .collect()
}

/// Split on commas that are not nested inside parentheses
fn split_top_level(body: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for ch in body.chars() {
        match ch {
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

#[derive(Debug, Clone, Default)]
struct TableState {
    columns: Vec<String>,
    indexes: BTreeMap<String, Vec<String>>,
    foreign_keys: BTreeMap<String, Vec<String>>,
    rows: u64,
}

#[derive(Debug, Clone, Default)]
struct StoreState {
    tables: BTreeMap<String, TableState>,
    schemas: BTreeSet<String>,
    databases: BTreeSet<String>,
    version_tables: BTreeMap<String, BTreeMap<i64, VersionLogEntry>>,
    journal: Vec<String>,
}

/// In-process adapter used by tests and dry runs
pub struct MemoryAdapter {
    state: Mutex<StoreState>,
    snapshot: Mutex<Option<StoreState>>,
    failures: Mutex<Vec<String>>,
    transactional: bool,
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAdapter {
    /// Create an empty, transactional store
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            snapshot: Mutex::new(None),
            failures: Mutex::new(Vec::new()),
            transactional: true,
        }
    }

    /// Create a store that reports no transaction support
    pub fn without_transactions() -> Self {
        Self {
            transactional: false,
            ..Self::new()
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, AdapterError> {
        self.state
            .lock()
            .map_err(|e| AdapterError::Other(format!("Failed to lock memory store: {e}")))
    }

    fn lock_snapshot(&self) -> Result<MutexGuard<'_, Option<StoreState>>, AdapterError> {
        self.snapshot
            .lock()
            .map_err(|e| AdapterError::Other(format!("Failed to lock memory snapshot: {e}")))
    }

    /// Make every statement containing `pattern` fail
    pub fn fail_on(&self, pattern: impl Into<String>) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push(pattern.into());
        }
    }

    /// Stop injecting failures
    pub fn clear_failures(&self) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.clear();
        }
    }

    /// Every statement executed (and not rolled back), oldest first
    pub fn journal(&self) -> Vec<String> {
        self.lock().map(|s| s.journal.clone()).unwrap_or_default()
    }

    /// Names of all tables in the model
    pub fn tables(&self) -> Vec<String> {
        self.lock()
            .map(|s| s.tables.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of `INSERT` statements run against a table
    pub fn row_inserts(&self, table: &str) -> u64 {
        self.lock()
            .ok()
            .and_then(|s| s.tables.get(table).map(|t| t.rows))
            .unwrap_or(0)
    }

    /// Whether a transaction is currently open
    pub fn in_transaction(&self) -> bool {
        self.lock_snapshot().map(|s| s.is_some()).unwrap_or(false)
    }

    /// Seed a version-log row directly, bypassing migration execution
    ///
    /// # Errors
    ///
    /// Returns `AdapterError` if the store cannot be locked.
    pub fn insert_log_entry(&self, table: &str, entry: VersionLogEntry) -> Result<(), AdapterError> {
        let mut state = self.lock()?;
        Self::ensure_log(&mut state, table);
        if let Some(log) = state.version_tables.get_mut(table) {
            log.insert(entry.version, entry);
        }
        Ok(())
    }

    fn ensure_log(state: &mut StoreState, table: &str) {
        if !state.version_tables.contains_key(table) {
            state.version_tables.insert(table.to_string(), BTreeMap::new());
            state.tables.insert(
                table.to_string(),
                TableState {
                    columns: ["version", "migration_name", "start_time", "end_time", "breakpoint"]
                        .iter()
                        .map(|c| (*c).to_string())
                        .collect(),
                    ..TableState::default()
                },
            );
        }
    }

    fn log_mut<'a>(
        state: &'a mut StoreState,
        table: &str,
    ) -> Result<&'a mut BTreeMap<i64, VersionLogEntry>, AdapterError> {
        state
            .version_tables
            .get_mut(table)
            .ok_or_else(|| AdapterError::Query(format!("relation \"{table}\" does not exist")))
    }

    fn check_failure(&self, sql: &str) -> Result<(), AdapterError> {
        let failures = self
            .failures
            .lock()
            .map_err(|e| AdapterError::Other(format!("Failed to lock failure list: {e}")))?;
        if failures.iter().any(|p| sql.contains(p.as_str())) {
            return Err(AdapterError::Query(format!("simulated failure executing: {sql}")));
        }
        Ok(())
    }

    fn apply(state: &mut StoreState, sql: &str) -> Result<u64, AdapterError> {
        if let Some(caps) = CREATE_TABLE.captures(sql) {
            let if_not_exists = caps.get(1).is_some();
            let name = unquote(&caps[2]);
            if state.tables.contains_key(&name) {
                if if_not_exists {
                    return Ok(0);
                }
                return Err(AdapterError::Query(format!("relation \"{name}\" already exists")));
            }
            let mut table = TableState::default();
            for element in split_top_level(&caps[3]) {
                Self::apply_table_element(&name, &mut table, &element);
            }
            state.tables.insert(name, table);
            return Ok(0);
        }

        if let Some(caps) = DROP_TABLE.captures(sql) {
            let name = unquote(&caps[2]);
            if state.tables.remove(&name).is_none() && caps.get(1).is_none() {
                return Err(AdapterError::Query(format!("table \"{name}\" does not exist")));
            }
            return Ok(0);
        }

        if let Some(caps) = ALTER_TABLE.captures(sql) {
            let name = unquote(&caps[1]);
            let action = caps[2].to_string();
            return Self::apply_alter(state, &name, &action);
        }

        if let Some(caps) = CREATE_INDEX.captures(sql) {
            let if_not_exists = caps.get(1).is_some();
            let index = unquote(&caps[2]);
            let table_name = unquote(&caps[3]);
            let columns = split_columns(&caps[4]);
            let table = state.tables.get_mut(&table_name).ok_or_else(|| {
                AdapterError::Query(format!("relation \"{table_name}\" does not exist"))
            })?;
            if table.indexes.contains_key(&index) && !if_not_exists {
                return Err(AdapterError::Query(format!("relation \"{index}\" already exists")));
            }
            table.indexes.insert(index, columns);
            return Ok(0);
        }

        if let Some(caps) = DROP_INDEX.captures(sql) {
            let index = unquote(&caps[2]);
            let removed = state
                .tables
                .values_mut()
                .any(|t| t.indexes.remove(&index).is_some());
            if !removed && caps.get(1).is_none() {
                return Err(AdapterError::Query(format!("index \"{index}\" does not exist")));
            }
            return Ok(0);
        }

        if let Some(caps) = SCHEMA.captures(sql) {
            let name = unquote(&caps[2]);
            if caps[1].eq_ignore_ascii_case("CREATE") {
                state.schemas.insert(name);
            } else {
                state.schemas.remove(&name);
                let prefix = format!("{name}.");
                state.tables.retain(|t, _| !t.starts_with(&prefix));
            }
            return Ok(0);
        }

        if let Some(caps) = DATABASE.captures(sql) {
            let name = unquote(&caps[2]);
            if caps[1].eq_ignore_ascii_case("CREATE") {
                if !state.databases.insert(name.clone()) {
                    return Err(AdapterError::Query(format!("database \"{name}\" already exists")));
                }
            } else {
                state.databases.remove(&name);
            }
            return Ok(0);
        }

        if let Some(caps) = INSERT.captures(sql) {
            let name = unquote(&caps[1]);
            let table = state.tables.get_mut(&name).ok_or_else(|| {
                AdapterError::Query(format!("relation \"{name}\" does not exist"))
            })?;
            table.rows += 1;
            return Ok(1);
        }

        Ok(0)
    }

    fn apply_table_element(table_name: &str, table: &mut TableState, element: &str) {
        if let Some(caps) = FOREIGN_KEY.captures(element) {
            let columns = split_columns(&caps[2]);
            let name = caps
                .get(1)
                .map(|m| unquote(m.as_str()))
                .unwrap_or_else(|| format!("{}_{}_fkey", table_name, columns.join("_")));
            table.foreign_keys.insert(name, columns);
            return;
        }

        let first = element
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();
        if matches!(first.as_str(), "PRIMARY" | "UNIQUE" | "CHECK" | "CONSTRAINT" | "EXCLUDE") {
            return;
        }

        let column = unquote(element.split_whitespace().next().unwrap_or_default());
        if column.is_empty() {
            return;
        }
        if element.to_ascii_uppercase().contains(" REFERENCES ") {
            table
                .foreign_keys
                .insert(format!("{table_name}_{column}_fkey"), vec![column.clone()]);
        }
        table.columns.push(column);
    }

    fn apply_alter(state: &mut StoreState, name: &str, action: &str) -> Result<u64, AdapterError> {
        let missing = || AdapterError::Query(format!("relation \"{name}\" does not exist"));
        let words: Vec<&str> = action.split_whitespace().collect();
        let upper: Vec<String> = words.iter().map(|w| w.to_ascii_uppercase()).collect();
        let upper: Vec<&str> = upper.iter().map(String::as_str).collect();

        match upper.as_slice() {
            ["RENAME", "TO", ..] => {
                let table = state.tables.remove(name).ok_or_else(missing)?;
                state.tables.insert(unquote(words[2]), table);
            }
            ["RENAME", "COLUMN", _, "TO", ..] => {
                let table = state.tables.get_mut(name).ok_or_else(missing)?;
                let old = unquote(words[2]);
                let new = unquote(words[4]);
                match table.columns.iter_mut().find(|c| **c == old) {
                    Some(column) => *column = new,
                    None => {
                        return Err(AdapterError::Query(format!("column \"{old}\" does not exist")))
                    }
                }
            }
            ["ADD", "COLUMN", ..] | ["ADD", ..] if !matches!(upper.get(1), Some(&"CONSTRAINT") | Some(&"FOREIGN")) => {
                let table = state.tables.get_mut(name).ok_or_else(missing)?;
                let rest = if upper.get(1) == Some(&"COLUMN") { &words[2..] } else { &words[1..] };
                let rest = if rest.len() > 3
                    && rest[0].eq_ignore_ascii_case("IF")
                    && rest[1].eq_ignore_ascii_case("NOT")
                {
                    &rest[3..]
                } else {
                    rest
                };
                let column = rest.first().map(|c| unquote(c)).unwrap_or_default();
                if table.columns.contains(&column) {
                    return Err(AdapterError::Query(format!("column \"{column}\" already exists")));
                }
                let definition = rest.join(" ");
                Self::apply_table_element(name, table, &definition);
            }
            ["ADD", ..] => {
                let table = state.tables.get_mut(name).ok_or_else(missing)?;
                Self::apply_table_element(name, table, &words[1..].join(" "));
            }
            ["DROP", "CONSTRAINT", ..] => {
                let table = state.tables.get_mut(name).ok_or_else(missing)?;
                let constraint = unquote(words.last().copied().unwrap_or_default());
                table.foreign_keys.remove(&constraint);
            }
            ["DROP", "COLUMN", ..] => {
                let table = state.tables.get_mut(name).ok_or_else(missing)?;
                let column = unquote(words.last().copied().unwrap_or_default());
                let before = table.columns.len();
                table.columns.retain(|c| *c != column);
                if table.columns.len() == before {
                    return Err(AdapterError::Query(format!("column \"{column}\" does not exist")));
                }
                table.indexes.retain(|_, cols| !cols.contains(&column));
                table.foreign_keys.retain(|_, cols| !cols.contains(&column));
            }
            _ => {
                state.tables.get(name).ok_or_else(missing)?;
            }
        }
        Ok(0)
    }
}

impl Adapter for MemoryAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn has_transactions(&self) -> bool {
        self.transactional
    }

    fn begin_transaction(&self) -> Result<(), AdapterError> {
        if !self.transactional {
            return Err(AdapterError::Unsupported("transactions".to_string()));
        }
        let mut snapshot = self.lock_snapshot()?;
        if snapshot.is_some() {
            return Err(AdapterError::Transaction("A transaction is already open".to_string()));
        }
        *snapshot = Some(self.lock()?.clone());
        Ok(())
    }

    fn commit_transaction(&self) -> Result<(), AdapterError> {
        let mut snapshot = self.lock_snapshot()?;
        if snapshot.take().is_none() {
            return Err(AdapterError::Transaction("No open transaction to commit".to_string()));
        }
        Ok(())
    }

    fn rollback_transaction(&self) -> Result<(), AdapterError> {
        let mut snapshot = self.lock_snapshot()?;
        match snapshot.take() {
            Some(saved) => {
                *self.lock()? = saved;
                Ok(())
            }
            None => Err(AdapterError::Transaction("No open transaction to roll back".to_string())),
        }
    }

    fn execute(&self, sql: &str) -> Result<u64, AdapterError> {
        self.check_failure(sql)?;
        let mut state = self.lock()?;
        let affected = Self::apply(&mut state, sql)?;
        state.journal.push(sql.trim().to_string());
        Ok(affected)
    }

    fn has_table(&self, table: &str) -> Result<bool, AdapterError> {
        Ok(self.lock()?.tables.contains_key(table))
    }

    fn has_column(&self, table: &str, column: &str) -> Result<bool, AdapterError> {
        Ok(self
            .lock()?
            .tables
            .get(table)
            .is_some_and(|t| t.columns.iter().any(|c| c == column)))
    }

    fn has_index(&self, table: &str, columns: &[&str]) -> Result<bool, AdapterError> {
        Ok(self.lock()?.tables.get(table).is_some_and(|t| {
            t.indexes
                .values()
                .any(|cols| cols.iter().map(String::as_str).eq(columns.iter().copied()))
        }))
    }

    fn has_index_by_name(&self, table: &str, index_name: &str) -> Result<bool, AdapterError> {
        Ok(self
            .lock()?
            .tables
            .get(table)
            .is_some_and(|t| t.indexes.contains_key(index_name)))
    }

    fn has_foreign_key(
        &self,
        table: &str,
        columns: &[&str],
        constraint: Option<&str>,
    ) -> Result<bool, AdapterError> {
        Ok(self.lock()?.tables.get(table).is_some_and(|t| {
            t.foreign_keys.iter().any(|(name, cols)| {
                let name_matches = constraint.map_or(true, |c| c == name.as_str());
                let cols_match = (constraint.is_some() && columns.is_empty())
                    || cols.iter().map(String::as_str).eq(columns.iter().copied());
                name_matches && cols_match
            })
        }))
    }

    fn has_database(&self, name: &str) -> Result<bool, AdapterError> {
        Ok(self.lock()?.databases.contains(name))
    }

    fn create_database(&self, name: &str) -> Result<(), AdapterError> {
        self.execute(&format!("CREATE DATABASE \"{name}\""))?;
        Ok(())
    }

    fn drop_database(&self, name: &str) -> Result<(), AdapterError> {
        self.execute(&format!("DROP DATABASE IF EXISTS \"{name}\""))?;
        Ok(())
    }

    fn has_schema(&self, name: &str) -> Result<bool, AdapterError> {
        Ok(self.lock()?.schemas.contains(name))
    }

    fn create_schema(&self, name: &str) -> Result<(), AdapterError> {
        self.execute(&format!("CREATE SCHEMA IF NOT EXISTS \"{name}\""))?;
        Ok(())
    }

    fn drop_schema(&self, name: &str) -> Result<(), AdapterError> {
        self.execute(&format!("DROP SCHEMA IF EXISTS \"{name}\" CASCADE"))?;
        Ok(())
    }

    fn disconnect(&self) -> Result<(), AdapterError> {
        if self.in_transaction() {
            self.rollback_transaction()?;
        }
        Ok(())
    }

    fn ensure_version_table(&self, table: &str) -> Result<(), AdapterError> {
        Self::ensure_log(&mut *self.lock()?, table);
        Ok(())
    }

    fn fetch_version_log(&self, table: &str) -> Result<Vec<VersionLogEntry>, AdapterError> {
        let mut state = self.lock()?;
        Ok(Self::log_mut(&mut state, table)?.values().cloned().collect())
    }

    fn insert_version(&self, table: &str, entry: &VersionLogEntry) -> Result<(), AdapterError> {
        let mut state = self.lock()?;
        let log = Self::log_mut(&mut state, table)?;
        if log.contains_key(&entry.version) {
            return Err(AdapterError::Query(format!(
                "duplicate key value violates unique constraint: version {}",
                entry.version
            )));
        }
        log.insert(entry.version, entry.clone());
        Ok(())
    }

    fn remove_version(&self, table: &str, version: i64) -> Result<(), AdapterError> {
        let mut state = self.lock()?;
        Self::log_mut(&mut state, table)?.remove(&version);
        Ok(())
    }

    fn set_breakpoint(&self, table: &str, version: i64, breakpoint: bool) -> Result<(), AdapterError> {
        let mut state = self.lock()?;
        if let Some(entry) = Self::log_mut(&mut state, table)?.get_mut(&version) {
            entry.breakpoint = breakpoint;
        }
        Ok(())
    }

    fn reset_breakpoints(&self, table: &str) -> Result<u64, AdapterError> {
        let mut state = self.lock()?;
        let mut cleared = 0;
        for entry in Self::log_mut(&mut state, table)?.values_mut() {
            if entry.breakpoint {
                entry.breakpoint = false;
                cleared += 1;
            }
        }
        Ok(cleared)
    }
}
