//! Migration and seed file discovery and naming

use crate::migration::record::VERSION_FORMAT;
use crate::migration::MigrationError;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

static MIGRATION_FILE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^m?(\d{14})_([a-z0-9_]+)\.rs$").expect("valid migration file pattern")
});

static SEED_FILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z][A-Za-z0-9]*)\.rs$").expect("valid seed file pattern"));

/// Files that sit next to units without being units themselves
const IGNORED_FILES: [&str; 2] = ["mod.rs", "lib.rs"];

/// Represents a discovered migration file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    /// Path to the migration file
    pub path: PathBuf,

    /// Migration version (timestamp: YYYYMMDDHHMMSS)
    pub version: i64,

    /// Normalised (UpperCamelCase) migration name
    pub name: String,
}

impl MigrationFile {
    /// Parse a migration file name to extract version and normalised name
    ///
    /// Expected format: `m{YYYYMMDDHHMMSS}_{name}.rs` (the leading `m` is optional)
    ///
    /// # Example
    /// - `m20240120120000_create_users_table.rs` → (20240120120000, "CreateUsersTable")
    #[must_use]
    pub fn parse_filename(filename: &str) -> Option<(i64, String)> {
        let caps = MIGRATION_FILE.captures(filename)?;
        let version = caps[1].parse::<i64>().ok()?;
        Some((version, normalize_name(&caps[2])))
    }
}

/// Represents a discovered seed file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedFile {
    pub path: PathBuf,
    pub name: String,
}

/// Convert a snake_case label to UpperCamelCase
///
/// Already-camel input is returned unchanged, so unit names in either style
/// compare equal after normalisation.
#[must_use]
pub fn normalize_name(label: &str) -> String {
    label
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// Convert an UpperCamelCase name to snake_case
#[must_use]
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else if ch == '-' || ch == ' ' {
            out.push('_');
        } else {
            out.push(ch);
        }
    }
    out
}

/// Whether a name can be used for a new migration
#[must_use]
pub fn is_valid_migration_name(name: &str) -> bool {
    let snake = snake_case(name);
    !snake.is_empty()
        && snake.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && snake.starts_with(|c: char| c.is_ascii_lowercase())
}

/// Version string for a migration created at `now`
#[must_use]
pub fn version_for(now: &DateTime<Utc>) -> String {
    now.format(VERSION_FORMAT).to_string()
}

/// File name for a new migration
#[must_use]
pub fn migration_file_name(version: &str, name: &str) -> String {
    format!("m{version}_{}.rs", snake_case(name))
}

/// Source template for a new migration unit
#[must_use]
pub fn migration_template(version: &str, name: &str) -> String {
    let type_name = normalize_name(&snake_case(name));
    format!(
        r#"use tidemark::migration::{{Migration, SchemaManager}};
use tidemark::AdapterError;

pub struct {type_name};

impl Migration for {type_name} {{
    fn version(&self) -> i64 {{
        {version}
    }}

    fn name(&self) -> &str {{
        "{type_name}"
    }}

    fn up(&self, _manager: &SchemaManager<'_>) -> Result<(), AdapterError> {{
        Ok(())
    }}

    fn down(&self, _manager: &SchemaManager<'_>) -> Result<(), AdapterError> {{
        Ok(())
    }}
}}
"#
    )
}

fn read_rs_files(dir: &Path) -> Result<Vec<(PathBuf, String)>, MigrationError> {
    if !dir.is_dir() {
        return Err(MigrationError::DirectoryNotFound(dir.to_path_buf()));
    }

    let entries = fs::read_dir(dir).map_err(|source| MigrationError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| MigrationError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();

        // Only process .rs files
        if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("rs") {
            continue;
        }
        let Some(filename) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            return Err(MigrationError::InvalidFileName(path));
        };
        if IGNORED_FILES.contains(&filename.as_str()) {
            continue;
        }
        files.push((path, filename));
    }

    files.sort();
    Ok(files)
}

/// Discover all migration files in a directory
///
/// Returns files sorted by version (ascending). Duplicates are not checked here;
/// the loader checks them across every configured directory.
///
/// # Errors
///
/// Returns `DirectoryNotFound` for a missing directory, `Io` when it cannot be
/// read, and `InvalidFileName` for a `.rs` file that does not follow the naming scheme.
pub fn discover_migrations(migrations_dir: &Path) -> Result<Vec<MigrationFile>, MigrationError> {
    let mut migrations = Vec::new();
    for (path, filename) in read_rs_files(migrations_dir)? {
        let (version, name) = MigrationFile::parse_filename(&filename)
            .ok_or_else(|| MigrationError::InvalidFileName(path.clone()))?;
        migrations.push(MigrationFile { path, version, name });
    }
    migrations.sort_by(|a, b| a.version.cmp(&b.version).then_with(|| a.path.cmp(&b.path)));
    Ok(migrations)
}

/// Discover all seed files in a directory, sorted by name
///
/// # Errors
///
/// Returns `DirectoryNotFound` for a missing directory, `Io` when it cannot be
/// read, and `InvalidFileName` for a `.rs` file whose stem is not UpperCamelCase.
pub fn discover_seeds(seeds_dir: &Path) -> Result<Vec<SeedFile>, MigrationError> {
    let mut seeds = Vec::new();
    for (path, filename) in read_rs_files(seeds_dir)? {
        let caps = SEED_FILE
            .captures(&filename)
            .ok_or_else(|| MigrationError::InvalidFileName(path.clone()))?;
        let name = caps[1].to_string();
        seeds.push(SeedFile { path, name });
    }
    seeds.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(seeds)
}
