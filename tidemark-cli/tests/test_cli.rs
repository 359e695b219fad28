//! Tests for argument parsing and command handlers against a memory environment

use clap::Parser;
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use tidemark::migration::{
    MigrationRegistry, MigrationState, MigrationStatus, SchemaManager, SeedRegistry, StatusLine,
};
use tidemark::{AdapterError, Migration, TidemarkConfig};
use tidemark_cli::commands::{create, execute, init, status_exit_code};
use tidemark_cli::{Cli, Commands, Registries, EXIT_MISSING, EXIT_OK, EXIT_PENDING};

struct CreateWidgets;

impl Migration for CreateWidgets {
    fn version(&self) -> i64 {
        20240501120000
    }
    fn name(&self) -> &str {
        "CreateWidgets"
    }
    fn up(&self, manager: &SchemaManager<'_>) -> Result<(), AdapterError> {
        manager.execute("CREATE TABLE widgets (id integer)").map(|_| ())
    }
    fn down(&self, manager: &SchemaManager<'_>) -> Result<(), AdapterError> {
        manager.execute("DROP TABLE widgets").map(|_| ())
    }
}

/// Config with a memory `testing` environment and no migration directories
fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    let config = format!(
        r#"
[paths]
migrations = ["{0}/db/migrations"]
seeds = ["{0}/db/seeds"]

[environments]
default_environment = "testing"

[environments.testing]
adapter = "memory"
"#,
        dir.path().display()
    );
    fs::write(dir.path().join("tidemark.toml"), config).unwrap();
    dir
}

fn registries() -> Registries {
    Registries {
        migrations: MigrationRegistry::new().with(CreateWidgets).unwrap(),
        seeds: SeedRegistry::new(),
    }
}

fn run(dir: &Path, args: &[&str]) -> anyhow::Result<i32> {
    let config = dir.join("tidemark.toml");
    let mut argv = vec!["tidemark", "--quiet", "--config", config.to_str().unwrap()];
    argv.extend_from_slice(args);
    execute(&Cli::try_parse_from(argv).unwrap(), &registries())
}

#[test]
fn test_status_reports_pending() {
    let dir = project();
    assert_eq!(run(dir.path(), &["status"]).unwrap(), EXIT_PENDING);
    assert_eq!(run(dir.path(), &["status", "--format", "json"]).unwrap(), EXIT_PENDING);
}

#[test]
fn test_migrate_rollback_and_breakpoint_succeed() {
    let dir = project();
    assert_eq!(run(dir.path(), &["migrate"]).unwrap(), EXIT_OK);
    assert_eq!(run(dir.path(), &["migrate", "--dry-run"]).unwrap(), EXIT_OK);
    assert_eq!(run(dir.path(), &["rollback", "--steps", "1"]).unwrap(), EXIT_OK);
    assert_eq!(run(dir.path(), &["breakpoint", "--remove-all"]).unwrap(), EXIT_OK);
}

#[test]
fn test_rollback_on_fresh_environment_is_noop() {
    // Each invocation opens a new memory store, so the log is empty here
    let dir = project();
    assert_eq!(run(dir.path(), &["rollback", "-t", "20121225000000"]).unwrap(), EXIT_OK);
    assert_eq!(run(dir.path(), &["rollback", "--dry-run"]).unwrap(), EXIT_OK);
}

#[test]
fn test_invalid_date_is_error() {
    let dir = project();
    assert!(run(dir.path(), &["migrate", "-d", "next tuesday"]).is_err());
}

#[test]
fn test_unknown_seed_and_environment() {
    let dir = project();
    let err = run(dir.path(), &["seed", "-s", "GhostSeeder"]).unwrap_err();
    assert_eq!(err.to_string(), "The seed class \"GhostSeeder\" does not exist");

    let err = run(dir.path(), &["-e", "staging", "status"]).unwrap_err();
    assert_eq!(err.to_string(), "The environment \"staging\" does not exist");
}

#[test]
fn test_conflicting_targets_rejected() {
    assert!(Cli::try_parse_from(["tidemark", "migrate", "-t", "1", "-d", "20120101"]).is_err());
    assert!(Cli::try_parse_from(["tidemark", "rollback", "--steps", "2", "-t", "1"]).is_err());
    assert!(Cli::try_parse_from(["tidemark", "breakpoint", "--set", "--unset"]).is_err());

    let cli = Cli::try_parse_from(["tidemark", "rollback", "--force", "-e", "prod"]).unwrap();
    assert_eq!(cli.environment.as_deref(), Some("prod"));
    assert!(matches!(cli.command, Commands::Rollback { force: true, .. }));
}

#[test]
fn test_status_exit_codes() {
    let line = |status, missing| StatusLine {
        status,
        id: "20240501120000".to_string(),
        name: "CreateWidgets".to_string(),
        missing,
        breakpoint: false,
    };
    let mut status = MigrationStatus {
        pending_count: 0,
        missing_count: 0,
        total_count: 1,
        lines: vec![line(MigrationState::Up, false)],
    };
    assert_eq!(status_exit_code(&status), EXIT_OK);

    status.pending_count = 1;
    assert_eq!(status_exit_code(&status), EXIT_PENDING);

    status.missing_count = 1;
    assert_eq!(status_exit_code(&status), EXIT_MISSING);
}

#[test]
fn test_create_writes_template_once() {
    let dir = TempDir::new().unwrap();
    let migrations = dir.path().join("migrations");

    let path = create(&migrations, "CreateUsersTable").unwrap();
    let file_name = path.file_name().unwrap().to_str().unwrap().to_string();
    assert!(file_name.starts_with('m'));
    assert!(file_name.ends_with("_create_users_table.rs"));
    let contents = fs::read_to_string(&path).unwrap();
    assert!(contents.contains("pub struct CreateUsersTable;"));

    let err = create(&migrations, "create_users_table").unwrap_err();
    assert!(err.to_string().contains("already exists"));

    assert!(create(&migrations, "1bad name").is_err());
}

#[test]
fn test_init_writes_loadable_config() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tidemark.toml");

    assert_eq!(init(&path).unwrap(), EXIT_OK);
    assert!(init(&path).is_err());

    let config = TidemarkConfig::load(&path).unwrap();
    assert_eq!(config.default_environment(), "development");
    assert!(config.environment("development").unwrap().url.is_some());
}
