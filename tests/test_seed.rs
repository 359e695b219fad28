//! Seed selection, ordering and re-runs

mod common;

use common::*;
use tidemark::migration::{MigrateOptions, MigrationRegistry, SeedRegistry, Target, VersionOrder};
use tidemark::MigrationError;

fn tables_migrated() -> (std::sync::Arc<tidemark::MemoryAdapter>, tidemark::Environment) {
    let (adapter, env) = memory_env(VersionOrder::Creation);
    let registry = MigrationRegistry::new()
        .with(TableMigration::new(20240101000000, "CreateUsers", "users"))
        .unwrap()
        .with(TableMigration::new(20240102000000, "CreatePosts", "posts"))
        .unwrap();
    migrator(&registry)
        .migrate(&env, &Target::Latest, MigrateOptions::default())
        .unwrap();
    (adapter, env)
}

fn seeds() -> SeedRegistry {
    SeedRegistry::new()
        .with(RowSeed::new("PostSeeder", "posts").after("UserSeeder"))
        .unwrap()
        .with(RowSeed::new("UserSeeder", "users"))
        .unwrap()
        .with(RowSeed::new("AuditSeeder", "users").skipped())
        .unwrap()
}

#[test]
fn test_all_seeds_run_in_dependency_order() {
    let (adapter, env) = tables_migrated();
    let mut migrator = seeded_migrator(&MigrationRegistry::new(), &seeds());

    let ran = migrator.seed(&env, &[]).unwrap();

    assert_eq!(ran, 2);
    let lines = migrator.output().lines();
    assert_eq!(lines[0], "== AuditSeeder: skipped");
    assert_eq!(lines[1], "== UserSeeder: seeding");
    assert!(lines[2].starts_with("== UserSeeder: seeded "));
    assert_eq!(lines[3], "== PostSeeder: seeding");
    assert_eq!(adapter.row_inserts("users"), 1);
    assert_eq!(adapter.row_inserts("posts"), 1);
}

#[test]
fn test_named_seeds_run_in_given_order() {
    let (adapter, env) = tables_migrated();
    let mut migrator = seeded_migrator(&MigrationRegistry::new(), &seeds());

    migrator
        .seed(&env, &["PostSeeder".to_string(), "PostSeeder".to_string()])
        .unwrap();

    assert_eq!(adapter.row_inserts("posts"), 2);
    assert_eq!(adapter.row_inserts("users"), 0);
}

#[test]
fn test_unknown_seed_runs_nothing() {
    let (adapter, env) = tables_migrated();
    let mut migrator = seeded_migrator(&MigrationRegistry::new(), &seeds());

    let err = migrator
        .seed(&env, &["UserSeeder".to_string(), "MissingSeeder".to_string()])
        .unwrap_err();

    assert!(matches!(err, MigrationError::UnknownSeed(_)));
    assert_eq!(err.to_string(), "The seed class \"MissingSeeder\" does not exist");
    assert_eq!(adapter.row_inserts("users"), 0);
}

#[test]
fn test_seeds_are_not_logged_and_rerun() {
    let (adapter, env) = tables_migrated();
    let before = log_shape(&env);
    let mut migrator = seeded_migrator(&MigrationRegistry::new(), &seeds());

    migrator.seed(&env, &[]).unwrap();
    migrator.seed(&env, &[]).unwrap();

    assert_eq!(adapter.row_inserts("users"), 2);
    assert_eq!(log_shape(&env), before);
}

#[test]
fn test_failing_seed_keeps_earlier_ones() {
    let (adapter, env) = tables_migrated();
    adapter.fail_on("INSERT INTO posts");
    let mut migrator = seeded_migrator(&MigrationRegistry::new(), &seeds());

    let err = migrator.seed(&env, &[]).unwrap_err();

    assert!(matches!(err, MigrationError::ExecutionFailed { .. }));
    assert_eq!(adapter.row_inserts("users"), 1);
    assert_eq!(adapter.row_inserts("posts"), 0);
}
