//! Status reconciliation of loaded migrations and the version log

mod common;

use common::*;
use tidemark::migration::{MigrateOptions, MigrationState, Target, VersionOrder};

#[test]
fn test_missing_and_pending_lines() {
    let (adapter, env) = memory_env(VersionOrder::Creation);
    log_entry(&adapter, 20100101000000, "Vanished", at(2010, 1, 1, 0, 0, 0), true);
    let mut migrator = migrator(&standard_registry());
    migrator
        .migrate(&env, &Target::Version(20120111235330), MigrateOptions::default())
        .unwrap();

    let status = migrator.status(&env).unwrap();

    let ids: Vec<&str> = status.lines.iter().map(|l| l.id.as_str()).collect();
    assert_eq!(ids, ["20100101000000", "20120111235330", "20120116183504"]);

    let missing = status.line(20100101000000).unwrap();
    assert_eq!(missing.status, MigrationState::Up);
    assert!(missing.missing);
    assert!(missing.breakpoint);

    assert_eq!(status.line(20120111235330).unwrap().status, MigrationState::Up);
    assert_eq!(status.line(20120116183504).unwrap().status, MigrationState::Down);
    assert_eq!((status.pending_count, status.missing_count), (1, 1));
}

#[test]
fn test_up_to_date_after_full_migrate() {
    let (_adapter, env) = memory_env(VersionOrder::Creation);
    let mut migrator = migrator(&standard_registry());
    assert!(migrator.status(&env).unwrap().has_pending());

    migrator.migrate(&env, &Target::Latest, MigrateOptions::default()).unwrap();

    let status = migrator.status(&env).unwrap();
    assert!(status.is_up_to_date());
    assert!(!status.has_missing());
}

#[test]
fn test_execution_order_lists_log_by_start_time() {
    let (adapter, env) = memory_env(VersionOrder::Execution);
    log_entry(&adapter, 20120111235330, "TestMigration", at(2012, 1, 20, 0, 0, 0), false);
    log_entry(&adapter, 20120116183504, "TestMigration2", at(2012, 1, 17, 0, 0, 0), false);
    let migrator = migrator(&standard_registry());

    let status = migrator.status(&env).unwrap();
    let ids: Vec<&str> = status.lines.iter().map(|l| l.id.as_str()).collect();
    assert_eq!(ids, ["20120116183504", "20120111235330"]);
}

#[test]
fn test_renderings_carry_the_same_values() {
    let (adapter, env) = memory_env(VersionOrder::Creation);
    log_entry(&adapter, 20100101000000, "Vanished", at(2010, 1, 1, 0, 0, 0), false);
    let migrator = migrator(&standard_registry());
    let status = migrator.status(&env).unwrap();

    let json: serde_json::Value = serde_json::from_str(&status.render_json().unwrap()).unwrap();
    let plain = status.render_plain();

    let records = json["migrations"].as_array().unwrap();
    assert_eq!(records.len(), status.lines.len());
    for (record, line) in records.iter().zip(&status.lines) {
        assert_eq!(record["status"], line.status.as_str());
        assert_eq!(record["id"], line.id.as_str());
        assert_eq!(record["name"], line.name.as_str());
        assert_eq!(record.get("missing").is_some(), line.missing);
        assert!(plain.contains(&format!("{:>7}  {}  {}", line.status.as_str(), line.id, line.name)));
    }
    assert!(plain.contains("20100101000000  Vanished  ** MISSING MIGRATION FILE **"));
    assert_eq!(json["pending_count"], 2);
}
