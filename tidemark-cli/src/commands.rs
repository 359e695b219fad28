//! Command handlers
//!
//! Each handler returns the process exit code on success; errors bubble up to
//! [`crate::run_with`] and exit with [`EXIT_ERROR`](crate::EXIT_ERROR).

use crate::{Cli, CliError, Commands, Registries, StatusFormat, EXIT_MISSING, EXIT_OK, EXIT_PENDING};
use anyhow::{Context, Result};
use chrono::Utc;
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};
use tidemark::migration::file::{
    discover_migrations, is_valid_migration_name, migration_file_name, migration_template,
    normalize_name, snake_case, version_for,
};
use tidemark::migration::{
    load_migrations, load_registered, load_registered_seeds, load_seeds, MigrateOptions, MigrationStatus,
    Migrator, Output, PlannedStep, RollbackOptions, Target,
};
use tidemark::{Environment, TidemarkConfig};

/// Run the parsed command
///
/// # Errors
///
/// Returns any configuration, load, addressing or execution error.
pub fn execute(cli: &Cli, registries: &Registries) -> Result<i32> {
    match &cli.command {
        Commands::Init => return init(&cli.config),
        Commands::Create { name, path } => {
            let config = TidemarkConfig::load(&cli.config)?;
            let dir = match path {
                Some(path) => path.clone(),
                None => config
                    .paths
                    .migrations
                    .first()
                    .cloned()
                    .unwrap_or_else(|| PathBuf::from("db/migrations")),
            };
            create(&dir, name)?;
            return Ok(EXIT_OK);
        }
        _ => {}
    }

    let config = TidemarkConfig::load(&cli.config)?;
    let env_name = cli
        .environment
        .clone()
        .unwrap_or_else(|| config.default_environment().to_string());
    let url = database_url(cli);
    let env = config.open_environment(&env_name, url.as_deref())?;
    if !cli.quiet {
        println!("{} {}", "using environment".dimmed(), env_name.bold());
    }

    let mut migrator = build_migrator(&config, registries)?.with_output(if cli.quiet {
        Output::buffered()
    } else {
        Output::stdout()
    });

    let code = match &cli.command {
        Commands::Status { format } => status(&migrator, &env, *format)?,
        Commands::Migrate {
            target,
            date,
            fake,
            dry_run,
        } => {
            let target = match (target, date) {
                (_, Some(date)) => Target::parse_date(date)?,
                (Some(target), None) => Target::parse(target),
                (None, None) => Target::Latest,
            };
            if *dry_run {
                print_plan("apply", &migrator.plan_migrate(&env, &target)?);
            } else {
                migrator.migrate(&env, &target, MigrateOptions { fake: *fake })?;
            }
            EXIT_OK
        }
        Commands::Rollback {
            target,
            date,
            steps,
            force,
            fake,
            dry_run,
        } => {
            let target = match (target, date, steps) {
                (_, Some(date), _) => Target::parse_date(date)?,
                (Some(target), None, _) => Target::parse(target),
                (None, None, Some(steps)) => Target::Steps(*steps),
                (None, None, None) => Target::Latest,
            };
            if *dry_run {
                print_plan("revert", &migrator.plan_rollback(&env, &target, *force)?);
            } else {
                migrator.rollback(
                    &env,
                    &target,
                    RollbackOptions {
                        force: *force,
                        fake: *fake,
                    },
                )?;
            }
            EXIT_OK
        }
        Commands::Seed { seeds } => {
            migrator.seed(&env, seeds)?;
            EXIT_OK
        }
        Commands::Breakpoint {
            target,
            set,
            unset,
            remove_all,
        } => {
            if *remove_all {
                migrator.remove_breakpoints(&env)?;
            } else if *set {
                migrator.set_breakpoint(&env, *target)?;
            } else if *unset {
                migrator.unset_breakpoint(&env, *target)?;
            } else {
                migrator.toggle_breakpoint(&env, *target)?;
            }
            EXIT_OK
        }
        Commands::Init | Commands::Create { .. } => EXIT_OK,
    };

    env.disconnect()?;
    Ok(code)
}

/// `--database-url`, then `TIDEMARK_DATABASE_URL`, then `DATABASE_URL`
fn database_url(cli: &Cli) -> Option<String> {
    cli.database_url
        .clone()
        .or_else(|| std::env::var("TIDEMARK_DATABASE_URL").ok())
        .or_else(|| std::env::var("DATABASE_URL").ok())
}

/// Load units from the configured directories, or from the registries alone
/// when none of the directories exist
fn build_migrator(config: &TidemarkConfig, registries: &Registries) -> Result<Migrator> {
    let migrations = if config.paths.migrations.iter().any(|p| p.is_dir()) {
        load_migrations(&config.paths.migrations, &registries.migrations)?
    } else {
        log::debug!("No migration directory found; using registered migrations");
        load_registered(&registries.migrations)?
    };

    let seeds = if config.paths.seeds.iter().any(|p| p.is_dir()) {
        load_seeds(&config.paths.seeds, &registries.seeds)?
    } else {
        load_registered_seeds(&registries.seeds)?
    };

    Ok(Migrator::new(migrations, seeds))
}

/// Exit code for a status report: missing files win over pending migrations
#[must_use]
pub fn status_exit_code(status: &MigrationStatus) -> i32 {
    if status.has_missing() {
        EXIT_MISSING
    } else if status.has_pending() {
        EXIT_PENDING
    } else {
        EXIT_OK
    }
}

fn status(migrator: &Migrator, env: &Environment, format: StatusFormat) -> Result<i32> {
    let status = migrator.status(env)?;
    match format {
        StatusFormat::Text => {
            print!("{}", status.render_plain());
            if status.has_missing() {
                println!(
                    "{}",
                    format!("{} applied migration(s) have no migration file", status.missing_count).red()
                );
            }
        }
        StatusFormat::Json => println!("{}", status.render_json()?),
    }
    Ok(status_exit_code(&status))
}

fn print_plan(verb: &str, plan: &[PlannedStep]) {
    if plan.is_empty() {
        println!("Nothing to {verb}");
        return;
    }
    println!("Would {verb} {} migration(s):", plan.len());
    for (i, step) in plan.iter().enumerate() {
        let suffix = if step.missing { " (missing file)" } else { "" };
        println!("  {}. {} {}{}", i + 1, step.version, step.name, suffix);
    }
}

/// Write a new migration file and return its path
///
/// # Errors
///
/// - `CliError::InvalidName` for names that cannot become a file and type name
/// - `CliError::MigrationExists` when the normalised name is already used in `dir`
pub fn create(dir: &Path, name: &str) -> Result<PathBuf> {
    if !is_valid_migration_name(name) {
        return Err(CliError::InvalidName(name.to_string()).into());
    }
    let normalized = normalize_name(&snake_case(name));

    if dir.is_dir() {
        if let Some(existing) = discover_migrations(dir)?.into_iter().find(|m| m.name == normalized) {
            return Err(CliError::MigrationExists {
                name: normalized,
                path: existing.path,
            }
            .into());
        }
    } else {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    let version = version_for(&Utc::now());
    let path = dir.join(migration_file_name(&version, name));
    fs::write(&path, migration_template(&version, name))
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("{} {}", "created".green(), path.display());
    log::info!("Created migration {version} {normalized}");
    Ok(path)
}

/// Write a starter configuration file
///
/// # Errors
///
/// Returns `CliError::ConfigExists` rather than overwrite an existing file.
pub fn init(path: &Path) -> Result<i32> {
    if path.exists() {
        return Err(CliError::ConfigExists(path.to_path_buf()).into());
    }
    let contents = toml::to_string_pretty(&TidemarkConfig::sample())?;
    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
    println!("{} {}", "created".green(), path.display());
    Ok(EXIT_OK)
}
