//! Migrator - Core migration execution engine
//!
//! The `Migrator` owns the loaded migration and seed descriptors and an
//! [`Output`] sink. Every operation takes the [`Environment`] it acts on, reads
//! that environment's version log once, and then works from that snapshot.
//!
//! Units run strictly one after another, each in its own transaction. There is
//! no outer transaction, so units completed before a failure stay applied.

use crate::migration::environment::{Direction, Environment};
use crate::migration::loader::{load_migrations, load_registered, load_registered_seeds, load_seeds};
use crate::migration::record::VersionLog;
use crate::migration::resolver::{resolve_migrate, resolve_rollback, MigrateResolution, RollbackResolution, Target};
use crate::migration::{
    MigrationDescriptor, MigrationError, MigrationRegistry, MigrationStatus, Output, SeedDescriptor,
    SeedRegistry,
};
use chrono::{DateTime, Utc};
use std::path::Path;
use std::time::Instant;

/// Options for [`Migrator::migrate`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrateOptions {
    /// Record versions without running `up`
    pub fake: bool,
}

/// Options for [`Migrator::rollback`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RollbackOptions {
    /// Ignore breakpoints
    pub force: bool,
    /// Remove log entries without running `down`
    pub fake: bool,
}

/// One unit an operation would run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    pub direction: Direction,
    pub version: i64,
    pub name: String,
    /// The version has a log entry but no loaded migration
    pub missing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakpointMark {
    Set,
    Unset,
    Toggle,
}

const BREAKPOINT_REACHED: &str = "Breakpoint reached. Further rollbacks inhibited.";
const NOTHING_TO_ROLLBACK: &str = "No migrations to rollback";

/// Core migration execution engine
#[derive(Debug, Clone)]
pub struct Migrator {
    migrations: Vec<MigrationDescriptor>,
    seeds: Vec<SeedDescriptor>,
    output: Output,
}

impl Migrator {
    /// Create a Migrator over already-loaded descriptors
    ///
    /// Migrations are kept ascending by version; seeds keep the given order.
    #[must_use]
    pub fn new(mut migrations: Vec<MigrationDescriptor>, seeds: Vec<SeedDescriptor>) -> Self {
        migrations.sort_by_key(|m| m.version);
        Self {
            migrations,
            seeds,
            output: Output::buffered(),
        }
    }

    /// Load descriptors from migration and seed directories
    ///
    /// # Errors
    ///
    /// Returns any load error from [`load_migrations`] or [`load_seeds`].
    pub fn from_paths<P: AsRef<Path>, Q: AsRef<Path>>(
        migration_paths: &[P],
        seed_paths: &[Q],
        migrations: &MigrationRegistry,
        seeds: &SeedRegistry,
    ) -> Result<Self, MigrationError> {
        let migrations = load_migrations(migration_paths, migrations)?;
        let seeds = load_seeds(seed_paths, seeds)?;
        Ok(Self::new(migrations, seeds))
    }

    /// Build descriptors straight from registries, without files
    ///
    /// # Errors
    ///
    /// Returns any load error from [`load_registered`] or [`load_registered_seeds`].
    pub fn from_registries(
        migrations: &MigrationRegistry,
        seeds: &SeedRegistry,
    ) -> Result<Self, MigrationError> {
        Ok(Self::new(load_registered(migrations)?, load_registered_seeds(seeds)?))
    }

    /// Replace the output sink
    #[must_use]
    pub fn with_output(mut self, output: Output) -> Self {
        self.output = output;
        self
    }

    #[must_use]
    pub fn migrations(&self) -> &[MigrationDescriptor] {
        &self.migrations
    }

    #[must_use]
    pub fn seeds(&self) -> &[SeedDescriptor] {
        &self.seeds
    }

    #[must_use]
    pub fn output(&self) -> &Output {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut Output {
        &mut self.output
    }

    fn descriptor(&self, version: i64) -> Option<&MigrationDescriptor> {
        self.migrations
            .binary_search_by_key(&version, |m| m.version)
            .ok()
            .map(|i| &self.migrations[i])
    }

    /// Get migration status (applied, pending and missing)
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Adapter` if the version log cannot be read.
    pub fn status(&self, env: &Environment) -> Result<MigrationStatus, MigrationError> {
        let log = env.version_log()?;
        let status = MigrationStatus::build(&self.migrations, &log);
        for line in status.lines.iter().filter(|l| l.missing) {
            log::warn!("Version {} {} has no migration file", line.id, line.name);
        }
        Ok(status)
    }

    /// Apply (or, for a target below the current version, revert) migrations
    ///
    /// For a target below the newest applied version, applied migrations above
    /// it are reverted newest-first (stopping at a breakpoint); then every loaded
    /// migration at or below the target that is not yet logged is applied,
    /// ascending. A step count applies the next pending migrations only and
    /// never reverts. Migrations whose `should_execute` returns false are reported as
    /// skipped and left unlogged.
    ///
    /// Returns the number of units run.
    ///
    /// # Errors
    ///
    /// Returns the first execution error; units finished before it stay applied.
    pub fn migrate(
        &mut self,
        env: &Environment,
        target: &Target,
        options: MigrateOptions,
    ) -> Result<usize, MigrationError> {
        let log = env.version_log()?;
        let (downs, ups) = match resolve_migrate(&self.migrations, &log, target) {
            MigrateResolution::Nothing => {
                log::debug!("Nothing to migrate for target {target}");
                return Ok(0);
            }
            MigrateResolution::InvalidVersion(version) => {
                log::warn!("Migrate target {version} is not a loaded migration");
                self.output.writeln(format!("warning {version} is not a valid version"));
                return Ok(0);
            }
            MigrateResolution::NameNotFound(name) => {
                self.output.writeln(format!("No migration found with name ({name})"));
                return Ok(0);
            }
            MigrateResolution::To(to) => {
                if matches!(target, Target::Date(_)) {
                    self.output.writeln(format!("Migrating to version {to}"));
                }
                log::debug!("Migrating {} to version {to}", env.name());
                self.migrate_steps(&log, to)
            }
            MigrateResolution::Apply(versions) => {
                log::debug!("Applying {} pending migration(s) to {}", versions.len(), env.name());
                (Vec::new(), self.pending_units(&versions))
            }
        };
        let mut executed = 0;

        for (descriptor, breakpoint) in downs {
            if breakpoint {
                self.output.writeln(BREAKPOINT_REACHED);
                break;
            }
            if self.run_migration(env, &descriptor, Direction::Down, options.fake)? {
                executed += 1;
            }
        }

        for descriptor in ups {
            if self.run_migration(env, &descriptor, Direction::Up, options.fake)? {
                executed += 1;
            }
        }

        Ok(executed)
    }

    /// Migrate to the greatest loaded version at or before `instant`
    ///
    /// # Errors
    ///
    /// Same as [`Migrator::migrate`].
    pub fn migrate_to_date(
        &mut self,
        env: &Environment,
        instant: DateTime<Utc>,
        options: MigrateOptions,
    ) -> Result<usize, MigrationError> {
        self.migrate(env, &Target::Date(instant), options)
    }

    /// Units a migrate would run, without running them
    ///
    /// # Errors
    ///
    /// Returns `InvalidTarget` for a target that is not a loaded version or name.
    pub fn plan_migrate(&self, env: &Environment, target: &Target) -> Result<Vec<PlannedStep>, MigrationError> {
        let log = env.version_log()?;
        let (downs, ups) = match resolve_migrate(&self.migrations, &log, target) {
            MigrateResolution::Nothing => return Ok(Vec::new()),
            MigrateResolution::InvalidVersion(version) => {
                return Err(MigrationError::InvalidTarget(format!("{version} is not a valid version")))
            }
            MigrateResolution::NameNotFound(name) => {
                return Err(MigrationError::InvalidTarget(format!("No migration found with name ({name})")))
            }
            MigrateResolution::To(to) => self.migrate_steps(&log, to),
            MigrateResolution::Apply(versions) => (Vec::new(), self.pending_units(&versions)),
        };

        let mut plan: Vec<PlannedStep> = downs
            .into_iter()
            .take_while(|(_, breakpoint)| !breakpoint)
            .filter(|(d, _)| d.should_execute())
            .map(|(d, _)| PlannedStep {
                direction: Direction::Down,
                version: d.version,
                name: d.name,
                missing: false,
            })
            .collect();
        plan.extend(ups.into_iter().filter(MigrationDescriptor::should_execute).map(|d| PlannedStep {
            direction: Direction::Up,
            version: d.version,
            name: d.name,
            missing: false,
        }));
        Ok(plan)
    }

    /// Descriptors to revert (newest first, with their breakpoint flag) and to apply
    fn migrate_steps(
        &self,
        log: &VersionLog,
        to: i64,
    ) -> (Vec<(MigrationDescriptor, bool)>, Vec<MigrationDescriptor>) {
        let downs = if to < log.current_version() {
            self.migrations
                .iter()
                .rev()
                .filter(|m| m.version > to)
                .filter_map(|m| log.get(m.version).map(|entry| (m.clone(), entry.breakpoint)))
                .collect()
        } else {
            Vec::new()
        };

        let ups = self
            .migrations
            .iter()
            .filter(|m| m.version <= to && !log.contains(m.version))
            .cloned()
            .collect();

        (downs, ups)
    }

    /// Loaded descriptors for `versions`, ascending
    fn pending_units(&self, versions: &[i64]) -> Vec<MigrationDescriptor> {
        self.migrations
            .iter()
            .filter(|m| versions.contains(&m.version))
            .cloned()
            .collect()
    }

    /// Run one migration with its progress lines
    ///
    /// Returns false when the unit's `should_execute` hook skipped it.
    fn run_migration(
        &mut self,
        env: &Environment,
        descriptor: &MigrationDescriptor,
        direction: Direction,
        fake: bool,
    ) -> Result<bool, MigrationError> {
        let (running, done) = match direction {
            Direction::Up => ("migrating", "migrated"),
            Direction::Down => ("reverting", "reverted"),
        };
        let label = format!("== {} {}", descriptor.version, descriptor.name);

        if !descriptor.should_execute() {
            log::info!("Skipping {} {} ({})", descriptor.version, descriptor.name, env.name());
            self.output.writeln(format!("{label}: skipped"));
            return Ok(false);
        }

        self.output.writeln(format!("{label}: {running}"));
        let elapsed = env.execute_migration(descriptor, direction, fake)?;
        self.output
            .writeln(format!("{label}: {done} {:.4}s", elapsed.as_secs_f64()));
        Ok(true)
    }

    /// Revert applied migrations, most recent first
    ///
    /// The walk stops at the target, or at the first entry carrying a breakpoint
    /// (unless `force`). An entry whose migration file is missing is removed from
    /// the log without running anything; store structures it created are left
    /// untouched and a warning line says so.
    ///
    /// Returns the number of entries reverted.
    ///
    /// # Errors
    ///
    /// - `TargetNotFound` when a version target is not in the log (nothing is touched)
    /// - `Irreversible` / `ExecutionFailed` from the failing unit; earlier reverts stay
    pub fn rollback(
        &mut self,
        env: &Environment,
        target: &Target,
        options: RollbackOptions,
    ) -> Result<usize, MigrationError> {
        let log = env.version_log()?;
        let entries = match resolve_rollback(&log, target) {
            RollbackResolution::Revert(entries) => entries,
            RollbackResolution::NothingToRollback => {
                self.output.writeln(NOTHING_TO_ROLLBACK);
                return Ok(0);
            }
            RollbackResolution::NameNotFound(name) => {
                self.output.writeln(format!("No migration found with name ({name})"));
                return Ok(0);
            }
            RollbackResolution::TargetNotFound(version) => {
                self.output.writeln(format!("Target version ({version}) not found"));
                return Err(MigrationError::TargetNotFound(version.to_string()));
            }
        };
        log::debug!(
            "Rolling back {} entr{} in {} ({:?} order)",
            entries.len(),
            if entries.len() == 1 { "y" } else { "ies" },
            env.name(),
            log.order()
        );

        let mut reverted = 0;
        for entry in entries {
            if entry.breakpoint && !options.force {
                log::info!("Breakpoint on {} stops rollback", entry.version);
                self.output.writeln(BREAKPOINT_REACHED);
                break;
            }

            match self.descriptor(entry.version).cloned() {
                Some(descriptor) => {
                    if self.run_migration(env, &descriptor, Direction::Down, options.fake)? {
                        reverted += 1;
                    }
                }
                None => {
                    log::warn!(
                        "Version {} {} has no migration file; removing its log entry only",
                        entry.version,
                        entry.migration_name
                    );
                    self.output.writeln(format!(
                        "warning {} has no migration file; removing log entry only (store structures left untouched)",
                        entry.version
                    ));
                    env.remove_log_entry(entry.version)?;
                    reverted += 1;
                }
            }
        }

        Ok(reverted)
    }

    /// Revert every entry at or after `instant` under the environment's ordering mode
    ///
    /// # Errors
    ///
    /// Same as [`Migrator::rollback`].
    pub fn rollback_to_date(
        &mut self,
        env: &Environment,
        instant: DateTime<Utc>,
        options: RollbackOptions,
    ) -> Result<usize, MigrationError> {
        self.rollback(env, &Target::Date(instant), options)
    }

    /// Entries a rollback would revert, without reverting them
    ///
    /// # Errors
    ///
    /// - `TargetNotFound` when a version target is not in the log
    /// - `InvalidTarget` when a name target matches no log entry
    pub fn plan_rollback(
        &self,
        env: &Environment,
        target: &Target,
        force: bool,
    ) -> Result<Vec<PlannedStep>, MigrationError> {
        let log = env.version_log()?;
        let entries = match resolve_rollback(&log, target) {
            RollbackResolution::Revert(entries) => entries,
            RollbackResolution::NothingToRollback => return Ok(Vec::new()),
            RollbackResolution::NameNotFound(name) => {
                return Err(MigrationError::InvalidTarget(format!("No migration found with name ({name})")))
            }
            RollbackResolution::TargetNotFound(version) => {
                return Err(MigrationError::TargetNotFound(version.to_string()))
            }
        };

        Ok(entries
            .into_iter()
            .take_while(|e| force || !e.breakpoint)
            .filter_map(|e| match self.descriptor(e.version) {
                Some(d) if !d.should_execute() => None,
                Some(d) => Some(PlannedStep {
                    direction: Direction::Down,
                    version: d.version,
                    name: d.name.clone(),
                    missing: false,
                }),
                None => Some(PlannedStep {
                    direction: Direction::Down,
                    version: e.version,
                    name: e.migration_name,
                    missing: true,
                }),
            })
            .collect())
    }

    /// Run seeds
    ///
    /// With no names, every loaded seed runs in load order. With names, exactly
    /// those seeds run, in the order given; every name is checked before any seed
    /// runs. Seeds are never logged and can be re-run.
    ///
    /// Returns the number of seeds run.
    ///
    /// # Errors
    ///
    /// - `UnknownSeed` for a name that is not loaded (nothing runs)
    /// - `ExecutionFailed` from the failing seed; earlier seeds stay applied
    pub fn seed(&mut self, env: &Environment, names: &[String]) -> Result<usize, MigrationError> {
        let selected: Vec<SeedDescriptor> = if names.is_empty() {
            self.seeds.clone()
        } else {
            names
                .iter()
                .map(|name| {
                    self.seeds
                        .iter()
                        .find(|s| s.name == *name)
                        .cloned()
                        .ok_or_else(|| MigrationError::UnknownSeed(name.clone()))
                })
                .collect::<Result<_, _>>()?
        };

        let mut executed = 0;
        for seed in selected {
            let label = format!("== {}", seed.name);
            if !seed.should_execute() {
                log::info!("Skipping seed {} ({})", seed.name, env.name());
                self.output.writeln(format!("{label}: skipped"));
                continue;
            }

            self.output.writeln(format!("{label}: seeding"));
            let elapsed = env.execute_seed(&seed)?;
            self.output
                .writeln(format!("{label}: seeded {:.4}s", elapsed.as_secs_f64()));
            executed += 1;
        }
        Ok(executed)
    }

    /// Set the breakpoint on a version (`None`: the most recent entry)
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Adapter` if the log cannot be read or written.
    pub fn set_breakpoint(&mut self, env: &Environment, version: Option<i64>) -> Result<(), MigrationError> {
        self.mark_breakpoint(env, version, BreakpointMark::Set)
    }

    /// Clear the breakpoint on a version (`None`: the most recent entry)
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Adapter` if the log cannot be read or written.
    pub fn unset_breakpoint(&mut self, env: &Environment, version: Option<i64>) -> Result<(), MigrationError> {
        self.mark_breakpoint(env, version, BreakpointMark::Unset)
    }

    /// Flip the breakpoint on a version (`None`: the most recent entry)
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Adapter` if the log cannot be read or written.
    pub fn toggle_breakpoint(&mut self, env: &Environment, version: Option<i64>) -> Result<(), MigrationError> {
        self.mark_breakpoint(env, version, BreakpointMark::Toggle)
    }

    fn mark_breakpoint(
        &mut self,
        env: &Environment,
        version: Option<i64>,
        mark: BreakpointMark,
    ) -> Result<(), MigrationError> {
        let log = env.version_log()?;
        let version = match version {
            Some(version) => version,
            None => match log.most_recent() {
                Some(entry) => entry.version,
                None => {
                    log::warn!("No applied migrations in {}; no breakpoint to change", env.name());
                    return Ok(());
                }
            },
        };

        let Some(entry) = log.get(version) else {
            log::warn!("Breakpoint target {version} is not in the version log");
            self.output.writeln(format!("warning {version} is not a valid version"));
            return Ok(());
        };

        let breakpoint = match mark {
            BreakpointMark::Set => true,
            BreakpointMark::Unset => false,
            BreakpointMark::Toggle => !entry.breakpoint,
        };
        env.set_breakpoint(version, breakpoint)?;

        let name = self
            .descriptor(version)
            .map_or_else(|| entry.migration_name.clone(), |d| d.name.clone());
        self.output.writeln(format!(
            " Breakpoint {} for {version} {name}",
            if breakpoint { "set" } else { "cleared" }
        ));
        Ok(())
    }

    /// Clear every breakpoint in the environment
    ///
    /// Returns how many were set.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Adapter` if the log cannot be written.
    pub fn remove_breakpoints(&mut self, env: &Environment) -> Result<u64, MigrationError> {
        let started = Instant::now();
        let cleared = env.reset_breakpoints()?;
        log::debug!("Cleared {cleared} breakpoint(s) in {:?}", started.elapsed());
        self.output.writeln(format!(" {cleared} breakpoints cleared."));
        Ok(cleared)
    }
}
