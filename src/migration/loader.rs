//! Loader - pairs files on disk with registered units
//!
//! `load_migrations` walks every configured directory, checks that versions and
//! names are unique across all of them, and binds each file to the registered
//! unit of the same version. The result is ascending by version. Seeds are bound
//! by name and ordered alphabetically, then by declared dependencies.
//!
//! All checks run before any store access.

use crate::migration::dependency_ordering::{topological_sort, DependencyNode};
use crate::migration::file::{discover_migrations, discover_seeds, normalize_name};
use crate::migration::{Migration, MigrationError, MigrationRegistry, Seed, SeedRegistry};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One schema-change unit, bound to its source file
#[derive(Clone)]
pub struct MigrationDescriptor {
    pub version: i64,
    pub name: String,
    pub source_path: PathBuf,
    unit: Arc<dyn Migration>,
}

impl MigrationDescriptor {
    pub fn new(
        version: i64,
        name: impl Into<String>,
        source_path: impl Into<PathBuf>,
        unit: Arc<dyn Migration>,
    ) -> Self {
        Self {
            version,
            name: name.into(),
            source_path: source_path.into(),
            unit,
        }
    }

    #[must_use]
    pub fn has_up(&self) -> bool {
        self.unit.has_up()
    }

    #[must_use]
    pub fn has_down(&self) -> bool {
        self.unit.has_down()
    }

    /// Evaluated at run time, just before the unit would execute
    #[must_use]
    pub fn should_execute(&self) -> bool {
        self.unit.should_execute()
    }

    #[must_use]
    pub fn unit(&self) -> &dyn Migration {
        self.unit.as_ref()
    }
}

impl std::fmt::Debug for MigrationDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationDescriptor")
            .field("version", &self.version)
            .field("name", &self.name)
            .field("source_path", &self.source_path)
            .finish()
    }
}

/// One data-seeding unit, bound to its source file
#[derive(Clone)]
pub struct SeedDescriptor {
    pub name: String,
    pub source_path: PathBuf,
    /// Position in run order
    pub index: usize,
    unit: Arc<dyn Seed>,
}

impl SeedDescriptor {
    #[must_use]
    pub fn should_execute(&self) -> bool {
        self.unit.should_execute()
    }

    #[must_use]
    pub fn dependencies(&self) -> Vec<String> {
        self.unit.dependencies()
    }

    #[must_use]
    pub fn unit(&self) -> &dyn Seed {
        self.unit.as_ref()
    }
}

impl std::fmt::Debug for SeedDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedDescriptor")
            .field("name", &self.name)
            .field("source_path", &self.source_path)
            .field("index", &self.index)
            .finish()
    }
}

/// Check version and name uniqueness while collecting descriptors
fn insert_unique(
    by_version: &mut BTreeMap<i64, MigrationDescriptor>,
    by_name: &mut HashMap<String, PathBuf>,
    descriptor: MigrationDescriptor,
) -> Result<(), MigrationError> {
    if let Some(existing) = by_version.get(&descriptor.version) {
        return Err(MigrationError::DuplicateVersion {
            version: descriptor.version,
            first: existing.source_path.clone(),
            second: descriptor.source_path,
        });
    }
    if let Some(first) = by_name.get(&descriptor.name) {
        return Err(MigrationError::DuplicateName {
            name: descriptor.name,
            first: first.clone(),
            second: descriptor.source_path,
        });
    }
    by_name.insert(descriptor.name.clone(), descriptor.source_path.clone());
    by_version.insert(descriptor.version, descriptor);
    Ok(())
}

/// Load migration descriptors from one or more directories
///
/// # Errors
///
/// - `DirectoryNotFound` / `Io` / `InvalidFileName` from scanning
/// - `DuplicateVersion` / `DuplicateName`, naming both files
/// - `UnitNotFound` when no registered unit matches a file's version and name
pub fn load_migrations<P: AsRef<Path>>(
    paths: &[P],
    registry: &MigrationRegistry,
) -> Result<Vec<MigrationDescriptor>, MigrationError> {
    let mut by_version = BTreeMap::new();
    let mut by_name = HashMap::new();

    for dir in paths {
        for file in discover_migrations(dir.as_ref())? {
            let unit = registry
                .get(file.version)
                .filter(|unit| normalize_name(unit.name()) == file.name)
                .ok_or_else(|| MigrationError::UnitNotFound {
                    kind: "migration",
                    name: file.name.clone(),
                    path: file.path.clone(),
                })?;
            let descriptor = MigrationDescriptor::new(file.version, file.name, file.path, unit);
            insert_unique(&mut by_version, &mut by_name, descriptor)?;
        }
    }

    let descriptors: Vec<MigrationDescriptor> = by_version.into_values().collect();
    log::debug!("Loaded {} migration(s)", descriptors.len());
    Ok(descriptors)
}

/// Build migration descriptors straight from a registry, without files
///
/// Used when units are compiled in and no migration directory is shipped. The
/// source path is the conventional file name for the unit.
///
/// # Errors
///
/// Returns `DuplicateName` when two registered units normalise to the same name.
pub fn load_registered(registry: &MigrationRegistry) -> Result<Vec<MigrationDescriptor>, MigrationError> {
    let mut by_version = BTreeMap::new();
    let mut by_name = HashMap::new();

    for (version, unit) in registry.iter() {
        let name = normalize_name(unit.name());
        let source_path = PathBuf::from(crate::migration::file::migration_file_name(
            &version.to_string(),
            &name,
        ));
        let descriptor = MigrationDescriptor::new(version, name, source_path, Arc::clone(unit));
        insert_unique(&mut by_version, &mut by_name, descriptor)?;
    }

    Ok(by_version.into_values().collect())
}

/// Order seeds alphabetically, then so that dependencies run first
fn order_seeds(
    mut seeds: Vec<(String, PathBuf, Arc<dyn Seed>)>,
) -> Result<Vec<SeedDescriptor>, MigrationError> {
    seeds.sort_by(|a, b| a.0.cmp(&b.0));

    let nodes: Vec<DependencyNode> = seeds
        .iter()
        .map(|(name, _, unit)| DependencyNode::new(name.clone(), unit.dependencies()))
        .collect();
    let order = topological_sort(&nodes).map_err(MigrationError::SeedDependency)?;

    let mut by_name: HashMap<String, (PathBuf, Arc<dyn Seed>)> = seeds
        .into_iter()
        .map(|(name, path, unit)| (name, (path, unit)))
        .collect();

    let mut ordered = Vec::with_capacity(order.len());
    for (index, name) in order.into_iter().enumerate() {
        if let Some((source_path, unit)) = by_name.remove(&name) {
            ordered.push(SeedDescriptor {
                name,
                source_path,
                index,
                unit,
            });
        }
    }
    Ok(ordered)
}

/// Load seed descriptors from one or more directories
///
/// Seeds excluded by their `should_execute` hook stay in the result so the
/// migrator can report them as skipped.
///
/// # Errors
///
/// - `DirectoryNotFound` / `Io` / `InvalidFileName` from scanning
/// - `DuplicateSeed` when two directories hold the same seed name
/// - `UnitNotFound` when a file has no registered seed
/// - `SeedDependency` for unknown dependencies or cycles
pub fn load_seeds<P: AsRef<Path>>(
    paths: &[P],
    registry: &SeedRegistry,
) -> Result<Vec<SeedDescriptor>, MigrationError> {
    let mut found: HashMap<String, PathBuf> = HashMap::new();
    let mut seeds = Vec::new();

    for dir in paths {
        for file in discover_seeds(dir.as_ref())? {
            if let Some(first) = found.get(&file.name) {
                return Err(MigrationError::DuplicateSeed {
                    name: file.name,
                    first: first.clone(),
                    second: file.path,
                });
            }
            let unit = registry
                .get(&file.name)
                .ok_or_else(|| MigrationError::UnitNotFound {
                    kind: "seed",
                    name: file.name.clone(),
                    path: file.path.clone(),
                })?;
            found.insert(file.name.clone(), file.path.clone());
            seeds.push((file.name, file.path, unit));
        }
    }

    let ordered = order_seeds(seeds)?;
    log::debug!("Loaded {} seed(s)", ordered.len());
    Ok(ordered)
}

/// Build seed descriptors straight from a registry, without files
///
/// # Errors
///
/// Returns `SeedDependency` for unknown dependencies or cycles.
pub fn load_registered_seeds(registry: &SeedRegistry) -> Result<Vec<SeedDescriptor>, MigrationError> {
    let seeds = registry
        .names()
        .into_iter()
        .filter_map(|name| {
            registry
                .get(&name)
                .map(|unit| (name.clone(), PathBuf::from(format!("{name}.rs")), unit))
        })
        .collect();
    order_seeds(seeds)
}
