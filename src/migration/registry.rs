//! Explicit registries of compiled migration and seed units
//!
//! Units are compiled into the application, so instead of discovering classes at
//! runtime the application builds a registry at startup and hands it to the
//! loader. There is no process-wide registry.

use crate::migration::{Migration, MigrationError, Seed};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Migration units indexed by version
#[derive(Default, Clone)]
pub struct MigrationRegistry {
    units: BTreeMap<i64, Arc<dyn Migration>>,
}

impl MigrationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a migration unit
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::AlreadyRegistered` if a unit with the same version
    /// is already registered.
    pub fn register<M: Migration + 'static>(&mut self, migration: M) -> Result<(), MigrationError> {
        let version = migration.version();
        if let Some(existing) = self.units.get(&version) {
            return Err(MigrationError::AlreadyRegistered(format!(
                "Migration version {version} ({})",
                existing.name()
            )));
        }
        self.units.insert(version, Arc::new(migration));
        Ok(())
    }

    /// Builder-style registration for static lists
    ///
    /// # Errors
    ///
    /// Same as [`MigrationRegistry::register`].
    pub fn with<M: Migration + 'static>(mut self, migration: M) -> Result<Self, MigrationError> {
        self.register(migration)?;
        Ok(self)
    }

    #[must_use]
    pub fn get(&self, version: i64) -> Option<Arc<dyn Migration>> {
        self.units.get(&version).cloned()
    }

    /// Registered versions, ascending
    #[must_use]
    pub fn versions(&self) -> Vec<i64> {
        self.units.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, &Arc<dyn Migration>)> {
        self.units.iter().map(|(v, m)| (*v, m))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl std::fmt::Debug for MigrationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationRegistry")
            .field("versions", &self.versions())
            .finish()
    }
}

/// Seed units indexed by name
#[derive(Default, Clone)]
pub struct SeedRegistry {
    units: BTreeMap<String, Arc<dyn Seed>>,
}

impl SeedRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a seed unit
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::AlreadyRegistered` if a seed with the same name is
    /// already registered.
    pub fn register<S: Seed + 'static>(&mut self, seed: S) -> Result<(), MigrationError> {
        let name = seed.name().to_string();
        if self.units.contains_key(&name) {
            return Err(MigrationError::AlreadyRegistered(format!("Seed {name}")));
        }
        self.units.insert(name, Arc::new(seed));
        Ok(())
    }

    /// Builder-style registration for static lists
    ///
    /// # Errors
    ///
    /// Same as [`SeedRegistry::register`].
    pub fn with<S: Seed + 'static>(mut self, seed: S) -> Result<Self, MigrationError> {
        self.register(seed)?;
        Ok(self)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Seed>> {
        self.units.get(name).cloned()
    }

    /// Registered names, alphabetical
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.units.keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl std::fmt::Debug for SeedRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedRegistry")
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::AdapterError;
    use crate::migration::SchemaManager;

    struct Noop(i64, &'static str);

    impl Migration for Noop {
        fn version(&self) -> i64 {
            self.0
        }
        fn name(&self) -> &str {
            self.1
        }
        fn up(&self, _manager: &SchemaManager<'_>) -> Result<(), AdapterError> {
            Ok(())
        }
        fn down(&self, _manager: &SchemaManager<'_>) -> Result<(), AdapterError> {
            Ok(())
        }
    }

    struct NamedSeed(&'static str);

    impl Seed for NamedSeed {
        fn name(&self) -> &str {
            self.0
        }
        fn run(&self, _manager: &SchemaManager<'_>) -> Result<(), AdapterError> {
            Ok(())
        }
    }

    #[test]
    fn test_register_and_get() {
        let registry = MigrationRegistry::new()
            .with(Noop(20240102000000, "second"))
            .unwrap()
            .with(Noop(20240101000000, "first"))
            .unwrap();

        assert_eq!(registry.versions(), vec![20240101000000, 20240102000000]);
        assert_eq!(registry.get(20240101000000).unwrap().name(), "first");
        assert!(registry.get(1).is_none());
    }

    #[test]
    fn test_duplicate_version_rejected() {
        let mut registry = MigrationRegistry::new();
        registry.register(Noop(1, "a")).unwrap();
        let err = registry.register(Noop(1, "b")).unwrap_err();
        assert!(matches!(err, MigrationError::AlreadyRegistered(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_seed_registry() {
        let mut registry = SeedRegistry::new();
        registry.register(NamedSeed("UserSeeder")).unwrap();
        registry.register(NamedSeed("AccountSeeder")).unwrap();
        assert!(registry.register(NamedSeed("UserSeeder")).is_err());
        assert_eq!(registry.names(), vec!["AccountSeeder", "UserSeeder"]);
    }
}
