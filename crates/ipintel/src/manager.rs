//! Reference-counted hot-swap holder for the active data set.

use std::path::Path;
use std::sync::{Arc, RwLock};

use crate::config::Config;
use crate::dataset::{DataSet, RequiredProperties};
use crate::source::DataSource;
use crate::Result;

/// Owns the currently active instance of a shared resource and lets it be
/// replaced while readers hold the previous one.
///
/// Acquiring is an atomic reference-count increment on the active handle;
/// the handle a reader acquired stays valid until its last clone drops, at
/// which point the resource is freed: whichever side (reader or swapper)
/// drops last does the freeing, exactly once. Replacement installs the new
/// resource without blocking readers beyond the brief pointer swap.
pub struct ResourceManager<T> {
    active: RwLock<Arc<T>>,
}

impl<T> ResourceManager<T> {
    pub fn new(resource: T) -> ResourceManager<T> {
        ResourceManager {
            active: RwLock::new(Arc::new(resource)),
        }
    }

    /// Borrows the active resource. The returned handle pins that instance
    /// for as long as it is held, across any number of replacements.
    pub fn active(&self) -> Arc<T> {
        self.active
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Installs `resource` as the active instance and retires the previous
    /// one. Readers that already acquired the old instance keep it alive
    /// until they release; new acquisitions see only the new instance.
    pub fn replace(&self, resource: T) -> Arc<T> {
        let fresh = Arc::new(resource);
        let mut active = self
            .active
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let retired = std::mem::replace(&mut *active, fresh.clone());
        log::debug!(
            "resource replaced; retired instance has {} outstanding borrow(s)",
            Arc::strong_count(&retired) - 1
        );
        fresh
    }
}

impl<T> std::fmt::Debug for ResourceManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceManager").finish_non_exhaustive()
    }
}

/// The engine's public entry point: owns the active data set and serves
/// borrows to per-thread results objects.
///
/// Reloads build the replacement completely before installing it, so a
/// failed reload leaves the manager untouched and lookups keep running on
/// the data set they borrowed.
pub struct Manager {
    resources: ResourceManager<DataSet>,
    config: Config,
    required: RequiredProperties,
}

impl Manager {
    /// Opens a data file per the configuration.
    pub fn open_file(
        path: impl AsRef<Path>,
        config: Config,
        required: RequiredProperties,
    ) -> Result<Manager> {
        let source = DataSource::open(path.as_ref(), &config)?;
        let dataset = DataSet::new(source, &config, &required)?;
        Ok(Manager {
            resources: ResourceManager::new(dataset),
            config,
            required,
        })
    }

    /// Opens a data set over caller-supplied bytes. The buffer is owned by
    /// the data set and freed when the last borrower releases it.
    pub fn open_memory(
        bytes: impl Into<Arc<[u8]>>,
        config: Config,
        required: RequiredProperties,
    ) -> Result<Manager> {
        let source = DataSource::memory(bytes);
        let dataset = DataSet::new(source, &config, &required)?;
        Ok(Manager {
            resources: ResourceManager::new(dataset),
            config,
            required,
        })
    }

    /// Replaces the active data set from a file without blocking lookups.
    pub fn reload_from_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let source = DataSource::open(path.as_ref(), &self.config)?;
        let dataset = DataSet::new(source, &self.config, &self.required)?;
        self.resources.replace(dataset);
        log::info!("data set reloaded from {}", path.as_ref().display());
        Ok(())
    }

    /// Replaces the active data set from a memory buffer.
    pub fn reload_from_memory(&self, bytes: impl Into<Arc<[u8]>>) -> Result<()> {
        let source = DataSource::memory(bytes);
        let dataset = DataSet::new(source, &self.config, &self.required)?;
        self.resources.replace(dataset);
        log::info!("data set reloaded from memory");
        Ok(())
    }

    /// Borrows the active data set.
    pub fn dataset(&self) -> Arc<DataSet> {
        self.resources.active()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("dataset", &self.dataset().name())
            .finish_non_exhaustive()
    }
}
