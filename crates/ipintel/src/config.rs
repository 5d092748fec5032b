//! Engine configuration and the preset profiles.

use std::path::PathBuf;

use crate::{Error, Result};

/// Sentinel for "preload every item of the collection".
pub const LOADED_ALL: u32 = u32::MAX;

/// Per-collection tuning: how many leading items to keep resident, how many
/// cache entries to hold over the file, and the expected parallelism for
/// cache sharding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionConfig {
    pub loaded: u32,
    pub capacity: u32,
    pub concurrency: u32,
}

impl CollectionConfig {
    pub const fn none() -> CollectionConfig {
        CollectionConfig {
            loaded: 0,
            capacity: 0,
            concurrency: 1,
        }
    }

    pub const fn all_loaded() -> CollectionConfig {
        CollectionConfig {
            loaded: LOADED_ALL,
            capacity: 0,
            concurrency: 1,
        }
    }

    pub const fn cached(capacity: u32, concurrency: u32) -> CollectionConfig {
        CollectionConfig {
            loaded: 0,
            capacity,
            concurrency,
        }
    }
}

impl Default for CollectionConfig {
    fn default() -> CollectionConfig {
        CollectionConfig::none()
    }
}

/// Everything that shapes how a data set is opened and served.
#[derive(Debug, Clone)]
pub struct Config {
    /// Load the whole file into RAM; every collection becomes an in-memory
    /// view and the per-collection `loaded`/`capacity` settings are ignored.
    pub all_in_memory: bool,
    /// Copy the source file to a temp path before opening so the source is
    /// not held open.
    pub use_temp_file: bool,
    /// Before copying, look through the temp directories for an existing
    /// exact copy and reuse it.
    pub reuse_temp_file: bool,
    /// Candidate directories for the temp copy, in priority order. Empty
    /// means the system temp directory.
    pub temp_dirs: Vec<PathBuf>,
    /// Recognise `HTTP_<NAME>` evidence keys as aliases for `<NAME>`.
    pub uses_upper_prefixed_headers: bool,
    /// Build the property/value index accelerator (memory for speed).
    pub property_value_index: bool,
    /// Number of pooled read handles for file-backed operation.
    pub file_handles: u16,

    pub strings: CollectionConfig,
    pub components: CollectionConfig,
    pub maps: CollectionConfig,
    pub properties: CollectionConfig,
    pub values: CollectionConfig,
    pub profiles: CollectionConfig,
    pub graphs: CollectionConfig,
    pub profile_groups: CollectionConfig,
    pub property_types: CollectionConfig,
    pub profile_offsets: CollectionConfig,
    /// Applied to every graph's spans and clusters collections. Span bytes
    /// and node bits are byte streams and are always read raw or resident.
    pub graph_data: CollectionConfig,
}

impl Config {
    /// Everything in RAM, no caches.
    pub fn in_memory() -> Config {
        Config {
            all_in_memory: true,
            ..Config::low_memory()
        }
    }

    /// Everything in RAM plus the value-index accelerator.
    pub fn high_performance() -> Config {
        let all = CollectionConfig::all_loaded();
        Config {
            all_in_memory: true,
            property_value_index: true,
            strings: all,
            components: all,
            maps: all,
            properties: all,
            values: all,
            profiles: all,
            graphs: all,
            profile_groups: all,
            property_types: all,
            profile_offsets: all,
            graph_data: all,
            ..Config::low_memory()
        }
    }

    /// Nothing preloaded, nothing cached: every request reads the file.
    pub fn low_memory() -> Config {
        let none = CollectionConfig::none();
        Config {
            all_in_memory: false,
            use_temp_file: false,
            reuse_temp_file: false,
            temp_dirs: Vec::new(),
            uses_upper_prefixed_headers: false,
            property_value_index: false,
            file_handles: 8,
            strings: none,
            components: none,
            maps: none,
            properties: none,
            values: none,
            profiles: none,
            graphs: none,
            profile_groups: none,
            property_types: none,
            profile_offsets: none,
            graph_data: none,
        }
    }

    /// Small preloads and modest caches; the tables that are read on every
    /// lookup stay resident.
    pub fn balanced() -> Config {
        Config {
            strings: CollectionConfig {
                loaded: 2000,
                capacity: 5000,
                concurrency: 4,
            },
            components: CollectionConfig::all_loaded(),
            maps: CollectionConfig::all_loaded(),
            properties: CollectionConfig::all_loaded(),
            values: CollectionConfig {
                loaded: 500,
                capacity: 2000,
                concurrency: 4,
            },
            profiles: CollectionConfig::cached(2000, 4),
            graphs: CollectionConfig::all_loaded(),
            profile_groups: CollectionConfig::cached(1000, 4),
            property_types: CollectionConfig::all_loaded(),
            profile_offsets: CollectionConfig::cached(2000, 4),
            graph_data: CollectionConfig::cached(1000, 4),
            ..Config::low_memory()
        }
    }

    /// [`Config::balanced`] behind a reusable temp copy of the source file.
    pub fn balanced_temp() -> Config {
        Config {
            use_temp_file: true,
            reuse_temp_file: true,
            ..Config::balanced()
        }
    }

    /// Rejects combinations the engine cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.file_handles == 0 && !self.all_in_memory {
            return Err(Error::InvalidConfig(
                "file-backed operation requires at least one file handle",
            ));
        }
        if self.reuse_temp_file && !self.use_temp_file {
            return Err(Error::InvalidConfig(
                "reuse_temp_file requires use_temp_file",
            ));
        }
        for cfg in [
            &self.strings,
            &self.components,
            &self.maps,
            &self.properties,
            &self.values,
            &self.profiles,
            &self.graphs,
            &self.profile_groups,
            &self.property_types,
            &self.profile_offsets,
            &self.graph_data,
        ] {
            if cfg.capacity > 0 && cfg.concurrency == 0 {
                return Err(Error::InvalidConfig(
                    "cached collections need a concurrency of at least 1",
                ));
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Config {
        Config::balanced()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_validate() {
        for config in [
            Config::in_memory(),
            Config::high_performance(),
            Config::low_memory(),
            Config::balanced(),
            Config::balanced_temp(),
        ] {
            config.validate().unwrap();
        }
    }

    #[test]
    fn reuse_without_temp_rejected() {
        let config = Config {
            reuse_temp_file: true,
            use_temp_file: false,
            ..Config::low_memory()
        };
        assert!(matches!(
            config.validate().unwrap_err(),
            Error::InvalidConfig(_)
        ));
    }

    #[test]
    fn presets_differ_in_residency() {
        assert!(Config::in_memory().all_in_memory);
        assert!(!Config::balanced().all_in_memory);
        assert_eq!(Config::low_memory().strings.capacity, 0);
        assert!(Config::balanced().strings.capacity > 0);
        assert!(Config::balanced_temp().use_temp_file);
    }
}
