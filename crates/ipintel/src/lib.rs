//! A pure Rust IP intelligence lookup engine.
//!
//! The engine is the read path of an IP intelligence system: a binary data
//! file authored offline maps IPv4/IPv6 addresses to weighted property
//! values per component. One data set is shared read-only across any number
//! of threads, hot-swapped on reload, and queried through per-thread
//! [`Results`] objects:
//!
//! ```no_run
//! use ipintel::{Config, Manager, RequiredProperties, Results, StringBuilder};
//!
//! let manager = Manager::open_file(
//!     "intelligence.dat",
//!     Config::balanced(),
//!     RequiredProperties::Subset(vec!["IsAnonymous".into()]),
//! )?;
//! let mut results = Results::new(&manager);
//! results.from_ip_string("51.51.51.51")?;
//! let mut out = StringBuilder::unbounded();
//! results.write_values_string("IsAnonymous", "|", &mut out)?;
//! # Ok::<(), ipintel::Error>(())
//! ```

#![forbid(unsafe_code)]

pub mod bytes;
pub mod cache;
pub mod collection;
pub mod config;
pub mod dataset;
pub mod error;
pub mod evidence;
pub mod graph;
pub mod headers;
pub mod ip;
pub mod manager;
pub mod pool;
pub mod profiles;
pub mod results;
pub mod source;
pub mod strings;
pub mod wkb;

pub use cache::{CacheStats, LruCache};
pub use collection::{Collection, Item};
pub use config::{CollectionConfig, Config, LOADED_ALL};
pub use dataset::{Component, DataSet, RequiredProperties, RequiredProperty};
pub use error::{Error, NoValueReason};
pub use evidence::{EvidenceEntry, EvidencePrefix};
pub use graph::{Graph, GraphResult};
pub use headers::{HeaderTable, UniqueHeader};
pub use ip::{IpFamily, IpKey};
pub use manager::{Manager, ResourceManager};
pub use pool::FileHandlePool;
pub use results::{NetworkIdCursor, Results, WeightedValue};
pub use source::DataSource;
pub use strings::{StringBuilder, StringValue};
pub use wkb::{GeometryFormatter, WktFormatter};

/// Engine result type.
pub type Result<T> = std::result::Result<T, Error>;
