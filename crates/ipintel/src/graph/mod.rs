//! Component graph evaluation.
//!
//! Each graph is a bit-packed trie over one (component, IP version) pair.
//! Traversal slides a window along the address bits, testing it against the
//! current node's span bounds and descending low or high until a leaf maps
//! into the profile-offsets or profile-groups collection.

mod bits;
mod cursor;

pub use bits::{compare, copy_window, extract};

use ipintel_fmt::ComponentGraphInfo;

use crate::collection::{Backend, Collection, RecordLayout, layouts};
use crate::config::CollectionConfig;
use crate::ip::{IpFamily, IpKey};
use crate::{Error, Result};

/// Where a graph evaluation landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphResult {
    /// Index into the profile-offsets collection, or the profile-groups
    /// collection when `is_group` is set.
    pub offset: u32,
    pub is_group: bool,
}

/// One loaded component graph with its span, cluster and node collections.
pub struct Graph {
    info: ComponentGraphInfo,
    node_count: u32,
    span_bytes: Collection,
    spans: Collection,
    clusters: Collection,
    nodes: Collection,
}

impl Graph {
    /// Builds the graph's four collections and validates the descriptor.
    ///
    /// Span bytes and the node stream are byte-addressed, so they are never
    /// cached; `cfg` applies in full to the spans and clusters tables.
    pub fn new(info: ComponentGraphInfo, backend: &Backend, cfg: CollectionConfig) -> Result<Graph> {
        if info.ip_version != 4 && info.ip_version != 6 {
            return Err(Error::corrupt(format!(
                "graph declares IP version {}",
                info.ip_version
            )));
        }
        let record_bits = info.node_bits.record_size_bits;
        if record_bits == 0 || record_bits > 64 {
            return Err(Error::corrupt(format!(
                "node record size of {record_bits} bits is outside 1..=64"
            )));
        }
        let node_count = info.nodes.count;
        if node_count == 0 {
            return Err(Error::corrupt("graph has no nodes"));
        }
        if info.entry_index >= node_count {
            return Err(Error::corrupt(format!(
                "graph entry index {} outside its {node_count} nodes",
                info.entry_index
            )));
        }
        let needed_bits = u64::from(node_count) * u64::from(record_bits);
        if needed_bits > u64::from(info.nodes.length) * 8 {
            return Err(Error::corrupt(format!(
                "{node_count} node records do not fit in {} bytes",
                info.nodes.length
            )));
        }

        let raw = CollectionConfig {
            capacity: 0,
            ..cfg
        };
        Ok(Graph {
            node_count,
            span_bytes: Collection::new(
                "graph-span-bytes",
                backend,
                info.span_bytes,
                RecordLayout::bytes(),
                raw,
            )?,
            spans: Collection::new("graph-spans", backend, info.spans, layouts::spans(), cfg)?,
            clusters: Collection::new(
                "graph-clusters",
                backend,
                info.clusters,
                layouts::clusters(),
                cfg,
            )?,
            nodes: Collection::new("graph-nodes", backend, info.nodes, RecordLayout::bytes(), raw)?,
            info,
        })
    }

    pub fn component_id(&self) -> u8 {
        self.info.component_id
    }

    pub fn family(&self) -> IpFamily {
        if self.info.ip_version == 4 {
            IpFamily::V4
        } else {
            IpFamily::V6
        }
    }

    /// Whether this file's profile-offsets records carry profile ids.
    pub fn offsets_have_ids(&self) -> bool {
        self.info.offsets_have_ids != 0
    }

    /// Evaluates the graph for one address of the matching family.
    pub fn evaluate(&self, ip: &IpKey) -> Result<GraphResult> {
        if ip.family() != self.family() {
            return Err(Error::InvalidInput(format!(
                "cannot evaluate an IPv{} key against an IPv{} graph",
                ip.family().version(),
                self.info.ip_version
            )));
        }
        let value = cursor::Cursor::new(self, ip).run()?;
        self.map_result(value)
    }

    /// Maps a leaf value into the profile or profile-group range.
    fn map_result(&self, value: u64) -> Result<GraphResult> {
        let relative = value
            .checked_sub(u64::from(self.node_count))
            .ok_or_else(|| {
                Error::corrupt(format!(
                    "graph finished on interior value {value} (node count {})",
                    self.node_count
                ))
            })?;
        if relative < u64::from(self.info.profile_count) {
            return Ok(GraphResult {
                offset: self.info.first_profile_index + relative as u32,
                is_group: false,
            });
        }
        let group = relative - u64::from(self.info.profile_count);
        if group < u64::from(self.info.profile_group_count) {
            return Ok(GraphResult {
                offset: self.info.first_profile_group_index + group as u32,
                is_group: true,
            });
        }
        Err(Error::corrupt(format!(
            "leaf value {value} maps outside profiles and groups"
        )))
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Graph(component {}, IPv{}, {} nodes)",
            self.info.component_id, self.info.ip_version, self.node_count
        )
    }
}
