//! Traversal cursor for one graph evaluation.

use std::cmp::Ordering;

use binrw::BinReaderExt;
use ipintel_fmt::{ClusterRecord, SpanRecord};

use super::Graph;
use super::bits;
use crate::bytes::ByteCursor;
use crate::ip::IpKey;
use crate::{Error, Result};

/// Outcome of testing the IP window against the current span's bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareResult {
    LessThanLow,
    EqualLow,
    InBetween,
    EqualHigh,
    GreaterThanHigh,
}

/// One decoded node record.
#[derive(Debug, Clone, Copy)]
struct Record {
    span_index: u32,
    low_flag: bool,
    value: u64,
}

struct LoadedCluster {
    record: ClusterRecord,
}

struct LoadedSpan {
    global_index: u32,
    length_low: u32,
    length_high: u32,
    low: [u8; 16],
    high: [u8; 16],
}

/// Walks the bit-packed trie for one IP key.
///
/// The cursor caches the cluster and span resolved for the current node;
/// both are refreshed after every move. `previous_high_index` records the
/// last node whose high bound the window matched exactly, which is where a
/// later below-low comparison resumes.
pub(super) struct Cursor<'a> {
    graph: &'a Graph,
    ip_bytes: &'a [u8],
    ip_bits: u32,
    window: [u8; 16],
    bit_index: u32,
    node_index: u32,
    record: Option<Record>,
    previous_high_index: u32,
    cluster: Option<LoadedCluster>,
    span: Option<LoadedSpan>,
    result: Option<u64>,
    steps_left: u32,
}

impl<'a> Cursor<'a> {
    pub(super) fn new(graph: &'a Graph, ip: &'a IpKey) -> Cursor<'a> {
        Cursor {
            graph,
            ip_bytes: ip.as_bytes(),
            ip_bits: ip.bit_len(),
            window: [0u8; 16],
            bit_index: 0,
            node_index: 0,
            record: None,
            previous_high_index: graph.info.entry_index,
            cluster: None,
            span: None,
            result: None,
            // One step per address bit bounds any valid traversal.
            steps_left: ip.bit_len(),
        }
    }

    pub(super) fn run(&mut self) -> Result<u64> {
        self.move_to(u64::from(self.graph.info.entry_index))?;
        loop {
            if let Some(value) = self.result {
                return Ok(value);
            }
            self.ensure_cluster()?;
            self.ensure_span()?;
            let (length_low, length_high) = {
                let span = self.span()?;
                (span.length_low, span.length_high)
            };
            match self.classify()? {
                CompareResult::LessThanLow => self.select_complete_low()?,
                CompareResult::EqualLow => {
                    self.bit_index += length_low;
                    self.select_low()?;
                }
                CompareResult::InBetween => self.select_complete_low_high()?,
                CompareResult::EqualHigh => {
                    self.bit_index += length_high;
                    self.select_high()?;
                }
                CompareResult::GreaterThanHigh => self.select_complete_high()?,
            }
            if let Some(value) = self.result {
                return Ok(value);
            }
            if self.bit_index >= self.ip_bits {
                // Address bits exhausted at an interior node: the last
                // extracted value wins and maps like a leaf.
                return Ok(self.record()?.value);
            }
        }
    }

    fn is_leaf(&self, value: u64) -> bool {
        value >= u64::from(self.graph.node_count)
    }

    fn finish(&mut self, value: u64) {
        self.result = Some(value);
    }

    fn move_to(&mut self, index: u64) -> Result<()> {
        if index >= u64::from(self.graph.node_count) {
            return Err(Error::corrupt(format!(
                "node index {index} outside the {}-node graph",
                self.graph.node_count
            )));
        }
        if self.steps_left == 0 {
            return Err(Error::corrupt("graph traversal exceeded its step bound"));
        }
        self.steps_left -= 1;
        self.node_index = index as u32;
        self.record = None;
        self.span = None;
        Ok(())
    }

    /// Decodes the record under the cursor, extracting all of its bits in
    /// one read so the low flag and value always agree.
    fn record(&mut self) -> Result<Record> {
        if let Some(record) = self.record {
            return Ok(record);
        }
        let descriptor = &self.graph.info.node_bits;
        let width = u32::from(descriptor.record_size_bits);
        let bit_start = u64::from(self.node_index) * u64::from(width);
        let first_byte = bit_start / 8;
        let skew = (bit_start % 8) as u32;
        let byte_len = (u64::from(skew) + u64::from(width)).div_ceil(8);
        let item = self
            .graph
            .nodes
            .get_bytes(first_byte as u32, byte_len as u32)?;
        let raw = bits::extract(&item, skew, width)?;

        let span_index = descriptor.span_index(raw);
        if span_index > 255 {
            return Err(Error::corrupt(format!(
                "span index {span_index} exceeds the cluster table"
            )));
        }
        let record = Record {
            span_index: span_index as u32,
            low_flag: descriptor.low_flag(raw),
            value: descriptor.value(raw),
        };
        self.record = Some(record);
        Ok(record)
    }

    fn cluster(&self) -> Result<&LoadedCluster> {
        self.cluster
            .as_ref()
            .ok_or(Error::NullPointer("graph cluster"))
    }

    fn span(&self) -> Result<&LoadedSpan> {
        self.span.as_ref().ok_or(Error::NullPointer("graph span"))
    }

    /// Resolves the cluster covering the current node, binary searching the
    /// ordered cluster array when the cached one no longer matches.
    fn ensure_cluster(&mut self) -> Result<()> {
        if let Some(cluster) = &self.cluster {
            if cluster.record.contains(self.node_index) {
                return Ok(());
            }
        }
        let target = self.node_index;
        let found = self.graph.clusters.binary_search_by(|item, _| {
            let mut cursor = ByteCursor::new(item);
            let start = cursor.read_u32()?;
            let end = cursor.read_u32()?;
            Ok(if target < start {
                Ordering::Greater
            } else if target > end {
                Ordering::Less
            } else {
                Ordering::Equal
            })
        })?;
        let index = found.ok_or_else(|| {
            Error::corrupt(format!("no cluster covers node index {target}"))
        })?;
        let item = self.graph.clusters.get_by_index(index)?;
        let record: ClusterRecord = binrw::io::Cursor::new(item.as_slice()).read_le()?;
        self.cluster = Some(LoadedCluster { record });
        Ok(())
    }

    /// Resolves and materialises the span the current record points at.
    fn ensure_span(&mut self) -> Result<()> {
        let record = self.record()?;
        let cluster = self.cluster()?;
        let global_index = cluster.record.span_indexes[record.span_index as usize];
        if let Some(span) = &self.span {
            if span.global_index == global_index {
                return Ok(());
            }
        }

        let item = self.graph.spans.get_by_index(global_index)?;
        let raw = SpanRecord {
            length_low: item[0],
            length_high: item[1],
            data: [item[2], item[3], item[4], item[5]],
        };
        let length_low = u32::from(raw.length_low);
        let length_high = u32::from(raw.length_high);
        if length_low > 128 || length_high > 128 {
            return Err(Error::corrupt(format!(
                "span bound of {} bits exceeds the address width",
                length_low.max(length_high)
            )));
        }

        let mut low = [0u8; 16];
        let mut high = [0u8; 16];
        if raw.is_inline() {
            bits::copy_window(&raw.data, 0, length_low, &mut low);
            bits::copy_window(&raw.data, length_low, length_high, &mut high);
        } else {
            let bytes = self
                .graph
                .span_bytes
                .get_bytes(raw.bytes_offset(), raw.bytes_len())?;
            bits::copy_window(&bytes, 0, length_low, &mut low);
            bits::copy_window(&bytes, length_low, length_high, &mut high);
        }

        if bits::window_value(&low, length_low) >= bits::window_value(&high, length_high) {
            return Err(Error::corrupt(
                "span low bound is not below its high bound",
            ));
        }

        self.span = Some(LoadedSpan {
            global_index,
            length_low,
            length_high,
            low,
            high,
        });
        Ok(())
    }

    /// Windows the IP at the current bit index and orders it against the
    /// span bounds.
    fn classify(&mut self) -> Result<CompareResult> {
        let (length_low, length_high, low, high) = {
            let span = self.span()?;
            (span.length_low, span.length_high, span.low, span.high)
        };
        let window_bits = length_low.max(length_high);
        bits::copy_window(self.ip_bytes, self.bit_index, window_bits, &mut self.window);

        Ok(match bits::compare(&self.window, &low, length_low) {
            Ordering::Less => CompareResult::LessThanLow,
            Ordering::Equal => CompareResult::EqualLow,
            Ordering::Greater => match bits::compare(&self.window, &high, length_high) {
                Ordering::Less => CompareResult::InBetween,
                Ordering::Equal => {
                    self.previous_high_index = self.node_index;
                    CompareResult::EqualHigh
                }
                Ordering::Greater => CompareResult::GreaterThanHigh,
            },
        })
    }

    /// Descends towards the low child: a set low flag carries it in the
    /// record's value, otherwise the next sequential node is the low child.
    fn select_low(&mut self) -> Result<()> {
        let record = self.record()?;
        if record.low_flag {
            if self.is_leaf(record.value) {
                self.finish(record.value);
                Ok(())
            } else {
                self.move_to(record.value)
            }
        } else {
            self.move_to(u64::from(self.node_index) + 1)
        }
    }

    /// Descends towards the high child: a set low flag means the high child
    /// lives in the following record.
    fn select_high(&mut self) -> Result<()> {
        let mut record = self.record()?;
        if record.low_flag {
            self.move_to(u64::from(self.node_index) + 1)?;
            record = self.record()?;
        }
        if self.is_leaf(record.value) {
            self.finish(record.value);
            Ok(())
        } else {
            self.move_to(record.value)
        }
    }

    fn select_complete_high(&mut self) -> Result<()> {
        while self.result.is_none() {
            self.select_high()?;
        }
        Ok(())
    }

    /// The window fell below the current low bound: resume at the last
    /// high-matched node, take its low branch, then run out high.
    fn select_complete_low(&mut self) -> Result<()> {
        self.move_to(u64::from(self.previous_high_index))?;
        self.select_low()?;
        if self.result.is_none() {
            self.select_complete_high()?;
        }
        Ok(())
    }

    fn select_complete_low_high(&mut self) -> Result<()> {
        self.select_low()?;
        if self.result.is_none() {
            self.select_complete_high()?;
        }
        Ok(())
    }
}
