//! Component graph records: graph info, node bit-packing descriptor,
//! clusters and spans.

use binrw::prelude::*;

use crate::CollectionHeader;

/// Describes how node records are packed into the nodes byte stream.
///
/// Records are `record_size_bits` wide and laid out from the most
/// significant bit of each successive byte. Once a record has been extracted
/// right-aligned into a `u64`, the three (mask, shift) pairs produce the
/// span-index-in-cluster, the low flag and the child-or-leaf value.
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeDescriptor {
    pub record_size_bits: u8,
    pub span_index_mask: u64,
    pub span_index_shift: u8,
    pub low_flag_mask: u64,
    pub low_flag_shift: u8,
    pub value_mask: u64,
    pub value_shift: u8,
}

impl NodeDescriptor {
    pub const SIZE: u32 = 28;

    /// Builds the canonical layout `[span index][low flag][value]`, most
    /// significant bits first, from the two field widths.
    pub fn packed(span_index_bits: u8, value_bits: u8) -> Self {
        let value_mask = (1u64 << value_bits) - 1;
        let low_flag_shift = value_bits;
        let span_index_shift = value_bits + 1;
        NodeDescriptor {
            record_size_bits: span_index_bits + 1 + value_bits,
            span_index_mask: ((1u64 << span_index_bits) - 1) << span_index_shift,
            span_index_shift,
            low_flag_mask: 1u64 << low_flag_shift,
            low_flag_shift,
            value_mask,
            value_shift: 0,
        }
    }

    pub fn span_index(&self, raw: u64) -> u64 {
        (raw & self.span_index_mask) >> self.span_index_shift
    }

    pub fn low_flag(&self, raw: u64) -> bool {
        (raw & self.low_flag_mask) >> self.low_flag_shift != 0
    }

    pub fn value(&self, raw: u64) -> u64 {
        (raw & self.value_mask) >> self.value_shift
    }
}

/// One graph per (component, IP version) pair.
///
/// `entry_index` is the root node; the profile ranges map leaf values to the
/// profile-offsets and profile-groups collections. The four trailing
/// collection headers place this graph's span bytes, spans, clusters and
/// bit-packed nodes inside the file.
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentGraphInfo {
    pub ip_version: u8,
    pub component_id: u8,
    /// Non-zero when the profile-offsets collection stores (id, offset)
    /// pairs rather than bare offsets.
    pub offsets_have_ids: u8,
    pub entry_index: u32,
    pub first_profile_index: u32,
    pub profile_count: u32,
    pub first_profile_group_index: u32,
    pub profile_group_count: u32,
    pub node_bits: NodeDescriptor,
    pub span_bytes: CollectionHeader,
    pub spans: CollectionHeader,
    pub clusters: CollectionHeader,
    pub nodes: CollectionHeader,
}

impl ComponentGraphInfo {
    pub const ELEMENT_SIZE: u32 = 3 + 5 * 4 + NodeDescriptor::SIZE + 4 * CollectionHeader::SIZE;
}

/// A contiguous range of node indices sharing one span-index table.
///
/// Clusters partition `[0, node_count)`; the 256-entry table maps a node
/// record's local span index to a global index into the spans collection.
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterRecord {
    pub start_index: u32,
    /// Inclusive.
    pub end_index: u32,
    pub span_indexes: [u32; 256],
}

impl ClusterRecord {
    pub const ELEMENT_SIZE: u32 = 8 + 256 * 4;

    pub fn contains(&self, node_index: u32) -> bool {
        self.start_index <= node_index && node_index <= self.end_index
    }
}

/// A span: variable-width low/high key bounds tested against a window of IP
/// bits.
///
/// When `length_low + length_high <= 32` the two bounds are packed into the
/// four `data` bytes directly (low bits first, most significant bit first);
/// otherwise `data` is a little-endian u32 offset into the graph's span
/// bytes where the concatenated bounds live.
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpanRecord {
    pub length_low: u8,
    pub length_high: u8,
    pub data: [u8; 4],
}

impl SpanRecord {
    pub const ELEMENT_SIZE: u32 = 6;

    pub fn total_bits(&self) -> u32 {
        u32::from(self.length_low) + u32::from(self.length_high)
    }

    /// Whether the bounds are stored inline in `data`.
    pub fn is_inline(&self) -> bool {
        self.total_bits() <= 32
    }

    /// Offset into the span-bytes collection; meaningful only when the
    /// bounds are not inline.
    pub fn bytes_offset(&self) -> u32 {
        u32::from_le_bytes(self.data)
    }

    /// Number of span-bytes this span occupies when not inline.
    pub fn bytes_len(&self) -> u32 {
        self.total_bits().div_ceil(8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipintel_tests::*;

    #[test]
    fn packed_descriptor_extracts_fields() {
        let d = NodeDescriptor::packed(2, 5);
        assert_eq!(d.record_size_bits, 8);
        // [span=0b10][low=1][value=0b00111]
        let raw = 0b10_1_00111u64;
        assert_eq!(d.span_index(raw), 2);
        assert!(d.low_flag(raw));
        assert_eq!(d.value(raw), 7);

        let raw = 0b01_0_11111u64;
        assert_eq!(d.span_index(raw), 1);
        assert!(!d.low_flag(raw));
        assert_eq!(d.value(raw), 31);
    }

    test_binrw! {
        SpanRecord => inline: SpanRecord {
            length_low: 4,
            length_high: 4,
            data: [0x12, 0x00, 0x00, 0x00],
        } => "040412000000"
    }

    #[test]
    fn span_inline_selection() {
        let inline = SpanRecord {
            length_low: 16,
            length_high: 16,
            data: [0; 4],
        };
        assert!(inline.is_inline());

        let via_offset = SpanRecord {
            length_low: 17,
            length_high: 16,
            data: 0x30u32.to_le_bytes(),
        };
        assert!(!via_offset.is_inline());
        assert_eq!(via_offset.bytes_offset(), 0x30);
        assert_eq!(via_offset.bytes_len(), 5);
    }

    #[test]
    fn cluster_round_trip() {
        use binrw::io::Cursor;
        use binrw::{BinReaderExt, BinWriterExt};

        let mut span_indexes = [0u32; 256];
        span_indexes[0] = 3;
        span_indexes[1] = 9;
        let cluster = ClusterRecord {
            start_index: 0,
            end_index: 14,
            span_indexes,
        };

        let mut cursor = Cursor::new(Vec::new());
        cursor.write_le(&cluster).unwrap();
        let bytes = cursor.into_inner();
        assert_eq!(bytes.len() as u32, ClusterRecord::ELEMENT_SIZE);

        let parsed: ClusterRecord = Cursor::new(&bytes).read_le().unwrap();
        assert_eq!(parsed, cluster);
        assert!(parsed.contains(0));
        assert!(parsed.contains(14));
        assert!(!parsed.contains(15));
    }

    #[test]
    fn graph_info_element_size() {
        use binrw::BinWriterExt;
        use binrw::io::Cursor;

        let zero = CollectionHeader {
            start_position: 0,
            length: 0,
            count: 0,
        };
        let info = ComponentGraphInfo {
            ip_version: 4,
            component_id: 1,
            offsets_have_ids: 1,
            entry_index: 0,
            first_profile_index: 0,
            profile_count: 2,
            first_profile_group_index: 0,
            profile_group_count: 1,
            node_bits: NodeDescriptor::packed(4, 11),
            span_bytes: zero,
            spans: zero,
            clusters: zero,
            nodes: zero,
        };
        let mut cursor = Cursor::new(Vec::new());
        cursor.write_le(&info).unwrap();
        assert_eq!(
            cursor.into_inner().len() as u32,
            ComponentGraphInfo::ELEMENT_SIZE
        );
    }
}
