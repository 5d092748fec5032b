//! Profile, profile-group and profile-offset records.

use binrw::prelude::*;

/// A profile: the set of values one component assigns to a range of
/// addresses.
///
/// Variable-width: a 12-byte prefix followed by `value_indexes.len()` u32
/// indexes into the values collection, strictly ascending.
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileRecord {
    pub component_index: u32,
    pub profile_id: u32,
    #[bw(try_calc = u32::try_from(value_indexes.len()))]
    #[br(temp)]
    value_count: u32,
    #[br(count = value_count)]
    pub value_indexes: Vec<u32>,
}

impl ProfileRecord {
    /// Size of the fixed prefix read before the value count is known.
    pub const PREFIX_SIZE: u32 = 12;

    /// Full record size given the 12 prefix bytes.
    pub fn full_size(prefix: &[u8]) -> u32 {
        let count = u32::from_le_bytes([prefix[8], prefix[9], prefix[10], prefix[11]]);
        Self::PREFIX_SIZE + count.saturating_mul(4)
    }
}

/// One entry of a weighted profile group.
///
/// `raw_weight` sits on the 0x10000 fraction scale; the entries of a group
/// are walked until the running weight sum reaches exactly 0xFFFF.
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileGroupEntry {
    pub profile_offset_index: u32,
    pub raw_weight: u16,
}

impl ProfileGroupEntry {
    pub const ELEMENT_SIZE: u32 = 6;
}

/// The (id, offset) shape of the profile-offsets collection.
///
/// Ordered ascending by `profile_id` for binary search. The alternative
/// shape is a bare u32 offset; `ComponentGraphInfo::offsets_have_ids`
/// selects which shape a file carries.
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileOffsetPair {
    pub profile_id: u32,
    pub offset: u32,
}

impl ProfileOffsetPair {
    pub const ELEMENT_SIZE: u32 = 8;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipintel_tests::*;

    test_binrw! {
        ProfileRecord => two_values: ProfileRecord {
            component_index: 0,
            profile_id: 12345,
            value_indexes: vec![5, 9],
        } => "0000000039300000020000000500000009000000"
    }

    test_binrw! {
        ProfileGroupEntry => half_weight: ProfileGroupEntry {
            profile_offset_index: 7,
            raw_weight: 0x8000,
        } => "070000000080"
    }

    test_binrw! {
        ProfileOffsetPair => basic: ProfileOffsetPair {
            profile_id: 12345,
            offset: 0x40,
        } => "3930000040000000"
    }

    #[test]
    fn full_size_from_prefix() {
        let mut prefix = [0u8; 12];
        prefix[8..12].copy_from_slice(&3u32.to_le_bytes());
        assert_eq!(ProfileRecord::full_size(&prefix), 12 + 12);
    }
}
