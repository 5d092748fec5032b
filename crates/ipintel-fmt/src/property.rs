//! Property records.

use binrw::prelude::*;
use modular_bitfield::prelude::*;

/// Property behaviour flags, packed into one byte.
#[bitfield]
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct PropertyFlags {
    pub mandatory: bool,
    pub is_list: bool,
    pub show_values: bool,
    pub is_obsolete: bool,
    pub show: bool,
    #[skip]
    __: B3,
}

impl std::fmt::Debug for PropertyFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyFlags")
            .field("mandatory", &self.mandatory())
            .field("is_list", &self.is_list())
            .field("show_values", &self.show_values())
            .field("is_obsolete", &self.is_obsolete())
            .field("show", &self.show())
            .finish()
    }
}

/// A property definition.
///
/// Fixed-width, 40 bytes. `first_value_index..=last_value_index` is the
/// inclusive range of this property's entries in the values collection;
/// `value_type` is a [`StoredValueType`](crate::StoredValueType) raw value.
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyRecord {
    pub component_index: u8,
    pub display_order: u8,
    #[br(map = |b: u8| PropertyFlags::from_bytes([b]))]
    #[bw(map = |flags: &PropertyFlags| flags.into_bytes()[0])]
    pub flags: PropertyFlags,
    pub value_type: u8,
    pub default_value_index: u32,
    pub name_offset: u32,
    pub description_offset: u32,
    pub category_offset: u32,
    pub url_offset: u32,
    pub first_value_index: u32,
    pub last_value_index: u32,
    pub map_count: u32,
    pub first_map_index: u32,
}

impl PropertyRecord {
    pub const ELEMENT_SIZE: u32 = 40;

    /// Number of entries this property owns in the values collection.
    pub fn value_span(&self) -> u32 {
        self.last_value_index
            .saturating_sub(self.first_value_index)
            .saturating_add(1)
    }
}
