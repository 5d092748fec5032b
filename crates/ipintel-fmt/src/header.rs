//! Data set file header.

use binrw::prelude::*;

use crate::{CollectionHeader, DateRecord, FileVersion};

/// The fixed-size header at byte 0 of every data file.
///
/// Carries the version gate, identity tags, publication dates, offsets into
/// the strings collection for the file's descriptive strings, and one
/// [`CollectionHeader`] per sub-collection in file order.
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataSetHeader {
    pub version: FileVersion,
    pub published: DateRecord,
    pub next_update: DateRecord,
    pub copyright_offset: u32,
    pub name_offset: u32,
    pub format_offset: u32,
    pub dataset_tag: [u8; 16],
    pub export_tag: [u8; 16],

    pub strings: CollectionHeader,
    pub components: CollectionHeader,
    pub maps: CollectionHeader,
    pub properties: CollectionHeader,
    pub values: CollectionHeader,
    pub profiles: CollectionHeader,
    pub graphs: CollectionHeader,
    pub profile_groups: CollectionHeader,
    pub property_types: CollectionHeader,
    pub profile_offsets: CollectionHeader,
}

impl DataSetHeader {
    pub const SIZE: u32 = FileVersion::SIZE
        + 2 * DateRecord::SIZE
        + 3 * 4
        + 2 * 16
        + 10 * CollectionHeader::SIZE;

    /// All sub-collection headers, in file order, with their names.
    pub fn collections(&self) -> [(&'static str, CollectionHeader); 10] {
        [
            ("strings", self.strings),
            ("components", self.components),
            ("maps", self.maps),
            ("properties", self.properties),
            ("values", self.values),
            ("profiles", self.profiles),
            ("graphs", self.graphs),
            ("profile-groups", self.profile_groups),
            ("property-types", self.property_types),
            ("profile-offsets", self.profile_offsets),
        ]
    }
}
