//! Map records.

use binrw::prelude::*;

/// A map name referenced by properties through their map index range.
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapRecord {
    pub name_offset: u32,
}

impl MapRecord {
    pub const ELEMENT_SIZE: u32 = 4;
}
