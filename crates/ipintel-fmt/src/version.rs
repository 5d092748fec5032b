//! Data file version record.

use binrw::prelude::*;

/// Four-part version stamp at the start of the data file header.
///
/// Only the `(major, minor)` pair gates loading; build and revision are
/// informational.
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileVersion {
    pub major: i32,
    pub minor: i32,
    pub build: i32,
    pub revision: i32,
}

impl FileVersion {
    pub const SIZE: u32 = 16;

    /// The `(major, minor)` pair this reader understands.
    pub const SUPPORTED: (i32, i32) = (4, 4);

    /// Whether a file with this version may be loaded.
    pub fn is_supported(&self) -> bool {
        (self.major, self.minor) == Self::SUPPORTED
    }
}

impl std::fmt::Display for FileVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}
