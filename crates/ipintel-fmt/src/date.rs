//! Calendar date record used for the published / next-update stamps.

use binrw::prelude::*;

/// A packed calendar date: year, month, day.
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRecord {
    pub year: i16,
    pub month: u8,
    pub day: u8,
}

impl DateRecord {
    pub const SIZE: u32 = 4;

    /// Converts to a calendar [`time::Date`], failing on out-of-range
    /// components (a zeroed record is common in test files).
    pub fn to_date(self) -> Result<time::Date, time::error::ComponentRange> {
        time::Date::from_calendar_date(
            i32::from(self.year),
            time::Month::try_from(self.month)?,
            self.day,
        )
    }
}
