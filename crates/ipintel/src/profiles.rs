//! Profile materialisation and weighted group expansion.

use binrw::BinReaderExt;
use ipintel_fmt::{ProfileRecord, WEIGHT_SCALE, WEIGHT_TOTAL};

use crate::bytes::ByteCursor;
use crate::collection::Collection;
use crate::graph::GraphResult;
use crate::{Error, Result};

/// A profile paired with its weighting on the 0x10000 fraction scale.
///
/// Group entries carry their stored 16-bit weighting; a single-profile
/// result carries the full scale, so it reads as a fraction of exactly one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightedProfile {
    pub profile: ProfileRecord,
    pub raw_weight: u32,
}

/// Resolves graph results against the profile collections.
pub struct ProfileReader<'a> {
    profiles: &'a Collection,
    profile_offsets: &'a Collection,
    profile_groups: &'a Collection,
    offsets_have_ids: bool,
}

impl<'a> ProfileReader<'a> {
    pub fn new(
        profiles: &'a Collection,
        profile_offsets: &'a Collection,
        profile_groups: &'a Collection,
        offsets_have_ids: bool,
    ) -> ProfileReader<'a> {
        ProfileReader {
            profiles,
            profile_offsets,
            profile_groups,
            offsets_have_ids,
        }
    }

    /// Reads entry `index` of the profile-offsets collection, returning the
    /// profile's byte offset and, when the file stores them, its id.
    pub fn offset_entry(&self, index: u32) -> Result<(Option<u32>, u32)> {
        let item = self.profile_offsets.get_by_index(index)?;
        let mut cursor = ByteCursor::new(&item);
        if self.offsets_have_ids {
            let id = cursor.read_u32()?;
            let offset = cursor.read_u32()?;
            Ok((Some(id), offset))
        } else {
            Ok((None, cursor.read_u32()?))
        }
    }

    /// Materialises the profile record at a byte offset into the profiles
    /// collection.
    pub fn read_at(&self, offset: u32) -> Result<ProfileRecord> {
        let item = self.profiles.get_by_offset(offset)?;
        let record: ProfileRecord = binrw::io::Cursor::new(item.as_slice()).read_le()?;
        Ok(record)
    }

    /// Binary search by profile id over the (id, offset) shape.
    pub fn find_by_id(&self, profile_id: u32) -> Result<Option<u32>> {
        if !self.offsets_have_ids {
            return Err(Error::CollectionFailure(
                "profile offsets carry no ids in this data set".into(),
            ));
        }
        let found = self.profile_offsets.binary_search_by(|item, _| {
            let mut cursor = ByteCursor::new(item);
            let id = cursor.read_u32()?;
            Ok(id.cmp(&profile_id))
        })?;
        match found {
            Some(index) => Ok(Some(self.offset_entry(index)?.1)),
            None => Ok(None),
        }
    }

    /// Expands a graph result into its weighted profiles.
    ///
    /// A single-profile result carries the full weight. A group walks its
    /// entries until the running weight reaches 0xFFFF exactly; a sum that
    /// overshoots is corrupt, as is a group that references an empty
    /// profile.
    pub fn expand(&self, result: &GraphResult) -> Result<Vec<WeightedProfile>> {
        if !result.is_group {
            let (_, offset) = self.offset_entry(result.offset)?;
            let profile = self.read_at(offset)?;
            return Ok(vec![WeightedProfile {
                profile,
                raw_weight: WEIGHT_SCALE,
            }]);
        }

        let mut expanded = Vec::new();
        let mut sum = 0u32;
        let mut index = result.offset;
        loop {
            if index >= self.profile_groups.count() {
                return Err(Error::corrupt(format!(
                    "profile group at {} ends at weight {sum:#x}, short of the total",
                    result.offset
                )));
            }
            let item = self.profile_groups.get_by_index(index)?;
            let mut cursor = ByteCursor::new(&item);
            let offset_index = cursor.read_u32()?;
            let raw_weight = cursor.read_u16()?;

            sum += u32::from(raw_weight);
            if sum > u32::from(WEIGHT_TOTAL) {
                return Err(Error::corrupt(format!(
                    "profile group at {} overshoots the weight total ({sum:#x})",
                    result.offset
                )));
            }

            let (_, offset) = self.offset_entry(offset_index)?;
            let profile = self.read_at(offset)?;
            if profile.value_indexes.is_empty() {
                return Err(Error::EmptyProfile(offset));
            }
            expanded.push(WeightedProfile {
                profile,
                raw_weight: u32::from(raw_weight),
            });

            if sum == u32::from(WEIGHT_TOTAL) {
                return Ok(expanded);
            }
            index += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::{Backend, RecordLayout, layouts};
    use crate::config::CollectionConfig;
    use ipintel_fmt::CollectionHeader;
    use std::sync::Arc;

    /// Builds an image holding: two profiles, a three-entry offsets table
    /// (ids 10, 20, 30), and one two-entry group splitting 0x8000/0x7fff.
    fn fixture() -> (Collection, Collection, Collection) {
        let mut image = Vec::new();

        let profiles_start = image.len();
        let mut profile_a = 0u32.to_le_bytes().to_vec(); // component 0
        profile_a.extend_from_slice(&111u32.to_le_bytes()); // id
        profile_a.extend_from_slice(&2u32.to_le_bytes()); // two values
        profile_a.extend_from_slice(&0u32.to_le_bytes());
        profile_a.extend_from_slice(&3u32.to_le_bytes());
        let profile_b_offset = profile_a.len() as u32;
        let mut profile_b = 0u32.to_le_bytes().to_vec();
        profile_b.extend_from_slice(&222u32.to_le_bytes());
        profile_b.extend_from_slice(&1u32.to_le_bytes());
        profile_b.extend_from_slice(&5u32.to_le_bytes());
        image.extend_from_slice(&profile_a);
        image.extend_from_slice(&profile_b);
        let profiles_len = image.len() - profiles_start;

        let offsets_start = image.len();
        for (id, offset) in [(10u32, 0u32), (20, profile_b_offset), (30, 0)] {
            image.extend_from_slice(&id.to_le_bytes());
            image.extend_from_slice(&offset.to_le_bytes());
        }

        let groups_start = image.len();
        for (offset_index, weight) in [(0u32, 0x8000u16), (1, 0x7fff)] {
            image.extend_from_slice(&offset_index.to_le_bytes());
            image.extend_from_slice(&weight.to_le_bytes());
        }
        let image_len = image.len();

        let backend = Backend::Memory(Arc::from(image));
        let profiles = Collection::new(
            "profiles",
            &backend,
            CollectionHeader {
                start_position: profiles_start as u32,
                length: profiles_len as u32,
                count: 2,
            },
            layouts::profiles(),
            CollectionConfig::none(),
        )
        .unwrap();
        let offsets = Collection::new(
            "profile-offsets",
            &backend,
            CollectionHeader {
                start_position: offsets_start as u32,
                length: 24,
                count: 3,
            },
            layouts::profile_offsets(true),
            CollectionConfig::none(),
        )
        .unwrap();
        let groups = Collection::new(
            "profile-groups",
            &backend,
            CollectionHeader {
                start_position: groups_start as u32,
                length: (image_len - groups_start) as u32,
                count: 2,
            },
            layouts::profile_groups(),
            CollectionConfig::none(),
        )
        .unwrap();
        (profiles, offsets, groups)
    }

    #[test]
    fn single_profile_gets_full_weight() {
        let (profiles, offsets, groups) = fixture();
        let reader = ProfileReader::new(&profiles, &offsets, &groups, true);
        let expanded = reader
            .expand(&GraphResult {
                offset: 1,
                is_group: false,
            })
            .unwrap();
        assert_eq!(expanded.len(), 1);
        assert_eq!(expanded[0].profile.profile_id, 222);
        assert_eq!(expanded[0].raw_weight, 0x1_0000);
    }

    #[test]
    fn group_walk_stops_at_exact_weight_total() {
        let (profiles, offsets, groups) = fixture();
        let reader = ProfileReader::new(&profiles, &offsets, &groups, true);
        let expanded = reader
            .expand(&GraphResult {
                offset: 0,
                is_group: true,
            })
            .unwrap();
        assert_eq!(expanded.len(), 2);
        assert_eq!(expanded[0].profile.profile_id, 111);
        assert_eq!(expanded[0].raw_weight, 0x8000);
        assert_eq!(expanded[1].profile.profile_id, 222);
        assert_eq!(expanded[1].raw_weight, 0x7fff);
        let total: u32 = expanded.iter().map(|w| w.raw_weight).sum();
        assert_eq!(total, 0xffff);
    }

    #[test]
    fn find_by_id_binary_searches() {
        let (profiles, offsets, groups) = fixture();
        let reader = ProfileReader::new(&profiles, &offsets, &groups, true);
        assert_eq!(reader.find_by_id(20).unwrap(), Some(20));
        assert_eq!(reader.find_by_id(21).unwrap(), None);
    }

    #[test]
    fn undershooting_group_is_corrupt() {
        let (profiles, offsets, groups) = fixture();
        let reader = ProfileReader::new(&profiles, &offsets, &groups, true);
        // Starting at the second entry leaves only 0x7fff of weight before
        // the collection ends.
        let err = reader
            .expand(&GraphResult {
                offset: 1,
                is_group: true,
            })
            .unwrap_err();
        assert!(matches!(err, Error::CorruptData(_)));
    }

    #[test]
    fn overshooting_group_is_corrupt() {
        // A group whose single entry weighs 0xfffe followed by 0x0002.
        let mut image = Vec::new();
        let mut profile = 0u32.to_le_bytes().to_vec();
        profile.extend_from_slice(&1u32.to_le_bytes());
        profile.extend_from_slice(&1u32.to_le_bytes());
        profile.extend_from_slice(&0u32.to_le_bytes());
        image.extend_from_slice(&profile);
        let offsets_start = image.len();
        image.extend_from_slice(&1u32.to_le_bytes());
        image.extend_from_slice(&0u32.to_le_bytes());
        let groups_start = image.len();
        for (offset_index, weight) in [(0u32, 0xfffeu16), (0, 0x0002)] {
            image.extend_from_slice(&offset_index.to_le_bytes());
            image.extend_from_slice(&weight.to_le_bytes());
        }
        let image_len = image.len();

        let backend = Backend::Memory(Arc::from(image));
        let profiles = Collection::new(
            "profiles",
            &backend,
            CollectionHeader {
                start_position: 0,
                length: offsets_start as u32,
                count: 1,
            },
            layouts::profiles(),
            CollectionConfig::none(),
        )
        .unwrap();
        let offsets = Collection::new(
            "profile-offsets",
            &backend,
            CollectionHeader {
                start_position: offsets_start as u32,
                length: 8,
                count: 1,
            },
            layouts::profile_offsets(true),
            CollectionConfig::none(),
        )
        .unwrap();
        let groups = Collection::new(
            "profile-groups",
            &backend,
            CollectionHeader {
                start_position: groups_start as u32,
                length: (image_len - groups_start) as u32,
                count: 2,
            },
            layouts::profile_groups(),
            CollectionConfig::none(),
        )
        .unwrap();

        let reader = ProfileReader::new(&profiles, &offsets, &groups, true);
        let err = reader
            .expand(&GraphResult {
                offset: 0,
                is_group: true,
            })
            .unwrap_err();
        assert!(matches!(err, Error::CorruptData(_)));
    }
}
