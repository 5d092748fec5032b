//! Data set construction and immutable lookup state.

use binrw::BinReaderExt;
use ipintel_fmt::{
    ComponentGraphInfo, ComponentRecord, DataSetHeader, PropertyRecord, StoredValueType,
    ValueRecord,
};

use crate::cache::CacheStats;
use crate::collection::{Backend, Collection, layouts};
use crate::config::Config;
use crate::graph::Graph;
use crate::headers::HeaderTable;
use crate::ip::IpFamily;
use crate::profiles::ProfileReader;
use crate::source::DataSource;
use crate::strings::StringValue;
use crate::{Error, Result};

/// A component materialised at bootstrap: record plus resolved name.
#[derive(Debug, Clone)]
pub struct Component {
    pub index: u32,
    pub record: ComponentRecord,
    pub name: String,
}

/// Which properties a caller wants served.
#[derive(Debug, Clone)]
pub enum RequiredProperties {
    /// Every property in the file.
    All,
    /// Only the named properties; every name must exist.
    Subset(Vec<String>),
}

/// One property resolved for serving: record, name and the stored
/// representation of its values.
#[derive(Debug, Clone)]
pub struct RequiredProperty {
    pub property_index: u32,
    pub record: PropertyRecord,
    pub name: String,
    pub stored_type: StoredValueType,
}

/// The immutable state every lookup runs against.
///
/// Built once from a source, shared read-only across threads, retired by
/// the manager when a reload replaces it. Sub-collections, components, the
/// header table and the required-property set never change after
/// construction.
pub struct DataSet {
    source: DataSource,
    header: DataSetHeader,

    strings: Collection,
    maps: Collection,
    properties: Collection,
    values: Collection,
    profiles: Collection,
    profile_groups: Collection,
    profile_offsets: Collection,
    offsets_have_ids: bool,

    components: Vec<Component>,
    graphs: Vec<Graph>,
    headers: HeaderTable,
    required: Vec<RequiredProperty>,
    /// Per component: indexes into `required`.
    component_required: Vec<Vec<u32>>,
    /// Value-index ranges per required property when the accelerator is on.
    value_ranges: Option<Vec<(u32, u32)>>,

    name: String,
    format: String,
    copyright: String,
}

impl DataSet {
    pub fn new(source: DataSource, config: &Config, required: &RequiredProperties) -> Result<DataSet> {
        config.validate()?;
        let backend = source.backend();

        let header = read_header(&backend)?;
        if !header.version.is_supported() {
            return Err(Error::IncorrectVersion {
                found: header.version.to_string(),
            });
        }
        for (name, collection) in header.collections() {
            if !collection.fits_within(source.size()) {
                return Err(Error::corrupt(format!(
                    "{name} collection does not fit inside the file"
                )));
            }
        }

        // Graph infos first: they decide the profile-offsets record shape.
        let graphs_collection = Collection::new(
            "graphs",
            &backend,
            header.graphs,
            layouts::graphs(),
            config.graphs,
        )?;
        let mut infos = Vec::with_capacity(graphs_collection.count() as usize);
        for index in 0..graphs_collection.count() {
            let item = graphs_collection.get_by_index(index)?;
            let info: ComponentGraphInfo = binrw::io::Cursor::new(item.as_slice()).read_le()?;
            infos.push(info);
        }
        let offsets_have_ids = match infos.first() {
            Some(first) => {
                let have_ids = first.offsets_have_ids != 0;
                if infos.iter().any(|i| (i.offsets_have_ids != 0) != have_ids) {
                    return Err(Error::corrupt(
                        "graphs disagree on the profile-offsets shape",
                    ));
                }
                have_ids
            }
            None => true,
        };

        let strings = Collection::new(
            "strings",
            &backend,
            header.strings,
            layouts::strings(),
            config.strings,
        )?;
        let maps = Collection::new("maps", &backend, header.maps, layouts::maps(), config.maps)?;
        let properties = Collection::new(
            "properties",
            &backend,
            header.properties,
            layouts::properties(),
            config.properties,
        )?;
        let values = Collection::new(
            "values",
            &backend,
            header.values,
            layouts::values(),
            config.values,
        )?;
        let profiles = Collection::new(
            "profiles",
            &backend,
            header.profiles,
            layouts::profiles(),
            config.profiles,
        )?;
        let profile_groups = Collection::new(
            "profile-groups",
            &backend,
            header.profile_groups,
            layouts::profile_groups(),
            config.profile_groups,
        )?;
        let property_types = Collection::new(
            "property-types",
            &backend,
            header.property_types,
            layouts::property_types(),
            config.property_types,
        )?;
        let profile_offsets = Collection::new(
            "profile-offsets",
            &backend,
            header.profile_offsets,
            layouts::profile_offsets(offsets_have_ids),
            config.profile_offsets,
        )?;

        let graphs = infos
            .into_iter()
            .map(|info| Graph::new(info, &backend, config.graph_data))
            .collect::<Result<Vec<_>>>()?;

        let components = read_components(
            &Collection::new(
                "components",
                &backend,
                header.components,
                layouts::components(),
                config.components,
            )?,
            &strings,
        )?;

        let header_names = components
            .iter()
            .flat_map(|component| component.record.pairs.iter())
            .map(|pair| string_text(&strings, pair.header_name_offset))
            .collect::<Result<Vec<_>>>()?;
        let headers = HeaderTable::build(header_names, config.uses_upper_prefixed_headers);

        let required_list = resolve_required(&properties, &property_types, &strings, required)?;
        let mut component_required: Vec<Vec<u32>> = vec![Vec::new(); components.len()];
        for (index, property) in required_list.iter().enumerate() {
            let component = property.record.component_index as usize;
            if component >= component_required.len() {
                return Err(Error::corrupt(format!(
                    "property {:?} names component {component}, but only {} exist",
                    property.name,
                    components.len()
                )));
            }
            component_required[component].push(index as u32);
        }

        let value_ranges = config.property_value_index.then(|| {
            required_list
                .iter()
                .map(|p| (p.record.first_value_index, p.record.last_value_index))
                .collect()
        });

        let name = string_text(&strings, header.name_offset).unwrap_or_default();
        let format = string_text(&strings, header.format_offset).unwrap_or_default();
        let copyright = string_text(&strings, header.copyright_offset).unwrap_or_default();

        log::debug!(
            "data set {:?} ({format}) loaded: {} components, {} graphs, {} required properties",
            name,
            components.len(),
            graphs.len(),
            required_list.len()
        );

        Ok(DataSet {
            source,
            header,
            strings,
            maps,
            properties,
            values,
            profiles,
            profile_groups,
            profile_offsets,
            offsets_have_ids,
            components,
            graphs,
            headers,
            required: required_list,
            component_required,
            value_ranges,
            name,
            format,
            copyright,
        })
    }

    // -- Metadata ----------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn copyright(&self) -> &str {
        &self.copyright
    }

    pub fn dataset_tag(&self) -> &[u8; 16] {
        &self.header.dataset_tag
    }

    pub fn export_tag(&self) -> &[u8; 16] {
        &self.header.export_tag
    }

    pub fn published(&self) -> Option<time::Date> {
        self.header.published.to_date().ok()
    }

    pub fn next_update(&self) -> Option<time::Date> {
        self.header.next_update.to_date().ok()
    }

    // -- Structure ---------------------------------------------------------

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// Total properties in the file, independent of the required subset.
    pub fn property_count(&self) -> u32 {
        self.properties.count()
    }

    pub fn headers(&self) -> &HeaderTable {
        &self.headers
    }

    pub fn required(&self) -> &[RequiredProperty] {
        &self.required
    }

    pub fn required_property(&self, index: u32) -> Option<&RequiredProperty> {
        self.required.get(index as usize)
    }

    /// Indexes into [`DataSet::required`] served by one component.
    pub fn component_required(&self, component_index: u32) -> &[u32] {
        self.component_required
            .get(component_index as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn component_has_required(&self, component_index: u32) -> bool {
        !self.component_required(component_index).is_empty()
    }

    pub fn graph_for(&self, component_id: u8, family: IpFamily) -> Option<&Graph> {
        self.graphs
            .iter()
            .find(|graph| graph.component_id() == component_id && graph.family() == family)
    }

    pub fn profile_reader(&self) -> ProfileReader<'_> {
        ProfileReader::new(
            &self.profiles,
            &self.profile_offsets,
            &self.profile_groups,
            self.offsets_have_ids,
        )
    }

    /// The accelerator's value-index range for a required property, when
    /// built.
    pub fn value_range(&self, required_index: u32) -> Option<(u32, u32)> {
        self.value_ranges
            .as_ref()
            .and_then(|ranges| ranges.get(required_index as usize))
            .copied()
    }

    // -- Record access -----------------------------------------------------

    pub fn string_value(&self, offset: u32) -> Result<StringValue> {
        StringValue::new(self.strings.get_by_offset(offset)?)
    }

    pub fn string_text(&self, offset: u32) -> Result<String> {
        string_text(&self.strings, offset)
    }

    pub fn value_record(&self, index: u32) -> Result<ValueRecord> {
        let item = self.values.get_by_index(index)?;
        Ok(binrw::io::Cursor::new(item.as_slice()).read_le()?)
    }

    /// Names of the maps a property belongs to.
    pub fn property_maps(&self, property: &RequiredProperty) -> Result<Vec<String>> {
        let mut names = Vec::with_capacity(property.record.map_count as usize);
        for i in 0..property.record.map_count {
            let item = self.maps.get_by_index(property.record.first_map_index + i)?;
            let mut cursor = crate::bytes::ByteCursor::new(&item);
            names.push(string_text(&self.strings, cursor.read_u32()?)?);
        }
        Ok(names)
    }

    /// Hit/miss counters of every cached collection.
    pub fn cache_stats(&self) -> Vec<(&'static str, CacheStats)> {
        [
            &self.strings,
            &self.maps,
            &self.properties,
            &self.values,
            &self.profiles,
            &self.profile_groups,
            &self.profile_offsets,
        ]
        .into_iter()
        .filter_map(|c| c.cache_stats().map(|stats| (c.name(), stats)))
        .collect()
    }

    pub fn source(&self) -> &DataSource {
        &self.source
    }
}

impl std::fmt::Debug for DataSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSet")
            .field("name", &self.name)
            .field("components", &self.components.len())
            .field("graphs", &self.graphs.len())
            .field("required", &self.required.len())
            .finish()
    }
}

fn read_header(backend: &Backend) -> Result<DataSetHeader> {
    let bytes = match backend {
        Backend::Memory(data) => {
            if data.len() < DataSetHeader::SIZE as usize {
                return Err(Error::corrupt("file is shorter than the header"));
            }
            data[..DataSetHeader::SIZE as usize].to_vec()
        }
        Backend::File { pool, file_size } => {
            if *file_size < u64::from(DataSetHeader::SIZE) {
                return Err(Error::corrupt("file is shorter than the header"));
            }
            let mut buf = vec![0u8; DataSetHeader::SIZE as usize];
            pool.get()?.read_exact_at(0, &mut buf)?;
            buf
        }
    };
    Ok(binrw::io::Cursor::new(bytes).read_le()?)
}

fn string_text(strings: &Collection, offset: u32) -> Result<String> {
    let value = StringValue::new(strings.get_by_offset(offset)?)?;
    Ok(value.as_text()?.to_string())
}

fn read_components(collection: &Collection, strings: &Collection) -> Result<Vec<Component>> {
    let mut components = Vec::with_capacity(collection.count() as usize);
    collection.for_each(|_, item| {
        let record: ComponentRecord = binrw::io::Cursor::new(item.as_slice()).read_le()?;
        let name = string_text(strings, record.name_offset)?;
        components.push(Component {
            index: components.len() as u32,
            record,
            name,
        });
        Ok(())
    })?;
    Ok(components)
}

/// Reads every property record, then keeps the requested subset with names
/// and stored types resolved.
fn resolve_required(
    properties: &Collection,
    property_types: &Collection,
    strings: &Collection,
    required: &RequiredProperties,
) -> Result<Vec<RequiredProperty>> {
    let mut resolved = Vec::new();
    for index in 0..properties.count() {
        let item = properties.get_by_index(index)?;
        let record: PropertyRecord = binrw::io::Cursor::new(item.as_slice()).read_le()?;
        drop(item);
        let name = string_text(strings, record.name_offset)?;

        let wanted = match required {
            RequiredProperties::All => true,
            RequiredProperties::Subset(names) => {
                names.iter().any(|n| n.eq_ignore_ascii_case(&name))
            }
        };
        if !wanted {
            continue;
        }

        let stored_type = stored_type_for(property_types, &record)?;
        resolved.push(RequiredProperty {
            property_index: index,
            record,
            name,
            stored_type,
        });
    }

    if let RequiredProperties::Subset(names) = required {
        for name in names {
            if !resolved.iter().any(|p| p.name.eq_ignore_ascii_case(name)) {
                return Err(Error::RequiredPropertyNotPresent(name.clone()));
            }
        }
    }
    Ok(resolved)
}

/// The stored representation comes from the property-types table, searched
/// by the property's name offset; the record's own value type is the
/// fallback for files that omit the entry.
fn stored_type_for(property_types: &Collection, record: &PropertyRecord) -> Result<StoredValueType> {
    let target = record.name_offset;
    let found = property_types.binary_search_by(|item, _| {
        let mut cursor = crate::bytes::ByteCursor::new(item);
        Ok(cursor.read_u32()?.cmp(&target))
    })?;
    let raw = match found {
        Some(index) => property_types.get_by_index(index)?[4],
        None => record.value_type,
    };
    StoredValueType::try_from(raw).map_err(Error::UnsupportedStoredValueType)
}
