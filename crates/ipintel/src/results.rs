//! Per-lookup results: weighted values, diagnostics and serialisations.

use std::sync::Arc;

use ipintel_fmt::{StoredValueType, ValueRecord, WEIGHT_SCALE};

use crate::dataset::DataSet;
use crate::error::NoValueReason;
use crate::evidence::{self, EvidenceEntry};
use crate::graph::GraphResult;
use crate::ip::IpKey;
use crate::strings::{StringBuilder, StringValue};
use crate::wkb::{GeometryFormatter, WktFormatter};
use crate::{Error, Result};

/// One component's outcome for the processed address.
#[derive(Debug)]
pub struct ResultIpi {
    pub component_index: u32,
    pub graph_result: Option<GraphResult>,
    pub target_ip: IpKey,
}

/// A value with the raw 16-bit weight its profile carried.
pub struct WeightedValue {
    pub record: ValueRecord,
    value: StringValue,
    stored_type: StoredValueType,
    /// On the 0x10000 fraction scale; the full scale for a single-profile
    /// result, the stored 16-bit weighting for a group entry.
    pub raw_weight: u32,
}

impl WeightedValue {
    /// The raw stored value.
    pub fn raw(&self) -> &StringValue {
        &self.value
    }

    pub fn stored_type(&self) -> StoredValueType {
        self.stored_type
    }

    /// Weight as a fraction of one: the raw weighting over 0x10000, so
    /// 0x8000 is exactly 0.5.
    pub fn weight(&self) -> f64 {
        f64::from(self.raw_weight) / f64::from(WEIGHT_SCALE)
    }

    /// Converts the stored value to display text per its representation.
    pub fn display(&self, geometry: &dyn GeometryFormatter) -> Result<String> {
        Ok(match self.stored_type {
            StoredValueType::String | StoredValueType::Javascript => {
                self.value.as_text()?.to_string()
            }
            StoredValueType::Integer => self.value.as_i32()?.to_string(),
            StoredValueType::Double | StoredValueType::Float => {
                format!("{}", f64::from(self.value.as_f32()?))
            }
            StoredValueType::Boolean => {
                if self.value.as_bool()? {
                    "True".to_string()
                } else {
                    "False".to_string()
                }
            }
            StoredValueType::Byte => self.value.as_byte()?.to_string(),
            StoredValueType::Short => self.value.as_i16()?.to_string(),
            StoredValueType::Azimuth => {
                format!(
                    "{}",
                    f64::from(self.value.as_i16()?) * 180.0 / f64::from(i16::MAX)
                )
            }
            StoredValueType::Declination => {
                format!(
                    "{}",
                    f64::from(self.value.as_i16()?) * 90.0 / f64::from(i16::MAX)
                )
            }
            StoredValueType::IpAddress => IpKey::from_slice(self.value.payload())?.to_string(),
            StoredValueType::WellKnownBinary => {
                let mut out = StringBuilder::unbounded();
                geometry.format(self.value.payload(), &mut out)?;
                out.into_string()
            }
            StoredValueType::Coordinate => {
                return Err(Error::UnsupportedStoredValueType(
                    StoredValueType::Coordinate as u8,
                ));
            }
        })
    }
}

impl std::fmt::Debug for WeightedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "WeightedValue({}, weight {:#06x})",
            self.stored_type, self.raw_weight
        )
    }
}

/// Resume point for chunked network-id serialisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetworkIdCursor {
    pub result_index: u32,
    pub component_profile_index: u32,
}

/// Per-thread lookup scratch over one borrowed data set.
///
/// Holds one [`ResultIpi`] per participating component plus the value list
/// the last `get_values` resolved. Value entries borrow from the strings
/// collection; the borrows release on the next `get_values` or on drop. A
/// `Results` pins the data set it was created against, so a concurrent
/// reload never invalidates it mid-use.
pub struct Results {
    dataset: Arc<DataSet>,
    items: Vec<ResultIpi>,
    values: Vec<WeightedValue>,
    values_for: Option<u32>,
    geometry: Box<dyn GeometryFormatter>,
}

impl Results {
    pub fn new(manager: &crate::manager::Manager) -> Results {
        Results::over(manager.dataset())
    }

    /// Builds a results object pinned to one specific data set.
    pub fn over(dataset: Arc<DataSet>) -> Results {
        Results {
            dataset,
            items: Vec::new(),
            values: Vec::new(),
            values_for: None,
            geometry: Box::new(WktFormatter),
        }
    }

    /// Replaces the WKB printer used for geometry values.
    pub fn set_geometry_formatter(&mut self, formatter: Box<dyn GeometryFormatter>) {
        self.geometry = formatter;
    }

    pub fn dataset(&self) -> &Arc<DataSet> {
        &self.dataset
    }

    pub fn results(&self) -> &[ResultIpi] {
        &self.items
    }

    /// Processes a raw 4- or 16-byte address.
    pub fn from_ip(&mut self, bytes: &[u8]) -> Result<()> {
        let key = IpKey::from_slice(bytes)?;
        self.process(key)
    }

    /// Parses and processes an address literal. A malformed literal leaves
    /// the previous results untouched.
    pub fn from_ip_string(&mut self, text: &str) -> Result<()> {
        let key = IpKey::parse(text)?;
        self.process(key)
    }

    /// Extracts the first usable address from evidence and processes it.
    /// Evidence naming no known header clears the results without error.
    pub fn from_evidence(&mut self, entries: &[EvidenceEntry<'_>]) -> Result<()> {
        match evidence::extract_address(&self.dataset, entries)? {
            Some(key) => self.process(key),
            None => {
                self.clear();
                Ok(())
            }
        }
    }

    fn clear(&mut self) {
        self.items.clear();
        self.values.clear();
        self.values_for = None;
    }

    /// One result per component that serves at least one required property.
    fn process(&mut self, key: IpKey) -> Result<()> {
        self.clear();
        let dataset = self.dataset.clone();
        for component in dataset.components() {
            if !dataset.component_has_required(component.index) {
                continue;
            }
            let graph_result = match dataset.graph_for(component.record.id, key.family()) {
                Some(graph) => Some(graph.evaluate(&key)?),
                None => None,
            };
            self.items.push(ResultIpi {
                component_index: component.index,
                graph_result,
                target_ip: key,
            });
        }
        Ok(())
    }

    /// Resolves the value list for one required property, replacing
    /// whatever the scratch held. Resolving the same property twice reuses
    /// the held list unchanged.
    fn resolve_values(&mut self, required_index: u32) -> Result<()> {
        if self.values_for == Some(required_index) {
            return Ok(());
        }
        self.values.clear();
        self.values_for = None;

        let dataset = self.dataset.clone();
        let property = dataset
            .required_property(required_index)
            .ok_or_else(|| Error::InvalidInput(format!(
                "required property index {required_index} is out of range"
            )))?;
        let component = u32::from(property.record.component_index);
        let (first, last) = dataset
            .value_range(required_index)
            .unwrap_or((property.record.first_value_index, property.record.last_value_index));
        let reader = dataset.profile_reader();

        for item in &self.items {
            if item.component_index != component {
                continue;
            }
            let Some(graph_result) = item.graph_result else {
                continue;
            };
            for weighted in reader.expand(&graph_result)? {
                let start = weighted
                    .profile
                    .value_indexes
                    .partition_point(|&v| v < first);
                for &value_index in &weighted.profile.value_indexes[start..] {
                    if value_index > last {
                        break;
                    }
                    let record = dataset.value_record(value_index)?;
                    if u32::from(record.property_index) != property.property_index {
                        return Err(Error::corrupt(format!(
                            "value {value_index} belongs to property {}, not {}",
                            record.property_index, property.property_index
                        )));
                    }
                    let value = dataset.string_value(record.name_offset)?;
                    self.values.push(WeightedValue {
                        record,
                        value,
                        stored_type: property.stored_type,
                        raw_weight: weighted.raw_weight,
                    });
                }
            }
        }
        self.values_for = Some(required_index);
        Ok(())
    }

    /// The weighted values of one required property for the processed
    /// address.
    pub fn get_values(&mut self, required_index: u32) -> Result<&[WeightedValue]> {
        self.resolve_values(required_index)?;
        Ok(&self.values)
    }

    /// Whether the processed address has any value for the property.
    pub fn has_values(&mut self, required_index: u32) -> bool {
        self.resolve_values(required_index).is_ok() && !self.values.is_empty()
    }

    /// Why the last lookup yielded nothing for the property.
    pub fn no_value_reason(&mut self, required_index: u32) -> NoValueReason {
        let dataset = self.dataset.clone();
        let Some(property) = dataset.required_property(required_index) else {
            return NoValueReason::InvalidProperty;
        };
        if self.items.is_empty() {
            return NoValueReason::NoResults;
        }
        if self.has_values(required_index) {
            return NoValueReason::Unknown;
        }

        let component = u32::from(property.record.component_index);
        let mut saw_component = false;
        let mut saw_profile = false;
        let reader = dataset.profile_reader();
        for item in &self.items {
            if item.component_index != component {
                continue;
            }
            saw_component = true;
            if let Some(graph_result) = item.graph_result {
                if let Ok(profiles) = reader.expand(&graph_result) {
                    if profiles.iter().any(|w| !w.profile.value_indexes.is_empty()) {
                        saw_profile = true;
                    }
                }
            }
        }
        if !saw_component {
            return NoValueReason::NoResults;
        }
        if !saw_profile {
            return NoValueReason::NullProfile;
        }
        NoValueReason::Unknown
    }

    /// Writes every value of the named property as `"<value>":<weight>`,
    /// quoted and joined by `separator`, into the builder.
    pub fn write_values_string(
        &mut self,
        property_name: &str,
        separator: &str,
        builder: &mut StringBuilder,
    ) -> Result<()> {
        let dataset = self.dataset.clone();
        let required_index = dataset
            .required()
            .iter()
            .position(|p| p.name.eq_ignore_ascii_case(property_name))
            .ok_or_else(|| Error::RequiredPropertyNotPresent(property_name.to_string()))?
            as u32;
        self.resolve_values(required_index)?;

        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                builder.push_str(separator);
            }
            let text = value.display(self.geometry.as_ref())?;
            builder.push_str("\"");
            builder.push_str(&text);
            builder.push_str("\":");
            builder.push_str(&format!("{:?}", value.weight()));
        }
        Ok(())
    }

    /// Emits the canonical network id incrementally.
    ///
    /// Per component, `profileId:weight` pairs joined by `,`; components
    /// joined by `|`. Emits whole pairs while they fit the builder's budget
    /// and returns the resume cursor, or `None` once everything is out.
    pub fn network_id_chunk(
        &mut self,
        builder: &mut StringBuilder,
        cursor: NetworkIdCursor,
    ) -> Result<Option<NetworkIdCursor>> {
        let dataset = self.dataset.clone();
        let reader = dataset.profile_reader();

        let mut result_index = cursor.result_index as usize;
        let mut profile_index = cursor.component_profile_index as usize;
        while result_index < self.items.len() {
            let item = &self.items[result_index];
            let pairs: Vec<(u32, u32)> = match item.graph_result {
                None => Vec::new(),
                Some(graph_result) => reader
                    .expand(&graph_result)?
                    .iter()
                    .map(|w| (w.profile.profile_id, w.raw_weight))
                    .collect(),
            };

            if pairs.is_empty() {
                if result_index > 0 && !emit(builder, "|")? {
                    return Ok(Some(NetworkIdCursor {
                        result_index: result_index as u32,
                        component_profile_index: 0,
                    }));
                }
                result_index += 1;
                profile_index = 0;
                continue;
            }

            while profile_index < pairs.len() {
                let (id, weight) = pairs[profile_index];
                let separator = if profile_index > 0 {
                    ","
                } else if result_index > 0 {
                    "|"
                } else {
                    ""
                };
                let piece = format!("{separator}{id}:{weight}");
                if !emit(builder, &piece)? {
                    return Ok(Some(NetworkIdCursor {
                        result_index: result_index as u32,
                        component_profile_index: profile_index as u32,
                    }));
                }
                profile_index += 1;
            }
            profile_index = 0;
            result_index += 1;
        }
        Ok(None)
    }
}

/// Pushes `piece` only if it fits the remaining budget whole. Returns
/// whether it was written; a piece too large for even an empty builder is
/// an error rather than an unmakeable promise.
fn emit(builder: &mut StringBuilder, piece: &str) -> Result<bool> {
    if piece.len() <= builder.remaining() {
        builder.push_str(piece);
        Ok(true)
    } else if builder.is_empty() {
        Err(Error::InsufficientCapacity {
            needed: piece.len(),
            available: builder.remaining(),
        })
    } else {
        Ok(false)
    }
}

impl std::fmt::Debug for Results {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Results")
            .field("items", &self.items.len())
            .field("values", &self.values.len())
            .field("values_for", &self.values_for)
            .finish()
    }
}
