//! Builds a small, complete 4.4 data file in memory for integration tests.
//!
//! The file models two components:
//!
//! - `Network` (id 1): `IsAnonymous` (boolean), `RangeStart`/`RangeEnd`
//!   (IP). Its IPv4 graph matches `51.51.0.0/16`-ish traffic: both leading
//!   octets must equal 51 to land on profile 100 (IsAnonymous False); all
//!   other addresses land on profile 101 (IsAnonymous True).
//! - `Location` (id 2): `Region` (string). Its IPv4 graph maps every
//!   address to a weighted group: North at 0x8000, South at 0x7FFF.
//!
//! There are no IPv6 graphs, so IPv6 lookups resolve to no profile.

use binrw::BinWrite;
use binrw::io::Cursor;
use ipintel_fmt::{
    ClusterRecord, CollectionHeader, ComponentGraphInfo, ComponentRecord, DataSetHeader,
    DateRecord, FileVersion, KeyValuePair, MapRecord, NodeDescriptor, ProfileGroupEntry,
    ProfileOffsetPair, ProfileRecord, PropertyFlags, PropertyRecord, PropertyTypeRecord,
    StringsEntry, ValueRecord,
};

fn write_le<T>(out: &mut Vec<u8>, record: &T)
where
    T: for<'a> binrw::BinWrite<Args<'a> = ()>,
{
    let mut cursor = Cursor::new(Vec::new());
    record
        .write_options(&mut cursor, binrw::Endian::Little, ())
        .expect("record must serialise");
    out.extend_from_slice(&cursor.into_inner());
}

#[derive(Default)]
struct StringsRegion {
    bytes: Vec<u8>,
}

impl StringsRegion {
    fn add_text(&mut self, text: &str) -> u32 {
        let offset = self.bytes.len() as u32;
        write_le(&mut self.bytes, &StringsEntry::text(text));
        offset
    }

    fn add_raw(&mut self, payload: &[u8]) -> u32 {
        let offset = self.bytes.len() as u32;
        write_le(&mut self.bytes, &StringsEntry::new(payload.to_vec()));
        offset
    }
}

fn cluster(start_index: u32, end_index: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    write_le(
        &mut bytes,
        &ClusterRecord {
            start_index,
            end_index,
            span_indexes: [0u32; 256],
        },
    );
    bytes
}

/// A graph tail: its spans, clusters and node bytes, with counts.
struct GraphTail {
    spans: Vec<u8>,
    span_count: u32,
    clusters: Vec<u8>,
    cluster_count: u32,
    nodes: Vec<u8>,
    node_count: u32,
}

pub fn build_test_file() -> Vec<u8> {
    let mut strings = StringsRegion::default();

    // File metadata strings.
    let name_offset = strings.add_text("Test Intelligence");
    let format_offset = strings.add_text("Lite");
    let copyright_offset = strings.add_text("For engine tests only");

    // Component and header names.
    let network_offset = strings.add_text("Network");
    let location_offset = strings.add_text("Location");
    let xff_offset = strings.add_text("X-Forwarded-For");

    // Property names.
    let is_anonymous_offset = strings.add_text("IsAnonymous");
    let range_start_offset = strings.add_text("RangeStart");
    let range_end_offset = strings.add_text("RangeEnd");
    let region_offset = strings.add_text("Region");

    // Map name.
    let premium_offset = strings.add_text("Premium");

    // Value payloads.
    let false_offset = strings.add_raw(&[0]);
    let true_offset = strings.add_raw(&[1]);
    let range_start_ip_offset = strings.add_raw(&[51, 51, 0, 0]);
    let range_end_ip_offset = strings.add_raw(&[51, 51, 255, 255]);
    let north_offset = strings.add_text("North");
    let south_offset = strings.add_text("South");

    // Values collection: index order fixes each property's range.
    let mut values = Vec::new();
    let value_specs: [(u16, u32); 6] = [
        (0, false_offset),
        (0, true_offset),
        (1, range_start_ip_offset),
        (2, range_end_ip_offset),
        (3, north_offset),
        (3, south_offset),
    ];
    for (property_index, name_offset) in value_specs {
        write_le(
            &mut values,
            &ValueRecord {
                property_index,
                name_offset,
                description_offset: name_offset,
                url_offset: name_offset,
            },
        );
    }

    // Profiles.
    let mut profiles = Vec::new();
    let mut add_profile = |component_index: u32, profile_id: u32, value_indexes: &[u32]| -> u32 {
        let offset = profiles.len() as u32;
        write_le(
            &mut profiles,
            &ProfileRecord {
                component_index,
                profile_id,
                value_indexes: value_indexes.to_vec(),
            },
        );
        offset
    };
    let p100 = add_profile(0, 100, &[0, 2, 3]);
    let p101 = add_profile(0, 101, &[1]);
    let p200 = add_profile(1, 200, &[4]);
    let p201 = add_profile(1, 201, &[5]);
    drop(add_profile);

    // Profile offsets, ascending by id.
    let mut profile_offsets = Vec::new();
    for (profile_id, offset) in [(100, p100), (101, p101), (200, p200), (201, p201)] {
        write_le(&mut profile_offsets, &ProfileOffsetPair { profile_id, offset });
    }

    // One weighted group: North at 0x8000, South at 0x7FFF.
    let mut profile_groups = Vec::new();
    for (profile_offset_index, raw_weight) in [(2u32, 0x8000u16), (3, 0x7fff)] {
        write_le(
            &mut profile_groups,
            &ProfileGroupEntry {
                profile_offset_index,
                raw_weight,
            },
        );
    }

    // Components.
    let mut components = Vec::new();
    write_le(
        &mut components,
        &ComponentRecord {
            id: 1,
            name_offset: network_offset,
            default_profile_offset: p100,
            pairs: vec![KeyValuePair {
                header_name_offset: xff_offset,
                graph_index: 0,
            }],
        },
    );
    write_le(
        &mut components,
        &ComponentRecord {
            id: 2,
            name_offset: location_offset,
            default_profile_offset: p200,
            pairs: vec![KeyValuePair {
                header_name_offset: xff_offset,
                graph_index: 1,
            }],
        },
    );

    // Maps.
    let mut maps = Vec::new();
    write_le(
        &mut maps,
        &MapRecord {
            name_offset: premium_offset,
        },
    );

    // Properties.
    let mut properties = Vec::new();
    let property_specs: [(u8, u32, u8, u32, u32, u32, u32); 4] = [
        // (component, name, value_type, first, last, map_count, first_map)
        (0, is_anonymous_offset, 3, 0, 1, 1, 0),
        (0, range_start_offset, 12, 2, 2, 0, 0),
        (0, range_end_offset, 12, 3, 3, 0, 0),
        (1, region_offset, 0, 4, 5, 0, 0),
    ];
    for (i, (component_index, name_offset, value_type, first, last, map_count, first_map)) in
        property_specs.into_iter().enumerate()
    {
        write_le(
            &mut properties,
            &PropertyRecord {
                component_index,
                display_order: i as u8,
                flags: PropertyFlags::new().with_mandatory(true).with_show(true),
                value_type,
                default_value_index: first,
                name_offset,
                description_offset: name_offset,
                category_offset: name_offset,
                url_offset: name_offset,
                first_value_index: first,
                last_value_index: last,
                map_count,
                first_map_index: first_map,
            },
        );
    }

    // Property types, ascending by name offset.
    let mut type_specs = vec![
        (is_anonymous_offset, 3u8),
        (range_start_offset, 12),
        (range_end_offset, 12),
        (region_offset, 0),
    ];
    type_specs.sort_by_key(|(offset, _)| *offset);
    let mut property_types = Vec::new();
    for (name_offset, stored_type) in type_specs {
        write_le(
            &mut property_types,
            &PropertyTypeRecord {
                name_offset,
                stored_type,
            },
        );
    }

    // Graph tails. Records are [span:2][low:1][value:5], 8 bits each.
    let network_tail = GraphTail {
        // Span 0: low 51, high 52, 8 bits each, inline.
        spans: vec![8, 8, 51, 52, 0, 0],
        span_count: 1,
        clusters: cluster(0, 3),
        cluster_count: 1,
        nodes: vec![
            0b00_1_00010, // n0: low child n2
            0b00_0_00101, // n1: high companion -> leaf, other profile
            0b00_1_00100, // n2: low leaf, matched profile
            0b00_0_00101, // n3: high companion -> leaf, other profile
        ],
        node_count: 4,
    };
    let location_tail = GraphTail {
        // Full-range span: every address reaches the group leaf.
        spans: vec![8, 8, 0x00, 0xff, 0, 0],
        span_count: 1,
        clusters: cluster(0, 1),
        cluster_count: 1,
        nodes: vec![0b00_1_00010, 0b00_0_00010],
        node_count: 2,
    };

    // Lay the file out in order and assign absolute positions.
    let graphs_len = 2 * ComponentGraphInfo::ELEMENT_SIZE;
    let mut position = DataSetHeader::SIZE;
    let mut place = |len: u32| -> u32 {
        let start = position;
        position += len;
        start
    };
    let strings_start = place(strings.bytes.len() as u32);
    let components_start = place(components.len() as u32);
    let maps_start = place(maps.len() as u32);
    let properties_start = place(properties.len() as u32);
    let values_start = place(values.len() as u32);
    let profiles_start = place(profiles.len() as u32);
    let graphs_start = place(graphs_len);
    let profile_groups_start = place(profile_groups.len() as u32);
    let property_types_start = place(property_types.len() as u32);
    let profile_offsets_start = place(profile_offsets.len() as u32);
    let g1_spans_start = place(network_tail.spans.len() as u32);
    let g1_clusters_start = place(network_tail.clusters.len() as u32);
    let g1_nodes_start = place(network_tail.nodes.len() as u32);
    let g2_spans_start = place(location_tail.spans.len() as u32);
    let g2_clusters_start = place(location_tail.clusters.len() as u32);
    let g2_nodes_start = place(location_tail.nodes.len() as u32);
    let file_end = position;

    let header = |start: u32, bytes: &[u8], count: u32| CollectionHeader {
        start_position: start,
        length: bytes.len() as u32,
        count,
    };

    let network_info = ComponentGraphInfo {
        ip_version: 4,
        component_id: 1,
        offsets_have_ids: 1,
        entry_index: 0,
        first_profile_index: 0,
        profile_count: 2,
        first_profile_group_index: 0,
        profile_group_count: 0,
        node_bits: NodeDescriptor::packed(2, 5),
        span_bytes: CollectionHeader {
            start_position: file_end,
            length: 0,
            count: 0,
        },
        spans: header(g1_spans_start, &network_tail.spans, network_tail.span_count),
        clusters: header(
            g1_clusters_start,
            &network_tail.clusters,
            network_tail.cluster_count,
        ),
        nodes: header(g1_nodes_start, &network_tail.nodes, network_tail.node_count),
    };
    let location_info = ComponentGraphInfo {
        ip_version: 4,
        component_id: 2,
        offsets_have_ids: 1,
        entry_index: 0,
        first_profile_index: 0,
        profile_count: 0,
        first_profile_group_index: 0,
        profile_group_count: 1,
        node_bits: NodeDescriptor::packed(2, 5),
        span_bytes: CollectionHeader {
            start_position: file_end,
            length: 0,
            count: 0,
        },
        spans: header(g2_spans_start, &location_tail.spans, location_tail.span_count),
        clusters: header(
            g2_clusters_start,
            &location_tail.clusters,
            location_tail.cluster_count,
        ),
        nodes: header(g2_nodes_start, &location_tail.nodes, location_tail.node_count),
    };
    let mut graphs = Vec::new();
    write_le(&mut graphs, &network_info);
    write_le(&mut graphs, &location_info);
    assert_eq!(graphs.len() as u32, graphs_len);

    let file_header = DataSetHeader {
        version: FileVersion {
            major: 4,
            minor: 4,
            build: 1,
            revision: 0,
        },
        published: DateRecord {
            year: 2024,
            month: 11,
            day: 28,
        },
        next_update: DateRecord {
            year: 2025,
            month: 2,
            day: 28,
        },
        copyright_offset,
        name_offset,
        format_offset,
        dataset_tag: *b"test-dataset-tag",
        export_tag: *b"test-export-tag!",
        strings: header(strings_start, &strings.bytes, 17),
        components: header(components_start, &components, 2),
        maps: header(maps_start, &maps, 1),
        properties: header(properties_start, &properties, 4),
        values: header(values_start, &values, 6),
        profiles: header(profiles_start, &profiles, 4),
        graphs: CollectionHeader {
            start_position: graphs_start,
            length: graphs_len,
            count: 2,
        },
        profile_groups: header(profile_groups_start, &profile_groups, 2),
        property_types: header(property_types_start, &property_types, 4),
        profile_offsets: header(profile_offsets_start, &profile_offsets, 4),
    };

    let mut file = Vec::with_capacity(file_end as usize);
    write_le(&mut file, &file_header);
    assert_eq!(file.len() as u32, strings_start);
    file.extend_from_slice(&strings.bytes);
    file.extend_from_slice(&components);
    file.extend_from_slice(&maps);
    file.extend_from_slice(&properties);
    file.extend_from_slice(&values);
    file.extend_from_slice(&profiles);
    file.extend_from_slice(&graphs);
    file.extend_from_slice(&profile_groups);
    file.extend_from_slice(&property_types);
    file.extend_from_slice(&profile_offsets);
    file.extend_from_slice(&network_tail.spans);
    file.extend_from_slice(&network_tail.clusters);
    file.extend_from_slice(&network_tail.nodes);
    file.extend_from_slice(&location_tail.spans);
    file.extend_from_slice(&location_tail.clusters);
    file.extend_from_slice(&location_tail.nodes);
    assert_eq!(file.len() as u32, file_end);
    file
}

/// Writes the test file to a unique temp path; the caller removes it.
pub fn write_test_file_to_disk() -> std::path::PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!(
        "ipintel-test-{}-{}.dat",
        std::process::id(),
        rand::random::<u32>()
    ));
    std::fs::write(&path, build_test_file()).expect("temp file must be writable");
    path
}
