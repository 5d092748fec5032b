//! Evidence iteration: header-keyed key/value pairs carrying an address.

use modular_bitfield::prelude::*;

use ipintel_fmt::PSEUDO_HEADER_SEPARATOR;

use crate::dataset::DataSet;
use crate::ip::IpKey;
use crate::Result;

/// Where one piece of evidence came from, as bit flags.
#[bitfield]
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct EvidencePrefix {
    pub header: bool,
    pub query: bool,
    pub server: bool,
    pub cookie: bool,
    #[skip]
    __: B4,
}

impl std::fmt::Debug for EvidencePrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvidencePrefix")
            .field("header", &self.header())
            .field("query", &self.query())
            .field("server", &self.server())
            .field("cookie", &self.cookie())
            .finish()
    }
}

impl EvidencePrefix {
    pub fn query_source() -> EvidencePrefix {
        EvidencePrefix::new().with_query(true)
    }

    pub fn server_source() -> EvidencePrefix {
        EvidencePrefix::new().with_server(true)
    }

    pub fn header_source() -> EvidencePrefix {
        EvidencePrefix::new().with_header(true)
    }

    pub fn cookie_source() -> EvidencePrefix {
        EvidencePrefix::new().with_cookie(true)
    }
}

/// One `{prefix, key, value}` evidence tuple.
#[derive(Debug, Clone, Copy)]
pub struct EvidenceEntry<'a> {
    pub prefix: EvidencePrefix,
    pub key: &'a str,
    pub value: &'a str,
}

impl<'a> EvidenceEntry<'a> {
    pub fn query(key: &'a str, value: &'a str) -> EvidenceEntry<'a> {
        EvidenceEntry {
            prefix: EvidencePrefix::query_source(),
            key,
            value,
        }
    }

    pub fn server(key: &'a str, value: &'a str) -> EvidenceEntry<'a> {
        EvidenceEntry {
            prefix: EvidencePrefix::server_source(),
            key,
            value,
        }
    }
}

/// Finds the address carried by the evidence.
///
/// Unique headers are visited in registration order; for each, `query`
/// evidence is scanned before `server` evidence and the first matching
/// value is parsed. A pseudo-header's value is assembled from its segment
/// headers joined by the separator byte before parsing. Values that fail to
/// parse are skipped; no usable evidence yields `None`.
pub fn extract_address(dataset: &DataSet, entries: &[EvidenceEntry<'_>]) -> Result<Option<IpKey>> {
    let headers = dataset.headers();
    for index in 0..headers.len() {
        let Some(header) = headers.get(index) else {
            continue;
        };
        let candidate = if header.is_pseudo() {
            assemble_pseudo(dataset, &header.segments, entries)
        } else {
            find_value(dataset, index, entries).map(str::to_string)
        };
        let Some(candidate) = candidate else {
            continue;
        };
        match IpKey::parse(&candidate) {
            Ok(key) => {
                log::trace!("evidence header {:?} supplied the address", header.name);
                return Ok(Some(key));
            }
            Err(_) => {
                log::trace!(
                    "evidence header {:?} value {candidate:?} is not an address",
                    header.name
                );
            }
        }
    }
    Ok(None)
}

/// Query-prefixed evidence wins over server-prefixed evidence.
fn find_value<'a>(
    dataset: &DataSet,
    header_index: usize,
    entries: &[EvidenceEntry<'a>],
) -> Option<&'a str> {
    let headers = dataset.headers();
    entries
        .iter()
        .find(|e| e.prefix.query() && headers.matches(header_index, e.key))
        .or_else(|| {
            entries
                .iter()
                .find(|e| e.prefix.server() && headers.matches(header_index, e.key))
        })
        .map(|e| e.value)
}

/// Joins the segment headers' values with the separator byte. Segments
/// without evidence contribute nothing; a fully absent set yields `None`.
fn assemble_pseudo(
    dataset: &DataSet,
    segments: &[usize],
    entries: &[EvidenceEntry<'_>],
) -> Option<String> {
    let mut assembled = String::new();
    let mut any = false;
    for (i, &segment) in segments.iter().enumerate() {
        if i > 0 {
            assembled.push(char::from(PSEUDO_HEADER_SEPARATOR));
        }
        if let Some(value) = find_value(dataset, segment, entries) {
            assembled.push_str(value);
            any = true;
        }
    }
    any.then_some(assembled)
}
