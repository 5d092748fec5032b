//! The unique-headers table, including pseudo-headers.

use ipintel_fmt::PSEUDO_HEADER_SEPARATOR;

/// One unique evidence header.
///
/// A pseudo-header's name contains `0x1F` separators; its value at lookup
/// time is the values of its segment headers joined by the same byte.
/// Relationships are indices into the owning table, never pointers, so the
/// pseudo ↔ segment cycle stays borrow-friendly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueHeader {
    pub name: String,
    /// For a pseudo-header: indices of its segment headers, in order.
    pub segments: Vec<usize>,
    /// Headers that use this one as a segment.
    pub parents: Vec<usize>,
}

impl UniqueHeader {
    pub fn is_pseudo(&self) -> bool {
        !self.segments.is_empty()
    }
}

/// Unique header names in registration order.
#[derive(Debug, Default)]
pub struct HeaderTable {
    headers: Vec<UniqueHeader>,
    /// Accept `HTTP_<NAME>` (CGI style) as an alias when matching evidence.
    upper_prefixed: bool,
}

impl HeaderTable {
    /// Builds the table from header names in registration order. A name
    /// containing the separator byte registers as a pseudo-header and every
    /// segment is registered standalone as well.
    pub fn build(names: impl IntoIterator<Item = String>, upper_prefixed: bool) -> HeaderTable {
        let mut table = HeaderTable {
            headers: Vec::new(),
            upper_prefixed,
        };
        for name in names {
            let index = table.add(&name);
            let separator = char::from(PSEUDO_HEADER_SEPARATOR);
            if name.contains(separator) {
                let segments: Vec<usize> = name
                    .split(separator)
                    .filter(|segment| !segment.is_empty())
                    .map(|segment| table.add(segment))
                    .collect();
                for &segment in &segments {
                    table.headers[segment].parents.push(index);
                }
                table.headers[index].segments = segments;
            }
        }
        log::debug!("header table built with {} unique names", table.headers.len());
        table
    }

    fn add(&mut self, name: &str) -> usize {
        if let Some(existing) = self
            .headers
            .iter()
            .position(|h| h.name.eq_ignore_ascii_case(name))
        {
            return existing;
        }
        self.headers.push(UniqueHeader {
            name: name.to_string(),
            segments: Vec::new(),
            parents: Vec::new(),
        });
        self.headers.len() - 1
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&UniqueHeader> {
        self.headers.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &UniqueHeader> {
        self.headers.iter()
    }

    /// Whether an evidence key names the header at `index`, case
    /// insensitively and, when configured, through the upper-cased
    /// `HTTP_<NAME>` alias (`X-Forwarded-For` ↔ `HTTP_X_FORWARDED_FOR`).
    pub fn matches(&self, index: usize, evidence_key: &str) -> bool {
        let Some(header) = self.headers.get(index) else {
            return false;
        };
        if header.name.eq_ignore_ascii_case(evidence_key) {
            return true;
        }
        if self.upper_prefixed {
            if let Some(suffix) = evidence_key.strip_prefix("HTTP_") {
                let folded: String = header
                    .name
                    .chars()
                    .map(|c| if c == '-' { '_' } else { c.to_ascii_uppercase() })
                    .collect();
                return folded == suffix;
            }
        }
        false
    }
}
