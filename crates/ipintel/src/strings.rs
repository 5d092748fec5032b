//! Typed access to strings-collection entries, and the output builder.

use ipintel_fmt::StringsEntry;

use crate::collection::Item;
use crate::{Error, Result};

/// One strings-collection entry with typed readers over its payload.
///
/// The entry is raw sized bytes; which reader is valid is decided by the
/// stored value type of the property that referenced the entry. The value
/// borrows whatever the collection handed out and releases it on drop.
pub struct StringValue {
    item: Item,
}

impl StringValue {
    pub fn new(item: Item) -> Result<StringValue> {
        let prefix = StringsEntry::PREFIX_SIZE as usize;
        if item.len() < prefix + 1 {
            return Err(Error::corrupt(format!(
                "strings entry of {} bytes is too short",
                item.len()
            )));
        }
        let declared = u16::from_le_bytes([item[0], item[1]]) as usize;
        if item.len() != prefix + declared {
            return Err(Error::corrupt(format!(
                "strings entry declares {declared} bytes but carries {}",
                item.len() - prefix
            )));
        }
        Ok(StringValue { item })
    }

    /// Payload bytes after the size prefix.
    pub fn payload(&self) -> &[u8] {
        &self.item[StringsEntry::PREFIX_SIZE as usize..]
    }

    /// Text without the stored NUL terminator.
    pub fn as_text(&self) -> Result<&str> {
        let payload = self.payload();
        let end = payload
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(payload.len());
        std::str::from_utf8(&payload[..end])
            .map_err(|err| Error::EncodingError(format!("strings entry is not UTF-8: {err}")))
    }

    pub fn as_i32(&self) -> Result<i32> {
        let b = self.fixed_payload::<4>("int32")?;
        Ok(i32::from_le_bytes(b))
    }

    pub fn as_f32(&self) -> Result<f32> {
        let b = self.fixed_payload::<4>("float32")?;
        Ok(f32::from_le_bytes(b))
    }

    pub fn as_i16(&self) -> Result<i16> {
        let b = self.fixed_payload::<2>("int16")?;
        Ok(i16::from_le_bytes(b))
    }

    pub fn as_byte(&self) -> Result<u8> {
        let b = self.fixed_payload::<1>("byte")?;
        Ok(b[0])
    }

    pub fn as_bool(&self) -> Result<bool> {
        Ok(self.as_byte()? != 0)
    }

    fn fixed_payload<const N: usize>(&self, kind: &str) -> Result<[u8; N]> {
        let payload = self.payload();
        payload.try_into().map_err(|_| {
            Error::corrupt(format!(
                "expected a {N}-byte {kind} payload, found {} bytes",
                payload.len()
            ))
        })
    }
}

impl std::fmt::Debug for StringValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StringValue({} payload bytes)", self.payload().len())
    }
}

/// Accumulates textual output against a byte budget.
///
/// Writes past the budget are dropped but still counted, so a caller can
/// size a second pass: `would_be_len` reports what an unbounded build would
/// have produced and `has_overflowed` whether anything was lost.
pub struct StringBuilder {
    buf: String,
    limit: usize,
    added: usize,
}

impl StringBuilder {
    pub fn new(limit: usize) -> StringBuilder {
        StringBuilder {
            buf: String::new(),
            limit,
            added: 0,
        }
    }

    pub fn unbounded() -> StringBuilder {
        StringBuilder::new(usize::MAX)
    }

    pub fn push_str(&mut self, s: &str) {
        self.added += s.len();
        let space = self.limit - self.buf.len().min(self.limit);
        if space >= s.len() {
            self.buf.push_str(s);
        } else if space > 0 {
            // Keep only whole characters of the part that fits.
            let mut cut = space;
            while cut > 0 && !s.is_char_boundary(cut) {
                cut -= 1;
            }
            self.buf.push_str(&s[..cut]);
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Bytes the output would have needed without the budget.
    pub fn would_be_len(&self) -> usize {
        self.added
    }

    pub fn has_overflowed(&self) -> bool {
        self.added > self.limit
    }

    /// Bytes still available under the budget.
    pub fn remaining(&self) -> usize {
        self.limit - self.buf.len().min(self.limit)
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.added = 0;
    }

    pub fn into_string(self) -> String {
        self.buf
    }
}

impl std::fmt::Write for StringBuilder {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        self.push_str(s);
        Ok(())
    }
}

impl std::fmt::Debug for StringBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "StringBuilder({} of {} bytes, {} added)",
            self.buf.len(),
            self.limit,
            self.added
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(payload: &[u8]) -> StringValue {
        let mut bytes = (payload.len() as i16).to_le_bytes().to_vec();
        bytes.extend_from_slice(payload);
        StringValue::new(Item::Owned(bytes)).unwrap()
    }

    #[test]
    fn typed_readers() {
        assert_eq!(entry(b"False\0").as_text().unwrap(), "False");
        assert_eq!(entry(&42i32.to_le_bytes()).as_i32().unwrap(), 42);
        assert_eq!(entry(&1.5f32.to_le_bytes()).as_f32().unwrap(), 1.5);
        assert_eq!(entry(&(-7i16).to_le_bytes()).as_i16().unwrap(), -7);
        assert!(entry(&[1]).as_bool().unwrap());
        assert!(!entry(&[0]).as_bool().unwrap());
    }

    #[test]
    fn wrong_width_is_corrupt() {
        assert!(matches!(
            entry(b"ab").as_i32().unwrap_err(),
            Error::CorruptData(_)
        ));
    }

    #[test]
    fn truncated_entry_rejected() {
        // Declares 10 payload bytes, carries 2.
        let mut bytes = 10i16.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"ab");
        assert!(StringValue::new(Item::Owned(bytes)).is_err());
    }

    #[test]
    fn builder_counts_overflow() {
        let mut builder = StringBuilder::new(8);
        builder.push_str("12345");
        assert!(!builder.has_overflowed());
        builder.push_str("6789ab");
        assert_eq!(builder.as_str(), "12345678");
        assert!(builder.has_overflowed());
        assert_eq!(builder.would_be_len(), 11);

        builder.clear();
        assert_eq!(builder.as_str(), "");
        assert!(!builder.has_overflowed());
    }

    #[test]
    fn builder_respects_char_boundaries() {
        let mut builder = StringBuilder::new(5);
        builder.push_str("ab\u{00e9}cd"); // é is two bytes
        // a(1) + b(1) + é(2) + c(1) fills the 5-byte budget exactly.
        assert_eq!(builder.as_str(), "ab\u{00e9}c");
        assert!(builder.has_overflowed());
    }
}
