//! Bounded cursor over a contiguous byte span.

use crate::{Error, Result};

/// A little-endian reader over `&[u8]` that checks every advance.
///
/// Used wherever a record has already been fetched as raw bytes and needs
/// field-by-field decoding without the overhead of a seekable stream.
#[derive(Debug, Clone, Copy)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        ByteCursor { data, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    /// Takes the next `count` bytes, failing without moving if they are not
    /// all present.
    pub fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        if count > self.remaining() {
            return Err(Error::PointerOutOfBounds {
                offset: self.position,
                length: count,
                span: self.data.len(),
            });
        }
        let bytes = &self.data[self.position..self.position + count];
        self.position += count;
        Ok(bytes)
    }

    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.take(count).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.read_u64()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_endian_fields() {
        let data = [0x01, 0x02, 0x00, 0xff, 0xff, 0xff, 0xff];
        let mut cursor = ByteCursor::new(&data);
        assert_eq!(cursor.read_u8().unwrap(), 1);
        assert_eq!(cursor.read_u16().unwrap(), 2);
        assert_eq!(cursor.read_i32().unwrap(), -1);
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn overrun_fails_without_moving() {
        let data = [0x01, 0x02];
        let mut cursor = ByteCursor::new(&data);
        cursor.read_u8().unwrap();
        let err = cursor.read_u32().unwrap_err();
        assert!(matches!(err, Error::PointerOutOfBounds { offset: 1, .. }));
        // Position unchanged; the remaining byte is still readable.
        assert_eq!(cursor.read_u8().unwrap(), 2);
    }
}
