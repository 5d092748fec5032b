//! Well-known-binary geometry printing.
//!
//! Geometry output is a plug-in behind [`GeometryFormatter`]; the engine
//! only ever hands a WKB blob and a [`StringBuilder`] across this seam. The
//! default implementation prints WKT with XY coordinates.

use crate::bytes::ByteCursor;
use crate::strings::StringBuilder;
use crate::{Error, Result};

/// Renders a WKB blob into textual output.
pub trait GeometryFormatter: Send + Sync {
    fn format(&self, wkb: &[u8], out: &mut StringBuilder) -> Result<()>;
}

/// The built-in WKB → WKT printer.
///
/// Supports the seven 2D geometry types. Type 0 is reserved by the encoding
/// and reported as such; anything else (including Z/M variants) is unknown.
#[derive(Debug, Default, Clone, Copy)]
pub struct WktFormatter;

const POINT: u32 = 1;
const LINESTRING: u32 = 2;
const POLYGON: u32 = 3;
const MULTI_POINT: u32 = 4;
const MULTI_LINESTRING: u32 = 5;
const MULTI_POLYGON: u32 = 6;
const GEOMETRY_COLLECTION: u32 = 7;

impl GeometryFormatter for WktFormatter {
    fn format(&self, wkb: &[u8], out: &mut StringBuilder) -> Result<()> {
        let mut cursor = ByteCursor::new(wkb);
        write_geometry(&mut cursor, out)
    }
}

/// Byte order marker of one geometry; nested geometries carry their own.
fn read_header(cursor: &mut ByteCursor<'_>) -> Result<(bool, u32)> {
    let big_endian = match cursor.read_u8()? {
        0 => true,
        1 => false,
        other => {
            return Err(Error::corrupt(format!(
                "invalid WKB byte order marker {other}"
            )));
        }
    };
    let kind = read_u32(cursor, big_endian)?;
    Ok((big_endian, kind))
}

fn read_u32(cursor: &mut ByteCursor<'_>, big_endian: bool) -> Result<u32> {
    let raw = cursor.read_u32()?;
    Ok(if big_endian { raw.swap_bytes() } else { raw })
}

fn read_f64(cursor: &mut ByteCursor<'_>, big_endian: bool) -> Result<f64> {
    let raw = cursor.read_u64()?;
    let raw = if big_endian { raw.swap_bytes() } else { raw };
    Ok(f64::from_bits(raw))
}

fn write_geometry(cursor: &mut ByteCursor<'_>, out: &mut StringBuilder) -> Result<()> {
    let (big_endian, kind) = read_header(cursor)?;
    match kind {
        POINT => {
            out.push_str("POINT ");
            write_point(cursor, big_endian, out)
        }
        LINESTRING => {
            out.push_str("LINESTRING ");
            write_point_list(cursor, big_endian, out)
        }
        POLYGON => {
            out.push_str("POLYGON ");
            write_ring_list(cursor, big_endian, out)
        }
        MULTI_POINT => {
            out.push_str("MULTIPOINT ");
            write_nested(cursor, out, |cursor, out| {
                let (big_endian, kind) = read_header(cursor)?;
                if kind != POINT {
                    return Err(Error::corrupt("MULTIPOINT member is not a point"));
                }
                write_point(cursor, big_endian, out)
            }, big_endian)
        }
        MULTI_LINESTRING => {
            out.push_str("MULTILINESTRING ");
            write_nested(cursor, out, |cursor, out| {
                let (big_endian, kind) = read_header(cursor)?;
                if kind != LINESTRING {
                    return Err(Error::corrupt("MULTILINESTRING member is not a linestring"));
                }
                write_point_list(cursor, big_endian, out)
            }, big_endian)
        }
        MULTI_POLYGON => {
            out.push_str("MULTIPOLYGON ");
            write_nested(cursor, out, |cursor, out| {
                let (big_endian, kind) = read_header(cursor)?;
                if kind != POLYGON {
                    return Err(Error::corrupt("MULTIPOLYGON member is not a polygon"));
                }
                write_ring_list(cursor, big_endian, out)
            }, big_endian)
        }
        GEOMETRY_COLLECTION => {
            out.push_str("GEOMETRYCOLLECTION ");
            write_nested(cursor, out, write_geometry, big_endian)
        }
        0 => Err(Error::ReservedGeometry(0)),
        other => Err(Error::UnknownGeometry(other)),
    }
}

fn write_coordinates(
    cursor: &mut ByteCursor<'_>,
    big_endian: bool,
    out: &mut StringBuilder,
) -> Result<()> {
    let x = read_f64(cursor, big_endian)?;
    let y = read_f64(cursor, big_endian)?;
    out.push_str(&format!("{x} {y}"));
    Ok(())
}

fn write_point(
    cursor: &mut ByteCursor<'_>,
    big_endian: bool,
    out: &mut StringBuilder,
) -> Result<()> {
    out.push_str("(");
    write_coordinates(cursor, big_endian, out)?;
    out.push_str(")");
    Ok(())
}

fn write_point_list(
    cursor: &mut ByteCursor<'_>,
    big_endian: bool,
    out: &mut StringBuilder,
) -> Result<()> {
    let count = read_u32(cursor, big_endian)?;
    if count == 0 {
        out.push_str("EMPTY");
        return Ok(());
    }
    out.push_str("(");
    for i in 0..count {
        if i > 0 {
            out.push_str(", ");
        }
        write_coordinates(cursor, big_endian, out)?;
    }
    out.push_str(")");
    Ok(())
}

fn write_ring_list(
    cursor: &mut ByteCursor<'_>,
    big_endian: bool,
    out: &mut StringBuilder,
) -> Result<()> {
    let rings = read_u32(cursor, big_endian)?;
    if rings == 0 {
        out.push_str("EMPTY");
        return Ok(());
    }
    out.push_str("(");
    for i in 0..rings {
        if i > 0 {
            out.push_str(", ");
        }
        write_point_list(cursor, big_endian, out)?;
    }
    out.push_str(")");
    Ok(())
}

/// A counted list of sub-geometries, each printed by `member`.
fn write_nested(
    cursor: &mut ByteCursor<'_>,
    out: &mut StringBuilder,
    member: impl Fn(&mut ByteCursor<'_>, &mut StringBuilder) -> Result<()>,
    big_endian: bool,
) -> Result<()> {
    let count = read_u32(cursor, big_endian)?;
    if count == 0 {
        out.push_str("EMPTY");
        return Ok(());
    }
    out.push_str("(");
    for i in 0..count {
        if i > 0 {
            out.push_str(", ");
        }
        member(cursor, out)?;
    }
    out.push_str(")");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn le_point(x: f64, y: f64) -> Vec<u8> {
        let mut wkb = vec![1u8];
        wkb.extend_from_slice(&POINT.to_le_bytes());
        wkb.extend_from_slice(&x.to_le_bytes());
        wkb.extend_from_slice(&y.to_le_bytes());
        wkb
    }

    fn render(wkb: &[u8]) -> Result<String> {
        let mut out = StringBuilder::unbounded();
        WktFormatter.format(wkb, &mut out)?;
        Ok(out.into_string())
    }

    #[test]
    fn point_little_endian() {
        assert_eq!(render(&le_point(30.0, 10.5)).unwrap(), "POINT (30 10.5)");
    }

    #[test]
    fn point_big_endian() {
        let mut wkb = vec![0u8];
        wkb.extend_from_slice(&POINT.to_be_bytes());
        wkb.extend_from_slice(&2.0f64.to_be_bytes());
        wkb.extend_from_slice(&4.0f64.to_be_bytes());
        assert_eq!(render(&wkb).unwrap(), "POINT (2 4)");
    }

    #[test]
    fn linestring() {
        let mut wkb = vec![1u8];
        wkb.extend_from_slice(&LINESTRING.to_le_bytes());
        wkb.extend_from_slice(&2u32.to_le_bytes());
        for v in [30.0f64, 10.0, 10.0, 30.0] {
            wkb.extend_from_slice(&v.to_le_bytes());
        }
        assert_eq!(render(&wkb).unwrap(), "LINESTRING (30 10, 10 30)");
    }

    #[test]
    fn polygon_with_one_ring() {
        let mut wkb = vec![1u8];
        wkb.extend_from_slice(&POLYGON.to_le_bytes());
        wkb.extend_from_slice(&1u32.to_le_bytes());
        wkb.extend_from_slice(&3u32.to_le_bytes());
        for v in [0.0f64, 0.0, 4.0, 0.0, 0.0, 4.0] {
            wkb.extend_from_slice(&v.to_le_bytes());
        }
        assert_eq!(render(&wkb).unwrap(), "POLYGON ((0 0, 4 0, 0 4))");
    }

    #[test]
    fn multipoint() {
        let mut wkb = vec![1u8];
        wkb.extend_from_slice(&MULTI_POINT.to_le_bytes());
        wkb.extend_from_slice(&2u32.to_le_bytes());
        wkb.extend_from_slice(&le_point(1.0, 2.0));
        wkb.extend_from_slice(&le_point(3.0, 4.0));
        assert_eq!(render(&wkb).unwrap(), "MULTIPOINT ((1 2), (3 4))");
    }

    #[test]
    fn reserved_and_unknown_types() {
        let mut wkb = vec![1u8];
        wkb.extend_from_slice(&0u32.to_le_bytes());
        assert!(matches!(
            render(&wkb).unwrap_err(),
            Error::ReservedGeometry(0)
        ));

        let mut wkb = vec![1u8];
        wkb.extend_from_slice(&1001u32.to_le_bytes());
        assert!(matches!(
            render(&wkb).unwrap_err(),
            Error::UnknownGeometry(1001)
        ));
    }

    #[test]
    fn truncated_blob_is_out_of_bounds() {
        let mut wkb = le_point(1.0, 2.0);
        wkb.truncate(12);
        assert!(render(&wkb).is_err());
    }
}
