//! Well-known binary encoding of points and line strings.

use std::convert::TryInto;

use super::{Coord, Geometry};
use crate::error::{GraphError, Result};

/// WKB geometry type code for points.
pub const WKB_POINT: u32 = 1;
/// WKB geometry type code for line strings.
pub const WKB_LINESTRING: u32 = 2;

const BYTE_ORDER_BE: u8 = 0;
const BYTE_ORDER_LE: u8 = 1;

/// Encodes a geometry as little-endian well-known binary.
pub fn encode(geom: &Geometry) -> Vec<u8> {
    match geom {
        Geometry::Point(c) => {
            let mut buf = Vec::with_capacity(1 + 4 + 16);
            buf.push(BYTE_ORDER_LE);
            buf.extend_from_slice(&WKB_POINT.to_le_bytes());
            push_coord(&mut buf, *c);
            buf
        }
        Geometry::LineString(coords) => {
            let mut buf = Vec::with_capacity(1 + 4 + 4 + 16 * coords.len());
            buf.push(BYTE_ORDER_LE);
            buf.extend_from_slice(&WKB_LINESTRING.to_le_bytes());
            buf.extend_from_slice(&(coords.len() as u32).to_le_bytes());
            for c in coords {
                push_coord(&mut buf, *c);
            }
            buf
        }
    }
}

fn push_coord(buf: &mut Vec<u8>, c: Coord) {
    buf.extend_from_slice(&c.x.to_le_bytes());
    buf.extend_from_slice(&c.y.to_le_bytes());
}

/// Decodes well-known binary in either byte order.
///
/// Returns the geometry and the number of bytes consumed.
pub fn decode(bytes: &[u8]) -> Result<(Geometry, usize)> {
    let mut reader = Reader::new(bytes)?;
    let kind = reader.u32()?;
    let geom = match kind {
        WKB_POINT => Geometry::Point(reader.coord()?),
        WKB_LINESTRING => {
            let count = reader.u32()? as usize;
            if count.saturating_mul(16) > reader.remaining() {
                return Err(GraphError::InvalidGeometry(format!(
                    "line string claims {count} points but payload is truncated"
                )));
            }
            let mut coords = Vec::with_capacity(count);
            for _ in 0..count {
                coords.push(reader.coord()?);
            }
            Geometry::LineString(coords)
        }
        other => {
            return Err(GraphError::InvalidGeometry(format!(
                "unsupported WKB geometry type {other}"
            )))
        }
    };
    Ok((geom, reader.offset))
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
    little_endian: bool,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Result<Self> {
        let little_endian = match bytes.first() {
            Some(&BYTE_ORDER_LE) => true,
            Some(&BYTE_ORDER_BE) => false,
            Some(other) => {
                return Err(GraphError::InvalidGeometry(format!(
                    "bad WKB byte order marker {other}"
                )))
            }
            None => return Err(GraphError::InvalidGeometry("empty WKB payload".into())),
        };
        Ok(Self {
            bytes,
            offset: 1,
            little_endian,
        })
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let end = self.offset + N;
        let slice = self
            .bytes
            .get(self.offset..end)
            .ok_or_else(|| GraphError::InvalidGeometry("truncated WKB payload".into()))?;
        self.offset = end;
        slice
            .try_into()
            .map_err(|_| GraphError::InvalidGeometry("truncated WKB payload".into()))
    }

    fn u32(&mut self) -> Result<u32> {
        let raw = self.take::<4>()?;
        Ok(if self.little_endian {
            u32::from_le_bytes(raw)
        } else {
            u32::from_be_bytes(raw)
        })
    }

    fn f64(&mut self) -> Result<f64> {
        let raw = self.take::<8>()?;
        Ok(if self.little_endian {
            f64::from_le_bytes(raw)
        } else {
            f64::from_be_bytes(raw)
        })
    }

    fn coord(&mut self) -> Result<Coord> {
        let x = self.f64()?;
        let y = self.f64()?;
        Ok(Coord::new(x, y))
    }
}
