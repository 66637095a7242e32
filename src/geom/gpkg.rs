//! GeoPackage binary geometry cells: `GP`, version, flags, SRID, WKB.

use std::convert::TryInto;

use super::{wkb, Geometry};
use crate::error::{GraphError, Result};

/// Magic prefix of every geometry cell.
pub const MAGIC: [u8; 2] = *b"GP";
/// Binary format version written by this crate.
pub const VERSION: u8 = 0;
/// Flags for a non-empty geometry with a little-endian header and no envelope.
pub const FLAGS_LE_NO_ENVELOPE: u8 = 0x01;
/// Header length when no envelope is present.
pub const HEADER_LEN: usize = 8;

const FLAG_BYTE_ORDER_LE: u8 = 0x01;
const FLAG_EMPTY: u8 = 0x10;
const ENVELOPE_SHIFT: u8 = 1;
const ENVELOPE_MASK: u8 = 0x07;

/// Serializes a geometry into a container cell.
pub fn encode(geom: &Geometry, srid: i32) -> Vec<u8> {
    let body = wkb::encode(geom);
    let mut buf = Vec::with_capacity(HEADER_LEN + body.len());
    buf.extend_from_slice(&MAGIC);
    buf.push(VERSION);
    let flags = if geom.is_empty() {
        FLAGS_LE_NO_ENVELOPE | FLAG_EMPTY
    } else {
        FLAGS_LE_NO_ENVELOPE
    };
    buf.push(flags);
    buf.extend_from_slice(&srid.to_le_bytes());
    buf.extend_from_slice(&body);
    buf
}

/// Parsed cell header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    /// Format version byte.
    pub version: u8,
    /// Raw flags byte.
    pub flags: u8,
    /// Spatial reference id.
    pub srid: i32,
    /// Offset of the WKB payload.
    pub wkb_offset: usize,
}

impl Header {
    /// Whether the empty-geometry flag is set.
    pub fn is_empty(&self) -> bool {
        self.flags & FLAG_EMPTY != 0
    }
}

/// Parses the header, skipping any envelope.
pub fn decode_header(bytes: &[u8]) -> Result<Header> {
    if bytes.len() < HEADER_LEN {
        return Err(GraphError::InvalidGeometry(format!(
            "geometry cell of {} bytes is shorter than its header",
            bytes.len()
        )));
    }
    if bytes[0..2] != MAGIC {
        return Err(GraphError::InvalidGeometry("missing GP magic".into()));
    }
    let version = bytes[2];
    let flags = bytes[3];
    let raw: [u8; 4] = bytes[4..8]
        .try_into()
        .map_err(|_| GraphError::InvalidGeometry("truncated SRID".into()))?;
    let srid = if flags & FLAG_BYTE_ORDER_LE != 0 {
        i32::from_le_bytes(raw)
    } else {
        i32::from_be_bytes(raw)
    };
    let envelope_len = match (flags >> ENVELOPE_SHIFT) & ENVELOPE_MASK {
        0 => 0,
        1 => 32,
        2 | 3 => 48,
        4 => 64,
        other => {
            return Err(GraphError::InvalidGeometry(format!(
                "invalid envelope indicator {other}"
            )))
        }
    };
    let wkb_offset = HEADER_LEN + envelope_len;
    if bytes.len() < wkb_offset {
        return Err(GraphError::InvalidGeometry("truncated envelope".into()));
    }
    Ok(Header {
        version,
        flags,
        srid,
        wkb_offset,
    })
}

/// Deserializes a container cell into its geometry and SRID.
pub fn decode(bytes: &[u8]) -> Result<(Geometry, i32)> {
    let header = decode_header(bytes)?;
    let (geom, _) = wkb::decode(&bytes[header.wkb_offset..])?;
    Ok((geom, header.srid))
}
