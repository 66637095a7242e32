//! SQL scalar functions called by the spatial index triggers.
//!
//! The trigger bodies follow the GeoPackage RTree extension verbatim, so they
//! refer to `ST_MinX`, `ST_MaxX`, `ST_MinY`, `ST_MaxY` and `ST_IsEmpty`. These
//! are registered on every connection the crate opens.

use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::types::ValueRef;
use rusqlite::Connection;

use crate::error::{GraphError, Result};
use crate::geom::{gpkg, BBox};

#[derive(Clone, Copy)]
enum Extent {
    MinX,
    MaxX,
    MinY,
    MaxY,
}

impl Extent {
    fn pick(self, bbox: &BBox) -> f64 {
        match self {
            Extent::MinX => bbox.min_x,
            Extent::MaxX => bbox.max_x,
            Extent::MinY => bbox.min_y,
            Extent::MaxY => bbox.max_y,
        }
    }
}

/// Registers the geometry functions on `conn`.
pub(crate) fn register(conn: &Connection) -> Result<()> {
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;
    for (name, extent) in [
        ("ST_MinX", Extent::MinX),
        ("ST_MaxX", Extent::MaxX),
        ("ST_MinY", Extent::MinY),
        ("ST_MaxY", Extent::MaxY),
    ] {
        conn.create_scalar_function(name, 1, flags, move |ctx| {
            Ok(cell_bbox(ctx)?.map(|bbox| extent.pick(&bbox)))
        })?;
    }
    conn.create_scalar_function("ST_IsEmpty", 1, flags, |ctx| {
        let empty = match ctx.get_raw(0) {
            ValueRef::Null => return Ok(None),
            ValueRef::Blob(bytes) => {
                let header = gpkg::decode_header(bytes).map_err(user_error)?;
                header.is_empty() || cell_bbox(ctx)?.is_none()
            }
            _ => true,
        };
        Ok(Some(i64::from(empty)))
    })?;
    Ok(())
}

fn cell_bbox(ctx: &Context<'_>) -> rusqlite::Result<Option<BBox>> {
    match ctx.get_raw(0) {
        ValueRef::Blob(bytes) => {
            let (geom, _) = gpkg::decode(bytes).map_err(user_error)?;
            Ok(geom.bbox())
        }
        _ => Ok(None),
    }
}

fn user_error(err: GraphError) -> rusqlite::Error {
    rusqlite::Error::UserFunctionError(Box::new(err))
}
