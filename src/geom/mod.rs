//! Geometry model and the binary codecs used by the container format.
//!
//! Only the two geometry kinds a transportation network needs are modelled:
//! points (nodes) and line strings (edges). Cells are stored as a GeoPackage
//! binary header followed by well-known binary, see [`gpkg`] and [`wkb`].

pub mod distance;
pub mod gpkg;
pub mod wkb;

use serde_json::Value;

use crate::error::{GraphError, Result};

/// Mean Earth radius in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Two-dimensional coordinate (`x` = longitude / easting).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Coord {
    /// Longitude or easting.
    pub x: f64,
    /// Latitude or northing.
    pub y: f64,
}

impl Coord {
    /// Creates a coordinate.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<(f64, f64)> for Coord {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// Geometry kinds stored in feature tables.
#[derive(Clone, Debug, PartialEq)]
pub enum Geometry {
    /// A single position.
    Point(Coord),
    /// An ordered sequence of positions.
    LineString(Vec<Coord>),
}

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BBox {
    /// Minimum x.
    pub min_x: f64,
    /// Minimum y.
    pub min_y: f64,
    /// Maximum x.
    pub max_x: f64,
    /// Maximum y.
    pub max_y: f64,
}

impl BBox {
    /// Creates a box from its left, bottom, right and top edges.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Whether two boxes share at least one point (edges included).
    pub fn intersects(&self, other: &BBox) -> bool {
        self.max_x >= other.min_x
            && self.min_x <= other.max_x
            && self.max_y >= other.min_y
            && self.min_y <= other.max_y
    }
}

impl Geometry {
    /// OGC geometry type name as recorded in `gpkg_geometry_columns`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "POINT",
            Geometry::LineString(_) => "LINESTRING",
        }
    }

    /// Whether the geometry has no positions (NaN point or empty line).
    pub fn is_empty(&self) -> bool {
        match self {
            Geometry::Point(c) => c.x.is_nan() && c.y.is_nan(),
            Geometry::LineString(coords) => coords.is_empty(),
        }
    }

    /// Coordinates in order.
    pub fn coords(&self) -> &[Coord] {
        match self {
            Geometry::Point(c) => std::slice::from_ref(c),
            Geometry::LineString(coords) => coords,
        }
    }

    /// First coordinate, if any.
    pub fn first(&self) -> Option<Coord> {
        self.coords().first().copied()
    }

    /// Last coordinate, if any.
    pub fn last(&self) -> Option<Coord> {
        self.coords().last().copied()
    }

    /// Bounding box, `None` for empty geometries.
    pub fn bbox(&self) -> Option<BBox> {
        if self.is_empty() {
            return None;
        }
        let mut iter = self.coords().iter();
        let first = iter.next()?;
        let mut bbox = BBox::new(first.x, first.y, first.x, first.y);
        for c in iter {
            bbox.min_x = bbox.min_x.min(c.x);
            bbox.min_y = bbox.min_y.min(c.y);
            bbox.max_x = bbox.max_x.max(c.x);
            bbox.max_y = bbox.max_y.max(c.y);
        }
        Some(bbox)
    }

    /// Great-circle length in metres, treating coordinates as lon/lat degrees.
    pub fn haversine_length(&self) -> f64 {
        self.coords()
            .windows(2)
            .map(|pair| haversine(pair[0], pair[1]))
            .sum()
    }

    /// Returns the same geometry with its coordinates in reverse order.
    pub fn reversed(&self) -> Geometry {
        match self {
            Geometry::Point(c) => Geometry::Point(*c),
            Geometry::LineString(coords) => {
                Geometry::LineString(coords.iter().rev().copied().collect())
            }
        }
    }

    /// Parses a GeoJSON geometry object (`Point` or `LineString`).
    pub fn from_geojson(value: &Value) -> Result<Geometry> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| GraphError::InvalidGeometry("geojson geometry without type".into()))?;
        let coordinates = value
            .get("coordinates")
            .ok_or_else(|| GraphError::InvalidGeometry("geojson geometry without coordinates".into()))?;
        match kind {
            "Point" => Ok(Geometry::Point(geojson_position(coordinates)?)),
            "LineString" => {
                let positions = coordinates.as_array().ok_or_else(|| {
                    GraphError::InvalidGeometry("LineString coordinates must be an array".into())
                })?;
                let coords = positions
                    .iter()
                    .map(geojson_position)
                    .collect::<Result<Vec<_>>>()?;
                Ok(Geometry::LineString(coords))
            }
            other => Err(GraphError::InvalidGeometry(format!(
                "unsupported geojson type {other}"
            ))),
        }
    }

    /// Renders the geometry as a GeoJSON object.
    pub fn to_geojson(&self) -> Value {
        match self {
            Geometry::Point(c) => serde_json::json!({
                "type": "Point",
                "coordinates": [c.x, c.y],
            }),
            Geometry::LineString(coords) => serde_json::json!({
                "type": "LineString",
                "coordinates": coords.iter().map(|c| vec![c.x, c.y]).collect::<Vec<_>>(),
            }),
        }
    }
}

fn geojson_position(value: &Value) -> Result<Coord> {
    let pair = value
        .as_array()
        .filter(|pair| pair.len() >= 2)
        .ok_or_else(|| GraphError::InvalidGeometry("position must have two numbers".into()))?;
    let x = pair[0]
        .as_f64()
        .ok_or_else(|| GraphError::InvalidGeometry("non-numeric x".into()))?;
    let y = pair[1]
        .as_f64()
        .ok_or_else(|| GraphError::InvalidGeometry("non-numeric y".into()))?;
    Ok(Coord::new(x, y))
}

/// Great-circle distance in metres between two lon/lat positions.
pub fn haversine(a: Coord, b: Coord) -> f64 {
    let lat1 = a.y.to_radians();
    let lat2 = b.y.to_radians();
    let dlat = lat2 - lat1;
    let dlon = (b.x - a.x).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}
